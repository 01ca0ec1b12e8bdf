//! Command-line argument definitions.

use clap::{Parser, ValueEnum};

use crate::process::TimestampFormat;

/// Timestamp layout selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    /// Infer the layout and offset from the first frames
    Auto,
    /// 32-bit tick counter replacing or following the FCS
    #[value(name = "32bit")]
    Bits32,
    /// 16-byte timestamp trailer appended to the payload
    Trailer,
}

impl From<FormatArg> for TimestampFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Auto => TimestampFormat::Auto,
            FormatArg::Bits32 => TimestampFormat::Bits32,
            FormatArg::Trailer => TimestampFormat::Trailer,
        }
    }
}

/// Rebuild wall-clock time for hardware-timestamped capture streams.
#[derive(Parser, Debug)]
#[command(name = "retime")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Capture file to read, or a live interface (`ifname` or `dev:port`)
    #[arg(short = 'r', long = "read", value_name = "SOURCE")]
    pub read: String,

    /// Destination: `-` for stdout, a text file, or a `.pcap` capture file
    #[arg(short = 'w', long = "write", value_name = "DEST", default_value = "-")]
    pub write: String,

    /// Stop after this many written records (0 = all)
    #[arg(short = 'c', long = "count", value_name = "N", default_value_t = 0)]
    pub count: u64,

    /// Date-time pattern for text output
    #[arg(
        short = 'd',
        long = "date",
        value_name = "PATTERN",
        default_value = "%Y/%m/%d-%H:%M:%S"
    )]
    pub date_format: String,

    /// Write all packets, including keyframes and untimed records
    #[arg(short = 'a', long = "all")]
    pub all: bool,

    /// Timestamp layout to expect
    #[arg(short = 't', long = "format", value_enum, default_value = "auto")]
    pub format: FormatArg,

    /// Timestamp offset from the end of the packet (4, 8, 16 or 20)
    #[arg(short = 'o', long = "offset", value_name = "BYTES")]
    pub offset: Option<usize>,

    /// Do not attempt to put the interface into promiscuous mode
    #[arg(short = 'p', long = "no-promisc")]
    pub no_promiscuous: bool,

    /// Skip FCS checks and do not rewrite replaced FCS fields
    #[arg(short = 'f', long = "ignore-fcs")]
    pub ignore_fcs: bool,

    /// Write microsecond-magic capture files instead of nanosecond
    #[arg(long = "micros")]
    pub micros: bool,

    /// Report capture clock times instead of decoding hardware timestamps
    #[arg(long = "clock-times")]
    pub clock_times: bool,

    /// Do not print capture clock times next to hardware times
    #[arg(long = "no-clock")]
    pub no_clock: bool,

    /// Dump each packet as hex/ASCII (text output only)
    #[arg(short = 'x', long = "dump")]
    pub dump: bool,

    /// More output; repeat for more detail
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Cross-check the layout selector against an explicit offset; an
    /// explicit offset implies its layout.
    pub fn effective_format(&self) -> Result<(TimestampFormat, Option<usize>), String> {
        match (self.format, self.offset) {
            (_, None) => Ok((self.format.into(), None)),
            (FormatArg::Auto | FormatArg::Bits32, Some(4 | 8)) => {
                Ok((TimestampFormat::Bits32, self.offset))
            }
            (FormatArg::Auto | FormatArg::Trailer, Some(16 | 20)) => {
                Ok((TimestampFormat::Trailer, self.offset))
            }
            (FormatArg::Bits32, Some(_)) => Err("expected offset to be 4 or 8".to_string()),
            (FormatArg::Trailer, Some(_)) => Err("expected offset to be 16 or 20".to_string()),
            (FormatArg::Auto, Some(_)) => {
                Err("expected offset to be 4, 8, 16 or 20".to_string())
            }
        }
    }
}
