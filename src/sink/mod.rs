//! Output sinks: retimed capture files and text records.
//!
//! A sink consumes (computed time, record, payload) triples in
//! processor order. The two variants are a plain enum; construction
//! picks the variant from the destination name: `.pcap` writes a
//! capture file, anything else (including `-` for stdout) writes
//! text.

mod pcap;
mod text;

pub use pcap::PcapSink;
pub use text::{dump_frame, TextSink};

use crate::error::Error;
use crate::process::ComputedTime;
use crate::source::RawRecord;

/// What a sink did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The record went out.
    Written,
    /// The record was intentionally skipped (e.g. a suppressed
    /// keyframe).
    Skipped,
}

/// Sink construction options.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Output path, `-` for stdout, or a `.pcap` capture file.
    pub dest: String,
    /// Emit keyframes instead of suppressing them.
    pub write_keyframes: bool,
    /// Write microsecond-magic capture files instead of nanosecond.
    pub write_micros: bool,
    /// Print the capture clock time and hardware−clock diff.
    pub write_clock_times: bool,
    /// Append a hex/ASCII dump of each frame.
    pub write_payload: bool,
    /// strftime-style pattern for the integer seconds.
    pub date_format: String,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            dest: "-".to_string(),
            write_keyframes: false,
            write_micros: false,
            write_clock_times: true,
            write_payload: false,
            date_format: "%Y/%m/%d-%H:%M:%S".to_string(),
        }
    }
}

/// An output sink: capture file or text records.
pub enum Sink {
    Pcap(PcapSink),
    Text(TextSink),
}

impl Sink {
    /// Open a sink by destination name.
    pub fn open(options: &WriteOptions) -> Result<Self, Error> {
        if options.dest.ends_with(".pcap") {
            Ok(Sink::Pcap(PcapSink::create(options)?))
        } else {
            Ok(Sink::Text(TextSink::create(options)?))
        }
    }

    /// Write one processed record.
    pub fn write(
        &mut self,
        timed: &ComputedTime,
        record: &RawRecord,
        buffer: &[u8],
    ) -> Result<WriteOutcome, Error> {
        match self {
            Sink::Pcap(sink) => sink.write(timed, record, buffer),
            Sink::Text(sink) => sink.write(timed, record, buffer),
        }
    }

    /// Flush buffered output to the destination.
    pub fn flush(&mut self) -> Result<(), Error> {
        match self {
            Sink::Pcap(sink) => sink.flush(),
            Sink::Text(sink) => sink.flush(),
        }
    }

    /// Short name of the sink variant, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Sink::Pcap(_) => "pcap",
            Sink::Text(_) => "text",
        }
    }
}
