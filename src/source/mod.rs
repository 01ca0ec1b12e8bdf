//! Capture sources: offline capture files and live interfaces.
//!
//! A source hands out one frame at a time through [`Source::next`],
//! copying the payload into the caller's scratch buffer. The two
//! variants are a plain enum; construction picks the variant from the
//! source name (an existing file or a `.pcap` path reads offline,
//! anything else is treated as a live interface).

mod nic;

pub use nic::NicReader;

use std::path::Path;

use crate::error::Error;
use crate::pcap::PcapFileReader;
use crate::time::PsTime;

/// Outcome of a single [`Source::next`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// Record populated.
    Ok,
    /// Transient no-data (live capture only); retry.
    Again,
    /// End of stream; terminal.
    Eof,
    /// Unrecoverable parse or I/O error.
    Error,
    /// The live receive ring was lapped; a frame was lost.
    Overflow,
}

/// One captured frame as delivered by a source.
///
/// The payload itself lives in the caller's buffer; this struct only
/// carries the lengths and the clock time at which capture occurred.
#[derive(Debug, Clone, Copy)]
pub struct RawRecord {
    pub status: ReadStatus,
    /// Link-layer type (1 = Ethernet).
    pub link_type: u16,
    /// Bytes actually captured into the buffer.
    pub len_capture: u32,
    /// Original frame length on the wire.
    pub len_orig: u32,
    /// Host clock time of capture.
    pub clock_time: PsTime,
    /// True for live capture, false for offline files.
    pub is_real_time: bool,
}

impl RawRecord {
    /// A record carrying only a status, with no payload.
    pub fn status_only(status: ReadStatus) -> Self {
        Self {
            status,
            link_type: 0,
            len_capture: 0,
            len_orig: 0,
            clock_time: PsTime::UNSET,
            is_real_time: false,
        }
    }

    /// True when the captured length does not match the wire length;
    /// the frame tail, where timestamps live, cannot be trusted.
    pub fn is_truncated(&self) -> bool {
        self.len_capture != self.len_orig
    }
}

/// Source construction options.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Capture file path or interface name (`ifname` or `dev:port`).
    pub source: String,
    /// Put the live interface into promiscuous mode while capturing.
    pub promiscuous: bool,
}

/// A capture source: offline file or live interface.
pub enum Source {
    File(PcapFileReader),
    Nic(NicReader),
}

impl Source {
    /// Open a source by name.
    ///
    /// A name that ends in `.pcap` or names an existing file opens the
    /// offline reader; anything else is taken as a live interface.
    pub fn open(options: &ReadOptions) -> Result<Self, Error> {
        let is_file =
            options.source.ends_with(".pcap") || Path::new(&options.source).exists();
        if is_file {
            Ok(Source::File(PcapFileReader::open(&options.source)?))
        } else {
            Ok(Source::Nic(NicReader::open(options)?))
        }
    }

    /// Pull the next frame into `buffer`.
    ///
    /// On [`ReadStatus::Ok`] the payload occupies the first
    /// `len_capture` bytes of `buffer` (capped to the buffer size; the
    /// record lengths are never adjusted to hide capture truncation).
    pub fn next(&mut self, buffer: &mut [u8]) -> RawRecord {
        match self {
            Source::File(reader) => reader.next(buffer),
            Source::Nic(reader) => reader.next(buffer),
        }
    }

    /// Short name of the source variant, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Source::File(_) => "pcap",
            Source::Nic(_) => "nic",
        }
    }
}
