//! Capture-file sink.

use super::{WriteOptions, WriteOutcome};
use crate::error::Error;
use crate::pcap::PcapFileWriter;
use crate::process::ComputedTime;
use crate::source::RawRecord;

/// Writes retimed frames back out as a capture file.
pub struct PcapSink {
    writer: PcapFileWriter,
    write_keyframes: bool,
}

impl PcapSink {
    /// Create the destination file and write its global header.
    pub fn create(options: &WriteOptions) -> Result<Self, Error> {
        Ok(Self {
            writer: PcapFileWriter::create(&options.dest, options.write_micros)?,
            write_keyframes: options.write_keyframes,
        })
    }

    /// Write one frame with its hardware time as the record time.
    ///
    /// Keyframes are suppressed unless configured otherwise; frames
    /// without a usable hardware time are silently dropped.
    pub fn write(
        &mut self,
        timed: &ComputedTime,
        record: &RawRecord,
        buffer: &[u8],
    ) -> Result<WriteOutcome, Error> {
        if timed.is_keyframe && !self.write_keyframes {
            return Ok(WriteOutcome::Skipped);
        }
        if !timed.hw_time.is_set() {
            return Ok(WriteOutcome::Skipped);
        }

        self.writer
            .write_record(&timed.hw_time, record.len_capture, record.len_orig, buffer)?;
        Ok(WriteOutcome::Written)
    }

    /// Flush buffered output.
    pub fn flush(&mut self) -> Result<(), Error> {
        self.writer.flush()?;
        Ok(())
    }
}
