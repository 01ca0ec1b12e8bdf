//! Text sink: one formatted line per record, optional frame dump.

use std::fmt::Write as FmtWrite;
use std::fs::File;
use std::io::{self, BufWriter, Write};

use chrono::format::{Item, StrftimeItems};
use chrono::{Local, TimeZone};

use super::{WriteOptions, WriteOutcome};
use crate::error::{Error, SinkError};
use crate::process::ComputedTime;
use crate::source::RawRecord;
use crate::time::PsTime;

/// Writes one human-readable line per record: formatted hardware time,
/// optionally the capture clock time and their difference, the device
/// and port when the timestamp carried them, and the frame length.
pub struct TextSink {
    out: Box<dyn Write>,
    date_format: String,
    write_keyframes: bool,
    write_clock_times: bool,
    write_payload: bool,
}

impl TextSink {
    /// Open the destination (`-` is stdout) and validate the date
    /// pattern.
    pub fn create(options: &WriteOptions) -> Result<Self, Error> {
        if StrftimeItems::new(&options.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(Error::Sink(SinkError::InvalidDateFormat {
                pattern: options.date_format.clone(),
            }));
        }

        let out: Box<dyn Write> = if options.dest == "-" {
            Box::new(io::stdout())
        } else {
            let file = File::create(&options.dest).map_err(|_| {
                Error::Sink(SinkError::Create {
                    path: options.dest.clone(),
                })
            })?;
            Box::new(BufWriter::new(file))
        };

        Ok(Self {
            out,
            date_format: options.date_format.clone(),
            write_keyframes: options.write_keyframes,
            write_clock_times: options.write_clock_times,
            write_payload: options.write_payload,
        })
    }

    /// Write one record line (plus dump when configured).
    pub fn write(
        &mut self,
        timed: &ComputedTime,
        record: &RawRecord,
        buffer: &[u8],
    ) -> Result<WriteOutcome, Error> {
        if timed.is_keyframe && !self.write_keyframes {
            return Ok(WriteOutcome::Skipped);
        }

        let mut line = String::new();
        format_time(&mut line, &timed.hw_time, &self.date_format);

        if self.write_clock_times {
            line.push_str("  (");
            format_time(&mut line, &record.clock_time, &self.date_format);
            if timed.hw_time.is_set() && record.clock_time.is_set() {
                let diff = timed.hw_time - record.clock_time;
                let _ = write!(
                    line,
                    " {:+.precision$}",
                    diff.as_secs_f64(),
                    precision = diff.precision as usize
                );
            }
            line.push(')');
        }

        if let (Some(device_id), Some(port)) = (timed.device_id, timed.port) {
            let _ = write!(line, "  ({device_id:03}:{port:03})");
        }

        let _ = write!(line, " {:5} bytes", record.len_capture);

        writeln!(self.out, "{line}")?;
        if self.write_payload {
            let len = (record.len_capture as usize).min(buffer.len());
            dump_frame(&mut self.out, &buffer[..len])?;
        }
        self.out.flush()?;

        Ok(WriteOutcome::Written)
    }

    /// Flush buffered output.
    pub fn flush(&mut self) -> Result<(), Error> {
        self.out.flush()?;
        Ok(())
    }
}

/// Format `time` into `out`: strftime seconds, then the fraction at
/// the time's own precision (zero-padded, right-truncated).
fn format_time(out: &mut String, time: &PsTime, pattern: &str) {
    match Local.timestamp_opt(time.sec, 0).single() {
        Some(local) => {
            let _ = write!(out, "{}", local.format_with_items(StrftimeItems::new(pattern)));
        }
        // out-of-range for the calendar; show raw seconds
        None => {
            let _ = write!(out, "{}", time.sec);
        }
    }
    let _ = write!(
        out,
        ".{:0width$}",
        time.frac(),
        width = time.precision as usize
    );
}

/// Classic hex/ASCII dump: 16 bytes per row in 4-byte groups, with a
/// printable-character column.
pub fn dump_frame<W: Write>(out: &mut W, data: &[u8]) -> io::Result<()> {
    for (row_index, row) in data.chunks(16).enumerate() {
        write!(out, "    {:04x}:", row_index * 16)?;
        for k in 0..16 {
            if k % 4 == 0 {
                write!(out, " ")?;
            }
            match row.get(k) {
                Some(byte) => write!(out, "{byte:02x}")?,
                None => write!(out, "  ")?,
            }
        }
        write!(out, " ")?;
        for (k, byte) in row.iter().enumerate() {
            if k % 8 == 0 {
                write!(out, " ")?;
            }
            let c = *byte as char;
            if c.is_ascii_graphic() || c == ' ' {
                write!(out, "{c}")?;
            } else {
                write!(out, ".")?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}
