//! The pull loop tying source, processor and sink together.
//!
//! One scratch buffer is allocated up front and lent to each stage in
//! turn; records flow through it one at a time. Fatal statuses end the
//! loop with a specific exit code, recoverable ones skip the record.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::process::{Processor, Status};
use crate::sink::{dump_frame, Sink, WriteOutcome};
use crate::source::{ReadStatus, Source};

/// Scratch buffer size: the largest possible frame plus headroom for
/// appended timestamps and trailers.
pub const BUFFER_LEN: usize = 0x10080;

/// A failure that ends the run, with its process exit code.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("problem reading record #{record}")]
    Read { record: u64 },

    #[error("overflow when reading record #{record}")]
    Overflow { record: u64 },

    #[error("unrecoverable error processing record #{record} ({bytes} bytes): {status}")]
    Process {
        record: u64,
        bytes: u32,
        status: &'static str,
    },

    #[error("unrecoverable write error: {0}")]
    Write(#[from] crate::error::Error),
}

impl RunError {
    /// Process exit code for this failure (reader 2, processing 3,
    /// write fault 4; initialisation failures exit 1 before the loop).
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::Read { .. } | RunError::Overflow { .. } => 2,
            RunError::Process { .. } => 3,
            RunError::Write(_) => 4,
        }
    }
}

/// Counters reported when the loop ends.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunStats {
    pub packets_in: u64,
    pub packets_out: u64,
    pub keyframes: u64,
    pub errors: u64,
}

/// Loop configuration.
#[derive(Debug, Default, Clone)]
pub struct RunOptions {
    /// Stop after this many written records; 0 means run to the end.
    pub count: u64,
    /// Emit records whose timestamp was not found, carrying their
    /// capture clock time instead.
    pub write_all: bool,
    /// Cumulative verbosity; ≥3 hex-dumps rejected records.
    pub verbose: u8,
}

/// Pull records from `source` through `processor` into `sink` until
/// EOF, a fatal condition, the record limit, or the stop flag.
pub fn run(
    source: &mut Source,
    processor: &mut Processor,
    sink: &mut Sink,
    options: &RunOptions,
    stop: &AtomicBool,
) -> Result<RunStats, RunError> {
    let mut buffer = vec![0u8; BUFFER_LEN];
    let mut stats = RunStats::default();

    while !stop.load(Ordering::Relaxed) {
        let record = source.next(&mut buffer);
        match record.status {
            ReadStatus::Again => continue,
            ReadStatus::Eof => break,
            ReadStatus::Error => {
                stats.errors += 1;
                return Err(RunError::Read {
                    record: stats.packets_in + 1,
                });
            }
            ReadStatus::Overflow => {
                stats.errors += 1;
                return Err(RunError::Overflow {
                    record: stats.packets_in + 1,
                });
            }
            ReadStatus::Ok => {}
        }
        stats.packets_in += 1;

        let mut timed = processor.process(&record, &mut buffer);
        let payload_len = (record.len_capture as usize).min(buffer.len());

        if timed.status.is_fatal() {
            stats.errors += 1;
            if options.verbose > 0 {
                let _ = dump_frame(&mut io::stderr(), &buffer[..payload_len]);
            }
            return Err(RunError::Process {
                record: stats.packets_in,
                bytes: record.len_capture,
                status: timed.status.as_str(),
            });
        }

        // --all lets untimed records through with their capture clock
        let emit_with_clock = options.write_all && timed.status == Status::RecordTimeMissing;
        if timed.status.is_recoverable() && !emit_with_clock {
            stats.errors += 1;
            tracing::debug!(
                "recoverable problem processing record #{} ({} bytes): {}",
                stats.packets_in,
                record.len_capture,
                timed.status
            );
            if options.verbose > 2 {
                let _ = dump_frame(&mut io::stderr(), &buffer[..payload_len]);
            }
            continue;
        }
        if emit_with_clock {
            timed.hw_time = record.clock_time;
        }

        if timed.is_keyframe {
            stats.keyframes += 1;
        }

        match sink.write(&timed, &record, &buffer)? {
            WriteOutcome::Written => {
                stats.packets_out += 1;
                if options.count != 0 && stats.packets_out == options.count {
                    break;
                }
            }
            WriteOutcome::Skipped => {}
        }
    }

    sink.flush()?;
    Ok(stats)
}
