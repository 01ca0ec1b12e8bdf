//! Offline capture-file reader.

use std::fs::File;
use std::io::BufReader;

use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError};

use super::{LINKTYPE_ETHERNET, MAGIC_MICROS, MAGIC_NANOS, VERSION_MAJOR, VERSION_MINOR};
use crate::error::{Error, SourceError};
use crate::source::{RawRecord, ReadStatus};
use crate::time::PsTime;

/// Buffer size for the underlying parser; a maximum-length frame plus
/// its record header must fit.
const PARSE_BUFFER_SIZE: usize = 128 * 1024;

/// Reader for classic (legacy) capture files.
///
/// Validates the global header on open: version 2.4, Ethernet link
/// type, micro- or nanosecond magic. The magic fixes the per-file
/// fractional unit used to build each record's clock time.
pub struct PcapFileReader {
    reader: LegacyPcapReader<BufReader<File>>,
    nanos: bool,
}

impl PcapFileReader {
    /// Open and validate a capture file.
    pub fn open(path: &str) -> Result<Self, Error> {
        let file = File::open(path).map_err(|_| {
            Error::Source(SourceError::FileOpen {
                path: path.to_string(),
            })
        })?;

        let reader = LegacyPcapReader::new(PARSE_BUFFER_SIZE, BufReader::new(file))
            .map_err(|e| {
                Error::Source(SourceError::InvalidFormat {
                    reason: format!("could not read capture header: {e}"),
                })
            })?;

        let mut this = Self {
            reader,
            nanos: false,
        };
        this.read_header()?;
        Ok(this)
    }

    /// Pump the parser until the global header block shows up, then
    /// validate it.
    fn read_header(&mut self) -> Result<(), Error> {
        loop {
            match self.reader.next() {
                Ok((offset, block)) => {
                    if let PcapBlockOwned::LegacyHeader(header) = block {
                        if header.version_major != VERSION_MAJOR
                            || header.version_minor != VERSION_MINOR
                        {
                            return Err(Error::Source(SourceError::UnsupportedVersion {
                                major: header.version_major,
                                minor: header.version_minor,
                            }));
                        }
                        if header.network.0 != LINKTYPE_ETHERNET as i32 {
                            return Err(Error::Source(SourceError::UnsupportedLinkType {
                                link_type: header.network.0 as u16,
                            }));
                        }
                        // Accept both byte orders of each magic; the
                        // parser already normalized record endianness.
                        self.nanos = match header.magic_number {
                            MAGIC_NANOS => true,
                            m if m == MAGIC_NANOS.swap_bytes() => true,
                            MAGIC_MICROS => false,
                            m if m == MAGIC_MICROS.swap_bytes() => false,
                            magic => {
                                return Err(Error::Source(SourceError::UnsupportedMagic {
                                    magic,
                                }))
                            }
                        };
                        self.reader.consume(offset);
                        return Ok(());
                    }
                    self.reader.consume(offset);
                }
                Err(PcapError::Incomplete) => {
                    self.reader.refill().map_err(|e| {
                        Error::Source(SourceError::InvalidFormat {
                            reason: format!("refill error: {e}"),
                        })
                    })?;
                }
                Err(e) => {
                    return Err(Error::Source(SourceError::InvalidFormat {
                        reason: format!("could not read capture header: {e}"),
                    }))
                }
            }
        }
    }

    /// Read the next frame into `buffer`.
    pub fn next(&mut self, buffer: &mut [u8]) -> RawRecord {
        loop {
            match self.reader.next() {
                Ok((offset, block)) => match block {
                    PcapBlockOwned::Legacy(frame) => {
                        let clock_time = if self.nanos {
                            PsTime::new(frame.ts_sec as i64, frame.ts_usec as u64 * 1_000, 9)
                        } else {
                            PsTime::new(frame.ts_sec as i64, frame.ts_usec as u64 * 1_000_000, 6)
                        };

                        let record = RawRecord {
                            status: ReadStatus::Ok,
                            link_type: LINKTYPE_ETHERNET,
                            len_capture: frame.caplen,
                            len_orig: frame.origlen,
                            clock_time,
                            is_real_time: false,
                        };

                        let copy = (frame.caplen as usize)
                            .min(frame.data.len())
                            .min(buffer.len());
                        buffer[..copy].copy_from_slice(&frame.data[..copy]);

                        self.reader.consume(offset);
                        return record;
                    }
                    _ => {
                        self.reader.consume(offset);
                    }
                },
                Err(PcapError::Eof) => return RawRecord::status_only(ReadStatus::Eof),
                Err(PcapError::Incomplete) => {
                    if self.reader.refill().is_err() {
                        return RawRecord::status_only(ReadStatus::Error);
                    }
                }
                Err(e) => {
                    tracing::debug!("capture parse error: {e}");
                    return RawRecord::status_only(ReadStatus::Error);
                }
            }
        }
    }
}
