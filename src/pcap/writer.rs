//! Capture-file writer.

use std::fs::File;
use std::io::{self, BufWriter, Write};

use super::{
    LINKTYPE_ETHERNET, MAGIC_MICROS, MAGIC_NANOS, SNAPLEN, VERSION_MAJOR, VERSION_MINOR,
};
use crate::error::{Error, SinkError};
use crate::time::PsTime;

/// Writer for classic capture files.
///
/// The global header is written on create. Record headers are emitted
/// in host byte order, which is what the recorded magic advertises.
pub struct PcapFileWriter {
    out: BufWriter<File>,
    micros: bool,
}

impl PcapFileWriter {
    /// Create (truncate) a capture file and write its global header.
    pub fn create(path: &str, micros: bool) -> Result<Self, Error> {
        let file = File::create(path).map_err(|_| {
            Error::Sink(SinkError::Create {
                path: path.to_string(),
            })
        })?;
        let mut out = BufWriter::new(file);

        let magic = if micros { MAGIC_MICROS } else { MAGIC_NANOS };
        out.write_all(&magic.to_ne_bytes())?;
        out.write_all(&VERSION_MAJOR.to_ne_bytes())?;
        out.write_all(&VERSION_MINOR.to_ne_bytes())?;
        out.write_all(&0i32.to_ne_bytes())?; // thiszone
        out.write_all(&0u32.to_ne_bytes())?; // sigfigs
        out.write_all(&SNAPLEN.to_ne_bytes())?;
        out.write_all(&u32::from(LINKTYPE_ETHERNET).to_ne_bytes())?;

        Ok(Self { out, micros })
    }

    /// Append one frame with the given hardware time.
    pub fn write_record(
        &mut self,
        hw_time: &PsTime,
        len_capture: u32,
        len_orig: u32,
        payload: &[u8],
    ) -> io::Result<()> {
        let mut frac = hw_time.psec / 1_000; // nanoseconds
        if self.micros {
            frac /= 1_000;
        }
        self.out.write_all(&(hw_time.sec as u32).to_ne_bytes())?;
        self.out.write_all(&(frac as u32).to_ne_bytes())?;
        self.out.write_all(&len_capture.to_ne_bytes())?;
        self.out.write_all(&len_orig.to_ne_bytes())?;
        self.out.write_all(&payload[..len_capture as usize])?;
        Ok(())
    }

    /// Flush buffered output to the file.
    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}
