//! Classic capture-file format support.
//!
//! Reading goes through `pcap_parser`; writing is done by hand since
//! the parser crate is read-only. Record headers are host-endian per
//! the file's magic, matching what every other capture tool emits.

mod reader;
mod writer;

pub use reader::PcapFileReader;
pub use writer::PcapFileWriter;

/// Magic for microsecond-resolution capture files.
pub const MAGIC_MICROS: u32 = 0xA1B2_C3D4;

/// Magic for nanosecond-resolution capture files.
pub const MAGIC_NANOS: u32 = 0xA1B2_3C4D;

/// Link type constant for Ethernet (DLT_EN10MB).
pub const LINKTYPE_ETHERNET: u16 = 1;

/// Capture format version we read and write.
pub const VERSION_MAJOR: u16 = 2;
pub const VERSION_MINOR: u16 = 4;

/// Snap length advertised in written file headers.
pub const SNAPLEN: u32 = 0xFFFF;
