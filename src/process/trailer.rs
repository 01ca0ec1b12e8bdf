//! Trailer timestamps appended after the frame payload.
//!
//! Layout, measured from the start of the trailer: the original FCS
//! (4 bytes), device id, port, big-endian seconds since the epoch
//! (4 bytes), a 40-bit fixed-point fraction scaled by 2^-40, and one
//! reserved byte. The trailer sits either 16 bytes from the end of the
//! frame or 20 when a further FCS/padding word follows it.

use super::be32;
use crate::time::PSEC_PER_SEC;

/// Trailer size in bytes.
pub const TRAILER_LEN: usize = 16;

/// Accepted seconds drift between a trailer and the reference clock
/// when locating the trailer (±1 week).
pub const SANITY_WINDOW_SECS: i64 = 7 * 24 * 3600;

const SEC_OFFSET: usize = 6;
const FRAC_OFFSET: usize = 10;

/// A decoded trailer timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    pub device_id: u8,
    pub port: u8,
    /// Seconds since the Unix epoch.
    pub sec: u32,
    /// Fraction of a second in picoseconds.
    pub psec: u64,
}

/// Decode the trailer starting `offset` bytes from the end of `frame`.
///
/// Returns `None` when the frame cannot hold a trailer at that offset.
pub fn parse(frame: &[u8], offset: usize) -> Option<Trailer> {
    if offset < TRAILER_LEN || frame.len() < offset {
        return None;
    }
    let trailer = &frame[frame.len() - offset..];

    let frac = {
        let b = &trailer[FRAC_OFFSET..FRAC_OFFSET + 5];
        (u64::from(b[0]) << 32)
            | (u64::from(b[1]) << 24)
            | (u64::from(b[2]) << 16)
            | (u64::from(b[3]) << 8)
            | u64::from(b[4])
    };

    Some(Trailer {
        device_id: trailer[4],
        port: trailer[5],
        sec: be32(&trailer[SEC_OFFSET..SEC_OFFSET + 4]),
        // 40-bit fixed point, rounded to picoseconds
        psec: ((frac as u128 * PSEC_PER_SEC as u128 + (1u128 << 39)) >> 40) as u64,
    })
}
