//! Keyframe layouts and the calibration state they feed.
//!
//! A keyframe binds the device's free-running tick counter to a UTC
//! nanosecond value. Two wire layouts exist: the native 40-byte record
//! and a 62-byte Arista-compatible one. Both ride either directly
//! behind the Ethernet header (native only) or inside a fixed IPv4
//! broadcast envelope. All multi-byte fields are big-endian except the
//! native magic, which is an ASCII tag.

use super::be64;
use crate::time::PsTime;

/// EtherType carrying a native keyframe directly after the Ethernet
/// header.
pub const NATIVE_ETHER_TYPE: u16 = 0x88B5;

/// IP protocol number of the keyframe transport envelope.
pub const ENVELOPE_PROTO: u8 = 253;

/// TTL required of the keyframe envelope.
pub const ENVELOPE_TTL: u8 = 64;

/// Native keyframe payload size in bytes.
pub const NATIVE_LEN: usize = 40;

/// Arista-compatible keyframe payload size in bytes.
pub const COMPAT_LEN: usize = 62;

/// Native keyframe magic, ASCII "EXKF" read little-endian.
pub const NATIVE_MAGIC: u32 = 0x464B_5845;

/// Tick rate assumed until a keyframe advertises one.
pub const DEFAULT_FREQ_HZ: u64 = 350_000_000;

/// Calibration state derived from the most recent keyframe.
///
/// Replaced wholesale on every accepted keyframe; the initial state is
/// unset (all zero, default frequency) and fails the freshness check
/// until the first keyframe arrives.
#[derive(Debug, Clone)]
pub struct Calibration {
    /// UTC nanoseconds at keyframe emission.
    pub utc_nanos: u64,
    /// Device tick counter at that instant.
    pub counter: u64,
    /// Device tick rate in Hz.
    pub freq: u64,
    /// Clock time at which the keyframe was observed.
    pub clock_time: PsTime,
    /// Selects the 31-bit tick arithmetic variant.
    pub arista_compat: bool,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            utc_nanos: 0,
            counter: 0,
            freq: DEFAULT_FREQ_HZ,
            clock_time: PsTime::UNSET,
            arista_compat: false,
        }
    }
}

/// Fields of an accepted keyframe, ready to replace the calibration.
#[derive(Debug, Clone, Copy)]
pub struct KeyframeUpdate {
    pub utc_nanos: u64,
    pub counter: u64,
    pub freq: u64,
    pub arista_compat: bool,
}

/// Parse a native keyframe payload.
///
/// Accepts version 1 with the "EXKF" magic, plus the legacy
/// version-0/magic-1 variant seen from early firmware. Returns `None`
/// for anything else.
pub fn parse_native(payload: &[u8]) -> Option<KeyframeUpdate> {
    if payload.len() < NATIVE_LEN {
        return None;
    }
    let magic = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let version = payload[4];
    if !((version == 1 && magic == NATIVE_MAGIC) || (version == 0 && magic == 1)) {
        return None;
    }

    let freq = be64(&payload[24..32]);
    Some(KeyframeUpdate {
        utc_nanos: be64(&payload[8..16]),
        counter: be64(&payload[16..24]),
        // a zero rate would make every tick conversion divide by zero
        freq: if freq == 0 { DEFAULT_FREQ_HZ } else { freq },
        arista_compat: false,
    })
}

/// Parse an Arista-compatible keyframe payload.
///
/// Only unity skew (num = denom = 1) is usable; anything else is
/// rejected. The ASIC time field takes the place of the tick counter
/// and the tick rate stays at the default.
pub fn parse_compat(payload: &[u8]) -> Option<KeyframeUpdate> {
    if payload.len() < COMPAT_LEN {
        return None;
    }
    let skew_num = be64(&payload[24..32]);
    let skew_denom = be64(&payload[32..40]);
    if skew_num != 1 || skew_denom != 1 {
        return None;
    }

    Some(KeyframeUpdate {
        utc_nanos: be64(&payload[8..16]),
        counter: be64(&payload[0..8]),
        freq: DEFAULT_FREQ_HZ,
        arista_compat: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn native_payload() -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"EXKF");
        payload.push(1); // version
        payload.extend_from_slice(&[0; 3]);
        payload.extend_from_slice(&0x64FD_D200u64.to_be_bytes()); // utc
        payload.extend_from_slice(&0x0ABC_DEF0u64.to_be_bytes()); // counter
        payload.extend_from_slice(&350_000_000u64.to_be_bytes()); // freq
        payload.extend_from_slice(&0u64.to_be_bytes()); // last sync
        payload
    }

    #[test]
    fn test_parse_native() {
        let update = parse_native(&native_payload()).expect("keyframe accepted");
        assert_eq!(update.utc_nanos, 0x64FD_D200);
        assert_eq!(update.counter, 0x0ABC_DEF0);
        assert_eq!(update.freq, 350_000_000);
        assert!(!update.arista_compat);
    }

    #[test]
    fn test_parse_native_rejects_bad_magic() {
        let mut payload = native_payload();
        payload[0] = b'X';
        assert!(parse_native(&payload).is_none());
    }

    #[test]
    fn test_parse_native_legacy_variant() {
        let mut payload = native_payload();
        payload[0..4].copy_from_slice(&1u32.to_le_bytes());
        payload[4] = 0;
        assert!(parse_native(&payload).is_some());
        // version 0 with the regular magic is not a thing
        let mut payload = native_payload();
        payload[4] = 0;
        assert!(parse_native(&payload).is_none());
    }

    #[test]
    fn test_parse_native_zero_freq_falls_back() {
        let mut payload = native_payload();
        payload[24..32].copy_from_slice(&0u64.to_be_bytes());
        let update = parse_native(&payload).unwrap();
        assert_eq!(update.freq, DEFAULT_FREQ_HZ);
    }

    fn compat_payload(skew_num: u64, skew_denom: u64) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&0x1234_5678u64.to_be_bytes()); // asic time
        payload.extend_from_slice(&0x64FD_D200u64.to_be_bytes()); // utc
        payload.extend_from_slice(&0u64.to_be_bytes()); // last sync
        payload.extend_from_slice(&skew_num.to_be_bytes());
        payload.extend_from_slice(&skew_denom.to_be_bytes());
        payload.extend_from_slice(&0u64.to_be_bytes()); // timestamp
        payload.extend_from_slice(&0u64.to_be_bytes()); // drop count
        payload.extend_from_slice(&3u16.to_be_bytes()); // device id
        payload.extend_from_slice(&9u16.to_be_bytes()); // egress port
        payload.push(0); // fcs type
        payload.push(0); // reserved
        payload
    }

    #[test]
    fn test_parse_compat_unity_skew() {
        let update = parse_compat(&compat_payload(1, 1)).expect("keyframe accepted");
        assert_eq!(update.counter, 0x1234_5678);
        assert_eq!(update.utc_nanos, 0x64FD_D200);
        assert!(update.arista_compat);
        assert_eq!(update.freq, DEFAULT_FREQ_HZ);
    }

    #[test]
    fn test_parse_compat_rejects_skew() {
        assert!(parse_compat(&compat_payload(2, 1)).is_none());
        assert!(parse_compat(&compat_payload(1, 3)).is_none());
    }

}
