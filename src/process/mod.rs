//! The stateful timestamp-reconstruction engine.
//!
//! The processor consumes one record at a time, absorbs keyframes into
//! its calibration state, and converts each data frame's embedded
//! timestamp into an absolute hardware time. Timestamps come in two
//! layouts: a 32-bit tick counter near the end of the frame, or a
//! 16-byte trailer. `Auto` mode infers both the layout and the exact
//! byte offset from the first frames it sees, then latches.
//!
//! The only buffer mutation the processor ever performs is the 4-byte
//! FCS rewrite at the end of a frame whose tick overwrote the FCS.

pub mod keyframe;
pub mod trailer;

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use etherparse::{Ethernet2HeaderSlice, Ipv4HeaderSlice};

use crate::fcs;
use crate::pcap::LINKTYPE_ETHERNET;
use crate::source::RawRecord;
use crate::time::{PsTime, NANOS_PER_SEC};

use self::keyframe::{Calibration, KeyframeUpdate};

/// Ethernet header size in bytes.
const ETH_HEADER_LEN: usize = 14;

/// IPv4 header size without options.
const IPV4_HEADER_LEN: usize = 20;

/// Calibration older than this cannot time a frame (keyframes are
/// published every second; five missed ones means the stream is dead).
const MAX_KEYFRAME_AGE_NS: i64 = 5 * NANOS_PER_SEC as i64;

/// Tolerance of the offset heuristic against the capture clock.
const OFFSET_TOLERANCE_NS: i64 = 10_000_000;

/// Outcome classification for one processed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Hardware time (or keyframe) extracted.
    Ok,
    /// Keyframe slot with an unusable layout; the stream cannot be
    /// timed.
    UnsupportedKeyframe,
    /// Not an Ethernet capture.
    UnsupportedLinktype,
    /// Frame too short to carry what we need.
    RecordTooShort,
    /// Captured length below wire length; the timestamp bytes at the
    /// tail are gone.
    RecordTruncated,
    /// The tick field held the reserved zero sentinel.
    RecordTimeZero,
    /// No timestamp found (offset heuristic failed).
    RecordTimeMissing,
    /// Calibration absent or older than the staleness window.
    MissingRecentKeyframe,
}

impl Status {
    /// Fatal statuses end the stream.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Status::UnsupportedKeyframe | Status::UnsupportedLinktype)
    }

    /// Recoverable statuses skip the record and continue.
    pub fn is_recoverable(&self) -> bool {
        !self.is_fatal() && !matches!(self, Status::Ok)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::UnsupportedKeyframe => "unsupported_keyframe",
            Status::UnsupportedLinktype => "unsupported_linktype",
            Status::RecordTooShort => "record_too_short",
            Status::RecordTruncated => "record_truncated",
            Status::RecordTimeZero => "record_time_zero",
            Status::RecordTimeMissing => "record_time_missing",
            Status::MissingRecentKeyframe => "missing_recent_keyframe",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamp layout selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFormat {
    /// Infer layout and offset from the first frames, then latch.
    Auto,
    /// 32-bit tick at 4 or 8 bytes from the end.
    Bits32,
    /// 16-byte trailer at 16 or 20 bytes from the end.
    Trailer,
}

/// Processor construction options.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub format: TimestampFormat,
    /// Explicit timestamp offset from the end of the frame (4, 8, 16
    /// or 20); `None` enables the per-layout heuristic.
    pub offset: Option<usize>,
    /// Rewrite the FCS of frames whose tick overwrote it.
    pub fix_fcs: bool,
    /// Report capture clock times instead of extracting hardware time.
    pub use_clock_times: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            format: TimestampFormat::Auto,
            offset: None,
            fix_fcs: true,
            use_clock_times: false,
        }
    }
}

/// Result of processing one record.
#[derive(Debug, Clone, Copy)]
pub struct ComputedTime {
    pub status: Status,
    pub is_keyframe: bool,
    /// The FCS was recomputed and written back into the buffer.
    pub fixed_fcs: bool,
    pub hw_time: PsTime,
    /// Present only for trailer-format timestamps.
    pub device_id: Option<u8>,
    pub port: Option<u8>,
}

impl ComputedTime {
    fn status(status: Status) -> Self {
        Self {
            status,
            is_keyframe: false,
            fixed_fcs: false,
            hw_time: PsTime::UNSET,
            device_id: None,
            port: None,
        }
    }
}

enum KeyframeOutcome {
    Accepted(ComputedTime),
    Rejected,
    NotKeyframe,
}

/// The timestamp-reconstruction engine. One instance per stream.
pub struct Processor {
    options: ProcessOptions,
    calibration: Calibration,
    mode: TimestampFormat,
    offset: Option<usize>,
}

impl Processor {
    pub fn new(options: ProcessOptions) -> Self {
        let mode = options.format;
        let offset = options.offset;
        Self {
            options,
            calibration: Calibration::default(),
            mode,
            offset,
        }
    }

    /// The currently effective timestamp layout (`Auto` until latched).
    pub fn mode(&self) -> TimestampFormat {
        self.mode
    }

    /// The latched timestamp offset from the end of the frame, if any.
    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    /// Process one record whose payload sits at the start of `buffer`.
    ///
    /// May rewrite the final 4 bytes of the frame (FCS repair); no
    /// other part of the buffer is ever touched.
    pub fn process(&mut self, record: &RawRecord, buffer: &mut [u8]) -> ComputedTime {
        // only deal with ethernet frames
        if record.link_type != LINKTYPE_ETHERNET {
            return ComputedTime::status(Status::UnsupportedLinktype);
        }
        if (record.len_capture as usize) < ETH_HEADER_LEN {
            return ComputedTime::status(Status::RecordTooShort);
        }
        // timestamps live at the tail, so the whole frame is required
        if record.is_truncated() || record.len_capture as usize > buffer.len() {
            return ComputedTime::status(Status::RecordTruncated);
        }
        let len = record.len_capture as usize;

        // a latched trailer stream has no keyframes to look for
        if self.mode != TimestampFormat::Trailer {
            match self.try_keyframe(record, &buffer[..len]) {
                KeyframeOutcome::Accepted(result) => {
                    if self.mode == TimestampFormat::Auto {
                        self.mode = TimestampFormat::Bits32;
                    }
                    return result;
                }
                KeyframeOutcome::Rejected => {
                    return ComputedTime::status(Status::UnsupportedKeyframe)
                }
                KeyframeOutcome::NotKeyframe => {}
            }
        }

        if self.options.use_clock_times {
            let mut result = ComputedTime::status(Status::Ok);
            result.hw_time = record.clock_time;
            return result;
        }

        match self.mode {
            TimestampFormat::Trailer => self.process_trailer(record, &buffer[..len]),
            TimestampFormat::Bits32 => self.process_32bit(record, buffer, len),
            TimestampFormat::Auto => {
                let timed = self.process_trailer(record, &buffer[..len]);
                if timed.status == Status::Ok {
                    self.mode = TimestampFormat::Trailer;
                    return timed;
                }
                let timed = self.process_32bit(record, buffer, len);
                if timed.status == Status::Ok {
                    self.mode = TimestampFormat::Bits32;
                }
                timed
            }
        }
    }

    /// Recognize and absorb a keyframe.
    ///
    /// Native keyframes arrive either under their own EtherType or in
    /// an IPv4 envelope (proto 253, TTL 64, 0.0.0.0 to broadcast) whose
    /// payload length selects the native or compat layout.
    fn try_keyframe(&mut self, record: &RawRecord, frame: &[u8]) -> KeyframeOutcome {
        let Ok(eth) = Ethernet2HeaderSlice::from_slice(frame) else {
            return KeyframeOutcome::NotKeyframe;
        };
        let ether_type = eth.ether_type().0;

        if ether_type == keyframe::NATIVE_ETHER_TYPE {
            return match keyframe::parse_native(&frame[ETH_HEADER_LEN..]) {
                Some(update) => KeyframeOutcome::Accepted(self.apply_keyframe(record, update)),
                None => KeyframeOutcome::Rejected,
            };
        }

        // ip v4 packet starts with version info equating to 0x45
        if ether_type == 0x0800
            && frame.len() >= ETH_HEADER_LEN + IPV4_HEADER_LEN
            && frame[ETH_HEADER_LEN] == 0x45
        {
            let Ok(ip) = Ipv4HeaderSlice::from_slice(&frame[ETH_HEADER_LEN..]) else {
                return KeyframeOutcome::NotKeyframe;
            };
            if ip.protocol().0 == keyframe::ENVELOPE_PROTO
                && ip.ttl() == keyframe::ENVELOPE_TTL
                && ip.source() == [0, 0, 0, 0]
                && ip.destination() == [255, 255, 255, 255]
            {
                let payload_len = (ip.total_len() as usize).saturating_sub(IPV4_HEADER_LEN);
                let payload = &frame[ETH_HEADER_LEN + IPV4_HEADER_LEN..];
                if payload_len == keyframe::NATIVE_LEN && payload.len() >= keyframe::NATIVE_LEN {
                    return match keyframe::parse_native(payload) {
                        Some(update) => {
                            KeyframeOutcome::Accepted(self.apply_keyframe(record, update))
                        }
                        None => KeyframeOutcome::Rejected,
                    };
                }
                if payload_len == keyframe::COMPAT_LEN && payload.len() >= keyframe::COMPAT_LEN {
                    return match keyframe::parse_compat(payload) {
                        Some(update) => {
                            KeyframeOutcome::Accepted(self.apply_keyframe(record, update))
                        }
                        None => KeyframeOutcome::Rejected,
                    };
                }
                // other sizes are ordinary traffic to this address
            }
        }

        KeyframeOutcome::NotKeyframe
    }

    /// Replace the calibration and report the keyframe's own UTC time.
    fn apply_keyframe(&mut self, record: &RawRecord, update: KeyframeUpdate) -> ComputedTime {
        self.calibration = Calibration {
            utc_nanos: update.utc_nanos,
            counter: update.counter,
            freq: update.freq,
            clock_time: record.clock_time,
            arista_compat: update.arista_compat,
        };

        let mut result = ComputedTime::status(Status::Ok);
        result.is_keyframe = true;
        result.hw_time = PsTime::from_nanos(update.utc_nanos);
        result
    }

    fn process_32bit(
        &mut self,
        record: &RawRecord,
        buffer: &mut [u8],
        len: usize,
    ) -> ComputedTime {
        // keyframes are observed in clock time, so staleness is too
        let age_ns = (record.clock_time - self.calibration.clock_time).nanos();
        if age_ns > MAX_KEYFRAME_AGE_NS {
            return ComputedTime::status(Status::MissingRecentKeyframe);
        }

        let offset = match self.offset {
            Some(offset) if offset == 4 || offset == 8 => offset,
            Some(_) => return ComputedTime::status(Status::RecordTimeMissing),
            None => match self.detect_offset_32(record, &buffer[..len]) {
                Some(offset) => {
                    tracing::debug!("latched 32-bit timestamp offset {offset}");
                    self.offset = Some(offset);
                    offset
                }
                None => return ComputedTime::status(Status::RecordTimeMissing),
            },
        };

        let tick = be32(&buffer[len - offset..]);
        if tick == 0 {
            // the device reserves zero; it never appears as a tick
            return ComputedTime::status(Status::RecordTimeZero);
        }

        let delta = self.delta_ticks(tick);
        let nanos = self
            .calibration
            .utc_nanos
            .wrapping_add(ticks_to_nanos(delta, self.calibration.freq));

        let mut result = ComputedTime::status(Status::Ok);
        result.hw_time = PsTime::from_nanos(nanos);

        // offset 4 means the tick overwrote the FCS; repair it in place
        if offset == 4 && self.options.fix_fcs {
            let correct = fcs::crc32(&buffer[..len - 4]);
            let current = u32::from_le_bytes([
                buffer[len - 4],
                buffer[len - 3],
                buffer[len - 2],
                buffer[len - 1],
            ]);
            if correct != current {
                buffer[len - 4..len].copy_from_slice(&correct.to_le_bytes());
                result.fixed_fcs = true;
            }
        }

        result
    }

    /// One-time byte-offset heuristic for the 32-bit layout.
    ///
    /// Each candidate tick is projected into elapsed nanoseconds since
    /// the keyframe and must land within the tolerance of the capture
    /// clock; the FCS residue then arbitrates between the overwrite
    /// (offset 4, FCS gone) and append (offset 8, FCS intact) layouts.
    fn detect_offset_32(&self, record: &RawRecord, frame: &[u8]) -> Option<usize> {
        let clock_elapsed = (record.clock_time - self.calibration.clock_time).nanos();
        let fcs_valid = fcs::has_valid_fcs(frame);

        let within = |offset: usize| {
            if frame.len() < offset {
                return false;
            }
            let tick = be32(&frame[frame.len() - offset..]);
            let elapsed = ticks_to_nanos(self.delta_ticks(tick), self.calibration.freq);
            elapsed <= i64::MAX as u64 && (elapsed as i64 - clock_elapsed).abs() <= OFFSET_TOLERANCE_NS
        };

        if within(4) && !fcs_valid {
            Some(4)
        } else if within(8) && fcs_valid {
            Some(8)
        } else {
            None
        }
    }

    /// Elapsed ticks since the keyframe, with 32-bit (or compat
    /// 31-bit) wraparound.
    fn delta_ticks(&self, tick: u32) -> u64 {
        if self.calibration.arista_compat {
            let packed = compat_repack(tick);
            let counter = self.calibration.counter as u32 & 0x7FFF_FFFF;
            u64::from(packed.wrapping_sub(counter) & 0x7FFF_FFFF)
        } else {
            u64::from(tick.wrapping_sub(self.calibration.counter as u32))
        }
    }

    fn process_trailer(&mut self, record: &RawRecord, frame: &[u8]) -> ComputedTime {
        if frame.len() < trailer::TRAILER_LEN {
            return ComputedTime::status(Status::RecordTooShort);
        }

        let offset = match self.offset {
            Some(offset) if offset == 16 || offset == 20 => offset,
            Some(_) => return ComputedTime::status(Status::RecordTimeMissing),
            None => match self.detect_offset_trailer(record, frame) {
                Some(offset) => {
                    tracing::debug!("latched trailer timestamp offset {offset}");
                    self.offset = Some(offset);
                    offset
                }
                None => return ComputedTime::status(Status::RecordTimeMissing),
            },
        };

        let Some(decoded) = trailer::parse(frame, offset) else {
            return ComputedTime::status(Status::RecordTooShort);
        };

        let mut result = ComputedTime::status(Status::Ok);
        result.hw_time = PsTime::new(i64::from(decoded.sec), decoded.psec, 12);
        result.device_id = Some(decoded.device_id);
        result.port = Some(decoded.port);
        result
    }

    /// Pick 16 or 20 by requiring the decoded seconds to land within a
    /// week of the reference clock (wall clock live, record clock
    /// offline).
    fn detect_offset_trailer(&self, record: &RawRecord, frame: &[u8]) -> Option<usize> {
        let reference = if record.is_real_time {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0)
        } else {
            record.clock_time.sec
        };

        for offset in [trailer::TRAILER_LEN, trailer::TRAILER_LEN + 4] {
            if let Some(decoded) = trailer::parse(frame, offset) {
                if (i64::from(decoded.sec) - reference).abs() <= trailer::SANITY_WINDOW_SECS {
                    return Some(offset);
                }
            }
        }
        None
    }
}

/// 31-bit repack of a compat tick, compressing out the reserved bit of
/// the low byte.
pub(crate) fn compat_repack(tick: u32) -> u32 {
    ((tick & !0xFF) >> 1) | (tick & 0x7F)
}

/// Tick count scaled to nanoseconds. The 128-bit intermediate keeps
/// the multiplication exact for any delta and future faster devices.
fn ticks_to_nanos(ticks: u64, freq: u64) -> u64 {
    (ticks as u128 * NANOS_PER_SEC as u128 / freq as u128) as u64
}

pub(crate) fn be32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

pub(crate) fn be64(bytes: &[u8]) -> u64 {
    u64::from_be_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}
