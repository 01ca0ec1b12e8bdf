//! Picosecond-resolution wall-clock time.
//!
//! Capture clocks disagree about how many fractional digits they can
//! actually resolve (microseconds for classic capture files, nanoseconds
//! for nano-magic files and live taps, picoseconds for trailer
//! timestamps), so a [`PsTime`] carries its decimal precision alongside
//! the value and formatters truncate to it.

use std::cmp::Ordering;
use std::ops::Sub;

/// Picoseconds in one second.
pub const PSEC_PER_SEC: u64 = 1_000_000_000_000;

/// Nanoseconds in one second.
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// A point in time: seconds since the Unix epoch plus picoseconds
/// within the second.
///
/// `precision` is the number of significant fractional digits
/// (6, 9 or 12). Subtraction may yield a value with negative `sec`;
/// such deltas are ordered and printable but not normalized times.
#[derive(Debug, Clone, Copy)]
pub struct PsTime {
    /// Seconds since the Unix epoch.
    pub sec: i64,
    /// Picoseconds within the second, < 10^12 for normalized values.
    pub psec: u64,
    /// Significant fractional digits: 6, 9 or 12.
    pub precision: u8,
}

impl PsTime {
    /// Create a time from seconds, picoseconds and precision.
    pub fn new(sec: i64, psec: u64, precision: u8) -> Self {
        Self {
            sec,
            psec,
            precision,
        }
    }

    /// The unset time (all zero). Capture devices never report it.
    pub const UNSET: Self = Self {
        sec: 0,
        psec: 0,
        precision: 9,
    };

    /// Convert a nanosecond count since the epoch.
    pub fn from_nanos(nanos: u64) -> Self {
        Self {
            sec: (nanos / NANOS_PER_SEC) as i64,
            psec: (nanos % NANOS_PER_SEC) * 1000,
            precision: 9,
        }
    }

    /// Whole nanoseconds since the epoch (fraction truncated).
    pub fn nanos(&self) -> i64 {
        self.sec * NANOS_PER_SEC as i64 + (self.psec / 1000) as i64
    }

    /// A time is set iff any component is non-zero.
    pub fn is_set(&self) -> bool {
        self.sec != 0 || self.psec != 0
    }

    /// Seconds as a float, for diff display only.
    pub fn as_secs_f64(&self) -> f64 {
        self.sec as f64 + self.psec as f64 / PSEC_PER_SEC as f64
    }

    /// The fractional part truncated to this time's precision.
    pub fn frac(&self) -> u64 {
        let mut frac = self.psec;
        for _ in self.precision..12 {
            frac /= 10;
        }
        frac
    }
}

impl Default for PsTime {
    fn default() -> Self {
        Self::UNSET
    }
}

impl PartialEq for PsTime {
    fn eq(&self, other: &Self) -> bool {
        self.sec == other.sec && self.psec == other.psec
    }
}

impl Eq for PsTime {}

impl PartialOrd for PsTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PsTime {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.sec, self.psec).cmp(&(other.sec, other.psec))
    }
}

impl Sub for PsTime {
    type Output = PsTime;

    /// Signed delta; the result's precision is the coarser of the two.
    fn sub(self, rhs: PsTime) -> PsTime {
        let precision = self.precision.min(rhs.precision);
        if self.psec < rhs.psec {
            PsTime::new(
                self.sec - rhs.sec - 1,
                PSEC_PER_SEC + self.psec - rhs.psec,
                precision,
            )
        } else {
            PsTime::new(self.sec - rhs.sec, self.psec - rhs.psec, precision)
        }
    }
}
