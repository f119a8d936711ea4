/// Virtual time for the simulation kernel.
///
/// A `VirtualTime` is a count of nanoseconds since the start of the
/// simulation. It has no relation to the wall clock: the engine moves it
/// forward only when it dispatches an event or reaches its stop time.
/// Relative delays are plain `std::time::Duration` values.
use std::time::Duration;

use serde::{Deserialize, Serialize};

const NANOS_PER_SEC: u64 = 1_000_000_000;
const NANOS_PER_MILLI: u64 = 1_000_000;

/// A point on the simulated timeline, in nanoseconds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct VirtualTime(u64);

impl VirtualTime {
    /// The start of every simulation.
    pub const ZERO: VirtualTime = VirtualTime(0);

    /// The last representable instant.
    pub const MAX: VirtualTime = VirtualTime(u64::MAX);

    #[inline]
    pub const fn from_nanos(nanos: u64) -> Self {
        VirtualTime(nanos)
    }

    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        VirtualTime(millis.saturating_mul(NANOS_PER_MILLI))
    }

    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        VirtualTime(secs.saturating_mul(NANOS_PER_SEC))
    }

    /// Build a time from fractional seconds, rounding to the nearest
    /// nanosecond. Negative and NaN inputs clamp to zero.
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs.is_nan() || secs <= 0.0 {
            return VirtualTime::ZERO;
        }
        let nanos = (secs * NANOS_PER_SEC as f64).round();
        if nanos >= u64::MAX as f64 {
            VirtualTime::MAX
        } else {
            VirtualTime(nanos as u64)
        }
    }

    /// Raw nanosecond count.
    #[inline]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    /// The instant `delay` after `self`, or `None` on overflow.
    pub fn checked_add(self, delay: Duration) -> Option<VirtualTime> {
        let delta = u64::try_from(delay.as_nanos()).ok()?;
        self.0.checked_add(delta).map(VirtualTime)
    }

    /// Time elapsed since `earlier`, or `None` if `earlier` is after `self`.
    pub fn duration_since(self, earlier: VirtualTime) -> Option<Duration> {
        self.0.checked_sub(earlier.0).map(Duration::from_nanos)
    }

    /// Time elapsed since the start of the simulation.
    #[inline]
    pub fn elapsed(self) -> Duration {
        Duration::from_nanos(self.0)
    }
}

impl From<Duration> for VirtualTime {
    /// Saturates at [`VirtualTime::MAX`].
    fn from(d: Duration) -> Self {
        VirtualTime(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }
}

impl std::fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:09}s", self.0 / NANOS_PER_SEC, self.0 % NANOS_PER_SEC)
    }
}
