//! Logical time: instants, intervals, and tags.
//!
//! All arithmetic is exact 64-bit signed nanoseconds. Adding a delay that
//! would overflow is reported as [`TimeError::Overflow`], which callers treat
//! as fatal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors from time arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    #[error("time overflow: {time} + {delay}")]
    Overflow { time: Instant, delay: Interval },

    #[error("negative interval: {0}")]
    Negative(Interval),
}

/// A point in time, in nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instant(pub i64);

impl Instant {
    /// Earlier than any other instant.
    pub const NEVER: Self = Instant(i64::MIN);

    /// Later than any other instant.
    pub const FOREVER: Self = Instant(i64::MAX);

    /// The Unix epoch.
    pub const ZERO: Self = Instant(0);

    /// Get the raw nanosecond value.
    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Add an interval, failing on overflow.
    pub fn checked_add(self, interval: Interval) -> Result<Self, TimeError> {
        self.0
            .checked_add(interval.0)
            .map(Instant)
            .ok_or(TimeError::Overflow {
                time: self,
                delay: interval,
            })
    }

    /// Add an interval, clamping at [`Instant::FOREVER`] / [`Instant::NEVER`].
    ///
    /// Used only for deadlines, where "unreachably far" is the right answer.
    pub fn saturating_add(self, interval: Interval) -> Self {
        Instant(self.0.saturating_add(interval.0))
    }

    /// Signed distance from `earlier` to `self`.
    pub fn since(self, earlier: Instant) -> Interval {
        Interval(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Instant::NEVER => write!(f, "NEVER"),
            Instant::FOREVER => write!(f, "FOREVER"),
            Instant(ns) => write!(f, "{}ns", ns),
        }
    }
}

/// A signed duration in nanoseconds.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Interval(pub i64);

impl Interval {
    /// The zero interval.
    pub const ZERO: Self = Interval(0);

    pub fn from_nanos(ns: i64) -> Self {
        Interval(ns)
    }

    /// Unit constructors saturate at the `i64` limits.
    pub fn from_micros(us: i64) -> Self {
        Interval(us.saturating_mul(1_000))
    }

    pub fn from_millis(ms: i64) -> Self {
        Interval(ms.saturating_mul(1_000_000))
    }

    pub fn from_secs(s: i64) -> Self {
        Interval(s.saturating_mul(1_000_000_000))
    }

    /// Get the raw nanosecond value.
    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Convert to a std duration. Negative intervals become zero.
    pub fn to_std(self) -> Duration {
        Duration::from_nanos(self.0.max(0) as u64)
    }
}

impl From<Duration> for Interval {
    fn from(duration: Duration) -> Self {
        Interval(i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// Microstep within a single time instant.
pub type Microstep = u32;

/// A point in the global order of events: `(time, microstep)`.
///
/// Ordered lexicographically by time, then microstep. Two equal tags from
/// different federates are simultaneous, but the events stay distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub time: Instant,
    pub microstep: Microstep,
}

impl Tag {
    /// The tag before all other tags.
    pub const NEVER: Self = Tag {
        time: Instant::NEVER,
        microstep: 0,
    };

    /// The tag after all other tags.
    pub const FOREVER: Self = Tag {
        time: Instant::FOREVER,
        microstep: u32::MAX,
    };

    pub fn new(time: Instant, microstep: Microstep) -> Self {
        Self { time, microstep }
    }

    /// Tag at `time` with microstep zero.
    pub fn at(time: Instant) -> Self {
        Self::new(time, 0)
    }

    /// Compute the tag a message sent at `self` is intended for.
    ///
    /// - no delay: the tag is unchanged
    /// - zero delay: same time, next microstep
    /// - positive delay: `(time + delay, 0)`
    pub fn delayed(self, delay: AdditionalDelay) -> Result<Tag, TimeError> {
        match delay {
            AdditionalDelay::None => Ok(self),
            AdditionalDelay::After(interval) if interval.is_negative() => {
                Err(TimeError::Negative(interval))
            }
            AdditionalDelay::After(Interval::ZERO) => {
                let microstep = self.microstep.checked_add(1).ok_or(TimeError::Overflow {
                    time: self.time,
                    delay: Interval::ZERO,
                })?;
                Ok(Tag::new(self.time, microstep))
            }
            AdditionalDelay::After(interval) => Ok(Tag::at(self.time.checked_add(interval)?)),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.time, self.microstep)
    }
}

/// Logical delay declared on a connection (`after` clause).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdditionalDelay {
    /// No `after` clause: the message carries the sender's tag.
    #[default]
    None,
    /// Explicit `after` delay.
    After(Interval),
}

impl AdditionalDelay {
    /// The delay as an interval (zero when absent).
    pub fn interval(&self) -> Interval {
        match self {
            AdditionalDelay::None => Interval::ZERO,
            AdditionalDelay::After(interval) => *interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_ordering_is_lexicographic() {
        let a = Tag::new(Instant(10), 5);
        let b = Tag::new(Instant(11), 0);
        let c = Tag::new(Instant(11), 1);
        assert!(a < b);
        assert!(b < c);
        assert!(Tag::NEVER < a);
        assert!(c < Tag::FOREVER);
    }

    #[test]
    fn test_delayed_without_after_keeps_tag() {
        let tag = Tag::new(Instant(100), 3);
        assert_eq!(tag.delayed(AdditionalDelay::None).unwrap(), tag);
    }

    #[test]
    fn test_delayed_zero_bumps_microstep() {
        let tag = Tag::new(Instant(100), 3);
        let delayed = tag.delayed(AdditionalDelay::After(Interval::ZERO)).unwrap();
        assert_eq!(delayed, Tag::new(Instant(100), 4));
    }

    #[test]
    fn test_delayed_positive_resets_microstep() {
        let tag = Tag::new(Instant(Interval::from_millis(100).0), 2);
        let delayed = tag
            .delayed(AdditionalDelay::After(Interval::from_millis(10)))
            .unwrap();
        assert_eq!(delayed, Tag::at(Instant(Interval::from_millis(110).0)));
    }

    #[test]
    fn test_delayed_overflow_is_error() {
        let tag = Tag::at(Instant(i64::MAX - 5));
        let result = tag.delayed(AdditionalDelay::After(Interval(10)));
        assert!(matches!(result, Err(TimeError::Overflow { .. })));
    }

    #[test]
    fn test_delayed_negative_is_error() {
        let result = Tag::at(Instant(0)).delayed(AdditionalDelay::After(Interval(-1)));
        assert_eq!(result, Err(TimeError::Negative(Interval(-1))));
    }

    #[test]
    fn test_interval_constructors_saturate() {
        assert_eq!(Interval::from_millis(i64::MAX), Interval(i64::MAX));
        assert_eq!(Interval::from_secs(i64::MIN / 2), Interval(i64::MIN));
        assert_eq!(Interval::from_micros(7), Interval(7_000));
    }

    #[test]
    fn test_interval_to_std_clamps_negative() {
        assert_eq!(Interval(-5).to_std(), Duration::ZERO);
        assert_eq!(Interval::from_millis(3).to_std(), Duration::from_millis(3));
    }
}
