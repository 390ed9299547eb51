//! Physical clock with a process-wide synchronization offset.

use fedlink_types::{Instant, Interval};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Signed correction applied to every physical timestamp.
///
/// Set once at startup and optionally adjusted by runtime clock
/// synchronization. Stored in a single atomic, so readers never observe a
/// torn value.
#[derive(Debug, Default)]
pub struct ClockOffset(AtomicI64);

impl ClockOffset {
    pub fn new(offset: Interval) -> Self {
        Self(AtomicI64::new(offset.0))
    }

    pub fn get(&self) -> Interval {
        Interval(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, offset: Interval) {
        self.0.store(offset.0, Ordering::Release);
    }

    /// Add `delta` to the current offset, returning the new offset.
    pub fn adjust(&self, delta: Interval) -> Interval {
        let previous = self.0.fetch_add(delta.0, Ordering::AcqRel);
        Interval(previous.saturating_add(delta.0))
    }
}

/// Reads local physical time plus the shared [`ClockOffset`].
///
/// Clones share the same offset.
#[derive(Debug, Clone, Default)]
pub struct PhysicalClock {
    offset: Arc<ClockOffset>,
}

impl PhysicalClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_offset(offset: Interval) -> Self {
        Self {
            offset: Arc::new(ClockOffset::new(offset)),
        }
    }

    /// Local physical time with the offset applied.
    pub fn now_physical(&self) -> Instant {
        Instant(Self::raw_now().0.saturating_add(self.offset.get().0))
    }

    /// Local physical time without any offset.
    pub fn raw_now() -> Instant {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Instant(nanos)
    }

    pub fn offset(&self) -> &ClockOffset {
        &self.offset
    }
}
