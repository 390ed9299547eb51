//! Clock synchronization with the coordinator.
//!
//! # Exchange
//!
//! ```text
//! coordinator                federate
//!     | --- T1 (time t1) --->   |  t2 = local receive time
//!     | <-- T3 ------------    |  t3 = local send time
//!     | --- T4 (time t4) --->   |  t4 = coordinator receive time of T3
//! ```
//!
//! Each exchange estimates the offset to add to the local clock as
//! `((t1 - t2) + (t4 - t3)) / 2`. The mean over a round is applied to the
//! shared [`ClockOffset`](fedlink_core::ClockOffset) in one atomic update.

use crate::network::write_frame;
use fedlink_core::{FederateError, PhysicalClock};
use fedlink_messages::Frame;
use fedlink_types::{FederateId, Instant, Interval};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use tracing::{debug, info};

/// When to synchronize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockSyncMode {
    /// Never.
    Off,
    /// Once at startup.
    #[default]
    Init,
    /// At startup and periodically while running.
    On,
}

/// Exchanges to request at startup.
///
/// Zero when synchronization is off, or when the coordinator shares this
/// host and synchronization is not forced.
pub fn startup_exchanges(mode: ClockSyncMode, exchanges: u16, same_host: bool, force: bool) -> u16 {
    match mode {
        ClockSyncMode::Off => 0,
        _ if same_host && !force => 0,
        _ => exchanges,
    }
}

/// Deterministic skew injected for testing: `(1 + federate) * skew`.
pub fn test_offset(federate: FederateId, skew: Interval) -> Interval {
    Interval((1 + i64::from(federate.0)).saturating_mul(skew.0))
}

/// Offset estimate from one exchange.
pub fn estimate(t1: Instant, t2: Instant, t3: Instant, t4: Instant) -> Interval {
    let outbound = t1.0.saturating_sub(t2.0);
    let inbound = t4.0.saturating_sub(t3.0);
    Interval(((outbound as i128 + inbound as i128) / 2) as i64)
}

/// State of an in-progress synchronization round.
#[derive(Debug)]
pub struct SyncRound {
    clock: PhysicalClock,
    exchanges: u16,
    pending: Option<(Instant, Instant)>,
    sent_t3: Option<Instant>,
    samples: Vec<Interval>,
}

impl SyncRound {
    pub fn new(clock: PhysicalClock, exchanges: u16) -> Self {
        Self {
            clock,
            exchanges: exchanges.max(1),
            pending: None,
            sent_t3: None,
            samples: Vec::new(),
        }
    }

    /// Record the arrival of T1.
    pub fn on_t1(&mut self, t1: Instant) {
        self.pending = Some((t1, self.clock.now_physical()));
        self.sent_t3 = None;
    }

    /// Record that T3 has just been sent.
    pub fn on_t3_sent(&mut self) {
        self.sent_t3 = Some(self.clock.now_physical());
    }

    /// Record T4. Once the round is complete, apply the mean correction and
    /// return it.
    pub fn on_t4(&mut self, t4: Instant) -> Option<Interval> {
        let (t1, t2) = self.pending.take()?;
        let t3 = self.sent_t3.take()?;
        let sample = estimate(t1, t2, t3, t4);
        debug!(sample = %sample, "Clock sync exchange");
        self.samples.push(sample);

        if self.samples.len() < usize::from(self.exchanges) {
            return None;
        }
        let sum: i128 = self.samples.iter().map(|s| s.0 as i128).sum();
        let mean = Interval((sum / self.samples.len() as i128) as i64);
        self.samples.clear();
        let offset = self.clock.offset().adjust(mean);
        info!(correction = %mean, offset = %offset, "Clock offset adjusted");
        Some(mean)
    }
}

/// Run `exchanges` exchanges synchronously on the coordinator stream.
///
/// Returns the correction applied to `clock`.
pub fn synchronize<S: Read + Write>(
    stream: &mut S,
    federate: FederateId,
    clock: &PhysicalClock,
    exchanges: u16,
) -> Result<Interval, FederateError> {
    let mut round = SyncRound::new(clock.clone(), exchanges);
    loop {
        let t1 = match read(stream)? {
            Frame::ClockSyncT1 { time } => time,
            other => return Err(unexpected("T1", &other)),
        };
        round.on_t1(t1);
        write_frame(stream, "coordinator", &Frame::ClockSyncT3 { federate })?;
        round.on_t3_sent();

        let t4 = match read(stream)? {
            Frame::ClockSyncT4 { time } => time,
            other => return Err(unexpected("T4", &other)),
        };
        if let Some(correction) = round.on_t4(t4) {
            return Ok(correction);
        }
    }
}

fn read<S: Read>(stream: &mut S) -> Result<Frame, FederateError> {
    Frame::read_from(stream).map_err(|source| {
        if source.is_disconnect() {
            FederateError::ConnectionLost {
                what: "coordinator".into(),
                detail: source.to_string(),
            }
        } else {
            FederateError::Frame {
                peer: "coordinator".into(),
                source,
            }
        }
    })
}

fn unexpected(expected: &str, frame: &Frame) -> FederateError {
    FederateError::protocol(
        "coordinator",
        format!(
            "expected clock sync {expected}, got {}",
            frame.type_name()
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_cancels_symmetric_delay() {
        // Coordinator is 1000ns ahead, one-way delay 50ns.
        let t1 = Instant(10_000);
        let t2 = Instant(10_000 - 1_000 + 50);
        let t3 = Instant(9_100);
        let t4 = Instant(9_100 + 1_000 + 50);
        assert_eq!(estimate(t1, t2, t3, t4), Interval(1_000));
    }

    #[test]
    fn test_startup_exchanges() {
        assert_eq!(startup_exchanges(ClockSyncMode::Off, 10, false, true), 0);
        assert_eq!(startup_exchanges(ClockSyncMode::Init, 10, true, false), 0);
        assert_eq!(startup_exchanges(ClockSyncMode::Init, 10, true, true), 10);
        assert_eq!(startup_exchanges(ClockSyncMode::On, 4, false, false), 4);
    }

    #[test]
    fn test_test_offset_scales_with_id() {
        assert_eq!(test_offset(FederateId(0), Interval(5)), Interval(5));
        assert_eq!(test_offset(FederateId(3), Interval(5)), Interval(20));
    }

    #[test]
    fn test_round_applies_mean_once_complete() {
        let clock = PhysicalClock::new();
        let mut round = SyncRound::new(clock.clone(), 2);

        // Far-ahead coordinator: each sample is roughly +1s.
        let ahead = Interval::from_secs(1);
        round.on_t1(clock.now_physical().saturating_add(ahead));
        round.on_t3_sent();
        assert_eq!(round.on_t4(clock.now_physical().saturating_add(ahead)), None);
        assert_eq!(clock.offset().get(), Interval::ZERO);

        round.on_t1(clock.now_physical().saturating_add(ahead));
        round.on_t3_sent();
        let correction = round.on_t4(clock.now_physical().saturating_add(ahead)).unwrap();

        let error = (correction.0 - ahead.0).abs();
        assert!(error < Interval::from_millis(50).0, "correction {correction}");
        assert_eq!(clock.offset().get(), correction);
    }

    #[test]
    fn test_t4_without_t1_is_ignored() {
        let mut round = SyncRound::new(PhysicalClock::new(), 1);
        assert_eq!(round.on_t4(Instant(5)), None);
    }
}
