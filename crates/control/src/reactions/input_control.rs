//! Input-control reaction: gates consumers of a network input.

use crate::{PortStatus, ReactionContext};
use fedlink_types::{Interval, PortId, PortRef};
use tracing::debug;

/// Blocks the logical thread until the status of one network input is known
/// for the current tag.
///
/// Ordered immediately before the first reaction consuming the port. It never
/// produces a value; on timeout it resolves the port absent.
#[derive(Debug, Clone)]
pub struct InputControl {
    port: PortRef,
    action: PortId,
    /// Largest STP among reactions downstream of the port.
    max_stp: Interval,
}

impl InputControl {
    pub fn new(port: PortRef, action: PortId, max_stp: Interval) -> Self {
        Self {
            port,
            action,
            max_stp,
        }
    }

    pub fn port(&self) -> &PortRef {
        &self.port
    }

    pub fn action(&self) -> PortId {
        self.action
    }

    pub fn max_stp(&self) -> Interval {
        self.max_stp
    }

    pub fn react(&self, ctx: &ReactionContext) -> PortStatus {
        let tag = ctx.scheduler.current_tag();
        let max_stp = if ctx.is_decentralized() {
            self.max_stp
        } else {
            Interval::ZERO
        };
        let deadline = tag
            .time
            .saturating_add(ctx.effective_stp_offset())
            .saturating_add(max_stp);

        let status = ctx
            .board
            .wait_until_known(self.action, tag, deadline, &ctx.clock);
        if status == PortStatus::Absent {
            debug!(port = %self.port, %tag, "Network input resolved absent");
            ctx.scheduler.mark_absent(&self.port);
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedlink_core::PhysicalClock;
    use fedlink_test_helpers::{MockScheduler, RecordingSink};
    use fedlink_types::{Coordination, FederateId, Tag};
    use std::sync::Arc;
    use std::time::{Duration, Instant as StdInstant};

    #[test]
    fn test_zero_stp_resolves_absent_without_blocking() {
        let clock = PhysicalClock::new();
        let scheduler = Arc::new(MockScheduler::new(Tag::at(clock.now_physical())));
        let ctx = ReactionContext::new(
            FederateId(1),
            Coordination::Decentralized,
            scheduler.clone(),
            Arc::new(RecordingSink::new()),
        )
        .with_clock(clock);

        let control = InputControl::new(PortRef::scalar("r.in"), PortId(0), Interval::ZERO);
        let started = StdInstant::now();
        assert_eq!(control.react(&ctx), PortStatus::Absent);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(scheduler.is_absent(&PortRef::scalar("r.in")));
    }

    #[test]
    fn test_waits_for_stp_before_resolving() {
        let clock = PhysicalClock::new();
        let scheduler = Arc::new(MockScheduler::new(Tag::at(clock.now_physical())));
        let ctx = ReactionContext::new(
            FederateId(1),
            Coordination::Decentralized,
            scheduler.clone(),
            Arc::new(RecordingSink::new()),
        )
        .with_clock(clock);

        let control = InputControl::new(
            PortRef::scalar("r.in"),
            PortId(0),
            Interval::from_millis(50),
        );
        let started = StdInstant::now();
        assert_eq!(control.react(&ctx), PortStatus::Absent);
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_known_present_returns_immediately() {
        let clock = PhysicalClock::new();
        let tag = Tag::at(clock.now_physical());
        let scheduler = Arc::new(MockScheduler::new(tag));
        let ctx = ReactionContext::new(
            FederateId(1),
            Coordination::Decentralized,
            scheduler.clone(),
            Arc::new(RecordingSink::new()),
        )
        .with_clock(clock);
        ctx.board.mark_present(PortId(2), tag);

        let control = InputControl::new(
            PortRef::scalar("r.in"),
            PortId(2),
            Interval::from_secs(60),
        );
        assert_eq!(control.react(&ctx), PortStatus::Present);
        assert!(!scheduler.is_absent(&PortRef::scalar("r.in")));
    }

    #[test]
    fn test_centralized_ignores_stp() {
        let clock = PhysicalClock::new();
        let scheduler = Arc::new(MockScheduler::new(Tag::at(clock.now_physical())));
        let ctx = ReactionContext::new(
            FederateId(1),
            Coordination::Centralized,
            scheduler.clone(),
            Arc::new(RecordingSink::new()),
        )
        .with_clock(clock)
        .with_stp_offset(Interval::from_secs(60));

        let control = InputControl::new(
            PortRef::scalar("r.in"),
            PortId(0),
            Interval::from_secs(60),
        );
        let started = StdInstant::now();
        assert_eq!(control.react(&ctx), PortStatus::Absent);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
