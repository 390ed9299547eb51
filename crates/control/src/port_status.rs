//! Per-port status board shared between reader threads and reactions.
//!
//! Reader threads record arrivals and absent notices; the input-control
//! reaction blocks on the board until the status of its port is known for
//! the current tag, or until its deadline passes.

use fedlink_core::PhysicalClock;
use fedlink_types::{Instant, PortId, Tag};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, trace};

/// Status of a network input port at one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortStatus {
    Unknown,
    Present,
    Absent,
}

/// Result of recording a message arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Accepted,
    /// The tag had already been resolved absent (safe-to-process violation).
    Tardy,
}

#[derive(Debug)]
struct PortState {
    /// Status is known for every tag up to and including this one.
    known_through: Tag,
    /// Tags at which a message arrived.
    present: BTreeSet<Tag>,
}

impl Default for PortState {
    fn default() -> Self {
        Self {
            known_through: Tag::NEVER,
            present: BTreeSet::new(),
        }
    }
}

impl PortState {
    fn status(&self, tag: Tag) -> PortStatus {
        if self.present.contains(&tag) {
            PortStatus::Present
        } else if tag <= self.known_through {
            PortStatus::Absent
        } else {
            PortStatus::Unknown
        }
    }

    fn advance(&mut self, tag: Tag) {
        if tag > self.known_through {
            self.known_through = tag;
        }
    }
}

#[derive(Debug, Default)]
struct BoardState {
    ports: HashMap<PortId, PortState>,
    shutting_down: bool,
}

/// Status of every network input port of a federate.
///
/// All updates happen under one lock and wake every waiter.
#[derive(Debug, Default)]
pub struct PortStatusBoard {
    state: Mutex<BoardState>,
    changed: Condvar,
}

impl PortStatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message for `port` intended for `tag`.
    ///
    /// Messages on one connection arrive in tag order, so everything before
    /// `tag` becomes known as well.
    pub fn mark_present(&self, port: PortId, tag: Tag) -> MarkOutcome {
        let mut state = self.state.lock();
        let entry = state.ports.entry(port).or_default();
        let outcome = match entry.status(tag) {
            PortStatus::Absent => MarkOutcome::Tardy,
            _ => MarkOutcome::Accepted,
        };
        entry.present.insert(tag);
        entry.advance(tag);
        drop(state);
        self.changed.notify_all();
        outcome
    }

    /// Record that `port` is absent through `tag`.
    ///
    /// Never clears a tag already marked present.
    pub fn mark_absent(&self, port: PortId, tag: Tag) {
        let mut state = self.state.lock();
        state.ports.entry(port).or_default().advance(tag);
        drop(state);
        self.changed.notify_all();
    }

    /// Current status of `port` at `tag`.
    pub fn status(&self, port: PortId, tag: Tag) -> PortStatus {
        let state = self.state.lock();
        state
            .ports
            .get(&port)
            .map_or(PortStatus::Unknown, |p| p.status(tag))
    }

    /// Block until the status of `port` at `tag` is known.
    ///
    /// Once `clock` passes `deadline` without a message, the port is resolved
    /// absent for `tag`. During shutdown every waiter returns
    /// [`PortStatus::Absent`] immediately.
    pub fn wait_until_known(
        &self,
        port: PortId,
        tag: Tag,
        deadline: Instant,
        clock: &PhysicalClock,
    ) -> PortStatus {
        let mut state = self.state.lock();
        loop {
            if state.shutting_down {
                return PortStatus::Absent;
            }
            let status = state
                .ports
                .get(&port)
                .map_or(PortStatus::Unknown, |p| p.status(tag));
            if status != PortStatus::Unknown {
                return status;
            }

            let now = clock.now_physical();
            if now >= deadline {
                debug!(%port, %tag, "Deadline passed without a message, port is absent");
                state.ports.entry(port).or_default().advance(tag);
                return PortStatus::Absent;
            }

            trace!(%port, %tag, "Waiting for port status");
            let remaining = deadline.since(now).to_std();
            self.changed.wait_for(&mut state, remaining);
        }
    }

    /// Wake every waiter and resolve all future waits as absent.
    pub fn shutdown(&self) {
        self.state.lock().shutting_down = true;
        self.changed.notify_all();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state.lock().shutting_down
    }

    /// Forget present marks older than `tag`.
    pub fn prune_before(&self, tag: Tag) {
        let mut state = self.state.lock();
        for port in state.ports.values_mut() {
            port.present = port.present.split_off(&tag);
        }
    }
}
