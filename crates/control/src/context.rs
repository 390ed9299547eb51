//! Everything a network reaction needs at run time.

use crate::PortStatusBoard;
use fedlink_core::{MessageSink, PhysicalClock, Scheduler};
use fedlink_messages::PayloadCodec;
use fedlink_types::{Coordination, FederateId, Interval};
use std::sync::Arc;

/// Shared handles passed to every network reaction of one federate.
#[derive(Clone)]
pub struct ReactionContext {
    pub federate: FederateId,
    pub coordination: Coordination,
    /// Federate-wide safe-to-process offset (decentralized coordination only).
    pub stp_offset: Interval,
    pub scheduler: Arc<dyn Scheduler>,
    pub sink: Arc<dyn MessageSink>,
    pub board: Arc<PortStatusBoard>,
    pub clock: PhysicalClock,
    pub codec: PayloadCodec,
}

impl ReactionContext {
    pub fn new(
        federate: FederateId,
        coordination: Coordination,
        scheduler: Arc<dyn Scheduler>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            federate,
            coordination,
            stp_offset: Interval::ZERO,
            scheduler,
            sink,
            board: Arc::new(PortStatusBoard::new()),
            clock: PhysicalClock::new(),
            codec: PayloadCodec::native(),
        }
    }

    pub fn with_stp_offset(mut self, stp_offset: Interval) -> Self {
        self.stp_offset = stp_offset;
        self
    }

    pub fn with_board(mut self, board: Arc<PortStatusBoard>) -> Self {
        self.board = board;
        self
    }

    pub fn with_clock(mut self, clock: PhysicalClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_codec(mut self, codec: PayloadCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn is_decentralized(&self) -> bool {
        self.coordination == Coordination::Decentralized
    }

    /// STP offset that applies under the current coordination.
    pub fn effective_stp_offset(&self) -> Interval {
        if self.is_decentralized() {
            self.stp_offset
        } else {
            Interval::ZERO
        }
    }
}

impl std::fmt::Debug for ReactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactionContext")
            .field("federate", &self.federate)
            .field("coordination", &self.coordination)
            .field("stp_offset", &self.stp_offset)
            .finish_non_exhaustive()
    }
}
