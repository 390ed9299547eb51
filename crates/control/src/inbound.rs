//! Dispatch of inbound data frames to network message actions.
//!
//! Runs on reader threads. Records the arrival on the [`PortStatusBoard`]
//! and hands the message to the scheduler; never touches logical execution
//! directly.

use crate::{MarkOutcome, PortStatusBoard};
use fedlink_core::{Destination, FederateError, PhysicalClock, ReceivedMessage, Scheduler};
use fedlink_messages::Frame;
use fedlink_types::{Connection, FederateId, PortId, Tag};
use std::sync::Arc;
use tracing::{trace, warn};

/// What happened to a dispatched frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Delivered,
    /// Delivered, but the tag had already been resolved absent.
    Tardy,
    AbsentRecorded,
}

/// Routes data frames to the federate's network message actions.
pub struct InboundDispatcher {
    federate: FederateId,
    /// Inbound connections, indexed by action ordinal.
    actions: Vec<Connection>,
    board: Arc<PortStatusBoard>,
    scheduler: Arc<dyn Scheduler>,
    clock: PhysicalClock,
}

impl InboundDispatcher {
    pub fn new(
        federate: FederateId,
        actions: Vec<Connection>,
        board: Arc<PortStatusBoard>,
        scheduler: Arc<dyn Scheduler>,
        clock: PhysicalClock,
    ) -> Self {
        Self {
            federate,
            actions,
            board,
            scheduler,
            clock,
        }
    }

    pub fn board(&self) -> &Arc<PortStatusBoard> {
        &self.board
    }

    /// Handle one data frame read from `from`.
    ///
    /// Frames that are not data frames, or that address an unknown action,
    /// are protocol errors.
    pub fn dispatch(&self, from: Destination, frame: Frame) -> Result<Dispatched, FederateError> {
        let physical_arrival = self.clock.now_physical();
        match frame {
            Frame::P2pMessage(message) => {
                let connection = self.lookup(from, message.federate, message.port)?;
                if !connection.physical {
                    return Err(FederateError::protocol(
                        from,
                        format!("untimed message on logical connection {connection}"),
                    ));
                }
                self.scheduler.schedule_network_message(
                    message.port,
                    ReceivedMessage {
                        port: message.port,
                        payload: message.payload,
                        physical_arrival,
                        intended_tag: None,
                    },
                );
                Ok(Dispatched::Delivered)
            }
            Frame::P2pTaggedMessage(message) | Frame::TaggedMessage(message) => {
                let connection = self.lookup(from, message.federate, message.port)?;
                if connection.physical {
                    return Err(FederateError::protocol(
                        from,
                        format!("tagged message on physical connection {connection}"),
                    ));
                }
                let outcome = self.board.mark_present(message.port, message.tag);
                if outcome == MarkOutcome::Tardy {
                    warn!(
                        %connection,
                        tag = %message.tag,
                        "Message arrived after its tag was resolved absent (STP violation)"
                    );
                }
                self.scheduler.schedule_network_message(
                    message.port,
                    ReceivedMessage {
                        port: message.port,
                        payload: message.payload,
                        physical_arrival,
                        intended_tag: Some(message.tag),
                    },
                );
                Ok(match outcome {
                    MarkOutcome::Accepted => Dispatched::Delivered,
                    MarkOutcome::Tardy => Dispatched::Tardy,
                })
            }
            Frame::PortAbsent(absent) => {
                self.lookup(from, absent.federate, absent.port)?;
                trace!(port = %absent.port, tag = %absent.tag, "Port absent");
                self.board.mark_absent(absent.port, absent.tag);
                Ok(Dispatched::AbsentRecorded)
            }
            other => Err(FederateError::protocol(
                from,
                format!("unexpected {} frame", other.type_name()),
            )),
        }
    }

    /// Resolve every pending wait through `tag` as absent.
    pub fn resolve_absent_through(&self, tag: Tag) {
        for action in 0..self.actions.len() {
            self.board.mark_absent(PortId(action as u16), tag);
        }
    }

    fn lookup(
        &self,
        from: Destination,
        federate: FederateId,
        port: PortId,
    ) -> Result<&Connection, FederateError> {
        if federate != self.federate {
            return Err(FederateError::protocol(
                from,
                format!("message addressed to {federate}, this is {}", self.federate),
            ));
        }
        self.actions.get(port.ordinal()).ok_or_else(|| {
            FederateError::protocol(from, format!("no network message action for {port}"))
        })
    }
}

impl std::fmt::Debug for InboundDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundDispatcher")
            .field("federate", &self.federate)
            .field("actions", &self.actions.len())
            .finish_non_exhaustive()
    }
}
