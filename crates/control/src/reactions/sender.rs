//! Network sender reaction.

use crate::ReactionContext;
use fedlink_core::{Destination, FederateError};
use fedlink_messages::{Frame, TaggedMessage, UntimedMessage};
use fedlink_types::{Connection, MessageRoute, PortId};
use tracing::{debug, warn};

/// What a sender reaction did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// The output (or this bank/channel element of it) was not set.
    NotPresent,
    /// Send failed on a physical connection and was dropped.
    Dropped,
}

/// Sends the value of one output port over one connection.
#[derive(Debug, Clone)]
pub struct NetworkSender {
    connection: Connection,
    /// Ordinal of the network message action at the destination.
    destination_port: PortId,
}

impl NetworkSender {
    pub fn new(connection: Connection, destination_port: PortId) -> Self {
        Self {
            connection,
            destination_port,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn destination_port(&self) -> PortId {
        self.destination_port
    }

    /// Run the reaction at the scheduler's current tag.
    pub fn react(&self, ctx: &ReactionContext) -> Result<SendOutcome, FederateError> {
        let port = &self.connection.source.port;

        // Multiport and bank triggers fire when any element is present.
        if port.coordinate.is_indexed() && !ctx.scheduler.is_present(port) {
            return Ok(SendOutcome::NotPresent);
        }
        let Some(value) = ctx.scheduler.get(port) else {
            return Ok(SendOutcome::NotPresent);
        };

        let payload = ctx
            .codec
            .encode(
                self.connection.serializer,
                &self.connection.value_type,
                &value,
            )
            .map_err(|source| FederateError::Codec {
                connection: self.connection.to_string(),
                source,
            })?;

        let destination = self.connection.destination.federate;
        let route = self.connection.route(ctx.coordination);
        let frame = match route {
            MessageRoute::UntimedDirect => Frame::P2pMessage(UntimedMessage {
                port: self.destination_port,
                federate: destination,
                payload,
            }),
            MessageRoute::TaggedDirect | MessageRoute::TaggedViaCoordinator => {
                let tag = ctx
                    .scheduler
                    .current_tag()
                    .delayed(self.connection.delay)?;
                let message = TaggedMessage {
                    port: self.destination_port,
                    federate: destination,
                    tag,
                    payload,
                };
                if route.is_direct() {
                    Frame::P2pTaggedMessage(message)
                } else {
                    Frame::TaggedMessage(message)
                }
            }
        };

        let result = if route.is_direct() {
            ctx.sink.send_to_federate(destination, &frame)
        } else {
            ctx.sink.send_to_coordinator(&frame)
        };

        match result {
            Ok(()) => {
                debug!(
                    connection = %self.connection,
                    kind = frame.type_name(),
                    "Sent network message"
                );
                Ok(SendOutcome::Sent)
            }
            Err(source) if self.connection.physical => {
                warn!(
                    connection = %self.connection,
                    error = %source,
                    "Dropping message on physical connection"
                );
                Ok(SendOutcome::Dropped)
            }
            Err(source) => Err(FederateError::Send {
                connection: self.connection.to_string(),
                physical: false,
                source,
            }),
        }
    }

    /// Where frames from this reaction go under the given coordination.
    pub fn destination(&self, ctx: &ReactionContext) -> Destination {
        if self.connection.route(ctx.coordination).is_direct() {
            Destination::Federate(self.connection.destination.federate)
        } else {
            Destination::Coordinator
        }
    }
}
