//! Output-control reaction: announces absence of an unset network output.

use crate::ReactionContext;
use fedlink_core::FederateError;
use fedlink_messages::{Frame, PortAbsent};
use fedlink_types::{Connection, PortId};
use tracing::debug;

/// Runs after the reactions that may set an outbound port.
///
/// When the port is unset for the current tag, sends a port-absent notice
/// for the delayed tag so the destination can resolve without waiting for its
/// STP deadline.
#[derive(Debug, Clone)]
pub struct OutputControl {
    connection: Connection,
    destination_port: PortId,
}

impl OutputControl {
    pub fn new(connection: Connection, destination_port: PortId) -> Self {
        Self {
            connection,
            destination_port,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Returns `true` if an absent notice was sent.
    ///
    /// A failed notice is fatal: the destination would otherwise have to
    /// assume absence at its deadline, which is only safe under decentralized
    /// coordination.
    pub fn react(&self, ctx: &ReactionContext) -> Result<bool, FederateError> {
        if ctx.scheduler.is_present(&self.connection.source.port) {
            return Ok(false);
        }

        let tag = ctx
            .scheduler
            .current_tag()
            .delayed(self.connection.delay)?;
        let destination = self.connection.destination.federate;
        let frame = Frame::PortAbsent(PortAbsent {
            port: self.destination_port,
            federate: destination,
            tag,
        });

        let result = if self.connection.route(ctx.coordination).is_direct() {
            ctx.sink.send_to_federate(destination, &frame)
        } else {
            ctx.sink.send_to_coordinator(&frame)
        };
        result.map_err(|source| FederateError::Send {
            connection: self.connection.to_string(),
            physical: self.connection.physical,
            source,
        })?;

        debug!(connection = %self.connection, %tag, "Sent port absent");
        Ok(true)
    }
}
