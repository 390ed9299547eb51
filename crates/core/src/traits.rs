//! Collaborator traits at the seams of the coordination core.

use crate::{PortAnnotations, ReceivedMessage, SendError};
use fedlink_messages::Frame;
use fedlink_types::{FederateId, PortId, PortRef, PortValue, Tag};

/// The in-process reactor scheduler, as seen by the coordination protocol.
///
/// The scheduler owns logical time and port storage. This crate only reads
/// the current tag and port state, and hands back delivered values and
/// absence resolutions.
pub trait Scheduler: Send + Sync {
    /// The tag currently being processed.
    fn current_tag(&self) -> Tag;

    /// Whether `port` has been set at the current tag.
    fn is_present(&self, port: &PortRef) -> bool;

    /// Value of `port` at the current tag, if present.
    fn get(&self, port: &PortRef) -> Option<PortValue>;

    /// Set `port` to `value` at the current tag, marking it present.
    fn set(&self, port: &PortRef, value: PortValue);

    /// Record arrival metadata on `port`.
    fn annotate(&self, port: &PortRef, annotations: PortAnnotations);

    /// Resolve `port` as absent for the current tag.
    fn mark_absent(&self, port: &PortRef);

    /// Schedule the network message action `action` with `message`.
    ///
    /// Called from reader threads; must not block on logical execution.
    fn schedule_network_message(&self, action: PortId, message: ReceivedMessage);
}

/// Outbound side of the transport.
///
/// Each call sends one complete frame; implementations serialize writes per
/// destination so frames never interleave.
pub trait MessageSink: Send + Sync {
    /// Send a frame on the peer-to-peer link to `federate`.
    fn send_to_federate(&self, federate: FederateId, frame: &Frame) -> Result<(), SendError>;

    /// Send a frame to the coordinator.
    fn send_to_coordinator(&self, frame: &Frame) -> Result<(), SendError>;
}
