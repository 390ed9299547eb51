//! Records handed from the transport to the scheduler.

use bytes::Bytes;
use fedlink_types::{Instant, PortId, Tag};

/// A message that arrived for a network message action.
///
/// Produced by a reader thread and handed to the scheduler, which later runs
/// the matching network receiver reaction with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Network message action (destination port ordinal).
    pub port: PortId,
    /// Serialized value.
    pub payload: Bytes,
    /// Local physical time at which the message was read.
    pub physical_arrival: Instant,
    /// Tag computed by the sender; `None` on physical connections.
    pub intended_tag: Option<Tag>,
}

/// Metadata the receiver reaction copies onto the destination port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortAnnotations {
    pub physical_arrival: Instant,
    /// Only set under decentralized coordination on logical connections.
    pub intended_tag: Option<Tag>,
}
