//! Static description of cross-federate connections.

use crate::{AdditionalDelay, BankChannel, FederateId, PortRef, ValueType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Payload serializer selected for a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Serializer {
    /// Raw memory representation.
    #[default]
    Native,
    /// Protocol buffers (not supported).
    Proto,
    /// ROS 2 message serialization.
    Ros2,
}

impl fmt::Display for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Serializer::Native => write!(f, "native"),
            Serializer::Proto => write!(f, "proto"),
            Serializer::Ros2 => write!(f, "ros2"),
        }
    }
}

/// Federation-wide consistency regime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coordination {
    /// Logical time advancement is arbitrated by the coordinator.
    #[default]
    Centralized,
    /// Federates advance independently, bounded by delays and STP offsets.
    Decentralized,
}

/// How a message on a connection travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageRoute {
    /// Physical connection: untimed message sent straight to the peer.
    UntimedDirect,
    /// Logical connection, decentralized: tagged message sent to the peer.
    TaggedDirect,
    /// Logical connection, centralized: tagged message relayed by the coordinator.
    TaggedViaCoordinator,
}

impl MessageRoute {
    /// Pick the route for a connection under the given coordination.
    pub fn select(physical: bool, coordination: Coordination) -> Self {
        if physical {
            MessageRoute::UntimedDirect
        } else if coordination == Coordination::Decentralized {
            MessageRoute::TaggedDirect
        } else {
            MessageRoute::TaggedViaCoordinator
        }
    }

    /// Whether the message goes over a peer-to-peer socket.
    pub fn is_direct(&self) -> bool {
        !matches!(self, MessageRoute::TaggedViaCoordinator)
    }

    pub fn is_tagged(&self) -> bool {
        !matches!(self, MessageRoute::UntimedDirect)
    }
}

/// Errors found when validating a connection descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("protobuf serialization is not supported yet ({0})")]
    UnsupportedSerializer(String),

    #[error("cannot handle ROS serialization when ports are pointers ({0})")]
    Ros2TokenPort(String),

    #[error("ROS 2 serializer requires a ROS 2 value type ({0})")]
    Ros2ValueType(String),

    #[error("ROS 2 value type requires the ROS 2 serializer ({0})")]
    NativeRosType(String),

    #[error("negative delay on {0}")]
    NegativeDelay(String),

    #[error("physical connection {0} cannot declare a delay")]
    PhysicalWithDelay(String),

    #[error("connection {0} does not cross federates")]
    SameFederate(String),
}

/// One side of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionEndpoint {
    pub federate: FederateId,
    pub port: PortRef,
}

impl ConnectionEndpoint {
    pub fn new(federate: FederateId, port: PortRef) -> Self {
        Self { federate, port }
    }

    pub fn coordinate(&self) -> BankChannel {
        self.port.coordinate
    }
}

/// Static description of one cross-federate link.
///
/// Created once when the federation is generated; immutable at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionDescriptor {
    pub source: ConnectionEndpoint,
    pub destination: ConnectionEndpoint,
    /// Physical connections carry no tag and no delay on the wire.
    pub physical: bool,
    pub delay: AdditionalDelay,
    pub serializer: Serializer,
    pub value_type: ValueType,
}

impl ConnectionDescriptor {
    /// Logical, undelayed, natively-serialized connection.
    pub fn logical(
        source: ConnectionEndpoint,
        destination: ConnectionEndpoint,
        value_type: ValueType,
    ) -> Self {
        Self {
            source,
            destination,
            physical: false,
            delay: AdditionalDelay::None,
            serializer: Serializer::Native,
            value_type,
        }
    }

    /// Physical, natively-serialized connection.
    pub fn physical(
        source: ConnectionEndpoint,
        destination: ConnectionEndpoint,
        value_type: ValueType,
    ) -> Self {
        Self {
            physical: true,
            ..Self::logical(source, destination, value_type)
        }
    }

    pub fn with_delay(mut self, delay: AdditionalDelay) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_serializer(mut self, serializer: Serializer) -> Self {
        self.serializer = serializer;
        self
    }

    /// Route messages on this connection take.
    pub fn route(&self, coordination: Coordination) -> MessageRoute {
        MessageRoute::select(self.physical, coordination)
    }

    /// Reject descriptors no generator should emit.
    ///
    /// Serializer problems are detected here, before any message is sent.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        let name = || self.to_string();
        if self.source.federate == self.destination.federate {
            return Err(DescriptorError::SameFederate(name()));
        }
        if let AdditionalDelay::After(delay) = self.delay {
            if delay.is_negative() {
                return Err(DescriptorError::NegativeDelay(name()));
            }
            if self.physical {
                return Err(DescriptorError::PhysicalWithDelay(name()));
            }
        }
        match (self.serializer, &self.value_type) {
            (Serializer::Proto, _) => Err(DescriptorError::UnsupportedSerializer(name())),
            (Serializer::Ros2, ValueType::Token { .. }) => {
                Err(DescriptorError::Ros2TokenPort(name()))
            }
            (Serializer::Ros2, ValueType::Ros2 { .. }) => Ok(()),
            (Serializer::Ros2, _) => Err(DescriptorError::Ros2ValueType(name())),
            (Serializer::Native, ValueType::Ros2 { .. }) => {
                Err(DescriptorError::NativeRosType(name()))
            }
            (Serializer::Native, _) => Ok(()),
        }
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = if self.physical { "~>" } else { "->" };
        write!(
            f,
            "{}:{} {} {}:{}",
            self.source.federate.0,
            self.source.port,
            arrow,
            self.destination.federate.0,
            self.destination.port
        )
    }
}

/// Shared handle to a descriptor.
pub type Connection = Arc<ConnectionDescriptor>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Interval;

    fn endpoints() -> (ConnectionEndpoint, ConnectionEndpoint) {
        (
            ConnectionEndpoint::new(FederateId(0), PortRef::scalar("s.out")),
            ConnectionEndpoint::new(FederateId(1), PortRef::scalar("r.in")),
        )
    }

    #[test]
    fn test_route_selection() {
        assert_eq!(
            MessageRoute::select(true, Coordination::Centralized),
            MessageRoute::UntimedDirect
        );
        assert_eq!(
            MessageRoute::select(true, Coordination::Decentralized),
            MessageRoute::UntimedDirect
        );
        assert_eq!(
            MessageRoute::select(false, Coordination::Decentralized),
            MessageRoute::TaggedDirect
        );
        assert_eq!(
            MessageRoute::select(false, Coordination::Centralized),
            MessageRoute::TaggedViaCoordinator
        );
    }

    #[test]
    fn test_validate_rejects_proto() {
        let (src, dst) = endpoints();
        let conn = ConnectionDescriptor::logical(src, dst, ValueType::Fixed { size: 4 })
            .with_serializer(Serializer::Proto);
        assert!(matches!(
            conn.validate(),
            Err(DescriptorError::UnsupportedSerializer(_))
        ));
    }

    #[test]
    fn test_validate_rejects_ros2_token() {
        let (src, dst) = endpoints();
        let conn = ConnectionDescriptor::logical(src, dst, ValueType::Token { element_size: 4 })
            .with_serializer(Serializer::Ros2);
        assert!(matches!(
            conn.validate(),
            Err(DescriptorError::Ros2TokenPort(_))
        ));
    }

    #[test]
    fn test_validate_rejects_negative_delay() {
        let (src, dst) = endpoints();
        let conn = ConnectionDescriptor::logical(src, dst, ValueType::Unit)
            .with_delay(AdditionalDelay::After(Interval(-1)));
        assert!(matches!(
            conn.validate(),
            Err(DescriptorError::NegativeDelay(_))
        ));
    }

    #[test]
    fn test_validate_accepts_delayed_logical() {
        let (src, dst) = endpoints();
        let conn = ConnectionDescriptor::logical(src, dst, ValueType::Text)
            .with_delay(AdditionalDelay::After(Interval::from_millis(10)));
        assert_eq!(conn.validate(), Ok(()));
        assert_eq!(conn.to_string(), "0:s.out -> 1:r.in");
    }
}
