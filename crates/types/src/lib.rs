//! Core types for federated reactor coordination.
//!
//! Leaf crate of the workspace: logical time, identifiers, connection
//! descriptors, and the port value model. No I/O happens here.

mod connection;
mod identifiers;
mod time;
mod value;

pub use connection::{
    Connection, ConnectionDescriptor, ConnectionEndpoint, Coordination, DescriptorError,
    MessageRoute, Serializer,
};
pub use identifiers::{BankChannel, FederateId, PortId, PortRef};
pub use time::{AdditionalDelay, Instant, Interval, Microstep, Tag, TimeError};
pub use value::{PortValue, RosMessage, Token, ValueType};
