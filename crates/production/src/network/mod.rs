//! TCP transport of a federate.
//!
//! - [`CoordinatorLink`]: handshake, clock sync, and address registry with the coordinator
//! - [`bind_server`] / [`Acceptor`]: inbound peer connections
//! - [`connect_peer`]: outbound peer connections
//! - [`Transport`]: socket tables and the serialized send path
//! - reader threads dispatching inbound frames

mod coordinator;
mod endpoint;
mod listener;
mod peers;
mod reader;
mod retry;
mod transport;

pub use coordinator::CoordinatorLink;
pub use endpoint::{Endpoint, EndpointState};
pub use listener::{bind_server, Acceptor};
pub use peers::connect_peer;
pub use reader::{spawn_coordinator_reader, spawn_peer_reader, ReaderContext};
pub use retry::RetryPolicy;
pub use transport::{ShutdownSignal, Transport};

use fedlink_core::FederateError;
use fedlink_messages::{Frame, FrameError};
use std::io::{Read, Write};

/// Read one frame during a handshake, mapping failures onto `peer`.
pub(crate) fn read_frame<S: Read>(stream: &mut S, peer: &str) -> Result<Frame, FederateError> {
    Frame::read_from(stream).map_err(|source| {
        if source.is_disconnect() {
            FederateError::ConnectionLost {
                what: peer.to_string(),
                detail: source.to_string(),
            }
        } else {
            FederateError::Frame {
                peer: peer.to_string(),
                source,
            }
        }
    })
}

/// Write one frame during a handshake.
pub(crate) fn write_frame<S: Write>(
    stream: &mut S,
    peer: &str,
    frame: &Frame,
) -> Result<(), FederateError> {
    frame.write_to(stream).map_err(|source| match source {
        FrameError::Io(e) => FederateError::ConnectionLost {
            what: peer.to_string(),
            detail: e.to_string(),
        },
        source => FederateError::Frame {
            peer: peer.to_string(),
            source,
        },
    })
}
