//! Outbound peer connections.

use super::{read_frame, write_frame, RetryPolicy};
use fedlink_core::FederateError;
use fedlink_messages::Frame;
use fedlink_types::FederateId;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;
use tracing::info;

/// Connect to `peer` at `addr` and identify ourselves.
pub fn connect_peer(
    addr: SocketAddr,
    federate: FederateId,
    federation_id: &str,
    peer: FederateId,
    retry: &RetryPolicy,
    timeout: Duration,
) -> Result<TcpStream, FederateError> {
    let name = peer.to_string();
    let mut stream = retry.run(&format!("{peer} at {addr}"), || {
        TcpStream::connect_timeout(&addr, timeout)
    })?;
    let io_err = |e: std::io::Error| FederateError::ConnectionLost {
        what: peer.to_string(),
        detail: e.to_string(),
    };
    let _ = stream.set_nodelay(true);
    stream.set_read_timeout(Some(timeout)).map_err(io_err)?;

    write_frame(
        &mut stream,
        &name,
        &Frame::P2pSendingFedId {
            federate,
            federation_id: federation_id.to_string(),
        },
    )?;
    match read_frame(&mut stream, &name)? {
        Frame::Ack => {}
        Frame::Reject(reason) => {
            return Err(FederateError::Rejected { what: name, reason });
        }
        other => {
            return Err(FederateError::protocol(
                &name,
                format!("expected Ack, got {}", other.type_name()),
            ))
        }
    }
    stream.set_read_timeout(None).map_err(io_err)?;
    info!(%peer, %addr, "Connected to peer");
    Ok(stream)
}
