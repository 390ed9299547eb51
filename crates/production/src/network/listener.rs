//! Server socket and acceptor loop for inbound peers.

use super::{read_frame, spawn_peer_reader, write_frame, Endpoint, ReaderContext};
use crate::config::ServerConfig;
use fedlink_core::{Destination, FederateError};
use fedlink_messages::{Frame, RejectReason};
use fedlink_types::FederateId;
use std::collections::BTreeSet;
use std::io;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

const ACCEPT_POLL: Duration = Duration::from_millis(20);

/// Bind the server socket.
///
/// With a fixed port only that port is tried; otherwise successive ports
/// from `base_port` are probed until one is free.
pub fn bind_server(config: &ServerConfig) -> Result<(TcpListener, u16), FederateError> {
    let bind = |port: u16| TcpListener::bind((config.host.as_str(), port));
    let bound = |listener: TcpListener| -> Result<(TcpListener, u16), FederateError> {
        let port = listener
            .local_addr()
            .map_err(|e| FederateError::Config(format!("server socket has no address: {e}")))?
            .port();
        info!(port, "Listening for peers");
        Ok((listener, port))
    };

    if let Some(port) = config.port {
        return match bind(port) {
            Ok(listener) => bound(listener),
            Err(e) => Err(FederateError::Config(format!(
                "cannot bind server on {}:{port}: {e}",
                config.host
            ))),
        };
    }

    for offset in 0..config.port_range {
        let Some(port) = config.base_port.checked_add(offset) else {
            break;
        };
        match bind(port) {
            Ok(listener) => return bound(listener),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                debug!(port, "Port in use, probing next");
            }
            Err(e) => {
                return Err(FederateError::Config(format!(
                    "cannot bind server on {}:{port}: {e}",
                    config.host
                )))
            }
        }
    }
    Err(FederateError::Config(format!(
        "no free port in {}..{}",
        config.base_port,
        u32::from(config.base_port) + u32::from(config.port_range)
    )))
}

/// Accepts inbound peer connections for the lifetime of the federate.
pub struct Acceptor {
    listener: TcpListener,
    federation_id: String,
    expected: BTreeSet<FederateId>,
    handshake_timeout: Duration,
    ctx: ReaderContext,
}

impl Acceptor {
    pub fn new(
        listener: TcpListener,
        federation_id: impl Into<String>,
        expected: BTreeSet<FederateId>,
        handshake_timeout: Duration,
        ctx: ReaderContext,
    ) -> Self {
        Self {
            listener,
            federation_id: federation_id.into(),
            expected,
            handshake_timeout,
            ctx,
        }
    }

    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        self.listener.set_nonblocking(true)?;
        thread::Builder::new()
            .name("fedlink-acceptor".into())
            .spawn(move || self.run())
    }

    fn run(self) {
        let transport = Arc::clone(&self.ctx.transport);
        let mut readers = Vec::new();

        while !transport.is_shutting_down() {
            match self.listener.accept() {
                Ok((stream, addr)) => match self.handshake(stream) {
                    Ok((peer, stream)) => {
                        info!(%peer, %addr, "Accepted peer connection");
                        match spawn_peer_reader(peer, stream, self.ctx.clone()) {
                            Ok(handle) => readers.push(handle),
                            Err(e) => warn!(%peer, error = %e, "Failed to spawn peer reader"),
                        }
                    }
                    Err(e) => warn!(%addr, error = %e, "Rejected inbound connection"),
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    transport.shutdown_signal().wait(ACCEPT_POLL);
                }
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    transport.shutdown_signal().wait(ACCEPT_POLL);
                }
            }
        }

        debug!("Acceptor stopping");
        for handle in readers {
            let _ = handle.join();
        }
    }

    fn handshake(&self, mut stream: TcpStream) -> Result<(FederateId, TcpStream), FederateError> {
        let io_err = |e: io::Error| FederateError::ConnectionLost {
            what: "inbound peer".into(),
            detail: e.to_string(),
        };
        stream.set_nonblocking(false).map_err(io_err)?;
        stream
            .set_read_timeout(Some(self.handshake_timeout))
            .map_err(io_err)?;
        let _ = stream.set_nodelay(true);

        let (peer, federation_id) = match read_frame(&mut stream, "inbound peer")? {
            Frame::P2pSendingFedId {
                federate,
                federation_id,
            } => (federate, federation_id),
            other => {
                let _ = write_frame(
                    &mut stream,
                    "inbound peer",
                    &Frame::Reject(RejectReason::UnexpectedMessage),
                );
                return Err(FederateError::protocol(
                    "inbound peer",
                    format!("expected P2pSendingFedId, got {}", other.type_name()),
                ));
            }
        };

        let reason = if federation_id != self.federation_id {
            Some(RejectReason::FederationIdMismatch)
        } else if !self.expected.contains(&peer) {
            Some(RejectReason::FederateIdOutOfRange)
        } else if self.ctx.transport.has_inbound(peer) {
            Some(RejectReason::FederateIdInUse)
        } else {
            None
        };
        if let Some(reason) = reason {
            let _ = write_frame(&mut stream, "inbound peer", &Frame::Reject(reason));
            return Err(FederateError::Rejected {
                what: peer.to_string(),
                reason,
            });
        }

        write_frame(&mut stream, "inbound peer", &Frame::Ack)?;
        stream.set_read_timeout(None).map_err(io_err)?;
        let writer = stream.try_clone().map_err(io_err)?;
        let endpoint = Endpoint::new(Destination::Federate(peer), writer).map_err(io_err)?;
        self.ctx.transport.add_inbound(peer, Arc::new(endpoint));
        Ok((peer, stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_probes_past_taken_port() {
        let taken = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let base = taken.local_addr().unwrap().port();
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: None,
            base_port: base,
            port_range: 64,
        };
        let (_listener, port) = bind_server(&config).unwrap();
        assert_ne!(port, base);
        assert!(port > base && port < base.saturating_add(64));
    }

    #[test]
    fn test_fixed_port_in_use_fails() {
        let taken = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: Some(taken.local_addr().unwrap().port()),
            ..ServerConfig::default()
        };
        let err = bind_server(&config).unwrap_err();
        assert_eq!(err.category(), fedlink_core::ErrorCategory::Configuration);
    }
}
