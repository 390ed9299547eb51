//! Startup conversation with the coordinator.

use super::{read_frame, write_frame, RetryPolicy};
use crate::clock_sync;
use crate::config::CoordinatorConfig;
use fedlink_control::InboundDispatcher;
use fedlink_core::{Destination, FederateError, PhysicalClock};
use fedlink_messages::{Frame, NeighborStructure};
use fedlink_types::{FederateId, Interval};
use std::io;
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use tracing::{debug, info};

const PEER: &str = "coordinator";

/// Connection to the coordinator during startup.
///
/// Used synchronously until the federate is running, then handed to a reader
/// thread via [`CoordinatorLink::into_stream`].
#[derive(Debug)]
pub struct CoordinatorLink {
    stream: TcpStream,
    peer_addr: SocketAddr,
}

impl CoordinatorLink {
    /// Connect, retrying per `config.retry`, perform the id handshake, and
    /// announce the federate's logical neighbors.
    pub fn connect(
        config: &CoordinatorConfig,
        federate: FederateId,
        federation_id: &str,
        neighbors: &NeighborStructure,
    ) -> Result<Self, FederateError> {
        let what = format!("coordinator at {}:{}", config.host, config.port);
        let stream = config.retry.run(&what, || {
            let addr = (config.host.as_str(), config.port)
                .to_socket_addrs()?
                .next()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address"))?;
            TcpStream::connect_timeout(&addr, config.connect_timeout)
        })?;
        let peer_addr = stream.peer_addr().map_err(|e| FederateError::ConnectionLost {
            what: what.clone(),
            detail: e.to_string(),
        })?;
        let _ = stream.set_nodelay(true);

        let mut link = Self { stream, peer_addr };
        write_frame(
            &mut link.stream,
            PEER,
            &Frame::FedIds {
                federate,
                federation_id: federation_id.to_string(),
            },
        )?;
        match read_frame(&mut link.stream, PEER)? {
            Frame::Ack => {
                info!(%federate, coordinator = %peer_addr, "Connected to coordinator");
                debug!(
                    upstream = neighbors.upstream.len(),
                    downstream = neighbors.downstream.len(),
                    "Sending neighbor structure"
                );
                write_frame(
                    &mut link.stream,
                    PEER,
                    &Frame::NeighborStructure(neighbors.clone()),
                )?;
                Ok(link)
            }
            Frame::Reject(reason) => Err(FederateError::Rejected {
                what: PEER.into(),
                reason,
            }),
            other => Err(FederateError::protocol(
                PEER,
                format!("expected Ack, got {}", other.type_name()),
            )),
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Whether the coordinator runs on this host.
    pub fn is_same_host(&self) -> bool {
        let peer = self.peer_addr.ip();
        peer.is_loopback()
            || self
                .stream
                .local_addr()
                .map(|local| local.ip() == peer)
                .unwrap_or(false)
    }

    /// Ask for `exchanges` clock-sync exchanges and run them.
    ///
    /// Returns the applied correction, or `None` when zero exchanges were
    /// requested.
    pub fn synchronize_clock(
        &mut self,
        federate: FederateId,
        clock: &PhysicalClock,
        exchanges: u16,
    ) -> Result<Option<Interval>, FederateError> {
        write_frame(
            &mut self.stream,
            PEER,
            &Frame::ClockSyncRequest { exchanges },
        )?;
        if exchanges == 0 {
            return Ok(None);
        }
        clock_sync::synchronize(&mut self.stream, federate, clock, exchanges).map(Some)
    }

    /// Tell the coordinator where inbound peers can reach us.
    pub fn advertise(&mut self, port: u16) -> Result<(), FederateError> {
        debug!(port, "Advertising server port");
        write_frame(
            &mut self.stream,
            PEER,
            &Frame::AddressAdvertisement { port },
        )
    }

    /// Ask the coordinator where `peer` listens, until it has advertised.
    pub fn query_address(
        &mut self,
        peer: FederateId,
        retry: &RetryPolicy,
        dispatcher: &InboundDispatcher,
    ) -> Result<SocketAddr, FederateError> {
        let attempts = retry.max_attempts.max(1);
        for attempt in 0..attempts {
            write_frame(
                &mut self.stream,
                PEER,
                &Frame::AddressQuery { federate: peer },
            )?;
            match self.next_control_frame(dispatcher)? {
                Frame::AddressQueryReply {
                    port: Some(port),
                    host,
                } => {
                    let ip = if host.is_unspecified() {
                        self.peer_addr.ip()
                    } else {
                        IpAddr::V4(host)
                    };
                    return Ok(SocketAddr::new(ip, port));
                }
                Frame::AddressQueryReply { port: None, .. } => {
                    debug!(%peer, attempt, "Peer has not advertised yet");
                    thread::sleep(retry.backoff(attempt));
                }
                other => {
                    return Err(FederateError::protocol(
                        PEER,
                        format!("expected AddressQueryReply, got {}", other.type_name()),
                    ))
                }
            }
        }
        Err(FederateError::Unreachable {
            what: format!("address of {peer}"),
            attempts,
            source: io::Error::new(io::ErrorKind::NotFound, "peer never advertised"),
        })
    }

    /// Next non-data frame; data frames relayed meanwhile are dispatched.
    fn next_control_frame(
        &mut self,
        dispatcher: &InboundDispatcher,
    ) -> Result<Frame, FederateError> {
        loop {
            let frame = read_frame(&mut self.stream, PEER)?;
            match frame {
                Frame::TaggedMessage(_) | Frame::PortAbsent(_) => {
                    dispatcher.dispatch(Destination::Coordinator, frame)?;
                }
                other => return Ok(other),
            }
        }
    }

    /// A second handle to the socket, for the send path.
    pub fn try_clone_stream(&self) -> Result<TcpStream, FederateError> {
        self.stream
            .try_clone()
            .map_err(|e| FederateError::ConnectionLost {
                what: PEER.into(),
                detail: e.to_string(),
            })
    }

    pub fn into_stream(self) -> TcpStream {
        self.stream
    }
}
