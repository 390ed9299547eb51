//! Scripted coordinator for integration tests.
//!
//! Speaks the coordinator side of the handshake, neighbor structure, clock
//! synchronization, and address registry, and relays tagged messages and absent notices between
//! connected federates.

use fedlink_core::PhysicalClock;
use fedlink_messages::{Frame, FrameError, NeighborStructure, RejectReason};
use fedlink_types::{FederateId, Instant, Interval};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io;
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Settings of a [`FakeCoordinator`].
#[derive(Debug, Clone)]
pub struct FakeCoordinatorConfig {
    pub federation_id: String,
    /// Federate ids `0..federates` may join.
    pub federates: u16,
    /// Added to the coordinator's clock readings during clock sync.
    pub clock_skew: Interval,
}

impl FakeCoordinatorConfig {
    pub fn new(federation_id: impl Into<String>, federates: u16) -> Self {
        Self {
            federation_id: federation_id.into(),
            federates,
            clock_skew: Interval::ZERO,
        }
    }

    pub fn with_clock_skew(mut self, skew: Interval) -> Self {
        self.clock_skew = skew;
        self
    }
}

#[derive(Debug, Default)]
struct Registry {
    writers: HashMap<FederateId, TcpStream>,
    addresses: HashMap<FederateId, u16>,
    neighbors: HashMap<FederateId, NeighborStructure>,
    received: Vec<(FederateId, Frame)>,
    resigned: HashSet<FederateId>,
    rejected: Vec<RejectReason>,
    sync_exchanges: u32,
}

struct Shared {
    config: FakeCoordinatorConfig,
    registry: Mutex<Registry>,
    stopping: AtomicBool,
}

/// In-process coordinator listening on `127.0.0.1`.
pub struct FakeCoordinator {
    addr: SocketAddr,
    shared: Arc<Shared>,
    acceptor: Option<JoinHandle<()>>,
}

impl FakeCoordinator {
    /// Bind an ephemeral loopback port and start accepting federates.
    pub fn start(config: FakeCoordinatorConfig) -> io::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Shared {
            config,
            registry: Mutex::new(Registry::default()),
            stopping: AtomicBool::new(false),
        });

        let acceptor = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("fake-coordinator".into())
                .spawn(move || accept_loop(listener, shared))?
        };

        Ok(Self {
            addr,
            shared,
            acceptor: Some(acceptor),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Federates that completed the handshake and have not disconnected.
    pub fn connected(&self) -> Vec<FederateId> {
        let mut ids: Vec<_> = self.shared.registry.lock().writers.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn advertised_port(&self, federate: FederateId) -> Option<u16> {
        self.shared.registry.lock().addresses.get(&federate).copied()
    }

    /// Neighbor structure `federate` announced after its handshake.
    pub fn neighbors(&self, federate: FederateId) -> Option<NeighborStructure> {
        self.shared.registry.lock().neighbors.get(&federate).cloned()
    }

    /// Frames received after the handshake, excluding clock-sync traffic.
    pub fn received(&self) -> Vec<(FederateId, Frame)> {
        self.shared.registry.lock().received.clone()
    }

    pub fn has_resigned(&self, federate: FederateId) -> bool {
        self.shared.registry.lock().resigned.contains(&federate)
    }

    pub fn rejections(&self) -> Vec<RejectReason> {
        self.shared.registry.lock().rejected.clone()
    }

    /// Number of completed T1/T3/T4 exchanges across all federates.
    pub fn sync_exchanges(&self) -> u32 {
        self.shared.registry.lock().sync_exchanges
    }

    /// Push a frame to a connected federate.
    pub fn send_to(&self, federate: FederateId, frame: &Frame) -> io::Result<()> {
        let mut registry = self.shared.registry.lock();
        let stream = registry
            .writers
            .get_mut(&federate)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "federate not connected"))?;
        write(stream, frame)
    }

    pub fn stop(&mut self) {
        self.shared.stopping.store(true, Ordering::SeqCst);
        for stream in self.shared.registry.lock().writers.values() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        if let Some(handle) = self.acceptor.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FakeCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    while !shared.stopping.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, "Coordinator accepted connection");
                let shared = Arc::clone(&shared);
                let _ = thread::Builder::new()
                    .name("fake-coordinator-conn".into())
                    .spawn(move || {
                        if let Err(e) = serve(stream, &shared) {
                            debug!(error = %e, "Coordinator connection ended");
                        }
                    });
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(5));
            }
            Err(e) => {
                warn!(error = %e, "Coordinator accept failed");
                return;
            }
        }
    }
}

fn coordinator_now(shared: &Shared) -> Instant {
    PhysicalClock::raw_now().saturating_add(shared.config.clock_skew)
}

fn reject(stream: &mut TcpStream, shared: &Shared, reason: RejectReason) -> io::Result<()> {
    shared.registry.lock().rejected.push(reason);
    write(stream, &Frame::Reject(reason))
}

fn serve(mut stream: TcpStream, shared: &Shared) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;

    let federate = match read(&mut stream)? {
        Frame::FedIds {
            federate,
            federation_id,
        } => {
            if federation_id != shared.config.federation_id {
                return reject(&mut stream, shared, RejectReason::FederationIdMismatch);
            }
            if federate.0 >= shared.config.federates {
                return reject(&mut stream, shared, RejectReason::FederateIdOutOfRange);
            }
            let mut registry = shared.registry.lock();
            if registry.writers.contains_key(&federate) {
                drop(registry);
                return reject(&mut stream, shared, RejectReason::FederateIdInUse);
            }
            registry.writers.insert(federate, stream.try_clone()?);
            federate
        }
        _ => return reject(&mut stream, shared, RejectReason::UnexpectedMessage),
    };
    send(shared, federate, &Frame::Ack)?;

    let result = match read(&mut stream)? {
        Frame::NeighborStructure(neighbors) => {
            shared.registry.lock().neighbors.insert(federate, neighbors);
            relay(&mut stream, shared, federate)
        }
        _ => reject(&mut stream, shared, RejectReason::UnexpectedMessage),
    };
    shared.registry.lock().writers.remove(&federate);
    result
}

fn relay(stream: &mut TcpStream, shared: &Shared, federate: FederateId) -> io::Result<()> {
    loop {
        let frame = read(stream)?;
        match frame {
            Frame::ClockSyncRequest { exchanges } => {
                for _ in 0..exchanges {
                    send(shared, federate, &Frame::ClockSyncT1 {
                        time: coordinator_now(shared),
                    })?;
                    match read(stream)? {
                        Frame::ClockSyncT3 { .. } => {}
                        other => {
                            return Err(io::Error::new(
                                io::ErrorKind::InvalidData,
                                format!("expected T3, got {}", other.type_name()),
                            ))
                        }
                    }
                    send(shared, federate, &Frame::ClockSyncT4 {
                        time: coordinator_now(shared),
                    })?;
                    shared.registry.lock().sync_exchanges += 1;
                }
            }
            Frame::AddressAdvertisement { port } => {
                shared.registry.lock().addresses.insert(federate, port);
            }
            Frame::AddressQuery { federate: queried } => {
                let port = shared.registry.lock().addresses.get(&queried).copied();
                send(shared, federate, &Frame::AddressQueryReply {
                    port,
                    host: Ipv4Addr::LOCALHOST,
                })?;
            }
            Frame::TaggedMessage(ref message) => {
                let target = message.federate;
                shared.registry.lock().received.push((federate, frame.clone()));
                forward(shared, target, &frame);
            }
            Frame::PortAbsent(absent) => {
                shared.registry.lock().received.push((federate, frame.clone()));
                forward(shared, absent.federate, &frame);
            }
            Frame::Resign => {
                shared.registry.lock().resigned.insert(federate);
                return Ok(());
            }
            other => {
                shared.registry.lock().received.push((federate, other));
            }
        }
    }
}

fn forward(shared: &Shared, target: FederateId, frame: &Frame) {
    if let Err(e) = send(shared, target, frame) {
        debug!(%target, error = %e, "Dropping relayed frame");
    }
}

fn send(shared: &Shared, federate: FederateId, frame: &Frame) -> io::Result<()> {
    let mut registry = shared.registry.lock();
    let stream = registry
        .writers
        .get_mut(&federate)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "federate not connected"))?;
    write(stream, frame)
}

fn write(stream: &mut TcpStream, frame: &Frame) -> io::Result<()> {
    frame.write_to(stream).map_err(|e| match e {
        FrameError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::InvalidInput, other),
    })
}

fn read(stream: &mut TcpStream) -> io::Result<Frame> {
    Frame::read_from(stream).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
