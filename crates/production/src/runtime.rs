//! The federate runtime: owns the transport, the port-status board, and
//! every background thread of one federate.
//!
//! # State Machine
//!
//! ```text
//! Disconnected -> ConnectingToCoordinator -> ConnectedToCoordinator
//!     -> [ListeningForPeers] -> Running -> ShuttingDown -> Closed
//! ```
//!
//! [`FederateRuntime::start`] walks the states up to `Running`;
//! [`FederateRuntime::shutdown`] (also run on drop) resigns from the
//! coordinator, releases blocked input-control waits, closes every socket,
//! and joins the background threads.

use crate::clock_sync::{self, ClockSyncMode};
use crate::config::{FederateConfig, UnreachablePeerPolicy};
use crate::fatal::{ExitProcess, FatalHandler};
use crate::network::{
    bind_server, connect_peer, spawn_coordinator_reader, Acceptor, CoordinatorLink, Endpoint,
    ReaderContext, Transport,
};
use fedlink_control::{FederatePlan, InboundDispatcher, PeerTopology, PortStatusBoard, ReactionContext};
use fedlink_core::{
    Destination, FederateError, MessageSink, PhysicalClock, ReceivedMessage, Scheduler,
};
use fedlink_messages::{Frame, PayloadCodec};
use fedlink_types::{FederateId, Interval, Tag};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Lifecycle state of a federate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeState {
    Disconnected,
    ConnectingToCoordinator,
    ConnectedToCoordinator,
    ListeningForPeers,
    Running,
    ShuttingDown,
    Closed,
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuntimeState::Disconnected => "DISCONNECTED",
            RuntimeState::ConnectingToCoordinator => "CONNECTING_TO_COORDINATOR",
            RuntimeState::ConnectedToCoordinator => "CONNECTED_TO_COORDINATOR",
            RuntimeState::ListeningForPeers => "LISTENING_FOR_PEERS",
            RuntimeState::Running => "RUNNING",
            RuntimeState::ShuttingDown => "SHUTTING_DOWN",
            RuntimeState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// All per-federate runtime state.
pub struct FederateRuntime {
    config: FederateConfig,
    plan: FederatePlan,
    topology: PeerTopology,
    scheduler: Arc<dyn Scheduler>,
    clock: PhysicalClock,
    codec: PayloadCodec,
    board: Arc<PortStatusBoard>,
    transport: Arc<Transport>,
    dispatcher: Arc<InboundDispatcher>,
    fatal: Arc<dyn FatalHandler>,
    state: Mutex<RuntimeState>,
    threads: Vec<JoinHandle<()>>,
    server_port: Option<u16>,
}

impl FederateRuntime {
    /// Create a runtime for the federate described by `config` and `plan`.
    ///
    /// Peer links declared in `config.peers` extend those of the plan.
    pub fn new(
        config: FederateConfig,
        plan: FederatePlan,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Self, FederateError> {
        config
            .validate()
            .map_err(|e| FederateError::Config(e.to_string()))?;
        if plan.federate() != config.federate_id {
            return Err(FederateError::Config(format!(
                "plan is for {}, configuration for {}",
                plan.federate(),
                config.federate_id
            )));
        }
        if plan.coordination() != config.coordination.mode {
            return Err(FederateError::Config(format!(
                "plan uses {:?} coordination, configuration {:?}",
                plan.coordination(),
                config.coordination.mode
            )));
        }

        let mut topology = plan.topology().clone();
        topology.inbound.extend(config.peers.inbound.iter().copied());
        topology
            .outbound
            .extend(config.peers.outbound.iter().map(|p| p.id));

        let clock = PhysicalClock::new();
        let board = Arc::new(PortStatusBoard::new());
        let dispatcher = Arc::new(plan.dispatcher(
            Arc::clone(&board),
            Arc::clone(&scheduler),
            clock.clone(),
        ));

        Ok(Self {
            transport: Arc::new(Transport::new(config.federate_id)),
            config,
            plan,
            topology,
            scheduler,
            clock,
            codec: PayloadCodec::native(),
            board,
            dispatcher,
            fatal: Arc::new(ExitProcess),
            state: Mutex::new(RuntimeState::Disconnected),
            threads: Vec::new(),
            server_port: None,
        })
    }

    pub fn with_fatal_handler(mut self, fatal: Arc<dyn FatalHandler>) -> Self {
        self.fatal = fatal;
        self
    }

    pub fn with_codec(mut self, codec: PayloadCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn federate(&self) -> FederateId {
        self.config.federate_id
    }

    pub fn state(&self) -> RuntimeState {
        *self.state.lock()
    }

    pub fn plan(&self) -> &FederatePlan {
        &self.plan
    }

    pub fn topology(&self) -> &PeerTopology {
        &self.topology
    }

    pub fn clock(&self) -> &PhysicalClock {
        &self.clock
    }

    pub fn board(&self) -> &Arc<PortStatusBoard> {
        &self.board
    }

    /// Port the peer server is bound to, once listening.
    pub fn server_port(&self) -> Option<u16> {
        self.server_port
    }

    pub fn sink(&self) -> Arc<dyn MessageSink> {
        Arc::clone(&self.transport) as Arc<dyn MessageSink>
    }

    /// Context for running this federate's network reactions.
    pub fn reaction_context(&self) -> ReactionContext {
        ReactionContext::new(
            self.config.federate_id,
            self.config.coordination.mode,
            Arc::clone(&self.scheduler),
            self.sink(),
        )
        .with_stp_offset(self.config.stp_offset())
        .with_board(Arc::clone(&self.board))
        .with_clock(self.clock.clone())
        .with_codec(self.codec.clone())
    }

    /// Run the receiver reaction for a message the scheduler dequeued.
    pub fn deliver(&self, message: &ReceivedMessage) -> Result<(), FederateError> {
        let receiver = self.plan.receiver(message.port).ok_or_else(|| {
            FederateError::protocol(
                Destination::Federate(self.federate()),
                format!("no receiver for {}", message.port),
            )
        })?;
        receiver.react(&self.reaction_context(), message)
    }

    /// Forget port status older than `tag` once the scheduler has moved past it.
    pub fn tag_completed(&self, tag: Tag) {
        self.board.prune_before(tag);
    }

    fn set_state(&self, next: RuntimeState) {
        let mut state = self.state.lock();
        debug!(federate = %self.config.federate_id, from = %*state, to = %next, "State change");
        *state = next;
    }

    fn reader_context(&self) -> ReaderContext {
        ReaderContext {
            transport: Arc::clone(&self.transport),
            dispatcher: Arc::clone(&self.dispatcher),
            fatal: Arc::clone(&self.fatal),
            clock: self.clock.clone(),
        }
    }

    /// Connect to the coordinator and all peers, then enter `Running`.
    ///
    /// Fails with a connectivity error once the coordinator retry budget is
    /// exhausted; the federate never reaches `Running` in that case.
    pub fn start(&mut self) -> Result<(), FederateError> {
        if self.state() != RuntimeState::Disconnected {
            return Err(FederateError::Config(format!(
                "cannot start from state {}",
                self.state()
            )));
        }
        let federate = self.config.federate_id;

        if let Some(skew) = self.config.clock_sync.test_offset {
            let offset = clock_sync::test_offset(federate, Interval::from(skew));
            self.clock.offset().adjust(offset);
            info!(%federate, offset = %offset, "Applied test clock offset");
        }

        self.set_state(RuntimeState::ConnectingToCoordinator);
        let mut link = CoordinatorLink::connect(
            &self.config.coordinator,
            federate,
            &self.config.federation_id,
            &self.plan.neighbor_structure(),
        )?;
        self.set_state(RuntimeState::ConnectedToCoordinator);

        let sync = self.config.clock_sync.clone();
        let exchanges = clock_sync::startup_exchanges(
            sync.mode,
            sync.exchanges_per_interval,
            link.is_same_host(),
            sync.force,
        );
        if let Some(correction) = link.synchronize_clock(federate, &self.clock, exchanges)? {
            info!(%federate, correction = %correction, "Initial clock synchronization done");
        }

        let writer = link.try_clone_stream()?;
        let endpoint =
            Endpoint::new(Destination::Coordinator, writer).map_err(|e| lost("coordinator", e))?;
        self.transport.set_coordinator(Arc::new(endpoint));

        if self.topology.has_inbound() {
            let (listener, port) = bind_server(&self.config.server)?;
            self.server_port = Some(port);
            self.set_state(RuntimeState::ListeningForPeers);
            link.advertise(port)?;
            let acceptor = Acceptor::new(
                listener,
                self.config.federation_id.clone(),
                self.topology.inbound.clone(),
                self.config.peers.connect_timeout,
                self.reader_context(),
            );
            let handle = acceptor.spawn().map_err(|e| spawn_error("acceptor", e))?;
            self.threads.push(handle);
        }

        let outbound: Vec<FederateId> = self.topology.outbound.iter().copied().collect();
        for peer in outbound {
            match self.connect_outbound(&mut link, peer) {
                Ok(()) => {}
                Err(err) if self.config.peers.unreachable == UnreachablePeerPolicy::BestEffort => {
                    warn!(%peer, error = %err, "Continuing without unreachable peer");
                }
                Err(err) => return Err(err),
            }
        }

        let periodic = sync.mode == ClockSyncMode::On && exchanges > 0;
        let reader = spawn_coordinator_reader(
            link.into_stream(),
            self.reader_context(),
            sync.exchanges_per_interval,
        )
        .map_err(|e| spawn_error("coordinator reader", e))?;
        self.threads.push(reader);

        self.await_inbound_peers()?;

        if periodic {
            let handle = self.spawn_clock_sync()?;
            self.threads.push(handle);
        }

        self.set_state(RuntimeState::Running);
        info!(
            %federate,
            inbound = self.topology.inbound.len(),
            outbound = self.topology.outbound.len(),
            "Federate running"
        );
        Ok(())
    }

    fn connect_outbound(
        &self,
        link: &mut CoordinatorLink,
        peer: FederateId,
    ) -> Result<(), FederateError> {
        let peers = &self.config.peers;
        let addr = match peers.address_of(peer) {
            Some(address) => resolve(address)?,
            None => link.query_address(peer, &peers.retry, &self.dispatcher)?,
        };
        let stream = connect_peer(
            addr,
            self.config.federate_id,
            &self.config.federation_id,
            peer,
            &peers.retry,
            peers.connect_timeout,
        )?;
        let endpoint = Endpoint::new(Destination::Federate(peer), stream)
            .map_err(|e| lost(&peer.to_string(), e))?;
        self.transport.add_outbound(peer, Arc::new(endpoint));
        Ok(())
    }

    fn await_inbound_peers(&self) -> Result<(), FederateError> {
        let expected = self.topology.inbound.len();
        if expected == 0 {
            return Ok(());
        }
        let connected = self
            .transport
            .wait_for_inbound(expected, self.config.peers.connect_timeout);
        if connected >= expected {
            return Ok(());
        }

        let missing: BTreeSet<_> = self
            .topology
            .inbound
            .iter()
            .filter(|p| !self.transport.has_inbound(**p))
            .map(|p| p.0)
            .collect();
        if self.config.peers.unreachable == UnreachablePeerPolicy::BestEffort {
            warn!(?missing, "Continuing without inbound peers");
            return Ok(());
        }
        Err(FederateError::Unreachable {
            what: format!("inbound peers {missing:?}"),
            attempts: 1,
            source: io::Error::new(
                io::ErrorKind::TimedOut,
                "peers did not connect within the timeout",
            ),
        })
    }

    fn spawn_clock_sync(&self) -> Result<JoinHandle<()>, FederateError> {
        let transport = Arc::clone(&self.transport);
        let period = self.config.clock_sync.period;
        let exchanges = self.config.clock_sync.exchanges_per_interval;
        thread::Builder::new()
            .name("fedlink-clock-sync".into())
            .spawn(move || {
                while !transport.shutdown_signal().wait(period) {
                    if let Err(e) =
                        transport.send_to_coordinator(&Frame::ClockSyncRequest { exchanges })
                    {
                        warn!(error = %e, "Failed to request clock synchronization");
                    }
                }
            })
            .map_err(|e| spawn_error("clock sync", e))
    }

    /// Resign, release blocked waits, close sockets, and join threads.
    pub fn shutdown(&mut self) {
        let state = self.state();
        if state == RuntimeState::Closed {
            return;
        }
        self.set_state(RuntimeState::ShuttingDown);
        self.transport.begin_shutdown();

        if let Some(coordinator) = self.transport.coordinator() {
            match coordinator.try_send(&Frame::Resign) {
                Ok(true) => {}
                Ok(false) => debug!("Coordinator link busy, skipping resign"),
                Err(e) => debug!(error = %e, "Could not send resign"),
            }
        }
        self.board.shutdown();
        self.transport.close_all();

        for handle in self.threads.drain(..) {
            let name = handle.thread().name().unwrap_or("unnamed").to_string();
            if let Err(panic) = handle.join() {
                error!(thread = %name, panic = panic_message(&*panic), "Worker thread panicked");
            }
        }
        self.set_state(RuntimeState::Closed);
        info!(federate = %self.config.federate_id, "Federate closed");
    }
}

impl Drop for FederateRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for FederateRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FederateRuntime")
            .field("federate", &self.config.federate_id)
            .field("state", &self.state())
            .field("server_port", &self.server_port)
            .finish_non_exhaustive()
    }
}

fn resolve(address: &str) -> Result<SocketAddr, FederateError> {
    address
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| FederateError::Config(format!("cannot resolve peer address {address}")))
}

fn lost(what: &str, e: io::Error) -> FederateError {
    FederateError::ConnectionLost {
        what: what.to_string(),
        detail: e.to_string(),
    }
}

fn spawn_error(what: &str, source: io::Error) -> FederateError {
    FederateError::Io {
        what: format!("failed to spawn {what} thread"),
        source,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
