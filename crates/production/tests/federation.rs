//! End-to-end tests over loopback sockets against the scripted coordinator.

use fedlink_control::{FederatePlan, PortStatus, SendOutcome};
use fedlink_core::{ErrorCategory, FederateError, PhysicalClock, Scheduler};
use fedlink_messages::{Frame, NeighborStructure, RejectReason};
use fedlink_production::{
    ClockSyncMode, CollectFatal, FederateConfig, FederateRuntime, RetryPolicy, RuntimeState,
    UnreachablePeerPolicy,
};
use fedlink_production::config::ClockSyncConfig;
use fedlink_test_helpers::{wait_for, FakeCoordinator, FakeCoordinatorConfig, MockScheduler};
use fedlink_types::{
    AdditionalDelay, Connection, ConnectionDescriptor, ConnectionEndpoint, Coordination,
    FederateId, Instant, Interval, PortRef, PortValue, Tag, ValueType,
};
use serial_test::serial;
use std::collections::HashMap;
use std::net::{Ipv4Addr, TcpListener};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const FEDERATION: &str = "test-federation";

fn config(id: u16, coordinator_port: u16, mode: Coordination) -> FederateConfig {
    let mut config = FederateConfig::new(FederateId(id), FEDERATION)
        .with_coordinator("127.0.0.1", coordinator_port)
        .with_coordination(mode);
    config.coordinator.retry = RetryPolicy::default()
        .with_max_attempts(3)
        .with_backoff(Duration::from_millis(5), Duration::from_millis(20));
    config.peers.retry = RetryPolicy::default()
        .with_max_attempts(50)
        .with_backoff(Duration::from_millis(10), Duration::from_millis(50));
    config.peers.connect_timeout = Duration::from_secs(5);
    config
}

fn text_connection(delay: AdditionalDelay) -> Connection {
    Arc::new(
        ConnectionDescriptor::logical(
            ConnectionEndpoint::new(FederateId(0), PortRef::scalar("sender.out")),
            ConnectionEndpoint::new(FederateId(1), PortRef::scalar("receiver.in")),
            ValueType::Text,
        )
        .with_delay(delay),
    )
}

fn runtime(
    config: FederateConfig,
    connections: &[Connection],
    scheduler: Arc<MockScheduler>,
    fatal: Arc<CollectFatal>,
) -> FederateRuntime {
    let plan = FederatePlan::build(
        config.federate_id,
        connections,
        config.coordination.mode,
        &HashMap::new(),
    )
    .unwrap();
    FederateRuntime::new(config, plan, scheduler)
        .unwrap()
        .with_fatal_handler(fatal)
}

fn millis(ms: i64) -> Instant {
    Instant(Interval::from_millis(ms).as_nanos())
}

#[test]
fn test_coordinator_unreachable_fails_startup() {
    // Grab a free port and release it so nothing listens there.
    let port = {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        listener.local_addr().unwrap().port()
    };
    let fatal = Arc::new(CollectFatal::new());
    let mut federate = runtime(
        config(0, port, Coordination::Centralized),
        &[],
        Arc::new(MockScheduler::new(Tag::at(Instant(0)))),
        fatal,
    );

    let err = federate.start().unwrap_err();
    assert!(matches!(err, FederateError::Unreachable { attempts: 3, .. }));
    assert_eq!(err.category(), ErrorCategory::Connectivity);
    assert!(err.is_fatal());
    assert_ne!(federate.state(), RuntimeState::Running);
}

#[test]
fn test_handshake_and_resign() {
    let coordinator = FakeCoordinator::start(FakeCoordinatorConfig::new(FEDERATION, 2)).unwrap();
    let fatal = Arc::new(CollectFatal::new());
    let mut federate = runtime(
        config(1, coordinator.port(), Coordination::Centralized),
        &[],
        Arc::new(MockScheduler::new(Tag::at(Instant(0)))),
        fatal.clone(),
    );

    federate.start().unwrap();
    assert_eq!(federate.state(), RuntimeState::Running);
    assert!(wait_for(Duration::from_secs(5), || coordinator
        .connected()
        .contains(&FederateId(1))));
    // Same host and not forced: no clock sync.
    assert_eq!(coordinator.sync_exchanges(), 0);

    federate.shutdown();
    assert_eq!(federate.state(), RuntimeState::Closed);
    assert!(wait_for(Duration::from_secs(5), || coordinator
        .has_resigned(FederateId(1))));
    assert!(fatal.is_empty());
}

#[test]
fn test_neighbor_structure_reaches_coordinator() {
    let coordinator = FakeCoordinator::start(FakeCoordinatorConfig::new(FEDERATION, 3)).unwrap();
    let downstream = Arc::new(ConnectionDescriptor::logical(
        ConnectionEndpoint::new(FederateId(1), PortRef::scalar("receiver.out")),
        ConnectionEndpoint::new(FederateId(2), PortRef::scalar("sink.in")),
        ValueType::Text,
    ));
    let connections = vec![
        text_connection(AdditionalDelay::After(Interval::from_millis(10))),
        downstream,
    ];
    let fatal = Arc::new(CollectFatal::new());
    let mut federate = runtime(
        config(1, coordinator.port(), Coordination::Centralized),
        &connections,
        Arc::new(MockScheduler::new(Tag::at(Instant(0)))),
        fatal.clone(),
    );

    federate.start().unwrap();
    assert!(wait_for(Duration::from_secs(5), || coordinator
        .neighbors(FederateId(1))
        .is_some()));
    assert_eq!(
        coordinator.neighbors(FederateId(1)),
        Some(NeighborStructure {
            upstream: vec![(FederateId(0), Some(Interval::from_millis(10)))],
            downstream: vec![FederateId(2)],
        })
    );
    assert!(coordinator.received().is_empty());

    federate.shutdown();
    assert!(fatal.is_empty());
}

#[test]
fn test_federation_id_mismatch_is_rejected() {
    let coordinator =
        FakeCoordinator::start(FakeCoordinatorConfig::new("other-federation", 2)).unwrap();
    let mut federate = runtime(
        config(0, coordinator.port(), Coordination::Centralized),
        &[],
        Arc::new(MockScheduler::new(Tag::at(Instant(0)))),
        Arc::new(CollectFatal::new()),
    );

    let err = federate.start().unwrap_err();
    assert!(matches!(
        err,
        FederateError::Rejected {
            reason: RejectReason::FederationIdMismatch,
            ..
        }
    ));
    assert_eq!(coordinator.rejections(), vec![RejectReason::FederationIdMismatch]);
}

#[test]
fn test_forced_clock_sync_tracks_coordinator_skew() {
    let skew = Interval::from_secs(2);
    let coordinator = FakeCoordinator::start(
        FakeCoordinatorConfig::new(FEDERATION, 1).with_clock_skew(skew),
    )
    .unwrap();
    let mut config = config(0, coordinator.port(), Coordination::Centralized);
    config.clock_sync = ClockSyncConfig {
        mode: ClockSyncMode::Init,
        exchanges_per_interval: 5,
        force: true,
        ..ClockSyncConfig::default()
    };
    let mut federate = runtime(
        config,
        &[],
        Arc::new(MockScheduler::new(Tag::at(Instant(0)))),
        Arc::new(CollectFatal::new()),
    );

    federate.start().unwrap();
    let offset = federate.clock().offset().get();
    assert!(
        (offset.0 - skew.0).abs() < Interval::from_millis(100).0,
        "offset {offset}"
    );
    assert!(wait_for(Duration::from_secs(5), || coordinator
        .sync_exchanges()
        == 5));
}

#[test]
fn test_periodic_clock_sync_runs_while_running() {
    let coordinator = FakeCoordinator::start(FakeCoordinatorConfig::new(FEDERATION, 1)).unwrap();
    let mut config = config(0, coordinator.port(), Coordination::Centralized);
    config.clock_sync = ClockSyncConfig {
        mode: ClockSyncMode::On,
        exchanges_per_interval: 2,
        period: Duration::from_millis(50),
        force: true,
        test_offset: None,
    };
    let fatal = Arc::new(CollectFatal::new());
    let mut federate = runtime(
        config,
        &[],
        Arc::new(MockScheduler::new(Tag::at(Instant(0)))),
        fatal.clone(),
    );

    federate.start().unwrap();
    assert!(wait_for(Duration::from_secs(5), || coordinator
        .sync_exchanges()
        >= 6));
    federate.shutdown();
    assert!(fatal.is_empty(), "{:?}", fatal.messages());
}

#[test]
fn test_test_offset_is_applied_per_federate() {
    let coordinator = FakeCoordinator::start(FakeCoordinatorConfig::new(FEDERATION, 3)).unwrap();
    let mut config = config(2, coordinator.port(), Coordination::Centralized);
    config.clock_sync.mode = ClockSyncMode::Off;
    config.clock_sync.test_offset = Some(Duration::from_millis(7));
    let mut federate = runtime(
        config,
        &[],
        Arc::new(MockScheduler::new(Tag::at(Instant(0)))),
        Arc::new(CollectFatal::new()),
    );

    federate.start().unwrap();
    assert_eq!(federate.clock().offset().get(), Interval::from_millis(21));
}

#[test]
#[serial]
fn test_decentralized_delayed_message_reaches_peer() {
    let coordinator = FakeCoordinator::start(FakeCoordinatorConfig::new(FEDERATION, 2)).unwrap();
    let connections = vec![text_connection(AdditionalDelay::After(Interval::from_millis(
        10,
    )))];

    let receiver_scheduler = Arc::new(MockScheduler::new(Tag::at(millis(110))));
    let receiver_fatal = Arc::new(CollectFatal::new());
    let mut receiver_config = config(1, coordinator.port(), Coordination::Decentralized);
    // Probe upwards from the default base port.
    receiver_config.server.host = "127.0.0.1".into();
    let receiver = {
        let mut runtime = runtime(
            receiver_config,
            &connections,
            receiver_scheduler.clone(),
            receiver_fatal.clone(),
        );
        thread::spawn(move || runtime.start().map(|_| runtime))
    };

    let sender_scheduler = Arc::new(MockScheduler::new(Tag::at(millis(100))));
    let sender_fatal = Arc::new(CollectFatal::new());
    let mut sender = runtime(
        config(0, coordinator.port(), Coordination::Decentralized),
        &connections,
        sender_scheduler.clone(),
        sender_fatal.clone(),
    );
    sender.start().unwrap();
    let mut receiver = receiver.join().unwrap().unwrap();
    assert!(coordinator.advertised_port(FederateId(1)).is_some());

    // Sender emits "5" at (100ms, 0).
    sender_scheduler.set(
        &PortRef::scalar("sender.out"),
        PortValue::Text("5".into()),
    );
    let outcome = sender.plan().senders()[0]
        .react(&sender.reaction_context())
        .unwrap();
    assert_eq!(outcome, SendOutcome::Sent);

    assert!(wait_for(Duration::from_secs(5), || !receiver_scheduler
        .scheduled()
        .is_empty()));
    let intended = Tag::at(millis(110));

    // The input control at (110ms, 0) sees the port present.
    let ctx = receiver.reaction_context();
    let status = receiver.plan().input_controls()[0].react(&ctx);
    assert_eq!(status, PortStatus::Present);

    let (_, message) = receiver_scheduler.take_scheduled().remove(0);
    assert_eq!(message.intended_tag, Some(intended));
    receiver.deliver(&message).unwrap();

    let port = PortRef::scalar("receiver.in");
    assert_eq!(
        receiver_scheduler.get(&port).unwrap().as_text(),
        Some("5")
    );
    assert_eq!(
        receiver_scheduler.annotations(&port).unwrap().intended_tag,
        Some(intended)
    );
    // Direct link: nothing went through the coordinator.
    assert!(coordinator.received().is_empty());

    sender.shutdown();
    receiver.shutdown();
    assert!(sender_fatal.is_empty(), "{:?}", sender_fatal.messages());
    assert!(receiver_fatal.is_empty(), "{:?}", receiver_fatal.messages());
}

#[test]
fn test_centralized_messages_route_through_coordinator() {
    let coordinator = FakeCoordinator::start(FakeCoordinatorConfig::new(FEDERATION, 2)).unwrap();
    let connections = vec![text_connection(AdditionalDelay::None)];

    let receiver_scheduler = Arc::new(MockScheduler::new(Tag::at(millis(5))));
    let mut receiver = runtime(
        config(1, coordinator.port(), Coordination::Centralized),
        &connections,
        receiver_scheduler.clone(),
        Arc::new(CollectFatal::new()),
    );
    receiver.start().unwrap();
    // No peer-to-peer sockets under centralized coordination.
    assert_eq!(receiver.server_port(), None);

    let sender_scheduler = Arc::new(MockScheduler::new(Tag::at(millis(5))));
    let mut sender = runtime(
        config(0, coordinator.port(), Coordination::Centralized),
        &connections,
        sender_scheduler.clone(),
        Arc::new(CollectFatal::new()),
    );
    sender.start().unwrap();
    let ctx = sender.reaction_context();

    // Unset output: the output control announces absence at (5ms, 0).
    assert!(sender.plan().output_controls()[0].react(&ctx).unwrap());
    assert!(wait_for(Duration::from_secs(5), || receiver
        .board()
        .status(fedlink_types::PortId(0), Tag::at(millis(5)))
        == PortStatus::Absent));

    // Set output at (6ms, 0): relayed as a tagged message.
    sender_scheduler.advance_to(Tag::at(millis(6)));
    sender_scheduler.set(
        &PortRef::scalar("sender.out"),
        PortValue::Text("hello".into()),
    );
    sender.plan().senders()[0].react(&ctx).unwrap();
    assert!(!sender.plan().output_controls()[0].react(&ctx).unwrap());

    assert!(wait_for(Duration::from_secs(5), || receiver_scheduler
        .scheduled()
        .len()
        == 1));
    let (_, message) = receiver_scheduler.take_scheduled().remove(0);
    receiver.deliver(&message).unwrap();
    let port = PortRef::scalar("receiver.in");
    assert_eq!(receiver_scheduler.get(&port).unwrap().as_text(), Some("hello"));
    // Centralized: the intended tag is not copied onto the port.
    assert_eq!(receiver_scheduler.annotations(&port).unwrap().intended_tag, None);

    let relayed: Vec<_> = coordinator
        .received()
        .into_iter()
        .map(|(from, frame)| (from, frame.type_name()))
        .collect();
    assert_eq!(
        relayed,
        vec![
            (FederateId(0), "PortAbsent"),
            (FederateId(0), "TaggedMessage"),
        ]
    );
    assert!(matches!(
        coordinator.received()[1].1,
        Frame::TaggedMessage(ref m) if m.tag == Tag::at(millis(6))
    ));
}

#[test]
fn test_missing_inbound_peer_strict_fails() {
    let coordinator = FakeCoordinator::start(FakeCoordinatorConfig::new(FEDERATION, 2)).unwrap();
    let connections = vec![text_connection(AdditionalDelay::None)];
    let mut config = config(1, coordinator.port(), Coordination::Decentralized);
    config.server.port = Some(0);
    config.peers.connect_timeout = Duration::from_millis(100);

    let mut federate = runtime(
        config,
        &connections,
        Arc::new(MockScheduler::new(Tag::at(Instant(0)))),
        Arc::new(CollectFatal::new()),
    );
    let err = federate.start().unwrap_err();
    assert!(matches!(err, FederateError::Unreachable { .. }));
    assert!(federate.server_port().is_some());
}

#[test]
fn test_shutdown_releases_blocked_input_control() {
    let coordinator = FakeCoordinator::start(FakeCoordinatorConfig::new(FEDERATION, 2)).unwrap();
    let connections = vec![text_connection(AdditionalDelay::None)];
    let mut config = config(1, coordinator.port(), Coordination::Decentralized);
    config.server.port = Some(0);
    config.peers.connect_timeout = Duration::from_millis(100);
    config.peers.unreachable = UnreachablePeerPolicy::BestEffort;
    config.coordination.stp_offset = Duration::from_secs(3600);

    let scheduler = Arc::new(MockScheduler::new(Tag::at(PhysicalClock::raw_now())));
    let mut federate = runtime(
        config,
        &connections,
        scheduler.clone(),
        Arc::new(CollectFatal::new()),
    );
    federate.start().unwrap();
    assert_eq!(federate.state(), RuntimeState::Running);

    let ctx = federate.reaction_context();
    let control = federate.plan().input_controls()[0].clone();
    let waiter = thread::spawn(move || control.react(&ctx));

    thread::sleep(Duration::from_millis(50));
    assert!(!waiter.is_finished());
    federate.shutdown();

    assert_eq!(waiter.join().unwrap(), PortStatus::Absent);
    assert!(scheduler.is_absent(&PortRef::scalar("receiver.in")));
}
