//! Per-federate reaction plan derived from the federation's connections.
//!
//! Network message action ordinals are assigned per destination federate in
//! connection-list order. Every federate builds its plan from the same list,
//! so a sender's destination port id always matches the receiver's action.

use crate::reactions::{InputControl, NetworkReceiver, NetworkSender, OutputControl};
use crate::{InboundDispatcher, PortStatusBoard};
use fedlink_core::{PhysicalClock, Scheduler};
use fedlink_messages::NeighborStructure;
use fedlink_types::{
    AdditionalDelay, Connection, Coordination, DescriptorError, FederateId, Interval, PortId,
    PortRef,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors building a federate plan.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("invalid connection {connection}: {source}")]
    Descriptor {
        connection: String,
        #[source]
        source: DescriptorError,
    },

    #[error("{0} has more network inputs than fit a port id")]
    TooManyActions(FederateId),
}

/// Peer-to-peer links of one federate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerTopology {
    /// Federates that open a socket to us.
    pub inbound: BTreeSet<FederateId>,
    /// Federates we open a socket to.
    pub outbound: BTreeSet<FederateId>,
}

impl PeerTopology {
    pub fn has_inbound(&self) -> bool {
        !self.inbound.is_empty()
    }
}

/// Network reactions and topology of one federate.
#[derive(Debug, Clone)]
pub struct FederatePlan {
    federate: FederateId,
    coordination: Coordination,
    senders: Vec<NetworkSender>,
    output_controls: Vec<OutputControl>,
    receivers: Vec<NetworkReceiver>,
    input_controls: Vec<InputControl>,
    topology: PeerTopology,
    /// Logical upstream federates and the smallest delay from each.
    upstream: BTreeMap<FederateId, Option<Interval>>,
    downstream: BTreeSet<FederateId>,
}

impl FederatePlan {
    /// Build the plan of `federate`.
    ///
    /// `connections` must be the full federation connection list in
    /// generation order. `max_stp` maps destination ports to the largest STP
    /// among their downstream reactions; it only matters under decentralized
    /// coordination.
    pub fn build(
        federate: FederateId,
        connections: &[Connection],
        coordination: Coordination,
        max_stp: &HashMap<PortRef, Interval>,
    ) -> Result<Self, PlanError> {
        let mut next_ordinal: HashMap<FederateId, u32> = HashMap::new();
        let mut plan = FederatePlan {
            federate,
            coordination,
            senders: Vec::new(),
            output_controls: Vec::new(),
            receivers: Vec::new(),
            input_controls: Vec::new(),
            topology: PeerTopology::default(),
            upstream: BTreeMap::new(),
            downstream: BTreeSet::new(),
        };

        for connection in connections {
            connection
                .validate()
                .map_err(|source| PlanError::Descriptor {
                    connection: connection.to_string(),
                    source,
                })?;

            let destination = connection.destination.federate;
            let counter = next_ordinal.entry(destination).or_insert(0);
            let ordinal = u16::try_from(*counter)
                .map_err(|_| PlanError::TooManyActions(destination))?;
            *counter += 1;
            let port = PortId(ordinal);
            let direct = connection.route(coordination).is_direct();

            if connection.source.federate == federate {
                plan.senders
                    .push(NetworkSender::new(Arc::clone(connection), port));
                if !connection.physical {
                    plan.output_controls
                        .push(OutputControl::new(Arc::clone(connection), port));
                    plan.downstream.insert(destination);
                }
                if direct {
                    plan.topology.outbound.insert(destination);
                }
            }

            if destination == federate {
                plan.receivers
                    .push(NetworkReceiver::new(Arc::clone(connection), port));
                if !connection.physical {
                    let stp = match coordination {
                        Coordination::Decentralized => max_stp
                            .get(&connection.destination.port)
                            .copied()
                            .unwrap_or(Interval::ZERO),
                        Coordination::Centralized => Interval::ZERO,
                    };
                    plan.input_controls.push(InputControl::new(
                        connection.destination.port.clone(),
                        port,
                        stp,
                    ));
                    let delay = match connection.delay {
                        AdditionalDelay::None => None,
                        AdditionalDelay::After(delay) => Some(delay),
                    };
                    // `None` orders first, so an undelayed link dominates.
                    plan.upstream
                        .entry(connection.source.federate)
                        .and_modify(|min| *min = (*min).min(delay))
                        .or_insert(delay);
                }
                if direct {
                    plan.topology.inbound.insert(connection.source.federate);
                }
            }
        }

        debug!(
            %federate,
            senders = plan.senders.len(),
            receivers = plan.receivers.len(),
            upstream = plan.upstream.len(),
            downstream = plan.downstream.len(),
            inbound_peers = plan.topology.inbound.len(),
            outbound_peers = plan.topology.outbound.len(),
            "Built federate plan"
        );
        Ok(plan)
    }

    pub fn federate(&self) -> FederateId {
        self.federate
    }

    pub fn coordination(&self) -> Coordination {
        self.coordination
    }

    pub fn senders(&self) -> &[NetworkSender] {
        &self.senders
    }

    pub fn output_controls(&self) -> &[OutputControl] {
        &self.output_controls
    }

    pub fn receivers(&self) -> &[NetworkReceiver] {
        &self.receivers
    }

    pub fn input_controls(&self) -> &[InputControl] {
        &self.input_controls
    }

    /// Receiver reaction for a network message action.
    pub fn receiver(&self, action: PortId) -> Option<&NetworkReceiver> {
        self.receivers.get(action.ordinal())
    }

    pub fn topology(&self) -> &PeerTopology {
        &self.topology
    }

    /// Whether any logical connection feeds this federate.
    pub fn has_upstream(&self) -> bool {
        !self.upstream.is_empty()
    }

    /// Whether this federate feeds any logical connection.
    pub fn has_downstream(&self) -> bool {
        !self.downstream.is_empty()
    }

    /// Logical dependencies to announce to the coordinator.
    pub fn neighbor_structure(&self) -> NeighborStructure {
        NeighborStructure {
            upstream: self.upstream.iter().map(|(id, delay)| (*id, *delay)).collect(),
            downstream: self.downstream.iter().copied().collect(),
        }
    }

    /// Dispatcher for frames addressed to this federate's actions.
    pub fn dispatcher(
        &self,
        board: Arc<PortStatusBoard>,
        scheduler: Arc<dyn Scheduler>,
        clock: PhysicalClock,
    ) -> InboundDispatcher {
        let actions = self
            .receivers
            .iter()
            .map(|r| Arc::clone(r.connection()))
            .collect();
        InboundDispatcher::new(self.federate, actions, board, scheduler, clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedlink_types::{
        BankChannel, ConnectionDescriptor, ConnectionEndpoint, Serializer, ValueType,
    };

    fn conn(src: u16, dst: u16, port: &str, physical: bool) -> Connection {
        let source = ConnectionEndpoint::new(FederateId(src), PortRef::scalar(format!("{port}.out")));
        let destination =
            ConnectionEndpoint::new(FederateId(dst), PortRef::scalar(format!("{port}.in")));
        Arc::new(if physical {
            ConnectionDescriptor::physical(source, destination, ValueType::Text)
        } else {
            ConnectionDescriptor::logical(source, destination, ValueType::Text)
        })
    }

    #[test]
    fn test_ordinals_agree_between_sender_and_receiver() {
        let connections = vec![
            conn(0, 2, "a", false),
            conn(1, 2, "b", false),
            conn(0, 1, "c", false),
            conn(0, 2, "d", true),
        ];
        let stp = HashMap::new();
        let sender =
            FederatePlan::build(FederateId(0), &connections, Coordination::Centralized, &stp)
                .unwrap();
        let receiver =
            FederatePlan::build(FederateId(2), &connections, Coordination::Centralized, &stp)
                .unwrap();

        let sent: Vec<_> = sender
            .senders()
            .iter()
            .map(|s| (s.connection().destination.port.clone(), s.destination_port()))
            .collect();
        assert_eq!(
            sent,
            vec![
                (PortRef::scalar("a.in"), PortId(0)),
                (PortRef::scalar("c.in"), PortId(0)),
                (PortRef::scalar("d.in"), PortId(2)),
            ]
        );
        assert_eq!(
            receiver.receiver(PortId(2)).unwrap().connection().destination.port,
            PortRef::scalar("d.in")
        );
        assert_eq!(receiver.receivers().len(), 3);
        // The physical connection gets no input control.
        assert_eq!(receiver.input_controls().len(), 2);
    }

    #[test]
    fn test_topology_depends_on_coordination() {
        let connections = vec![conn(0, 1, "a", false), conn(0, 2, "b", true)];
        let stp = HashMap::new();

        let centralized =
            FederatePlan::build(FederateId(0), &connections, Coordination::Centralized, &stp)
                .unwrap();
        assert_eq!(
            centralized.topology().outbound,
            BTreeSet::from([FederateId(2)])
        );
        assert!(centralized.has_downstream());
        assert!(!centralized.has_upstream());

        let decentralized = FederatePlan::build(
            FederateId(0),
            &connections,
            Coordination::Decentralized,
            &stp,
        )
        .unwrap();
        assert_eq!(
            decentralized.topology().outbound,
            BTreeSet::from([FederateId(1), FederateId(2)])
        );

        let receiver =
            FederatePlan::build(FederateId(2), &connections, Coordination::Centralized, &stp)
                .unwrap();
        assert!(receiver.topology().has_inbound());
        // Physical links are not logical dependencies.
        assert!(!receiver.has_upstream());
    }

    #[test]
    fn test_neighbor_structure_keeps_smallest_delay() {
        let delayed = |src, port, ms| {
            Arc::new(
                (*conn(src, 1, port, false))
                    .clone()
                    .with_delay(AdditionalDelay::After(Interval::from_millis(ms))),
            )
        };
        let connections = vec![
            delayed(0, "a", 10),
            delayed(0, "b", 4),
            delayed(2, "c", 7),
            conn(2, 1, "d", false),
            conn(3, 1, "e", true),
            conn(1, 4, "f", false),
            conn(1, 5, "g", true),
        ];
        let plan = FederatePlan::build(
            FederateId(1),
            &connections,
            Coordination::Centralized,
            &HashMap::new(),
        )
        .unwrap();

        let neighbors = plan.neighbor_structure();
        assert_eq!(
            neighbors.upstream,
            vec![
                (FederateId(0), Some(Interval::from_millis(4))),
                (FederateId(2), None),
            ]
        );
        // Physical links are not dependencies.
        assert_eq!(neighbors.downstream, vec![FederateId(4)]);
    }

    #[test]
    fn test_max_stp_only_applies_when_decentralized() {
        let connections = vec![conn(0, 1, "a", false)];
        let stp = HashMap::from([(PortRef::scalar("a.in"), Interval::from_millis(20))]);

        let plan =
            FederatePlan::build(FederateId(1), &connections, Coordination::Decentralized, &stp)
                .unwrap();
        assert_eq!(plan.input_controls()[0].max_stp(), Interval::from_millis(20));

        let plan =
            FederatePlan::build(FederateId(1), &connections, Coordination::Centralized, &stp)
                .unwrap();
        assert_eq!(plan.input_controls()[0].max_stp(), Interval::ZERO);
    }

    #[test]
    fn test_multiport_channels_get_separate_actions() {
        let connections: Vec<Connection> = (0..3)
            .map(|ch| {
                Arc::new(ConnectionDescriptor::logical(
                    ConnectionEndpoint::new(
                        FederateId(0),
                        PortRef::new("s.out", BankChannel::channel(ch)),
                    ),
                    ConnectionEndpoint::new(
                        FederateId(1),
                        PortRef::new("r.in", BankChannel::channel(ch)),
                    ),
                    ValueType::Text,
                ))
            })
            .collect();
        let plan = FederatePlan::build(
            FederateId(0),
            &connections,
            Coordination::Decentralized,
            &HashMap::new(),
        )
        .unwrap();
        let ports: Vec<_> = plan.senders().iter().map(|s| s.destination_port()).collect();
        assert_eq!(ports, vec![PortId(0), PortId(1), PortId(2)]);
        assert_eq!(plan.output_controls().len(), 3);
    }

    #[test]
    fn test_rejects_proto_serializer() {
        let bad = Arc::new(
            (*conn(0, 1, "a", false))
                .clone()
                .with_serializer(Serializer::Proto),
        );
        let err = FederatePlan::build(
            FederateId(0),
            &[bad],
            Coordination::Centralized,
            &HashMap::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PlanError::Descriptor {
                source: DescriptorError::UnsupportedSerializer(_),
                ..
            }
        ));
    }
}
