//! Socket tables of one federate and the outbound send path.

use super::Endpoint;
use fedlink_core::{Destination, MessageSink, SendError};
use fedlink_messages::Frame;
use fedlink_types::FederateId;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Wakes background threads when the federate shuts down.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    triggered: Mutex<bool>,
    changed: Condvar,
}

impl ShutdownSignal {
    pub fn trigger(&self) {
        *self.triggered.lock() = true;
        self.changed.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.triggered.lock()
    }

    /// Sleep up to `timeout`; returns `true` if shutdown was triggered.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut triggered = self.triggered.lock();
        if !*triggered {
            self.changed.wait_for(&mut triggered, timeout);
        }
        *triggered
    }
}

/// Every socket endpoint of a federate.
///
/// Implements [`MessageSink`] for the network reactions.
#[derive(Debug)]
pub struct Transport {
    federate: FederateId,
    coordinator: RwLock<Option<Arc<Endpoint>>>,
    outbound: RwLock<HashMap<FederateId, Arc<Endpoint>>>,
    inbound: Mutex<HashMap<FederateId, Arc<Endpoint>>>,
    inbound_changed: Condvar,
    shutdown: ShutdownSignal,
}

impl Transport {
    pub fn new(federate: FederateId) -> Self {
        Self {
            federate,
            coordinator: RwLock::new(None),
            outbound: RwLock::new(HashMap::new()),
            inbound: Mutex::new(HashMap::new()),
            inbound_changed: Condvar::new(),
            shutdown: ShutdownSignal::default(),
        }
    }

    pub fn federate(&self) -> FederateId {
        self.federate
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_triggered()
    }

    pub fn set_coordinator(&self, endpoint: Arc<Endpoint>) {
        *self.coordinator.write() = Some(endpoint);
    }

    pub fn coordinator(&self) -> Option<Arc<Endpoint>> {
        self.coordinator.read().clone()
    }

    pub fn add_outbound(&self, peer: FederateId, endpoint: Arc<Endpoint>) {
        self.outbound.write().insert(peer, endpoint);
    }

    pub fn has_outbound(&self, peer: FederateId) -> bool {
        self.outbound.read().contains_key(&peer)
    }

    /// Register an accepted peer; `false` if one is already registered.
    pub fn add_inbound(&self, peer: FederateId, endpoint: Arc<Endpoint>) -> bool {
        let mut inbound = self.inbound.lock();
        if inbound.contains_key(&peer) {
            return false;
        }
        inbound.insert(peer, endpoint);
        drop(inbound);
        self.inbound_changed.notify_all();
        true
    }

    pub fn has_inbound(&self, peer: FederateId) -> bool {
        self.inbound.lock().contains_key(&peer)
    }

    /// Wait until `expected` inbound peers are registered.
    ///
    /// Returns the number registered when the wait ended.
    pub fn wait_for_inbound(&self, expected: usize, timeout: Duration) -> usize {
        let deadline = std::time::Instant::now() + timeout;
        let mut inbound = self.inbound.lock();
        while inbound.len() < expected && !self.shutdown.is_triggered() {
            if self
                .inbound_changed
                .wait_until(&mut inbound, deadline)
                .timed_out()
            {
                break;
            }
        }
        inbound.len()
    }

    /// Mark the transport as shutting down and wake all waiters.
    pub fn begin_shutdown(&self) {
        self.shutdown.trigger();
        let _guard = self.inbound.lock();
        self.inbound_changed.notify_all();
    }

    /// Close every endpoint.
    pub fn close_all(&self) {
        if let Some(coordinator) = self.coordinator() {
            coordinator.close();
        }
        for endpoint in self.outbound.read().values() {
            endpoint.close();
        }
        for endpoint in self.inbound.lock().values() {
            endpoint.close();
        }
    }
}

impl MessageSink for Transport {
    fn send_to_federate(&self, federate: FederateId, frame: &Frame) -> Result<(), SendError> {
        let endpoint = self
            .outbound
            .read()
            .get(&federate)
            .cloned()
            .ok_or(SendError::NotConnected(Destination::Federate(federate)))?;
        endpoint.send(frame)
    }

    fn send_to_coordinator(&self, frame: &Frame) -> Result<(), SendError> {
        let endpoint = self
            .coordinator()
            .ok_or(SendError::NotConnected(Destination::Coordinator))?;
        endpoint.send(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_unknown_peer_is_not_connected() {
        let transport = Transport::new(FederateId(0));
        assert!(matches!(
            transport.send_to_federate(FederateId(3), &Frame::Ack),
            Err(SendError::NotConnected(Destination::Federate(FederateId(3))))
        ));
        assert!(matches!(
            transport.send_to_coordinator(&Frame::Ack),
            Err(SendError::NotConnected(Destination::Coordinator))
        ));
    }

    #[test]
    fn test_shutdown_signal_wakes_waiter() {
        let transport = Arc::new(Transport::new(FederateId(0)));
        let waiter = {
            let transport = Arc::clone(&transport);
            thread::spawn(move || transport.shutdown_signal().wait(Duration::from_secs(30)))
        };
        thread::sleep(Duration::from_millis(20));
        transport.begin_shutdown();
        assert!(waiter.join().unwrap());
        assert!(transport.is_shutting_down());
    }

    #[test]
    fn test_wait_for_inbound_times_out() {
        let transport = Transport::new(FederateId(0));
        assert_eq!(transport.wait_for_inbound(1, Duration::from_millis(20)), 0);
        assert_eq!(transport.wait_for_inbound(0, Duration::from_secs(30)), 0);
    }
}
