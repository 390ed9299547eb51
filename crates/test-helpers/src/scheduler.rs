//! Recording [`Scheduler`] whose current tag tests advance by hand.

use fedlink_core::{PortAnnotations, ReceivedMessage, Scheduler};
use fedlink_types::{PortId, PortRef, PortValue, Tag};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

#[derive(Debug)]
struct State {
    tag: Tag,
    values: HashMap<PortRef, PortValue>,
    annotations: HashMap<PortRef, PortAnnotations>,
    absent: HashSet<PortRef>,
    scheduled: Vec<(PortId, ReceivedMessage)>,
}

/// Scheduler stand-in holding port values for a single tag.
#[derive(Debug)]
pub struct MockScheduler {
    state: Mutex<State>,
}

impl MockScheduler {
    pub fn new(tag: Tag) -> Self {
        Self {
            state: Mutex::new(State {
                tag,
                values: HashMap::new(),
                annotations: HashMap::new(),
                absent: HashSet::new(),
                scheduled: Vec::new(),
            }),
        }
    }

    /// Move to `tag`, clearing all port state.
    pub fn advance_to(&self, tag: Tag) {
        let mut state = self.state.lock();
        state.tag = tag;
        state.values.clear();
        state.annotations.clear();
        state.absent.clear();
    }

    pub fn annotations(&self, port: &PortRef) -> Option<PortAnnotations> {
        self.state.lock().annotations.get(port).copied()
    }

    pub fn is_absent(&self, port: &PortRef) -> bool {
        self.state.lock().absent.contains(port)
    }

    /// Messages handed over by reader threads, in arrival order.
    pub fn scheduled(&self) -> Vec<(PortId, ReceivedMessage)> {
        self.state.lock().scheduled.clone()
    }

    /// Remove and return the scheduled messages.
    pub fn take_scheduled(&self) -> Vec<(PortId, ReceivedMessage)> {
        std::mem::take(&mut self.state.lock().scheduled)
    }
}

impl Scheduler for MockScheduler {
    fn current_tag(&self) -> Tag {
        self.state.lock().tag
    }

    fn is_present(&self, port: &PortRef) -> bool {
        self.state.lock().values.contains_key(port)
    }

    fn get(&self, port: &PortRef) -> Option<PortValue> {
        self.state.lock().values.get(port).cloned()
    }

    fn set(&self, port: &PortRef, value: PortValue) {
        let mut state = self.state.lock();
        state.absent.remove(port);
        state.values.insert(port.clone(), value);
    }

    fn annotate(&self, port: &PortRef, annotations: PortAnnotations) {
        self.state
            .lock()
            .annotations
            .insert(port.clone(), annotations);
    }

    fn mark_absent(&self, port: &PortRef) {
        self.state.lock().absent.insert(port.clone());
    }

    fn schedule_network_message(&self, action: PortId, message: ReceivedMessage) {
        self.state.lock().scheduled.push((action, message));
    }
}
