//! In-memory [`MessageSink`] that records frames instead of sending them.
//!
//! Sends to selected destinations can be made to fail, to exercise the
//! physical and logical send-failure paths.

use fedlink_core::{Destination, MessageSink, SendError};
use fedlink_messages::Frame;
use fedlink_types::FederateId;
use parking_lot::Mutex;
use std::collections::HashSet;

/// Captures every frame sent, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<(Destination, Frame)>>,
    failing: Mutex<HashSet<Destination>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send to `destination` fail with [`SendError::Closed`].
    pub fn fail_for(&self, destination: Destination) {
        self.failing.lock().insert(destination);
    }

    pub fn frames(&self) -> Vec<(Destination, Frame)> {
        self.frames.lock().clone()
    }

    /// Frames sent to `destination`, in order.
    pub fn frames_to(&self, destination: Destination) -> Vec<Frame> {
        self.frames
            .lock()
            .iter()
            .filter(|(d, _)| *d == destination)
            .map(|(_, f)| f.clone())
            .collect()
    }

    fn record(&self, destination: Destination, frame: &Frame) -> Result<(), SendError> {
        if self.failing.lock().contains(&destination) {
            return Err(SendError::Closed(destination));
        }
        self.frames.lock().push((destination, frame.clone()));
        Ok(())
    }
}

impl MessageSink for RecordingSink {
    fn send_to_federate(&self, federate: FederateId, frame: &Frame) -> Result<(), SendError> {
        self.record(Destination::Federate(federate), frame)
    }

    fn send_to_coordinator(&self, frame: &Frame) -> Result<(), SendError> {
        self.record(Destination::Coordinator, frame)
    }
}
