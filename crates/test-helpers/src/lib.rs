//! Test helpers for fedlink.
//!
//! - [`MockScheduler`]: in-memory [`Scheduler`](fedlink_core::Scheduler) recording every call
//! - [`RecordingSink`]: [`MessageSink`](fedlink_core::MessageSink) capturing frames, with injectable failures
//! - [`FakeCoordinator`]: scripted coordinator on a loopback socket

mod coordinator;
mod scheduler;
mod sink;

pub use coordinator::{FakeCoordinator, FakeCoordinatorConfig};
pub use scheduler::MockScheduler;
pub use sink::RecordingSink;

use std::time::{Duration, Instant};

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
