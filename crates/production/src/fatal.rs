//! Handling of fatal errors raised on background threads.

use fedlink_core::{ErrorCategory, FederateError};
use parking_lot::Mutex;
use tracing::error;

/// Receives fatal errors from reader, acceptor, and sync threads.
pub trait FatalHandler: Send + Sync {
    fn fatal(&self, error: FederateError);
}

/// Logs the error and terminates the process with status 1.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExitProcess;

impl FatalHandler for ExitProcess {
    fn fatal(&self, err: FederateError) {
        error!(category = ?err.category(), error = %err, "Fatal error, terminating federate");
        std::process::exit(1);
    }
}

/// Keeps fatal errors for inspection instead of exiting.
///
/// For embedding the runtime in a host that decides how to terminate, and
/// for tests.
#[derive(Debug, Default)]
pub struct CollectFatal {
    errors: Mutex<Vec<FederateError>>,
}

impl CollectFatal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }

    pub fn categories(&self) -> Vec<ErrorCategory> {
        self.errors.lock().iter().map(|e| e.category()).collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.errors.lock().iter().map(|e| e.to_string()).collect()
    }

    pub fn take(&self) -> Vec<FederateError> {
        std::mem::take(&mut *self.errors.lock())
    }
}

impl FatalHandler for CollectFatal {
    fn fatal(&self, err: FederateError) {
        error!(category = ?err.category(), error = %err, "Fatal error");
        self.errors.lock().push(err);
    }
}
