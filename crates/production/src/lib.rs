//! Production runtime for a federate.
//!
//! Connects a federate to its coordinator and peers over TCP, keeps its clock
//! synchronized, and feeds inbound messages to the control-reaction protocol.
//!
//! # Modules
//!
//! - [`config`]: TOML configuration and validation
//! - [`network`]: transport manager (coordinator link, peer sockets, readers)
//! - [`clock_sync`]: initial and periodic clock synchronization
//! - [`runtime`]: [`FederateRuntime`] and its lifecycle
//! - [`fatal`]: what happens to fatal errors raised on background threads
//! - [`telemetry`]: tracing setup

pub mod clock_sync;
pub mod config;
pub mod fatal;
pub mod network;
pub mod runtime;
pub mod telemetry;

pub use clock_sync::ClockSyncMode;
pub use config::{ConfigError, FederateConfig, UnreachablePeerPolicy};
pub use fatal::{CollectFatal, ExitProcess, FatalHandler};
pub use network::RetryPolicy;
pub use runtime::{FederateRuntime, RuntimeState};
