//! Control-reaction protocol for federated execution.
//!
//! # Overview
//!
//! A network input that is not driven at some tag must not block its
//! federate forever, and an unset network output must not leave its
//! destination waiting. This crate provides:
//!
//! - [`PortStatusBoard`]: per-port known/present state with blocking waits
//! - the four network reactions in [`reactions`]
//! - [`InboundDispatcher`]: reader-thread side of message delivery
//! - [`FederatePlan`]: which reactions a federate runs and which peers it talks to

mod context;
mod inbound;
mod plan;
mod port_status;
pub mod reactions;

pub use context::ReactionContext;
pub use inbound::{Dispatched, InboundDispatcher};
pub use plan::{FederatePlan, PeerTopology, PlanError};
pub use port_status::{MarkOutcome, PortStatus, PortStatusBoard};
pub use reactions::{
    InputControl, NetworkReceiver, NetworkSender, OutputControl, SendOutcome,
};
