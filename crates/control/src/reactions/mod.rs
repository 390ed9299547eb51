//! The reactions generated for every cross-federate connection.
//!
//! - [`NetworkSender`]: serializes and sends a set output
//! - [`OutputControl`]: announces that an output was not set
//! - [`InputControl`]: blocks until a network input is known
//! - [`NetworkReceiver`]: delivers an arrived message into its port

mod input_control;
mod output_control;
mod receiver;
mod sender;

pub use input_control::InputControl;
pub use output_control::OutputControl;
pub use receiver::NetworkReceiver;
pub use sender::{NetworkSender, SendOutcome};
