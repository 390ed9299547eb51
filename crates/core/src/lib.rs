//! Core pieces shared by the coordination protocol and the transport.
//!
//! - [`PhysicalClock`] / [`ClockOffset`]: physical time with skew correction
//! - [`Scheduler`] / [`MessageSink`]: the collaborator seams
//! - [`FederateError`]: the error taxonomy every layer reports through

mod clock;
mod error;
mod message;
mod traits;

pub use clock::{ClockOffset, PhysicalClock};
pub use error::{Destination, ErrorCategory, FederateError, SendError};
pub use message::{PortAnnotations, ReceivedMessage};
pub use traits::{MessageSink, Scheduler};
