//! Error taxonomy for a federate.

use fedlink_messages::{CodecError, FrameError, RejectReason};
use fedlink_types::{DescriptorError, FederateId, TimeError};
use std::fmt;
use std::io;
use thiserror::Error;

/// Where a frame was headed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Coordinator,
    Federate(FederateId),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Coordinator => write!(f, "coordinator"),
            Destination::Federate(id) => write!(f, "federate {}", id.0),
        }
    }
}

/// Errors on the send path.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("no connection to {0}")]
    NotConnected(Destination),

    #[error("connection to {0} is closed")]
    Closed(Destination),

    #[error("failed to write to {destination}: {source}")]
    Io {
        destination: Destination,
        #[source]
        source: io::Error,
    },

    #[error("cannot encode frame for {destination}: {source}")]
    Encode {
        destination: Destination,
        #[source]
        source: FrameError,
    },
}

/// Broad classes of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Coordinator or peer unreachable, or reset mid-stream.
    Connectivity,
    /// Unsupported serializer, malformed or unexpected message.
    Protocol,
    /// Failure to deliver a message.
    Send,
    /// Time arithmetic overflow.
    Time,
    /// Invalid configuration.
    Configuration,
    /// Local operating-system failure, such as a thread that cannot start.
    Io,
}

/// Errors surfaced by the coordination layer.
#[derive(Debug, Error)]
pub enum FederateError {
    #[error("{what} unreachable after {attempts} attempts: {source}")]
    Unreachable {
        what: String,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("{what} rejected the connection: {reason:?}")]
    Rejected { what: String, reason: RejectReason },

    #[error("lost connection to {what}: {detail}")]
    ConnectionLost { what: String, detail: String },

    #[error("protocol error with {peer}: {detail}")]
    Protocol { peer: String, detail: String },

    #[error("malformed frame from {peer}: {source}")]
    Frame {
        peer: String,
        #[source]
        source: FrameError,
    },

    #[error("codec error on {connection}: {source}")]
    Codec {
        connection: String,
        #[source]
        source: CodecError,
    },

    #[error("invalid connection: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("time error: {0}")]
    Time(#[from] TimeError),

    #[error("send failed on {connection}: {source}")]
    Send {
        connection: String,
        physical: bool,
        #[source]
        source: SendError,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{what}: {source}")]
    Io {
        what: String,
        #[source]
        source: io::Error,
    },
}

impl FederateError {
    pub fn protocol(peer: impl fmt::Display, detail: impl Into<String>) -> Self {
        FederateError::Protocol {
            peer: peer.to_string(),
            detail: detail.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            FederateError::Unreachable { .. }
            | FederateError::Rejected { .. }
            | FederateError::ConnectionLost { .. } => ErrorCategory::Connectivity,
            FederateError::Protocol { .. }
            | FederateError::Frame { .. }
            | FederateError::Codec { .. }
            | FederateError::Descriptor(_) => ErrorCategory::Protocol,
            FederateError::Send { .. } => ErrorCategory::Send,
            FederateError::Time(_) => ErrorCategory::Time,
            FederateError::Config(_) => ErrorCategory::Configuration,
            FederateError::Io { .. } => ErrorCategory::Io,
        }
    }

    /// Whether the federate must terminate.
    ///
    /// Only send failures on physical connections are survivable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FederateError::Send { physical: true, .. })
    }
}
