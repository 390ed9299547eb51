//! One directed socket link with a serialized send path.

use bytes::Bytes;
use fedlink_core::{Destination, SendError};
use fedlink_messages::Frame;
use parking_lot::Mutex;
use std::io::{self, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Lifecycle of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Open,
    Closed,
}

/// Writable half of a peer or coordinator connection.
///
/// All writes happen under one mutex, and each frame is written as one
/// buffer, so concurrent senders never interleave partial frames. A failed
/// write closes the endpoint.
///
/// Closing goes through a second handle to the socket that is never behind
/// the write mutex, so [`Endpoint::close`] also unblocks a writer stuck on a
/// peer that stopped reading.
#[derive(Debug)]
pub struct Endpoint {
    peer: Destination,
    writer: Mutex<TcpStream>,
    control: TcpStream,
    closed: AtomicBool,
}

impl Endpoint {
    pub fn new(peer: Destination, stream: TcpStream) -> io::Result<Self> {
        let control = stream.try_clone()?;
        Ok(Self {
            peer,
            writer: Mutex::new(stream),
            control,
            closed: AtomicBool::new(false),
        })
    }

    pub fn peer(&self) -> Destination {
        self.peer
    }

    pub fn state(&self) -> EndpointState {
        if self.closed.load(Ordering::Acquire) {
            EndpointState::Closed
        } else {
            EndpointState::Open
        }
    }

    pub fn send(&self, frame: &Frame) -> Result<(), SendError> {
        let bytes = self.encode(frame)?;
        let mut writer = self.writer.lock();
        self.write_locked(&mut writer, &bytes)
    }

    /// Send only if no other write is in progress.
    ///
    /// Returns `Ok(false)` without sending when the endpoint is busy.
    pub fn try_send(&self, frame: &Frame) -> Result<bool, SendError> {
        let bytes = self.encode(frame)?;
        match self.writer.try_lock() {
            Some(mut writer) => self.write_locked(&mut writer, &bytes).map(|()| true),
            None => Ok(false),
        }
    }

    /// Shut the socket down in both directions.
    ///
    /// Readers blocked on a clone of the same socket see end of stream, and a
    /// blocked writer fails with [`SendError::Closed`].
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(peer = %self.peer, "Closing endpoint");
            let _ = self.control.shutdown(Shutdown::Both);
        }
    }

    fn encode(&self, frame: &Frame) -> Result<Bytes, SendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed(self.peer));
        }
        frame.encode().map_err(|source| SendError::Encode {
            destination: self.peer,
            source,
        })
    }

    fn write_locked(&self, writer: &mut TcpStream, bytes: &[u8]) -> Result<(), SendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed(self.peer));
        }
        if let Err(source) = writer.write_all(bytes) {
            if self.closed.swap(true, Ordering::AcqRel) {
                return Err(SendError::Closed(self.peer));
            }
            warn!(peer = %self.peer, error = %source, "Write failed, closing endpoint");
            let _ = self.control.shutdown(Shutdown::Both);
            return Err(SendError::Io {
                destination: self.peer,
                source,
            });
        }
        Ok(())
    }
}
