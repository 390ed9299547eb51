//! Reader threads, one per established connection.

use super::Transport;
use crate::clock_sync::SyncRound;
use crate::fatal::FatalHandler;
use fedlink_control::InboundDispatcher;
use fedlink_core::{Destination, FederateError, MessageSink, PhysicalClock};
use fedlink_messages::Frame;
use fedlink_types::FederateId;
use std::io;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

/// Shared handles every reader thread needs.
#[derive(Clone)]
pub struct ReaderContext {
    pub transport: Arc<Transport>,
    pub dispatcher: Arc<InboundDispatcher>,
    pub fatal: Arc<dyn FatalHandler>,
    pub clock: PhysicalClock,
}

/// Read frames from the coordinator until the connection ends.
///
/// Handles runtime clock-sync exchanges in line; everything else goes to
/// the dispatcher. Losing the coordinator while running is fatal.
pub fn spawn_coordinator_reader(
    mut stream: TcpStream,
    ctx: ReaderContext,
    exchanges: u16,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("fedlink-coordinator-reader".into())
        .spawn(move || {
            let mut sync = SyncRound::new(ctx.clock.clone(), exchanges);
            let federate = ctx.transport.federate();
            loop {
                let frame = match Frame::read_from(&mut stream) {
                    Ok(frame) => frame,
                    Err(_) if ctx.transport.is_shutting_down() => return,
                    Err(source) if source.is_disconnect() => {
                        ctx.fatal.fatal(FederateError::ConnectionLost {
                            what: "coordinator".into(),
                            detail: source.to_string(),
                        });
                        return;
                    }
                    Err(source) => {
                        ctx.fatal.fatal(FederateError::Frame {
                            peer: "coordinator".into(),
                            source,
                        });
                        return;
                    }
                };

                let result = match frame {
                    Frame::ClockSyncT1 { time } => {
                        sync.on_t1(time);
                        let sent = ctx
                            .transport
                            .send_to_coordinator(&Frame::ClockSyncT3 { federate });
                        sync.on_t3_sent();
                        sent.map_err(|source| FederateError::ConnectionLost {
                            what: "coordinator".into(),
                            detail: source.to_string(),
                        })
                    }
                    Frame::ClockSyncT4 { time } => {
                        sync.on_t4(time);
                        Ok(())
                    }
                    frame => ctx
                        .dispatcher
                        .dispatch(Destination::Coordinator, frame)
                        .map(|_| ()),
                };
                if let Err(err) = result {
                    if !ctx.transport.is_shutting_down() {
                        ctx.fatal.fatal(err);
                    }
                    return;
                }
            }
        })
}

/// Read frames from an inbound peer until it disconnects.
///
/// A peer closing its socket is normal at the end of its execution.
pub fn spawn_peer_reader(
    peer: FederateId,
    mut stream: TcpStream,
    ctx: ReaderContext,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("fedlink-peer-{}", peer.0))
        .spawn(move || {
            let from = Destination::Federate(peer);
            loop {
                let frame = match Frame::read_from(&mut stream) {
                    Ok(frame) => frame,
                    Err(_) if ctx.transport.is_shutting_down() => return,
                    Err(source) if source.is_disconnect() => {
                        info!(%peer, "Peer closed connection");
                        return;
                    }
                    Err(source) => {
                        ctx.fatal.fatal(FederateError::Frame {
                            peer: peer.to_string(),
                            source,
                        });
                        return;
                    }
                };
                if let Err(err) = ctx.dispatcher.dispatch(from, frame) {
                    debug!(%peer, error = %err, "Dispatch failed");
                    ctx.fatal.fatal(err);
                    return;
                }
            }
        })
}
