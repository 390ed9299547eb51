//! Network receiver reaction.

use crate::ReactionContext;
use fedlink_core::{FederateError, PortAnnotations, ReceivedMessage};
use fedlink_types::{Connection, PortId};
use tracing::trace;

/// Delivers a received message into the destination input port.
#[derive(Debug, Clone)]
pub struct NetworkReceiver {
    connection: Connection,
    action: PortId,
}

impl NetworkReceiver {
    pub fn new(connection: Connection, action: PortId) -> Self {
        Self { connection, action }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn action(&self) -> PortId {
        self.action
    }

    /// Copy arrival metadata onto the port, then decode and set its value.
    ///
    /// The intended tag is only copied under decentralized coordination on
    /// logical connections.
    pub fn react(
        &self,
        ctx: &ReactionContext,
        message: &ReceivedMessage,
    ) -> Result<(), FederateError> {
        let port = &self.connection.destination.port;
        let intended_tag = if ctx.is_decentralized() && !self.connection.physical {
            message.intended_tag
        } else {
            None
        };
        ctx.scheduler.annotate(
            port,
            PortAnnotations {
                physical_arrival: message.physical_arrival,
                intended_tag,
            },
        );

        let value = ctx
            .codec
            .decode(
                self.connection.serializer,
                &self.connection.value_type,
                message.payload.clone(),
            )
            .map_err(|source| FederateError::Codec {
                connection: self.connection.to_string(),
                source,
            })?;
        trace!(%port, kind = value.kind_name(), "Delivered network input");
        ctx.scheduler.set(port, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use fedlink_core::Scheduler;
    use fedlink_test_helpers::{MockScheduler, RecordingSink};
    use fedlink_types::{
        ConnectionDescriptor, ConnectionEndpoint, Coordination, FederateId, Instant, PortRef,
        Tag, ValueType,
    };
    use std::sync::Arc;

    fn receiver(physical: bool) -> NetworkReceiver {
        let source = ConnectionEndpoint::new(FederateId(0), PortRef::scalar("s.out"));
        let destination = ConnectionEndpoint::new(FederateId(1), PortRef::scalar("r.in"));
        let descriptor = if physical {
            ConnectionDescriptor::physical(source, destination, ValueType::Text)
        } else {
            ConnectionDescriptor::logical(source, destination, ValueType::Text)
        };
        NetworkReceiver::new(Arc::new(descriptor), PortId(0))
    }

    fn message() -> ReceivedMessage {
        ReceivedMessage {
            port: PortId(0),
            payload: Bytes::from_static(b"hi\0"),
            physical_arrival: Instant(42),
            intended_tag: Some(Tag::at(Instant(40))),
        }
    }

    #[test]
    fn test_copies_intended_tag_when_decentralized() {
        let scheduler = Arc::new(MockScheduler::new(Tag::at(Instant(40))));
        let ctx = ReactionContext::new(
            FederateId(1),
            Coordination::Decentralized,
            scheduler.clone(),
            Arc::new(RecordingSink::new()),
        );

        receiver(false).react(&ctx, &message()).unwrap();

        let port = PortRef::scalar("r.in");
        assert_eq!(scheduler.get(&port).unwrap().as_text(), Some("hi"));
        let annotations = scheduler.annotations(&port).unwrap();
        assert_eq!(annotations.physical_arrival, Instant(42));
        assert_eq!(annotations.intended_tag, Some(Tag::at(Instant(40))));
    }

    #[test]
    fn test_centralized_and_physical_drop_intended_tag() {
        for (coordination, physical) in [
            (Coordination::Centralized, false),
            (Coordination::Decentralized, true),
        ] {
            let scheduler = Arc::new(MockScheduler::new(Tag::at(Instant(40))));
            let ctx = ReactionContext::new(
                FederateId(1),
                coordination,
                scheduler.clone(),
                Arc::new(RecordingSink::new()),
            );
            receiver(physical).react(&ctx, &message()).unwrap();

            let annotations = scheduler.annotations(&PortRef::scalar("r.in")).unwrap();
            assert_eq!(annotations.intended_tag, None);
            assert_eq!(annotations.physical_arrival, Instant(42));
        }
    }

    #[test]
    fn test_malformed_payload_is_codec_error() {
        let scheduler = Arc::new(MockScheduler::new(Tag::at(Instant(0))));
        let ctx = ReactionContext::new(
            FederateId(1),
            Coordination::Decentralized,
            scheduler.clone(),
            Arc::new(RecordingSink::new()),
        );
        let mut bad = message();
        bad.payload = Bytes::from_static(b"no terminator");

        let err = receiver(false).react(&ctx, &bad).unwrap_err();
        assert!(matches!(err, FederateError::Codec { .. }));
        assert!(scheduler.get(&PortRef::scalar("r.in")).is_none());
    }
}
