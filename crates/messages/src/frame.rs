//! Wire frames exchanged between federates and the coordinator.
//!
//! # Wire Format
//!
//! Every frame starts with a one-byte [`MsgType`] followed by a
//! kind-specific header. All integers are little-endian.
//!
//! ```text
//! tagged:   [type][port u16][federate u16][length u32][time i64][microstep u32][payload]
//! untimed:  [type][port u16][federate u16][length u32][payload]
//! absent:   [type][port u16][federate u16][time i64][microstep u32]
//! neighbor: [type][upstream i32][downstream i32]
//!           ([federate u16][delay i64])* [federate u16]*
//! ```
//!
//! A frame is always encoded into one contiguous buffer so that a header is
//! never written without its payload.

use bytes::{BufMut, Bytes, BytesMut};
use fedlink_types::{FederateId, Instant, Interval, PortId, Tag};
use std::io::{self, Read, Write};
use std::net::Ipv4Addr;
use thiserror::Error;

/// Largest payload accepted from the wire.
pub const MAX_PAYLOAD_LEN: usize = 64 * 1024 * 1024;

/// Longest federation id that fits the one-byte length prefix.
pub const MAX_FEDERATION_ID_LEN: usize = u8::MAX as usize;

/// Upstream delay sent for connections without an `after` clause.
const NO_DELAY: i64 = i64::MIN;

/// Errors that can occur while reading or decoding a frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Unknown message type: {0}")]
    UnknownType(u8),

    #[error("Payload of {0} bytes exceeds the frame limit")]
    TooLarge(usize),

    #[error("Federation id is not valid UTF-8")]
    InvalidFederationId,

    #[error("Neighbor list of {0} entries does not fit the frame")]
    TooManyNeighbors(usize),
}

impl FrameError {
    /// Whether the error means the other side went away.
    pub fn is_disconnect(&self) -> bool {
        match self {
            FrameError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

/// Message type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgType {
    Reject = 0,
    FedIds = 1,
    Resign = 4,
    TaggedMessage = 5,
    AddressQuery = 13,
    AddressAdvertisement = 14,
    P2pSendingFedId = 15,
    P2pMessage = 16,
    P2pTaggedMessage = 17,
    ClockSyncT1 = 19,
    ClockSyncT3 = 20,
    ClockSyncT4 = 21,
    PortAbsent = 23,
    NeighborStructure = 24,
    AddressQueryReply = 52,
    ClockSyncRequest = 253,
    Ack = 255,
}

impl MsgType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        let kind = match byte {
            0 => MsgType::Reject,
            1 => MsgType::FedIds,
            4 => MsgType::Resign,
            5 => MsgType::TaggedMessage,
            13 => MsgType::AddressQuery,
            14 => MsgType::AddressAdvertisement,
            15 => MsgType::P2pSendingFedId,
            16 => MsgType::P2pMessage,
            17 => MsgType::P2pTaggedMessage,
            19 => MsgType::ClockSyncT1,
            20 => MsgType::ClockSyncT3,
            21 => MsgType::ClockSyncT4,
            23 => MsgType::PortAbsent,
            24 => MsgType::NeighborStructure,
            52 => MsgType::AddressQueryReply,
            253 => MsgType::ClockSyncRequest,
            255 => MsgType::Ack,
            _ => return None,
        };
        Some(kind)
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Why a connection was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    FederationIdMismatch,
    FederateIdInUse,
    FederateIdOutOfRange,
    UnexpectedMessage,
    WrongServer,
    Other(u8),
}

impl RejectReason {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            1 => RejectReason::FederationIdMismatch,
            2 => RejectReason::FederateIdInUse,
            3 => RejectReason::FederateIdOutOfRange,
            4 => RejectReason::UnexpectedMessage,
            5 => RejectReason::WrongServer,
            other => RejectReason::Other(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            RejectReason::FederationIdMismatch => 1,
            RejectReason::FederateIdInUse => 2,
            RejectReason::FederateIdOutOfRange => 3,
            RejectReason::UnexpectedMessage => 4,
            RejectReason::WrongServer => 5,
            RejectReason::Other(byte) => byte,
        }
    }
}

/// Untimed message on a physical connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UntimedMessage {
    pub port: PortId,
    pub federate: FederateId,
    pub payload: Bytes,
}

/// Message carrying the tag it is intended for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedMessage {
    pub port: PortId,
    pub federate: FederateId,
    pub tag: Tag,
    pub payload: Bytes,
}

/// Notice that a port is absent through `tag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortAbsent {
    pub port: PortId,
    pub federate: FederateId,
    pub tag: Tag,
}

/// Logical dependencies of a federate, announced to the coordinator.
///
/// The coordinator uses it to compute how far each federate may advance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeighborStructure {
    /// Upstream federates with the smallest delay on any connection from
    /// them; `None` when some connection has no `after` clause.
    pub upstream: Vec<(FederateId, Option<Interval>)>,
    pub downstream: Vec<FederateId>,
}

/// A single wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Reject(RejectReason),
    Ack,
    /// First frame from a federate to the coordinator.
    FedIds {
        federate: FederateId,
        federation_id: String,
    },
    /// First frame from a federate to a peer.
    P2pSendingFedId {
        federate: FederateId,
        federation_id: String,
    },
    /// Ask the coordinator for `exchanges` clock-sync rounds (zero: none).
    ClockSyncRequest { exchanges: u16 },
    ClockSyncT1 { time: Instant },
    ClockSyncT3 { federate: FederateId },
    ClockSyncT4 { time: Instant },
    AddressAdvertisement { port: u16 },
    AddressQuery { federate: FederateId },
    /// `port` is `None` while the queried federate has not advertised yet.
    AddressQueryReply { port: Option<u16>, host: Ipv4Addr },
    P2pMessage(UntimedMessage),
    P2pTaggedMessage(TaggedMessage),
    TaggedMessage(TaggedMessage),
    PortAbsent(PortAbsent),
    NeighborStructure(NeighborStructure),
    Resign,
}

impl Frame {
    /// Type byte of this frame.
    pub fn msg_type(&self) -> MsgType {
        match self {
            Frame::Reject(_) => MsgType::Reject,
            Frame::Ack => MsgType::Ack,
            Frame::FedIds { .. } => MsgType::FedIds,
            Frame::P2pSendingFedId { .. } => MsgType::P2pSendingFedId,
            Frame::ClockSyncRequest { .. } => MsgType::ClockSyncRequest,
            Frame::ClockSyncT1 { .. } => MsgType::ClockSyncT1,
            Frame::ClockSyncT3 { .. } => MsgType::ClockSyncT3,
            Frame::ClockSyncT4 { .. } => MsgType::ClockSyncT4,
            Frame::AddressAdvertisement { .. } => MsgType::AddressAdvertisement,
            Frame::AddressQuery { .. } => MsgType::AddressQuery,
            Frame::AddressQueryReply { .. } => MsgType::AddressQueryReply,
            Frame::P2pMessage(_) => MsgType::P2pMessage,
            Frame::P2pTaggedMessage(_) => MsgType::P2pTaggedMessage,
            Frame::TaggedMessage(_) => MsgType::TaggedMessage,
            Frame::PortAbsent(_) => MsgType::PortAbsent,
            Frame::NeighborStructure(_) => MsgType::NeighborStructure,
            Frame::Resign => MsgType::Resign,
        }
    }

    /// Human-readable name, for logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Frame::Reject(_) => "Reject",
            Frame::Ack => "Ack",
            Frame::FedIds { .. } => "FedIds",
            Frame::P2pSendingFedId { .. } => "P2pSendingFedId",
            Frame::ClockSyncRequest { .. } => "ClockSyncRequest",
            Frame::ClockSyncT1 { .. } => "ClockSyncT1",
            Frame::ClockSyncT3 { .. } => "ClockSyncT3",
            Frame::ClockSyncT4 { .. } => "ClockSyncT4",
            Frame::AddressAdvertisement { .. } => "AddressAdvertisement",
            Frame::AddressQuery { .. } => "AddressQuery",
            Frame::AddressQueryReply { .. } => "AddressQueryReply",
            Frame::P2pMessage(_) => "P2pMessage",
            Frame::P2pTaggedMessage(_) => "P2pTaggedMessage",
            Frame::TaggedMessage(_) => "TaggedMessage",
            Frame::PortAbsent(_) => "PortAbsent",
            Frame::NeighborStructure(_) => "NeighborStructure",
            Frame::Resign => "Resign",
        }
    }

    /// Encode into one contiguous buffer.
    ///
    /// Fails with [`FrameError::TooLarge`] for a payload the receiving side
    /// would refuse, so nothing is ever written that cannot be read back.
    pub fn encode(&self) -> Result<Bytes, FrameError> {
        self.check_limits()?;
        let mut buf = BytesMut::with_capacity(self.encoded_len_hint());
        buf.put_u8(self.msg_type().to_byte());
        match self {
            Frame::Reject(reason) => buf.put_u8(reason.to_byte()),
            Frame::Ack | Frame::Resign => {}
            Frame::FedIds {
                federate,
                federation_id,
            }
            | Frame::P2pSendingFedId {
                federate,
                federation_id,
            } => {
                let id = federation_id.as_bytes();
                let id = &id[..id.len().min(MAX_FEDERATION_ID_LEN)];
                buf.put_u16_le(federate.0);
                buf.put_u8(id.len() as u8);
                buf.put_slice(id);
            }
            Frame::ClockSyncRequest { exchanges } => buf.put_u16_le(*exchanges),
            Frame::ClockSyncT1 { time } | Frame::ClockSyncT4 { time } => buf.put_i64_le(time.0),
            Frame::ClockSyncT3 { federate } | Frame::AddressQuery { federate } => {
                buf.put_u16_le(federate.0)
            }
            Frame::AddressAdvertisement { port } => buf.put_i32_le(i32::from(*port)),
            Frame::AddressQueryReply { port, host } => {
                buf.put_i32_le(port.map(i32::from).unwrap_or(-1));
                buf.put_slice(&host.octets());
            }
            Frame::P2pMessage(msg) => {
                buf.put_u16_le(msg.port.0);
                buf.put_u16_le(msg.federate.0);
                buf.put_u32_le(payload_len(&msg.payload)?);
                buf.put_slice(&msg.payload);
            }
            Frame::P2pTaggedMessage(msg) | Frame::TaggedMessage(msg) => {
                buf.put_u16_le(msg.port.0);
                buf.put_u16_le(msg.federate.0);
                buf.put_u32_le(payload_len(&msg.payload)?);
                put_tag(&mut buf, msg.tag);
                buf.put_slice(&msg.payload);
            }
            Frame::PortAbsent(absent) => {
                buf.put_u16_le(absent.port.0);
                buf.put_u16_le(absent.federate.0);
                put_tag(&mut buf, absent.tag);
            }
            Frame::NeighborStructure(neighbors) => {
                buf.put_i32_le(neighbor_count(neighbors.upstream.len())?);
                buf.put_i32_le(neighbor_count(neighbors.downstream.len())?);
                for (federate, delay) in &neighbors.upstream {
                    buf.put_u16_le(federate.0);
                    buf.put_i64_le(delay.map(|d| d.0).unwrap_or(NO_DELAY));
                }
                for federate in &neighbors.downstream {
                    buf.put_u16_le(federate.0);
                }
            }
        }
        Ok(buf.freeze())
    }

    /// Encode and write as a single buffer.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), FrameError> {
        let bytes = self.encode()?;
        writer.write_all(&bytes)?;
        Ok(())
    }

    fn check_limits(&self) -> Result<(), FrameError> {
        match self {
            Frame::P2pMessage(UntimedMessage { payload, .. })
            | Frame::P2pTaggedMessage(TaggedMessage { payload, .. })
            | Frame::TaggedMessage(TaggedMessage { payload, .. }) => {
                payload_len(payload).map(|_| ())
            }
            _ => Ok(()),
        }
    }

    fn encoded_len_hint(&self) -> usize {
        match self {
            Frame::P2pMessage(msg) => 9 + msg.payload.len(),
            Frame::P2pTaggedMessage(msg) | Frame::TaggedMessage(msg) => 21 + msg.payload.len(),
            Frame::NeighborStructure(n) => 9 + 10 * n.upstream.len() + 2 * n.downstream.len(),
            _ => 32,
        }
    }

    /// Read exactly one frame from a blocking reader.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Frame, FrameError> {
        let byte = read_u8(reader)?;
        let kind = MsgType::from_byte(byte).ok_or(FrameError::UnknownType(byte))?;
        let frame = match kind {
            MsgType::Reject => Frame::Reject(RejectReason::from_byte(read_u8(reader)?)),
            MsgType::Ack => Frame::Ack,
            MsgType::Resign => Frame::Resign,
            MsgType::FedIds => {
                let (federate, federation_id) = read_identity(reader)?;
                Frame::FedIds {
                    federate,
                    federation_id,
                }
            }
            MsgType::P2pSendingFedId => {
                let (federate, federation_id) = read_identity(reader)?;
                Frame::P2pSendingFedId {
                    federate,
                    federation_id,
                }
            }
            MsgType::ClockSyncRequest => Frame::ClockSyncRequest {
                exchanges: read_u16(reader)?,
            },
            MsgType::ClockSyncT1 => Frame::ClockSyncT1 {
                time: Instant(read_i64(reader)?),
            },
            MsgType::ClockSyncT3 => Frame::ClockSyncT3 {
                federate: FederateId(read_u16(reader)?),
            },
            MsgType::ClockSyncT4 => Frame::ClockSyncT4 {
                time: Instant(read_i64(reader)?),
            },
            MsgType::AddressAdvertisement => Frame::AddressAdvertisement {
                port: u16::try_from(read_i32(reader)?).unwrap_or(0),
            },
            MsgType::AddressQuery => Frame::AddressQuery {
                federate: FederateId(read_u16(reader)?),
            },
            MsgType::AddressQueryReply => {
                let port = u16::try_from(read_i32(reader)?).ok();
                let mut octets = [0u8; 4];
                reader.read_exact(&mut octets)?;
                Frame::AddressQueryReply {
                    port,
                    host: Ipv4Addr::from(octets),
                }
            }
            MsgType::P2pMessage => {
                let port = PortId(read_u16(reader)?);
                let federate = FederateId(read_u16(reader)?);
                let length = read_u32(reader)? as usize;
                let payload = read_payload(reader, length)?;
                Frame::P2pMessage(UntimedMessage {
                    port,
                    federate,
                    payload,
                })
            }
            MsgType::P2pTaggedMessage | MsgType::TaggedMessage => {
                let port = PortId(read_u16(reader)?);
                let federate = FederateId(read_u16(reader)?);
                let length = read_u32(reader)? as usize;
                let tag = read_tag(reader)?;
                let payload = read_payload(reader, length)?;
                let msg = TaggedMessage {
                    port,
                    federate,
                    tag,
                    payload,
                };
                if kind == MsgType::TaggedMessage {
                    Frame::TaggedMessage(msg)
                } else {
                    Frame::P2pTaggedMessage(msg)
                }
            }
            MsgType::PortAbsent => {
                let port = PortId(read_u16(reader)?);
                let federate = FederateId(read_u16(reader)?);
                let tag = read_tag(reader)?;
                Frame::PortAbsent(PortAbsent {
                    port,
                    federate,
                    tag,
                })
            }
            MsgType::NeighborStructure => {
                let upstream_count = read_count(reader)?;
                let downstream_count = read_count(reader)?;
                let mut neighbors = NeighborStructure::default();
                for _ in 0..upstream_count {
                    let federate = FederateId(read_u16(reader)?);
                    let delay = match read_i64(reader)? {
                        NO_DELAY => None,
                        nanos => Some(Interval(nanos)),
                    };
                    neighbors.upstream.push((federate, delay));
                }
                for _ in 0..downstream_count {
                    neighbors.downstream.push(FederateId(read_u16(reader)?));
                }
                Frame::NeighborStructure(neighbors)
            }
        };
        Ok(frame)
    }

    /// Decode a frame from a byte slice.
    pub fn decode(mut data: &[u8]) -> Result<Frame, FrameError> {
        Self::read_from(&mut data)
    }
}

fn payload_len(payload: &Bytes) -> Result<u32, FrameError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::TooLarge(payload.len()));
    }
    u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge(payload.len()))
}

fn neighbor_count(count: usize) -> Result<i32, FrameError> {
    if count > usize::from(u16::MAX) + 1 {
        return Err(FrameError::TooManyNeighbors(count));
    }
    i32::try_from(count).map_err(|_| FrameError::TooManyNeighbors(count))
}

fn read_count<R: Read>(reader: &mut R) -> Result<usize, FrameError> {
    let count = read_i32(reader)?;
    usize::try_from(count)
        .ok()
        .filter(|c| *c <= usize::from(u16::MAX) + 1)
        .ok_or(FrameError::TooManyNeighbors(count.unsigned_abs() as usize))
}

fn put_tag(buf: &mut BytesMut, tag: Tag) {
    buf.put_i64_le(tag.time.0);
    buf.put_u32_le(tag.microstep);
}

fn read_u8<R: Read>(reader: &mut R) -> io::Result<u8> {
    let mut b = [0u8; 1];
    reader.read_exact(&mut b)?;
    Ok(b[0])
}

fn read_u16<R: Read>(reader: &mut R) -> io::Result<u16> {
    let mut b = [0u8; 2];
    reader.read_exact(&mut b)?;
    Ok(u16::from_le_bytes(b))
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut b = [0u8; 4];
    reader.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn read_i32<R: Read>(reader: &mut R) -> io::Result<i32> {
    let mut b = [0u8; 4];
    reader.read_exact(&mut b)?;
    Ok(i32::from_le_bytes(b))
}

fn read_i64<R: Read>(reader: &mut R) -> io::Result<i64> {
    let mut b = [0u8; 8];
    reader.read_exact(&mut b)?;
    Ok(i64::from_le_bytes(b))
}

fn read_tag<R: Read>(reader: &mut R) -> io::Result<Tag> {
    let time = Instant(read_i64(reader)?);
    let microstep = read_u32(reader)?;
    Ok(Tag::new(time, microstep))
}

fn read_identity<R: Read>(reader: &mut R) -> Result<(FederateId, String), FrameError> {
    let federate = FederateId(read_u16(reader)?);
    let len = read_u8(reader)? as usize;
    let mut id = vec![0u8; len];
    reader.read_exact(&mut id)?;
    let federation_id = String::from_utf8(id).map_err(|_| FrameError::InvalidFederationId)?;
    Ok((federate, federation_id))
}

fn read_payload<R: Read>(reader: &mut R, length: usize) -> Result<Bytes, FrameError> {
    if length > MAX_PAYLOAD_LEN {
        return Err(FrameError::TooLarge(length));
    }
    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload)?;
    Ok(Bytes::from(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_message_layout() {
        let frame = Frame::P2pTaggedMessage(TaggedMessage {
            port: PortId(3),
            federate: FederateId(1),
            tag: Tag::new(Instant(0x0102), 7),
            payload: Bytes::from_static(b"5\0"),
        });
        let bytes = frame.encode().unwrap();

        assert_eq!(bytes[0], MsgType::P2pTaggedMessage.to_byte());
        assert_eq!(&bytes[1..3], &3u16.to_le_bytes());
        assert_eq!(&bytes[3..5], &1u16.to_le_bytes());
        assert_eq!(&bytes[5..9], &2u32.to_le_bytes());
        assert_eq!(&bytes[9..17], &0x0102i64.to_le_bytes());
        assert_eq!(&bytes[17..21], &7u32.to_le_bytes());
        assert_eq!(&bytes[21..], b"5\0");
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_untimed_message_has_no_tag() {
        let frame = Frame::P2pMessage(UntimedMessage {
            port: PortId(0),
            federate: FederateId(2),
            payload: Bytes::from_static(&[9, 9, 9]),
        });
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes.len(), 1 + 2 + 2 + 4 + 3);
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_port_absent_layout() {
        let frame = Frame::PortAbsent(PortAbsent {
            port: PortId(4),
            federate: FederateId(0),
            tag: Tag::new(Instant(10), 1),
        });
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes.len(), 1 + 2 + 2 + 8 + 4);
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_address_reply_unknown_port() {
        let frame = Frame::AddressQueryReply {
            port: None,
            host: Ipv4Addr::LOCALHOST,
        };
        let bytes = frame.encode().unwrap();
        assert_eq!(&bytes[1..5], &(-1i32).to_le_bytes());
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result = Frame::decode(&[99, 0, 0]);
        assert!(matches!(result, Err(FrameError::UnknownType(99))));
    }

    #[test]
    fn test_truncated_frame_is_disconnect() {
        let frame = Frame::ClockSyncT1 { time: Instant(5) };
        let bytes = frame.encode().unwrap();
        let err = Frame::decode(&bytes[..4]).unwrap_err();
        assert!(err.is_disconnect());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let mut bytes = vec![MsgType::P2pMessage.to_byte(), 0, 0, 0, 0];
        bytes.extend_from_slice(&(MAX_PAYLOAD_LEN as u32 + 1).to_le_bytes());
        assert!(matches!(
            Frame::decode(&bytes),
            Err(FrameError::TooLarge(_))
        ));
    }

    #[test]
    fn test_encode_refuses_payload_over_limit() {
        let frame = Frame::P2pTaggedMessage(TaggedMessage {
            port: PortId(0),
            federate: FederateId(1),
            tag: Tag::new(Instant(0), 0),
            payload: Bytes::from(vec![0u8; MAX_PAYLOAD_LEN + 1]),
        });
        assert!(matches!(
            frame.encode(),
            Err(FrameError::TooLarge(len)) if len == MAX_PAYLOAD_LEN + 1
        ));

        let mut written = Vec::new();
        assert!(frame.write_to(&mut written).is_err());
        assert!(written.is_empty());
    }

    #[test]
    fn test_neighbor_structure_layout() {
        let frame = Frame::NeighborStructure(NeighborStructure {
            upstream: vec![
                (FederateId(0), Some(Interval::from_millis(10))),
                (FederateId(3), None),
            ],
            downstream: vec![FederateId(2)],
        });
        let bytes = frame.encode().unwrap();

        assert_eq!(bytes[0], 24);
        assert_eq!(&bytes[1..5], &2i32.to_le_bytes());
        assert_eq!(&bytes[5..9], &1i32.to_le_bytes());
        assert_eq!(&bytes[9..11], &0u16.to_le_bytes());
        assert_eq!(&bytes[11..19], &10_000_000i64.to_le_bytes());
        assert_eq!(&bytes[19..21], &3u16.to_le_bytes());
        assert_eq!(&bytes[21..29], &i64::MIN.to_le_bytes());
        assert_eq!(&bytes[29..], &2u16.to_le_bytes());
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_negative_neighbor_count_rejected() {
        let mut bytes = vec![MsgType::NeighborStructure.to_byte()];
        bytes.extend_from_slice(&(-1i32).to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        assert!(matches!(
            Frame::decode(&bytes),
            Err(FrameError::TooManyNeighbors(_))
        ));
    }

    #[test]
    fn test_reject_reason_bytes() {
        for reason in [
            RejectReason::FederationIdMismatch,
            RejectReason::FederateIdInUse,
            RejectReason::FederateIdOutOfRange,
            RejectReason::UnexpectedMessage,
            RejectReason::WrongServer,
        ] {
            assert_eq!(RejectReason::from_byte(reason.to_byte()), reason);
        }
    }
}
