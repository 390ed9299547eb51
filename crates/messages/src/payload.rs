//! Payload (de)serialization for the supported serializers.
//!
//! # Serializers
//!
//! - **Native**: fixed-size values travel as raw bytes, strings as their
//!   bytes plus one terminating NUL, tokens as `count * element_size` bytes
//!   referenced straight from the token buffer.
//! - **Proto**: not supported; always fails with [`CodecError::Unsupported`].
//! - **Ros2**: delegated to an injected [`Ros2Serializer`].
//!
//! Dispatch is a single `match` on [`Serializer`]; adding a serializer means
//! adding a variant and an arm here.

use bytes::{BufMut, Bytes, BytesMut};
use fedlink_types::{PortValue, RosMessage, Serializer, Token, ValueType};
use std::any::Any;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during payload encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("{0} serialization is not supported yet")]
    Unsupported(Serializer),

    #[error("Cannot handle ROS serialization when ports are pointers")]
    Ros2Token,

    #[error("No ROS 2 serializer registered")]
    MissingRos2Serializer,

    #[error("Value of kind {actual} does not match port type {expected:?}")]
    TypeMismatch {
        expected: ValueType,
        actual: &'static str,
    },

    #[error("Expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("String payload is missing its terminator")]
    MissingTerminator,

    #[error("String payload is not valid UTF-8")]
    InvalidText,

    #[error("ROS 2 serializer error: {0}")]
    Ros2(String),
}

/// External ROS 2 message serializer.
///
/// Implementations receive the message with any shared handle already
/// unwrapped, and return a freshly owned message on deserialization.
pub trait Ros2Serializer: Send + Sync {
    fn serialize(
        &self,
        type_name: &str,
        message: &(dyn Any + Send + Sync),
    ) -> Result<Bytes, CodecError>;

    fn deserialize(
        &self,
        type_name: &str,
        bytes: &[u8],
    ) -> Result<Box<dyn Any + Send + Sync>, CodecError>;
}

/// Turns port values into wire payloads and back.
#[derive(Clone, Default)]
pub struct PayloadCodec {
    ros2: Option<Arc<dyn Ros2Serializer>>,
}

impl PayloadCodec {
    /// Codec supporting only the native serializer.
    pub fn native() -> Self {
        Self::default()
    }

    /// Codec with a ROS 2 serializer installed.
    pub fn with_ros2(ros2: Arc<dyn Ros2Serializer>) -> Self {
        Self { ros2: Some(ros2) }
    }

    /// Encode a value for the wire.
    pub fn encode(
        &self,
        serializer: Serializer,
        value_type: &ValueType,
        value: &PortValue,
    ) -> Result<Bytes, CodecError> {
        match serializer {
            Serializer::Native => encode_native(value_type, value),
            Serializer::Proto => Err(CodecError::Unsupported(Serializer::Proto)),
            Serializer::Ros2 => self.encode_ros2(value_type, value),
        }
    }

    /// Decode a wire payload into a port value.
    pub fn decode(
        &self,
        serializer: Serializer,
        value_type: &ValueType,
        payload: Bytes,
    ) -> Result<PortValue, CodecError> {
        match serializer {
            Serializer::Native => decode_native(value_type, payload),
            Serializer::Proto => Err(CodecError::Unsupported(Serializer::Proto)),
            Serializer::Ros2 => self.decode_ros2(value_type, &payload),
        }
    }

    fn ros2(&self) -> Result<&dyn Ros2Serializer, CodecError> {
        self.ros2
            .as_deref()
            .ok_or(CodecError::MissingRos2Serializer)
    }

    fn encode_ros2(&self, value_type: &ValueType, value: &PortValue) -> Result<Bytes, CodecError> {
        let type_name = match value_type {
            ValueType::Ros2 { type_name, .. } => type_name,
            ValueType::Token { .. } => return Err(CodecError::Ros2Token),
            other => return Err(mismatch(other, value)),
        };
        match value {
            PortValue::Message(message) => self.ros2()?.serialize(type_name, message.as_any()),
            other => Err(mismatch(value_type, other)),
        }
    }

    fn decode_ros2(&self, value_type: &ValueType, payload: &[u8]) -> Result<PortValue, CodecError> {
        match value_type {
            ValueType::Ros2 { type_name, shared } => {
                let message = self.ros2()?.deserialize(type_name, payload)?;
                Ok(PortValue::Message(RosMessage::from_boxed(message, *shared)))
            }
            ValueType::Token { .. } => Err(CodecError::Ros2Token),
            other => Err(CodecError::TypeMismatch {
                expected: other.clone(),
                actual: "ros2",
            }),
        }
    }
}

impl std::fmt::Debug for PayloadCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadCodec")
            .field("ros2", &self.ros2.is_some())
            .finish()
    }
}

fn mismatch(expected: &ValueType, actual: &PortValue) -> CodecError {
    CodecError::TypeMismatch {
        expected: expected.clone(),
        actual: actual.kind_name(),
    }
}

fn encode_native(value_type: &ValueType, value: &PortValue) -> Result<Bytes, CodecError> {
    match (value_type, value) {
        (ValueType::Unit, PortValue::Unit) => Ok(Bytes::new()),
        (ValueType::Fixed { size }, PortValue::Fixed(bytes)) => {
            if bytes.len() != *size {
                return Err(CodecError::LengthMismatch {
                    expected: *size,
                    actual: bytes.len(),
                });
            }
            Ok(bytes.clone())
        }
        (ValueType::Text, PortValue::Text(text)) => {
            // Length comes from the content, not the declared size.
            let mut buf = BytesMut::with_capacity(text.len() + 1);
            buf.put_slice(text.as_bytes());
            buf.put_u8(0);
            Ok(buf.freeze())
        }
        (ValueType::Token { element_size }, PortValue::Token(token)) => {
            if token.element_size() != *element_size {
                return Err(CodecError::LengthMismatch {
                    expected: *element_size,
                    actual: token.element_size(),
                });
            }
            Ok(token.bytes())
        }
        (expected, actual) => Err(mismatch(expected, actual)),
    }
}

fn decode_native(value_type: &ValueType, payload: Bytes) -> Result<PortValue, CodecError> {
    match value_type {
        ValueType::Unit => {
            if !payload.is_empty() {
                return Err(CodecError::LengthMismatch {
                    expected: 0,
                    actual: payload.len(),
                });
            }
            Ok(PortValue::Unit)
        }
        ValueType::Fixed { size } => {
            if payload.len() != *size {
                return Err(CodecError::LengthMismatch {
                    expected: *size,
                    actual: payload.len(),
                });
            }
            Ok(PortValue::Fixed(payload))
        }
        ValueType::Text => {
            let (last, body) = payload
                .split_last()
                .ok_or(CodecError::MissingTerminator)?;
            if *last != 0 {
                return Err(CodecError::MissingTerminator);
            }
            let text = std::str::from_utf8(body).map_err(|_| CodecError::InvalidText)?;
            Ok(PortValue::Text(text.to_owned()))
        }
        ValueType::Token { element_size } => {
            let element_size = *element_size;
            let length = if element_size == 0 {
                if !payload.is_empty() {
                    return Err(CodecError::LengthMismatch {
                        expected: 0,
                        actual: payload.len(),
                    });
                }
                0
            } else {
                if payload.len() % element_size != 0 {
                    return Err(CodecError::LengthMismatch {
                        expected: payload.len() - payload.len() % element_size,
                        actual: payload.len(),
                    });
                }
                payload.len() / element_size
            };
            let token = Token::new(payload, element_size, length).ok_or(
                CodecError::LengthMismatch {
                    expected: element_size * length,
                    actual: 0,
                },
            )?;
            Ok(PortValue::Token(token))
        }
        ValueType::Ros2 { .. } => Err(CodecError::TypeMismatch {
            expected: value_type.clone(),
            actual: "native",
        }),
    }
}
