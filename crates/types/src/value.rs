//! Values carried on ports and the static shape of each port's type.

use bytes::Bytes;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Static description of the value type of a port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// No payload (`void`).
    Unit,
    /// Fixed-size value transported as its raw memory representation.
    Fixed { size: usize },
    /// Heap string; transported with one terminating byte.
    Text,
    /// Token-carrying array of `element_size`-byte elements.
    Token { element_size: usize },
    /// A ROS 2 message type, optionally behind a shared pointer.
    Ros2 { type_name: String, shared: bool },
}

impl ValueType {
    /// Whether values of this type are token-carrying.
    pub fn is_token(&self) -> bool {
        matches!(self, ValueType::Token { .. })
    }
}

/// Array payload referencing an underlying buffer.
///
/// Cloning is cheap: the buffer is reference-counted, never copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    buffer: Bytes,
    element_size: usize,
    length: usize,
}

impl Token {
    /// Wrap `length` elements of `element_size` bytes from `buffer`.
    ///
    /// Returns `None` if the buffer is shorter than `length * element_size`.
    pub fn new(buffer: Bytes, element_size: usize, length: usize) -> Option<Self> {
        let needed = element_size.checked_mul(length)?;
        if buffer.len() < needed {
            return None;
        }
        Some(Self {
            buffer,
            element_size,
            length,
        })
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The `len() * element_size()` bytes making up the elements.
    pub fn bytes(&self) -> Bytes {
        self.buffer.slice(..self.length * self.element_size)
    }
}

/// A ROS 2 message instance.
///
/// The value is always held behind an `Arc`; `shared` records whether the
/// port type itself is a shared pointer, which decides how the receive side
/// re-wraps it.
#[derive(Clone)]
pub struct RosMessage {
    inner: Arc<dyn Any + Send + Sync>,
    shared: bool,
}

impl RosMessage {
    /// A message owned by value.
    pub fn owned<T: Any + Send + Sync>(message: T) -> Self {
        Self {
            inner: Arc::new(message),
            shared: false,
        }
    }

    /// A message behind a shared handle.
    pub fn shared(message: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            inner: message,
            shared: true,
        }
    }

    pub fn from_boxed(message: Box<dyn Any + Send + Sync>, shared: bool) -> Self {
        Self {
            inner: Arc::from(message),
            shared,
        }
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// The message with any shared handle unwrapped.
    pub fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self.inner.as_ref()
    }

    /// The shared handle itself.
    pub fn handle(&self) -> Arc<dyn Any + Send + Sync> {
        Arc::clone(&self.inner)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Debug for RosMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RosMessage")
            .field("shared", &self.shared)
            .finish_non_exhaustive()
    }
}

/// A value present on a port.
#[derive(Debug, Clone)]
pub enum PortValue {
    Unit,
    Fixed(Bytes),
    Text(String),
    Token(Token),
    Message(RosMessage),
}

impl PortValue {
    /// Short name of the variant, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            PortValue::Unit => "unit",
            PortValue::Fixed(_) => "fixed",
            PortValue::Text(_) => "text",
            PortValue::Token(_) => "token",
            PortValue::Message(_) => "ros2",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PortValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_fixed(&self) -> Option<&[u8]> {
        match self {
            PortValue::Fixed(b) => Some(b),
            _ => None,
        }
    }
}
