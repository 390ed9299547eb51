//! Domain-specific identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Federate identifier, unique within a federation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FederateId(pub u16);

impl fmt::Display for FederateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Federate({})", self.0)
    }
}

/// Wire-level id of a destination port.
///
/// This is the ordinal of the port's network message action in the
/// destination federate's ordered list of actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(pub u16);

impl PortId {
    /// Position in the destination federate's action list.
    pub fn ordinal(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Port({})", self.0)
    }
}

/// Bank and channel coordinates of a port.
///
/// `None` means "not applicable": the reactor is not in a bank, or the port
/// is not a multiport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BankChannel {
    pub bank: Option<u32>,
    pub channel: Option<u32>,
}

impl BankChannel {
    /// A plain port: no bank, no channel.
    pub const SCALAR: Self = BankChannel {
        bank: None,
        channel: None,
    };

    pub fn new(bank: Option<u32>, channel: Option<u32>) -> Self {
        Self { bank, channel }
    }

    pub fn channel(channel: u32) -> Self {
        Self::new(None, Some(channel))
    }

    pub fn bank(bank: u32) -> Self {
        Self::new(Some(bank), None)
    }

    /// Whether this addresses one element of a bank or multiport.
    pub fn is_indexed(&self) -> bool {
        self.bank.is_some() || self.channel.is_some()
    }
}

impl fmt::Display for BankChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(bank) = self.bank {
            write!(f, "[bank={}]", bank)?;
        }
        if let Some(channel) = self.channel {
            write!(f, "[ch={}]", channel)?;
        }
        Ok(())
    }
}

/// A port inside a federate, optionally indexed into a bank or multiport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortRef {
    /// Fully-qualified port name, e.g. `sender.out`.
    pub name: Arc<str>,
    pub coordinate: BankChannel,
}

impl PortRef {
    pub fn new(name: impl Into<Arc<str>>, coordinate: BankChannel) -> Self {
        Self {
            name: name.into(),
            coordinate,
        }
    }

    pub fn scalar(name: impl Into<Arc<str>>) -> Self {
        Self::new(name, BankChannel::SCALAR)
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.coordinate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bank_channel_indexed() {
        assert!(!BankChannel::SCALAR.is_indexed());
        assert!(BankChannel::channel(0).is_indexed());
        assert!(BankChannel::bank(2).is_indexed());
    }

    #[test]
    fn test_port_ref_display() {
        let port = PortRef::new("a.out", BankChannel::new(Some(1), Some(2)));
        assert_eq!(port.to_string(), "a.out[bank=1][ch=2]");
        assert_eq!(PortRef::scalar("b.in").to_string(), "b.in");
    }
}
