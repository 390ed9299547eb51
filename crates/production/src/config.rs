//! Federate configuration.
//!
//! Loaded from TOML. Durations are human-readable strings (`"250ms"`, `"5s"`).
//!
//! ```toml
//! federate_id = 1
//! federation_id = "demo"
//!
//! [coordinator]
//! host = "10.0.0.5"
//! port = 15045
//!
//! [coordination]
//! mode = "decentralized"
//! stp_offset = "10ms"
//!
//! [peers]
//! inbound = [0]
//! outbound = [{ id = 2, address = "10.0.0.7:15046" }]
//! ```

use crate::clock_sync::ClockSyncMode;
use crate::network::RetryPolicy;
use fedlink_messages::MAX_FEDERATION_ID_LEN;
use fedlink_types::{Coordination, FederateId, Interval};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// First port probed when the server port is not fixed.
pub const DEFAULT_BASE_PORT: u16 = 15045;

/// Number of successive ports probed.
pub const DEFAULT_PORT_RANGE: u16 = 1024;

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete configuration of one federate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederateConfig {
    pub federate_id: FederateId,
    pub federation_id: String,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub coordination: CoordinationConfig,
    #[serde(default)]
    pub clock_sync: ClockSyncConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub peers: PeersConfig,
}

/// Where the coordinator listens and how hard to try reaching it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub host: String,
    pub port: u16,
    #[serde(with = "duration")]
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: DEFAULT_BASE_PORT,
            connect_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    pub mode: Coordination,
    /// Federate-wide safe-to-process offset; ignored under centralized coordination.
    #[serde(with = "duration")]
    pub stp_offset: Duration,
}

/// Clock synchronization with the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockSyncConfig {
    pub mode: ClockSyncMode,
    /// T1/T3/T4 exchanges per synchronization round.
    pub exchanges_per_interval: u16,
    /// Interval between runtime synchronization rounds.
    #[serde(with = "duration")]
    pub period: Duration,
    /// Synchronize even when the coordinator runs on this host.
    pub force: bool,
    /// Test-only skew; federate `n` starts with offset `(1 + n) * test_offset`.
    #[serde(with = "duration_opt")]
    pub test_offset: Option<Duration>,
}

impl Default for ClockSyncConfig {
    fn default() -> Self {
        Self {
            mode: ClockSyncMode::Init,
            exchanges_per_interval: 10,
            period: Duration::from_secs(5),
            force: false,
            test_offset: None,
        }
    }
}

/// Server socket for inbound peer connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    /// Fixed port. When unset, ports from `base_port` are probed.
    pub port: Option<u16>,
    pub base_port: u16,
    pub port_range: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: None,
            base_port: DEFAULT_BASE_PORT,
            port_range: DEFAULT_PORT_RANGE,
        }
    }
}

/// What to do when a peer-to-peer link cannot be established.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnreachablePeerPolicy {
    /// Fail startup.
    #[default]
    Strict,
    /// Log and continue without the peer.
    BestEffort,
}

/// An outbound peer, with an optional fixed address.
///
/// Without an address the coordinator is asked where the peer listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundPeer {
    pub id: FederateId,
    #[serde(default)]
    pub address: Option<String>,
}

/// Peer-to-peer links declared in configuration.
///
/// These extend the links derived from the federate's connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeersConfig {
    pub inbound: Vec<FederateId>,
    pub outbound: Vec<OutboundPeer>,
    /// How long to wait for all inbound peers to connect.
    #[serde(with = "duration")]
    pub connect_timeout: Duration,
    pub unreachable: UnreachablePeerPolicy,
    pub retry: RetryPolicy,
}

impl Default for PeersConfig {
    fn default() -> Self {
        Self {
            inbound: Vec::new(),
            outbound: Vec::new(),
            connect_timeout: Duration::from_secs(30),
            unreachable: UnreachablePeerPolicy::Strict,
            retry: RetryPolicy::default(),
        }
    }
}

impl PeersConfig {
    /// Fixed address configured for `peer`, if any.
    pub fn address_of(&self, peer: FederateId) -> Option<&str> {
        self.outbound
            .iter()
            .find(|p| p.id == peer)
            .and_then(|p| p.address.as_deref())
    }
}

impl FederateConfig {
    pub fn new(federate_id: FederateId, federation_id: impl Into<String>) -> Self {
        Self {
            federate_id,
            federation_id: federation_id.into(),
            coordinator: CoordinatorConfig::default(),
            coordination: CoordinationConfig::default(),
            clock_sync: ClockSyncConfig::default(),
            server: ServerConfig::default(),
            peers: PeersConfig::default(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn with_coordinator(mut self, host: impl Into<String>, port: u16) -> Self {
        self.coordinator.host = host.into();
        self.coordinator.port = port;
        self
    }

    pub fn with_coordination(mut self, mode: Coordination) -> Self {
        self.coordination.mode = mode;
        self
    }

    pub fn with_clock_sync(mut self, clock_sync: ClockSyncConfig) -> Self {
        self.clock_sync = clock_sync;
        self
    }

    pub fn with_server_port(mut self, port: u16) -> Self {
        self.server.port = Some(port);
        self
    }

    /// STP offset as an interval.
    pub fn stp_offset(&self) -> Interval {
        Interval::from(self.coordination.stp_offset)
    }

    /// Reject inconsistent settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.federation_id.is_empty() {
            return invalid("federation_id must not be empty".into());
        }
        if self.federation_id.len() > MAX_FEDERATION_ID_LEN {
            return invalid(format!(
                "federation_id is {} bytes, at most {} allowed",
                self.federation_id.len(),
                MAX_FEDERATION_ID_LEN
            ));
        }
        if self.coordinator.host.is_empty() {
            return invalid("coordinator.host must not be empty".into());
        }
        if self.coordinator.retry.max_attempts == 0 {
            return invalid("coordinator.retry.max_attempts must be at least 1".into());
        }
        if self.peers.retry.max_attempts == 0 {
            return invalid("peers.retry.max_attempts must be at least 1".into());
        }
        if self.clock_sync.mode != ClockSyncMode::Off && self.clock_sync.exchanges_per_interval == 0
        {
            return invalid("clock_sync.exchanges_per_interval must be at least 1".into());
        }
        if self.clock_sync.mode == ClockSyncMode::On && self.clock_sync.period.is_zero() {
            return invalid("clock_sync.period must be positive".into());
        }
        if self.server.port.is_none() {
            if self.server.port_range == 0 {
                return invalid("server.port_range must be at least 1".into());
            }
            if u32::from(self.server.base_port) + u32::from(self.server.port_range) > 65536 {
                return invalid("server.base_port + server.port_range exceeds 65535".into());
            }
        }

        let me = self.federate_id;
        let mut outbound = BTreeSet::new();
        for peer in &self.peers.outbound {
            if peer.id == me {
                return invalid(format!("{me} is listed as its own outbound peer"));
            }
            if !outbound.insert(peer.id) {
                return invalid(format!("outbound peer {} listed twice", peer.id));
            }
        }
        if self.peers.inbound.contains(&me) {
            return invalid(format!("{me} is listed as its own inbound peer"));
        }
        Ok(())
    }
}

/// `Duration` as a humantime string.
pub(crate) mod duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// `Option<Duration>` as an optional humantime string.
pub(crate) mod duration_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_str(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| humantime::parse_duration(&text).map_err(serde::de::Error::custom))
            .transpose()
    }
}
