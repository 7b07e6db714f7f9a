//! Node configuration loaded from environment variables.
//!
//! Everything except the username has a default, so a node can start with a
//! single variable set.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use peerbook_net::SessionConfig;
use peerbook_shared::constants::{DEFAULT_BOOTSTRAP_TIMEOUT_SECS, DEFAULT_PORT};
use peerbook_shared::identity::validate_username;
use peerbook_shared::{BootstrapPeer, NodeId, User};

use crate::error::ConfigError;

/// Node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Name published in the directory.
    /// Env: `PEERBOOK_USERNAME` (required)
    pub username: String,

    /// UDP port for QUIC.
    /// Env: `PEERBOOK_PORT`
    /// Default: `4001`
    pub port: u16,

    /// Stable node identifier; the DHT identity is derived from it.
    /// Env: `PEERBOOK_NODE_ID` (UUID)
    /// Default: a fresh random id, so the node gets a new DHT identity per run.
    pub node_id: NodeId,

    /// Known peer to join the DHT through.
    /// Env: `PEERBOOK_BOOTSTRAP` (`host:port`)
    /// Default: none, the node starts its own network.
    pub bootstrap: Option<BootstrapPeer>,

    /// Env: `PEERBOOK_BOOTSTRAP_TIMEOUT_SECS`
    /// Default: `10`
    pub bootstrap_timeout: Duration,

    /// Interface to bind.
    /// Env: `PEERBOOK_LISTEN_IP`
    /// Default: `0.0.0.0`
    pub listen_ip: IpAddr,

    /// Address to publish instead of the detected one (e.g. behind NAT).
    /// Env: `PEERBOOK_ADVERTISED_ADDR`
    pub advertised_address: Option<String>,

    /// Contact database file.
    /// Env: `PEERBOOK_DB_PATH`
    /// Default: per-user file in the platform data directory.
    pub db_path: Option<PathBuf>,
}

impl NodeConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let username = var("PEERBOOK_USERNAME")
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::MissingUsername)?;
        validate_username(&username)?;

        let mut config = Self {
            username,
            port: DEFAULT_PORT,
            node_id: NodeId::new(),
            bootstrap: None,
            bootstrap_timeout: Duration::from_secs(DEFAULT_BOOTSTRAP_TIMEOUT_SECS),
            listen_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            advertised_address: None,
            db_path: None,
        };

        if let Some(val) = var("PEERBOOK_PORT") {
            match val.parse::<u16>() {
                Ok(port) => config.port = port,
                Err(_) => tracing::warn!(value = %val, "Invalid PEERBOOK_PORT, using default"),
            }
        }

        match var("PEERBOOK_NODE_ID") {
            Some(val) => match NodeId::parse(val.trim()) {
                Ok(id) => config.node_id = id,
                Err(e) => tracing::warn!(
                    value = %val,
                    error = %e,
                    "Invalid PEERBOOK_NODE_ID, using a random id"
                ),
            },
            None => tracing::info!(
                node_id = %config.node_id,
                "PEERBOOK_NODE_ID not set, using a random id"
            ),
        }

        if let Some(val) = var("PEERBOOK_BOOTSTRAP") {
            if !val.trim().is_empty() {
                match val.parse::<BootstrapPeer>() {
                    Ok(peer) => config.bootstrap = Some(peer),
                    Err(e) => tracing::warn!(error = %e, "Ignoring PEERBOOK_BOOTSTRAP"),
                }
            }
        }

        if let Some(val) = var("PEERBOOK_BOOTSTRAP_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.bootstrap_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(
                    value = %val,
                    "Invalid PEERBOOK_BOOTSTRAP_TIMEOUT_SECS, using default"
                ),
            }
        }

        if let Some(val) = var("PEERBOOK_LISTEN_IP") {
            match val.parse::<IpAddr>() {
                Ok(ip) => config.listen_ip = ip,
                Err(_) => tracing::warn!(value = %val, "Invalid PEERBOOK_LISTEN_IP, using default"),
            }
        }

        if let Some(val) = var("PEERBOOK_ADVERTISED_ADDR") {
            if !val.trim().is_empty() {
                config.advertised_address = Some(val.trim().to_string());
            }
        }

        if let Some(val) = var("PEERBOOK_DB_PATH") {
            if !val.is_empty() {
                config.db_path = Some(PathBuf::from(val));
            }
        }

        Ok(config)
    }

    /// The local identity described by this configuration.
    pub fn user(&self) -> Result<User, ConfigError> {
        Ok(User::new(
            self.node_id,
            self.username.clone(),
            self.port,
            self.bootstrap.clone(),
        )?)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            listen_ip: self.listen_ip,
            bootstrap_timeout: self.bootstrap_timeout,
            advertised_address: self.advertised_address.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<NodeConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        NodeConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_username_required() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingUsername)));
        assert!(matches!(
            load(&[("PEERBOOK_USERNAME", "  ")]),
            Err(ConfigError::MissingUsername)
        ));
        assert!(matches!(
            load(&[("PEERBOOK_USERNAME", "two words")]),
            Err(ConfigError::Identity(_))
        ));
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("PEERBOOK_USERNAME", "alice")]).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.bootstrap.is_none());
        assert_eq!(
            config.bootstrap_timeout,
            Duration::from_secs(DEFAULT_BOOTSTRAP_TIMEOUT_SECS)
        );
        assert!(config.db_path.is_none());
        assert!(!config.user().unwrap().has_bootstrap_peer());
    }

    #[test]
    fn test_full_config() {
        let id = NodeId::new();
        let id_str = id.to_string();
        let config = load(&[
            ("PEERBOOK_USERNAME", "bob"),
            ("PEERBOOK_PORT", "5002"),
            ("PEERBOOK_NODE_ID", id_str.as_str()),
            ("PEERBOOK_BOOTSTRAP", "10.0.0.1:4001"),
            ("PEERBOOK_BOOTSTRAP_TIMEOUT_SECS", "3"),
            ("PEERBOOK_ADVERTISED_ADDR", "203.0.113.7"),
            ("PEERBOOK_DB_PATH", "/tmp/bob.db"),
        ])
        .unwrap();

        assert_eq!(config.port, 5002);
        assert_eq!(config.node_id, id);
        assert_eq!(config.bootstrap, Some(BootstrapPeer::new("10.0.0.1", 4001)));
        let session = config.session_config();
        assert_eq!(session.bootstrap_timeout, Duration::from_secs(3));
        assert_eq!(session.advertised_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(config.user().unwrap().node_id(), id);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = load(&[
            ("PEERBOOK_USERNAME", "carol"),
            ("PEERBOOK_PORT", "not-a-port"),
            ("PEERBOOK_BOOTSTRAP", "missing-port"),
            ("PEERBOOK_BOOTSTRAP_TIMEOUT_SECS", "0"),
        ])
        .unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.bootstrap.is_none());
        assert_eq!(
            config.bootstrap_timeout,
            Duration::from_secs(DEFAULT_BOOTSTRAP_TIMEOUT_SECS)
        );
    }
}
