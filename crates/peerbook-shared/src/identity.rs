use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{KDF_CONTEXT_NODE_KEYPAIR, MAX_USERNAME_LEN};
use crate::error::IdentityError;
use crate::types::NodeId;

/// A known peer to join the DHT through.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BootstrapPeer {
    /// IP literal or hostname.
    pub host: String,
    pub port: u16,
}

impl BootstrapPeer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl FromStr for BootstrapPeer {
    type Err = IdentityError;

    /// Parse `host:port`, `ip:port` or `[ipv6]:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || IdentityError::InvalidBootstrap(s.to_string());
        let s = s.trim();

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, port) = rest.split_once("]:").ok_or_else(invalid)?;
            (host, port)
        } else {
            s.rsplit_once(':').ok_or_else(invalid)?
        };

        if host.is_empty() {
            return Err(invalid());
        }
        let port: u16 = port.parse().map_err(|_| invalid())?;

        Ok(Self::new(host, port))
    }
}

impl std::fmt::Display for BootstrapPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// The local user. Built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    node_id: NodeId,
    username: String,
    port: u16,
    bootstrap: Option<BootstrapPeer>,
}

impl User {
    pub fn new(
        node_id: NodeId,
        username: impl Into<String>,
        port: u16,
        bootstrap: Option<BootstrapPeer>,
    ) -> Result<Self, IdentityError> {
        let username = username.into();
        validate_username(&username)?;
        Ok(Self {
            node_id,
            username,
            port,
            bootstrap,
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn bootstrap(&self) -> Option<&BootstrapPeer> {
        self.bootstrap.as_ref()
    }

    pub fn has_bootstrap_peer(&self) -> bool {
        self.bootstrap.is_some()
    }

    /// Derive the 32-byte ed25519 seed of the node's network identity from the
    /// stable node id, so a restarted node keeps its DHT identity.
    pub fn keypair_seed(&self) -> [u8; 32] {
        blake3::derive_key(KDF_CONTEXT_NODE_KEYPAIR, self.node_id.as_bytes())
    }
}

pub fn validate_username(username: &str) -> Result<(), IdentityError> {
    if username.is_empty() {
        return Err(IdentityError::EmptyUsername);
    }
    if username.len() > MAX_USERNAME_LEN {
        return Err(IdentityError::UsernameTooLong {
            max: MAX_USERNAME_LEN,
        });
    }
    if username
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(IdentityError::InvalidUsername);
    }
    Ok(())
}
