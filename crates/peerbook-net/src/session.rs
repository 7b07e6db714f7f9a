//! Lifecycle of the local peer: bind, join the DHT, publish presence.
//!
//! ```text
//! Created -> Started -> (Bootstrapped) -> Published -> Stopped
//! ```
//!
//! A failed or slow bootstrap never aborts `start()`: the session publishes
//! into its own record store and keeps running without peers. Only a bind
//! failure is fatal.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use libp2p::PeerId;
use tracing::{debug, info, warn};

use peerbook_shared::constants::DEFAULT_BOOTSTRAP_TIMEOUT_SECS;
use peerbook_shared::{PresenceRecord, SessionError, User};

use crate::directory::{DirectoryClient, UserResolver};
use crate::discovery::{bootstrap_multiaddr, pick_advertised};
use crate::dns::build_doh_resolver;
use crate::swarm::{spawn_swarm, SwarmConfig, SwarmHandle};
use crate::transport::keypair_from_seed;

/// How long `start()` waits for the first listen address.
const LISTEN_ADDR_TIMEOUT: Duration = Duration::from_secs(5);

/// Session settings that do not belong to the user identity.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Interface to bind. The port comes from the [`User`].
    pub listen_ip: IpAddr,
    /// Upper bound on the bootstrap handshake.
    pub bootstrap_timeout: Duration,
    /// Address to publish instead of the one picked from listen addresses.
    pub advertised_address: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            listen_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            bootstrap_timeout: Duration::from_secs(DEFAULT_BOOTSTRAP_TIMEOUT_SECS),
            advertised_address: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    /// Port bound, swarm running.
    Started,
    /// Connected to the bootstrap peer and routing table seeded.
    Bootstrapped,
    /// Own presence record written.
    Published,
    Stopped,
}

impl SessionState {
    fn is_running(self) -> bool {
        matches!(self, Self::Started | Self::Bootstrapped | Self::Published)
    }
}

/// Outcome of the bootstrap step of `start()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapStatus {
    /// No bootstrap peer configured; this node is the first of its network.
    NotConfigured,
    Joined(PeerId),
    /// The bootstrap peer could not be reached in time. The session runs alone.
    Degraded(String),
}

/// What `start()` achieved.
#[derive(Debug, Clone)]
pub struct StartReport {
    pub peer_id: PeerId,
    pub record: PresenceRecord,
    pub bootstrap: BootstrapStatus,
}

/// The local DHT node. Construct once and share behind an `Arc`.
pub struct PeerSession {
    user: User,
    config: SessionConfig,
    resolver: TokioAsyncResolver,
    state: Mutex<SessionState>,
    directory: Mutex<Option<DirectoryClient<SwarmHandle>>>,
    published: Mutex<Option<PresenceRecord>>,
    start_lock: tokio::sync::Mutex<()>,
}

impl PeerSession {
    pub fn new(user: User, config: SessionConfig) -> Self {
        Self {
            user,
            config,
            resolver: build_doh_resolver(),
            state: Mutex::new(SessionState::Created),
            directory: Mutex::new(None),
            published: Mutex::new(None),
            start_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Handle to the running swarm, for components that need raw access
    /// (the gossip courier).
    pub fn swarm(&self) -> Option<SwarmHandle> {
        lock(&self.directory).as_ref().map(|d| d.dht().clone())
    }

    /// Bind, bootstrap (bounded) and publish.
    ///
    /// # Errors
    ///
    /// * [`SessionError::AlreadyStarted`] on a second call
    /// * [`SessionError::PortUnavailable`] when the port cannot be bound
    /// * [`SessionError::Directory`] when the presence record cannot be
    ///   written; the session stays started and `republish()` may be retried
    pub async fn start(&self) -> Result<StartReport, SessionError> {
        let _guard = self.start_lock.lock().await;
        if self.state() != SessionState::Created {
            return Err(SessionError::AlreadyStarted);
        }

        let keypair = keypair_from_seed(self.user.keypair_seed())
            .map_err(|e| SessionError::Swarm(e.to_string()))?;
        let swarm_config = SwarmConfig {
            listen_ip: self.config.listen_ip,
            listen_port: self.user.port(),
        };
        let handle = spawn_swarm(keypair, swarm_config).await?;
        let peer_id = handle.local_peer_id();

        *lock(&self.directory) = Some(DirectoryClient::new(handle.clone()));
        self.set_state(SessionState::Started);
        info!(
            username = %self.user.username(),
            node_id = %self.user.node_id(),
            peer_id = %peer_id,
            "Peer session started"
        );

        let bootstrap = self.join_bootstrap(&handle).await;
        if matches!(bootstrap, BootstrapStatus::Joined(_)) {
            self.set_state(SessionState::Bootstrapped);
        }

        let record = self.publish_presence(&handle).await?;

        Ok(StartReport {
            peer_id,
            record,
            bootstrap,
        })
    }

    /// Re-announce presence, e.g. after the network address changed.
    pub async fn republish(&self) -> Result<PresenceRecord, SessionError> {
        let handle = self.swarm().ok_or(SessionError::NotStarted)?;
        self.publish_presence(&handle).await
    }

    /// Look up another user's presence record.
    pub async fn resolve_user(&self, username: &str) -> Result<PresenceRecord, SessionError> {
        let directory = lock(&self.directory)
            .clone()
            .ok_or(SessionError::NotStarted)?;
        Ok(directory.resolve(username).await?)
    }

    /// The record most recently published by this session.
    pub fn published_record(&self) -> Option<PresenceRecord> {
        lock(&self.published).clone()
    }

    pub async fn connected_peers(&self) -> Result<Vec<PeerId>, SessionError> {
        let handle = self.swarm().ok_or(SessionError::NotStarted)?;
        handle
            .connected_peers()
            .await
            .map_err(|e| SessionError::Swarm(e.to_string()))
    }

    /// Stop the swarm task. Idempotent.
    pub async fn shutdown(&self) {
        let directory = lock(&self.directory).take();
        if let Some(directory) = directory {
            directory.dht().shutdown().await;
            info!(username = %self.user.username(), "Peer session stopped");
        }
        if self.state() != SessionState::Created {
            self.set_state(SessionState::Stopped);
        }
    }

    async fn join_bootstrap(&self, handle: &SwarmHandle) -> BootstrapStatus {
        let Some(peer) = self.user.bootstrap() else {
            debug!("No bootstrap peer configured");
            return BootstrapStatus::NotConfigured;
        };

        let attempt = async {
            let addr = bootstrap_multiaddr(peer, &self.resolver).await?;
            debug!(bootstrap = %peer, addr = %addr, "Dialing bootstrap peer");
            handle.dial(addr, true).await
        };

        match tokio::time::timeout(self.config.bootstrap_timeout, attempt).await {
            Ok(Ok(remote)) => {
                info!(bootstrap = %peer, peer = %remote, "Joined DHT through bootstrap peer");
                BootstrapStatus::Joined(remote)
            }
            Ok(Err(e)) => {
                warn!(bootstrap = %peer, error = %e, "Bootstrap failed, continuing without peers");
                BootstrapStatus::Degraded(e.to_string())
            }
            Err(_) => {
                warn!(
                    bootstrap = %peer,
                    timeout = ?self.config.bootstrap_timeout,
                    "Bootstrap timed out, continuing without peers"
                );
                BootstrapStatus::Degraded(format!(
                    "no answer from {peer} within {:?}",
                    self.config.bootstrap_timeout
                ))
            }
        }
    }

    async fn publish_presence(&self, handle: &SwarmHandle) -> Result<PresenceRecord, SessionError> {
        let record = self.observed_record(handle).await?;
        DirectoryClient::new(handle.clone())
            .publish(self.user.username(), &record)
            .await?;

        *lock(&self.published) = Some(record.clone());
        if self.state().is_running() {
            self.set_state(SessionState::Published);
        }
        Ok(record)
    }

    /// `{username, observed address, bound port}` for this node.
    async fn observed_record(&self, handle: &SwarmHandle) -> Result<PresenceRecord, SessionError> {
        let addrs = tokio::time::timeout(LISTEN_ADDR_TIMEOUT, handle.listen_addrs())
            .await
            .map_err(|_| SessionError::Swarm("no listen address reported".to_string()))?
            .map_err(|e| SessionError::Swarm(e.to_string()))?;

        let (ip, port) = pick_advertised(&addrs).ok_or_else(|| {
            SessionError::Swarm(format!("no usable listen address among {addrs:?}"))
        })?;

        let address = self
            .config
            .advertised_address
            .clone()
            .unwrap_or_else(|| ip.to_string());

        Ok(PresenceRecord::new(self.user.username(), address, port))
    }

    fn set_state(&self, next: SessionState) {
        let mut state = lock(&self.state);
        debug!(from = ?*state, to = ?next, "Session state change");
        *state = next;
    }
}

#[async_trait]
impl UserResolver for PeerSession {
    async fn resolve_user(&self, username: &str) -> Result<PresenceRecord, SessionError> {
        PeerSession::resolve_user(self, username).await
    }

    fn local_record(&self) -> Option<PresenceRecord> {
        self.published_record()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerbook_shared::{BootstrapPeer, DirectoryError, NodeId};

    fn loopback_config() -> SessionConfig {
        SessionConfig {
            listen_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            bootstrap_timeout: Duration::from_millis(500),
            advertised_address: None,
        }
    }

    #[tokio::test]
    async fn test_resolve_before_start_fails() {
        let user = User::new(NodeId::new(), "alice", 0, None).unwrap();
        let session = PeerSession::new(user, loopback_config());

        assert_eq!(session.state(), SessionState::Created);
        assert!(matches!(
            session.resolve_user("bob").await,
            Err(SessionError::NotStarted)
        ));
        assert!(matches!(session.republish().await, Err(SessionError::NotStarted)));
    }

    #[tokio::test]
    async fn test_start_publishes_and_resolves_self() {
        let user = User::new(NodeId::new(), "alice", 0, None).unwrap();
        let session = PeerSession::new(user, loopback_config());

        let report = session.start().await.unwrap();
        assert_eq!(report.bootstrap, BootstrapStatus::NotConfigured);
        assert_eq!(session.state(), SessionState::Published);
        assert_eq!(report.record.username, "alice");
        assert_eq!(report.record.address, "127.0.0.1");
        assert_ne!(report.record.port, 0);

        let resolved = session.resolve_user("alice").await.unwrap();
        assert_eq!(resolved, report.record);

        assert!(matches!(
            session.resolve_user("nobody").await,
            Err(SessionError::Directory(DirectoryError::NotFound(_)))
        ));

        assert!(matches!(session.start().await, Err(SessionError::AlreadyStarted)));

        session.shutdown().await;
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.swarm().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_bootstrap_still_publishes() {
        let bootstrap = BootstrapPeer::new("127.0.0.1", 9);
        let user = User::new(NodeId::new(), "carol", 0, Some(bootstrap)).unwrap();
        let session = PeerSession::new(user, loopback_config());

        let report = session.start().await.unwrap();
        assert!(matches!(report.bootstrap, BootstrapStatus::Degraded(_)));
        assert_eq!(session.state(), SessionState::Published);
        assert_eq!(session.published_record(), Some(report.record));

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_advertised_address_override() {
        let user = User::new(NodeId::new(), "dave", 0, None).unwrap();
        let mut config = loopback_config();
        config.advertised_address = Some("203.0.113.7".to_string());
        let session = PeerSession::new(user, config);

        let report = session.start().await.unwrap();
        assert_eq!(report.record.address, "203.0.113.7");

        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_two_nodes_resolve_and_exchange_requests() {
        use crate::courier::{GossipCourier, RequestCourier};
        use peerbook_shared::{Person, RequestKind, RequestMessage};

        let alice = PeerSession::new(
            User::new(NodeId::new(), "alice", 0, None).unwrap(),
            loopback_config(),
        );
        let alice_record = alice.start().await.unwrap().record;
        let (_alice_courier, mut alice_inbox) =
            GossipCourier::attach(alice.swarm().unwrap(), "alice").await.unwrap();

        let bootstrap = BootstrapPeer::new("127.0.0.1", alice_record.port);
        let mut config = loopback_config();
        config.bootstrap_timeout = Duration::from_secs(5);
        let bob = PeerSession::new(
            User::new(NodeId::new(), "bob", 0, Some(bootstrap)).unwrap(),
            config,
        );
        let report = bob.start().await.unwrap();
        assert!(matches!(report.bootstrap, BootstrapStatus::Joined(_)));
        assert_eq!(bob.state(), SessionState::Published);

        let mut resolved = None;
        for _ in 0..10 {
            if let Ok(record) = bob.resolve_user("alice").await {
                resolved = Some(record);
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        let resolved = resolved.expect("bob never resolved alice");
        assert_eq!(resolved.port, alice_record.port);

        let (bob_courier, _bob_inbox) =
            GossipCourier::attach(bob.swarm().unwrap(), "bob").await.unwrap();
        let message = RequestMessage::request(Person::from(report.record.clone()), "alice");
        bob_courier
            .deliver(&Person::from(resolved), message)
            .await
            .unwrap();

        let received = tokio::time::timeout(Duration::from_secs(10), alice_inbox.recv())
            .await
            .expect("no request reached alice")
            .unwrap();
        assert_eq!(received.kind, RequestKind::Request);
        assert_eq!(received.from.username, "bob");
        assert_eq!(received.from.port, report.record.port);

        bob.shutdown().await;
        alice.shutdown().await;
    }

    #[tokio::test]
    async fn test_port_in_use_is_fatal() {
        let holder = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = holder.local_addr().unwrap().port();

        let user = User::new(NodeId::new(), "erin", port, None).unwrap();
        let session = PeerSession::new(user, loopback_config());

        match session.start().await {
            Err(SessionError::PortUnavailable { port: p, .. }) => assert_eq!(p, port),
            other => panic!("expected PortUnavailable, got {other:?}"),
        }
        assert_eq!(session.state(), SessionState::Created);
    }
}
