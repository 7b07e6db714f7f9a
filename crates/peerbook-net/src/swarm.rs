//! Swarm orchestration with the tokio command/notification pattern.
//!
//! The swarm event loop runs in a dedicated tokio task that exclusively owns
//! the `Swarm`. Callers talk to it through [`SwarmHandle`]: every request is
//! a [`SwarmCommand`] carrying a oneshot reply, and unsolicited events fan out
//! on a broadcast channel of [`SwarmNotification`]s.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

use futures::StreamExt;
use libp2p::{
    gossipsub, identify,
    kad::{self, GetRecordError, GetRecordOk, QueryId, QueryResult, Quorum, Record, RecordKey},
    swarm::{dial_opts::DialOpts, ConnectionId, SwarmEvent},
    Multiaddr, PeerId, Swarm,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use peerbook_shared::constants::{CHANNEL_CAPACITY, DEFAULT_PORT};
use peerbook_shared::{DirectoryError, DirectoryKey, SessionError};

use crate::behaviour::{PeerbookBehaviour, PeerbookEvent};
use crate::discovery::quic_multiaddr;
use crate::peers::PeerTracker;
use crate::transport::build_swarm;

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the swarm task.
#[derive(Debug)]
pub enum SwarmCommand {
    /// Dial an address whose peer id is not known yet. With `join_dht` the
    /// peer is added to the routing table and a Kademlia bootstrap follows.
    Dial {
        addr: Multiaddr,
        join_dht: bool,
        reply: oneshot::Sender<Result<PeerId, String>>,
    },
    /// Store a record under a directory key (locally and on the closest peers).
    PutRecord {
        key: DirectoryKey,
        value: Vec<u8>,
        reply: oneshot::Sender<Result<(), DirectoryError>>,
    },
    /// Look up the record stored under a directory key.
    GetRecord {
        key: DirectoryKey,
        reply: oneshot::Sender<Result<Option<Vec<u8>>, DirectoryError>>,
    },
    /// Publish a message on a GossipSub topic.
    PublishMessage {
        topic: String,
        data: Vec<u8>,
        reply: oneshot::Sender<Result<(), String>>,
    },
    /// Subscribe to a GossipSub topic.
    SubscribeTopic {
        topic: String,
        reply: oneshot::Sender<Result<(), String>>,
    },
    /// Current listen addresses. Answered once at least one is known.
    ListenAddrs(oneshot::Sender<Vec<Multiaddr>>),
    /// Request a snapshot of currently connected peers.
    GetPeers(oneshot::Sender<Vec<PeerId>>),
    /// Gracefully shut down the swarm.
    Shutdown,
}

/// Notifications sent *from* the swarm task to the application.
#[derive(Debug, Clone)]
pub enum SwarmNotification {
    /// A new peer connected.
    PeerConnected {
        peer_id: PeerId,
        address: Multiaddr,
    },
    /// A peer disconnected.
    PeerDisconnected {
        peer_id: PeerId,
    },
    /// A GossipSub message was received.
    MessageReceived {
        source: Option<PeerId>,
        topic: String,
        data: Vec<u8>,
    },
}

/// Configuration for spawning the swarm.
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Interface to bind (defaults to all IPv4 interfaces).
    pub listen_ip: IpAddr,
    /// UDP port for QUIC. `0` picks an ephemeral port.
    pub listen_port: u16,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            listen_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            listen_port: DEFAULT_PORT,
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cheaply clonable handle to a running swarm task.
#[derive(Debug, Clone)]
pub struct SwarmHandle {
    cmd_tx: mpsc::Sender<SwarmCommand>,
    notif_tx: broadcast::Sender<SwarmNotification>,
    local_peer_id: PeerId,
}

impl SwarmHandle {
    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// Receive notifications emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SwarmNotification> {
        self.notif_tx.subscribe()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SwarmCommand,
    ) -> anyhow::Result<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(build(tx))
            .await
            .map_err(|_| anyhow::anyhow!("Swarm command channel closed"))?;
        rx.await
            .map_err(|_| anyhow::anyhow!("Swarm task dropped the request"))
    }

    /// Dial `addr` and wait until the connection is established or fails.
    /// No deadline is applied here; wrap in `tokio::time::timeout`.
    pub async fn dial(&self, addr: Multiaddr, join_dht: bool) -> anyhow::Result<PeerId> {
        let target = addr.clone();
        self.request(|reply| SwarmCommand::Dial {
            addr,
            join_dht,
            reply,
        })
        .await?
        .map_err(|e| anyhow::anyhow!("Dial {target} failed: {e}"))
    }

    pub async fn put_record(&self, key: DirectoryKey, value: Vec<u8>) -> Result<(), DirectoryError> {
        self.request(|reply| SwarmCommand::PutRecord { key, value, reply })
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?
    }

    pub async fn get_record(&self, key: DirectoryKey) -> Result<Option<Vec<u8>>, DirectoryError> {
        self.request(|reply| SwarmCommand::GetRecord { key, reply })
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?
    }

    pub async fn publish(&self, topic: String, data: Vec<u8>) -> anyhow::Result<()> {
        self.request(|reply| SwarmCommand::PublishMessage { topic, data, reply })
            .await?
            .map_err(|e| anyhow::anyhow!("Publish failed: {e}"))
    }

    pub async fn subscribe_topic(&self, topic: String) -> anyhow::Result<()> {
        self.request(|reply| SwarmCommand::SubscribeTopic { topic, reply })
            .await?
            .map_err(|e| anyhow::anyhow!("Subscribe failed: {e}"))
    }

    pub async fn listen_addrs(&self) -> anyhow::Result<Vec<Multiaddr>> {
        self.request(SwarmCommand::ListenAddrs).await
    }

    pub async fn connected_peers(&self) -> anyhow::Result<Vec<PeerId>> {
        self.request(SwarmCommand::GetPeers).await
    }

    pub async fn shutdown(&self) {
        if self.cmd_tx.send(SwarmCommand::Shutdown).await.is_err() {
            debug!("Swarm already stopped");
        }
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

struct PendingDial {
    join_dht: bool,
    reply: oneshot::Sender<Result<PeerId, String>>,
}

type GetReply = oneshot::Sender<Result<Option<Vec<u8>>, DirectoryError>>;
type PutReply = oneshot::Sender<Result<(), DirectoryError>>;

/// Build the swarm, bind the listen port and spawn the event loop.
///
/// A bind failure is reported as [`SessionError::PortUnavailable`].
///
/// # Arguments
///
/// * `keypair` - The node's identity keypair
/// * `config` - Listen interface and port
pub async fn spawn_swarm(
    keypair: libp2p::identity::Keypair,
    config: SwarmConfig,
) -> Result<SwarmHandle, SessionError> {
    let mut swarm = build_swarm(keypair).map_err(|e| SessionError::Swarm(e.to_string()))?;
    let local_peer_id = *swarm.local_peer_id();

    let listen_addr = quic_multiaddr(config.listen_ip, config.listen_port);
    swarm
        .listen_on(listen_addr.clone())
        .map_err(|e| SessionError::PortUnavailable {
            port: config.listen_port,
            reason: e.to_string(),
        })?;

    info!(peer_id = %local_peer_id, addr = %listen_addr, "Swarm listening");

    let (cmd_tx, cmd_rx) = mpsc::channel::<SwarmCommand>(CHANNEL_CAPACITY);
    let (notif_tx, _) = broadcast::channel::<SwarmNotification>(CHANNEL_CAPACITY);

    tokio::spawn(run_event_loop(swarm, cmd_rx, notif_tx.clone()));

    Ok(SwarmHandle {
        cmd_tx,
        notif_tx,
        local_peer_id,
    })
}

async fn run_event_loop(
    mut swarm: Swarm<PeerbookBehaviour>,
    mut cmd_rx: mpsc::Receiver<SwarmCommand>,
    notif_tx: broadcast::Sender<SwarmNotification>,
) {
    let mut peer_tracker = PeerTracker::new();
    let mut listen_addrs: Vec<Multiaddr> = Vec::new();
    let mut addr_waiters: Vec<oneshot::Sender<Vec<Multiaddr>>> = Vec::new();
    let mut pending_dials: HashMap<ConnectionId, PendingDial> = HashMap::new();
    let mut pending_puts: HashMap<QueryId, (DirectoryKey, PutReply)> = HashMap::new();
    let mut pending_gets: HashMap<QueryId, (DirectoryKey, GetReply)> = HashMap::new();

    loop {
        tokio::select! {
            // --- Incoming commands ---
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SwarmCommand::Dial { addr, join_dht, reply }) => {
                        let opts = DialOpts::unknown_peer_id().address(addr.clone()).build();
                        let connection_id = opts.connection_id();
                        match swarm.dial(opts) {
                            Ok(()) => {
                                debug!(addr = %addr, join_dht, "Dialing peer");
                                pending_dials.insert(connection_id, PendingDial { join_dht, reply });
                            }
                            Err(e) => {
                                warn!(addr = %addr, error = %e, "Dial failed");
                                let _ = reply.send(Err(e.to_string()));
                            }
                        }
                    }
                    Some(SwarmCommand::PutRecord { key, value, reply }) => {
                        let record = Record::new(RecordKey::new(key.as_bytes()), value);
                        match swarm.behaviour_mut().kademlia.put_record(record, Quorum::One) {
                            Ok(query_id) => {
                                debug!(key = %key.short(), "Kademlia put started");
                                pending_puts.insert(query_id, (key, reply));
                            }
                            Err(e) => {
                                error!(key = %key.short(), error = %e, "Local record store rejected put");
                                let _ = reply.send(Err(DirectoryError::Unavailable(e.to_string())));
                            }
                        }
                    }
                    Some(SwarmCommand::GetRecord { key, reply }) => {
                        let query_id = swarm
                            .behaviour_mut()
                            .kademlia
                            .get_record(RecordKey::new(key.as_bytes()));
                        debug!(key = %key.short(), "Kademlia get started");
                        pending_gets.insert(query_id, (key, reply));
                    }
                    Some(SwarmCommand::PublishMessage { topic, data, reply }) => {
                        let gossipsub_topic = gossipsub::IdentTopic::new(&topic);
                        let result = swarm
                            .behaviour_mut()
                            .gossipsub
                            .publish(gossipsub_topic, data)
                            .map(|_| ())
                            .map_err(|e| e.to_string());
                        if let Err(ref e) = result {
                            debug!(topic = %topic, error = %e, "Publish failed");
                        }
                        let _ = reply.send(result);
                    }
                    Some(SwarmCommand::SubscribeTopic { topic, reply }) => {
                        let gossipsub_topic = gossipsub::IdentTopic::new(&topic);
                        let result = swarm
                            .behaviour_mut()
                            .gossipsub
                            .subscribe(&gossipsub_topic)
                            .map(|_| ())
                            .map_err(|e| e.to_string());
                        if let Err(ref e) = result {
                            error!(topic = %topic, error = %e, "Subscribe failed");
                        }
                        let _ = reply.send(result);
                    }
                    Some(SwarmCommand::ListenAddrs(reply)) => {
                        if listen_addrs.is_empty() {
                            addr_waiters.push(reply);
                        } else {
                            let _ = reply.send(listen_addrs.clone());
                        }
                    }
                    Some(SwarmCommand::GetPeers(reply)) => {
                        let _ = reply.send(peer_tracker.connected_peers());
                    }
                    Some(SwarmCommand::Shutdown) => {
                        info!("Swarm shutdown requested");
                        break;
                    }
                    None => {
                        // All senders dropped
                        info!("Command channel closed, shutting down swarm");
                        break;
                    }
                }
            }

            // --- Swarm events ---
            event = swarm.select_next_some() => {
                match event {
                    SwarmEvent::Behaviour(PeerbookEvent::Kademlia(
                        kad::Event::OutboundQueryProgressed { id, result, .. },
                    )) => {
                        handle_query_result(&mut swarm, id, result, &mut pending_puts, &mut pending_gets);
                    }

                    SwarmEvent::Behaviour(PeerbookEvent::Kademlia(
                        kad::Event::RoutingUpdated { peer, is_new_peer, .. },
                    )) => {
                        if is_new_peer {
                            debug!(peer = %peer, "Kademlia routing table gained peer");
                        }
                    }

                    SwarmEvent::Behaviour(PeerbookEvent::Gossipsub(
                        gossipsub::Event::Message { message, .. },
                    )) => {
                        let topic = message.topic.to_string();
                        debug!(
                            topic = %topic,
                            source = ?message.source,
                            len = message.data.len(),
                            "GossipSub message received"
                        );
                        let _ = notif_tx.send(SwarmNotification::MessageReceived {
                            source: message.source,
                            topic,
                            data: message.data,
                        });
                    }

                    SwarmEvent::Behaviour(PeerbookEvent::Identify(
                        identify::Event::Received { peer_id, info, .. },
                    )) => {
                        debug!(
                            peer = %peer_id,
                            protocol = ?info.protocol_version,
                            observed = %info.observed_addr,
                            "Identify: received info from peer"
                        );
                        for addr in &info.listen_addrs {
                            swarm
                                .behaviour_mut()
                                .kademlia
                                .add_address(&peer_id, addr.clone());
                        }
                    }

                    SwarmEvent::ConnectionEstablished {
                        peer_id, connection_id, endpoint, ..
                    } => {
                        let addr = endpoint.get_remote_address().clone();
                        peer_tracker.on_connected(peer_id, addr.clone());
                        info!(peer = %peer_id, addr = %addr, "Peer connected");

                        if let Some(pending) = pending_dials.remove(&connection_id) {
                            if pending.join_dht {
                                let kademlia = &mut swarm.behaviour_mut().kademlia;
                                kademlia.add_address(&peer_id, addr.clone());
                                if let Err(e) = kademlia.bootstrap() {
                                    warn!(error = %e, "Kademlia bootstrap failed to start");
                                }
                            }
                            let _ = pending.reply.send(Ok(peer_id));
                        }

                        let _ = notif_tx.send(SwarmNotification::PeerConnected {
                            peer_id,
                            address: addr,
                        });
                    }

                    SwarmEvent::ConnectionClosed {
                        peer_id,
                        num_established,
                        ..
                    } => {
                        if num_established == 0 {
                            peer_tracker.on_disconnected(&peer_id);
                            info!(peer = %peer_id, "Peer disconnected");
                            let _ = notif_tx.send(SwarmNotification::PeerDisconnected { peer_id });
                        }
                    }

                    SwarmEvent::NewListenAddr { address, .. } => {
                        info!(addr = %address, "Listening on new address");
                        listen_addrs.push(address);
                        for waiter in addr_waiters.drain(..) {
                            let _ = waiter.send(listen_addrs.clone());
                        }
                    }

                    SwarmEvent::ExpiredListenAddr { address, .. } => {
                        debug!(addr = %address, "Listen address expired");
                        listen_addrs.retain(|a| a != &address);
                    }

                    SwarmEvent::OutgoingConnectionError { connection_id, peer_id, error } => {
                        warn!(
                            peer = ?peer_id,
                            error = %error,
                            "Outgoing connection error"
                        );
                        if let Some(pending) = pending_dials.remove(&connection_id) {
                            let _ = pending.reply.send(Err(error.to_string()));
                        }
                    }

                    SwarmEvent::IncomingConnectionError { error, .. } => {
                        warn!(error = %error, "Incoming connection error");
                    }

                    _ => {}
                }
            }
        }
    }

    info!("Swarm event loop terminated");
}

/// Route a finished (or progressing) Kademlia query to whoever is waiting on it.
fn handle_query_result(
    swarm: &mut Swarm<PeerbookBehaviour>,
    id: QueryId,
    result: QueryResult,
    pending_puts: &mut HashMap<QueryId, (DirectoryKey, PutReply)>,
    pending_gets: &mut HashMap<QueryId, (DirectoryKey, GetReply)>,
) {
    match result {
        QueryResult::GetRecord(Ok(GetRecordOk::FoundRecord(peer_record))) => {
            if let Some((key, reply)) = pending_gets.remove(&id) {
                debug!(key = %key.short(), from = ?peer_record.peer, "Record found");
                let _ = reply.send(Ok(Some(peer_record.record.value)));
                // One record is all we need; last writer wins
                if let Some(mut query) = swarm.behaviour_mut().kademlia.query_mut(&id) {
                    query.finish();
                }
            }
        }
        QueryResult::GetRecord(Ok(GetRecordOk::FinishedWithNoAdditionalRecord { .. }))
        | QueryResult::GetRecord(Err(GetRecordError::NotFound { .. })) => {
            if let Some((key, reply)) = pending_gets.remove(&id) {
                debug!(key = %key.short(), "No record found");
                let _ = reply.send(Ok(None));
            }
        }
        QueryResult::GetRecord(Err(err)) => {
            if let Some((key, reply)) = pending_gets.remove(&id) {
                warn!(key = %key.short(), error = %err, "Kademlia get failed");
                let _ = reply.send(Err(DirectoryError::Unavailable(err.to_string())));
            }
        }
        QueryResult::PutRecord(Ok(_)) => {
            if let Some((key, reply)) = pending_puts.remove(&id) {
                debug!(key = %key.short(), "Record replicated");
                let _ = reply.send(Ok(()));
            }
        }
        QueryResult::PutRecord(Err(err)) => {
            // The record is already in the local store, which serves lookups
            // until peers are found.
            if let Some((key, reply)) = pending_puts.remove(&id) {
                debug!(key = %key.short(), error = %err, "Record stored locally only");
                let _ = reply.send(Ok(()));
            }
        }
        QueryResult::Bootstrap(Ok(ok)) => {
            debug!(peer = %ok.peer, remaining = ok.num_remaining, "Kademlia bootstrap progressed");
        }
        QueryResult::Bootstrap(Err(err)) => {
            warn!(error = %err, "Kademlia bootstrap failed");
        }
        other => {
            debug!(result = ?other, "Kademlia query progressed");
        }
    }
}
