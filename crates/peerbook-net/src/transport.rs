use libp2p::identity::Keypair;
use tracing::info;

use crate::behaviour::PeerbookBehaviour;

/// Derive the node's libp2p identity from a 32-byte ed25519 seed.
pub fn keypair_from_seed(seed: [u8; 32]) -> anyhow::Result<Keypair> {
    Keypair::ed25519_from_bytes(seed)
        .map_err(|e| anyhow::anyhow!("Failed to create libp2p keypair: {e}"))
}

pub fn build_swarm(keypair: Keypair) -> anyhow::Result<libp2p::Swarm<PeerbookBehaviour>> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::time::Duration;

    use libp2p::gossipsub::{self, MessageAuthenticity, MessageId, ValidationMode};
    use libp2p::kad::{self, store::MemoryStore};
    use libp2p::{identify, StreamProtocol, SwarmBuilder};

    use peerbook_shared::constants::{
        GOSSIPSUB_HEARTBEAT_SECS, KAD_PROTOCOL, KAD_QUERY_TIMEOUT_SECS, MAX_MESSAGE_SIZE,
        PROTOCOL_VERSION,
    };

    let swarm = SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_quic()
        .with_behaviour(|key| -> std::result::Result<PeerbookBehaviour, Box<dyn std::error::Error + Send + Sync>> {
            let local_peer_id = key.public().to_peer_id();

            let mut kad_config = kad::Config::new(StreamProtocol::new(KAD_PROTOCOL));
            kad_config.set_query_timeout(Duration::from_secs(KAD_QUERY_TIMEOUT_SECS));
            let store = MemoryStore::new(local_peer_id);
            let mut kademlia = kad::Behaviour::with_config(local_peer_id, store, kad_config);
            // Answer queries even before an external address is confirmed
            kademlia.set_mode(Some(kad::Mode::Server));

            let message_id_fn = |message: &gossipsub::Message| {
                let mut hasher = DefaultHasher::new();
                message.data.hash(&mut hasher);
                if let Some(ref source) = message.source {
                    source.hash(&mut hasher);
                }
                MessageId::from(hasher.finish().to_string())
            };

            let gossipsub_config = gossipsub::ConfigBuilder::default()
                .heartbeat_interval(Duration::from_secs(GOSSIPSUB_HEARTBEAT_SECS))
                .validation_mode(ValidationMode::Strict)
                .max_transmit_size(MAX_MESSAGE_SIZE)
                .message_id_fn(message_id_fn)
                .build()
                .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> {
                    format!("GossipSub config: {e}").into()
                })?;

            let gossipsub = gossipsub::Behaviour::new(
                MessageAuthenticity::Signed(key.clone()),
                gossipsub_config,
            )
            .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> {
                format!("GossipSub init: {e}").into()
            })?;

            let identify_config =
                identify::Config::new(PROTOCOL_VERSION.to_string(), key.public())
                    .with_push_listen_addr_updates(true)
                    .with_interval(Duration::from_secs(60));
            let identify = identify::Behaviour::new(identify_config);

            Ok(PeerbookBehaviour {
                kademlia,
                gossipsub,
                identify,
            })
        })?
        .with_swarm_config(|cfg| {
            cfg.with_idle_connection_timeout(Duration::from_secs(60))
        })
        .build();

    info!(
        peer_id = %swarm.local_peer_id(),
        "Built peerbook swarm with QUIC transport"
    );

    Ok(swarm)
}
