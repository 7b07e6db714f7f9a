//! Composed libp2p `NetworkBehaviour` for a peerbook node.
//!
//! Combines Kademlia (the presence directory), GossipSub (friend-request
//! inboxes) and Identify (learning the listen addresses of peers we dial).

use libp2p::{
    gossipsub, identify,
    kad::{self, store::MemoryStore},
    swarm::NetworkBehaviour,
};

/// Composed network behaviour for peerbook nodes.
///
/// All sub-behaviours are driven by the single swarm event loop.
/// Construction is handled by [`super::transport::build_swarm`].
#[derive(NetworkBehaviour)]
#[behaviour(to_swarm = "PeerbookEvent")]
pub struct PeerbookBehaviour {
    /// Distributed hash table holding presence records
    pub kademlia: kad::Behaviour<MemoryStore>,
    /// Pub/sub carrying friend requests and answers
    pub gossipsub: gossipsub::Behaviour,
    /// Protocol identification and listen address exchange
    pub identify: identify::Behaviour,
}

/// Events emitted by the composed behaviour, one variant per sub-behaviour.
#[derive(Debug)]
pub enum PeerbookEvent {
    Kademlia(kad::Event),
    Gossipsub(gossipsub::Event),
    Identify(identify::Event),
}

impl From<kad::Event> for PeerbookEvent {
    fn from(event: kad::Event) -> Self {
        PeerbookEvent::Kademlia(event)
    }
}

impl From<gossipsub::Event> for PeerbookEvent {
    fn from(event: gossipsub::Event) -> Self {
        PeerbookEvent::Gossipsub(event)
    }
}

impl From<identify::Event> for PeerbookEvent {
    fn from(event: identify::Event) -> Self {
        PeerbookEvent::Identify(event)
    }
}
