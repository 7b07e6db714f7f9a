//! Peer connection tracking.
//!
//! Maintains an in-memory map of connected peers and the address each
//! connection was made through.

use std::collections::HashMap;

use libp2p::{Multiaddr, PeerId};
use tracing::debug;

/// Information about a connected peer.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub peer_id: PeerId,
    /// The multiaddr through which we are connected.
    pub address: Multiaddr,
    /// Unix epoch millis.
    pub connected_at: u64,
}

/// Tracks all currently connected peers.
#[derive(Debug, Clone, Default)]
pub struct PeerTracker {
    peers: HashMap<PeerId, ConnectionInfo>,
}

impl PeerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly connected peer. A second connection to the same peer
    /// replaces the recorded address.
    pub fn on_connected(&mut self, peer_id: PeerId, address: Multiaddr) {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        debug!(peer = %peer_id, addr = %address, "Tracking new peer connection");

        self.peers.insert(
            peer_id,
            ConnectionInfo {
                peer_id,
                address,
                connected_at: now,
            },
        );
    }

    /// Remove a peer that has fully disconnected.
    pub fn on_disconnected(&mut self, peer_id: &PeerId) {
        if self.peers.remove(peer_id).is_some() {
            debug!(peer = %peer_id, "Removed peer from tracker");
        }
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<&ConnectionInfo> {
        self.peers.get(peer_id)
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.peers.keys().copied().collect()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> Multiaddr {
        "/ip4/127.0.0.1/udp/4001/quic-v1".parse().unwrap()
    }

    #[test]
    fn test_connect_disconnect() {
        let mut tracker = PeerTracker::new();
        let peer = PeerId::random();

        assert!(!tracker.is_connected(&peer));
        assert_eq!(tracker.peer_count(), 0);

        tracker.on_connected(peer, test_addr());
        assert!(tracker.is_connected(&peer));
        assert_eq!(tracker.peer_count(), 1);
        assert_eq!(tracker.get(&peer).unwrap().address, test_addr());

        tracker.on_disconnected(&peer);
        assert!(!tracker.is_connected(&peer));
        assert_eq!(tracker.peer_count(), 0);
    }

    #[test]
    fn test_reconnect_replaces_address() {
        let mut tracker = PeerTracker::new();
        let peer = PeerId::random();
        let new_addr: Multiaddr = "/ip4/192.168.1.1/udp/4001/quic-v1".parse().unwrap();

        tracker.on_connected(peer, test_addr());
        tracker.on_connected(peer, new_addr.clone());

        assert_eq!(tracker.peer_count(), 1);
        assert_eq!(tracker.get(&peer).unwrap().address, new_addr);
    }

    #[test]
    fn test_connected_peers_list() {
        let mut tracker = PeerTracker::new();
        let p1 = PeerId::random();
        let p2 = PeerId::random();

        tracker.on_connected(p1, test_addr());
        tracker.on_connected(p2, test_addr());

        let peers = tracker.connected_peers();
        assert_eq!(peers.len(), 2);
        assert!(peers.contains(&p1));
        assert!(peers.contains(&p2));
    }
}
