//! Inbound courier messages -> friend-request protocol.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use peerbook_shared::RequestMessage;

use crate::friends::FriendRequestProtocol;

/// Spawn the loop applying every message from `inbox` in arrival order.
/// Ends when the courier drops its sender.
pub fn spawn_bridge(
    protocol: Arc<FriendRequestProtocol>,
    mut inbox: mpsc::Receiver<RequestMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Request bridge started");

        while let Some(message) = inbox.recv().await {
            debug!(
                from = %message.from.username,
                kind = ?message.kind,
                id = %message.message_id,
                "Request message received"
            );
            if let Err(e) = protocol.handle_message(message).await {
                warn!(error = %e, "Failed to apply request message");
            }
        }

        info!("Request bridge stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::ContactStore;
    use peerbook_net::{LocalDirectory, LoopbackHub, MemoryDht, RequestCourier};
    use peerbook_shared::{ContactState, Person, PresenceRecord};

    #[tokio::test]
    async fn test_bridge_applies_incoming_requests() {
        let dht = MemoryDht::new();
        let hub = LoopbackHub::new();

        let bob_dir = LocalDirectory::new(dht.clone(), PresenceRecord::new("bob", "127.0.0.1", 5002));
        bob_dir.announce().await.unwrap();
        let (bob_courier, bob_inbox) = hub.register("bob");
        let bob_contacts = Arc::new(ContactStore::new());
        let mut bob_events = bob_contacts.subscribe();
        let bob = Arc::new(FriendRequestProtocol::new(
            Arc::new(bob_dir),
            Arc::new(bob_courier),
            bob_contacts.clone(),
        ));
        let bridge = spawn_bridge(bob, bob_inbox);

        let (alice_courier, _alice_inbox) = hub.register("alice");
        let alice = Person::new("alice", "127.0.0.1", 5001);
        let bob_person = Person::new("bob", "127.0.0.1", 5002);
        alice_courier
            .deliver(&bob_person, RequestMessage::request(alice.clone(), "bob"))
            .await
            .unwrap();

        let event = bob_events.recv().await.unwrap();
        assert_eq!(event, crate::events::ContactEvent::IncomingFriendRequest(alice));
        assert_eq!(bob_contacts.state_of("alice"), ContactState::IncomingPending);

        hub.unregister("bob");
        bridge.await.unwrap();
    }
}
