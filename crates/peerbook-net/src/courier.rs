//! Carrying friend requests and their answers to the recipient's node.
//!
//! The DHT only stores presence; requests travel out of band. Every user
//! listens on a GossipSub inbox topic derived from the hash of their
//! username, and a sender dials the resolved address before publishing a
//! bincode [`RequestMessage`] on the recipient's inbox.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use peerbook_shared::constants::{
    CHANNEL_CAPACITY, DELIVERY_ATTEMPTS, DELIVERY_RETRY_MS, INBOX_TOPIC_PREFIX,
    KDF_CONTEXT_INBOX_TOPIC,
};
use peerbook_shared::{DeliveryError, Person, RequestMessage};

use crate::discovery::person_multiaddr;
use crate::dns::build_doh_resolver;
use crate::swarm::{SwarmHandle, SwarmNotification};

/// Delivers a request message to the node of `to`.
#[async_trait]
pub trait RequestCourier: Send + Sync {
    async fn deliver(&self, to: &Person, message: RequestMessage) -> Result<(), DeliveryError>;
}

#[async_trait]
impl<C: RequestCourier + ?Sized> RequestCourier for Arc<C> {
    async fn deliver(&self, to: &Person, message: RequestMessage) -> Result<(), DeliveryError> {
        (**self).deliver(to, message).await
    }
}

/// GossipSub topic on which `username` receives requests.
pub fn inbox_topic(username: &str) -> String {
    let digest = blake3::Hash::from(blake3::derive_key(
        KDF_CONTEXT_INBOX_TOPIC,
        username.as_bytes(),
    ));
    format!("{INBOX_TOPIC_PREFIX}{}", digest.to_hex())
}

// ---------------------------------------------------------------------------
// Gossip
// ---------------------------------------------------------------------------

/// Courier over the running swarm.
#[derive(Clone)]
pub struct GossipCourier {
    handle: SwarmHandle,
    resolver: TokioAsyncResolver,
}

impl GossipCourier {
    /// Subscribe to the inbox of `username` and start forwarding the messages
    /// addressed to it into the returned receiver.
    pub async fn attach(
        handle: SwarmHandle,
        username: &str,
    ) -> Result<(Self, mpsc::Receiver<RequestMessage>), DeliveryError> {
        let topic = inbox_topic(username);
        // Subscribe to notifications before the topic so nothing slips through
        let notifications = handle.subscribe();
        handle
            .subscribe_topic(topic.clone())
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let (inbox_tx, inbox_rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(inbox_loop(
            notifications,
            topic.clone(),
            username.to_string(),
            inbox_tx,
        ));

        info!(username = %username, topic = %topic, "Listening for friend requests");

        Ok((
            Self {
                handle,
                resolver: build_doh_resolver(),
            },
            inbox_rx,
        ))
    }
}

#[async_trait]
impl RequestCourier for GossipCourier {
    async fn deliver(&self, to: &Person, message: RequestMessage) -> Result<(), DeliveryError> {
        let unreachable = |reason: String| DeliveryError::Unreachable {
            username: to.username.clone(),
            reason,
        };

        let addr = person_multiaddr(to, &self.resolver)
            .await
            .map_err(|e| unreachable(e.to_string()))?;
        self.handle
            .dial(addr, true)
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        let data = message
            .to_bytes()
            .map_err(|e| DeliveryError::Encoding(e.to_string()))?;
        let topic = inbox_topic(&to.username);

        // The recipient's subscription reaches us a moment after connecting
        let mut last_error = String::new();
        for attempt in 1..=DELIVERY_ATTEMPTS {
            match self.handle.publish(topic.clone(), data.clone()).await {
                Ok(()) => {
                    debug!(to = %to.username, attempt, kind = ?message.kind, "Request message published");
                    return Ok(());
                }
                Err(e) => {
                    debug!(to = %to.username, attempt, error = %e, "Inbox not reachable yet");
                    last_error = e.to_string();
                    tokio::time::sleep(Duration::from_millis(DELIVERY_RETRY_MS)).await;
                }
            }
        }

        warn!(to = %to.username, error = %last_error, "Giving up on request delivery");
        Err(DeliveryError::Transport(last_error))
    }
}

async fn inbox_loop(
    mut notifications: broadcast::Receiver<SwarmNotification>,
    topic: String,
    username: String,
    inbox_tx: mpsc::Sender<RequestMessage>,
) {
    loop {
        let notification = match notifications.recv().await {
            Ok(n) => n,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Inbox fell behind swarm notifications");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let SwarmNotification::MessageReceived {
            topic: received_on,
            data,
            source,
        } = notification
        else {
            continue;
        };
        if received_on != topic {
            continue;
        }

        let message = match RequestMessage::from_bytes(&data) {
            Ok(m) => m,
            Err(e) => {
                warn!(source = ?source, error = %e, "Dropping undecodable request message");
                continue;
            }
        };
        if message.to != username {
            debug!(to = %message.to, "Dropping request message for another user");
            continue;
        }

        if inbox_tx.send(message).await.is_err() {
            break;
        }
    }

    debug!(username = %username, "Inbox loop stopped");
}

// ---------------------------------------------------------------------------
// Loopback
// ---------------------------------------------------------------------------

/// In-process switchboard connecting [`LoopbackCourier`]s by username.
#[derive(Debug, Clone, Default)]
pub struct LoopbackHub {
    inboxes: Arc<Mutex<HashMap<String, mpsc::Sender<RequestMessage>>>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the inbox of `username`. Registering again replaces the inbox.
    pub fn register(&self, username: &str) -> (LoopbackCourier, mpsc::Receiver<RequestMessage>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.inboxes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(username.to_string(), tx);
        (LoopbackCourier { hub: self.clone() }, rx)
    }

    pub fn unregister(&self, username: &str) {
        self.inboxes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(username);
    }

    fn inbox(&self, username: &str) -> Option<mpsc::Sender<RequestMessage>> {
        self.inboxes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(username)
            .cloned()
    }
}

#[derive(Debug, Clone)]
pub struct LoopbackCourier {
    hub: LoopbackHub,
}

#[async_trait]
impl RequestCourier for LoopbackCourier {
    async fn deliver(&self, to: &Person, message: RequestMessage) -> Result<(), DeliveryError> {
        let inbox = self
            .hub
            .inbox(&to.username)
            .ok_or_else(|| DeliveryError::Unreachable {
                username: to.username.clone(),
                reason: "no inbox registered".to_string(),
            })?;
        inbox
            .send(message)
            .await
            .map_err(|_| DeliveryError::Unreachable {
                username: to.username.clone(),
                reason: "inbox closed".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbox_topic_per_user() {
        let alice = inbox_topic("alice");
        assert!(alice.starts_with(INBOX_TOPIC_PREFIX));
        assert_eq!(alice.len(), INBOX_TOPIC_PREFIX.len() + 64);
        assert_eq!(alice, inbox_topic("alice"));
        assert_ne!(alice, inbox_topic("bob"));
    }

    #[tokio::test]
    async fn test_loopback_delivers_to_registered_inbox() {
        let hub = LoopbackHub::new();
        let (alice_courier, _alice_rx) = hub.register("alice");
        let (_bob_courier, mut bob_rx) = hub.register("bob");

        let alice = Person::new("alice", "10.0.0.1", 5001);
        let bob = Person::new("bob", "10.0.0.2", 5002);
        let msg = RequestMessage::request(alice, "bob");

        alice_courier.deliver(&bob, msg.clone()).await.unwrap();
        assert_eq!(bob_rx.recv().await.unwrap(), msg);
    }

    #[tokio::test]
    async fn test_loopback_unknown_recipient() {
        let hub = LoopbackHub::new();
        let (courier, _rx) = hub.register("alice");
        let ghost = Person::new("ghost", "10.0.0.9", 4001);

        let result = courier
            .deliver(
                &ghost,
                RequestMessage::request(Person::new("alice", "10.0.0.1", 5001), "ghost"),
            )
            .await;
        assert!(matches!(result, Err(DeliveryError::Unreachable { .. })));

        hub.unregister("alice");
        let alice = Person::new("alice", "10.0.0.1", 5001);
        assert!(courier
            .deliver(&alice, RequestMessage::request(ghost, "alice"))
            .await
            .is_err());
    }
}
