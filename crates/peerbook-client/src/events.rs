//! Change notifications of the contact list.
//!
//! [`ContactStore`](crate::contacts::ContactStore) publishes [`ContactEvent`]s
//! on a broadcast channel after each committed transition. A presentation
//! layer either consumes the channel directly or implements
//! [`DirectoryListener`] and hands it to [`spawn_listener`], which drives it
//! on its own task.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use peerbook_shared::{Person, RequestOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactEvent {
    /// Someone asked to become a friend.
    IncomingFriendRequest(Person),
    /// A request we sent was answered.
    OutgoingRequestResolved {
        person: Person,
        outcome: RequestOutcome,
    },
    /// We rejected an incoming request.
    IncomingRequestRemoved(Person),
    /// The confirmed contacts or groups changed.
    ContactListUpdated,
}

/// Observer of the contact list.
pub trait DirectoryListener: Send + Sync + 'static {
    fn on_incoming_friend_request(&self, person: &Person);

    fn on_outgoing_request_resolved(&self, person: &Person, outcome: RequestOutcome);

    fn on_contact_list_updated(&self);

    fn on_incoming_request_removed(&self, _person: &Person) {}
}

/// Feed every event from `events` to `listener` until the store goes away.
///
/// A listener that falls behind gets one `on_contact_list_updated` in place of
/// the events it missed, so it can re-read the lists.
pub fn spawn_listener<L: DirectoryListener>(
    mut events: broadcast::Receiver<ContactEvent>,
    listener: L,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => dispatch(&listener, &event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Listener lagged behind contact events");
                    listener.on_contact_list_updated();
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Contact listener stopped");
    })
}

fn dispatch<L: DirectoryListener + ?Sized>(listener: &L, event: &ContactEvent) {
    match event {
        ContactEvent::IncomingFriendRequest(person) => listener.on_incoming_friend_request(person),
        ContactEvent::OutgoingRequestResolved { person, outcome } => {
            listener.on_outgoing_request_resolved(person, *outcome)
        }
        ContactEvent::IncomingRequestRemoved(person) => listener.on_incoming_request_removed(person),
        ContactEvent::ContactListUpdated => listener.on_contact_list_updated(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct Recorder {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl DirectoryListener for Recorder {
        fn on_incoming_friend_request(&self, person: &Person) {
            self.calls.lock().unwrap().push(format!("incoming:{}", person.username));
        }

        fn on_outgoing_request_resolved(&self, person: &Person, outcome: RequestOutcome) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("resolved:{}:{outcome:?}", person.username));
        }

        fn on_contact_list_updated(&self) {
            self.calls.lock().unwrap().push("updated".to_string());
        }
    }

    #[tokio::test]
    async fn test_listener_receives_events_in_order() {
        let (tx, rx) = broadcast::channel(16);
        let recorder = Recorder::default();
        let handle = spawn_listener(rx, recorder.clone());

        let bob = Person::new("bob", "10.0.0.2", 5002);
        tx.send(ContactEvent::IncomingFriendRequest(bob.clone())).unwrap();
        tx.send(ContactEvent::OutgoingRequestResolved {
            person: bob.clone(),
            outcome: RequestOutcome::Accepted,
        })
        .unwrap();
        tx.send(ContactEvent::IncomingRequestRemoved(bob)).unwrap();
        tx.send(ContactEvent::ContactListUpdated).unwrap();
        drop(tx);

        handle.await.unwrap();
        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec!["incoming:bob", "resolved:bob:Accepted", "updated"]
        );
    }
}
