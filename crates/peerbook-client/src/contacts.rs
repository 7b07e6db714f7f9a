//! The local contact list: confirmed people and groups plus both directions
//! of pending friend requests.
//!
//! All three sets live behind one mutex, so a username is never observed in
//! two of them. With a database attached, every transition is written to
//! SQLite first and committed in memory only when the write succeeded.
//! Events go out after the lock is released.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, info};

use peerbook_shared::constants::CHANNEL_CAPACITY;
use peerbook_shared::{Contact, ContactState, Group, Person, RequestDirection, RequestOutcome};
use peerbook_store::Database;

use crate::error::{ContactError, ContactResult};
use crate::events::ContactEvent;

/// What happened to an incoming friend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncomingDisposition {
    /// Recorded as pending; observers were told.
    Pending,
    /// Already pending from the same person. Nothing changed.
    AlreadyPending,
    /// The sender is already a contact.
    AlreadyContact,
    /// We had asked them too; both requests collapsed into a contact.
    MutualConfirmed,
}

#[derive(Default)]
struct ContactSets {
    contacts: BTreeMap<String, Contact>,
    outgoing: BTreeMap<String, Person>,
    incoming: BTreeMap<String, Person>,
}

impl ContactSets {
    fn state_of(&self, username: &str) -> ContactState {
        if self.contacts.contains_key(username) {
            ContactState::Contact
        } else if self.outgoing.contains_key(username) {
            ContactState::OutgoingPending
        } else if self.incoming.contains_key(username) {
            ContactState::IncomingPending
        } else {
            ContactState::Unknown
        }
    }

    /// Refuse to turn `username` into a person while a group holds the name.
    fn ensure_no_group(&self, username: &str) -> ContactResult<()> {
        match self.contacts.get(username) {
            Some(Contact::Group(_)) => Err(ContactError::DuplicateName(username.to_string())),
            _ => Ok(()),
        }
    }
}

struct Inner {
    sets: ContactSets,
    db: Option<Database>,
}

pub struct ContactStore {
    inner: Mutex<Inner>,
    events: broadcast::Sender<ContactEvent>,
}

impl ContactStore {
    /// An empty, memory-only contact list.
    pub fn new() -> Self {
        Self::with_parts(ContactSets::default(), None)
    }

    /// Load the contact list persisted in `db` and keep writing through to it.
    pub fn open(db: Database) -> ContactResult<Self> {
        let snapshot = db.load_snapshot()?;
        let mut sets = ContactSets::default();

        for person in snapshot.people {
            sets.contacts
                .insert(person.username.clone(), Contact::Person(person));
        }
        for group in snapshot.groups {
            sets.contacts.insert(group.name.clone(), Contact::Group(group));
        }
        for request in snapshot.requests {
            let username = request.person.username.clone();
            match request.direction {
                RequestDirection::Outgoing => sets.outgoing.insert(username, request.person),
                RequestDirection::Incoming => sets.incoming.insert(username, request.person),
            };
        }

        info!(
            contacts = sets.contacts.len(),
            outgoing = sets.outgoing.len(),
            incoming = sets.incoming.len(),
            "Contact list loaded"
        );
        Ok(Self::with_parts(sets, Some(db)))
    }

    fn with_parts(sets: ContactSets, db: Option<Database>) -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(Inner { sets, db }),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ContactEvent> {
        self.events.subscribe()
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Record a request we are about to send.
    pub fn add_outgoing_request(&self, person: Person) -> ContactResult<()> {
        let mut inner = self.lock();
        if inner.sets.state_of(&person.username) != ContactState::Unknown {
            return Err(ContactError::AlreadyKnown(person.username));
        }

        if let Some(db) = &inner.db {
            db.insert_request(RequestDirection::Outgoing, &person)?;
        }
        debug!(person = %person, "Outgoing friend request pending");
        inner.sets.outgoing.insert(person.username.clone(), person);
        Ok(())
    }

    /// Undo [`Self::add_outgoing_request`] when the request never left.
    /// Observers are not told; for them the request never existed.
    pub fn withdraw_outgoing_request(&self, username: &str) -> ContactResult<bool> {
        let mut inner = self.lock();
        if !inner.sets.outgoing.contains_key(username) {
            return Ok(false);
        }
        if let Some(db) = &inner.db {
            db.delete_request(username)?;
        }
        inner.sets.outgoing.remove(username);
        Ok(true)
    }

    /// Record a request someone sent us.
    pub fn receive_incoming_request(&self, person: Person) -> ContactResult<IncomingDisposition> {
        let mut events = Vec::new();
        let disposition = {
            let mut inner = self.lock();
            let username = person.username.clone();

            match inner.sets.state_of(&username) {
                ContactState::Contact => {
                    let moved = match inner.sets.contacts.get(&username) {
                        Some(Contact::Person(known)) => {
                            known.address != person.address || known.port != person.port
                        }
                        // A group holds the name
                        _ => return Err(ContactError::AlreadyKnown(username)),
                    };
                    if moved {
                        if let Some(db) = &inner.db {
                            db.upsert_contact(&person)?;
                        }
                        debug!(person = %person, "Refreshed contact address");
                        inner.sets.contacts.insert(username, Contact::Person(person));
                        events.push(ContactEvent::ContactListUpdated);
                    }
                    IncomingDisposition::AlreadyContact
                }
                ContactState::IncomingPending => {
                    let moved = inner.sets.incoming.get(&username).is_some_and(|known| {
                        known.address != person.address || known.port != person.port
                    });
                    if moved {
                        if let Some(db) = &inner.db {
                            db.update_request_address(&person)?;
                        }
                        debug!(person = %person, "Refreshed pending request address");
                        inner.sets.incoming.insert(username, person);
                    }
                    IncomingDisposition::AlreadyPending
                }
                ContactState::OutgoingPending => {
                    inner.sets.ensure_no_group(&username)?;
                    if let Some(db) = &inner.db {
                        db.promote_request(&person)?;
                    }
                    inner.sets.outgoing.remove(&username);
                    inner
                        .sets
                        .contacts
                        .insert(username, Contact::Person(person.clone()));
                    info!(person = %person, "Mutual friend request, now contacts");
                    events.push(ContactEvent::OutgoingRequestResolved {
                        person,
                        outcome: RequestOutcome::Accepted,
                    });
                    events.push(ContactEvent::ContactListUpdated);
                    IncomingDisposition::MutualConfirmed
                }
                ContactState::Unknown => {
                    if let Some(db) = &inner.db {
                        db.insert_request(RequestDirection::Incoming, &person)?;
                    }
                    info!(person = %person, "Incoming friend request");
                    inner.sets.incoming.insert(username, person.clone());
                    events.push(ContactEvent::IncomingFriendRequest(person));
                    IncomingDisposition::Pending
                }
            }
        };

        self.emit(events);
        Ok(disposition)
    }

    /// Accept an incoming request. Returns the person as recorded.
    pub fn confirm(&self, person: &Person) -> ContactResult<Person> {
        let confirmed = {
            let mut inner = self.lock();
            let pending = inner
                .sets
                .incoming
                .get(&person.username)
                .cloned()
                .ok_or_else(|| ContactError::NotPending(person.username.clone()))?;
            inner.sets.ensure_no_group(&pending.username)?;

            if let Some(db) = &inner.db {
                db.promote_request(&pending)?;
            }
            inner.sets.incoming.remove(&pending.username);
            inner
                .sets
                .contacts
                .insert(pending.username.clone(), Contact::Person(pending.clone()));
            pending
        };

        info!(person = %confirmed, "Friend request confirmed");
        self.emit(vec![ContactEvent::ContactListUpdated]);
        Ok(confirmed)
    }

    /// Decline an incoming request. Returns the person as recorded.
    pub fn reject(&self, person: &Person) -> ContactResult<Person> {
        let rejected = {
            let mut inner = self.lock();
            if !inner.sets.incoming.contains_key(&person.username) {
                return Err(ContactError::NotPending(person.username.clone()));
            }
            if let Some(db) = &inner.db {
                db.delete_request(&person.username)?;
            }
            inner
                .sets
                .incoming
                .remove(&person.username)
                .ok_or_else(|| ContactError::NotPending(person.username.clone()))?
        };

        info!(person = %rejected, "Friend request rejected");
        self.emit(vec![ContactEvent::IncomingRequestRemoved(rejected.clone())]);
        Ok(rejected)
    }

    /// The other side answered one of our requests. An accepted request
    /// makes them a contact here as well.
    pub fn outgoing_confirmed_or_rejected(
        &self,
        person: &Person,
        outcome: RequestOutcome,
    ) -> ContactResult<()> {
        let mut events = Vec::new();
        {
            let mut inner = self.lock();
            if !inner.sets.outgoing.contains_key(&person.username) {
                return Err(ContactError::NotPending(person.username.clone()));
            }

            match outcome {
                RequestOutcome::Accepted => {
                    inner.sets.ensure_no_group(&person.username)?;
                    if let Some(db) = &inner.db {
                        db.promote_request(person)?;
                    }
                    inner.sets.outgoing.remove(&person.username);
                    inner
                        .sets
                        .contacts
                        .insert(person.username.clone(), Contact::Person(person.clone()));
                }
                RequestOutcome::Rejected => {
                    if let Some(db) = &inner.db {
                        db.delete_request(&person.username)?;
                    }
                    inner.sets.outgoing.remove(&person.username);
                }
            }

            info!(person = %person, ?outcome, "Outgoing friend request answered");
            events.push(ContactEvent::OutgoingRequestResolved {
                person: person.clone(),
                outcome,
            });
            if outcome == RequestOutcome::Accepted {
                events.push(ContactEvent::ContactListUpdated);
            }
        }

        self.emit(events);
        Ok(())
    }

    /// Create a group out of confirmed contacts. Members are snapshotted with
    /// their currently known addresses.
    pub fn create_group(&self, name: &str, members: &[Person]) -> ContactResult<Group> {
        let group = {
            let mut inner = self.lock();
            // Groups share the namespace with people, pending ones included
            if inner.sets.state_of(name) != ContactState::Unknown {
                return Err(ContactError::DuplicateName(name.to_string()));
            }

            let mut snapshot = Vec::with_capacity(members.len());
            for member in members {
                match inner.sets.contacts.get(&member.username) {
                    Some(Contact::Person(known)) => snapshot.push(known.clone()),
                    _ => return Err(ContactError::UnknownMember(member.username.clone())),
                }
            }

            let group = Group::new(name, snapshot);
            if let Some(db) = &inner.db {
                db.create_group(&group)?;
            }
            inner
                .sets
                .contacts
                .insert(group.name.clone(), Contact::Group(group.clone()));
            group
        };

        info!(group = %group.name, members = group.len(), "Group created");
        self.emit(vec![ContactEvent::ContactListUpdated]);
        Ok(group)
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    pub fn state_of(&self, username: &str) -> ContactState {
        self.lock().sets.state_of(username)
    }

    /// All contacts, people and groups, ordered by name.
    pub fn contacts(&self) -> Vec<Contact> {
        self.lock().sets.contacts.values().cloned().collect()
    }

    pub fn friends(&self) -> Vec<Person> {
        self.lock()
            .sets
            .contacts
            .values()
            .filter_map(|c| c.as_person().cloned())
            .collect()
    }

    pub fn groups(&self) -> Vec<Group> {
        self.lock()
            .sets
            .contacts
            .values()
            .filter_map(|c| c.as_group().cloned())
            .collect()
    }

    pub fn outgoing_requests(&self) -> Vec<Person> {
        self.lock().sets.outgoing.values().cloned().collect()
    }

    pub fn incoming_requests(&self) -> Vec<Person> {
        self.lock().sets.incoming.values().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, events: Vec<ContactEvent>) {
        for event in events {
            // No receivers is fine
            let _ = self.events.send(event);
        }
    }
}

impl Default for ContactStore {
    fn default() -> Self {
        Self::new()
    }
}
