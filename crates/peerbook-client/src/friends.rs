//! The friend-request lifecycle: resolve, record, deliver, answer.
//!
//! ```text
//! requester                         recipient
//! send_request(bob)
//!   resolve bob in the directory
//!   outgoing-pending += bob
//!   deliver Request  ------------>  incoming-pending += alice
//!                                   confirm_friend(alice) / reject_friend(alice)
//!   outgoing resolved  <----------  deliver Answer
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use peerbook_net::{RequestCourier, UserResolver};
use peerbook_shared::{Person, RequestKind, RequestMessage, RequestOutcome};

use crate::contacts::{ContactStore, IncomingDisposition};
use crate::error::{ContactError, FriendRequestError, Result};

pub struct FriendRequestProtocol {
    resolver: Arc<dyn UserResolver>,
    courier: Arc<dyn RequestCourier>,
    contacts: Arc<ContactStore>,
}

impl FriendRequestProtocol {
    pub fn new(
        resolver: Arc<dyn UserResolver>,
        courier: Arc<dyn RequestCourier>,
        contacts: Arc<ContactStore>,
    ) -> Self {
        Self {
            resolver,
            courier,
            contacts,
        }
    }

    pub fn contacts(&self) -> &Arc<ContactStore> {
        &self.contacts
    }

    /// Ask `username` to become a friend. Returns the person as resolved.
    ///
    /// Nothing stays recorded when delivery fails.
    pub async fn send_request(&self, username: &str) -> Result<Person> {
        let me = self.me()?;
        if username == me.username {
            return Err(FriendRequestError::SelfRequest);
        }

        let person = Person::from(self.resolver.resolve_user(username).await?);
        self.contacts.add_outgoing_request(person.clone())?;

        let message = RequestMessage::request(me, username);
        if let Err(e) = self.courier.deliver(&person, message).await {
            warn!(to = %person, error = %e, "Friend request not delivered");
            self.contacts.withdraw_outgoing_request(username)?;
            return Err(e.into());
        }

        info!(to = %person, "Friend request sent");
        Ok(person)
    }

    /// Accept a pending incoming request and tell the requester.
    ///
    /// The contact is committed before the answer is sent; a delivery error
    /// only means the requester has not heard yet.
    pub async fn confirm_friend(&self, person: &Person) -> Result<Person> {
        let me = self.me()?;
        let confirmed = self.contacts.confirm(person)?;
        self.answer(me, &confirmed, RequestOutcome::Accepted).await?;
        Ok(confirmed)
    }

    /// Decline a pending incoming request and tell the requester.
    pub async fn reject_friend(&self, person: &Person) -> Result<Person> {
        let me = self.me()?;
        let rejected = self.contacts.reject(person)?;
        self.answer(me, &rejected, RequestOutcome::Rejected).await?;
        Ok(rejected)
    }

    /// Apply a message that arrived through the courier.
    pub async fn handle_message(&self, message: RequestMessage) -> Result<()> {
        let me = self.me()?;
        if message.to != me.username {
            debug!(to = %message.to, "Ignoring request message for another user");
            return Ok(());
        }

        match message.kind {
            RequestKind::Request => {
                let from = message.from;
                match self.contacts.receive_incoming_request(from.clone())? {
                    IncomingDisposition::AlreadyContact => {
                        // They lost our earlier answer
                        debug!(from = %from, "Request from existing contact, answering again");
                        self.answer(me, &from, RequestOutcome::Accepted).await?;
                    }
                    disposition => {
                        debug!(from = %from, ?disposition, "Request handled");
                    }
                }
                Ok(())
            }
            RequestKind::Answer(outcome) => {
                match self
                    .contacts
                    .outgoing_confirmed_or_rejected(&message.from, outcome)
                {
                    Ok(()) => Ok(()),
                    Err(ContactError::NotPending(username)) => {
                        debug!(from = %username, ?outcome, "Answer for no pending request");
                        Ok(())
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    async fn answer(&self, me: Person, to: &Person, outcome: RequestOutcome) -> Result<()> {
        let message = RequestMessage::answer(outcome, me, to.username.clone());
        self.courier.deliver(to, message).await?;
        debug!(to = %to, ?outcome, "Answer delivered");
        Ok(())
    }

    fn me(&self) -> Result<Person> {
        self.resolver
            .local_record()
            .map(Person::from)
            .ok_or(FriendRequestError::NotPublished)
    }
}
