//! Rows of the contact database in domain terms.

use chrono::{DateTime, Utc};

use peerbook_shared::{Group, Person, RequestDirection};

/// A friend request still waiting for an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub direction: RequestDirection,
    pub person: Person,
    pub created_at: DateTime<Utc>,
}

/// Everything the contact list persists, as loaded on open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub people: Vec<Person>,
    pub groups: Vec<Group>,
    pub requests: Vec<PendingRequest>,
}
