use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Person, RequestOutcome};

/// What a [`RequestMessage`] carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestKind {
    /// "Please add me as a friend"
    Request,
    /// Answer to an earlier request
    Answer(RequestOutcome),
}

/// Friend-request envelope exchanged between peers through their inboxes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestMessage {
    pub kind: RequestKind,
    /// The sender as it wants to be recorded by the recipient
    pub from: Person,
    /// Recipient username
    pub to: String,
    pub sent_at: DateTime<Utc>,
    /// For deduplication
    pub message_id: uuid::Uuid,
}

impl RequestMessage {
    pub fn new(kind: RequestKind, from: Person, to: impl Into<String>) -> Self {
        Self {
            kind,
            from,
            to: to.into(),
            sent_at: Utc::now(),
            message_id: uuid::Uuid::new_v4(),
        }
    }

    pub fn request(from: Person, to: impl Into<String>) -> Self {
        Self::new(RequestKind::Request, from, to)
    }

    pub fn answer(outcome: RequestOutcome, from: Person, to: impl Into<String>) -> Self {
        Self::new(RequestKind::Answer(outcome), from, to)
    }

    /// Serialize to binary (bincode)
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_message_roundtrip() {
        let from = Person::new("alice", "10.0.0.1", 5001);
        let msg = RequestMessage::answer(RequestOutcome::Accepted, from.clone(), "bob");

        let bytes = msg.to_bytes().unwrap();
        let restored = RequestMessage::from_bytes(&bytes).unwrap();

        assert_eq!(restored, msg);
        assert_eq!(restored.kind, RequestKind::Answer(RequestOutcome::Accepted));
        assert_eq!(restored.from, from);
    }
}
