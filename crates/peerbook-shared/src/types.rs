use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::KDF_CONTEXT_DIRECTORY_KEY;

// Stable node identifier, persisted by the startup layer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a username in the DHT key space.
///
/// Unsalted: two users who pick the same username share one key, and the
/// later publish replaces the earlier record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DirectoryKey(pub [u8; 32]);

impl DirectoryKey {
    pub fn for_username(username: &str) -> Self {
        Self(blake3::derive_key(
            KDF_CONTEXT_DIRECTORY_KEY,
            username.as_bytes(),
        ))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl std::fmt::Display for DirectoryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// The value stored in the DHT for one username.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceRecord {
    pub username: String,
    /// Dotted-quad, IPv6 literal or hostname.
    pub address: String,
    pub port: u16,
}

impl PresenceRecord {
    pub fn new(username: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            username: username.into(),
            address: address.into(),
            port,
        }
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

/// A remote user as known locally. Identity is the username; the address is
/// whatever the last successful resolve returned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Person {
    pub username: String,
    pub address: String,
    pub port: u16,
}

impl Person {
    pub fn new(username: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            username: username.into(),
            address: address.into(),
            port,
        }
    }

    pub fn endpoint(&self) -> String {
        if self.address.contains(':') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

impl From<PresenceRecord> for Person {
    fn from(record: PresenceRecord) -> Self {
        Self {
            username: record.username,
            address: record.address,
            port: record.port,
        }
    }
}

impl std::fmt::Display for Person {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.username, self.endpoint())
    }
}

/// A named set of people. Membership is fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    members: Vec<Person>,
}

impl Group {
    /// Build a group, dropping duplicate usernames. Members are kept sorted by
    /// username so two groups with the same people compare equal.
    pub fn new(name: impl Into<String>, members: impl IntoIterator<Item = Person>) -> Self {
        let mut members: Vec<Person> = members.into_iter().collect();
        members.sort_by(|a, b| a.username.cmp(&b.username));
        members.dedup_by(|a, b| a.username == b.username);
        Self {
            name: name.into(),
            members,
        }
    }

    pub fn members(&self) -> &[Person] {
        &self.members
    }

    pub fn contains(&self, username: &str) -> bool {
        self.members.iter().any(|p| p.username == username)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// An entry of the local contact list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Contact {
    Person(Person),
    Group(Group),
}

impl Contact {
    /// The key of this contact in the contact list.
    pub fn name(&self) -> &str {
        match self {
            Contact::Person(p) => &p.username,
            Contact::Group(g) => &g.name,
        }
    }

    pub fn as_person(&self) -> Option<&Person> {
        match self {
            Contact::Person(p) => Some(p),
            Contact::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Contact::Group(g) => Some(g),
            Contact::Person(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RequestDirection {
    Outgoing,
    Incoming,
}

impl RequestDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestDirection::Outgoing => "outgoing",
            RequestDirection::Incoming => "incoming",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "outgoing" => Some(Self::Outgoing),
            "incoming" => Some(Self::Incoming),
            _ => None,
        }
    }
}

/// How the remote side answered a friend request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestOutcome {
    Accepted,
    Rejected,
}

/// Where a username currently sits in a contact store. The three non-`Unknown`
/// states are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactState {
    Unknown,
    OutgoingPending,
    IncomingPending,
    Contact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_key_deterministic() {
        let a = DirectoryKey::for_username("alice");
        let b = DirectoryKey::for_username("alice");
        assert_eq!(a, b);
        assert_ne!(a, DirectoryKey::for_username("bob"));
        assert_eq!(a.to_hex().len(), 64);
    }

    #[test]
    fn test_presence_record_decode_garbage() {
        assert!(PresenceRecord::from_bytes(&[0xff, 0x01]).is_err());
    }

    #[test]
    fn test_group_dedups_members() {
        let alice = Person::new("alice", "10.0.0.1", 4001);
        let bob = Person::new("bob", "10.0.0.2", 4001);
        let group = Group::new("Team", vec![bob.clone(), alice.clone(), bob]);

        assert_eq!(group.len(), 2);
        assert_eq!(group.members()[0].username, "alice");
        assert!(group.contains("bob"));
        assert!(!group.contains("carol"));
    }

    #[test]
    fn test_person_endpoint_ipv6() {
        let p = Person::new("dave", "::1", 4001);
        assert_eq!(p.endpoint(), "[::1]:4001");
        let q = Person::new("erin", "192.168.1.10", 5001);
        assert_eq!(q.endpoint(), "192.168.1.10:5001");
    }

    #[test]
    fn test_contact_name() {
        let p = Contact::Person(Person::new("alice", "10.0.0.1", 4001));
        let g = Contact::Group(Group::new("Team", Vec::new()));
        assert_eq!(p.name(), "alice");
        assert_eq!(g.name(), "Team");
        assert!(g.as_person().is_none());
    }

    #[test]
    fn test_request_direction_parse() {
        assert_eq!(
            RequestDirection::parse(RequestDirection::Incoming.as_str()),
            Some(RequestDirection::Incoming)
        );
        assert_eq!(RequestDirection::parse("sideways"), None);
    }
}
