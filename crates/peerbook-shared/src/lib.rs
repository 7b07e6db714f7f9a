//! Types shared by every peerbook crate: directory records, people, groups,
//! the local user identity, wire messages and the error taxonomy.

pub mod constants;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod types;

pub use error::{DeliveryError, DirectoryError, IdentityError, SessionError};
pub use identity::{BootstrapPeer, User};
pub use protocol::{RequestKind, RequestMessage};
pub use types::{
    Contact, ContactState, DirectoryKey, Group, NodeId, Person, PresenceRecord, RequestDirection,
    RequestOutcome,
};
