use thiserror::Error;

use peerbook_shared::{DeliveryError, DirectoryError, IdentityError, SessionError};
use peerbook_store::StoreError;

/// Rejected contact-list transitions. A failed transition leaves the contact
/// list unchanged.
#[derive(Error, Debug)]
pub enum ContactError {
    /// confirm/reject/resolve on someone absent from the expected pending set.
    #[error("No pending request for {0}")]
    NotPending(String),

    /// Group creation naming someone who is not a confirmed contact.
    #[error("{0} is not a contact")]
    UnknownMember(String),

    /// The person is already pending in some direction or already a contact.
    #[error("{0} is already known")]
    AlreadyKnown(String),

    #[error("A contact named {0} already exists")]
    DuplicateName(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Failures of the friend-request operations.
#[derive(Error, Debug)]
pub enum FriendRequestError {
    /// The target username has no presence record.
    #[error("User {0} not found in the directory")]
    UserNotFound(String),

    #[error(transparent)]
    Directory(DirectoryError),

    #[error(transparent)]
    Session(SessionError),

    #[error(transparent)]
    Contact(#[from] ContactError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("Cannot send a friend request to yourself")]
    SelfRequest,

    /// The local presence is not published yet, so nobody could answer.
    #[error("Local presence not published")]
    NotPublished,
}

impl From<SessionError> for FriendRequestError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Directory(DirectoryError::NotFound(username)) => {
                Self::UserNotFound(username)
            }
            SessionError::Directory(other) => Self::Directory(other),
            other => Self::Session(other),
        }
    }
}

/// Startup configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("PEERBOOK_USERNAME is not set")]
    MissingUsername,

    #[error("Invalid identity: {0}")]
    Identity(#[from] IdentityError),
}

pub type ContactResult<T> = std::result::Result<T, ContactError>;
pub type Result<T> = std::result::Result<T, FriendRequestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_becomes_user_not_found() {
        let err = FriendRequestError::from(SessionError::Directory(DirectoryError::NotFound(
            "bob".to_string(),
        )));
        assert!(matches!(err, FriendRequestError::UserNotFound(ref u) if u == "bob"));

        let err = FriendRequestError::from(SessionError::Directory(DirectoryError::Unavailable(
            "down".to_string(),
        )));
        assert!(matches!(
            err,
            FriendRequestError::Directory(DirectoryError::Unavailable(_))
        ));

        let err = FriendRequestError::from(SessionError::NotStarted);
        assert!(matches!(err, FriendRequestError::Session(SessionError::NotStarted)));
    }
}
