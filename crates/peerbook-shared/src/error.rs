use thiserror::Error;

/// Failures of the presence directory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The DHT could not be reached or the query failed in transport.
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    /// Nothing is published under the username. A normal, retryable outcome.
    #[error("No presence record for {0}")]
    NotFound(String),

    /// A record exists but does not decode, or belongs to another username.
    #[error("Malformed presence record for {username}: {reason}")]
    InvalidRecord { username: String, reason: String },
}

/// Failures of the local peer session lifecycle.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Binding the listen port failed. The node cannot operate.
    #[error("Port {port} unavailable: {reason}")]
    PortUnavailable { port: u16, reason: String },

    #[error("Session not started")]
    NotStarted,

    #[error("Session already started")]
    AlreadyStarted,

    /// The swarm task is gone or could not be built.
    #[error("Swarm error: {0}")]
    Swarm(String),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Username must not be empty")]
    EmptyUsername,

    #[error("Username exceeds {max} bytes")]
    UsernameTooLong { max: usize },

    #[error("Username must not contain whitespace or control characters")]
    InvalidUsername,

    #[error("Invalid bootstrap peer '{0}', expected host:port")]
    InvalidBootstrap(String),
}

/// Failures of handing a friend-request message to the recipient's node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The recipient's node could not be reached.
    #[error("{username} unreachable: {reason}")]
    Unreachable { username: String, reason: String },

    /// Reached the network but the message was not accepted for delivery.
    #[error("Delivery transport error: {0}")]
    Transport(String),

    #[error("Message encoding failed: {0}")]
    Encoding(String),
}
