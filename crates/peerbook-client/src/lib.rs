//! Contact list and friend-request protocol of a peerbook node, on top of the
//! presence directory in `peerbook-net`.

pub mod bridge;
pub mod config;
pub mod console;
pub mod contacts;
pub mod error;
pub mod events;
pub mod friends;

pub use bridge::spawn_bridge;
pub use config::NodeConfig;
pub use contacts::{ContactStore, IncomingDisposition};
pub use error::{ConfigError, ContactError, FriendRequestError};
pub use events::{spawn_listener, ContactEvent, DirectoryListener};
pub use friends::FriendRequestProtocol;
