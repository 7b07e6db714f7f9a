/// Protocol version string for libp2p identify
pub const PROTOCOL_VERSION: &str = "/peerbook/1.0.0";

/// Application name
pub const APP_NAME: &str = "peerbook";

/// Default QUIC listen port
pub const DEFAULT_PORT: u16 = 4001;

/// How long `start()` waits for the bootstrap handshake before degrading
pub const DEFAULT_BOOTSTRAP_TIMEOUT_SECS: u64 = 10;

/// Upper bound on a single Kademlia put/get query
pub const KAD_QUERY_TIMEOUT_SECS: u64 = 30;

/// GossipSub heartbeat interval in seconds
pub const GOSSIPSUB_HEARTBEAT_SECS: u64 = 1;

/// Maximum size of a gossiped request envelope (64 KiB)
pub const MAX_MESSAGE_SIZE: usize = 65_536;

/// Maximum username length in bytes
pub const MAX_USERNAME_LEN: usize = 64;

/// Buffer size of the swarm command and notification channels
pub const CHANNEL_CAPACITY: usize = 256;

/// DNS over HTTPS servers
pub const DOH_CLOUDFLARE: &str = "1.1.1.1";
pub const DOH_GOOGLE: &str = "8.8.8.8";

/// Key derivation contexts (BLAKE3)
pub const KDF_CONTEXT_DIRECTORY_KEY: &str = "peerbook-directory-key-v1";
pub const KDF_CONTEXT_NODE_KEYPAIR: &str = "peerbook-libp2p-keypair-v1";
pub const KDF_CONTEXT_INBOX_TOPIC: &str = "peerbook-inbox-topic-v1";

/// Kademlia protocol name, keeps peerbook records apart from other DHTs
pub const KAD_PROTOCOL: &str = "/peerbook/kad/1.0.0";

/// GossipSub topic prefix of per-user friend-request inboxes
pub const INBOX_TOPIC_PREFIX: &str = "peerbook-inbox:";

/// Publish attempts per friend-request message while the recipient's inbox
/// subscription propagates
pub const DELIVERY_ATTEMPTS: u32 = 5;

/// Pause between publish attempts in milliseconds
pub const DELIVERY_RETRY_MS: u64 = 400;
