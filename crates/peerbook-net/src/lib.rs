// P2P networking layer: Kademlia presence directory and request courier over QUIC.

pub mod behaviour;
pub mod courier;
pub mod dht;
pub mod directory;
pub mod discovery;
pub mod dns;
pub mod peers;
pub mod session;
pub mod swarm;
pub mod transport;

pub use behaviour::{PeerbookBehaviour, PeerbookEvent};
pub use courier::{inbox_topic, GossipCourier, LoopbackCourier, LoopbackHub, RequestCourier};
pub use dht::{Dht, MemoryDht};
pub use directory::{DirectoryClient, LocalDirectory, UserResolver};
pub use dns::build_doh_resolver;
pub use peers::{ConnectionInfo, PeerTracker};
pub use session::{BootstrapStatus, PeerSession, SessionConfig, SessionState, StartReport};
pub use swarm::{spawn_swarm, SwarmCommand, SwarmConfig, SwarmHandle, SwarmNotification};
pub use transport::{build_swarm, keypair_from_seed};
