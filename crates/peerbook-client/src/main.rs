//! # peerbook
//!
//! A peerbook node: joins the DHT, publishes its presence under the
//! configured username and exchanges friend requests with other nodes.
//! Commands are read line by line from stdin (`help` lists them).

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use peerbook_client::console::{Command, Console, HELP};
use peerbook_client::{
    spawn_bridge, spawn_listener, ContactStore, DirectoryListener, FriendRequestProtocol,
    NodeConfig,
};
use peerbook_net::{BootstrapStatus, GossipCourier, PeerSession};
use peerbook_shared::{Person, RequestOutcome};
use peerbook_store::Database;

/// Prints contact-list changes to the terminal.
struct TerminalListener;

impl DirectoryListener for TerminalListener {
    fn on_incoming_friend_request(&self, person: &Person) {
        println!("friend request from {person} (accept {0} / reject {0})", person.username);
    }

    fn on_outgoing_request_resolved(&self, person: &Person, outcome: RequestOutcome) {
        match outcome {
            RequestOutcome::Accepted => println!("{person} accepted your request"),
            RequestOutcome::Rejected => println!("{person} rejected your request"),
        }
    }

    fn on_contact_list_updated(&self) {
        info!("Contact list updated");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,peerbook_net=debug,peerbook_client=debug")
            }),
        )
        .init();

    info!("Starting peerbook node v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = NodeConfig::from_env()?;
    info!(?config, "Loaded configuration");
    let user = config.user()?;

    // -----------------------------------------------------------------------
    // 3. Contact list
    // -----------------------------------------------------------------------
    let db = match &config.db_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new(user.username())?,
    };
    let contacts = Arc::new(ContactStore::open(db)?);

    // -----------------------------------------------------------------------
    // 4. Join the DHT and publish presence
    // -----------------------------------------------------------------------
    let session = Arc::new(PeerSession::new(user.clone(), config.session_config()));
    let report = session.start().await?;
    match &report.bootstrap {
        BootstrapStatus::NotConfigured => info!("No bootstrap peer, starting a new network"),
        BootstrapStatus::Joined(peer) => info!(peer = %peer, "Joined existing network"),
        BootstrapStatus::Degraded(reason) => {
            warn!(reason = %reason, "Running without peers until someone dials us")
        }
    }
    info!(
        peer_id = %report.peer_id,
        address = %report.record.address,
        port = report.record.port,
        "Presence published"
    );

    // -----------------------------------------------------------------------
    // 5. Friend requests
    // -----------------------------------------------------------------------
    let swarm = session
        .swarm()
        .ok_or_else(|| anyhow::anyhow!("Session stopped during startup"))?;
    let (courier, inbox) = GossipCourier::attach(swarm, user.username()).await?;
    let protocol = Arc::new(FriendRequestProtocol::new(
        session.clone(),
        Arc::new(courier),
        contacts.clone(),
    ));
    let bridge = spawn_bridge(protocol.clone(), inbox);
    let listener = spawn_listener(contacts.subscribe(), TerminalListener);

    // -----------------------------------------------------------------------
    // 6. Console until quit, EOF or Ctrl-C
    // -----------------------------------------------------------------------
    let console = Console {
        session: session.clone(),
        protocol,
        contacts,
    };
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match Command::parse(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => println!("{}", console.run(command).await),
                    Ok(None) => {}
                    Err(usage) => println!("{usage}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C");
                break;
            }
        }
    }

    info!("Shutting down");
    bridge.abort();
    listener.abort();
    session.shutdown().await;

    Ok(())
}
