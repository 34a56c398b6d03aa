//! Hearth demo binary.
//!
//! Runs several simulated peers in one process over the in-memory broker.
//! Each peer announces itself, completes pairwise handshakes, optionally
//! verifies the others, and broadcasts a few messages. Everything is
//! reported through `tracing`.
//!
//! # Usage
//!
//! ```bash
//! # Three peers, everyone verifies everyone
//! hearth --peers 3
//!
//! # Only the first peer verifies; the others see its messages, it sees locks
//! hearth --peers 2 --verify first --log-level debug
//!
//! # Keep identities across runs
//! hearth --identity-dir ./identities
//! ```

mod peer;

use std::{path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};
use hearth_client::{ClientConfig, ClientEvent, MemoryBroker, RoomId, RuntimeConfig, TrustStatus};
use peer::{DemoPersistence, Peer};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const NAMES: [&str; 6] = ["alice", "bob", "carol", "dave", "erin", "frank"];

/// Who verifies whom after discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Verify {
    /// Every peer verifies every other peer.
    All,
    /// Only the first peer verifies the others.
    First,
    /// Nobody verifies; every message stays locked.
    Nobody,
}

/// Hearth end-to-end encrypted room demo
#[derive(Parser, Debug)]
#[command(name = "hearth")]
#[command(about = "Simulated Hearth peers over an in-process broker")]
#[command(version)]
struct Args {
    /// Number of simulated peers
    #[arg(short, long, default_value = "3")]
    peers: usize,

    /// Room to join
    #[arg(short, long, default_value = "lobby")]
    room: String,

    /// Messages each peer sends
    #[arg(short, long, default_value = "2")]
    messages: usize,

    /// Trust decisions taken after discovery
    #[arg(long, value_enum, default_value = "all")]
    verify: Verify,

    /// Rotate the first peer's room key before the last round
    #[arg(long)]
    rotate: bool,

    /// Broker redelivers every payload
    #[arg(long)]
    duplicate_delivery: bool,

    /// Directory for per-peer identity files
    #[arg(long)]
    identity_dir: Option<PathBuf>,

    /// Broker address
    #[arg(long, default_value = "memory://local")]
    broker: String,

    /// Connection timeout in seconds
    #[arg(long, default_value = "5")]
    connect_timeout_secs: u64,

    /// Housekeeping tick in milliseconds
    #[arg(long, default_value = "1000")]
    tick_ms: u64,

    /// Pending handshake lifetime in seconds
    #[arg(long, default_value = "60")]
    handshake_timeout_secs: u64,

    /// Clock skew in seconds before a packet is logged as stale
    #[arg(long, default_value = "30")]
    staleness_secs: u64,

    /// Keys kept per history
    #[arg(long, default_value = "16")]
    key_history: usize,

    /// Forget every peer when leaving a room
    #[arg(long)]
    clear_peers_on_leave: bool,

    /// Pause between demo phases in milliseconds
    #[arg(long, default_value = "200")]
    settle_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            staleness_window: Duration::from_secs(self.staleness_secs),
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
            key_history_limit: self.key_history,
            clear_all_peers_on_leave: self.clear_peers_on_leave,
            ..ClientConfig::default()
        }
    }

    fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            addresses: vec![self.broker.clone()],
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            tick_interval: Duration::from_millis(self.tick_ms),
        }
    }
}

fn peer_name(index: usize) -> String {
    NAMES.get(index).map_or_else(|| format!("peer-{index}"), |name| (*name).to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let room = RoomId::new(args.room.clone())?;
    let settle = Duration::from_millis(args.settle_ms);
    info!(peers = args.peers, %room, verify = ?args.verify, "hearth demo starting");

    let broker = MemoryBroker::new();
    broker.set_duplicate_delivery(args.duplicate_delivery);

    let mut peers = Vec::with_capacity(args.peers);
    for index in 0..args.peers {
        let name = peer_name(index);
        let persistence = DemoPersistence::new(args.identity_dir.as_ref(), &name);
        let peer = Peer::spawn(
            &name,
            &broker,
            args.client_config(),
            args.runtime_config(),
            persistence,
        )
        .await?;
        peer.command(ClientEvent::Join { room: room.clone() }).await;
        peers.push(peer);
    }
    tokio::time::sleep(settle).await;

    let verifiers = match args.verify {
        Verify::All => peers.len(),
        Verify::First => peers.len().min(1),
        Verify::Nobody => 0,
    };
    for peer in &peers[..verifiers] {
        for other in peers.iter().filter(|other| other.id != peer.id) {
            info!(peer = %peer.name, other = %other.name, "verifying");
            let status = TrustStatus::Verified;
            peer.command(ClientEvent::MarkPeerTrust { peer: other.id, status }).await;
        }
    }
    tokio::time::sleep(settle).await;

    for round in 0..args.messages {
        if args.rotate && round + 1 == args.messages {
            if let Some(first) = peers.first() {
                info!(peer = %first.name, "rotating room key");
                first.command(ClientEvent::RotateRoomKey { room: room.clone() }).await;
                tokio::time::sleep(settle).await;
            }
        }
        for peer in &peers {
            let text = format!("message {round} from {}", peer.name);
            peer.command(ClientEvent::SendText { room: room.clone(), text }).await;
        }
        tokio::time::sleep(settle).await;
    }

    for peer in peers {
        let name = peer.name.clone();
        let tally = peer.shutdown().await?;
        info!(
            peer = %name,
            decrypted = tally.decrypted,
            locked = tally.locked,
            failed = tally.failed,
            alerts = tally.alerts,
            "summary"
        );
    }

    Ok(())
}
