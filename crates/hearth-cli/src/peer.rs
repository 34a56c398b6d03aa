//! One simulated participant: a runtime spawned on the broker plus the
//! handler and persistence it reports through.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};

use hearth_client::{
    AppHandler, ChatMessage, Client, ClientConfig, ClientError, ClientEvent, FilePersistence,
    IdentityPersistence, IdentityRecord, MemoryBroker, MemoryKeyStore, MemoryPersistence,
    MemoryTransport, MessageContent, PeerSummary, PersistenceError, Runtime, RuntimeConfig,
    RuntimeError,
};
use hearth_crypto::{DalekProvider, IdentityId, SystemEnv};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

/// Message counters shared between a running handler and the driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct Tally {
    pub decrypted: usize,
    pub locked: usize,
    pub failed: usize,
    pub alerts: usize,
}

/// Logs callbacks and counts outcomes.
pub struct LogHandler {
    name: String,
    tally: Arc<Mutex<Tally>>,
}

impl LogHandler {
    fn update(&self, f: impl FnOnce(&mut Tally)) {
        f(&mut self.tally.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

impl AppHandler for LogHandler {
    fn on_peer_list_updated(&mut self, peers: &[PeerSummary]) {
        for peer in peers {
            debug!(
                peer = %self.name,
                other = %peer.display_name,
                state = %peer.state,
                fingerprint = %peer.fingerprint,
                "peer"
            );
        }
    }

    fn on_message(&mut self, message: &ChatMessage) {
        if message.mine {
            return;
        }
        match &message.content {
            MessageContent::Text(text) => {
                info!(peer = %self.name, room = %message.room, from = %message.from_name, %text);
                self.update(|t| t.decrypted += 1);
            },
            MessageContent::Locked => {
                info!(peer = %self.name, from = %message.from_name, "[locked message]");
                self.update(|t| t.locked += 1);
            },
            MessageContent::DecryptionFailed => {
                warn!(peer = %self.name, from = %message.from_name, "[decryption failed]");
                self.update(|t| t.failed += 1);
            },
        }
    }

    fn on_alert(&mut self, message: &str) {
        warn!(peer = %self.name, alert = message);
        self.update(|t| t.alerts += 1);
    }
}

/// Identity storage for a demo peer: in memory, or a CBOR file per peer.
pub enum DemoPersistence {
    Memory(MemoryPersistence),
    File(FilePersistence),
}

impl DemoPersistence {
    pub fn new(dir: Option<&PathBuf>, name: &str) -> Self {
        match dir {
            Some(dir) => Self::File(FilePersistence::new(dir.join(format!("{name}.cbor")))),
            None => Self::Memory(MemoryPersistence::new()),
        }
    }
}

impl IdentityPersistence for DemoPersistence {
    fn load(&self) -> Result<Option<IdentityRecord>, PersistenceError> {
        match self {
            Self::Memory(inner) => inner.load(),
            Self::File(inner) => inner.load(),
        }
    }

    fn save(&mut self, record: &IdentityRecord) -> Result<(), PersistenceError> {
        match self {
            Self::Memory(inner) => inner.save(record),
            Self::File(inner) => inner.save(record),
        }
    }

    fn clear(&mut self) -> Result<(), PersistenceError> {
        match self {
            Self::Memory(inner) => inner.clear(),
            Self::File(inner) => inner.clear(),
        }
    }
}

type DemoRuntime = Runtime<
    SystemEnv,
    DalekProvider<SystemEnv>,
    MemoryKeyStore<DalekProvider<SystemEnv>>,
    MemoryTransport,
    DemoPersistence,
    LogHandler,
>;

/// Handle to a spawned peer.
pub struct Peer {
    pub name: String,
    pub id: IdentityId,
    commands: mpsc::Sender<ClientEvent>,
    task: JoinHandle<Result<DemoRuntime, RuntimeError>>,
    tally: Arc<Mutex<Tally>>,
}

impl Peer {
    /// Start a runtime, restore or register its identity, and spawn its loop.
    pub async fn spawn(
        name: &str,
        broker: &MemoryBroker,
        client_config: ClientConfig,
        runtime_config: RuntimeConfig,
        persistence: DemoPersistence,
    ) -> Result<Self, RuntimeError> {
        let env = SystemEnv::new();
        let crypto = DalekProvider::new(env);
        let store = MemoryKeyStore::with_config(crypto.clone(), &client_config);
        let client = Client::new(env, crypto, store, client_config);

        let tally = Arc::new(Mutex::new(Tally::default()));
        let handler = LogHandler { name: name.to_string(), tally: Arc::clone(&tally) };
        let mut runtime =
            Runtime::new(client, broker.transport(), persistence, handler, runtime_config);
        runtime.start(name).await?;

        let id = runtime.client().id().ok_or(ClientError::NoIdentity)?;
        let (commands, rx) = mpsc::channel(64);
        let task = tokio::spawn(runtime.run(rx));

        Ok(Self { name: name.to_string(), id, commands, task, tally })
    }

    /// Queue a command. A stopped runtime is logged, not fatal.
    pub async fn command(&self, event: ClientEvent) {
        if self.commands.send(event).await.is_err() {
            warn!(peer = %self.name, "runtime stopped; command dropped");
        }
    }

    /// Close the command channel and wait for the runtime to exit.
    pub async fn shutdown(self) -> Result<Tally, Box<dyn std::error::Error>> {
        drop(self.commands);
        let runtime = self.task.await??;
        info!(peer = %self.name, rooms = runtime.client().rooms().len(), "runtime stopped");
        let tally = *self.tally.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(tally)
    }
}
