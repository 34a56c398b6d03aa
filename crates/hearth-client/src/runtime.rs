//! Generic runtime for client orchestration.
//!
//! The Runtime drives the event loop, coordinating between:
//! - [`Client`]: protocol state machine
//! - [`Transport`]: pub/sub I/O
//! - [`IdentityPersistence`]: identity storage
//! - [`AppHandler`]: application callbacks
//!
//! Inbound deliveries are handled strictly one at a time; the client is only
//! ever borrowed mutably from the loop. Inside [`Runtime::run`] a failing
//! command, delivery or tick is reported through [`AppHandler::on_alert`];
//! only a closed transport ends the loop.

use std::time::Duration;

use hearth_crypto::{CryptoProvider, Environment};
use hearth_proto::RoomId;
use thiserror::Error;
use tokio::{sync::mpsc, time::MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    client::Client,
    error::ClientError,
    event::{ChatMessage, ClientAction, ClientEvent, PeerSummary},
    persistence::{IdentityPersistence, PersistenceError},
    store::KeyStore,
    transport::{Transport, TransportError},
};

/// Application callbacks.
pub trait AppHandler: Send {
    /// The peer list changed.
    fn on_peer_list_updated(&mut self, peers: &[PeerSummary]);

    /// A message is ready for display.
    fn on_message(&mut self, message: &ChatMessage);

    /// Something needs the user's attention.
    fn on_alert(&mut self, message: &str);
}

/// Runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Broker addresses, tried in order.
    pub addresses: Vec<String>,
    /// Maximum wait for the transport connection.
    pub connect_timeout: Duration,
    /// Period of [`ClientEvent::Tick`].
    pub tick_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            addresses: vec!["memory://local".to_string()],
            connect_timeout: Duration::from_secs(10),
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// Runtime errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Transport failure.
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// Persistence failure.
    #[error("persistence: {0}")]
    Persistence(#[from] PersistenceError),

    /// Caller operation rejected by the client.
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Generic runtime that wires a [`Client`] to its collaborators.
///
/// # Type Parameters
///
/// - `E`, `C`, `S`: client environment, crypto provider and key store
/// - `T`: pub/sub transport
/// - `P`: identity persistence
/// - `H`: application callbacks
pub struct Runtime<E, C, S, T, P, H>
where
    E: Environment,
    C: CryptoProvider,
    S: KeyStore,
{
    client: Client<E, C, S>,
    transport: T,
    persistence: P,
    handler: H,
    config: RuntimeConfig,
}

impl<E, C, S, T, P, H> Runtime<E, C, S, T, P, H>
where
    E: Environment,
    C: CryptoProvider,
    S: KeyStore + Send,
    T: Transport,
    P: IdentityPersistence,
    H: AppHandler,
{
    /// Create a runtime. Nothing happens until [`Runtime::start`].
    pub fn new(
        client: Client<E, C, S>,
        transport: T,
        persistence: P,
        handler: H,
        config: RuntimeConfig,
    ) -> Self {
        Self { client, transport, persistence, handler, config }
    }

    /// Connect the transport and restore or create the identity.
    ///
    /// A persisted identity takes precedence over `display_name`.
    ///
    /// # Errors
    ///
    /// - `RuntimeError::Transport` if the connection cannot be established
    /// - `RuntimeError::Persistence` if the stored identity is unreadable
    pub async fn start(&mut self, display_name: &str) -> Result<(), RuntimeError> {
        self.transport.connect(&self.config.addresses, self.config.connect_timeout).await?;

        let event = match self.persistence.load()? {
            Some(record) => ClientEvent::LoadIdentity(record),
            None => ClientEvent::Register { display_name: display_name.to_string() },
        };
        self.dispatch(event).await?;

        if let Some(identity) = self.client.identity() {
            info!(
                id = %identity.id().short(),
                name = identity.display_name(),
                fingerprint = %identity.fingerprint(),
                "runtime started"
            );
        }
        Ok(())
    }

    /// Feed one event to the client and execute the resulting actions.
    ///
    /// A join whose subscriptions or announcement fail is rolled back, so the
    /// client never counts itself a member of a room it is not listening to.
    ///
    /// # Errors
    ///
    /// - `RuntimeError::Client` if the client rejects the event
    /// - `RuntimeError::Transport` / `RuntimeError::Persistence` if executing
    ///   an action fails
    pub async fn dispatch(&mut self, event: ClientEvent) -> Result<(), RuntimeError> {
        let joining = match &event {
            ClientEvent::Join { room } => Some(room.clone()),
            _ => None,
        };

        let actions = self.client.handle(event)?;
        let result = self.execute(actions).await;
        if let (Err(err), Some(room)) = (&result, joining) {
            warn!(%room, %err, "join failed, rolling back");
            self.rollback_join(room).await;
        }
        result
    }

    /// Process every delivery already queued on the transport, without
    /// waiting. Returns how many were processed.
    ///
    /// # Errors
    ///
    /// - `RuntimeError::Transport` / `RuntimeError::Persistence` if executing
    ///   an action fails
    pub async fn pump(&mut self) -> Result<usize, RuntimeError> {
        let mut processed = 0;
        while let Some((topic, payload)) = self.transport.try_recv() {
            self.dispatch(ClientEvent::Delivery { topic, payload }).await?;
            processed += 1;
        }
        Ok(processed)
    }

    /// Run the event loop until `commands` closes, then hand the runtime back.
    ///
    /// Caller commands, transport deliveries and ticks are processed one at a
    /// time. Any of them failing, whether rejected by the client or by the
    /// transport or persistence while carrying it out, is reported through
    /// [`AppHandler::on_alert`] and the loop continues.
    ///
    /// # Errors
    ///
    /// - `RuntimeError::Transport` if the transport closes
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<ClientEvent>,
    ) -> Result<Self, RuntimeError> {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(event) = command else { break };
                    if let Err(err) = self.dispatch(event).await {
                        self.report("command failed", &err);
                    }
                },
                delivery = self.transport.recv() => {
                    let Some((topic, payload)) = delivery else {
                        return Err(TransportError::Closed.into());
                    };
                    let event = ClientEvent::Delivery { topic, payload };
                    if let Err(err) = self.dispatch(event).await {
                        self.report("delivery handling failed", &err);
                    }
                },
                _ = ticker.tick() => {
                    if let Err(err) = self.dispatch(ClientEvent::Tick).await {
                        self.report("tick failed", &err);
                    }
                },
            }
        }

        debug!("command channel closed, runtime stopping");
        Ok(self)
    }

    /// The protocol client.
    pub fn client(&self) -> &Client<E, C, S> {
        &self.client
    }

    /// The application handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn report(&mut self, context: &str, err: &RuntimeError) {
        warn!(%err, "{context}");
        self.handler.on_alert(&err.to_string());
    }

    /// Undo a join whose actions did not all go through. Unsubscribing is
    /// best effort since the transport is already failing.
    async fn rollback_join(&mut self, room: RoomId) {
        let actions = match self.client.handle(ClientEvent::Leave { room }) {
            Ok(actions) => actions,
            Err(err) => {
                debug!(%err, "nothing to roll back");
                return;
            },
        };
        for action in actions {
            match action {
                ClientAction::Unsubscribe(topic) => {
                    if let Err(err) = self.transport.unsubscribe(&topic.to_string()).await {
                        debug!(%topic, %err, "rollback unsubscribe failed");
                    }
                },
                ClientAction::PeersUpdated(peers) => self.handler.on_peer_list_updated(&peers),
                other => debug!(?other, "ignoring rollback action"),
            }
        }
    }

    async fn execute(&mut self, actions: Vec<ClientAction>) -> Result<(), RuntimeError> {
        for action in actions {
            match action {
                ClientAction::Subscribe(topic) => {
                    self.transport.subscribe(&topic.to_string()).await?;
                },
                ClientAction::Unsubscribe(topic) => {
                    self.transport.unsubscribe(&topic.to_string()).await?;
                },
                ClientAction::Publish { topic, payload } => {
                    self.transport.send(&topic.to_string(), payload).await?;
                },
                ClientAction::PeersUpdated(peers) => self.handler.on_peer_list_updated(&peers),
                ClientAction::DeliverMessage(message) => self.handler.on_message(&message),
                ClientAction::Alert { message } => self.handler.on_alert(&message),
                ClientAction::PersistIdentity(record) => self.persistence.save(&record)?,
                ClientAction::ClearIdentity => self.persistence.clear()?,
            }
        }
        Ok(())
    }
}
