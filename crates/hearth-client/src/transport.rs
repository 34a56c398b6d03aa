//! Pub/sub transport boundary and the in-process broker.
//!
//! The protocol only needs topic-based publish/subscribe with at-least-once
//! delivery. [`Transport`] is that contract; [`MemoryBroker`] implements it in
//! process for tests and the demo binary. A network broker client plugs in
//! behind the same trait.

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

/// One delivered payload: `(topic, bytes)`.
pub type Delivery = (String, Vec<u8>);

/// Transport errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Operation requires an established connection.
    #[error("not connected")]
    NotConnected,

    /// Connection was not established within the timeout.
    #[error("connection not established within {0:?}")]
    ConnectTimeout(Duration),

    /// No broker address was configured.
    #[error("no broker address configured")]
    NoAddresses,

    /// The broker went away.
    #[error("transport closed")]
    Closed,
}

/// Topic-based publish/subscribe with at-least-once delivery.
///
/// # Invariants
///
/// - Payloads published on a topic reach every subscriber of that topic,
///   possibly more than once
/// - Deliveries to one subscriber preserve publish order per publisher
/// - Exactly one consumer drains [`Transport::recv`]
pub trait Transport: Send {
    /// Connect to the first reachable address.
    ///
    /// # Errors
    ///
    /// - `TransportError::ConnectTimeout` if no connection within `timeout`
    /// - `TransportError::NoAddresses` if `addresses` is empty
    fn connect(
        &mut self,
        addresses: &[String],
        timeout: Duration,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Start receiving payloads published on `topic`.
    ///
    /// # Errors
    ///
    /// - `TransportError::NotConnected` before `connect` succeeded
    fn subscribe(
        &mut self,
        topic: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Stop receiving payloads published on `topic`.
    ///
    /// # Errors
    ///
    /// - `TransportError::NotConnected` before `connect` succeeded
    fn unsubscribe(
        &mut self,
        topic: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Publish `payload` on `topic`.
    ///
    /// # Errors
    ///
    /// - `TransportError::NotConnected` before `connect` succeeded
    fn send(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Next delivery. `None` once the transport is closed.
    fn recv(&mut self) -> impl Future<Output = Option<Delivery>> + Send;

    /// Next delivery if one is already queued.
    fn try_recv(&mut self) -> Option<Delivery>;

    /// Whether `connect` has succeeded.
    fn is_connected(&self) -> bool;
}

#[derive(Default)]
struct BrokerState {
    next_subscriber: u64,
    subscribers: HashMap<u64, Subscriber>,
    duplicate_delivery: bool,
}

struct Subscriber {
    topics: HashSet<String>,
    outbox: mpsc::UnboundedSender<Delivery>,
}

/// In-process pub/sub broker.
///
/// Cloning yields another handle to the same broker.
#[derive(Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    online: Arc<watch::Sender<bool>>,
}

impl MemoryBroker {
    /// Online broker delivering each payload once.
    pub fn new() -> Self {
        let (online, _) = watch::channel(true);
        Self { state: Arc::new(Mutex::new(BrokerState::default())), online: Arc::new(online) }
    }

    /// Deliver every payload twice, modelling at-least-once redelivery.
    pub fn set_duplicate_delivery(&self, enabled: bool) {
        self.lock().duplicate_delivery = enabled;
    }

    /// Take the broker offline or back online. While offline, `connect`
    /// waits; pending connects complete once it comes back.
    pub fn set_online(&self, online: bool) {
        self.online.send_replace(online);
    }

    /// New client endpoint on this broker.
    pub fn transport(&self) -> MemoryTransport {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let id = {
            let mut state = self.lock();
            let id = state.next_subscriber;
            state.next_subscriber += 1;
            state.subscribers.insert(id, Subscriber { topics: HashSet::new(), outbox });
            id
        };
        MemoryTransport { broker: self.clone(), id, inbox, connected: false }
    }

    fn publish(&self, topic: &str, payload: &[u8]) {
        let state = self.lock();
        let copies = if state.duplicate_delivery { 2 } else { 1 };
        let mut receivers = 0usize;

        for subscriber in state.subscribers.values() {
            if !subscriber.topics.contains(topic) {
                continue;
            }
            receivers += 1;
            for _ in 0..copies {
                // A dropped receiver is detached in `MemoryTransport::drop`.
                let _ = subscriber.outbox.send((topic.to_string(), payload.to_vec()));
            }
        }
        trace!(topic, receivers, bytes = payload.len(), "published");
    }

    fn update_topics(&self, id: u64, update: impl FnOnce(&mut HashSet<String>)) {
        if let Some(subscriber) = self.lock().subscribers.get_mut(&id) {
            update(&mut subscriber.topics);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// One client's endpoint on a [`MemoryBroker`].
pub struct MemoryTransport {
    broker: MemoryBroker,
    id: u64,
    inbox: mpsc::UnboundedReceiver<Delivery>,
    connected: bool,
}

impl MemoryTransport {
    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.connected {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

impl Transport for MemoryTransport {
    async fn connect(
        &mut self,
        addresses: &[String],
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let Some(address) = addresses.first() else {
            return Err(TransportError::NoAddresses);
        };

        let mut online = self.broker.online.subscribe();
        let came_online = async move { online.wait_for(|online| *online).await.map(|_| ()) };
        match tokio::time::timeout(timeout, came_online).await {
            Ok(Ok(())) => {
                debug!(%address, subscriber = self.id, "connected to memory broker");
                self.connected = true;
                Ok(())
            },
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::ConnectTimeout(timeout)),
        }
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.ensure_connected()?;
        self.broker.update_topics(self.id, |topics| {
            topics.insert(topic.to_string());
        });
        Ok(())
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.ensure_connected()?;
        self.broker.update_topics(self.id, |topics| {
            topics.remove(topic);
        });
        Ok(())
    }

    async fn send(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.ensure_connected()?;
        self.broker.publish(topic, &payload);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Delivery> {
        self.inbox.recv().await
    }

    fn try_recv(&mut self) -> Option<Delivery> {
        self.inbox.try_recv().ok()
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.broker.lock().subscribers.remove(&self.id);
    }
}
