//! Hearth Client
//!
//! Action-based client state machine for the Hearth protocol. Owns the local
//! identity, the trust-on-first-use peer directory, pairwise handshakes and
//! per-room broadcast keys.
//!
//! # Architecture
//!
//! The client is Sans-IO. It receives events ([`ClientEvent`]), processes them
//! through pure state machine logic, and returns actions ([`ClientAction`]) for
//! the caller to execute. Time and randomness come from an [`Environment`], so
//! a seeded environment replays a session exactly.
//!
//! ```text
//! ClientEvent ──► Client::handle ──► Vec<ClientAction>
//!                     │
//!                     ▼
//!                 KeyStore (identity, peers, secrets, room keys)
//! ```
//!
//! # Components
//!
//! - [`Client`]: Top-level state machine
//! - [`KeyStore`] / [`MemoryKeyStore`]: identity, peer and key state
//! - [`KeyHistory`]: time-ordered key records with point-in-time lookup
//! - [`DedupCache`]: bounded message-id replay filter
//! - [`Runtime`]: drives a client over a [`Transport`] and an
//!   [`IdentityPersistence`] backend
//! - [`MemoryBroker`]: in-process pub/sub for tests and demos

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod config;
mod dedup;
mod error;
mod event;
mod history;
pub mod persistence;
pub mod runtime;
mod store;
pub mod transport;

pub use client::Client;
pub use config::ClientConfig;
pub use dedup::DedupCache;
pub use error::{ClientError, StoreError};
pub use event::{ChatMessage, ClientAction, ClientEvent, MessageContent, PeerState, PeerSummary};
pub use hearth_crypto::Environment;
pub use hearth_proto::{RoomId, Topic};
pub use history::{KeyHistory, KeyRecord};
pub use persistence::{FilePersistence, IdentityPersistence, MemoryPersistence, PersistenceError};
pub use runtime::{AppHandler, Runtime, RuntimeConfig, RuntimeError};
pub use store::{IdentityRecord, KeyStore, LocalIdentity, MemoryKeyStore, Peer, TrustStatus};
pub use transport::{MemoryBroker, MemoryTransport, Transport, TransportError};
