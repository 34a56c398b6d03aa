//! Key and trust store.
//!
//! Owns the local identity, the pinned identity keys of every peer seen so
//! far, their trust status and all pairwise and room key material. The
//! protocol client only talks to it through [`KeyStore`] so tests can swap in
//! a fake.
//!
//! # Trust On First Use
//!
//! The first valid presence for an identity id pins its public key. A later
//! presence with a different key for the same id is rejected with
//! [`StoreError::IdentityKeyMismatch`] and the stored peer is left untouched.
//! Trust status only ever changes through [`KeyStore::set_trust`], and only
//! to `verified` or `blocked`.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
};

use hearth_crypto::{
    CryptoProvider, Fingerprint, IdentityId, IdentityKeyPair, IdentityPublicKey, SymmetricKey,
};
use hearth_proto::RoomId;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    config::ClientConfig,
    error::StoreError,
    history::{KeyHistory, KeyRecord},
};

/// Caller-assigned trust in a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustStatus {
    /// Seen but not verified out of band.
    #[default]
    New,
    /// Fingerprint confirmed out of band; our room keys are shared with it.
    Verified,
    /// Ignored except for presence.
    Blocked,
}

impl fmt::Display for TrustStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::New => "new",
            Self::Verified => "verified",
            Self::Blocked => "blocked",
        })
    }
}

/// The local participant.
#[derive(Debug)]
pub struct LocalIdentity {
    id: IdentityId,
    key_pair: IdentityKeyPair,
    display_name: String,
    fingerprint: Fingerprint,
}

impl LocalIdentity {
    /// Identity id.
    pub fn id(&self) -> IdentityId {
        self.id
    }

    /// Signing key pair.
    pub fn key_pair(&self) -> &IdentityKeyPair {
        &self.key_pair
    }

    /// Display name announced in presence packets.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Fingerprint of the identity id.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

/// Opaque persisted form of a [`LocalIdentity`].
///
/// # Security
///
/// Contains the signing secret. Zeroized on drop and redacted from `Debug`;
/// the persistence backend is responsible for protecting it at rest.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct IdentityRecord {
    /// Identity id.
    #[zeroize(skip)]
    pub id: IdentityId,
    /// Display name.
    #[zeroize(skip)]
    pub display_name: String,
    /// Fingerprint of the identity id.
    #[zeroize(skip)]
    pub fingerprint: Fingerprint,
    /// Exported signing secret.
    pub signing_key: Vec<u8>,
}

impl fmt::Debug for IdentityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityRecord")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("fingerprint", &self.fingerprint)
            .field("signing_key", &"[REDACTED]")
            .finish()
    }
}

/// Everything known about a remote participant.
///
/// # Invariants
///
/// - `public_key` never changes after creation
/// - Exactly one shared-secret history and one room-key map per peer
#[derive(Debug, Clone)]
pub struct Peer {
    id: IdentityId,
    public_key: IdentityPublicKey,
    display_name: String,
    fingerprint: Fingerprint,
    trust: TrustStatus,
    shared_secrets: KeyHistory<SymmetricKey>,
    room_keys: HashMap<RoomId, KeyHistory<SymmetricKey>>,
    rooms: BTreeSet<RoomId>,
    /// Rooms whose current own key we sent to this peer.
    sent_keys: BTreeSet<RoomId>,
}

impl Peer {
    fn new(
        id: IdentityId,
        public_key: IdentityPublicKey,
        display_name: String,
        fingerprint: Fingerprint,
        history_limit: usize,
    ) -> Self {
        Self {
            id,
            public_key,
            display_name,
            fingerprint,
            trust: TrustStatus::New,
            shared_secrets: KeyHistory::new(history_limit),
            room_keys: HashMap::new(),
            rooms: BTreeSet::new(),
            sent_keys: BTreeSet::new(),
        }
    }

    /// Identity id.
    pub fn id(&self) -> IdentityId {
        self.id
    }

    /// Pinned identity public key.
    pub fn public_key(&self) -> &IdentityPublicKey {
        &self.public_key
    }

    /// Last announced display name.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Fingerprint of the identity id.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Caller-assigned trust.
    pub fn trust(&self) -> TrustStatus {
        self.trust
    }

    /// Rooms the peer has been seen in.
    pub fn rooms(&self) -> &BTreeSet<RoomId> {
        &self.rooms
    }

    /// Whether a pairwise secret has been established.
    pub fn has_shared_secret(&self) -> bool {
        !self.shared_secrets.is_empty()
    }

    /// Whether the peer has shared its key for `room`.
    pub fn has_room_key(&self, room: &RoomId) -> bool {
        self.room_keys.get(room).is_some_and(|history| !history.is_empty())
    }

    /// Whether we sent the peer our key for `room`.
    pub fn has_our_key(&self, room: &RoomId) -> bool {
        self.sent_keys.contains(room)
    }
}

/// Storage of identity, trust and keys used by the protocol client.
///
/// All times are Unix epoch milliseconds.
pub trait KeyStore {
    /// Generate and install a fresh local identity.
    fn init_identity(&mut self, display_name: &str) -> &LocalIdentity;

    /// Install a previously exported identity.
    ///
    /// # Errors
    ///
    /// - `StoreError::Crypto` if the signing key cannot be imported
    fn load_identity(&mut self, record: &IdentityRecord) -> Result<&LocalIdentity, StoreError>;

    /// The local identity, if any.
    fn identity(&self) -> Option<&LocalIdentity>;

    /// Export the local identity for persistence.
    ///
    /// # Errors
    ///
    /// - `StoreError::NoIdentity` if none is installed
    fn export_identity(&self) -> Result<IdentityRecord, StoreError>;

    /// Wipe identity, peers and all key material.
    fn clear(&mut self);

    /// Our current broadcast key for `room`, created on first use.
    fn room_key(&mut self, room: &RoomId, now: u64) -> KeyRecord<SymmetricKey>;

    /// Install and return a fresh broadcast key for `room`.
    ///
    /// The returned `valid_from` may lie past `now` when an older key already
    /// claims that millisecond. Redistributing the key is the caller's job.
    fn rotate_room_key(&mut self, room: &RoomId, now: u64) -> KeyRecord<SymmetricKey>;

    /// Create the peer on first sight, or check the pinned key.
    ///
    /// # Errors
    ///
    /// - `StoreError::IdentityKeyMismatch` if `public_key` differs from the
    ///   pinned key; the peer is left untouched
    fn ensure_peer(
        &mut self,
        id: IdentityId,
        public_key: &IdentityPublicKey,
        display_name: Option<&str>,
    ) -> Result<&Peer, StoreError>;

    /// Peer by id.
    fn peer(&self, id: IdentityId) -> Option<&Peer>;

    /// All known peers, ordered by id.
    fn peers(&self) -> Vec<&Peer>;

    /// Set trust status to `Verified` or `Blocked`.
    ///
    /// # Errors
    ///
    /// - `StoreError::InvalidTrustTransition` for `TrustStatus::New`
    /// - `StoreError::UnknownPeer` if `id` is not known
    fn set_trust(&mut self, id: IdentityId, status: TrustStatus) -> Result<(), StoreError>;

    /// Append a newly established pairwise secret.
    ///
    /// # Errors
    ///
    /// - `StoreError::UnknownPeer` if `id` is not known
    fn append_shared_secret(
        &mut self,
        id: IdentityId,
        secret: SymmetricKey,
        established_at: u64,
    ) -> Result<(), StoreError>;

    /// Newest pairwise secret, or the one valid at `at`.
    fn shared_secret(&self, id: IdentityId, at: Option<u64>) -> Option<&SymmetricKey>;

    /// Every retained pairwise secret, newest first.
    fn shared_secrets(&self, id: IdentityId) -> Vec<&SymmetricKey>;

    /// Record a peer's room key valid from `valid_from`.
    ///
    /// # Errors
    ///
    /// - `StoreError::UnknownPeer` if `peer` is not known
    fn save_room_key(
        &mut self,
        peer: IdentityId,
        room: &RoomId,
        key: SymmetricKey,
        valid_from: u64,
    ) -> Result<(), StoreError>;

    /// Peer's room key valid at `at`.
    fn room_key_for(&self, peer: IdentityId, room: &RoomId, at: u64) -> Option<&SymmetricKey>;

    /// Record that our current key for `room` was sent to `peer`.
    ///
    /// # Errors
    ///
    /// - `StoreError::UnknownPeer` if `peer` is not known
    fn note_key_sent(&mut self, peer: IdentityId, room: &RoomId) -> Result<(), StoreError>;

    /// Record that `peer` was seen in `room`.
    ///
    /// # Errors
    ///
    /// - `StoreError::UnknownPeer` if `peer` is not known
    fn note_peer_in_room(&mut self, peer: IdentityId, room: &RoomId) -> Result<(), StoreError>;

    /// Drop `room` from every peer and our own keys. Peers left in no room
    /// are removed.
    fn forget_room(&mut self, room: &RoomId);

    /// Remove every peer, keeping the identity and own room keys.
    fn clear_peers(&mut self);
}

/// In-memory [`KeyStore`] backed by a [`CryptoProvider`].
pub struct MemoryKeyStore<C: CryptoProvider> {
    crypto: C,
    identity: Option<LocalIdentity>,
    peers: HashMap<IdentityId, Peer>,
    own_room_keys: HashMap<RoomId, KeyHistory<SymmetricKey>>,
    history_limit: usize,
    fallback_to_oldest: bool,
}

impl<C: CryptoProvider> MemoryKeyStore<C> {
    /// Store with default history settings.
    pub fn new(crypto: C) -> Self {
        Self::with_config(crypto, &ClientConfig::default())
    }

    /// Store using the history settings from `config`.
    pub fn with_config(crypto: C, config: &ClientConfig) -> Self {
        Self {
            crypto,
            identity: None,
            peers: HashMap::new(),
            own_room_keys: HashMap::new(),
            history_limit: config.key_history_limit,
            fallback_to_oldest: config.fallback_to_oldest_key,
        }
    }

    fn peer_mut(&mut self, id: IdentityId) -> Result<&mut Peer, StoreError> {
        self.peers.get_mut(&id).ok_or(StoreError::UnknownPeer(id))
    }

    fn install_identity(
        &mut self,
        key_pair: IdentityKeyPair,
        display_name: &str,
    ) -> &LocalIdentity {
        let id = self.crypto.identity_id(key_pair.public_key());
        let fingerprint = self.crypto.fingerprint(id.as_bytes());
        self.identity.insert(LocalIdentity {
            id,
            key_pair,
            display_name: display_name.to_string(),
            fingerprint,
        })
    }
}

impl<C: CryptoProvider> KeyStore for MemoryKeyStore<C> {
    fn init_identity(&mut self, display_name: &str) -> &LocalIdentity {
        let key_pair = self.crypto.generate_identity_key_pair();
        self.install_identity(key_pair, display_name)
    }

    fn load_identity(&mut self, record: &IdentityRecord) -> Result<&LocalIdentity, StoreError> {
        let key_pair = self.crypto.import_identity_key_pair(&record.signing_key)?;
        Ok(self.install_identity(key_pair, &record.display_name))
    }

    fn identity(&self) -> Option<&LocalIdentity> {
        self.identity.as_ref()
    }

    fn export_identity(&self) -> Result<IdentityRecord, StoreError> {
        let identity = self.identity.as_ref().ok_or(StoreError::NoIdentity)?;
        Ok(IdentityRecord {
            id: identity.id,
            display_name: identity.display_name.clone(),
            fingerprint: identity.fingerprint.clone(),
            signing_key: identity.key_pair.secret_bytes().to_vec(),
        })
    }

    fn clear(&mut self) {
        self.identity = None;
        self.peers.clear();
        self.own_room_keys.clear();
    }

    fn room_key(&mut self, room: &RoomId, now: u64) -> KeyRecord<SymmetricKey> {
        if let Some(record) = self.own_room_keys.get(room).and_then(KeyHistory::latest_record) {
            return record.clone();
        }
        self.rotate_room_key(room, now)
    }

    fn rotate_room_key(&mut self, room: &RoomId, now: u64) -> KeyRecord<SymmetricKey> {
        let key = self.crypto.generate_symmetric_key();
        let limit = self.history_limit;
        let valid_from = self
            .own_room_keys
            .entry(room.clone())
            .or_insert_with(|| KeyHistory::new(limit))
            .append(key.clone(), now);

        for peer in self.peers.values_mut() {
            peer.sent_keys.remove(room);
        }
        KeyRecord { key, valid_from }
    }

    fn ensure_peer(
        &mut self,
        id: IdentityId,
        public_key: &IdentityPublicKey,
        display_name: Option<&str>,
    ) -> Result<&Peer, StoreError> {
        if let Some(existing) = self.peers.get(&id) {
            if existing.public_key != *public_key {
                return Err(StoreError::IdentityKeyMismatch { id });
            }
        } else {
            let fingerprint = self.crypto.fingerprint(id.as_bytes());
            let name = display_name.map_or_else(|| id.short(), str::to_string);
            self.peers.insert(
                id,
                Peer::new(id, *public_key, name, fingerprint, self.history_limit),
            );
        }

        let peer = self.peer_mut(id)?;
        if let Some(name) = display_name {
            if peer.display_name != name {
                peer.display_name = name.to_string();
            }
        }
        Ok(peer)
    }

    fn peer(&self, id: IdentityId) -> Option<&Peer> {
        self.peers.get(&id)
    }

    fn peers(&self) -> Vec<&Peer> {
        let mut peers: Vec<&Peer> = self.peers.values().collect();
        peers.sort_by_key(|peer| peer.id);
        peers
    }

    fn set_trust(&mut self, id: IdentityId, status: TrustStatus) -> Result<(), StoreError> {
        if status == TrustStatus::New {
            return Err(StoreError::InvalidTrustTransition(status));
        }
        self.peer_mut(id)?.trust = status;
        Ok(())
    }

    fn append_shared_secret(
        &mut self,
        id: IdentityId,
        secret: SymmetricKey,
        established_at: u64,
    ) -> Result<(), StoreError> {
        self.peer_mut(id)?.shared_secrets.append(secret, established_at);
        Ok(())
    }

    fn shared_secret(&self, id: IdentityId, at: Option<u64>) -> Option<&SymmetricKey> {
        let history = &self.peers.get(&id)?.shared_secrets;
        match at {
            Some(at) => history.at(at, self.fallback_to_oldest),
            None => history.latest(),
        }
    }

    fn shared_secrets(&self, id: IdentityId) -> Vec<&SymmetricKey> {
        self.peers
            .get(&id)
            .map(|peer| peer.shared_secrets.newest_first().collect())
            .unwrap_or_default()
    }

    fn save_room_key(
        &mut self,
        peer: IdentityId,
        room: &RoomId,
        key: SymmetricKey,
        valid_from: u64,
    ) -> Result<(), StoreError> {
        let limit = self.history_limit;
        self.peer_mut(peer)?
            .room_keys
            .entry(room.clone())
            .or_insert_with(|| KeyHistory::new(limit))
            .insert(key, valid_from);
        Ok(())
    }

    fn room_key_for(&self, peer: IdentityId, room: &RoomId, at: u64) -> Option<&SymmetricKey> {
        self.peers.get(&peer)?.room_keys.get(room)?.at(at, self.fallback_to_oldest)
    }

    fn note_key_sent(&mut self, peer: IdentityId, room: &RoomId) -> Result<(), StoreError> {
        self.peer_mut(peer)?.sent_keys.insert(room.clone());
        Ok(())
    }

    fn note_peer_in_room(&mut self, peer: IdentityId, room: &RoomId) -> Result<(), StoreError> {
        self.peer_mut(peer)?.rooms.insert(room.clone());
        Ok(())
    }

    fn forget_room(&mut self, room: &RoomId) {
        self.own_room_keys.remove(room);
        for peer in self.peers.values_mut() {
            peer.rooms.remove(room);
            peer.room_keys.remove(room);
            peer.sent_keys.remove(room);
        }
        self.peers.retain(|_, peer| !peer.rooms.is_empty());
    }

    fn clear_peers(&mut self) {
        self.peers.clear();
    }
}
