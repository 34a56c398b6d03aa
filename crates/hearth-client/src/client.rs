//! Client state machine.
//!
//! The `Client` turns caller intents and transport deliveries into actions.
//! It owns no I/O: every outbound packet is a [`ClientAction::Publish`] and
//! every inbound packet arrives as [`ClientEvent::Delivery`].
//!
//! # Inbound pipeline
//!
//! ```text
//! topic ─► parse ─► joined? ─► decode ─► dedup ─► self?
//!                                                   │
//!          dispatch ◄─ blocked? ◄─ staleness ◄──────┘
//! ```
//!
//! A failing packet never aborts the pipeline. It is logged and surfaced as
//! [`ClientAction::Alert`]; the next delivery is processed normally.

use std::collections::{BTreeSet, HashMap};

use hearth_crypto::{
    CryptoError, CryptoProvider, EphemeralKeyPair, EphemeralPublicKey, Environment, IdentityId,
    Signature,
};
use hearth_proto::{
    Envelope, Handshake, HandshakeRole, MsgId, Packet, PacketKind, Presence, RoomId,
    SenderKeyShare, TextMessage, Topic, signing,
};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::{
    config::ClientConfig,
    dedup::DedupCache,
    error::ClientError,
    event::{ChatMessage, ClientAction, ClientEvent, MessageContent, PeerState, PeerSummary},
    store::{IdentityRecord, KeyStore, LocalIdentity, Peer, TrustStatus},
};

/// Handshake we initiated and whose reply is outstanding.
struct PendingHandshake {
    /// Room whose inbox the init was sent to.
    room: RoomId,
    ephemeral: EphemeralKeyPair,
    started_at: u64,
}

/// Protocol client for one local identity.
///
/// Generic over the environment (time, randomness), the crypto provider and
/// the key store so the whole state machine runs deterministically in tests.
pub struct Client<E: Environment, C: CryptoProvider, S: KeyStore> {
    env: E,
    crypto: C,
    store: S,
    config: ClientConfig,

    /// Joined rooms.
    rooms: BTreeSet<RoomId>,

    /// Outstanding handshakes, one per peer. A new attempt overwrites.
    pending: HashMap<IdentityId, PendingHandshake>,

    dedup: DedupCache,
}

impl<E: Environment, C: CryptoProvider, S: KeyStore> Client<E, C, S> {
    /// Create a client with no identity and no rooms.
    pub fn new(env: E, crypto: C, store: S, config: ClientConfig) -> Self {
        let dedup = DedupCache::new(config.dedup_ttl_millis(), config.dedup_capacity);
        Self {
            env,
            crypto,
            store,
            config,
            rooms: BTreeSet::new(),
            pending: HashMap::new(),
            dedup,
        }
    }

    /// Local identity, if registered or loaded.
    pub fn identity(&self) -> Option<&LocalIdentity> {
        self.store.identity()
    }

    /// Local identity id, if registered or loaded.
    pub fn id(&self) -> Option<IdentityId> {
        self.store.identity().map(LocalIdentity::id)
    }

    /// Joined rooms.
    pub fn rooms(&self) -> &BTreeSet<RoomId> {
        &self.rooms
    }

    /// Check if the client has joined a room.
    pub fn is_member(&self, room: &RoomId) -> bool {
        self.rooms.contains(room)
    }

    /// The key store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Number of handshakes awaiting a reply.
    pub fn pending_handshakes(&self) -> usize {
        self.pending.len()
    }

    /// Every known peer as shown to the application, ordered by id.
    pub fn peer_summaries(&self) -> Vec<PeerSummary> {
        self.store.peers().into_iter().map(|peer| self.summarize(peer)).collect()
    }

    /// Process an event and return resulting actions.
    ///
    /// # Errors
    ///
    /// Caller operations fail with the reason the intent cannot be carried
    /// out. [`ClientEvent::Delivery`] and [`ClientEvent::Tick`] never fail.
    pub fn handle(&mut self, event: ClientEvent) -> Result<Vec<ClientAction>, ClientError> {
        match event {
            ClientEvent::Register { display_name } => self.handle_register(&display_name),
            ClientEvent::LoadIdentity(record) => self.handle_load_identity(&record),
            ClientEvent::Logout => Ok(self.handle_logout()),
            ClientEvent::Join { room } => self.handle_join(room),
            ClientEvent::Leave { room } => self.handle_leave(&room),
            ClientEvent::SendText { room, text } => self.handle_send_text(&room, &text),
            ClientEvent::MarkPeerTrust { peer, status } => self.handle_mark_trust(peer, status),
            ClientEvent::RotateRoomKey { room } => self.handle_rotate_room_key(&room),
            ClientEvent::Delivery { topic, payload } => Ok(self.handle_delivery(&topic, &payload)),
            ClientEvent::Tick => Ok(self.handle_tick()),
        }
    }

    fn handle_register(&mut self, display_name: &str) -> Result<Vec<ClientAction>, ClientError> {
        if self.store.identity().is_some() {
            return Err(ClientError::IdentityActive);
        }

        let identity = self.store.init_identity(display_name);
        info!(
            id = %identity.id().short(),
            fingerprint = %identity.fingerprint(),
            "registered identity"
        );

        Ok(vec![ClientAction::PersistIdentity(self.store.export_identity()?)])
    }

    fn handle_load_identity(
        &mut self,
        record: &IdentityRecord,
    ) -> Result<Vec<ClientAction>, ClientError> {
        if self.store.identity().is_some() {
            return Err(ClientError::IdentityActive);
        }

        let identity = self.store.load_identity(record)?;
        if identity.id() != record.id {
            warn!(
                stored = %record.id.short(),
                derived = %identity.id().short(),
                "identity record id does not match its key"
            );
        }
        info!(id = %identity.id().short(), "loaded identity");
        Ok(Vec::new())
    }

    fn handle_logout(&mut self) -> Vec<ClientAction> {
        let mut actions = Vec::new();
        if let Some(me) = self.id() {
            for room in &self.rooms {
                actions.extend(Topic::room_topics(room, me).map(ClientAction::Unsubscribe));
            }
        }

        self.rooms.clear();
        self.pending.clear();
        self.dedup.clear();
        self.store.clear();
        info!("logged out");

        actions.push(ClientAction::PeersUpdated(Vec::new()));
        actions.push(ClientAction::ClearIdentity);
        actions
    }

    fn handle_join(&mut self, room: RoomId) -> Result<Vec<ClientAction>, ClientError> {
        let me = self.local()?.id();
        if self.rooms.contains(&room) {
            return Err(ClientError::AlreadyInRoom(room));
        }

        let presence = self.presence_envelope()?;
        let mut actions: Vec<ClientAction> =
            Topic::room_topics(&room, me).map(ClientAction::Subscribe).into();
        actions.push(publish(Topic::Discovery(room.clone()), &presence)?);

        info!(%room, "joined room");
        self.rooms.insert(room);
        Ok(actions)
    }

    fn handle_leave(&mut self, room: &RoomId) -> Result<Vec<ClientAction>, ClientError> {
        let me = self.local()?.id();
        if !self.rooms.remove(room) {
            return Err(ClientError::NotInRoom(room.clone()));
        }

        self.dedup.clear();
        if self.config.clear_all_peers_on_leave {
            self.pending.clear();
            self.store.clear_peers();
        } else {
            self.pending.retain(|_, pending| pending.room != *room);
            self.store.forget_room(room);
        }
        info!(%room, "left room");

        let mut actions: Vec<ClientAction> =
            Topic::room_topics(room, me).map(ClientAction::Unsubscribe).into();
        actions.push(ClientAction::PeersUpdated(self.peer_summaries()));
        Ok(actions)
    }

    fn handle_send_text(
        &mut self,
        room: &RoomId,
        text: &str,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let (me, my_name) = {
            let identity = self.local()?;
            (identity.id(), identity.display_name().to_string())
        };
        if !self.rooms.contains(room) {
            return Err(ClientError::NotInRoom(room.clone()));
        }

        // Stamped no earlier than the key it is sealed under, so receivers
        // look up the same key.
        let record = self.store.room_key(room, self.env.now_millis());
        let now = self.env.now_millis().max(record.valid_from);
        let msg_id = self.new_msg_id();
        let aad = signing::associated_data(PacketKind::TextMessage, &msg_id, &me, now, room);
        let ciphertext = self.crypto.aead_encrypt(&record.key, text.as_bytes(), &aad);
        let envelope = Envelope {
            msg_id,
            sender: me,
            timestamp: now,
            packet: Packet::TextMessage(TextMessage { room: room.clone(), ciphertext }),
        };

        Ok(vec![
            publish(Topic::Messages(room.clone()), &envelope)?,
            ClientAction::DeliverMessage(ChatMessage {
                room: room.clone(),
                from: me,
                from_name: my_name,
                content: MessageContent::Text(text.to_string()),
                time: now,
                mine: true,
            }),
        ])
    }

    fn handle_mark_trust(
        &mut self,
        peer: IdentityId,
        status: TrustStatus,
    ) -> Result<Vec<ClientAction>, ClientError> {
        self.local()?;
        if status == TrustStatus::New {
            return Err(ClientError::InvalidTrustTransition(status));
        }
        self.store.set_trust(peer, status)?;
        info!(peer = %peer.short(), %status, "peer trust changed");

        let mut actions = self.share_with_peer(peer)?;
        actions.push(ClientAction::PeersUpdated(self.peer_summaries()));
        Ok(actions)
    }

    fn handle_rotate_room_key(&mut self, room: &RoomId) -> Result<Vec<ClientAction>, ClientError> {
        self.local()?;
        if !self.rooms.contains(room) {
            return Err(ClientError::NotInRoom(room.clone()));
        }

        self.store.rotate_room_key(room, self.env.now_millis());

        let recipients: Vec<IdentityId> = self
            .store
            .peers()
            .into_iter()
            .filter(|peer| {
                peer.trust() == TrustStatus::Verified
                    && peer.rooms().contains(room)
                    && peer.has_shared_secret()
            })
            .map(Peer::id)
            .collect();
        info!(%room, recipients = recipients.len(), "rotated room key");

        let mut actions = Vec::with_capacity(recipients.len());
        for peer in recipients {
            actions.extend(self.share_room_key(room, peer)?);
        }
        Ok(actions)
    }

    fn handle_tick(&mut self) -> Vec<ClientAction> {
        let now = self.env.now_millis();
        let timeout = self.config.handshake_timeout_millis();

        let before = self.pending.len();
        self.pending.retain(|peer, pending| {
            let live = now.saturating_sub(pending.started_at) < timeout;
            if !live {
                debug!(peer = %peer.short(), room = %pending.room, "handshake expired");
            }
            live
        });
        self.dedup.evict_expired(now);

        if self.pending.len() == before {
            Vec::new()
        } else {
            vec![ClientAction::PeersUpdated(self.peer_summaries())]
        }
    }

    fn handle_delivery(&mut self, topic: &str, payload: &[u8]) -> Vec<ClientAction> {
        let Some(me) = self.id() else {
            debug!(topic, "dropping delivery without identity");
            return Vec::new();
        };

        let topic = match Topic::parse(topic) {
            Ok(topic) => topic,
            Err(err) => {
                debug!(%err, "dropping delivery on foreign topic");
                return Vec::new();
            },
        };
        if !self.rooms.contains(topic.room()) {
            debug!(%topic, "dropping delivery for a room we are not in");
            return Vec::new();
        }
        if let Topic::Inbox(_, owner) = &topic {
            if *owner != me {
                debug!(%topic, "dropping delivery for another inbox");
                return Vec::new();
            }
        }

        let envelope = match Envelope::decode(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(%topic, %err, "malformed packet");
                return vec![alert(format!("malformed packet on {topic}: {err}"))];
            },
        };

        let now = self.env.now_millis();
        if !self.dedup.insert(&envelope.msg_id, now) {
            debug!(msg_id = %envelope.msg_id, "duplicate packet");
            return Vec::new();
        }
        if envelope.sender == me {
            return Vec::new();
        }

        let kind = envelope.packet.kind();
        let sender = envelope.sender;
        let skew = now.abs_diff(envelope.timestamp);
        if skew > self.config.staleness_window_millis() {
            warn!(%kind, sender = %sender.short(), skew_ms = skew, "stale packet");
        }

        if kind != PacketKind::Presence && self.is_blocked(sender) {
            debug!(%kind, sender = %sender.short(), "dropping packet from blocked peer");
            return Vec::new();
        }

        match self.dispatch(&topic, envelope) {
            Ok(actions) => actions,
            Err(err) => {
                if err.is_security_event() {
                    warn!(%kind, sender = %sender.short(), %err, "security alert");
                } else {
                    warn!(%kind, sender = %sender.short(), %err, "packet rejected");
                }
                vec![alert(err.to_string())]
            },
        }
    }

    fn dispatch(
        &mut self,
        topic: &Topic,
        envelope: Envelope,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let Envelope { msg_id, sender, timestamp, packet } = envelope;
        match packet {
            Packet::Presence(presence) => {
                self.on_presence(topic, &msg_id, sender, timestamp, &presence)
            },
            Packet::HandshakeInit(handshake) => {
                self.on_handshake_init(topic.room(), &msg_id, sender, timestamp, &handshake)
            },
            Packet::HandshakeReply(handshake) => {
                self.on_handshake_reply(&msg_id, sender, timestamp, &handshake)
            },
            Packet::SenderKeyShare(share) => {
                self.on_sender_key_share(topic.room(), &msg_id, sender, timestamp, &share)
            },
            Packet::TextMessage(message) => {
                self.on_text_message(topic.room(), &msg_id, sender, timestamp, message)
            },
        }
    }

    fn on_presence(
        &mut self,
        topic: &Topic,
        msg_id: &MsgId,
        sender: IdentityId,
        timestamp: u64,
        presence: &Presence,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let public_key = self.crypto.import_identity_public_key(&presence.public_key)?;
        if self.crypto.identity_id(&public_key) != sender {
            return Err(ClientError::SenderMismatch { sender });
        }

        let invalid = || ClientError::SignatureInvalid { kind: "PRESENCE", sender };
        let signature = Signature::from_slice(&presence.signature).map_err(|_| invalid())?;
        let input =
            signing::presence(msg_id, timestamp, &presence.display_name, &presence.public_key);
        if !self.crypto.verify(&public_key, &signature, &input) {
            return Err(invalid());
        }

        let trust =
            self.store.ensure_peer(sender, &public_key, Some(&presence.display_name))?.trust();
        let room = topic.room();
        self.store.note_peer_in_room(sender, room)?;
        debug!(peer = %sender.short(), %room, name = %presence.display_name, "presence");

        let mut actions = Vec::new();
        if let Topic::Discovery(room) = topic {
            if trust != TrustStatus::Blocked {
                let reply = self.presence_envelope()?;
                actions.push(publish(Topic::Inbox(room.clone(), sender), &reply)?);
                actions.push(self.start_handshake(room, sender)?);
            }
        }
        actions.push(ClientAction::PeersUpdated(self.peer_summaries()));
        Ok(actions)
    }

    fn on_handshake_init(
        &mut self,
        room: &RoomId,
        msg_id: &MsgId,
        sender: IdentityId,
        timestamp: u64,
        handshake: &Handshake,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let theirs =
            self.verify_handshake(HandshakeRole::Init, msg_id, sender, timestamp, handshake)?;

        // Crossed inits: the lower id stays initiator so both sides end up
        // with one secret from one exchange.
        let now = self.env.now_millis();
        let timeout = self.config.handshake_timeout_millis();
        let crossed = self
            .pending
            .get(&sender)
            .is_some_and(|pending| now.saturating_sub(pending.started_at) < timeout);
        if crossed {
            if self.local()?.id() < sender {
                debug!(peer = %sender.short(), "ignoring crossed handshake init");
                return Ok(Vec::new());
            }
            self.pending.remove(&sender);
            debug!(peer = %sender.short(), "yielding to crossed handshake init");
        }

        let ephemeral = self.crypto.generate_ephemeral_key_pair();
        let secret = self.crypto.derive_shared_secret(&ephemeral, &theirs)?;
        self.store.append_shared_secret(sender, secret, now)?;
        debug!(peer = %sender.short(), "answered handshake");

        let reply = self.handshake_envelope(HandshakeRole::Reply, &ephemeral)?;
        let mut actions = vec![publish(Topic::Inbox(room.clone(), sender), &reply)?];
        actions.extend(self.share_with_peer(sender)?);
        actions.push(ClientAction::PeersUpdated(self.peer_summaries()));
        Ok(actions)
    }

    fn on_handshake_reply(
        &mut self,
        msg_id: &MsgId,
        sender: IdentityId,
        timestamp: u64,
        handshake: &Handshake,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let theirs =
            self.verify_handshake(HandshakeRole::Reply, msg_id, sender, timestamp, handshake)?;

        let now = self.env.now_millis();
        let timeout = self.config.handshake_timeout_millis();
        let pending = match self.pending.remove(&sender) {
            Some(pending) if now.saturating_sub(pending.started_at) < timeout => pending,
            _ => return Err(ClientError::UnexpectedHandshakeReply(sender)),
        };

        let secret = self.crypto.derive_shared_secret(&pending.ephemeral, &theirs)?;
        self.store.append_shared_secret(sender, secret, now)?;
        debug!(peer = %sender.short(), room = %pending.room, "handshake complete");

        let mut actions = self.share_with_peer(sender)?;
        actions.push(ClientAction::PeersUpdated(self.peer_summaries()));
        Ok(actions)
    }

    fn on_sender_key_share(
        &mut self,
        room: &RoomId,
        msg_id: &MsgId,
        sender: IdentityId,
        timestamp: u64,
        share: &SenderKeyShare,
    ) -> Result<Vec<ClientAction>, ClientError> {
        check_room(room, &share.room)?;
        if self.store.peer(sender).is_none() {
            return Err(ClientError::UnknownPeer(sender));
        }

        // A share may be sealed under a secret we have since replaced, so
        // every retained secret is tried.
        let secrets = self.store.shared_secrets(sender);
        if secrets.is_empty() {
            return Err(ClientError::MissingSharedSecret(sender));
        }
        let aad = signing::associated_data(
            PacketKind::SenderKeyShare,
            msg_id,
            &sender,
            timestamp,
            &share.room,
        );
        let exported = secrets
            .into_iter()
            .find_map(|secret| self.crypto.aead_decrypt(secret, &share.encrypted_key, &aad).ok())
            .map(Zeroizing::new)
            .ok_or_else(|| CryptoError::DecryptionFailed {
                reason: "no shared secret opens the key share".into(),
            })?;

        let key = self.crypto.import_symmetric_key(&exported)?;
        self.store.save_room_key(sender, &share.room, key, timestamp)?;
        info!(peer = %sender.short(), room = %share.room, "received room key");

        Ok(vec![ClientAction::PeersUpdated(self.peer_summaries())])
    }

    fn on_text_message(
        &mut self,
        room: &RoomId,
        msg_id: &MsgId,
        sender: IdentityId,
        timestamp: u64,
        message: TextMessage,
    ) -> Result<Vec<ClientAction>, ClientError> {
        check_room(room, &message.room)?;

        let from_name = self
            .store
            .peer(sender)
            .map_or_else(|| sender.short(), |peer| peer.display_name().to_string());

        let aad = signing::associated_data(
            PacketKind::TextMessage,
            msg_id,
            &sender,
            timestamp,
            &message.room,
        );
        let content = match self.store.room_key_for(sender, &message.room, timestamp) {
            None => MessageContent::Locked,
            Some(key) => match self.crypto.aead_decrypt(key, &message.ciphertext, &aad) {
                Ok(plaintext) => match String::from_utf8(plaintext) {
                    Ok(text) => MessageContent::Text(text),
                    Err(_) => MessageContent::DecryptionFailed,
                },
                Err(err) => {
                    debug!(peer = %sender.short(), %err, "message did not decrypt");
                    MessageContent::DecryptionFailed
                },
            },
        };

        Ok(vec![ClientAction::DeliverMessage(ChatMessage {
            room: message.room,
            from: sender,
            from_name,
            content,
            time: timestamp,
            mine: false,
        })])
    }

    fn verify_handshake(
        &self,
        role: HandshakeRole,
        msg_id: &MsgId,
        sender: IdentityId,
        timestamp: u64,
        handshake: &Handshake,
    ) -> Result<EphemeralPublicKey, ClientError> {
        let peer = self.store.peer(sender).ok_or(ClientError::UnknownPeer(sender))?;
        let kind = match role {
            HandshakeRole::Init => "HANDSHAKE_INIT",
            HandshakeRole::Reply => "HANDSHAKE_REPLY",
        };
        let invalid = || ClientError::SignatureInvalid { kind, sender };

        let signature = Signature::from_slice(&handshake.signature).map_err(|_| invalid())?;
        let input = signing::handshake(role, msg_id, timestamp, &handshake.ephemeral_public_key);
        if !self.crypto.verify(peer.public_key(), &signature, &input) {
            return Err(invalid());
        }

        Ok(self.crypto.import_ephemeral_public_key(&handshake.ephemeral_public_key)?)
    }

    fn start_handshake(
        &mut self,
        room: &RoomId,
        peer: IdentityId,
    ) -> Result<ClientAction, ClientError> {
        let ephemeral = self.crypto.generate_ephemeral_key_pair();
        let init = self.handshake_envelope(HandshakeRole::Init, &ephemeral)?;
        let action = publish(Topic::Inbox(room.clone(), peer), &init)?;

        let started_at = init.timestamp;
        if self
            .pending
            .insert(peer, PendingHandshake { room: room.clone(), ephemeral, started_at })
            .is_some()
        {
            debug!(peer = %peer.short(), "replaced outstanding handshake");
        }
        Ok(action)
    }

    /// Send our key for every joined room the peer is in, if it is verified
    /// and a shared secret exists.
    fn share_with_peer(&mut self, peer: IdentityId) -> Result<Vec<ClientAction>, ClientError> {
        let Some(record) = self.store.peer(peer) else {
            return Ok(Vec::new());
        };
        if record.trust() != TrustStatus::Verified {
            return Ok(Vec::new());
        }
        if !record.has_shared_secret() {
            debug!(peer = %peer.short(), "verified peer has no shared secret yet");
            return Ok(Vec::new());
        }

        let rooms: Vec<RoomId> =
            record.rooms().iter().filter(|room| self.rooms.contains(*room)).cloned().collect();

        let mut actions = Vec::with_capacity(rooms.len());
        for room in &rooms {
            actions.extend(self.share_room_key(room, peer)?);
        }
        Ok(actions)
    }

    fn share_room_key(
        &mut self,
        room: &RoomId,
        peer: IdentityId,
    ) -> Result<Option<ClientAction>, ClientError> {
        let me = self.local()?.id();
        let record = self.store.room_key(room, self.env.now_millis());
        // The receiver files the key under the share's timestamp, which must
        // not precede the key's own start.
        let now = self.env.now_millis().max(record.valid_from);
        let Some(secret) = self.store.shared_secret(peer, None) else {
            return Ok(None);
        };

        let msg_id = self.new_msg_id();
        let aad = signing::associated_data(PacketKind::SenderKeyShare, &msg_id, &me, now, room);
        let exported = Zeroizing::new(self.crypto.export_symmetric_key(&record.key));
        let encrypted_key = self.crypto.aead_encrypt(secret, &exported, &aad);
        let envelope = Envelope {
            msg_id,
            sender: me,
            timestamp: now,
            packet: Packet::SenderKeyShare(SenderKeyShare { room: room.clone(), encrypted_key }),
        };
        debug!(peer = %peer.short(), %room, "sharing room key");

        let action = publish(Topic::Inbox(room.clone(), peer), &envelope)?;
        self.store.note_key_sent(peer, room)?;
        Ok(Some(action))
    }

    fn presence_envelope(&self) -> Result<Envelope, ClientError> {
        let identity = self.local()?;
        let msg_id = self.new_msg_id();
        let timestamp = self.env.now_millis();

        let public_key = identity.key_pair().public_key().as_bytes().to_vec();
        let display_name = identity.display_name().to_string();
        let input = signing::presence(&msg_id, timestamp, &display_name, &public_key);
        let signature = self.crypto.sign(identity.key_pair(), &input).as_bytes().to_vec();

        Ok(Envelope {
            msg_id,
            sender: identity.id(),
            timestamp,
            packet: Packet::Presence(Presence { public_key, display_name, signature }),
        })
    }

    fn handshake_envelope(
        &self,
        role: HandshakeRole,
        ephemeral: &EphemeralKeyPair,
    ) -> Result<Envelope, ClientError> {
        let identity = self.local()?;
        let msg_id = self.new_msg_id();
        let timestamp = self.env.now_millis();

        let ephemeral_public_key = ephemeral.public_key().as_bytes().to_vec();
        let input = signing::handshake(role, &msg_id, timestamp, &ephemeral_public_key);
        let signature = self.crypto.sign(identity.key_pair(), &input).as_bytes().to_vec();

        let handshake = Handshake { ephemeral_public_key, signature };
        let packet = match role {
            HandshakeRole::Init => Packet::HandshakeInit(handshake),
            HandshakeRole::Reply => Packet::HandshakeReply(handshake),
        };
        Ok(Envelope { msg_id, sender: identity.id(), timestamp, packet })
    }

    fn summarize(&self, peer: &Peer) -> PeerSummary {
        let state = match peer.trust() {
            TrustStatus::Blocked => PeerState::Blocked,
            TrustStatus::Verified if peer.rooms().iter().any(|room| peer.has_our_key(room)) => {
                PeerState::KeyShared
            },
            TrustStatus::Verified => PeerState::Verified,
            TrustStatus::New if peer.has_shared_secret() => PeerState::SecretEstablished,
            TrustStatus::New if self.pending.contains_key(&peer.id()) => {
                PeerState::HandshakeInFlight
            },
            TrustStatus::New => PeerState::Announced,
        };

        let connection_fingerprint = self.store.shared_secret(peer.id(), None).map(|secret| {
            self.crypto.fingerprint(&Zeroizing::new(self.crypto.export_symmetric_key(secret)))
        });

        PeerSummary {
            id: peer.id(),
            display_name: peer.display_name().to_string(),
            fingerprint: peer.fingerprint().clone(),
            connection_fingerprint,
            trust: peer.trust(),
            state,
            rooms: peer.rooms().iter().cloned().collect(),
        }
    }

    fn is_blocked(&self, id: IdentityId) -> bool {
        self.store.peer(id).is_some_and(|peer| peer.trust() == TrustStatus::Blocked)
    }

    fn local(&self) -> Result<&LocalIdentity, ClientError> {
        self.store.identity().ok_or(ClientError::NoIdentity)
    }

    fn new_msg_id(&self) -> MsgId {
        MsgId::from_random(self.env.random_array())
    }
}

fn publish(topic: Topic, envelope: &Envelope) -> Result<ClientAction, ClientError> {
    Ok(ClientAction::Publish { topic, payload: envelope.encode()? })
}

fn alert(message: String) -> ClientAction {
    ClientAction::Alert { message }
}

fn check_room(topic: &RoomId, packet: &RoomId) -> Result<(), ClientError> {
    if topic == packet {
        Ok(())
    } else {
        Err(ClientError::RoomMismatch { topic: topic.clone(), packet: packet.clone() })
    }
}
