//! Client events and actions.

use std::fmt;

use hearth_crypto::{Fingerprint, IdentityId};
use hearth_proto::{RoomId, Topic};

use crate::store::{IdentityRecord, TrustStatus};

/// Events the caller feeds into the client.
///
/// The caller is responsible for:
/// - Forwarding every payload the transport delivers as [`Self::Delivery`]
/// - Driving housekeeping with periodic [`Self::Tick`]s
/// - Forwarding application intents (join, send, trust changes)
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Create a fresh identity.
    Register {
        /// Name announced to peers.
        display_name: String,
    },

    /// Restore a persisted identity.
    LoadIdentity(IdentityRecord),

    /// Destroy the identity and all derived state.
    Logout,

    /// Join a room.
    Join {
        /// Room to join.
        room: RoomId,
    },

    /// Leave a room.
    Leave {
        /// Room to leave.
        room: RoomId,
    },

    /// Broadcast a text message.
    SendText {
        /// Target room.
        room: RoomId,
        /// Message text.
        text: String,
    },

    /// Change trust in a peer.
    MarkPeerTrust {
        /// Peer to update.
        peer: IdentityId,
        /// New status.
        status: TrustStatus,
    },

    /// Replace our room key and re-share it.
    RotateRoomKey {
        /// Room whose key rotates.
        room: RoomId,
    },

    /// Payload delivered by the transport.
    Delivery {
        /// Topic it arrived on.
        topic: String,
        /// Raw packet bytes.
        payload: Vec<u8>,
    },

    /// Time tick for timeout processing.
    Tick,
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Subscribe the transport to a topic.
    Subscribe(Topic),

    /// Unsubscribe the transport from a topic.
    Unsubscribe(Topic),

    /// Publish bytes on a topic.
    Publish {
        /// Destination topic.
        topic: Topic,
        /// Encoded packet.
        payload: Vec<u8>,
    },

    /// The peer list changed.
    PeersUpdated(Vec<PeerSummary>),

    /// Show a message to the user.
    DeliverMessage(ChatMessage),

    /// Surface a problem to the user.
    Alert {
        /// Human-readable description.
        message: String,
    },

    /// Store the identity.
    PersistIdentity(IdentityRecord),

    /// Delete the stored identity.
    ClearIdentity,
}

/// Where a peer stands in the key-exchange lifecycle.
///
/// Derived from stored state on demand:
/// `Announced → HandshakeInFlight → SecretEstablished → {Verified | Blocked} →
/// KeyShared`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerState {
    /// Presence received, no handshake yet.
    Announced,
    /// We sent a handshake init and await the reply.
    HandshakeInFlight,
    /// Pairwise secret established, not verified.
    SecretEstablished,
    /// Verified, our current room key not sent to it yet.
    Verified,
    /// Blocked by the user.
    Blocked,
    /// Verified and holding our current key for a room it shares with us.
    ///
    /// Refers to our key only; whether the peer shared its key with us is
    /// its own trust decision.
    KeyShared,
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Announced => "announced",
            Self::HandshakeInFlight => "handshake in flight",
            Self::SecretEstablished => "secret established",
            Self::Verified => "verified",
            Self::Blocked => "blocked",
            Self::KeyShared => "key shared",
        })
    }
}

/// Peer as shown to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSummary {
    /// Identity id.
    pub id: IdentityId,
    /// Last announced display name.
    pub display_name: String,
    /// Identity fingerprint, compared out of band before verifying.
    pub fingerprint: Fingerprint,
    /// Fingerprint of the newest pairwise secret, if one exists.
    pub connection_fingerprint: Option<Fingerprint>,
    /// Caller-assigned trust.
    pub trust: TrustStatus,
    /// Lifecycle state.
    pub state: PeerState,
    /// Rooms the peer was seen in.
    pub rooms: Vec<RoomId>,
}

/// Message content after decryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    /// Decrypted text.
    Text(String),
    /// No key from the sender yet; shown as a placeholder.
    Locked,
    /// A key existed but authentication failed.
    DecryptionFailed,
}

/// A message for the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Room it belongs to.
    pub room: RoomId,
    /// Sender identity.
    pub from: IdentityId,
    /// Sender display name at delivery time.
    pub from_name: String,
    /// Content or placeholder.
    pub content: MessageContent,
    /// Sender timestamp in Unix epoch milliseconds.
    pub time: u64,
    /// Whether we sent it.
    pub mine: bool,
}
