//! Client and key-store errors.

use hearth_crypto::{CryptoError, IdentityId};
use hearth_proto::{ProtocolError, RoomId};
use thiserror::Error;

use crate::store::TrustStatus;

/// Errors from the key and trust store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No local identity has been created or loaded.
    #[error("no local identity")]
    NoIdentity,

    /// Peer id is not in the store.
    #[error("unknown peer {0}")]
    UnknownPeer(IdentityId),

    /// A different public key was presented for a pinned identity.
    #[error("identity key mismatch for peer {id}")]
    IdentityKeyMismatch {
        /// Peer whose pinned key did not match.
        id: IdentityId,
    },

    /// Trust can only be set to verified or blocked.
    #[error("trust cannot be set to {0}")]
    InvalidTrustTransition(TrustStatus),

    /// Stored or imported key material is invalid.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Errors from the protocol client.
///
/// Caller operations (`Join`, `SendText`, ...) return these directly. Errors
/// raised while processing an inbound packet never escape `handle`; they are
/// logged and surfaced as [`crate::ClientAction::Alert`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Operation requires a registered or loaded identity.
    #[error("no identity: register or load one first")]
    NoIdentity,

    /// Room operation on a room that was never joined.
    #[error("not in room {0}")]
    NotInRoom(RoomId),

    /// Join on a room that is already joined.
    #[error("already in room {0}")]
    AlreadyInRoom(RoomId),

    /// Register while an identity is active.
    #[error("identity already active")]
    IdentityActive,

    /// Peer id is not known.
    #[error("unknown peer {0}")]
    UnknownPeer(IdentityId),

    /// Signature check failed.
    #[error("invalid signature on {kind} from {sender}")]
    SignatureInvalid {
        /// Packet type.
        kind: &'static str,
        /// Claimed sender.
        sender: IdentityId,
    },

    /// Presence public key does not hash to the envelope sender.
    #[error("sender id does not match public key")]
    SenderMismatch {
        /// Claimed sender.
        sender: IdentityId,
    },

    /// Pinned identity key changed.
    #[error("SECURITY: identity key for {id} changed; packet rejected")]
    IdentityKeyMismatch {
        /// Peer whose key changed.
        id: IdentityId,
    },

    /// Key share or handshake needs a pairwise secret we do not have.
    #[error("no shared secret with {0}")]
    MissingSharedSecret(IdentityId),

    /// Trust can only be set to verified or blocked.
    #[error("trust cannot be set to {0}")]
    InvalidTrustTransition(TrustStatus),

    /// Handshake reply without a live pending handshake.
    #[error("unexpected handshake reply from {0}")]
    UnexpectedHandshakeReply(IdentityId),

    /// Packet names a different room than the topic it arrived on.
    #[error("packet for room {packet} arrived on a topic of room {topic}")]
    RoomMismatch {
        /// Room of the topic.
        topic: RoomId,
        /// Room named in the packet.
        packet: RoomId,
    },

    /// Wire encoding or decoding failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Cryptographic operation failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Key store operation failed.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ClientError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NoIdentity => Self::NoIdentity,
            StoreError::UnknownPeer(id) => Self::UnknownPeer(id),
            StoreError::IdentityKeyMismatch { id } => Self::IdentityKeyMismatch { id },
            StoreError::InvalidTrustTransition(status) => Self::InvalidTrustTransition(status),
            other @ StoreError::Crypto(_) => Self::Store(other),
        }
    }
}

impl ClientError {
    /// Returns true for failures that indicate an attack or a compromised
    /// peer rather than loss, reordering or a configuration problem.
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            Self::SignatureInvalid { .. }
                | Self::SenderMismatch { .. }
                | Self::IdentityKeyMismatch { .. }
        )
    }
}
