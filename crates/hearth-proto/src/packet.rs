//! JSON-encoded protocol packets.
//!
//! The envelope carries the fields every packet shares; the variant payload is
//! flattened into the same JSON object and selected by the `type` tag.
//!
//! # Invariants
//!
//! - The variant set is closed. Unknown `type` tags fail to decode rather than
//!   being carried through as opaque data.
//! - Binary fields are standard base64 and are length-checked only when the
//!   client imports them, so the codec never depends on key sizes.

use std::fmt;

use hearth_crypto::IdentityId;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ProtocolError, Result},
    topic::RoomId,
};

/// Maximum accepted packet size (256 KiB).
pub const MAX_PACKET_SIZE: usize = 256 * 1024;

/// Caller-generated unique packet token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MsgId(String);

impl MsgId {
    /// Hex rendering of 16 random bytes.
    pub fn from_random(bytes: [u8; 16]) -> Self {
        use std::fmt::Write;

        let mut text = String::with_capacity(32);
        for byte in bytes {
            let _ = write!(text, "{byte:02x}");
        }
        Self(text)
    }

    /// Token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MsgId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A complete wire packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Unique token used for deduplication.
    pub msg_id: MsgId,
    /// Identity id of the sender.
    pub sender: IdentityId,
    /// Sender's clock in Unix epoch milliseconds.
    pub timestamp: u64,
    /// Variant payload.
    #[serde(flatten)]
    pub packet: Packet,
}

impl Envelope {
    /// Serialize to UTF-8 JSON bytes.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Encode` if serialization fails
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Parse UTF-8 JSON bytes.
    ///
    /// # Security
    ///
    /// The size check happens before parsing so oversized deliveries never
    /// reach the JSON parser.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PacketTooLarge` if `bytes` exceed [`MAX_PACKET_SIZE`]
    /// - `ProtocolError::Decode` for malformed JSON, unknown `type` or bad
    ///   base64
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_PACKET_SIZE {
            return Err(ProtocolError::PacketTooLarge { size: bytes.len(), max: MAX_PACKET_SIZE });
        }
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

/// All packet variants.
///
/// # Security
///
/// - Exhaustive Matching: adding a variant causes compile errors in every
///   dispatcher, so no variant is accidentally left unhandled.
/// - No plain variant carries user content: presence and handshakes are
///   signed, key shares and text are AEAD ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Packet {
    /// Signed announcement of an identity in a room.
    Presence(Presence),
    /// Signed ephemeral key opening a pairwise handshake.
    HandshakeInit(Handshake),
    /// Signed ephemeral key answering a handshake.
    HandshakeReply(Handshake),
    /// Room broadcast key wrapped under the pairwise secret.
    SenderKeyShare(SenderKeyShare),
    /// Room broadcast ciphertext.
    TextMessage(TextMessage),
}

/// Discriminant of [`Packet`], for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// [`Packet::Presence`]
    Presence,
    /// [`Packet::HandshakeInit`]
    HandshakeInit,
    /// [`Packet::HandshakeReply`]
    HandshakeReply,
    /// [`Packet::SenderKeyShare`]
    SenderKeyShare,
    /// [`Packet::TextMessage`]
    TextMessage,
}

impl Packet {
    /// Variant discriminant.
    #[must_use]
    pub const fn kind(&self) -> PacketKind {
        match self {
            Self::Presence(_) => PacketKind::Presence,
            Self::HandshakeInit(_) => PacketKind::HandshakeInit,
            Self::HandshakeReply(_) => PacketKind::HandshakeReply,
            Self::SenderKeyShare(_) => PacketKind::SenderKeyShare,
            Self::TextMessage(_) => PacketKind::TextMessage,
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Presence => "PRESENCE",
            Self::HandshakeInit => "HANDSHAKE_INIT",
            Self::HandshakeReply => "HANDSHAKE_REPLY",
            Self::SenderKeyShare => "SENDER_KEY_SHARE",
            Self::TextMessage => "TEXT_MESSAGE",
        })
    }
}

/// Presence payload.
///
/// Signature covers [`crate::signing::presence`] of
/// `(msgId, timestamp, displayName, publicKey)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    /// Identity public key (the TOFU pin).
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
    /// Human-readable name.
    pub display_name: String,
    /// Signature by the identity key.
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
}

/// Handshake payload, shared by init and reply.
///
/// Signature covers [`crate::signing::handshake`] of
/// `(msgId, timestamp, ephemeralPublicKey)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Fresh key-agreement public key.
    #[serde(with = "base64_bytes")]
    pub ephemeral_public_key: Vec<u8>,
    /// Signature by the sender's identity key.
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
}

/// Sender-key share payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderKeyShare {
    /// Room the key belongs to.
    pub room: RoomId,
    /// Exported room key, AEAD-encrypted under the pairwise secret.
    #[serde(with = "base64_bytes")]
    pub encrypted_key: Vec<u8>,
}

/// Text message payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessage {
    /// Room the message was sent to.
    pub room: RoomId,
    /// UTF-8 text, AEAD-encrypted under the sender's room key.
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
}

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text.as_bytes()).map_err(serde::de::Error::custom)
    }
}
