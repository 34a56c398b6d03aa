//! Protocol-level errors.

use thiserror::Error;

/// Result alias for wire operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors from encoding, decoding and topic handling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload exceeds [`crate::MAX_PACKET_SIZE`].
    #[error("packet too large: {size} bytes (max {max})")]
    PacketTooLarge {
        /// Received size.
        size: usize,
        /// Maximum accepted size.
        max: usize,
    },

    /// JSON encoding failed.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Bytes are not a valid envelope (bad UTF-8, JSON, type tag or base64).
    #[error("decode failed: {0}")]
    Decode(String),

    /// Room name is empty, too long or contains a separator.
    #[error("invalid room id: {0:?}")]
    InvalidRoomId(String),

    /// Topic string does not follow the `room/{id}/…` layout.
    #[error("invalid topic: {0:?}")]
    InvalidTopic(String),
}
