//! Pub/sub topic naming.
//!
//! Each room uses three topics:
//!
//! - `room/{roomId}/discovery`: shared presence broadcasts
//! - `room/{roomId}/messages`: shared ciphertext broadcasts
//! - `room/{roomId}/inbox/{identityId}`: unicast control traffic (private
//!   presence replies, handshakes, sender-key shares)

use std::fmt;

use hearth_crypto::IdentityId;
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Maximum room name length in bytes.
const MAX_ROOM_ID_LEN: usize = 128;

/// Validated room name.
///
/// # Invariants
///
/// Non-empty, at most 128 bytes, and free of `/` so it can sit inside a topic
/// path unambiguously.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    /// Validate and wrap a room name.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.len() > MAX_ROOM_ID_LEN || name.contains('/') {
            return Err(ProtocolError::InvalidRoomId(name));
        }
        Ok(Self(name))
    }

    /// Room name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<RoomId> for String {
    fn from(room: RoomId) -> Self {
        room.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A parsed topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Shared presence broadcasts for a room.
    Discovery(RoomId),
    /// Shared encrypted message broadcasts for a room.
    Messages(RoomId),
    /// Unicast control traffic addressed to one identity.
    Inbox(RoomId, IdentityId),
}

impl Topic {
    /// The three topics a member of `room` subscribes to.
    pub fn room_topics(room: &RoomId, me: IdentityId) -> [Self; 3] {
        [Self::Discovery(room.clone()), Self::Messages(room.clone()), Self::Inbox(room.clone(), me)]
    }

    /// Room this topic belongs to.
    pub fn room(&self) -> &RoomId {
        match self {
            Self::Discovery(room) | Self::Messages(room) | Self::Inbox(room, _) => room,
        }
    }

    /// Parse a topic string.
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || ProtocolError::InvalidTopic(text.to_string());

        let mut parts = text.split('/');
        if parts.next() != Some("room") {
            return Err(invalid());
        }
        let room = parts.next().ok_or_else(invalid).and_then(RoomId::new)?;

        let topic = match (parts.next(), parts.next()) {
            (Some("discovery"), None) => Self::Discovery(room),
            (Some("messages"), None) => Self::Messages(room),
            (Some("inbox"), Some(id)) => {
                Self::Inbox(room, IdentityId::from_hex(id).map_err(|_| invalid())?)
            },
            _ => return Err(invalid()),
        };

        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(topic)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovery(room) => write!(f, "room/{room}/discovery"),
            Self::Messages(room) => write!(f, "room/{room}/messages"),
            Self::Inbox(room, id) => write!(f, "room/{room}/inbox/{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(name: &str) -> RoomId {
        RoomId::new(name).unwrap()
    }

    #[test]
    fn topic_strings_follow_layout() {
        let id = IdentityId::from_bytes([0x11; 32]);
        let [discovery, messages, inbox] = Topic::room_topics(&room("R"), id);

        assert_eq!(discovery.to_string(), "room/R/discovery");
        assert_eq!(messages.to_string(), "room/R/messages");
        assert_eq!(inbox.to_string(), format!("room/R/inbox/{}", "11".repeat(32)));
    }

    #[test]
    fn parse_inverts_display() {
        let id = IdentityId::from_bytes([0xC3; 32]);
        for topic in Topic::room_topics(&room("lobby"), id) {
            assert_eq!(Topic::parse(&topic.to_string()).unwrap(), topic);
        }
    }

    #[test]
    fn parse_rejects_malformed_topics() {
        for bad in [
            "",
            "room",
            "room//discovery",
            "rooms/R/discovery",
            "room/R/unknown",
            "room/R/inbox",
            "room/R/inbox/not-hex",
            "room/R/discovery/extra",
        ] {
            assert!(Topic::parse(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn room_id_rejects_separator_and_empty() {
        assert!(RoomId::new("").is_err());
        assert!(RoomId::new("a/b").is_err());
        assert!(RoomId::new("x".repeat(MAX_ROOM_ID_LEN + 1)).is_err());
        assert_eq!(room("general").as_str(), "general");
    }
}
