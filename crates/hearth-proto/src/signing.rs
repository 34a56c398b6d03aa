//! Canonical byte strings covered by packet signatures.
//!
//! Each input starts with a domain label and encodes every field with a
//! big-endian `u32` length prefix, so no two distinct field tuples produce the
//! same bytes and a presence signature can never be replayed as a handshake
//! signature (or an init as a reply).
//!
//! The same encoding builds the associated data that binds an encrypted
//! payload to the envelope carrying it.

use hearth_crypto::IdentityId;

use crate::{
    packet::{MsgId, PacketKind},
    topic::RoomId,
};

const PRESENCE_LABEL: &[u8] = b"hearth/presence/v1";
const HANDSHAKE_INIT_LABEL: &[u8] = b"hearth/handshake-init/v1";
const HANDSHAKE_REPLY_LABEL: &[u8] = b"hearth/handshake-reply/v1";
const SEALED_LABEL: &[u8] = b"hearth/sealed/v1";

/// Which half of the handshake is being signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeRole {
    /// `HANDSHAKE_INIT`
    Init,
    /// `HANDSHAKE_REPLY`
    Reply,
}

/// Bytes signed in a presence packet: `(msgId, timestamp, displayName,
/// publicKey)`.
pub fn presence(msg_id: &MsgId, timestamp: u64, display_name: &str, public_key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        PRESENCE_LABEL.len() + msg_id.as_str().len() + display_name.len() + public_key.len() + 24,
    );
    push_field(&mut out, PRESENCE_LABEL);
    push_field(&mut out, msg_id.as_str().as_bytes());
    out.extend_from_slice(&timestamp.to_be_bytes());
    push_field(&mut out, display_name.as_bytes());
    push_field(&mut out, public_key);
    out
}

/// Bytes signed in a handshake packet: `(msgId, timestamp,
/// ephemeralPublicKey)`.
pub fn handshake(
    role: HandshakeRole,
    msg_id: &MsgId,
    timestamp: u64,
    ephemeral_public_key: &[u8],
) -> Vec<u8> {
    let label = match role {
        HandshakeRole::Init => HANDSHAKE_INIT_LABEL,
        HandshakeRole::Reply => HANDSHAKE_REPLY_LABEL,
    };

    let mut out = Vec::with_capacity(
        label.len() + msg_id.as_str().len() + ephemeral_public_key.len() + 20,
    );
    push_field(&mut out, label);
    push_field(&mut out, msg_id.as_str().as_bytes());
    out.extend_from_slice(&timestamp.to_be_bytes());
    push_field(&mut out, ephemeral_public_key);
    out
}

/// Associated data for an encrypted payload: `(kind, msgId, sender,
/// timestamp, room)`.
///
/// A ciphertext moved into another envelope, room or packet type no longer
/// authenticates, so a relay cannot replay it under a fresh `msgId`.
pub fn associated_data(
    kind: PacketKind,
    msg_id: &MsgId,
    sender: &IdentityId,
    timestamp: u64,
    room: &RoomId,
) -> Vec<u8> {
    let kind = kind.to_string();
    let mut out = Vec::with_capacity(
        SEALED_LABEL.len() + kind.len() + msg_id.as_str().len() + room.as_str().len() + 60,
    );
    push_field(&mut out, SEALED_LABEL);
    push_field(&mut out, kind.as_bytes());
    push_field(&mut out, msg_id.as_str().as_bytes());
    push_field(&mut out, sender.as_bytes());
    out.extend_from_slice(&timestamp.to_be_bytes());
    push_field(&mut out, room.as_str().as_bytes());
    out
}

fn push_field(out: &mut Vec<u8>, field: &[u8]) {
    // Fields are bounded by MAX_PACKET_SIZE, far below u32::MAX.
    out.extend_from_slice(&(field.len() as u32).to_be_bytes());
    out.extend_from_slice(field);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_boundaries_are_unambiguous() {
        let id = MsgId::from("m");
        let a = presence(&id, 1, "ab", b"c");
        let b = presence(&id, 1, "a", b"bc");
        assert_ne!(a, b);
    }

    #[test]
    fn roles_are_domain_separated() {
        let id = MsgId::from("m");
        assert_ne!(
            handshake(HandshakeRole::Init, &id, 7, &[1; 32]),
            handshake(HandshakeRole::Reply, &id, 7, &[1; 32])
        );
    }

    #[test]
    fn every_field_is_covered() {
        let id = MsgId::from("m");
        let base = presence(&id, 1, "alice", &[9; 32]);

        assert_ne!(base, presence(&MsgId::from("n"), 1, "alice", &[9; 32]));
        assert_ne!(base, presence(&id, 2, "alice", &[9; 32]));
        assert_ne!(base, presence(&id, 1, "mallory", &[9; 32]));
        assert_ne!(base, presence(&id, 1, "alice", &[8; 32]));
    }

    #[test]
    fn associated_data_covers_the_envelope() {
        use PacketKind::{SenderKeyShare, TextMessage};

        let (m, n) = (MsgId::from("m"), MsgId::from("n"));
        let (alice, bob) = (IdentityId::from_bytes([1; 32]), IdentityId::from_bytes([2; 32]));
        let (lobby, annex) = (RoomId::new("lobby").unwrap(), RoomId::new("annex").unwrap());
        let base = associated_data(TextMessage, &m, &alice, 5, &lobby);

        assert_ne!(base, associated_data(SenderKeyShare, &m, &alice, 5, &lobby));
        assert_ne!(base, associated_data(TextMessage, &n, &alice, 5, &lobby));
        assert_ne!(base, associated_data(TextMessage, &m, &bob, 5, &lobby));
        assert_ne!(base, associated_data(TextMessage, &m, &alice, 6, &lobby));
        assert_ne!(base, associated_data(TextMessage, &m, &alice, 5, &annex));
    }
}
