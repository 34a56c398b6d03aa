//! Wire format tests.
//!
//! Peers built from other codebases read these packets, so the JSON layout is
//! pinned here field by field:
//!
//! 1. **Envelope fields**: `type`, `msgId`, `sender`, `timestamp` sit at the
//!    top level beside the variant fields
//! 2. **Type tags**: exact upper-case names for every variant
//! 3. **Binary fields**: standard base64 strings
//! 4. **Robustness**: arbitrary bytes never panic the decoder

use hearth_crypto::IdentityId;
use hearth_proto::{
    Envelope, Handshake, MsgId, Packet, Presence, ProtocolError, RoomId, SenderKeyShare,
    TextMessage,
};
use proptest::prelude::*;
use serde_json::{Value, json};

fn sender() -> IdentityId {
    IdentityId::from_bytes([0x0F; 32])
}

fn to_json(packet: Packet) -> Value {
    let envelope = Envelope {
        msg_id: MsgId::from("0123abcd"),
        sender: sender(),
        timestamp: 1_700_000_000_123,
        packet,
    };
    serde_json::from_slice(&envelope.encode().unwrap()).unwrap()
}

#[test]
fn presence_layout() {
    let value = to_json(Packet::Presence(Presence {
        public_key: vec![0xFF, 0x00, 0x10],
        display_name: "alice".into(),
        signature: b"sig".to_vec(),
    }));

    assert_eq!(
        value,
        json!({
            "type": "PRESENCE",
            "msgId": "0123abcd",
            "sender": "0f".repeat(32),
            "timestamp": 1_700_000_000_123_u64,
            "publicKey": "/wAQ",
            "displayName": "alice",
            "signature": "c2ln",
        })
    );
}

#[test]
fn type_tags() {
    let handshake = Handshake { ephemeral_public_key: vec![1], signature: vec![2] };
    let room = RoomId::new("R").unwrap();

    let cases = [
        (Packet::HandshakeInit(handshake.clone()), "HANDSHAKE_INIT"),
        (Packet::HandshakeReply(handshake), "HANDSHAKE_REPLY"),
        (
            Packet::SenderKeyShare(SenderKeyShare { room: room.clone(), encrypted_key: vec![3] }),
            "SENDER_KEY_SHARE",
        ),
        (Packet::TextMessage(TextMessage { room, ciphertext: vec![4] }), "TEXT_MESSAGE"),
    ];

    for (packet, tag) in cases {
        let kind = packet.kind();
        let value = to_json(packet);
        assert_eq!(value["type"], tag);
        assert_eq!(kind.to_string(), tag);
    }
}

#[test]
fn handshake_and_share_field_names() {
    let value = to_json(Packet::HandshakeInit(Handshake {
        ephemeral_public_key: vec![0; 3],
        signature: vec![0; 3],
    }));
    assert_eq!(value["ephemeralPublicKey"], "AAAA");

    let value = to_json(Packet::SenderKeyShare(SenderKeyShare {
        room: RoomId::new("lobby").unwrap(),
        encrypted_key: vec![0; 3],
    }));
    assert_eq!(value["room"], "lobby");
    assert_eq!(value["encryptedKey"], "AAAA");
}

#[test]
fn decodes_hand_written_json() {
    let text = json!({
        "type": "TEXT_MESSAGE",
        "msgId": "x",
        "sender": "0f".repeat(32),
        "timestamp": 5,
        "room": "R",
        "ciphertext": "AQID",
    })
    .to_string();

    let envelope = Envelope::decode(text.as_bytes()).unwrap();
    assert_eq!(envelope.sender, sender());
    assert_eq!(
        envelope.packet,
        Packet::TextMessage(TextMessage {
            room: RoomId::new("R").unwrap(),
            ciphertext: vec![1, 2, 3],
        })
    );
}

#[test]
fn rejects_unknown_type_and_bad_fields() {
    let base = |overrides: Value| {
        let mut value = json!({
            "type": "PRESENCE",
            "msgId": "x",
            "sender": "0f".repeat(32),
            "timestamp": 5,
            "publicKey": "AQID",
            "displayName": "a",
            "signature": "AQID",
        });
        if let (Some(target), Some(source)) = (value.as_object_mut(), overrides.as_object()) {
            for (key, field) in source {
                target.insert(key.clone(), field.clone());
            }
        }
        value.to_string()
    };

    assert!(Envelope::decode(base(json!({})).as_bytes()).is_ok());
    for overrides in [
        json!({ "type": "GOSSIP" }),
        json!({ "publicKey": "not base64!" }),
        json!({ "sender": "abcd" }),
        json!({ "timestamp": "yesterday" }),
    ] {
        assert!(matches!(
            Envelope::decode(base(overrides.clone()).as_bytes()),
            Err(ProtocolError::Decode(_))
        ), "{overrides} should be rejected");
    }
}

#[test]
fn rejects_invalid_room_in_packet() {
    let text = json!({
        "type": "TEXT_MESSAGE",
        "msgId": "x",
        "sender": "0f".repeat(32),
        "timestamp": 5,
        "room": "a/b",
        "ciphertext": "AQID",
    })
    .to_string();

    assert!(Envelope::decode(text.as_bytes()).is_err());
}

proptest! {
    #[test]
    fn prop_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = Envelope::decode(&bytes);
    }
}
