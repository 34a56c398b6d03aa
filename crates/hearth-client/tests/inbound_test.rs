//! Inbound packet handling: forged, malformed, misrouted and late packets.
//!
//! Every case here must leave the client running; failures surface as
//! alerts, never as errors from `handle`.

mod common;

use std::time::Duration;

use common::{Network, Outsider, room};
use hearth_client::{ClientEvent, MessageContent, PeerState, Topic, TrustStatus};
use hearth_crypto::Environment;
use hearth_proto::{Envelope, HandshakeRole, MAX_PACKET_SIZE, MsgId, Packet};

/// One registered node that has joined `lobby`.
fn solo() -> (Network, usize) {
    let mut net = Network::new();
    let alice = net.add("alice");
    net.join(alice, &room("lobby"));
    (net, alice)
}

fn discovery() -> String {
    Topic::Discovery(room("lobby")).to_string()
}

fn inbox(net: &Network, node: usize) -> String {
    Topic::Inbox(room("lobby"), net.id(node)).to_string()
}

fn messages() -> String {
    Topic::Messages(room("lobby")).to_string()
}

#[test]
fn presence_with_bad_signature_is_rejected() {
    let (mut net, alice) = solo();
    let mallory = Outsider::new(7);

    let mut envelope = mallory.presence("mallory", net.clock.now_millis());
    if let Packet::Presence(presence) = &mut envelope.packet {
        presence.display_name = "alice".to_string();
    }
    net.inject(alice, &discovery(), envelope.encode().unwrap());

    let node = &net.nodes[alice];
    assert!(node.client.peer_summaries().is_empty());
    assert_eq!(node.alerts.len(), 1);
    assert!(node.alerts[0].contains("invalid signature on PRESENCE"));
    assert!(net.queue.is_empty());
}

#[test]
fn presence_with_foreign_sender_is_rejected() {
    let (mut net, alice) = solo();
    let mallory = Outsider::new(7);
    let victim = Outsider::new(8);

    let mut envelope = mallory.presence("mallory", net.clock.now_millis());
    envelope.sender = victim.id;
    net.inject(alice, &discovery(), envelope.encode().unwrap());

    let node = &net.nodes[alice];
    assert!(node.client.peer_summaries().is_empty());
    assert_eq!(node.alerts, vec!["sender id does not match public key".to_string()]);
}

#[test]
fn discovery_presence_starts_handshake_that_expires() {
    let (mut net, alice) = solo();
    let dave = Outsider::new(9);

    let envelope = dave.presence("dave", net.clock.now_millis());
    net.inject(alice, &discovery(), envelope.encode().unwrap());

    // Presence reply and handshake init, both to Dave's inbox.
    let dave_inbox = Topic::Inbox(room("lobby"), dave.id).to_string();
    assert_eq!(net.queue.len(), 2);
    assert!(net.queue.iter().all(|(topic, _)| *topic == dave_inbox));
    assert_eq!(net.nodes[alice].client.pending_handshakes(), 1);
    assert_eq!(net.nodes[alice].peer(dave.id).unwrap().state, PeerState::HandshakeInFlight);

    net.clock.advance(Duration::from_secs(30));
    assert!(net.nodes[alice].client.handle(ClientEvent::Tick).unwrap().is_empty());
    assert_eq!(net.nodes[alice].client.pending_handshakes(), 1);

    net.clock.advance(Duration::from_secs(31));
    net.act(alice, ClientEvent::Tick).unwrap();

    let node = &net.nodes[alice];
    assert_eq!(node.client.pending_handshakes(), 0);
    let dave_summary = node.peers.iter().find(|p| p.id == dave.id).unwrap();
    assert_eq!(dave_summary.state, PeerState::Announced);
}

#[test]
fn inbox_presence_does_not_start_handshake() {
    let (mut net, alice) = solo();
    let dave = Outsider::new(9);

    let envelope = dave.presence("dave", net.clock.now_millis());
    net.inject(alice, &inbox(&net, alice), envelope.encode().unwrap());

    assert!(net.queue.is_empty());
    assert_eq!(net.nodes[alice].peer(dave.id).unwrap().state, PeerState::Announced);
}

#[test]
fn unsolicited_handshake_reply_is_rejected() {
    let (mut net, alice) = solo();
    let dave = Outsider::new(9);
    let topic = inbox(&net, alice);
    let now = net.clock.now_millis();

    net.inject(alice, &topic, dave.presence("dave", now).encode().unwrap());
    net.inject(alice, &topic, dave.handshake(HandshakeRole::Reply, now).encode().unwrap());

    let node = &net.nodes[alice];
    assert_eq!(node.alerts.len(), 1);
    assert!(node.alerts[0].contains("unexpected handshake reply"));
    assert_eq!(node.peer(dave.id).unwrap().state, PeerState::Announced);
}

#[test]
fn handshake_init_from_stranger_is_rejected() {
    let (mut net, alice) = solo();
    let dave = Outsider::new(9);
    let topic = inbox(&net, alice);
    let now = net.clock.now_millis();

    net.inject(alice, &topic, dave.handshake(HandshakeRole::Init, now).encode().unwrap());

    assert!(net.nodes[alice].alerts[0].contains("unknown peer"));
    assert!(net.queue.is_empty());
}

#[test]
fn handshake_init_from_known_peer_is_answered() {
    let (mut net, alice) = solo();
    let dave = Outsider::new(9);
    let topic = inbox(&net, alice);
    let now = net.clock.now_millis();

    net.inject(alice, &topic, dave.presence("dave", now).encode().unwrap());
    net.inject(alice, &topic, dave.handshake(HandshakeRole::Init, now).encode().unwrap());

    let node = &net.nodes[alice];
    assert!(node.alerts.is_empty());
    let summary = node.peer(dave.id).unwrap();
    assert_eq!(summary.state, PeerState::SecretEstablished);
    assert!(summary.connection_fingerprint.is_some());
    assert_eq!(net.queue.len(), 1, "one handshake reply");
}

#[test]
fn verified_peer_is_key_shared_once_our_key_is_sent() {
    let (mut net, alice) = solo();
    let dave = Outsider::new(9);
    let topic = inbox(&net, alice);
    let now = net.clock.now_millis();

    net.inject(alice, &topic, dave.presence("dave", now).encode().unwrap());
    net.act(alice, ClientEvent::MarkPeerTrust { peer: dave.id, status: TrustStatus::Verified })
        .unwrap();

    // No secret yet, so nothing could be sent.
    assert_eq!(net.nodes[alice].peer(dave.id).unwrap().state, PeerState::Verified);
    assert!(net.queue.is_empty());

    net.inject(alice, &topic, dave.handshake(HandshakeRole::Init, now).encode().unwrap());

    assert_eq!(net.nodes[alice].peer(dave.id).unwrap().state, PeerState::KeyShared);
    assert_eq!(net.queue.len(), 2, "handshake reply and key share");
}

#[test]
fn key_share_without_secret_is_rejected() {
    let (mut net, alice) = solo();
    let dave = Outsider::new(9);
    let topic = inbox(&net, alice);
    let now = net.clock.now_millis();

    net.inject(alice, &topic, dave.presence("dave", now).encode().unwrap());
    net.inject(alice, &topic, dave.key_share(&room("lobby"), vec![0; 60], now).encode().unwrap());

    assert_eq!(net.nodes[alice].alerts.len(), 1);
    assert!(net.nodes[alice].alerts[0].contains("no shared secret"));
}

#[test]
fn text_from_unknown_sender_is_locked() {
    let (mut net, alice) = solo();
    let dave = Outsider::new(9);
    let now = net.clock.now_millis();

    let envelope = dave.text(&room("lobby"), vec![1, 2, 3], now);
    net.inject(alice, &messages(), envelope.encode().unwrap());

    let node = &net.nodes[alice];
    assert_eq!(node.messages.len(), 1);
    assert_eq!(node.messages[0].content, MessageContent::Locked);
    assert_eq!(node.messages[0].from, dave.id);
    assert_eq!(node.messages[0].from_name, dave.id.short());
    assert!(!node.messages[0].mine);
}

#[test]
fn packet_room_must_match_topic_room() {
    let (mut net, alice) = solo();
    let dave = Outsider::new(9);
    let now = net.clock.now_millis();

    net.inject(alice, &messages(), dave.text(&room("annex"), vec![1], now).encode().unwrap());

    let node = &net.nodes[alice];
    assert!(node.messages.is_empty());
    assert!(node.alerts[0].contains("arrived on a topic of room lobby"));
}

#[test]
fn malformed_and_oversized_payloads_alert() {
    let (mut net, alice) = solo();

    net.inject(alice, &messages(), b"not json".to_vec());
    net.inject(alice, &messages(), vec![b' '; MAX_PACKET_SIZE + 1]);

    let alerts = &net.nodes[alice].alerts;
    assert_eq!(alerts.len(), 2);
    assert!(alerts[0].contains("malformed packet"));
    assert!(alerts[1].contains("too large"));
}

#[test]
fn misrouted_deliveries_are_dropped_silently() {
    let (mut net, alice) = solo();
    let dave = Outsider::new(9);
    let eve = Outsider::new(10);
    let payload = dave.presence("dave", net.clock.now_millis()).encode().unwrap();

    // Room never joined.
    net.inject(alice, "room/annex/discovery", payload.clone());
    // Someone else's inbox.
    net.inject(alice, &Topic::Inbox(room("lobby"), eve.id).to_string(), payload.clone());
    // Not a room topic at all.
    net.inject(alice, "metrics/lobby", payload);

    let node = &net.nodes[alice];
    assert!(node.alerts.is_empty());
    assert!(node.client.peer_summaries().is_empty());
}

#[test]
fn stale_packets_are_still_processed() {
    let (mut net, alice) = solo();
    let dave = Outsider::new(9);
    let old = net.clock.now_millis() - 5 * 60 * 1000;

    net.inject(alice, &inbox(&net, alice), dave.presence("dave", old).encode().unwrap());

    assert!(net.nodes[alice].peer(dave.id).is_some());
    assert!(net.nodes[alice].alerts.is_empty());
}

#[test]
fn replayed_packet_is_ignored() {
    let (mut net, alice) = solo();
    let dave = Outsider::new(9);
    let payload = dave.presence("dave", net.clock.now_millis()).encode().unwrap();

    net.inject(alice, &discovery(), payload.clone());
    let queued = net.queue.len();
    net.inject(alice, &discovery(), payload);

    assert_eq!(net.queue.len(), queued);
    assert_eq!(net.nodes[alice].client.pending_handshakes(), 1);
}

#[test]
fn changed_display_name_is_picked_up() {
    let (mut net, alice) = solo();
    let dave = Outsider::new(9);
    let topic = inbox(&net, alice);
    let now = net.clock.now_millis();

    net.inject(alice, &topic, dave.presence("dave", now).encode().unwrap());
    net.inject(alice, &topic, dave.presence("david", now).encode().unwrap());

    assert_eq!(net.nodes[alice].peer(dave.id).unwrap().display_name, "david");
}

#[test]
fn ciphertext_moved_into_another_envelope_fails() {
    let mut net = Network::new();
    let alice = net.add("alice");
    let bob = net.add("bob");
    net.join(alice, &room("lobby"));
    net.join(bob, &room("lobby"));
    net.trust(alice, bob, TrustStatus::Verified);
    net.settle();

    net.send(alice, &room("lobby"), "pay bob 5");
    let (topic, payload) = net.queue.back().cloned().unwrap();
    net.settle();

    let mut replay = Envelope::decode(&payload).unwrap();
    replay.msg_id = MsgId::from("replayed");
    net.inject(bob, &topic, replay.encode().unwrap());

    let mut restamped = Envelope::decode(&payload).unwrap();
    restamped.msg_id = MsgId::from("restamped");
    restamped.timestamp += 1;
    net.inject(bob, &topic, restamped.encode().unwrap());

    assert_eq!(
        net.nodes[bob].received(),
        vec![
            MessageContent::Text("pay bob 5".to_string()),
            MessageContent::DecryptionFailed,
            MessageContent::DecryptionFailed,
        ]
    );
}
