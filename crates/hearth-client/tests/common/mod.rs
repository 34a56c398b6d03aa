//! Deterministic in-process network for client integration tests.
//!
//! Every node runs a real [`Client`] over a seeded [`MockEnv`]; all nodes share
//! one clock. Published payloads are queued and delivered in order to every
//! node subscribed to the topic when [`Network::settle`] runs.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};

use hearth_client::{
    ChatMessage, Client, ClientAction, ClientConfig, ClientError, ClientEvent, IdentityRecord,
    MemoryKeyStore, MessageContent, PeerSummary, RoomId, TrustStatus,
};
use hearth_crypto::{
    CryptoProvider, DalekProvider, IdentityId, IdentityKeyPair, env::test_utils::MockEnv,
};
use hearth_proto::{
    Envelope, Handshake, HandshakeRole, MsgId, Packet, Presence, SenderKeyShare, TextMessage,
    signing,
};

pub type TestCrypto = DalekProvider<MockEnv>;
pub type TestClient = Client<MockEnv, TestCrypto, MemoryKeyStore<TestCrypto>>;

/// Upper bound on deliveries per `settle`, guards against packet storms.
const MAX_DELIVERIES: usize = 10_000;

pub struct Node {
    pub client: TestClient,
    pub subscriptions: HashSet<String>,
    pub messages: Vec<ChatMessage>,
    pub alerts: Vec<String>,
    pub peers: Vec<PeerSummary>,
    pub persisted: Option<IdentityRecord>,
}

impl Node {
    /// Texts received from others, with placeholders for undecryptable ones.
    pub fn received(&self) -> Vec<MessageContent> {
        self.messages.iter().filter(|m| !m.mine).map(|m| m.content.clone()).collect()
    }

    pub fn peer(&self, id: IdentityId) -> Option<PeerSummary> {
        self.client.peer_summaries().into_iter().find(|p| p.id == id)
    }
}

pub struct Network {
    pub clock: MockEnv,
    pub nodes: Vec<Node>,
    pub queue: VecDeque<(String, Vec<u8>)>,
    /// Deliver every payload twice.
    pub duplicate: bool,
    next_seed: u64,
}

impl Network {
    pub fn new() -> Self {
        Self {
            clock: MockEnv::with_seed(0),
            nodes: Vec::new(),
            queue: VecDeque::new(),
            duplicate: false,
            next_seed: 1,
        }
    }

    /// Add a registered node with the default configuration.
    pub fn add(&mut self, name: &str) -> usize {
        self.add_with_config(name, ClientConfig::default())
    }

    pub fn add_with_config(&mut self, name: &str, config: ClientConfig) -> usize {
        let env = self.clock.sharing_clock(self.next_seed);
        self.next_seed += 1;

        let crypto = DalekProvider::new(env.clone());
        let store = MemoryKeyStore::with_config(crypto.clone(), &config);
        let client = Client::new(env, crypto, store, config);

        self.nodes.push(Node {
            client,
            subscriptions: HashSet::new(),
            messages: Vec::new(),
            alerts: Vec::new(),
            peers: Vec::new(),
            persisted: None,
        });
        let index = self.nodes.len() - 1;
        self.act(index, ClientEvent::Register { display_name: name.to_string() }).unwrap();
        index
    }

    pub fn id(&self, node: usize) -> IdentityId {
        self.nodes[node].client.id().unwrap()
    }

    /// Feed a caller event to `node` and apply its actions.
    pub fn act(&mut self, node: usize, event: ClientEvent) -> Result<(), ClientError> {
        let actions = self.nodes[node].client.handle(event)?;
        apply(&mut self.nodes[node], &mut self.queue, actions);
        Ok(())
    }

    pub fn join(&mut self, node: usize, room: &RoomId) {
        self.act(node, ClientEvent::Join { room: room.clone() }).unwrap();
        self.settle();
    }

    pub fn send(&mut self, node: usize, room: &RoomId, text: &str) {
        self.act(node, ClientEvent::SendText { room: room.clone(), text: text.to_string() })
            .unwrap();
    }

    pub fn trust(&mut self, node: usize, peer: usize, status: TrustStatus) {
        let peer = self.id(peer);
        self.act(node, ClientEvent::MarkPeerTrust { peer, status }).unwrap();
    }

    /// Deliver a raw payload straight to one node, bypassing subscriptions.
    pub fn inject(&mut self, node: usize, topic: &str, payload: Vec<u8>) {
        let event = ClientEvent::Delivery { topic: topic.to_string(), payload };
        let actions = self.nodes[node].client.handle(event).unwrap();
        apply(&mut self.nodes[node], &mut self.queue, actions);
    }

    /// Deliver queued payloads until the network is quiet.
    pub fn settle(&mut self) {
        let mut deliveries = 0;
        while let Some((topic, payload)) = self.queue.pop_front() {
            let copies = if self.duplicate { 2 } else { 1 };
            for index in 0..self.nodes.len() {
                if !self.nodes[index].subscriptions.contains(&topic) {
                    continue;
                }
                for _ in 0..copies {
                    self.inject(index, &topic, payload.clone());
                    deliveries += 1;
                }
            }
            assert!(deliveries < MAX_DELIVERIES, "network did not settle");
        }
    }
}

fn apply(node: &mut Node, queue: &mut VecDeque<(String, Vec<u8>)>, actions: Vec<ClientAction>) {
    for action in actions {
        match action {
            ClientAction::Subscribe(topic) => {
                node.subscriptions.insert(topic.to_string());
            },
            ClientAction::Unsubscribe(topic) => {
                node.subscriptions.remove(&topic.to_string());
            },
            ClientAction::Publish { topic, payload } => {
                queue.push_back((topic.to_string(), payload));
            },
            ClientAction::PeersUpdated(peers) => node.peers = peers,
            ClientAction::DeliverMessage(message) => node.messages.push(message),
            ClientAction::Alert { message } => node.alerts.push(message),
            ClientAction::PersistIdentity(record) => node.persisted = Some(record),
            ClientAction::ClearIdentity => node.persisted = None,
        }
    }
}

pub fn room(name: &str) -> RoomId {
    RoomId::new(name).unwrap()
}

/// A participant that exists only as key material, for hand-built packets.
pub struct Outsider {
    pub crypto: TestCrypto,
    pub key_pair: IdentityKeyPair,
    pub id: IdentityId,
}

impl Outsider {
    pub fn new(seed: u64) -> Self {
        let crypto = DalekProvider::new(MockEnv::with_seed(seed));
        let key_pair = crypto.generate_identity_key_pair();
        let id = crypto.identity_id(key_pair.public_key());
        Self { crypto, key_pair, id }
    }

    /// Correctly signed presence envelope.
    pub fn presence(&self, name: &str, timestamp: u64) -> Envelope {
        let msg_id = MsgId::from_random(rand_msg_id(&self.crypto));
        let public_key = self.key_pair.public_key().as_bytes().to_vec();
        let input = signing::presence(&msg_id, timestamp, name, &public_key);
        let signature = self.crypto.sign(&self.key_pair, &input).as_bytes().to_vec();

        Envelope {
            msg_id,
            sender: self.id,
            timestamp,
            packet: Packet::Presence(Presence {
                public_key,
                display_name: name.to_string(),
                signature,
            }),
        }
    }

    /// Correctly signed handshake packet with a fresh ephemeral key.
    pub fn handshake(&self, role: HandshakeRole, timestamp: u64) -> Envelope {
        let msg_id = MsgId::from_random(rand_msg_id(&self.crypto));
        let ephemeral = self.crypto.generate_ephemeral_key_pair();
        let ephemeral_public_key = ephemeral.public_key().as_bytes().to_vec();
        let input = signing::handshake(role, &msg_id, timestamp, &ephemeral_public_key);
        let signature = self.crypto.sign(&self.key_pair, &input).as_bytes().to_vec();

        let handshake = Handshake { ephemeral_public_key, signature };
        let packet = match role {
            HandshakeRole::Init => Packet::HandshakeInit(handshake),
            HandshakeRole::Reply => Packet::HandshakeReply(handshake),
        };
        Envelope { msg_id, sender: self.id, timestamp, packet }
    }

    /// Key share with arbitrary encrypted bytes.
    pub fn key_share(&self, room: &RoomId, encrypted_key: Vec<u8>, timestamp: u64) -> Envelope {
        Envelope {
            msg_id: MsgId::from_random(rand_msg_id(&self.crypto)),
            sender: self.id,
            timestamp,
            packet: Packet::SenderKeyShare(SenderKeyShare { room: room.clone(), encrypted_key }),
        }
    }

    /// Text message with arbitrary ciphertext.
    pub fn text(&self, room: &RoomId, ciphertext: Vec<u8>, timestamp: u64) -> Envelope {
        Envelope {
            msg_id: MsgId::from_random(rand_msg_id(&self.crypto)),
            sender: self.id,
            timestamp,
            packet: Packet::TextMessage(TextMessage { room: room.clone(), ciphertext }),
        }
    }
}

fn rand_msg_id(crypto: &TestCrypto) -> [u8; 16] {
    use hearth_crypto::Environment;
    crypto.env().random_array()
}
