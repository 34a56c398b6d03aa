//! Hearth Wire Protocol
//!
//! Packet definitions, the JSON envelope codec and pub/sub topic naming.
//!
//! # Architecture
//!
//! Every payload on the transport is one [`Envelope`]: a UTF-8 JSON object
//! with common fields (`type`, `msgId`, `sender`, `timestamp`) and the
//! variant fields of a [`Packet`] flattened beside them. Binary fields are
//! standard base64.
//!
//! ```text
//! {"msgId":"…","sender":"<hex id>","timestamp":1700000000000,
//!  "type":"PRESENCE","publicKey":"<b64>","displayName":"alice","signature":"<b64>"}
//! ```
//!
//! [`Packet`] is a closed sum type. Adding a variant breaks every exhaustive
//! match in the client, so a new packet kind is a compile-time-checked change.
//!
//! # Components
//!
//! - [`Envelope`] / [`Packet`]: wire types and codec
//! - [`signing`]: canonical byte strings covered by signatures
//! - [`Topic`] / [`RoomId`]: topic naming and parsing

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod packet;
pub mod signing;
mod topic;

pub use error::{ProtocolError, Result};
pub use packet::{
    Envelope, Handshake, MAX_PACKET_SIZE, MsgId, Packet, PacketKind, Presence, SenderKeyShare,
    TextMessage,
};
pub use signing::HandshakeRole;
pub use topic::{RoomId, Topic};
