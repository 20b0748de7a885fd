//! Wire messages for the S2 lobby.
//!
//! - [`schema`]: field types, [`Value`], and the generic
//!   [`encode_values`]/[`decode_values`] codec.
//! - [`messages`]: the message table, with every typed message and its schema.
//! - [`Codec`] / [`SchemaCodec`]: envelope plus body encoding of typed
//!   messages, and [`Envelope::split`] for the inbound side.
//! - [`handshake`]: the fixed 52-byte handshake record.

mod codec;
mod error;
pub mod handshake;
pub mod messages;
pub mod schema;
mod types;

pub use codec::{Codec, ENVELOPE_MAGIC, Envelope, SchemaCodec};
pub use error::{ProtocolError, SchemaError};
pub use handshake::{HANDSHAKE_MAGIC, HANDSHAKE_SIZE, Handshake, PASSWORD_MARKER};
pub use messages::{Message, MessageType};
pub use schema::{FieldDef, FieldType, Value, decode_values, encode_values};
pub use types::{ResultCode, RoomId, UserId, WireString};
