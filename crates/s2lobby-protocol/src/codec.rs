//! Envelope handling and the [`Codec`] trait.
//!
//! An application frame's payload is an [`Envelope`] (`magic: u16`,
//! `type: u16`) followed by the message body. [`SchemaCodec`] writes both
//! on encode; on decode the caller splits the envelope off first, picks
//! the message type, then hands the body to [`Codec::decode`].

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{ProtocolError, SchemaError};
use crate::messages::{Message, MessageType};
use crate::schema::{FieldDef, FieldType, Value, decode_values, encode_values};

/// Magic prefix of every application message.
pub const ENVELOPE_MAGIC: u16 = 0x27D8;

const ENVELOPE_SCHEMA: &[FieldDef] = &[
    FieldDef::new("magic", FieldType::U16),
    FieldDef::new("type", FieldType::U16),
];

/// The inner header of an application message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub magic: u16,
    pub msg_type: u16,
}

impl Envelope {
    pub fn new(msg_type: MessageType) -> Self {
        Self {
            magic: ENVELOPE_MAGIC,
            msg_type: msg_type.code(),
        }
    }

    /// Splits an application payload into its envelope and the remaining
    /// body.
    ///
    /// # Errors
    /// [`ProtocolError::Schema`] if the payload is shorter than the
    /// envelope, [`ProtocolError::BadEnvelopeMagic`] if the magic is wrong.
    pub fn split(mut payload: Bytes) -> Result<(Envelope, Bytes), ProtocolError> {
        let values = decode_values(ENVELOPE_SCHEMA, &mut payload)?;
        let [Value::U16(magic), Value::U16(msg_type)] = values.as_slice() else {
            return Err(SchemaError::FieldCount {
                expected: ENVELOPE_SCHEMA.len(),
                actual: values.len(),
            }
            .into());
        };
        let envelope = Envelope {
            magic: *magic,
            msg_type: *msg_type,
        };
        if envelope.magic != ENVELOPE_MAGIC {
            return Err(ProtocolError::BadEnvelopeMagic(envelope.magic));
        }
        Ok((envelope, payload))
    }

    /// Resolves the type code.
    ///
    /// # Errors
    /// [`ProtocolError::UnknownMessageType`] for codes outside the table.
    pub fn message_type(&self) -> Result<MessageType, ProtocolError> {
        MessageType::from_code(self.msg_type).ok_or(ProtocolError::UnknownMessageType(self.msg_type))
    }
}

/// Encodes typed messages into application payloads and back.
pub trait Codec: Send + Sync + 'static {
    /// Encodes `message` with its envelope, ready to be sent as an
    /// application frame payload.
    fn encode<M: Message>(&self, message: M) -> Result<Bytes, SchemaError>;

    /// Decodes a message body (the bytes after the envelope).
    fn decode<M: Message>(&self, body: Bytes) -> Result<M, SchemaError>;
}

/// The [`Codec`] driven by each message's declared schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaCodec;

impl Codec for SchemaCodec {
    fn encode<M: Message>(&self, message: M) -> Result<Bytes, SchemaError> {
        let envelope = Envelope::new(M::TYPE);
        let mut buf = BytesMut::with_capacity(64);
        encode_values(
            ENVELOPE_SCHEMA,
            &[Value::U16(envelope.magic), Value::U16(envelope.msg_type)],
            &mut buf,
        )?;
        encode_values(M::SCHEMA, &message.into_values(), &mut buf)?;
        Ok(buf.freeze())
    }

    fn decode<M: Message>(&self, mut body: Bytes) -> Result<M, SchemaError> {
        let values = decode_values(M::SCHEMA, &mut body)?;

        if let Some(Value::U16(echo)) = values.first() {
            if *echo != M::TYPE.code() {
                tracing::warn!(
                    msg_type = ?M::TYPE,
                    echo = *echo,
                    "body type echo does not match envelope"
                );
            }
        }
        if body.has_remaining() {
            tracing::debug!(
                msg_type = ?M::TYPE,
                trailing = body.remaining(),
                "ignoring trailing bytes after message body"
            );
        }

        M::from_values(values)
    }
}
