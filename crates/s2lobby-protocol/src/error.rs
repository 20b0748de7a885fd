//! Error types for the protocol layer.
//!
//! [`SchemaError`] is what the generic codec reports: the bytes or values
//! did not fit the declared field list. [`ProtocolError`] covers the
//! layer above it: envelopes, message type codes, and the handshake
//! payload.

use crate::schema::FieldType;

/// The codec could not map bytes or values onto a schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// The buffer ran out in the middle of a field.
    #[error("buffer exhausted reading field `{field}` ({field_type})")]
    Truncated {
        field: &'static str,
        field_type: FieldType,
    },

    /// A value's type does not match the type the schema declares.
    #[error("field `{field}` is declared {expected} but the value is {actual}")]
    TypeMismatch {
        field: &'static str,
        expected: FieldType,
        actual: FieldType,
    },

    /// The number of values does not match the number of declared fields.
    #[error("schema declares {expected} fields but {actual} values were supplied")]
    FieldCount { expected: usize, actual: usize },
}

/// Errors above the field codec.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The record itself could not be encoded or decoded.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A frame type the session does not accept in its current state.
    #[error("unexpected frame type {0}")]
    UnexpectedFrame(u32),

    /// The envelope magic is not [`ENVELOPE_MAGIC`](crate::ENVELOPE_MAGIC).
    #[error("invalid envelope magic {0:#06x}")]
    BadEnvelopeMagic(u16),

    /// The envelope names a message type this server does not know.
    #[error("unknown message type {0}")]
    UnknownMessageType(u16),

    /// The handshake payload has the wrong length.
    #[error("handshake payload must be {expected} bytes, got {actual}")]
    HandshakeSize { expected: usize, actual: usize },
}
