//! Field schemas and the generic value codec.
//!
//! Every message body is an ordered list of typed fields. A schema is a
//! `&'static [FieldDef]`; [`encode_values`] and [`decode_values`] walk it
//! against a list of [`Value`]s or a byte buffer. Nothing here knows about
//! individual message types.
//!
//! Wire rules, all little-endian:
//!
//! | type     | encoding                                                    |
//! |----------|-------------------------------------------------------------|
//! | `u8`     | 1 byte                                                      |
//! | `u16`    | 2 bytes                                                     |
//! | `u32`    | 4 bytes                                                     |
//! | `bool`   | 1 byte, nonzero is true                                     |
//! | `string` | `u32` length, then the bytes; a trailing NUL is appended on encode if missing and stripped on decode |
//! | `bytes`  | `u32` length, then the raw bytes                            |

use std::fmt;

use bytes::{Buf, BufMut};

use crate::error::SchemaError;
use crate::types::WireString;

/// The wire type of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    U8,
    U16,
    U32,
    Bool,
    String,
    Bytes,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::U8 => "u8",
            FieldType::U16 => "u16",
            FieldType::U32 => "u32",
            FieldType::Bool => "bool",
            FieldType::String => "string",
            FieldType::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

/// One named, typed field in a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub ty: FieldType,
}

impl FieldDef {
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        Self { name, ty }
    }
}

/// A dynamically typed field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    Bool(bool),
    String(WireString),
    Bytes(Vec<u8>),
}

impl Value {
    /// The wire type this value encodes as.
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::U8(_) => FieldType::U8,
            Value::U16(_) => FieldType::U16,
            Value::U32(_) => FieldType::U32,
            Value::Bool(_) => FieldType::Bool,
            Value::String(_) => FieldType::String,
            Value::Bytes(_) => FieldType::Bytes,
        }
    }
}

/// A Rust type that maps onto exactly one [`FieldType`].
pub trait WireField: Sized {
    const FIELD_TYPE: FieldType;

    fn into_value(self) -> Value;

    fn from_value(field: &'static str, value: Value) -> Result<Self, SchemaError>;
}

macro_rules! wire_field {
    ($ty:ty, $variant:ident) => {
        impl WireField for $ty {
            const FIELD_TYPE: FieldType = FieldType::$variant;

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(field: &'static str, value: Value) -> Result<Self, SchemaError> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(SchemaError::TypeMismatch {
                        field,
                        expected: FieldType::$variant,
                        actual: other.field_type(),
                    }),
                }
            }
        }
    };
}

wire_field!(u8, U8);
wire_field!(u16, U16);
wire_field!(u32, U32);
wire_field!(bool, Bool);
wire_field!(WireString, String);
wire_field!(Vec<u8>, Bytes);

/// Pulls the next value out of a decoded record and converts it.
pub fn take_field<T: WireField>(
    values: &mut impl Iterator<Item = Value>,
    field: &'static str,
    expected: usize,
) -> Result<T, SchemaError> {
    let value = values.next().ok_or(SchemaError::FieldCount {
        expected,
        actual: 0,
    })?;
    T::from_value(field, value)
}

/// Appends `values` to `buf` following `schema`.
///
/// # Errors
/// [`SchemaError::FieldCount`] if the lengths differ,
/// [`SchemaError::TypeMismatch`] if any value has the wrong type.
/// Nothing useful is left in `buf` on error.
pub fn encode_values(
    schema: &[FieldDef],
    values: &[Value],
    buf: &mut impl BufMut,
) -> Result<(), SchemaError> {
    if schema.len() != values.len() {
        return Err(SchemaError::FieldCount {
            expected: schema.len(),
            actual: values.len(),
        });
    }

    for (def, value) in schema.iter().zip(values) {
        match (def.ty, value) {
            (FieldType::U8, Value::U8(v)) => buf.put_u8(*v),
            (FieldType::U16, Value::U16(v)) => buf.put_u16_le(*v),
            (FieldType::U32, Value::U32(v)) => buf.put_u32_le(*v),
            (FieldType::Bool, Value::Bool(v)) => buf.put_u8(u8::from(*v)),
            (FieldType::String, Value::String(s)) => {
                let bytes = s.as_bytes();
                if bytes.last() == Some(&0) {
                    buf.put_u32_le(bytes.len() as u32);
                    buf.put_slice(bytes);
                } else {
                    buf.put_u32_le(bytes.len() as u32 + 1);
                    buf.put_slice(bytes);
                    buf.put_u8(0);
                }
            }
            (FieldType::Bytes, Value::Bytes(b)) => {
                buf.put_u32_le(b.len() as u32);
                buf.put_slice(b);
            }
            (expected, actual) => {
                return Err(SchemaError::TypeMismatch {
                    field: def.name,
                    expected,
                    actual: actual.field_type(),
                });
            }
        }
    }
    Ok(())
}

/// Reads one value per schema field from the front of `buf`.
///
/// Bytes left over after the last field are not consumed; callers decide
/// whether that matters.
///
/// # Errors
/// [`SchemaError::Truncated`] if the buffer runs out mid-field.
pub fn decode_values(schema: &[FieldDef], buf: &mut impl Buf) -> Result<Vec<Value>, SchemaError> {
    let mut values = Vec::with_capacity(schema.len());

    for def in schema {
        let truncated = SchemaError::Truncated {
            field: def.name,
            field_type: def.ty,
        };
        let value = match def.ty {
            FieldType::U8 => {
                ensure(buf, 1, &truncated)?;
                Value::U8(buf.get_u8())
            }
            FieldType::U16 => {
                ensure(buf, 2, &truncated)?;
                Value::U16(buf.get_u16_le())
            }
            FieldType::U32 => {
                ensure(buf, 4, &truncated)?;
                Value::U32(buf.get_u32_le())
            }
            FieldType::Bool => {
                ensure(buf, 1, &truncated)?;
                Value::Bool(buf.get_u8() != 0)
            }
            FieldType::String => {
                let mut raw = read_prefixed(buf, &truncated)?;
                if raw.last() == Some(&0) {
                    raw.pop();
                }
                Value::String(WireString::from(raw))
            }
            FieldType::Bytes => Value::Bytes(read_prefixed(buf, &truncated)?),
        };
        values.push(value);
    }
    Ok(values)
}

fn ensure(buf: &impl Buf, n: usize, truncated: &SchemaError) -> Result<(), SchemaError> {
    if buf.remaining() < n {
        return Err(truncated.clone());
    }
    Ok(())
}

fn read_prefixed(buf: &mut impl Buf, truncated: &SchemaError) -> Result<Vec<u8>, SchemaError> {
    ensure(buf, 4, truncated)?;
    let len = buf.get_u32_le() as usize;
    ensure(buf, len, truncated)?;
    let mut raw = vec![0u8; len];
    buf.copy_to_slice(&mut raw);
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    const SAMPLE: &[FieldDef] = &[
        FieldDef::new("a", FieldType::U8),
        FieldDef::new("b", FieldType::U16),
        FieldDef::new("c", FieldType::U32),
        FieldDef::new("d", FieldType::Bool),
        FieldDef::new("e", FieldType::String),
        FieldDef::new("f", FieldType::Bytes),
    ];

    fn sample_values() -> Vec<Value> {
        vec![
            Value::U8(0x11),
            Value::U16(0x2233),
            Value::U32(0x4455_6677),
            Value::Bool(true),
            Value::String("hi".into()),
            Value::Bytes(vec![9, 8]),
        ]
    }

    #[test]
    fn test_encode_layout_is_little_endian() {
        let mut buf = BytesMut::new();
        encode_values(SAMPLE, &sample_values(), &mut buf).unwrap();

        let expected: &[u8] = &[
            0x11, // u8
            0x33, 0x22, // u16
            0x77, 0x66, 0x55, 0x44, // u32
            0x01, // bool
            3, 0, 0, 0, b'h', b'i', 0, // string + NUL
            2, 0, 0, 0, 9, 8, // bytes
        ];
        assert_eq!(&buf[..], expected);
    }

    #[test]
    fn test_decode_reverses_encode() {
        let mut buf = BytesMut::new();
        encode_values(SAMPLE, &sample_values(), &mut buf).unwrap();
        let mut bytes = buf.freeze();
        let decoded = decode_values(SAMPLE, &mut bytes).unwrap();
        assert_eq!(decoded, sample_values());
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_string_keeps_existing_nul() {
        let schema = &[FieldDef::new("s", FieldType::String)];
        let mut buf = BytesMut::new();
        encode_values(schema, &[Value::String("ok\0".into())], &mut buf).unwrap();
        assert_eq!(&buf[..], &[3, 0, 0, 0, b'o', b'k', 0]);
    }

    #[test]
    fn test_empty_string_is_single_nul() {
        let schema = &[FieldDef::new("s", FieldType::String)];
        let mut buf = BytesMut::new();
        encode_values(schema, &[Value::String(WireString::new())], &mut buf).unwrap();
        assert_eq!(&buf[..], &[1, 0, 0, 0, 0]);

        let decoded = decode_values(schema, &mut buf.freeze()).unwrap();
        assert_eq!(decoded, vec![Value::String(WireString::new())]);
    }

    #[test]
    fn test_decode_string_without_nul() {
        let schema = &[FieldDef::new("s", FieldType::String)];
        let mut raw: &[u8] = &[2, 0, 0, 0, b'y', b'o'];
        let decoded = decode_values(schema, &mut raw).unwrap();
        assert_eq!(decoded, vec![Value::String("yo".into())]);
    }

    #[test]
    fn test_non_utf8_string_relays_unchanged() {
        // "Grüße" in Windows-1252
        let schema = &[FieldDef::new("s", FieldType::String)];
        let wire: &[u8] = &[6, 0, 0, 0, 0x47, 0x72, 0xFC, 0xDF, 0x65, 0];
        let mut raw = wire;
        let decoded = decode_values(schema, &mut raw).unwrap();
        assert_eq!(
            decoded,
            vec![Value::String(WireString::from(&wire[4..9]))]
        );

        let mut buf = BytesMut::new();
        encode_values(schema, &decoded, &mut buf).unwrap();
        assert_eq!(&buf[..], wire);
    }

    #[test]
    fn test_decode_truncated_scalar() {
        let schema = &[FieldDef::new("n", FieldType::U32)];
        let mut raw: &[u8] = &[1, 2, 3];
        let err = decode_values(schema, &mut raw).unwrap_err();
        assert_eq!(
            err,
            SchemaError::Truncated {
                field: "n",
                field_type: FieldType::U32
            }
        );
    }

    #[test]
    fn test_decode_length_prefix_past_end() {
        let schema = &[FieldDef::new("blob", FieldType::Bytes)];
        let mut raw: &[u8] = &[10, 0, 0, 0, 1, 2];
        let err = decode_values(schema, &mut raw).unwrap_err();
        assert!(matches!(err, SchemaError::Truncated { field: "blob", .. }));
    }

    #[test]
    fn test_decode_leaves_trailing_bytes() {
        let schema = &[FieldDef::new("a", FieldType::U8)];
        let mut raw: &[u8] = &[1, 2, 3];
        let decoded = decode_values(schema, &mut raw).unwrap();
        assert_eq!(decoded, vec![Value::U8(1)]);
        assert_eq!(raw, &[2, 3]);
    }

    #[test]
    fn test_encode_type_mismatch() {
        let schema = &[FieldDef::new("flag", FieldType::Bool)];
        let mut buf = BytesMut::new();
        let err = encode_values(schema, &[Value::U8(1)], &mut buf).unwrap_err();
        assert_eq!(
            err,
            SchemaError::TypeMismatch {
                field: "flag",
                expected: FieldType::Bool,
                actual: FieldType::U8
            }
        );
    }

    #[test]
    fn test_encode_field_count_mismatch() {
        let mut buf = BytesMut::new();
        let err = encode_values(SAMPLE, &[Value::U8(1)], &mut buf).unwrap_err();
        assert_eq!(
            err,
            SchemaError::FieldCount {
                expected: 6,
                actual: 1
            }
        );
    }

    #[test]
    fn test_bool_nonzero_decodes_true() {
        let schema = &[FieldDef::new("b", FieldType::Bool)];
        let mut raw: &[u8] = &[7];
        assert_eq!(
            decode_values(schema, &mut raw).unwrap(),
            vec![Value::Bool(true)]
        );
    }
}
