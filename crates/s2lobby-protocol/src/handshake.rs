//! Fixed-layout handshake payloads.
//!
//! Both directions use the same 52-byte record:
//! `magic: u32, endpoint_id: u32, username: [u8; 32], password: [u8; 8], unknown: u32`.
//! In `HandshakeConnect` the endpoint id is the client's source id; in the
//! `HandshakeConnected` reply it is echoed back as the destination id.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Size of a handshake payload in bytes.
pub const HANDSHAKE_SIZE: usize = 52;

/// Magic carried inside the handshake payload (same value as the frame magic).
pub const HANDSHAKE_MAGIC: u32 = 0xDABA_FBEF;

/// Password field the server returns in every reply.
pub const PASSWORD_MARKER: [u8; 8] = [0x2D, 0, 0, 0, 0, 0, 0, 0];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub magic: u32,
    pub endpoint_id: u32,
    pub username: [u8; 32],
    pub password: [u8; 8],
    pub unknown: u32,
}

impl Handshake {
    /// A client-side handshake. Longer names are cut to 31 bytes so the
    /// field stays NUL-terminated.
    pub fn connect(source_id: u32, username: &str, password: &str) -> Self {
        Self {
            magic: HANDSHAKE_MAGIC,
            endpoint_id: source_id,
            username: padded(username.as_bytes()),
            password: padded(password.as_bytes()),
            unknown: 0,
        }
    }

    /// The server's `HandshakeConnected` payload for this handshake.
    pub fn reply(&self) -> Self {
        Self {
            magic: HANDSHAKE_MAGIC,
            endpoint_id: self.endpoint_id,
            username: self.username,
            password: PASSWORD_MARKER,
            unknown: 0,
        }
    }

    /// Parses a handshake payload.
    ///
    /// # Errors
    /// [`ProtocolError::HandshakeSize`] unless `payload` is exactly
    /// [`HANDSHAKE_SIZE`] bytes.
    pub fn decode(mut payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() != HANDSHAKE_SIZE {
            return Err(ProtocolError::HandshakeSize {
                expected: HANDSHAKE_SIZE,
                actual: payload.len(),
            });
        }
        let magic = payload.get_u32_le();
        let endpoint_id = payload.get_u32_le();
        let mut username = [0u8; 32];
        payload.copy_to_slice(&mut username);
        let mut password = [0u8; 8];
        payload.copy_to_slice(&mut password);
        let unknown = payload.get_u32_le();
        Ok(Self {
            magic,
            endpoint_id,
            username,
            password,
            unknown,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HANDSHAKE_SIZE);
        buf.put_u32_le(self.magic);
        buf.put_u32_le(self.endpoint_id);
        buf.put_slice(&self.username);
        buf.put_slice(&self.password);
        buf.put_u32_le(self.unknown);
        buf.freeze()
    }

    /// The username up to the first NUL.
    pub fn username(&self) -> String {
        c_str(&self.username)
    }
}

fn padded<const N: usize>(src: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    let len = src.len().min(N - 1);
    out[..len].copy_from_slice(&src[..len]);
    out
}

fn c_str(raw: &[u8]) -> String {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
