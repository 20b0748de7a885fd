//! The outer transport frame: a fixed 28-byte little-endian header
//! followed by at most [`MAX_PAYLOAD_SIZE`] payload bytes.
//!
//! ```text
//! offset  field             notes
//! 0       magic: u32        FRAME_MAGIC
//! 4       source_id: u32    CLIENT_ID on inbound, SERVER_ID on outbound
//! 8       dest_id: u32      SERVER_ID on inbound, SERVER_DEST_ID on outbound
//! 12      frame_type: u32   see FrameType
//! 16      reserved: u32     always 0 on outbound
//! 20      payload_size: u32 <= MAX_PAYLOAD_SIZE
//! 24      checksum: u32     Checksum::checksum(payload)
//! ```
//!
//! Reading validates the header before touching the payload, so a
//! rejected frame never consumes more than [`HEADER_SIZE`] bytes.

use std::fmt;

use bytes::{Buf, BufMut, Bytes};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::FrameError;

/// Magic value that opens every frame header.
pub const FRAME_MAGIC: u32 = 0xDABA_FBEF;

/// Endpoint id the game client stamps into `source_id`.
pub const CLIENT_ID: u32 = 0xEFFF_FFEE;

/// Endpoint id of the lobby server.
pub const SERVER_ID: u32 = 0xEFFF_FFCC;

/// `dest_id` the server writes on every outbound frame.
pub const SERVER_DEST_ID: u32 = 3;

/// Size of the encoded header in bytes.
pub const HEADER_SIZE: usize = 28;

/// Largest payload a frame may declare.
pub const MAX_PAYLOAD_SIZE: u32 = 1024;

// ---------------------------------------------------------------------------
// Checksum collaborator
// ---------------------------------------------------------------------------

/// Deterministic payload checksum stamped into every frame header.
///
/// The game client's algorithm is not part of this crate. Deployments
/// that need wire compatibility with the retail client plug in the
/// matching implementation; everything else in the lobby is agnostic to
/// which one is used.
pub trait Checksum: Send + Sync + 'static {
    /// Computes the checksum of a frame payload.
    fn checksum(&self, payload: &[u8]) -> u32;
}

/// Placeholder [`Checksum`]: wrapping sum of the payload read as
/// little-endian `u32` words, with a short tail zero-padded.
///
/// This is NOT the retail client's algorithm. It exists so the server and
/// test clients agree with each other.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordSumChecksum;

impl Checksum for WordSumChecksum {
    fn checksum(&self, payload: &[u8]) -> u32 {
        let mut chunks = payload.chunks_exact(4);
        let mut sum = chunks.by_ref().fold(0u32, |acc, word| {
            acc.wrapping_add(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
        });
        let tail = chunks.remainder();
        if !tail.is_empty() {
            let mut word = [0u8; 4];
            word[..tail.len()].copy_from_slice(tail);
            sum = sum.wrapping_add(u32::from_le_bytes(word));
        }
        sum
    }
}

// ---------------------------------------------------------------------------
// FrameType
// ---------------------------------------------------------------------------

/// The frame types the lobby protocol defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum FrameType {
    /// Carries one application message (envelope + record).
    ApplicationMessage = 2,
    /// Client → server: first frame of a connection.
    HandshakeConnect = 3,
    /// Server → client: handshake accepted.
    HandshakeConnected = 5,
    /// Keep-alive. The payload is ignored.
    Ping = 11,
}

impl FrameType {
    /// Maps a raw header value to a known frame type.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            2 => Some(Self::ApplicationMessage),
            3 => Some(Self::HandshakeConnect),
            5 => Some(Self::HandshakeConnected),
            11 => Some(Self::Ping),
            _ => None,
        }
    }

    /// The raw value written to the header.
    pub fn into_raw(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// FrameHeader
// ---------------------------------------------------------------------------

/// Which side of the connection a frame is travelling from. Decides which
/// endpoint ids a header must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Game client → lobby server.
    ClientToServer,
    /// Lobby server → game client.
    ServerToClient,
}

impl Direction {
    fn endpoint_ids(self) -> (u32, u32) {
        match self {
            Self::ClientToServer => (CLIENT_ID, SERVER_ID),
            Self::ServerToClient => (SERVER_ID, SERVER_DEST_ID),
        }
    }
}

/// A decoded frame header.
///
/// `frame_type` stays raw so that a frame of an unknown type can still be
/// read off the wire and skipped instead of killing the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: u32,
    pub source_id: u32,
    pub dest_id: u32,
    pub frame_type: u32,
    pub reserved: u32,
    pub payload_size: u32,
    pub payload_checksum: u32,
}

impl FrameHeader {
    /// Builds the header for a frame travelling in `direction`.
    pub fn new(
        direction: Direction,
        frame_type: FrameType,
        payload: &[u8],
        checksum: &dyn Checksum,
    ) -> Self {
        let (source_id, dest_id) = direction.endpoint_ids();
        Self {
            magic: FRAME_MAGIC,
            source_id,
            dest_id,
            frame_type: frame_type.into_raw(),
            reserved: 0,
            payload_size: payload.len() as u32,
            payload_checksum: checksum.checksum(payload),
        }
    }

    /// The frame type, if it is one the protocol defines.
    pub fn kind(&self) -> Option<FrameType> {
        FrameType::from_raw(self.frame_type)
    }

    /// Parses a header without validating it.
    pub fn parse(raw: &[u8; HEADER_SIZE]) -> Self {
        let mut buf = &raw[..];
        Self {
            magic: buf.get_u32_le(),
            source_id: buf.get_u32_le(),
            dest_id: buf.get_u32_le(),
            frame_type: buf.get_u32_le(),
            reserved: buf.get_u32_le(),
            payload_size: buf.get_u32_le(),
            payload_checksum: buf.get_u32_le(),
        }
    }

    /// Encodes the header to its wire form.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut raw = [0u8; HEADER_SIZE];
        let mut buf = &mut raw[..];
        buf.put_u32_le(self.magic);
        buf.put_u32_le(self.source_id);
        buf.put_u32_le(self.dest_id);
        buf.put_u32_le(self.frame_type);
        buf.put_u32_le(self.reserved);
        buf.put_u32_le(self.payload_size);
        buf.put_u32_le(self.payload_checksum);
        raw
    }

    /// Checks magic, endpoint ids, and the payload size limit.
    pub fn validate(&self, direction: Direction) -> Result<(), FrameError> {
        let (source_id, dest_id) = direction.endpoint_ids();
        if self.magic != FRAME_MAGIC {
            return Err(FrameError::BadMagic(self.magic));
        }
        if self.source_id != source_id {
            return Err(FrameError::BadSource(self.source_id));
        }
        if self.dest_id != dest_id {
            return Err(FrameError::BadDestination(self.dest_id));
        }
        if self.payload_size > MAX_PAYLOAD_SIZE {
            return Err(FrameError::PayloadTooLarge(self.payload_size));
        }
        Ok(())
    }
}

/// A complete frame read off the wire.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    /// Recomputes the payload checksum and compares it with the header.
    pub fn verify_checksum(&self, checksum: &dyn Checksum) -> Result<(), FrameError> {
        let actual = checksum.checksum(&self.payload);
        if actual != self.header.payload_checksum {
            return Err(FrameError::ChecksumMismatch {
                expected: self.header.payload_checksum,
                actual,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Read / write
// ---------------------------------------------------------------------------

/// Reads one client → server frame.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, FrameError>
where
    R: AsyncRead + Unpin,
{
    read_frame_from(reader, Direction::ClientToServer).await
}

/// Reads one frame travelling in `direction`.
///
/// Returns [`FrameError::Closed`] when the stream ends exactly on a frame
/// boundary. EOF anywhere else is an I/O error.
pub async fn read_frame_from<R>(
    reader: &mut R,
    direction: Direction,
) -> Result<Frame, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut raw = [0u8; HEADER_SIZE];
    let mut filled = 0;
    while filled < HEADER_SIZE {
        let n = reader.read(&mut raw[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Err(FrameError::Closed);
            }
            return Err(FrameError::Io(std::io::ErrorKind::UnexpectedEof.into()));
        }
        filled += n;
    }

    let header = FrameHeader::parse(&raw);
    header.validate(direction)?;

    let mut payload = vec![0u8; header.payload_size as usize];
    reader.read_exact(&mut payload).await?;

    Ok(Frame {
        header,
        payload: Bytes::from(payload),
    })
}

/// Writes `header || payload` as a single buffer.
///
/// Callers sharing a stream must serialize calls themselves; the
/// [`Outbox`](crate::Outbox) writer task is the only caller in the server.
pub async fn write_frame<W>(
    writer: &mut W,
    header: &FrameHeader,
    payload: &[u8],
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.to_bytes());
    buf.extend_from_slice(payload);
    writer.write_all(&buf).await?;
    writer.flush().await
}
