//! Transport layer for the S2 lobby.
//!
//! - [`Transport`] / [`Connection`]: accept loop abstraction, with the
//!   TCP implementation in [`TcpTransport`].
//! - [`frame`]: the 28-byte frame header, [`read_frame`] and
//!   [`write_frame`], and the [`Checksum`] collaborator.
//! - [`Outbox`]: the serialized per-connection write path.

#![allow(async_fn_in_trait)]

mod error;
pub mod frame;
mod outbox;
mod tcp;

pub use error::{FrameError, TransportError};
pub use frame::{
    CLIENT_ID, Checksum, Direction, FRAME_MAGIC, Frame, FrameHeader, FrameType, HEADER_SIZE,
    MAX_PAYLOAD_SIZE, SERVER_DEST_ID, SERVER_ID, WordSumChecksum, read_frame, read_frame_from,
    write_frame,
};
pub use outbox::{OutboundFrame, Outbox, OutboxReceiver};
pub use tcp::{TcpConnection, TcpTransport};

use std::fmt;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// The address the transport is listening on.
    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

/// An accepted byte stream.
///
/// The session reads from one half on its own task while the outbox writer
/// owns the other, so connections are consumed by [`into_split`](Self::into_split).
pub trait Connection: Send + 'static {
    /// Read half.
    type Reader: AsyncRead + Unpin + Send + 'static;
    /// Write half.
    type Writer: AsyncWrite + Unpin + Send + 'static;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// The remote peer's address.
    fn peer_addr(&self) -> SocketAddr;

    /// The local address the peer connected to.
    fn local_addr(&self) -> SocketAddr;

    /// Splits the connection into independently owned halves.
    fn into_split(self) -> (Self::Reader, Self::Writer);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_hash_works_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ConnectionId::new(1), "alice");
        map.insert(ConnectionId::new(2), "bob");
        assert_eq!(map[&ConnectionId::new(1)], "alice");
    }
}
