//! Error types for the transport layer.

/// Errors that can occur while accepting connections or queueing output.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// A queued payload is larger than one frame can carry.
    #[error("payload of {0} bytes exceeds the frame limit")]
    PayloadTooLarge(usize),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The per-connection outbound queue is full. The owning session has
    /// been asked to disconnect.
    #[error("outbound queue of {0} overflowed")]
    OutboxOverflow(crate::ConnectionId),
}

/// Errors produced while reading or writing a transport frame.
///
/// Every variant except [`FrameError::Closed`] is fatal for the session
/// that produced it: once the header stream is out of sync there is no
/// way to find the next frame boundary again.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The peer closed the stream cleanly before a new header started.
    #[error("stream closed by peer")]
    Closed,

    /// The header magic did not match [`FRAME_MAGIC`](crate::FRAME_MAGIC).
    #[error("invalid frame magic {0:#010x}")]
    BadMagic(u32),

    /// The header's source id is not the expected peer id.
    #[error("invalid source id {0:#010x}")]
    BadSource(u32),

    /// The header's destination id is not the expected local id.
    #[error("invalid destination id {0:#010x}")]
    BadDestination(u32),

    /// The declared payload exceeds [`MAX_PAYLOAD_SIZE`](crate::MAX_PAYLOAD_SIZE).
    #[error("payload size {0} exceeds limit")]
    PayloadTooLarge(u32),

    /// The payload checksum did not match the header.
    #[error("checksum mismatch: header {expected:#010x}, payload {actual:#010x}")]
    ChecksumMismatch {
        /// Value carried in the header.
        expected: u32,
        /// Value computed over the received payload.
        actual: u32,
    },

    /// The underlying stream failed (including EOF in the middle of a frame).
    #[error("frame i/o failed: {0}")]
    Io(#[from] std::io::Error),
}
