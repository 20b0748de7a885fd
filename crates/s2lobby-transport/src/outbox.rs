//! Per-connection write path.
//!
//! Every byte the server sends on a connection goes through that
//! connection's [`Outbox`]: a bounded queue drained by a single writer
//! task. Direct replies from the session task and broadcast notifications
//! from other sessions therefore never interleave on the wire, and each
//! recipient sees frames in the order they were pushed.
//!
//! Pushing never waits. A full queue means the peer is not reading fast
//! enough; the push fails and the owning session is kicked, which bounds
//! memory during broadcast storms.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

use crate::frame::{Checksum, Direction, FrameHeader, FrameType, MAX_PAYLOAD_SIZE, write_frame};
use crate::{ConnectionId, TransportError};

/// A frame waiting in an outbox.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    pub frame_type: FrameType,
    pub payload: Bytes,
}

/// Sending side of a connection's outbound queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Outbox {
    conn_id: ConnectionId,
    tx: mpsc::Sender<OutboundFrame>,
    kick: Arc<Notify>,
}

/// Receiving side of an outbound queue, normally handed to
/// [`OutboxReceiver::spawn_writer`].
#[derive(Debug)]
pub struct OutboxReceiver {
    conn_id: ConnectionId,
    rx: mpsc::Receiver<OutboundFrame>,
    kick: Arc<Notify>,
}

impl Outbox {
    /// Creates a queue holding at most `capacity` frames.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn channel(conn_id: ConnectionId, capacity: usize) -> (Outbox, OutboxReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        let kick = Arc::new(Notify::new());
        (
            Outbox {
                conn_id,
                tx,
                kick: Arc::clone(&kick),
            },
            OutboxReceiver { conn_id, rx, kick },
        )
    }

    /// The connection this outbox writes to.
    pub fn id(&self) -> ConnectionId {
        self.conn_id
    }

    /// Queues a frame without waiting.
    ///
    /// # Errors
    /// - [`TransportError::PayloadTooLarge`] if `payload` exceeds
    ///   [`MAX_PAYLOAD_SIZE`]. Nothing is queued and the connection stays up.
    /// - [`TransportError::OutboxOverflow`] if the queue is full. The
    ///   connection is kicked as a side effect.
    /// - [`TransportError::ConnectionClosed`] if the writer has stopped.
    pub fn push(&self, frame_type: FrameType, payload: Bytes) -> Result<(), TransportError> {
        if payload.len() > MAX_PAYLOAD_SIZE as usize {
            tracing::warn!(
                conn_id = %self.conn_id,
                %frame_type,
                size = payload.len(),
                "refusing oversized frame"
            );
            return Err(TransportError::PayloadTooLarge(payload.len()));
        }
        match self.tx.try_send(OutboundFrame {
            frame_type,
            payload,
        }) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(conn_id = %self.conn_id, "outbound queue full, disconnecting");
                self.kick();
                Err(TransportError::OutboxOverflow(self.conn_id))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TransportError::ConnectionClosed(
                format!("writer for {} has stopped", self.conn_id),
            )),
        }
    }

    /// Asks the session that owns this connection to shut down.
    pub fn kick(&self) {
        self.kick.notify_one();
    }

    /// Resolves once [`kick`](Self::kick) has been called (including calls
    /// made before this future was created).
    pub async fn kicked(&self) {
        self.kick.notified().await;
    }

    /// Returns `true` once the writer side is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl OutboxReceiver {
    /// Takes the next queued frame. `None` once every [`Outbox`] clone has
    /// been dropped and the queue is drained.
    pub async fn recv(&mut self) -> Option<OutboundFrame> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<OutboundFrame> {
        self.rx.try_recv().ok()
    }

    /// Spawns the writer task: drains the queue into `writer`, one whole
    /// frame per write, until every outbox clone is dropped or a write
    /// fails. The stream is shut down on exit.
    pub fn spawn_writer<W>(mut self, mut writer: W, checksum: Arc<dyn Checksum>) -> JoinHandle<()>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(frame) = self.rx.recv().await {
                let header = FrameHeader::new(
                    Direction::ServerToClient,
                    frame.frame_type,
                    &frame.payload,
                    checksum.as_ref(),
                );
                if let Err(e) = write_frame(&mut writer, &header, &frame.payload).await {
                    tracing::debug!(conn_id = %self.conn_id, error = %e, "write failed");
                    self.kick.notify_one();
                    break;
                }
                tracing::trace!(
                    conn_id = %self.conn_id,
                    frame_type = %frame.frame_type,
                    size = frame.payload.len(),
                    " --> frame"
                );
            }
            let _ = writer.shutdown().await;
            tracing::debug!(conn_id = %self.conn_id, "writer stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{WordSumChecksum, read_frame_from};

    #[tokio::test]
    async fn test_push_preserves_order() {
        let (outbox, mut rx) = Outbox::channel(ConnectionId::new(1), 4);
        outbox.push(FrameType::Ping, Bytes::from_static(b"a")).unwrap();
        outbox
            .push(FrameType::ApplicationMessage, Bytes::from_static(b"b"))
            .unwrap();

        assert_eq!(&rx.recv().await.unwrap().payload[..], b"a");
        assert_eq!(&rx.recv().await.unwrap().payload[..], b"b");
    }

    #[tokio::test]
    async fn test_push_overflow_kicks_session() {
        let (outbox, _rx) = Outbox::channel(ConnectionId::new(2), 1);
        outbox.push(FrameType::Ping, Bytes::new()).unwrap();

        let err = outbox.push(FrameType::Ping, Bytes::new()).unwrap_err();
        assert!(matches!(err, TransportError::OutboxOverflow(_)));

        // The kick permit was stored, so this resolves immediately.
        tokio::time::timeout(std::time::Duration::from_secs(1), outbox.kicked())
            .await
            .expect("session should have been kicked");
    }

    #[tokio::test]
    async fn test_push_rejects_oversized_payload() {
        let (outbox, mut rx) = Outbox::channel(ConnectionId::new(5), 4);
        let limit = MAX_PAYLOAD_SIZE as usize;

        let err = outbox
            .push(FrameType::ApplicationMessage, Bytes::from(vec![0; limit + 1]))
            .unwrap_err();
        assert!(matches!(err, TransportError::PayloadTooLarge(n) if n == limit + 1));
        assert!(rx.try_recv().is_none());

        // the connection is still usable and nobody was kicked
        outbox
            .push(FrameType::ApplicationMessage, Bytes::from(vec![0; limit]))
            .unwrap();
        assert_eq!(rx.try_recv().unwrap().payload.len(), limit);
        let kicked = tokio::time::timeout(std::time::Duration::from_millis(50), outbox.kicked());
        assert!(kicked.await.is_err());
    }

    #[tokio::test]
    async fn test_push_after_receiver_dropped_is_closed() {
        let (outbox, rx) = Outbox::channel(ConnectionId::new(3), 1);
        drop(rx);
        assert!(outbox.is_closed());
        let err = outbox.push(FrameType::Ping, Bytes::new()).unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed(_)));
    }

    #[tokio::test]
    async fn test_writer_serializes_concurrent_pushes() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (outbox, rx) = Outbox::channel(ConnectionId::new(4), 256);
        let writer = rx.spawn_writer(server, Arc::new(WordSumChecksum));

        let mut tasks = Vec::new();
        for n in 0..8u8 {
            let outbox = outbox.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..16 {
                    outbox
                        .push(FrameType::ApplicationMessage, Bytes::from(vec![n; 100]))
                        .unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        drop(outbox);
        writer.await.unwrap();

        let mut reader = client;
        let mut frames = 0;
        while let Ok(frame) = read_frame_from(&mut reader, Direction::ServerToClient).await {
            frame.verify_checksum(&WordSumChecksum).unwrap();
            let first = frame.payload[0];
            assert!(frame.payload.iter().all(|b| *b == first));
            frames += 1;
        }
        assert_eq!(frames, 8 * 16);
    }
}
