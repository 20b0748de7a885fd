//! Error types for the registry.

use s2lobby_protocol::RoomId;
use s2lobby_transport::ConnectionId;

/// Errors returned by [`LobbyRegistry`](crate::LobbyRegistry) operations.
///
/// These report state, not policy: the session layer decides which of
/// them become an in-band result code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The connection already has an account.
    #[error("{0} already has an account")]
    AccountExists(ConnectionId),

    /// No account is registered for the connection.
    #[error("no account for {0}")]
    NoAccount(ConnectionId),

    /// The connection already owns a room.
    #[error("{0} already owns a room")]
    RoomExists(ConnectionId),

    /// No room with this id.
    #[error("{0} not found")]
    RoomNotFound(RoomId),

    /// Joining would exceed the room's capacity.
    #[error("{0} is full")]
    RoomFull(RoomId),

    /// The owner tried to give up its own seat.
    #[error("owner cannot leave {0}")]
    OwnerSeat(RoomId),

    /// The connection is not in the room's player set.
    #[error("{conn} is not a player in {room}")]
    NotInRoom { room: RoomId, conn: ConnectionId },
}
