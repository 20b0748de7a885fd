//! Game rooms ("servers" on the wire).

use s2lobby_protocol::{RoomId, UserId, WireString};
use s2lobby_transport::ConnectionId;

/// The descriptive part of a room, as supplied by its owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomSettings {
    pub name: WireString,
    pub description: WireString,
    /// Address clients connect to; chosen by the lobby, not the owner.
    pub ip: WireString,
    pub port: u32,
    pub server_type: u8,
    pub lobby_id: u32,
    pub version: WireString,
    pub max_players: u8,
    pub ai_players: u8,
    pub level: u8,
    pub game_mode: u8,
    pub hardcore: bool,
    pub map: WireString,
    pub automatic_join: bool,
    pub data: Vec<u8>,
}

/// A hosted room. Snapshots handed out by the registry are clones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: RoomId,
    pub owner: ConnectionId,
    pub owner_uid: UserId,
    pub settings: RoomSettings,
    pub running: bool,
    /// Opaque client flags, stored and echoed unchanged.
    pub property_mask: u32,
    players: Vec<ConnectionId>,
}

impl Room {
    pub(crate) fn new(
        id: RoomId,
        owner: ConnectionId,
        owner_uid: UserId,
        settings: RoomSettings,
    ) -> Self {
        Self {
            id,
            owner,
            owner_uid,
            settings,
            running: false,
            property_mask: 0,
            players: vec![owner],
        }
    }

    /// Players in join order; the owner is always first.
    pub fn players(&self) -> &[ConnectionId] {
        &self.players
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn has_player(&self, conn: ConnectionId) -> bool {
        self.players.contains(&conn)
    }

    /// No free slot left: human players plus AI slots reach the maximum.
    pub fn is_full(&self) -> bool {
        self.players.len() + usize::from(self.settings.ai_players)
            >= usize::from(self.settings.max_players)
    }

    /// Adds `conn` unless already present. Returns whether it was added.
    pub(crate) fn insert_player(&mut self, conn: ConnectionId) -> bool {
        if self.has_player(conn) {
            return false;
        }
        self.players.push(conn);
        true
    }

    /// Removes `conn`. The owner keeps its seat for the life of the room.
    pub(crate) fn remove_player(&mut self, conn: ConnectionId) -> bool {
        if conn == self.owner {
            return false;
        }
        let before = self.players.len();
        self.players.retain(|p| *p != conn);
        self.players.len() != before
    }
}
