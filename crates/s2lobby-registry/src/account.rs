//! Accounts: one per logged-in connection.

use s2lobby_protocol::{RoomId, UserId, WireString};
use s2lobby_transport::{ConnectionId, Outbox};

/// A class of broadcast an account can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Observer {
    /// Global chat lines.
    Chat,
    /// Login and logout notices.
    Logins,
    /// Room snapshots and removals.
    RoomList,
}

/// Per-account subscription flags. All off after login.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Observers {
    pub chat: bool,
    pub logins: bool,
    pub room_list: bool,
}

impl Observers {
    pub fn get(&self, observer: Observer) -> bool {
        match observer {
            Observer::Chat => self.chat,
            Observer::Logins => self.logins,
            Observer::RoomList => self.room_list,
        }
    }

    pub fn set(&mut self, observer: Observer, on: bool) {
        match observer {
            Observer::Chat => self.chat = on,
            Observer::Logins => self.logins = on,
            Observer::RoomList => self.room_list = on,
        }
    }
}

/// A logged-in user.
///
/// The registry hands out clones; `outbox` is the account's write path,
/// so a clone is enough to deliver to it.
#[derive(Debug, Clone)]
pub struct Account {
    pub name: WireString,
    pub conn: ConnectionId,
    pub uid: UserId,
    pub observers: Observers,
    /// Another account's room this account is a player in. Never the
    /// account's own room, where the owner is seated implicitly.
    pub joined_room: Option<RoomId>,
    pub outbox: Outbox,
}
