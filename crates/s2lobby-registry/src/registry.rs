//! The lobby registry: every logged-in account and every hosted room.
//!
//! # Concurrency
//!
//! All directories sit behind one [`RwLock`]. Broadcast fan-out and
//! lookups take the read side; login, logout, and room changes take the
//! write side. Cascades (an owner's logout removing its room, a room's
//! removal clearing its players' `joined_room`) happen under a single
//! write guard, so no reader ever sees a half-applied change.
//!
//! Id counters are separate atomics. Ids start at 1 and are never reused
//! while the process runs.
//!
//! The registry enforces no policy. Who may edit or remove a room is
//! decided by the session before it calls in here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use s2lobby_protocol::{RoomId, UserId, WireString};
use s2lobby_transport::{ConnectionId, Outbox};
use tokio::sync::RwLock;

use crate::{Account, Observer, Observers, RegistryError, Room, RoomSettings};

/// Shared store of accounts and rooms. Wrap in an `Arc` and hand to every
/// session.
#[derive(Debug, Default)]
pub struct LobbyRegistry {
    inner: RwLock<Directories>,
    last_uid: AtomicU32,
    last_room_id: AtomicU32,
}

#[derive(Debug, Default)]
struct Directories {
    accounts: HashMap<ConnectionId, Account>,
    /// Rooms keyed by owning connection; one room per owner.
    rooms: HashMap<ConnectionId, Room>,
    /// Secondary index: room id to owner.
    room_owners: HashMap<RoomId, ConnectionId>,
}

/// Everything a logout took with it.
#[derive(Debug)]
pub struct Departure {
    pub account: Account,
    /// The room the account owned, now gone.
    pub owned_room: Option<Room>,
    /// Another room the account was a player in, after its removal.
    pub left_room: Option<Room>,
}

/// Outcome of [`LobbyRegistry::join_room`].
#[derive(Debug)]
pub struct Joined {
    /// The room joined, after the insert.
    pub room: Room,
    /// The room whose seat was given up, after the removal.
    pub left: Option<Room>,
}

/// Point-in-time counters for the periodic stats log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub users: usize,
    pub last_uid: u32,
    pub rooms: usize,
}

impl LobbyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Accounts ───────────────────────────────────────────────────

    /// Registers an account for `conn` and issues its uid.
    ///
    /// # Errors
    /// [`RegistryError::AccountExists`] if `conn` already has one. No uid
    /// is consumed in that case.
    pub async fn add_account(
        &self,
        conn: ConnectionId,
        name: impl Into<WireString>,
        outbox: Outbox,
    ) -> Result<UserId, RegistryError> {
        let mut dirs = self.inner.write().await;
        if dirs.accounts.contains_key(&conn) {
            return Err(RegistryError::AccountExists(conn));
        }

        let uid = UserId(self.last_uid.fetch_add(1, Ordering::SeqCst) + 1);
        let account = Account {
            name: name.into(),
            conn,
            uid,
            observers: Observers::default(),
            joined_room: None,
            outbox,
        };
        dirs.accounts.insert(conn, account);
        Ok(uid)
    }

    /// Removes the account for `conn`, the room it owns, and its seat in
    /// any other room. `None` if there was no account.
    pub async fn remove_account(&self, conn: ConnectionId) -> Option<Departure> {
        let mut dirs = self.inner.write().await;
        let account = dirs.accounts.remove(&conn)?;

        let owned_room = dirs.take_room(conn);
        let left_room = account.joined_room.and_then(|id| {
            let room = dirs.room_by_id_mut(id)?;
            room.remove_player(conn);
            Some(room.clone())
        });

        Some(Departure {
            account,
            owned_room,
            left_room,
        })
    }

    pub async fn account(&self, conn: ConnectionId) -> Option<Account> {
        self.inner.read().await.accounts.get(&conn).cloned()
    }

    /// All accounts, ordered by uid.
    pub async fn list_accounts(&self) -> Vec<Account> {
        let dirs = self.inner.read().await;
        let mut accounts: Vec<Account> = dirs.accounts.values().cloned().collect();
        accounts.sort_by_key(|a| a.uid);
        accounts
    }

    /// Turns one subscription on or off.
    ///
    /// # Errors
    /// [`RegistryError::NoAccount`] if `conn` is not logged in.
    pub async fn set_observer(
        &self,
        conn: ConnectionId,
        observer: Observer,
        on: bool,
    ) -> Result<(), RegistryError> {
        let mut dirs = self.inner.write().await;
        let account = dirs
            .accounts
            .get_mut(&conn)
            .ok_or(RegistryError::NoAccount(conn))?;
        account.observers.set(observer, on);
        Ok(())
    }

    /// Snapshot of every account subscribed to `observer`, ordered by uid.
    pub async fn observers(&self, observer: Observer) -> Vec<Account> {
        let dirs = self.inner.read().await;
        let mut accounts: Vec<Account> = dirs
            .accounts
            .values()
            .filter(|a| a.observers.get(observer))
            .cloned()
            .collect();
        accounts.sort_by_key(|a| a.uid);
        accounts
    }

    // ── Rooms ──────────────────────────────────────────────────────

    /// Creates a room owned by `conn` with the owner as its only player.
    ///
    /// # Errors
    /// [`RegistryError::RoomExists`] if `conn` already owns a room.
    pub async fn add_room(
        &self,
        conn: ConnectionId,
        owner_uid: UserId,
        settings: RoomSettings,
    ) -> Result<Room, RegistryError> {
        let mut dirs = self.inner.write().await;
        if dirs.rooms.contains_key(&conn) {
            return Err(RegistryError::RoomExists(conn));
        }

        let id = RoomId(self.last_room_id.fetch_add(1, Ordering::SeqCst) + 1);
        let room = Room::new(id, conn, owner_uid, settings);
        dirs.room_owners.insert(id, conn);
        dirs.rooms.insert(conn, room.clone());
        Ok(room)
    }

    /// Removes the room owned by `conn`, clearing every player's seat.
    pub async fn remove_room(&self, conn: ConnectionId) -> Option<Room> {
        self.inner.write().await.take_room(conn)
    }

    /// The room owned by `conn`.
    pub async fn get_room(&self, conn: ConnectionId) -> Option<Room> {
        self.inner.read().await.rooms.get(&conn).cloned()
    }

    pub async fn get_room_by_id(&self, id: RoomId) -> Option<Room> {
        let dirs = self.inner.read().await;
        let owner = dirs.room_owners.get(&id)?;
        dirs.rooms.get(owner).cloned()
    }

    /// All rooms, ordered by id.
    pub async fn list_rooms(&self) -> Vec<Room> {
        let dirs = self.inner.read().await;
        let mut rooms: Vec<Room> = dirs.rooms.values().cloned().collect();
        rooms.sort_by_key(|r| r.id);
        rooms
    }

    /// Applies `edit` to the room owned by `conn` and returns the result.
    ///
    /// `edit` runs under the write lock and must not block.
    pub async fn update_room<F>(&self, conn: ConnectionId, edit: F) -> Option<Room>
    where
        F: FnOnce(&mut Room),
    {
        let mut dirs = self.inner.write().await;
        let room = dirs.rooms.get_mut(&conn)?;
        edit(room);
        Some(room.clone())
    }

    // ── Players ────────────────────────────────────────────────────

    /// Seats `conn` in room `id`. The capacity check and the insert are
    /// one step, so concurrent joins cannot overfill a room. Joining a
    /// room one is already in succeeds without change.
    ///
    /// # Errors
    /// [`RegistryError::RoomNotFound`] or [`RegistryError::RoomFull`].
    pub async fn add_player(&self, id: RoomId, conn: ConnectionId) -> Result<Room, RegistryError> {
        let mut dirs = self.inner.write().await;
        let room = dirs
            .room_by_id_mut(id)
            .ok_or(RegistryError::RoomNotFound(id))?;

        if !room.has_player(conn) {
            if room.is_full() {
                return Err(RegistryError::RoomFull(id));
            }
            room.insert_player(conn);
        }
        let snapshot = room.clone();

        if snapshot.owner != conn {
            if let Some(account) = dirs.accounts.get_mut(&conn) {
                account.joined_room = Some(id);
            }
        }
        Ok(snapshot)
    }

    /// Moves `conn` into room `id`, giving up its seat in the room it
    /// joined before. Nothing changes unless the new seat is taken, so a
    /// failed join leaves the old seat in place. An owner moving into
    /// another room keeps its own seat.
    ///
    /// # Errors
    /// [`RegistryError::RoomNotFound`] or [`RegistryError::RoomFull`].
    pub async fn join_room(&self, id: RoomId, conn: ConnectionId) -> Result<Joined, RegistryError> {
        let mut dirs = self.inner.write().await;
        let room = dirs
            .room_by_id_mut(id)
            .ok_or(RegistryError::RoomNotFound(id))?;
        if !room.has_player(conn) {
            if room.is_full() {
                return Err(RegistryError::RoomFull(id));
            }
            room.insert_player(conn);
        }
        let joined = room.clone();

        let previous = dirs.accounts.get(&conn).and_then(|a| a.joined_room);
        let left = previous.filter(|prev| *prev != id).and_then(|prev| {
            let room = dirs.room_by_id_mut(prev)?;
            room.remove_player(conn);
            Some(room.clone())
        });

        if let Some(account) = dirs.accounts.get_mut(&conn) {
            account.joined_room = (joined.owner != conn).then_some(id);
        }
        Ok(Joined { room: joined, left })
    }

    /// Removes `conn` from room `id`.
    ///
    /// # Errors
    /// [`RegistryError::RoomNotFound`], [`RegistryError::OwnerSeat`] for
    /// the room's owner, or [`RegistryError::NotInRoom`].
    pub async fn remove_player(
        &self,
        id: RoomId,
        conn: ConnectionId,
    ) -> Result<Room, RegistryError> {
        let mut dirs = self.inner.write().await;
        let room = dirs
            .room_by_id_mut(id)
            .ok_or(RegistryError::RoomNotFound(id))?;
        if room.owner == conn {
            return Err(RegistryError::OwnerSeat(id));
        }
        if !room.remove_player(conn) {
            return Err(RegistryError::NotInRoom { room: id, conn });
        }
        let snapshot = room.clone();

        if let Some(account) = dirs.accounts.get_mut(&conn) {
            if account.joined_room == Some(id) {
                account.joined_room = None;
            }
        }
        Ok(snapshot)
    }

    pub async fn player_count(&self, id: RoomId) -> Option<usize> {
        self.get_room_by_id(id).await.map(|r| r.player_count())
    }

    /// `None` if the room does not exist.
    pub async fn is_full(&self, id: RoomId) -> Option<bool> {
        self.get_room_by_id(id).await.map(|r| r.is_full())
    }

    pub async fn stats(&self) -> RegistryStats {
        let dirs = self.inner.read().await;
        RegistryStats {
            users: dirs.accounts.len(),
            last_uid: self.last_uid.load(Ordering::SeqCst),
            rooms: dirs.rooms.len(),
        }
    }
}

impl Directories {
    fn room_by_id_mut(&mut self, id: RoomId) -> Option<&mut Room> {
        let owner = self.room_owners.get(&id)?;
        self.rooms.get_mut(owner)
    }

    fn take_room(&mut self, owner: ConnectionId) -> Option<Room> {
        let room = self.rooms.remove(&owner)?;
        self.room_owners.remove(&room.id);
        for conn in room.players() {
            if let Some(account) = self.accounts.get_mut(conn) {
                if account.joined_room == Some(room.id) {
                    account.joined_room = None;
                }
            }
        }
        tracing::debug!(room_id = %room.id, %owner, "room removed");
        Some(room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbox(n: u64) -> Outbox {
        Outbox::channel(ConnectionId::new(n), 4).0
    }

    #[tokio::test]
    async fn test_uids_start_at_one_and_increase() {
        let reg = LobbyRegistry::new();
        let a = reg
            .add_account(ConnectionId::new(1), "a", outbox(1))
            .await
            .unwrap();
        let b = reg
            .add_account(ConnectionId::new(2), "b", outbox(2))
            .await
            .unwrap();
        assert_eq!(a, UserId(1));
        assert_eq!(b, UserId(2));
    }

    #[tokio::test]
    async fn test_duplicate_account_does_not_burn_uid() {
        let reg = LobbyRegistry::new();
        let conn = ConnectionId::new(1);
        reg.add_account(conn, "a", outbox(1)).await.unwrap();
        let err = reg.add_account(conn, "a", outbox(1)).await.unwrap_err();
        assert_eq!(err, RegistryError::AccountExists(conn));

        let next = reg
            .add_account(ConnectionId::new(2), "b", outbox(2))
            .await
            .unwrap();
        assert_eq!(next, UserId(2));
    }

    #[tokio::test]
    async fn test_add_room_seats_owner() {
        let reg = LobbyRegistry::new();
        let conn = ConnectionId::new(1);
        let uid = reg.add_account(conn, "host", outbox(1)).await.unwrap();
        let room = reg
            .add_room(conn, uid, RoomSettings::default())
            .await
            .unwrap();

        assert_eq!(room.id, RoomId(1));
        assert_eq!(room.players(), &[conn]);
        assert_eq!(reg.account(conn).await.unwrap().joined_room, None);
        assert_eq!(
            reg.add_room(conn, uid, RoomSettings::default()).await,
            Err(RegistryError::RoomExists(conn))
        );
    }

    #[tokio::test]
    async fn test_remove_room_clears_joined_room() {
        let reg = LobbyRegistry::new();
        let (host, guest) = (ConnectionId::new(1), ConnectionId::new(2));
        let uid = reg.add_account(host, "host", outbox(1)).await.unwrap();
        reg.add_account(guest, "guest", outbox(2)).await.unwrap();
        let settings = RoomSettings {
            max_players: 4,
            ..Default::default()
        };
        let room = reg.add_room(host, uid, settings).await.unwrap();
        reg.add_player(room.id, guest).await.unwrap();

        let removed = reg.remove_room(host).await.unwrap();
        assert_eq!(removed.player_count(), 2);
        assert_eq!(reg.account(guest).await.unwrap().joined_room, None);
        assert!(reg.get_room_by_id(room.id).await.is_none());
    }

    #[tokio::test]
    async fn test_owner_keeps_its_seat() {
        let reg = LobbyRegistry::new();
        let (host, guest) = (ConnectionId::new(1), ConnectionId::new(2));
        let uid = reg.add_account(host, "host", outbox(1)).await.unwrap();
        reg.add_account(guest, "guest", outbox(2)).await.unwrap();
        let settings = RoomSettings {
            max_players: 1,
            ..Default::default()
        };
        let room = reg.add_room(host, uid, settings).await.unwrap();

        assert_eq!(
            reg.remove_player(room.id, host).await,
            Err(RegistryError::OwnerSeat(room.id))
        );
        assert_eq!(reg.player_count(room.id).await, Some(1));
        assert_eq!(
            reg.join_room(room.id, guest).await.unwrap_err(),
            RegistryError::RoomFull(room.id)
        );
    }

    #[tokio::test]
    async fn test_failed_join_keeps_previous_seat() {
        let reg = LobbyRegistry::new();
        let (a, b, guest) = (
            ConnectionId::new(1),
            ConnectionId::new(2),
            ConnectionId::new(3),
        );
        let uid_a = reg.add_account(a, "a", outbox(1)).await.unwrap();
        let uid_b = reg.add_account(b, "b", outbox(2)).await.unwrap();
        reg.add_account(guest, "guest", outbox(3)).await.unwrap();
        let open = reg
            .add_room(a, uid_a, RoomSettings {
                    max_players: 4,
                    ..Default::default()
                })
            .await
            .unwrap();
        let full = reg
            .add_room(b, uid_b, RoomSettings {
                    max_players: 1,
                    ..Default::default()
                })
            .await
            .unwrap();
        reg.join_room(open.id, guest).await.unwrap();

        assert_eq!(
            reg.join_room(full.id, guest).await.unwrap_err(),
            RegistryError::RoomFull(full.id)
        );
        assert!(reg.get_room_by_id(open.id).await.unwrap().has_player(guest));
        assert_eq!(reg.account(guest).await.unwrap().joined_room, Some(open.id));
    }

    #[tokio::test]
    async fn test_join_room_moves_seat() {
        let reg = LobbyRegistry::new();
        let (a, b, guest) = (
            ConnectionId::new(1),
            ConnectionId::new(2),
            ConnectionId::new(3),
        );
        let uid_a = reg.add_account(a, "a", outbox(1)).await.unwrap();
        let uid_b = reg.add_account(b, "b", outbox(2)).await.unwrap();
        reg.add_account(guest, "guest", outbox(3)).await.unwrap();
        let settings = RoomSettings {
            max_players: 4,
            ..Default::default()
        };
        let first = reg.add_room(a, uid_a, settings.clone()).await.unwrap();
        let second = reg.add_room(b, uid_b, settings).await.unwrap();

        assert!(reg.join_room(first.id, guest).await.unwrap().left.is_none());
        let moved = reg.join_room(second.id, guest).await.unwrap();
        assert_eq!(moved.room.player_count(), 2);
        assert_eq!(moved.left.unwrap().players(), &[a]);

        // the owner of `first` visits `second` without giving up its own room
        let visit = reg.join_room(second.id, a).await.unwrap();
        assert!(visit.left.is_none());
        assert_eq!(reg.get_room_by_id(first.id).await.unwrap().players(), &[a]);
        assert_eq!(reg.account(a).await.unwrap().joined_room, Some(second.id));
    }

    #[tokio::test]
    async fn test_update_room_only_touches_owned_room() {
        let reg = LobbyRegistry::new();
        let host = ConnectionId::new(1);
        reg.add_room(host, UserId(1), RoomSettings::default())
            .await
            .unwrap();

        let updated = reg
            .update_room(host, |r| {
                r.settings.name = "renamed".into();
                r.property_mask = 0xAB;
            })
            .await
            .unwrap();
        assert_eq!(updated.settings.name, "renamed");
        assert_eq!(reg.get_room(host).await.unwrap().property_mask, 0xAB);

        assert!(reg.update_room(ConnectionId::new(9), |_| {}).await.is_none());
    }

    #[tokio::test]
    async fn test_stats() {
        let reg = LobbyRegistry::new();
        reg.add_account(ConnectionId::new(1), "a", outbox(1))
            .await
            .unwrap();
        reg.add_room(ConnectionId::new(1), UserId(1), RoomSettings::default())
            .await
            .unwrap();
        reg.remove_account(ConnectionId::new(1)).await.unwrap();

        let stats = reg.stats().await;
        assert_eq!(
            stats,
            RegistryStats {
                users: 0,
                last_uid: 1,
                rooms: 0
            }
        );
    }
}
