//! Observer fan-out.
//!
//! [`Broadcaster::notify`] snapshots the accounts subscribed to the
//! event's class, encodes the notification once, and queues it on each
//! recipient's outbox. Queueing never waits, and delivery failures are
//! only logged: the triggering request never hears about them. Each
//! outbox keeps its own recipient's frames in push order, so a reply and
//! a notification for the same connection cannot swap.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use s2lobby_protocol::messages::{Chat, GameServerData, RemoveServer, UserLoggedIn, UserLoggedOut};
use s2lobby_protocol::{Codec, Message, RoomId, UserId, WireString};
use s2lobby_registry::{LobbyRegistry, Observer, Room, RoomSettings};
use s2lobby_transport::{FrameType, MAX_PAYLOAD_SIZE, Outbox};

/// Something observers hear about.
#[derive(Debug, Clone)]
pub enum LobbyEvent {
    UserLoggedIn { uid: UserId, name: WireString },
    UserLoggedOut { uid: UserId, name: WireString },
    ChatPosted { from: UserId, text: WireString },
    RoomUpdated(GameServerData),
    RoomRemoved(RemoveServer),
}

impl LobbyEvent {
    fn observer(&self) -> Observer {
        match self {
            LobbyEvent::UserLoggedIn { .. } | LobbyEvent::UserLoggedOut { .. } => Observer::Logins,
            LobbyEvent::ChatPosted { .. } => Observer::Chat,
            LobbyEvent::RoomUpdated(_) | LobbyEvent::RoomRemoved(_) => Observer::RoomList,
        }
    }
}

/// The `GameServerData` snapshot of a room.
pub fn room_snapshot(room: &Room, ticket_id: u32) -> GameServerData {
    let mut data = settings_snapshot(room.id, room.owner_uid, &room.settings, ticket_id);
    data.curr_players = u8::try_from(room.player_count()).unwrap_or(u8::MAX);
    data.running = room.running;
    data
}

/// The `GameServerData` a room with `settings` would advertise, before it
/// has players or a running flag.
pub fn settings_snapshot(
    id: RoomId,
    owner: UserId,
    s: &RoomSettings,
    ticket_id: u32,
) -> GameServerData {
    GameServerData {
        server_id: id.0,
        name: s.name.clone(),
        owner_id: owner.0,
        description: s.description.clone(),
        ip: s.ip.clone(),
        port: s.port,
        server_type: s.server_type,
        lobby_id: s.lobby_id,
        version: s.version.clone(),
        max_players: s.max_players,
        curr_players: 1,
        ai_players: s.ai_players,
        level: s.level,
        game_mode: s.game_mode,
        hardcore: s.hardcore,
        map: s.map.clone(),
        running: false,
        data: s.data.clone(),
        ticket_id,
    }
}

/// Delivers [`LobbyEvent`]s to subscribed accounts.
#[derive(Debug)]
pub struct Broadcaster<C: Codec> {
    registry: Arc<LobbyRegistry>,
    codec: C,
    announce_logins: bool,
}

impl<C: Codec> Broadcaster<C> {
    pub fn new(registry: Arc<LobbyRegistry>, codec: C, announce_logins: bool) -> Self {
        Self {
            registry,
            codec,
            announce_logins,
        }
    }

    /// Queues `event` for every current observer. Returns how many
    /// recipients it was queued for.
    pub async fn notify(&self, event: LobbyEvent) -> usize {
        let recipients = self.registry.observers(event.observer()).await;
        if recipients.is_empty() {
            return 0;
        }
        let outboxes: Vec<Outbox> = recipients.into_iter().map(|a| a.outbox).collect();

        match event {
            LobbyEvent::UserLoggedIn { uid, name } => {
                let sent = self.fan_out(&outboxes, UserLoggedIn { user_id: uid.0, name: name.clone() });
                if self.announce_logins {
                    self.fan_out(&outboxes, server_chat(&name, "has logged in! >>"));
                }
                sent
            }
            LobbyEvent::UserLoggedOut { uid, name } => {
                let sent = self.fan_out(&outboxes, UserLoggedOut { user_id: uid.0 });
                if self.announce_logins {
                    self.fan_out(&outboxes, server_chat(&name, "has logged out >>"));
                }
                sent
            }
            LobbyEvent::ChatPosted { from, text } => {
                self.fan_out(&outboxes, Chat { text, from_id: from.0 })
            }
            LobbyEvent::RoomUpdated(data) => self.fan_out(&outboxes, data),
            LobbyEvent::RoomRemoved(notice) => self.fan_out(&outboxes, notice),
        }
    }

    /// Sends one message to a fixed set of outboxes, regardless of their
    /// observer flags.
    pub fn send_to<M: Message>(&self, outboxes: &[Outbox], message: M) -> usize {
        self.fan_out(outboxes, message)
    }

    fn fan_out<M: Message>(&self, outboxes: &[Outbox], message: M) -> usize {
        tracing::debug!(recipients = outboxes.len(), " --> {message:?}");
        let payload: Bytes = match self.codec.encode(message) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode notification");
                return 0;
            }
        };
        if payload.len() > MAX_PAYLOAD_SIZE as usize {
            tracing::warn!(size = payload.len(), "notification too large for a frame, dropped");
            return 0;
        }

        let mut delivered = 0;
        for outbox in outboxes {
            match outbox.push(FrameType::ApplicationMessage, payload.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!(conn_id = %outbox.id(), error = %e, "notification dropped");
                }
            }
        }
        delivered
    }
}

/// A lobby chat line "<< name suffix", keeping the name's bytes as sent.
fn server_chat(name: &WireString, suffix: &str) -> Chat {
    let mut text = BytesMut::with_capacity(name.len() + suffix.len() + 4);
    text.extend_from_slice(b"<< ");
    text.extend_from_slice(name.as_bytes());
    text.extend_from_slice(b" ");
    text.extend_from_slice(suffix.as_bytes());
    Chat {
        text: text.freeze().into(),
        from_id: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use s2lobby_protocol::{Envelope, MessageType, SchemaCodec};
    use s2lobby_registry::RoomSettings;
    use s2lobby_transport::{ConnectionId, OutboxReceiver};

    async fn login(
        registry: &LobbyRegistry,
        n: u64,
        observer: Option<Observer>,
    ) -> OutboxReceiver {
        let conn = ConnectionId::new(n);
        let (outbox, rx) = Outbox::channel(conn, 16);
        registry
            .add_account(conn, format!("user{n}"), outbox)
            .await
            .unwrap();
        if let Some(observer) = observer {
            registry.set_observer(conn, observer, true).await.unwrap();
        }
        rx
    }

    fn message_type(rx: &mut OutboxReceiver) -> Option<MessageType> {
        let frame = rx.try_recv()?;
        let (envelope, _) = Envelope::split(frame.payload).unwrap();
        envelope.message_type().ok()
    }

    #[tokio::test]
    async fn test_chat_reaches_only_chat_watchers() {
        let registry = Arc::new(LobbyRegistry::new());
        let mut watcher = login(&registry, 1, Some(Observer::Chat)).await;
        let mut other = login(&registry, 2, Some(Observer::Logins)).await;
        let mut idle = login(&registry, 3, None).await;

        let broadcaster = Broadcaster::new(Arc::clone(&registry), SchemaCodec, true);
        let sent = broadcaster
            .notify(LobbyEvent::ChatPosted {
                from: UserId(2),
                text: "hello".into(),
            })
            .await;

        assert_eq!(sent, 1);
        assert_eq!(message_type(&mut watcher), Some(MessageType::Chat));
        assert_eq!(message_type(&mut other), None);
        assert_eq!(message_type(&mut idle), None);
    }

    #[tokio::test]
    async fn test_login_notice_with_announcement() {
        let registry = Arc::new(LobbyRegistry::new());
        let mut watcher = login(&registry, 1, Some(Observer::Logins)).await;

        let broadcaster = Broadcaster::new(Arc::clone(&registry), SchemaCodec, true);
        broadcaster
            .notify(LobbyEvent::UserLoggedIn {
                uid: UserId(7),
                name: "Bob".into(),
            })
            .await;

        assert_eq!(message_type(&mut watcher), Some(MessageType::UserLoggedIn));
        assert_eq!(message_type(&mut watcher), Some(MessageType::Chat));
        assert_eq!(message_type(&mut watcher), None);
    }

    #[tokio::test]
    async fn test_logout_notice_without_announcement() {
        let registry = Arc::new(LobbyRegistry::new());
        let mut watcher = login(&registry, 1, Some(Observer::Logins)).await;

        let broadcaster = Broadcaster::new(Arc::clone(&registry), SchemaCodec, false);
        broadcaster
            .notify(LobbyEvent::UserLoggedOut {
                uid: UserId(7),
                name: "Bob".into(),
            })
            .await;

        assert_eq!(message_type(&mut watcher), Some(MessageType::UserLoggedOut));
        assert_eq!(message_type(&mut watcher), None);
    }

    #[tokio::test]
    async fn test_login_announcement_keeps_name_bytes() {
        let registry = Arc::new(LobbyRegistry::new());
        let mut watcher = login(&registry, 1, Some(Observer::Logins)).await;

        let broadcaster = Broadcaster::new(Arc::clone(&registry), SchemaCodec, true);
        broadcaster
            .notify(LobbyEvent::UserLoggedIn {
                uid: UserId(7),
                name: WireString::from(&[0x4A, 0xFC, 0x72][..]),
            })
            .await;

        assert_eq!(message_type(&mut watcher), Some(MessageType::UserLoggedIn));
        let frame = watcher.try_recv().unwrap();
        let (_, body) = Envelope::split(frame.payload).unwrap();
        let chat: Chat = SchemaCodec.decode(body).unwrap();
        assert_eq!(chat.from_id, 0);
        assert_eq!(chat.text.as_bytes(), b"<< J\xFCr has logged in! >>");
    }

    #[tokio::test]
    async fn test_oversized_notification_is_dropped() {
        let registry = Arc::new(LobbyRegistry::new());
        let mut watcher = login(&registry, 1, Some(Observer::RoomList)).await;

        let broadcaster = Broadcaster::new(Arc::clone(&registry), SchemaCodec, true);
        let sent = broadcaster
            .notify(LobbyEvent::RoomUpdated(GameServerData {
                data: vec![0; MAX_PAYLOAD_SIZE as usize],
                ..Default::default()
            }))
            .await;

        assert_eq!(sent, 0);
        assert!(watcher.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_no_observers_is_noop() {
        let registry = Arc::new(LobbyRegistry::new());
        let _rx = login(&registry, 1, None).await;
        let broadcaster = Broadcaster::new(Arc::clone(&registry), SchemaCodec, true);
        let sent = broadcaster
            .notify(LobbyEvent::RoomRemoved(RemoveServer::default()))
            .await;
        assert_eq!(sent, 0);
    }

    #[tokio::test]
    async fn test_room_snapshot_counts_players() {
        let registry = LobbyRegistry::new();
        let host = ConnectionId::new(1);
        let room = registry
            .add_room(
                host,
                UserId(4),
                RoomSettings {
                    name: "Vikings".into(),
                    max_players: 4,
                    ai_players: 1,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let room = registry
            .add_player(room.id, ConnectionId::new(2))
            .await
            .unwrap();

        let data = room_snapshot(&room, 12);
        assert_eq!(data.server_id, room.id.0);
        assert_eq!(data.owner_id, 4);
        assert_eq!(data.curr_players, 2);
        assert_eq!(data.ai_players, 1);
        assert_eq!(data.name, "Vikings");
        assert_eq!(data.ticket_id, 12);
    }
}
