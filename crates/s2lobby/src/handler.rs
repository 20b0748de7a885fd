//! Per-connection session: handshake, request dispatch, cleanup.
//!
//! Each accepted connection gets its own Tokio task running
//! [`handle_connection`]. The flow is:
//!   1. Handshaking: one `HandshakeConnect` frame, answered with
//!      `HandshakeConnected`. Anything else ends the session.
//!   2. Active: read frames in arrival order. Pings are dropped,
//!      application messages are decoded and routed to one handler each.
//!   3. Closed: on EOF, a framing fault, or an outbox overflow. The
//!      [`SessionGuard`] removes the account and tells observers.
//!
//! Every reply goes through the connection's [`Outbox`], the same queue
//! broadcasts use, so the client sees them in the order they were issued.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use s2lobby_protocol::messages::{
    AddGameServer, ChangeGameServer, ChatMessage, DeregObserverGlobalChat,
    DeregObserverServerList, DeregObserverUserLogin, JoinServer, LeaveServer, Motd,
    RegObserverGlobalChat, RegObserverServerList, RegObserverUserLogin, RemoveServer,
    RequestCreateAccount, RequestLogin, RequestMotd, ResultId, ResultMessage, UserLoggedIn,
};
use s2lobby_protocol::{Codec, Envelope, Handshake, Message, MessageType, ProtocolError, RoomId};
use s2lobby_registry::{Account, Departure, Joined, Observer, Room, RoomSettings};
use s2lobby_transport::{
    Connection, ConnectionId, Frame, FrameError, FrameType, MAX_PAYLOAD_SIZE, Outbox, read_frame,
};
use tokio::io::AsyncRead;

use crate::auth::{AuthKind, Authenticator, Credentials};
use crate::broadcast::{LobbyEvent, room_snapshot, settings_snapshot};
use crate::error::{ApplicationError, LobbyError};
use crate::server::ServerState;

/// Outcome of one request handler. `Err` becomes a `Result` reply.
type Handled = Result<(), ApplicationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Handshaking,
    Active,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Handshaking => "handshaking",
            SessionState::Active => "active",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Runs [`cleanup`] when the session task ends, however it ends.
///
/// `Drop` is synchronous, so the async cleanup is spawned.
struct SessionGuard<A: Authenticator, C: Codec> {
    conn_id: ConnectionId,
    state: Arc<ServerState<A, C>>,
}

impl<A: Authenticator, C: Codec> Drop for SessionGuard<A, C> {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(cleanup(conn_id, state));
    }
}

/// Removes the connection's account and everything hanging off it, then
/// tells observers. A connection that never logged in is a no-op.
pub(crate) async fn cleanup<A: Authenticator, C: Codec>(
    conn_id: ConnectionId,
    state: Arc<ServerState<A, C>>,
) {
    let Some(Departure {
        account,
        owned_room,
        left_room,
    }) = state.registry.remove_account(conn_id).await
    else {
        tracing::debug!(%conn_id, "connection closed without an account");
        return;
    };

    if let Some(room) = owned_room {
        tracing::info!(%conn_id, room_id = %room.id, "room closed with its owner");
        state
            .broadcast
            .notify(LobbyEvent::RoomRemoved(RemoveServer {
                server_id: room.id.0,
                running: room.running,
                ticket_id: 0,
            }))
            .await;
    }
    if let Some(room) = left_room {
        state
            .broadcast
            .notify(LobbyEvent::RoomUpdated(room_snapshot(&room, 0)))
            .await;
    }

    state
        .broadcast
        .notify(LobbyEvent::UserLoggedOut {
            uid: account.uid,
            name: account.name.clone(),
        })
        .await;
    tracing::info!(%conn_id, uid = %account.uid, name = %account.name, "user disconnected");
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<K, A, C>(
    conn: K,
    state: Arc<ServerState<A, C>>,
) -> Result<(), LobbyError>
where
    K: Connection,
    A: Authenticator,
    C: Codec,
{
    let conn_id = conn.id();
    let peer_addr = conn.peer_addr();
    let local_addr = conn.local_addr();
    tracing::debug!(%conn_id, %peer_addr, "handling new connection");

    let (mut reader, writer) = conn.into_split();
    let (outbox, rx) = Outbox::channel(conn_id, state.config.outbox_capacity);
    rx.spawn_writer(writer, Arc::clone(&state.checksum));

    let _guard = SessionGuard {
        conn_id,
        state: Arc::clone(&state),
    };

    let mut session = Session {
        conn_id,
        peer_addr,
        local_addr,
        outbox,
        state,
        phase: SessionState::Handshaking,
    };
    let result = session.run(&mut reader).await;
    session.transition(SessionState::Closed);

    // _guard drops here → cleanup fires.
    result
}

struct Session<A: Authenticator, C: Codec> {
    conn_id: ConnectionId,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    outbox: Outbox,
    state: Arc<ServerState<A, C>>,
    phase: SessionState,
}

/// Decodes the body as the request type named by the envelope and hands
/// it to its handler. Rejections are answered with a `Result` carrying
/// the request's ticket id.
macro_rules! route {
    ($session:ident, $msg_type:expr, $body:expr, { $( $ty:ident => $handler:ident, )* }) => {
        match $msg_type {
            $(
                MessageType::$ty => {
                    if let Some(request) = $session.decode::<$ty>($body) {
                        let ticket_id = request.ticket_id;
                        if let Err(e) = $session.$handler(request).await {
                            $session.reject(e, ticket_id);
                        }
                    }
                }
            )*
            other => {
                tracing::warn!(
                    conn_id = %$session.conn_id,
                    msg_type = ?other,
                    "ignoring server-bound message type sent by client"
                );
            }
        }
    };
}

impl<A: Authenticator, C: Codec> Session<A, C> {
    fn transition(&mut self, next: SessionState) {
        tracing::debug!(conn_id = %self.conn_id, from = %self.phase, to = %next, "session state");
        self.phase = next;
    }

    async fn run<R>(&mut self, reader: &mut R) -> Result<(), LobbyError>
    where
        R: AsyncRead + Unpin,
    {
        self.handshake(reader).await?;
        self.transition(SessionState::Active);

        loop {
            let frame = tokio::select! {
                frame = read_frame(reader) => frame,
                () = self.outbox.kicked() => {
                    tracing::warn!(conn_id = %self.conn_id, "connection kicked");
                    return Ok(());
                }
            };

            match frame {
                Ok(frame) => self.on_frame(frame).await,
                Err(FrameError::Closed) => {
                    tracing::debug!(conn_id = %self.conn_id, "connection closed by peer");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(conn_id = %self.conn_id, error = %e, "dropping connection");
                    return Err(e.into());
                }
            }
        }
    }

    /// Reads and answers the handshake.
    async fn handshake<R>(&mut self, reader: &mut R) -> Result<(), LobbyError>
    where
        R: AsyncRead + Unpin,
    {
        let frame = read_frame(reader).await?;
        if frame.header.kind() != Some(FrameType::HandshakeConnect) {
            return Err(ProtocolError::UnexpectedFrame(frame.header.frame_type).into());
        }

        let handshake = Handshake::decode(&frame.payload)?;
        if self.state.config.verify_handshake_checksum {
            frame.verify_checksum(self.state.checksum.as_ref())?;
        }
        tracing::debug!(
            conn_id = %self.conn_id,
            username = %handshake.username(),
            " <-- handshake"
        );

        let reply = handshake.reply();
        self.outbox
            .push(FrameType::HandshakeConnected, reply.encode())?;
        tracing::debug!(
            conn_id = %self.conn_id,
            dest_id = reply.endpoint_id,
            " --> handshake reply"
        );
        Ok(())
    }

    async fn on_frame(&mut self, frame: Frame) {
        match frame.header.kind() {
            Some(FrameType::Ping) => {
                tracing::trace!(conn_id = %self.conn_id, size = frame.payload.len(), " <-- ping");
            }
            Some(FrameType::ApplicationMessage) => self.on_application(frame.payload).await,
            _ => {
                let err = ProtocolError::UnexpectedFrame(frame.header.frame_type);
                tracing::warn!(conn_id = %self.conn_id, error = %err, "ignoring frame");
            }
        }
    }

    async fn on_application(&mut self, payload: Bytes) {
        let (envelope, body) = match Envelope::split(payload) {
            Ok(parts) => parts,
            Err(e) => {
                tracing::warn!(conn_id = %self.conn_id, error = %e, "rejected application message");
                return;
            }
        };
        let msg_type = match envelope.message_type() {
            Ok(ty) => ty,
            Err(e) => {
                tracing::warn!(conn_id = %self.conn_id, error = %e, "ignoring application message");
                return;
            }
        };

        route!(self, msg_type, body, {
            ChatMessage => chat,
            RequestLogin => login,
            RequestCreateAccount => create_account,
            RequestMotd => motd,
            RegObserverGlobalChat => reg_global_chat,
            DeregObserverGlobalChat => dereg_global_chat,
            RegObserverUserLogin => reg_user_login,
            DeregObserverUserLogin => dereg_user_login,
            RegObserverServerList => reg_server_list,
            DeregObserverServerList => dereg_server_list,
            AddGameServer => add_game_server,
            RemoveServer => remove_server,
            ChangeGameServer => change_game_server,
            JoinServer => join_server,
            LeaveServer => leave_server,
        });
    }

    // ── Plumbing ───────────────────────────────────────────────────

    /// A malformed request is logged and gets no reply.
    fn decode<M: Message>(&self, body: Bytes) -> Option<M> {
        match self.state.codec.decode::<M>(body) {
            Ok(message) => {
                tracing::debug!(conn_id = %self.conn_id, " <-- {message:?}");
                Some(message)
            }
            Err(e) => {
                tracing::warn!(
                    conn_id = %self.conn_id,
                    msg_type = ?M::TYPE,
                    error = %e,
                    "failed to decode request"
                );
                None
            }
        }
    }

    fn send<M: Message>(&self, message: M) {
        tracing::debug!(conn_id = %self.conn_id, " --> {message:?}");
        let payload = match self.state.codec.encode(message) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(conn_id = %self.conn_id, error = %e, "failed to encode reply");
                return;
            }
        };
        if let Err(e) = self.outbox.push(FrameType::ApplicationMessage, payload) {
            tracing::debug!(conn_id = %self.conn_id, error = %e, "reply dropped");
        }
    }

    fn reply_ok(&self, ticket_id: u32) {
        self.send(ResultMessage::ok(ticket_id));
    }

    fn reject(&self, err: ApplicationError, ticket_id: u32) {
        tracing::info!(conn_id = %self.conn_id, code = %err.code(), reason = ?err, "request rejected");
        self.send(ResultMessage::with_code(err.code(), err.to_string(), ticket_id));
    }

    /// Refuses a message that would not fit in one frame once encoded.
    fn ensure_fits<M: Message>(&self, message: M) -> Handled {
        let payload = self
            .state
            .codec
            .encode(message)
            .map_err(|e| ApplicationError::Failure(e.to_string()))?;
        if payload.len() > MAX_PAYLOAD_SIZE as usize {
            return Err(ApplicationError::TooLarge(payload.len()));
        }
        Ok(())
    }

    async fn notify(&self, event: LobbyEvent) {
        self.state.broadcast.notify(event).await;
    }

    // ── Preconditions ──────────────────────────────────────────────

    async fn require_account(&self) -> Result<Account, ApplicationError> {
        self.state
            .registry
            .account(self.conn_id)
            .await
            .ok_or(ApplicationError::NotLoggedIn)
    }

    /// The room this connection owns, which must be `server_id`.
    async fn require_owned_room(&self, server_id: u32) -> Result<Room, ApplicationError> {
        let room = self
            .state
            .registry
            .get_room(self.conn_id)
            .await
            .ok_or(ApplicationError::NoServer)?;
        if room.id != RoomId(server_id) {
            return Err(ApplicationError::InvalidServerId {
                expected: room.id,
                actual: RoomId(server_id),
            });
        }
        Ok(room)
    }

    // ── Accounts ───────────────────────────────────────────────────

    async fn login(&self, req: RequestLogin) -> Handled {
        let credentials = Credentials {
            nickname: &req.nickname,
            password: &req.password,
            cdkey: &req.cdkey,
            keypool: req.keypool,
        };
        self.register(AuthKind::Login, credentials, req.patchlevel, req.ticket_id)
            .await
    }

    async fn create_account(&self, req: RequestCreateAccount) -> Handled {
        let credentials = Credentials {
            nickname: &req.nickname,
            password: &req.password,
            cdkey: &req.cdkey,
            keypool: req.keypool,
        };
        self.register(
            AuthKind::CreateAccount,
            credentials,
            req.patchlevel,
            req.ticket_id,
        )
        .await
    }

    /// Shared body of login and account creation.
    async fn register(
        &self,
        kind: AuthKind,
        credentials: Credentials<'_>,
        patchlevel: u32,
        ticket_id: u32,
    ) -> Handled {
        let expected = self.state.config.patchlevel;
        if patchlevel != expected {
            return Err(ApplicationError::WrongVersion {
                expected,
                actual: patchlevel,
            });
        }

        if let Some(account) = self.state.registry.account(self.conn_id).await {
            tracing::debug!(conn_id = %self.conn_id, uid = %account.uid, "already logged in");
            self.reply_ok(ticket_id);
            return Ok(());
        }

        self.state
            .auth
            .authenticate(kind, credentials)
            .await
            .map_err(|e| ApplicationError::from_auth(kind, e))?;

        let name = credentials.nickname.clone();
        let uid = self
            .state
            .registry
            .add_account(self.conn_id, name.clone(), self.outbox.clone())
            .await?;

        self.reply_ok(ticket_id);
        tracing::info!(conn_id = %self.conn_id, %uid, %name, "user logged in");
        self.notify(LobbyEvent::UserLoggedIn { uid, name }).await;
        Ok(())
    }

    async fn motd(&self, req: RequestMotd) -> Handled {
        let account = self.require_account().await?;
        self.send(Motd {
            text: self.state.config.motd_for(&account.name),
            ticket_id: req.ticket_id,
        });
        Ok(())
    }

    // ── Subscriptions ──────────────────────────────────────────────

    async fn observe(&self, observer: Observer, on: bool) -> Handled {
        self.state
            .registry
            .set_observer(self.conn_id, observer, on)
            .await?;
        tracing::debug!(conn_id = %self.conn_id, ?observer, on, "observer changed");
        Ok(())
    }

    async fn reg_global_chat(&self, req: RegObserverGlobalChat) -> Handled {
        self.observe(Observer::Chat, true).await?;
        self.reply_ok(req.ticket_id);
        Ok(())
    }

    async fn dereg_global_chat(&self, req: DeregObserverGlobalChat) -> Handled {
        self.observe(Observer::Chat, false).await?;
        self.reply_ok(req.ticket_id);
        Ok(())
    }

    /// Confirms, then lists everyone currently watching logins (the
    /// requester included).
    async fn reg_user_login(&self, req: RegObserverUserLogin) -> Handled {
        self.observe(Observer::Logins, true).await?;
        self.reply_ok(req.ticket_id);

        for account in self.state.registry.observers(Observer::Logins).await {
            self.send(UserLoggedIn {
                user_id: account.uid.0,
                name: account.name,
            });
        }
        Ok(())
    }

    async fn dereg_user_login(&self, req: DeregObserverUserLogin) -> Handled {
        self.observe(Observer::Logins, false).await?;
        self.reply_ok(req.ticket_id);
        Ok(())
    }

    /// Sends a snapshot of every room, then confirms.
    async fn reg_server_list(&self, req: RegObserverServerList) -> Handled {
        self.observe(Observer::RoomList, true).await?;

        for room in self.state.registry.list_rooms().await {
            self.send(room_snapshot(&room, req.ticket_id));
        }
        self.reply_ok(req.ticket_id);
        Ok(())
    }

    async fn dereg_server_list(&self, req: DeregObserverServerList) -> Handled {
        self.observe(Observer::RoomList, false).await?;
        self.reply_ok(req.ticket_id);
        Ok(())
    }

    // ── Chat ───────────────────────────────────────────────────────

    /// Relays to chat observers. There is no confirmation.
    async fn chat(&self, req: ChatMessage) -> Handled {
        let account = self.require_account().await?;
        self.notify(LobbyEvent::ChatPosted {
            from: account.uid,
            text: req.text,
        })
        .await;
        Ok(())
    }

    // ── Rooms ──────────────────────────────────────────────────────

    async fn add_game_server(&self, req: AddGameServer) -> Handled {
        let account = self.require_account().await?;
        let config = &self.state.config;

        if req.port == config.bridge_error_port {
            tracing::warn!(conn_id = %self.conn_id, "client failed to create bridge connector");
            return Err(ApplicationError::BridgeFailed);
        }

        // Hosts on the default port are reached directly; anything else is
        // relayed through this machine.
        let ip = if req.port == config.default_game_port {
            self.peer_addr.ip()
        } else {
            self.local_addr.ip()
        }
        .to_string();

        let ticket_id = req.ticket_id;
        let settings = RoomSettings {
            name: req.name,
            description: req.description,
            ip: ip.into(),
            port: req.port,
            server_type: req.server_type,
            lobby_id: req.lobby_id,
            version: req.version,
            max_players: req.max_players,
            ai_players: req.ai_players,
            level: req.level,
            game_mode: req.game_mode,
            hardcore: req.hardcore,
            map: req.map,
            automatic_join: req.automatic_join,
            data: req.data,
        };
        self.ensure_fits(settings_snapshot(RoomId(0), account.uid, &settings, ticket_id))?;

        if let Some(previous) = self.state.registry.remove_room(self.conn_id).await {
            tracing::info!(conn_id = %self.conn_id, room_id = %previous.id, "replacing room");
            self.notify(LobbyEvent::RoomRemoved(RemoveServer {
                server_id: previous.id.0,
                running: previous.running,
                ticket_id,
            }))
            .await;
        }
        self.leave_joined_room(ticket_id).await;

        let room = self
            .state
            .registry
            .add_room(self.conn_id, account.uid, settings)
            .await?;

        self.send(ResultId::ok(room.id.0, ticket_id));
        tracing::info!(
            conn_id = %self.conn_id,
            room_id = %room.id,
            name = %room.settings.name,
            ip = %room.settings.ip,
            port = room.settings.port,
            "room created"
        );
        self.notify(LobbyEvent::RoomUpdated(room_snapshot(&room, ticket_id)))
            .await;
        Ok(())
    }

    /// Removes the requester's room. With `running` set the game is
    /// starting: the room's players get its final snapshot first.
    async fn remove_server(&self, req: RemoveServer) -> Handled {
        let room = self.require_owned_room(req.server_id).await?;

        if req.running {
            let started = self
                .state
                .registry
                .update_room(self.conn_id, |r| r.running = true)
                .await
                .unwrap_or(room);
            let outboxes: Vec<Outbox> = self
                .state
                .registry
                .list_accounts()
                .await
                .into_iter()
                .filter(|a| started.has_player(a.conn))
                .map(|a| a.outbox)
                .collect();
            self.state
                .broadcast
                .send_to(&outboxes, room_snapshot(&started, req.ticket_id));
            tracing::info!(conn_id = %self.conn_id, room_id = %started.id, "game started");
        }

        if let Some(removed) = self.state.registry.remove_room(self.conn_id).await {
            tracing::info!(conn_id = %self.conn_id, room_id = %removed.id, "room removed");
            self.notify(LobbyEvent::RoomRemoved(req.clone())).await;
        }
        self.reply_ok(req.ticket_id);
        Ok(())
    }

    async fn change_game_server(&self, req: ChangeGameServer) -> Handled {
        let current = self.require_owned_room(req.server_id).await?;

        let ticket_id = req.ticket_id;
        let (running, property_mask) = (req.running, req.property_mask);
        let settings = RoomSettings {
            name: req.name,
            description: req.description,
            max_players: req.max_players,
            ai_players: req.slots_occupied,
            level: req.level,
            game_mode: req.game_mode,
            hardcore: req.hardcore,
            map: req.map,
            data: req.data,
            ..current.settings
        };
        self.ensure_fits(settings_snapshot(current.id, current.owner_uid, &settings, ticket_id))?;

        let room = self
            .state
            .registry
            .update_room(self.conn_id, move |r| {
                r.settings = settings;
                r.running = running;
                r.property_mask = property_mask;
            })
            .await
            .ok_or(ApplicationError::NoServer)?;

        self.notify(LobbyEvent::RoomUpdated(room_snapshot(&room, ticket_id)))
            .await;
        self.reply_ok(ticket_id);
        tracing::info!(conn_id = %self.conn_id, room_id = %room.id, "room updated");
        Ok(())
    }

    /// Room errors are reported ahead of the login check.
    async fn join_server(&self, req: JoinServer) -> Handled {
        let room_id = RoomId(req.server_id);
        let room = self
            .state
            .registry
            .get_room_by_id(room_id)
            .await
            .ok_or(ApplicationError::RoomNotFound(room_id))?;
        if !room.has_player(self.conn_id) && room.is_full() {
            return Err(ApplicationError::RoomFull(room_id));
        }

        self.require_account().await?;

        let Joined { room, left } = self.state.registry.join_room(room_id, self.conn_id).await?;
        if let Some(left) = left {
            tracing::info!(conn_id = %self.conn_id, room_id = %left.id, "left room");
            self.notify(LobbyEvent::RoomUpdated(room_snapshot(&left, req.ticket_id)))
                .await;
        }
        self.reply_ok(req.ticket_id);
        tracing::info!(conn_id = %self.conn_id, %room_id, players = room.player_count(), "joined room");
        self.notify(LobbyEvent::RoomUpdated(room_snapshot(&room, req.ticket_id)))
            .await;
        Ok(())
    }

    /// Leaves the room joined with `JoinServer`. An owner is never in its
    /// own room's `joined_room`, so it gets `NotJoined` there.
    async fn leave_server(&self, req: LeaveServer) -> Handled {
        let account = self.require_account().await?;
        let room_id = account.joined_room.ok_or(ApplicationError::NotJoined)?;

        let room = self
            .state
            .registry
            .remove_player(room_id, self.conn_id)
            .await?;
        self.reply_ok(req.ticket_id);
        tracing::info!(conn_id = %self.conn_id, %room_id, "left room");
        self.notify(LobbyEvent::RoomUpdated(room_snapshot(&room, req.ticket_id)))
            .await;
        Ok(())
    }

    /// Gives up the seat in another owner's room, if any. The account's own
    /// room is never touched.
    async fn leave_joined_room(&self, ticket_id: u32) {
        let Some(room_id) = self
            .state
            .registry
            .account(self.conn_id)
            .await
            .and_then(|a| a.joined_room)
        else {
            return;
        };
        match self.state.registry.remove_player(room_id, self.conn_id).await {
            Ok(room) => {
                self.notify(LobbyEvent::RoomUpdated(room_snapshot(&room, ticket_id)))
                    .await;
            }
            Err(e) => tracing::debug!(conn_id = %self.conn_id, error = %e, "no seat to give up"),
        }
    }
}
