//! Error types for the lobby server.
//!
//! [`LobbyError`] is what ends a session or stops the server: framing
//! faults, I/O, bad configuration. [`ApplicationError`] is the expected,
//! recoverable kind. It never ends a session and is reported to the client
//! as a `Result` carrying [`ApplicationError::code`].

use s2lobby_protocol::{ProtocolError, ResultCode, RoomId};
use s2lobby_registry::RegistryError;
use s2lobby_transport::{FrameError, TransportError};

use crate::auth::{AuthError, AuthKind};
use crate::config::ConfigError;

/// Top-level error that wraps every crate-specific error.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Bad or truncated frame, or a handshake checksum mismatch.
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A request was understood but refused.
///
/// The `Display` text is sent to the client as the result message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplicationError {
    #[error("not logged in")]
    NotLoggedIn,

    #[error("Patchlevel does not match")]
    WrongVersion { expected: u32, actual: u32 },

    #[error("CD key invalid")]
    InvalidCdKey(AuthKind),

    #[error("authentication failed")]
    AuthFailed,

    #[error("user already exists")]
    NameTaken,

    #[error("game server not found")]
    RoomNotFound(RoomId),

    #[error("game server full")]
    RoomFull(RoomId),

    /// The requester owns no room matching the request.
    #[error("No server")]
    NoServer,

    #[error("Invalid ServerID")]
    InvalidServerId { expected: RoomId, actual: RoomId },

    #[error("user has not joined any server")]
    NotJoined,

    #[error("failed to create bridge connector")]
    BridgeFailed,

    /// The room's snapshot would not fit in one frame.
    #[error("game server data too large")]
    TooLarge(usize),

    #[error("{0}")]
    Failure(String),
}

impl ApplicationError {
    /// The result code reported for this rejection.
    pub fn code(&self) -> ResultCode {
        match self {
            ApplicationError::NotLoggedIn | ApplicationError::NoServer => ResultCode::NO_SESSION,
            ApplicationError::WrongVersion { .. } => ResultCode::WRONG_VERSION,
            ApplicationError::InvalidCdKey(AuthKind::Login) => ResultCode::INVALID_CDKEY_LOGIN,
            ApplicationError::InvalidCdKey(AuthKind::CreateAccount) => {
                ResultCode::INVALID_CDKEY_CREATE
            }
            ApplicationError::AuthFailed => ResultCode::AUTH_FAILED,
            ApplicationError::NameTaken => ResultCode::USER_EXISTS,
            ApplicationError::RoomNotFound(_) => ResultCode::SERVER_NOT_FOUND,
            ApplicationError::RoomFull(_) => ResultCode::SERVER_FULL,
            ApplicationError::InvalidServerId { .. }
            | ApplicationError::NotJoined
            | ApplicationError::BridgeFailed
            | ApplicationError::TooLarge(_)
            | ApplicationError::Failure(_) => ResultCode::FAILURE,
        }
    }

    pub(crate) fn from_auth(kind: AuthKind, err: AuthError) -> Self {
        match err {
            AuthError::InvalidCdKey => ApplicationError::InvalidCdKey(kind),
            AuthError::BadCredentials => ApplicationError::AuthFailed,
            AuthError::NameTaken => ApplicationError::NameTaken,
        }
    }
}

impl From<RegistryError> for ApplicationError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NoAccount(_) => ApplicationError::NotLoggedIn,
            RegistryError::RoomNotFound(id) => ApplicationError::RoomNotFound(id),
            RegistryError::RoomFull(id) => ApplicationError::RoomFull(id),
            RegistryError::NotInRoom { .. } | RegistryError::OwnerSeat(_) => {
                ApplicationError::NotJoined
            }
            other => ApplicationError::Failure(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use s2lobby_transport::ConnectionId;

    #[test]
    fn test_from_frame_error() {
        let err: LobbyError = FrameError::PayloadTooLarge(5000).into();
        assert!(matches!(err, LobbyError::Frame(_)));
        assert!(err.to_string().contains("5000"));
    }

    #[test]
    fn test_from_transport_error() {
        let err: LobbyError = TransportError::ConnectionClosed("gone".into()).into();
        assert!(matches!(err, LobbyError::Transport(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_application_codes() {
        assert_eq!(ApplicationError::NotLoggedIn.code(), ResultCode(0x03));
        assert_eq!(
            ApplicationError::WrongVersion {
                expected: 11757,
                actual: 9999
            }
            .code(),
            ResultCode(0x3E)
        );
        assert_eq!(ApplicationError::RoomNotFound(RoomId(9)).code(), ResultCode(0x84));
        assert_eq!(ApplicationError::RoomFull(RoomId(9)).code(), ResultCode(0x87));
        assert_eq!(ApplicationError::BridgeFailed.code(), ResultCode(0x01));
        assert_eq!(ApplicationError::TooLarge(1096).code(), ResultCode(0x01));
    }

    #[test]
    fn test_auth_rejections_depend_on_request() {
        let login = ApplicationError::from_auth(AuthKind::Login, AuthError::InvalidCdKey);
        let create = ApplicationError::from_auth(AuthKind::CreateAccount, AuthError::InvalidCdKey);
        assert_eq!(login.code(), ResultCode(0x1B));
        assert_eq!(create.code(), ResultCode(0x1A));
        assert_eq!(
            ApplicationError::from_auth(AuthKind::Login, AuthError::BadCredentials).code(),
            ResultCode(0x3D)
        );
        assert_eq!(
            ApplicationError::from_auth(AuthKind::CreateAccount, AuthError::NameTaken).code(),
            ResultCode(0x29)
        );
    }

    #[test]
    fn test_registry_errors_map_to_codes() {
        let full: ApplicationError = RegistryError::RoomFull(RoomId(2)).into();
        assert_eq!(full.code(), ResultCode::SERVER_FULL);

        let other: ApplicationError = RegistryError::AccountExists(ConnectionId::new(1)).into();
        assert_eq!(other.code(), ResultCode::FAILURE);

        let owner: ApplicationError = RegistryError::OwnerSeat(RoomId(2)).into();
        assert_eq!(owner, ApplicationError::NotJoined);
        assert_eq!(owner.code(), ResultCode::FAILURE);
    }
}
