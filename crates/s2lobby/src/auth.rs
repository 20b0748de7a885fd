//! Credential checks for login and account creation.
//!
//! The lobby keeps no user database, so the default [`AcceptAll`] lets
//! everyone in. Deployments that do check cd-keys or passwords implement
//! [`Authenticator`] and pass it to the server builder.

use std::future::Future;

use s2lobby_protocol::WireString;

/// Which request the credentials arrived with. Rejections map to
/// different result codes for each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    Login,
    CreateAccount,
}

/// What the client sent. The password and cd-key are opaque.
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    pub nickname: &'a WireString,
    pub password: &'a WireString,
    pub cdkey: &'a [u8],
    pub keypool: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("CD key invalid")]
    InvalidCdKey,

    #[error("authentication failed")]
    BadCredentials,

    #[error("user already exists")]
    NameTaken,
}

/// Decides whether a login or account creation may proceed.
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate(
        &self,
        kind: AuthKind,
        credentials: Credentials<'_>,
    ) -> impl Future<Output = Result<(), AuthError>> + Send;
}

/// Accepts every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Authenticator for AcceptAll {
    async fn authenticate(
        &self,
        _kind: AuthKind,
        _credentials: Credentials<'_>,
    ) -> Result<(), AuthError> {
        Ok(())
    }
}
