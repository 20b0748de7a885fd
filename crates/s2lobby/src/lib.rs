//! # s2lobby
//!
//! Lobby server for The Settlers II: 10th anniversary online play.
//!
//! Clients connect over TCP, exchange a fixed-size handshake, then send
//! schema-encoded application messages: account login, chat, and the
//! game-room directory (host, join, leave, update, start). Everything is
//! held in memory for the life of the process.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use s2lobby::{AcceptAll, LobbyServer};
//!
//! # async fn start() -> Result<(), s2lobby::LobbyError> {
//! let server = LobbyServer::builder()
//!     .bind("0.0.0.0:6800")
//!     .build(AcceptAll)
//!     .await?;
//! server.run().await
//! # }
//! ```

pub mod auth;
pub mod broadcast;
pub mod config;
mod error;
mod handler;
mod server;

pub use auth::{AcceptAll, AuthError, AuthKind, Authenticator, Credentials};
pub use broadcast::{Broadcaster, LobbyEvent};
pub use config::{ConfigError, LobbyConfig};
pub use error::{ApplicationError, LobbyError};
pub use server::{LobbyServer, LobbyServerBuilder};

pub use s2lobby_protocol as protocol;
pub use s2lobby_registry as registry;
pub use s2lobby_transport as transport;
