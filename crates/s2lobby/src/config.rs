//! Lobby configuration.
//!
//! Loaded from a JSON file; every field has a default, so an empty object
//! (or no file at all) yields a working lobby on port 6800. Unknown keys
//! are rejected so typos surface at startup.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use s2lobby_protocol::WireString;
use serde::Deserialize;

/// Patchlevel of the retail client the lobby accepts by default.
pub const DEFAULT_PATCHLEVEL: u32 = 11757;

/// Game port the client uses when it hosts without the bridge.
pub const DEFAULT_GAME_PORT: u32 = 5479;

/// Port value a hosting client sends when its bridge connector failed.
pub const BRIDGE_ERROR_PORT: u32 = 9999;

pub const DEFAULT_BIND: &str = "0.0.0.0:6800";

/// Message of the day. `{name}` is replaced with the user's nickname.
pub const DEFAULT_MOTD: &str = "Welcome to The Settlers II: 10th anniversary! \n\
--- you are logged in as {name} --- \n\
\n\
S2 online lobby\n\
v0.2-alpha";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LobbyConfig {
    /// Listen address.
    pub bind: String,
    /// Client patchlevel required for login and account creation.
    pub patchlevel: u32,
    /// Hosts on this port are advertised with their own address; any
    /// other port means the game runs behind the bridge on this machine.
    pub default_game_port: u32,
    pub bridge_error_port: u32,
    pub motd: String,
    /// Also post "<< name has logged in! >>" chat lines to login observers.
    pub announce_logins: bool,
    pub verify_handshake_checksum: bool,
    /// Frames queued per connection before it is dropped as too slow.
    pub outbox_capacity: usize,
    /// Period of the statistics log line; 0 disables it.
    pub stats_interval_secs: u64,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            patchlevel: DEFAULT_PATCHLEVEL,
            default_game_port: DEFAULT_GAME_PORT,
            bridge_error_port: BRIDGE_ERROR_PORT,
            motd: DEFAULT_MOTD.to_string(),
            announce_logins: true,
            verify_handshake_checksum: true,
            outbox_capacity: 256,
            stats_interval_secs: 10,
        }
    }
}

impl LobbyConfig {
    /// Parses and validates a JSON document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "bind `{}` is not a socket address",
                self.bind
            )));
        }
        if self.outbox_capacity == 0 {
            return Err(ConfigError::Invalid(
                "outbox_capacity must be at least 1".into(),
            ));
        }
        if self.default_game_port == self.bridge_error_port {
            return Err(ConfigError::Invalid(format!(
                "default_game_port and bridge_error_port are both {}",
                self.bridge_error_port
            )));
        }
        Ok(())
    }

    /// The message of the day for `name`. The name is spliced in as raw
    /// bytes, whatever its encoding.
    pub fn motd_for(&self, name: &WireString) -> WireString {
        let mut out = BytesMut::with_capacity(self.motd.len() + name.len());
        for (i, part) in self.motd.split("{name}").enumerate() {
            if i > 0 {
                out.extend_from_slice(name.as_bytes());
            }
            out.extend_from_slice(part.as_bytes());
        }
        out.freeze().into()
    }
}
