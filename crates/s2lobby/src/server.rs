//! `LobbyServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → registry, with one
//! session task per connection.

use std::sync::Arc;
use std::time::Duration;

use s2lobby_protocol::{Codec, SchemaCodec};
use s2lobby_registry::LobbyRegistry;
use s2lobby_transport::{Checksum, TcpTransport, Transport, WordSumChecksum};

use crate::LobbyError;
use crate::auth::Authenticator;
use crate::broadcast::Broadcaster;
use crate::config::LobbyConfig;
use crate::handler::handle_connection;

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<A: Authenticator, C: Codec> {
    pub(crate) config: LobbyConfig,
    pub(crate) registry: Arc<LobbyRegistry>,
    pub(crate) broadcast: Broadcaster<C>,
    pub(crate) auth: A,
    pub(crate) codec: C,
    pub(crate) checksum: Arc<dyn Checksum>,
}

/// Builder for configuring and starting a lobby server.
///
/// # Example
///
/// ```rust,ignore
/// use s2lobby::{AcceptAll, LobbyServer};
///
/// let server = LobbyServer::builder()
///     .bind("0.0.0.0:6800")
///     .build(AcceptAll)
///     .await?;
/// server.run().await
/// ```
pub struct LobbyServerBuilder {
    config: LobbyConfig,
    checksum: Arc<dyn Checksum>,
}

impl LobbyServerBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: LobbyConfig::default(),
            checksum: Arc::new(WordSumChecksum),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: LobbyConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    /// Sets the frame checksum used on both directions.
    pub fn checksum(mut self, checksum: Arc<dyn Checksum>) -> Self {
        self.checksum = checksum;
        self
    }

    /// Validates the configuration and binds the listener.
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<LobbyServer<A, SchemaCodec>, LobbyError> {
        self.config.validate()?;
        let transport = TcpTransport::bind(&self.config.bind).await?;

        let registry = Arc::new(LobbyRegistry::new());
        let broadcast = Broadcaster::new(
            Arc::clone(&registry),
            SchemaCodec,
            self.config.announce_logins,
        );
        let state = Arc::new(ServerState {
            config: self.config,
            registry,
            broadcast,
            auth,
            codec: SchemaCodec,
            checksum: self.checksum,
        });

        Ok(LobbyServer { transport, state })
    }
}

impl Default for LobbyServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound lobby server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct LobbyServer<A: Authenticator, C: Codec> {
    transport: TcpTransport,
    state: Arc<ServerState<A, C>>,
}

impl LobbyServer<crate::AcceptAll, SchemaCodec> {
    /// Creates a new builder.
    pub fn builder() -> LobbyServerBuilder {
        LobbyServerBuilder::new()
    }
}

impl<A: Authenticator, C: Codec> LobbyServer<A, C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The shared registry, for inspection.
    pub fn registry(&self) -> Arc<LobbyRegistry> {
        Arc::clone(&self.state.registry)
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(mut self) -> Result<(), LobbyError> {
        tracing::info!(
            addr = %self.state.config.bind,
            patchlevel = self.state.config.patchlevel,
            "lobby server running"
        );
        if self.state.config.stats_interval_secs > 0 {
            tokio::spawn(log_stats(
                Arc::clone(&self.state.registry),
                Duration::from_secs(self.state.config.stats_interval_secs),
            ));
        }

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Logs the registry counters every `period`.
async fn log_stats(registry: Arc<LobbyRegistry>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let stats = registry.stats().await;
        tracing::info!(
            users = stats.users,
            last_uid = stats.last_uid,
            rooms = stats.rooms,
            "lobby stats"
        );
    }
}
