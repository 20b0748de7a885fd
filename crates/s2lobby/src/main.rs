//! `s2lobby` binary.
//!
//! Usage: `s2lobby [config.json]`. Without an argument the path comes from
//! `S2LOBBY_CONFIG`, and without that the built-in defaults are used.
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::process::ExitCode;

use s2lobby::{AcceptAll, LobbyConfig, LobbyError, LobbyServer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match serve().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "lobby server stopped");
            ExitCode::FAILURE
        }
    }
}

async fn serve() -> Result<(), LobbyError> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("S2LOBBY_CONFIG").ok());
    let config = match path {
        Some(path) => {
            tracing::info!(%path, "loading config");
            LobbyConfig::load(&path)?
        }
        None => LobbyConfig::default(),
    };

    let server = LobbyServer::builder().config(config).build(AcceptAll).await?;

    tokio::select! {
        result = server.run() => result,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("shutting down");
            Ok(())
        }
    }
}
