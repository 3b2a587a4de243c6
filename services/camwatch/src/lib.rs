//! Camwatch - Operator console for an RTSP video-surveillance backend
//!
//! Logs an operator in, keeps the device table and captured-file listings
//! fresh, and drives live streaming, recording and snapshots through the
//! backend's REST API.

pub mod api;
pub mod config;
pub mod console;
pub mod devices;
pub mod error;
pub mod files;
pub mod io;
pub mod live;
pub mod poller;
pub mod session;
pub mod shell;
pub mod state;

pub use config::{load_config, Config};
pub use console::Console;
pub use error::{CamwatchError, Result};

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::io::ReqwestHttpClient;
use crate::shell::Shell;

/// Run the interactive console on stdin until `quit`, end of input or Ctrl-C
pub async fn run(config: Config) -> Result<()> {
    config.validate()?;

    let timeout = Duration::from_secs(config.backend.request_timeout_seconds);
    let http: Arc<dyn io::HttpClient> = Arc::new(ReqwestHttpClient::new(timeout)?);
    let console = Console::new(config, http);
    let cancel = CancellationToken::new();

    // Setup shutdown handler
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                cancel_for_signal.cancel();
            }
            Err(e) => tracing::warn!("Failed to listen for ctrl-c: {}", e),
        }
    });

    tracing::info!("Camwatch console started");
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    Shell::new(console).run(stdin, cancel).await?;
    tracing::info!("Camwatch console stopped");

    Ok(())
}
