//! Session controller: login/logout and the session lifetime

use tokio::sync::Mutex;

use crate::console::ClientContext;
use crate::devices::DeviceRegistry;
use crate::error::{CamwatchError, Result};
use crate::poller::Poller;
use crate::state::Notice;

/// Owns the login state transitions and the polling tasks of the session
#[derive(Debug)]
pub struct SessionController {
    ctx: ClientContext,
    poller: Mutex<Option<Poller>>,
}

impl SessionController {
    pub fn new(ctx: ClientContext) -> Self {
        Self {
            ctx,
            poller: Mutex::new(None),
        }
    }

    /// Log in, start background polling and load the device table once
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let opened = self.open_session(username, password).await;
        self.ctx.report(opened).await?;

        // A failed first load is surfaced as the notice; the session stays open
        if let Err(e) = DeviceRegistry::new(self.ctx.clone()).fetch_devices().await {
            tracing::debug!("Initial device fetch failed: {}", e);
        }
        Ok(())
    }

    async fn open_session(&self, username: &str, password: &str) -> Result<()> {
        let username = username.trim();
        if username.is_empty() {
            return Err(CamwatchError::Validation("Username is required".to_string()));
        }
        let current = self.ctx.state.read().await.username().map(str::to_string);
        if let Some(current) = current {
            return Err(CamwatchError::Validation(format!(
                "Already logged in as {}",
                current
            )));
        }

        let message = self.ctx.api.login(username, password).await?;

        let token = {
            let mut state = self.ctx.state.write().await;
            let token = state.begin_session(username);
            state.notice = Some(Notice::info(
                message.unwrap_or_else(|| "Login successful".to_string()),
            ));
            token
        };
        tracing::info!("Logged in as {}", username);

        let previous = self
            .poller
            .lock()
            .await
            .replace(Poller::start(self.ctx.clone(), token));
        if let Some(stale) = previous {
            stale.stop().await;
        }
        Ok(())
    }

    /// Notify the backend (best effort) and drop every session-scoped
    /// resource regardless of its answer
    pub async fn logout(&self) -> Result<()> {
        let current = self.ctx.state.read().await.username().map(str::to_string);
        let Some(username) = current else {
            return self.ctx.report(Err(CamwatchError::NotLoggedIn)).await;
        };

        if let Err(e) = self.ctx.api.logout().await {
            tracing::warn!("Backend logout for {} failed: {}", username, e);
        }

        {
            let mut state = self.ctx.state.write().await;
            state.end_session();
            state.notice = Some(Notice::info("Logged out"));
        }

        if let Some(poller) = self.poller.lock().await.take() {
            poller.stop().await;
        }
        tracing::info!("Logged out {}", username);
        Ok(())
    }

    /// Whether background polling is running
    pub async fn is_polling(&self) -> bool {
        self.poller.lock().await.is_some()
    }
}
