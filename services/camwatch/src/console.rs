//! The console: owns the view state and hands out the panels that act on it

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::BackendApi;
use crate::config::Config;
use crate::devices::DeviceRegistry;
use crate::error::Result;
use crate::files::FileBrowser;
use crate::io::HttpClient;
use crate::live::LivePanel;
use crate::session::SessionController;
use crate::state::{self, Notice, StateHandle};

/// Everything a panel needs, cheap to clone into background tasks
#[derive(Clone, Debug)]
pub struct ClientContext {
    pub api: BackendApi,
    pub state: StateHandle,
    pub config: Arc<Config>,
}

impl ClientContext {
    pub fn new(config: Config, http: Arc<dyn HttpClient>) -> Self {
        let api = BackendApi::new(&config.backend.base_url, http);
        Self {
            api,
            state: state::new_state_handle(),
            config: Arc::new(config),
        }
    }

    /// Username and lifetime token of the active session
    pub async fn session_scope(&self) -> Result<(String, CancellationToken)> {
        self.state.read().await.session_scope()
    }

    /// Surface a failed operation as the current notice
    pub async fn report<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            tracing::debug!("Operation failed: {}", e);
            self.state.write().await.notice = Some(Notice::from_error(e));
        }
        result
    }
}

/// Top-level owner of one operator's view of the backend
///
/// Starts logged out; login opens a session lifetime that scopes every
/// panel request, polling task and timer, and logout tears all of it down.
#[derive(Debug)]
pub struct Console {
    ctx: ClientContext,
    session: SessionController,
}

impl Console {
    pub fn new(config: Config, http: Arc<dyn HttpClient>) -> Self {
        let ctx = ClientContext::new(config, http);
        let session = SessionController::new(ctx.clone());
        Self { ctx, session }
    }

    pub fn state(&self) -> StateHandle {
        Arc::clone(&self.ctx.state)
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    pub fn api(&self) -> &BackendApi {
        &self.ctx.api
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub fn devices(&self) -> DeviceRegistry {
        DeviceRegistry::new(self.ctx.clone())
    }

    pub fn live(&self) -> LivePanel {
        LivePanel::new(self.ctx.clone())
    }

    pub fn files(&self) -> FileBrowser {
        FileBrowser::new(self.ctx.clone())
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        self.session.login(username, password).await
    }

    pub async fn logout(&self) -> Result<()> {
        self.session.logout().await
    }

    /// End the session, if any, before the process exits
    pub async fn shutdown(&self) {
        if self.ctx.state.read().await.session.is_some() {
            if let Err(e) = self.session.logout().await {
                tracing::warn!("Logout during shutdown failed: {}", e);
            }
        }
        tracing::debug!("Console shut down");
    }
}
