//! BDD test world for the camwatch console

use std::sync::Arc;

use camwatch::state::ViewState;
use camwatch::{Config, Console};
use cucumber::World;

use crate::fake_backend::FakeBackend;

#[derive(Debug, Default, World)]
pub struct CamwatchWorld {
    pub backend: Arc<FakeBackend>,
    pub console: Option<Console>,
    pub last_result: Option<camwatch::Result<()>>,
}

impl CamwatchWorld {
    /// The console under test, created against the fake backend on first use
    pub fn console(&mut self) -> &Console {
        let backend = Arc::clone(&self.backend);
        self.console
            .get_or_insert_with(|| Console::new(Config::default(), backend))
    }

    /// Run `check` against the current view state
    pub async fn with_state<T>(&mut self, check: impl FnOnce(&ViewState) -> T) -> T {
        let state = self.console().state();
        let guard = state.read().await;
        check(&guard)
    }
}
