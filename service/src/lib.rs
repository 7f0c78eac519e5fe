use config::Config;
use std::sync::Arc;
use store::SessionStore;

pub mod config;
pub mod logging;
pub mod store;

// Service-level state containing only infrastructure concerns
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub session_store: Arc<dyn SessionStore>,
    pub sse_manager: Arc<sse::Manager>,
    pub config: Config,
}

impl AppState {
    pub fn new(
        config: Config,
        session_store: Arc<dyn SessionStore>,
        sse_manager: Arc<sse::Manager>,
    ) -> Self {
        Self {
            session_store,
            sse_manager,
            config,
        }
    }
}
