//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::session::SessionHandle;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub session: SessionHandle,
}

impl AppState {
    pub fn new(config: Config, session: SessionHandle) -> Self {
        Self {
            config: Arc::new(config),
            session,
        }
    }
}
