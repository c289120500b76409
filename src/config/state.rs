// Application state module
// Read-only state shared by every connection task

use crate::cors::OriginPolicy;
use crate::dispatch::Dispatcher;

use super::types::Config;

/// Application state
///
/// Built once at startup and shared via `Arc`; nothing in here mutates
/// after construction, so no locking is needed on the request path.
pub struct AppState {
    pub config: Config,
    pub cors: OriginPolicy,
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(config: Config, dispatcher: Dispatcher) -> Self {
        let cors = OriginPolicy::new(config.cors.allowed_origins.clone());
        Self {
            config,
            cors,
            dispatcher,
        }
    }
}
