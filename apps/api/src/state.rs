use std::sync::Arc;

use crate::config::Config;
use crate::pipeline::orchestrator::Orchestrator;
use crate::pipeline::session::SessionStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Owns the components; each holds the injected model gateway.
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: Arc<SessionStore>,
    pub config: Config,
}
