//! Shared Application State
//!
//! Created once at startup and handed to every handler.

use crate::orchestrator::Orchestrator;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}
