//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the session store
//! and the services every handler needs.

use crate::sessions::SessionStore;
use clarify_core::orchestrator::TurnOrchestrator;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub orchestrator: Arc<TurnOrchestrator>,
    /// Seeds the history of every new session.
    pub system_prompt: Arc<String>,
}
