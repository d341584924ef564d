//! Server module for MCP protocol handling.
//!
//! This module provides:
//! - MCP server implementation over stdio
//! - Tool call handlers and routing
//! - Shared application state management

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::engine::EngineClient;
use crate::session::SessionStore;
use crate::verify::Verifier;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Process-wide store of live verification dialogues.
    pub store: SessionStore,
    /// Rule-engine service client.
    pub engine: EngineClient,
    /// Backward-verification dialogue controller.
    pub verifier: Verifier,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, engine: EngineClient) -> Self {
        let store = SessionStore::new(Duration::from_secs(config.session.idle_timeout_secs));
        let verifier = Verifier::new(store.clone(), Arc::new(engine.clone()));

        Self {
            config,
            store,
            engine,
            verifier,
        }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;
