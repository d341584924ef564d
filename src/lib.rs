//! # MCP Animal Expert Server
//!
//! A Model Context Protocol (MCP) server exposing an animal-identification
//! expert system. Rule storage and both inference engines live in a remote
//! rule service; this server owns the one stateful part: the interactive
//! backward-verification dialogue.
//!
//! ## Features
//!
//! - **Verification Dialogues**: multi-turn backward-chaining sessions that
//!   confirm or refute a target animal one feature question at a time, with
//!   ternary yes/no/unknown answers and a rule trace for explainability
//! - **Session Store**: process-wide keyed store with per-session locking
//!   and idle expiry
//! - **Forward Chaining**: single-shot derivation from observed features
//!   (pass-through to the rule service)
//! - **Rule CRUD**: list, create, update and delete production rules
//!   (pass-through)
//!
//! ## Architecture
//!
//! ```text
//! MCP Client → MCP Server (Rust) → Rule Engine Service (HTTP)
//!                    ↓
//!          In-memory session store
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mcp_animal_expert::{AppState, Config, McpServer};
//! use mcp_animal_expert::engine::EngineClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let engine = EngineClient::new(&config.engine, config.request.clone())?;
//!     let state = Arc::new(AppState::new(config, engine));
//!     let server = McpServer::new(state);
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Configuration management for the MCP server.
pub mod config;
/// Rule-engine service client and wire types.
pub mod engine;
/// Error types and result aliases for the application.
pub mod error;
/// MCP server implementation and request handling.
pub mod server;
/// Verification session state and the keyed session store.
pub mod session;
/// The backward-verification dialogue controller.
pub mod verify;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{AppState, McpServer, SharedState};
