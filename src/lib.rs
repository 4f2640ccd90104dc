//! # Knowledge Atlas
//!
//! Turns a piece of source text into a growing tree of question/answer
//! nodes that a user can branch through.
//!
//! ## Features
//!
//! - **Six exploration paths**: clarify, go deeper, challenge, apply, connect, surprise
//! - **Deterministic generation**: offline, hash-seeded content that always works
//! - **Remote generation**: Gemini-backed questions and answers with 429 backoff
//! - **Quality gates**: specificity, uniqueness and yes/no rejection with bounded retries
//! - **One-way fallback**: a remote failure switches the session to demo mode
//! - **Tree store**: forest invariants, lifecycle states, collapsed branches, active thread
//! - **Persistence**: debounced canvas snapshots in SQLite, rehydrated on load
//!
//! ## Architecture
//!
//! ```text
//! Explorer → GenerationDispatcher → DeterministicGenerator
//!    ↓                    ↘ RemoteGenerator → Gemini API (HTTP)
//! AtlasStore → PersistenceBridge → SQLite (key/value)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use knowledge_atlas::atlas::{AtlasStore, Explorer, Session};
//! use knowledge_atlas::generation::{DeterministicGenerator, PathType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = AtlasStore::with_session(Session::from_selection("Bees dance to share directions.", false));
//!     let explorer = Explorer::new(store.clone(), Arc::new(DeterministicGenerator::instant()));
//!     explorer.choose_path(PathType::Connect).await?;
//!     println!("{:?}", store.active_thread());
//!     Ok(())
//! }
//! ```

/// Question tree, lifecycle, persistence bridge and exploration flows.
pub mod atlas;
/// Command-line interface.
pub mod cli;
/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Generative-language API client.
pub mod gemini;
/// Generation providers, quality gates and the dispatcher.
pub mod generation;
/// Prompt templates for the generative-language API.
pub mod prompts;
/// SQLite key/value storage.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
