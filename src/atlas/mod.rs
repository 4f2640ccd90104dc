//! The question/answer tree and its UI state.
//!
//! - [`AtlasStore`]: single source of truth for session, nodes, edges and per-node maps
//! - [`lifecycle`]: idle/loading/resolved/error control per node
//! - [`persistence`]: debounced snapshots and rehydration
//! - [`Explorer`]: path selection, answers and branching on top of the store

mod explorer;
pub mod lifecycle;
pub mod persistence;
mod store;
mod types;

pub use explorer::*;
pub use persistence::{PersistenceBridge, PersistenceHandle, RestoreOutcome};
pub use store::*;
pub use types::*;
