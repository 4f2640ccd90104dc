//! Per-node answer-generation state machine.
//!
//! ```text
//! idle -> loading -> resolved
//!            |
//!            v
//!          error -> loading
//! ```
//!
//! `resolved` is terminal. Illegal transitions leave the state unchanged and
//! are logged; they are not errors.

use tracing::{info, warn};

use super::store::{AtlasStore, Transition};
use super::types::NodeState;

impl NodeState {
    /// States from which `self` may be entered.
    pub fn legal_sources(&self) -> &'static [NodeState] {
        match self {
            NodeState::Idle => &[],
            NodeState::Loading => &[NodeState::Idle, NodeState::Error],
            NodeState::Resolved => &[NodeState::Loading],
            NodeState::Error => &[NodeState::Loading],
        }
    }

    pub fn can_transition_to(&self, target: NodeState) -> bool {
        target.legal_sources().contains(self)
    }
}

/// Attempt a transition; returns whether it was applied.
pub fn transition(store: &AtlasStore, node_id: &str, target: NodeState) -> bool {
    match store.transition_node_state(node_id, target.legal_sources(), target) {
        Ok(Transition::Applied { from, to }) => {
            info!(node_id, %from, %to, "Node state changed");
            true
        }
        Ok(Transition::Rejected { current, requested }) => {
            warn!(
                node_id,
                %current,
                %requested,
                "Invalid node state transition"
            );
            false
        }
        Err(e) => {
            warn!(node_id, error = %e, "Node state transition on unknown node");
            false
        }
    }
}

pub fn is_loading(store: &AtlasStore, node_id: &str) -> bool {
    store.node_state(node_id) == NodeState::Loading
}

/// `idle -> loading`; a node already loading is rejected outright.
pub fn start_generation(store: &AtlasStore, node_id: &str) -> bool {
    if is_loading(store, node_id) {
        warn!(node_id, "Node is already loading, skipping duplicate call");
        return false;
    }
    transition(store, node_id, NodeState::Loading)
}

/// `loading -> resolved`
pub fn mark_resolved(store: &AtlasStore, node_id: &str) -> bool {
    transition(store, node_id, NodeState::Resolved)
}

/// `loading -> error`
pub fn mark_error(store: &AtlasStore, node_id: &str) -> bool {
    transition(store, node_id, NodeState::Error)
}

/// `error -> loading`
pub fn retry_generation(store: &AtlasStore, node_id: &str) -> bool {
    transition(store, node_id, NodeState::Loading)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::{AtlasNode, AtlasNodeData, Position};
    use crate::generation::PathType;

    fn store_with(id: &str) -> AtlasStore {
        let store = AtlasStore::new();
        store
            .add_node(AtlasNode::new(
                id,
                Position::default(),
                AtlasNodeData::new("Q?", PathType::GoDeeper, "src"),
            ))
            .unwrap();
        store
    }

    #[test]
    fn test_transition_table() {
        use NodeState::*;
        let legal = [(Idle, Loading), (Loading, Resolved), (Loading, Error), (Error, Loading)];
        for from in [Idle, Loading, Resolved, Error] {
            for to in [Idle, Loading, Resolved, Error] {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_happy_path_and_terminal_resolved() {
        let store = store_with("n");
        assert!(start_generation(&store, "n"));
        assert!(mark_resolved(&store, "n"));
        assert_eq!(store.node_state("n"), NodeState::Resolved);

        assert!(!start_generation(&store, "n"));
        assert!(!mark_error(&store, "n"));
        assert_eq!(store.node_state("n"), NodeState::Resolved);
    }

    #[test]
    fn test_duplicate_start_rejected() {
        let store = store_with("n");
        assert!(start_generation(&store, "n"));
        assert!(!start_generation(&store, "n"));
        assert_eq!(store.node_state("n"), NodeState::Loading);
    }

    #[test]
    fn test_error_then_retry() {
        let store = store_with("m");
        assert!(start_generation(&store, "m"));
        assert!(mark_error(&store, "m"));
        assert!(!mark_resolved(&store, "m"));
        assert!(retry_generation(&store, "m"));
        assert!(mark_resolved(&store, "m"));
    }

    #[test]
    fn test_unknown_node_is_rejected() {
        let store = AtlasStore::new();
        assert!(!start_generation(&store, "ghost"));
    }
}
