//! The authoritative in-memory tree and UI state.
//!
//! [`AtlasStore`] is a cheap cloneable handle. Reads take a snapshot under a
//! short read lock; every action is one write-locked update that emits exactly
//! one [`StoreEvent`] to subscribers. Rejected actions change nothing and emit
//! nothing.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::types::{
    AtlasEdge, AtlasNode, BranchSummary, CanvasSnapshot, CollapsedBranch, EdgeChange, NodeChange,
    NodeDataPatch, NodeState, Session, UiMode,
};
use crate::error::{StoreError, StoreResult};

const EVENT_CAPACITY: usize = 256;

/// Notification emitted after each applied action.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    NodesAdded { node_ids: Vec<String> },
    EdgesAdded { edge_ids: Vec<String> },
    NodeDataUpdated { node_id: String },
    ActiveNodeChanged { node_id: Option<String> },
    AnswerVisibilityChanged { node_id: String, visible: bool },
    NodeStateChanged { node_id: String, state: NodeState },
    UiModeChanged { mode: UiMode },
    SessionChanged { session_id: String },
    SessionLoaded { session_id: String, rehydrated: bool },
    BranchCollapsed { node_id: String },
    BranchExpanded { node_id: String },
    NodesChanged { count: usize },
    EdgesChanged { count: usize },
    Rehydrated,
    Reset,
}

impl StoreEvent {
    /// Whether the session record itself changed.
    pub fn touches_session(&self) -> bool {
        matches!(
            self,
            StoreEvent::SessionChanged { .. } | StoreEvent::SessionLoaded { .. }
        )
    }
}

/// Result of a compare-and-set on a node's lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied { from: NodeState, to: NodeState },
    Rejected { current: NodeState, requested: NodeState },
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied { .. })
    }
}

/// Full store contents.
#[derive(Debug, Clone, Default)]
pub struct AtlasState {
    pub nodes: Vec<AtlasNode>,
    pub edges: Vec<AtlasEdge>,
    pub session: Option<Session>,
    pub active_node_id: Option<String>,
    pub ui_mode: UiMode,
    pub answer_visibility: BTreeMap<String, bool>,
    pub node_states: BTreeMap<String, NodeState>,
    pub collapsed_branches: BTreeMap<String, CollapsedBranch>,
    /// child id -> parent id
    parent_index: HashMap<String, String>,
    epoch: u64,
}

impl AtlasState {
    pub fn node(&self, node_id: &str) -> Option<&AtlasNode> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    fn node_mut(&mut self, node_id: &str) -> Option<&mut AtlasNode> {
        self.nodes.iter_mut().find(|n| n.id == node_id)
    }

    pub fn contains_node(&self, node_id: &str) -> bool {
        self.node(node_id).is_some()
    }

    pub fn node_state(&self, node_id: &str) -> NodeState {
        self.node_states.get(node_id).copied().unwrap_or_default()
    }

    pub fn is_answer_visible(&self, node_id: &str) -> bool {
        self.answer_visibility.get(node_id).copied().unwrap_or(false)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn parent_of(&self, node_id: &str) -> Option<&str> {
        self.parent_index.get(node_id).map(String::as_str)
    }

    /// Children in edge insertion order.
    pub fn children_of(&self, node_id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.source == node_id)
            .map(|e| e.target.as_str())
            .collect()
    }

    /// First node without an incoming edge.
    pub fn root_node_id(&self) -> Option<&str> {
        self.nodes
            .iter()
            .find(|n| !self.parent_index.contains_key(&n.id))
            .map(|n| n.id.as_str())
    }

    /// Node ids from the root down to `node_id`.
    pub fn path_to(&self, node_id: &str) -> Vec<String> {
        if !self.contains_node(node_id) {
            return Vec::new();
        }
        let mut path = vec![node_id.to_string()];
        let mut current = node_id;
        while let Some(parent) = self.parent_of(current) {
            path.push(parent.to_string());
            current = parent;
        }
        path.reverse();
        path
    }

    /// Root to active node.
    pub fn active_thread(&self) -> Vec<String> {
        self.active_node_id
            .as_deref()
            .map(|id| self.path_to(id))
            .unwrap_or_default()
    }

    /// Edge ids along the active thread.
    pub fn active_thread_edges(&self) -> Vec<String> {
        let thread = self.active_thread();
        thread
            .windows(2)
            .filter_map(|pair| {
                self.edges
                    .iter()
                    .find(|e| e.source == pair[0] && e.target == pair[1])
                    .map(|e| e.id.clone())
            })
            .collect()
    }

    /// All descendants of `node_id`, breadth first.
    pub fn descendants_of(&self, node_id: &str) -> Vec<String> {
        let mut found = Vec::new();
        let mut queue: VecDeque<&str> = self.children_of(node_id).into_iter().collect();
        while let Some(id) = queue.pop_front() {
            found.push(id.to_string());
            queue.extend(self.children_of(id));
        }
        found
    }

    fn is_hidden(&self, node_id: &str) -> bool {
        let mut current = node_id;
        while let Some(parent) = self.parent_of(current) {
            if self.collapsed_branches.contains_key(parent) {
                return true;
            }
            current = parent;
        }
        false
    }

    /// Nodes not beneath a collapsed branch.
    pub fn visible_node_ids(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| !self.is_hidden(&n.id))
            .map(|n| n.id.clone())
            .collect()
    }

    /// Every question currently in the tree.
    pub fn existing_questions(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.data.question.clone()).collect()
    }

    pub fn snapshot(&self) -> CanvasSnapshot {
        CanvasSnapshot {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            active_node_id: self.active_node_id.clone(),
            ui_mode: self.ui_mode,
            answer_visibility: self.answer_visibility.clone(),
            node_states: self.node_states.clone(),
            collapsed_branches: self.collapsed_branches.clone(),
        }
    }

    fn clear_tree(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.active_node_id = None;
        self.ui_mode = UiMode::Compass;
        self.answer_visibility.clear();
        self.node_states.clear();
        self.collapsed_branches.clear();
        self.parent_index.clear();
    }

    /// Install a snapshot; nothing changes when its edges do not form a forest.
    fn apply_snapshot(&mut self, snapshot: CanvasSnapshot) -> StoreResult<()> {
        self.parent_index = validate_snapshot(&snapshot)?;
        self.nodes = snapshot.nodes;
        self.edges = snapshot.edges;
        self.active_node_id = snapshot.active_node_id;
        self.ui_mode = snapshot.ui_mode;
        self.answer_visibility = snapshot.answer_visibility;
        self.node_states = snapshot.node_states;
        self.collapsed_branches = snapshot.collapsed_branches;
        Ok(())
    }

    fn require_node(&self, node_id: &str) -> StoreResult<()> {
        if self.contains_node(node_id) {
            Ok(())
        } else {
            Err(StoreError::UnknownNode {
                node_id: node_id.to_string(),
            })
        }
    }

    /// Validate an edge against the tree plus edges staged earlier in the batch.
    fn validate_edge(&self, edge: &AtlasEdge, staged: &HashMap<String, String>) -> StoreResult<()> {
        self.require_node(&edge.source)?;
        self.require_node(&edge.target)?;

        if edge.source == edge.target {
            return Err(StoreError::SelfLoop {
                node_id: edge.source.clone(),
            });
        }

        let parent_of = |id: &str| {
            staged
                .get(id)
                .or_else(|| self.parent_index.get(id))
                .cloned()
        };

        if let Some(parent_id) = parent_of(&edge.target) {
            return Err(StoreError::MultipleParents {
                node_id: edge.target.clone(),
                parent_id,
            });
        }

        // The target is a root here, so a cycle means it is an ancestor of the source.
        let mut current = Some(edge.source.clone());
        while let Some(id) = current {
            if id == edge.target {
                return Err(StoreError::Cycle {
                    source_id: edge.source.clone(),
                    target_id: edge.target.clone(),
                });
            }
            current = parent_of(&id);
        }

        Ok(())
    }
}

/// Replay a snapshot's edges against its nodes and return the parent index.
///
/// Fails on duplicate node ids, unknown endpoints, self-loops, second parents
/// and cycles, exactly as [`AtlasStore::add_edges`] would.
pub fn validate_snapshot(snapshot: &CanvasSnapshot) -> StoreResult<HashMap<String, String>> {
    let mut seen = HashSet::new();
    for node in &snapshot.nodes {
        if !seen.insert(node.id.as_str()) {
            return Err(StoreError::DuplicateNode {
                node_id: node.id.clone(),
            });
        }
    }

    let staging = AtlasState {
        nodes: snapshot.nodes.clone(),
        ..Default::default()
    };
    let mut index = HashMap::new();
    for edge in &snapshot.edges {
        staging.validate_edge(edge, &index)?;
        index.insert(edge.target.clone(), edge.source.clone());
    }
    Ok(index)
}

/// Shared handle to the tree/session state.
#[derive(Clone)]
pub struct AtlasStore {
    state: Arc<RwLock<AtlasState>>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for AtlasStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AtlasStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(AtlasState::default())),
            events,
        }
    }

    /// Store seeded with a session.
    pub fn with_session(session: Session) -> Self {
        let store = Self::new();
        store.state.write().session = Some(session);
        store
    }

    /// Subscribe to events of subsequent actions.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the whole state.
    pub fn state(&self) -> AtlasState {
        self.state.read().clone()
    }

    /// Run a read-only query under the lock.
    pub fn read<R>(&self, f: impl FnOnce(&AtlasState) -> R) -> R {
        f(&self.state.read())
    }

    /// Apply an action; the event is published only when it succeeds.
    fn mutate<R>(
        &self,
        action: impl FnOnce(&mut AtlasState) -> StoreResult<(R, Option<StoreEvent>)>,
    ) -> StoreResult<R> {
        let mut state = self.state.write();
        let (value, event) = action(&mut state)?;
        if let Some(event) = event {
            debug!(?event, "Store updated");
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
        Ok(value)
    }

    // --- reads ---

    pub fn session(&self) -> Option<Session> {
        self.read(|s| s.session.clone())
    }

    pub fn epoch(&self) -> u64 {
        self.read(|s| s.epoch)
    }

    pub fn node(&self, node_id: &str) -> Option<AtlasNode> {
        self.read(|s| s.node(node_id).cloned())
    }

    pub fn node_state(&self, node_id: &str) -> NodeState {
        self.read(|s| s.node_state(node_id))
    }

    pub fn root_node_id(&self) -> Option<String> {
        self.read(|s| s.root_node_id().map(str::to_string))
    }

    pub fn parent_of(&self, node_id: &str) -> Option<String> {
        self.read(|s| s.parent_of(node_id).map(str::to_string))
    }

    pub fn children_of(&self, node_id: &str) -> Vec<String> {
        self.read(|s| s.children_of(node_id).into_iter().map(str::to_string).collect())
    }

    pub fn active_thread(&self) -> Vec<String> {
        self.read(AtlasState::active_thread)
    }

    pub fn active_thread_edges(&self) -> Vec<String> {
        self.read(AtlasState::active_thread_edges)
    }

    pub fn visible_node_ids(&self) -> Vec<String> {
        self.read(AtlasState::visible_node_ids)
    }

    pub fn existing_questions(&self) -> Vec<String> {
        self.read(AtlasState::existing_questions)
    }

    pub fn snapshot(&self) -> CanvasSnapshot {
        self.read(AtlasState::snapshot)
    }

    // --- node/edge actions ---

    pub fn add_node(&self, node: AtlasNode) -> StoreResult<()> {
        self.add_nodes(vec![node])
    }

    /// Insert nodes; any duplicate id rejects the whole batch.
    pub fn add_nodes(&self, nodes: Vec<AtlasNode>) -> StoreResult<()> {
        self.mutate(|state| {
            let mut seen = HashSet::new();
            for node in &nodes {
                if state.contains_node(&node.id) || !seen.insert(node.id.as_str()) {
                    return Err(StoreError::DuplicateNode {
                        node_id: node.id.clone(),
                    });
                }
            }
            let node_ids = nodes.iter().map(|n| n.id.clone()).collect();
            state.nodes.extend(nodes);
            Ok(((), Some(StoreEvent::NodesAdded { node_ids })))
        })
    }

    pub fn add_edge(&self, edge: AtlasEdge) -> StoreResult<()> {
        self.add_edges(vec![edge])
    }

    /// Insert edges, keeping the edge set a forest; all-or-nothing.
    pub fn add_edges(&self, edges: Vec<AtlasEdge>) -> StoreResult<()> {
        self.mutate(|state| {
            let mut staged = HashMap::new();
            for edge in &edges {
                state.validate_edge(edge, &staged)?;
                staged.insert(edge.target.clone(), edge.source.clone());
            }
            let edge_ids = edges.iter().map(|e| e.id.clone()).collect();
            state.parent_index.extend(staged);
            state.edges.extend(edges);
            Ok(((), Some(StoreEvent::EdgesAdded { edge_ids })))
        })
    }

    pub fn update_node_data(&self, node_id: &str, patch: NodeDataPatch) -> StoreResult<()> {
        self.mutate(|state| {
            let node = state.node_mut(node_id).ok_or_else(|| StoreError::UnknownNode {
                node_id: node_id.to_string(),
            })?;
            patch.apply(&mut node.data);
            Ok((
                (),
                Some(StoreEvent::NodeDataUpdated {
                    node_id: node_id.to_string(),
                }),
            ))
        })
    }

    // --- UI state actions ---

    pub fn set_active_node(&self, node_id: Option<&str>) -> StoreResult<()> {
        self.mutate(|state| {
            if let Some(id) = node_id {
                state.require_node(id)?;
            }
            state.active_node_id = node_id.map(str::to_string);
            Ok((
                (),
                Some(StoreEvent::ActiveNodeChanged {
                    node_id: state.active_node_id.clone(),
                }),
            ))
        })
    }

    /// Flip a node's answer visibility; returns the new value.
    pub fn toggle_answer(&self, node_id: &str) -> StoreResult<bool> {
        self.mutate(|state| {
            state.require_node(node_id)?;
            let visible = !state.is_answer_visible(node_id);
            state.answer_visibility.insert(node_id.to_string(), visible);
            Ok((
                visible,
                Some(StoreEvent::AnswerVisibilityChanged {
                    node_id: node_id.to_string(),
                    visible,
                }),
            ))
        })
    }

    pub fn set_answer_visibility(&self, node_id: &str, visible: bool) -> StoreResult<()> {
        self.mutate(|state| {
            state.require_node(node_id)?;
            state.answer_visibility.insert(node_id.to_string(), visible);
            Ok((
                (),
                Some(StoreEvent::AnswerVisibilityChanged {
                    node_id: node_id.to_string(),
                    visible,
                }),
            ))
        })
    }

    /// Overwrite a node's lifecycle state without checking legality.
    pub fn set_node_state(&self, node_id: &str, node_state: NodeState) -> StoreResult<()> {
        self.mutate(|state| {
            state.require_node(node_id)?;
            state.node_states.insert(node_id.to_string(), node_state);
            Ok((
                (),
                Some(StoreEvent::NodeStateChanged {
                    node_id: node_id.to_string(),
                    state: node_state,
                }),
            ))
        })
    }

    /// Atomically move a node to `target` if its current state is in `allowed_from`.
    pub fn transition_node_state(
        &self,
        node_id: &str,
        allowed_from: &[NodeState],
        target: NodeState,
    ) -> StoreResult<Transition> {
        self.mutate(|state| {
            state.require_node(node_id)?;
            let current = state.node_state(node_id);
            if !allowed_from.contains(&current) {
                let rejected = Transition::Rejected {
                    current,
                    requested: target,
                };
                return Ok((rejected, None));
            }
            state.node_states.insert(node_id.to_string(), target);
            Ok((
                Transition::Applied {
                    from: current,
                    to: target,
                },
                Some(StoreEvent::NodeStateChanged {
                    node_id: node_id.to_string(),
                    state: target,
                }),
            ))
        })
    }

    pub fn set_ui_mode(&self, mode: UiMode) {
        // Infallible action.
        let _ = self.mutate(|state| {
            state.ui_mode = mode;
            Ok(((), Some(StoreEvent::UiModeChanged { mode })))
        });
    }

    // --- session actions ---

    /// Replace the session; switching to another session id starts a new epoch.
    pub fn set_session(&self, session: Session) {
        let _ = self.mutate(|state| {
            let switched = state
                .session
                .as_ref()
                .map_or(true, |s| s.session_id != session.session_id);
            if switched {
                state.epoch += 1;
            }
            let session_id = session.session_id.clone();
            state.session = Some(session);
            Ok(((), Some(StoreEvent::SessionChanged { session_id })))
        });
    }

    /// Set the session's demo flag; returns whether anything changed.
    pub fn set_demo_mode(&self, demo_mode: bool) -> bool {
        self.mutate(|state| match state.session.as_mut() {
            Some(session) if session.demo_mode != demo_mode => {
                session.demo_mode = demo_mode;
                let session_id = session.session_id.clone();
                Ok((true, Some(StoreEvent::SessionChanged { session_id })))
            }
            _ => Ok((false, None)),
        })
        .unwrap_or(false)
    }

    /// Install a session together with its persisted canvas, or a blank
    /// compass when there is none or it is not a valid forest.
    pub fn load_session(&self, session: Session, snapshot: Option<CanvasSnapshot>) {
        let _ = self.mutate(|state| {
            state.epoch += 1;
            let rehydrated = match snapshot.map(|s| state.apply_snapshot(s)) {
                Some(Ok(())) => true,
                Some(Err(e)) => {
                    warn!(session_id = %session.session_id, error = %e, "Invalid canvas snapshot, starting fresh");
                    state.clear_tree();
                    false
                }
                None => {
                    state.clear_tree();
                    false
                }
            };
            let session_id = session.session_id.clone();
            state.session = Some(session);
            Ok((
                (),
                Some(StoreEvent::SessionLoaded {
                    session_id,
                    rehydrated,
                }),
            ))
        });
    }

    /// Replace the tree and UI state wholesale from a snapshot.
    ///
    /// A snapshot whose edges are not a forest is rejected and the store is
    /// left as it was.
    pub fn rehydrate(&self, snapshot: CanvasSnapshot) -> StoreResult<()> {
        self.mutate(|state| {
            state.apply_snapshot(snapshot)?;
            Ok(((), Some(StoreEvent::Rehydrated)))
        })
    }

    /// Clear the tree and UI state, keeping the session.
    pub fn reset(&self) {
        let _ = self.mutate(|state| {
            state.clear_tree();
            state.epoch += 1;
            Ok(((), Some(StoreEvent::Reset)))
        });
    }

    // --- branch collapse ---

    /// Hide the subtree under `node_id` behind a summary.
    ///
    /// If the active node becomes hidden, focus moves to `node_id`.
    pub fn collapse_branch(&self, node_id: &str) -> StoreResult<BranchSummary> {
        self.mutate(|state| {
            state.require_node(node_id)?;
            let hidden_node_ids = state.descendants_of(node_id);

            let answers: Vec<&str> = hidden_node_ids
                .iter()
                .filter_map(|id| state.node(id))
                .filter_map(|n| n.data.answer.as_ref())
                .map(|a| a.summary.as_str())
                .collect();
            let summary = BranchSummary {
                hidden_count: hidden_node_ids.len(),
                answered_count: answers.len(),
                sample_summaries: answers.iter().take(3).map(|s| s.to_string()).collect(),
            };

            if let Some(active) = state.active_node_id.as_ref() {
                if hidden_node_ids.contains(active) {
                    state.active_node_id = Some(node_id.to_string());
                }
            }

            state.collapsed_branches.insert(
                node_id.to_string(),
                CollapsedBranch {
                    hidden_node_ids,
                    summary: summary.clone(),
                },
            );
            Ok((
                summary,
                Some(StoreEvent::BranchCollapsed {
                    node_id: node_id.to_string(),
                }),
            ))
        })
    }

    /// Show a collapsed subtree again; `false` if it was not collapsed.
    pub fn expand_branch(&self, node_id: &str) -> bool {
        self.mutate(|state| {
            if state.collapsed_branches.remove(node_id).is_none() {
                return Ok((false, None));
            }
            Ok((
                true,
                Some(StoreEvent::BranchExpanded {
                    node_id: node_id.to_string(),
                }),
            ))
        })
        .unwrap_or(false)
    }

    // --- rendering surface pass-through ---

    /// Apply position/selection/size changes; unknown ids are ignored.
    pub fn apply_node_changes(&self, changes: Vec<NodeChange>) {
        let _ = self.mutate(|state| {
            let count = changes.len();
            for change in changes {
                match change {
                    NodeChange::Position { id, position } => {
                        if let Some(node) = state.node_mut(&id) {
                            node.position = position;
                        }
                    }
                    NodeChange::Select { id, selected } => {
                        if let Some(node) = state.node_mut(&id) {
                            node.selected = selected;
                        }
                    }
                    NodeChange::Dimensions { id, dimensions } => {
                        if let Some(node) = state.node_mut(&id) {
                            node.measured = Some(dimensions);
                        }
                    }
                }
            }
            Ok(((), Some(StoreEvent::NodesChanged { count })))
        });
    }

    pub fn apply_edge_changes(&self, changes: Vec<EdgeChange>) {
        let _ = self.mutate(|state| {
            let count = changes.len();
            for change in changes {
                match change {
                    EdgeChange::Select { id, selected } => {
                        if let Some(edge) = state.edges.iter_mut().find(|e| e.id == id) {
                            edge.selected = selected;
                        }
                    }
                }
            }
            Ok(((), Some(StoreEvent::EdgesChanged { count })))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::{AtlasNodeData, Position};
    use crate::generation::PathType;

    fn node(id: &str) -> AtlasNode {
        AtlasNode::new(
            id,
            Position::default(),
            AtlasNodeData::new(format!("Question {}?", id), PathType::Clarify, "src"),
        )
    }

    fn tree(store: &AtlasStore) {
        store
            .add_nodes(vec![node("a"), node("b"), node("c"), node("d")])
            .unwrap();
        store
            .add_edges(vec![
                AtlasEdge::connect("a", "b"),
                AtlasEdge::connect("a", "c"),
                AtlasEdge::connect("b", "d"),
            ])
            .unwrap();
    }

    #[test]
    fn test_parent_index_and_traversal() {
        let store = AtlasStore::new();
        tree(&store);

        assert_eq!(store.root_node_id().as_deref(), Some("a"));
        assert_eq!(store.parent_of("d").as_deref(), Some("b"));
        assert_eq!(store.children_of("a"), vec!["b", "c"]);

        store.set_active_node(Some("d")).unwrap();
        assert_eq!(store.active_thread(), vec!["a", "b", "d"]);
        assert_eq!(store.active_thread_edges(), vec!["e-a-b", "e-b-d"]);
    }

    #[test]
    fn test_edge_batch_is_all_or_nothing() {
        let store = AtlasStore::new();
        store.add_nodes(vec![node("a"), node("b"), node("c")]).unwrap();

        let err = store
            .add_edges(vec![AtlasEdge::connect("a", "b"), AtlasEdge::connect("c", "b")])
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::MultipleParents {
                node_id: "b".to_string(),
                parent_id: "a".to_string(),
            }
        );
        assert!(store.state().edges.is_empty());
        assert!(store.parent_of("b").is_none());
    }

    #[test]
    fn test_rejected_action_emits_nothing() {
        let store = AtlasStore::new();
        let mut rx = store.subscribe();

        assert!(store.add_edge(AtlasEdge::connect("x", "y")).is_err());
        assert!(store.set_active_node(Some("x")).is_err());
        assert!(!store.set_demo_mode(true));
        assert!(rx.try_recv().is_err());

        store.add_node(node("a")).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            StoreEvent::NodesAdded {
                node_ids: vec!["a".to_string()]
            }
        );
    }

    #[test]
    fn test_transition_is_compare_and_set() {
        let store = AtlasStore::new();
        store.add_node(node("a")).unwrap();

        let first = store
            .transition_node_state("a", &[NodeState::Idle], NodeState::Loading)
            .unwrap();
        assert!(first.is_applied());

        let second = store
            .transition_node_state("a", &[NodeState::Idle], NodeState::Loading)
            .unwrap();
        assert_eq!(
            second,
            Transition::Rejected {
                current: NodeState::Loading,
                requested: NodeState::Loading,
            }
        );
    }

    #[test]
    fn test_reset_keeps_session_and_bumps_epoch() {
        let store = AtlasStore::with_session(Session::from_selection("text", false));
        tree(&store);
        store.set_ui_mode(UiMode::Exploring);
        let epoch = store.epoch();

        store.reset();
        let state = store.state();
        assert!(state.nodes.is_empty());
        assert!(state.edges.is_empty());
        assert_eq!(state.ui_mode, UiMode::Compass);
        assert!(state.session.is_some());
        assert!(store.root_node_id().is_none());
        assert_eq!(store.epoch(), epoch + 1);
    }

    #[test]
    fn test_set_session_epoch_only_on_switch() {
        let session = Session::from_selection("text", false);
        let store = AtlasStore::new();
        store.set_session(session.clone());
        let epoch = store.epoch();

        store.set_session(session);
        assert_eq!(store.epoch(), epoch);

        store.set_session(Session::from_selection("other", false));
        assert_eq!(store.epoch(), epoch + 1);
    }

    #[test]
    fn test_node_changes_ignore_unknown_ids() {
        let store = AtlasStore::new();
        store.add_node(node("a")).unwrap();
        store.apply_node_changes(vec![
            NodeChange::Position {
                id: "a".to_string(),
                position: Position::new(10.0, 20.0),
            },
            NodeChange::Select {
                id: "ghost".to_string(),
                selected: true,
            },
        ]);
        assert_eq!(store.node("a").unwrap().position, Position::new(10.0, 20.0));
    }
}
