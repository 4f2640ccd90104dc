//! User-facing exploration flows over the store.
//!
//! Every generating flow records the store epoch before awaiting the
//! provider. If the store was reset, switched session, or lost the node in
//! the meantime, the late result is dropped and [`Outcome::Discarded`] is
//! returned.

use std::sync::Arc;
use tracing::{error, info, warn};

use super::lifecycle;
use super::store::AtlasStore;
use super::types::{
    AtlasEdge, AtlasNode, AtlasNodeData, NodeDataPatch, NodeState, Position, UiMode,
};
use crate::error::{AppResult, StoreError};
use crate::generation::{BranchItem, BranchType, GenerationProvider, NodeContext, PathType};

/// Horizontal distance between siblings.
pub const SIBLING_SPACING: f64 = 320.0;
/// Vertical distance between a parent and its children.
pub const LEVEL_SPACING: f64 = 220.0;

/// Result of an exploration flow.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The result was written to the store.
    Applied(T),
    /// Nothing was attempted (e.g. the node is already loading).
    Skipped,
    /// The result arrived after its context went stale and was dropped.
    Discarded,
}

impl<T> Outcome<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            Outcome::Applied(value) => Some(value),
            _ => None,
        }
    }
}

/// Drives path selection, answers and branching against a store.
#[derive(Clone)]
pub struct Explorer {
    store: AtlasStore,
    generator: Arc<dyn GenerationProvider>,
}

impl Explorer {
    pub fn new(store: AtlasStore, generator: Arc<dyn GenerationProvider>) -> Self {
        Self { store, generator }
    }

    pub fn store(&self) -> &AtlasStore {
        &self.store
    }

    /// Compass selection: seed the tree with a root question and its branches.
    ///
    /// Returns the new node ids, root first.
    pub async fn choose_path(&self, path_type: PathType) -> AppResult<Outcome<Vec<String>>> {
        let session = self.store.session().ok_or(StoreError::NoSession)?;
        if self.store.root_node_id().is_some() {
            warn!(path_type = %path_type, "Tree already seeded, reset before choosing a new path");
            return Ok(Outcome::Skipped);
        }

        let epoch = self.store.epoch();
        let result = self
            .generator
            .generate_path_questions(&session.source_text, path_type)
            .await?;

        if self.store.epoch() != epoch {
            info!(path_type = %path_type, "Discarding stale path questions");
            return Ok(Outcome::Discarded);
        }

        let root_id = AtlasNode::generate_id();
        let root = AtlasNode::new(
            root_id.clone(),
            Position::default(),
            AtlasNodeData::new(result.root_question, path_type, session.source_text.clone()),
        );
        let children = spawn_children(
            &root,
            &result.branches,
            path_type,
            &session.source_text,
        );

        let mut ids = vec![root_id.clone()];
        ids.extend(children.iter().map(|n| n.id.clone()));
        let edges = children
            .iter()
            .map(|child| AtlasEdge::connect(root_id.clone(), child.id.clone()))
            .collect();

        let mut nodes = vec![root];
        nodes.extend(children);
        self.store.add_nodes(nodes)?;
        self.store.add_edges(edges)?;
        self.store.set_active_node(Some(&root_id))?;
        self.store.set_ui_mode(UiMode::Exploring);

        info!(path_type = %path_type, nodes = ids.len(), "Path seeded");
        Ok(Outcome::Applied(ids))
    }

    /// Show or hide an answer, generating it first when needed.
    ///
    /// Returns the answer's visibility afterwards.
    pub async fn reveal_answer(&self, node_id: &str) -> AppResult<Outcome<bool>> {
        let node = self.require_node(node_id)?;

        let started = match self.store.node_state(node_id) {
            NodeState::Resolved => return Ok(Outcome::Applied(self.store.toggle_answer(node_id)?)),
            NodeState::Loading => {
                warn!(node_id, "Answer already generating");
                return Ok(Outcome::Skipped);
            }
            NodeState::Idle => lifecycle::start_generation(&self.store, node_id),
            NodeState::Error => lifecycle::retry_generation(&self.store, node_id),
        };
        if !started {
            return Ok(Outcome::Skipped);
        }

        let epoch = self.store.epoch();
        let context = self.node_context(&node);

        match self.generator.generate_answer(&context).await {
            Ok(answer) => {
                if self.is_stale(epoch, node_id) {
                    info!(node_id, "Discarding stale answer");
                    self.release(node_id);
                    return Ok(Outcome::Discarded);
                }
                self.store
                    .update_node_data(node_id, NodeDataPatch::answer(answer))?;
                lifecycle::mark_resolved(&self.store, node_id);
                self.store.set_answer_visibility(node_id, true)?;
                Ok(Outcome::Applied(true))
            }
            Err(e) => {
                error!(node_id, error = %e, "Answer generation failed");
                self.release(node_id);
                Err(e.into())
            }
        }
    }

    /// Spawn 2-3 follow-ups beneath a node from its question or answer.
    ///
    /// Returns the new node ids.
    pub async fn branch(
        &self,
        node_id: &str,
        branch_type: BranchType,
    ) -> AppResult<Outcome<Vec<String>>> {
        let parent = self.require_node(node_id)?;
        if branch_type == BranchType::Answer && parent.data.answer.is_none() {
            warn!(node_id, "No answer to branch from yet");
            return Ok(Outcome::Skipped);
        }

        let epoch = self.store.epoch();
        let context = self.node_context(&parent);
        let branches = self
            .generator
            .generate_branches(&context, branch_type)
            .await?;

        if self.is_stale(epoch, node_id) {
            info!(node_id, "Discarding stale branches");
            return Ok(Outcome::Discarded);
        }

        // Siblings already under the parent push new children further right.
        let offset = self.store.children_of(node_id).len();
        let mut children = spawn_children(
            &parent,
            &branches,
            parent.data.path_type,
            &parent.data.source_text,
        );
        for child in &mut children {
            child.position.x += offset as f64 * SIBLING_SPACING;
        }

        let ids: Vec<String> = children.iter().map(|n| n.id.clone()).collect();
        let edges = ids
            .iter()
            .map(|id| AtlasEdge::connect(node_id, id.clone()))
            .collect();

        self.store.add_nodes(children)?;
        self.store.add_edges(edges)?;
        self.store.expand_branch(node_id);
        self.store.set_active_node(Some(node_id))?;

        info!(node_id, branch_type = %branch_type, spawned = ids.len(), "Branched");
        Ok(Outcome::Applied(ids))
    }

    /// Make a node the active one.
    pub fn focus(&self, node_id: &str) -> AppResult<()> {
        self.store.set_active_node(Some(node_id))?;
        Ok(())
    }

    /// Focus the root; `None` when there is no tree.
    pub fn back_to_seed(&self) -> AppResult<Option<String>> {
        let Some(root_id) = self.store.root_node_id() else {
            return Ok(None);
        };
        self.store.set_active_node(Some(&root_id))?;
        Ok(Some(root_id))
    }

    /// Flip the session's demo flag; returns the new value.
    pub fn toggle_demo_mode(&self) -> AppResult<bool> {
        let session = self.store.session().ok_or(StoreError::NoSession)?;
        let demo_mode = !session.demo_mode;
        self.store.set_demo_mode(demo_mode);
        Ok(demo_mode)
    }

    fn require_node(&self, node_id: &str) -> AppResult<AtlasNode> {
        self.store.node(node_id).ok_or_else(|| {
            StoreError::UnknownNode {
                node_id: node_id.to_string(),
            }
            .into()
        })
    }

    fn node_context(&self, node: &AtlasNode) -> NodeContext {
        let data = &node.data;
        let mut context = NodeContext::new(data.question.clone(), data.path_type, data.source_text.clone())
            .with_existing_questions(self.store.existing_questions());
        context.context = data.context.clone();
        if let Some(answer) = &data.answer {
            context = context.with_answer(answer.clone());
        }
        context
    }

    /// Move a node left loading by an abandoned request to `error` so it can be retried.
    fn release(&self, node_id: &str) {
        if lifecycle::is_loading(&self.store, node_id) {
            lifecycle::mark_error(&self.store, node_id);
        }
    }

    fn is_stale(&self, epoch: u64, node_id: &str) -> bool {
        self.store.read(|s| s.epoch() != epoch || !s.contains_node(node_id))
    }
}

/// Lay out children in a row centred beneath `parent`.
fn spawn_children(
    parent: &AtlasNode,
    branches: &[BranchItem],
    path_type: PathType,
    source_text: &str,
) -> Vec<AtlasNode> {
    let count = branches.len();
    let first_x = parent.position.x - (count.saturating_sub(1) as f64) * SIBLING_SPACING / 2.0;
    let y = parent.position.y + LEVEL_SPACING;

    branches
        .iter()
        .enumerate()
        .map(|(index, branch)| {
            let mut data = AtlasNodeData::new(branch.question.clone(), path_type, source_text);
            data.context = Some(branch.context.clone());
            data.is_new = true;
            data.spawn_index = Some(index);
            AtlasNode::new(
                AtlasNode::generate_id(),
                Position::new(first_x + index as f64 * SIBLING_SPACING, y),
                data,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_centred_under_parent() {
        let parent = AtlasNode::new(
            "p",
            Position::new(100.0, 50.0),
            AtlasNodeData::new("Q?", PathType::Apply, "src"),
        );
        let branches = vec![
            BranchItem::new("a", "1"),
            BranchItem::new("b", "2"),
            BranchItem::new("c", "3"),
        ];
        let children = spawn_children(&parent, &branches, PathType::Apply, "src");

        let xs: Vec<f64> = children.iter().map(|c| c.position.x).collect();
        assert_eq!(xs, vec![100.0 - SIBLING_SPACING, 100.0, 100.0 + SIBLING_SPACING]);
        assert!(children.iter().all(|c| c.position.y == 50.0 + LEVEL_SPACING));
        assert!(children.iter().all(|c| c.data.is_new));
        assert_eq!(children[2].data.spawn_index, Some(2));
        assert_eq!(children[0].data.context.as_deref(), Some("1"));
    }
}
