use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::generation::{AnswerResult, PathType};

/// Core question of a session started from a text selection.
pub const SELECTION_CORE_QUESTION: &str = "What are the key ideas here?";

/// Shortest topic accepted by [`Session::from_topic`].
pub const MIN_TOPIC_CHARS: usize = 10;

/// One exploration seeded by a piece of source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub source_text: String,
    pub core_question: String,
    pub path_suggestions: Vec<String>,
    /// Forces deterministic generation.
    pub demo_mode: bool,
    /// Epoch milliseconds.
    pub created_at: i64,
}

impl Session {
    /// Session for a text selection. `live` requests remote generation.
    pub fn from_selection(text: &str, live: bool) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            source_text: text.trim().to_string(),
            core_question: SELECTION_CORE_QUESTION.to_string(),
            path_suggestions: PathType::ALL.iter().map(|p| p.label().to_string()).collect(),
            demo_mode: !live,
            created_at: Utc::now().timestamp_millis(),
        }
    }

    /// Session for a typed topic, which doubles as the core question.
    pub fn from_topic(topic: &str) -> AppResult<Self> {
        let topic = topic.trim();
        if topic.chars().count() < MIN_TOPIC_CHARS {
            return Err(AppError::InvalidInput {
                message: format!("Topic must be at least {} characters", MIN_TOPIC_CHARS),
            });
        }

        Ok(Self {
            session_id: format!("topic-{}", Uuid::new_v4()),
            source_text: topic.to_string(),
            core_question: topic.to_string(),
            path_suggestions: Vec::new(),
            demo_mode: false,
            created_at: Utc::now().timestamp_millis(),
        })
    }
}

/// Canvas coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Size reported by the rendering surface once a node is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

/// Question/answer payload of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasNodeData {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<AnswerResult>,
    pub path_type: PathType,
    pub source_text: String,
    /// Spawn-animation marker.
    #[serde(default)]
    pub is_new: bool,
    /// Sibling index for staggered spawning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn_index: Option<usize>,
}

impl AtlasNodeData {
    pub fn new(question: impl Into<String>, path_type: PathType, source_text: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            context: None,
            answer: None,
            path_type,
            source_text: source_text.into(),
            is_new: false,
            spawn_index: None,
        }
    }
}

/// A question node on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasNode {
    pub id: String,
    pub position: Position,
    pub data: AtlasNodeData,
    #[serde(default)]
    pub selected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measured: Option<Dimensions>,
}

impl AtlasNode {
    pub fn new(id: impl Into<String>, position: Position, data: AtlasNodeData) -> Self {
        Self {
            id: id.into(),
            position,
            data,
            selected: false,
            measured: None,
        }
    }

    /// Fresh short node id.
    pub fn generate_id() -> String {
        let uuid = Uuid::new_v4().simple().to_string();
        format!("node-{}", &uuid[..8])
    }
}

/// The single connector kind drawn between nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeKind {
    #[default]
    AtlasConnector,
}

/// Directed parent to child relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type", default)]
    pub kind: EdgeKind,
    #[serde(default)]
    pub selected: bool,
}

impl AtlasEdge {
    pub fn connect(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("e-{}-{}", source, target),
            source,
            target,
            kind: EdgeKind::AtlasConnector,
            selected: false,
        }
    }
}

/// Answer-generation lifecycle of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    #[default]
    Idle,
    Loading,
    Resolved,
    Error,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Idle => "idle",
            NodeState::Loading => "loading",
            NodeState::Resolved => "resolved",
            NodeState::Error => "error",
        }
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which top-level view the canvas shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiMode {
    /// Radial path picker, shown before a tree exists.
    #[default]
    Compass,
    /// Canvas view of the tree.
    Exploring,
}

/// Derived summary of a collapsed subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchSummary {
    pub hidden_count: usize,
    pub answered_count: usize,
    /// Up to three answer summaries from hidden nodes.
    pub sample_summaries: Vec<String>,
}

/// A subtree hidden behind its root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollapsedBranch {
    pub hidden_node_ids: Vec<String>,
    pub summary: BranchSummary,
}

/// Partial update of a node's data; `None` fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct NodeDataPatch {
    pub question: Option<String>,
    pub context: Option<String>,
    pub answer: Option<AnswerResult>,
    pub is_new: Option<bool>,
    pub spawn_index: Option<usize>,
}

impl NodeDataPatch {
    pub fn answer(answer: AnswerResult) -> Self {
        Self {
            answer: Some(answer),
            ..Default::default()
        }
    }

    pub(crate) fn apply(self, data: &mut AtlasNodeData) {
        if let Some(question) = self.question {
            data.question = question;
        }
        if let Some(context) = self.context {
            data.context = Some(context);
        }
        if let Some(answer) = self.answer {
            data.answer = Some(answer);
        }
        if let Some(is_new) = self.is_new {
            data.is_new = is_new;
        }
        if let Some(spawn_index) = self.spawn_index {
            data.spawn_index = Some(spawn_index);
        }
    }
}

/// Node change reported by the rendering surface.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeChange {
    Position { id: String, position: Position },
    Select { id: String, selected: bool },
    Dimensions { id: String, dimensions: Dimensions },
}

/// Edge change reported by the rendering surface.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeChange {
    Select { id: String, selected: bool },
}

/// Persisted canvas record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasSnapshot {
    pub nodes: Vec<AtlasNode>,
    pub edges: Vec<AtlasEdge>,
    #[serde(default)]
    pub active_node_id: Option<String>,
    #[serde(default)]
    pub ui_mode: UiMode,
    #[serde(default)]
    pub answer_visibility: BTreeMap<String, bool>,
    #[serde(default)]
    pub node_states: BTreeMap<String, NodeState>,
    #[serde(default)]
    pub collapsed_branches: BTreeMap<String, CollapsedBranch>,
}
