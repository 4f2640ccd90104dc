//! Question/answer generation.
//!
//! This module defines the [`GenerationProvider`] contract and its
//! implementations:
//! - [`DeterministicGenerator`]: offline, hash-seeded, pre-authored content
//! - [`RemoteGenerator`]: Gemini-backed generation with quality gates
//! - [`GenerationDispatcher`]: per-call provider selection with one-way fallback

mod credentials;
mod deterministic;
mod dispatcher;
pub mod quality;
mod remote;

pub use credentials::*;
pub use deterministic::*;
pub use dispatcher::*;
pub use remote::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationResult;

/// One of the six exploration lenses that bias question generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PathType {
    /// Disambiguate meaning.
    Clarify,
    /// Explore mechanisms.
    GoDeeper,
    /// Find counterarguments.
    Challenge,
    /// Practical applications.
    Apply,
    /// Find relationships.
    Connect,
    /// Unexpected angles.
    Surprise,
}

impl PathType {
    /// All path types in compass order.
    pub const ALL: [PathType; 6] = [
        PathType::Clarify,
        PathType::GoDeeper,
        PathType::Challenge,
        PathType::Apply,
        PathType::Connect,
        PathType::Surprise,
    ];

    /// Wire name of the path type.
    pub fn as_str(&self) -> &'static str {
        match self {
            PathType::Clarify => "clarify",
            PathType::GoDeeper => "go-deeper",
            PathType::Challenge => "challenge",
            PathType::Apply => "apply",
            PathType::Connect => "connect",
            PathType::Surprise => "surprise",
        }
    }

    /// Compass button label.
    pub fn label(&self) -> &'static str {
        match self {
            PathType::Clarify => "Clarify",
            PathType::GoDeeper => "Go Deeper",
            PathType::Challenge => "Challenge",
            PathType::Apply => "Apply",
            PathType::Connect => "Connect",
            PathType::Surprise => "Surprise Me",
        }
    }

    /// Short compass tooltip.
    pub fn description(&self) -> &'static str {
        match self {
            PathType::Clarify => "Disambiguate meaning",
            PathType::GoDeeper => "Explore mechanisms",
            PathType::Challenge => "Find counterarguments",
            PathType::Apply => "Practical applications",
            PathType::Connect => "Find relationships",
            PathType::Surprise => "Unexpected angles",
        }
    }
}

impl std::fmt::Display for PathType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PathType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "clarify" => Ok(PathType::Clarify),
            "go-deeper" | "go_deeper" | "deeper" => Ok(PathType::GoDeeper),
            "challenge" => Ok(PathType::Challenge),
            "apply" => Ok(PathType::Apply),
            "connect" => Ok(PathType::Connect),
            "surprise" => Ok(PathType::Surprise),
            _ => Err(format!("Unknown path type: {}", s)),
        }
    }
}

/// What a branch request spawns from: the node's question or its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchType {
    Question,
    Answer,
}

impl BranchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BranchType::Question => "question",
            BranchType::Answer => "answer",
        }
    }
}

impl std::fmt::Display for BranchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BranchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "question" => Ok(BranchType::Question),
            "answer" => Ok(BranchType::Answer),
            _ => Err(format!("Unknown branch type: {}", s)),
        }
    }
}

/// A generated follow-up question with the reason it matters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchItem {
    pub question: String,
    pub context: String,
}

impl BranchItem {
    pub fn new(question: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            context: context.into(),
        }
    }
}

/// Root question plus 2-3 branches for a chosen path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathQuestionResult {
    pub root_question: String,
    pub branches: Vec<BranchItem>,
}

/// Answer to a node's question: one-sentence summary plus ordered bullets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub summary: String,
    pub bullets: Vec<String>,
}

/// Node data handed to answer and branch generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeContext {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<AnswerResult>,
    pub path_type: PathType,
    pub source_text: String,
    /// Questions already in the tree, consulted by the uniqueness gate.
    #[serde(default)]
    pub existing_questions: Vec<String>,
}

impl NodeContext {
    pub fn new(
        question: impl Into<String>,
        path_type: PathType,
        source_text: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            context: None,
            answer: None,
            path_type,
            source_text: source_text.into(),
            existing_questions: Vec::new(),
        }
    }

    pub fn with_answer(mut self, answer: AnswerResult) -> Self {
        self.answer = Some(answer);
        self
    }

    pub fn with_existing_questions(mut self, questions: Vec<String>) -> Self {
        self.existing_questions = questions;
        self
    }

    /// Text a branch spawns from.
    pub fn branch_seed(&self, branch_type: BranchType) -> &str {
        match branch_type {
            BranchType::Question => &self.question,
            BranchType::Answer => self
                .answer
                .as_ref()
                .map(|a| a.summary.as_str())
                .unwrap_or(""),
        }
    }
}

/// Uniform contract for turning source text and tree context into
/// questions, answers and branch suggestions.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Root question plus 2-3 branches for a path over the source text.
    async fn generate_path_questions(
        &self,
        source_text: &str,
        path_type: PathType,
    ) -> GenerationResult<PathQuestionResult>;

    /// Answer for a node's question.
    async fn generate_answer(&self, node: &NodeContext) -> GenerationResult<AnswerResult>;

    /// 2-3 follow-up questions spawned from a node's question or answer.
    async fn generate_branches(
        &self,
        node: &NodeContext,
        branch_type: BranchType,
    ) -> GenerationResult<Vec<BranchItem>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_type_wire_names() {
        let json = serde_json::to_string(&PathType::GoDeeper).unwrap();
        assert_eq!(json, "\"go-deeper\"");
        let parsed: PathType = serde_json::from_str("\"surprise\"").unwrap();
        assert_eq!(parsed, PathType::Surprise);
    }

    #[test]
    fn test_path_type_from_str() {
        for path in PathType::ALL {
            assert_eq!(path.as_str().parse::<PathType>().unwrap(), path);
        }
        assert!("wander".parse::<PathType>().is_err());
    }

    #[test]
    fn test_path_question_result_uses_camel_case() {
        let raw = r#"{"rootQuestion":"Why?","branches":[{"question":"q","context":"c"}]}"#;
        let parsed: PathQuestionResult = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.root_question, "Why?");
        assert_eq!(parsed.branches, vec![BranchItem::new("q", "c")]);
    }

    #[test]
    fn test_branch_seed_uses_answer_summary() {
        let node = NodeContext::new("How?", PathType::Apply, "text");
        assert_eq!(node.branch_seed(BranchType::Question), "How?");
        assert_eq!(node.branch_seed(BranchType::Answer), "");

        let node = node.with_answer(AnswerResult {
            summary: "Because.".to_string(),
            bullets: vec![],
        });
        assert_eq!(node.branch_seed(BranchType::Answer), "Because.");
    }
}
