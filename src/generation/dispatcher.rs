use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{
    AnswerResult, BranchItem, BranchType, CredentialChain, GenerationProvider, NodeContext,
    PathQuestionResult, PathType,
};
use crate::atlas::AtlasStore;
use crate::error::{GenerationError, GenerationResult};

/// Which provider serves a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Deterministic,
    Remote,
}

/// Chooses a provider per call and falls back to the deterministic one
/// whenever the remote provider fails.
///
/// A remote failure sets the session's demo flag, so every later call in
/// that session stays offline.
#[derive(Clone)]
pub struct GenerationDispatcher {
    store: AtlasStore,
    deterministic: Arc<dyn GenerationProvider>,
    remote: Arc<dyn GenerationProvider>,
    credentials: CredentialChain,
}

impl GenerationDispatcher {
    pub fn new(
        store: AtlasStore,
        deterministic: Arc<dyn GenerationProvider>,
        remote: Arc<dyn GenerationProvider>,
        credentials: CredentialChain,
    ) -> Self {
        Self {
            store,
            deterministic,
            remote,
            credentials,
        }
    }

    /// Provider for the next call given the current session.
    pub async fn route(&self) -> Route {
        let Some(session) = self.store.session() else {
            return Route::Deterministic;
        };
        if session.demo_mode {
            return Route::Deterministic;
        }
        if self.credentials.resolve().await.is_some() {
            Route::Remote
        } else {
            Route::Deterministic
        }
    }

    fn fall_back(&self, operation: &'static str, error: &GenerationError) {
        let session_id = self.store.session().map(|s| s.session_id);
        warn!(
            operation,
            session_id = ?session_id,
            error = %error,
            "Remote generation failed, falling back to deterministic generation"
        );
        if self.store.set_demo_mode(true) {
            debug!(session_id = ?session_id, "Demo mode enabled for the rest of the session");
        }
    }
}

#[async_trait]
impl GenerationProvider for GenerationDispatcher {
    async fn generate_path_questions(
        &self,
        source_text: &str,
        path_type: PathType,
    ) -> GenerationResult<PathQuestionResult> {
        if self.route().await == Route::Remote {
            match self.remote.generate_path_questions(source_text, path_type).await {
                Ok(result) => return Ok(result),
                Err(e) => self.fall_back("path_questions", &e),
            }
        }
        self.deterministic
            .generate_path_questions(source_text, path_type)
            .await
    }

    async fn generate_answer(&self, node: &NodeContext) -> GenerationResult<AnswerResult> {
        if self.route().await == Route::Remote {
            match self.remote.generate_answer(node).await {
                Ok(result) => return Ok(result),
                Err(e) => self.fall_back("answer", &e),
            }
        }
        self.deterministic.generate_answer(node).await
    }

    async fn generate_branches(
        &self,
        node: &NodeContext,
        branch_type: BranchType,
    ) -> GenerationResult<Vec<BranchItem>> {
        if self.route().await == Route::Remote {
            match self.remote.generate_branches(node, branch_type).await {
                Ok(result) => return Ok(result),
                Err(e) => self.fall_back("branches", &e),
            }
        }
        self.deterministic.generate_branches(node, branch_type).await
    }
}
