//! Command-line entry points.
//!
//! Each session command restores the session into a fresh store, mounts the
//! persistence bridge, runs, and flushes pending writes before exiting.

use clap::{Parser, Subcommand};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use crate::atlas::{
    persistence, AtlasState, AtlasStore, Explorer, NodeState, Outcome, PersistenceBridge,
    PersistenceHandle, RestoreOutcome, Session, UiMode,
};
use crate::config::Config;
use crate::gemini::GeminiClient;
use crate::generation::{
    BranchType, CredentialChain, DeterministicGenerator, GenerationDispatcher, PathType,
    RemoteGenerator,
};
use crate::storage::{self, KeyValueStore};

/// Knowledge Atlas: explore a piece of text as a tree of questions.
#[derive(Parser, Debug)]
#[command(name = "knowledge-atlas", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an exploration from a text selection
    Explore {
        /// Selected text to explore
        #[arg(long)]
        text: String,

        /// Use remote generation when a credential is available
        #[arg(long)]
        live: bool,
    },

    /// Start an exploration from a typed topic (at least 10 characters)
    Topic { topic: String },

    /// Choose a path on the compass and seed the tree
    Path {
        session: String,
        /// clarify, go-deeper, challenge, apply, connect or surprise
        path_type: PathType,
    },

    /// Reveal (generating if needed) or hide a node's answer
    Answer { session: String, node: String },

    /// Spawn follow-up questions beneath a node
    Branch {
        session: String,
        node: String,
        /// Branch from the node's question or its answer
        #[arg(long, default_value = "question")]
        from: BranchType,
    },

    /// Make a node the active one
    Focus { session: String, node: String },

    /// Return focus to the root question
    Seed { session: String },

    /// Hide a node's subtree behind a summary
    Collapse { session: String, node: String },

    /// Show a collapsed subtree again
    Expand { session: String, node: String },

    /// Toggle demo (offline) mode for a session
    Demo { session: String },

    /// Clear the tree, keeping the session
    Reset { session: String },

    /// Print the session and its tree
    Show { session: String },

    /// Save the API credential to local storage
    SetKey { key: String },
}

/// Result of CLI command execution.
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Long-lived collaborators built once by the composition root.
pub struct AppContext {
    pub config: Config,
    pub storage: Arc<dyn KeyValueStore>,
    pub credentials: CredentialChain,
}

/// Execute a CLI command.
pub async fn execute_command(command: Commands, ctx: &AppContext) -> CliResult {
    match command {
        Commands::Explore { text, live } => {
            if text.trim().is_empty() {
                return CliResult::error("Selection is empty");
            }
            start_session(ctx, Session::from_selection(&text, live)).await
        }
        Commands::Topic { topic } => match Session::from_topic(&topic) {
            Ok(session) => start_session(ctx, session).await,
            Err(e) => CliResult::error(e.to_string()),
        },
        Commands::SetKey { key } => {
            if key.trim().is_empty() {
                return CliResult::error("API key must not be empty");
            }
            match storage::store_api_key(ctx.storage.as_ref(), key.trim()).await {
                Ok(()) => CliResult::success("API key saved"),
                Err(e) => CliResult::error(format!("Failed to save API key: {}", e)),
            }
        }
        command => execute_session_command(command, ctx).await,
    }
}

async fn start_session(ctx: &AppContext, session: Session) -> CliResult {
    if let Err(e) = storage::save_session(ctx.storage.as_ref(), &session).await {
        return CliResult::error(format!("Failed to save session: {}", e));
    }

    let mut output = format!("Session {}\n", session.session_id);
    let _ = writeln!(output, "Core question: {}", session.core_question);
    let _ = writeln!(
        output,
        "Mode: {}",
        if session.demo_mode { "demo" } else { "live" }
    );
    output.push_str("\nChoose a path:\n");
    for path in PathType::ALL {
        let _ = writeln!(output, "  {:<10} {}", path.as_str(), path.description());
    }
    CliResult::success(output)
}

/// A restored session with the bridge mounted.
struct Workspace {
    explorer: Explorer,
    persistence: PersistenceHandle,
}

impl Workspace {
    async fn open(ctx: &AppContext, session_id: &str) -> Result<Self, CliResult> {
        let store = AtlasStore::new();
        let persistence = PersistenceBridge::mount(
            store.clone(),
            ctx.storage.clone(),
            session_id,
            Duration::from_millis(ctx.config.generation.persist_debounce_ms),
        );

        match persistence::restore(&store, ctx.storage.as_ref(), session_id).await {
            Ok(RestoreOutcome::MissingSession) => {
                persistence.flush().await;
                return Err(CliResult::error(format!("Unknown session: {}", session_id)));
            }
            Ok(_) => {}
            Err(e) => {
                persistence.flush().await;
                return Err(CliResult::error(format!("Failed to load session: {}", e)));
            }
        }

        let deterministic = if ctx.config.generation.simulate_latency {
            DeterministicGenerator::default()
        } else {
            DeterministicGenerator::instant()
        };
        let client = GeminiClient::new(
            &ctx.config.gemini,
            ctx.config.request.clone(),
            ctx.credentials.clone(),
        )
        .map_err(|e| CliResult::error(format!("Failed to build API client: {}", e)))?;
        let remote = RemoteGenerator::new(client, ctx.config.generation.quality_max_retries);

        let dispatcher = GenerationDispatcher::new(
            store.clone(),
            Arc::new(deterministic),
            Arc::new(remote),
            ctx.credentials.clone(),
        );

        Ok(Self {
            explorer: Explorer::new(store, Arc::new(dispatcher)),
            persistence,
        })
    }

    async fn close(self) {
        self.persistence.flush().await;
    }
}

async fn execute_session_command(command: Commands, ctx: &AppContext) -> CliResult {
    let session_id = match &command {
        Commands::Path { session, .. }
        | Commands::Answer { session, .. }
        | Commands::Branch { session, .. }
        | Commands::Focus { session, .. }
        | Commands::Seed { session }
        | Commands::Collapse { session, .. }
        | Commands::Expand { session, .. }
        | Commands::Demo { session }
        | Commands::Reset { session }
        | Commands::Show { session } => session.clone(),
        Commands::Explore { .. } | Commands::Topic { .. } | Commands::SetKey { .. } => {
            return CliResult::error("Not a session command");
        }
    };

    let workspace = match Workspace::open(ctx, &session_id).await {
        Ok(workspace) => workspace,
        Err(result) => return result,
    };

    let result = run_in_workspace(command, &workspace.explorer).await;
    workspace.close().await;
    result
}

async fn run_in_workspace(command: Commands, explorer: &Explorer) -> CliResult {
    let store = explorer.store();

    match command {
        Commands::Path { path_type, .. } => match explorer.choose_path(path_type).await {
            Ok(Outcome::Applied(ids)) => {
                CliResult::success(format!("Seeded {} nodes\n\n{}", ids.len(), render(&store.state())))
            }
            Ok(Outcome::Skipped) => CliResult::error("Tree already exists; run `reset` first"),
            Ok(Outcome::Discarded) => CliResult::error("Session changed while generating"),
            Err(e) => CliResult::error(e.to_string()),
        },
        Commands::Answer { node, .. } => match explorer.reveal_answer(&node).await {
            Ok(Outcome::Applied(_)) => CliResult::success(render(&store.state())),
            Ok(Outcome::Skipped) => CliResult::error(format!("Answer for {} is already generating", node)),
            Ok(Outcome::Discarded) => CliResult::error("Node changed while generating"),
            Err(e) => CliResult::error(format!("Answer failed: {} (run again to retry)", e)),
        },
        Commands::Branch { node, from, .. } => match explorer.branch(&node, from).await {
            Ok(Outcome::Applied(ids)) => CliResult::success(format!(
                "Spawned {} questions\n\n{}",
                ids.len(),
                render(&store.state())
            )),
            Ok(Outcome::Skipped) => CliResult::error("Reveal the answer before branching from it"),
            Ok(Outcome::Discarded) => CliResult::error("Node changed while generating"),
            Err(e) => CliResult::error(e.to_string()),
        },
        Commands::Focus { node, .. } => match explorer.focus(&node) {
            Ok(()) => CliResult::success(render(&store.state())),
            Err(e) => CliResult::error(e.to_string()),
        },
        Commands::Seed { .. } => match explorer.back_to_seed() {
            Ok(Some(_)) => CliResult::success(render(&store.state())),
            Ok(None) => CliResult::error("No tree yet; choose a path first"),
            Err(e) => CliResult::error(e.to_string()),
        },
        Commands::Collapse { node, .. } => match store.collapse_branch(&node) {
            Ok(summary) => {
                let mut output = format!(
                    "Collapsed {} nodes ({} answered)\n",
                    summary.hidden_count, summary.answered_count
                );
                for sample in &summary.sample_summaries {
                    let _ = writeln!(output, "  · {}", sample);
                }
                CliResult::success(output)
            }
            Err(e) => CliResult::error(e.to_string()),
        },
        Commands::Expand { node, .. } => {
            if store.expand_branch(&node) {
                CliResult::success(render(&store.state()))
            } else {
                CliResult::error(format!("{} is not collapsed", node))
            }
        }
        Commands::Demo { .. } => match explorer.toggle_demo_mode() {
            Ok(true) => CliResult::success("Demo mode on"),
            Ok(false) => CliResult::success("Demo mode off"),
            Err(e) => CliResult::error(e.to_string()),
        },
        Commands::Reset { .. } => {
            store.reset();
            CliResult::success("Canvas reset")
        }
        Commands::Show { .. } => CliResult::success(render(&store.state())),
        Commands::Explore { .. } | Commands::Topic { .. } | Commands::SetKey { .. } => {
            CliResult::error("Not a session command")
        }
    }
}

/// Plain-text view of the session and its visible tree.
pub fn render(state: &AtlasState) -> String {
    let mut output = String::new();

    if let Some(session) = &state.session {
        let _ = writeln!(output, "Session {}", session.session_id);
        let _ = writeln!(output, "Core question: {}", session.core_question);
        let _ = writeln!(
            output,
            "Mode: {}",
            if session.demo_mode { "demo" } else { "live" }
        );
    }

    if state.ui_mode == UiMode::Compass || state.nodes.is_empty() {
        output.push_str("\nNo tree yet. Paths: ");
        let names: Vec<&str> = PathType::ALL.iter().map(|p| p.as_str()).collect();
        output.push_str(&names.join(", "));
        output.push('\n');
        return output;
    }

    output.push('\n');
    let thread = state.active_thread();
    let roots = state
        .nodes
        .iter()
        .filter(|n| state.parent_of(&n.id).is_none())
        .map(|n| n.id.as_str());
    for root in roots {
        render_node(state, root, 0, &thread, &mut output);
    }
    output
}

fn render_node(state: &AtlasState, node_id: &str, depth: usize, thread: &[String], out: &mut String) {
    let Some(node) = state.node(node_id) else {
        return;
    };
    let indent = "  ".repeat(depth);
    let marker = if state.active_node_id.as_deref() == Some(node_id) {
        '*'
    } else if thread.iter().any(|id| id == node_id) {
        '>'
    } else {
        '-'
    };
    let status = match state.node_state(node_id) {
        NodeState::Idle => String::new(),
        other => format!(" [{}]", other),
    };
    let _ = writeln!(
        out,
        "{}{} {} ({}){}  {}",
        indent,
        marker,
        node.data.question,
        node.data.path_type,
        status,
        node.id
    );

    if state.is_answer_visible(node_id) {
        if let Some(answer) = &node.data.answer {
            let _ = writeln!(out, "{}    = {}", indent, answer.summary);
            for bullet in &answer.bullets {
                let _ = writeln!(out, "{}      • {}", indent, bullet);
            }
        }
    }

    if let Some(collapsed) = state.collapsed_branches.get(node_id) {
        let _ = writeln!(
            out,
            "{}    [+{} hidden, {} answered]",
            indent, collapsed.summary.hidden_count, collapsed.summary.answered_count
        );
        return;
    }

    for child in state.children_of(node_id) {
        render_node(state, child, depth + 1, thread, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_branch_command() {
        let cli = Cli::try_parse_from([
            "knowledge-atlas",
            "branch",
            "s1",
            "node-1",
            "--from",
            "answer",
        ])
        .unwrap();
        match cli.command {
            Commands::Branch { session, node, from } => {
                assert_eq!(session, "s1");
                assert_eq!(node, "node-1");
                assert_eq!(from, BranchType::Answer);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_path_type() {
        let cli = Cli::try_parse_from(["knowledge-atlas", "path", "s1", "go-deeper"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Path {
                path_type: PathType::GoDeeper,
                ..
            }
        ));
        assert!(Cli::try_parse_from(["knowledge-atlas", "path", "s1", "sideways"]).is_err());
    }

    #[test]
    fn test_render_compass() {
        let store = AtlasStore::with_session(Session::from_selection("text", false));
        let output = render(&store.state());
        assert!(output.contains("No tree yet"));
        assert!(output.contains("go-deeper"));
    }
}
