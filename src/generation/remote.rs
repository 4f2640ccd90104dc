//! Gemini-backed generation.
//!
//! Each operation builds a prompt, calls the API once, extracts and
//! validates the JSON payload, then runs the quality gates. A result that
//! fails a gate is regenerated with [`RETRY_INSTRUCTION`] appended to the
//! original prompt, up to `quality_max_retries` times; after that the last
//! result is accepted as-is.
//!
//! [`RETRY_INSTRUCTION`]: crate::prompts::RETRY_INSTRUCTION

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::quality::{self, QualityReport};
use super::{AnswerResult, BranchItem, BranchType, GenerationProvider, NodeContext};
use super::{PathQuestionResult, PathType};
use crate::error::{GenerationError, GenerationResult};
use crate::gemini::GeminiClient;
use crate::prompts::{
    append_retry_instruction, build_answer_prompt, build_branch_prompt,
    build_path_questions_prompt, build_streaming_answer_prompt,
};

/// Generation provider backed by the remote API.
#[derive(Clone)]
pub struct RemoteGenerator {
    client: GeminiClient,
    quality_max_retries: u32,
}

impl RemoteGenerator {
    pub fn new(client: GeminiClient, quality_max_retries: u32) -> Self {
        Self {
            client,
            quality_max_retries,
        }
    }

    /// Call, parse and gate a prompt, retrying weak results with an augmented prompt.
    async fn generate_gated<T, P, C>(
        &self,
        operation: &'static str,
        prompt: &str,
        parse: P,
        check: C,
    ) -> GenerationResult<T>
    where
        P: Fn(&str) -> GenerationResult<T> + Send + Sync,
        C: Fn(&T) -> QualityReport + Send + Sync,
        T: Send,
    {
        let mut attempt: u32 = 0;
        let retry_prompt = append_retry_instruction(prompt);

        loop {
            let current = if attempt == 0 {
                prompt
            } else {
                retry_prompt.as_str()
            };
            let text = self.client.generate(current).await?;
            let result = parse(&text)?;
            let report = check(&result);

            if report.passed() {
                debug!(operation, attempt, "Quality gates passed");
                return Ok(result);
            }

            if attempt >= self.quality_max_retries {
                warn!(
                    operation,
                    attempt,
                    reasons = ?report.reasons(),
                    "Quality gates still failing, accepting last result"
                );
                return Ok(result);
            }

            attempt += 1;
            warn!(
                operation,
                attempt,
                reasons = ?report.reasons(),
                "Quality gates rejected result, retrying with augmented prompt"
            );
        }
    }

    /// Generate an answer through the streaming endpoint.
    ///
    /// Library-only entry point: [`GenerationProvider::generate_answer`] stays
    /// on the one-shot call, so the dispatcher, [`crate::atlas::Explorer`] and
    /// the CLI never stream. Callers wanting incremental output use this directly.
    pub async fn stream_answer(&self, node: &NodeContext) -> GenerationResult<AnswerResult> {
        let prompt = build_streaming_answer_prompt(&node.question, &node.source_text);
        let mut stream = self.client.stream_generate(&prompt).await?;
        let mut parser = AnswerStreamParser::new();

        while let Some(delta) = stream.next().await {
            parser.push(&delta?);
        }

        let answer = parser.finish();
        if answer.summary.is_empty() && answer.bullets.is_empty() {
            return Err(GenerationError::Shape {
                message: "streamed answer had no summary or bullets".to_string(),
            });
        }
        info!(bullets = answer.bullets.len(), "Streamed answer complete");
        Ok(answer)
    }
}

#[async_trait]
impl GenerationProvider for RemoteGenerator {
    async fn generate_path_questions(
        &self,
        source_text: &str,
        path_type: PathType,
    ) -> GenerationResult<PathQuestionResult> {
        let prompt = build_path_questions_prompt(source_text, path_type);
        self.generate_gated(
            "path_questions",
            &prompt,
            parse_path_questions,
            |result| quality::check_path_questions(result, &[]),
        )
        .await
    }

    async fn generate_answer(&self, node: &NodeContext) -> GenerationResult<AnswerResult> {
        let prompt = build_answer_prompt(&node.question, &node.source_text);
        let text = self.client.generate(&prompt).await?;
        parse_answer(&text)
    }

    async fn generate_branches(
        &self,
        node: &NodeContext,
        branch_type: BranchType,
    ) -> GenerationResult<Vec<BranchItem>> {
        let prompt = build_branch_prompt(node.branch_seed(branch_type), branch_type, &node.source_text);
        let existing = &node.existing_questions;
        self.generate_gated("branches", &prompt, parse_branches, |branches| {
            quality::check_branches(branches, existing)
        })
        .await
    }
}

/// Strip optional ```` ```json ```` / ```` ``` ```` fences around a JSON payload.
pub fn extract_json(completion: &str) -> GenerationResult<&str> {
    let trimmed = completion.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed);
    }

    let fenced = if trimmed.contains("```json") {
        trimmed.split("```json").nth(1)
    } else if trimmed.contains("```") {
        trimmed.split("```").nth(1)
    } else {
        None
    };

    fenced
        .and_then(|s| s.split("```").next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GenerationError::Parse {
            message: format!(
                "No JSON found in response. First 100 chars: '{}'",
                completion.chars().take(100).collect::<String>()
            ),
        })
}

fn parse_value(completion: &str) -> GenerationResult<Value> {
    let json = extract_json(completion)?;
    serde_json::from_str(json).map_err(|e| GenerationError::Parse {
        message: e.to_string(),
    })
}

fn shape(message: impl Into<String>) -> GenerationError {
    GenerationError::Shape {
        message: message.into(),
    }
}

fn string_field<'a>(value: &'a Value, field: &str) -> GenerationResult<&'a str> {
    value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| shape(format!("`{}` must be a string", field)))
}

fn branch_items(value: &Value, what: &str) -> GenerationResult<Vec<BranchItem>> {
    let items = value
        .as_array()
        .ok_or_else(|| shape(format!("{} must be an array", what)))?;

    items
        .iter()
        .map(|item| {
            Ok(BranchItem::new(
                string_field(item, "question")?,
                string_field(item, "context")?,
            ))
        })
        .collect()
}

/// Parse `{rootQuestion, branches: [{question, context}]}`.
pub fn parse_path_questions(completion: &str) -> GenerationResult<PathQuestionResult> {
    let value = parse_value(completion)?;

    let root_question = string_field(&value, "rootQuestion")?;
    if root_question.trim().is_empty() {
        return Err(shape("`rootQuestion` must not be empty"));
    }

    let branches = value
        .get("branches")
        .ok_or_else(|| shape("`branches` is missing"))
        .and_then(|b| branch_items(b, "`branches`"))?;

    Ok(PathQuestionResult {
        root_question: root_question.to_string(),
        branches,
    })
}

/// Parse `{summary, bullets: [string]}`.
pub fn parse_answer(completion: &str) -> GenerationResult<AnswerResult> {
    let value = parse_value(completion)?;

    let summary = string_field(&value, "summary")?.to_string();
    let bullets = value
        .get("bullets")
        .and_then(Value::as_array)
        .ok_or_else(|| shape("`bullets` must be an array"))?
        .iter()
        .map(|b| {
            b.as_str()
                .map(str::to_string)
                .ok_or_else(|| shape("`bullets` must contain only strings"))
        })
        .collect::<GenerationResult<Vec<_>>>()?;

    Ok(AnswerResult { summary, bullets })
}

/// Parse `[{question, context}]`.
pub fn parse_branches(completion: &str) -> GenerationResult<Vec<BranchItem>> {
    let value = parse_value(completion)?;
    branch_items(&value, "branch list")
}

/// Incremental parser for the streamed answer layout.
///
/// ```text
/// **Summary sentence**
/// - first bullet
/// * second bullet
///   continued here
/// ```
///
/// Lines before the first bullet extend the summary; other unprefixed lines
/// extend the previous bullet.
#[derive(Debug, Default)]
pub struct AnswerStreamParser {
    pending: String,
    answer: AnswerResult,
}

impl AnswerStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a text delta; complete lines are parsed immediately.
    pub fn push(&mut self, delta: &str) {
        self.pending.push_str(delta);
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            self.parse_line(&line);
        }
    }

    /// Answer parsed so far, excluding any unterminated line.
    pub fn snapshot(&self) -> &AnswerResult {
        &self.answer
    }

    /// Parse the trailing line and return the answer.
    pub fn finish(mut self) -> AnswerResult {
        let rest = std::mem::take(&mut self.pending);
        self.parse_line(&rest);
        self.answer
    }

    fn parse_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        if let Some(bullet) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
            self.answer.bullets.push(bullet.trim().to_string());
            return;
        }

        let text = line.trim_start_matches("**").trim_end_matches("**").trim();
        let target = match self.answer.bullets.last_mut() {
            Some(bullet) => bullet,
            None => &mut self.answer.summary,
        };
        if !target.is_empty() {
            target.push(' ');
        }
        target.push_str(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_json_fences() {
        assert_eq!(extract_json("  {\"a\":1} ").unwrap(), "{\"a\":1}");
        assert_eq!(extract_json("```json\n[1]\n```").unwrap(), "[1]");
        assert_eq!(extract_json("Here:\n```\n{\"b\":2}\n```").unwrap(), "{\"b\":2}");
        assert!(matches!(
            extract_json("no json here"),
            Err(GenerationError::Parse { .. })
        ));
    }

    #[test]
    fn test_parse_path_questions_shapes() {
        let ok = parse_path_questions(
            r#"{"rootQuestion":"Root?","branches":[{"question":"Q1","context":"C1"}]}"#,
        )
        .unwrap();
        assert_eq!(ok.root_question, "Root?");
        assert_eq!(ok.branches, vec![BranchItem::new("Q1", "C1")]);

        assert!(matches!(
            parse_path_questions(r#"{"rootQuestion":"","branches":[]}"#),
            Err(GenerationError::Shape { .. })
        ));
        assert!(matches!(
            parse_path_questions(r#"{"rootQuestion":"R","branches":{}}"#),
            Err(GenerationError::Shape { .. })
        ));
        assert!(matches!(
            parse_path_questions(r#"{"rootQuestion":"R","branches":[{"question":"Q"}]}"#),
            Err(GenerationError::Shape { .. })
        ));
        assert!(matches!(
            parse_path_questions("{\"rootQuestion\": "),
            Err(GenerationError::Parse { .. })
        ));
    }

    #[test]
    fn test_parse_answer_shapes() {
        let ok = parse_answer("```json\n{\"summary\":\"S\",\"bullets\":[\"a\",\"b\"]}\n```").unwrap();
        assert_eq!(
            ok,
            AnswerResult {
                summary: "S".to_string(),
                bullets: vec!["a".to_string(), "b".to_string()],
            }
        );

        assert!(matches!(
            parse_answer(r#"{"summary":"S","bullets":[1]}"#),
            Err(GenerationError::Shape { .. })
        ));
        assert!(matches!(
            parse_answer(r#"{"summary":3,"bullets":[]}"#),
            Err(GenerationError::Shape { .. })
        ));
    }

    #[test]
    fn test_parse_branches_requires_array() {
        assert_eq!(
            parse_branches(r#"[{"question":"Q","context":"C"}]"#).unwrap(),
            vec![BranchItem::new("Q", "C")]
        );
        assert!(matches!(
            parse_branches(r#"{"question":"Q","context":"C"}"#),
            Err(GenerationError::Shape { .. })
        ));
    }

    #[test]
    fn test_stream_parser_across_split_deltas() {
        let mut parser = AnswerStreamParser::new();
        for delta in [
            "**Tides are dri",
            "ven by gravity**\n",
            "and inertia.\n- The moon ",
            "pulls water\n* The sun adds\n  a smaller pull\n",
            "- Land shapes",
        ] {
            parser.push(delta);
        }
        assert_eq!(parser.snapshot().bullets.len(), 2);

        let answer = parser.finish();
        assert_eq!(answer.summary, "Tides are driven by gravity and inertia.");
        assert_eq!(
            answer.bullets,
            vec![
                "The moon pulls water".to_string(),
                "The sun adds a smaller pull".to_string(),
                "Land shapes".to_string(),
            ]
        );
    }
}
