//! Server-sent-event streaming of candidate text deltas.

use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use reqwest::Response;
use std::pin::Pin;
use tracing::debug;

use super::client::{extract_text, GeminiClient};
use super::types::{GenerateContentRequest, GenerateContentResponse};
use crate::error::{GeminiError, GeminiResult};

/// Incremental candidate text, one item per SSE event.
pub type TextStream = Pin<Box<dyn Stream<Item = GeminiResult<String>> + Send>>;

impl GeminiClient {
    /// Stream a prompt's completion as text deltas.
    ///
    /// Credential resolution and 429 backoff behave as in [`GeminiClient::generate`].
    pub async fn stream_generate(&self, prompt: &str) -> GeminiResult<TextStream> {
        let api_key = self.resolve_key().await?;
        let url = self.endpoint("streamGenerateContent", &api_key, true);
        let request = GenerateContentRequest::from_prompt(prompt);

        let response = self.send_with_backoff(&url, &request).await?;
        debug!("Gemini stream opened");

        Ok(text_stream_from_sse(response))
    }
}

/// Convert an SSE response into a stream of text deltas.
///
/// Events without text (role-only or finish events) are skipped; an event
/// carrying an API error payload ends up as a [`GeminiError::Protocol`] item.
pub fn text_stream_from_sse(response: Response) -> TextStream {
    let stream = response
        .bytes_stream()
        .eventsource()
        .map(|event| {
            let event = event.map_err(|e| GeminiError::Stream {
                message: e.to_string(),
            })?;
            parse_event_data(&event.data)
        })
        .filter_map(|result| async move {
            match result {
                Ok(Some(delta)) => Some(Ok(delta)),
                Ok(None) => None,
                Err(err) => Some(Err(err)),
            }
        });

    Box::pin(stream)
}

fn parse_event_data(data: &str) -> GeminiResult<Option<String>> {
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }

    let payload: GenerateContentResponse =
        serde_json::from_str(data).map_err(|e| GeminiError::Stream {
            message: format!("Invalid event payload: {}", e),
        })?;

    match extract_text(payload) {
        Ok(text) => Ok(Some(text)),
        Err(GeminiError::EmptyResponse) => Ok(None),
        Err(e) => Err(e),
    }
}
