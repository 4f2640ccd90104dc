use reqwest::{Client, Response, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{GenerateContentRequest, GenerateContentResponse};
use crate::config::{GeminiConfig, RequestConfig};
use crate::error::{GeminiError, GeminiResult};
use crate::generation::CredentialChain;

/// Client for the generative-language `generateContent` API
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    credentials: CredentialChain,
    request_config: RequestConfig,
}

impl GeminiClient {
    /// Create a new client. The credential is resolved per call, not here.
    pub fn new(
        config: &GeminiConfig,
        request_config: RequestConfig,
        credentials: CredentialChain,
    ) -> GeminiResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout_ms) = request_config.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        let client = builder.build().map_err(GeminiError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            credentials,
            request_config,
        })
    }

    /// Send a prompt and return the first candidate's text.
    pub async fn generate(&self, prompt: &str) -> GeminiResult<String> {
        let api_key = self.resolve_key().await?;
        let url = self.endpoint("generateContent", &api_key, false);
        let request = GenerateContentRequest::from_prompt(prompt);

        let start = Instant::now();
        let response = self.send_with_backoff(&url, &request).await?;

        let body: GenerateContentResponse =
            response.json().await.map_err(|e| GeminiError::Protocol {
                message: format!("Failed to parse response: {}", e),
            })?;

        let text = extract_text(body)?;

        info!(
            model = %self.model,
            latency_ms = start.elapsed().as_millis(),
            chars = text.len(),
            "Gemini call succeeded"
        );

        Ok(text)
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Credential for this call; absence fails before any network traffic.
    pub(super) async fn resolve_key(&self) -> GeminiResult<String> {
        self.credentials
            .resolve()
            .await
            .ok_or(GeminiError::MissingCredential)
    }

    pub(super) fn endpoint(&self, method: &str, api_key: &str, sse: bool) -> String {
        let alt = if sse { "alt=sse&" } else { "" };
        format!(
            "{}/v1beta/models/{}:{}?{}key={}",
            self.base_url, self.model, method, alt, api_key
        )
    }

    /// POST the request, retrying only HTTP 429 with exponential backoff.
    ///
    /// Any other non-success status fails immediately.
    pub(super) async fn send_with_backoff(
        &self,
        url: &str,
        request: &GenerateContentRequest,
    ) -> GeminiResult<Response> {
        let mut retries = 0;

        loop {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    model = %self.model,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Rate limited, retrying Gemini request"
                );
                tokio::time::sleep(delay).await;
            }

            debug!(model = %self.model, attempt = retries + 1, "Calling Gemini");

            let response = self
                .client
                .post(url)
                .header("Content-Type", "application/json")
                .json(request)
                .send()
                .await
                .map_err(|e| self.map_send_error(e))?;

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                if retries < self.request_config.max_retries {
                    retries += 1;
                    continue;
                }
                error!(model = %self.model, retries, "Gemini rate limit retries exhausted");
                return Err(GeminiError::RateLimited { retries });
            }

            if !status.is_success() {
                let error_body = response.text().await.unwrap_or_default();
                error!(
                    model = %self.model,
                    status = status.as_u16(),
                    "Gemini call failed"
                );
                return Err(GeminiError::Api {
                    status: status.as_u16(),
                    message: api_error_message(&error_body),
                });
            }

            return Ok(response);
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> GeminiError {
        match (e.is_timeout(), self.request_config.timeout_ms) {
            (true, Some(timeout_ms)) => GeminiError::Timeout { timeout_ms },
            _ => GeminiError::Http(e),
        }
    }
}

/// Text of a decoded response, or the protocol failure it carries.
pub(super) fn extract_text(body: GenerateContentResponse) -> GeminiResult<String> {
    if let Some(err) = body.error {
        return Err(GeminiError::Protocol {
            message: err.message,
        });
    }

    match body.first_text() {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        _ => Err(GeminiError::EmptyResponse),
    }
}

/// Prefer `error.message` from a JSON error body over the raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<GenerateContentResponse>(body)
        .ok()
        .and_then(|r| r.error)
        .map(|e| e.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.to_string())
}
