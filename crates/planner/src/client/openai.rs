//! Client for OpenAI-compatible chat completion services.

use super::{GenerationParams, ModelClient};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smartppt_core::{ModelConfig, TransportError};
use std::time::Duration;

/// Prompt used by [`OpenAiClient::check_connection`].
const CONNECTION_PROMPT: &str = "Reply with the single word OK.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Calls `{base_url}/chat/completions` with bearer authentication.
pub struct OpenAiClient {
    config: ModelConfig,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Create a client. A missing key is only reported when a call is made.
    pub fn new(config: ModelConfig, api_key: Option<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| TransportError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client,
        })
    }

    /// The endpoint requests are sent to.
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// Send a short prompt and return the trimmed reply.
    ///
    /// An empty reply is an error. A reply without "OK" is logged but
    /// accepted, since the service did answer.
    pub async fn check_connection(&self) -> Result<String, TransportError> {
        let params = GenerationParams {
            max_tokens: 16,
            temperature: 0.0,
        };
        let reply = self.generate(CONNECTION_PROMPT, &params).await?;
        let reply = reply.trim().to_string();
        log::debug!("Connection check reply: {:?}", reply);
        if reply.is_empty() {
            return Err(TransportError::MalformedResponse(
                "connection check returned an empty reply".to_string(),
            ));
        }
        if !acknowledges(&reply) {
            log::warn!(
                "Model {} answered the connection check without \"OK\": {:?}",
                self.config.model,
                reply
            );
        }
        Ok(reply)
    }
}

/// Whether a reply contains "OK" as a word, ignoring case.
fn acknowledges(reply: &str) -> bool {
    reply
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word.eq_ignore_ascii_case("ok"))
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, TransportError> {
        let api_key = self.api_key.as_deref().ok_or(TransportError::MissingApiKey)?;
        let url = self.endpoint();

        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };

        log::debug!("POST {} (model {})", url, self.config.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(Duration::from_secs(self.config.timeout_secs))
                } else {
                    TransportError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            log::warn!("Model service returned {}", status);
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| TransportError::MalformedResponse(format!("Failed to decode response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| TransportError::MalformedResponse("response had no choices".to_string()))
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}
