//! Model client abstraction.
//!
//! The planner only needs `generate(prompt) -> text`. Real services and
//! deterministic stubs both sit behind [`ModelClient`].

mod openai;
mod scripted;

pub use openai::OpenAiClient;
pub use scripted::ScriptedModel;

use async_trait::async_trait;
use smartppt_core::{ModelConfig, TransportError};

/// Sampling parameters sent with every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::from(&ModelConfig::default())
    }
}

impl From<&ModelConfig> for GenerationParams {
    fn from(config: &ModelConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// A generative model that turns a prompt into text.
///
/// Implementations are not assumed to be deterministic. Dropping the
/// returned future must abandon the call.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send one prompt and return the raw reply text.
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, TransportError>;

    /// Short name used in log lines.
    fn name(&self) -> &str;
}
