//! Deterministic model stand-in.

use super::{GenerationParams, ModelClient};
use async_trait::async_trait;
use smartppt_core::TransportError;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct ScriptState {
    pending: VecDeque<Result<String, TransportError>>,
    last: Option<Result<String, TransportError>>,
    prompts: Vec<String>,
}

/// Replays canned responses in order and records every prompt it receives.
///
/// Once the script runs out, the final entry repeats.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    state: Mutex<ScriptState>,
}

impl ScriptedModel {
    /// Replay the given responses in order.
    pub fn new(script: impl IntoIterator<Item = Result<String, TransportError>>) -> Self {
        Self {
            state: Mutex::new(ScriptState {
                pending: script.into_iter().collect(),
                ..ScriptState::default()
            }),
        }
    }

    /// Always answer with the same text.
    pub fn always(text: impl Into<String>) -> Self {
        Self::new([Ok(text.into())])
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.lock().prompts.clone()
    }

    /// Number of calls received so far.
    pub fn calls(&self) -> usize {
        self.lock().prompts.len()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        // A poisoned lock only means a test panicked mid-call; the data is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn generate(
        &self,
        prompt: &str,
        _params: &GenerationParams,
    ) -> Result<String, TransportError> {
        let mut state = self.lock();
        state.prompts.push(prompt.to_string());

        if let Some(next) = state.pending.pop_front() {
            state.last = Some(next);
        }
        state
            .last
            .clone()
            .unwrap_or_else(|| Err(TransportError::Connection("script is empty".to_string())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
