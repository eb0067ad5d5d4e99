//! Request to deck orchestration.

use smartppt_core::{Error, Outline, PipelineConfig};
use smartppt_planner::{CancellationToken, ContentPlanner, ModelClient};
use smartppt_pptx::{PptxRenderer, RenderedDocument};
use std::path::PathBuf;
use std::sync::Arc;

/// Longest file stem derived from a topic.
const MAX_STEM_CHARS: usize = 80;

/// The outline a request produced and the deck rendered from it.
#[derive(Debug)]
pub struct GeneratedDeck {
    pub outline: Outline,
    pub document: RenderedDocument,
}

/// Runs one request through planning and rendering.
pub struct Pipeline {
    planner: ContentPlanner,
    renderer: PptxRenderer,
}

impl Pipeline {
    pub fn new(model: Arc<dyn ModelClient>, config: &PipelineConfig) -> Self {
        Self {
            planner: ContentPlanner::from_config(model, config),
            renderer: PptxRenderer::new().with_limits(config.render),
        }
    }

    /// Plan an outline for the topic, then render it.
    pub async fn generate(
        &self,
        topic: &str,
        slide_count: i64,
        cancel: &CancellationToken,
    ) -> Result<GeneratedDeck, Error> {
        let outline = self.planner.plan_topic(topic, slide_count, cancel).await?;
        let document = self.render(&outline)?;
        Ok(GeneratedDeck { outline, document })
    }

    /// Render an outline that was planned earlier.
    pub fn render(&self, outline: &Outline) -> Result<RenderedDocument, Error> {
        Ok(self.renderer.render(outline)?)
    }
}

/// Canned responses for offline runs.
///
/// A JSON array of strings is one response per entry. Anything else is a
/// single response used for every call.
pub fn load_replay_script(text: &str) -> Vec<String> {
    match serde_json::from_str::<Vec<String>>(text) {
        Ok(script) if !script.is_empty() => script,
        _ => vec![text.to_string()],
    }
}

/// `<topic>.pptx` with characters that are unsafe in file names replaced.
pub fn default_output_path(topic: &str) -> PathBuf {
    let stem: String = topic
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_CHARS)
        .collect();
    let stem = stem.trim();
    let stem = if stem.is_empty() || stem.chars().all(|c| c == '_') {
        "presentation"
    } else {
        stem
    };
    PathBuf::from(format!("{}.pptx", stem))
}
