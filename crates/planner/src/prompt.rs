//! Prompt construction for outline generation.
//!
//! The first prompt states the topic, the exact slide count and the JSON
//! format contract. Retries reuse it and append the corrections derived from
//! the previous rejection.

use smartppt_core::{GenerationRequest, Rejection, ValidationPolicy};
use std::fmt::Write;

/// The JSON shape every response must follow.
const FORMAT_CONTRACT: &str = r#"[
  {
    "title": "Slide title",
    "summary": "One or two sentences that lead into the points below",
    "points": [
      {
        "main_point": "A concise point specific to the topic",
        "supporting_facts": [
          {"fact": "A concrete fact or figure", "explanation": "Why it matters, briefly"}
        ]
      }
    ]
  }
]"#;

/// Builds prompts for one request.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    policy: ValidationPolicy,
}

impl PromptBuilder {
    /// Create a builder that states the given validation limits to the model.
    pub fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    /// Build the prompt for an attempt, including corrections if a previous
    /// attempt was rejected.
    pub fn build(&self, request: &GenerationRequest, previous: Option<&Rejection>) -> String {
        let mut prompt = self.base_prompt(request);

        if let Some(rejection) = previous {
            prompt.push_str(
                "\nYour previous attempt was rejected. Fix every problem listed below and return the complete outline again:\n",
            );
            for correction in rejection.corrections() {
                let _ = writeln!(prompt, "- {}", correction);
            }
        }

        prompt
    }

    fn base_prompt(&self, request: &GenerationRequest) -> String {
        let count = request.slide_count();
        let topic = request.topic();
        let slides = if count == 1 { "slide" } else { "slides" };

        let mut rules = vec![
            format!("Produce exactly {} {}, no more and no fewer.", count, slides),
            "Give every slide a short, non-empty title.".to_string(),
            "Open every slide with a one or two sentence summary that leads into its points."
                .to_string(),
            "Give each slide 3-4 main points, each backed by 1-2 supporting facts with a brief explanation."
                .to_string(),
            format!(
                "Use at most {} bullets per slide, counting main points and supporting facts together.",
                self.policy.max_bullets_per_slide
            ),
            format!(
                "Do not nest deeper than {} levels (main point, then supporting fact).",
                self.policy.max_depth
            ),
            "Never repeat the same bullet twice in a row; every slide covers different ground."
                .to_string(),
        ];
        if count >= 3 {
            rules.push(
                "Make the first slide an introduction and the last slide a summary.".to_string(),
            );
        }
        rules.push(format!(
            "Keep every point specific to \"{}\"; avoid placeholders such as \"Point 1\".",
            topic
        ));

        let mut prompt = String::with_capacity(2048);
        let _ = writeln!(prompt, "Create an outline for a {}-slide presentation.\n", count);
        let _ = writeln!(prompt, "Topic: {}\n", topic);
        prompt.push_str("Requirements:\n");
        for (idx, rule) in rules.iter().enumerate() {
            let _ = writeln!(prompt, "{}. {}", idx + 1, rule);
        }
        prompt.push_str("\nRespond with JSON only, no commentary, in exactly this shape:\n");
        prompt.push_str(FORMAT_CONTRACT);
        let _ = writeln!(
            prompt,
            "\n\nThe array must contain exactly {} {}.",
            count, if count == 1 { "object" } else { "objects" }
        );
        prompt
    }
}
