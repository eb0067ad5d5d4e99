//! Content planning for SmartPPT.
//!
//! Turns a validated [`GenerationRequest`](smartppt_core::GenerationRequest)
//! into an [`Outline`](smartppt_core::Outline) by prompting a model, parsing
//! its reply and retrying with targeted corrections until the outline passes
//! every validation rule.

pub mod client;
pub mod planner;
pub mod prompt;

pub use client::{GenerationParams, ModelClient, OpenAiClient, ScriptedModel};
pub use planner::ContentPlanner;
pub use prompt::PromptBuilder;
pub use tokio_util::sync::CancellationToken;
