//! Pipeline configuration.
//!
//! Every knob has a default so an empty TOML file (or no file at all) gives
//! a working setup. Sections absent from the file keep their defaults.
//!
//! ```toml
//! [request]
//! max = 20
//!
//! [validation]
//! max_bullets_per_slide = 8
//!
//! [planner]
//! max_attempts = 4
//! ```

use crate::error::ConfigError;
use crate::types::SlideCountBounds;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration for one pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub request: SlideCountBounds,
    pub parser: ParserOptions,
    pub validation: ValidationPolicy,
    pub planner: PlannerConfig,
    pub model: ModelConfig,
    pub render: RenderLimits,
}

impl PipelineConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the limits that serde cannot express.
    ///
    /// The renderer lays out at most two levels below the title, so deeper
    /// nesting would pass validation and then fail to render.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bounds = &self.request;
        if bounds.min < 1 {
            return Err(invalid("request.min", format!("must be at least 1, got {}", bounds.min)));
        }
        if bounds.min > bounds.max {
            return Err(invalid(
                "request.max",
                format!("must be at least request.min ({}), got {}", bounds.min, bounds.max),
            ));
        }
        let policy = &self.validation;
        if policy.max_bullets_per_slide < 1 {
            return Err(invalid("validation.max_bullets_per_slide", "must be at least 1".to_string()));
        }
        if !(1..=MAX_RENDERABLE_DEPTH).contains(&policy.max_depth) {
            return Err(invalid(
                "validation.max_depth",
                format!("must be between 1 and {}, got {}", MAX_RENDERABLE_DEPTH, policy.max_depth),
            ));
        }
        Ok(())
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded config from {}", path.display());
        Self::from_toml_str(&text)
    }
}

/// Bullet and sub-bullet.
const MAX_RENDERABLE_DEPTH: usize = 2;

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

/// Options for the outline parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Accept slides that have a title and no bullets (section headers).
    pub allow_title_only_slides: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            allow_title_only_slides: true,
        }
    }
}

/// Limits enforced by the schema validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    /// Deepest allowed level below the slide root (2 = bullet, sub-bullet).
    pub max_depth: usize,
    /// Most bullets a slide may hold, counting every level.
    pub max_bullets_per_slide: usize,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_bullets_per_slide: 12,
        }
    }
}

impl ValidationPolicy {
    /// Builder method: set the bullet cap (at least 1).
    pub fn with_max_bullets_per_slide(mut self, max: usize) -> Self {
        self.max_bullets_per_slide = max.max(1);
        self
    }

    /// Builder method: set the nesting limit (between 1 and 2).
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.clamp(1, MAX_RENDERABLE_DEPTH);
        self
    }
}

/// Exponential backoff for transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Calls made per model request before giving up, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Multiplier applied to the delay after each retry.
    pub factor: f64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            factor: 2.0,
            max_delay_ms: 8000,
        }
    }
}

impl BackoffConfig {
    /// Delay to wait after the given failed call (1-based).
    pub fn delay_after(&self, failed_call: u32) -> Duration {
        let exponent = failed_call.saturating_sub(1) as i32;
        let millis = self.base_delay_ms as f64 * self.factor.max(1.0).powi(exponent);
        let capped = millis.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

/// Retry budgets and timeouts for the content planner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Schema attempts (prompt, parse, validate) before giving up.
    pub max_attempts: u32,
    /// Backoff applied to transport failures within one schema attempt.
    pub transport: BackoffConfig,
    /// Upper bound on one model call, in seconds.
    pub call_timeout_secs: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            transport: BackoffConfig::default(),
            call_timeout_secs: 120,
        }
    }
}

impl PlannerConfig {
    /// Builder method: set the schema attempt budget (at least 1).
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Builder method: replace the transport backoff.
    pub fn with_transport(mut self, transport: BackoffConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Timeout for a single model call.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.max(1))
    }
}

/// Connection settings for an OpenAI-compatible chat completions service.
///
/// The API key is deliberately absent; it comes from the command line or
/// the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// HTTP client timeout, in seconds.
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 3000,
            temperature: 0.2,
            timeout_secs: 120,
        }
    }
}

/// Placeholder text limits applied by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderLimits {
    /// Longest slide title kept, in characters.
    pub max_title_chars: usize,
    /// Longest summary or bullet kept, in characters.
    pub max_text_chars: usize,
}

impl Default for RenderLimits {
    fn default() -> Self {
        Self {
            max_title_chars: 120,
            max_text_chars: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_default() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [request]
            max = 20

            [planner]
            max_attempts = 5

            [planner.transport]
            base_delay_ms = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.request, SlideCountBounds { min: 1, max: 20 });
        assert_eq!(config.planner.max_attempts, 5);
        assert_eq!(config.planner.transport.base_delay_ms, 10);
        assert_eq!(config.planner.transport.max_attempts, 3);
        assert_eq!(config.validation, ValidationPolicy::default());
        assert_eq!(config.model.model, "gpt-3.5-turbo");
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let err = PipelineConfig::from_toml_str("[planner]\nmax_attempts = \"three\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        let cases = [
            ("[request]\nmin = 0\n", "request.min"),
            ("[request]\nmin = 10\nmax = 5\n", "request.max"),
            ("[validation]\nmax_bullets_per_slide = 0\n", "validation.max_bullets_per_slide"),
            ("[validation]\nmax_depth = 0\n", "validation.max_depth"),
            ("[validation]\nmax_depth = 3\n", "validation.max_depth"),
        ];
        for (toml, expected) in cases {
            match PipelineConfig::from_toml_str(toml) {
                Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected, "{}", toml),
                other => panic!("{:?} accepted: {:?}", toml, other),
            }
        }
    }

    #[test]
    fn test_in_range_limits_load() {
        let config = PipelineConfig::from_toml_str(
            "[request]\nmin = 3\nmax = 3\n[validation]\nmax_depth = 1\nmax_bullets_per_slide = 1\n",
        )
        .unwrap();
        assert_eq!(config.request, SlideCountBounds { min: 3, max: 3 });
        assert_eq!(config.validation.max_depth, 1);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = PipelineConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_backoff_delays_grow_and_cap() {
        let backoff = BackoffConfig::default();
        assert_eq!(backoff.delay_after(1), Duration::from_secs(1));
        assert_eq!(backoff.delay_after(2), Duration::from_secs(2));
        assert_eq!(backoff.delay_after(3), Duration::from_secs(4));
        assert_eq!(backoff.delay_after(10), Duration::from_secs(8));
    }

    #[test]
    fn test_builders_clamp_to_one() {
        assert_eq!(PlannerConfig::default().with_max_attempts(0).max_attempts, 1);
        let policy = ValidationPolicy::default()
            .with_max_bullets_per_slide(0)
            .with_max_depth(0);
        assert_eq!(policy.max_bullets_per_slide, 1);
        assert_eq!(policy.max_depth, 1);
        assert_eq!(ValidationPolicy::default().with_max_depth(5).max_depth, 2);
    }
}
