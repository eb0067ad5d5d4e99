//! Core domain types, outline parsing and schema validation for SmartPPT.

pub mod config;
pub mod error;
pub mod parser;
pub mod types;
pub mod validator;

pub use config::{
    BackoffConfig, ModelConfig, ParserOptions, PipelineConfig, PlannerConfig, RenderLimits,
    ValidationPolicy,
};
pub use error::{
    ConfigError, Error, ParseError, PlanningError, RenderError, RequestError, Result,
    TransportError,
};
pub use parser::OutlineParser;
pub use types::{
    ContentNode, GenerationRequest, NodeKind, Outline, ParsedCandidate, SlideCountBounds,
    SourceFormat,
};
pub use validator::{Rejection, RuleId, SchemaValidator, ValidationResult, Violation};
