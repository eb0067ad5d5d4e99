//! Content planner: drives model, parser and validator to a valid outline.
//!
//! Two budgets apply. Schema attempts (`PlannerConfig::max_attempts`) are
//! spent when a response is unparseable or breaks a rule; the next prompt
//! then carries the corrections. Transport retries
//! (`PlannerConfig::transport`) are spent inside one schema attempt when the
//! model cannot be reached, with exponential backoff between calls.

use crate::client::{GenerationParams, ModelClient};
use crate::prompt::PromptBuilder;
use smartppt_core::{
    GenerationRequest, Outline, OutlineParser, PipelineConfig, PlannerConfig, PlanningError,
    Rejection, RequestError, SchemaValidator, SlideCountBounds, TransportError, ValidationResult,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Produces validated outlines from a model.
///
/// Holds only immutable configuration, so one planner can serve concurrent
/// requests; each call to [`plan`](Self::plan) owns its own retry state.
pub struct ContentPlanner {
    model: Arc<dyn ModelClient>,
    config: PlannerConfig,
    bounds: SlideCountBounds,
    params: GenerationParams,
    parser: OutlineParser,
    validator: SchemaValidator,
    prompts: PromptBuilder,
}

impl ContentPlanner {
    /// Create a planner with default configuration.
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self::from_config(model, &PipelineConfig::default())
    }

    /// Create a planner from a pipeline configuration.
    pub fn from_config(model: Arc<dyn ModelClient>, config: &PipelineConfig) -> Self {
        Self {
            model,
            config: config.planner.with_max_attempts(config.planner.max_attempts),
            bounds: config.request,
            params: GenerationParams::from(&config.model),
            parser: OutlineParser::with_options(config.parser),
            validator: SchemaValidator::with_policy(config.validation),
            prompts: PromptBuilder::new(config.validation),
        }
    }

    /// The planner's retry configuration.
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Validate raw inbound values into a request.
    pub fn request(&self, topic: &str, slide_count: i64) -> Result<GenerationRequest, RequestError> {
        GenerationRequest::new(topic, slide_count, &self.bounds)
    }

    /// Validate the inbound values, then plan. The model is never called for
    /// a bad request.
    pub async fn plan_topic(
        &self,
        topic: &str,
        slide_count: i64,
        cancel: &CancellationToken,
    ) -> Result<Outline, PlanningError> {
        let request = self.request(topic, slide_count)?;
        self.plan(&request, cancel).await
    }

    /// Plan an outline for the request.
    pub async fn plan(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<Outline, PlanningError> {
        request.check_bounds(&self.bounds)?;

        log::info!(
            "Planning {} slide(s) on \"{}\" with {}",
            request.slide_count(),
            request.topic(),
            self.model.name()
        );

        let max_attempts = self.config.max_attempts.max(1);
        let mut previous: Option<Rejection> = None;
        let mut attempt = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(PlanningError::Cancelled);
            }

            let prompt = self.prompts.build(request, previous.as_ref());
            let raw = self.call_model(&prompt, cancel).await?;

            let rejection = match self.parser.parse(&raw) {
                Ok(candidate) => match self.validator.validate(candidate, request) {
                    ValidationResult::Valid(outline) => {
                        log::info!("Outline accepted on attempt {}/{}", attempt, max_attempts);
                        return Ok(outline);
                    }
                    ValidationResult::Invalid(violations) => Rejection::Invalid(violations),
                },
                Err(e) => Rejection::Unparseable(e),
            };

            log::warn!(
                "Attempt {}/{} rejected: {}",
                attempt,
                max_attempts,
                rejection
            );

            if attempt >= max_attempts {
                return Err(PlanningError::Exhausted {
                    attempts: attempt,
                    last: rejection,
                });
            }
            previous = Some(rejection);
            attempt += 1;
        }
    }

    /// Call the model, retrying transport failures with backoff.
    async fn call_model(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, PlanningError> {
        let backoff = &self.config.transport;
        let max_calls = backoff.max_attempts.max(1);
        let timeout = self.config.call_timeout();
        let mut call = 1;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::info!("Cancelled during model call");
                    return Err(PlanningError::Cancelled);
                }
                outcome = tokio::time::timeout(timeout, self.model.generate(prompt, &self.params)) => outcome,
            };

            let error = match outcome {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(e)) => e,
                Err(_) => TransportError::Timeout(timeout),
            };

            if !error.is_retryable() || call >= max_calls {
                log::error!("Model unavailable after {} call(s): {}", call, error);
                return Err(PlanningError::ModelUnavailable {
                    attempts: call,
                    source: error,
                });
            }

            let delay = backoff.delay_after(call);
            log::warn!(
                "Model call {}/{} failed ({}); retrying in {:?}",
                call,
                max_calls,
                error,
                delay
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PlanningError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            call += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ScriptedModel;
    use async_trait::async_trait;
    use smartppt_core::{BackoffConfig, RuleId, Violation};
    use std::time::Duration;

    /// A well-formed JSON deck with `n` slides and 2-3 points each.
    fn deck(n: usize) -> String {
        deck_with(n, |_| None)
    }

    fn deck_with(n: usize, title_override: impl Fn(usize) -> Option<String>) -> String {
        let slides: Vec<serde_json::Value> = (1..=n)
            .map(|i| {
                let points: Vec<serde_json::Value> = (1..=(2 + i % 2))
                    .map(|p| {
                        serde_json::json!({
                            "main_point": format!("Point {}.{}", i, p),
                            "supporting_facts": [{"fact": format!("Fact {}.{}", i, p), "explanation": "why"}]
                        })
                    })
                    .collect();
                serde_json::json!({
                    "title": title_override(i).unwrap_or_else(|| format!("Slide {}", i)),
                    "summary": "Lead in.",
                    "points": points,
                })
            })
            .collect();
        serde_json::to_string(&slides).unwrap()
    }

    fn fast_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.planner = config.planner.with_transport(BackoffConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            factor: 2.0,
            max_delay_ms: 4,
        });
        config
    }

    fn planner(model: Arc<dyn ModelClient>) -> ContentPlanner {
        ContentPlanner::from_config(model, &fast_config())
    }

    #[tokio::test]
    async fn test_well_formed_outline_accepted_first_attempt() {
        let model = Arc::new(ScriptedModel::always(deck(5)));
        let outline = planner(model.clone())
            .plan_topic("Ocean Conservation", 5, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outline.len(), 5);
        assert_eq!(model.calls(), 1);
        let prompt = &model.prompts()[0];
        assert!(prompt.contains("Ocean Conservation"));
        assert!(prompt.contains("exactly 5 slides"));
    }

    #[tokio::test]
    async fn test_invalid_slide_count_never_calls_model() {
        let model = Arc::new(ScriptedModel::always(deck(5)));
        let planner = planner(model.clone());
        for count in [-1, 0, 51, 500] {
            let err = planner
                .plan_topic("Ocean Conservation", count, &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                PlanningError::Request(RequestError::InvalidSlideCount { .. })
            ));
        }
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_short_outline_gets_guided_retry() {
        let model = Arc::new(ScriptedModel::new([Ok(deck(3)), Ok(deck(5))]));
        let outline = planner(model.clone())
            .plan_topic("Ocean Conservation", 5, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outline.len(), 5);
        let prompts = model.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(!prompts[0].contains("previous attempt was rejected"));
        assert!(prompts[1].contains("2 additional slides needed"));
    }

    /// Fixes exactly the defects the prompt reports, one at a time.
    struct CorrectingModel;

    #[async_trait]
    impl ModelClient for CorrectingModel {
        async fn generate(
            &self,
            prompt: &str,
            _params: &GenerationParams,
        ) -> Result<String, TransportError> {
            let count = if prompt.contains("additional slides needed") { 5 } else { 3 };
            let fix_title = prompt.contains("Slide 2 had an empty title");
            Ok(deck_with(count, |i| {
                (i == 2 && !fix_title).then(|| "  ".to_string())
            }))
        }

        fn name(&self) -> &str {
            "correcting"
        }
    }

    #[tokio::test]
    async fn test_guided_retry_converges_within_budget() {
        let planner = planner(Arc::new(CorrectingModel));
        let outline = planner
            .plan_topic("Ocean Conservation", 5, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outline.len(), 5);
        assert_eq!(outline.slides()[1].text, "Slide 2");
    }

    #[tokio::test]
    async fn test_persistent_defects_exhaust_attempts() {
        let model = Arc::new(ScriptedModel::always(deck(3)));
        let err = planner(model.clone())
            .plan_topic("Ocean Conservation", 5, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            PlanningError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(last.violations()[0].rule(), RuleId::SlideCount);
                assert_eq!(
                    last.violations()[0],
                    Violation::SlideCount { expected: 5, actual: 3 }
                );
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn test_unparseable_responses_are_rejections() {
        let model = Arc::new(ScriptedModel::new([
            Ok("Sorry, I can't do that.".to_string()),
            Ok(deck(2)),
        ]));
        let outline = planner(model.clone())
            .plan_topic("Ocean Conservation", 2, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outline.len(), 2);
        assert!(model.prompts()[1].contains("could not be parsed"));
    }

    #[tokio::test]
    async fn test_transport_failures_do_not_consume_schema_attempts() {
        let model = Arc::new(ScriptedModel::new([
            Err(TransportError::Connection("reset".into())),
            Err(TransportError::Status {
                status: 503,
                body: "busy".into(),
            }),
            Ok(deck(3)),
            Ok(deck(3)),
            Ok(deck(4)),
        ]));
        let mut config = fast_config();
        config.planner = config.planner.with_max_attempts(1);
        let planner = ContentPlanner::from_config(model.clone(), &config);

        // One schema attempt, three transport calls, then success.
        let outline = planner
            .plan_topic("Ocean Conservation", 3, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outline.len(), 3);
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn test_transport_exhaustion_is_model_unavailable() {
        let model = Arc::new(ScriptedModel::new([Err(TransportError::Connection(
            "refused".into(),
        ))]));
        let err = planner(model.clone())
            .plan_topic("Ocean Conservation", 3, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PlanningError::ModelUnavailable { attempts: 3, source: TransportError::Connection(_) }
        ));
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_transport_error_fails_fast() {
        let model = Arc::new(ScriptedModel::new([Err(TransportError::MissingApiKey)]));
        let err = planner(model.clone())
            .plan_topic("Ocean Conservation", 3, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PlanningError::ModelUnavailable { attempts: 1, source: TransportError::MissingApiKey }
        ));
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_calls() {
        let model = Arc::new(ScriptedModel::new([
            Err(TransportError::Connection("a".into())),
            Err(TransportError::Connection("b".into())),
            Ok(deck(1)),
        ]));
        // Default backoff: 1s then 2s.
        let planner = ContentPlanner::new(model.clone());

        let started = tokio::time::Instant::now();
        planner
            .plan_topic("Ocean Conservation", 1, &CancellationToken::new())
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(model.calls(), 3);
    }

    /// Never answers.
    struct HangingModel;

    #[async_trait]
    impl ModelClient for HangingModel {
        async fn generate(
            &self,
            _prompt: &str,
            _params: &GenerationParams,
        ) -> Result<String, TransportError> {
            std::future::pending().await
        }

        fn name(&self) -> &str {
            "hanging"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_calls_time_out() {
        let mut config = fast_config();
        config.planner.call_timeout_secs = 5;
        let planner = ContentPlanner::from_config(Arc::new(HangingModel), &config);

        let err = planner
            .plan_topic("Ocean Conservation", 2, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PlanningError::ModelUnavailable { attempts: 3, source: TransportError::Timeout(_) }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_in_flight_call() {
        let planner = planner(Arc::new(HangingModel));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = planner
            .plan_topic("Ocean Conservation", 2, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PlanningError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_model() {
        let model = Arc::new(ScriptedModel::always(deck(2)));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = planner(model.clone())
            .plan_topic("Ocean Conservation", 2, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PlanningError::Cancelled));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_zero_slide_request_rejected_with_zero_min() {
        let model = Arc::new(ScriptedModel::always("[]"));
        let mut config = fast_config();
        config.request = SlideCountBounds { min: 0, max: 10 };
        let planner = ContentPlanner::from_config(model.clone(), &config);

        let err = planner
            .plan_topic("Ocean", 0, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PlanningError::Request(RequestError::InvalidSlideCount { requested: 0, .. })
        ));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_planner_bounds_apply_to_prebuilt_requests() {
        let model = Arc::new(ScriptedModel::always(deck(30)));
        let mut config = fast_config();
        config.request = SlideCountBounds { min: 1, max: 20 };
        let planner = ContentPlanner::from_config(model.clone(), &config);

        let request =
            GenerationRequest::new("Ocean Conservation", 30, &SlideCountBounds::default()).unwrap();
        let err = planner
            .plan(&request, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PlanningError::Request(_)));
        assert_eq!(model.calls(), 0);
    }
}
