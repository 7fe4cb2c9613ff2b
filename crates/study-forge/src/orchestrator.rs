//! Request orchestration: routing, bounded fan-out, retries, assembly.
//!
//! # State machine
//!
//! ```text
//! Estimating -> Routing -> { DirectGenerating | ChunkGenerating } -> Assembling -> Done
//! ```
//!
//! Planning and assembly are the pure functions in
//! [`study_forge_core::pipeline`]. This module adds the runtime concerns:
//!
//! - **Fan-out/fan-in.** Work units run through
//!   `futures::stream::buffer_unordered` with at most
//!   `min(units, max_concurrency)` calls in flight. Each unit resolves to an
//!   immutable [`ChunkReport`]; the reports are folded once, after every
//!   unit has finished. No counter is shared between tasks.
//! - **Retries.** `Network` failures and `Upstream` 429/5xx are retried up
//!   to `chunk_retries` times with exponential backoff
//!   (`retry_backoff_ms × 2^(attempt-1)`, exponent capped at 5). Timeouts,
//!   parse failures, and validation failures are never retried.
//! - **Cancellation.** Dropping the future returned by
//!   [`Orchestrator::generate`] stops launching new calls and discards any
//!   partial work.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use study_forge_core::artifact::{strategy_for, ArtifactStrategy};
use study_forge_core::backend::GenerationBackend;
use study_forge_core::config::PipelineConfig;
use study_forge_core::error::ChunkError;
use study_forge_core::models::{GenerationRequest, ResultSet, TypeParams};
use study_forge_core::pipeline::{self, ChunkReport, Plan, WorkUnit};

pub struct Orchestrator {
    backend: Arc<dyn GenerationBackend>,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: PipelineConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Routing decision for `request`, without calling the backend.
    pub fn plan(&self, request: &GenerationRequest) -> Plan {
        pipeline::plan(
            request,
            strategy_for(request.artifact_type()),
            &self.config.budget,
        )
    }

    /// Run the full pipeline for one request.
    ///
    /// Never fails: per-chunk problems are counted in the returned
    /// [`ResultSet`]. Call [`ResultSet::into_result`] to turn an empty result
    /// into an error.
    pub async fn generate(&self, request: &GenerationRequest) -> ResultSet {
        self.generate_with(strategy_for(request.artifact_type()), request)
            .await
    }

    /// [`generate`](Self::generate) with a caller-supplied strategy.
    pub async fn generate_with(
        &self,
        strategy: &dyn ArtifactStrategy,
        request: &GenerationRequest,
    ) -> ResultSet {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "generate",
            %request_id,
            artifact = %request.artifact_type(),
            backend = self.backend.name(),
        );
        self.run(strategy, request).instrument(span).await
    }

    async fn run(&self, strategy: &dyn ArtifactStrategy, request: &GenerationRequest) -> ResultSet {
        let plan = pipeline::plan(request, strategy, &self.config.budget);
        info!(
            estimate = plan.estimate,
            budget = plan.max_tokens_per_call,
            route = ?plan.route,
            chunks = plan.units.len(),
            chunk_char_budget = plan.chunk_char_budget,
            "routed request"
        );

        let limit = plan
            .units
            .len()
            .min(self.config.concurrency.max_concurrency)
            .max(1);

        let reports: Vec<ChunkReport> = stream::iter(plan.units.iter())
            .map(|unit| self.run_unit(strategy, unit, request.params()))
            .buffer_unordered(limit)
            .collect()
            .await;

        let result = pipeline::assemble(
            request.artifact_type(),
            strategy,
            reports,
            request.target_count(),
        );

        info!(
            succeeded_chunks = result.succeeded_chunks,
            failed_chunks = result.failed_chunks,
            items = result.items.len(),
            dropped_records = result.dropped_records,
            duplicates_removed = result.duplicates_removed,
            outcome = ?result.outcome,
            "generation finished"
        );
        result
    }

    async fn run_unit(
        &self,
        strategy: &dyn ArtifactStrategy,
        unit: &WorkUnit,
        params: &TypeParams,
    ) -> ChunkReport {
        let started = Instant::now();
        let index = unit.chunk.index;
        let retries = self.config.concurrency.chunk_retries;
        let mut attempts = 0u32;

        let result = loop {
            attempts += 1;
            let outcome = pipeline::execute_unit(
                self.backend.as_ref(),
                strategy,
                unit,
                params,
                &self.config.validation,
            )
            .await;

            match outcome {
                Err(ChunkError::Call(ref failure)) if failure.is_retryable() && attempts <= retries => {
                    let delay = backoff(self.config.concurrency.retry_backoff_ms, attempts);
                    warn!(
                        chunk = index,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "retrying chunk"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => break other,
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(output) => {
                if output.dropped > 0 {
                    debug!(chunk = index, dropped = output.dropped, "dropped invalid records");
                }
                info!(
                    chunk = index,
                    chars = unit.chunk.char_size,
                    records = output.records.len(),
                    attempts,
                    elapsed_ms,
                    "chunk completed"
                );
            }
            Err(err) => warn!(
                chunk = index,
                kind = ?err.kind(),
                attempts,
                elapsed_ms,
                error = %err,
                "chunk failed"
            ),
        }

        ChunkReport {
            index,
            result,
            attempts,
            elapsed_ms,
        }
    }
}

/// Delay before retry number `attempt` (1-based).
fn backoff(base_ms: u64, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(5);
    Duration::from_millis(base_ms.saturating_mul(1 << exp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use study_forge_core::error::{CallFailure, FailureKind};
    use study_forge_core::models::{ArtifactType, Outcome, QuizKind, ValidatedRecord};
    use study_forge_core::pipeline::Route;

    type Reply = Result<String, CallFailure>;

    /// Replies chosen by a marker word found in the prompt. Each marker has
    /// a queue of replies; the last one repeats.
    struct ScriptedBackend {
        script: Vec<(&'static str, Vec<Reply>)>,
        calls: Mutex<HashMap<&'static str, usize>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedBackend {
        fn new(script: Vec<(&'static str, Vec<Reply>)>) -> Self {
            Self {
                script,
                calls: Mutex::new(HashMap::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self, marker: &str) -> usize {
            self.calls.lock().unwrap().get(marker).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, prompt: &str) -> Result<String, CallFailure> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let (marker, replies) = self
                .script
                .iter()
                .find(|(marker, _)| prompt.contains(marker))
                .expect("no scripted reply for prompt");
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(*marker).or_insert(0);
            let reply = replies[(*n).min(replies.len() - 1)].clone();
            *n += 1;
            reply
        }
    }

    fn cards(prefix: &str, n: usize) -> Reply {
        let items: Vec<_> = (0..n)
            .map(|i| serde_json::json!({"question": format!("{} question {}", prefix, i), "answer": "yes"}))
            .collect();
        Ok(format!("```json\n{}\n```", serde_json::Value::Array(items)))
    }

    /// Paragraphs tagged with the given markers, each about 120 characters.
    fn tagged_text(markers: &[&str]) -> String {
        markers
            .iter()
            .map(|m| {
                format!(
                    "{} paragraph. Proteins fold into shapes that determine their function in the living cell today."
                    , m
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Budget small enough that every tagged paragraph is its own chunk.
    fn small_budget_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.budget.max_tokens_per_call = 50;
        config.concurrency.retry_backoff_ms = 1;
        config
    }

    fn flashcards(text: &str, count: u32) -> GenerationRequest {
        GenerationRequest::new(text, ArtifactType::Flashcard, Some(count), Default::default()).unwrap()
    }

    #[tokio::test]
    async fn test_direct_path_single_call() {
        let backend = Arc::new(ScriptedBackend::new(vec![("mitosis", vec![cards("cell", 5)])]));
        let orch = Orchestrator::new(backend.clone(), PipelineConfig::default());
        let request = flashcards("Cells divide by mitosis.", 3);

        assert_eq!(orch.plan(&request).route, Route::Direct);
        let result = orch.generate(&request).await;

        assert_eq!(backend.calls("mitosis"), 1);
        assert_eq!(result.items.len(), 3);
        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(result.succeeded_chunks, 1);
    }

    #[tokio::test]
    async fn test_chunked_failure_isolated() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            ("ALPHA", vec![cards("alpha", 2)]),
            ("BRAVO", vec![Err(CallFailure::Network("connection reset".into()))]),
            ("CHARLIE", vec![cards("charlie", 2)]),
        ]));
        let orch = Orchestrator::new(backend.clone(), small_budget_config());
        let request = flashcards(&tagged_text(&["ALPHA", "BRAVO", "CHARLIE"]), 6);

        let plan = orch.plan(&request);
        assert_eq!(plan.route, Route::Chunked);
        assert_eq!(plan.units.len(), 3);

        let result = orch.generate(&request).await;
        assert_eq!(result.outcome, Outcome::Partial);
        assert_eq!(result.failed_chunks, 1);
        assert_eq!(result.succeeded_chunks, 2);
        assert_eq!(result.failures[0].chunk_index, 1);
        assert_eq!(result.failures[0].kind, FailureKind::Network);

        let questions: Vec<_> = result
            .items
            .iter()
            .map(|r| r.primary_text().into_owned())
            .collect();
        assert_eq!(
            questions,
            vec![
                "alpha question 0",
                "alpha question 1",
                "charlie question 0",
                "charlie question 1"
            ]
        );
    }

    #[tokio::test]
    async fn test_retryable_failure_is_retried() {
        let backend = Arc::new(ScriptedBackend::new(vec![(
            "mitosis",
            vec![
                Err(CallFailure::upstream(Some(503), "overloaded")),
                Err(CallFailure::Network("reset".into())),
                cards("cell", 2),
            ],
        )]));
        let mut config = PipelineConfig::default();
        config.concurrency.chunk_retries = 2;
        config.concurrency.retry_backoff_ms = 1;
        let orch = Orchestrator::new(backend.clone(), config);

        let result = orch.generate(&flashcards("Cells divide by mitosis.", 2)).await;
        assert_eq!(backend.calls("mitosis"), 3);
        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(result.items.len(), 2);
    }

    #[tokio::test]
    async fn test_timeout_and_client_errors_not_retried() {
        for failure in [
            CallFailure::Timeout("120s".into()),
            CallFailure::upstream(Some(400), "bad request"),
        ] {
            let backend = Arc::new(ScriptedBackend::new(vec![("mitosis", vec![Err(failure)])]));
            let mut config = PipelineConfig::default();
            config.concurrency.chunk_retries = 3;
            config.concurrency.retry_backoff_ms = 1;
            let orch = Orchestrator::new(backend.clone(), config);

            let result = orch.generate(&flashcards("Cells divide by mitosis.", 2)).await;
            assert_eq!(backend.calls("mitosis"), 1);
            assert_eq!(result.outcome, Outcome::Failure);
        }
    }

    #[tokio::test]
    async fn test_retries_disabled_by_default() {
        let backend = Arc::new(ScriptedBackend::new(vec![(
            "mitosis",
            vec![Err(CallFailure::Network("reset".into())), cards("cell", 2)],
        )]));
        let orch = Orchestrator::new(backend.clone(), PipelineConfig::default());
        let result = orch.generate(&flashcards("Cells divide by mitosis.", 2)).await;
        assert_eq!(backend.calls("mitosis"), 1);
        assert!(result.into_result().is_err());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let markers = ["ALPHA", "BRAVO", "CHARLIE", "DELTA", "ECHO", "FOXTROT"];
        let script = markers.iter().map(|m| (*m, vec![cards(m, 1)])).collect();
        let backend = Arc::new(ScriptedBackend::new(script).with_delay(Duration::from_millis(20)));
        let mut config = small_budget_config();
        config.concurrency.max_concurrency = 2;
        let orch = Orchestrator::new(backend.clone(), config);

        let result = orch.generate(&flashcards(&tagged_text(&markers), 12)).await;
        assert_eq!(result.succeeded_chunks, 6);
        assert_eq!(result.items.len(), 6);
        assert!(backend.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_parse_failure_counts_as_failed_chunk() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            ("ALPHA", vec![Ok("Sorry, I can't do that.".to_string())]),
            ("BRAVO", vec![cards("bravo", 1)]),
        ]));
        let orch = Orchestrator::new(backend, small_budget_config());
        let result = orch.generate(&flashcards(&tagged_text(&["ALPHA", "BRAVO"]), 4)).await;
        assert_eq!(result.outcome, Outcome::Partial);
        assert_eq!(result.failures[0].kind, FailureKind::Parse);
    }

    #[tokio::test]
    async fn test_quiz_fill_blank_edge_record_dropped() {
        let reply = r#"[
            {"question": "_____ is a gas.", "type": "fill_in_blanks", "correct_answer": "Oxygen", "explanation": ""},
            {"question": "Plants release _____ during the day.", "type": "fill_in_blanks", "correct_answer": "oxygen", "explanation": ""}
        ]"#;
        let backend = Arc::new(ScriptedBackend::new(vec![("photosynthesis", vec![Ok(reply.to_string())])]));
        let orch = Orchestrator::new(backend, PipelineConfig::default());
        let params = TypeParams {
            quiz_kind: Some(QuizKind::FillInBlanks),
            ..Default::default()
        };
        let request = GenerationRequest::new(
            "Leaves perform photosynthesis.",
            ArtifactType::QuizQuestion,
            Some(2),
            params,
        )
        .unwrap();

        let result = orch.generate(&request).await;
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.dropped_records, 1);
        match &result.items[0] {
            ValidatedRecord::QuizQuestion(q) => assert_eq!(q.correct_answer, "oxygen"),
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert_eq!(backoff(1000, 1), Duration::from_millis(1000));
        assert_eq!(backoff(1000, 2), Duration::from_millis(2000));
        assert_eq!(backoff(1000, 3), Duration::from_millis(4000));
        assert_eq!(backoff(1000, 10), Duration::from_millis(32_000));
    }
}
