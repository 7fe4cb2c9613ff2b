//! Runtime-free stages of the generation pipeline.
//!
//! The orchestrator in the application crate drives these stages; nothing
//! here spawns tasks, sleeps, or performs I/O beyond awaiting the supplied
//! [`GenerationBackend`].
//!
//! # Algorithm
//!
//! 1. **Estimate** the token cost of the whole source text.
//! 2. **Route**: at or under `max_tokens_per_call` (or for artifact types
//!    that never chunk) the request becomes a single direct work unit.
//!    Otherwise the text is split with [`split_text`] using a character
//!    budget derived from the token budget, and each chunk asks for
//!    `ceil(target / chunk_count)` items.
//! 3. **Per unit**: build prompt, call backend, extract JSON, validate.
//!    Every failure is captured as a [`ChunkError`] value.
//! 4. **Assemble**: order unit outputs by chunk index, dedupe, truncate to
//!    the target count, and derive the outcome from the counters.

use serde::Serialize;

use crate::artifact::ArtifactStrategy;
use crate::backend::{GenerationBackend, RawResponse};
use crate::chunk::split_text;
use crate::config::BudgetConfig;
use crate::dedup::dedupe_by;
use crate::error::ChunkError;
use crate::models::{
    ArtifactType, Chunk, ChunkFailureSummary, GenerationRequest, Outcome, ResultSet, TypeParams,
    ValidatedRecord,
};
use crate::sanitize;
use crate::validate::ValidationPolicy;

// ============ Planning ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Direct,
    Chunked,
}

/// One generation call to make.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkUnit {
    pub chunk: Chunk,
    /// Items this call should produce; `None` leaves it to the service.
    pub target: Option<u32>,
}

/// Routing decision for a request.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Estimated tokens for the full source text.
    pub estimate: usize,
    pub max_tokens_per_call: usize,
    pub chunk_char_budget: usize,
    pub route: Route,
    pub units: Vec<WorkUnit>,
}

/// Decide between the direct and chunked paths and lay out the work units.
pub fn plan(
    request: &GenerationRequest,
    strategy: &dyn ArtifactStrategy,
    budget: &BudgetConfig,
) -> Plan {
    plan_text(request.source_text(), request.target_count(), strategy, budget)
}

/// [`plan`] for bare text, without building a request.
pub fn plan_text(
    text: &str,
    target: Option<u32>,
    strategy: &dyn ArtifactStrategy,
    budget: &BudgetConfig,
) -> Plan {
    let artifact = strategy.artifact_type();
    let estimate = budget.estimator_for(artifact).estimate(text);
    let chunk_char_budget = budget.chunk_char_budget(artifact);

    let direct = estimate <= budget.max_tokens_per_call || !strategy.supports_chunking();
    let (route, units) = if direct {
        let unit = WorkUnit {
            chunk: Chunk::new(0, text),
            target,
        };
        (Route::Direct, vec![unit])
    } else {
        let chunks = split_text(text, chunk_char_budget);
        let per_chunk = target.map(|t| per_chunk_target(t, chunks.len()));
        let units = chunks
            .into_iter()
            .map(|chunk| WorkUnit {
                chunk,
                target: per_chunk,
            })
            .collect();
        (Route::Chunked, units)
    };

    Plan {
        estimate,
        max_tokens_per_call: budget.max_tokens_per_call,
        chunk_char_budget,
        route,
        units,
    }
}

/// `ceil(target / chunks)`, at least 1.
pub fn per_chunk_target(target: u32, chunks: usize) -> u32 {
    let chunks = u32::try_from(chunks.max(1)).unwrap_or(u32::MAX);
    target.div_ceil(chunks).max(1)
}

// ============ Per-unit execution ============

/// Validated output of one successful unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkOutput {
    pub records: Vec<ValidatedRecord>,
    /// Records that failed per-record validation.
    pub dropped: usize,
}

/// Final state of one unit after all attempts.
#[derive(Debug, Clone)]
pub struct ChunkReport {
    pub index: usize,
    pub result: Result<ChunkOutput, ChunkError>,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

/// Sanitize and validate one raw reply.
///
/// Shape coercion (e.g. unwrapping `{"flashcards": [...]}`) is attempted
/// first; a container that still does not match is reported by the
/// validator as [`ValidationError`](crate::error::ValidationError).
pub fn process_response(
    strategy: &dyn ArtifactStrategy,
    raw: &str,
    params: &TypeParams,
    policy: &ValidationPolicy,
) -> Result<ChunkOutput, ChunkError> {
    let shape = strategy.expected_shape();
    let value = sanitize::extract(raw)?;
    let value = if shape.matches(&value) {
        value
    } else {
        sanitize::coerce_shape(value.clone(), shape).unwrap_or(value)
    };
    let validated = strategy.validate(&value, params, policy)?;
    Ok(ChunkOutput {
        records: validated.records,
        dropped: validated.dropped,
    })
}

/// Run one unit once: prompt, call, extract, validate.
pub async fn execute_unit(
    backend: &dyn GenerationBackend,
    strategy: &dyn ArtifactStrategy,
    unit: &WorkUnit,
    params: &TypeParams,
    policy: &ValidationPolicy,
) -> Result<ChunkOutput, ChunkError> {
    let prompt = strategy.build_prompt(&unit.chunk.text, unit.target, params, policy);
    let raw = RawResponse::fetch(backend, unit.chunk.index, &prompt).await;
    process_response(strategy, &raw.text?, params, policy)
}

// ============ Assembly ============

/// Fold unit reports into the final [`ResultSet`].
///
/// Reports may arrive in any order; they are re-sorted by chunk index so the
/// output is the same regardless of completion order.
pub fn assemble(
    artifact: ArtifactType,
    strategy: &dyn ArtifactStrategy,
    mut reports: Vec<ChunkReport>,
    target: Option<u32>,
) -> ResultSet {
    reports.sort_by_key(|r| r.index);

    let mut items = Vec::new();
    let mut succeeded_chunks = 0;
    let mut dropped_records = 0;
    let mut failures = Vec::new();

    for report in reports {
        match report.result {
            Ok(output) => {
                succeeded_chunks += 1;
                dropped_records += output.dropped;
                items.extend(output.records);
            }
            Err(err) => failures.push(ChunkFailureSummary {
                chunk_index: report.index,
                kind: err.kind(),
                message: err.to_string(),
            }),
        }
    }

    let (mut items, duplicates_removed) = dedupe_by(items, |r| strategy.primary_text(r));
    if let Some(target) = target {
        items.truncate(target as usize);
    }

    let failed_chunks = failures.len();
    ResultSet {
        artifact_type: artifact,
        outcome: Outcome::from_counts(items.len(), failed_chunks),
        items,
        succeeded_chunks,
        failed_chunks,
        dropped_records,
        duplicates_removed,
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::strategy_for;
    use crate::error::{CallFailure, FailureKind, ParseError};
    use crate::models::Flashcard;

    fn request(text: &str, artifact: ArtifactType, target: Option<u32>) -> GenerationRequest {
        GenerationRequest::new(text, artifact, target, TypeParams::default()).unwrap()
    }

    fn long_text(chars: usize) -> String {
        let paragraph = "Enzymes lower the activation energy of reactions. They are not consumed.\n\n";
        paragraph.repeat(chars / paragraph.len() + 1)
    }

    fn card(q: &str) -> ValidatedRecord {
        ValidatedRecord::Flashcard(Flashcard {
            question: q.into(),
            answer: "answer".into(),
        })
    }

    fn ok_report(index: usize, records: Vec<ValidatedRecord>) -> ChunkReport {
        ChunkReport {
            index,
            result: Ok(ChunkOutput { records, dropped: 0 }),
            attempts: 1,
            elapsed_ms: 0,
        }
    }

    fn err_report(index: usize, err: ChunkError) -> ChunkReport {
        ChunkReport {
            index,
            result: Err(err),
            attempts: 1,
            elapsed_ms: 0,
        }
    }

    #[test]
    fn test_50k_chars_routes_direct() {
        let text = long_text(50_000);
        let req = request(&text, ArtifactType::Flashcard, Some(10));
        let plan = plan(&req, strategy_for(ArtifactType::Flashcard), &BudgetConfig::default());
        assert_eq!(plan.route, Route::Direct);
        assert_eq!(plan.units.len(), 1);
        assert_eq!(plan.units[0].target, Some(10));
        assert_eq!(plan.units[0].chunk.text, text);
    }

    #[test]
    fn test_500k_chars_routes_chunked() {
        let text = long_text(500_000);
        let req = request(&text, ArtifactType::Flashcard, Some(10));
        let budget = BudgetConfig::default();
        let plan = plan(&req, strategy_for(ArtifactType::Flashcard), &budget);
        assert_eq!(plan.route, Route::Chunked);
        assert!(plan.units.len() >= 2);
        assert_eq!(plan.chunk_char_budget, 90_909);
        for unit in &plan.units {
            assert!(unit.chunk.char_size <= plan.chunk_char_budget);
            assert_eq!(
                unit.target,
                Some(per_chunk_target(10, plan.units.len()))
            );
        }
    }

    #[test]
    fn test_answer_validation_never_chunked() {
        let text = long_text(500_000);
        let params = TypeParams {
            question: Some("Explain enzymes".into()),
            reference_answer: Some("Catalysts".into()),
            ..Default::default()
        };
        let req = GenerationRequest::new(text, ArtifactType::AnswerValidation, None, params).unwrap();
        let plan = plan(&req, strategy_for(ArtifactType::AnswerValidation), &BudgetConfig::default());
        assert_eq!(plan.route, Route::Direct);
        assert_eq!(plan.units.len(), 1);
    }

    #[test]
    fn test_per_chunk_target_rounds_up() {
        assert_eq!(per_chunk_target(10, 3), 4);
        assert_eq!(per_chunk_target(10, 5), 2);
        assert_eq!(per_chunk_target(1, 4), 1);
        assert_eq!(per_chunk_target(7, 0), 7);
    }

    #[test]
    fn test_process_response_fenced_with_bad_record() {
        let raw = "Sure! Here you go:\n```json\n{\"flashcards\": [{\"question\": \"Q1\", \"answer\": \"A1\"}, {\"question\": \"Q2\"}]}\n```";
        let out = process_response(
            strategy_for(ArtifactType::Flashcard),
            raw,
            &TypeParams::default(),
            &ValidationPolicy::default(),
        )
        .unwrap();
        assert_eq!(out.records, vec![ValidatedRecord::Flashcard(Flashcard {
            question: "Q1".into(),
            answer: "A1".into(),
        })]);
        assert_eq!(out.dropped, 1);
    }

    #[test]
    fn test_process_response_multiline_strings() {
        let params = TypeParams::default();
        let policy = ValidationPolicy::default();

        let raw = "[{\"question\": \"What is ATP?\", \"answer\": \"Line one\nline two\"}]";
        let out = process_response(strategy_for(ArtifactType::Flashcard), raw, &params, &policy)
            .unwrap();
        assert_eq!(out.records, vec![ValidatedRecord::Flashcard(Flashcard {
            question: "What is ATP?".into(),
            answer: "Line one\nline two".into(),
        })]);

        let raw = "```json\n{\"title\": \"Respiration\", \"summary\": \"Cells make ATP.\", \"content\": \"## Stages\n- Glycolysis\n\t- Krebs cycle\", \"key_concepts\": [\"ATP\"]}\n```";
        let out = process_response(strategy_for(ArtifactType::StudyNote), raw, &params, &policy)
            .unwrap();
        match &out.records[..] {
            [ValidatedRecord::StudyNote(note)] => {
                assert!(note.content.contains("Glycolysis\n\t- Krebs"));
            }
            other => panic!("unexpected records: {:?}", other),
        }
    }

    #[test]
    fn test_process_response_skips_citation_region() {
        let raw = r#"As noted in [1], here are the cards: [{"question": "Q", "answer": "A"}] extra }"#;
        let out = process_response(
            strategy_for(ArtifactType::Flashcard),
            raw,
            &TypeParams::default(),
            &ValidationPolicy::default(),
        )
        .unwrap();
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.dropped, 0);
    }

    #[test]
    fn test_process_response_error_kinds() {
        let strategy = strategy_for(ArtifactType::Flashcard);
        let params = TypeParams::default();
        let policy = ValidationPolicy::default();

        let err = process_response(strategy, "I cannot help with that.", &params, &policy).unwrap_err();
        assert_eq!(err, ChunkError::Parse(ParseError::NoJson));

        let err = process_response(strategy, r#"{"question": "Q", "answer": "A"}"#, &params, &policy)
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Validation);
    }

    #[test]
    fn test_dedupe_then_truncate_to_target() {
        let first: Vec<_> = (0..12).map(|i| card(&format!("Question {}", i))).collect();
        let dups = vec![card("question 0"), card("QUESTION 1"), card(" Question 2 ")];
        // completion order reversed on purpose
        let reports = vec![ok_report(1, dups), ok_report(0, first)];

        let result = assemble(
            ArtifactType::Flashcard,
            strategy_for(ArtifactType::Flashcard),
            reports,
            Some(10),
        );
        assert_eq!(result.items.len(), 10);
        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(result.duplicates_removed, 3);
        assert_eq!(result.items[0], card("Question 0"));
        assert_eq!(result.items[9], card("Question 9"));
    }

    #[test]
    fn test_failed_chunk_is_isolated() {
        let reports = vec![
            ok_report(0, vec![card("alpha")]),
            err_report(1, CallFailure::Network("connection reset".into()).into()),
            ok_report(2, vec![card("gamma")]),
        ];
        let result = assemble(
            ArtifactType::Flashcard,
            strategy_for(ArtifactType::Flashcard),
            reports,
            Some(5),
        );
        assert_eq!(result.items, vec![card("alpha"), card("gamma")]);
        assert_eq!(result.outcome, Outcome::Partial);
        assert_eq!(result.succeeded_chunks, 2);
        assert_eq!(result.failed_chunks, 1);
        assert_eq!(result.failures[0].chunk_index, 1);
        assert_eq!(result.failures[0].kind, FailureKind::Network);
    }

    #[test]
    fn test_all_chunks_failed_is_exhaustion() {
        let reports = vec![
            err_report(0, CallFailure::Timeout("120s".into()).into()),
            err_report(1, ParseError::Empty.into()),
        ];
        let result = assemble(
            ArtifactType::QuizQuestion,
            strategy_for(ArtifactType::QuizQuestion),
            reports,
            Some(5),
        );
        assert_eq!(result.outcome, Outcome::Failure);
        let err = result.into_result().unwrap_err();
        assert!(err.to_string().contains("2 of 2 chunks failed"));
    }

    #[test]
    fn test_no_target_keeps_everything() {
        let reports = vec![ok_report(0, vec![card("a"), card("b"), card("c")])];
        let result = assemble(
            ArtifactType::Flashcard,
            strategy_for(ArtifactType::Flashcard),
            reports,
            None,
        );
        assert_eq!(result.items.len(), 3);
    }
}
