//! Per-artifact-type strategies.
//!
//! The pipeline is generic over [`ArtifactStrategy`]: every artifact type
//! runs through the same estimate / chunk / generate / sanitize / validate /
//! dedupe / truncate path, and only the pieces below differ between types.

use serde_json::Value;

use crate::error::ValidationError;
use crate::models::{ArtifactType, TypeParams, ValidatedRecord};
use crate::prompt;
use crate::sanitize::Shape;
use crate::validate::{self, Validated, ValidationPolicy};

/// Behaviour that varies by artifact type.
///
/// Every method except [`artifact_type`](ArtifactStrategy::artifact_type)
/// has a default derived from it; implementors override what differs.
pub trait ArtifactStrategy: Send + Sync {
    fn artifact_type(&self) -> ArtifactType;

    /// Top-level container the service is asked to return.
    fn expected_shape(&self) -> Shape {
        validate::expected_shape(self.artifact_type())
    }

    /// Whether oversized input may be split across several calls.
    fn supports_chunking(&self) -> bool {
        true
    }

    fn build_prompt(
        &self,
        payload: &str,
        count: Option<u32>,
        params: &TypeParams,
        policy: &ValidationPolicy,
    ) -> String {
        prompt::build_prompt(self.artifact_type(), payload, count, params, policy)
    }

    fn validate(
        &self,
        value: &Value,
        params: &TypeParams,
        policy: &ValidationPolicy,
    ) -> Result<Validated, ValidationError> {
        validate::validate(value, self.artifact_type(), params, policy)
    }

    /// Text hashed for deduplication.
    fn primary_text(&self, record: &ValidatedRecord) -> String {
        record.primary_text().into_owned()
    }
}

pub struct FlashcardStrategy;

impl ArtifactStrategy for FlashcardStrategy {
    fn artifact_type(&self) -> ArtifactType {
        ArtifactType::Flashcard
    }
}

pub struct QuizStrategy;

impl ArtifactStrategy for QuizStrategy {
    fn artifact_type(&self) -> ArtifactType {
        ArtifactType::QuizQuestion
    }
}

pub struct StudyNoteStrategy;

impl ArtifactStrategy for StudyNoteStrategy {
    fn artifact_type(&self) -> ArtifactType {
        ArtifactType::StudyNote
    }
}

pub struct EnhancedNoteStrategy;

impl ArtifactStrategy for EnhancedNoteStrategy {
    fn artifact_type(&self) -> ArtifactType {
        ArtifactType::EnhancedNote
    }
}

/// Grades one learner answer. The payload is the answer itself, so it is
/// never split.
pub struct AnswerValidationStrategy;

impl ArtifactStrategy for AnswerValidationStrategy {
    fn artifact_type(&self) -> ArtifactType {
        ArtifactType::AnswerValidation
    }

    fn supports_chunking(&self) -> bool {
        false
    }
}

/// Built-in strategy for `artifact`.
pub fn strategy_for(artifact: ArtifactType) -> &'static dyn ArtifactStrategy {
    match artifact {
        ArtifactType::Flashcard => &FlashcardStrategy,
        ArtifactType::QuizQuestion => &QuizStrategy,
        ArtifactType::StudyNote => &StudyNoteStrategy,
        ArtifactType::EnhancedNote => &EnhancedNoteStrategy,
        ArtifactType::AnswerValidation => &AnswerValidationStrategy,
    }
}
