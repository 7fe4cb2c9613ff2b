//! Core data models for the generation pipeline.
//!
//! These types describe a request entering the pipeline, the chunks it is
//! split into, the validated artifact records that come out of it, and the
//! [`ResultSet`] handed back to the caller for persistence.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{FailureKind, PipelineError, RequestError};

/// Upper bound on `target_count` for a single request.
pub const MAX_TARGET_COUNT: u32 = 50;

// ============ Request ============

/// The kind of learning artifact to generate.
///
/// Deserializes through [`FromStr`], so config keys accept the same
/// aliases as the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum ArtifactType {
    Flashcard,
    QuizQuestion,
    StudyNote,
    EnhancedNote,
    AnswerValidation,
}

impl ArtifactType {
    pub const ALL: [ArtifactType; 5] = [
        ArtifactType::Flashcard,
        ArtifactType::QuizQuestion,
        ArtifactType::StudyNote,
        ArtifactType::EnhancedNote,
        ArtifactType::AnswerValidation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::Flashcard => "flashcard",
            ArtifactType::QuizQuestion => "quiz_question",
            ArtifactType::StudyNote => "study_note",
            ArtifactType::EnhancedNote => "enhanced_note",
            ArtifactType::AnswerValidation => "answer_validation",
        }
    }

    /// Countable types must carry a target count.
    pub fn is_countable(&self) -> bool {
        matches!(self, ArtifactType::Flashcard | ArtifactType::QuizQuestion)
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "flashcard" | "flashcards" => Ok(ArtifactType::Flashcard),
            "quiz" | "quiz_question" | "quiz_questions" => Ok(ArtifactType::QuizQuestion),
            "note" | "study_note" | "notes" => Ok(ArtifactType::StudyNote),
            "enhanced_note" | "enhanced_notes" => Ok(ArtifactType::EnhancedNote),
            "answer_validation" | "validate_answer" => Ok(ArtifactType::AnswerValidation),
            _ => Err(RequestError::UnknownVariant {
                what: "artifact type",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for ArtifactType {
    type Error = RequestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Quiz question sub-type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizKind {
    #[default]
    MultipleChoice,
    TrueFalse,
    FillInBlanks,
}

impl QuizKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizKind::MultipleChoice => "multiple_choice",
            QuizKind::TrueFalse => "true_false",
            QuizKind::FillInBlanks => "fill_in_blanks",
        }
    }
}

impl fmt::Display for QuizKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuizKind {
    type Err = RequestError;

    /// Accepts the canonical names plus the spellings the upstream service
    /// tends to produce (`mcq`, `true/false`, `fill_in_the_blank`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        match normalized.as_str() {
            "multiple_choice" | "mcq" | "multiplechoice" | "multiple" => Ok(QuizKind::MultipleChoice),
            "true_false" | "truefalse" | "tf" | "boolean" => Ok(QuizKind::TrueFalse),
            "fill_in_blanks" | "fill_in_blank" | "fill_in_the_blank" | "fill_in_the_blanks"
            | "fill_blank" | "fill_blanks" | "cloze" => Ok(QuizKind::FillInBlanks),
            _ => Err(RequestError::UnknownVariant {
                what: "quiz kind",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" | "normal" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(RequestError::UnknownVariant {
                what: "difficulty",
                value: s.to_string(),
            }),
        }
    }
}

/// Artifact-specific generation parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_kind: Option<QuizKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    /// Question being answered (answer validation only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    /// Expected answer to grade against (answer validation only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_answer: Option<String>,
}

/// A single generation request. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    source_text: String,
    artifact_type: ArtifactType,
    target_count: Option<u32>,
    params: TypeParams,
}

impl GenerationRequest {
    /// Validate and build a request.
    ///
    /// # Errors
    ///
    /// - blank `source_text`
    /// - countable type without `target_count`
    /// - `target_count` outside `1..=50`
    /// - answer validation without `question` / `reference_answer`
    pub fn new(
        source_text: impl Into<String>,
        artifact_type: ArtifactType,
        target_count: Option<u32>,
        params: TypeParams,
    ) -> Result<Self, RequestError> {
        let source_text = source_text.into();
        if source_text.trim().is_empty() {
            return Err(RequestError::EmptySource);
        }

        match target_count {
            None if artifact_type.is_countable() => {
                return Err(RequestError::MissingTargetCount(artifact_type))
            }
            Some(n) if n == 0 || n > MAX_TARGET_COUNT => {
                return Err(RequestError::TargetCountOutOfRange(n))
            }
            _ => {}
        }

        if artifact_type == ArtifactType::AnswerValidation {
            let missing = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
            if missing(&params.question) {
                return Err(RequestError::MissingParam {
                    artifact: artifact_type,
                    param: "question",
                });
            }
            if missing(&params.reference_answer) {
                return Err(RequestError::MissingParam {
                    artifact: artifact_type,
                    param: "reference_answer",
                });
            }
        }

        Ok(Self {
            source_text,
            artifact_type,
            target_count,
            params,
        })
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn artifact_type(&self) -> ArtifactType {
        self.artifact_type
    }

    pub fn target_count(&self) -> Option<u32> {
        self.target_count
    }

    pub fn params(&self) -> &TypeParams {
        &self.params
    }
}

// ============ Chunks ============

/// A bounded slice of the source text sent in one generation call.
///
/// Indices are contiguous starting at 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    /// Size in characters (not bytes).
    pub char_size: usize,
}

impl Chunk {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        let char_size = text.chars().count();
        Self {
            index,
            text,
            char_size,
        }
    }
}

// ============ Records ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    #[serde(rename = "type")]
    pub kind: QuizKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyNote {
    pub title: String,
    pub summary: String,
    /// Markdown body.
    pub content: String,
    #[serde(default)]
    pub key_concepts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteExample {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteQuestionKind {
    Mcq,
    FillBlank,
    ShortAnswer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteQuestion {
    #[serde(rename = "type")]
    pub kind: NoteQuestionKind,
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    pub correct_answer: String,
    pub explanation: String,
}

/// One section of a structured lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnhancedNote {
    pub section_title: String,
    pub lesson_intro: String,
    pub key_points: Vec<String>,
    pub definitions: BTreeMap<String, String>,
    pub examples: Vec<NoteExample>,
    pub section_summary: String,
    pub questions: Vec<NoteQuestion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerValidation {
    pub is_correct: bool,
    /// 0..=100
    pub score: u8,
    pub feedback: String,
}

/// A record that passed schema validation.
///
/// Serialized untagged so each record keeps exactly the shape downstream
/// persistence code expects for its artifact type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ValidatedRecord {
    Flashcard(Flashcard),
    QuizQuestion(QuizQuestion),
    StudyNote(StudyNote),
    EnhancedNote(EnhancedNote),
    AnswerValidation(AnswerValidation),
}

impl ValidatedRecord {
    /// Text used to detect duplicates.
    pub fn primary_text(&self) -> Cow<'_, str> {
        match self {
            ValidatedRecord::Flashcard(r) => Cow::Borrowed(&r.question),
            ValidatedRecord::QuizQuestion(r) => Cow::Borrowed(&r.question),
            ValidatedRecord::StudyNote(r) => Cow::Owned(format!("{}\n{}", r.title, r.content)),
            ValidatedRecord::EnhancedNote(r) => Cow::Borrowed(&r.section_title),
            ValidatedRecord::AnswerValidation(r) => Cow::Borrowed(&r.feedback),
        }
    }

    pub fn artifact_type(&self) -> ArtifactType {
        match self {
            ValidatedRecord::Flashcard(_) => ArtifactType::Flashcard,
            ValidatedRecord::QuizQuestion(_) => ArtifactType::QuizQuestion,
            ValidatedRecord::StudyNote(_) => ArtifactType::StudyNote,
            ValidatedRecord::EnhancedNote(_) => ArtifactType::EnhancedNote,
            ValidatedRecord::AnswerValidation(_) => ArtifactType::AnswerValidation,
        }
    }
}

// ============ Result ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Partial,
    Failure,
}

impl Outcome {
    /// `failure` iff no items; `partial` iff some chunk failed but items exist.
    pub fn from_counts(items: usize, failed_chunks: usize) -> Self {
        if items == 0 {
            Outcome::Failure
        } else if failed_chunks > 0 {
            Outcome::Partial
        } else {
            Outcome::Success
        }
    }
}

/// Summary of one failed chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkFailureSummary {
    pub chunk_index: usize,
    pub kind: FailureKind,
    pub message: String,
}

/// Final pipeline output, handed to the caller for persistence.
#[derive(Debug, Clone, Serialize)]
pub struct ResultSet {
    pub artifact_type: ArtifactType,
    pub items: Vec<ValidatedRecord>,
    pub succeeded_chunks: usize,
    pub failed_chunks: usize,
    pub outcome: Outcome,
    /// Records that failed per-record schema validation.
    pub dropped_records: usize,
    pub duplicates_removed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ChunkFailureSummary>,
}

impl ResultSet {
    pub fn total_chunks(&self) -> usize {
        self.succeeded_chunks + self.failed_chunks
    }

    /// Convert a `failure` outcome into [`PipelineError::Exhaustion`].
    pub fn into_result(self) -> Result<ResultSet, PipelineError> {
        if self.outcome == Outcome::Failure {
            return Err(PipelineError::Exhaustion {
                failed_chunks: self.failed_chunks,
                total_chunks: self.total_chunks(),
            });
        }
        Ok(self)
    }
}
