//! Per-artifact schema validation.
//!
//! [`validate`] takes the JSON value recovered by the sanitizer and returns
//! the records that satisfy the rules of their artifact type. A record that
//! breaks any rule is dropped and counted; only a wrong top-level container
//! (array expected, object received, or the reverse) is an error.
//!
//! Rules that defend against known upstream quirks rather than domain
//! constraints (fill-in-the-blank shape, true/false spelling) are driven by
//! [`ValidationPolicy`] so they can be relaxed from config.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::models::{
    AnswerValidation, ArtifactType, EnhancedNote, Flashcard, NoteExample, NoteQuestion,
    NoteQuestionKind, QuizKind, QuizQuestion, StudyNote, TypeParams, ValidatedRecord,
};
use crate::sanitize::{json_type_name, Shape};

/// Tunable validation rules.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationPolicy {
    /// Blank token expected in fill-in-the-blank questions.
    #[serde(default = "default_blank_marker")]
    pub blank_marker: String,
    #[serde(default = "default_fill_blank_max_answer_words")]
    pub fill_blank_max_answer_words: usize,
    /// Require exactly one blank per question.
    #[serde(default = "default_true")]
    pub fill_blank_single_blank: bool,
    /// Reject questions that begin or end with the blank.
    #[serde(default = "default_true")]
    pub fill_blank_forbid_edges: bool,
    /// Accept `True` / `FALSE` and normalize to lowercase.
    #[serde(default = "default_true")]
    pub true_false_case_insensitive: bool,
    #[serde(default = "default_min_mcq_options")]
    pub min_mcq_options: usize,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            blank_marker: default_blank_marker(),
            fill_blank_max_answer_words: default_fill_blank_max_answer_words(),
            fill_blank_single_blank: true,
            fill_blank_forbid_edges: true,
            true_false_case_insensitive: true,
            min_mcq_options: default_min_mcq_options(),
        }
    }
}

fn default_blank_marker() -> String {
    "_____".to_string()
}
fn default_fill_blank_max_answer_words() -> usize {
    5
}
fn default_true() -> bool {
    true
}
fn default_min_mcq_options() -> usize {
    2
}

/// Records that passed validation, plus the number that did not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validated {
    pub records: Vec<ValidatedRecord>,
    pub dropped: usize,
}

/// Top-level container each artifact type is generated as.
pub fn expected_shape(artifact: ArtifactType) -> Shape {
    match artifact {
        ArtifactType::Flashcard | ArtifactType::QuizQuestion | ArtifactType::EnhancedNote => {
            Shape::Array
        }
        ArtifactType::StudyNote | ArtifactType::AnswerValidation => Shape::Object,
    }
}

/// Validate every candidate record in `value` against the rules for `artifact`.
pub fn validate(
    value: &Value,
    artifact: ArtifactType,
    params: &TypeParams,
    policy: &ValidationPolicy,
) -> Result<Validated, ValidationError> {
    match artifact {
        ArtifactType::Flashcard => {
            collect(value, artifact, |v| flashcard(v).map(ValidatedRecord::Flashcard))
        }
        ArtifactType::QuizQuestion => collect(value, artifact, |v| {
            quiz_question(v, params.quiz_kind, policy).map(ValidatedRecord::QuizQuestion)
        }),
        ArtifactType::EnhancedNote => {
            collect(value, artifact, |v| enhanced_note(v).map(ValidatedRecord::EnhancedNote))
        }
        ArtifactType::StudyNote => {
            collect(value, artifact, |v| study_note(v).map(ValidatedRecord::StudyNote))
        }
        ArtifactType::AnswerValidation => collect(value, artifact, |v| {
            answer_validation(v).map(ValidatedRecord::AnswerValidation)
        }),
    }
}

fn collect<F>(value: &Value, artifact: ArtifactType, check: F) -> Result<Validated, ValidationError>
where
    F: Fn(&Value) -> Option<ValidatedRecord>,
{
    let expected = expected_shape(artifact);
    let candidates: &[Value] = match (expected, value) {
        (Shape::Array, Value::Array(items)) => items,
        (Shape::Object, Value::Object(_)) => std::slice::from_ref(value),
        _ => {
            return Err(ValidationError::ContainerMismatch {
                artifact,
                expected,
                found: json_type_name(value),
            })
        }
    };

    let mut out = Validated::default();
    for candidate in candidates {
        match check(candidate) {
            Some(record) => out.records.push(record),
            None => out.dropped += 1,
        }
    }
    Ok(out)
}

// ============ Field helpers ============

/// Trimmed, non-empty string field.
fn text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        _ => None,
    }
}

/// Array whose elements are all non-empty strings.
fn text_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| {
            let s = v.as_str()?.trim();
            (!s.is_empty()).then(|| s.to_string())
        })
        .collect()
}

// ============ Flashcards ============

fn flashcard(value: &Value) -> Option<Flashcard> {
    let obj = value.as_object()?;
    Some(Flashcard {
        question: text(obj, "question")?,
        answer: text(obj, "answer")?,
    })
}

// ============ Quiz questions ============

fn quiz_question(
    value: &Value,
    requested: Option<QuizKind>,
    policy: &ValidationPolicy,
) -> Option<QuizQuestion> {
    let obj = value.as_object()?;
    let question = text(obj, "question")?;

    let kind = match obj.get("type") {
        Some(Value::String(s)) => QuizKind::from_str(s).ok()?,
        Some(_) => return None,
        None => requested.unwrap_or_default(),
    };
    if requested.is_some_and(|r| r != kind) {
        return None;
    }

    let explanation = text(obj, "explanation").unwrap_or_default();

    let (options, correct_answer) = match kind {
        QuizKind::MultipleChoice => {
            let options = text_list(obj.get("options")?)?;
            if options.len() < policy.min_mcq_options.max(1) {
                return None;
            }
            let answer = text(obj, "correct_answer")?;
            let answer = resolve_option(&options, &answer)?;
            (Some(options), answer)
        }
        QuizKind::TrueFalse => {
            let answer = match obj.get("correct_answer")? {
                Value::Bool(b) => b.to_string(),
                Value::String(s) => normalize_true_false(s, policy.true_false_case_insensitive)?,
                _ => return None,
            };
            (None, answer)
        }
        QuizKind::FillInBlanks => {
            if !fill_blank_question_ok(&question, policy) {
                return None;
            }
            let answer = text(obj, "correct_answer")?;
            if answer.split_whitespace().count() > policy.fill_blank_max_answer_words {
                return None;
            }
            (None, answer)
        }
    };

    Some(QuizQuestion {
        question,
        kind,
        options,
        correct_answer,
        explanation,
    })
}

/// Map `answer` onto one of `options`: verbatim match first, then a letter
/// reference such as `B`, `b)` or `C.`.
fn resolve_option(options: &[String], answer: &str) -> Option<String> {
    if options.iter().any(|o| o == answer) {
        return Some(answer.to_string());
    }

    let letter = answer.trim_end_matches([')', '.', ':']).trim();
    let mut chars = letter.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => {
            let index = (c.to_ascii_uppercase() as u8 - b'A') as usize;
            options.get(index).cloned()
        }
        _ => None,
    }
}

fn normalize_true_false(raw: &str, case_insensitive: bool) -> Option<String> {
    let trimmed = raw.trim();
    let candidate = if case_insensitive {
        trimmed.to_ascii_lowercase()
    } else {
        trimmed.to_string()
    };
    matches!(candidate.as_str(), "true" | "false").then_some(candidate)
}

fn fill_blank_question_ok(question: &str, policy: &ValidationPolicy) -> bool {
    let marker = policy.blank_marker.as_str();
    if marker.is_empty() {
        return true;
    }
    let blanks = question.matches(marker).count();
    if blanks == 0 || (policy.fill_blank_single_blank && blanks != 1) {
        return false;
    }
    !(policy.fill_blank_forbid_edges && (question.starts_with(marker) || question.ends_with(marker)))
}

// ============ Notes ============

fn study_note(value: &Value) -> Option<StudyNote> {
    let obj = value.as_object()?;
    let key_concepts = match obj.get("key_concepts") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    };
    Some(StudyNote {
        title: text(obj, "title")?,
        summary: text(obj, "summary")?,
        content: text(obj, "content")?,
        key_concepts,
    })
}

fn enhanced_note(value: &Value) -> Option<EnhancedNote> {
    let obj = value.as_object()?;

    let key_points = text_list(obj.get("key_points")?)?;
    if !(3..=6).contains(&key_points.len()) {
        return None;
    }

    let mut definitions = BTreeMap::new();
    for (term, meaning) in obj.get("definitions")?.as_object()? {
        let term = term.trim();
        let meaning = meaning.as_str()?.trim();
        if term.is_empty() || meaning.is_empty() {
            return None;
        }
        definitions.insert(term.to_string(), meaning.to_string());
    }

    let examples = obj
        .get("examples")?
        .as_array()?
        .iter()
        .map(|e| {
            let e = e.as_object()?;
            Some(NoteExample {
                title: text(e, "title")?,
                description: text(e, "description")?,
            })
        })
        .collect::<Option<Vec<_>>>()?;
    if !(1..=2).contains(&examples.len()) {
        return None;
    }

    let questions = obj
        .get("questions")?
        .as_array()?
        .iter()
        .map(note_question)
        .collect::<Option<Vec<_>>>()?;
    if !(1..=3).contains(&questions.len()) {
        return None;
    }

    Some(EnhancedNote {
        section_title: text(obj, "section_title")?,
        lesson_intro: text(obj, "lesson_intro")?,
        key_points,
        definitions,
        examples,
        section_summary: text(obj, "section_summary")?,
        questions,
    })
}

fn note_question(value: &Value) -> Option<NoteQuestion> {
    let obj = value.as_object()?;
    let kind = match obj.get("type")?.as_str()?.trim() {
        "mcq" => NoteQuestionKind::Mcq,
        "fill_blank" => NoteQuestionKind::FillBlank,
        "short_answer" => NoteQuestionKind::ShortAnswer,
        _ => return None,
    };
    let choices = match kind {
        NoteQuestionKind::Mcq => Some(text_list(obj.get("choices")?)?).filter(|c| !c.is_empty()),
        _ => None,
    };
    if kind == NoteQuestionKind::Mcq && choices.is_none() {
        return None;
    }
    Some(NoteQuestion {
        kind,
        question: text(obj, "question")?,
        choices,
        correct_answer: text(obj, "correct_answer")?,
        explanation: text(obj, "explanation")?,
    })
}

// ============ Answer grading ============

fn answer_validation(value: &Value) -> Option<AnswerValidation> {
    let obj = value.as_object()?;
    let is_correct = match obj.get("is_correct")? {
        Value::Bool(b) => *b,
        Value::String(s) => normalize_true_false(s, true)? == "true",
        _ => return None,
    };
    let score = obj.get("score")?.as_f64()?.round();
    if !(0.0..=100.0).contains(&score) {
        return None;
    }
    Some(AnswerValidation {
        is_correct,
        score: score as u8,
        feedback: text(obj, "feedback")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn quiz_params(kind: QuizKind) -> TypeParams {
        TypeParams {
            quiz_kind: Some(kind),
            ..Default::default()
        }
    }

    fn run(value: Value, artifact: ArtifactType, params: &TypeParams) -> Validated {
        validate(&value, artifact, params, &ValidationPolicy::default()).unwrap()
    }

    #[test]
    fn test_flashcards_trimmed_and_bad_ones_dropped() {
        let out = run(
            json!([
                {"question": "  What is ATP? ", "answer": "Energy currency\n"},
                {"question": "", "answer": "empty question"},
                {"question": "No answer"},
                "not an object"
            ]),
            ArtifactType::Flashcard,
            &TypeParams::default(),
        );
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.dropped, 3);
        match &out.records[0] {
            ValidatedRecord::Flashcard(f) => {
                assert_eq!(f.question, "What is ATP?");
                assert_eq!(f.answer, "Energy currency");
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_container_mismatch_is_error() {
        let err = validate(
            &json!({"question": "q", "answer": "a"}),
            ArtifactType::Flashcard,
            &TypeParams::default(),
            &ValidationPolicy::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::ContainerMismatch {
                artifact: ArtifactType::Flashcard,
                expected: Shape::Array,
                found: "object",
            }
        );
    }

    #[test]
    fn test_mcq_requires_answer_among_options() {
        let out = run(
            json!([
                {"question": "2+2?", "type": "multiple_choice", "options": ["3", "4"], "correct_answer": "4"},
                {"question": "3+3?", "type": "multiple_choice", "options": ["5", "7"], "correct_answer": "6"},
                {"question": "1+1?", "type": "multiple_choice", "correct_answer": "2"}
            ]),
            ArtifactType::QuizQuestion,
            &quiz_params(QuizKind::MultipleChoice),
        );
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.dropped, 2);
    }

    #[test]
    fn test_mcq_letter_answer_is_repaired() {
        let out = run(
            json!([{"question": "Capital of France?", "options": ["Berlin", "Paris", "Rome"], "correct_answer": "B)"}]),
            ArtifactType::QuizQuestion,
            &quiz_params(QuizKind::MultipleChoice),
        );
        match &out.records[0] {
            ValidatedRecord::QuizQuestion(q) => {
                assert_eq!(q.correct_answer, "Paris");
                assert_eq!(q.kind, QuizKind::MultipleChoice);
                assert_eq!(q.explanation, "");
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_mcq_letter_out_of_range_dropped() {
        assert_eq!(resolve_option(&["a".into(), "b".into()], "D"), None);
        assert_eq!(resolve_option(&["A".into(), "b".into()], "A"), Some("A".into()));
    }

    #[test]
    fn test_true_false_normalization() {
        let out = run(
            json!([
                {"question": "Water is wet.", "type": "true_false", "correct_answer": "True"},
                {"question": "Fire is cold.", "type": "true_false", "correct_answer": false},
                {"question": "Maybe?", "type": "true_false", "correct_answer": "yes"}
            ]),
            ArtifactType::QuizQuestion,
            &quiz_params(QuizKind::TrueFalse),
        );
        let answers: Vec<_> = out
            .records
            .iter()
            .map(|r| match r {
                ValidatedRecord::QuizQuestion(q) => q.correct_answer.clone(),
                other => panic!("unexpected record {:?}", other),
            })
            .collect();
        assert_eq!(answers, vec!["true", "false"]);
        assert_eq!(out.dropped, 1);
    }

    #[test]
    fn test_true_false_strict_policy() {
        let policy = ValidationPolicy {
            true_false_case_insensitive: false,
            ..Default::default()
        };
        let out = validate(
            &json!([{"question": "Water is wet.", "correct_answer": "True"}]),
            ArtifactType::QuizQuestion,
            &quiz_params(QuizKind::TrueFalse),
            &policy,
        )
        .unwrap();
        assert!(out.records.is_empty());
    }

    #[test]
    fn test_fill_blank_at_start_rejected() {
        let out = run(
            json!([{"question": "_____ is a gas.", "type": "fill_in_blanks", "correct_answer": "Oxygen"}]),
            ArtifactType::QuizQuestion,
            &quiz_params(QuizKind::FillInBlanks),
        );
        assert!(out.records.is_empty());
        assert_eq!(out.dropped, 1);
    }

    #[test]
    fn test_fill_blank_rules() {
        let out = run(
            json!([
                {"question": "Plants absorb _____ from the air.", "correct_answer": "carbon dioxide"},
                {"question": "The _____ and the _____ are organs.", "correct_answer": "heart"},
                {"question": "The answer is _____", "correct_answer": "x"},
                {"question": "Cells contain _____ daily.", "correct_answer": "a b c d e f"},
                {"question": "No blank here.", "correct_answer": "x"}
            ]),
            ArtifactType::QuizQuestion,
            &quiz_params(QuizKind::FillInBlanks),
        );
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.dropped, 4);
    }

    #[test]
    fn test_fill_blank_relaxed_policy() {
        let policy = ValidationPolicy {
            fill_blank_forbid_edges: false,
            ..Default::default()
        };
        let out = validate(
            &json!([{"question": "_____ is a gas.", "correct_answer": "Oxygen"}]),
            ArtifactType::QuizQuestion,
            &quiz_params(QuizKind::FillInBlanks),
            &policy,
        )
        .unwrap();
        assert_eq!(out.records.len(), 1);
    }

    #[test]
    fn test_quiz_kind_mismatch_dropped() {
        let out = run(
            json!([{"question": "Sky is blue.", "type": "true_false", "correct_answer": "true"}]),
            ArtifactType::QuizQuestion,
            &quiz_params(QuizKind::MultipleChoice),
        );
        assert!(out.records.is_empty());

        let out = run(
            json!([{"question": "Sky is blue.", "type": "true/false", "correct_answer": "true"}]),
            ArtifactType::QuizQuestion,
            &TypeParams::default(),
        );
        assert_eq!(out.records.len(), 1);
    }

    fn enhanced(questions: Value, key_points: Value) -> Value {
        json!([{
            "section_title": "Photosynthesis",
            "lesson_intro": "How plants make food.",
            "key_points": key_points,
            "definitions": {"Chlorophyll": "Green pigment"},
            "examples": [{"title": "Leaves", "description": "Sites of photosynthesis"}],
            "section_summary": "Light becomes sugar.",
            "questions": questions
        }])
    }

    #[test]
    fn test_enhanced_note_valid() {
        let value = enhanced(
            json!([
                {"type": "mcq", "question": "Pigment?", "choices": ["Chlorophyll", "Keratin"], "correct_answer": "Chlorophyll", "explanation": "It is green."},
                {"type": "short_answer", "question": "Output?", "correct_answer": "Glucose", "explanation": "Sugar."}
            ]),
            json!(["Light", "Water", "CO2"]),
        );
        let out = run(value, ArtifactType::EnhancedNote, &TypeParams::default());
        assert_eq!(out.records.len(), 1);
        match &out.records[0] {
            ValidatedRecord::EnhancedNote(n) => {
                assert_eq!(n.questions.len(), 2);
                assert!(n.questions[1].choices.is_none());
                assert_eq!(n.definitions["Chlorophyll"], "Green pigment");
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_enhanced_note_rules() {
        let q = json!([{"type": "short_answer", "question": "Q?", "correct_answer": "A", "explanation": "E"}]);
        // too few key points
        let out = run(enhanced(q.clone(), json!(["a", "b"])), ArtifactType::EnhancedNote, &TypeParams::default());
        assert_eq!(out.dropped, 1);
        // mcq without choices
        let mcq = json!([{"type": "mcq", "question": "Q?", "correct_answer": "A", "explanation": "E"}]);
        let out = run(enhanced(mcq, json!(["a", "b", "c"])), ArtifactType::EnhancedNote, &TypeParams::default());
        assert_eq!(out.dropped, 1);
        // unknown question type
        let essay = json!([{"type": "essay", "question": "Q?", "correct_answer": "A", "explanation": "E"}]);
        let out = run(enhanced(essay, json!(["a", "b", "c"])), ArtifactType::EnhancedNote, &TypeParams::default());
        assert_eq!(out.dropped, 1);
        // too many questions
        let many = Value::Array(vec![q[0].clone(); 4]);
        let out = run(enhanced(many, json!(["a", "b", "c"])), ArtifactType::EnhancedNote, &TypeParams::default());
        assert_eq!(out.dropped, 1);
    }

    #[test]
    fn test_study_note_object() {
        let out = run(
            json!({"title": "Cells", "summary": "Basics", "content": "# Cells\nUnits of life.", "key_concepts": ["cell", 3, ""]}),
            ArtifactType::StudyNote,
            &TypeParams::default(),
        );
        match &out.records[0] {
            ValidatedRecord::StudyNote(n) => assert_eq!(n.key_concepts, vec!["cell"]),
            other => panic!("unexpected record {:?}", other),
        }

        let out = run(json!({"title": "Cells"}), ArtifactType::StudyNote, &TypeParams::default());
        assert!(out.records.is_empty());
        assert_eq!(out.dropped, 1);
    }

    #[test]
    fn test_answer_validation_score_range() {
        let ok = run(
            json!({"is_correct": "True", "score": 87.6, "feedback": "Close enough."}),
            ArtifactType::AnswerValidation,
            &TypeParams::default(),
        );
        match &ok.records[0] {
            ValidatedRecord::AnswerValidation(a) => {
                assert!(a.is_correct);
                assert_eq!(a.score, 88);
            }
            other => panic!("unexpected record {:?}", other),
        }

        let bad = run(
            json!({"is_correct": false, "score": 140, "feedback": "?"}),
            ArtifactType::AnswerValidation,
            &TypeParams::default(),
        );
        assert_eq!(bad.dropped, 1);
    }
}
