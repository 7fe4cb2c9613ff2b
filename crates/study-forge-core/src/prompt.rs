//! Instruction templates for each artifact type.
//!
//! Every prompt has the same layout:
//!
//! ```text
//! <task line with the requested count>
//!
//! OUTPUT FORMAT:
//! <field contract with exact enum values>
//!
//! EXAMPLE:
//! <worked example>
//!
//! RULES:
//! - <hard constraints>
//!
//! <payload label>:
//! <payload text, always last>
//! ```
//!
//! Rendering is a pure function of its inputs, so identical requests always
//! produce byte-identical prompts.

use std::fmt::Write as _;

use crate::models::{ArtifactType, Difficulty, QuizKind, TypeParams};
use crate::validate::ValidationPolicy;

/// Constraints shared by every template.
const COMMON_RULES: &[&str] = &[
    "Respond with JSON only. No prose, comments, or markdown fences outside the data.",
    "Use only the field names shown above. Do not add extra fields.",
    "Write every value in the same language as the source text.",
    "Base every item strictly on the source text.",
];

/// Render the prompt for one generation call.
///
/// `count` is the number of items this call should produce; `None` asks for
/// as many as the text supports.
pub fn build_prompt(
    artifact: ArtifactType,
    payload: &str,
    count: Option<u32>,
    params: &TypeParams,
    policy: &ValidationPolicy,
) -> String {
    match artifact {
        ArtifactType::Flashcard => flashcards(payload, count),
        ArtifactType::QuizQuestion => quiz(payload, count, params, policy),
        ArtifactType::StudyNote => study_note(payload),
        ArtifactType::EnhancedNote => enhanced_note(payload, count),
        ArtifactType::AnswerValidation => answer_validation(payload, params),
    }
}

fn count_phrase(count: Option<u32>, singular: &str, plural: &str) -> String {
    match count {
        Some(1) => format!("exactly 1 {}", singular),
        Some(n) => format!("exactly {} {}", n, plural),
        None => format!("one or more {}", plural),
    }
}

fn render(task: &str, format: &str, example: &str, rules: &[String], label: &str, payload: &str) -> String {
    let mut out = String::with_capacity(payload.len() + 2048);
    let _ = writeln!(out, "{}\n", task);
    let _ = writeln!(out, "OUTPUT FORMAT:\n{}\n", format);
    let _ = writeln!(out, "EXAMPLE:\n{}\n", example);
    out.push_str("RULES:\n");
    for rule in rules.iter().map(String::as_str).chain(COMMON_RULES.iter().copied()) {
        let _ = writeln!(out, "- {}", rule);
    }
    let _ = write!(out, "\n{}:\n{}", label, payload.trim());
    out
}

fn flashcards(payload: &str, count: Option<u32>) -> String {
    let wanted = count_phrase(count, "flashcard", "flashcards");
    render(
        &format!("Create {} from the source text below.", wanted),
        r#"A JSON array of objects, each with string fields "question" and "answer"."#,
        r#"[{"question": "What molecule stores energy in cells?", "answer": "ATP (adenosine triphosphate)"}]"#,
        &[
            format!("Produce {}; never more, never fewer if the text allows.", wanted),
            "Each question must be unique and self-contained.".to_string(),
            "Keep answers short and factual.".to_string(),
        ],
        "SOURCE TEXT",
        payload,
    )
}

fn quiz(payload: &str, count: Option<u32>, params: &TypeParams, policy: &ValidationPolicy) -> String {
    let kind = params.quiz_kind.unwrap_or_default();
    let wanted = count_phrase(count, "question", "questions");
    let mut rules = vec![format!(
        "Produce {}, all with \"type\": \"{}\".",
        wanted,
        kind.as_str()
    )];

    let (format, example) = match kind {
        QuizKind::MultipleChoice => {
            rules.push("Give exactly 4 options. \"correct_answer\" must repeat one option verbatim.".to_string());
            (
                r#"A JSON array of objects with fields "question" (string), "type" ("multiple_choice"), "options" (array of strings), "correct_answer" (string), "explanation" (string)."#,
                r#"[{"question": "Which organelle produces ATP?", "type": "multiple_choice", "options": ["Nucleus", "Mitochondrion", "Ribosome", "Golgi body"], "correct_answer": "Mitochondrion", "explanation": "Cellular respiration happens in the mitochondria."}]"#.to_string(),
            )
        }
        QuizKind::TrueFalse => {
            rules.push("\"correct_answer\" must be exactly \"true\" or \"false\" in lowercase.".to_string());
            rules.push("Do not include an \"options\" field.".to_string());
            (
                r#"A JSON array of objects with fields "question" (a statement), "type" ("true_false"), "correct_answer" ("true" or "false"), "explanation" (string)."#,
                r#"[{"question": "Mitochondria produce ATP.", "type": "true_false", "correct_answer": "true", "explanation": "ATP is made during cellular respiration."}]"#.to_string(),
            )
        }
        QuizKind::FillInBlanks => {
            let marker = policy.blank_marker.as_str();
            rules.push(format!(
                "Each question contains exactly one blank written as {} and never starts or ends with it.",
                marker
            ));
            rules.push(format!(
                "\"correct_answer\" fills the blank and is at most {} words.",
                policy.fill_blank_max_answer_words
            ));
            rules.push("Do not include an \"options\" field.".to_string());
            (
                r#"A JSON array of objects with fields "question" (sentence with one blank), "type" ("fill_in_blanks"), "correct_answer" (string), "explanation" (string)."#,
                format!(
                    r#"[{{"question": "Cells release energy through {} respiration.", "type": "fill_in_blanks", "correct_answer": "cellular", "explanation": "Cellular respiration converts glucose to ATP."}}]"#,
                    marker
                ),
            )
        }
    };

    if let Some(difficulty) = params.difficulty {
        rules.push(difficulty_rule(difficulty).to_string());
    }

    render(
        &format!(
            "Create {} ({} quiz) from the source text below.",
            wanted,
            kind.as_str().replace('_', " ")
        ),
        format,
        &example,
        &rules,
        "SOURCE TEXT",
        payload,
    )
}

fn difficulty_rule(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => "Difficulty: easy. Test recall of facts stated directly in the text.",
        Difficulty::Medium => "Difficulty: medium. Test understanding of how the facts relate.",
        Difficulty::Hard => "Difficulty: hard. Test application and inference beyond direct recall.",
    }
}

fn study_note(payload: &str) -> String {
    render(
        "Write one study note summarizing the source text below.",
        r#"A single JSON object with fields "title" (string), "summary" (string, 2-3 sentences), "content" (string, markdown), "key_concepts" (array of strings)."#,
        r###"{"title": "Cellular Respiration", "summary": "Cells turn glucose into ATP. Oxygen is the final electron acceptor.", "content": "## Stages\n- Glycolysis\n- Krebs cycle\n- Electron transport chain", "key_concepts": ["ATP", "glycolysis", "mitochondria"]}"###,
        &["Return exactly one object, not an array.".to_string()],
        "SOURCE TEXT",
        payload,
    )
}

fn enhanced_note(payload: &str, count: Option<u32>) -> String {
    let wanted = count_phrase(count, "lesson section", "lesson sections");
    render(
        &format!("Turn the source text below into {}.", wanted),
        concat!(
            r#"A JSON array of section objects with fields "section_title" (string), "lesson_intro" (string), "#,
            r#""key_points" (3-6 strings), "definitions" (object mapping term to meaning), "#,
            r#""examples" (1-2 objects with "title" and "description"), "section_summary" (string), "#,
            r#""questions" (1-3 objects with "type" ("mcq", "fill_blank" or "short_answer"), "question", "#,
            r#""choices" (array of strings, only for "mcq"), "correct_answer", "explanation")."#
        ),
        r#"[{"section_title": "Photosynthesis", "lesson_intro": "Plants make their own food.", "key_points": ["Uses light", "Consumes CO2", "Releases oxygen"], "definitions": {"Chlorophyll": "Green pigment that absorbs light"}, "examples": [{"title": "Leaves", "description": "Most photosynthesis happens in leaf cells."}], "section_summary": "Light energy becomes chemical energy.", "questions": [{"type": "mcq", "question": "Which gas is released?", "choices": ["Oxygen", "Nitrogen"], "correct_answer": "Oxygen", "explanation": "Water is split, releasing oxygen."}]}]"#,
        &[
            format!("Produce {} following the order of the text.", wanted),
            "Respect every count range given in the format.".to_string(),
        ],
        "SOURCE TEXT",
        payload,
    )
}

fn answer_validation(payload: &str, params: &TypeParams) -> String {
    let question = params.question.as_deref().unwrap_or_default().trim();
    let reference = params.reference_answer.as_deref().unwrap_or_default().trim();
    render(
        &format!(
            "Grade a learner's answer.\n\nQUESTION:\n{}\n\nREFERENCE ANSWER:\n{}",
            question, reference
        ),
        r#"A single JSON object with fields "is_correct" (boolean), "score" (integer 0-100), "feedback" (string)."#,
        r#"{"is_correct": false, "score": 40, "feedback": "You named the organelle but not the process it performs."}"#,
        &[
            "Judge meaning, not wording. Accept synonyms and paraphrases.".to_string(),
            "Feedback addresses the learner directly in one to three sentences.".to_string(),
        ],
        "LEARNER ANSWER",
        payload,
    )
}
