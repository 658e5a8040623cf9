//! Answer grading across question types.
//!
//! MCQ and True/False answers are compared locally; Text and
//! Fill_in_the_blanks answers are scored by the model.

use std::collections::HashMap;
use std::sync::Arc;

use chapterquiz_shared::{
    AnswerValue, Chapter, GenerationModel, GradedAnswer, QuestionType, QuizError, Result,
    UserAnswer,
};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::prompts::{grading_prompt, json_object_slice};

/// Score awarded for a correct deterministic answer.
pub const FULL_SCORE: u8 = 10;

/// Grading-time view of one stored question.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalQuestion {
    pub question: String,
    pub question_type: QuestionType,
    pub chapter_name: String,
    pub chapter_id: u32,
    pub options: Vec<String>,
    pub answer: AnswerValue,
    /// 0-based index of the correct MCQ option, when one matches.
    pub mcq_index: Option<usize>,
}

impl CanonicalQuestion {
    /// The correct answer as reported back to the caller.
    fn correct_answer(&self) -> Value {
        match self.question_type {
            QuestionType::Mcq => self.mcq_index.map(Value::from).unwrap_or(Value::Null),
            _ => serde_json::to_value(&self.answer).unwrap_or(Value::Null),
        }
    }
}

/// Map every stored question id to its canonical form.
pub fn build_question_map(chapters: &[Chapter]) -> HashMap<String, CanonicalQuestion> {
    let mut map = HashMap::new();
    for chapter in chapters {
        for q in &chapter.questions_answers {
            let Some(id) = q.question_id else {
                warn!(chapter = %chapter.chapter_name, "stored question has no id, skipping");
                continue;
            };
            let mcq_index = match q.question_type {
                QuestionType::Mcq => mcq_canonical_index(&q.options, &q.answer),
                _ => None,
            };
            map.insert(
                id.to_string(),
                CanonicalQuestion {
                    question: q.question.clone(),
                    question_type: q.question_type,
                    chapter_name: chapter.chapter_name.clone(),
                    chapter_id: chapter.chapter_number,
                    options: q.options.clone(),
                    answer: q.answer.clone(),
                    mcq_index,
                },
            );
        }
    }
    map
}

/// 0-based position of the correct MCQ option.
///
/// Text answers are matched case-insensitively after trimming; an integer
/// answer is taken as an index when in range.
pub fn mcq_canonical_index(options: &[String], answer: &AnswerValue) -> Option<usize> {
    match answer {
        AnswerValue::Text(text) => {
            let wanted = text.trim().to_lowercase();
            options
                .iter()
                .position(|opt| opt.trim().to_lowercase() == wanted)
        }
        AnswerValue::Index(i) => usize::try_from(*i).ok().filter(|i| *i < options.len()),
        AnswerValue::Flag(_) => None,
    }
}

/// Compare a user's option index with the canonical one.
pub fn grade_mcq(user_answer: &str, canonical: Option<usize>) -> bool {
    match (user_answer.trim().parse::<usize>(), canonical) {
        (Ok(given), Some(expected)) => given == expected,
        _ => false,
    }
}

/// Compare a user's true/false answer with the canonical one.
pub fn grade_true_false(user_answer: &str, canonical: &AnswerValue) -> bool {
    user_answer.trim().to_lowercase() == canonical.normalized()
}

/// Read `{score, is_correct}` from a grading reply. Anything unreadable is `(0, false)`.
pub fn parse_grading_reply(reply: &str) -> (u8, bool) {
    let parsed = json_object_slice(reply).and_then(|s| serde_json::from_str::<Value>(s).ok());
    let Some(Value::Object(obj)) = parsed else {
        return (0, false);
    };

    let score = match obj.get("score") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    let is_correct = match obj.get("is_correct") {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "correct" => Some(true),
            "false" | "no" | "incorrect" => Some(false),
            _ => None,
        },
        _ => None,
    };

    match (score, is_correct) {
        (Some(score), Some(is_correct)) if score.is_finite() => {
            (score.round().clamp(0.0, f64::from(FULL_SCORE)) as u8, is_correct)
        }
        _ => (0, false),
    }
}

/// Grades a batch of answers against stored chapters.
pub struct AnswerValidator {
    model: Arc<dyn GenerationModel>,
}

impl AnswerValidator {
    pub fn new(model: Arc<dyn GenerationModel>) -> Self {
        Self { model }
    }

    /// Grade `answers` in order.
    ///
    /// Every question id is resolved before any grading happens; an unknown
    /// id fails the whole batch. A failed model call fails the batch; an
    /// unreadable grading reply scores 0.
    #[instrument(skip_all, fields(answers = answers.len()))]
    pub async fn validate(
        &self,
        chapters: &[Chapter],
        answers: &[UserAnswer],
    ) -> Result<Vec<GradedAnswer>> {
        let map = build_question_map(chapters);

        let resolved = answers
            .iter()
            .map(|answer| {
                let id = answer.question_id.trim();
                map.get(id)
                    .map(|q| (answer, q))
                    .ok_or_else(|| QuizError::validation(format!("Invalid question_id: {id}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut graded = Vec::with_capacity(resolved.len());
        for (answer, q) in resolved {
            let (score, is_correct) = if q.question_type.is_deterministic() {
                score_local(grade_locally(q, &answer.user_answer))
            } else {
                let prompt =
                    grading_prompt(&q.question, &answer.user_answer, &q.answer.to_string());
                let reply = self.model.complete(&prompt).await?;
                parse_grading_reply(&reply)
            };
            debug!(question_id = %answer.question_id, score, is_correct, "graded answer");

            graded.push(GradedAnswer {
                question_id: answer.question_id.trim().to_string(),
                question: q.question.clone(),
                question_type: q.question_type,
                chapter_name: q.chapter_name.clone(),
                chapter_id: q.chapter_id,
                correct_answer: q.correct_answer(),
                user_answer: answer.user_answer.clone(),
                options: if q.question_type == QuestionType::Mcq {
                    q.options.clone()
                } else {
                    Vec::new()
                },
                score,
                is_correct,
            });
        }
        Ok(graded)
    }
}

/// Grade an MCQ or True/False answer without the model.
fn grade_locally(q: &CanonicalQuestion, user_answer: &str) -> bool {
    match q.question_type {
        QuestionType::Mcq => grade_mcq(user_answer, q.mcq_index),
        _ => grade_true_false(user_answer, &q.answer),
    }
}

fn score_local(correct: bool) -> (u8, bool) {
    if correct { (FULL_SCORE, true) } else { (0, false) }
}
