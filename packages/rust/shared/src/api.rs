//! Request and response records exchanged with callers of the quiz service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::{QuestionType, RowId, de_scalar_string};

/// Status string carried by successful responses.
pub const STATUS_SUCCESS: &str = "success";

/// One submitted answer. Both fields accept any JSON scalar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAnswer {
    #[serde(deserialize_with = "de_scalar_string")]
    pub question_id: String,
    #[serde(default, deserialize_with = "de_scalar_string")]
    pub user_answer: String,
}

impl UserAnswer {
    pub fn new(question_id: impl Into<String>, user_answer: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            user_answer: user_answer.into(),
        }
    }
}

/// Grading record for one submitted answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedAnswer {
    pub question_id: String,
    pub question: String,
    pub question_type: QuestionType,
    pub chapter_name: String,
    pub chapter_id: u32,
    /// 0-based option index for MCQ (null when no option matched), the stored answer otherwise.
    pub correct_answer: serde_json::Value,
    pub user_answer: String,
    /// MCQ options, empty for other types.
    #[serde(default)]
    pub options: Vec<String>,
    pub score: u8,
    #[serde(with = "bool_string")]
    pub is_correct: bool,
}

/// MCQ options re-keyed by position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McqOptions {
    pub option1: String,
    pub option2: String,
    pub option3: String,
    pub option4: String,
}

impl McqOptions {
    /// Build from exactly four options; anything else yields `None`.
    pub fn from_slice(options: &[String]) -> Option<Self> {
        match options {
            [a, b, c, d] => Some(Self {
                option1: a.clone(),
                option2: b.clone(),
                option3: c.clone(),
                option4: d.clone(),
            }),
            _ => None,
        }
    }
}

/// One entry of a generation response list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattedQuestion {
    pub question: String,
    pub question_type: QuestionType,
    pub chapter_name: String,
    pub chapter_number: u32,
    pub question_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<McqOptions>,
}

/// Successful result of a generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub user_id: String,
    pub book_id: String,
    pub created_on: DateTime<Utc>,
    pub status: String,
    pub row_id: RowId,
    pub list: Vec<FormattedQuestion>,
}

/// Successful result of a validation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub user_id: String,
    pub created_on: DateTime<Utc>,
    pub status: String,
    pub list: Vec<GradedAnswer>,
}

/// `is_correct` travels as the strings `"true"` / `"false"`.
mod bool_string {
    use super::*;

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "true" } else { "false" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let raw = de_scalar_string(deserializer)?;
        Ok(raw.trim().eq_ignore_ascii_case("true"))
    }
}
