//! Core domain types for chapterquiz question sets.

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{QuizError, Result};

/// Length of a generated [`RowId`].
pub const ROW_ID_LEN: usize = 16;

/// Marker that identifies fill-in-the-blank question text.
pub const BLANK_MARKER: &str = "___";

// ---------------------------------------------------------------------------
// QuestionType
// ---------------------------------------------------------------------------

/// Closed set of question kinds, assigned once when a question enters the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestionType {
    Text,
    Mcq,
    TrueFalse,
    FillInTheBlanks,
}

impl QuestionType {
    /// Wire name, as emitted by the generation prompt.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::Mcq => "MCQ",
            Self::TrueFalse => "True/False",
            Self::FillInTheBlanks => "Fill_in_the_blanks",
        }
    }

    /// Parse a type tag case-insensitively, accepting common spellings.
    pub fn parse_tag(tag: &str) -> Option<Self> {
        let normalized: String = tag
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();

        match normalized.as_str() {
            "text" | "open" | "openended" => Some(Self::Text),
            "mcq" | "multiplechoice" => Some(Self::Mcq),
            "truefalse" => Some(Self::TrueFalse),
            "fillintheblanks" | "fillintheblank" | "fillblank" => Some(Self::FillInTheBlanks),
            _ => None,
        }
    }

    /// Infer the type of an untagged question.
    ///
    /// Precedence: options present, then boolean answer, then blank marker.
    pub fn infer(options: &[String], answer: &AnswerValue, question: &str) -> Self {
        if !options.is_empty() {
            Self::Mcq
        } else if matches!(answer, AnswerValue::Flag(_)) {
            Self::TrueFalse
        } else if question.contains(BLANK_MARKER) {
            Self::FillInTheBlanks
        } else {
            Self::Text
        }
    }

    /// Whether this type is graded without a model call.
    pub fn is_deterministic(&self) -> bool {
        matches!(self, Self::Mcq | Self::TrueFalse)
    }
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QuestionType {
    type Err = QuizError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_tag(s).ok_or_else(|| QuizError::input(format!("unknown question type: {s}")))
    }
}

impl Serialize for QuestionType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for QuestionType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Self::parse_tag(&tag).ok_or_else(|| de::Error::custom(format!("unknown question type: {tag}")))
    }
}

// ---------------------------------------------------------------------------
// AnswerValue
// ---------------------------------------------------------------------------

/// A stored answer: text, boolean or integer depending on question type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Flag(bool),
    Index(i64),
    Text(String),
}

impl AnswerValue {
    /// Lower-cased, trimmed string form used for deterministic comparison.
    pub fn normalized(&self) -> String {
        match self {
            Self::Flag(b) => b.to_string(),
            Self::Index(i) => i.to_string(),
            Self::Text(s) => s.trim().to_lowercase(),
        }
    }
}

impl Default for AnswerValue {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl std::fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flag(b) => write!(f, "{b}"),
            Self::Index(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

// ---------------------------------------------------------------------------
// Question / Chapter
// ---------------------------------------------------------------------------

/// A single generated question with its canonical answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Book-wide identifier, assigned at persistence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<u32>,
    /// Question text.
    pub question: String,
    /// Question kind.
    pub question_type: QuestionType,
    /// MCQ options (exactly four), empty for other kinds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// Canonical answer.
    #[serde(default)]
    pub answer: AnswerValue,
}

/// Lenient question shape accepted from the model and from older stored data.
///
/// Use [`RawQuestion::normalize`] to obtain a typed [`Question`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawQuestion {
    #[serde(default, deserialize_with = "de_opt_question_id")]
    pub question_id: Option<u32>,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub question_type: Option<String>,
    #[serde(default)]
    pub options: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub answer: Option<AnswerValue>,
}

impl RawQuestion {
    /// Assign a [`QuestionType`] and check the shape required by that type.
    ///
    /// Returns the reason when the question cannot be used.
    pub fn normalize(self) -> std::result::Result<Question, String> {
        let question = self.question.trim().to_string();
        if question.is_empty() {
            return Err("question text is empty".into());
        }

        let options: Vec<String> = self
            .options
            .unwrap_or_default()
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();
        let answer = self.answer.unwrap_or_default();

        let question_type = self
            .question_type
            .as_deref()
            .and_then(QuestionType::parse_tag)
            .unwrap_or_else(|| QuestionType::infer(&options, &answer, &question));

        if question_type == QuestionType::Mcq && options.len() != 4 {
            return Err(format!("MCQ needs exactly 4 options, got {}", options.len()));
        }

        Ok(Question {
            question_id: self.question_id,
            question,
            question_type,
            options: if question_type == QuestionType::Mcq {
                options
            } else {
                Vec::new()
            },
            answer,
        })
    }
}

/// An ordered group of questions generated from one chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    /// Chapter title.
    pub chapter_name: String,
    /// 1-based position in the book.
    #[serde(default)]
    pub chapter_number: u32,
    /// Questions in generation order.
    pub questions_answers: Vec<Question>,
}

impl Chapter {
    /// Total number of questions across chapters.
    pub fn count_questions(chapters: &[Chapter]) -> usize {
        chapters.iter().map(|c| c.questions_answers.len()).sum()
    }
}

/// A chapter (or chunk of one) as seen by the extractor and the vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterText {
    pub chapter_name: String,
    pub text: String,
}

impl ChapterText {
    pub fn new(chapter_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            chapter_name: chapter_name.into(),
            text: text.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// RowId
// ---------------------------------------------------------------------------

/// Opaque key of one persisted question set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(String);

impl RowId {
    /// Generate a fresh 16-character uppercase alphanumeric token.
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
        Self(hex[..ROW_ID_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RowId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RowId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A question set as returned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredQuestionSet {
    pub row_id: RowId,
    pub chapters: Vec<Chapter>,
    pub created_on: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// S3Locator
// ---------------------------------------------------------------------------

/// A parsed `s3://bucket/key` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Locator {
    pub bucket: String,
    pub key: String,
}

impl S3Locator {
    /// Parse an `s3://bucket/key` string. Both parts must be non-empty.
    pub fn parse(locator: &str) -> Result<Self> {
        let rest = locator
            .trim()
            .strip_prefix("s3://")
            .ok_or_else(|| QuizError::Storage(format!("Invalid S3 URL format: {locator}")))?;

        match rest.split_once('/') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok(Self {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            _ => Err(QuizError::Storage(format!("Invalid S3 URL format: {locator}"))),
        }
    }
}

impl std::fmt::Display for S3Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

/// A model request: optional system message plus the user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
}

impl Prompt {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            system: None,
            user: text.into(),
        }
    }

    pub fn with_system(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            user: user.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

/// Accept a question id given as a number or a numeric string.
fn de_opt_question_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<u32>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Deserialize any JSON scalar as its string form.
pub fn de_scalar_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Null => Ok(String::new()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("expected a scalar, got {other}"))),
    }
}
