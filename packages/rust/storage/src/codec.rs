//! Encoding of question sets in the `chapters_json` column.
//!
//! Rows are written as `{"chapters": [...]}`. Older rows may carry the whole
//! document, a chapter, or a chapter's question list as a JSON string inside
//! JSON; decoding peels those layers so callers only ever see typed chapters.

use chapterquiz_shared::{Chapter, QuizError, RawQuestion, Result};
use serde_json::{Value, json};

/// How many string-encoded layers are peeled before giving up.
const MAX_ENCODING_DEPTH: usize = 3;

const UNKNOWN_CHAPTER: &str = "Unknown Chapter";

/// Serialize chapters into the stored document form.
pub(crate) fn encode_chapters(chapters: &[Chapter]) -> Result<String> {
    serde_json::to_string(&json!({ "chapters": chapters }))
        .map_err(|e| QuizError::Persistence(format!("failed to encode question set: {e}")))
}

/// Decode a stored document into typed chapters.
pub(crate) fn decode_chapters(raw: &str) -> Result<Vec<Chapter>> {
    let document: Value = serde_json::from_str(raw)
        .map_err(|e| QuizError::Persistence(format!("stored question set is not JSON: {e}")))?;

    let list = match peel(document) {
        Value::Object(mut map) => map.remove("chapters").map(peel).unwrap_or(Value::Null),
        other => other,
    };

    let Value::Array(items) = list else {
        return Err(QuizError::Persistence(
            "stored question set has no chapter list".into(),
        ));
    };

    Ok(items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| decode_chapter(peel(item), index))
        .collect())
}

fn decode_chapter(value: Value, index: usize) -> Option<Chapter> {
    let Value::Object(mut map) = value else {
        tracing::warn!(index, "skipping stored chapter that is not an object");
        return None;
    };

    let chapter_name = match map.remove("chapter_name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name,
        _ => UNKNOWN_CHAPTER.to_string(),
    };
    let chapter_number = map
        .get("chapter_number")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(index as u32 + 1);

    let questions = match map.remove("questions_answers").map(peel) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };

    let questions_answers = questions
        .into_iter()
        .filter_map(|item| {
            let raw: RawQuestion = match serde_json::from_value(peel(item)) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(chapter = %chapter_name, error = %e, "skipping undecodable stored question");
                    return None;
                }
            };
            match raw.normalize() {
                Ok(q) => Some(q),
                Err(reason) => {
                    tracing::warn!(chapter = %chapter_name, %reason, "skipping invalid stored question");
                    None
                }
            }
        })
        .collect();

    Some(Chapter {
        chapter_name,
        chapter_number,
        questions_answers,
    })
}

/// Replace a JSON string holding JSON with the value it encodes.
fn peel(mut value: Value) -> Value {
    for _ in 0..MAX_ENCODING_DEPTH {
        let Value::String(s) = &value else { break };
        match serde_json::from_str::<Value>(s) {
            Ok(inner @ (Value::Object(_) | Value::Array(_))) => value = inner,
            _ => break,
        }
    }
    value
}
