//! Prompt templates and helpers for reading model replies.

use chapterquiz_shared::Prompt;
use serde_json::json;

/// Instructions for generating one chapter's question set.
///
/// `{chapter_name}` and `{text}` are substituted by [`generation_prompt`].
const GENERATION_TEMPLATE: &str = r#"You are a tutor helping readers think about how a book applies to their own lives. Ask questions that build self-reflection, sound judgement and practical decision-making.

Write exactly 6 questions, with answers, about the chapter text below:
- 3 open-ended questions ("Text") that call for a paragraph-length answer.
- 1 multiple-choice question ("MCQ") with exactly 4 options given as a list. Its answer is the exact text of the correct option.
- 1 true/false question ("True/False") whose answer is the JSON boolean true or false.
- 1 fill-in-the-blank question ("Fill_in_the_blanks") that marks the blank with ___ and whose answer is the missing word or phrase.

Every question should place the reader in a realistic everyday situation where the chapter's ideas apply, stay faithful to the book's wording and ideas, and use a plain, friendly tone a sixth-grader can follow. Never use slurs, slang or offensive language.

### Chapter: {chapter_name}

### Context
{text}

### Output
Reply with a single JSON object and nothing else, in this shape:
{
  "chapter_name": "{chapter_name}",
  "questions_answers": [
    {"question": "Open-ended scenario question?", "question_type": "Text", "answer": "Model answer of about 150 words."},
    {"question": "Open-ended scenario question?", "question_type": "Text", "answer": "Model answer of about 150 words."},
    {"question": "Open-ended scenario question?", "question_type": "Text", "answer": "Model answer of about 150 words."},
    {"question": "Which choice fits best?", "question_type": "MCQ", "options": ["First", "Second", "Third", "Fourth"], "answer": "Second"},
    {"question": "Statement to judge.", "question_type": "True/False", "answer": true},
    {"question": "The key idea is ___.", "question_type": "Fill_in_the_blanks", "answer": "missing word"}
  ]
}
"#;

/// System message for grading an open-text answer.
pub const VALIDATION_PROMPT: &str = r#"You grade a user's answer against a reference answer. Follow these rules strictly:

1. Compare `user_answer` with `correct_answer` for factual accuracy only.
2. Give a score from 0 to 10:
   - 10: fully correct.
   - 5 to 9: mostly correct with minor inaccuracies.
   - 0 to 4: mostly incorrect or unrelated to the reference answer.
3. Set `is_correct` to "true" when the score is 5 or above, otherwise "false".
4. Ignore tone, sentiment and style, and do not suggest improvements.
5. Do not rewrite either answer.

Reply with a single JSON object containing only `score` and `is_correct`, for example {"score": 7, "is_correct": "true"}."#;

/// Build the generation prompt for one chapter.
pub fn generation_prompt(chapter_name: &str, text: &str) -> Prompt {
    let user = fill_template(
        GENERATION_TEMPLATE,
        &[("chapter_name", chapter_name), ("text", text)],
    );
    Prompt::user(user)
}

/// Replace `{key}` placeholders in a single pass.
///
/// Substituted values are copied verbatim and never scanned for placeholders.
/// Braces that do not open a known key are kept as written.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let hit = values.iter().find_map(|(key, value)| {
            let after = tail.strip_prefix('{')?.strip_prefix(key)?.strip_prefix('}')?;
            Some((*value, after))
        });
        match hit {
            Some((value, after)) => {
                out.push_str(value);
                rest = after;
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Build the grading prompt for one open-text answer.
pub fn grading_prompt(question: &str, user_answer: &str, correct_answer: &str) -> Prompt {
    let payload = json!({
        "question": question,
        "user_answer": user_answer,
        "correct_answer": correct_answer,
    });
    Prompt::with_system(VALIDATION_PROMPT, payload.to_string())
}

/// Slice from the first `{` to the last `}` of a model reply.
pub fn json_object_slice(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

/// Cut `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_prompt_embeds_chapter() {
        let prompt = generation_prompt("Making Choices", "Think before you act.");
        assert!(prompt.system.is_none());
        assert!(prompt.user.contains("### Chapter: Making Choices"));
        assert!(prompt.user.contains(r#""chapter_name": "Making Choices""#));
        assert!(prompt.user.contains("Think before you act."));
        assert!(!prompt.user.contains("{text}"));
    }

    #[test]
    fn placeholders_inside_values_are_left_alone() {
        let prompt = generation_prompt("Reading {text} aloud", "Body mentions {chapter_name}.");
        assert_eq!(prompt.user.matches("Body mentions {chapter_name}.").count(), 1);
        assert!(prompt.user.contains("### Chapter: Reading {text} aloud"));
        assert!(prompt.user.contains(r#""chapter_name": "Reading {text} aloud""#));
        // the JSON example braces survive
        assert!(prompt.user.contains(r#"{"question": "Statement to judge.""#));
    }

    #[test]
    fn grading_prompt_is_json_user_message() {
        let prompt = grading_prompt("Why?", "because", "reasons");
        assert_eq!(prompt.system.as_deref(), Some(VALIDATION_PROMPT));
        let payload: serde_json::Value = serde_json::from_str(&prompt.user).unwrap();
        assert_eq!(payload["question"], "Why?");
        assert_eq!(payload["user_answer"], "because");
        assert_eq!(payload["correct_answer"], "reasons");
    }

    #[test]
    fn json_slice_spans_outer_braces() {
        assert_eq!(
            json_object_slice("Sure! {\"a\": {\"b\": 1}} hope that helps"),
            Some("{\"a\": {\"b\": 1}}")
        );
        assert_eq!(json_object_slice("no json here"), None);
        assert_eq!(json_object_slice("} backwards {"), None);
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
