//! Heading-based chapter extraction from plain text.
//!
//! Chapters start at lines of the form `CHAPTER <n>:- <title>`, optionally
//! followed by a page number. Text runs until the next heading.

use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use chapterquiz_shared::{ChapterText, QuizError, Result, TextExtractor};
use regex::Regex;
use tracing::{debug, instrument};

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*CHAPTER[ \t]+\d+:-[ \t]+(.+?)(?:[ \t]+\d+)?[ \t]*$").expect("valid regex")
});

/// [`TextExtractor`] for UTF-8 text with `CHAPTER n:- Title` headings.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChapterHeadingExtractor;

impl ChapterHeadingExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextExtractor for ChapterHeadingExtractor {
    #[instrument(skip_all, fields(path = %path.display()))]
    async fn extract(&self, path: &Path) -> Result<Vec<ChapterText>> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| QuizError::io(path, e))?;
        let text = String::from_utf8_lossy(&bytes);
        let chapters = split_chapters(&text)?;
        debug!(chapters = chapters.len(), "extracted chapters");
        Ok(chapters)
    }
}

/// Split text into chapters in order of appearance.
///
/// Chapters with no body are dropped; a repeated title appends to the first
/// chapter of that name. Fails with an input error when no heading is found.
pub fn split_chapters(text: &str) -> Result<Vec<ChapterText>> {
    let text = text.replace('\0', "");
    let headings: Vec<_> = HEADING_RE.captures_iter(&text).collect();

    if headings.is_empty() {
        return Err(QuizError::input(
            "No chapter titles found. Ensure chapters are formatted as 'CHAPTER <n>:- <title>'.",
        ));
    }

    let mut chapters: Vec<ChapterText> = Vec::new();
    for (i, caps) in headings.iter().enumerate() {
        let (Some(whole), Some(title)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = headings
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(text.len());

        let name = title.as_str().trim();
        let body = text[whole.end()..end].trim();
        if body.is_empty() {
            continue;
        }

        match chapters.iter_mut().find(|c| c.chapter_name == name) {
            Some(existing) => {
                existing.text.push('\n');
                existing.text.push_str(body);
            }
            None => chapters.push(ChapterText::new(name, body)),
        }
    }

    Ok(chapters)
}
