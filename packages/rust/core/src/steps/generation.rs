//! Question generation, persistence and response shaping.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chapterquiz_shared::{
    Chapter, GenerationModel, PipelineSettings, Question, QuestionStore, QuizError, RawQuestion,
    Result, RowId, VectorIndex,
};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::format::generation_response;
use crate::graph::Step;
use crate::prompts::{generation_prompt, json_object_slice, truncate_chars};
use crate::state::{ApiResponse, WorkflowState, require, require_id};

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

/// Parse one chapter's generation reply into usable questions.
///
/// The reply must hold a JSON object with `chapter_name` and a
/// `questions_answers` array. Individual questions that fail normalization
/// are dropped; a reply left with none is an error.
pub fn parse_chapter_reply(reply: &str) -> std::result::Result<Vec<Question>, String> {
    if reply.trim().is_empty() {
        return Err("empty reply".into());
    }
    let json = json_object_slice(reply).ok_or("no JSON object in reply")?;
    let value: Value = serde_json::from_str(json).map_err(|e| format!("malformed JSON: {e}"))?;

    if value.get("chapter_name").is_none() {
        return Err("missing chapter_name".into());
    }
    let Some(items) = value.get("questions_answers").and_then(Value::as_array) else {
        return Err("missing questions_answers".into());
    };

    let questions: Vec<Question> = items
        .iter()
        .filter_map(|item| {
            let raw: RawQuestion = match serde_json::from_value(item.clone()) {
                Ok(raw) => raw,
                Err(e) => {
                    debug!(error = %e, "dropping unreadable question");
                    return None;
                }
            };
            match raw.normalize() {
                Ok(q) => Some(Question {
                    question_id: None,
                    ..q
                }),
                Err(reason) => {
                    debug!(%reason, "dropping question");
                    None
                }
            }
        })
        .collect();

    if questions.is_empty() {
        return Err("no usable questions".into());
    }
    Ok(questions)
}

/// Number chapters from 1 and questions sequentially from `first_id`.
pub fn assign_identifiers(chapters: &[Chapter], first_id: u32) -> Vec<Chapter> {
    let mut next_id = first_id;
    chapters
        .iter()
        .enumerate()
        .map(|(i, chapter)| Chapter {
            chapter_name: chapter.chapter_name.clone(),
            chapter_number: i as u32 + 1,
            questions_answers: chapter
                .questions_answers
                .iter()
                .map(|q| {
                    let id = next_id;
                    next_id += 1;
                    Question {
                        question_id: Some(id),
                        ..q.clone()
                    }
                })
                .collect(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// GenerateQuestions
// ---------------------------------------------------------------------------

/// Discovers the book's chapters and asks the model for questions per chapter.
pub struct GenerateQuestions {
    index: Arc<dyn VectorIndex>,
    model: Arc<dyn GenerationModel>,
    discovery_k: usize,
    chunks_per_chapter: usize,
    char_budget: usize,
}

impl GenerateQuestions {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        model: Arc<dyn GenerationModel>,
        settings: &PipelineSettings,
    ) -> Self {
        Self {
            index,
            model,
            discovery_k: settings.chapter_discovery_k,
            chunks_per_chapter: settings.chunks_per_chapter,
            char_budget: settings.chunk_char_budget,
        }
    }

    /// Chapter names in book order, at most `discovery_k` of them.
    async fn discover_chapters(&self, book_id: &str) -> Result<Vec<String>> {
        let names = self.index.chapters(book_id, self.discovery_k).await?;
        let mut seen = HashSet::new();
        Ok(names
            .into_iter()
            .filter(|name| !name.trim().is_empty() && seen.insert(name.clone()))
            .collect())
    }

    /// `Ok(None)` when the chapter is skipped.
    async fn generate_chapter(&self, book_id: &str, chapter_name: &str) -> Result<Option<Vec<Question>>> {
        let query = format!("Chapter: {chapter_name}");
        let chunks = self
            .index
            .top_k(book_id, &query, self.chunks_per_chapter)
            .await?;
        if chunks.is_empty() {
            warn!(chapter = chapter_name, "no text retrieved, skipping chapter");
            return Ok(None);
        }

        let joined = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let text = truncate_chars(&joined, self.char_budget);

        let reply = match self.model.complete(&generation_prompt(chapter_name, text)).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(chapter = chapter_name, error = %e, "generation call failed, skipping chapter");
                return Ok(None);
            }
        };

        match parse_chapter_reply(&reply) {
            Ok(questions) => Ok(Some(questions)),
            Err(reason) => {
                warn!(chapter = chapter_name, %reason, "unusable reply, skipping chapter");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl Step<WorkflowState> for GenerateQuestions {
    #[instrument(skip_all, fields(book_id = ?state.book_id))]
    async fn run(&self, state: &WorkflowState) -> Result<WorkflowState> {
        let book_id = require_id(&state.book_id, "book_id")?;
        require_id(&state.user_id, "user_id")?;

        let names = self.discover_chapters(book_id).await?;
        if names.is_empty() {
            return Err(QuizError::Generation(format!(
                "no chapters indexed for book {book_id}"
            )));
        }
        info!(chapters = names.len(), "generating questions");

        let mut chapters: Vec<Chapter> = Vec::with_capacity(names.len());
        for name in names {
            if let Some(questions) = self.generate_chapter(book_id, &name).await? {
                chapters.push(Chapter {
                    chapter_name: name,
                    chapter_number: chapters.len() as u32 + 1,
                    questions_answers: questions,
                });
            }
        }

        if chapters.is_empty() {
            return Err(QuizError::Generation(
                "no chapter produced usable questions".into(),
            ));
        }

        info!(
            chapters = chapters.len(),
            questions = Chapter::count_questions(&chapters),
            "questions generated"
        );
        Ok(WorkflowState {
            questions_answers: chapters,
            ..state.clone()
        })
    }
}

// ---------------------------------------------------------------------------
// StoreQuestions
// ---------------------------------------------------------------------------

/// Assigns identifiers and upserts the set for `(user_id, book_id)`.
pub struct StoreQuestions {
    store: Arc<dyn QuestionStore>,
    first_question_id: u32,
}

impl StoreQuestions {
    pub fn new(store: Arc<dyn QuestionStore>, first_question_id: u32) -> Self {
        Self {
            store,
            first_question_id,
        }
    }
}

#[async_trait]
impl Step<WorkflowState> for StoreQuestions {
    #[instrument(skip_all, fields(book_id = ?state.book_id, user_id = ?state.user_id))]
    async fn run(&self, state: &WorkflowState) -> Result<WorkflowState> {
        let user_id = require_id(&state.user_id, "user_id")?;
        let book_id = require_id(&state.book_id, "book_id")?;
        if state.questions_answers.is_empty() {
            return Err(QuizError::Persistence("no questions to store".into()));
        }

        let chapters = assign_identifiers(&state.questions_answers, self.first_question_id);
        let row_id = state.row_id.clone().unwrap_or_else(RowId::generate);
        let stored = self.store.upsert(user_id, book_id, &row_id, &chapters).await?;
        info!(row_id = %stored, "question set stored");

        Ok(WorkflowState {
            row_id: Some(stored),
            questions_answers: chapters,
            ..state.clone()
        })
    }
}

// ---------------------------------------------------------------------------
// FetchStoredQuestions
// ---------------------------------------------------------------------------

/// Loads the stored set for `(user_id, book_id)`.
pub struct FetchStoredQuestions {
    store: Arc<dyn QuestionStore>,
}

impl FetchStoredQuestions {
    pub fn new(store: Arc<dyn QuestionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Step<WorkflowState> for FetchStoredQuestions {
    #[instrument(skip_all, fields(book_id = ?state.book_id, user_id = ?state.user_id))]
    async fn run(&self, state: &WorkflowState) -> Result<WorkflowState> {
        let user_id = require_id(&state.user_id, "user_id")?;
        let book_id = require_id(&state.book_id, "book_id")?;

        let Some(set) = self.store.fetch_by_user_book(user_id, book_id).await? else {
            return Err(QuizError::not_found(format!(
                "No stored questions for user {user_id} and book {book_id}"
            )));
        };
        debug!(row_id = %set.row_id, chapters = set.chapters.len(), "loaded stored set");

        Ok(WorkflowState {
            row_id: Some(set.row_id),
            questions_answers: set.chapters,
            created_on: Some(set.created_on),
            ..state.clone()
        })
    }
}

// ---------------------------------------------------------------------------
// FormatApiResponse
// ---------------------------------------------------------------------------

/// Flattens the stored set into the generation response.
pub struct FormatApiResponse {
    max_questions: usize,
}

impl FormatApiResponse {
    pub fn new(max_questions: usize) -> Self {
        Self { max_questions }
    }
}

#[async_trait]
impl Step<WorkflowState> for FormatApiResponse {
    async fn run(&self, state: &WorkflowState) -> Result<WorkflowState> {
        let user_id = require_id(&state.user_id, "user_id")?;
        let book_id = require_id(&state.book_id, "book_id")?;
        let row_id = require(&state.row_id, "row_id")?;
        let created_on = require(&state.created_on, "created_on")?;

        let limit = state
            .total_questions
            .map_or(self.max_questions, |n| n.min(self.max_questions));
        let response = generation_response(
            user_id,
            book_id,
            row_id,
            *created_on,
            &state.questions_answers,
            limit,
        );

        Ok(WorkflowState {
            api_response: Some(ApiResponse::Generation(response)),
            ..state.clone()
        })
    }
}
