//! Narrow interfaces to the systems the quiz workflows depend on.
//!
//! The core crate only ever holds these as `Arc<dyn Trait>`; concrete
//! adapters live in the storage, llm and source crates.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Chapter, ChapterText, Prompt, RowId, S3Locator, StoredQuestionSet};

/// Resolves an object-storage locator into raw bytes.
#[async_trait]
pub trait StorageResolver: Send + Sync {
    /// Fails with [`QuizError::Storage`](crate::QuizError::Storage) when the object cannot be fetched.
    async fn fetch(&self, locator: &S3Locator) -> Result<Vec<u8>>;
}

/// Per-book retrieval index over chapter chunks.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Whether anything has been indexed for `book_id`.
    async fn exists(&self, book_id: &str) -> Result<bool>;

    /// Index the given chapters for `book_id`, in order.
    async fn index(&self, book_id: &str, chapters: &[ChapterText]) -> Result<()>;

    /// Up to `k` distinct chapter names indexed for `book_id`, in book order.
    async fn chapters(&self, book_id: &str, k: usize) -> Result<Vec<String>>;

    /// Up to `k` chunks ranked by descending relevance to `query`.
    ///
    /// An empty query returns chunks in book order.
    async fn top_k(&self, book_id: &str, query: &str, k: usize) -> Result<Vec<ChapterText>>;
}

/// Splits a source document into named chapters.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Chapters in order of appearance.
    async fn extract(&self, path: &Path) -> Result<Vec<ChapterText>>;
}

/// A text-completion model.
#[async_trait]
pub trait GenerationModel: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String>;
}

/// Durable home of generated question sets.
///
/// Implementations hand back fully decoded chapters; encoding is their concern.
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Insert or replace the set for `(user_id, book_id)` and return its row id.
    async fn upsert(
        &self,
        user_id: &str,
        book_id: &str,
        row_id: &RowId,
        chapters: &[Chapter],
    ) -> Result<RowId>;

    async fn fetch_by_user_book(
        &self,
        user_id: &str,
        book_id: &str,
    ) -> Result<Option<StoredQuestionSet>>;

    async fn fetch_by_row_id(&self, row_id: &RowId) -> Result<Option<Vec<Chapter>>>;
}
