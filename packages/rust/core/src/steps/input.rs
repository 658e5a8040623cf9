//! Input resolution and embedding steps.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chapterquiz_shared::{
    QuizError, Result, S3Locator, StorageResolver, TextExtractor, VectorIndex,
};
use tracing::{debug, info, instrument};

use crate::graph::Step;
use crate::state::{ScratchFile, WorkflowState, require_id};

/// Materializes the uploaded or referenced document into a scratch file.
pub struct PrepareInput {
    resolver: Arc<dyn StorageResolver>,
    scratch_dir: PathBuf,
}

impl PrepareInput {
    pub fn new(resolver: Arc<dyn StorageResolver>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            resolver,
            scratch_dir: scratch_dir.into(),
        }
    }

    async fn resolve_bytes(&self, state: &WorkflowState) -> Result<Arc<[u8]>> {
        let s3_url = state
            .s3_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match (&state.file_content, s3_url) {
            (Some(_), Some(_)) => Err(QuizError::input(
                "Provide either an uploaded file or an S3 URL, not both",
            )),
            (None, None) => Err(QuizError::input(
                "Provide either an uploaded file or an S3 URL",
            )),
            (Some(content), None) => {
                if content.is_empty() {
                    return Err(QuizError::input("Uploaded file is empty"));
                }
                Ok(Arc::clone(content))
            }
            (None, Some(url)) => {
                let locator = S3Locator::parse(url)?;
                let bytes = self.resolver.fetch(&locator).await?;
                if bytes.is_empty() {
                    return Err(QuizError::Storage(format!("{locator}: object is empty")));
                }
                debug!(%locator, bytes = bytes.len(), "resolved object");
                Ok(Arc::from(bytes))
            }
        }
    }
}

#[async_trait]
impl Step<WorkflowState> for PrepareInput {
    #[instrument(skip_all, fields(book_id = ?state.book_id))]
    async fn run(&self, state: &WorkflowState) -> Result<WorkflowState> {
        let bytes = self.resolve_bytes(state).await?;
        let scratch = ScratchFile::create(&self.scratch_dir, &bytes).await?;

        Ok(WorkflowState {
            scratch_file: Some(Arc::new(scratch)),
            ..state.clone()
        })
    }
}

/// Asks the vector index whether the book is already indexed.
pub struct CheckEmbeddings {
    index: Arc<dyn VectorIndex>,
}

impl CheckEmbeddings {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Step<WorkflowState> for CheckEmbeddings {
    #[instrument(skip_all, fields(book_id = ?state.book_id))]
    async fn run(&self, state: &WorkflowState) -> Result<WorkflowState> {
        let book_id = require_id(&state.book_id, "book_id")?;
        let exists = self.index.exists(book_id).await?;
        info!(book_id, exists, "checked embeddings");

        // nothing downstream reads the document once the book is indexed
        let scratch_file = if exists {
            state.release_scratch();
            None
        } else {
            state.scratch_file.clone()
        };

        Ok(WorkflowState {
            embeddings_exist: Some(exists),
            scratch_file,
            ..state.clone()
        })
    }
}

/// Extracts chapters from the scratch file and indexes them.
///
/// The scratch file is deleted whether or not indexing succeeds.
pub struct GenerateEmbeddings {
    extractor: Arc<dyn TextExtractor>,
    index: Arc<dyn VectorIndex>,
}

impl GenerateEmbeddings {
    pub fn new(extractor: Arc<dyn TextExtractor>, index: Arc<dyn VectorIndex>) -> Self {
        Self { extractor, index }
    }

    async fn embed(&self, state: &WorkflowState, path: &Path) -> Result<usize> {
        let book_id = require_id(&state.book_id, "book_id")?;
        let chapters = self.extractor.extract(path).await?;
        if chapters.is_empty() {
            return Err(QuizError::input("No chapter text found in the document"));
        }
        self.index.index(book_id, &chapters).await?;
        Ok(chapters.len())
    }
}

#[async_trait]
impl Step<WorkflowState> for GenerateEmbeddings {
    #[instrument(skip_all, fields(book_id = ?state.book_id))]
    async fn run(&self, state: &WorkflowState) -> Result<WorkflowState> {
        let Some(scratch) = state.scratch_file.clone() else {
            return Err(QuizError::config("scratch file is required"));
        };

        let outcome = self.embed(state, scratch.path()).await;
        scratch.release();
        let chapters = outcome?;

        info!(chapters, "book indexed");
        Ok(WorkflowState {
            scratch_file: None,
            ..state.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedExtractor, MemoryIndex, MemoryResolver, two_chapters};
    use chapterquiz_shared::ChapterText;
    use tempfile::TempDir;

    fn upload(bytes: &[u8]) -> WorkflowState {
        WorkflowState {
            book_id: Some("book-1".into()),
            user_id: Some("user-1".into()),
            file_content: Some(Arc::from(bytes.to_vec())),
            ..WorkflowState::default()
        }
    }

    fn prepare(resolver: MemoryResolver) -> (PrepareInput, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (PrepareInput::new(Arc::new(resolver), dir.path()), dir)
    }

    #[tokio::test]
    async fn upload_is_written_to_scratch() {
        let (step, _dir) = prepare(MemoryResolver::default());
        let state = step
            .run(&upload(b"CHAPTER 1:- A\ntext"))
            .await
            .unwrap();
        let scratch = state.scratch_file.as_ref().unwrap();
        assert_eq!(std::fs::read(scratch.path()).unwrap(), b"CHAPTER 1:- A\ntext");
    }

    #[tokio::test]
    async fn s3_object_is_fetched() {
        let (step, _dir) = prepare(MemoryResolver::with_object("s3://books/a.txt", b"remote"));
        let state = WorkflowState {
            s3_url: Some("s3://books/a.txt".into()),
            ..WorkflowState::default()
        };
        let next = step.run(&state).await.unwrap();
        let path = next.scratch_file.as_ref().unwrap().path().to_path_buf();
        assert_eq!(std::fs::read(&path).unwrap(), b"remote");
        // input state is untouched
        assert!(state.scratch_file.is_none());
    }

    #[tokio::test]
    async fn both_or_neither_source_is_input_error() {
        let (step, _dir) = prepare(MemoryResolver::default());

        let both = WorkflowState {
            s3_url: Some("s3://books/a.txt".into()),
            ..upload(b"x")
        };
        assert!(matches!(step.run(&both).await.unwrap_err(), QuizError::Input { .. }));

        let neither = WorkflowState::default();
        assert!(matches!(step.run(&neither).await.unwrap_err(), QuizError::Input { .. }));

        let empty = upload(b"");
        assert!(matches!(step.run(&empty).await.unwrap_err(), QuizError::Input { .. }));
    }

    #[tokio::test]
    async fn bad_locator_is_storage_error() {
        let (step, _dir) = prepare(MemoryResolver::default());
        for url in ["https://books/a.txt", "s3://books", "s3://books/missing.txt"] {
            let state = WorkflowState {
                s3_url: Some(url.into()),
                ..WorkflowState::default()
            };
            let err = step.run(&state).await.unwrap_err();
            assert!(matches!(err, QuizError::Storage(_)), "{url}: {err}");
        }
    }

    #[tokio::test]
    async fn check_requires_book_id() {
        let step = CheckEmbeddings::new(Arc::new(MemoryIndex::new()));
        let err = step.run(&WorkflowState::default()).await.unwrap_err();
        assert!(matches!(err, QuizError::Config { .. }));
    }

    #[tokio::test]
    async fn check_releases_scratch_when_indexed() {
        let index = MemoryIndex::with_book("book-1", two_chapters());
        let (step, _dir) = prepare(MemoryResolver::default());
        let staged = step
            .run(&upload(b"doc"))
            .await
            .unwrap();
        let path = staged.scratch_file.as_ref().unwrap().path().to_path_buf();

        let next = CheckEmbeddings::new(Arc::new(index)).run(&staged).await.unwrap();
        assert_eq!(next.embeddings_exist, Some(true));
        assert!(next.scratch_file.is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn check_keeps_scratch_when_not_indexed() {
        let (step, _dir) = prepare(MemoryResolver::default());
        let staged = step
            .run(&upload(b"doc"))
            .await
            .unwrap();
        let next = CheckEmbeddings::new(Arc::new(MemoryIndex::new()))
            .run(&staged)
            .await
            .unwrap();
        assert_eq!(next.embeddings_exist, Some(false));
        assert!(next.scratch_file.as_ref().unwrap().path().exists());
    }

    #[tokio::test]
    async fn embedding_indexes_and_removes_scratch() {
        let index = Arc::new(MemoryIndex::new());
        let (step, _dir) = prepare(MemoryResolver::default());
        let staged = step
            .run(&upload(b"doc"))
            .await
            .unwrap();
        let path = staged.scratch_file.as_ref().unwrap().path().to_path_buf();

        let step = GenerateEmbeddings::new(Arc::new(FixedExtractor::new(two_chapters())), index.clone());
        let next = step.run(&staged).await.unwrap();

        assert!(next.scratch_file.is_none());
        assert!(!path.exists());
        assert!(index.exists("book-1").await.unwrap());
        let all: Vec<ChapterText> = index.top_k("book-1", "", 50).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn embedding_failure_still_removes_scratch() {
        for (extractor, index) in [
            (FixedExtractor::failing(), MemoryIndex::new()),
            (FixedExtractor::new(two_chapters()), MemoryIndex::failing()),
        ] {
            let (step, _dir) = prepare(MemoryResolver::default());
            let staged = step
                .run(&upload(b"doc"))
                .await
                .unwrap();
            let path = staged.scratch_file.as_ref().unwrap().path().to_path_buf();

            let step = GenerateEmbeddings::new(Arc::new(extractor), Arc::new(index));
            assert!(step.run(&staged).await.is_err());
            assert!(!path.exists());
        }
    }
}
