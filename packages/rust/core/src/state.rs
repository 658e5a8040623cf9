//! Per-run workflow state and the scratch file it owns.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chapterquiz_shared::{
    Chapter, GenerationResponse, GradedAnswer, QuizError, Result, RowId, UserAnswer,
    ValidationResponse,
};
use chrono::{DateTime, Utc};
use tempfile::TempPath;

/// Final payload of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    Generation(GenerationResponse),
    Validation(ValidationResponse),
}

/// State threaded through every step of one run.
///
/// Fields start empty and are filled in as steps complete. A state is created
/// fresh per invocation and never shared between runs.
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    // identity
    pub book_id: Option<String>,
    pub user_id: Option<String>,
    pub row_id: Option<RowId>,

    // input
    pub file_content: Option<Arc<[u8]>>,
    pub s3_url: Option<String>,
    /// Caller's cap on the formatted question list.
    pub total_questions: Option<usize>,

    // derived
    pub scratch_file: Option<Arc<ScratchFile>>,
    pub embeddings_exist: Option<bool>,

    // generation
    pub questions_answers: Vec<Chapter>,
    pub created_on: Option<DateTime<Utc>>,

    // validation
    pub user_answers_list: Vec<UserAnswer>,
    pub chapters_data: Option<Vec<Chapter>>,
    pub validated_results: Option<Vec<GradedAnswer>>,

    pub api_response: Option<ApiResponse>,
}

impl WorkflowState {
    /// Delete the scratch file if this state still references one.
    pub fn release_scratch(&self) {
        if let Some(file) = &self.scratch_file {
            file.release();
        }
    }
}

/// Borrow a required field or fail with a config error naming it.
pub(crate) fn require<'a, T>(field: &'a Option<T>, name: &str) -> Result<&'a T> {
    field
        .as_ref()
        .ok_or_else(|| QuizError::config(format!("{name} is required")))
}

/// Like [`require`] for identifier strings, also rejecting blank values.
pub(crate) fn require_id<'a>(field: &'a Option<String>, name: &str) -> Result<&'a str> {
    match field.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(QuizError::config(format!("{name} is required"))),
    }
}

// ---------------------------------------------------------------------------
// ScratchFile
// ---------------------------------------------------------------------------

/// A run-owned local copy of the input document.
///
/// [`release`](Self::release) deletes the file and is idempotent; dropping
/// the last handle releases it too.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    temp: Mutex<Option<TempPath>>,
}

impl ScratchFile {
    /// Write `bytes` to a new uniquely named file in `dir`.
    pub async fn create(dir: &Path, bytes: &[u8]) -> Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| QuizError::io(dir, e))?;

        let temp = tempfile::Builder::new()
            .prefix("chapterquiz_")
            .suffix(".upload")
            .tempfile_in(dir)
            .map_err(|e| QuizError::io(dir, e))?
            .into_temp_path();
        let path = temp.to_path_buf();

        // on error `temp` is dropped and the partial file goes with it
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| QuizError::io(&path, e))?;

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "scratch file created");
        Ok(Self {
            path,
            temp: Mutex::new(Some(temp)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_released(&self) -> bool {
        self.slot().is_none()
    }

    /// Delete the file. Later calls do nothing.
    pub fn release(&self) {
        let Some(temp) = self.slot().take() else {
            return;
        };
        match temp.close() {
            Ok(()) => tracing::debug!(path = %self.path.display(), "scratch file removed"),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove scratch file")
            }
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<TempPath>> {
        self.temp.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
