//! Outward request/response surface over the two workflows.

use std::sync::Arc;

use chapterquiz_shared::{
    GenerationResponse, PipelineSettings, QuizError, RowId, UserAnswer, ValidationResponse,
};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::graph::{GraphOutcome, SilentObserver, StepObserver};
use crate::state::{ApiResponse, WorkflowState};
use crate::workflows::{Collaborators, Pipelines};

/// A question generation request.
///
/// Exactly one of `file_content` and `s3_url` must be set.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub book_id: String,
    pub user_id: String,
    pub file_content: Option<Vec<u8>>,
    pub s3_url: Option<String>,
    /// Optional cap on the returned list, never above the configured maximum.
    pub total_questions: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct ValidateRequest {
    pub user_id: String,
    pub row_id: String,
    pub list: Vec<UserAnswer>,
}

/// Error returned to callers of [`QuizService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The caller can fix the request. The message is safe to show.
    #[error("{message}")]
    Rejected { kind: &'static str, message: String },

    /// Something failed on our side. Details are logged, not returned.
    #[error("internal error while processing the request")]
    Internal { kind: &'static str },
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rejected { kind, .. } | Self::Internal { kind } => kind,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

impl From<QuizError> for ServiceError {
    fn from(err: QuizError) -> Self {
        let kind = err.kind();
        if err.is_client_fault() {
            Self::Rejected {
                kind,
                message: err.to_string(),
            }
        } else {
            error!(kind, error = %err, "request failed");
            Self::Internal { kind }
        }
    }
}

/// Entry point for generation and validation requests.
///
/// Graphs are compiled once at construction; the service is cheap to share
/// behind an `Arc` and handles concurrent requests.
pub struct QuizService {
    pipelines: Pipelines,
}

impl QuizService {
    pub fn new(
        collaborators: Collaborators,
        settings: PipelineSettings,
    ) -> chapterquiz_shared::Result<Self> {
        let pipelines = Pipelines::new(&collaborators, &settings)?;
        Ok(Self { pipelines })
    }

    pub async fn generate(&self, request: GenerateRequest) -> Result<GenerationResponse, ServiceError> {
        self.generate_observed(request, &SilentObserver).await
    }

    /// Like [`generate`](Self::generate), reporting step progress to `observer`.
    #[instrument(skip_all, fields(book_id = %request.book_id, user_id = %request.user_id))]
    pub async fn generate_observed(
        &self,
        request: GenerateRequest,
        observer: &dyn StepObserver,
    ) -> Result<GenerationResponse, ServiceError> {
        let book_id = required(&request.book_id, "book_id")?;
        let user_id = required(&request.user_id, "user_id")?;
        if request.total_questions == Some(0) {
            return Err(QuizError::input("total_questions must be at least 1").into());
        }

        let state = WorkflowState {
            book_id: Some(book_id.to_string()),
            user_id: Some(user_id.to_string()),
            file_content: request.file_content.map(Arc::from),
            s3_url: request.s3_url,
            total_questions: request.total_questions,
            ..WorkflowState::default()
        };

        let outcome = self.pipelines.run_generation(state, observer).await;
        match finish(outcome)? {
            ApiResponse::Generation(response) => {
                info!(row_id = %response.row_id, questions = response.list.len(), "generation served");
                Ok(response)
            }
            ApiResponse::Validation(_) => Err(unexpected_response()),
        }
    }

    pub async fn validate(&self, request: ValidateRequest) -> Result<ValidationResponse, ServiceError> {
        self.validate_observed(request, &SilentObserver).await
    }

    #[instrument(skip_all, fields(row_id = %request.row_id, user_id = %request.user_id))]
    pub async fn validate_observed(
        &self,
        request: ValidateRequest,
        observer: &dyn StepObserver,
    ) -> Result<ValidationResponse, ServiceError> {
        let user_id = required(&request.user_id, "user_id")?;
        let row_id = required(&request.row_id, "row_id")?;
        if request.list.is_empty() {
            return Err(QuizError::input("list must contain at least one answer").into());
        }

        let state = WorkflowState {
            user_id: Some(user_id.to_string()),
            row_id: Some(RowId::from(row_id)),
            user_answers_list: request.list,
            ..WorkflowState::default()
        };

        let outcome = self.pipelines.run_validation(state, observer).await;
        match finish(outcome)? {
            ApiResponse::Validation(response) => {
                info!(answers = response.list.len(), "validation served");
                Ok(response)
            }
            ApiResponse::Generation(_) => Err(unexpected_response()),
        }
    }
}

fn required<'a>(value: &'a str, name: &str) -> Result<&'a str, ServiceError> {
    let value = value.trim();
    if value.is_empty() {
        warn!(field = name, "rejecting request with empty identity field");
        return Err(QuizError::input(format!("{name} is required")).into());
    }
    Ok(value)
}

fn finish(outcome: GraphOutcome<WorkflowState>) -> Result<ApiResponse, ServiceError> {
    let state = outcome.into_result()?;
    state.api_response.ok_or_else(|| {
        QuizError::Workflow("run completed without a response".into()).into()
    })
}

fn unexpected_response() -> ServiceError {
    QuizError::Workflow("run produced the wrong response kind".into()).into()
}
