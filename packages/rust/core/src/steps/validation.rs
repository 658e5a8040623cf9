//! Answer validation steps.

use std::sync::Arc;

use async_trait::async_trait;
use chapterquiz_shared::{QuestionStore, QuizError, Result};
use tracing::{info, instrument};

use crate::format::validation_response;
use crate::graph::Step;
use crate::state::{ApiResponse, WorkflowState, require, require_id};
use crate::validator::AnswerValidator;

/// Loads the chapters stored under the request's `row_id`.
pub struct FetchQuestionsForValidation {
    store: Arc<dyn QuestionStore>,
}

impl FetchQuestionsForValidation {
    pub fn new(store: Arc<dyn QuestionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Step<WorkflowState> for FetchQuestionsForValidation {
    #[instrument(skip_all, fields(row_id = ?state.row_id))]
    async fn run(&self, state: &WorkflowState) -> Result<WorkflowState> {
        let row_id = require(&state.row_id, "row_id")?;
        let chapters = match self.store.fetch_by_row_id(row_id).await? {
            Some(chapters) if !chapters.is_empty() => chapters,
            _ => {
                return Err(QuizError::not_found(
                    "No data found for the provided row_id",
                ));
            }
        };

        Ok(WorkflowState {
            chapters_data: Some(chapters),
            ..state.clone()
        })
    }
}

pub struct ValidateAnswers {
    validator: AnswerValidator,
}

impl ValidateAnswers {
    pub fn new(validator: AnswerValidator) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl Step<WorkflowState> for ValidateAnswers {
    #[instrument(skip_all, fields(answers = state.user_answers_list.len()))]
    async fn run(&self, state: &WorkflowState) -> Result<WorkflowState> {
        let chapters = require(&state.chapters_data, "chapters_data")?;
        if state.user_answers_list.is_empty() {
            return Err(QuizError::input("user_answers_list is empty"));
        }

        let graded = self
            .validator
            .validate(chapters, &state.user_answers_list)
            .await?;
        let correct = graded.iter().filter(|g| g.is_correct).count();
        info!(graded = graded.len(), correct, "answers validated");

        Ok(WorkflowState {
            validated_results: Some(graded),
            ..state.clone()
        })
    }
}

pub struct FormatValidationResponse;

#[async_trait]
impl Step<WorkflowState> for FormatValidationResponse {
    async fn run(&self, state: &WorkflowState) -> Result<WorkflowState> {
        let user_id = require_id(&state.user_id, "user_id")?;
        let graded = require(&state.validated_results, "validated_results")?;

        Ok(WorkflowState {
            api_response: Some(ApiResponse::Validation(validation_response(
                user_id,
                graded.clone(),
            ))),
            ..state.clone()
        })
    }
}
