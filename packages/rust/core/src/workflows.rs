//! The two workflow graphs and the pipeline wrappers that run them.

use std::sync::Arc;

use chapterquiz_shared::{
    GenerationModel, PipelineSettings, QuestionStore, Result, StorageResolver, TextExtractor,
    VectorIndex,
};
use tracing::{info, instrument};

use crate::graph::{CompiledGraph, END, GraphOutcome, StateGraph, StepObserver};
use crate::state::WorkflowState;
use crate::steps::{self, *};
use crate::validator::AnswerValidator;

/// External services the workflows depend on.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn StorageResolver>,
    pub index: Arc<dyn VectorIndex>,
    pub extractor: Arc<dyn TextExtractor>,
    pub model: Arc<dyn GenerationModel>,
    pub store: Arc<dyn QuestionStore>,
}

pub const ROUTE_INDEXED: &str = "indexed";
pub const ROUTE_NOT_INDEXED: &str = "not_indexed";

/// Branch taken after the embedding check. An indexed book reuses its stored set.
pub fn route_after_embedding_check(state: &WorkflowState) -> &'static str {
    if state.embeddings_exist == Some(true) {
        ROUTE_INDEXED
    } else {
        ROUTE_NOT_INDEXED
    }
}

/// Build the question generation graph.
///
/// ```text
/// prepare_input -> check_embeddings -+-> fetch_stored_questions -> format_api_response
///                                    |           ^
///                                    +-> generate_embeddings -> generate_questions -> store_questions
/// ```
pub fn build_generation_graph(
    collaborators: &Collaborators,
    settings: &PipelineSettings,
) -> Result<CompiledGraph<WorkflowState>> {
    let c = collaborators;
    let mut graph = StateGraph::new();
    graph
        .add_step(
            steps::PREPARE_INPUT,
            PrepareInput::new(c.resolver.clone(), settings.scratch_dir.clone()),
        )
        .add_step(steps::CHECK_EMBEDDINGS, CheckEmbeddings::new(c.index.clone()))
        .add_step(
            steps::GENERATE_EMBEDDINGS,
            GenerateEmbeddings::new(c.extractor.clone(), c.index.clone()),
        )
        .add_step(
            steps::GENERATE_QUESTIONS,
            GenerateQuestions::new(c.index.clone(), c.model.clone(), settings),
        )
        .add_step(
            steps::STORE_QUESTIONS,
            StoreQuestions::new(c.store.clone(), settings.first_question_id),
        )
        .add_step(
            steps::FETCH_STORED_QUESTIONS,
            FetchStoredQuestions::new(c.store.clone()),
        )
        .add_step(
            steps::FORMAT_API_RESPONSE,
            FormatApiResponse::new(settings.max_response_questions),
        )
        .set_entry(steps::PREPARE_INPUT)
        .add_edge(steps::PREPARE_INPUT, steps::CHECK_EMBEDDINGS)
        .add_conditional_edges(
            steps::CHECK_EMBEDDINGS,
            route_after_embedding_check,
            [
                (ROUTE_INDEXED, steps::FETCH_STORED_QUESTIONS),
                (ROUTE_NOT_INDEXED, steps::GENERATE_EMBEDDINGS),
            ],
        )
        .add_edge(steps::GENERATE_EMBEDDINGS, steps::GENERATE_QUESTIONS)
        .add_edge(steps::GENERATE_QUESTIONS, steps::STORE_QUESTIONS)
        .add_edge(steps::STORE_QUESTIONS, steps::FETCH_STORED_QUESTIONS)
        .add_edge(steps::FETCH_STORED_QUESTIONS, steps::FORMAT_API_RESPONSE)
        .add_edge(steps::FORMAT_API_RESPONSE, END);

    Ok(graph.compile()?)
}

/// Build the answer validation graph.
pub fn build_validation_graph(
    collaborators: &Collaborators,
) -> Result<CompiledGraph<WorkflowState>> {
    let mut graph = StateGraph::new();
    graph
        .add_step(
            steps::FETCH_QUESTIONS_FOR_VALIDATION,
            FetchQuestionsForValidation::new(collaborators.store.clone()),
        )
        .add_step(
            steps::VALIDATE_ANSWERS,
            ValidateAnswers::new(AnswerValidator::new(collaborators.model.clone())),
        )
        .add_step(steps::FORMAT_VALIDATION_RESPONSE, FormatValidationResponse)
        .set_entry(steps::FETCH_QUESTIONS_FOR_VALIDATION)
        .add_edge(steps::FETCH_QUESTIONS_FOR_VALIDATION, steps::VALIDATE_ANSWERS)
        .add_edge(steps::VALIDATE_ANSWERS, steps::FORMAT_VALIDATION_RESPONSE)
        .add_edge(steps::FORMAT_VALIDATION_RESPONSE, END);

    Ok(graph.compile()?)
}

// ---------------------------------------------------------------------------
// Pipelines
// ---------------------------------------------------------------------------

/// Compiled generation and validation graphs, built once and shared by runs.
pub struct Pipelines {
    generation: CompiledGraph<WorkflowState>,
    validation: CompiledGraph<WorkflowState>,
}

impl Pipelines {
    pub fn new(collaborators: &Collaborators, settings: &PipelineSettings) -> Result<Self> {
        Ok(Self {
            generation: build_generation_graph(collaborators, settings)?,
            validation: build_validation_graph(collaborators)?,
        })
    }

    /// Run the generation graph. Any scratch file left on the outcome state is released.
    #[instrument(skip_all, fields(book_id = ?state.book_id, user_id = ?state.user_id))]
    pub async fn run_generation(
        &self,
        state: WorkflowState,
        observer: &dyn StepObserver,
    ) -> GraphOutcome<WorkflowState> {
        let outcome = self.generation.invoke_observed(state, observer).await;
        outcome.state().release_scratch();
        log_outcome("generation", &outcome);
        outcome
    }

    #[instrument(skip_all, fields(row_id = ?state.row_id, user_id = ?state.user_id))]
    pub async fn run_validation(
        &self,
        state: WorkflowState,
        observer: &dyn StepObserver,
    ) -> GraphOutcome<WorkflowState> {
        let outcome = self.validation.invoke_observed(state, observer).await;
        log_outcome("validation", &outcome);
        outcome
    }
}

fn log_outcome(workflow: &str, outcome: &GraphOutcome<WorkflowState>) {
    match outcome {
        GraphOutcome::Completed { trace, .. } => {
            info!(workflow, steps = trace.len(), "run completed");
        }
        GraphOutcome::Halted { step, error, .. } => {
            info!(workflow, step = %step, kind = error.kind(), "run halted");
        }
    }
}
