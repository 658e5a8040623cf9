//! Workflow steps. Each step owns the collaborators it needs.

mod generation;
mod input;
mod validation;

pub use generation::{
    FetchStoredQuestions, FormatApiResponse, GenerateQuestions, StoreQuestions, assign_identifiers,
    parse_chapter_reply,
};
pub use input::{CheckEmbeddings, GenerateEmbeddings, PrepareInput};
pub use validation::{FetchQuestionsForValidation, FormatValidationResponse, ValidateAnswers};

pub const PREPARE_INPUT: &str = "prepare_input";
pub const CHECK_EMBEDDINGS: &str = "check_embeddings";
pub const GENERATE_EMBEDDINGS: &str = "generate_embeddings";
pub const GENERATE_QUESTIONS: &str = "generate_questions";
pub const STORE_QUESTIONS: &str = "store_questions";
pub const FETCH_STORED_QUESTIONS: &str = "fetch_stored_questions";
pub const FORMAT_API_RESPONSE: &str = "format_api_response";
pub const FETCH_QUESTIONS_FOR_VALIDATION: &str = "fetch_questions_for_validation";
pub const VALIDATE_ANSWERS: &str = "validate_answers";
pub const FORMAT_VALIDATION_RESPONSE: &str = "format_validation_response";
