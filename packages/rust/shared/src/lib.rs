//! Shared types, error model, and configuration for chapterquiz.
//!
//! This crate is the foundation depended on by all other chapterquiz crates.
//! It provides:
//! - [`QuizError`], the unified error type
//! - Domain types ([`Question`], [`Chapter`], [`RowId`], [`S3Locator`])
//! - Request/response records ([`GenerationResponse`], [`ValidationResponse`])
//! - Collaborator traits ([`VectorIndex`], [`QuestionStore`], [`GenerationModel`], ...)
//! - Configuration ([`AppConfig`], [`PipelineSettings`], config loading)

pub mod api;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use api::{
    FormattedQuestion, GenerationResponse, GradedAnswer, McqOptions, STATUS_SUCCESS, UserAnswer,
    ValidationResponse,
};
pub use collaborators::{GenerationModel, QuestionStore, StorageResolver, TextExtractor, VectorIndex};
pub use config::{
    AppConfig, DefaultsConfig, GenerationConfig, MAX_RESPONSE_QUESTIONS, ObjectStoreConfig,
    OpenRouterConfig, PipelineSettings, config_dir, config_file_path, expand_path, init_config, load_config,
    load_config_from, validate_api_key,
};
pub use error::{QuizError, Result};
pub use types::{
    AnswerValue, BLANK_MARKER, Chapter, ChapterText, Prompt, Question, QuestionType, RawQuestion,
    RowId, S3Locator, StoredQuestionSet,
};
