//! Core workflows and domain logic for ChapterQuiz.
//!
//! A small graph engine ([`graph`]) runs two workflows over a shared
//! [`WorkflowState`]: question generation for a book and answer validation
//! against a stored question set. [`QuizService`] is the outward surface.

pub mod format;
pub mod graph;
pub mod prompts;
pub mod service;
pub mod state;
pub mod steps;
pub mod validator;
pub mod workflows;

#[cfg(test)]
pub(crate) mod testing;

pub use service::{GenerateRequest, QuizService, ServiceError, ValidateRequest};
pub use state::{ApiResponse, WorkflowState};
pub use workflows::{Collaborators, Pipelines};
