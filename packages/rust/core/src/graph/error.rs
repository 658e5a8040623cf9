//! Graph compilation errors.

use chapterquiz_shared::QuizError;
use thiserror::Error;

/// Error when compiling a state graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompilationError {
    /// No entry step was set.
    #[error("graph has no entry step")]
    MissingEntry,

    /// The entry step or an edge source was never registered.
    #[error("step not found: {0}")]
    StepNotFound(String),

    /// An edge points at a step that was never registered.
    #[error("edge {from} -> {to} targets an unknown step")]
    UnknownTarget { from: String, to: String },

    /// A step has more than one outgoing edge definition.
    #[error("step {0} has more than one outgoing edge")]
    DuplicateEdge(String),

    /// A registered step has no outgoing edge.
    #[error("step {0} has no outgoing edge")]
    MissingEdge(String),

    /// The edges form a cycle through the named step.
    #[error("cycle detected at step {0}")]
    Cycle(String),
}

impl From<CompilationError> for QuizError {
    fn from(err: CompilationError) -> Self {
        QuizError::Workflow(err.to_string())
    }
}
