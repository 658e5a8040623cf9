//! Workflow graph engine: named steps over a shared state record.
//!
//! Build a [`StateGraph`] with steps, straight edges and conditional edges,
//! [`compile`](StateGraph::compile) it into an immutable [`CompiledGraph`],
//! then [`invoke`](CompiledGraph::invoke) it with a fresh state per run.
//!
//! A step returning `Err` halts the run; the outcome carries the failing
//! step, the error, the last good state and the execution trace.

mod builder;
mod compiled;
mod error;
mod observer;
mod step;

pub use builder::{Router, StateGraph};
pub use compiled::{CompiledGraph, GraphOutcome};
pub use error::CompilationError;
pub use observer::{SilentObserver, StepObserver};
pub use step::Step;

/// Terminal marker. Edges pointing here end the run.
pub const END: &str = "__end__";
