//! Compiled graph: immutable, supports invoke only.

use std::collections::HashMap;
use std::sync::Arc;

use chapterquiz_shared::{QuizError, Result};
use tracing::{debug, warn};

use super::END;
use super::builder::Edge;
use super::observer::{SilentObserver, StepObserver};
use super::step::Step;

/// How a run ended.
#[derive(Debug)]
pub enum GraphOutcome<S> {
    /// The run reached [`END`].
    Completed { state: S, trace: Vec<String> },
    /// A step (or its router) failed; no later step ran.
    Halted {
        /// Step that failed.
        step: String,
        error: QuizError,
        /// State as it was before the failing step.
        state: S,
        trace: Vec<String>,
    },
}

impl<S> GraphOutcome<S> {
    /// Final state, or the last good state of a halted run.
    pub fn state(&self) -> &S {
        match self {
            Self::Completed { state, .. } | Self::Halted { state, .. } => state,
        }
    }

    /// Names of the steps that ran, in order, including a failing one.
    pub fn trace(&self) -> &[String] {
        match self {
            Self::Completed { trace, .. } | Self::Halted { trace, .. } => trace,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// The failing step of a halted run.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            Self::Completed { .. } => None,
            Self::Halted { step, .. } => Some(step),
        }
    }

    pub fn into_result(self) -> Result<S> {
        match self {
            Self::Completed { state, .. } => Ok(state),
            Self::Halted { error, .. } => Err(error),
        }
    }
}

/// Immutable, validated graph. Safe to share and invoke concurrently.
pub struct CompiledGraph<S> {
    pub(super) steps: HashMap<String, Arc<dyn Step<S>>>,
    pub(super) edges: HashMap<String, Edge<S>>,
    pub(super) entry: String,
}

impl<S> CompiledGraph<S>
where
    S: Send + Sync + 'static,
{
    /// Name of the entry step.
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Run the graph from the entry step until [`END`] or the first failure.
    pub async fn invoke(&self, state: S) -> GraphOutcome<S> {
        self.invoke_observed(state, &SilentObserver).await
    }

    /// Like [`invoke`](Self::invoke), reporting each step to `observer`.
    pub async fn invoke_observed(&self, state: S, observer: &dyn StepObserver) -> GraphOutcome<S> {
        let mut state = state;
        let mut trace = Vec::new();
        let mut current = self.entry.clone();

        loop {
            let Some(step) = self.steps.get(&current) else {
                let error = QuizError::Workflow(format!("step not found: {current}"));
                return GraphOutcome::Halted {
                    step: current,
                    error,
                    state,
                    trace,
                };
            };

            trace.push(current.clone());
            observer.step_started(&current);
            debug!(step = %current, "running step");

            match step.run(&state).await {
                Ok(next) => {
                    observer.step_finished(&current, true);
                    state = next;
                }
                Err(error) => {
                    observer.step_finished(&current, false);
                    warn!(step = %current, kind = error.kind(), %error, "step failed, halting run");
                    return GraphOutcome::Halted {
                        step: current,
                        error,
                        state,
                        trace,
                    };
                }
            }

            let next = match self.edges.get(&current) {
                Some(Edge::Direct(to)) => Ok(to.clone()),
                Some(Edge::Conditional { router, branches }) => {
                    let label = router(&state);
                    debug!(step = %current, label, "router chose branch");
                    branches.get(label).cloned().ok_or_else(|| {
                        QuizError::Workflow(format!(
                            "router after {current} returned unknown label {label:?}"
                        ))
                    })
                }
                None => Err(QuizError::Workflow(format!("step {current} has no outgoing edge"))),
            };

            match next {
                Ok(to) if to == END => return GraphOutcome::Completed { state, trace },
                Ok(to) => current = to,
                Err(error) => {
                    warn!(step = %current, %error, "routing failed, halting run");
                    return GraphOutcome::Halted {
                        step: current,
                        error,
                        state,
                        trace,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::super::{CompilationError, StateGraph};
    use super::*;

    #[derive(Debug, Clone, Default)]
    struct Tally {
        visited: Vec<&'static str>,
        flag: bool,
        value: i64,
    }

    struct Visit(&'static str);

    #[async_trait]
    impl Step<Tally> for Visit {
        async fn run(&self, state: &Tally) -> Result<Tally> {
            let mut next = state.clone();
            next.visited.push(self.0);
            next.value += 1;
            Ok(next)
        }
    }

    struct Fail;

    #[async_trait]
    impl Step<Tally> for Fail {
        async fn run(&self, _state: &Tally) -> Result<Tally> {
            Err(QuizError::input("bad input"))
        }
    }

    struct Double;

    #[async_trait]
    impl Step<Tally> for Double {
        async fn run(&self, state: &Tally) -> Result<Tally> {
            tokio::task::yield_now().await;
            Ok(Tally {
                value: state.value * 2,
                ..state.clone()
            })
        }
    }

    fn branching_graph() -> CompiledGraph<Tally> {
        let mut graph = StateGraph::new();
        graph
            .add_step("check", Visit("check"))
            .add_step("slow", Visit("slow"))
            .add_step("fetch", Visit("fetch"))
            .set_entry("check")
            .add_conditional_edges(
                "check",
                |s: &Tally| if s.flag { "skip" } else { "work" },
                [("skip", "fetch"), ("work", "slow")],
            )
            .add_edge("slow", "fetch")
            .add_edge("fetch", END);
        graph.compile().expect("compile")
    }

    #[tokio::test]
    async fn straight_line_runs_in_order() {
        let mut graph = StateGraph::new();
        graph
            .add_step("a", Visit("a"))
            .add_step("b", Visit("b"))
            .set_entry("a")
            .add_edge("a", "b")
            .add_edge("b", END);
        let graph = graph.compile().unwrap();

        let outcome = graph.invoke(Tally::default()).await;
        assert!(outcome.is_completed());
        assert_eq!(outcome.trace(), ["a", "b"]);
        assert_eq!(outcome.state().visited, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn conditional_edge_follows_router() {
        let graph = branching_graph();

        let outcome = graph.invoke(Tally::default()).await;
        assert_eq!(outcome.trace(), ["check", "slow", "fetch"]);

        let outcome = graph
            .invoke(Tally {
                flag: true,
                ..Tally::default()
            })
            .await;
        assert_eq!(outcome.trace(), ["check", "fetch"]);
    }

    #[tokio::test]
    async fn failing_step_halts_with_last_good_state() {
        let mut graph = StateGraph::new();
        graph
            .add_step("a", Visit("a"))
            .add_step("boom", Fail)
            .add_step("never", Visit("never"))
            .set_entry("a")
            .add_edge("a", "boom")
            .add_edge("boom", "never")
            .add_edge("never", END);
        let graph = graph.compile().unwrap();

        let outcome = graph.invoke(Tally::default()).await;
        assert_eq!(outcome.failed_step(), Some("boom"));
        assert_eq!(outcome.trace(), ["a", "boom"]);
        assert_eq!(outcome.state().visited, vec!["a"]);
        match outcome {
            GraphOutcome::Halted { error, .. } => assert!(matches!(error, QuizError::Input { .. })),
            GraphOutcome::Completed { .. } => panic!("expected halt"),
        }
    }

    #[tokio::test]
    async fn unknown_router_label_is_workflow_error() {
        let mut graph = StateGraph::new();
        graph
            .add_step("a", Visit("a"))
            .add_step("b", Visit("b"))
            .set_entry("a")
            .add_conditional_edges("a", |_: &Tally| "nowhere", [("somewhere", "b")])
            .add_edge("b", END);
        let graph = graph.compile().unwrap();

        let outcome = graph.invoke(Tally::default()).await;
        assert_eq!(outcome.failed_step(), Some("a"));
        let err = outcome.into_result().unwrap_err();
        assert!(matches!(err, QuizError::Workflow(_)));
        assert!(err.to_string().contains("nowhere"));
    }

    #[tokio::test]
    async fn observer_sees_every_step() {
        #[derive(Default)]
        struct Recorder(Mutex<Vec<String>>);

        impl StepObserver for Recorder {
            fn step_started(&self, step: &str) {
                self.0.lock().unwrap().push(format!("start:{step}"));
            }
            fn step_finished(&self, step: &str, ok: bool) {
                self.0.lock().unwrap().push(format!("finish:{step}:{ok}"));
            }
        }

        let recorder = Recorder::default();
        branching_graph()
            .invoke_observed(
                Tally {
                    flag: true,
                    ..Tally::default()
                },
                &recorder,
            )
            .await;
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["start:check", "finish:check:true", "start:fetch", "finish:fetch:true"]
        );
    }

    #[tokio::test]
    async fn concurrent_runs_are_isolated() {
        let mut graph = StateGraph::new();
        graph
            .add_step("double", Double)
            .add_step("again", Double)
            .set_entry("double")
            .add_edge("double", "again")
            .add_edge("again", END);
        let graph = Arc::new(graph.compile().unwrap());

        let handles: Vec<_> = (1..=16)
            .map(|i| {
                let graph = Arc::clone(&graph);
                tokio::spawn(async move {
                    let outcome = graph
                        .invoke(Tally {
                            value: i,
                            ..Tally::default()
                        })
                        .await;
                    (i, outcome.into_result().unwrap().value)
                })
            })
            .collect();

        for handle in handles {
            let (input, output) = handle.await.unwrap();
            assert_eq!(output, input * 4);
        }
    }

    #[test]
    fn compile_rejects_missing_entry() {
        let mut graph: StateGraph<Tally> = StateGraph::new();
        graph.add_step("a", Visit("a")).add_edge("a", END);
        assert_eq!(graph.compile().err(), Some(CompilationError::MissingEntry));

        let mut graph: StateGraph<Tally> = StateGraph::new();
        graph.add_step("a", Visit("a")).add_edge("a", END).set_entry("z");
        assert_eq!(
            graph.compile().err(),
            Some(CompilationError::StepNotFound("z".into()))
        );
    }

    #[test]
    fn compile_rejects_unknown_target() {
        let mut graph: StateGraph<Tally> = StateGraph::new();
        graph.add_step("a", Visit("a")).set_entry("a").add_edge("a", "ghost");
        assert_eq!(
            graph.compile().err(),
            Some(CompilationError::UnknownTarget {
                from: "a".into(),
                to: "ghost".into()
            })
        );
    }

    #[test]
    fn compile_rejects_unknown_source() {
        let mut graph: StateGraph<Tally> = StateGraph::new();
        graph
            .add_step("a", Visit("a"))
            .set_entry("a")
            .add_edge("a", END)
            .add_edge("ghost", END);
        assert_eq!(
            graph.compile().err(),
            Some(CompilationError::StepNotFound("ghost".into()))
        );
    }

    #[test]
    fn compile_rejects_edge_count_violations() {
        let mut graph: StateGraph<Tally> = StateGraph::new();
        graph
            .add_step("a", Visit("a"))
            .add_step("b", Visit("b"))
            .set_entry("a")
            .add_edge("a", END);
        assert_eq!(
            graph.compile().err(),
            Some(CompilationError::MissingEdge("b".into()))
        );

        let mut graph: StateGraph<Tally> = StateGraph::new();
        graph
            .add_step("a", Visit("a"))
            .set_entry("a")
            .add_edge("a", END)
            .add_edge("a", END);
        assert_eq!(
            graph.compile().err(),
            Some(CompilationError::DuplicateEdge("a".into()))
        );
    }

    #[test]
    fn compile_rejects_cycles() {
        let mut graph: StateGraph<Tally> = StateGraph::new();
        graph
            .add_step("a", Visit("a"))
            .add_step("b", Visit("b"))
            .set_entry("a")
            .add_edge("a", "b")
            .add_conditional_edges("b", |_: &Tally| "loop", [("loop", "a"), ("done", END)]);
        assert!(matches!(graph.compile().err(), Some(CompilationError::Cycle(_))));
    }

    #[test]
    fn compilation_error_maps_to_workflow_error() {
        let err: QuizError = CompilationError::MissingEntry.into();
        assert_eq!(err.kind(), "workflow_error");
    }
}
