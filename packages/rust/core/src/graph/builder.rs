//! Mutable graph builder.

use std::collections::HashMap;
use std::sync::Arc;

use super::END;
use super::compiled::CompiledGraph;
use super::error::CompilationError;
use super::step::Step;

/// Picks a branch label from the state after a step completes.
pub type Router<S> = Arc<dyn Fn(&S) -> &'static str + Send + Sync>;

/// Outgoing edge of one step.
pub(super) enum Edge<S> {
    Direct(String),
    Conditional {
        router: Router<S>,
        branches: HashMap<String, String>,
    },
}

impl<S> Edge<S> {
    fn targets(&self) -> Vec<&str> {
        match self {
            Edge::Direct(to) => vec![to.as_str()],
            Edge::Conditional { branches, .. } => branches.values().map(String::as_str).collect(),
        }
    }
}

/// Graph under construction. Register steps and edges, then [`compile`](Self::compile).
pub struct StateGraph<S> {
    steps: HashMap<String, Arc<dyn Step<S>>>,
    /// Registration order, for deterministic validation.
    order: Vec<String>,
    edges: HashMap<String, Edge<S>>,
    duplicate_edges: Vec<String>,
    entry: Option<String>,
}

impl<S> Default for StateGraph<S>
where
    S: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> StateGraph<S>
where
    S: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            steps: HashMap::new(),
            order: Vec::new(),
            edges: HashMap::new(),
            duplicate_edges: Vec::new(),
            entry: None,
        }
    }

    /// Register a step under `name`. Replaces a step registered with the same name.
    pub fn add_step(&mut self, name: impl Into<String>, step: impl Step<S> + 'static) -> &mut Self {
        let name = name.into();
        if self.steps.insert(name.clone(), Arc::new(step)).is_none() {
            self.order.push(name);
        }
        self
    }

    /// Add a straight edge `from -> to`. `to` may be [`END`].
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.insert_edge(from.into(), Edge::Direct(to.into()));
        self
    }

    /// Add a conditional edge: after `from`, `router` picks a label that
    /// `branches` maps to the next step (or [`END`]).
    pub fn add_conditional_edges<F, I>(
        &mut self,
        from: impl Into<String>,
        router: F,
        branches: I,
    ) -> &mut Self
    where
        F: Fn(&S) -> &'static str + Send + Sync + 'static,
        I: IntoIterator<Item = (&'static str, &'static str)>,
    {
        let branches = branches
            .into_iter()
            .map(|(label, to)| (label.to_string(), to.to_string()))
            .collect();
        self.insert_edge(
            from.into(),
            Edge::Conditional {
                router: Arc::new(router),
                branches,
            },
        );
        self
    }

    /// Set the step the run starts at.
    pub fn set_entry(&mut self, name: impl Into<String>) -> &mut Self {
        self.entry = Some(name.into());
        self
    }

    fn insert_edge(&mut self, from: String, edge: Edge<S>) {
        if self.edges.contains_key(&from) {
            self.duplicate_edges.push(from);
        } else {
            self.edges.insert(from, edge);
        }
    }

    /// Validate the graph and freeze it.
    ///
    /// Checks that the entry exists, every edge source and target is a
    /// registered step (or [`END`]), every step has exactly one outgoing
    /// edge, and there are no cycles.
    pub fn compile(self) -> Result<CompiledGraph<S>, CompilationError> {
        let entry = self.entry.clone().ok_or(CompilationError::MissingEntry)?;
        if !self.steps.contains_key(&entry) {
            return Err(CompilationError::StepNotFound(entry));
        }

        if let Some(name) = self.duplicate_edges.first() {
            return Err(CompilationError::DuplicateEdge(name.clone()));
        }

        let mut sources: Vec<&String> = self.edges.keys().collect();
        sources.sort();
        for from in sources {
            if !self.steps.contains_key(from) {
                return Err(CompilationError::StepNotFound(from.clone()));
            }
            let mut targets = self.edges[from].targets();
            targets.sort_unstable();
            for to in targets {
                if to != END && !self.steps.contains_key(to) {
                    return Err(CompilationError::UnknownTarget {
                        from: from.clone(),
                        to: to.to_string(),
                    });
                }
            }
        }

        for name in &self.order {
            if !self.edges.contains_key(name) {
                return Err(CompilationError::MissingEdge(name.clone()));
            }
        }

        self.check_acyclic()?;

        Ok(CompiledGraph {
            steps: self.steps,
            edges: self.edges,
            entry,
        })
    }

    fn check_acyclic(&self) -> Result<(), CompilationError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        fn visit<S>(
            name: &str,
            edges: &HashMap<String, Edge<S>>,
            marks: &mut HashMap<String, Mark>,
        ) -> Result<(), CompilationError> {
            match marks.get(name).copied().unwrap_or(Mark::Unvisited) {
                Mark::Done => return Ok(()),
                Mark::InProgress => return Err(CompilationError::Cycle(name.to_string())),
                Mark::Unvisited => {}
            }
            marks.insert(name.to_string(), Mark::InProgress);
            if let Some(edge) = edges.get(name) {
                for to in edge.targets() {
                    if to != END {
                        visit(to, edges, marks)?;
                    }
                }
            }
            marks.insert(name.to_string(), Mark::Done);
            Ok(())
        }

        let mut marks = HashMap::new();
        for name in &self.order {
            visit(name, &self.edges, &mut marks)?;
        }
        Ok(())
    }
}
