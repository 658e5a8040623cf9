use async_trait::async_trait;
use chapterquiz_shared::Result;

/// One named unit of work in a graph: state in, new state out.
///
/// Steps read the incoming state and return a derived copy; they never
/// mutate their input. Failures are returned as typed errors and stop the run.
#[async_trait]
pub trait Step<S>: Send + Sync
where
    S: Send + Sync + 'static,
{
    async fn run(&self, state: &S) -> Result<S>;
}
