//! Background execution and the callback-style completion surface.
//!
//! # Design
//! All network-bound work runs on a caller-supplied tokio runtime (the
//! "background executor"). `run_detached` hosts a future there and awaits
//! it; `dispatch` hosts it there and reports through a completion handler
//! instead. Both turn a panicking or cancelled task into
//! `QueryError::Submission`, so a handler is invoked exactly once even when
//! the work itself faults.

use std::future::Future;

use tokio::runtime::Handle;
use tokio::task::JoinError;

use crate::error::QueryError;

/// Receives the single outcome of one query.
pub trait CompletionHandler<T>: Send + 'static {
    fn handle(self, result: Result<T, QueryError>);
}

impl<T, F> CompletionHandler<T> for F
where
    F: FnOnce(Result<T, QueryError>) + Send + 'static,
{
    fn handle(self, result: Result<T, QueryError>) {
        self(result)
    }
}

/// Run `work` on `runtime` and await its outcome.
pub async fn run_detached<T, F>(runtime: &Handle, work: F) -> Result<T, QueryError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, QueryError>> + Send + 'static,
{
    runtime.spawn(work).await.unwrap_or_else(|e| Err(join_failure(e)))
}

/// Run `work` on `runtime` and hand its outcome to `handler`.
pub fn dispatch<T, F, H>(runtime: &Handle, work: F, handler: H)
where
    T: Send + 'static,
    F: Future<Output = Result<T, QueryError>> + Send + 'static,
    H: CompletionHandler<T>,
{
    let task = runtime.spawn(work);
    runtime.spawn(async move {
        let result = task.await.unwrap_or_else(|e| Err(join_failure(e)));
        handler.handle(result);
    });
}

pub(crate) fn join_failure(err: JoinError) -> QueryError {
    if err.is_panic() {
        tracing::error!("query task panicked");
        QueryError::Submission("internal fault while handling query".to_string())
    } else {
        QueryError::Submission("query task was cancelled".to_string())
    }
}
