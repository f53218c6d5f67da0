//! Transparent following of server-driven pagination.
//!
//! The follower requests page N+1 only after page N has been parsed, and
//! requests it by the exact `next` link the server returned. Pages are
//! appended in arrival order. Any page error ends the loop and the pages
//! gathered so far are dropped, so callers see all pages or none.
//!
//! The loop is an ordinary `async fn`: each continuation is a new iteration
//! on the task that awaits it, never a nested call inside the transport's
//! completion. Callers put that task on the background runtime (see
//! `completion::run_detached` and the chunk coordinator).

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::error::QueryError;
use crate::executor::QueryExecutor;
use crate::http::Transport;
use crate::parser::EmbeddedPagedArray;
use crate::query::Query;

pub struct Paginator<T> {
    executor: Arc<QueryExecutor<T>>,
    max_pages: Option<usize>,
}

impl<T> Clone for Paginator<T> {
    fn clone(&self) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
            max_pages: self.max_pages,
        }
    }
}

impl<T: Transport> Paginator<T> {
    pub fn new(executor: Arc<QueryExecutor<T>>) -> Self {
        Self {
            executor,
            max_pages: None,
        }
    }

    /// Refuse to follow more than `max_pages` pages for one query.
    pub fn with_max_pages(mut self, max_pages: Option<usize>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Fetch `first` and every page linked from it, concatenated in order.
    pub async fn follow_all<R>(&self, first: Query, resource: &str) -> Result<Vec<R>, QueryError>
    where
        R: DeserializeOwned + Send,
    {
        let shape = EmbeddedPagedArray::<R>::new(resource);
        let mut accumulated = Vec::new();
        let mut query = first;
        let mut pages = 0usize;

        loop {
            let page = self.executor.execute(&query, &shape).await?;
            pages += 1;
            accumulated.extend(page.items);

            let Some(next) = page.next else {
                tracing::debug!(resource, pages, items = accumulated.len(), "pagination complete");
                return Ok(accumulated);
            };

            if self.max_pages.is_some_and(|max| pages >= max) {
                tracing::error!(resource, pages, "pagination exceeded page limit");
                return Err(QueryError::Submission(format!(
                    "{resource}: more than {pages} pages"
                )));
            }
            query = Query::link(next);
        }
    }
}
