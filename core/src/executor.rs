//! Query execution: URL building, dispatch, status mapping, parsing.
//!
//! # Design
//! `QueryExecutor` owns a validated base URL and a transport. Building the
//! `HttpRequest` is synchronous and pure, so URL problems surface before
//! anything is sent. Executing resolves exactly once with either the parsed
//! value or one `QueryError`:
//!
//! - transport failure -> `Submission`
//! - status outside the method's accepted set -> `Response { status }`
//! - accepted status, no body, shape needs one -> `NoData`
//! - otherwise the shape's parse result
//!
//! A panic while parsing is caught and reported as `Submission`.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::Instrument;
use url::Url;
use uuid::Uuid;

use crate::error::QueryError;
use crate::http::{HttpRequest, Transport, ACCEPT_JSON, CONTENT_TYPE_JSON};
use crate::parser::ResponseShape;
use crate::query::{Query, Target};

#[derive(Debug)]
pub struct QueryExecutor<T> {
    base_url: Url,
    transport: T,
}

impl<T: Transport> QueryExecutor<T> {
    /// Fails with `QueryError::Url` when `base_url` cannot anchor paths.
    pub fn new(base_url: &str, transport: T) -> Result<Self, QueryError> {
        let base_url = parse_base_url(base_url)?;
        Ok(Self {
            base_url,
            transport,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn build_request(&self, query: &Query) -> Result<HttpRequest, QueryError> {
        let url = match query.target() {
            Target::Path { segments, params } => {
                let mut url = self.base_url.clone();
                {
                    let mut path = url
                        .path_segments_mut()
                        .map_err(|()| QueryError::Url(format!("{} cannot be a base", self.base_url)))?;
                    path.pop_if_empty().extend(segments);
                }
                if !params.is_empty() {
                    url.query_pairs_mut()
                        .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                }
                url
            }
            // Absolute links replace the base; relative ones resolve against it.
            Target::Link(href) => self
                .base_url
                .join(href)
                .map_err(|e| QueryError::Url(format!("invalid link {href}: {e}")))?,
        };

        let mut headers = vec![("accept".to_string(), ACCEPT_JSON.to_string())];
        if query.body().is_some() {
            headers.push(("content-type".to_string(), CONTENT_TYPE_JSON.to_string()));
        }

        Ok(HttpRequest {
            method: query.method(),
            url: url.into(),
            headers,
            body: query.body().map(str::to_string),
        })
    }

    pub async fn execute<S: ResponseShape>(
        &self,
        query: &Query,
        shape: &S,
    ) -> Result<S::Output, QueryError> {
        let request = self.build_request(query)?;
        let span = tracing::debug_span!(
            "query",
            id = %Uuid::new_v4(),
            method = request.method.as_str(),
            url = %request.url,
        );
        self.send(request, shape).instrument(span).await
    }

    async fn send<S: ResponseShape>(
        &self,
        request: HttpRequest,
        shape: &S,
    ) -> Result<S::Output, QueryError> {
        let method = request.method;
        tracing::debug!(has_body = request.body.is_some(), "sending request");

        let response = match self.transport.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "send request failed");
                return Err(QueryError::Submission(e.0));
            }
        };

        if !method.accepts(response.status) {
            tracing::error!(status = response.status, "response failed with status");
            return Err(QueryError::Response {
                status: response.status,
            });
        }

        let body = match response.body {
            Some(body) => body,
            None if !shape.requires_body() => Vec::new(),
            None => {
                tracing::error!(status = response.status, "response failed with no body");
                return Err(QueryError::NoData);
            }
        };

        let parsed = catch_unwind(AssertUnwindSafe(|| shape.parse(&body))).unwrap_or_else(|_| {
            Err(QueryError::Submission(
                "internal fault while handling response".to_string(),
            ))
        });
        if let Err(e) = &parsed {
            tracing::error!(error = %e, "response failed parsing");
        }
        parsed
    }
}

fn parse_base_url(base_url: &str) -> Result<Url, QueryError> {
    let url = Url::parse(base_url)
        .map_err(|e| QueryError::Url(format!("invalid base URL {base_url}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(QueryError::Url(format!("{base_url} cannot be a base URL")));
    }
    Ok(url)
}
