//! Immutable description of one request against the blockchain database.
//!
//! A `Query` names either a resource path plus query parameters, or a
//! server-supplied link that must be followed verbatim (paging). Bodies are
//! serialized when the query is built, so a payload that cannot be encoded
//! never reaches the transport.

use serde::Serialize;

use crate::error::QueryError;
use crate::http::HttpMethod;

/// Where a query points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Path segments appended to the base URL, plus multi-valued parameters
    /// in insertion order.
    Path {
        segments: Vec<String>,
        params: Vec<(String, String)>,
    },
    /// A locator handed out by the server, e.g. a `next` page href.
    Link(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    method: HttpMethod,
    target: Target,
    body: Option<String>,
}

impl Query {
    fn path(method: HttpMethod, resource: &str) -> Self {
        Self {
            method,
            target: Target::Path {
                segments: vec![resource.to_string()],
                params: Vec::new(),
            },
            body: None,
        }
    }

    pub fn get(resource: &str) -> Self {
        Self::path(HttpMethod::Get, resource)
    }

    pub fn delete(resource: &str) -> Self {
        Self::path(HttpMethod::Delete, resource)
    }

    /// GET for a link returned by the server.
    pub fn link(href: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            target: Target::Link(href.into()),
            body: None,
        }
    }

    pub fn post_json<B: Serialize>(resource: &str, body: &B) -> Result<Self, QueryError> {
        Self::path(HttpMethod::Post, resource).json_body(body)
    }

    pub fn put_json<B: Serialize>(resource: &str, body: &B) -> Result<Self, QueryError> {
        Self::path(HttpMethod::Put, resource).json_body(body)
    }

    fn json_body<B: Serialize>(mut self, body: &B) -> Result<Self, QueryError> {
        let encoded =
            serde_json::to_string(body).map_err(|e| QueryError::Submission(e.to_string()))?;
        self.body = Some(encoded);
        Ok(self)
    }

    /// Append a path segment. No-op for link targets.
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        if let Target::Path { segments, .. } = &mut self.target {
            segments.push(segment.into());
        }
        self
    }

    /// Append a query parameter. No-op for link targets.
    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        if let Target::Path { params, .. } = &mut self.target {
            params.push((key.to_string(), value.to_string()));
        }
        self
    }

    pub fn param_opt<V: ToString>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.param(key, v),
            None => self,
        }
    }

    /// Append `key=value` once per value.
    pub fn params<I, V>(self, key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        values.into_iter().fold(self, |q, v| q.param(key, v))
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// All values recorded for `key`, in insertion order.
    pub fn param_values(&self, key: &str) -> Vec<&str> {
        match &self.target {
            Target::Path { params, .. } => params
                .iter()
                .filter(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
                .collect(),
            Target::Link(_) => Vec::new(),
        }
    }
}
