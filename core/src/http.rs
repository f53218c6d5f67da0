//! HTTP types and the transport seam.
//!
//! # Design
//! Requests and responses are plain data. The executor builds an
//! `HttpRequest`, hands it to a `Transport`, and interprets the returned
//! `HttpResponse` itself, so status handling never depends on which HTTP
//! client the host plugs in. Transports only report a `TransportError` when
//! no HTTP exchange completed at all.

use std::future::Future;

use thiserror::Error;

pub const ACCEPT_JSON: &str = "application/json";
pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Status codes treated as success for this method. Anything else is
    /// reported as `QueryError::Response`.
    pub fn accepted_statuses(self) -> &'static [u16] {
        match self {
            HttpMethod::Get => &[200],
            HttpMethod::Post => &[200, 201, 202],
            HttpMethod::Put => &[200, 201],
            HttpMethod::Delete => &[200, 204],
        }
    }

    pub fn accepts(self, status: u16) -> bool {
        self.accepted_statuses().contains(&status)
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// An HTTP response described as plain data. `body` is `None` when the
/// server sent nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpResponse {
    pub fn new(status: u16, body: Option<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body,
        }
    }

    pub fn json(status: u16, body: &str) -> Self {
        Self::new(status, Some(body.as_bytes().to_vec()))
    }
}

/// The exchange never completed: DNS, connect, TLS, timeout, reset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport failure: {0}")]
pub struct TransportError(pub String);

/// Issues one HTTP request and resolves with the response or a failure.
///
/// Implementations must be shareable across threads; the chunk coordinator
/// drives many requests through one transport concurrently.
pub trait Transport: Send + Sync + 'static {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_accepts_only_200() {
        assert!(HttpMethod::Get.accepts(200));
        assert!(!HttpMethod::Get.accepts(201));
        assert!(!HttpMethod::Get.accepts(204));
    }

    #[test]
    fn post_accepts_created_and_accepted() {
        for status in [200, 201, 202] {
            assert!(HttpMethod::Post.accepts(status), "{status}");
        }
        assert!(!HttpMethod::Post.accepts(204));
    }

    #[test]
    fn delete_accepts_no_content() {
        assert!(HttpMethod::Delete.accepts(204));
        assert!(!HttpMethod::Delete.accepts(201));
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = HttpRequest {
            method: HttpMethod::Get,
            url: "http://localhost/".to_string(),
            headers: vec![("Accept".to_string(), ACCEPT_JSON.to_string())],
            body: None,
        };
        assert_eq!(req.header("accept"), Some(ACCEPT_JSON));
        assert_eq!(req.header("content-type"), None);
    }
}
