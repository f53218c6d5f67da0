//! `Transport` backed by `reqwest`.
//!
//! HTTP error statuses come back as ordinary `HttpResponse`s; only failures
//! where no exchange completed (connect, TLS, timeout, reset while reading)
//! become `TransportError`. An empty body is reported as no body.

use std::future::Future;

use crate::config::ClientConfig;
use crate::error::QueryError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError};

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    bearer_token: Option<String>,
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::with_client(reqwest::Client::new())
    }
}

impl ReqwestTransport {
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            bearer_token: None,
        }
    }

    /// Build a client honouring the configured timeout and bearer token.
    pub fn from_config(config: &ClientConfig) -> Result<Self, QueryError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| QueryError::Submission(format!("failed to build HTTP client: {e}")))?;
        let transport = Self::with_client(client);
        Ok(match &config.bearer_token {
            Some(token) => transport.with_bearer_token(token),
            None => transport,
        })
    }

    pub fn with_bearer_token(mut self, token: &str) -> Self {
        self.bearer_token = Some(token.to_string());
        self
    }
}

fn to_reqwest(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

impl Transport for ReqwestTransport {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send {
        let client = self.client.clone();
        let bearer_token = self.bearer_token.clone();
        async move {
            let mut builder = client.request(to_reqwest(request.method), request.url.as_str());
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(token) = bearer_token {
                builder = builder.bearer_auth(token);
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| TransportError(e.to_string()))?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let bytes = response
                .bytes()
                .await
                .map_err(|e| TransportError(e.to_string()))?;

            Ok(HttpResponse {
                status,
                headers,
                body: (!bytes.is_empty()).then(|| bytes.to_vec()),
            })
        }
    }
}
