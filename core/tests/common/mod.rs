//! Shared fixtures for the integration tests: a mock server on a random port,
//! a ureq-backed transport, and a request-counting wrapper.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use blockchaindb_core::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError};
use mock_server::{Db, Store};
use tokio::sync::RwLock;

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness; `RUST_LOG` filters it.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "blockchaindb_core=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Start the mock server over `store` on its own thread and runtime.
pub fn spawn_server(store: Store) -> (SocketAddr, Db) {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();
    let db: Db = Arc::new(RwLock::new(store));
    let served = Arc::clone(&db);

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run_with(listener, served).await
        })
        .unwrap();
    });

    (addr, db)
}

/// Blocking ureq client, driven from the blocking pool.
///
/// Status codes are returned as data so the executor interprets them.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl Default for UreqTransport {
    fn default() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

fn call(agent: &ureq::Agent, req: HttpRequest) -> Result<HttpResponse, ureq::Error> {
    let mut response = match (req.method, req.body) {
        (HttpMethod::Get, _) => agent.get(&req.url).call(),
        (HttpMethod::Delete, _) => agent.delete(&req.url).call(),
        (HttpMethod::Post, Some(body)) => agent
            .post(&req.url)
            .content_type("application/json")
            .send(body.as_bytes()),
        (HttpMethod::Post, None) => agent.post(&req.url).send_empty(),
        (HttpMethod::Put, Some(body)) => agent
            .put(&req.url)
            .content_type("application/json")
            .send(body.as_bytes()),
        (HttpMethod::Put, None) => agent.put(&req.url).send_empty(),
    }?;

    let status = response.status().as_u16();
    let body = response.body_mut().read_to_vec()?;
    Ok(HttpResponse::new(status, (!body.is_empty()).then_some(body)))
}

impl Transport for UreqTransport {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send {
        let agent = self.agent.clone();
        async move {
            tokio::task::spawn_blocking(move || call(&agent, request))
                .await
                .map_err(|e| TransportError(e.to_string()))?
                .map_err(|e| TransportError(e.to_string()))
        }
    }
}

/// Counts requests passed through to the wrapped transport.
pub struct Counting<T> {
    inner: T,
    sent: Arc<AtomicUsize>,
}

impl<T> Counting<T> {
    pub fn new(inner: T) -> (Self, Arc<AtomicUsize>) {
        let sent = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                sent: Arc::clone(&sent),
            },
            sent,
        )
    }
}

impl<T: Transport> Transport for Counting<T> {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send {
        self.sent.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(request)
    }
}

/// Answers every request with a clone of one canned response.
pub struct Canned(pub HttpResponse);

impl Transport for Canned {
    fn execute(
        &self,
        _request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send {
        let response = self.0.clone();
        async move { Ok(response) }
    }
}

/// `count` distinct addresses sharing `prefix`.
pub fn addresses(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{prefix}{i:03}")).collect()
}
