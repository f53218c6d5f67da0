//! Async query client for the blockchain database REST API.
//!
//! # Overview
//! Builds requests against the database, dispatches them through a
//! pluggable `Transport`, and decodes the three body shapes the API uses:
//! a bare object, an embedded array, and an embedded paged array. Paged
//! listings are followed to the last page, and address-filtered listings
//! are split into fixed-size chunks that run concurrently and merge into one
//! result.
//!
//! # Design
//! - `QueryExecutor` turns one `Query` into one outcome: data or exactly one
//!   `QueryError`.
//! - `Paginator` follows `next` links sequentially; pages are never
//!   reordered.
//! - `ChunkCoordinator` runs chunks as tasks on a caller-supplied runtime
//!   and publishes the first error or the merged result, once.
//! - `BlockchainDb` is the typed surface: `get_transactions`,
//!   `get_transfers`, `get_blocks`, `get_currencies`, `create_transaction`,
//!   their single-resource counterparts, and device subscriptions.
//! - The HTTP client is the host's choice; `ReqwestTransport` is provided.

pub mod chunked;
pub mod client;
pub mod completion;
pub mod config;
pub mod error;
pub mod executor;
pub mod http;
pub mod paging;
pub mod parser;
pub mod query;
pub mod transport;
pub mod types;

pub use chunked::{partition, Chunk, ChunkCoordinator, CoordinatorState, ErrorPolicy};
pub use client::BlockchainDb;
pub use completion::{dispatch, run_detached, CompletionHandler};
pub use config::{ClientConfig, ConfigError};
pub use error::{QueryError, QueryResult};
pub use executor::QueryExecutor;
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError};
pub use paging::Paginator;
pub use parser::{Empty, EmbeddedArray, EmbeddedPagedArray, Page, ResponseShape, RootObject};
pub use query::{Query, Target};
pub use transport::ReqwestTransport;
pub use types::{
    Amount, Block, Blockchain, BlockchainFee, BlocksRequest, Currency, CurrencyDenomination,
    NewSubscription, NewTransaction, Subscription, SubscriptionCurrency, SubscriptionEndpoint,
    SubscriptionEvent, Transaction, TransactionsRequest, Transfer, TransfersRequest,
};
