//! `BlockchainDb`: the query surface callers use.
//!
//! # Design
//! Each operation has a pure `build_*_query` method that produces a `Query`,
//! and an `async` method that executes it with the right response shape.
//! Address-filtered listings (transactions, transfers) go through the chunk
//! coordinator so no request carries more than `address_chunk_size`
//! addresses; every chunk follows its own pagination. Block listings are
//! paged but not chunked. All paged work runs on the background runtime
//! supplied at construction.

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::chunked::ChunkCoordinator;
use crate::completion::{dispatch, run_detached, CompletionHandler};
use crate::config::{ClientConfig, ConfigError};
use crate::error::QueryError;
use crate::executor::QueryExecutor;
use crate::http::Transport;
use crate::paging::Paginator;
use crate::parser::{Empty, EmbeddedArray, RootObject};
use crate::query::Query;
use crate::types::{
    Block, Blockchain, BlocksRequest, Currency, NewSubscription, NewTransaction, Subscription,
    Transaction, TransactionsRequest, Transfer, TransfersRequest,
};

const BLOCKCHAINS: &str = "blockchains";
const BLOCKS: &str = "blocks";
const CURRENCIES: &str = "currencies";
const SUBSCRIPTIONS: &str = "subscriptions";
const TRANSACTIONS: &str = "transactions";
const TRANSFERS: &str = "transfers";

pub struct BlockchainDb<T> {
    executor: Arc<QueryExecutor<T>>,
    paginator: Paginator<T>,
    coordinator: ChunkCoordinator,
    runtime: Handle,
    address_chunk_size: usize,
    max_page_size: Option<u32>,
}

impl<T: Transport> BlockchainDb<T> {
    /// Paged and chunked work is spawned on `runtime`.
    pub fn new(config: &ClientConfig, transport: T, runtime: Handle) -> Result<Self, ConfigError> {
        config.validate()?;
        let executor = Arc::new(
            QueryExecutor::new(&config.base_url, transport)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?,
        );
        let paginator = Paginator::new(Arc::clone(&executor)).with_max_pages(config.max_pages);
        Ok(Self {
            executor,
            paginator,
            coordinator: ChunkCoordinator::new(runtime.clone(), config.error_policy),
            runtime,
            address_chunk_size: config.address_chunk_size,
            max_page_size: config.max_page_size,
        })
    }

    pub fn executor(&self) -> &QueryExecutor<T> {
        &self.executor
    }

    pub fn address_chunk_size(&self) -> usize {
        self.address_chunk_size
    }

    // Blockchains

    pub fn build_blockchains_query(&self, is_mainnet: bool) -> Query {
        Query::get(BLOCKCHAINS).param("testnet", !is_mainnet)
    }

    pub fn build_blockchain_query(&self, id: &str) -> Query {
        Query::get(BLOCKCHAINS).segment(id)
    }

    pub async fn get_blockchains(&self, is_mainnet: bool) -> Result<Vec<Blockchain>, QueryError> {
        let query = self.build_blockchains_query(is_mainnet);
        self.executor
            .execute(&query, &EmbeddedArray::<Blockchain>::new(BLOCKCHAINS))
            .await
    }

    pub async fn get_blockchain(&self, id: &str) -> Result<Blockchain, QueryError> {
        let query = self.build_blockchain_query(id);
        self.executor.execute(&query, &RootObject::<Blockchain>::new()).await
    }

    // Currencies

    pub fn build_currencies_query(&self, chain_id: Option<&str>) -> Query {
        Query::get(CURRENCIES).param_opt("blockchain_id", chain_id)
    }

    pub fn build_currency_query(&self, id: &str) -> Query {
        Query::get(CURRENCIES).segment(id)
    }

    /// All currencies, or only those on `chain_id`.
    pub async fn get_currencies(&self, chain_id: Option<&str>) -> Result<Vec<Currency>, QueryError> {
        let query = self.build_currencies_query(chain_id);
        self.executor
            .execute(&query, &EmbeddedArray::<Currency>::new(CURRENCIES))
            .await
    }

    pub async fn get_currency(&self, id: &str) -> Result<Currency, QueryError> {
        let query = self.build_currency_query(id);
        self.executor.execute(&query, &RootObject::<Currency>::new()).await
    }

    // Subscriptions

    pub fn build_subscriptions_query(&self) -> Query {
        Query::get(SUBSCRIPTIONS)
    }

    pub fn build_subscription_query(&self, id: &str) -> Query {
        Query::get(SUBSCRIPTIONS).segment(id)
    }

    pub fn build_create_subscription_query(
        &self,
        subscription: &NewSubscription,
    ) -> Result<Query, QueryError> {
        Query::post_json(SUBSCRIPTIONS, subscription)
    }

    pub fn build_update_subscription_query(
        &self,
        subscription: &Subscription,
    ) -> Result<Query, QueryError> {
        Ok(Query::put_json(SUBSCRIPTIONS, subscription)?.segment(subscription.id.as_str()))
    }

    pub fn build_delete_subscription_query(&self, id: &str) -> Query {
        Query::delete(SUBSCRIPTIONS).segment(id)
    }

    pub async fn get_subscriptions(&self) -> Result<Vec<Subscription>, QueryError> {
        let query = self.build_subscriptions_query();
        self.executor
            .execute(&query, &EmbeddedArray::<Subscription>::new(SUBSCRIPTIONS))
            .await
    }

    pub async fn get_subscription(&self, id: &str) -> Result<Subscription, QueryError> {
        let query = self.build_subscription_query(id);
        self.executor.execute(&query, &RootObject::<Subscription>::new()).await
    }

    /// Register a device; the returned subscription carries the server's id.
    pub async fn create_subscription(
        &self,
        subscription: &NewSubscription,
    ) -> Result<Subscription, QueryError> {
        let query = self.build_create_subscription_query(subscription)?;
        self.executor.execute(&query, &RootObject::<Subscription>::new()).await
    }

    pub async fn update_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<Subscription, QueryError> {
        let query = self.build_update_subscription_query(subscription)?;
        self.executor.execute(&query, &RootObject::<Subscription>::new()).await
    }

    pub async fn delete_subscription(&self, id: &str) -> Result<(), QueryError> {
        let query = self.build_delete_subscription_query(id);
        self.executor.execute(&query, &Empty).await
    }

    /// Fetch `subscription` by id, creating it from its contents when the
    /// server answers 404. Other failures are returned as-is.
    pub async fn get_or_create_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<Subscription, QueryError> {
        match self.get_subscription(&subscription.id).await {
            Err(QueryError::Response { status: 404 }) => {
                tracing::debug!(id = %subscription.id, "subscription missing, creating");
                self.create_subscription(&NewSubscription::from(subscription))
                    .await
            }
            outcome => outcome,
        }
    }

    // Blocks

    pub fn build_blocks_query(&self, request: &BlocksRequest) -> Query {
        Query::get(BLOCKS)
            .param("blockchain_id", &request.chain_id)
            .param("include_raw", request.include_raw)
            .param("include_tx", request.include_tx)
            .param("include_tx_raw", request.include_tx_raw)
            .param("include_tx_proof", request.include_tx_proof)
            .param("start_height", request.begin_height)
            .param("end_height", request.end_height)
            .param_opt("max_page_size", request.max_page_size.or(self.max_page_size))
    }

    pub fn build_block_query(
        &self,
        id: &str,
        include_raw: bool,
        include_tx: bool,
        include_tx_raw: bool,
        include_tx_proof: bool,
    ) -> Query {
        Query::get(BLOCKS)
            .segment(id)
            .param("include_raw", include_raw)
            .param("include_tx", include_tx)
            .param("include_tx_raw", include_tx_raw)
            .param("include_tx_proof", include_tx_proof)
    }

    /// Every block in `[begin_height, end_height)`, across all pages.
    pub async fn get_blocks(&self, request: &BlocksRequest) -> Result<Vec<Block>, QueryError> {
        let query = self.build_blocks_query(request);
        let paginator = self.paginator.clone();
        run_detached(&self.runtime, async move {
            paginator.follow_all::<Block>(query, BLOCKS).await
        })
        .await
    }

    pub async fn get_block(
        &self,
        id: &str,
        include_raw: bool,
        include_tx: bool,
        include_tx_raw: bool,
        include_tx_proof: bool,
    ) -> Result<Block, QueryError> {
        let query =
            self.build_block_query(id, include_raw, include_tx, include_tx_raw, include_tx_proof);
        self.executor.execute(&query, &RootObject::<Block>::new()).await
    }

    // Transfers

    /// Query for one chunk of `request.addresses`.
    pub fn build_transfers_query(&self, request: &TransfersRequest, addresses: &[String]) -> Query {
        Query::get(TRANSFERS)
            .param("blockchain_id", &request.chain_id)
            .param("start_height", request.begin_height)
            .param("end_height", request.end_height)
            .param_opt("max_page_size", request.max_page_size.or(self.max_page_size))
            .params("address", addresses)
    }

    pub fn build_transfer_query(&self, id: &str) -> Query {
        Query::get(TRANSFERS).segment(id)
    }

    /// Transfers touching any of `request.addresses`. An empty address list
    /// resolves to an empty list without contacting the server.
    pub async fn get_transfers(&self, request: &TransfersRequest) -> Result<Vec<Transfer>, QueryError> {
        self.coordinator
            .run(&request.addresses, self.address_chunk_size, |chunk| {
                let query = self.build_transfers_query(request, &chunk.items);
                let paginator = self.paginator.clone();
                async move { paginator.follow_all::<Transfer>(query, TRANSFERS).await }
            })
            .await
    }

    pub async fn get_transfer(&self, id: &str) -> Result<Transfer, QueryError> {
        let query = self.build_transfer_query(id);
        self.executor.execute(&query, &RootObject::<Transfer>::new()).await
    }

    // Transactions

    /// Query for one chunk of `request.addresses`.
    pub fn build_transactions_query(
        &self,
        request: &TransactionsRequest,
        addresses: &[String],
    ) -> Query {
        Query::get(TRANSACTIONS)
            .param("blockchain_id", &request.chain_id)
            .param("include_proof", request.include_proof)
            .param("include_raw", request.include_raw)
            .param_opt("start_height", request.begin_height)
            .param_opt("end_height", request.end_height)
            .param_opt("max_page_size", request.max_page_size.or(self.max_page_size))
            .params("address", addresses)
    }

    pub fn build_transaction_query(&self, id: &str, include_raw: bool, include_proof: bool) -> Query {
        Query::get(TRANSACTIONS)
            .segment(id)
            .param("include_proof", include_proof)
            .param("include_raw", include_raw)
    }

    pub fn build_create_transaction_query(
        &self,
        chain_id: &str,
        tx_hash_hex: &str,
        raw: &[u8],
    ) -> Result<Query, QueryError> {
        Query::post_json(TRANSACTIONS, &NewTransaction::new(chain_id, tx_hash_hex, raw))
    }

    /// Transactions touching any of `request.addresses`. An empty address
    /// list resolves to an empty list without contacting the server.
    pub async fn get_transactions(
        &self,
        request: &TransactionsRequest,
    ) -> Result<Vec<Transaction>, QueryError> {
        self.coordinator
            .run(&request.addresses, self.address_chunk_size, |chunk| {
                let query = self.build_transactions_query(request, &chunk.items);
                let paginator = self.paginator.clone();
                async move { paginator.follow_all::<Transaction>(query, TRANSACTIONS).await }
            })
            .await
    }

    pub async fn get_transaction(
        &self,
        id: &str,
        include_raw: bool,
        include_proof: bool,
    ) -> Result<Transaction, QueryError> {
        let query = self.build_transaction_query(id, include_raw, include_proof);
        self.executor.execute(&query, &RootObject::<Transaction>::new()).await
    }

    /// Submit a signed transaction. `raw` is sent base64-encoded.
    pub async fn create_transaction(
        &self,
        chain_id: &str,
        tx_hash_hex: &str,
        raw: &[u8],
    ) -> Result<(), QueryError> {
        let query = self.build_create_transaction_query(chain_id, tx_hash_hex, raw)?;
        self.executor.execute(&query, &Empty).await
    }
}

impl<T: Transport> BlockchainDb<T> {
    /// Callback form of `get_transfers`: `handler` runs exactly once.
    pub fn get_transfers_with<H>(self: &Arc<Self>, request: TransfersRequest, handler: H)
    where
        H: CompletionHandler<Vec<Transfer>>,
    {
        let db = Arc::clone(self);
        dispatch(
            &self.runtime,
            async move { db.get_transfers(&request).await },
            handler,
        );
    }

    /// Callback form of `get_transactions`: `handler` runs exactly once.
    pub fn get_transactions_with<H>(self: &Arc<Self>, request: TransactionsRequest, handler: H)
    where
        H: CompletionHandler<Vec<Transaction>>,
    {
        let db = Arc::clone(self);
        dispatch(
            &self.runtime,
            async move { db.get_transactions(&request).await },
            handler,
        );
    }
}
