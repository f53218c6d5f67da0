use std::sync::Arc;

use axum::{
    extract::{Path, RawQuery, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use url::form_urlencoded;

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Any queried address with this prefix makes the request fail with 500.
pub const FAILING_ADDRESS_PREFIX: &str = "fail-";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Amount {
    pub amount: String,
    pub currency_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transfer {
    pub transfer_id: String,
    pub blockchain_id: String,
    pub index: u64,
    pub amount: Amount,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub transaction_id: Option<String>,
    pub acknowledgements: Option<u64>,
    #[serde(skip)]
    pub block_height: u64,
}

impl Transfer {
    fn touches(&self, addresses: &[String]) -> bool {
        addresses.iter().any(|a| {
            self.from_address.as_deref() == Some(a) || self.to_address.as_deref() == Some(a)
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub blockchain_id: String,
    pub hash: String,
    pub identifier: String,
    pub status: String,
    pub size: u64,
    pub transfers: Vec<Transfer>,
    pub acknowledgements: u64,
    pub block_height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub block_id: String,
    pub blockchain_id: String,
    pub hash: String,
    pub height: u64,
    pub mined: String,
    pub size: u64,
    pub acknowledgements: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Denomination {
    pub name: String,
    pub short_name: String,
    pub decimals: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Currency {
    pub currency_id: String,
    pub name: String,
    pub code: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub blockchain_id: String,
    pub address: Option<String>,
    pub denominations: Vec<Denomination>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Blockchain {
    pub id: String,
    pub name: String,
    pub network: String,
    pub is_mainnet: bool,
    pub native_currency_id: String,
    pub block_height: u64,
    pub fee_estimates: Vec<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewTransaction {
    pub blockchain_id: String,
    pub transaction_id: String,
    pub data: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub subscription_id: String,
    pub device_id: String,
    pub endpoint: Value,
    #[serde(default)]
    pub currencies: Vec<Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewSubscription {
    pub device_id: String,
    pub endpoint: Value,
    #[serde(default)]
    pub currencies: Vec<Value>,
}

/// In-memory contents of the database.
#[derive(Clone, Debug, Default)]
pub struct Store {
    pub blockchains: Vec<Blockchain>,
    pub currencies: Vec<Currency>,
    pub blocks: Vec<Block>,
    pub transactions: Vec<Transaction>,
    pub transfers: Vec<Transfer>,
    pub submitted: Vec<NewTransaction>,
    pub subscriptions: Vec<Subscription>,
    next_subscription: u64,
}

impl Store {
    /// A small bitcoin-mainnet fixture: one chain, its currency, blocks
    /// 100..150, and a few transfers for two addresses.
    pub fn seeded() -> Self {
        let mut store = Store::default();
        store.blockchains.push(Blockchain {
            id: "bitcoin-mainnet".to_string(),
            name: "Bitcoin".to_string(),
            network: "mainnet".to_string(),
            is_mainnet: true,
            native_currency_id: "bitcoin-mainnet:__native__".to_string(),
            block_height: 150,
            fee_estimates: Vec::new(),
        });
        store.blockchains.push(Blockchain {
            id: "bitcoin-testnet".to_string(),
            name: "Bitcoin Test".to_string(),
            network: "testnet".to_string(),
            is_mainnet: false,
            native_currency_id: "bitcoin-testnet:__native__".to_string(),
            block_height: 90,
            fee_estimates: Vec::new(),
        });
        store.currencies.push(Currency {
            currency_id: "bitcoin-mainnet:__native__".to_string(),
            name: "Bitcoin".to_string(),
            code: "btc".to_string(),
            kind: "native".to_string(),
            blockchain_id: "bitcoin-mainnet".to_string(),
            address: None,
            denominations: vec![
                Denomination {
                    name: "Satoshi".to_string(),
                    short_name: "sat".to_string(),
                    decimals: 0,
                },
                Denomination {
                    name: "Bitcoin".to_string(),
                    short_name: "btc".to_string(),
                    decimals: 8,
                },
            ],
        });
        store.currencies.push(Currency {
            currency_id: "bitcoin-testnet:__native__".to_string(),
            name: "Bitcoin Test".to_string(),
            code: "btc".to_string(),
            kind: "native".to_string(),
            blockchain_id: "bitcoin-testnet".to_string(),
            address: None,
            denominations: Vec::new(),
        });
        store.add_blocks("bitcoin-mainnet", 100..150);
        store.add_transfers("bitcoin-mainnet", "1Alice", 5, 120);
        store.add_transfers("bitcoin-mainnet", "1Bob", 3, 130);
        store
    }

    /// Store a new subscription under the next free `sub-<n>` id.
    pub fn add_subscription(&mut self, input: NewSubscription) -> Subscription {
        self.next_subscription += 1;
        let subscription = Subscription {
            subscription_id: format!("sub-{}", self.next_subscription),
            device_id: input.device_id,
            endpoint: input.endpoint,
            currencies: input.currencies,
        };
        self.subscriptions.push(subscription.clone());
        subscription
    }

    pub fn add_blocks(&mut self, chain_id: &str, heights: std::ops::Range<u64>) {
        for height in heights {
            self.blocks.push(Block {
                block_id: format!("{chain_id}:{height}"),
                blockchain_id: chain_id.to_string(),
                hash: format!("{height:064x}"),
                height,
                mined: "2019-08-01T00:00:00.000+00:00".to_string(),
                size: 1000 + height,
                acknowledgements: 6,
            });
        }
    }

    /// Add `count` incoming transfers to `address`, each in its own
    /// transaction, starting at `height`.
    pub fn add_transfers(&mut self, chain_id: &str, address: &str, count: u64, height: u64) {
        for i in 0..count {
            let transaction_id = format!("{chain_id}:{address}:{i}");
            let transfer = Transfer {
                transfer_id: format!("{transaction_id}:0"),
                blockchain_id: chain_id.to_string(),
                index: i,
                amount: Amount {
                    amount: (1000 * (i + 1)).to_string(),
                    currency_id: format!("{chain_id}:__native__"),
                },
                from_address: Some("1Faucet".to_string()),
                to_address: Some(address.to_string()),
                transaction_id: Some(transaction_id.clone()),
                acknowledgements: Some(6),
                block_height: height + i,
            };
            let hash = format!("{:064x}", self.transactions.len());
            self.transactions.push(Transaction {
                transaction_id: transaction_id.clone(),
                blockchain_id: chain_id.to_string(),
                hash,
                identifier: transaction_id,
                status: "confirmed".to_string(),
                size: 250,
                transfers: vec![transfer.clone()],
                acknowledgements: 6,
                block_height: Some(height + i),
                raw: Some("AQID".to_string()),
            });
            self.transfers.push(transfer);
        }
    }
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    app_with(Store::seeded())
}

pub fn app_with(store: Store) -> Router {
    router(Arc::new(RwLock::new(store)))
}

/// Router over a shared store, so tests can inspect it afterwards.
pub fn router(db: Db) -> Router {
    Router::new()
        .route("/blockchains", get(list_blockchains))
        .route("/blockchains/{id}", get(get_blockchain))
        .route("/currencies", get(list_currencies))
        .route("/currencies/{id}", get(get_currency))
        .route("/blocks", get(list_blocks))
        .route("/blocks/{id}", get(get_block))
        .route("/transfers", get(list_transfers))
        .route("/transfers/{id}", get(get_transfer))
        .route("/transactions", get(list_transactions).post(create_transaction))
        .route("/transactions/{id}", get(get_transaction))
        .route(
            "/subscriptions",
            get(list_subscriptions).post(create_subscription),
        )
        .route(
            "/subscriptions/{id}",
            get(get_subscription)
                .put(update_subscription)
                .delete(delete_subscription),
        )
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, router(db)).await
}

/// Decoded query string, keeping repeated keys.
struct Params(Vec<(String, String)>);

impl Params {
    fn parse(raw: Option<String>) -> Self {
        let pairs = raw
            .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        Params(pairs)
    }

    fn first(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    fn all(&self, key: &str) -> Vec<String> {
        self.0
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }

    fn number<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, StatusCode> {
        self.first(key)
            .map(|v| v.parse().map_err(|_| StatusCode::BAD_REQUEST))
            .transpose()
    }

    fn flag(&self, key: &str) -> Option<bool> {
        self.first(key).map(|v| v == "true")
    }

    fn in_range(&self, height: u64) -> Result<bool, StatusCode> {
        let start = self.number::<u64>("start_height")?.unwrap_or(0);
        let end = self.number::<u64>("end_height")?.unwrap_or(u64::MAX);
        Ok(start <= height && height < end)
    }

    fn addresses(&self) -> Result<Vec<String>, StatusCode> {
        let addresses = self.all("address");
        if addresses.iter().any(|a| a.starts_with(FAILING_ADDRESS_PREFIX)) {
            tracing::warn!("injected failure for address query");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
        Ok(addresses)
    }

    /// Same query with `offset` replaced.
    fn with_offset(&self, offset: usize) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (k, v) in self.0.iter().filter(|(k, _)| k != "offset") {
            serializer.append_pair(k, v);
        }
        serializer.append_pair("offset", &offset.to_string());
        serializer.finish()
    }
}

/// HAL envelope for one page of `items`, with a relative `next` link when
/// more remain.
fn paged<T: Serialize>(
    resource: &str,
    params: &Params,
    items: Vec<T>,
) -> Result<Json<Value>, StatusCode> {
    let page_size = params
        .number::<usize>("max_page_size")?
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .max(1);
    let offset = params.number::<usize>("offset")?.unwrap_or(0);
    let total = items.len();
    let page: Vec<T> = items.into_iter().skip(offset).take(page_size).collect();

    let mut links = json!({
        "self": { "href": format!("/{resource}?{}", params.with_offset(offset)) }
    });
    if offset + page_size < total {
        links["next"] = json!({ "href": format!("/{resource}?{}", params.with_offset(offset + page_size)) });
    }
    if offset > 0 {
        let prev = offset.saturating_sub(page_size);
        links["prev"] = json!({ "href": format!("/{resource}?{}", params.with_offset(prev)) });
    }

    Ok(Json(json!({
        "_embedded": { resource: page },
        "_links": links,
    })))
}

fn embedded<T: Serialize>(resource: &str, items: Vec<T>) -> Json<Value> {
    Json(json!({ "_embedded": { resource: items } }))
}

fn found<T: Clone>(item: Option<&T>) -> Result<Json<T>, StatusCode> {
    item.cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn list_blockchains(State(db): State<Db>, RawQuery(query): RawQuery) -> Json<Value> {
    let params = Params::parse(query);
    let testnet = params.flag("testnet");
    let store = db.read().await;
    let chains: Vec<Blockchain> = store
        .blockchains
        .iter()
        .filter(|c| testnet.is_none_or(|t| c.is_mainnet != t))
        .cloned()
        .collect();
    embedded("blockchains", chains)
}

async fn get_blockchain(
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<Blockchain>, StatusCode> {
    let store = db.read().await;
    found(store.blockchains.iter().find(|c| c.id == id))
}

async fn list_currencies(State(db): State<Db>, RawQuery(query): RawQuery) -> Json<Value> {
    let params = Params::parse(query);
    let chain = params.first("blockchain_id");
    let store = db.read().await;
    let currencies: Vec<Currency> = store
        .currencies
        .iter()
        .filter(|c| chain.is_none_or(|id| c.blockchain_id == id))
        .cloned()
        .collect();
    embedded("currencies", currencies)
}

async fn get_currency(
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<Currency>, StatusCode> {
    let store = db.read().await;
    found(store.currencies.iter().find(|c| c.currency_id == id))
}

async fn list_blocks(
    State(db): State<Db>,
    RawQuery(query): RawQuery,
) -> Result<Json<Value>, StatusCode> {
    let params = Params::parse(query);
    let chain = params.first("blockchain_id").ok_or(StatusCode::BAD_REQUEST)?;
    let store = db.read().await;
    let mut blocks = Vec::new();
    for block in store.blocks.iter().filter(|b| b.blockchain_id == chain) {
        if params.in_range(block.height)? {
            blocks.push(block.clone());
        }
    }
    paged("blocks", &params, blocks)
}

async fn get_block(State(db): State<Db>, Path(id): Path<String>) -> Result<Json<Block>, StatusCode> {
    let store = db.read().await;
    found(store.blocks.iter().find(|b| b.block_id == id))
}

async fn list_transfers(
    State(db): State<Db>,
    RawQuery(query): RawQuery,
) -> Result<Json<Value>, StatusCode> {
    let params = Params::parse(query);
    let chain = params.first("blockchain_id").ok_or(StatusCode::BAD_REQUEST)?;
    let addresses = params.addresses()?;
    let store = db.read().await;
    let mut transfers = Vec::new();
    for transfer in store
        .transfers
        .iter()
        .filter(|t| t.blockchain_id == chain && t.touches(&addresses))
    {
        if params.in_range(transfer.block_height)? {
            transfers.push(transfer.clone());
        }
    }
    paged("transfers", &params, transfers)
}

async fn get_transfer(
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<Transfer>, StatusCode> {
    let store = db.read().await;
    found(store.transfers.iter().find(|t| t.transfer_id == id))
}

async fn list_transactions(
    State(db): State<Db>,
    RawQuery(query): RawQuery,
) -> Result<Json<Value>, StatusCode> {
    let params = Params::parse(query);
    let chain = params.first("blockchain_id").ok_or(StatusCode::BAD_REQUEST)?;
    let addresses = params.addresses()?;
    let include_raw = params.flag("include_raw").unwrap_or(false);
    let store = db.read().await;
    let mut transactions = Vec::new();
    for tx in store.transactions.iter().filter(|tx| {
        tx.blockchain_id == chain && tx.transfers.iter().any(|t| t.touches(&addresses))
    }) {
        if params.in_range(tx.block_height.unwrap_or(u64::MAX))? {
            let mut tx = tx.clone();
            if !include_raw {
                tx.raw = None;
            }
            transactions.push(tx);
        }
    }
    paged("transactions", &params, transactions)
}

async fn get_transaction(
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<Transaction>, StatusCode> {
    let store = db.read().await;
    found(store.transactions.iter().find(|tx| tx.transaction_id == id))
}

async fn create_transaction(
    State(db): State<Db>,
    Json(input): Json<NewTransaction>,
) -> StatusCode {
    tracing::info!(transaction_id = %input.transaction_id, "transaction submitted");
    db.write().await.submitted.push(input);
    StatusCode::ACCEPTED
}

async fn list_subscriptions(State(db): State<Db>) -> Json<Value> {
    let store = db.read().await;
    embedded("subscriptions", store.subscriptions.clone())
}

async fn get_subscription(
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<Subscription>, StatusCode> {
    let store = db.read().await;
    found(store.subscriptions.iter().find(|s| s.subscription_id == id))
}

async fn create_subscription(
    State(db): State<Db>,
    Json(input): Json<NewSubscription>,
) -> (StatusCode, Json<Subscription>) {
    let subscription = db.write().await.add_subscription(input);
    tracing::info!(id = %subscription.subscription_id, "subscription created");
    (StatusCode::CREATED, Json(subscription))
}

async fn update_subscription(
    State(db): State<Db>,
    Path(id): Path<String>,
    Json(input): Json<Subscription>,
) -> Result<Json<Subscription>, StatusCode> {
    let mut store = db.write().await;
    let existing = store
        .subscriptions
        .iter_mut()
        .find(|s| s.subscription_id == id)
        .ok_or(StatusCode::NOT_FOUND)?;
    existing.device_id = input.device_id;
    existing.endpoint = input.endpoint;
    existing.currencies = input.currencies;
    Ok(Json(existing.clone()))
}

async fn delete_subscription(State(db): State<Db>, Path(id): Path<String>) -> StatusCode {
    let mut store = db.write().await;
    let before = store.subscriptions.len();
    store.subscriptions.retain(|s| s.subscription_id != id);
    if store.subscriptions.len() == before {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::NO_CONTENT
    }
}
