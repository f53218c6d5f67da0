//! Models returned by the blockchain database, and request inputs.
//!
//! # Design
//! Wire names are the database's snake_case names. Required fields are plain
//! fields so a record missing one fails to decode (`QueryError::Model`);
//! optional fields are `Option`. Raw payloads arrive base64-encoded and are
//! kept that way until a caller asks for the bytes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// A value denominated in one currency. `amount` is a decimal string in the
/// currency's base unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub amount: String,
    pub currency_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub transfer_id: String,
    pub blockchain_id: String,
    pub index: u64,
    pub amount: Amount,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub transaction_id: Option<String>,
    pub acknowledgements: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub blockchain_id: String,
    pub hash: String,
    pub identifier: String,
    pub status: String,
    pub size: u64,
    #[serde(default)]
    pub transfers: Vec<Transfer>,
    #[serde(default)]
    pub acknowledgements: u64,
    pub first_seen: Option<String>,
    pub block_hash: Option<String>,
    pub block_height: Option<u64>,
    pub index: Option<u64>,
    pub timestamp: Option<String>,
    pub raw: Option<String>,
    pub confirmations: Option<u64>,
}

impl Transaction {
    /// Decoded `raw` bytes, when the query asked for them.
    pub fn raw_bytes(&self) -> Result<Option<Vec<u8>>, QueryError> {
        decode_raw(self.raw.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub block_id: String,
    pub blockchain_id: String,
    pub hash: String,
    pub height: u64,
    pub mined: String,
    pub size: u64,
    pub acknowledgements: u64,
    pub header: Option<String>,
    pub raw: Option<String>,
    #[serde(alias = "prevHash")]
    pub prev_hash: Option<String>,
    #[serde(alias = "nexthash")]
    pub next_hash: Option<String>,
    pub transactions: Option<Vec<Transaction>>,
}

impl Block {
    pub fn raw_bytes(&self) -> Result<Option<Vec<u8>>, QueryError> {
        decode_raw(self.raw.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyDenomination {
    pub name: String,
    pub short_name: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub currency_id: String,
    pub name: String,
    pub code: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub blockchain_id: String,
    /// Contract address for tokens; absent for native currencies.
    pub address: Option<String>,
    pub denominations: Vec<CurrencyDenomination>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockchainFee {
    pub fee: Amount,
    pub tier: String,
    pub estimated_confirmation_in: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blockchain {
    pub id: String,
    pub name: String,
    pub network: String,
    pub is_mainnet: bool,
    pub native_currency_id: String,
    pub block_height: u64,
    #[serde(default)]
    pub fee_estimates: Vec<BlockchainFee>,
}

/// Body of `POST /transactions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub blockchain_id: String,
    pub transaction_id: String,
    /// Base64 of the signed transaction.
    pub data: String,
}

impl NewTransaction {
    pub fn new(chain_id: &str, tx_hash_hex: &str, raw: &[u8]) -> Self {
        Self {
            blockchain_id: chain_id.to_string(),
            transaction_id: tx_hash_hex.to_string(),
            data: STANDARD.encode(raw),
        }
    }
}

/// Where notifications for a subscription are delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionEndpoint {
    /// Delivery channel, e.g. `fcm`.
    pub kind: String,
    pub environment: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    pub name: String,
    #[serde(default)]
    pub confirmations: Vec<u32>,
}

/// Addresses and events watched for one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionCurrency {
    pub currency_id: String,
    pub addresses: Vec<String>,
    pub events: Vec<SubscriptionEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(rename = "subscription_id")]
    pub id: String,
    #[serde(rename = "device_id")]
    pub device: String,
    pub endpoint: SubscriptionEndpoint,
    #[serde(default)]
    pub currencies: Vec<SubscriptionCurrency>,
}

/// Body of `POST /subscriptions`; the server assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubscription {
    pub device_id: String,
    pub endpoint: SubscriptionEndpoint,
    pub currencies: Vec<SubscriptionCurrency>,
}

impl From<&Subscription> for NewSubscription {
    fn from(subscription: &Subscription) -> Self {
        Self {
            device_id: subscription.device.clone(),
            endpoint: subscription.endpoint.clone(),
            currencies: subscription.currencies.clone(),
        }
    }
}

/// Inputs for `BlockchainDb::get_transactions`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionsRequest {
    pub chain_id: String,
    pub addresses: Vec<String>,
    pub begin_height: Option<u64>,
    pub end_height: Option<u64>,
    pub include_raw: bool,
    pub include_proof: bool,
    pub max_page_size: Option<u32>,
}

/// Inputs for `BlockchainDb::get_transfers`. `end_height` is exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransfersRequest {
    pub chain_id: String,
    pub addresses: Vec<String>,
    pub begin_height: u64,
    pub end_height: u64,
    pub max_page_size: Option<u32>,
}

/// Inputs for `BlockchainDb::get_blocks`. `end_height` is exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlocksRequest {
    pub chain_id: String,
    pub begin_height: u64,
    pub end_height: u64,
    pub include_raw: bool,
    pub include_tx: bool,
    pub include_tx_raw: bool,
    pub include_tx_proof: bool,
    pub max_page_size: Option<u32>,
}

fn decode_raw(raw: Option<&str>) -> Result<Option<Vec<u8>>, QueryError> {
    raw.map(|encoded| {
        STANDARD
            .decode(encoded)
            .map_err(|e| QueryError::Model(format!("raw is not base64: {e}")))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer_json() -> serde_json::Value {
        serde_json::json!({
            "transfer_id": "bitcoin-mainnet:abc:0",
            "blockchain_id": "bitcoin-mainnet",
            "index": 0,
            "amount": {"amount": "1000", "currency_id": "bitcoin-mainnet:__native__"},
            "from_address": "1From",
            "to_address": "1To"
        })
    }

    #[test]
    fn transfer_optional_fields_default_to_none() {
        let transfer: Transfer = serde_json::from_value(transfer_json()).unwrap();
        assert_eq!(transfer.amount.amount, "1000");
        assert!(transfer.transaction_id.is_none());
        assert!(transfer.acknowledgements.is_none());
    }

    #[test]
    fn transfer_missing_amount_fails() {
        let mut json = transfer_json();
        json.as_object_mut().unwrap().remove("amount");
        assert!(serde_json::from_value::<Transfer>(json).is_err());
    }

    #[test]
    fn transaction_raw_bytes_decode() {
        let tx: Transaction = serde_json::from_value(serde_json::json!({
            "transaction_id": "t", "blockchain_id": "b", "hash": "h",
            "identifier": "i", "status": "confirmed", "size": 10,
            "raw": "AQID"
        }))
        .unwrap();
        assert_eq!(tx.raw_bytes().unwrap(), Some(vec![1, 2, 3]));
        assert!(tx.transfers.is_empty());
        assert_eq!(tx.acknowledgements, 0);
    }

    #[test]
    fn invalid_raw_is_model_error() {
        let err = decode_raw(Some("***")).unwrap_err();
        assert!(matches!(err, QueryError::Model(_)));
    }

    #[test]
    fn block_accepts_legacy_link_names() {
        let block: Block = serde_json::from_value(serde_json::json!({
            "block_id": "b:1", "blockchain_id": "b", "hash": "h", "height": 1,
            "mined": "2019-08-01T00:00:00Z", "size": 100, "acknowledgements": 3,
            "prevHash": "h0", "nexthash": "h2"
        }))
        .unwrap();
        assert_eq!(block.prev_hash.as_deref(), Some("h0"));
        assert_eq!(block.next_hash.as_deref(), Some("h2"));
    }

    #[test]
    fn currency_type_maps_to_kind() {
        let currency: Currency = serde_json::from_value(serde_json::json!({
            "currency_id": "ethereum-mainnet:0x558ec3152e2eb2174905cd19aea4e34a23de9ad6",
            "name": "BRD Token", "code": "brd", "type": "erc20",
            "blockchain_id": "ethereum-mainnet",
            "address": "0x558ec3152e2eb2174905cd19aea4e34a23de9ad6",
            "denominations": [{"name": "BRD", "short_name": "brd", "decimals": 18}]
        }))
        .unwrap();
        assert_eq!(currency.kind, "erc20");
        assert_eq!(currency.denominations[0].decimals, 18);
    }

    #[test]
    fn subscription_uses_wire_names() {
        let subscription: Subscription = serde_json::from_value(serde_json::json!({
            "subscription_id": "sub-1",
            "device_id": "device-1",
            "endpoint": {"kind": "fcm", "environment": "development", "value": "token"},
            "currencies": [{
                "currency_id": "bitcoin-testnet:__native__",
                "addresses": ["2NEpHgLvBJqGFVwQPUA3AQPjpE5gNWhETfT"],
                "events": [{"name": "confirmed", "confirmations": [1]}]
            }]
        }))
        .unwrap();
        assert_eq!(subscription.id, "sub-1");
        assert_eq!(subscription.device, "device-1");
        assert_eq!(subscription.currencies[0].events[0].confirmations, vec![1]);

        let json = serde_json::to_value(NewSubscription::from(&subscription)).unwrap();
        assert_eq!(json["device_id"], "device-1");
        assert!(json.get("subscription_id").is_none());
    }

    #[test]
    fn new_transaction_encodes_raw_as_base64() {
        let body = NewTransaction::new("bitcoin-mainnet", "abcd", &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(body.data, "3q2+7w==");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["blockchain_id"], "bitcoin-mainnet");
        assert_eq!(json["transaction_id"], "abcd");
    }
}
