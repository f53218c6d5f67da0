//! Response parsing for the three body shapes the database returns.
//!
//! # Design
//! Each shape is its own type implementing `ResponseShape`, and each has its
//! own `Output`: a root object yields `T`, an embedded array yields `Vec<T>`,
//! and an embedded paged array yields `Page<T>`. Callers never see link
//! fields unless they asked for a paged shape.
//!
//! Embedded envelopes are HAL-style:
//!
//! ```json
//! { "_embedded": { "transfers": [ ... ] },
//!   "_links": { "next": { "href": "..." }, "prev": { "href": "..." } } }
//! ```
//!
//! The unprefixed `embedded` / `links` spellings are accepted as well.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::QueryError;

/// One page of an embedded collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
    pub prev: Option<String>,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }
}

/// A body shape the executor knows how to decode.
pub trait ResponseShape: Send + Sync {
    type Output: Send;

    /// Whether an accepted response without a body is `QueryError::NoData`.
    fn requires_body(&self) -> bool {
        true
    }

    fn parse(&self, body: &[u8]) -> Result<Self::Output, QueryError>;
}

/// The whole body is one `T`.
pub struct RootObject<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> RootObject<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for RootObject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for RootObject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RootObject")
    }
}

impl<T: DeserializeOwned + Send> ResponseShape for RootObject<T> {
    type Output = T;

    fn parse(&self, body: &[u8]) -> Result<T, QueryError> {
        serde_json::from_slice(body).map_err(QueryError::from_json)
    }
}

/// `_embedded.<resource>` holds a list of `T`.
pub struct EmbeddedArray<T> {
    resource: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> EmbeddedArray<T> {
    pub fn new(resource: &str) -> Self {
        Self {
            resource: resource.to_string(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for EmbeddedArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedArray")
            .field("resource", &self.resource)
            .finish()
    }
}

impl<T: DeserializeOwned + Send> ResponseShape for EmbeddedArray<T> {
    type Output = Vec<T>;

    fn parse(&self, body: &[u8]) -> Result<Vec<T>, QueryError> {
        match decode_envelope(body)? {
            Some(envelope) => envelope.items(&self.resource),
            None => Ok(Vec::new()),
        }
    }
}

/// `_embedded.<resource>` plus `_links.next` / `_links.prev`.
pub struct EmbeddedPagedArray<T> {
    resource: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> EmbeddedPagedArray<T> {
    pub fn new(resource: &str) -> Self {
        Self {
            resource: resource.to_string(),
            _marker: PhantomData,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl<T> fmt::Debug for EmbeddedPagedArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedPagedArray")
            .field("resource", &self.resource)
            .finish()
    }
}

impl<T: DeserializeOwned + Send> ResponseShape for EmbeddedPagedArray<T> {
    type Output = Page<T>;

    fn parse(&self, body: &[u8]) -> Result<Page<T>, QueryError> {
        let Some(envelope) = decode_envelope(body)? else {
            return Ok(Page {
                items: Vec::new(),
                next: None,
                prev: None,
            });
        };
        Ok(Page {
            items: envelope.items(&self.resource)?,
            next: envelope.link("next"),
            prev: envelope.link("prev").or_else(|| envelope.link("previous")),
        })
    }
}

/// Success carries no payload; the body, if any, is ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct Empty;

impl ResponseShape for Empty {
    type Output = ();

    fn requires_body(&self) -> bool {
        false
    }

    fn parse(&self, _body: &[u8]) -> Result<(), QueryError> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "_embedded", alias = "embedded", default)]
    embedded: Option<HashMap<String, Value>>,
    #[serde(rename = "_links", alias = "links", default)]
    links: Option<Value>,
}

impl Envelope {
    fn items<T: DeserializeOwned>(&self, resource: &str) -> Result<Vec<T>, QueryError> {
        let Some(records) = self.embedded.as_ref().and_then(|e| e.get(resource)) else {
            return Ok(Vec::new());
        };
        let Value::Array(records) = records else {
            return Err(QueryError::Model(format!(
                "embedded `{resource}` is not an array"
            )));
        };
        records
            .iter()
            .map(|record| {
                T::deserialize(record).map_err(|e| QueryError::Model(format!("{resource}: {e}")))
            })
            .collect()
    }

    // Links are lenient: anything that is not `{ rel: { href: "..." } }` reads
    // as "no link".
    fn link(&self, rel: &str) -> Option<String> {
        self.links
            .as_ref()?
            .get(rel)?
            .get("href")?
            .as_str()
            .map(str::to_string)
    }
}

/// A literal `null` body decodes as "no envelope".
fn decode_envelope(body: &[u8]) -> Result<Option<Envelope>, QueryError> {
    serde_json::from_slice::<Option<Envelope>>(body)
        .map_err(|e| QueryError::JsonParse(e.to_string()))
}
