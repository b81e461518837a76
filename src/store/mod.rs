//! Remote per-account document store.
//!
//! Every account owns a handful of documents addressed as `users/{email}/{collection}/{id}`.
//! Documents are plain JSON; list-shaped ones keep their items under a single array field.
//! Each document carries a version that starts at 1 on creation and increases on every write;
//! version 0 stands for "does not exist".
//!
//! Writes go through [`WriteBatch`]: each write names the version it was read at, and a
//! backend applies the whole batch or nothing. A stale version rejects the batch with
//! [`StoreError::Conflict`], which callers answer by re-reading and retrying.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Collection {
    Cart,
    Orders,
    CancelOrders,
    ReturnOrders,
    ShippingAddresses,
    Details,
}

impl Collection {
    pub fn segment(&self) -> &'static str {
        match self {
            Self::Cart => "cart",
            Self::Orders => "orders",
            Self::CancelOrders => "cancelOrders",
            Self::ReturnOrders => "returnOrders",
            Self::ShippingAddresses => "shippingAddresses",
            Self::Details => "details",
        }
    }

    /// Name of the array field holding the items, for list-shaped documents.
    pub fn array_field(&self) -> Option<&'static str> {
        match self {
            Self::Cart => Some("cart"),
            Self::Orders => Some("orders"),
            Self::CancelOrders => Some("cancelOrders"),
            Self::ReturnOrders => Some("returnOrders"),
            Self::ShippingAddresses => Some("Addresses"),
            Self::Details => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocumentPath {
    email: String,
    collection: Collection,
    id: String,
}

impl DocumentPath {
    pub fn new(email: impl Into<String>, collection: Collection, id: impl Into<String>) -> Self {
        Self { email: email.into(), collection, id: id.into() }
    }

    pub fn collection(&self) -> Collection { self.collection }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "users/{}/{}/{}", self.email, self.collection.segment(), self.id)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub data: Value,
    pub version: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Write {
    pub path: DocumentPath,
    pub data: Value,
    pub expected_version: u64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self { Self::default() }

    pub fn put(mut self, path: DocumentPath, data: Value, expected_version: u64) -> Self {
        self.writes.push(Write { path, data, expected_version });
        self
    }

    /// Replaces a list-shaped document with `items` under its array field.
    pub fn put_array<T: Serialize>(self, path: DocumentPath, items: &[T], expected_version: u64) -> Result<Self, StoreError> {
        let field = path.collection().array_field().ok_or_else(|| StoreError::NotAList(path.to_string()))?;
        let items = serde_json::to_value(items).map_err(|source| StoreError::Encode { path: path.to_string(), source })?;
        let mut data = serde_json::Map::new();
        data.insert(field.to_string(), items);
        Ok(self.put(path, Value::Object(data), expected_version))
    }

    pub fn writes(&self) -> &[Write] { &self.writes }
    pub fn into_writes(self) -> Vec<Write> { self.writes }
    pub fn is_empty(&self) -> bool { self.writes.is_empty() }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document {path} changed since it was read")]
    Conflict { path: String },
    #[error("document {0} is not list-shaped")]
    NotAList(String),
    #[error("document {path} could not be decoded: {source}")]
    Decode { path: String, source: serde_json::Error },
    #[error("document {path} could not be encoded: {source}")]
    Encode { path: String, source: serde_json::Error },
    #[error("document store unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool { matches!(self, Self::Conflict { .. }) }
}

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    fn backend_tag(&self) -> &'static str {
        "unknown"
    }

    /// Reads one document; `None` when it was never written.
    async fn get(&self, path: &DocumentPath) -> Result<Option<Snapshot>, StoreError>;

    /// Applies every write or none of them.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

/// Reads a list-shaped document. A missing document or missing field is an empty list.
pub async fn read_array<T: DeserializeOwned>(store: &dyn DocumentStore, path: &DocumentPath) -> Result<(Vec<T>, u64), StoreError> {
    let field = path.collection().array_field().ok_or_else(|| StoreError::NotAList(path.to_string()))?;
    let Some(snapshot) = store.get(path).await? else { return Ok((Vec::new(), 0)) };
    let items = match snapshot.data.get(field) {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => Vec::<T>::deserialize(value).map_err(|source| StoreError::Decode { path: path.to_string(), source })?,
    };
    Ok((items, snapshot.version))
}

/// Backoff schedule for retried operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff_ms: 120,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), doubling each time.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let shift = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX).min(10);
        Duration::from_millis(self.base_backoff_ms.saturating_mul(1 << shift))
    }

    pub fn attempts(&self) -> usize { self.max_attempts.max(1) }
}
