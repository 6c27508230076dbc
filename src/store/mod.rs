//! Schemaless document storage.
//!
//! Every document is a BSON map with a string `_id` and an `i64` `version`.
//! Writes to an existing document go through [`DocumentStore::replace`], which
//! only succeeds when the stored version still equals the version the caller
//! read; that check is what serializes concurrent read-modify-write cycles.

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use mongodb::bson::{self, Bson, Document};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("version conflict on {collection}/{id}")]
    Conflict { collection: String, id: String },
    #[error("duplicate value for unique key in {collection}: {detail}")]
    DuplicateKey { collection: String, detail: String },
    /// Transport-level failure worth retrying.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store error: {0}")]
    Backend(String),
    #[error("malformed document: {0}")]
    Malformed(String),
}

/// Offset pagination for queue listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: u64,
    pub limit: u64,
}

impl Page {
    /// Builds a page from 1-based `page` / `limit` query parameters. The
    /// offset saturates at `i64::MAX`, the largest skip the server accepts.
    pub fn from_query(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page.unwrap_or(1).max(1) as u64;
        let limit = limit.unwrap_or(20).clamp(1, 100) as u64;
        Page {
            skip: (page - 1).saturating_mul(limit).min(i64::MAX as u64),
            limit,
        }
    }

    pub fn all() -> Self {
        Page {
            skip: 0,
            limit: u64::MAX,
        }
    }
}

#[rocket::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Declares `field` (dotted paths allowed) unique across `collection`.
    async fn ensure_unique(&self, collection: &str, field: &str) -> StoreResult<()>;

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Equality match on every `filter` entry; dotted paths reach into
    /// embedded documents and arrays.
    async fn find_one(&self, collection: &str, filter: Document) -> StoreResult<Option<Document>>;

    /// Matching documents in creation order.
    async fn find(&self, collection: &str, filter: Document, page: Page) -> StoreResult<Vec<Document>>;

    async fn count(&self, collection: &str, filter: Document) -> StoreResult<u64>;

    /// Inserts a new document; `_id` must be set.
    async fn insert(&self, collection: &str, document: Document) -> StoreResult<()>;

    /// Replaces `id` if its stored version is `expected_version`, writing the
    /// document with version `expected_version + 1`, which is returned.
    async fn replace(
        &self,
        collection: &str,
        id: &str,
        expected_version: i64,
        document: Document,
    ) -> StoreResult<i64>;

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<bool>;
}

pub fn encode<T: Serialize>(value: &T) -> StoreResult<Document> {
    bson::to_document(value).map_err(|e| StoreError::Malformed(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(document: Document) -> StoreResult<T> {
    bson::from_document(document).map_err(|e| StoreError::Malformed(e.to_string()))
}

/// Values reachable at a dotted `path`, flattening arrays on the way.
pub(crate) fn values_at<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let mut current: Vec<&Bson> = Vec::new();
    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return current;
    };
    if let Some(v) = document.get(first) {
        current.push(v);
    }
    for segment in segments {
        let mut next = Vec::new();
        for value in current {
            match value {
                Bson::Document(d) => {
                    if let Some(v) = d.get(segment) {
                        next.push(v);
                    }
                }
                Bson::Array(items) => {
                    for item in items {
                        if let Bson::Document(d) = item {
                            if let Some(v) = d.get(segment) {
                                next.push(v);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }
    // A terminal array matches on any of its elements.
    current
        .into_iter()
        .flat_map(|v| match v {
            Bson::Array(items) => items.iter().collect::<Vec<_>>(),
            other => vec![other],
        })
        .collect()
}

pub(crate) fn matches(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(path, expected)| values_at(document, path).into_iter().any(|v| v == expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn dotted_paths_reach_into_arrays() {
        let customer = doc! {
            "_id": "c1",
            "email": "asha@example.com",
            "accounts": [
                { "accountNumber": "111111", "balance": 10_i64 },
                { "accountNumber": "222222", "balance": 20_i64 },
            ],
        };
        assert!(matches(&customer, &doc! { "accounts.accountNumber": "222222" }));
        assert!(!matches(&customer, &doc! { "accounts.accountNumber": "333333" }));
        assert!(matches(&customer, &doc! { "email": "asha@example.com" }));
        assert!(matches(&customer, &doc! {}));
    }

    #[test]
    fn page_from_query_is_clamped() {
        assert_eq!(Page::from_query(None, None), Page { skip: 0, limit: 20 });
        assert_eq!(Page::from_query(Some(3), Some(10)), Page { skip: 20, limit: 10 });
        assert_eq!(Page::from_query(Some(-4), Some(1000)), Page { skip: 0, limit: 100 });
        assert_eq!(
            Page::from_query(Some(i64::MAX), Some(100)),
            Page { skip: i64::MAX as u64, limit: 100 }
        );
    }
}
