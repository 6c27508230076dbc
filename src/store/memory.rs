use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use indexmap::IndexMap;
use mongodb::bson::{Bson, Document};

use super::{DocumentStore, Page, StoreError, StoreResult, matches, values_at};

#[derive(Default)]
struct Collection {
    documents: IndexMap<String, Document>,
    unique_fields: Vec<String>,
}

impl Collection {
    fn check_unique(&self, name: &str, id: &str, document: &Document) -> StoreResult<()> {
        for field in &self.unique_fields {
            for value in values_at(document, field) {
                if matches!(value, Bson::Null) {
                    continue;
                }
                let taken = self
                    .documents
                    .iter()
                    .filter(|(other_id, _)| other_id.as_str() != id)
                    .any(|(_, other)| values_at(other, field).contains(&value));
                if taken {
                    return Err(StoreError::DuplicateKey {
                        collection: name.to_string(),
                        detail: format!("{} = {}", field, value),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Process-local store used for development and tests.
///
/// Replaces can be made to fail a number of times per document to exercise
/// retry and compensation paths.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Collection>>,
    failing_replaces: Mutex<HashMap<(String, String), FailurePlan>>,
    lost_acks: Mutex<HashMap<(String, String), u32>>,
}

#[derive(Debug, Clone, Copy)]
struct FailurePlan {
    successes: u32,
    failures: u32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `times` replaces of `collection/id` fail as unavailable.
    pub fn fail_replaces(&self, collection: &str, id: &str, times: u32) {
        self.fail_replaces_after(collection, id, 0, times);
    }

    /// Lets `successes` replaces of `collection/id` through, then fails the
    /// following `times` as unavailable.
    pub fn fail_replaces_after(&self, collection: &str, id: &str, successes: u32, times: u32) {
        if let Ok(mut failing) = self.failing_replaces.lock() {
            failing.insert(
                (collection.to_string(), id.to_string()),
                FailurePlan {
                    successes,
                    failures: times,
                },
            );
        }
    }

    /// The next `times` replaces of `collection/id` are written but reported
    /// as unavailable, like a connection dropped after the server committed.
    pub fn lose_replace_acks(&self, collection: &str, id: &str, times: u32) {
        if let Ok(mut lost) = self.lost_acks.lock() {
            lost.insert((collection.to_string(), id.to_string()), times);
        }
    }

    fn lost_ack(&self, collection: &str, id: &str) -> StoreResult<()> {
        let mut lost = self
            .lost_acks
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))?;
        match lost.get_mut(&(collection.to_string(), id.to_string())) {
            Some(times) if *times > 0 => {
                *times -= 1;
                Err(StoreError::Unavailable(format!(
                    "connection lost after writing {}/{}",
                    collection, id
                )))
            }
            _ => Ok(()),
        }
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }

    fn injected_failure(&self, collection: &str, id: &str) -> StoreResult<()> {
        let mut failing = self
            .failing_replaces
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))?;
        let key = (collection.to_string(), id.to_string());
        if let Some(plan) = failing.get_mut(&key) {
            if plan.successes > 0 {
                plan.successes -= 1;
                return Ok(());
            }
            if plan.failures > 0 {
                plan.failures -= 1;
                return Err(StoreError::Unavailable(format!(
                    "injected failure on {}/{}",
                    collection, id
                )));
            }
            failing.remove(&key);
        }
        Ok(())
    }
}

fn document_id(document: &Document) -> StoreResult<String> {
    document
        .get_str("_id")
        .map(str::to_string)
        .map_err(|_| StoreError::Malformed("document has no string _id".to_string()))
}

#[rocket::async_trait]
impl DocumentStore for MemoryStore {
    async fn ensure_unique(&self, collection: &str, field: &str) -> StoreResult<()> {
        let mut collections = self.lock()?;
        let entry = collections.entry(collection.to_string()).or_default();
        if !entry.unique_fields.iter().any(|f| f == field) {
            entry.unique_fields.push(field.to_string());
        }
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let collections = self.lock()?;
        Ok(collections
            .get(collection)
            .and_then(|c| c.documents.get(id))
            .cloned())
    }

    async fn find_one(&self, collection: &str, filter: Document) -> StoreResult<Option<Document>> {
        let collections = self.lock()?;
        Ok(collections.get(collection).and_then(|c| {
            c.documents
                .values()
                .find(|d| matches(d, &filter))
                .cloned()
        }))
    }

    async fn find(&self, collection: &str, filter: Document, page: Page) -> StoreResult<Vec<Document>> {
        let collections = self.lock()?;
        let Some(c) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(c.documents
            .values()
            .filter(|d| matches(d, &filter))
            .skip(usize::try_from(page.skip).unwrap_or(usize::MAX))
            .take(usize::try_from(page.limit).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn count(&self, collection: &str, filter: Document) -> StoreResult<u64> {
        let collections = self.lock()?;
        Ok(collections
            .get(collection)
            .map(|c| c.documents.values().filter(|d| matches(d, &filter)).count() as u64)
            .unwrap_or(0))
    }

    async fn insert(&self, collection: &str, document: Document) -> StoreResult<()> {
        let id = document_id(&document)?;
        let mut collections = self.lock()?;
        let entry = collections.entry(collection.to_string()).or_default();
        if entry.documents.contains_key(&id) {
            return Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
                detail: format!("_id = {}", id),
            });
        }
        entry.check_unique(collection, &id, &document)?;
        entry.documents.insert(id, document);
        Ok(())
    }

    async fn replace(
        &self,
        collection: &str,
        id: &str,
        expected_version: i64,
        mut document: Document,
    ) -> StoreResult<i64> {
        self.injected_failure(collection, id)?;

        let conflict = || StoreError::Conflict {
            collection: collection.to_string(),
            id: id.to_string(),
        };
        let mut collections = self.lock()?;
        let entry = collections.get_mut(collection).ok_or_else(conflict)?;
        let stored_version = entry
            .documents
            .get(id)
            .and_then(|d| d.get_i64("version").ok())
            .ok_or_else(conflict)?;
        if stored_version != expected_version {
            return Err(conflict());
        }

        let next_version = expected_version + 1;
        document.insert("_id", id);
        document.insert("version", next_version);
        entry.check_unique(collection, id, &document)?;
        entry.documents.insert(id.to_string(), document);
        drop(collections);

        self.lost_ack(collection, id)?;
        Ok(next_version)
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<bool> {
        let mut collections = self.lock()?;
        Ok(collections
            .get_mut(collection)
            .map(|c| c.documents.shift_remove(id).is_some())
            .unwrap_or(false))
    }
}
