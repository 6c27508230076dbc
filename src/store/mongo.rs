use mongodb::bson::{Document, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};

use super::{DocumentStore, Page, StoreError, StoreResult};

const DUPLICATE_KEY: i32 = 11000;

/// MongoDB-backed store. Versioned replaces filter on `_id` and `version`
/// together, so a stale write matches nothing.
pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, mongodb::error::Error> {
        let client = Client::with_uri_str(uri).await?;

        // Test connection
        client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await?;

        Ok(MongoStore {
            database: client.database(database),
        })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection::<Document>(name)
    }
}

fn classify(collection: &str, e: mongodb::error::Error) -> StoreError {
    if let ErrorKind::Write(WriteFailure::WriteError(write)) = e.kind.as_ref() {
        if write.code == DUPLICATE_KEY {
            return StoreError::DuplicateKey {
                collection: collection.to_string(),
                detail: write.message.clone(),
            };
        }
    }
    match e.kind.as_ref() {
        ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } => StoreError::Unavailable(e.to_string()),
        _ if e.contains_label("RetryableWriteError") => StoreError::Unavailable(e.to_string()),
        _ => StoreError::Backend(e.to_string()),
    }
}

#[rocket::async_trait]
impl DocumentStore for MongoStore {
    async fn ensure_unique(&self, collection: &str, field: &str) -> StoreResult<()> {
        let mut keys = Document::new();
        keys.insert(field, 1);
        let index = IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.collection(collection)
            .create_index(index, None)
            .await
            .map_err(|e| classify(collection, e))?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.collection(collection)
            .find_one(doc! { "_id": id }, None)
            .await
            .map_err(|e| classify(collection, e))
    }

    async fn find_one(&self, collection: &str, filter: Document) -> StoreResult<Option<Document>> {
        self.collection(collection)
            .find_one(filter, None)
            .await
            .map_err(|e| classify(collection, e))
    }

    async fn find(&self, collection: &str, filter: Document, page: Page) -> StoreResult<Vec<Document>> {
        let mut options = FindOptions::default();
        options.sort = Some(doc! { "createdAt": 1 });
        options.skip = Some(page.skip);
        options.limit = i64::try_from(page.limit).ok();

        let mut cursor = self
            .collection(collection)
            .find(filter, options)
            .await
            .map_err(|e| classify(collection, e))?;

        let mut documents = Vec::new();
        while cursor.advance().await.map_err(|e| classify(collection, e))? {
            let document = cursor
                .deserialize_current()
                .map_err(|e| StoreError::Malformed(e.to_string()))?;
            documents.push(document);
        }
        Ok(documents)
    }

    async fn count(&self, collection: &str, filter: Document) -> StoreResult<u64> {
        self.collection(collection)
            .count_documents(filter, None)
            .await
            .map_err(|e| classify(collection, e))
    }

    async fn insert(&self, collection: &str, document: Document) -> StoreResult<()> {
        if document.get_str("_id").is_err() {
            return Err(StoreError::Malformed("document has no string _id".to_string()));
        }
        self.collection(collection)
            .insert_one(document, None)
            .await
            .map_err(|e| classify(collection, e))?;
        Ok(())
    }

    async fn replace(
        &self,
        collection: &str,
        id: &str,
        expected_version: i64,
        mut document: Document,
    ) -> StoreResult<i64> {
        let next_version = expected_version + 1;
        document.insert("_id", id);
        document.insert("version", next_version);

        let result = self
            .collection(collection)
            .replace_one(doc! { "_id": id, "version": expected_version }, document, None)
            .await
            .map_err(|e| classify(collection, e))?;
        if result.matched_count == 0 {
            return Err(StoreError::Conflict {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        Ok(next_version)
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<bool> {
        let result = self
            .collection(collection)
            .delete_one(doc! { "_id": id }, None)
            .await
            .map_err(|e| classify(collection, e))?;
        Ok(result.deleted_count > 0)
    }
}
