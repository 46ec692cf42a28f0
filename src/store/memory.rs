use std::collections::HashMap;
use std::sync::Arc;

use bson::{Bson, Document};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::query::{apply_update, matches};
use super::{Store, StoreError, StoreResult, Transaction, UNIQUE_KEYS};

type Collections = HashMap<String, Vec<Document>>;

const ID_KEY: &[&str] = &["_id"];

/// Process-local document store.
///
/// Transactions are serialized: [MemoryStore::begin] waits until the previous
/// transaction is committed or dropped, then works on a private copy that
/// replaces the shared state on commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: Arc<Mutex<Collections>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Number of committed documents in a collection.
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }
}

impl Store for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> StoreResult<MemoryTransaction> {
        let guard = self.collections.clone().lock_owned().await;
        let working = guard.clone();
        tracing::trace!("memory transaction started");
        Ok(MemoryTransaction { guard, working })
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<Collections>,
    working: Collections,
}

impl MemoryTransaction {
    fn documents(&mut self, collection: &str) -> &mut Vec<Document> {
        self.working.entry(collection.to_string()).or_default()
    }

    fn matching_indices(&mut self, collection: &str, filter: &Document) -> StoreResult<Vec<usize>> {
        let mut indices = Vec::new();
        for (index, document) in self.documents(collection).iter().enumerate() {
            if matches(document, filter)? {
                indices.push(index);
            }
        }
        Ok(indices)
    }

    fn update_indices(
        &mut self,
        collection: &str,
        indices: &[usize],
        update: &Document,
    ) -> StoreResult<()> {
        for &index in indices {
            let mut updated = self.documents(collection)[index].clone();
            apply_update(&mut updated, update)?;
            check_unique(collection, self.documents(collection), &updated, Some(index))?;
            self.documents(collection)[index] = updated;
        }
        Ok(())
    }
}

fn check_unique(
    collection: &str,
    documents: &[Document],
    candidate: &Document,
    skip: Option<usize>,
) -> StoreResult<()> {
    let keys = UNIQUE_KEYS
        .iter()
        .filter(|(c, _)| *c == collection)
        .map(|(_, fields)| *fields)
        .chain(std::iter::once(ID_KEY));

    for fields in keys {
        let mut values = Vec::with_capacity(fields.len());
        for field in fields {
            match candidate.get(*field) {
                Some(Bson::Null) | None => break,
                Some(value) => values.push(value),
            }
        }
        if values.len() < fields.len() {
            continue;
        }

        let taken = documents.iter().enumerate().any(|(index, other)| {
            Some(index) != skip
                && fields
                    .iter()
                    .zip(&values)
                    .all(|(field, value)| other.get(*field) == Some(*value))
        });
        if taken {
            return Err(StoreError::DuplicateKey(format!(
                "{}.{}",
                collection,
                fields.join("+")
            )));
        }
    }

    Ok(())
}

impl Transaction for MemoryTransaction {
    async fn find_one(
        &mut self,
        collection: &str,
        filter: Document,
    ) -> StoreResult<Option<Document>> {
        for document in self.documents(collection).iter() {
            if matches(document, &filter)? {
                return Ok(Some(document.clone()));
            }
        }
        Ok(None)
    }

    async fn find(&mut self, collection: &str, filter: Document) -> StoreResult<Vec<Document>> {
        let mut found = Vec::new();
        for document in self.documents(collection).iter() {
            if matches(document, &filter)? {
                found.push(document.clone());
            }
        }
        Ok(found)
    }

    async fn insert_one(&mut self, collection: &str, document: Document) -> StoreResult<()> {
        check_unique(collection, self.documents(collection), &document, None)?;
        self.documents(collection).push(document);
        Ok(())
    }

    async fn replace_one(
        &mut self,
        collection: &str,
        filter: Document,
        replacement: Document,
    ) -> StoreResult<bool> {
        let index = match self.matching_indices(collection, &filter)?.first() {
            Some(index) => *index,
            None => return Ok(false),
        };
        check_unique(collection, self.documents(collection), &replacement, Some(index))?;
        self.documents(collection)[index] = replacement;
        Ok(true)
    }

    async fn update_one(
        &mut self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> StoreResult<u64> {
        let mut indices = self.matching_indices(collection, &filter)?;
        indices.truncate(1);
        self.update_indices(collection, &indices, &update)?;
        Ok(indices.len() as u64)
    }

    async fn update_many(
        &mut self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> StoreResult<u64> {
        let indices = self.matching_indices(collection, &filter)?;
        self.update_indices(collection, &indices, &update)?;
        Ok(indices.len() as u64)
    }

    async fn delete_one(&mut self, collection: &str, filter: Document) -> StoreResult<u64> {
        match self.matching_indices(collection, &filter)?.first() {
            Some(&index) => {
                self.documents(collection).remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_many(&mut self, collection: &str, filter: Document) -> StoreResult<u64> {
        let indices = self.matching_indices(collection, &filter)?;
        let documents = self.documents(collection);
        for index in indices.iter().rev() {
            documents.remove(*index);
        }
        Ok(indices.len() as u64)
    }

    async fn commit(self) -> StoreResult<()> {
        let MemoryTransaction { mut guard, working } = self;
        *guard = working;
        tracing::trace!("memory transaction committed");
        Ok(())
    }

    async fn abort(self) -> StoreResult<()> {
        tracing::trace!("memory transaction aborted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[tokio::test]
    async fn dropped_transactions_leave_no_writes() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_one("classes", doc! { "_id": 1, "join_code": "A" })
            .await
            .unwrap();
        drop(tx);
        assert_eq!(store.len("classes").await, 0);

        let mut tx = store.begin().await.unwrap();
        tx.insert_one("classes", doc! { "_id": 1, "join_code": "A" })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.len("classes").await, 1);
    }

    #[tokio::test]
    async fn unique_fields_are_enforced() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_one("classes", doc! { "_id": 1, "join_code": "A" })
            .await
            .unwrap();
        tx.insert_one("classes", doc! { "_id": 2, "join_code": "B" })
            .await
            .unwrap();

        let duplicate = tx
            .insert_one("classes", doc! { "_id": 3, "join_code": "A" })
            .await;
        assert!(matches!(duplicate, Err(StoreError::DuplicateKey(_))));

        let renamed = tx
            .update_one(
                "classes",
                doc! { "_id": 2 },
                doc! { "$set": { "join_code": "A" } },
            )
            .await;
        assert!(matches!(renamed, Err(StoreError::DuplicateKey(_))));

        // Replacing a document with itself is not a conflict.
        let replaced = tx
            .replace_one(
                "classes",
                doc! { "_id": 1 },
                doc! { "_id": 1, "join_code": "A", "name": "x" },
            )
            .await
            .unwrap();
        assert!(replaced);
    }

    #[tokio::test]
    async fn compound_keys_conflict_only_on_every_field() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_one("reactions", doc! { "_id": 1, "post": 10, "user": 20 })
            .await
            .unwrap();
        tx.insert_one("reactions", doc! { "_id": 2, "post": 10, "user": 21 })
            .await
            .unwrap();
        tx.insert_one("reactions", doc! { "_id": 3, "post": 11, "user": 20 })
            .await
            .unwrap();

        let duplicate = tx
            .insert_one("reactions", doc! { "_id": 4, "post": 10, "user": 20 })
            .await;
        match duplicate {
            Err(StoreError::DuplicateKey(key)) => assert_eq!(key, "reactions.post+user"),
            other => panic!("expected duplicate key, got {:?}", other),
        }

        let moved = tx
            .update_one("reactions", doc! { "_id": 3 }, doc! { "$set": { "post": 10 } })
            .await;
        assert!(matches!(moved, Err(StoreError::DuplicateKey(_))));

        tx.insert_one(
            "class.test.submissions",
            doc! { "_id": 1, "test_id": 5, "student_id": 7 },
        )
        .await
        .unwrap();
        let resubmitted = tx
            .insert_one(
                "class.test.submissions",
                doc! { "_id": 2, "test_id": 5, "student_id": 7 },
            )
            .await;
        assert!(matches!(resubmitted, Err(StoreError::DuplicateKey(_))));
    }

    #[tokio::test]
    async fn update_and_delete_many_report_counts() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        for id in 0..4 {
            tx.insert_one("posts", doc! { "_id": id, "author": id % 2 })
                .await
                .unwrap();
        }

        let updated = tx
            .update_many("posts", doc! { "author": 1 }, doc! { "$set": { "hidden": true } })
            .await
            .unwrap();
        assert_eq!(updated, 2);

        let deleted = tx.delete_many("posts", doc! { "hidden": true }).await.unwrap();
        assert_eq!(deleted, 2);
        let left = tx.find("posts", Document::new()).await.unwrap();
        assert_eq!(left.len(), 2);
        tx.commit().await.unwrap();
    }
}
