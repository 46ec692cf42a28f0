use bson::Document;
use mongodb::options::IndexOptions;
use mongodb::{Client, ClientSession, Database, IndexModel};

use super::{Store, StoreError, StoreResult, Transaction, UNIQUE_KEYS};

/// MongoDB backed store. Each [Transaction] owns a client session.
#[derive(Debug, Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
    transactional: bool,
}

impl MongoStore {
    pub fn new(client: Client, db_name: &str, transactional: bool) -> MongoStore {
        let db = client.database(db_name);
        MongoStore {
            client,
            db,
            transactional,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Creates the unique indexes backing [UNIQUE_KEYS].
    pub async fn ensure_indexes(&self) -> StoreResult<()> {
        for (collection, fields) in UNIQUE_KEYS {
            let mut keys = Document::new();
            for field in fields.iter() {
                keys.insert(*field, 1);
            }
            let index = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build();

            self.db
                .collection::<Document>(collection)
                .create_index(index, None)
                .await
                .map_err(StoreError::from_mongodb)?;
            tracing::info!(
                "Ensured unique index on {}.({})",
                collection,
                fields.join(", ")
            );
        }
        Ok(())
    }
}

impl Store for MongoStore {
    type Tx = MongoTransaction;

    async fn begin(&self) -> StoreResult<MongoTransaction> {
        let mut session = self
            .client
            .start_session(None)
            .await
            .map_err(StoreError::from_mongodb)?;
        if self.transactional {
            session
                .start_transaction(None)
                .await
                .map_err(StoreError::from_mongodb)?;
        }

        Ok(MongoTransaction {
            db: self.db.clone(),
            session,
            transactional: self.transactional,
        })
    }
}

/// Dropping the session aborts an uncommitted server transaction.
pub struct MongoTransaction {
    db: Database,
    session: ClientSession,
    transactional: bool,
}

impl MongoTransaction {
    fn collection(&self, name: &str) -> mongodb::Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

impl Transaction for MongoTransaction {
    async fn find_one(
        &mut self,
        collection: &str,
        filter: Document,
    ) -> StoreResult<Option<Document>> {
        self.collection(collection)
            .find_one_with_session(filter, None, &mut self.session)
            .await
            .map_err(StoreError::from_mongodb)
    }

    async fn find(&mut self, collection: &str, filter: Document) -> StoreResult<Vec<Document>> {
        let mut cursor = self
            .collection(collection)
            .find_with_session(filter, None, &mut self.session)
            .await
            .map_err(StoreError::from_mongodb)?;

        let mut documents = Vec::new();
        while let Some(document) = cursor.next(&mut self.session).await {
            documents.push(document.map_err(StoreError::from_mongodb)?);
        }
        Ok(documents)
    }

    async fn insert_one(&mut self, collection: &str, document: Document) -> StoreResult<()> {
        self.collection(collection)
            .insert_one_with_session(document, None, &mut self.session)
            .await
            .map_err(StoreError::from_mongodb)?;
        Ok(())
    }

    async fn replace_one(
        &mut self,
        collection: &str,
        filter: Document,
        replacement: Document,
    ) -> StoreResult<bool> {
        let result = self
            .collection(collection)
            .replace_one_with_session(filter, replacement, None, &mut self.session)
            .await
            .map_err(StoreError::from_mongodb)?;
        Ok(result.matched_count > 0)
    }

    async fn update_one(
        &mut self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> StoreResult<u64> {
        let result = self
            .collection(collection)
            .update_one_with_session(filter, update, None, &mut self.session)
            .await
            .map_err(StoreError::from_mongodb)?;
        Ok(result.matched_count)
    }

    async fn update_many(
        &mut self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> StoreResult<u64> {
        let result = self
            .collection(collection)
            .update_many_with_session(filter, update, None, &mut self.session)
            .await
            .map_err(StoreError::from_mongodb)?;
        Ok(result.matched_count)
    }

    async fn delete_one(&mut self, collection: &str, filter: Document) -> StoreResult<u64> {
        let result = self
            .collection(collection)
            .delete_one_with_session(filter, None, &mut self.session)
            .await
            .map_err(StoreError::from_mongodb)?;
        Ok(result.deleted_count)
    }

    async fn delete_many(&mut self, collection: &str, filter: Document) -> StoreResult<u64> {
        let result = self
            .collection(collection)
            .delete_many_with_session(filter, None, &mut self.session)
            .await
            .map_err(StoreError::from_mongodb)?;
        Ok(result.deleted_count)
    }

    async fn commit(mut self) -> StoreResult<()> {
        if self.transactional {
            self.session
                .commit_transaction()
                .await
                .map_err(StoreError::from_mongodb)?;
        }
        Ok(())
    }

    async fn abort(mut self) -> StoreResult<()> {
        if self.transactional {
            self.session
                .abort_transaction()
                .await
                .map_err(StoreError::from_mongodb)?;
        }
        Ok(())
    }
}
