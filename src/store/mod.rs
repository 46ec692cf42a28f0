//! Transactional access to the document collections.
//!
//! Every operation in [crate::api] runs inside a single [Transaction]. Dropping
//! a transaction without calling [Transaction::commit] discards its writes, so
//! returning early with `?` never leaves partially applied changes behind.

use bson::{doc, Document};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::util::uuid_bson;

pub mod memory;
pub mod mongo;
pub mod query;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Keys that must be unique within their collection, besides `_id`. A
/// compound key only conflicts when every one of its fields matches.
pub static UNIQUE_KEYS: &[(&str, &[&str])] = &[
    ("users", &["email"]),
    ("users", &["username"]),
    ("classes", &["join_code"]),
    ("class.test.submissions", &["test_id", "student_id"]),
    ("reactions", &["post", "user"]),
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
    #[error(transparent)]
    Serialize(#[from] bson::ser::Error),
    #[error(transparent)]
    Deserialize(#[from] bson::de::Error),
    #[error("duplicate value for unique key '{0}'")]
    DuplicateKey(String),
    #[error("unsupported operator '{0}'")]
    UnsupportedOperator(String),
    #[error("malformed {0}")]
    Malformed(&'static str),
}

impl StoreError {
    /// Converts driver errors, recognizing duplicate key write failures.
    pub fn from_mongodb(e: mongodb::error::Error) -> StoreError {
        use mongodb::error::{ErrorKind, WriteFailure};

        if let ErrorKind::Write(WriteFailure::WriteError(write)) = e.kind.as_ref() {
            if write.code == 11000 {
                return StoreError::DuplicateKey(write.message.clone());
            }
        }
        StoreError::Database(e)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[allow(async_fn_in_trait)]
pub trait Store {
    type Tx: Transaction;

    async fn begin(&self) -> StoreResult<Self::Tx>;
}

#[allow(async_fn_in_trait)]
pub trait Transaction: Sized {
    async fn find_one(&mut self, collection: &str, filter: Document)
        -> StoreResult<Option<Document>>;
    async fn find(&mut self, collection: &str, filter: Document) -> StoreResult<Vec<Document>>;
    async fn insert_one(&mut self, collection: &str, document: Document) -> StoreResult<()>;
    /// Returns whether a document matched the filter.
    async fn replace_one(
        &mut self,
        collection: &str,
        filter: Document,
        replacement: Document,
    ) -> StoreResult<bool>;
    /// Returns the number of matched documents.
    async fn update_one(
        &mut self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> StoreResult<u64>;
    async fn update_many(
        &mut self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> StoreResult<u64>;
    /// Returns the number of deleted documents.
    async fn delete_one(&mut self, collection: &str, filter: Document) -> StoreResult<u64>;
    async fn delete_many(&mut self, collection: &str, filter: Document) -> StoreResult<u64>;

    async fn commit(self) -> StoreResult<()>;
    async fn abort(self) -> StoreResult<()>;
}

/// A document type stored in its own collection under a UUID `_id`.
pub trait Model: Serialize + DeserializeOwned {
    const COLLECTION: &'static str;

    fn id(&self) -> Uuid;
}

pub mod filter {
    use super::*;

    #[inline]
    pub fn by_id(id: Uuid) -> Document {
        doc! { "_id": uuid_bson(id) }
    }

    #[inline]
    pub fn by_ids(ids: &[Uuid]) -> Document {
        doc! { "_id": { "$in": crate::util::uuid_array(ids) } }
    }

    #[inline]
    pub fn everything() -> Document {
        Document::new()
    }
}

/// Typed helpers over [Transaction] for [Model] documents.
#[allow(async_fn_in_trait)]
pub trait ModelTxExt: Transaction {
    async fn fetch<M: Model>(&mut self, id: Uuid) -> StoreResult<Option<M>> {
        self.fetch_one(filter::by_id(id)).await
    }

    async fn fetch_one<M: Model>(&mut self, filter: Document) -> StoreResult<Option<M>> {
        match self.find_one(M::COLLECTION, filter).await? {
            Some(document) => Ok(Some(bson::from_document(document)?)),
            None => Ok(None),
        }
    }

    async fn fetch_all<M: Model>(&mut self, filter: Document) -> StoreResult<Vec<M>> {
        let documents = self.find(M::COLLECTION, filter).await?;
        let mut models = Vec::with_capacity(documents.len());
        for document in documents {
            models.push(bson::from_document(document)?);
        }
        Ok(models)
    }

    async fn insert<M: Model>(&mut self, model: &M) -> StoreResult<()> {
        let document = bson::to_document(model)?;
        self.insert_one(M::COLLECTION, document).await
    }

    /// Replaces the stored document with the same id.
    async fn save<M: Model>(&mut self, model: &M) -> StoreResult<bool> {
        let document = bson::to_document(model)?;
        self.replace_one(M::COLLECTION, filter::by_id(model.id()), document)
            .await
    }

    async fn remove<M: Model>(&mut self, id: Uuid) -> StoreResult<Option<M>> {
        let existing = self.fetch::<M>(id).await?;
        if existing.is_some() {
            self.delete_one(M::COLLECTION, filter::by_id(id)).await?;
        }
        Ok(existing)
    }
}

impl<T: Transaction> ModelTxExt for T {}
