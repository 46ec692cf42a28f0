use bson::doc;
use uuid::Uuid;

use crate::store::{filter, ModelTxExt, StoreResult, Transaction};
use crate::util::uuid_bson;

use super::Subject;

#[allow(async_fn_in_trait)]
pub trait QuizDbExt: Transaction {
    async fn get_subject(&mut self, id: Uuid) -> StoreResult<Option<Subject>> {
        self.fetch(id).await
    }

    async fn list_subjects(&mut self) -> StoreResult<Vec<Subject>> {
        let mut subjects: Vec<Subject> = self.fetch_all(filter::everything()).await?;
        subjects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(subjects)
    }

    async fn subjects_by_author(&mut self, author: Uuid) -> StoreResult<Vec<Subject>> {
        self.fetch_all(doc! { "created_by": uuid_bson(author) })
            .await
    }

    /// Subject holding a question with the given id, if any.
    async fn subject_with_question(&mut self, question: Uuid) -> StoreResult<Option<Subject>> {
        self.fetch_one(doc! { "topics.questions._id": uuid_bson(question) })
            .await
    }
}

impl<T: Transaction> QuizDbExt for T {}
