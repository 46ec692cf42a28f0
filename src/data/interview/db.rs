use bson::doc;
use uuid::Uuid;

use crate::store::{filter, ModelTxExt, StoreResult, Transaction};
use crate::util::uuid_bson;

use super::{Difficulty, InterviewSet};

#[allow(async_fn_in_trait)]
pub trait InterviewDbExt: Transaction {
    async fn get_interview_set(&mut self, id: Uuid) -> StoreResult<Option<InterviewSet>> {
        self.fetch(id).await
    }

    async fn list_interview_sets(&mut self) -> StoreResult<Vec<InterviewSet>> {
        let mut sets: Vec<InterviewSet> = self.fetch_all(filter::everything()).await?;
        sets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sets)
    }

    /// Case-insensitive substring search on a name field.
    async fn interview_sets_matching(
        &mut self,
        field: &str,
        needle: &str,
    ) -> StoreResult<Vec<InterviewSet>> {
        let mut filter = bson::Document::new();
        filter.insert(
            field,
            doc! { "$regex": regex::escape(needle), "$options": "i" },
        );
        self.fetch_all(filter).await
    }

    async fn interview_sets_with_difficulty(
        &mut self,
        difficulty: Difficulty,
    ) -> StoreResult<Vec<InterviewSet>> {
        self.fetch_all(doc! { "questions.difficulty": difficulty.as_str() })
            .await
    }

    async fn interview_sets_by(&mut self, author: Uuid) -> StoreResult<Vec<InterviewSet>> {
        self.fetch_all(doc! { "created_by": uuid_bson(author) })
            .await
    }
}

impl<T: Transaction> InterviewDbExt for T {}
