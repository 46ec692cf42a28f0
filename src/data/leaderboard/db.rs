use bson::doc;
use uuid::Uuid;

use crate::store::{ModelTxExt, StoreResult, Transaction};
use crate::util::uuid_bson;

use super::{WeeklyQuiz, WEEKLY_QUIZ_COLLECTION_NAME};

#[allow(async_fn_in_trait)]
pub trait LeaderboardDbExt: Transaction {
    async fn get_weekly_quiz(&mut self, id: Uuid) -> StoreResult<Option<WeeklyQuiz>> {
        self.fetch(id).await
    }

    async fn pull_from_leaderboards(&mut self, student: Uuid) -> StoreResult<u64> {
        self.update_many(
            WEEKLY_QUIZ_COLLECTION_NAME,
            doc! { "leaderboard.student_id": uuid_bson(student) },
            doc! { "$pull": { "leaderboard": { "student_id": uuid_bson(student) } } },
        )
        .await
    }
}

impl<T: Transaction> LeaderboardDbExt for T {}
