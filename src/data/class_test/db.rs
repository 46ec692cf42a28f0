use bson::doc;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::store::{filter, ModelTxExt, StoreResult, Transaction};
use crate::util::{bson_datetime, uuid_array, uuid_bson};

use super::{
    ClassTest, TestSubmission, CLASS_TEST_COLLECTION_NAME, SUBMISSION_COLLECTION_NAME,
};

fn by_start_time(mut tests: Vec<ClassTest>) -> Vec<ClassTest> {
    tests.sort_by(|a, b| a.start_time.cmp(&b.start_time));
    tests
}

#[allow(async_fn_in_trait)]
pub trait ClassTestDbExt: Transaction {
    async fn get_class_test(&mut self, id: Uuid) -> StoreResult<Option<ClassTest>> {
        self.fetch(id).await
    }

    async fn list_class_tests(&mut self) -> StoreResult<Vec<ClassTest>> {
        Ok(by_start_time(self.fetch_all(filter::everything()).await?))
    }

    async fn class_tests_in(&mut self, class: Uuid) -> StoreResult<Vec<ClassTest>> {
        Ok(by_start_time(
            self.fetch_all(doc! { "class_id": uuid_bson(class) }).await?,
        ))
    }

    async fn class_tests_created_by(&mut self, user: Uuid) -> StoreResult<Vec<ClassTest>> {
        Ok(by_start_time(
            self.fetch_all(doc! { "created_by": uuid_bson(user) })
                .await?,
        ))
    }

    async fn class_tests_starting_after(
        &mut self,
        class: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<ClassTest>> {
        Ok(by_start_time(
            self.fetch_all(doc! {
                "class_id": uuid_bson(class),
                "start_time": { "$gt": bson_datetime(at) },
            })
            .await?,
        ))
    }

    /// Deletes the tests of a class with their submissions.
    async fn delete_class_tests(&mut self, class: Uuid) -> StoreResult<u64> {
        self.delete_many(
            SUBMISSION_COLLECTION_NAME,
            doc! { "class_id": uuid_bson(class) },
        )
        .await?;
        self.delete_many(
            CLASS_TEST_COLLECTION_NAME,
            doc! { "class_id": uuid_bson(class) },
        )
        .await
    }

    async fn find_submission(
        &mut self,
        test: Uuid,
        student: Uuid,
    ) -> StoreResult<Option<TestSubmission>> {
        self.fetch_one(doc! {
            "test_id": uuid_bson(test),
            "student_id": uuid_bson(student),
        })
        .await
    }

    async fn submissions_for(&mut self, test: Uuid) -> StoreResult<Vec<TestSubmission>> {
        self.fetch_all(doc! { "test_id": uuid_bson(test) }).await
    }

    async fn delete_submissions_for_tests(&mut self, tests: &[Uuid]) -> StoreResult<u64> {
        if tests.is_empty() {
            return Ok(0);
        }
        self.delete_many(
            SUBMISSION_COLLECTION_NAME,
            doc! { "test_id": { "$in": uuid_array(tests) } },
        )
        .await
    }

    async fn delete_submissions_by(&mut self, student: Uuid) -> StoreResult<u64> {
        self.delete_many(
            SUBMISSION_COLLECTION_NAME,
            doc! { "student_id": uuid_bson(student) },
        )
        .await
    }
}

impl<T: Transaction> ClassTestDbExt for T {}
