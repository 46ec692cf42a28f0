use bson::doc;
use uuid::Uuid;

use crate::store::{filter, ModelTxExt, StoreResult, Transaction};
use crate::util::uuid_bson;

use super::{Class, ClassRole, CLASS_COLLECTION_NAME};

#[allow(async_fn_in_trait)]
pub trait ClassDbExt: Transaction {
    async fn get_class(&mut self, id: Uuid) -> StoreResult<Option<Class>> {
        self.fetch(id).await
    }

    async fn find_class_by_code(&mut self, join_code: &str) -> StoreResult<Option<Class>> {
        self.fetch_one(doc! { "join_code": join_code }).await
    }

    async fn list_classes(&mut self) -> StoreResult<Vec<Class>> {
        self.fetch_all(filter::everything()).await
    }

    async fn classes_by_ids(&mut self, ids: &[Uuid]) -> StoreResult<Vec<Class>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        self.fetch_all(filter::by_ids(ids)).await
    }

    /// Classes listing `user` as mentor or student.
    async fn classes_with_member(&mut self, user: Uuid) -> StoreResult<Vec<Class>> {
        self.fetch_all(doc! {
            "$or": [
                { "mentors": uuid_bson(user) },
                { "students": uuid_bson(user) },
            ]
        })
        .await
    }

    async fn classes_with_mentor(&mut self, user: Uuid) -> StoreResult<Vec<Class>> {
        self.fetch_all(doc! { "mentors": uuid_bson(user) }).await
    }

    async fn add_class_member(
        &mut self,
        class: Uuid,
        role: ClassRole,
        user: Uuid,
    ) -> StoreResult<u64> {
        let mut add = bson::Document::new();
        add.insert(role.field(), uuid_bson(user));
        self.update_one(
            CLASS_COLLECTION_NAME,
            filter::by_id(class),
            doc! { "$addToSet": add },
        )
        .await
    }

    async fn pull_class_member(
        &mut self,
        class: Uuid,
        role: ClassRole,
        user: Uuid,
    ) -> StoreResult<u64> {
        let mut pull = bson::Document::new();
        pull.insert(role.field(), uuid_bson(user));
        self.update_one(
            CLASS_COLLECTION_NAME,
            filter::by_id(class),
            doc! { "$pull": pull },
        )
        .await
    }

    /// Removes `user` from the member lists of every class.
    async fn pull_member_from_classes(&mut self, user: Uuid) -> StoreResult<u64> {
        self.update_many(
            CLASS_COLLECTION_NAME,
            doc! {
                "$or": [
                    { "mentors": uuid_bson(user) },
                    { "students": uuid_bson(user) },
                ]
            },
            doc! {
                "$pull": {
                    "mentors": uuid_bson(user),
                    "students": uuid_bson(user),
                }
            },
        )
        .await
    }
}

impl<T: Transaction> ClassDbExt for T {}
