use bson::doc;
use uuid::Uuid;

use crate::store::{ModelTxExt, StoreResult, Transaction};
use crate::util::uuid_bson;

use super::{Note, Task, TaskStatus, NOTE_COLLECTION_NAME, TASK_COLLECTION_NAME};

#[allow(async_fn_in_trait)]
pub trait NotesDbExt: Transaction {
    async fn get_note(&mut self, id: Uuid) -> StoreResult<Option<Note>> {
        self.fetch(id).await
    }

    /// Notes owned by `user` or shared with them.
    async fn notes_visible_to(&mut self, user: Uuid) -> StoreResult<Vec<Note>> {
        let mut notes: Vec<Note> = self
            .fetch_all(doc! {
                "$or": [
                    { "owner": uuid_bson(user) },
                    { "shared_with.user_id": uuid_bson(user) },
                ]
            })
            .await?;
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(notes)
    }

    async fn share_note(&mut self, note: Uuid, user: Uuid, can_edit: bool) -> StoreResult<u64> {
        self.update_one(
            NOTE_COLLECTION_NAME,
            doc! { "_id": uuid_bson(note) },
            doc! { "$pull": { "shared_with": { "user_id": uuid_bson(user) } } },
        )
        .await?;
        self.update_one(
            NOTE_COLLECTION_NAME,
            doc! { "_id": uuid_bson(note) },
            doc! {
                "$push": { "shared_with": { "user_id": uuid_bson(user), "can_edit": can_edit } },
                "$set": { "updated_at": crate::util::bson_datetime(crate::util::now()) },
            },
        )
        .await
    }

    /// Deletes the notes of `user` and removes them from every share list.
    async fn delete_notes_of(&mut self, user: Uuid) -> StoreResult<u64> {
        let deleted = self
            .delete_many(NOTE_COLLECTION_NAME, doc! { "owner": uuid_bson(user) })
            .await?;
        self.update_many(
            NOTE_COLLECTION_NAME,
            doc! { "shared_with.user_id": uuid_bson(user) },
            doc! { "$pull": { "shared_with": { "user_id": uuid_bson(user) } } },
        )
        .await?;
        Ok(deleted)
    }

    async fn get_task(&mut self, id: Uuid) -> StoreResult<Option<Task>> {
        self.fetch(id).await
    }

    async fn tasks_of(&mut self, user: Uuid) -> StoreResult<Vec<Task>> {
        self.fetch_all(doc! { "owner": uuid_bson(user) }).await
    }

    async fn set_task_status(
        &mut self,
        owner: Uuid,
        task: Uuid,
        status: TaskStatus,
    ) -> StoreResult<u64> {
        self.update_one(
            TASK_COLLECTION_NAME,
            doc! { "_id": uuid_bson(task), "owner": uuid_bson(owner) },
            doc! { "$set": { "status": status.as_str() } },
        )
        .await
    }

    async fn delete_tasks_of(&mut self, user: Uuid) -> StoreResult<u64> {
        self.delete_many(TASK_COLLECTION_NAME, doc! { "owner": uuid_bson(user) })
            .await
    }
}

impl<T: Transaction> NotesDbExt for T {}
