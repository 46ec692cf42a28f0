use bson::doc;
use uuid::Uuid;

use crate::store::{ModelTxExt, StoreResult, Transaction};
use crate::util::uuid_bson;

use super::{Notification, NotificationKind, NOTIFICATION_COLLECTION_NAME};

#[allow(async_fn_in_trait)]
pub trait NotificationDbExt: Transaction {
    async fn push_notification(
        &mut self,
        user: Uuid,
        kind: NotificationKind,
        message: &str,
    ) -> StoreResult<Notification> {
        let notification = Notification::new(user, kind, message);
        self.insert(&notification).await?;
        Ok(notification)
    }

    /// Sends the same notification to every user in `users`.
    async fn push_notifications(
        &mut self,
        users: &[Uuid],
        kind: NotificationKind,
        message: &str,
    ) -> StoreResult<usize> {
        for user in users {
            self.push_notification(*user, kind, message).await?;
        }
        Ok(users.len())
    }

    async fn notifications_of(&mut self, user: Uuid) -> StoreResult<Vec<Notification>> {
        let mut notifications: Vec<Notification> =
            self.fetch_all(doc! { "user": uuid_bson(user) }).await?;
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    /// Marks one notification of `user` as read.
    async fn mark_notification_read(&mut self, user: Uuid, id: Uuid) -> StoreResult<u64> {
        self.update_one(
            NOTIFICATION_COLLECTION_NAME,
            doc! { "_id": uuid_bson(id), "user": uuid_bson(user) },
            doc! { "$set": { "is_read": true } },
        )
        .await
    }

    async fn mark_notifications_read(&mut self, user: Uuid) -> StoreResult<u64> {
        self.update_many(
            NOTIFICATION_COLLECTION_NAME,
            doc! { "user": uuid_bson(user), "is_read": false },
            doc! { "$set": { "is_read": true } },
        )
        .await
    }

    async fn count_unread(&mut self, user: Uuid) -> StoreResult<usize> {
        let unread = self
            .find(
                NOTIFICATION_COLLECTION_NAME,
                doc! { "user": uuid_bson(user), "is_read": false },
            )
            .await?;
        Ok(unread.len())
    }

    async fn delete_notification(&mut self, user: Uuid, id: Uuid) -> StoreResult<u64> {
        self.delete_one(
            NOTIFICATION_COLLECTION_NAME,
            doc! { "_id": uuid_bson(id), "user": uuid_bson(user) },
        )
        .await
    }

    async fn delete_notifications_of(&mut self, user: Uuid) -> StoreResult<u64> {
        self.delete_many(
            NOTIFICATION_COLLECTION_NAME,
            doc! { "user": uuid_bson(user) },
        )
        .await
    }
}

impl<T: Transaction> NotificationDbExt for T {}
