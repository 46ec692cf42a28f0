use uuid::Uuid;

use crate::api::existing_user;
use crate::auth::Caller;
use crate::data::notification::db::NotificationDbExt;
use crate::data::notification::{problem, Notification, NotificationKind};
use crate::resp::problem::Problem;
use crate::store::{Store, Transaction};
use crate::Backend;

#[tracing::instrument(skip(backend))]
pub async fn notify<S: Store>(
    backend: &Backend<S>,
    user: Uuid,
    kind: NotificationKind,
    message: &str,
) -> Result<Notification, Problem> {
    if message.trim().is_empty() {
        return Err(problem::empty_message());
    }

    let mut tx = backend.store.begin().await?;
    existing_user(&mut tx, user).await?;
    let notification = tx.push_notification(user, kind, message).await?;
    tx.commit().await?;

    Ok(notification)
}

/// The caller's notifications, newest first.
#[tracing::instrument(skip(backend))]
pub async fn notifications_for<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
) -> Result<Vec<Notification>, Problem> {
    let mut tx = backend.store.begin().await?;
    let notifications = tx.notifications_of(caller.user).await?;
    tx.commit().await?;
    Ok(notifications)
}

#[tracing::instrument(skip(backend))]
pub async fn notification_mark_read<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    id: Uuid,
) -> Result<(), Problem> {
    let mut tx = backend.store.begin().await?;
    if tx.mark_notification_read(caller.user, id).await? == 0 {
        return Err(problem::not_found(id));
    }
    tx.commit().await?;
    Ok(())
}

/// Returns how many notifications were unread.
#[tracing::instrument(skip(backend))]
pub async fn notifications_mark_all_read<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
) -> Result<u64, Problem> {
    let mut tx = backend.store.begin().await?;
    let marked = tx.mark_notifications_read(caller.user).await?;
    tx.commit().await?;
    Ok(marked)
}

#[tracing::instrument(skip(backend))]
pub async fn notifications_unread_count<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
) -> Result<usize, Problem> {
    let mut tx = backend.store.begin().await?;
    let count = tx.count_unread(caller.user).await?;
    tx.commit().await?;
    Ok(count)
}

#[tracing::instrument(skip(backend))]
pub async fn notification_delete<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    id: Uuid,
) -> Result<(), Problem> {
    let mut tx = backend.store.begin().await?;
    if tx.delete_notification(caller.user, id).await? == 0 {
        return Err(problem::not_found(id));
    }
    tx.commit().await?;
    Ok(())
}
