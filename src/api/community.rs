use uuid::Uuid;

use crate::auth::Caller;
use crate::data::community::db::CommunityDbExt;
use crate::data::community::{problem, Comment, Media, Post, Reaction, ReactionKind};
use crate::data::notification::db::NotificationDbExt;
use crate::data::notification::NotificationKind;
use crate::resp::problem::Problem;
use crate::store::{ModelTxExt, Store, StoreError, Transaction};
use crate::util;
use crate::Backend;

async fn existing_post<T: Transaction>(tx: &mut T, id: Uuid) -> Result<Post, Problem> {
    tx.get_post(id)
        .await?
        .ok_or_else(|| problem::post_not_found(id))
}

#[tracing::instrument(skip(backend))]
pub async fn post_create<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    content: &str,
    media: Vec<Media>,
) -> Result<Post, Problem> {
    if content.trim().is_empty() && media.is_empty() {
        return Err(problem::empty_content());
    }

    let post = Post::new(caller.user, content, media);
    let mut tx = backend.store.begin().await?;
    tx.insert(&post).await?;
    tx.commit().await?;

    Ok(post)
}

/// Comments on a post and lets its author know.
#[tracing::instrument(skip(backend))]
pub async fn comment_add<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    post: Uuid,
    content: &str,
    media: Option<Media>,
) -> Result<Comment, Problem> {
    if content.trim().is_empty() && media.is_none() {
        return Err(problem::empty_content());
    }

    let mut tx = backend.store.begin().await?;
    let post = existing_post(&mut tx, post).await?;
    let comment = Comment {
        id: Uuid::new_v4(),
        post: post.id,
        author: caller.user,
        content: content.to_string(),
        media,
        created_at: util::now(),
    };
    tx.insert(&comment).await?;
    if post.author != caller.user {
        tx.push_notification(
            post.author,
            NotificationKind::Community,
            "Someone commented on your post.",
        )
        .await?;
    }
    tx.commit().await?;

    Ok(comment)
}

#[tracing::instrument(skip(backend))]
pub async fn post_comments<S: Store>(
    backend: &Backend<S>,
    post: Uuid,
) -> Result<Vec<Comment>, Problem> {
    let mut tx = backend.store.begin().await?;
    existing_post(&mut tx, post).await?;
    let comments = tx.comments_on(post).await?;
    tx.commit().await?;
    Ok(comments)
}

/// Returns `None` when a concurrent reaction by the same user won the insert.
async fn record_reaction<S: Store>(
    backend: &Backend<S>,
    user: Uuid,
    post: Uuid,
    kind: ReactionKind,
) -> Result<Option<Reaction>, Problem> {
    let mut tx = backend.store.begin().await?;
    existing_post(&mut tx, post).await?;

    let reaction = match tx.find_reaction(post, user).await? {
        Some(mut existing) => {
            existing.kind = kind;
            tx.save(&existing).await?;
            existing
        }
        None => {
            let reaction = Reaction {
                id: Uuid::new_v4(),
                post,
                user,
                kind,
                created_at: util::now(),
            };
            match tx.insert(&reaction).await {
                Ok(()) => reaction,
                Err(StoreError::DuplicateKey(_)) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    };
    tx.commit().await?;

    Ok(Some(reaction))
}

/// Records the caller's reaction to a post. Each user has at most one
/// reaction per post; reacting again changes its kind.
#[tracing::instrument(skip(backend))]
pub async fn react<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    post: Uuid,
    kind: ReactionKind,
) -> Result<Reaction, Problem> {
    if let Some(reaction) = record_reaction(backend, caller.user, post, kind).await? {
        return Ok(reaction);
    }
    tracing::debug!("reaction of {} on {} raced, replacing it", caller.user, post);
    record_reaction(backend, caller.user, post, kind)
        .await?
        .ok_or_else(|| StoreError::DuplicateKey("reactions.post+user".to_string()).into())
}

#[tracing::instrument(skip(backend))]
pub async fn post_reactions<S: Store>(
    backend: &Backend<S>,
    post: Uuid,
) -> Result<Vec<Reaction>, Problem> {
    let mut tx = backend.store.begin().await?;
    let reactions = tx.reactions_on(post).await?;
    tx.commit().await?;
    Ok(reactions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::notification::notifications_for;
    use crate::api::testing::{backend, caller, user};
    use crate::role::Role;

    #[tokio::test]
    async fn one_reaction_per_user() {
        let backend = backend();
        let author = user(&backend, "author_user", Role::Student).await;
        let reader = user(&backend, "reader_user", Role::Student).await;
        let post = post_create(&backend, caller(&author), "First post", vec![])
            .await
            .unwrap();

        let first = react(&backend, caller(&reader), post.id, ReactionKind::Like)
            .await
            .unwrap();
        let second = react(&backend, caller(&reader), post.id, ReactionKind::Love)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);

        let reactions = post_reactions(&backend, post.id).await.unwrap();
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].kind, ReactionKind::Love);

        assert_eq!(
            react(&backend, caller(&reader), Uuid::new_v4(), ReactionKind::Wow)
                .await
                .unwrap_err()
                .code(),
            404
        );
    }

    #[tokio::test]
    async fn comments_notify_post_author() {
        let backend = backend();
        let author = user(&backend, "author_user", Role::Student).await;
        let reader = user(&backend, "reader_user", Role::Student).await;
        let post = post_create(&backend, caller(&author), "Question", vec![])
            .await
            .unwrap();

        comment_add(&backend, caller(&reader), post.id, "Answer", None)
            .await
            .unwrap();
        comment_add(&backend, caller(&author), post.id, "Thanks", None)
            .await
            .unwrap();
        assert!(post_create(&backend, caller(&author), " ", vec![]).await.is_err());

        assert_eq!(post_comments(&backend, post.id).await.unwrap().len(), 2);
        let notifications = notifications_for(&backend, caller(&author)).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::Community);
    }
}
