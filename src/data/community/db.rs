use bson::doc;
use uuid::Uuid;

use crate::store::{ModelTxExt, StoreResult, Transaction};
use crate::util::{uuid_array, uuid_bson};

use super::{
    Comment, Post, Reaction, COMMENT_COLLECTION_NAME, POST_COLLECTION_NAME,
    REACTION_COLLECTION_NAME,
};

#[allow(async_fn_in_trait)]
pub trait CommunityDbExt: Transaction {
    async fn get_post(&mut self, id: Uuid) -> StoreResult<Option<Post>> {
        self.fetch(id).await
    }

    async fn posts_by(&mut self, author: Uuid) -> StoreResult<Vec<Post>> {
        self.fetch_all(doc! { "author": uuid_bson(author) }).await
    }

    async fn comments_on(&mut self, post: Uuid) -> StoreResult<Vec<Comment>> {
        let mut comments: Vec<Comment> = self.fetch_all(doc! { "post": uuid_bson(post) }).await?;
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }

    async fn find_reaction(&mut self, post: Uuid, user: Uuid) -> StoreResult<Option<Reaction>> {
        self.fetch_one(doc! { "post": uuid_bson(post), "user": uuid_bson(user) })
            .await
    }

    async fn reactions_on(&mut self, post: Uuid) -> StoreResult<Vec<Reaction>> {
        self.fetch_all(doc! { "post": uuid_bson(post) }).await
    }

    /// Comments written by `author` or left on one of `posts`.
    async fn comments_by_or_on(
        &mut self,
        author: Uuid,
        posts: &[Uuid],
    ) -> StoreResult<Vec<Comment>> {
        self.fetch_all(doc! {
            "$or": [
                { "author": uuid_bson(author) },
                { "post": { "$in": uuid_array(posts) } },
            ]
        })
        .await
    }

    /// Deletes everything `user` contributed to the community along with
    /// the comments and reactions left on their posts.
    async fn delete_community_content(
        &mut self,
        user: Uuid,
        posts: &[Uuid],
    ) -> StoreResult<u64> {
        let mut deleted = self
            .delete_many(
                REACTION_COLLECTION_NAME,
                doc! {
                    "$or": [
                        { "user": uuid_bson(user) },
                        { "post": { "$in": uuid_array(posts) } },
                    ]
                },
            )
            .await?;
        deleted += self
            .delete_many(
                COMMENT_COLLECTION_NAME,
                doc! {
                    "$or": [
                        { "author": uuid_bson(user) },
                        { "post": { "$in": uuid_array(posts) } },
                    ]
                },
            )
            .await?;
        deleted += self
            .delete_many(POST_COLLECTION_NAME, doc! { "author": uuid_bson(user) })
            .await?;
        Ok(deleted)
    }
}

impl<T: Transaction> CommunityDbExt for T {}
