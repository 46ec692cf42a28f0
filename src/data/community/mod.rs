use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::store::Model;
use crate::util;

pub mod db;

pub const POST_COLLECTION_NAME: &str = "posts";
pub const COMMENT_COLLECTION_NAME: &str = "comments";
pub const REACTION_COLLECTION_NAME: &str = "reactions";

/// An uploaded file referenced by path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub url: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

impl Media {
    /// File paths this media keeps alive.
    pub fn paths(&self) -> impl Iterator<Item = &String> {
        std::iter::once(&self.url).chain(self.thumbnail.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub author: Uuid,
    pub content: String,
    #[serde(default)]
    pub media: Vec<Media>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Model for Post {
    const COLLECTION: &'static str = POST_COLLECTION_NAME;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Post {
    pub fn new(author: Uuid, content: impl ToString, media: Vec<Media>) -> Post {
        Post {
            id: Uuid::new_v4(),
            author,
            content: content.to_string(),
            media,
            created_at: util::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub post: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub author: Uuid,
    pub content: String,
    #[serde(default)]
    pub media: Option<Media>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Model for Comment {
    const COLLECTION: &'static str = COMMENT_COLLECTION_NAME;

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
    Love,
    Haha,
    Wow,
    Sad,
    Angry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub post: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub user: Uuid,
    pub kind: ReactionKind,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Model for Reaction {
    const COLLECTION: &'static str = REACTION_COLLECTION_NAME;

    fn id(&self) -> Uuid {
        self.id
    }
}

pub mod problem {
    use crate::resp::problem::{Problem, Status};
    use uuid::Uuid;

    #[inline]
    pub fn post_not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "Post not found.")
            .insert("id", id.to_string())
            .clone()
    }

    #[inline]
    pub fn empty_content() -> Problem {
        Problem::new_untyped(Status::BadRequest, "Content is required.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_paths_include_thumbnails() {
        let media = Media {
            url: "uploads/video.mp4".to_string(),
            thumbnail: Some("uploads/video.jpg".to_string()),
        };
        let paths: Vec<&str> = media.paths().map(String::as_str).collect();
        assert_eq!(paths, vec!["uploads/video.mp4", "uploads/video.jpg"]);
    }
}
