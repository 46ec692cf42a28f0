use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::store::Model;
use crate::util;

pub mod db;

pub const NOTIFICATION_COLLECTION_NAME: &str = "notifications";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Quiz,
    Class,
    Community,
    Task,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub user: Uuid,
    pub message: String,
    pub kind: NotificationKind,
    #[serde(default)]
    pub is_read: bool,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Model for Notification {
    const COLLECTION: &'static str = NOTIFICATION_COLLECTION_NAME;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Notification {
    pub fn new(user: Uuid, kind: NotificationKind, message: impl ToString) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user,
            message: message.to_string(),
            kind,
            is_read: false,
            created_at: util::now(),
        }
    }
}

pub mod problem {
    use crate::resp::problem::{Problem, Status};
    use uuid::Uuid;

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "Notification not found.")
            .insert("id", id.to_string())
            .clone()
    }

    #[inline]
    pub fn empty_message() -> Problem {
        Problem::new_untyped(Status::BadRequest, "Notification message is required.")
    }
}
