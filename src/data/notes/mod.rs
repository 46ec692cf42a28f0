use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::resp::problem::Problem;
use crate::store::Model;
use crate::util;

pub mod db;

pub const NOTE_COLLECTION_NAME: &str = "notes";
pub const TASK_COLLECTION_NAME: &str = "tasks";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedWith {
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub user_id: Uuid,
    #[serde(default)]
    pub can_edit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub owner: Uuid,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub shared_with: Vec<SharedWith>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Model for Note {
    const COLLECTION: &'static str = NOTE_COLLECTION_NAME;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Note {
    pub fn new(owner: Uuid, title: impl ToString, content: impl ToString) -> Note {
        let now = util::now();
        Note {
            id: Uuid::new_v4(),
            owner,
            title: title.to_string(),
            content: content.to_string(),
            shared_with: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_shared_with(&self, user: Uuid) -> bool {
        self.shared_with.iter().any(|it| it.user_id == user)
    }

    /// Owners always edit; others need a share entry with `can_edit`.
    pub fn editable_by(&self, user: Uuid) -> bool {
        self.owner == user
            || self
                .shared_with
                .iter()
                .any(|it| it.user_id == user && it.can_edit)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoteUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl NoteUpdate {
    pub fn apply_to(self, note: &mut Note) -> Result<(), Problem> {
        if let Some(title) = self.title {
            if title.trim().is_empty() {
                return Err(problem::title_required());
            }
            note.title = title.trim().to_string();
        }
        if let Some(content) = self.content {
            note.content = content;
        }
        note.updated_at = util::now();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub owner: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub important: bool,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, with = "crate::util::datetime_option")]
    pub due: Option<DateTime<Utc>>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Model for Task {
    const COLLECTION: &'static str = TASK_COLLECTION_NAME;

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskData {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub important: bool,
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
}

impl TaskData {
    pub fn into_task(self, owner: Uuid) -> Task {
        Task {
            id: Uuid::new_v4(),
            owner,
            title: self.title,
            description: self.description,
            priority: self.priority,
            important: self.important,
            status: TaskStatus::Pending,
            due: self.due,
            created_at: util::now(),
        }
    }
}

/// Which tasks [crate::api::notes::task_list] returns and in what order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskFilter {
    #[default]
    All,
    Important,
    ByDue,
}

pub mod problem {
    use crate::resp::problem::{Problem, Status};
    use uuid::Uuid;

    #[inline]
    pub fn note_not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "Note not found.")
            .insert("id", id.to_string())
            .clone()
    }

    #[inline]
    pub fn task_not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "Task not found.")
            .insert("id", id.to_string())
            .clone()
    }

    #[inline]
    pub fn title_required() -> Problem {
        Problem::new_untyped(Status::BadRequest, "Title is required.")
    }

    #[inline]
    pub fn read_only(id: Uuid) -> Problem {
        Problem::new_untyped(Status::Forbidden, "Not authorized.")
            .detail("This note was shared without edit access.")
            .insert("id", id.to_string())
            .clone()
    }

    #[inline]
    pub fn share_with_self() -> Problem {
        Problem::new_untyped(Status::BadRequest, "Can't share a note with its owner.")
    }
}
