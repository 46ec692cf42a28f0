use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::role::Role;
use crate::store::Model;
use crate::util::{self, uuid_list};

pub mod db;

pub const USER_COLLECTION_NAME: &str = "users";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub phone_number: String,
    /// Produced by the authentication layer; never interpreted here.
    pub password_hash: String,
    pub role: Role,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub is_blocked: bool,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, with = "uuid_list")]
    pub joined_classes: Vec<Uuid>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Model for User {
    const COLLECTION: &'static str = USER_COLLECTION_NAME;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl User {
    pub fn new(
        username: impl ToString,
        email: impl ToString,
        phone_number: impl ToString,
        password_hash: impl ToString,
    ) -> User {
        let id = Uuid::new_v4();
        tracing::info!("Creating a new user with UUID: {}", id);

        User {
            id,
            username: username.to_string(),
            email: email.to_string(),
            phone_number: phone_number.to_string(),
            password_hash: password_hash.to_string(),
            role: Role::Student,
            is_verified: false,
            is_blocked: false,
            image: None,
            joined_classes: vec![],
            created_at: util::now(),
        }
    }

    pub fn has_joined(&self, class: Uuid) -> bool {
        self.joined_classes.contains(&class)
    }
}

/// User information safe to hand out to other users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub phone_number: String,
    pub role: Role,
    pub is_verified: bool,
    pub is_blocked: bool,
    pub image: Option<String>,
    pub joined_classes: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id,
            username: user.username,
            email: user.email,
            phone_number: user.phone_number,
            role: user.role,
            is_verified: user.is_verified,
            is_blocked: user.is_blocked,
            image: user.image,
            joined_classes: user.joined_classes,
            created_at: user.created_at,
        }
    }
}
