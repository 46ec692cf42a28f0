use bson::{doc, Document};
use regex::Regex;
use uuid::Uuid;

use crate::resp::problem::Problem;
use crate::role::Role;
use crate::store::{filter, ModelTxExt, StoreResult, Transaction};
use crate::util::{uuid_array, uuid_bson};

use super::{User, USER_COLLECTION_NAME};

lazy_static! {
    static ref EMAIL: Regex =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern must compile");
}

pub mod problem {
    use crate::resp::problem::{Problem, Status};
    use uuid::Uuid;

    #[inline]
    pub fn bad_email(email: impl ToString, detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad email.")
            .insert_str("email", email)
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn bad_username(username: impl ToString, detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "Bad username.")
            .insert_str("username", username)
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn missing_field(field: &str) -> Problem {
        Problem::new_untyped(Status::BadRequest, "All fields are required.")
            .insert_str("field", field)
            .to_owned()
    }

    #[inline]
    pub fn already_exists(email: impl ToString) -> Problem {
        Problem::new_untyped(Status::BadRequest, "User already exists.")
            .insert_str("email", email)
            .to_owned()
    }

    #[inline]
    pub fn not_found(id: Uuid) -> Problem {
        Problem::new_untyped(Status::NotFound, "User not found.")
            .insert("id", id.to_string())
            .clone()
    }

    #[inline]
    pub fn blocked(id: Uuid) -> Problem {
        Problem::new_untyped(Status::Forbidden, "User is blocked.")
            .insert("id", id.to_string())
            .clone()
    }
}

#[derive(Clone, Deserialize)]
pub struct UserSignupData {
    pub username: String,
    pub email: String,
    pub phone_number: String,
    pub password_hash: String,
}

impl std::fmt::Debug for UserSignupData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UserSignupInfo:{}", self.username)
    }
}

impl UserSignupData {
    pub fn validate(&self) -> Result<(), Problem> {
        for (field, value) in [
            ("username", &self.username),
            ("email", &self.email),
            ("phone_number", &self.phone_number),
            ("password_hash", &self.password_hash),
        ] {
            if value.trim().is_empty() {
                return Err(problem::missing_field(field));
            }
        }

        if !EMAIL.is_match(&self.email) {
            return Err(problem::bad_email(
                self.email.to_string(),
                "Not a valid e-mail address.",
            ));
        }

        if self.username.len() < 5 {
            return Err(problem::bad_username(
                self.username.to_string(),
                "Username must be at least 5 characters (bytes) long.",
            ));
        }

        if self.username.len() > 32 {
            return Err(problem::bad_username(
                self.username.to_string(),
                "Username can't be longer than 32 (bytes) characters.",
            ));
        }

        Ok(())
    }
}

impl From<UserSignupData> for User {
    fn from(data: UserSignupData) -> Self {
        User::new(
            data.username,
            data.email,
            data.phone_number,
            data.password_hash,
        )
    }
}

#[allow(async_fn_in_trait)]
pub trait UserDbExt: Transaction {
    async fn get_user(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        self.fetch(id).await
    }

    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>> {
        self.fetch_one(doc! { "email": email }).await
    }

    async fn find_user_by_username(&mut self, username: &str) -> StoreResult<Option<User>> {
        self.fetch_one(doc! { "username": username }).await
    }

    async fn list_users(&mut self, role: Option<Role>) -> StoreResult<Vec<User>> {
        let filter = match role {
            Some(role) => doc! { "role": role.as_str() },
            None => filter::everything(),
        };
        self.fetch_all(filter).await
    }

    /// Users among `ids` that hold `role`.
    async fn find_users_with_role(&mut self, ids: &[Uuid], role: Role) -> StoreResult<Vec<User>> {
        let mut filter = filter::by_ids(ids);
        filter.insert("role", role.as_str());
        self.fetch_all(filter).await
    }

    /// Users whose joined classes include `class`.
    async fn users_in_class(&mut self, class: Uuid) -> StoreResult<Vec<User>> {
        self.fetch_all(doc! { "joined_classes": uuid_bson(class) })
            .await
    }

    async fn set_user_fields(&mut self, id: Uuid, fields: Document) -> StoreResult<u64> {
        self.update_one(USER_COLLECTION_NAME, filter::by_id(id), doc! { "$set": fields })
            .await
    }

    async fn add_class_to_users(&mut self, users: &[Uuid], class: Uuid) -> StoreResult<u64> {
        if users.is_empty() {
            return Ok(0);
        }
        self.update_many(
            USER_COLLECTION_NAME,
            filter::by_ids(users),
            doc! { "$addToSet": { "joined_classes": uuid_bson(class) } },
        )
        .await
    }

    async fn pull_class_from_users(&mut self, users: &[Uuid], class: Uuid) -> StoreResult<u64> {
        if users.is_empty() {
            return Ok(0);
        }
        self.update_many(
            USER_COLLECTION_NAME,
            doc! {
                "_id": { "$in": uuid_array(users) },
                "joined_classes": uuid_bson(class),
            },
            doc! { "$pull": { "joined_classes": uuid_bson(class) } },
        )
        .await
    }
}

impl<T: Transaction> UserDbExt for T {}
