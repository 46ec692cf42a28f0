//! Operations of the platform.
//!
//! Each function runs in a single store transaction: all reads and writes
//! happen inside it and it is committed only once every check has passed.

use uuid::Uuid;

use crate::data::class::db::ClassDbExt;
use crate::data::class::{problem as class_problem, Class};
use crate::data::user::db::{problem as user_problem, UserDbExt};
use crate::data::user::User;
use crate::resp::problem::Problem;
use crate::store::Transaction;

pub mod class;
pub mod community;
pub mod interview;
pub mod leaderboard;
pub mod notes;
pub mod notification;
pub mod quiz;
pub mod users;

pub(crate) async fn existing_user<T: Transaction>(tx: &mut T, id: Uuid) -> Result<User, Problem> {
    tx.get_user(id)
        .await?
        .ok_or_else(|| user_problem::not_found(id))
}

pub(crate) async fn existing_class<T: Transaction>(tx: &mut T, id: Uuid) -> Result<Class, Problem> {
    tx.get_class(id)
        .await?
        .ok_or_else(|| class_problem::not_found(id))
}

#[cfg(test)]
pub(crate) mod testing {
    use uuid::Uuid;

    use crate::auth::Caller;
    use crate::config::Config;
    use crate::data::user::User;
    use crate::role::Role;
    use crate::store::{MemoryStore, ModelTxExt, Store, Transaction};
    use crate::Backend;

    pub fn backend() -> Backend<MemoryStore> {
        Backend::new(MemoryStore::new(), Config::default())
    }

    pub async fn user(backend: &Backend<MemoryStore>, username: &str, role: Role) -> User {
        let mut user = User::new(
            username,
            format!("{}@example.com", username),
            "+385 91 000 000",
            "hash",
        );
        user.role = role;

        let mut tx = backend.store.begin().await.unwrap();
        tx.insert(&user).await.unwrap();
        tx.commit().await.unwrap();
        user
    }

    pub async fn reload(backend: &Backend<MemoryStore>, id: Uuid) -> User {
        let mut tx = backend.store.begin().await.unwrap();
        tx.fetch(id).await.unwrap().expect("user exists")
    }

    pub fn caller(user: &User) -> Caller {
        Caller::for_user(user).unwrap()
    }
}
