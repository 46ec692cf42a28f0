use uuid::Uuid;

use crate::data::user::db::{problem as user_problem, UserDbExt};
use crate::data::user::User;
use crate::resp::problem::problems::forbidden;
use crate::resp::problem::{Problem, Status};
use crate::role::Role;
use crate::store::{Store, Transaction};

/// The authenticated user an operation is performed for.
///
/// Resolved from the store on every request so a changed role or a block
/// takes effect immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user: Uuid,
    pub role: Role,
}

impl Caller {
    pub async fn authenticate<S: Store>(store: &S, user: Uuid) -> Result<Caller, Problem> {
        let mut tx = store.begin().await?;
        let found = tx.get_user(user).await?;
        tx.commit().await?;

        match found {
            Some(user) => Caller::for_user(&user),
            None => Err(auth_problem("User does not exist.")),
        }
    }

    pub fn for_user(user: &User) -> Result<Caller, Problem> {
        if user.is_blocked {
            tracing::debug!("rejecting blocked user {}", user.id);
            return Err(user_problem::blocked(user.id));
        }

        Ok(Caller {
            user: user.id,
            role: user.role,
        })
    }

    /// Administrative caller used by maintenance tooling.
    pub fn console() -> Caller {
        Caller {
            user: Uuid::nil(),
            role: Role::Admin,
        }
    }

    pub fn require_admin(&self) -> Result<(), Problem> {
        if self.role.is_admin() {
            Ok(())
        } else {
            Err(forbidden("Admin access required."))
        }
    }

    pub fn require_author(&self) -> Result<(), Problem> {
        if self.role.can_author() {
            Ok(())
        } else {
            Err(forbidden("Mentor access required."))
        }
    }

    /// Owners and admins may modify a resource.
    pub fn require_owner(&self, owner: Uuid, what: &str) -> Result<(), Problem> {
        if self.user == owner || self.role.is_admin() {
            Ok(())
        } else {
            Err(forbidden(format!("Not authorized to modify this {}.", what)))
        }
    }
}

pub fn auth_problem(detail: impl ToString) -> Problem {
    Problem::new_untyped(Status::Unauthorized, "Unable to authorize user.")
        .detail(detail)
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, ModelTxExt};

    #[tokio::test]
    async fn blocked_users_cannot_authenticate() {
        let store = MemoryStore::new();
        let mut user = User::new("blocked_user", "b@example.com", "123", "hash");
        user.is_blocked = true;

        let mut tx = store.begin().await.unwrap();
        tx.insert(&user).await.unwrap();
        tx.commit().await.unwrap();

        let problem = Caller::authenticate(&store, user.id).await.unwrap_err();
        assert_eq!(problem.code(), 403);

        let missing = Caller::authenticate(&store, Uuid::new_v4()).await.unwrap_err();
        assert_eq!(missing.code(), 401);
    }

    #[test]
    fn ownership_checks() {
        let owner = Uuid::new_v4();
        let caller = Caller {
            user: owner,
            role: Role::Mentor,
        };
        assert!(caller.require_owner(owner, "subject").is_ok());
        assert!(caller.require_owner(Uuid::new_v4(), "subject").is_err());
        assert!(Caller::console().require_owner(owner, "subject").is_ok());
        assert!(caller.require_author().is_ok());

        let denied = caller.require_admin().unwrap_err();
        assert_eq!(denied.code(), 403);
        assert_eq!(denied.title, "Not authorized.");
        assert_eq!(denied.detail.as_deref(), Some("Admin access required."));
    }
}
