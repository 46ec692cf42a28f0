use std::collections::HashSet;

use uuid::Uuid;

use crate::api::{existing_class, existing_user};
use crate::auth::Caller;
use crate::data::class::db::ClassDbExt;
use crate::data::class::{
    problem, Class, ClassCreateData, ClassRole, ClassUpdateData, ClassUpdated, LogoChange,
};
use crate::data::class_test::db::ClassTestDbExt;
use crate::data::notification::db::NotificationDbExt;
use crate::data::notification::NotificationKind;
use crate::data::user::db::UserDbExt;
use crate::data::user::{User, UserResponse};
use crate::resp::problem::{problems, Problem};
use crate::role::Role;
use crate::store::{filter, ModelTxExt, Store, StoreError, Transaction};
use crate::util;
use crate::Backend;

/// Attempts made at generating an unused join code before giving up.
const CODE_ATTEMPTS: usize = 16;

fn code_conflict(code: &str) -> impl FnOnce(StoreError) -> Problem + '_ {
    move |e| match e {
        StoreError::DuplicateKey(_) => problem::duplicate_code(code),
        other => other.into(),
    }
}

async fn unique_code<T: Transaction>(
    tx: &mut T,
    requested: Option<String>,
    length: usize,
) -> Result<String, Problem> {
    if let Some(code) = requested.map(|it| it.trim().to_string()) {
        if !code.is_empty() {
            if tx.find_class_by_code(&code).await?.is_some() {
                return Err(problem::duplicate_code(&code));
            }
            return Ok(code);
        }
    }

    for _ in 0..CODE_ATTEMPTS {
        let code = util::random_code(length);
        if tx.find_class_by_code(&code).await?.is_none() {
            return Ok(code);
        }
        tracing::debug!("generated join code {} is taken, retrying", code);
    }
    Err(Problem::new_untyped(
        crate::resp::problem::Status::InternalServerError,
        "Unable to generate a unique join code.",
    ))
}

/// Deduplicates `ids` and checks every one is a user with the mentor role.
async fn valid_mentors<T: Transaction>(tx: &mut T, ids: &[Uuid]) -> Result<Vec<Uuid>, Problem> {
    let mut seen = HashSet::new();
    let ids: Vec<Uuid> = ids.iter().copied().filter(|it| seen.insert(*it)).collect();
    if ids.is_empty() {
        return Ok(ids);
    }

    let found: HashSet<Uuid> = tx
        .find_users_with_role(&ids, Role::Mentor)
        .await?
        .into_iter()
        .map(|it| it.id)
        .collect();
    let missing: Vec<Uuid> = ids
        .iter()
        .copied()
        .filter(|it| !found.contains(it))
        .collect();

    if !missing.is_empty() {
        return Err(problem::invalid_mentors(&missing));
    }
    Ok(ids)
}

fn require_class_mentor(caller: &Caller, class: &Class, allow_admin: bool) -> Result<(), Problem> {
    if class.is_mentor(caller.user) || (allow_admin && caller.role.is_admin()) {
        Ok(())
    } else {
        Err(problem::not_class_mentor())
    }
}

async fn students_of<T: Transaction>(
    tx: &mut T,
    class: &Class,
    approved: bool,
) -> Result<Vec<UserResponse>, Problem> {
    if class.students.is_empty() {
        return Ok(vec![]);
    }
    let users: Vec<User> = tx.fetch_all(filter::by_ids(&class.students)).await?;
    Ok(users
        .into_iter()
        .filter(|it| it.has_joined(class.id) == approved)
        .map(UserResponse::from)
        .collect())
}

#[tracing::instrument(skip(backend))]
pub async fn class_create<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    data: ClassCreateData,
) -> Result<Class, Problem> {
    caller.require_admin()?;
    if data.topic.trim().is_empty() || data.name.trim().is_empty() {
        return Err(problems::bad_request("Topic and name are required."));
    }

    let mut tx = backend.store.begin().await?;
    let join_code = unique_code(&mut tx, data.join_code, backend.config.join_code_length).await?;
    let mentors = valid_mentors(&mut tx, &data.mentors).await?;

    let mut class = Class::new(data.topic, data.name, &join_code);
    class.description = data.description.unwrap_or_default();
    class.logo = data.logo;
    class.mentors = mentors;

    tx.insert(&class).await.map_err(code_conflict(&join_code))?;
    tx.add_class_to_users(&class.mentors, class.id).await?;
    tx.commit().await?;

    tracing::info!("Created class {} with join code {}", class.id, class.join_code);
    Ok(class)
}

#[tracing::instrument(skip(backend))]
pub async fn class_list<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
) -> Result<Vec<Class>, Problem> {
    caller.require_admin()?;

    let mut tx = backend.store.begin().await?;
    let classes = tx.list_classes().await?;
    tx.commit().await?;
    Ok(classes)
}

#[tracing::instrument(skip(backend))]
pub async fn class_get<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    id: Uuid,
) -> Result<Class, Problem> {
    let mut tx = backend.store.begin().await?;
    let class = existing_class(&mut tx, id).await?;
    tx.commit().await?;

    if class.role_of(caller.user).is_none() {
        caller.require_admin()?;
    }
    Ok(class)
}

/// Applies a partial update. Supplying mentors replaces the whole mentor list
/// and moves the class between the old and new mentors' joined classes.
#[tracing::instrument(skip(backend))]
pub async fn class_update<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    id: Uuid,
    data: ClassUpdateData,
) -> Result<ClassUpdated, Problem> {
    caller.require_admin()?;

    let mut tx = backend.store.begin().await?;
    let mut class = existing_class(&mut tx, id).await?;

    if let Some(topic) = data.topic {
        if topic.trim().is_empty() {
            return Err(problems::bad_request("Topic can't be empty."));
        }
        class.topic = topic;
    }
    if let Some(name) = data.name {
        if name.trim().is_empty() {
            return Err(problems::bad_request("Name can't be empty."));
        }
        class.name = name;
    }
    if let Some(description) = data.description {
        class.description = description;
    }
    if let Some(code) = data.join_code.map(|it| it.trim().to_string()) {
        if code.is_empty() {
            return Err(problems::bad_request("Join code can't be empty."));
        }
        class.join_code = code;
    }

    if let Some(mentors) = data.mentors {
        let mentors = valid_mentors(&mut tx, &mentors).await?;
        let removed: Vec<Uuid> = class
            .mentors
            .iter()
            .copied()
            .filter(|it| !mentors.contains(it))
            .collect();
        let added: Vec<Uuid> = mentors
            .iter()
            .copied()
            .filter(|it| !class.mentors.contains(it))
            .collect();

        tx.pull_class_from_users(&removed, id).await?;
        tx.add_class_to_users(&added, id).await?;
        class.students.retain(|it| !mentors.contains(it));
        class.mentors = mentors;
    }

    let replaced_logo = match data.logo {
        LogoChange::Keep => None,
        LogoChange::Replace(logo) => class.logo.replace(logo),
        LogoChange::Remove => class.logo.take(),
    }
    .filter(|old| class.logo.as_ref() != Some(old));

    tx.save(&class)
        .await
        .map_err(code_conflict(&class.join_code))?;
    tx.commit().await?;

    Ok(ClassUpdated {
        class,
        replaced_logo,
    })
}

/// Deletes a class with its tests and their submissions. Returns the deleted
/// class so its logo can be cleaned up.
#[tracing::instrument(skip(backend))]
pub async fn class_delete<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    id: Uuid,
) -> Result<Class, Problem> {
    caller.require_admin()?;

    let mut tx = backend.store.begin().await?;
    let class = existing_class(&mut tx, id).await?;

    tx.pull_class_from_users(&class.members(), id).await?;
    let tests = tx.delete_class_tests(id).await?;
    tx.remove::<Class>(id).await?;
    tx.commit().await?;

    tracing::info!("Deleted class {} and {} tests", id, tests);
    Ok(class)
}

#[tracing::instrument(skip(backend))]
pub async fn class_add_mentor<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    class: Uuid,
    user: Uuid,
) -> Result<Class, Problem> {
    caller.require_admin()?;

    let mut tx = backend.store.begin().await?;
    let mut found = existing_class(&mut tx, class).await?;
    if found.is_mentor(user) {
        return Err(problem::already_member());
    }
    valid_mentors(&mut tx, &[user]).await?;

    if found.is_student(user) {
        tx.pull_class_member(class, ClassRole::Student, user)
            .await?;
        found.students.retain(|it| *it != user);
    }
    tx.add_class_member(class, ClassRole::Mentor, user).await?;
    tx.add_class_to_users(&[user], class).await?;
    tx.commit().await?;

    found.mentors.push(user);
    Ok(found)
}

#[tracing::instrument(skip(backend))]
pub async fn class_remove_mentor<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    class: Uuid,
    user: Uuid,
) -> Result<Class, Problem> {
    caller.require_admin()?;

    let mut tx = backend.store.begin().await?;
    let mut found = existing_class(&mut tx, class).await?;
    if !found.is_mentor(user) {
        return Err(problems::bad_request("User is not a mentor of this class."));
    }

    tx.pull_class_member(class, ClassRole::Mentor, user).await?;
    tx.pull_class_from_users(&[user], class).await?;
    tx.commit().await?;

    found.mentors.retain(|it| *it != user);
    Ok(found)
}

/// Joins the class with the given code. Mentors become members right away,
/// students wait for a mentor's approval.
#[tracing::instrument(skip(backend))]
pub async fn class_join<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    join_code: &str,
) -> Result<Class, Problem> {
    if caller.role.is_admin() {
        return Err(problems::forbidden("Admins can't join classes."));
    }

    let mut tx = backend.store.begin().await?;
    let mut class = tx
        .find_class_by_code(join_code.trim())
        .await?
        .ok_or_else(|| problem::code_not_found(join_code))?;
    if class.role_of(caller.user).is_some() {
        return Err(problem::already_member());
    }

    match caller.role {
        Role::Mentor => {
            tx.add_class_member(class.id, ClassRole::Mentor, caller.user)
                .await?;
            tx.add_class_to_users(&[caller.user], class.id).await?;
            class.mentors.push(caller.user);
        }
        _ => {
            let user = existing_user(&mut tx, caller.user).await?;
            tx.add_class_member(class.id, ClassRole::Student, caller.user)
                .await?;
            let message = format!("{} asked to join {}.", user.username, class.name);
            tx.push_notifications(&class.mentors, NotificationKind::Class, &message)
                .await?;
            class.students.push(caller.user);
        }
    }
    tx.commit().await?;

    Ok(class)
}

#[tracing::instrument(skip(backend))]
pub async fn class_pending<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    class: Uuid,
) -> Result<Vec<UserResponse>, Problem> {
    let mut tx = backend.store.begin().await?;
    let class = existing_class(&mut tx, class).await?;
    require_class_mentor(&caller, &class, false)?;

    let pending = students_of(&mut tx, &class, false).await?;
    tx.commit().await?;
    Ok(pending)
}

#[tracing::instrument(skip(backend))]
pub async fn class_approve<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    class: Uuid,
    student: Uuid,
) -> Result<UserResponse, Problem> {
    let mut tx = backend.store.begin().await?;
    let class = existing_class(&mut tx, class).await?;
    require_class_mentor(&caller, &class, false)?;

    let mut user = existing_user(&mut tx, student).await?;
    if !class.is_student(student) || user.has_joined(class.id) {
        return Err(problems::bad_request("Student is not pending approval."));
    }

    tx.add_class_to_users(&[student], class.id).await?;
    tx.push_notification(
        student,
        NotificationKind::Class,
        &format!("Your request to join {} was approved.", class.name),
    )
    .await?;
    tx.commit().await?;

    user.joined_classes.push(class.id);
    Ok(user.into())
}

#[tracing::instrument(skip(backend))]
pub async fn class_students<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    class: Uuid,
) -> Result<Vec<UserResponse>, Problem> {
    let mut tx = backend.store.begin().await?;
    let class = existing_class(&mut tx, class).await?;
    require_class_mentor(&caller, &class, true)?;

    let students = students_of(&mut tx, &class, true).await?;
    tx.commit().await?;
    Ok(students)
}

#[tracing::instrument(skip(backend))]
pub async fn class_remove_student<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    class: Uuid,
    student: Uuid,
) -> Result<Class, Problem> {
    let mut tx = backend.store.begin().await?;
    let mut found = existing_class(&mut tx, class).await?;
    require_class_mentor(&caller, &found, true)?;
    if !found.is_student(student) {
        return Err(problems::bad_request("User is not a student of this class."));
    }

    tx.pull_class_member(class, ClassRole::Student, student)
        .await?;
    tx.pull_class_from_users(&[student], class).await?;
    tx.commit().await?;

    found.students.retain(|it| *it != student);
    Ok(found)
}

#[tracing::instrument(skip(backend))]
pub async fn my_classes<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
) -> Result<Vec<Class>, Problem> {
    let mut tx = backend.store.begin().await?;
    let user = existing_user(&mut tx, caller.user).await?;
    let classes = tx.classes_by_ids(&user.joined_classes).await?;
    tx.commit().await?;
    Ok(classes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::class_test::class_test_create;
    use crate::api::testing::{backend, caller, reload, user};
    use crate::data::class_test::tests::sample_data;
    use crate::store::MemoryStore;

    async fn create(
        backend: &Backend<MemoryStore>,
        admin: &User,
        code: Option<&str>,
        mentors: Vec<Uuid>,
    ) -> Result<Class, Problem> {
        class_create(
            backend,
            caller(admin),
            ClassCreateData {
                topic: "Science".to_string(),
                name: "Physics".to_string(),
                join_code: code.map(str::to_string),
                mentors,
                ..Default::default()
            },
        )
        .await
    }

    #[tokio::test]
    async fn duplicate_join_code_is_rejected() {
        let backend = backend();
        let admin = user(&backend, "admin_user", Role::Admin).await;

        create(&backend, &admin, Some("PHY101"), vec![]).await.unwrap();
        let problem = create(&backend, &admin, Some("PHY101"), vec![])
            .await
            .unwrap_err();
        assert_eq!(problem.code(), 400);
        assert_eq!(problem.title, "Join code must be unique.");
        assert_eq!(backend.store.len("classes").await, 1);
    }

    #[tokio::test]
    async fn generated_codes_have_configured_length() {
        let mut backend = backend();
        backend.config.join_code_length = 8;
        let admin = user(&backend, "admin_user", Role::Admin).await;

        let class = create(&backend, &admin, None, vec![]).await.unwrap();
        assert_eq!(class.join_code.len(), 8);
    }

    #[tokio::test]
    async fn mentors_need_mentor_role() {
        let backend = backend();
        let admin = user(&backend, "admin_user", Role::Admin).await;
        let mentor = user(&backend, "mentor_user", Role::Mentor).await;
        let student = user(&backend, "student_user", Role::Student).await;

        let problem = create(&backend, &admin, None, vec![mentor.id, student.id])
            .await
            .unwrap_err();
        assert_eq!(problem.code(), 400);
        assert_eq!(problem.body["mentors"][0], student.id.to_string());
        assert_eq!(backend.store.len("classes").await, 0);
        assert!(reload(&backend, mentor.id).await.joined_classes.is_empty());

        let class = create(&backend, &admin, None, vec![mentor.id, mentor.id])
            .await
            .unwrap();
        assert_eq!(class.mentors, vec![mentor.id]);
        assert!(reload(&backend, mentor.id).await.has_joined(class.id));

        let problem = class_add_mentor(&backend, caller(&admin), class.id, student.id)
            .await
            .unwrap_err();
        assert_eq!(problem.code(), 400);
    }

    #[tokio::test]
    async fn joining_happens_once() {
        let backend = backend();
        let admin = user(&backend, "admin_user", Role::Admin).await;
        let mentor = user(&backend, "mentor_user", Role::Mentor).await;
        let student = user(&backend, "student_user", Role::Student).await;
        let class = create(&backend, &admin, Some("JOIN1"), vec![mentor.id])
            .await
            .unwrap();

        let joined = class_join(&backend, caller(&student), "JOIN1").await.unwrap();
        assert_eq!(joined.students, vec![student.id]);

        let again = class_join(&backend, caller(&student), "JOIN1")
            .await
            .unwrap_err();
        assert_eq!(again.title, "Already in this class.");
        let stored = class_get(&backend, caller(&admin), class.id).await.unwrap();
        assert_eq!(stored.students, vec![student.id]);

        assert_eq!(
            class_join(&backend, caller(&student), "NOPE")
                .await
                .unwrap_err()
                .code(),
            404
        );
        assert_eq!(
            class_join(&backend, caller(&admin), "JOIN1")
                .await
                .unwrap_err()
                .code(),
            403
        );
    }

    #[tokio::test]
    async fn students_wait_for_approval() {
        let backend = backend();
        let admin = user(&backend, "admin_user", Role::Admin).await;
        let mentor = user(&backend, "mentor_user", Role::Mentor).await;
        let other_mentor = user(&backend, "other_mentor", Role::Mentor).await;
        let student = user(&backend, "student_user", Role::Student).await;
        let class = create(&backend, &admin, Some("WAIT1"), vec![mentor.id])
            .await
            .unwrap();

        class_join(&backend, caller(&student), "WAIT1").await.unwrap();
        assert!(!reload(&backend, student.id).await.has_joined(class.id));
        assert!(my_classes(&backend, caller(&student)).await.unwrap().is_empty());

        let pending = class_pending(&backend, caller(&mentor), class.id)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert!(class_pending(&backend, caller(&other_mentor), class.id)
            .await
            .is_err());

        let approved = class_approve(&backend, caller(&mentor), class.id, student.id)
            .await
            .unwrap();
        assert!(approved.joined_classes.contains(&class.id));
        assert!(class_approve(&backend, caller(&mentor), class.id, student.id)
            .await
            .is_err());

        let students = class_students(&backend, caller(&mentor), class.id)
            .await
            .unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(my_classes(&backend, caller(&student)).await.unwrap().len(), 1);

        let notifications =
            crate::api::notification::notifications_for(&backend, caller(&student))
                .await
                .unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::Class);

        class_remove_student(&backend, caller(&mentor), class.id, student.id)
            .await
            .unwrap();
        assert!(!reload(&backend, student.id).await.has_joined(class.id));
    }

    #[tokio::test]
    async fn mentors_join_immediately() {
        let backend = backend();
        let admin = user(&backend, "admin_user", Role::Admin).await;
        let mentor = user(&backend, "mentor_user", Role::Mentor).await;
        let class = create(&backend, &admin, Some("MENT1"), vec![]).await.unwrap();

        let joined = class_join(&backend, caller(&mentor), "MENT1").await.unwrap();
        assert_eq!(joined.mentors, vec![mentor.id]);
        assert!(reload(&backend, mentor.id).await.has_joined(class.id));
    }

    #[tokio::test]
    async fn update_moves_class_between_mentors() {
        let backend = backend();
        let admin = user(&backend, "admin_user", Role::Admin).await;
        let old = user(&backend, "old_mentor", Role::Mentor).await;
        let new = user(&backend, "new_mentor", Role::Mentor).await;
        let class = create(&backend, &admin, Some("MOVE1"), vec![old.id])
            .await
            .unwrap();

        let updated = class_update(
            &backend,
            caller(&admin),
            class.id,
            ClassUpdateData {
                mentors: Some(vec![new.id]),
                logo: LogoChange::Replace("logos/new.png".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.class.mentors, vec![new.id]);
        assert_eq!(updated.replaced_logo, None);
        assert!(!reload(&backend, old.id).await.has_joined(class.id));
        assert!(reload(&backend, new.id).await.has_joined(class.id));

        let removed = class_update(
            &backend,
            caller(&admin),
            class.id,
            ClassUpdateData {
                logo: LogoChange::Remove,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(removed.replaced_logo.as_deref(), Some("logos/new.png"));
        assert_eq!(removed.class.logo, None);
    }

    #[tokio::test]
    async fn failed_update_leaves_no_partial_writes() {
        let backend = backend();
        let admin = user(&backend, "admin_user", Role::Admin).await;
        let old = user(&backend, "old_mentor", Role::Mentor).await;
        let new = user(&backend, "new_mentor", Role::Mentor).await;
        create(&backend, &admin, Some("TAKEN"), vec![]).await.unwrap();
        let class = create(&backend, &admin, Some("FREE1"), vec![old.id])
            .await
            .unwrap();

        let problem = class_update(
            &backend,
            caller(&admin),
            class.id,
            ClassUpdateData {
                join_code: Some("TAKEN".to_string()),
                mentors: Some(vec![new.id]),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(problem.title, "Join code must be unique.");

        assert!(reload(&backend, old.id).await.has_joined(class.id));
        assert!(!reload(&backend, new.id).await.has_joined(class.id));
        let stored = class_get(&backend, caller(&admin), class.id).await.unwrap();
        assert_eq!(stored.join_code, "FREE1");
        assert_eq!(stored.mentors, vec![old.id]);
    }

    #[tokio::test]
    async fn delete_detaches_members_and_tests() {
        let backend = backend();
        let admin = user(&backend, "admin_user", Role::Admin).await;
        let mentor = user(&backend, "mentor_user", Role::Mentor).await;
        let student = user(&backend, "student_user", Role::Student).await;
        let class = create(&backend, &admin, Some("GONE1"), vec![mentor.id])
            .await
            .unwrap();
        class_join(&backend, caller(&student), "GONE1").await.unwrap();
        class_approve(&backend, caller(&mentor), class.id, student.id)
            .await
            .unwrap();
        class_test_create(&backend, caller(&mentor), sample_data(class.id))
            .await
            .unwrap();

        class_delete(&backend, caller(&admin), class.id).await.unwrap();
        assert!(reload(&backend, mentor.id).await.joined_classes.is_empty());
        assert!(reload(&backend, student.id).await.joined_classes.is_empty());
        assert_eq!(backend.store.len("classes").await, 0);
        assert_eq!(backend.store.len("class.tests").await, 0);
    }
}
