use bson::doc;
use uuid::Uuid;

use crate::api::existing_user;
use crate::auth::Caller;
use crate::data::class::db::ClassDbExt;
use crate::data::class::ClassRole;
use crate::data::class_test::db::ClassTestDbExt;
use crate::data::community::db::CommunityDbExt;
use crate::data::leaderboard::db::LeaderboardDbExt;
use crate::data::notes::db::NotesDbExt;
use crate::data::notification::db::NotificationDbExt;
use crate::data::user::db::{problem, UserDbExt, UserSignupData};
use crate::data::user::{User, UserResponse};
use crate::resp::problem::Problem;
use crate::role::Role;
use crate::store::{ModelTxExt, Store, Transaction};
use crate::Backend;

/// Outcome of deleting a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserDeleted {
    pub user: UserResponse,
    /// Uploaded files nothing references anymore.
    pub orphaned_files: Vec<String>,
}

#[tracing::instrument(skip(backend))]
pub async fn user_register<S: Store>(
    backend: &Backend<S>,
    data: UserSignupData,
) -> Result<UserResponse, Problem> {
    data.validate()?;

    let mut tx = backend.store.begin().await?;
    if tx.find_user_by_email(&data.email).await?.is_some() {
        return Err(problem::already_exists(&data.email));
    }
    if tx.find_user_by_username(&data.username).await?.is_some() {
        return Err(problem::bad_username(
            &data.username,
            "Username is already taken.",
        ));
    }

    let mut user = User::from(data);
    if backend.config.admin_usernames.contains(&user.username) {
        tracing::info!("Registering {} as admin", user.username);
        user.role = Role::Admin;
    }

    tx.insert(&user).await?;
    tx.commit().await?;

    Ok(user.into())
}

#[tracing::instrument(skip(backend))]
pub async fn user_profile<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
) -> Result<UserResponse, Problem> {
    let mut tx = backend.store.begin().await?;
    let user = existing_user(&mut tx, caller.user).await?;
    tx.commit().await?;
    Ok(user.into())
}

#[tracing::instrument(skip(backend))]
pub async fn user_get<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    id: Uuid,
) -> Result<UserResponse, Problem> {
    if caller.user != id {
        caller.require_admin()?;
    }

    let mut tx = backend.store.begin().await?;
    let user = existing_user(&mut tx, id).await?;
    tx.commit().await?;
    Ok(user.into())
}

#[tracing::instrument(skip(backend))]
pub async fn user_list<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
) -> Result<Vec<UserResponse>, Problem> {
    caller.require_admin()?;

    let mut tx = backend.store.begin().await?;
    let users = tx.list_users(None).await?;
    tx.commit().await?;
    Ok(users.into_iter().map(UserResponse::from).collect())
}

#[tracing::instrument(skip(backend))]
pub async fn mentor_list<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
) -> Result<Vec<UserResponse>, Problem> {
    caller.require_admin()?;

    let mut tx = backend.store.begin().await?;
    let mentors = tx.list_users(Some(Role::Mentor)).await?;
    tx.commit().await?;
    Ok(mentors.into_iter().map(UserResponse::from).collect())
}

/// Changes the role of a user. A user that stops being a mentor is removed
/// from the mentor list of every class they were mentoring.
#[tracing::instrument(skip(backend))]
pub async fn user_set_role<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    id: Uuid,
    role: Role,
) -> Result<UserResponse, Problem> {
    caller.require_admin()?;

    let mut tx = backend.store.begin().await?;
    let mut user = existing_user(&mut tx, id).await?;

    if user.role == Role::Mentor && role != Role::Mentor {
        for class in tx.classes_with_mentor(id).await? {
            tracing::debug!("removing demoted mentor {} from class {}", id, class.id);
            tx.pull_class_member(class.id, ClassRole::Mentor, id).await?;
            tx.pull_class_from_users(&[id], class.id).await?;
            user.joined_classes.retain(|it| *it != class.id);
        }
    }

    tx.set_user_fields(id, doc! { "role": role.as_str() })
        .await?;
    user.role = role;
    tx.commit().await?;

    Ok(user.into())
}

#[tracing::instrument(skip(backend))]
pub async fn user_set_blocked<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    id: Uuid,
    blocked: bool,
) -> Result<UserResponse, Problem> {
    caller.require_admin()?;

    let mut tx = backend.store.begin().await?;
    let mut user = existing_user(&mut tx, id).await?;
    tx.set_user_fields(id, doc! { "is_blocked": blocked })
        .await?;
    user.is_blocked = blocked;
    tx.commit().await?;

    Ok(user.into())
}

#[tracing::instrument(skip(backend))]
pub async fn user_set_verified<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    id: Uuid,
) -> Result<UserResponse, Problem> {
    caller.require_admin()?;

    let mut tx = backend.store.begin().await?;
    let mut user = existing_user(&mut tx, id).await?;
    tx.set_user_fields(id, doc! { "is_verified": true }).await?;
    user.is_verified = true;
    tx.commit().await?;

    Ok(user.into())
}

/// Sets (or clears) the caller's profile image and returns the path of the
/// image it replaced.
#[tracing::instrument(skip(backend))]
pub async fn user_set_image<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    image: Option<String>,
) -> Result<Option<String>, Problem> {
    let mut tx = backend.store.begin().await?;
    let mut user = existing_user(&mut tx, caller.user).await?;
    let previous = std::mem::replace(&mut user.image, image);
    tx.save(&user).await?;
    tx.commit().await?;

    Ok(previous.filter(|it| Some(it) != user.image.as_ref()))
}

/// Deletes a user along with everything that belongs to them.
///
/// Class membership, community content, notes (owned and shared), tasks,
/// notifications, test submissions and leaderboard entries are all cleaned
/// up in the same transaction. Subjects, class tests and interview sets the
/// user authored are kept.
#[tracing::instrument(skip(backend))]
pub async fn user_delete<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    id: Uuid,
) -> Result<UserDeleted, Problem> {
    caller.require_admin()?;

    let mut tx = backend.store.begin().await?;
    let user = existing_user(&mut tx, id).await?;

    let classes = tx.pull_member_from_classes(id).await?;
    tracing::debug!("removed user {} from {} classes", id, classes);

    let mut orphaned_files: Vec<String> = user.image.iter().cloned().collect();

    let posts = tx.posts_by(id).await?;
    let post_ids: Vec<Uuid> = posts.iter().map(|it| it.id).collect();
    for post in &posts {
        orphaned_files.extend(post.media.iter().flat_map(|it| it.paths()).cloned());
    }
    for comment in tx.comments_by_or_on(id, &post_ids).await? {
        if let Some(media) = &comment.media {
            orphaned_files.extend(media.paths().cloned());
        }
    }
    tx.delete_community_content(id, &post_ids).await?;

    tx.delete_notes_of(id).await?;
    tx.pull_from_leaderboards(id).await?;
    tx.delete_tasks_of(id).await?;
    tx.delete_notifications_of(id).await?;
    tx.delete_submissions_by(id).await?;

    tx.remove::<User>(id).await?;
    tx.commit().await?;

    tracing::info!(
        "Deleted user {} ({} orphaned files)",
        id,
        orphaned_files.len()
    );
    Ok(UserDeleted {
        user: user.into(),
        orphaned_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::class::{class_approve, class_create, class_join};
    use crate::api::testing::{backend, caller, reload, user};
    use crate::data::class::{Class, ClassCreateData};
    use crate::data::community::{Comment, Media, Post, Reaction, ReactionKind};
    use crate::data::leaderboard::WeeklyQuiz;
    use crate::data::notes::{Note, SharedWith, TaskData};
    use crate::data::notification::NotificationKind;
    use crate::store::MemoryStore;
    use crate::util;

    fn signup(username: &str, email: &str) -> UserSignupData {
        UserSignupData {
            username: username.to_string(),
            email: email.to_string(),
            phone_number: "+385 91 123 456".to_string(),
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn registration_rejects_duplicates() {
        let backend = backend();
        let first = user_register(&backend, signup("student_one", "one@example.com"))
            .await
            .unwrap();
        assert_eq!(first.role, Role::Student);

        let same_email = user_register(&backend, signup("student_two", "one@example.com"))
            .await
            .unwrap_err();
        assert_eq!(same_email.code(), 400);
        assert_eq!(same_email.title, "User already exists.");

        let same_name = user_register(&backend, signup("student_one", "two@example.com"))
            .await
            .unwrap_err();
        assert_eq!(same_name.code(), 400);
        assert_eq!(backend.store.len("users").await, 1);
    }

    #[tokio::test]
    async fn configured_admins_register_as_admin() {
        let mut backend = backend();
        backend.config.admin_usernames = vec!["head_admin".to_string()];

        let admin = user_register(&backend, signup("head_admin", "admin@example.com"))
            .await
            .unwrap();
        assert_eq!(admin.role, Role::Admin);
    }

    #[tokio::test]
    async fn demoted_mentor_leaves_classes() {
        let backend = backend();
        let admin = user(&backend, "admin_user", Role::Admin).await;
        let mentor = user(&backend, "mentor_user", Role::Mentor).await;

        let class = class_create(
            &backend,
            caller(&admin),
            ClassCreateData {
                topic: "Maths".to_string(),
                name: "Algebra".to_string(),
                mentors: vec![mentor.id],
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(reload(&backend, mentor.id).await.has_joined(class.id));

        let demoted = user_set_role(&backend, caller(&admin), mentor.id, Role::Student)
            .await
            .unwrap();
        assert_eq!(demoted.role, Role::Student);
        assert!(demoted.joined_classes.is_empty());

        let mut tx = backend.store.begin().await.unwrap();
        let stored: Class = tx.fetch(class.id).await.unwrap().unwrap();
        assert!(stored.mentors.is_empty());
        drop(tx);
        assert!(!reload(&backend, mentor.id).await.has_joined(class.id));
    }

    #[tokio::test]
    async fn only_admins_manage_users() {
        let backend = backend();
        let student = user(&backend, "student_user", Role::Student).await;
        let other = user(&backend, "other_user", Role::Student).await;

        assert_eq!(
            user_list(&backend, caller(&student)).await.unwrap_err().code(),
            403
        );
        assert_eq!(
            user_get(&backend, caller(&student), other.id)
                .await
                .unwrap_err()
                .code(),
            403
        );
        assert!(user_get(&backend, caller(&student), student.id).await.is_ok());
        assert_eq!(
            user_delete(&backend, caller(&student), other.id)
                .await
                .unwrap_err()
                .code(),
            403
        );
    }

    #[tokio::test]
    async fn image_change_returns_previous_path() {
        let backend = backend();
        let student = user(&backend, "student_user", Role::Student).await;

        let first = user_set_image(&backend, caller(&student), Some("img/a.png".to_string()))
            .await
            .unwrap();
        assert_eq!(first, None);
        let second = user_set_image(&backend, caller(&student), Some("img/b.png".to_string()))
            .await
            .unwrap();
        assert_eq!(second.as_deref(), Some("img/a.png"));
        assert_eq!(
            reload(&backend, student.id).await.image.as_deref(),
            Some("img/b.png")
        );
    }

    async fn seed_content(backend: &Backend<MemoryStore>, author: &User, other: &User) -> Uuid {
        let post = Post::new(
            author.id,
            "Hello",
            vec![Media {
                url: "posts/clip.mp4".to_string(),
                thumbnail: Some("posts/clip.jpg".to_string()),
            }],
        );
        let foreign_post = Post::new(other.id, "Hi", vec![]);
        let comment = Comment {
            id: Uuid::new_v4(),
            post: foreign_post.id,
            author: author.id,
            content: "Nice".to_string(),
            media: Some(Media {
                url: "comments/pic.png".to_string(),
                thumbnail: None,
            }),
            created_at: util::now(),
        };
        let reply = Comment {
            id: Uuid::new_v4(),
            post: post.id,
            author: other.id,
            content: "Thanks".to_string(),
            media: None,
            created_at: util::now(),
        };
        let reaction = Reaction {
            id: Uuid::new_v4(),
            post: foreign_post.id,
            user: author.id,
            kind: ReactionKind::Like,
            created_at: util::now(),
        };
        let own_note = Note::new(author.id, "Mine", "");
        let mut shared_note = Note::new(other.id, "Shared", "");
        shared_note.shared_with.push(SharedWith {
            user_id: author.id,
            can_edit: true,
        });
        let mut weekly = WeeklyQuiz::new("Week 1", util::now());
        weekly.record(author.id, 5);
        weekly.record(other.id, 3);

        let mut tx = backend.store.begin().await.unwrap();
        tx.insert(&post).await.unwrap();
        tx.insert(&foreign_post).await.unwrap();
        tx.insert(&comment).await.unwrap();
        tx.insert(&reply).await.unwrap();
        tx.insert(&reaction).await.unwrap();
        tx.insert(&own_note).await.unwrap();
        tx.insert(&shared_note).await.unwrap();
        tx.insert(&weekly).await.unwrap();
        tx.insert(
            &TaskData {
                title: "Revise".to_string(),
                ..Default::default()
            }
            .into_task(author.id),
        )
        .await
        .unwrap();
        tx.push_notification(author.id, NotificationKind::System, "Welcome")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        weekly.id
    }

    #[tokio::test]
    async fn delete_cascades_everywhere() {
        let backend = backend();
        let admin = user(&backend, "admin_user", Role::Admin).await;
        let mentor = user(&backend, "mentor_user", Role::Mentor).await;
        let co_mentor = user(&backend, "co_mentor", Role::Mentor).await;

        let class = class_create(
            &backend,
            caller(&admin),
            ClassCreateData {
                topic: "Maths".to_string(),
                name: "Algebra".to_string(),
                mentors: vec![mentor.id],
                ..Default::default()
            },
        )
        .await
        .unwrap();
        class_join(&backend, caller(&co_mentor), &class.join_code)
            .await
            .unwrap();
        let weekly = seed_content(&backend, &mentor, &co_mentor).await;

        let deleted = user_delete(&backend, caller(&admin), mentor.id)
            .await
            .unwrap();
        assert_eq!(deleted.user.id, mentor.id);
        let mut files = deleted.orphaned_files.clone();
        files.sort();
        assert_eq!(
            files,
            vec!["comments/pic.png", "posts/clip.jpg", "posts/clip.mp4"]
        );

        let mut tx = backend.store.begin().await.unwrap();
        let stored: Class = tx.fetch(class.id).await.unwrap().unwrap();
        assert!(!stored.mentors.contains(&mentor.id));
        assert!(stored.mentors.contains(&co_mentor.id));
        assert!(tx.get_user(mentor.id).await.unwrap().is_none());

        assert!(tx.posts_by(mentor.id).await.unwrap().is_empty());
        assert_eq!(tx.posts_by(co_mentor.id).await.unwrap().len(), 1);
        assert!(tx.comments_by_or_on(mentor.id, &[]).await.unwrap().is_empty());
        assert!(tx.notes_visible_to(mentor.id).await.unwrap().is_empty());
        let notes = tx.notes_visible_to(co_mentor.id).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].shared_with.is_empty());
        assert!(tx.tasks_of(mentor.id).await.unwrap().is_empty());
        assert!(tx.notifications_of(mentor.id).await.unwrap().is_empty());

        let board = tx.get_weekly_quiz(weekly).await.unwrap().unwrap();
        assert_eq!(board.leaderboard.len(), 1);
        assert_eq!(board.leaderboard[0].student_id, co_mentor.id);
        drop(tx);

        assert_eq!(backend.store.len("reactions").await, 0);
        assert_eq!(backend.store.len("comments").await, 0);
    }

    #[tokio::test]
    async fn deleted_students_leave_class_lists() {
        let backend = backend();
        let admin = user(&backend, "admin_user", Role::Admin).await;
        let mentor = user(&backend, "mentor_user", Role::Mentor).await;
        let approved = user(&backend, "approved_user", Role::Student).await;
        let pending = user(&backend, "pending_user", Role::Student).await;
        let staying = user(&backend, "staying_user", Role::Student).await;

        let class = class_create(
            &backend,
            caller(&admin),
            ClassCreateData {
                topic: "Physics".to_string(),
                name: "Optics".to_string(),
                mentors: vec![mentor.id],
                ..Default::default()
            },
        )
        .await
        .unwrap();
        for student in [&approved, &pending, &staying] {
            class_join(&backend, caller(student), &class.join_code)
                .await
                .unwrap();
        }
        for student in [&approved, &staying] {
            class_approve(&backend, caller(&mentor), class.id, student.id)
                .await
                .unwrap();
        }

        user_delete(&backend, caller(&admin), approved.id)
            .await
            .unwrap();
        user_delete(&backend, caller(&admin), pending.id)
            .await
            .unwrap();

        let mut tx = backend.store.begin().await.unwrap();
        let stored: Class = tx.fetch(class.id).await.unwrap().unwrap();
        drop(tx);
        assert_eq!(stored.students, vec![staying.id]);
        assert_eq!(stored.mentors, vec![mentor.id]);
        assert!(reload(&backend, staying.id).await.has_joined(class.id));
        assert!(reload(&backend, mentor.id).await.has_joined(class.id));
    }

    #[tokio::test]
    async fn deleting_missing_user_changes_nothing() {
        let backend = backend();
        let admin = user(&backend, "admin_user", Role::Admin).await;

        let problem = user_delete(&backend, caller(&admin), Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(problem.code(), 404);
        assert_eq!(backend.store.len("users").await, 1);
    }
}
