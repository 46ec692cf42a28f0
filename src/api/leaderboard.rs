use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::api::existing_user;
use crate::auth::Caller;
use crate::data::leaderboard::db::LeaderboardDbExt;
use crate::data::leaderboard::{problem, LeaderboardEntry, WeeklyQuiz};
use crate::resp::problem::{problems, Problem};
use crate::store::{ModelTxExt, Store, Transaction};
use crate::Backend;

async fn existing_quiz<T: Transaction>(tx: &mut T, id: Uuid) -> Result<WeeklyQuiz, Problem> {
    tx.get_weekly_quiz(id)
        .await?
        .ok_or_else(|| problem::not_found(id))
}

#[tracing::instrument(skip(backend))]
pub async fn weekly_create<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    title: &str,
    week_start: DateTime<Utc>,
) -> Result<WeeklyQuiz, Problem> {
    caller.require_author()?;
    if title.trim().is_empty() {
        return Err(problems::bad_request("Title is required."));
    }

    let quiz = WeeklyQuiz::new(title.trim(), week_start);
    let mut tx = backend.store.begin().await?;
    tx.insert(&quiz).await?;
    tx.commit().await?;

    Ok(quiz)
}

/// Records a student's score, keeping their best one. Only mentors and
/// admins record scores.
#[tracing::instrument(skip(backend))]
pub async fn weekly_record_score<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    quiz: Uuid,
    student: Uuid,
    score: u32,
) -> Result<WeeklyQuiz, Problem> {
    caller.require_author()?;

    let mut tx = backend.store.begin().await?;
    let mut quiz = existing_quiz(&mut tx, quiz).await?;
    existing_user(&mut tx, student).await?;

    if quiz.record(student, score) {
        tx.save(&quiz).await?;
    }
    tx.commit().await?;

    Ok(quiz)
}

#[tracing::instrument(skip(backend))]
pub async fn weekly_standings<S: Store>(
    backend: &Backend<S>,
    quiz: Uuid,
) -> Result<Vec<LeaderboardEntry>, Problem> {
    let mut tx = backend.store.begin().await?;
    let quiz = existing_quiz(&mut tx, quiz).await?;
    tx.commit().await?;
    Ok(quiz.standings())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{backend, caller, user};
    use crate::role::Role;
    use crate::util;

    #[tokio::test]
    async fn standings_keep_best_scores() {
        let backend = backend();
        let mentor = user(&backend, "mentor_user", Role::Mentor).await;
        let ana = user(&backend, "ana_student", Role::Student).await;
        let ivo = user(&backend, "ivo_student", Role::Student).await;
        let quiz = weekly_create(&backend, caller(&mentor), "Week 40", util::now())
            .await
            .unwrap();

        for (student, score) in [(&ana, 6), (&ivo, 8), (&ana, 9), (&ivo, 2)] {
            weekly_record_score(&backend, caller(&mentor), quiz.id, student.id, score)
                .await
                .unwrap();
        }

        let standings = weekly_standings(&backend, quiz.id).await.unwrap();
        let scores: Vec<(Uuid, u32)> = standings
            .iter()
            .map(|it| (it.student_id, it.score))
            .collect();
        assert_eq!(scores, vec![(ana.id, 9), (ivo.id, 8)]);

        assert_eq!(
            weekly_record_score(&backend, caller(&mentor), quiz.id, Uuid::new_v4(), 1)
                .await
                .unwrap_err()
                .code(),
            404
        );
        assert_eq!(
            weekly_record_score(&backend, caller(&ana), quiz.id, ana.id, 100)
                .await
                .unwrap_err()
                .code(),
            403
        );
        assert_eq!(weekly_standings(&backend, quiz.id).await.unwrap()[0].score, 9);
        assert_eq!(
            weekly_create(&backend, caller(&ana), "Week 41", util::now())
                .await
                .unwrap_err()
                .code(),
            403
        );
    }
}
