use uuid::Uuid;

use crate::auth::Caller;
use crate::data::interview::db::InterviewDbExt;
use crate::data::interview::{
    problem, Difficulty, InterviewSet, InterviewSetData, InterviewSetUpdate,
};
use crate::resp::problem::Problem;
use crate::store::{ModelTxExt, Store, Transaction};
use crate::Backend;

async fn existing_set<T: Transaction>(tx: &mut T, id: Uuid) -> Result<InterviewSet, Problem> {
    tx.get_interview_set(id)
        .await?
        .ok_or_else(|| problem::not_found(id))
}

#[tracing::instrument(skip(backend))]
pub async fn interview_create<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    data: InterviewSetData,
) -> Result<InterviewSet, Problem> {
    caller.require_author()?;
    data.validate()?;

    let set = data.into_set(caller.user);
    let mut tx = backend.store.begin().await?;
    tx.insert(&set).await?;
    tx.commit().await?;

    Ok(set)
}

#[tracing::instrument(skip(backend))]
pub async fn interview_get<S: Store>(
    backend: &Backend<S>,
    id: Uuid,
) -> Result<InterviewSet, Problem> {
    let mut tx = backend.store.begin().await?;
    let set = existing_set(&mut tx, id).await?;
    tx.commit().await?;
    Ok(set)
}

#[tracing::instrument(skip(backend))]
pub async fn interview_list<S: Store>(backend: &Backend<S>) -> Result<Vec<InterviewSet>, Problem> {
    let mut tx = backend.store.begin().await?;
    let sets = tx.list_interview_sets().await?;
    tx.commit().await?;
    Ok(sets)
}

#[tracing::instrument(skip(backend))]
pub async fn interview_update<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    id: Uuid,
    update: InterviewSetUpdate,
) -> Result<InterviewSet, Problem> {
    let mut tx = backend.store.begin().await?;
    let mut set = existing_set(&mut tx, id).await?;
    caller.require_owner(set.created_by, "question set")?;

    update.apply_to(&mut set)?;
    tx.save(&set).await?;
    tx.commit().await?;

    Ok(set)
}

#[tracing::instrument(skip(backend))]
pub async fn interview_delete<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    id: Uuid,
) -> Result<InterviewSet, Problem> {
    let mut tx = backend.store.begin().await?;
    let set = existing_set(&mut tx, id).await?;
    caller.require_owner(set.created_by, "question set")?;

    tx.remove::<InterviewSet>(id).await?;
    tx.commit().await?;

    Ok(set)
}

#[tracing::instrument(skip(backend))]
pub async fn interview_by_subject<S: Store>(
    backend: &Backend<S>,
    subject: &str,
) -> Result<Vec<InterviewSet>, Problem> {
    let mut tx = backend.store.begin().await?;
    let sets = tx.interview_sets_matching("subject_name", subject).await?;
    tx.commit().await?;
    Ok(sets)
}

#[tracing::instrument(skip(backend))]
pub async fn interview_by_topic<S: Store>(
    backend: &Backend<S>,
    topic: &str,
) -> Result<Vec<InterviewSet>, Problem> {
    let mut tx = backend.store.begin().await?;
    let sets = tx.interview_sets_matching("topic_name", topic).await?;
    tx.commit().await?;
    Ok(sets)
}

/// Sets holding questions of the given level, trimmed to those questions.
#[tracing::instrument(skip(backend))]
pub async fn interview_by_difficulty<S: Store>(
    backend: &Backend<S>,
    level: &str,
) -> Result<Vec<InterviewSet>, Problem> {
    let difficulty: Difficulty = level.parse()?;

    let mut tx = backend.store.begin().await?;
    let sets = tx.interview_sets_with_difficulty(difficulty).await?;
    tx.commit().await?;

    Ok(sets
        .into_iter()
        .map(|mut set| {
            set.retain_difficulty(difficulty);
            set
        })
        .filter(|set| !set.questions.is_empty())
        .collect())
}

#[tracing::instrument(skip(backend))]
pub async fn interview_by_creator<S: Store>(
    backend: &Backend<S>,
    creator: Uuid,
) -> Result<Vec<InterviewSet>, Problem> {
    let mut tx = backend.store.begin().await?;
    let sets = tx.interview_sets_by(creator).await?;
    tx.commit().await?;
    Ok(sets)
}
