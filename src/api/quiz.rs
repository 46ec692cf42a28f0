use std::collections::HashSet;

use uuid::Uuid;

use crate::auth::Caller;
use crate::data::quiz::db::QuizDbExt;
use crate::data::quiz::{
    problem, Question, QuestionData, QuestionPatch, Subject, SubjectListResponse, Topic,
};
use crate::resp::problem::Problem;
use crate::store::{ModelTxExt, Store, Transaction};
use crate::Backend;

async fn existing_subject<T: Transaction>(tx: &mut T, id: Uuid) -> Result<Subject, Problem> {
    tx.get_subject(id)
        .await?
        .ok_or_else(|| problem::subject_not_found(id))
}

/// Loads a subject the caller is allowed to modify.
async fn owned_subject<T: Transaction>(
    tx: &mut T,
    caller: &Caller,
    id: Uuid,
) -> Result<Subject, Problem> {
    let subject = existing_subject(tx, id).await?;
    caller.require_owner(subject.created_by, "subject")?;
    Ok(subject)
}

fn topic_of(subject: &mut Subject, topic: Uuid) -> Result<&mut Topic, Problem> {
    subject
        .topic_mut(topic)
        .ok_or_else(|| problem::topic_not_found(topic))
}

fn required_name(name: &str, what: &str) -> Result<String, Problem> {
    let name = name.trim();
    if name.is_empty() {
        return Err(problem::name_required(what));
    }
    Ok(name.to_string())
}

#[tracing::instrument(skip(backend))]
pub async fn subject_create<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    name: &str,
) -> Result<Subject, Problem> {
    caller.require_author()?;
    let name = required_name(name, "Subject")?;

    let subject = Subject::new(name, caller.user);
    let mut tx = backend.store.begin().await?;
    tx.insert(&subject).await?;
    tx.commit().await?;

    Ok(subject)
}

#[tracing::instrument(skip(backend))]
pub async fn subject_list<S: Store>(
    backend: &Backend<S>,
) -> Result<Vec<SubjectListResponse>, Problem> {
    let mut tx = backend.store.begin().await?;
    let subjects = tx.list_subjects().await?;
    tx.commit().await?;
    Ok(subjects
        .into_iter()
        .map(SubjectListResponse::from)
        .collect())
}

#[tracing::instrument(skip(backend))]
pub async fn subject_get<S: Store>(backend: &Backend<S>, id: Uuid) -> Result<Subject, Problem> {
    let mut tx = backend.store.begin().await?;
    let subject = existing_subject(&mut tx, id).await?;
    tx.commit().await?;
    Ok(subject)
}

#[tracing::instrument(skip(backend))]
pub async fn subject_rename<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    id: Uuid,
    name: &str,
) -> Result<Subject, Problem> {
    let name = required_name(name, "Subject")?;

    let mut tx = backend.store.begin().await?;
    let mut subject = owned_subject(&mut tx, &caller, id).await?;
    subject.name = name;
    subject.touch();
    tx.save(&subject).await?;
    tx.commit().await?;

    Ok(subject)
}

#[tracing::instrument(skip(backend))]
pub async fn subject_delete<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    id: Uuid,
) -> Result<Subject, Problem> {
    let mut tx = backend.store.begin().await?;
    let subject = owned_subject(&mut tx, &caller, id).await?;
    tx.remove::<Subject>(id).await?;
    tx.commit().await?;

    Ok(subject)
}

#[tracing::instrument(skip(backend))]
pub async fn topic_add<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    subject: Uuid,
    name: &str,
) -> Result<Topic, Problem> {
    let name = required_name(name, "Topic")?;

    let mut tx = backend.store.begin().await?;
    let mut subject = owned_subject(&mut tx, &caller, subject).await?;
    let topic = Topic {
        id: Uuid::new_v4(),
        name,
        questions: vec![],
    };
    subject.topics.push(topic.clone());
    subject.touch();
    tx.save(&subject).await?;
    tx.commit().await?;

    Ok(topic)
}

#[tracing::instrument(skip(backend))]
pub async fn topic_list<S: Store>(
    backend: &Backend<S>,
    subject: Uuid,
) -> Result<Vec<Topic>, Problem> {
    Ok(subject_get(backend, subject).await?.topics)
}

#[tracing::instrument(skip(backend))]
pub async fn topic_rename<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    subject: Uuid,
    topic: Uuid,
    name: &str,
) -> Result<Topic, Problem> {
    let name = required_name(name, "Topic")?;

    let mut tx = backend.store.begin().await?;
    let mut subject = owned_subject(&mut tx, &caller, subject).await?;
    let renamed = {
        let topic = topic_of(&mut subject, topic)?;
        topic.name = name;
        topic.clone()
    };
    subject.touch();
    tx.save(&subject).await?;
    tx.commit().await?;

    Ok(renamed)
}

#[tracing::instrument(skip(backend))]
pub async fn topic_delete<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    subject: Uuid,
    topic: Uuid,
) -> Result<Topic, Problem> {
    let mut tx = backend.store.begin().await?;
    let mut subject = owned_subject(&mut tx, &caller, subject).await?;
    let index = subject
        .topics
        .iter()
        .position(|it| it.id == topic)
        .ok_or_else(|| problem::topic_not_found(topic))?;
    let removed = subject.topics.remove(index);
    subject.touch();
    tx.save(&subject).await?;
    tx.commit().await?;

    Ok(removed)
}

/// Adds a batch of questions to a topic. Nothing is added unless every
/// question is valid.
#[tracing::instrument(skip(backend))]
pub async fn questions_add<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    subject: Uuid,
    topic: Uuid,
    questions: Vec<QuestionData>,
) -> Result<Vec<Question>, Problem> {
    for question in &questions {
        question.validate()?;
    }

    let mut tx = backend.store.begin().await?;
    let mut subject = owned_subject(&mut tx, &caller, subject).await?;
    let added: Vec<Question> = questions.into_iter().map(Question::from).collect();
    topic_of(&mut subject, topic)?
        .questions
        .extend(added.iter().cloned());
    subject.touch();
    tx.save(&subject).await?;
    tx.commit().await?;

    Ok(added)
}

#[tracing::instrument(skip(backend))]
pub async fn questions_list<S: Store>(
    backend: &Backend<S>,
    subject: Uuid,
    topic: Uuid,
) -> Result<Vec<Question>, Problem> {
    let subject = subject_get(backend, subject).await?;
    subject
        .topic(topic)
        .map(|it| it.questions.clone())
        .ok_or_else(|| problem::topic_not_found(topic))
}

/// Applies a batch of partial question updates. Unknown question ids or an
/// invalid result reject the whole batch.
#[tracing::instrument(skip(backend))]
pub async fn questions_update<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    subject: Uuid,
    topic: Uuid,
    patches: Vec<QuestionPatch>,
) -> Result<Vec<Question>, Problem> {
    let mut tx = backend.store.begin().await?;
    let mut subject = owned_subject(&mut tx, &caller, subject).await?;
    let topic = topic_of(&mut subject, topic)?;

    let mut updated = Vec::with_capacity(patches.len());
    for patch in &patches {
        let question = topic
            .questions
            .iter_mut()
            .find(|it| it.id == patch.id)
            .ok_or_else(|| problem::question_not_found(patch.id))?;
        if patch.is_empty() {
            continue;
        }
        *question = patch.apply_to(question)?;
        updated.push(question.clone());
    }

    subject.touch();
    tx.save(&subject).await?;
    tx.commit().await?;

    Ok(updated)
}

/// Removes questions from a topic and returns how many were removed.
#[tracing::instrument(skip(backend))]
pub async fn questions_delete<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    subject: Uuid,
    topic: Uuid,
    ids: Vec<Uuid>,
) -> Result<usize, Problem> {
    let ids: HashSet<Uuid> = ids.into_iter().collect();

    let mut tx = backend.store.begin().await?;
    let mut subject = owned_subject(&mut tx, &caller, subject).await?;
    let questions = &mut topic_of(&mut subject, topic)?.questions;
    let before = questions.len();
    questions.retain(|it| !ids.contains(&it.id));
    let removed = before - questions.len();

    if removed > 0 {
        subject.touch();
        tx.save(&subject).await?;
    }
    tx.commit().await?;

    Ok(removed)
}
