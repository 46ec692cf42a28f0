use uuid::Uuid;

use crate::api::existing_user;
use crate::auth::Caller;
use crate::data::notes::db::NotesDbExt;
use crate::data::notes::{
    problem, Note, NoteUpdate, Priority, Task, TaskData, TaskFilter, TaskStatus,
};
use crate::resp::problem::Problem;
use crate::store::{ModelTxExt, Store, Transaction};
use crate::Backend;

async fn owned_note<T: Transaction>(tx: &mut T, caller: &Caller, id: Uuid) -> Result<Note, Problem> {
    match tx.get_note(id).await? {
        Some(note) if note.owner == caller.user => Ok(note),
        _ => Err(problem::note_not_found(id)),
    }
}

#[tracing::instrument(skip(backend, content))]
pub async fn note_create<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    title: &str,
    content: &str,
) -> Result<Note, Problem> {
    if title.trim().is_empty() {
        return Err(problem::title_required());
    }

    let note = Note::new(caller.user, title.trim(), content);
    let mut tx = backend.store.begin().await?;
    tx.insert(&note).await?;
    tx.commit().await?;

    Ok(note)
}

/// Shares one of the caller's notes. Sharing again updates the edit right.
#[tracing::instrument(skip(backend))]
pub async fn note_share<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    note: Uuid,
    user: Uuid,
    can_edit: bool,
) -> Result<Note, Problem> {
    let mut tx = backend.store.begin().await?;
    let found = owned_note(&mut tx, &caller, note).await?;
    if user == found.owner {
        return Err(problem::share_with_self());
    }
    existing_user(&mut tx, user).await?;

    tx.share_note(note, user, can_edit).await?;
    let shared = owned_note(&mut tx, &caller, note).await?;
    tx.commit().await?;

    Ok(shared)
}

/// Notes the caller owns or that were shared with them.
#[tracing::instrument(skip(backend))]
pub async fn notes_for<S: Store>(backend: &Backend<S>, caller: Caller) -> Result<Vec<Note>, Problem> {
    let mut tx = backend.store.begin().await?;
    let notes = tx.notes_visible_to(caller.user).await?;
    tx.commit().await?;
    Ok(notes)
}

/// Edits a note as its owner or as a user it was shared with for editing.
#[tracing::instrument(skip(backend, update))]
pub async fn note_update<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    note: Uuid,
    update: NoteUpdate,
) -> Result<Note, Problem> {
    let mut tx = backend.store.begin().await?;
    let mut found = match tx.get_note(note).await? {
        Some(found) if found.owner == caller.user || found.is_shared_with(caller.user) => found,
        _ => return Err(problem::note_not_found(note)),
    };
    if !found.editable_by(caller.user) {
        return Err(problem::read_only(note));
    }

    update.apply_to(&mut found)?;
    tx.save(&found).await?;
    tx.commit().await?;

    Ok(found)
}

#[tracing::instrument(skip(backend))]
pub async fn note_delete<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    note: Uuid,
) -> Result<Note, Problem> {
    let mut tx = backend.store.begin().await?;
    let found = owned_note(&mut tx, &caller, note).await?;
    tx.remove::<Note>(note).await?;
    tx.commit().await?;
    Ok(found)
}

#[tracing::instrument(skip(backend))]
pub async fn task_create<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    data: TaskData,
) -> Result<Task, Problem> {
    if data.title.trim().is_empty() {
        return Err(problem::title_required());
    }

    let task = data.into_task(caller.user);
    let mut tx = backend.store.begin().await?;
    tx.insert(&task).await?;
    tx.commit().await?;

    Ok(task)
}

/// Lists the caller's tasks. `Important` keeps flagged and high priority
/// tasks; `ByDue` orders tasks with a due date first, soonest first.
#[tracing::instrument(skip(backend))]
pub async fn task_list<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    filter: TaskFilter,
) -> Result<Vec<Task>, Problem> {
    let mut tx = backend.store.begin().await?;
    let mut tasks = tx.tasks_of(caller.user).await?;
    tx.commit().await?;

    match filter {
        TaskFilter::All => tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        TaskFilter::Important => {
            tasks.retain(|it| it.important || it.priority == Priority::High);
            tasks.sort_by(|a, b| b.priority.cmp(&a.priority));
        }
        TaskFilter::ByDue => tasks.sort_by(|a, b| match (a.due, b.due) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }),
    }
    Ok(tasks)
}

#[tracing::instrument(skip(backend))]
pub async fn task_set_status<S: Store>(
    backend: &Backend<S>,
    caller: Caller,
    task: Uuid,
    status: TaskStatus,
) -> Result<Task, Problem> {
    let mut tx = backend.store.begin().await?;
    if tx.set_task_status(caller.user, task, status).await? == 0 {
        return Err(problem::task_not_found(task));
    }
    let updated = tx
        .get_task(task)
        .await?
        .ok_or_else(|| problem::task_not_found(task))?;
    tx.commit().await?;
    Ok(updated)
}
