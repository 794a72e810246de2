//! Background note mutations
//!
//! `NoteActions` queues every mutation onto a single worker task, so callers
//! never wait for the database and mutations apply in submission order.
//! Each call returns a [`Pending`] handle: await it to get the result, or
//! drop it and watch a live query for the effect instead.

use std::future::Future;

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::models::{Note, NoteId, NoteTagCrossRef, Tag, TagId};
use crate::storage::{StoreError, StoreResult};
use crate::store::Store;

/// One queued mutation
type Job = Box<dyn FnOnce(Store) -> BoxFuture<'static, ()> + Send>;

/// Result of a queued mutation
///
/// Dropping the handle does not cancel the mutation.
pub struct Pending<T> {
    rx: oneshot::Receiver<StoreResult<T>>,
}

impl<T> Pending<T> {
    /// Wait for the mutation to finish
    pub async fn wait(self) -> StoreResult<T> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(StoreError::WorkerStopped),
        }
    }
}

/// Fire-and-forget mutations against a `Store`
#[derive(Clone)]
pub struct NoteActions {
    jobs: mpsc::UnboundedSender<Job>,
}

impl NoteActions {
    /// Start the worker for `store`
    ///
    /// The worker exits once every clone of the returned handle is dropped
    /// and the queue has drained.
    pub fn new(store: Store) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        tokio::spawn(action_task_loop(store, rx));
        Self { jobs }
    }

    /// Insert the note when it has never been saved (id 0), otherwise update it
    pub fn save_note(&self, note: Note) -> Pending<Note> {
        self.submit("save_note", move |store| async move {
            store.upsert_note(&note).await
        })
    }

    pub fn insert_note(&self, note: Note) -> Pending<Note> {
        self.submit("insert_note", move |store| async move {
            store.insert_note(&note).await
        })
    }

    pub fn update_note(&self, note: Note) -> Pending<Note> {
        self.submit("update_note", move |store| async move {
            store.update_note(&note).await
        })
    }

    pub fn delete_note(&self, note: Note) -> Pending<bool> {
        self.submit("delete_note", move |store| async move {
            store.delete_note(&note).await
        })
    }

    pub fn delete_note_by_id(&self, id: NoteId) -> Pending<bool> {
        self.submit("delete_note_by_id", move |store| async move {
            store.delete_note_by_id(id).await
        })
    }

    pub fn insert_tag(&self, tag: Tag) -> Pending<Tag> {
        self.submit("insert_tag", move |store| async move {
            store.insert_tag(&tag).await
        })
    }

    pub fn update_tag(&self, tag: Tag) -> Pending<Tag> {
        self.submit("update_tag", move |store| async move {
            store.update_tag(&tag).await
        })
    }

    pub fn delete_tag(&self, tag: Tag) -> Pending<bool> {
        self.submit("delete_tag", move |store| async move {
            store.delete_tag(&tag).await
        })
    }

    /// Link a note to a tag
    pub fn link_tag(&self, note_id: NoteId, tag_id: TagId) -> Pending<bool> {
        let cross_ref = NoteTagCrossRef::new(note_id, tag_id);
        self.submit("link_tag", move |store| async move {
            store.insert_note_tag_cross_ref(cross_ref).await
        })
    }

    /// Remove the link between a note and a tag
    pub fn unlink_tag(&self, note_id: NoteId, tag_id: TagId) -> Pending<bool> {
        let cross_ref = NoteTagCrossRef::new(note_id, tag_id);
        self.submit("unlink_tag", move |store| async move {
            store.delete_note_tag_cross_ref(cross_ref).await
        })
    }

    /// Queue `operation` and hand back its result slot
    fn submit<T, F, Fut>(&self, name: &'static str, operation: F) -> Pending<T>
    where
        F: FnOnce(Store) -> Fut + Send + 'static,
        Fut: Future<Output = StoreResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let job: Job = Box::new(move |store: Store| -> BoxFuture<'static, ()> {
            Box::pin(async move {
                let result = operation(store).await;
                if let Err(e) = &result {
                    warn!(action = name, error = %e, "note action failed");
                }
                // The caller may have dropped the handle.
                let _ = reply.send(result);
            })
        });

        if self.jobs.send(job).is_err() {
            warn!(action = name, "note action worker is not running");
        }
        Pending { rx }
    }
}

/// Run queued jobs one at a time until every sender is gone
async fn action_task_loop(store: Store, mut jobs: mpsc::UnboundedReceiver<Job>) {
    debug!("note action worker started");
    while let Some(job) = jobs.recv().await {
        job(store.clone()).await;
    }
    debug!("note action worker stopped");
}
