//! Live queries
//!
//! A live query re-runs its fetch whenever a committed mutation touches one
//! of the tables it reads, and publishes each result through a
//! `tokio::sync::watch` channel.
//!
//! ## Lifecycle
//!
//! 1. The query subscribes to table-change notifications.
//! 2. It fetches once and publishes `Ready` (or `Failed`).
//! 3. It waits for a change to one of its tables, then fetches again.
//! 4. It stops when every observer has been dropped or the store is gone.
//!
//! Subscribing before the first fetch means a commit that lands during the
//! fetch still triggers a refresh.

use std::future::Future;
use std::ops::BitOr;
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::storage::error::{StoreError, StoreResult};

/// Set of tables touched by a mutation or read by a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableSet(u8);

impl TableSet {
    pub const NONE: TableSet = TableSet(0);
    pub const NOTES: TableSet = TableSet(1);
    pub const TAGS: TableSet = TableSet(1 << 1);
    pub const NOTE_TAGS: TableSet = TableSet(1 << 2);
    pub const ALL: TableSet = TableSet(0b111);

    /// Tables read by a note-with-tags projection
    pub const NOTES_WITH_TAGS: TableSet = TableSet(0b111);

    pub const fn union(self, other: TableSet) -> TableSet {
        TableSet(self.0 | other.0)
    }

    pub const fn intersects(self, other: TableSet) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for TableSet {
    type Output = TableSet;

    fn bitor(self, rhs: TableSet) -> TableSet {
        self.union(rhs)
    }
}

/// Sender side of the table-change notifications
pub type ChangeSender = broadcast::Sender<TableSet>;

/// Capacity of the change channel; lagging receivers simply refetch
pub const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Current state of a live query
#[derive(Debug, Clone)]
pub enum QueryState<T> {
    /// No result has been fetched yet
    Loading,
    /// The latest fetched result
    Ready(T),
    /// The latest fetch failed
    Failed(Arc<StoreError>),
}

impl<T> QueryState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, QueryState::Loading)
    }

    /// The ready value, if any
    pub fn ready(&self) -> Option<&T> {
        match self {
            QueryState::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// The failure, if any
    pub fn error(&self) -> Option<&StoreError> {
        match self {
            QueryState::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Map the ready value, keeping loading and failure as they are
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> QueryState<U> {
        match self {
            QueryState::Loading => QueryState::Loading,
            QueryState::Ready(value) => QueryState::Ready(f(value)),
            QueryState::Failed(err) => QueryState::Failed(err),
        }
    }
}

impl<T> From<StoreResult<T>> for QueryState<T> {
    fn from(result: StoreResult<T>) -> Self {
        match result {
            Ok(value) => QueryState::Ready(value),
            Err(err) => QueryState::Failed(Arc::new(err)),
        }
    }
}

/// Observer handle on a continuously updated query result
///
/// Dropping the handle stops the query.
pub struct LiveQuery<T> {
    rx: watch::Receiver<QueryState<T>>,
}

impl<T> LiveQuery<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Spawn a live query driven by `changes`
    ///
    /// `fetch` is re-run whenever a notification intersects `tables`.
    pub fn spawn<F, Fut>(changes: &ChangeSender, tables: TableSet, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = StoreResult<T>> + Send + 'static,
    {
        let mut notifications = changes.subscribe();
        let (tx, rx) = watch::channel(QueryState::Loading);

        tokio::spawn(async move {
            loop {
                let state = QueryState::from(fetch().await);
                if tx.send(state).is_err() {
                    return;
                }

                if !wait_for_change(&tx, &mut notifications, tables).await {
                    return;
                }
                debug!(?tables, "refreshing live query");
            }
        });

        Self { rx }
    }

    /// A query that always holds `value`
    pub fn constant(value: T) -> Self {
        let (tx, rx) = watch::channel(QueryState::Ready(value));
        // Receivers see the value without waiting on a change.
        drop(tx);
        let mut query = Self { rx };
        query.rx.mark_changed();
        query
    }

    /// Wrap an existing watch receiver
    pub fn from_receiver(rx: watch::Receiver<QueryState<T>>) -> Self {
        Self { rx }
    }

    /// The most recent state
    pub fn current(&self) -> QueryState<T> {
        self.rx.borrow().clone()
    }

    /// Wait for the next state that has not been observed yet
    ///
    /// Returns `None` once the query has stopped and every state was seen.
    pub async fn next(&mut self) -> Option<QueryState<T>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until the state satisfies `predicate`
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&QueryState<T>) -> bool,
    ) -> Option<QueryState<T>> {
        self.rx
            .wait_for(|state| predicate(state))
            .await
            .ok()
            .map(|state| state.clone())
    }

    /// Wait for the next `Ready` value, or the failure that replaced it
    ///
    /// The failure is the same error the fetch produced, so callers can
    /// still match on its variant.
    pub async fn next_ready(&mut self) -> Result<T, Arc<StoreError>> {
        loop {
            match self.next().await {
                Some(QueryState::Ready(value)) => return Ok(value),
                Some(QueryState::Failed(err)) => return Err(err),
                Some(QueryState::Loading) => continue,
                None => return Err(Arc::new(StoreError::WorkerStopped)),
            }
        }
    }

    /// Call `callback` with every new state until the subscription is dropped
    pub fn subscribe<C>(mut self, mut callback: C) -> Subscription
    where
        C: FnMut(&QueryState<T>) + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let initial = self.rx.borrow_and_update().clone();
            if !initial.is_loading() {
                callback(&initial);
            }
            while self.rx.changed().await.is_ok() {
                let state = self.rx.borrow_and_update().clone();
                callback(&state);
            }
        });
        Subscription { task }
    }
}

/// Token returned by [`LiveQuery::subscribe`]; dropping it unsubscribes
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    /// Stop delivering states to the callback
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Whether the underlying query is still delivering states
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Wait until a notification touches `tables`
///
/// Returns `false` when the query should stop.
async fn wait_for_change<T>(
    tx: &watch::Sender<QueryState<T>>,
    notifications: &mut broadcast::Receiver<TableSet>,
    tables: TableSet,
) -> bool {
    loop {
        tokio::select! {
            _ = tx.closed() => return false,
            msg = notifications.recv() => match msg {
                Ok(touched) if touched.intersects(tables) => break,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => break,
                Err(broadcast::error::RecvError::Closed) => return false,
            },
        }
    }

    // Coalesce a burst of commits into one refetch.
    while let Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) = notifications.try_recv() {}
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn test_table_set_ops() {
        let set = TableSet::NOTES | TableSet::NOTE_TAGS;
        assert!(set.intersects(TableSet::NOTES));
        assert!(set.intersects(TableSet::NOTE_TAGS));
        assert!(!set.intersects(TableSet::TAGS));
        assert!(TableSet::NONE.is_empty());
        assert_eq!(TableSet::ALL, TableSet::NOTES | TableSet::TAGS | TableSet::NOTE_TAGS);
    }

    #[test]
    fn test_query_state_accessors() {
        let ready: QueryState<i32> = QueryState::Ready(3);
        assert_eq!(ready.ready(), Some(&3));
        assert!(ready.error().is_none());

        let failed: QueryState<i32> = Err(StoreError::Poisoned).into();
        assert!(failed.error().is_some());
        assert!(failed.ready().is_none());

        let loading: QueryState<i32> = QueryState::Loading;
        assert!(loading.is_loading());
        assert!(loading.map(|v| v * 2).is_loading());
        assert_eq!(QueryState::Ready(2).map(|v| v * 2).ready(), Some(&4));
    }

    fn counting_query(
        changes: &ChangeSender,
        tables: TableSet,
    ) -> (LiveQuery<usize>, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let query = LiveQuery::spawn(changes, tables, move || {
            let counter = Arc::clone(&counter);
            async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1) }
        });
        (query, runs)
    }

    #[tokio::test]
    async fn test_first_fetch_is_delivered() {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let (mut query, _) = counting_query(&changes, TableSet::NOTES);

        assert!(query.current().is_loading());
        assert_eq!(query.next_ready().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_refetches_on_relevant_change_only() {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let (mut query, runs) = counting_query(&changes, TableSet::NOTES);
        assert_eq!(query.next_ready().await.unwrap(), 1);

        changes.send(TableSet::TAGS).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        changes.send(TableSet::NOTES | TableSet::TAGS).unwrap();
        assert_eq!(query.next_ready().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_distinguishable() {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let mut query: LiveQuery<Vec<i32>> =
            LiveQuery::spawn(&changes, TableSet::ALL, || async { Err(StoreError::Poisoned) });

        let state = query.next().await.unwrap();
        assert!(matches!(state.error(), Some(StoreError::Poisoned)));
    }

    #[tokio::test]
    async fn test_next_ready_keeps_error_variant() {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let mut query: LiveQuery<Vec<i32>> = LiveQuery::spawn(&changes, TableSet::ALL, || async {
            Err(StoreError::NoteNotFound(42))
        });

        let err = query.next_ready().await.unwrap_err();
        assert!(matches!(*err, StoreError::NoteNotFound(42)));
    }

    #[tokio::test]
    async fn test_next_ready_reports_stopped_query() {
        let (tx, rx) = watch::channel(QueryState::<i32>::Loading);
        let mut query = LiveQuery::from_receiver(rx);
        drop(tx);

        let err = query.next_ready().await.unwrap_err();
        assert!(matches!(*err, StoreError::WorkerStopped));
    }

    #[tokio::test]
    async fn test_stops_when_dropped() {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let (mut query, runs) = counting_query(&changes, TableSet::NOTES);
        query.next_ready().await.unwrap();
        drop(query);

        // The task notices the closed channel and drops its receiver.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(changes.receiver_count(), 0);
        let _ = changes.send(TableSet::NOTES);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stops_when_store_is_gone() {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let (mut query, _) = counting_query(&changes, TableSet::NOTES);
        query.next_ready().await.unwrap();

        drop(changes);
        assert!(query.next().await.is_none());
    }

    #[tokio::test]
    async fn test_constant_query() {
        let mut query = LiveQuery::constant(vec![1, 2]);
        assert_eq!(query.next_ready().await.unwrap(), vec![1, 2]);
        assert!(query.next().await.is_none());
    }

    #[tokio::test]
    async fn test_subscribe_and_unsubscribe() {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let (query, _) = counting_query(&changes, TableSet::NOTES);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = query.subscribe(move |state| {
            if let Some(value) = state.ready() {
                sink.lock().unwrap().push(*value);
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        changes.send(TableSet::NOTES).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert!(subscription.is_active());

        subscription.unsubscribe();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = changes.send(TableSet::NOTES);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }
}
