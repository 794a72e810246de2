//! Search term controller
//!
//! `SearchController` holds the current search term and turns it into
//! continuously updated note lists. Every output follows only the query for
//! the latest term: when the term changes, the previous query is dropped and
//! anything it still produces is discarded.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::live::{LiveQuery, QueryState};
use crate::models::{Note, NoteWithTags};
use crate::store::Store;

/// Live note queries a `SearchController` can switch between
pub trait NoteSource: Send + Sync + 'static {
    /// Every note
    fn all_notes(&self) -> LiveQuery<Vec<Note>>;

    /// Notes containing `term`
    fn search_notes(&self, term: &str) -> LiveQuery<Vec<Note>>;

    /// Every note with its tags
    fn all_notes_with_tags(&self) -> LiveQuery<Vec<NoteWithTags>>;

    /// Notes containing `term`, with their tags
    fn search_notes_with_tags(&self, term: &str) -> LiveQuery<Vec<NoteWithTags>>;
}

impl NoteSource for Store {
    fn all_notes(&self) -> LiveQuery<Vec<Note>> {
        self.get_all_notes()
    }

    fn search_notes(&self, term: &str) -> LiveQuery<Vec<Note>> {
        Store::search_notes(self, term)
    }

    fn all_notes_with_tags(&self) -> LiveQuery<Vec<NoteWithTags>> {
        self.get_all_notes_with_tags()
    }

    fn search_notes_with_tags(&self, term: &str) -> LiveQuery<Vec<NoteWithTags>> {
        Store::search_notes_with_tags(self, term)
    }
}

/// A search term tagged with the number of changes before it
#[derive(Debug, Clone, Default)]
struct SearchTerm {
    generation: u64,
    text: String,
}

impl SearchTerm {
    fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A result together with the search term that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSnapshot<T> {
    /// The term as it was set; empty when not searching
    pub term: String,
    pub items: T,
}

impl<T> SearchSnapshot<T> {
    /// Whether the result came from a non-blank term
    pub fn is_search(&self) -> bool {
        !self.term.trim().is_empty()
    }
}

/// What woke the driver up
enum Event<T> {
    TermChanged,
    ControllerGone,
    Result(Option<QueryState<T>>),
    Closed,
}

/// Holds the current search term and derives note lists from it
pub struct SearchController<S: NoteSource> {
    source: Arc<S>,
    term: watch::Sender<SearchTerm>,
}

impl<S: NoteSource> SearchController<S> {
    /// Create a controller with an empty term
    pub fn new(source: S) -> Self {
        Self::with_shared(Arc::new(source))
    }

    /// Create a controller over a source shared with other owners
    pub fn with_shared(source: Arc<S>) -> Self {
        let (term, _) = watch::channel(SearchTerm::default());
        Self { source, term }
    }

    /// Set the search term
    ///
    /// Setting the current term again changes nothing.
    pub fn set_search_term(&self, term: impl Into<String>) {
        let text = term.into();
        let changed = self.term.send_if_modified(|current| {
            if current.text == text {
                return false;
            }
            current.generation += 1;
            current.text = text;
            true
        });
        if changed {
            debug!(term = %self.term.borrow().text, "search term changed");
        }
    }

    /// Reset the search term to empty
    pub fn clear_search(&self) {
        self.set_search_term(String::new());
    }

    /// The current search term
    pub fn search_term(&self) -> String {
        self.term.borrow().text.clone()
    }

    /// Whether a non-blank term is set
    pub fn is_searching(&self) -> bool {
        !self.term.borrow().is_empty()
    }

    /// All notes while the term is empty, otherwise the matching notes
    pub fn notes(&self) -> LiveQuery<Vec<Note>> {
        self.drive(
            |source, term| {
                if term.is_empty() {
                    source.all_notes()
                } else {
                    source.search_notes(&term.text)
                }
            },
            |_, notes| notes,
        )
    }

    /// Like [`notes`](Self::notes), with each note's tags
    pub fn notes_with_tags(&self) -> LiveQuery<Vec<NoteWithTags>> {
        self.drive(select_notes_with_tags, |_, notes| notes)
    }

    /// Like [`notes_with_tags`](Self::notes_with_tags), with each list labelled
    /// by the term it was fetched for
    pub fn notes_with_tags_snapshots(&self) -> LiveQuery<SearchSnapshot<Vec<NoteWithTags>>> {
        self.drive(select_notes_with_tags, |term, items| SearchSnapshot {
            term: term.to_string(),
            items,
        })
    }

    /// Matching notes, or an empty list while the term is empty
    pub fn search_results(&self) -> LiveQuery<Vec<Note>> {
        self.drive(
            |source, term| {
                if term.is_empty() {
                    LiveQuery::constant(Vec::new())
                } else {
                    source.search_notes(&term.text)
                }
            },
            |_, notes| notes,
        )
    }

    /// Like [`search_results`](Self::search_results), with each note's tags
    pub fn search_results_with_tags(&self) -> LiveQuery<Vec<NoteWithTags>> {
        self.drive(
            |source, term| {
                if term.is_empty() {
                    LiveQuery::constant(Vec::new())
                } else {
                    source.search_notes_with_tags(&term.text)
                }
            },
            |_, notes| notes,
        )
    }

    /// Follow the query `select` picks for the latest term
    ///
    /// `label` turns each result into the output value and sees the term
    /// the result belongs to.
    fn drive<T, U, Q, L>(&self, select: Q, label: L) -> LiveQuery<U>
    where
        Q: Fn(&S, &SearchTerm) -> LiveQuery<T> + Send + 'static,
        L: Fn(&str, T) -> U + Send + 'static,
        T: Clone + Send + Sync + 'static,
        U: Clone + Send + Sync + 'static,
    {
        let (tx, rx) = watch::channel(QueryState::Loading);
        let source = Arc::clone(&self.source);
        let mut terms = self.term.subscribe();

        tokio::spawn(async move {
            let mut controller_alive = true;

            loop {
                let current = terms.borrow_and_update().clone();
                let mut inner = select(&source, &current);

                loop {
                    let event = tokio::select! {
                        biased;
                        _ = tx.closed() => Event::Closed,
                        changed = terms.changed(), if controller_alive => match changed {
                            Ok(()) => Event::TermChanged,
                            Err(_) => Event::ControllerGone,
                        },
                        state = inner.next() => Event::Result(state),
                    };

                    match event {
                        Event::Closed => return,
                        Event::TermChanged => break,
                        Event::ControllerGone => controller_alive = false,
                        Event::Result(Some(state)) => {
                            if terms.borrow().generation != current.generation {
                                break;
                            }
                            // Keep showing the previous list until the new one is ready.
                            if state.is_loading() {
                                continue;
                            }
                            let state = state.map(|value| label(&current.text, value));
                            if tx.send(state).is_err() {
                                return;
                            }
                        }
                        Event::Result(None) => {
                            if !controller_alive {
                                return;
                            }
                            // The query is finished; only a new term can change the output.
                            tokio::select! {
                                _ = tx.closed() => return,
                                changed = terms.changed() => {
                                    if changed.is_err() {
                                        return;
                                    }
                                }
                            }
                            break;
                        }
                    }
                }
            }
        });

        LiveQuery::from_receiver(rx)
    }
}

fn select_notes_with_tags<S: NoteSource>(
    source: &S,
    term: &SearchTerm,
) -> LiveQuery<Vec<NoteWithTags>> {
    if term.is_empty() {
        source.all_notes_with_tags()
    } else {
        source.search_notes_with_tags(&term.text)
    }
}
