//! Connection lifecycle events.
//!
//! Observers are notified synchronously on the thread running the
//! statement. A `query` event precedes every statement and a `queryend`
//! event follows every successful one.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::dsn::Dsn;
use crate::result_set::ResultSet;

/// What a statement produced, as seen by observers.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The result set, positioned before its first row. Observers get their
    /// own copy; reading it does not move the caller's cursor.
    Rows(ResultSet),
    /// Rows affected by a data-modifying statement.
    Affected(u64),
}

impl Outcome {
    /// The result set, for row-returning statements.
    #[must_use]
    pub fn result_set(&self) -> Option<&ResultSet> {
        match self {
            Self::Rows(rs) => Some(rs),
            Self::Affected(_) => None,
        }
    }

    /// Affected row count, for data-modifying statements.
    #[must_use]
    pub fn affected(&self) -> Option<u64> {
        match self {
            Self::Rows(_) => None,
            Self::Affected(n) => Some(*n),
        }
    }
}

/// A lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The connection was opened. The DSN carries no password.
    Connect(Dsn),
    /// A statement is about to be sent.
    Query(String),
    /// The statement completed.
    QueryEnd(Outcome),
    /// The connection was closed.
    Close,
}

impl Event {
    /// Lowercase event name: `connect`, `query`, `queryend` or `close`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::Query(_) => "query",
            Self::QueryEnd(_) => "queryend",
            Self::Close => "close",
        }
    }
}

/// Receives connection events.
pub trait Observer: Send + Sync {
    /// Handle one event.
    fn update(&self, event: &Event);
}

impl fmt::Debug for dyn Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Observer")
    }
}

/// Adapts a closure to [`Observer`].
pub struct FnObserver<F>(F);

impl<F> FnObserver<F>
where
    F: Fn(&Event) + Send + Sync,
{
    /// Wrap `f`.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Observer for FnObserver<F>
where
    F: Fn(&Event) + Send + Sync,
{
    fn update(&self, event: &Event) {
        (self.0)(event);
    }
}

/// Keeps every event it sees, for inspection in tests.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    /// Empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the events so far.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Names of the events so far.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(Event::name).collect()
    }

    /// Forget recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Observer for RecordingObserver {
    fn update(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}

/// The observers attached to one connection.
#[derive(Default, Clone)]
pub(crate) struct Observers {
    list: Vec<Arc<dyn Observer>>,
}

impl Observers {
    /// Add unless the same observer is already attached.
    pub(crate) fn add(&mut self, observer: Arc<dyn Observer>) -> bool {
        if self.contains(&observer) {
            return false;
        }
        self.list.push(observer);
        true
    }

    /// Remove by identity.
    pub(crate) fn remove(&mut self, observer: &Arc<dyn Observer>) -> bool {
        let before = self.list.len();
        self.list.retain(|o| !same(o, observer));
        self.list.len() != before
    }

    pub(crate) fn contains(&self, observer: &Arc<dyn Observer>) -> bool {
        self.list.iter().any(|o| same(o, observer))
    }

    pub(crate) fn len(&self) -> usize {
        self.list.len()
    }

    pub(crate) fn notify(&self, event: &Event) {
        for observer in &self.list {
            observer.update(event);
        }
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.list.len())
            .finish()
    }
}

// Compare data pointers only; vtable pointers of the same type may differ
// between codegen units.
fn same(a: &Arc<dyn Observer>, b: &Arc<dyn Observer>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_add_is_idempotent() {
        let recorder: Arc<dyn Observer> = Arc::new(RecordingObserver::new());
        let mut observers = Observers::default();
        assert!(observers.add(Arc::clone(&recorder)));
        assert!(!observers.add(Arc::clone(&recorder)));
        assert_eq!(observers.len(), 1);

        assert!(observers.remove(&recorder));
        assert!(!observers.remove(&recorder));
        assert_eq!(observers.len(), 0);
    }

    #[test]
    fn test_fn_observer() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let observer = FnObserver::new(move |event: &Event| {
            if event.name() == "query" {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        let mut observers = Observers::default();
        observers.add(Arc::new(observer));
        observers.notify(&Event::Query("select 1".into()));
        observers.notify(&Event::QueryEnd(Outcome::Rows(ResultSet::empty())));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_recording_observer() {
        let recorder = RecordingObserver::new();
        recorder.update(&Event::Query("select 1".into()));
        recorder.update(&Event::QueryEnd(Outcome::Affected(3)));
        assert_eq!(recorder.names(), ["query", "queryend"]);
        match &recorder.events()[1] {
            Event::QueryEnd(outcome) => {
                assert_eq!(outcome.affected(), Some(3));
                assert!(outcome.result_set().is_none());
            }
            other => unreachable!("unexpected {other:?}"),
        }
        recorder.clear();
        assert!(recorder.events().is_empty());
    }
}
