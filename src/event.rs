//! Discretely-occurring nodes.
//!
//! An event holds no value. Each [`Trigger::trigger`] delivers its payload to
//! every observer, in registration order, with no equality check: triggering
//! the same payload twice notifies twice.

use crate::error::Result;
use crate::storage::{self, with_signal_storage, with_signal_storage_mut, NodeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// A node that delivers momentary payloads of type `T` to its observers.
pub struct Event<T> {
    id: NodeId,
    _phantom: PhantomData<*const T>,
}

impl<T> Copy for Event<T> {}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Event<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Event<T> {}

impl<T> Hash for Event<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event").field("id", &self.id).finish()
    }
}

/// Create a root event and the trigger that fires it.
pub fn make_event<T: 'static>() -> (Event<T>, Trigger<T>) {
    let event = Event::new(true);
    (event, Trigger { event })
}

/// Create the output node of an event combinator, disposable through its
/// read handle.
pub(crate) fn make_derived_event<T: 'static>() -> (Event<T>, Trigger<T>) {
    let event = Event::new(false);
    (event, Trigger { event })
}

impl<T: 'static> Event<T> {
    fn new(root: bool) -> Self {
        let id = with_signal_storage_mut(|storage| storage.insert_event(root));
        tracing::trace!(node = ?id, root, "event created");
        Self {
            id,
            _phantom: PhantomData,
        }
    }

    /// Whether the event has been disposed.
    pub fn is_disposed(&self) -> bool {
        !with_signal_storage(|storage| storage.contains(self.id))
    }

    /// Dispose a derived event, detach it from its inputs, and dispose every
    /// node derived from it.
    ///
    /// Root events are disposed through their [`Trigger`]; for those this does
    /// nothing and returns false.
    pub fn dispose(self) -> bool {
        storage::dispose_derived(self.id)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }
}

/// The write capability of a root event.
pub struct Trigger<T> {
    event: Event<T>,
}

impl<T> Copy for Trigger<T> {}

impl<T> Clone for Trigger<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> fmt::Debug for Trigger<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger").field("event", &self.event).finish()
    }
}

impl<T: 'static> Trigger<T> {
    /// Deliver `payload` to every observer before returning.
    ///
    /// Triggering a disposed event does nothing.
    pub fn trigger(&self, payload: T) {
        if let Err(err) = self.try_trigger(payload) {
            tracing::debug!(%err, "trigger ignored");
        }
    }

    /// Like [`Trigger::trigger`], but reports a disposed event.
    pub fn try_trigger(&self, payload: T) -> Result<()> {
        let id = self.event.id;
        with_signal_storage(|storage| storage.ensure_live(id))?;
        storage::notify(id, &payload);
        Ok(())
    }

    /// The event this trigger fires.
    pub fn event(&self) -> Event<T> {
        self.event
    }
}

impl<T> Trigger<T> {
    /// Dispose the root event together with every node derived from it.
    pub fn dispose(self) -> bool {
        storage::dispose_node(self.event.id)
    }
}

impl<T> From<Trigger<T>> for Event<T> {
    fn from(trigger: Trigger<T>) -> Self {
        trigger.event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use parking_lot::Mutex;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::Arc;

    fn count_deliveries(event: Event<i32>) -> Arc<Mutex<Vec<i32>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        storage::observe(
            event.id(),
            None,
            storage::erase(move |payload: &i32| seen_clone.lock().push(*payload)),
        )
        .unwrap();
        seen
    }

    #[test]
    fn test_trigger_never_dedups() {
        let (event, trigger) = make_event();
        let seen = count_deliveries(event);

        trigger.trigger(5);
        trigger.trigger(5);
        assert_eq!(*seen.lock(), vec![5, 5]);
    }

    #[test]
    fn test_trigger_without_observers() {
        let (_, trigger) = make_event::<String>();
        assert!(trigger.try_trigger("nobody listens".to_string()).is_ok());
    }

    #[test]
    fn test_trigger_reaches_every_observer() {
        let (event, trigger) = make_event();
        let first = count_deliveries(event);
        let second = count_deliveries(event);

        trigger.trigger(1);
        trigger.trigger(2);
        assert_eq!(*first.lock(), vec![1, 2]);
        assert_eq!(*second.lock(), vec![1, 2]);
    }

    #[test]
    fn test_disposed_event() {
        let (event, trigger) = make_event::<i32>();
        let seen = count_deliveries(event);
        assert!(!Event::from(trigger).dispose());
        assert!(!event.is_disposed());
        assert!(trigger.dispose());
        assert!(event.is_disposed());

        assert_eq!(trigger.try_trigger(1), Err(Error::Disposed(event.id())));
        trigger.trigger(2);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_panicking_observer_skips_later_siblings() {
        let (event, trigger) = make_event::<i32>();
        storage::observe(
            event.id(),
            None,
            storage::erase(|payload: &i32| {
                if *payload < 0 {
                    panic!("negative payload {payload}");
                }
            }),
        )
        .unwrap();
        let later = count_deliveries(event);

        let result = catch_unwind(AssertUnwindSafe(|| trigger.trigger(-1)));
        assert!(result.is_err());
        assert!(later.lock().is_empty());

        trigger.trigger(3);
        assert_eq!(*later.lock(), vec![3]);
    }
}
