//! Core Signal type and its write capability.

use crate::error::Result;
use crate::storage::{self, with_signal_storage, with_signal_storage_mut, NodeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// A continuously-valued node holding a value of type `T`.
///
/// Signals are Copy-able, read-only handles. The value can only be changed
/// through the [`Updater`] returned alongside the signal by [`make`]. Every
/// change that compares unequal to the stored value is pushed synchronously to
/// the signal's observers, in the order they were registered.
///
/// Handles are bound to the thread that created them.
///
/// # Examples
///
/// ```rust,no_run
/// use frp_signals::prelude::*;
///
/// let (count, set_count) = make(0);
/// let doubled = count.map(|n| n * 2);
///
/// set_count.update(21);
/// assert_eq!(doubled.get(), 42);
/// ```
pub struct Signal<T> {
    id: NodeId,
    _phantom: PhantomData<*const T>,
}

impl<T> Copy for Signal<T> {}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Signal<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Signal<T> {}

impl<T> Hash for Signal<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Create a root signal holding `initial`, and the updater that drives it.
pub fn make<T: Clone + PartialEq + 'static>(initial: T) -> (Signal<T>, Updater<T>) {
    let signal = Signal::new(initial, true);
    (signal, Updater { signal })
}

/// Create a signal that never changes.
///
/// A constant is a root with no updater, so it lives as long as the thread.
pub fn constant<T: Clone + PartialEq + 'static>(value: T) -> Signal<T> {
    Signal::new(value, true)
}

/// Create the output node of a combinator. Unlike [`make`], the signal can be
/// disposed through its read handle.
pub(crate) fn make_derived<T: Clone + PartialEq + 'static>(
    initial: T,
) -> (Signal<T>, Updater<T>) {
    let signal = Signal::new(initial, false);
    (signal, Updater { signal })
}

impl<T: 'static> Signal<T> {
    fn new(value: T, root: bool) -> Self {
        let id = with_signal_storage_mut(|storage| storage.insert_signal(value, root));
        tracing::trace!(node = ?id, root, "signal created");
        Self {
            id,
            _phantom: PhantomData,
        }
    }

    /// Read the signal's value with a closure.
    ///
    /// The storage stays borrowed while `f` runs: `f` may read other signals
    /// but must not update signals, trigger events, subscribe, or create nodes.
    /// Any of those panics with a borrow error. Use [`get`](Self::get) when the
    /// value has to outlive the read.
    ///
    /// # Panics
    ///
    /// Panics if the signal has been disposed.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.try_with(f).unwrap_or_else(|err| panic!("{err}"))
    }

    /// Read the signal's value with a closure, failing if it was disposed.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        with_signal_storage(|storage| storage.get::<T>(self.id).map(f))
    }

    /// Whether the signal has been disposed.
    pub fn is_disposed(&self) -> bool {
        !with_signal_storage(|storage| storage.contains(self.id))
    }

    /// Dispose a derived signal, detach it from its inputs, and dispose every
    /// node derived from it.
    ///
    /// Root signals from [`make`] can only be disposed through their
    /// [`Updater`]; for those this does nothing. Returns false if nothing was
    /// disposed.
    pub fn dispose(self) -> bool {
        storage::dispose_derived(self.id)
    }

    /// Get the underlying node ID (mainly for debugging).
    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Get a clone of the current value.
    ///
    /// # Panics
    ///
    /// Panics if the signal has been disposed.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Get a clone of the current value, failing if it was disposed.
    pub fn try_get(&self) -> Result<T> {
        self.try_with(T::clone)
    }
}

impl<T: 'static + fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Signal");
        debug.field("id", &self.id);
        match self.try_with(|value| format!("{value:?}")) {
            Ok(value) => debug.field("value", &format_args!("{value}")),
            Err(_) => debug.field("value", &format_args!("<disposed>")),
        };
        debug.finish()
    }
}

/// The write capability of a root signal.
///
/// Returned by [`make`]. Whoever holds the updater may push new values; holders
/// of the [`Signal`] can only read and observe.
pub struct Updater<T> {
    signal: Signal<T>,
}

impl<T> Copy for Updater<T> {}

impl<T> Clone for Updater<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Clone + PartialEq + 'static> Updater<T> {
    /// Set the signal to `value`.
    ///
    /// If `value` equals the current value nothing happens. Otherwise the value
    /// is stored and every observer runs, depth-first, before this returns.
    /// Returns true if the value changed. Updating a disposed signal does
    /// nothing and returns false.
    pub fn update(&self, value: T) -> bool {
        match self.try_update(value) {
            Ok(changed) => changed,
            Err(err) => {
                tracing::debug!(%err, "update ignored");
                false
            }
        }
    }

    /// Like [`Updater::update`], but reports a disposed signal.
    pub fn try_update(&self, value: T) -> Result<bool> {
        let id = self.signal.id;
        let unchanged = with_signal_storage(|storage| {
            storage.get::<T>(id).map(|current| *current == value)
        })?;
        if unchanged {
            tracing::trace!(node = ?id, "update suppressed: value unchanged");
            return Ok(false);
        }

        let previous = with_signal_storage_mut(|storage| storage.replace(id, value.clone()))?;
        drop(previous);
        storage::notify(id, &value);
        Ok(true)
    }

    /// Compute the next value from the current one, then [`update`](Self::update).
    ///
    /// `f` runs on a clone of the current value with the storage released, so
    /// it may read or update other signals.
    pub fn replace_with(&self, f: impl FnOnce(&T) -> T) -> bool {
        match self.signal.try_get() {
            Ok(current) => self.update(f(&current)),
            Err(err) => {
                tracing::debug!(%err, "update ignored");
                false
            }
        }
    }

    /// The read handle of the signal this updater drives.
    pub fn signal(&self) -> Signal<T> {
        self.signal
    }
}

impl<T> Updater<T> {
    /// Dispose the root signal together with every node derived from it.
    ///
    /// Returns false if it was already disposed.
    pub fn dispose(self) -> bool {
        storage::dispose_node(self.signal.id)
    }
}

impl Updater<bool> {
    /// Toggle the boolean value of the signal.
    pub fn toggle(&self) -> bool {
        self.replace_with(|value| !*value)
    }
}

impl<T: 'static + fmt::Debug> fmt::Debug for Updater<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Updater")
            .field("signal", &self.signal)
            .finish()
    }
}

impl<T> From<Updater<T>> for Signal<T> {
    fn from(updater: Updater<T>) -> Self {
        updater.signal
    }
}
