//! Side-effecting subscribers, disposal, and the async bridge.
//!
//! Subscribing never ties the observer's lifetime to a Rust value: dropping a
//! [`Subscription`] keeps the observer registered. Release is explicit, either
//! per handle or through a [`Scope`] that disposes everything it tracked when
//! it is dropped.

use crate::event::{Event, Trigger};
use crate::signal::{Signal, Updater};
use crate::storage::{self, erase, with_signal_storage, NodeId, ObserverId};
use futures::channel::mpsc;
use futures::{Stream, StreamExt};
use slotmap::Key;
use std::cell::RefCell;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Handle to an observer registered by [`iter`] or [`iter_ev`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: ObserverId,
}

impl Subscription {
    fn new(result: crate::Result<ObserverId>) -> Self {
        match result {
            Ok(id) => Self { id },
            Err(err) => {
                tracing::debug!(%err, "subscription target disposed");
                Self {
                    id: ObserverId::null(),
                }
            }
        }
    }

    /// Whether the observer is still registered.
    pub fn is_active(&self) -> bool {
        with_signal_storage(|storage| storage.is_observing(self.id))
    }

    /// Remove the observer. Returns false if it was already gone.
    pub fn dispose(self) -> bool {
        storage::dispose_observer(self.id)
    }

    pub fn id(&self) -> ObserverId {
        self.id
    }
}

/// Call `f` with the current value of `signal` now, and again after every
/// change.
///
/// On a disposed signal `f` never runs and the subscription is inactive.
pub fn iter<T, F>(signal: Signal<T>, f: F) -> Subscription
where
    T: Clone + 'static,
    F: Fn(&T) + 'static,
{
    match signal.try_get() {
        Ok(current) => {
            f(&current);
            Subscription::new(storage::observe(signal.id(), None, erase(f)))
        }
        Err(err) => Subscription::new(Err(err)),
    }
}

/// Call `f` with every future payload of `event`.
pub fn iter_ev<T, F>(event: Event<T>, f: F) -> Subscription
where
    T: 'static,
    F: Fn(&T) + 'static,
{
    Subscription::new(storage::observe(event.id(), None, erase(f)))
}

impl<T: Clone + 'static> Signal<T> {
    /// Subscribe to this signal. Alias for [`iter`].
    pub fn for_each(&self, f: impl Fn(&T) + 'static) -> Subscription {
        iter(*self, f)
    }

    /// A stream of every later value of this signal.
    ///
    /// The current value is not replayed. The stream ends once the signal is
    /// disposed. Values queue up until they are polled, see [`Updates`].
    pub fn updates(&self) -> Updates<T> {
        Updates::attach(self.id())
    }
}

impl<T: 'static> Event<T> {
    /// Subscribe to this event. Alias for [`iter_ev`].
    pub fn for_each(&self, f: impl Fn(&T) + 'static) -> Subscription {
        iter_ev(*self, f)
    }

    /// A stream of every later payload of this event. Ends once the event is
    /// disposed. Payloads queue up until they are polled, see [`Updates`].
    pub fn updates(&self) -> Updates<T>
    where
        T: Clone,
    {
        Updates::attach(self.id())
    }
}

/// Stream of values pushed through a signal or event.
///
/// Propagation never waits for the consumer: every value is queued on an
/// unbounded channel, so a stream that is held but not polled grows with each
/// update. Drop it when it is no longer read. Dropping the stream disposes its
/// observer.
pub struct Updates<T> {
    receiver: mpsc::UnboundedReceiver<T>,
    subscription: Subscription,
}

impl<T: Clone + 'static> Updates<T> {
    fn attach(node: NodeId) -> Self {
        let (tx, receiver) = mpsc::unbounded::<T>();
        let subscription = Subscription::new(storage::observe(
            node,
            None,
            erase(move |value: &T| {
                // Nobody is polling once the receiver is gone; its drop disposes us.
                let _ = tx.unbounded_send(value.clone());
            }),
        ));
        Self {
            receiver,
            subscription,
        }
    }
}

impl<T> Updates<T> {
    /// The observer feeding this stream.
    pub fn subscription(&self) -> Subscription {
        self.subscription
    }
}

impl<T> Stream for Updates<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.receiver.poll_next_unpin(cx)
    }
}

impl<T> Drop for Updates<T> {
    fn drop(&mut self) {
        self.subscription.dispose();
    }
}

/// Anything a [`Scope`] can dispose.
///
/// Built from a [`Subscription`], a read handle or a write capability. A handle
/// built from a [`Signal`] or [`Event`] carries the same rights as the read
/// handle: it disposes derived nodes but leaves roots alone. Track the
/// [`Updater`] or [`Trigger`] to have a scope own a root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(Target);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Target {
    Derived(NodeId),
    Root(NodeId),
    Observer(ObserverId),
}

impl Handle {
    /// Dispose whatever this handle refers to.
    pub fn dispose(self) -> bool {
        match self.0 {
            Target::Derived(id) => storage::dispose_derived(id),
            Target::Root(id) => storage::dispose_node(id),
            Target::Observer(id) => storage::dispose_observer(id),
        }
    }
}

impl From<Subscription> for Handle {
    fn from(subscription: Subscription) -> Self {
        Handle(Target::Observer(subscription.id))
    }
}

impl<T: 'static> From<Signal<T>> for Handle {
    fn from(signal: Signal<T>) -> Self {
        Handle(Target::Derived(signal.id()))
    }
}

impl<T: 'static> From<Updater<T>> for Handle {
    fn from(updater: Updater<T>) -> Self {
        Handle(Target::Root(Signal::from(updater).id()))
    }
}

impl<T: 'static> From<Event<T>> for Handle {
    fn from(event: Event<T>) -> Self {
        Handle(Target::Derived(event.id()))
    }
}

impl<T: 'static> From<Trigger<T>> for Handle {
    fn from(trigger: Trigger<T>) -> Self {
        Handle(Target::Root(trigger.event().id()))
    }
}

/// A disposal bag tied to the lifetime of its owner.
///
/// Everything tracked is disposed, newest first, when the scope is dropped.
///
/// ```rust,no_run
/// use frp_signals::prelude::*;
///
/// let (name, set_name) = make(String::new());
/// {
///     let dialog = Scope::new();
///     let greeting = dialog.track(name.map(|n| format!("Hello, {n}")));
///     dialog.track(greeting.for_each(|text| println!("{text}")));
///     set_name.update("Ada".into());
/// }
/// // The derived signal and its subscriber are gone; `name` remains.
/// set_name.update("Grace".into());
/// ```
#[derive(Debug, Default)]
pub struct Scope {
    handles: RefCell<Vec<Handle>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `handle` for disposal and hand it back.
    pub fn track<H: Into<Handle> + Copy>(&self, handle: H) -> H {
        self.handles.borrow_mut().push(handle.into());
        handle
    }

    pub fn len(&self) -> usize {
        self.handles.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.borrow().is_empty()
    }

    /// Dispose everything tracked so far. Returns how many handles were still
    /// live.
    pub fn dispose(&self) -> usize {
        let handles = std::mem::take(&mut *self.handles.borrow_mut());
        handles
            .into_iter()
            .rev()
            .filter(|handle| handle.dispose())
            .count()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        let disposed = self.dispose();
        if disposed > 0 {
            tracing::debug!(disposed, "scope released");
        }
    }
}
