//! Generational arena storage for nodes and observers.
//!
//! Every signal and event lives in a thread-local slot map, and so does every
//! observer callback. Handles carry only a generational key, so a handle to a
//! disposed node can never reach a newer node that reused its slot.
//!
//! The storage is only ever borrowed for short sections that do not call back
//! into user code. Propagation snapshots a node's observer list, releases the
//! borrow, and fetches each callback right before invoking it.

use crate::error::{Error, Result};
use slotmap::{new_key_type, SlotMap};
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

new_key_type! {
    /// Unique identifier for a signal or event in the storage.
    pub struct NodeId;

    /// Unique identifier for an observer registered on a node.
    pub struct ObserverId;
}

/// Type-erased observer callback, invoked with the payload being propagated.
pub(crate) type Callback = Rc<dyn Fn(&dyn Any)>;

/// Wrap a typed observer into a type-erased callback.
pub(crate) fn erase<T: 'static>(f: impl Fn(&T) + 'static) -> Callback {
    Rc::new(move |payload: &dyn Any| {
        if let Some(value) = payload.downcast_ref::<T>() {
            f(value);
        }
    })
}

pub(crate) struct Node {
    /// Current value for signals, `None` for events.
    value: Option<Box<dyn Any>>,
    /// Observers of this node, in registration order.
    observers: Vec<ObserverId>,
    /// Observers this node registered on its inputs.
    inputs: Vec<ObserverId>,
    /// Created by `make`, `make_event` or `constant` rather than a combinator.
    /// Only the write capability may dispose a root.
    root: bool,
}

pub(crate) struct Observer {
    host: NodeId,
    /// Derived node driven by this observer, when a combinator registered it.
    feeds: Option<NodeId>,
    callback: Callback,
}

/// Entries taken out of the storage.
///
/// Must be dropped after the storage borrow is released: callbacks and values
/// may own handles whose `Drop` touches the storage again.
#[must_use]
#[derive(Default)]
pub(crate) struct Removed {
    nodes: Vec<Node>,
    observers: Vec<Observer>,
}

impl Removed {
    fn absorb(&mut self, other: Removed) {
        self.nodes.extend(other.nodes);
        self.observers.extend(other.observers);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

/// Live arena sizes, for leak checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    /// Signals and events currently alive on this thread.
    pub nodes: usize,
    /// Observers currently registered on this thread.
    pub observers: usize,
}

/// Backing store for every node and observer on the current thread.
pub(crate) struct SignalStorage {
    nodes: SlotMap<NodeId, Node>,
    observers: SlotMap<ObserverId, Observer>,
}

impl SignalStorage {
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            observers: SlotMap::with_key(),
        }
    }

    /// Insert a signal node holding `value`.
    pub fn insert_signal<T: 'static>(&mut self, value: T, root: bool) -> NodeId {
        self.nodes.insert(Node {
            value: Some(Box::new(value)),
            observers: Vec::new(),
            inputs: Vec::new(),
            root,
        })
    }

    /// Insert a value-less event node.
    pub fn insert_event(&mut self, root: bool) -> NodeId {
        self.nodes.insert(Node {
            value: None,
            observers: Vec::new(),
            inputs: Vec::new(),
            root,
        })
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(|node| node.root)
    }

    pub fn ensure_live(&self, id: NodeId) -> Result<()> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(Error::Disposed(id))
        }
    }

    /// Borrow the current value of a signal node.
    pub fn get<T: 'static>(&self, id: NodeId) -> Result<&T> {
        self.nodes
            .get(id)
            .ok_or(Error::Disposed(id))?
            .value
            .as_ref()
            .and_then(|value| value.downcast_ref())
            .ok_or(Error::TypeMismatch(id))
    }

    /// Store a new value, returning the previous one.
    pub fn replace<T: 'static>(&mut self, id: NodeId, value: T) -> Result<Box<dyn Any>> {
        let slot = self
            .nodes
            .get_mut(id)
            .ok_or(Error::Disposed(id))?
            .value
            .as_mut()
            .filter(|current| current.is::<T>())
            .ok_or(Error::TypeMismatch(id))?;
        Ok(std::mem::replace(slot, Box::new(value)))
    }

    /// Append an observer to `host`'s list.
    ///
    /// When `feeds` names a derived node, the observer is also recorded as one
    /// of that node's inputs so disposing the node detaches it.
    pub fn subscribe(
        &mut self,
        host: NodeId,
        feeds: Option<NodeId>,
        callback: Callback,
    ) -> Result<ObserverId> {
        self.ensure_live(host)?;
        let id = self.observers.insert(Observer {
            host,
            feeds,
            callback,
        });
        if let Some(node) = self.nodes.get_mut(host) {
            node.observers.push(id);
        }
        if let Some(node) = feeds.and_then(|feeds| self.nodes.get_mut(feeds)) {
            node.inputs.push(id);
        }
        Ok(id)
    }

    /// Snapshot of a node's observers, in registration order.
    pub fn observers(&self, id: NodeId) -> Vec<ObserverId> {
        self.nodes
            .get(id)
            .map(|node| node.observers.clone())
            .unwrap_or_default()
    }

    pub fn callback(&self, id: ObserverId) -> Option<Callback> {
        self.observers.get(id).map(|observer| observer.callback.clone())
    }

    pub fn is_observing(&self, id: ObserverId) -> bool {
        self.observers.contains_key(id)
    }

    /// Remove a single observer from its host.
    pub fn remove_observer(&mut self, id: ObserverId) -> Removed {
        let mut removed = Removed::default();
        if let Some(observer) = self.observers.remove(id) {
            if let Some(host) = self.nodes.get_mut(observer.host) {
                host.observers.retain(|observer| *observer != id);
            }
            removed.observers.push(observer);
        }
        removed
    }

    /// Remove a node, detach it from its inputs, and cascade to every derived
    /// node it feeds.
    pub fn remove_node(&mut self, start: NodeId) -> Removed {
        let mut removed = Removed::default();
        let mut pending = vec![start];
        while let Some(id) = pending.pop() {
            let Some(node) = self.nodes.remove(id) else {
                continue;
            };
            for observer_id in &node.observers {
                if let Some(observer) = self.observers.remove(*observer_id) {
                    pending.extend(observer.feeds);
                    removed.observers.push(observer);
                }
            }
            for input in &node.inputs {
                let detached = self.remove_observer(*input);
                removed.absorb(detached);
            }
            removed.nodes.push(node);
        }
        removed
    }

    pub fn stats(&self) -> Stats {
        Stats {
            nodes: self.nodes.len(),
            observers: self.observers.len(),
        }
    }
}

thread_local! {
    static STORAGE: RefCell<SignalStorage> = RefCell::new(SignalStorage::new());
}

/// Read the thread-local storage.
pub(crate) fn with_signal_storage<R>(f: impl FnOnce(&SignalStorage) -> R) -> R {
    STORAGE.with(|storage| f(&storage.borrow()))
}

/// Mutate the thread-local storage.
pub(crate) fn with_signal_storage_mut<R>(f: impl FnOnce(&mut SignalStorage) -> R) -> R {
    STORAGE.with(|storage| f(&mut storage.borrow_mut()))
}

/// Register an observer on `host`.
pub(crate) fn observe(
    host: NodeId,
    feeds: Option<NodeId>,
    callback: Callback,
) -> Result<ObserverId> {
    let id = with_signal_storage_mut(|storage| storage.subscribe(host, feeds, callback))?;
    tracing::trace!(node = ?host, observer = ?id, derived = ?feeds, "observer registered");
    Ok(id)
}

/// Deliver `payload` to every observer of `id`, depth-first.
///
/// Observers registered while this runs are not called; observers disposed
/// before their turn are skipped. A panicking observer aborts the rest.
pub(crate) fn notify(id: NodeId, payload: &dyn Any) {
    let observers = with_signal_storage(|storage| storage.observers(id));
    tracing::trace!(node = ?id, observers = observers.len(), "propagating");
    for observer in observers {
        let Some(callback) = with_signal_storage(|storage| storage.callback(observer)) else {
            continue;
        };
        callback(payload);
    }
}

/// Dispose a node and everything derived from it. Returns false if it was
/// already gone.
pub(crate) fn dispose_node(id: NodeId) -> bool {
    // The storage may already be torn down when this runs from a destructor at
    // thread exit.
    let Ok(removed) = STORAGE.try_with(|storage| storage.borrow_mut().remove_node(id)) else {
        return false;
    };
    release_node(id, removed)
}

/// Like [`dispose_node`], but refuses root nodes. Read handles go through
/// this so that only the updater or trigger can tear a root down.
pub(crate) fn dispose_derived(id: NodeId) -> bool {
    let Ok(removed) = STORAGE.try_with(|storage| {
        let mut storage = storage.borrow_mut();
        if storage.is_root(id) {
            tracing::debug!(node = ?id, "read handle cannot dispose a root node");
            return Removed::default();
        }
        storage.remove_node(id)
    }) else {
        return false;
    };
    release_node(id, removed)
}

fn release_node(id: NodeId, removed: Removed) -> bool {
    let disposed = removed.node_count() > 0;
    if disposed {
        tracing::debug!(
            node = ?id,
            nodes = removed.node_count(),
            observers = removed.observer_count(),
            "disposed node"
        );
    }
    drop(removed);
    disposed
}

/// Dispose a single observer. Returns false if it was already gone.
pub(crate) fn dispose_observer(id: ObserverId) -> bool {
    let Ok(removed) = STORAGE.try_with(|storage| storage.borrow_mut().remove_observer(id)) else {
        return false;
    };
    let disposed = removed.observer_count() > 0;
    if disposed {
        tracing::debug!(observer = ?id, "disposed observer");
    }
    drop(removed);
    disposed
}

/// Number of live nodes and observers on the current thread.
pub fn stats() -> Stats {
    with_signal_storage(|storage| storage.stats())
}
