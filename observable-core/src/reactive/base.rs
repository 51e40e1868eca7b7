//! Node Capabilities
//!
//! A node in the graph can play three roles, each expressed as a trait:
//!
//! - [`ObservableNode`]: holds or produces a value and accepts observers.
//!   [`Observable<T>`] is its typed counterpart that exposes the value.
//! - [`Observer`]: receives change notifications from observables.
//! - [`Reader`]: records which observables were consulted while computing.
//!
//! A settable value is only observable, an autorun is an observer and a
//! reader, and a derived value is all three.
//!
//! # Notification Protocol
//!
//! An observable notifies its observers in registration order with:
//!
//! 1. `begin_update`: a transaction touching the observable has started.
//! 2. `handle_possible_change`: the observable might have changed.
//! 3. `handle_change`: the observable definitely changed.
//! 4. `end_update`: the matching transaction ended. Deferred reactions
//!    resolve here.
//!
//! While handling any of these, an observer must not `get` or `read` other
//! observables except through [`ObservableNode::report_changes`]; the graph
//! may be in the middle of a notification pass.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::context::EvaluationContext;
use super::node::NodeId;
use crate::error::panic_message;

/// Identity and label shared by every node.
pub trait Node {
    /// The node's unique ID.
    fn node_id(&self) -> NodeId;

    /// The node's rendered debug label.
    fn debug_name(&self) -> String;
}

/// Type-erased observable capability.
pub trait ObservableNode: Node {
    /// Register an observer. Idempotent.
    ///
    /// The observer is held weakly; once it is dropped it no longer counts
    /// as an observer even if it never called `remove_observer`.
    fn add_observer(&self, observer: &Rc<dyn Observer>);

    /// Unregister an observer. Idempotent.
    fn remove_observer(&self, observer: &dyn Observer);

    /// Number of registered observers that are still alive.
    fn observer_count(&self) -> usize;

    /// Resolve pending staleness and notify observers if the value actually
    /// changed. A no-op for nodes that are never stale.
    fn report_changes(&self);
}

/// Receives change notifications from observables it depends on.
pub trait Observer: Node {
    /// A transaction affecting `observable` has started.
    fn begin_update(&self, observable: &dyn ObservableNode);

    /// The matching transaction ended.
    fn end_update(&self, observable: &dyn ObservableNode);

    /// `observable` might have changed.
    fn handle_possible_change(&self, observable: &dyn ObservableNode);

    /// `observable` definitely changed.
    fn handle_change(&self, observable: &dyn ObservableNode);
}

/// Records dependencies during a computation.
///
/// Reading an observable through a reader happens in two steps: the reader
/// subscribes to the observable *before* its value is obtained (so a derived
/// being read sees an observer and caches), and records the dependency
/// *after* the value is obtained (so a change reported while the value is
/// produced is not mistaken for a change of a live dependency).
pub trait Reader {
    /// Subscribe to `observable` ahead of reading it.
    fn subscribe(&self, observable: &Rc<dyn ObservableNode>);

    /// Record `observable` as a live dependency.
    fn record(&self, observable: Rc<dyn ObservableNode>);

    /// Undo a [`Reader::subscribe`] whose read never completed.
    fn unsubscribe(&self, observable: &dyn ObservableNode);
}

/// An observable holding a value of type `T`.
pub trait Observable<T> {
    /// Return the current value, recomputing first if needed.
    fn get(&self) -> T;

    /// The type-erased node behind this handle.
    fn as_node(&self) -> Rc<dyn ObservableNode>;

    /// Read the value. With a reader, the reader becomes dependent on this
    /// observable; without one this is [`Observable::get`].
    fn read(&self, reader: Option<&dyn Reader>) -> T {
        match reader {
            Some(reader) => read_tracked(reader, self.as_node(), || self.get()),
            None => self.get(),
        }
    }

    /// See [`ObservableNode::report_changes`].
    fn report_changes(&self) {
        self.as_node().report_changes();
    }
}

/// Read a value through `reader`, recording the dependency even if `get`
/// panics so the subscription is still owned by the reader.
///
/// A read of a node that is itself still computing is a cycle. Recording
/// it would tie the node to itself, so the subscription is dropped instead.
pub(crate) fn read_tracked<T>(
    reader: &dyn Reader,
    node: Rc<dyn ObservableNode>,
    get: impl FnOnce() -> T,
) -> T {
    reader.subscribe(&node);
    let _record = RecordOnDrop {
        reader,
        node: Some(node),
    };
    get()
}

struct RecordOnDrop<'a> {
    reader: &'a dyn Reader,
    node: Option<Rc<dyn ObservableNode>>,
}

impl Drop for RecordOnDrop<'_> {
    fn drop(&mut self) {
        if let Some(node) = self.node.take() {
            if EvaluationContext::is_evaluating(node.node_id()) {
                self.reader.unsubscribe(&*node);
            } else {
                self.reader.record(node);
            }
        }
    }
}

/// A short list of strong observer references taken before notifying.
pub(crate) type ObserverSnapshot = SmallVec<[Rc<dyn Observer>; 4]>;

/// Insertion-ordered, idempotent set of observers.
///
/// Observers are held weakly: an observable never keeps its dependents
/// alive. Observers hold their dependencies strongly instead.
#[derive(Default)]
pub(crate) struct ObserverSet {
    observers: RefCell<IndexMap<NodeId, Weak<dyn Observer>>>,
}

impl ObserverSet {
    /// Insert an observer. Returns `true` if it was not present.
    pub fn insert(&self, observer: &Rc<dyn Observer>) -> bool {
        let id = observer.node_id();
        let mut observers = self.observers.borrow_mut();
        if observers.contains_key(&id) {
            return false;
        }
        observers.retain(|_, observer| observer.strong_count() > 0);
        observers.insert(id, Rc::downgrade(observer));
        true
    }

    /// Remove an observer, preserving the order of the rest. Returns `true`
    /// if it was present.
    pub fn remove(&self, id: NodeId) -> bool {
        self.observers.borrow_mut().shift_remove(&id).is_some()
    }

    /// Number of observers that are still alive.
    pub fn len(&self) -> usize {
        self.observers
            .borrow()
            .values()
            .filter(|observer| observer.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        !self
            .observers
            .borrow()
            .values()
            .any(|observer| observer.strong_count() > 0)
    }

    /// Strong references to the live observers, in registration order.
    ///
    /// Notifications iterate a snapshot so observers may subscribe or
    /// unsubscribe while being notified.
    pub fn snapshot(&self) -> ObserverSnapshot {
        self.observers
            .borrow()
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }
}

/// Run `deliver` for every item even if some of them panic.
///
/// Returns the first caught panic payload; the caller decides whether to
/// resume it.
pub(crate) fn deliver_each<I, F>(items: I, mut deliver: F) -> Option<Box<dyn Any + Send>>
where
    I: IntoIterator,
    F: FnMut(&I::Item),
{
    let mut first_panic = None;
    for item in items {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| deliver(&item))) {
            tracing::error!(
                message = %panic_message(payload.as_ref()),
                "observer panicked while ending an update"
            );
            first_panic.get_or_insert(payload);
        }
    }
    first_panic
}

/// Resume a caught panic unless the thread is already unwinding.
pub(crate) fn resume_panic(payload: Option<Box<dyn Any + Send>>) {
    if let Some(payload) = payload {
        if !std::thread::panicking() {
            panic::resume_unwind(payload);
        }
    }
}
