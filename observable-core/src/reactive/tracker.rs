//! Dependency Tracking
//!
//! Deriveds and autoruns keep two dependency sets:
//!
//! - `live`: observables read during the last computation.
//! - `tentatively_removed`: a working set that only exists while the
//!   computation runs.
//!
//! Before recomputing, the live set is moved into the tentative set. Every
//! read moves its observable back into the live set. Whatever is left in the
//! tentative set afterwards was not read this time and is unsubscribed.
//!
//! A dependency that is read again therefore never drops to zero observers
//! in between (which would reset a derived and throw its cache away), and a
//! dependency that is no longer read is unsubscribed exactly once.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::base::{Node, ObservableNode, Observer};
use super::node::NodeId;

/// Insertion-ordered set of observables keyed by node ID.
pub(crate) type DependencySet = IndexMap<NodeId, Rc<dyn ObservableNode>>;

#[derive(Default)]
pub(crate) struct DependencyTracker {
    live: RefCell<DependencySet>,
    tentatively_removed: RefCell<DependencySet>,
}

impl DependencyTracker {
    /// Move every live dependency into the tentatively removed set.
    pub fn begin_recompute(&self) {
        let mut live = self.live.borrow_mut();
        let mut removed = self.tentatively_removed.borrow_mut();
        debug_assert!(removed.is_empty(), "recomputation already in progress");
        std::mem::swap(&mut *live, &mut *removed);
    }

    /// Record `observable` as read during the current computation.
    pub fn record(&self, observable: Rc<dyn ObservableNode>) {
        let id = observable.node_id();
        self.tentatively_removed.borrow_mut().shift_remove(&id);
        self.live.borrow_mut().entry(id).or_insert(observable);
    }

    /// Take the dependencies that were not read again.
    pub fn take_removed(&self) -> DependencySet {
        std::mem::take(&mut *self.tentatively_removed.borrow_mut())
    }

    /// Take every dependency, live or tentatively removed.
    pub fn take_all(&self) -> DependencySet {
        let mut all = std::mem::take(&mut *self.live.borrow_mut());
        all.extend(self.take_removed());
        all
    }

    /// A live dependency is one read during the last computation that is
    /// not waiting to be unsubscribed.
    pub fn is_live(&self, id: NodeId) -> bool {
        self.live.borrow().contains_key(&id) && !self.tentatively_removed.borrow().contains_key(&id)
    }

    /// Strong references to the live dependencies, in read order.
    pub fn snapshot(&self) -> SmallVec<[Rc<dyn ObservableNode>; 4]> {
        self.live.borrow().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.live.borrow().len()
    }
}

/// Remove `observer` from every observable in `dependencies`.
pub(crate) fn unsubscribe_all(dependencies: DependencySet, observer: &dyn Observer) {
    for dependency in dependencies.into_values() {
        dependency.remove_observer(observer);
    }
}

/// Guard around a user computation.
///
/// On drop it unsubscribes the dependencies that were not read again. If the
/// computation is unwinding, `on_unwind` runs first so the owner can leave
/// itself stale.
pub(crate) struct RecomputeScope<'a, F: FnMut()> {
    tracker: &'a DependencyTracker,
    observer: &'a dyn Observer,
    on_unwind: F,
}

impl<'a, F: FnMut()> RecomputeScope<'a, F> {
    pub fn new(tracker: &'a DependencyTracker, observer: &'a dyn Observer, on_unwind: F) -> Self {
        tracker.begin_recompute();
        Self {
            tracker,
            observer,
            on_unwind,
        }
    }
}

impl<F: FnMut()> Drop for RecomputeScope<'_, F> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            (self.on_unwind)();
        }
        unsubscribe_all(self.tracker.take_removed(), self.observer);
    }
}
