//! Derived Values
//!
//! A derived value is a cached computation over other observables. It is an
//! observable (others can depend on it), an observer (it is notified when its
//! dependencies change) and a reader (it records what its computation read).
//!
//! # State Machine
//!
//! ```text
//!            first read (observed)
//!   Init ─────────────────────────────▶ UpToDate
//!    ▲                                  │    ▲
//!    │ last observer removed            │    │ report_changes found nothing
//!    │                                  ▼    │
//!    └──── (any state)     DependenciesMightHaveChanged
//!                                       │
//!                       handle_change   ▼
//!                                     Stale ──recompute──▶ UpToDate
//! ```
//!
//! - `begin_update` and `handle_possible_change` move an up-to-date node to
//!   `DependenciesMightHaveChanged` and ripple the uncertainty to its own
//!   observers without recomputing anything.
//! - `handle_change` from a live dependency makes the node `Stale`.
//! - Reading the node (or ending the last pending update) resolves the
//!   uncertainty: every dependency is asked to `report_changes`, which makes
//!   the ones that really changed call `handle_change` back. If none did,
//!   the cache is still valid.
//!
//! # No Caching Without Consumers
//!
//! A derived value without observers does not cache. Reading it runs the
//! computation and immediately drops the result and every subscription, so
//! an unobserved derived costs nothing between reads. Once something
//! observes it (an autorun, another derived, or [`keep_observed`]) the value
//! is cached until the last observer leaves.
//!
//! [`keep_observed`]: crate::reactive::keep_observed

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use serde::Serialize;

use super::base::{
    deliver_each, resume_panic, Node, Observable, ObservableNode, Observer, ObserverSet, Reader,
};
use super::context::EvaluationContext;
use super::node::NodeId;
use super::observation::{self, ObservationEvent};
use super::tracker::{unsubscribe_all, DependencyTracker, RecomputeScope};
use crate::debug_name::DebugName;
use crate::equality::{default_equals, EqualityFn};
use crate::error::{ReactiveError, Result};

/// State of a derived value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedState {
    /// Never computed, or reset because nothing observes it.
    Init,

    /// A dependency might have changed. Resolve before trusting the cache.
    DependenciesMightHaveChanged,

    /// A dependency definitely changed. Recompute.
    Stale,

    /// The cached value is valid.
    UpToDate,
}

/// Configuration for [`Derived::with_options`].
pub struct DerivedOptions<T> {
    name: Option<DebugName>,
    equals: EqualityFn<T>,
}

impl<T> DerivedOptions<T>
where
    T: PartialEq + 'static,
{
    /// Options with `PartialEq` change detection and a call-site name.
    pub fn new() -> Self {
        Self::with_equality(default_equals::<T>)
    }
}

impl<T> DerivedOptions<T>
where
    T: 'static,
{
    /// Options with a custom equality predicate, for values without
    /// `PartialEq` or with a cheaper notion of "unchanged".
    pub fn with_equality<F>(equals: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        Self {
            name: None,
            equals: Box::new(equals),
        }
    }

    pub fn name(mut self, name: impl Into<DebugName>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn equals<F>(mut self, equals: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        self.equals = Box::new(equals);
        self
    }
}

impl<T> Default for DerivedOptions<T>
where
    T: PartialEq + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

struct DerivedNode<T> {
    id: NodeId,
    this: Weak<DerivedNode<T>>,
    name: DebugName,
    compute: Box<dyn Fn(&dyn Reader) -> T>,
    equals: EqualityFn<T>,
    value: RefCell<Option<T>>,
    state: Cell<DerivedState>,
    /// Number of begun but not yet ended updates from dependencies.
    update_count: Cell<usize>,
    compute_count: Cell<usize>,
    tracker: DependencyTracker,
    observers: ObserverSet,
}

impl<T> DerivedNode<T>
where
    T: Clone + 'static,
{
    fn get(&self) -> T {
        if EvaluationContext::is_evaluating(self.id) {
            panic::panic_any(ReactiveError::CyclicDependency {
                name: self.name.render(),
            });
        }

        if self.observers.is_empty() {
            return self.compute_unobserved();
        }

        self.update();
        let cached = self.value.borrow().clone();
        match cached {
            Some(value) => value,
            // The last observer left while resolving.
            None => self.compute_unobserved(),
        }
    }

    /// Compute without caching, then drop every subscription made while
    /// computing.
    fn compute_unobserved(&self) -> T {
        let value = {
            let _reset = ResetOnDrop(self);
            let _ctx = EvaluationContext::enter(self.id);
            self.compute_count.set(self.compute_count.get() + 1);
            tracing::trace!(node = %self.name, "computing unobserved derived");
            (self.compute)(self)
        };

        observation::emit(|sink| {
            let name = self.name.render();
            sink.handle_event(&ObservationEvent::DerivedRecomputed {
                id: self.id,
                name: &name,
                old_value: None,
                new_value: &value,
                changed: false,
            });
        });
        value
    }

    /// Bring the cache up to date.
    fn update(&self) {
        // A write from inside the computation; the running update loop
        // picks up the new state once the computation returns.
        if EvaluationContext::is_evaluating(self.id) {
            return;
        }
        loop {
            if self.observers.is_empty() {
                return;
            }

            if self.state.get() == DerivedState::DependenciesMightHaveChanged {
                for dependency in self.tracker.snapshot() {
                    dependency.report_changes();
                    if self.state.get() == DerivedState::Stale {
                        break;
                    }
                }
                if self.state.get() == DerivedState::DependenciesMightHaveChanged {
                    self.state.set(DerivedState::UpToDate);
                }
            }

            self.recompute_if_needed();

            if self.state.get() == DerivedState::UpToDate {
                return;
            }
        }
    }

    fn recompute_if_needed(&self) {
        if self.state.get() == DerivedState::UpToDate {
            return;
        }

        // Set before computing so a dependency changing during the
        // computation makes the node stale again and the update loop repeats.
        self.state.set(DerivedState::UpToDate);

        let new_value = {
            let _scope = RecomputeScope::new(&self.tracker, self, || {
                self.state.set(DerivedState::Stale)
            });
            let _ctx = EvaluationContext::enter(self.id);
            self.compute_count.set(self.compute_count.get() + 1);
            (self.compute)(self)
        };

        let changed = self
            .value
            .borrow()
            .as_ref()
            .is_some_and(|old| !(self.equals)(old, &new_value));
        tracing::trace!(node = %self.name, changed, "derived recomputed");

        observation::emit(|sink| {
            let name = self.name.render();
            let old_value = self.value.borrow();
            sink.handle_event(&ObservationEvent::DerivedRecomputed {
                id: self.id,
                name: &name,
                old_value: old_value.as_ref().map(|v| v as &dyn Any),
                new_value: &new_value,
                changed,
            });
        });

        let old_value = self.value.borrow_mut().replace(new_value);
        drop(old_value);

        if changed {
            for observer in self.observers.snapshot() {
                observer.handle_change(self);
            }
        }
    }

    /// Drop the cache and every subscription.
    fn reset(&self) {
        self.state.set(DerivedState::Init);
        let old_value = self.value.borrow_mut().take();
        drop(old_value);
        unsubscribe_all(self.tracker.take_all(), self);
        tracing::trace!(node = %self.name, "derived reset");
    }

    fn propagate_possible_change(&self) {
        for observer in self.observers.snapshot() {
            observer.handle_possible_change(self);
        }
    }
}

struct ResetOnDrop<'a, T: Clone + 'static>(&'a DerivedNode<T>);

impl<T: Clone + 'static> Drop for ResetOnDrop<'_, T> {
    fn drop(&mut self) {
        self.0.reset();
    }
}

impl<T> Node for DerivedNode<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn debug_name(&self) -> String {
        self.name.render()
    }
}

impl<T> ObservableNode for DerivedNode<T>
where
    T: Clone + 'static,
{
    fn add_observer(&self, observer: &Rc<dyn Observer>) {
        let added = self.observers.insert(observer);
        // Late subscribers join the update in flight so their end_update
        // stays balanced.
        if added && self.update_count.get() > 0 {
            observer.begin_update(self);
        }
    }

    fn remove_observer(&self, observer: &dyn Observer) {
        if !self.observers.remove(observer.node_id()) {
            return;
        }
        if self.observers.is_empty() {
            self.reset();
        }
        if self.update_count.get() > 0 {
            observer.end_update(self);
        }
    }

    fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn report_changes(&self) {
        if !self.observers.is_empty() {
            self.update();
        }
    }
}

impl<T> Observer for DerivedNode<T>
where
    T: Clone + 'static,
{
    fn begin_update(&self, _observable: &dyn ObservableNode) {
        let count = self.update_count.get() + 1;
        self.update_count.set(count);

        if self.state.get() == DerivedState::UpToDate {
            self.state.set(DerivedState::DependenciesMightHaveChanged);
            self.propagate_possible_change();
        }
        if count == 1 {
            for observer in self.observers.snapshot() {
                observer.begin_update(self);
            }
        }
    }

    fn end_update(&self, observable: &dyn ObservableNode) {
        let count = self.update_count.get();
        if count == 0 {
            tracing::warn!(
                node = %self.name,
                from = %observable.debug_name(),
                "unbalanced end_update ignored"
            );
            return;
        }
        self.update_count.set(count - 1);
        if count > 1 {
            return;
        }

        let resolved = if self.observers.is_empty() {
            None
        } else {
            panic::catch_unwind(AssertUnwindSafe(|| self.update())).err()
        };
        let ended = deliver_each(self.observers.snapshot(), |observer| observer.end_update(self));
        resume_panic(resolved.or(ended));
    }

    fn handle_possible_change(&self, observable: &dyn ObservableNode) {
        if self.state.get() == DerivedState::UpToDate && self.tracker.is_live(observable.node_id()) {
            self.state.set(DerivedState::DependenciesMightHaveChanged);
            self.propagate_possible_change();
        }
    }

    fn handle_change(&self, observable: &dyn ObservableNode) {
        if !self.tracker.is_live(observable.node_id()) {
            return;
        }
        match self.state.get() {
            DerivedState::UpToDate => {
                self.state.set(DerivedState::Stale);
                self.propagate_possible_change();
            }
            DerivedState::DependenciesMightHaveChanged => {
                self.state.set(DerivedState::Stale);
            }
            DerivedState::Init | DerivedState::Stale => {}
        }
    }
}

impl<T> Reader for DerivedNode<T>
where
    T: Clone + 'static,
{
    fn subscribe(&self, observable: &Rc<dyn ObservableNode>) {
        if observable.node_id() == self.id {
            return;
        }
        if let Some(this) = self.this.upgrade() {
            let observer: Rc<dyn Observer> = this;
            observable.add_observer(&observer);
        }
    }

    fn record(&self, observable: Rc<dyn ObservableNode>) {
        if observable.node_id() != self.id {
            self.tracker.record(observable);
        }
    }

    fn unsubscribe(&self, observable: &dyn ObservableNode) {
        observable.remove_observer(self);
    }
}

/// A lazily computed, cached value derived from other observables.
///
/// # Example
///
/// ```rust
/// use observable_core::reactive::{derived, Observable, SettableValue};
///
/// let a = SettableValue::new("a", 2);
/// let b = SettableValue::new("b", 3);
///
/// let (a2, b2) = (a.clone(), b.clone());
/// let sum = derived(move |r| a2.read(Some(r)) + b2.read(Some(r)));
/// assert_eq!(sum.get(), 5);
///
/// a.set(10, None);
/// assert_eq!(sum.get(), 13);
/// ```
pub struct Derived<T> {
    inner: Rc<DerivedNode<T>>,
}

impl<T> Derived<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a derived value named after the call site.
    #[track_caller]
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn(&dyn Reader) -> T + 'static,
    {
        Self::with_options(DerivedOptions::new(), compute)
    }
}

impl<T> Derived<T>
where
    T: Clone + 'static,
{
    /// Create a derived value with explicit options.
    ///
    /// The computation is not run until the value is first read.
    #[track_caller]
    pub fn with_options<F>(options: DerivedOptions<T>, compute: F) -> Self
    where
        F: Fn(&dyn Reader) -> T + 'static,
    {
        let name = match options.name {
            Some(name) => name,
            None => DebugName::caller("derived"),
        };
        let inner = Rc::new_cyclic(|this| DerivedNode {
            id: NodeId::new(),
            this: this.clone(),
            name,
            compute: Box::new(compute),
            equals: options.equals,
            value: RefCell::new(None),
            state: Cell::new(DerivedState::Init),
            update_count: Cell::new(0),
            compute_count: Cell::new(0),
            tracker: DependencyTracker::default(),
            observers: ObserverSet::default(),
        });

        observation::emit(|sink| {
            let name = inner.name.render();
            sink.handle_event(&ObservationEvent::DerivedCreated {
                id: inner.id,
                name: &name,
            });
        });

        Self { inner }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn debug_name(&self) -> String {
        self.inner.name.render()
    }

    /// Like [`Observable::get`], but reports a cyclic read or a panicking
    /// computation as an error.
    pub fn try_get(&self) -> Result<T> {
        if EvaluationContext::is_evaluating(self.inner.id) {
            return Err(ReactiveError::CyclicDependency {
                name: self.debug_name(),
            });
        }
        panic::catch_unwind(AssertUnwindSafe(|| self.inner.get())).map_err(|payload| {
            match payload.downcast::<ReactiveError>() {
                Ok(error) => *error,
                Err(payload) => ReactiveError::from_panic(self.debug_name(), payload.as_ref()),
            }
        })
    }

    /// Get the current state.
    pub fn state(&self) -> DerivedState {
        self.inner.state.get()
    }

    /// Check if the value is cached.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }

    /// Number of live dependencies from the last computation.
    pub fn dependency_count(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Number of times the compute function ran.
    pub fn compute_count(&self) -> usize {
        self.inner.compute_count.get()
    }
}

impl<T> Observable<T> for Derived<T>
where
    T: Clone + 'static,
{
    fn get(&self) -> T {
        self.inner.get()
    }

    fn as_node(&self) -> Rc<dyn ObservableNode> {
        self.inner.clone()
    }
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Derived<T>
where
    T: Clone + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derived")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("observer_count", &self.observer_count())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

/// Create a derived value named after the call site.
#[track_caller]
pub fn derived<T, F>(compute: F) -> Derived<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn(&dyn Reader) -> T + 'static,
{
    Derived::new(compute)
}

/// Create a derived value with an explicit debug name.
pub fn derived_with_name<T, F>(name: impl Into<DebugName>, compute: F) -> Derived<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn(&dyn Reader) -> T + 'static,
{
    Derived::with_options(DerivedOptions::new().name(name), compute)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Disposable;
    use crate::reactive::base::tests::CountingObserver;
    use crate::reactive::keep_observed::keep_observed;
    use crate::reactive::transaction::run_transaction;
    use crate::reactive::value::SettableValue;

    fn observe<T: Clone + 'static>(derived: &Derived<T>) -> Rc<CountingObserver> {
        let observer = CountingObserver::new();
        let as_observer: Rc<dyn Observer> = observer.clone();
        derived.as_node().add_observer(&as_observer);
        observer
    }

    #[test]
    fn derived_is_lazy() {
        let value = SettableValue::new("value", 21);
        let value_clone = value.clone();
        let doubled = derived(move |r| value_clone.read(Some(r)) * 2);

        assert_eq!(doubled.compute_count(), 0);
        assert_eq!(doubled.state(), DerivedState::Init);

        assert_eq!(doubled.get(), 42);
        assert_eq!(doubled.compute_count(), 1);
    }

    #[test]
    fn unobserved_derived_recomputes_on_every_get() {
        let value = SettableValue::new("value", 1);
        let value_clone = value.clone();
        let plus_one = derived(move |r| value_clone.read(Some(r)) + 1);

        for expected_count in 1..=3 {
            assert_eq!(plus_one.get(), 2);
            assert_eq!(plus_one.compute_count(), expected_count);
        }

        assert_eq!(plus_one.state(), DerivedState::Init);
        assert!(!plus_one.has_value());
        assert_eq!(plus_one.dependency_count(), 0);
        assert_eq!(value.observer_count(), 0);
    }

    #[test]
    fn observed_derived_caches() {
        let value = SettableValue::new("value", 1);
        let value_clone = value.clone();
        let plus_one = derived(move |r| value_clone.read(Some(r)) + 1);
        let _observer = observe(&plus_one);

        assert_eq!(plus_one.get(), 2);
        assert_eq!(plus_one.get(), 2);
        assert_eq!(plus_one.compute_count(), 1);
        assert_eq!(plus_one.state(), DerivedState::UpToDate);
        assert_eq!(value.observer_count(), 1);
    }

    #[test]
    fn write_resolves_observed_derived_when_transaction_ends() {
        let value = SettableValue::new("value", 1);
        let value_clone = value.clone();
        let plus_one = derived(move |r| value_clone.read(Some(r)) + 1);
        let observer = observe(&plus_one);
        plus_one.get();

        run_transaction(|tx| {
            value.set(5, Some(tx));
            assert_eq!(plus_one.state(), DerivedState::Stale);
            assert_eq!(observer.begins.get(), 1);
            assert_eq!(observer.possible_changes.get(), 1);
        });

        assert_eq!(plus_one.state(), DerivedState::UpToDate);
        assert_eq!(plus_one.compute_count(), 2);
        assert_eq!(observer.changes.get(), 1);
        assert_eq!(observer.ends.get(), 1);
        assert_eq!(plus_one.get(), 6);
        assert_eq!(plus_one.compute_count(), 2);
    }

    #[test]
    fn begin_update_marks_dependencies_might_have_changed() {
        let value = SettableValue::new("value", 1);
        let value_clone = value.clone();
        let same = derived(move |r| value_clone.read(Some(r)));
        let _observer = observe(&same);
        same.get();

        run_transaction(|tx| {
            let as_observer: Rc<dyn Observer> = same.inner.clone();
            tx.update_observer(as_observer, value.as_node());
            assert_eq!(same.state(), DerivedState::DependenciesMightHaveChanged);
        });

        // Nothing actually changed: the cache survives.
        assert_eq!(same.state(), DerivedState::UpToDate);
        assert_eq!(same.compute_count(), 1);
    }

    #[test]
    fn equal_result_does_not_notify_observers() {
        let value = SettableValue::new("value", 1);
        let value_clone = value.clone();
        let parity = derived(move |r| value_clone.read(Some(r)) % 2);
        let observer = observe(&parity);
        parity.get();

        value.set(3, None);
        assert_eq!(parity.compute_count(), 2);
        assert_eq!(observer.changes.get(), 0);

        value.set(4, None);
        assert_eq!(parity.compute_count(), 3);
        assert_eq!(observer.changes.get(), 1);
    }

    #[test]
    fn custom_equality_controls_change_detection() {
        let value = SettableValue::new("value", 1);
        let value_clone = value.clone();
        let always_changes = Derived::with_options(
            DerivedOptions::<i32>::new().name("always").equals(crate::equality::never_equals),
            move |r| value_clone.read(Some(r)) % 2,
        );
        let observer = observe(&always_changes);
        always_changes.get();

        value.set(3, None);
        assert_eq!(observer.changes.get(), 1);
        assert_eq!(always_changes.debug_name(), "always");
    }

    #[test]
    fn conditional_reads_drop_unused_dependencies() {
        let use_a = SettableValue::new("use_a", true);
        let a = SettableValue::new("a", 1);
        let b = SettableValue::new("b", 2);
        let (use_a_clone, a_clone, b_clone) = (use_a.clone(), a.clone(), b.clone());
        let pick = derived(move |r| {
            if use_a_clone.read(Some(r)) {
                a_clone.read(Some(r))
            } else {
                b_clone.read(Some(r))
            }
        });
        let _observer = observe(&pick);

        assert_eq!(pick.get(), 1);
        assert_eq!(pick.dependency_count(), 2);
        assert_eq!(a.observer_count(), 1);
        assert_eq!(b.observer_count(), 0);

        use_a.set(false, None);
        assert_eq!(pick.get(), 2);
        assert_eq!(a.observer_count(), 0);
        assert_eq!(b.observer_count(), 1);

        let computed = pick.compute_count();
        a.set(10, None);
        assert_eq!(pick.compute_count(), computed);
    }

    #[test]
    fn last_observer_removal_resets() {
        let value = SettableValue::new("value", 1);
        let value_clone = value.clone();
        let plus_one = derived(move |r| value_clone.read(Some(r)) + 1);
        let observer = observe(&plus_one);
        plus_one.get();
        assert!(plus_one.has_value());

        plus_one.as_node().remove_observer(&*observer);

        assert_eq!(plus_one.state(), DerivedState::Init);
        assert!(!plus_one.has_value());
        assert_eq!(plus_one.dependency_count(), 0);
        assert_eq!(value.observer_count(), 0);
    }

    #[test]
    fn panicking_compute_stays_stale_and_retries() {
        let value = SettableValue::new("value", 1);
        let value_clone = value.clone();
        let checked = derived(move |r| {
            let v = value_clone.read(Some(r));
            assert!(v != 0, "value must not be zero");
            10 / v
        });
        let _observer = observe(&checked);
        assert_eq!(checked.get(), 10);

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| value.set(0, None)));
        assert!(result.is_err());
        assert_eq!(checked.state(), DerivedState::Stale);
        // The dependency read before the panic stays subscribed.
        assert_eq!(value.observer_count(), 1);

        assert!(matches!(checked.try_get(), Err(ReactiveError::Panicked { .. })));

        value.set(5, None);
        assert_eq!(checked.get(), 2);
        assert_eq!(checked.state(), DerivedState::UpToDate);
    }

    #[test]
    fn panicking_unobserved_compute_leaks_nothing() {
        let value = SettableValue::new("value", 0);
        let value_clone = value.clone();
        let failing = derived(move |r| {
            let v = value_clone.read(Some(r));
            if v == 0 {
                panic!("zero");
            }
            v
        });

        let error = failing.try_get().unwrap_err();
        assert!(matches!(error, ReactiveError::Panicked { ref message, .. } if message == "zero"));
        assert_eq!(value.observer_count(), 0);
        assert_eq!(failing.state(), DerivedState::Init);
    }

    #[test]
    fn self_read_is_a_cyclic_dependency() {
        let slot: Rc<RefCell<Option<Derived<i32>>>> = Rc::new(RefCell::new(None));
        let slot_clone = slot.clone();
        let looping = derived_with_name("looping", move |r| {
            let this = slot_clone.borrow().clone();
            this.map_or(0, |this| this.read(Some(r)) + 1)
        });
        *slot.borrow_mut() = Some(looping.clone());

        assert_eq!(
            looping.try_get(),
            Err(ReactiveError::CyclicDependency {
                name: "looping".to_string()
            })
        );
        assert_eq!(looping.observer_count(), 0);

        // Break the reference cycle.
        slot.borrow_mut().take();
    }

    #[test]
    fn observed_self_read_is_released_on_dispose() {
        let slot: Rc<RefCell<Option<Derived<i32>>>> = Rc::new(RefCell::new(None));
        let slot_clone = slot.clone();
        let looping = derived_with_name("looping", move |r| {
            let this = slot_clone.borrow().clone();
            this.map_or(0, |this| this.read(Some(r)) + 1)
        });
        *slot.borrow_mut() = Some(looping.clone());

        let keep = keep_observed(&looping);
        assert!(matches!(
            looping.try_get(),
            Err(ReactiveError::CyclicDependency { .. })
        ));
        assert_eq!(looping.observer_count(), 1);
        assert_eq!(looping.dependency_count(), 0);

        keep.dispose();
        assert_eq!(looping.observer_count(), 0);
        assert_eq!(looping.dependency_count(), 0);
        assert_eq!(looping.state(), DerivedState::Init);

        slot.borrow_mut().take();
    }

    #[test]
    fn mutual_cycle_is_released_on_dispose() {
        let ping_slot: Rc<RefCell<Option<Derived<i32>>>> = Rc::new(RefCell::new(None));
        let pong_slot: Rc<RefCell<Option<Derived<i32>>>> = Rc::new(RefCell::new(None));

        let pong_slot_clone = pong_slot.clone();
        let ping = derived_with_name("ping", move |r| {
            let pong = pong_slot_clone.borrow().clone();
            pong.map_or(0, |pong| pong.read(Some(r)) + 1)
        });
        let ping_slot_clone = ping_slot.clone();
        let pong = derived_with_name("pong", move |r| {
            let ping = ping_slot_clone.borrow().clone();
            ping.map_or(0, |ping| ping.read(Some(r)) + 1)
        });
        *ping_slot.borrow_mut() = Some(ping.clone());
        *pong_slot.borrow_mut() = Some(pong.clone());

        let keep = keep_observed(&ping);
        assert_eq!(
            ping.try_get(),
            Err(ReactiveError::CyclicDependency {
                name: "ping".to_string()
            })
        );
        assert_eq!(ping.observer_count(), 1);
        assert_eq!(pong.dependency_count(), 0);

        keep.dispose();
        assert_eq!(ping.observer_count(), 0);
        assert_eq!(pong.observer_count(), 0);
        assert_eq!(ping.dependency_count(), 0);

        ping_slot.borrow_mut().take();
        pong_slot.borrow_mut().take();
    }

    #[test]
    fn dropped_observer_no_longer_counts() {
        let value = SettableValue::new("value", 1);
        let value_clone = value.clone();
        let plus_one = derived(move |r| value_clone.read(Some(r)) + 1);
        let observer = observe(&plus_one);
        plus_one.get();
        assert_eq!(plus_one.observer_count(), 1);

        drop(observer);
        assert_eq!(plus_one.observer_count(), 0);

        // Without live observers reads no longer cache.
        plus_one.get();
        plus_one.get();
        assert_eq!(plus_one.compute_count(), 3);
        assert!(!plus_one.has_value());
        assert_eq!(value.observer_count(), 0);
    }

    #[test]
    fn derived_clone_shares_state() {
        let derived1 = derived(|_| 42);
        let derived2 = derived1.clone();
        let _observer = observe(&derived1);

        assert_eq!(derived1.get(), 42);
        assert_eq!(derived1.id(), derived2.id());
        assert!(derived2.has_value());
        assert_eq!(derived2.compute_count(), 1);
    }

    #[test]
    fn default_names_point_at_call_site() {
        let unnamed = derived(|_| 1);
        assert!(unnamed.debug_name().starts_with("derived@"));
        assert!(unnamed.debug_name().contains("derived.rs"));
    }
}
