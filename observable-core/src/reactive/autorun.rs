//! Autoruns
//!
//! An autorun is an eager reaction: it runs its effect once when created and
//! again after every transaction that changed something it read.
//!
//! # How Autoruns Work
//!
//! 1. The effect runs immediately, reading observables through the supplied
//!    [`Reader`]. Every read subscribes the autorun to that observable.
//!
//! 2. Writes inside a transaction send `begin_update`, which only marks the
//!    autorun as possibly out of date. Nothing runs while the transaction
//!    body executes.
//!
//! 3. When the outermost update ends, the autorun asks its dependencies to
//!    `report_changes`. If any of them really changed, the effect runs
//!    again and re-discovers its dependencies. This repeats until nothing
//!    changed during the last run.
//!
//! # Differences from Derived
//!
//! - Deriveds return a value; autoruns do not.
//! - Deriveds are lazy (compute on access); autoruns are eager.
//! - An autorun is not observable itself, so nothing can depend on it.
//!
//! # Lifetime
//!
//! Observables hold their observers weakly. The [`Autorun`] handle is what
//! keeps the reaction alive: dropping it disposes the autorun, and
//! [`Autorun::detach`] keeps it running for the rest of the program.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::Serialize;

use super::base::{Node, ObservableNode, Observer, Reader};
use super::context::EvaluationContext;
use super::node::NodeId;
use super::observation::{self, ObservationEvent};
use super::tracker::{unsubscribe_all, DependencyTracker, RecomputeScope};
use crate::debug_name::DebugName;
use crate::lifecycle::Disposable;

/// State of an autorun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AutorunState {
    /// A dependency definitely changed. Run again.
    Stale,

    /// A dependency might have changed. Resolve before running.
    DependenciesMightHaveChanged,

    /// Nothing the last run read has changed.
    UpToDate,
}

struct AutorunNode {
    id: NodeId,
    this: Weak<AutorunNode>,
    name: DebugName,
    run: Box<dyn Fn(&dyn Reader)>,
    state: Cell<AutorunState>,
    /// Number of begun but not yet ended updates from dependencies.
    update_count: Cell<usize>,
    disposed: Cell<bool>,
    run_count: Cell<usize>,
    tracker: DependencyTracker,
}

impl AutorunNode {
    /// Run until nothing read by the last run changed.
    fn resolve(&self) {
        loop {
            if self.disposed.get() {
                return;
            }

            if self.state.get() == AutorunState::DependenciesMightHaveChanged {
                for dependency in self.tracker.snapshot() {
                    dependency.report_changes();
                    if self.state.get() == AutorunState::Stale {
                        break;
                    }
                }
                if self.state.get() == AutorunState::DependenciesMightHaveChanged {
                    self.state.set(AutorunState::UpToDate);
                }
            }

            self.run_if_needed();

            if self.state.get() == AutorunState::UpToDate {
                return;
            }
        }
    }

    fn run_if_needed(&self) {
        if self.state.get() == AutorunState::UpToDate {
            return;
        }
        // Set before running so a dependency changing during the run makes
        // the autorun stale again and the resolve loop repeats.
        self.state.set(AutorunState::UpToDate);
        if self.disposed.get() {
            return;
        }

        let run = self.run_count.get() + 1;
        self.run_count.set(run);
        tracing::debug!(node = %self.name, run, "running autorun");
        observation::emit(|sink| {
            let name = self.name.render();
            sink.handle_event(&ObservationEvent::AutorunTriggered {
                id: self.id,
                name: &name,
            });
        });

        {
            let _scope = RecomputeScope::new(&self.tracker, self, || {
                self.state.set(AutorunState::Stale)
            });
            let _ctx = EvaluationContext::enter(self.id);
            (self.run)(self);
        }

        observation::emit(|sink| {
            let name = self.name.render();
            sink.handle_event(&ObservationEvent::AutorunFinished {
                id: self.id,
                name: &name,
            });
        });
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        unsubscribe_all(self.tracker.take_all(), self);
        tracing::trace!(node = %self.name, "autorun disposed");
    }
}

/// Decrements the update counter when dropped, even while unwinding.
struct PendingUpdate<'a>(&'a Cell<usize>);

impl<'a> PendingUpdate<'a> {
    fn begin(count: &'a Cell<usize>) -> Self {
        count.set(count.get() + 1);
        Self(count)
    }
}

impl Drop for PendingUpdate<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

impl Node for AutorunNode {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn debug_name(&self) -> String {
        self.name.render()
    }
}

impl Observer for AutorunNode {
    fn begin_update(&self, _observable: &dyn ObservableNode) {
        self.update_count.set(self.update_count.get() + 1);
        if self.state.get() == AutorunState::UpToDate {
            self.state.set(AutorunState::DependenciesMightHaveChanged);
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

        // The counter stays raised while resolving so updates begun by the
        // effect itself are picked up by this loop instead of nesting.
        let _pending = PendingUpdate(&self.update_count);
        if count == 1 {
            self.resolve();
        }
    }

    fn handle_possible_change(&self, observable: &dyn ObservableNode) {
        if self.state.get() == AutorunState::UpToDate && self.tracker.is_live(observable.node_id()) {
            self.state.set(AutorunState::DependenciesMightHaveChanged);
        }
    }

    fn handle_change(&self, observable: &dyn ObservableNode) {
        if self.tracker.is_live(observable.node_id()) {
            self.state.set(AutorunState::Stale);
        }
    }
}

impl Reader for AutorunNode {
    fn subscribe(&self, observable: &Rc<dyn ObservableNode>) {
        if self.disposed.get() {
            return;
        }
        if let Some(this) = self.this.upgrade() {
            let observer: Rc<dyn Observer> = this;
            observable.add_observer(&observer);
        }
    }

    fn record(&self, observable: Rc<dyn ObservableNode>) {
        if self.disposed.get() {
            // Disposed mid-run: never hold on to anything read afterwards.
            observable.remove_observer(self);
        } else {
            self.tracker.record(observable);
        }
    }

    fn unsubscribe(&self, observable: &dyn ObservableNode) {
        observable.remove_observer(self);
    }
}

/// Handle to a running autorun.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// use observable_core::reactive::{autorun, Observable, SettableValue};
///
/// let count = SettableValue::new("count", 0);
/// let seen = Rc::new(Cell::new(0));
///
/// let (count_clone, seen_clone) = (count.clone(), seen.clone());
/// let logger = autorun(move |r| seen_clone.set(count_clone.read(Some(r))));
/// assert_eq!(seen.get(), 0);
///
/// count.set(5, None);
/// assert_eq!(seen.get(), 5);
///
/// drop(logger);
/// count.set(6, None);
/// assert_eq!(seen.get(), 5);
/// ```
#[must_use = "an autorun is disposed when its handle is dropped; use `detach` to keep it running"]
pub struct Autorun {
    inner: Rc<AutorunNode>,
}

impl Autorun {
    /// Create an autorun and run it once.
    ///
    /// A panic from the first run propagates to the caller and the autorun
    /// is disposed.
    pub fn new<F>(name: impl Into<DebugName>, run: F) -> Self
    where
        F: Fn(&dyn Reader) + 'static,
    {
        let inner = Rc::new_cyclic(|this| AutorunNode {
            id: NodeId::new(),
            this: this.clone(),
            name: name.into(),
            run: Box::new(run),
            state: Cell::new(AutorunState::Stale),
            update_count: Cell::new(0),
            disposed: Cell::new(false),
            run_count: Cell::new(0),
            tracker: DependencyTracker::default(),
        });

        observation::emit(|sink| {
            let name = inner.name.render();
            sink.handle_event(&ObservationEvent::AutorunCreated {
                id: inner.id,
                name: &name,
            });
        });

        let autorun = Self { inner };
        {
            let node = &autorun.inner;
            let _pending = PendingUpdate::begin(&node.update_count);
            node.resolve();
        }
        autorun
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn debug_name(&self) -> String {
        self.inner.name.render()
    }

    /// Get the current state.
    pub fn state(&self) -> AutorunState {
        self.inner.state.get()
    }

    /// Number of times the effect ran.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Number of live dependencies from the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Check if the autorun has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Keep the autorun running for the rest of the program.
    pub fn detach(self) {
        std::mem::forget(self);
    }
}

impl Disposable for Autorun {
    /// Stop the autorun and unsubscribe it from every dependency.
    ///
    /// Notifications that arrive later are ignored. Disposing is final.
    fn dispose(&self) {
        self.inner.dispose();
    }
}

impl Drop for Autorun {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl fmt::Debug for Autorun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Autorun")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("run_count", &self.run_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Create an autorun named after the call site and run it once.
#[track_caller]
pub fn autorun<F>(run: F) -> Autorun
where
    F: Fn(&dyn Reader) + 'static,
{
    Autorun::new(DebugName::caller("autorun"), run)
}

/// Create an autorun with an explicit debug name and run it once.
pub fn autorun_with_name<F>(name: impl Into<DebugName>, run: F) -> Autorun
where
    F: Fn(&dyn Reader) + 'static,
{
    Autorun::new(name, run)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::panic::{self, AssertUnwindSafe};

    use crate::reactive::base::{read_tracked, Observable, ObserverSet};
    use crate::reactive::transaction::run_transaction;
    use crate::reactive::value::SettableValue;

    #[test]
    fn autorun_runs_immediately() {
        let value = SettableValue::new("value", 1);
        let seen = Rc::new(Cell::new(0));
        let (value_clone, seen_clone) = (value.clone(), seen.clone());

        let logger = autorun(move |r| seen_clone.set(value_clone.read(Some(r))));

        assert_eq!(logger.run_count(), 1);
        assert_eq!(seen.get(), 1);
        assert_eq!(logger.state(), AutorunState::UpToDate);
        assert_eq!(logger.dependency_count(), 1);
        assert_eq!(value.observer_count(), 1);
    }

    #[test]
    fn autorun_reruns_on_change() {
        let value = SettableValue::new("value", 1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (value_clone, seen_clone) = (value.clone(), seen.clone());

        let _logger = autorun(move |r| seen_clone.borrow_mut().push(value_clone.read(Some(r))));
        value.set(2, None);
        value.set(3, None);

        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn transaction_batches_runs() {
        let value = SettableValue::new("value", 0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (value_clone, seen_clone) = (value.clone(), seen.clone());
        let logger = autorun(move |r| seen_clone.borrow_mut().push(value_clone.read(Some(r))));

        run_transaction(|tx| {
            value.set(1, Some(tx));
            value.set(2, Some(tx));
            value.set(3, Some(tx));
            assert_eq!(logger.run_count(), 1);
        });

        assert_eq!(logger.run_count(), 2);
        assert_eq!(*seen.borrow(), vec![0, 3]);
    }

    #[test]
    fn unrelated_writes_do_not_run() {
        let read = SettableValue::new("read", 0);
        let unread = SettableValue::new("unread", 0);
        let read_clone = read.clone();
        let logger = autorun(move |r| {
            read_clone.read(Some(r));
        });

        unread.set(1, None);
        assert_eq!(logger.run_count(), 1);
        assert_eq!(unread.observer_count(), 0);
    }

    #[test]
    fn dependencies_are_rediscovered_each_run() {
        let use_a = SettableValue::new("use_a", true);
        let a = SettableValue::new("a", 1);
        let b = SettableValue::new("b", 2);
        let (use_a_clone, a_clone, b_clone) = (use_a.clone(), a.clone(), b.clone());

        let logger = autorun(move |r| {
            if use_a_clone.read(Some(r)) {
                a_clone.read(Some(r));
            } else {
                b_clone.read(Some(r));
            }
        });
        assert_eq!(b.observer_count(), 0);

        use_a.set(false, None);
        assert_eq!(a.observer_count(), 0);
        assert_eq!(b.observer_count(), 1);

        a.set(5, None);
        assert_eq!(logger.run_count(), 2);
        b.set(5, None);
        assert_eq!(logger.run_count(), 3);
    }

    #[test]
    fn dispose_is_final() {
        let value = SettableValue::new("value", 0);
        let value_clone = value.clone();
        let logger = autorun(move |r| {
            value_clone.read(Some(r));
        });

        logger.dispose();
        logger.dispose();
        assert!(logger.is_disposed());
        assert_eq!(value.observer_count(), 0);

        value.set(1, None);
        assert_eq!(logger.run_count(), 1);
    }

    #[test]
    fn dropping_the_handle_disposes() {
        let value = SettableValue::new("value", 0);
        let runs = Rc::new(Cell::new(0));
        let (value_clone, runs_clone) = (value.clone(), runs.clone());
        {
            let _logger = autorun(move |r| {
                value_clone.read(Some(r));
                runs_clone.set(runs_clone.get() + 1);
            });
            assert_eq!(value.observer_count(), 1);
        }

        assert_eq!(value.observer_count(), 0);
        value.set(1, None);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn detached_autorun_keeps_running() {
        let value = SettableValue::new("value", 0);
        let runs = Rc::new(Cell::new(0));
        let (value_clone, runs_clone) = (value.clone(), runs.clone());

        autorun(move |r| {
            value_clone.read(Some(r));
            runs_clone.set(runs_clone.get() + 1);
        })
        .detach();

        value.set(1, None);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn self_writes_settle_in_one_loop() {
        let value = SettableValue::new("value", 0);
        let value_clone = value.clone();
        let stepper = autorun(move |r| {
            let v = value_clone.read(Some(r));
            if v < 3 {
                value_clone.set(v + 1, None);
            }
        });

        assert_eq!(value.get(), 3);
        assert_eq!(stepper.run_count(), 4);
        assert_eq!(stepper.state(), AutorunState::UpToDate);
    }

    #[test]
    fn panicking_run_is_retried_on_next_change() {
        let value = SettableValue::new("value", 1);
        let value_clone = value.clone();
        let checker = autorun(move |r| {
            let v = value_clone.read(Some(r));
            assert!(v > 0, "value must be positive");
        });

        let result = panic::catch_unwind(AssertUnwindSafe(|| value.set(-1, None)));
        assert!(result.is_err());
        assert_eq!(checker.state(), AutorunState::Stale);
        assert_eq!(value.observer_count(), 1);

        value.set(2, None);
        assert_eq!(checker.state(), AutorunState::UpToDate);
        assert_eq!(checker.run_count(), 3);
    }

    #[test]
    fn panicking_first_run_disposes() {
        let value = SettableValue::new("value", 0);
        let value_clone = value.clone();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _logger = autorun(move |r| {
                value_clone.read(Some(r));
                panic!("first run failed");
            });
        }));

        assert!(result.is_err());
        assert_eq!(value.observer_count(), 0);
    }

    #[test]
    fn disposing_inside_the_run_stops_tracking() {
        let value = SettableValue::new("value", 0);
        let later = SettableValue::new("later", 0);
        let slot: Rc<RefCell<Option<Autorun>>> = Rc::new(RefCell::new(None));
        let (value_clone, later_clone, slot_clone) = (value.clone(), later.clone(), slot.clone());

        let stopper = autorun(move |r| {
            if value_clone.read(Some(r)) > 0 {
                if let Some(this) = slot_clone.borrow().as_ref() {
                    this.dispose();
                }
                later_clone.read(Some(r));
            }
        });
        let id = stopper.id();
        *slot.borrow_mut() = Some(stopper);

        value.set(1, None);

        let stopper = slot.borrow_mut().take().expect("stored above");
        assert_eq!(stopper.id(), id);
        assert!(stopper.is_disposed());
        assert_eq!(value.observer_count(), 0);
        assert_eq!(later.observer_count(), 0);
    }

    /// Observable that, when asked to report changes, only reports that it
    /// might have changed.
    #[derive(Default)]
    struct Undecided {
        id: NodeId,
        observers: ObserverSet,
    }

    impl Node for Undecided {
        fn node_id(&self) -> NodeId {
            self.id
        }

        fn debug_name(&self) -> String {
            "undecided".to_string()
        }
    }

    impl ObservableNode for Undecided {
        fn add_observer(&self, observer: &Rc<dyn Observer>) {
            self.observers.insert(observer);
        }

        fn remove_observer(&self, observer: &dyn Observer) {
            self.observers.remove(observer.node_id());
        }

        fn observer_count(&self) -> usize {
            self.observers.len()
        }

        fn report_changes(&self) {
            for observer in self.observers.snapshot() {
                observer.handle_possible_change(self);
            }
        }
    }

    #[test]
    fn possible_change_while_resolving_does_not_run() {
        let undecided: Rc<dyn ObservableNode> = Rc::new(Undecided::default());
        let undecided_clone = undecided.clone();
        let watcher = autorun(move |r| read_tracked(r, undecided_clone.clone(), || ()));
        assert_eq!(undecided.observer_count(), 1);

        run_transaction(|tx| {
            let as_observer: Rc<dyn Observer> = watcher.inner.clone();
            tx.update_observer(as_observer, undecided.clone());
            assert_eq!(watcher.state(), AutorunState::DependenciesMightHaveChanged);
        });

        assert_eq!(watcher.state(), AutorunState::UpToDate);
        assert_eq!(watcher.run_count(), 1);
    }

    #[test]
    fn default_names_point_at_call_site() {
        let unnamed = autorun(|_| {});
        assert!(unnamed.debug_name().starts_with("autorun@"));

        let named = autorun_with_name("render", |_| {});
        assert_eq!(named.debug_name(), "render");
    }
}
