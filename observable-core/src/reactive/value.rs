//! Settable Values
//!
//! A settable value is the leaf of the graph: it holds a value, accepts
//! observers, and notifies them when written. It never depends on anything.
//!
//! # How Writes Propagate
//!
//! 1. The new value is stored unconditionally. Every write is a change;
//!    equality suppression happens further down, in deriveds.
//!
//! 2. For every observer, in registration order, the write records an
//!    (observer, value) pair with the transaction, which sends
//!    `begin_update`, and then sends `handle_change`.
//!
//! 3. When the transaction finishes, the observers receive `end_update` and
//!    react. A write without a transaction finishes its implicit transaction
//!    before returning.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::base::{Node, Observable, ObservableNode, Observer, ObserverSet};
use super::node::NodeId;
use super::observation::{self, ObservationEvent};
use super::transaction::{run_named_transaction, Transaction};
use crate::debug_name::DebugName;

struct ValueNode<T> {
    id: NodeId,
    name: DebugName,
    value: RefCell<T>,
    observers: ObserverSet,
}

impl<T> Node for ValueNode<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn debug_name(&self) -> String {
        self.name.render()
    }
}

impl<T> ObservableNode for ValueNode<T> {
    fn add_observer(&self, observer: &Rc<dyn Observer>) {
        self.observers.insert(observer);
    }

    fn remove_observer(&self, observer: &dyn Observer) {
        self.observers.remove(observer.node_id());
    }

    fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn report_changes(&self) {}
}

/// A mutable leaf value.
///
/// Cloning the handle shares the underlying value.
///
/// # Example
///
/// ```rust
/// use observable_core::reactive::{Observable, SettableValue};
///
/// let count = SettableValue::new("count", 0);
/// count.set(5, None);
/// assert_eq!(count.get(), 5);
/// ```
pub struct SettableValue<T> {
    inner: Rc<ValueNode<T>>,
}

impl<T> SettableValue<T>
where
    T: Clone + 'static,
{
    /// Create a new value with the given debug name and initial value.
    pub fn new(name: impl Into<DebugName>, value: T) -> Self {
        Self {
            inner: Rc::new(ValueNode {
                id: NodeId::new(),
                name: name.into(),
                value: RefCell::new(value),
                observers: ObserverSet::default(),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn debug_name(&self) -> String {
        self.inner.name.render()
    }

    /// Store `value` and notify observers.
    ///
    /// With a transaction, observers react when that transaction finishes.
    /// Without one, an implicit transaction is created and finished around
    /// this write, so observers have reacted by the time `set` returns.
    #[track_caller]
    pub fn set(&self, value: T, tx: Option<&Transaction>) {
        match tx {
            Some(tx) => self.set_in(value, tx),
            None => run_named_transaction(DebugName::caller("set"), |tx| self.set_in(value, tx)),
        }
    }

    /// Set the value to `f(current)`.
    #[track_caller]
    pub fn update<F>(&self, f: F, tx: Option<&Transaction>)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let current = self.inner.value.borrow();
            f(&*current)
        };
        self.set(new_value, tx);
    }

    fn set_in(&self, value: T, tx: &Transaction) {
        *self.inner.value.borrow_mut() = value;
        tracing::trace!(node = %self.inner.name, observers = self.inner.observers.len(), "value set");

        observation::emit(|sink| {
            let name = self.inner.name.render();
            let value = self.inner.value.borrow();
            sink.handle_event(&ObservationEvent::ValueChanged {
                id: self.inner.id,
                name: &name,
                value: &*value,
            });
        });

        let node: Rc<dyn ObservableNode> = self.inner.clone();
        for observer in self.inner.observers.snapshot() {
            tx.update_observer(observer.clone(), node.clone());
            observer.handle_change(&*node);
        }
    }

    /// Get the number of observers.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }
}

impl<T> Observable<T> for SettableValue<T>
where
    T: Clone + 'static,
{
    fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    fn as_node(&self) -> Rc<dyn ObservableNode> {
        self.inner.clone()
    }
}

impl<T> Clone for SettableValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for SettableValue<T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettableValue")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("value", &*self.inner.value.borrow())
            .field("observer_count", &self.inner.observers.len())
            .finish()
    }
}

/// Create a settable value. Shorthand for [`SettableValue::new`].
pub fn observable_value<T>(name: impl Into<DebugName>, value: T) -> SettableValue<T>
where
    T: Clone + 'static,
{
    SettableValue::new(name, value)
}
