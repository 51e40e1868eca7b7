//! Cache Retention
//!
//! A derived value only caches while something observes it. These helpers
//! register a pseudo-observer that does nothing on change notifications but
//! keeps the observer count above zero, so the cache survives between reads.
//!
//! Retention alone never computes anything: a retained derived that was
//! never read has no dependencies to react to. Once read, it resolves itself
//! whenever an update it depends on ends.
//!
//! [`recompute_initially_and_on_change`] goes one step further: it settles
//! the observable right away and again whenever an update ends (or reads it
//! and hands the value to a callback).

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use super::base::{Node, Observable, ObservableNode, Observer};
use super::node::NodeId;
use crate::lifecycle::Disposable;

struct KeepAliveObserver {
    id: NodeId,
    target: String,
    counter: Cell<usize>,
    /// Runs when the last pending update ends. `None` only retains.
    on_settled: Option<Box<dyn Fn(&dyn ObservableNode)>>,
}

impl Node for KeepAliveObserver {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn debug_name(&self) -> String {
        format!("keep_observed({})", self.target)
    }
}

impl Observer for KeepAliveObserver {
    fn begin_update(&self, _observable: &dyn ObservableNode) {
        self.counter.set(self.counter.get() + 1);
    }

    fn end_update(&self, observable: &dyn ObservableNode) {
        let count = self.counter.get();
        if count == 0 {
            tracing::warn!(node = %self.debug_name(), "unbalanced end_update ignored");
            return;
        }
        self.counter.set(count - 1);
        if count == 1 {
            if let Some(on_settled) = &self.on_settled {
                on_settled(observable);
            }
        }
    }

    fn handle_possible_change(&self, _observable: &dyn ObservableNode) {}

    fn handle_change(&self, _observable: &dyn ObservableNode) {}
}

/// Handle returned by [`keep_observed`] and
/// [`recompute_initially_and_on_change`].
///
/// The observable stays observed until the handle is disposed or dropped.
#[must_use = "the observable is released when this handle is dropped"]
pub struct KeepObserved {
    node: Rc<dyn ObservableNode>,
    observer: Rc<KeepAliveObserver>,
    disposed: Cell<bool>,
}

impl KeepObserved {
    fn attach(node: Rc<dyn ObservableNode>, observer: KeepAliveObserver) -> Self {
        let observer = Rc::new(observer);
        let as_observer: Rc<dyn Observer> = observer.clone();
        node.add_observer(&as_observer);
        tracing::trace!(node = %observer.target, "keeping observed");
        Self {
            node,
            observer,
            disposed: Cell::new(false),
        }
    }

    /// ID of the retained observable.
    pub fn target(&self) -> NodeId {
        self.node.node_id()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

impl Disposable for KeepObserved {
    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.node.remove_observer(&*self.observer);
    }
}

impl Drop for KeepObserved {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for KeepObserved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeepObserved")
            .field("target", &self.observer.target)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Keep `observable` observed so a derived value keeps its cache between
/// reads.
pub fn keep_observed<T, O>(observable: &O) -> KeepObserved
where
    O: Observable<T> + ?Sized,
{
    let node = observable.as_node();
    let observer = KeepAliveObserver {
        id: NodeId::new(),
        target: node.debug_name(),
        counter: Cell::new(0),
        on_settled: None,
    };
    KeepObserved::attach(node, observer)
}

/// Keep `observable` observed and bring it up to date now and after every
/// update that touched it.
///
/// Without a handler the observable is asked to `report_changes`. With one,
/// its value is read and passed to the handler.
pub fn recompute_initially_and_on_change<T, O>(
    observable: &O,
    handler: Option<Box<dyn Fn(T)>>,
) -> KeepObserved
where
    T: 'static,
    O: Observable<T> + Clone + 'static,
{
    let node = observable.as_node();
    let on_settled: Box<dyn Fn(&dyn ObservableNode)> = match handler {
        Some(handler) => {
            let observable = observable.clone();
            Box::new(move |_: &dyn ObservableNode| handler(observable.get()))
        }
        None => Box::new(|node: &dyn ObservableNode| node.report_changes()),
    };
    let observer = KeepAliveObserver {
        id: NodeId::new(),
        target: node.debug_name(),
        counter: Cell::new(0),
        on_settled: Some(on_settled),
    };
    let handle = KeepObserved::attach(node, observer);

    if let Some(on_settled) = &handle.observer.on_settled {
        on_settled(&*handle.node);
    }
    handle
}
