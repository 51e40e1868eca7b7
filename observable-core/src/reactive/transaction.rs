//! Transactions
//!
//! A transaction batches writes. Every write records an
//! (observer, observable) pair and immediately tells the observer that an
//! update began. When the transaction finishes, each recorded pair receives
//! its matching `end_update`, in recording order, exactly once. Eager
//! observers only react at that point, so an autorun over a value written
//! twice inside one transaction runs once and sees the final value.
//!
//! Writes without an explicit transaction open an implicit one around the
//! single write. Transactions are never flattened: a transaction opened
//! inside another one finishes (and triggers its reactions) before the write
//! that created it returns.

use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use smallvec::SmallVec;

use super::base::{deliver_each, resume_panic, Node, ObservableNode, Observer};
use super::node::NodeId;
use super::observation::{self, ObservationEvent};
use crate::debug_name::DebugName;
use crate::error::{ReactiveError, Result};

struct UpdatePair {
    observer: Rc<dyn Observer>,
    observable: Rc<dyn ObservableNode>,
}

/// A batching context handed to the body of [`run_transaction`].
pub struct Transaction {
    id: NodeId,
    name: DebugName,
    updating: RefCell<SmallVec<[UpdatePair; 4]>>,
}

impl Transaction {
    fn new(name: DebugName) -> Self {
        let tx = Self {
            id: NodeId::new(),
            name,
            updating: RefCell::new(SmallVec::new()),
        };
        observation::emit(|sink| {
            let name = tx.name.render();
            sink.handle_event(&ObservationEvent::TransactionBegin {
                id: tx.id,
                name: &name,
            });
        });
        tx
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn debug_name(&self) -> String {
        self.name.render()
    }

    /// Record that `observer` started an update caused by `observable` and
    /// send it `begin_update`.
    ///
    /// The body of [`run_transaction`] only borrows the transaction, so every
    /// recorded pair is ended when the transaction finishes.
    pub fn update_observer(&self, observer: Rc<dyn Observer>, observable: Rc<dyn ObservableNode>) {
        self.updating.borrow_mut().push(UpdatePair {
            observer: observer.clone(),
            observable: observable.clone(),
        });
        observer.begin_update(&*observable);
    }

    /// Number of pairs waiting for their `end_update`.
    pub fn pending_updates(&self) -> usize {
        self.updating.borrow().len()
    }

    /// Deliver `end_update` to every recorded pair.
    ///
    /// Every pair is ended even if some observer panics; the first panic is
    /// returned for the caller to resume.
    fn finish(self) -> Option<Box<dyn std::any::Any + Send>> {
        let pairs = self.updating.take();
        tracing::debug!(transaction = %self.name, updates = pairs.len(), "finishing transaction");

        let payload = deliver_each(pairs, |pair| pair.observer.end_update(&*pair.observable));

        observation::emit(|sink| {
            let name = self.name.render();
            sink.handle_event(&ObservationEvent::TransactionEnd { id: self.id, name: &name });
        });
        payload
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("pending_updates", &self.pending_updates())
            .finish()
    }
}

/// Run `body` inside a new transaction and finish it afterwards.
///
/// Writes that should be batched must pass the supplied transaction. The
/// transaction is finished even if `body` panics; the panic is then resumed.
#[track_caller]
pub fn run_transaction<F>(body: F)
where
    F: FnOnce(&Transaction),
{
    run_named_transaction(DebugName::caller("transaction"), body);
}

/// [`run_transaction`] with an explicit debug name.
pub fn run_named_transaction<F>(name: impl Into<DebugName>, body: F)
where
    F: FnOnce(&Transaction),
{
    let tx = Transaction::new(name.into());
    let result = panic::catch_unwind(AssertUnwindSafe(|| body(&tx)));
    let end_panic = tx.finish();
    match result {
        Ok(()) => resume_panic(end_panic),
        Err(payload) => panic::resume_unwind(payload),
    }
}

/// [`run_transaction`] that reports panics from the body or from reactions
/// as [`ReactiveError::Panicked`] instead of unwinding.
#[track_caller]
pub fn try_run_transaction<F>(body: F) -> Result<()>
where
    F: FnOnce(&Transaction),
{
    let name = DebugName::caller("transaction");
    let label = name.clone();
    panic::catch_unwind(AssertUnwindSafe(|| run_named_transaction(name, body)))
        .map_err(|payload| ReactiveError::from_panic(label.render(), payload.as_ref()))
}
