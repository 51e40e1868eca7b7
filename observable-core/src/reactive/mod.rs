//! Reactive Primitives
//!
//! This module implements the observable graph: settable values, derived
//! values, autoruns and the transactions that batch writes between them.
//!
//! # Concepts
//!
//! ## Settable Values
//!
//! A [`SettableValue`] is a container for mutable state. Writing it notifies
//! every observer. Reading it through a [`Reader`] makes the reader depend on
//! it.
//!
//! ## Derived Values
//!
//! A [`Derived`] value caches the result of a computation over other
//! observables. It recomputes lazily, only when it is read and one of its
//! dependencies actually changed, and it only caches while something
//! observes it.
//!
//! ## Autoruns
//!
//! An [`Autorun`] is a side-effecting computation that runs once when created
//! and again after every transaction that changed something it read.
//!
//! ## Transactions
//!
//! A [`Transaction`] batches writes: observers are told an update began
//! immediately but only react once the transaction finishes.
//!
//! # Implementation Notes
//!
//! Change propagation is push-pull. Writes push cheap "might have changed"
//! marks down the graph; reads and transaction ends pull, resolving each
//! mark by asking dependencies whether they really changed. A derived
//! value that depends on the same source twice (a diamond) is therefore
//! recomputed once per transaction, never with half-updated inputs.
//!
//! Dependencies are discovered dynamically: every computation records what
//! it read, and whatever it stopped reading is unsubscribed afterwards.

mod autorun;
mod base;
mod context;
mod derived;
mod keep_observed;
mod node;
mod observation;
mod tracker;
mod transaction;
mod value;

pub use autorun::{autorun, autorun_with_name, Autorun, AutorunState};
pub use base::{Node, Observable, ObservableNode, Observer, Reader};
pub use context::EvaluationContext;
pub use derived::{derived, derived_with_name, Derived, DerivedOptions, DerivedState};
pub use keep_observed::{keep_observed, recompute_initially_and_on_change, KeepObserved};
pub use node::NodeId;
pub use observation::{
    has_observation_sink, install_observation_sink, EventKind, LoggedEvent, ObservationEvent,
    ObservationSink, RecordingSink, TracingSink,
};
pub use transaction::{run_named_transaction, run_transaction, try_run_transaction, Transaction};
pub use value::{observable_value, SettableValue};
