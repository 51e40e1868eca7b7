//! Observable Core
//!
//! This crate provides a push-pull reactive graph for single-threaded
//! programs. It implements:
//!
//! - Settable values that notify their observers when written
//! - Lazily recomputed, cached derived values with dynamic dependencies
//! - Autoruns that re-run a side effect when something they read changes
//! - Transactions that batch writes so reactions run once, glitch-free
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: the graph itself (values, deriveds, autoruns, transactions)
//! - `lifecycle`: the `Disposable` trait and `DisposableStore`
//! - `debug_name`: labels for nodes, used only for diagnostics
//! - `equality`: change-detection predicates for derived values
//! - `error`: the crate's error type
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use observable_core::reactive::{autorun, derived, run_transaction, Observable, SettableValue};
//!
//! let first = SettableValue::new("first", "Ada".to_string());
//! let last = SettableValue::new("last", "Lovelace".to_string());
//!
//! let (first_clone, last_clone) = (first.clone(), last.clone());
//! let full = derived(move |r| format!("{} {}", first_clone.read(Some(r)), last_clone.read(Some(r))));
//!
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let (full_clone, log_clone) = (full.clone(), log.clone());
//! let _printer = autorun(move |r| log_clone.borrow_mut().push(full_clone.read(Some(r))));
//!
//! run_transaction(|tx| {
//!     first.set("Grace".to_string(), Some(tx));
//!     last.set("Hopper".to_string(), Some(tx));
//! });
//!
//! assert_eq!(*log.borrow(), vec!["Ada Lovelace", "Grace Hopper"]);
//! ```

pub mod debug_name;
pub mod equality;
pub mod error;
pub mod lifecycle;
pub mod reactive;

pub use debug_name::DebugName;
pub use error::{ReactiveError, Result};
pub use lifecycle::{to_disposable, Disposable, DisposableStore, DisposeFn};
