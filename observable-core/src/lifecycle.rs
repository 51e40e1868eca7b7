//! Disposal
//!
//! Autoruns and cache-retention handles stop working when disposed. The
//! [`Disposable`] trait gives them a common shape so an owner can collect
//! them in a [`DisposableStore`] and release them together.

use std::cell::{Cell, RefCell};
use std::fmt;

/// Something that can be released. Disposing twice is a no-op.
pub trait Disposable {
    fn dispose(&self);
}

impl<D: Disposable + ?Sized> Disposable for Box<D> {
    fn dispose(&self) {
        (**self).dispose();
    }
}

/// A [`Disposable`] wrapping a closure that runs once.
pub struct DisposeFn {
    f: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl DisposeFn {
    pub fn is_disposed(&self) -> bool {
        self.f.borrow().is_none()
    }
}

impl Disposable for DisposeFn {
    fn dispose(&self) {
        // Release the borrow before running user code.
        let f = self.f.borrow_mut().take();
        if let Some(f) = f {
            f();
        }
    }
}

impl fmt::Debug for DisposeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposeFn")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Turn a closure into a [`Disposable`].
pub fn to_disposable<F>(f: F) -> DisposeFn
where
    F: FnOnce() + 'static,
{
    DisposeFn {
        f: RefCell::new(Some(Box::new(f))),
    }
}

/// A collection of disposables released together, in insertion order.
///
/// Items added after the store was disposed are disposed immediately.
/// Dropping the store disposes it.
#[derive(Default)]
pub struct DisposableStore {
    items: RefCell<Vec<Box<dyn Disposable>>>,
    disposed: Cell<bool>,
}

impl DisposableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<D>(&self, item: D)
    where
        D: Disposable + 'static,
    {
        if self.disposed.get() {
            tracing::warn!("adding to a disposed store; disposing the item immediately");
            item.dispose();
            return;
        }
        self.items.borrow_mut().push(Box::new(item));
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Dispose every held item without marking the store disposed.
    pub fn clear(&self) {
        let items = std::mem::take(&mut *self.items.borrow_mut());
        for item in items {
            item.dispose();
        }
    }
}

impl Disposable for DisposableStore {
    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.clear();
    }
}

impl Drop for DisposableStore {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for DisposableStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposableStore")
            .field("len", &self.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
