//! Equality predicates for derived values.
//!
//! A derived value only notifies its observers when a recomputation yields
//! a value the predicate considers different from the cached one.

use std::rc::Rc;

/// Boxed equality predicate stored by a derived node.
pub type EqualityFn<T> = Box<dyn Fn(&T, &T) -> bool>;

/// Structural equality via `PartialEq`. The default for deriveds.
pub fn default_equals<T: PartialEq>(a: &T, b: &T) -> bool {
    a == b
}

/// Identity equality for shared values.
pub fn ptr_equals<T: ?Sized>(a: &Rc<T>, b: &Rc<T>) -> bool {
    Rc::ptr_eq(a, b)
}

/// Treats every recomputation as a change.
pub fn never_equals<T>(_: &T, _: &T) -> bool {
    false
}
