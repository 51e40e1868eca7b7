//! Evaluation Context
//!
//! Tracks which derived values and autoruns are currently running their
//! user function on this thread. The graph uses it to detect a derived value
//! being read from inside its own computation, which would otherwise
//! re-enter a node whose state is mid-update.
//!
//! # Implementation
//!
//! We use a thread-local stack. Entering a computation pushes the node onto
//! the stack; the returned guard pops it when dropped, so the stack stays
//! balanced even if the user function panics.

use std::cell::RefCell;

use super::node::NodeId;

thread_local! {
    static EVALUATION_STACK: RefCell<Vec<NodeId>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the evaluation entry when dropped.
pub struct EvaluationContext {
    node: NodeId,
}

impl EvaluationContext {
    /// Mark `node` as running its user function until the guard is dropped.
    pub fn enter(node: NodeId) -> Self {
        EVALUATION_STACK.with(|stack| stack.borrow_mut().push(node));
        Self { node }
    }

    /// Check whether any computation is running.
    pub fn is_active() -> bool {
        EVALUATION_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// The innermost running computation, if any.
    pub fn current() -> Option<NodeId> {
        EVALUATION_STACK.with(|stack| stack.borrow().last().copied())
    }

    /// Check whether `node` is running anywhere on the stack.
    pub fn is_evaluating(node: NodeId) -> bool {
        EVALUATION_STACK.with(|stack| stack.borrow().contains(&node))
    }

    /// Number of nested computations currently running.
    pub fn depth() -> usize {
        EVALUATION_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for EvaluationContext {
    fn drop(&mut self) {
        EVALUATION_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert_eq!(
                popped,
                Some(self.node),
                "evaluation stack mismatch: expected {:?}, got {:?}",
                self.node,
                popped
            );
        });
    }
}
