//! Error types for the reactive graph.
//!
//! User-supplied compute and effect functions fail by panicking. Most entry
//! points let such panics propagate unchanged; the fallible entry points
//! ([`Derived::try_get`](crate::reactive::Derived::try_get) and
//! [`try_run_transaction`](crate::reactive::try_run_transaction)) convert
//! them into [`ReactiveError::Panicked`].

use std::any::Any;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReactiveError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    #[error("cyclic dependency: `{name}` was read while it was being computed")]
    CyclicDependency { name: String },

    #[error("`{name}` panicked: {message}")]
    Panicked { name: String, message: String },
}

impl ReactiveError {
    /// Build a [`ReactiveError::Panicked`] from a payload caught by `catch_unwind`.
    pub(crate) fn from_panic(name: impl Into<String>, payload: &(dyn Any + Send)) -> Self {
        Self::Panicked {
            name: name.into(),
            message: panic_message(payload),
        }
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(error) = payload.downcast_ref::<ReactiveError>() {
        error.to_string()
    } else {
        "<non-string panic payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_messages_are_extracted() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(payload.as_ref()), "owned boom");

        let payload: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(panic_message(payload.as_ref()), "<non-string panic payload>");
    }

    #[test]
    fn errors_render_node_names() {
        let error = ReactiveError::CyclicDependency {
            name: "total".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "cyclic dependency: `total` was read while it was being computed"
        );

        let payload: Box<dyn Any + Send> = Box::new("division by zero");
        let error = ReactiveError::from_panic("ratio", payload.as_ref());
        assert_eq!(error.to_string(), "`ratio` panicked: division by zero");
    }
}
