//! Debug Names
//!
//! Every node in the graph carries a human-readable label. Labels are used
//! for diagnostics only (tracing output, observation sinks, `Debug`
//! formatting) and never influence graph behaviour.
//!
//! Factories are annotated with `#[track_caller]`, so a node created without
//! an explicit name is labelled with the source location that created it.

use std::borrow::Cow;
use std::fmt;
use std::panic::Location;
use std::rc::Rc;

/// A label for a node in the reactive graph.
#[derive(Clone)]
pub enum DebugName {
    /// A fixed label.
    Static(Cow<'static, str>),

    /// A label computed on demand. Only evaluated when diagnostics need it.
    Dynamic(Rc<dyn Fn() -> String>),

    /// The call site that created the node.
    Location {
        kind: &'static str,
        location: &'static Location<'static>,
    },
}

impl DebugName {
    /// Label a node after the caller of the enclosing `#[track_caller]` function.
    #[track_caller]
    pub fn caller(kind: &'static str) -> Self {
        Self::Location {
            kind,
            location: Location::caller(),
        }
    }

    /// Build a lazily evaluated label.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> String + 'static,
    {
        Self::Dynamic(Rc::new(f))
    }

    /// Render the label.
    pub fn render(&self) -> String {
        match self {
            Self::Static(name) => name.to_string(),
            Self::Dynamic(f) => f(),
            Self::Location { kind, location } => {
                format!("{kind}@{}:{}", location.file(), location.line())
            }
        }
    }
}

impl From<&'static str> for DebugName {
    fn from(name: &'static str) -> Self {
        Self::Static(Cow::Borrowed(name))
    }
}

impl From<String> for DebugName {
    fn from(name: String) -> Self {
        Self::Static(Cow::Owned(name))
    }
}

impl fmt::Display for DebugName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl fmt::Debug for DebugName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.render())
    }
}
