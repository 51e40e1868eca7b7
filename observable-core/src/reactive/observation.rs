//! Observation Sink
//!
//! A process-wide, optional diagnostic hook. When a sink is installed the
//! graph reports lifecycle events to it: value writes, derived creation and
//! recomputation, autorun runs and transaction boundaries.
//!
//! The sink is purely observational. It receives IDs, labels and borrowed
//! values, and it must be `Send + Sync` while every graph handle is `!Send`,
//! so a sink cannot reach back into the graph and alter its behaviour.
//!
//! Events are only built when a sink is installed, so labels are never
//! rendered in the common case.

use std::any::Any;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use super::node::NodeId;

static SINK: RwLock<Option<Arc<dyn ObservationSink>>> = parking_lot::const_rwlock(None);

/// Lifecycle event reported to an [`ObservationSink`].
#[derive(Debug)]
pub enum ObservationEvent<'a> {
    /// A settable value was written.
    ValueChanged {
        id: NodeId,
        name: &'a str,
        value: &'a dyn Any,
    },

    /// A derived value was created.
    DerivedCreated { id: NodeId, name: &'a str },

    /// A derived value ran its compute function. Unobserved computations
    /// report no old value and never count as a change.
    DerivedRecomputed {
        id: NodeId,
        name: &'a str,
        old_value: Option<&'a dyn Any>,
        new_value: &'a dyn Any,
        changed: bool,
    },

    /// An autorun was created.
    AutorunCreated { id: NodeId, name: &'a str },

    /// An autorun is about to run its effect.
    AutorunTriggered { id: NodeId, name: &'a str },

    /// An autorun finished running its effect.
    AutorunFinished { id: NodeId, name: &'a str },

    /// A transaction started.
    TransactionBegin { id: NodeId, name: &'a str },

    /// A transaction finished delivering its end notifications.
    TransactionEnd { id: NodeId, name: &'a str },
}

impl ObservationEvent<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ValueChanged { .. } => EventKind::ValueChanged,
            Self::DerivedCreated { .. } => EventKind::DerivedCreated,
            Self::DerivedRecomputed { .. } => EventKind::DerivedRecomputed,
            Self::AutorunCreated { .. } => EventKind::AutorunCreated,
            Self::AutorunTriggered { .. } => EventKind::AutorunTriggered,
            Self::AutorunFinished { .. } => EventKind::AutorunFinished,
            Self::TransactionBegin { .. } => EventKind::TransactionBegin,
            Self::TransactionEnd { .. } => EventKind::TransactionEnd,
        }
    }

    pub fn id(&self) -> NodeId {
        match self {
            Self::ValueChanged { id, .. }
            | Self::DerivedCreated { id, .. }
            | Self::DerivedRecomputed { id, .. }
            | Self::AutorunCreated { id, .. }
            | Self::AutorunTriggered { id, .. }
            | Self::AutorunFinished { id, .. }
            | Self::TransactionBegin { id, .. }
            | Self::TransactionEnd { id, .. } => *id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::ValueChanged { name, .. }
            | Self::DerivedCreated { name, .. }
            | Self::DerivedRecomputed { name, .. }
            | Self::AutorunCreated { name, .. }
            | Self::AutorunTriggered { name, .. }
            | Self::AutorunFinished { name, .. }
            | Self::TransactionBegin { name, .. }
            | Self::TransactionEnd { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ValueChanged,
    DerivedCreated,
    DerivedRecomputed,
    AutorunCreated,
    AutorunTriggered,
    AutorunFinished,
    TransactionBegin,
    TransactionEnd,
}

/// Receives read-only lifecycle notifications from the graph.
pub trait ObservationSink: Send + Sync {
    fn handle_event(&self, event: &ObservationEvent<'_>);
}

/// Install a process-wide sink, replacing (and returning) the previous one.
///
/// Pass `None` to uninstall.
pub fn install_observation_sink(
    sink: Option<Arc<dyn ObservationSink>>,
) -> Option<Arc<dyn ObservationSink>> {
    std::mem::replace(&mut *SINK.write(), sink)
}

/// Check whether a sink is installed.
pub fn has_observation_sink() -> bool {
    SINK.read().is_some()
}

/// Hand the installed sink, if any, to `report`.
///
/// The lock is released before the sink runs, so callers only pay for
/// rendering labels when someone is listening.
pub(crate) fn emit<F>(report: F)
where
    F: FnOnce(&dyn ObservationSink),
{
    let sink = SINK.read().clone();
    if let Some(sink) = sink {
        report(&*sink);
    }
}

/// Sink that forwards every event to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ObservationSink for TracingSink {
    fn handle_event(&self, event: &ObservationEvent<'_>) {
        match event {
            ObservationEvent::DerivedRecomputed { id, name, changed, .. } => {
                tracing::debug!(id = %id, node = %name, changed, "derived recomputed");
            }
            other => {
                tracing::debug!(id = %other.id(), node = %other.name(), kind = ?other.kind(), "observation");
            }
        }
    }
}

/// An event captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoggedEvent {
    pub kind: EventKind,
    pub id: NodeId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed: Option<bool>,
}

/// Sink that stores a summary of every event it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LoggedEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Return the recorded events and clear the log.
    pub fn take_events(&self) -> Vec<LoggedEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl ObservationSink for RecordingSink {
    fn handle_event(&self, event: &ObservationEvent<'_>) {
        let changed = match event {
            ObservationEvent::DerivedRecomputed { changed, .. } => Some(*changed),
            _ => None,
        };
        self.events.lock().push(LoggedEvent {
            kind: event.kind(),
            id: event.id(),
            name: event.name().to_string(),
            changed,
        });
    }
}
