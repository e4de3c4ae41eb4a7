//! Change notification for properties.
//!
//! Every property carries a list of change handlers. When a write (or a
//! change propagated from a bind source) alters the property's resolved
//! value, each enabled handler runs once, synchronously, in registration
//! order.
//!
//! # Key Types
//!
//! - [`HandlerId`] - Token returned by [`PropertyGraph::on_changed`](crate::PropertyGraph::on_changed)
//! - [`PropertyChanged`] - The event passed to handlers
//! - [`ScopedDisableEventHandler`] - RAII guard that mutes one handler
//!
//! Handlers receive the graph mutably, so they may write other properties.
//! Writing the property whose handlers are currently running fails with
//! [`PropertyError::RecursiveCall`](crate::PropertyError::RecursiveCall).

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use slotmap::{SlotMap, new_key_type};

use crate::any::{AnyType, AnyValue};
use crate::graph::PropertyGraph;
use crate::property::PropertyId;

new_key_type! {
    /// A unique identifier for a change handler.
    ///
    /// Use this ID to remove the handler via
    /// [`PropertyGraph::remove_handler`](crate::PropertyGraph::remove_handler)
    /// or to mute it temporarily via
    /// [`PropertyGraph::disable_handler`](crate::PropertyGraph::disable_handler).
    pub struct HandlerId;
}

/// The event delivered to change handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChanged {
    /// The property that changed.
    pub property: PropertyId,
    /// The resolved value after the change.
    pub value: AnyValue,
    /// The resolved value before the change.
    pub previous: AnyValue,
}

impl PropertyChanged {
    /// The new value as a concrete type.
    pub fn value_as<T: AnyType>(&self) -> Option<T> {
        self.value.get()
    }

    /// The previous value as a concrete type.
    pub fn previous_as<T: AnyType>(&self) -> Option<T> {
        self.previous.get()
    }
}

pub(crate) type HandlerFn = Arc<dyn Fn(&mut PropertyGraph, &PropertyChanged) + Send + Sync>;

struct Handler {
    callback: HandlerFn,
    enabled: Arc<AtomicBool>,
    /// Registration order; slot order is not stable across removals.
    seq: u64,
}

/// A property's change handlers.
#[derive(Default)]
pub(crate) struct HandlerList {
    handlers: SlotMap<HandlerId, Handler>,
    next_seq: u64,
}

impl HandlerList {
    pub(crate) fn add(&mut self, callback: HandlerFn) -> HandlerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.handlers.insert(Handler {
            callback,
            enabled: Arc::new(AtomicBool::new(true)),
            seq,
        })
    }

    /// Removing a handler also clears its enable flag, so a notification
    /// already in flight skips it.
    pub(crate) fn remove(&mut self, id: HandlerId) -> bool {
        match self.handlers.remove(id) {
            Some(handler) => {
                handler.enabled.store(false, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.len()
    }

    pub(crate) fn enabled_flag(&self, id: HandlerId) -> Option<Arc<AtomicBool>> {
        self.handlers.get(id).map(|handler| handler.enabled.clone())
    }

    /// Handlers in registration order, with their enable flags.
    ///
    /// The flags are checked again right before each call so a handler that
    /// disables a later one takes effect within the same notification.
    pub(crate) fn snapshot(&self) -> Vec<(Arc<AtomicBool>, HandlerFn)> {
        let mut handlers: Vec<_> = self.handlers.values().collect();
        handlers.sort_by_key(|handler| handler.seq);
        handlers
            .into_iter()
            .map(|handler| (handler.enabled.clone(), handler.callback.clone()))
            .collect()
    }
}

impl fmt::Debug for HandlerList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerList")
            .field("count", &self.handlers.len())
            .finish()
    }
}

/// Mutes a change handler for the guard's lifetime.
///
/// Created via [`PropertyGraph::disable_handler`](crate::PropertyGraph::disable_handler).
/// The handler's previous enabled state is restored when the guard drops,
/// so nested guards over the same handler unwind correctly.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use meta_property::PropertyGraph;
///
/// let mut graph = PropertyGraph::new();
/// let p = graph.construct_property("p", 0_i32);
/// let count = Arc::new(AtomicUsize::new(0));
///
/// let counter = count.clone();
/// let handler = graph
///     .on_changed(&p, move |_, _| {
///         counter.fetch_add(1, Ordering::SeqCst);
///     })
///     .unwrap();
///
/// {
///     let _muted = graph.disable_handler(&p, handler).unwrap();
///     graph.set_value(&p, 1).unwrap();
/// }
/// graph.set_value(&p, 2).unwrap();
/// assert_eq!(count.load(Ordering::SeqCst), 1);
/// ```
#[must_use = "the handler is re-enabled as soon as the guard is dropped"]
pub struct ScopedDisableEventHandler {
    enabled: Arc<AtomicBool>,
    was_enabled: bool,
}

impl ScopedDisableEventHandler {
    pub(crate) fn new(enabled: Arc<AtomicBool>) -> Self {
        let was_enabled = enabled.swap(false, Ordering::SeqCst);
        Self {
            enabled,
            was_enabled,
        }
    }
}

impl Drop for ScopedDisableEventHandler {
    fn drop(&mut self) {
        self.enabled.store(self.was_enabled, Ordering::SeqCst);
    }
}

impl fmt::Debug for ScopedDisableEventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedDisableEventHandler")
            .field("was_enabled", &self.was_enabled)
            .finish()
    }
}
