//! Array properties.
//!
//! An array property is an ordinary property whose kind is
//! [`ValueKind::Array`](crate::ValueKind::Array). Element edits go through
//! the same write path as a whole-array write, so modifiers, binds and change
//! handlers see them as a single change of the whole array.
//!
//! [`ArrayChangedHandler`] turns those changes into structured
//! [`ArrayChanges`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use meta_property::{ArrayChangedHandler, PropertyGraph};
//!
//! let mut graph = PropertyGraph::new();
//! let list = graph.construct_array_property("list", vec![1_i32, 2, 3]);
//!
//! let last = Arc::new(Mutex::new(None));
//! let sink = last.clone();
//! let mut handler = ArrayChangedHandler::subscribe(&mut graph, &list, move |changes| {
//!     *sink.lock() = Some(changes.clone());
//! })
//! .unwrap();
//!
//! graph.array_remove(&list, 0).unwrap();
//! assert_eq!(last.lock().as_ref().unwrap().indexes_removed, vec![0]);
//!
//! handler.unsubscribe(&mut graph);
//! ```

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use crate::any::{AnyType, AnyValue, ArrayValue};
use crate::diff::{ArrayChanges, diff, diff_hashed};
use crate::error::{Outcome, PropertyError, Result};
use crate::event::HandlerId;
use crate::graph::PropertyGraph;
use crate::property::{ArrayProperty, PropertyId};

impl PropertyGraph {
    /// Add an array property holding `initial` until something is written to it.
    pub fn construct_array_property<T: AnyType>(
        &mut self,
        name: impl Into<String>,
        initial: Vec<T>,
    ) -> ArrayProperty<T> {
        self.construct_property(name, initial)
    }

    /// Number of elements.
    pub fn array_len<T>(&self, array: &ArrayProperty<T>) -> Result<usize> {
        let current = self.get_any(array)?;
        Ok(as_array(&current)?.len())
    }

    /// Read one element.
    ///
    /// Fails with [`PropertyError::InvalidArgument`] past the end.
    pub fn array_get<T: AnyType>(&self, array: &ArrayProperty<T>, index: usize) -> Result<T> {
        let current = self.get_any(array)?;
        let item = as_array(&current)?.get(index)?;
        item.get()
            .ok_or_else(|| PropertyError::incompatible(T::kind(), item.kind()))
    }

    /// Overwrite one element.
    pub fn array_set<T: AnyType>(
        &mut self,
        array: &ArrayProperty<T>,
        index: usize,
        value: T,
    ) -> Result<Outcome> {
        self.write_array_item(array.id(), index, value.into_any())
    }

    /// Insert an element at `index`, which may equal the length.
    pub fn array_insert<T: AnyType>(
        &mut self,
        array: &ArrayProperty<T>,
        index: usize,
        value: T,
    ) -> Result<Outcome> {
        self.edit_array(array.id(), |items| items.insert(index, value.into_any()))
            .map(|(_, outcome)| outcome)
    }

    /// Append an element.
    pub fn array_push<T: AnyType>(&mut self, array: &ArrayProperty<T>, value: T) -> Result<Outcome> {
        self.edit_array(array.id(), |items| items.push(value.into_any()))
            .map(|(_, outcome)| outcome)
    }

    /// Remove and return the element at `index`.
    pub fn array_remove<T: AnyType>(&mut self, array: &ArrayProperty<T>, index: usize) -> Result<T> {
        let (removed, _) = self.edit_array(array.id(), |items| items.remove(index))?;
        removed
            .get()
            .ok_or_else(|| PropertyError::incompatible(T::kind(), removed.kind()))
    }

    pub(crate) fn write_array_item(
        &mut self,
        array: PropertyId,
        index: usize,
        value: AnyValue,
    ) -> Result<Outcome> {
        self.edit_array(array, |items| items.set(index, &value))
            .map(|(_, outcome)| outcome)
    }

    /// Apply `edit` to a copy of the array and write the copy back.
    fn edit_array<R>(
        &mut self,
        array: PropertyId,
        edit: impl FnOnce(&mut ArrayValue) -> Result<R>,
    ) -> Result<(R, Outcome)> {
        let AnyValue::Array(mut items) = self.get_any(array)? else {
            let kind = self.meta(array)?.kind;
            return Err(PropertyError::incompatible("array", kind));
        };
        let result = edit(&mut items)?;
        tracing::trace!(target: "meta_property::array", ?array, len = items.len(), "array edited");
        let outcome = self.set_any(array, AnyValue::Array(items))?;
        Ok((result, outcome))
    }
}

fn as_array(value: &AnyValue) -> Result<&ArrayValue> {
    value
        .as_array()
        .ok_or_else(|| PropertyError::incompatible("array", value.kind()))
}

/// Delivers the [`ArrayChanges`] of every change to an array property.
///
/// The graph owns the subscription, not the handler. Dropping the handler
/// leaves the callback registered for as long as the array lives, so call
/// [`unsubscribe`](Self::unsubscribe) with the graph it was subscribed on.
#[must_use = "dropping the handler does not unsubscribe; keep it and call `unsubscribe`"]
pub struct ArrayChangedHandler<T> {
    subscription: Option<(PropertyId, HandlerId)>,
    _marker: PhantomData<fn(T)>,
}

impl<T: AnyType> ArrayChangedHandler<T> {
    /// Start delivering changes of `array` to `callback`.
    ///
    /// Writes that leave the array equal are not reported.
    pub fn subscribe<F>(graph: &mut PropertyGraph, array: &ArrayProperty<T>, callback: F) -> Result<Self>
    where
        F: Fn(&ArrayChanges<T>) + Send + Sync + 'static,
    {
        Self::subscribe_with(graph, array, diff::<T>, callback)
    }

    fn subscribe_with<F>(
        graph: &mut PropertyGraph,
        array: &ArrayProperty<T>,
        differ: fn(&[T], &[T]) -> ArrayChanges<T>,
        callback: F,
    ) -> Result<Self>
    where
        F: Fn(&ArrayChanges<T>) + Send + Sync + 'static,
    {
        let handler = graph.on_changed(array, move |_, event| {
            let (Some(old), Some(new)) = (event.previous_as::<Vec<T>>(), event.value_as::<Vec<T>>())
            else {
                return;
            };
            let changes = differ(&old, &new);
            if !changes.is_empty() {
                callback(&changes);
            }
        })?;
        Ok(Self {
            subscription: Some((array.id(), handler)),
            _marker: PhantomData,
        })
    }

}

impl<T: AnyType + Hash + Eq> ArrayChangedHandler<T> {
    /// Like [`subscribe`](Self::subscribe), diffing with [`diff_hashed`]
    /// so large arrays are matched in linear time.
    pub fn subscribe_hashed<F>(
        graph: &mut PropertyGraph,
        array: &ArrayProperty<T>,
        callback: F,
    ) -> Result<Self>
    where
        F: Fn(&ArrayChanges<T>) + Send + Sync + 'static,
    {
        Self::subscribe_with(graph, array, diff_hashed::<T>, callback)
    }
}

impl<T> ArrayChangedHandler<T> {
    /// Stop delivering changes. Returns `false` if already unsubscribed or
    /// the array is gone.
    pub fn unsubscribe(&mut self, graph: &mut PropertyGraph) -> bool {
        match self.subscription.take() {
            Some((array, handler)) => graph.remove_handler(array, handler).unwrap_or(false),
            None => false,
        }
    }

    /// Whether changes are still being delivered.
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }
}

impl<T> fmt::Debug for ArrayChangedHandler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayChangedHandler")
            .field("subscription", &self.subscription)
            .finish()
    }
}
