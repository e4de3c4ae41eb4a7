//! The property graph.
//!
//! [`PropertyGraph`] is an arena owning every property, its value stack, its
//! modifier chain and its change handlers. User code holds typed
//! [`Property`] handles; binds and dependency edges are plain
//! [`PropertyId`] back-references, so there are no reference cycles to
//! collect.
//!
//! # Evaluation
//!
//! A property's value is resolved by walking its stack from the top down and
//! running the result through its modifiers. The result is cached. A
//! mutation re-evaluates the mutated property and, if the cached value
//! changed, marks every transitive dependent dirty and refreshes them in
//! topological order. Every dependent is evaluated exactly once per mutation
//! and only after all of its sources, so diamonds do not glitch and long
//! chains never nest evaluations.
//!
//! A mutation is a transaction. If any property of the batch fails to
//! evaluate, every stack and cached value the batch touched is put back and
//! the error is returned to the caller.
//!
//! Change handlers run after the whole batch has settled, in the order the
//! properties finished evaluating.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use slotmap::SlotMap;

use crate::any::{AnyType, AnyValue, CompatibilityDirection, ValueKind};
use crate::config::GraphConfig;
use crate::error::{Outcome, PropertyError, Result};
use crate::event::{HandlerId, HandlerList, PropertyChanged, ScopedDisableEventHandler};
use crate::modifier::{Modifier, ModifierId, ModifierResult};
use crate::property::{Property, PropertyFlags, PropertyId, PropertyMeta};
use crate::stack::{BindMode, EvalContext, LambdaBind, ValueSource};

/// Storage for a single property.
pub(crate) struct PropertyData {
    pub(crate) name: String,
    pub(crate) kind: ValueKind,
    pub(crate) flags: PropertyFlags,
    pub(crate) default: AnyValue,
    /// Bottom first.
    pub(crate) values: Vec<ValueSource>,
    pub(crate) modifiers: Vec<ModifierId>,
    /// What the value stack produced, before modifiers.
    pub(crate) resolved: AnyValue,
    /// What readers see.
    pub(crate) current: AnyValue,
    pub(crate) handlers: HandlerList,
    /// Properties this one reads.
    pub(crate) dependencies: Vec<PropertyId>,
    /// Properties reading this one.
    pub(crate) dependents: Vec<PropertyId>,
}

impl PropertyData {
    fn new(name: String, default: AnyValue, flags: PropertyFlags) -> Self {
        Self {
            name,
            kind: default.kind(),
            flags,
            resolved: default.clone(),
            current: default.clone(),
            default,
            values: Vec::new(),
            modifiers: Vec::new(),
            handlers: HandlerList::default(),
            dependencies: Vec::new(),
            dependents: Vec::new(),
        }
    }
}

/// Stack and cache state of one property, put back when a batch fails.
struct Saved {
    id: PropertyId,
    values: Vec<ValueSource>,
    default: AnyValue,
    modifiers: Vec<ModifierId>,
    resolved: AnyValue,
    current: AnyValue,
}

/// The serializable part of a property's state: its top direct value and its
/// bind target.
///
/// Lambdas are closures and are not captured.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySnapshot {
    /// The topmost direct value, if any.
    pub value: Option<AnyValue>,
    /// The topmost bind, if any.
    pub bind: Option<SnapshotBind>,
}

/// A bind target recorded in a [`PropertySnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotBind {
    /// Follows another property.
    Property { source: PropertyId, mode: BindMode },
    /// Follows one element of an array property.
    ArrayItem { array: PropertyId, index: usize },
}

/// An arena of reactive properties.
///
/// # Example
///
/// ```
/// use meta_property::PropertyGraph;
///
/// let mut graph = PropertyGraph::new();
/// let source = graph.construct_property("source", 1_i32);
/// let target = graph.construct_property("target", 0_i32);
///
/// graph.set_bind(&target, &source).unwrap();
/// graph.set_value(&source, 5).unwrap();
/// assert_eq!(graph.get_value(&target).unwrap(), 5);
///
/// // Writing a one-way bound property breaks the bind.
/// graph.set_value(&target, 9).unwrap();
/// graph.set_value(&source, 6).unwrap();
/// assert_eq!(graph.get_value(&target).unwrap(), 9);
/// ```
pub struct PropertyGraph {
    properties: SlotMap<PropertyId, PropertyData>,
    modifiers: SlotMap<ModifierId, Arc<dyn Modifier>>,
    config: GraphConfig,
    /// Dependents of the current mutation that have not been refreshed yet.
    dirty: HashSet<PropertyId>,
    /// Properties whose stacks are being walked, innermost last.
    evaluating: Vec<PropertyId>,
    /// Properties whose handlers are running, innermost last.
    notifying: Vec<PropertyId>,
    /// Changed properties of the current batch with their previous values.
    pending: Vec<(PropertyId, AnyValue)>,
    /// First evaluation failure of the current batch.
    failure: Option<PropertyError>,
}

static_assertions::assert_impl_all!(PropertyGraph: Send, Sync);

impl PropertyGraph {
    /// Create an empty graph with the default configuration.
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    /// Create an empty graph with the given configuration.
    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            properties: SlotMap::with_capacity_and_key(config.initial_capacity),
            modifiers: SlotMap::with_key(),
            config,
            dirty: HashSet::new(),
            evaluating: Vec::new(),
            notifying: Vec::new(),
            pending: Vec::new(),
            failure: None,
        }
    }

    /// The configuration this graph was built with.
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Number of live properties.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether the graph holds no properties.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Whether the property is still in the graph.
    pub fn contains(&self, property: impl Into<PropertyId>) -> bool {
        self.properties.contains_key(property.into())
    }

    /// Ids of all live properties.
    pub fn property_ids(&self) -> impl Iterator<Item = PropertyId> + '_ {
        self.properties.keys()
    }

    pub(crate) fn data(&self, id: PropertyId) -> Result<&PropertyData> {
        self.properties.get(id).ok_or(PropertyError::Expired)
    }

    fn data_mut(&mut self, id: PropertyId) -> Result<&mut PropertyData> {
        self.properties.get_mut(id).ok_or(PropertyError::Expired)
    }

    /// Fails if the property is gone or its own handlers are running.
    fn check_mutable(&self, id: PropertyId) -> Result<&PropertyData> {
        let data = self.data(id)?;
        if self.notifying.contains(&id) {
            tracing::warn!(
                target: "meta_property::graph",
                property = %data.name,
                "mutation from inside own change handler refused"
            );
            return Err(PropertyError::recursive(data.name.clone()));
        }
        Ok(data)
    }

    // =========================================================================
    // Construction and lookup
    // =========================================================================

    /// Add a property holding `default` until something is written to it.
    pub fn construct_property<T: AnyType>(
        &mut self,
        name: impl Into<String>,
        default: T,
    ) -> Property<T> {
        self.construct_property_with_flags(name, default, PropertyFlags::NONE)
    }

    /// Add a property with construction flags.
    pub fn construct_property_with_flags<T: AnyType>(
        &mut self,
        name: impl Into<String>,
        default: T,
        flags: PropertyFlags,
    ) -> Property<T> {
        let name = name.into();
        let id = self
            .properties
            .insert(PropertyData::new(name, default.into_any(), flags));
        tracing::trace!(target: "meta_property::graph", ?id, "constructed property");
        Property::from_id(id)
    }

    /// Look up a property by name.
    ///
    /// Names are not required to be unique; if several properties share one,
    /// any of them may be returned.
    pub fn find_property_id(&self, name: &str) -> Option<PropertyId> {
        self.properties
            .iter()
            .find(|(_, data)| data.name == name)
            .map(|(id, _)| id)
    }

    /// Look up a property by name and type.
    pub fn find_property<T: AnyType>(&self, name: &str) -> Result<Property<T>> {
        let id = self
            .find_property_id(name)
            .ok_or_else(|| PropertyError::NotFound {
                name: name.to_string(),
            })?;
        let kind = &self.data(id)?.kind;
        if !kind.is_compatible(&T::kind(), CompatibilityDirection::Get) {
            return Err(PropertyError::incompatible(T::kind(), kind));
        }
        Ok(Property::from_id(id))
    }

    /// Runtime metadata of a property.
    pub fn meta(&self, property: impl Into<PropertyId>) -> Result<PropertyMeta> {
        let data = self.data(property.into())?;
        Ok(PropertyMeta {
            name: data.name.clone(),
            kind: data.kind.clone(),
            flags: data.flags,
            stack_depth: data.values.len(),
            modifier_count: data.modifiers.len(),
            handler_count: data.handlers.len(),
        })
    }

    /// Remove a property from the graph.
    ///
    /// Every handle to it expires. Properties bound to it fall through to the
    /// next entry of their stacks and are notified if that changes their value.
    pub fn remove_property(&mut self, property: impl Into<PropertyId>) -> Result<()> {
        let id = property.into();
        self.check_mutable(id)?;
        let order = self.transitive_dependents(id);
        let Some(data) = self.properties.remove(id) else {
            return Err(PropertyError::Expired);
        };
        for modifier in &data.modifiers {
            self.modifiers.remove(*modifier);
        }
        for source in &data.dependencies {
            if let Some(source) = self.properties.get_mut(*source) {
                source.dependents.retain(|dependent| *dependent != id);
            }
        }
        tracing::debug!(target: "meta_property::graph", property = %data.name, dependents = order.len(), "removed property");
        let order = self.topological_order(order);
        let mark = self.pending.len();
        if let Some(err) = self.propagate(&order) {
            tracing::warn!(target: "meta_property::graph", %err, "dependent of removed property kept its previous value");
        }
        let batch = self.pending.split_off(mark);
        self.notify(batch);
        Ok(())
    }

    // =========================================================================
    // Values
    // =========================================================================

    /// Read a property.
    pub fn get_value<T: AnyType>(&self, property: &Property<T>) -> Result<T> {
        let current = &self.data(property.id())?.current;
        current
            .get()
            .ok_or_else(|| PropertyError::incompatible(T::kind(), current.kind()))
    }

    /// Read a property's type-erased value.
    pub fn get_any(&self, property: impl Into<PropertyId>) -> Result<AnyValue> {
        Ok(self.data(property.into())?.current.clone())
    }

    /// Write a property.
    ///
    /// Set modifiers run first and may veto the write, in which case nothing
    /// changes. The value then goes into the topmost writable stack entry:
    ///
    /// - a two-way bind or an array item bind forwards it to its source,
    /// - a direct value is overwritten,
    /// - a one-way bind or a lambda is removed and replaced by a direct value,
    /// - an empty stack gets a direct value.
    ///
    /// Returns [`Outcome::NothingToDo`] if the resolved value did not change,
    /// in which case no handler runs.
    pub fn set_value<T: AnyType>(&mut self, property: &Property<T>, value: T) -> Result<Outcome> {
        self.set_any(property.id(), value.into_any())
    }

    /// Write a type-erased value. See [`set_value`](Self::set_value).
    #[tracing::instrument(skip_all, target = "meta_property::graph", level = "trace")]
    pub fn set_any(&mut self, property: impl Into<PropertyId>, value: AnyValue) -> Result<Outcome> {
        let id = property.into();
        let data = self.check_mutable(id)?;
        if data.flags.contains(PropertyFlags::READ_ONLY) {
            return Err(PropertyError::ReadOnly {
                name: data.name.clone(),
            });
        }
        let kind = data.kind.clone();
        let name = data.name.clone();
        let current = data.current.clone();

        let mut value = value.convert_into(&kind)?;
        for modifier in self.modifier_chain(id) {
            if modifier.process_on_set(&mut value, &current) == ModifierResult::Rejected {
                tracing::debug!(
                    target: "meta_property::graph",
                    property = %name,
                    modifier = modifier.name(),
                    "write rejected"
                );
                return Err(PropertyError::rejected(name));
            }
        }
        let value = value.convert_into(&kind)?;

        let top = self.data(id)?.values.last().cloned();
        match top {
            Some(ValueSource::Bind {
                source,
                mode: BindMode::TwoWay,
            }) if self.properties.contains_key(source) => {
                tracing::trace!(target: "meta_property::graph", property = %name, "forwarding write to bind source");
                return self.set_any(source, value);
            }
            Some(ValueSource::ArrayItem { array, index }) if self.properties.contains_key(array) => {
                tracing::trace!(target: "meta_property::graph", property = %name, index, "forwarding write to array");
                return self.write_array_item(array, index, value);
            }
            _ => {}
        }

        let saved = self.save(id)?;
        let data = self.data_mut(id)?;
        if data.values.last().is_some_and(ValueSource::is_bind) {
            data.values.pop();
            tracing::debug!(target: "meta_property::graph", property = %name, "write broke bind");
        }
        match data.values.last_mut() {
            Some(ValueSource::Direct(slot)) => *slot = value,
            _ => data.values.push(ValueSource::Direct(value)),
        }
        self.commit(id, saved)
    }

    /// The property's default value.
    pub fn default_value<T: AnyType>(&self, property: &Property<T>) -> Result<T> {
        let default = &self.data(property.id())?.default;
        default
            .get()
            .ok_or_else(|| PropertyError::incompatible(T::kind(), default.kind()))
    }

    /// Replace the property's default value.
    pub fn set_default_value<T: AnyType>(
        &mut self,
        property: &Property<T>,
        value: T,
    ) -> Result<Outcome> {
        let id = property.id();
        let kind = self.check_mutable(id)?.kind.clone();
        let value = value.into_any().convert_into(&kind)?;
        if self.data(id)?.default == value {
            return Ok(Outcome::NothingToDo);
        }
        let saved = self.save(id)?;
        self.data_mut(id)?.default = value;
        self.commit(id, saved)
    }

    /// Whether the stack is empty and the property reads as its default.
    pub fn is_default_value(&self, property: impl Into<PropertyId>) -> Result<bool> {
        let data = self.data(property.into())?;
        Ok(data.values.is_empty() && data.current == data.default)
    }

    // =========================================================================
    // Binds
    // =========================================================================

    /// Make `target` follow `source`.
    ///
    /// Any existing bind on `target` is replaced, so repeated calls never
    /// stack binds. Fails with [`PropertyError::RecursiveCall`] if `source`
    /// depends on `target`, and with [`PropertyError::IncompatibleTypes`] if
    /// `source` cannot be read as `target`'s kind.
    pub fn set_bind<T, S>(&mut self, target: &Property<T>, source: &Property<S>) -> Result<Outcome> {
        self.install_bind(
            target.id(),
            ValueSource::Bind {
                source: source.id(),
                mode: BindMode::OneWay,
            },
        )
    }

    /// Bind `target` to `source` so that writes to `target` go to `source`.
    pub fn set_bind_two_way<T>(
        &mut self,
        target: &Property<T>,
        source: &Property<T>,
    ) -> Result<Outcome> {
        self.install_bind(
            target.id(),
            ValueSource::Bind {
                source: source.id(),
                mode: BindMode::TwoWay,
            },
        )
    }

    /// Make `target` a computed property.
    ///
    /// The lambda runs once here, which also teaches an auto-discovering
    /// lambda what it reads. It fails with [`PropertyError::RecursiveCall`]
    /// if those reads depend on `target`.
    pub fn set_bind_lambda<T>(&mut self, target: &Property<T>, lambda: LambdaBind) -> Result<Outcome> {
        self.install_bind(target.id(), ValueSource::Lambda(lambda))
    }

    /// Bind `target` to one element of an array property.
    ///
    /// Writes to `target` are written into the array.
    pub fn bind_array_item<T, U>(
        &mut self,
        target: &Property<T>,
        array: &Property<Vec<U>>,
        index: usize,
    ) -> Result<Outcome> {
        self.install_bind(
            target.id(),
            ValueSource::ArrayItem {
                array: array.id(),
                index,
            },
        )
    }

    /// Remove every bind from the stack, keeping direct values.
    pub fn reset_bind(&mut self, property: impl Into<PropertyId>) -> Result<Outcome> {
        let id = property.into();
        self.check_mutable(id)?;
        if !self.data(id)?.values.iter().any(ValueSource::is_bind) {
            return Ok(Outcome::NothingToDo);
        }
        let saved = self.save(id)?;
        self.data_mut(id)?.values.retain(|entry| !entry.is_bind());
        self.commit(id, saved)
    }

    fn install_bind(&mut self, id: PropertyId, mut entry: ValueSource) -> Result<Outcome> {
        self.check_mutable(id)?;
        self.prepare_entry(id, &mut entry)?;
        let saved = self.save(id)?;
        let data = self.data_mut(id)?;
        data.values.retain(|existing| !existing.is_bind());
        data.values.push(entry);
        tracing::debug!(target: "meta_property::graph", property = %data.name, "installed bind");
        self.commit(id, saved)
    }

    // =========================================================================
    // Value stack
    // =========================================================================

    /// Push an entry onto the stack.
    pub fn push_value(
        &mut self,
        property: impl Into<PropertyId>,
        mut entry: ValueSource,
    ) -> Result<Outcome> {
        let id = property.into();
        self.check_mutable(id)?;
        self.prepare_entry(id, &mut entry)?;
        let saved = self.save(id)?;
        self.data_mut(id)?.values.push(entry);
        self.commit(id, saved)
    }

    /// Pop the topmost entry off the stack.
    pub fn pop_value(&mut self, property: impl Into<PropertyId>) -> Result<Option<ValueSource>> {
        let id = property.into();
        self.check_mutable(id)?;
        let saved = self.save(id)?;
        let popped = self.data_mut(id)?.values.pop();
        if popped.is_some() {
            self.commit(id, saved)?;
        }
        Ok(popped)
    }

    /// Remove the entry at `index`, counted from the bottom of the stack.
    pub fn remove_value(
        &mut self,
        property: impl Into<PropertyId>,
        index: usize,
    ) -> Result<ValueSource> {
        let id = property.into();
        let depth = self.check_mutable(id)?.values.len();
        if index >= depth {
            return Err(PropertyError::invalid_argument(format!(
                "index {index} out of range for stack depth {depth}"
            )));
        }
        let saved = self.save(id)?;
        let removed = self.data_mut(id)?.values.remove(index);
        self.commit(id, saved)?;
        Ok(removed)
    }

    /// The stack entries, top first if `top_first` is set.
    pub fn values(&self, property: impl Into<PropertyId>, top_first: bool) -> Result<Vec<ValueSource>> {
        let mut values = self.data(property.into())?.values.clone();
        if top_first {
            values.reverse();
        }
        Ok(values)
    }

    /// The topmost stack entry.
    pub fn top_value(&self, property: impl Into<PropertyId>) -> Result<Option<ValueSource>> {
        Ok(self.data(property.into())?.values.last().cloned())
    }

    /// Replace the stack with a single direct entry holding what it resolves
    /// to now.
    ///
    /// Binds are dropped, so the property stops following its sources.
    pub fn evaluate_and_store(&mut self, property: impl Into<PropertyId>) -> Result<Outcome> {
        let id = property.into();
        self.check_mutable(id)?;
        let saved = self.save(id)?;
        let data = self.data_mut(id)?;
        data.values = vec![ValueSource::Direct(data.resolved.clone())];
        self.commit(id, saved)
    }

    /// Clear the stack, reverting to the default value.
    ///
    /// Reset modifiers may veto. Modifiers stay attached.
    pub fn reset_value(&mut self, property: impl Into<PropertyId>) -> Result<Outcome> {
        let id = property.into();
        self.check_reset(id)?;
        let saved = self.save(id)?;
        self.data_mut(id)?.values.clear();
        self.commit(id, saved)
    }

    /// Clear the stack and detach every modifier.
    pub fn reset(&mut self, property: impl Into<PropertyId>) -> Result<Outcome> {
        let id = property.into();
        self.check_reset(id)?;
        let saved = self.save(id)?;
        let data = self.data_mut(id)?;
        data.values.clear();
        let detached = std::mem::take(&mut data.modifiers);
        let outcome = self.commit(id, saved)?;
        for modifier in detached {
            self.modifiers.remove(modifier);
        }
        Ok(outcome)
    }

    fn check_reset(&self, id: PropertyId) -> Result<()> {
        let data = self.check_mutable(id)?;
        for modifier in self.modifier_chain(id) {
            if modifier.process_on_reset(&data.current) == ModifierResult::Rejected {
                tracing::debug!(
                    target: "meta_property::graph",
                    property = %data.name,
                    modifier = modifier.name(),
                    "reset rejected"
                );
                return Err(PropertyError::rejected(data.name.clone()));
            }
        }
        Ok(())
    }

    /// Capture the property's top direct value and bind.
    pub fn snapshot(&self, property: impl Into<PropertyId>) -> Result<PropertySnapshot> {
        let data = self.data(property.into())?;
        let value = data.values.iter().rev().find_map(|entry| match entry {
            ValueSource::Direct(value) => Some(value.clone()),
            _ => None,
        });
        let bind = data.values.iter().rev().find_map(|entry| match entry {
            ValueSource::Bind { source, mode } => Some(SnapshotBind::Property {
                source: *source,
                mode: *mode,
            }),
            ValueSource::ArrayItem { array, index } => Some(SnapshotBind::ArrayItem {
                array: *array,
                index: *index,
            }),
            _ => None,
        });
        Ok(PropertySnapshot { value, bind })
    }

    /// Rebuild the stack from a snapshot: the value at the bottom, the bind
    /// above it.
    ///
    /// The bind is checked like [`set_bind`](Self::set_bind); on failure the
    /// property is left untouched.
    pub fn restore(
        &mut self,
        property: impl Into<PropertyId>,
        snapshot: &PropertySnapshot,
    ) -> Result<Outcome> {
        let id = property.into();
        let kind = self.check_mutable(id)?.kind.clone();
        let mut values = Vec::new();
        if let Some(value) = &snapshot.value {
            values.push(ValueSource::Direct(value.clone().convert_into(&kind)?));
        }
        if let Some(bind) = snapshot.bind {
            let mut entry = match bind {
                SnapshotBind::Property { source, mode } => ValueSource::Bind { source, mode },
                SnapshotBind::ArrayItem { array, index } => ValueSource::ArrayItem { array, index },
            };
            self.prepare_entry(id, &mut entry)?;
            values.push(entry);
        }
        let saved = self.save(id)?;
        self.data_mut(id)?.values = values;
        self.commit(id, saved)
    }

    /// Check an entry before it goes onto `id`'s stack.
    ///
    /// An auto-discovering lambda has not run yet, so its reads are checked
    /// for cycles by the evaluation that follows.
    fn prepare_entry(&mut self, id: PropertyId, entry: &mut ValueSource) -> Result<()> {
        let data = self.data(id)?;
        let kind = data.kind.clone();
        let name = data.name.clone();
        match entry {
            ValueSource::Direct(value) => {
                if !kind.is_compatible(&value.kind(), CompatibilityDirection::Set) {
                    return Err(PropertyError::incompatible(&kind, value.kind()));
                }
            }
            ValueSource::Bind { source, mode } => {
                let source_kind = &self.data(*source)?.kind;
                let direction = match mode {
                    BindMode::OneWay => CompatibilityDirection::Get,
                    BindMode::TwoWay => CompatibilityDirection::Both,
                };
                if !source_kind.is_compatible(&kind, direction) {
                    return Err(PropertyError::incompatible(&kind, source_kind));
                }
            }
            ValueSource::ArrayItem { array, .. } => {
                let array_kind = &self.data(*array)?.kind;
                match array_kind.item_kind() {
                    Some(item) if item.is_compatible(&kind, CompatibilityDirection::Both) => {}
                    _ => {
                        return Err(PropertyError::incompatible(
                            ValueKind::array_of(kind),
                            array_kind,
                        ));
                    }
                }
            }
            ValueSource::Lambda(lambda) => {
                for dependency in lambda.dependencies() {
                    self.data(*dependency)?;
                }
            }
        }
        if self.would_cycle(id, &entry.sources()) {
            tracing::warn!(target: "meta_property::graph", property = %name, "rejected cyclic bind");
            return Err(PropertyError::recursive(name));
        }
        Ok(())
    }

    /// Whether `target` is reachable from any of `sources`.
    fn would_cycle(&self, target: PropertyId, sources: &[PropertyId]) -> bool {
        let mut stack = sources.to_vec();
        let mut visited = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            if let Some(data) = self.properties.get(id) {
                stack.extend(data.dependencies.iter().copied());
            }
        }
        false
    }

    // =========================================================================
    // Modifiers
    // =========================================================================

    /// Append a modifier to the property's chain.
    ///
    /// Fails with [`PropertyError::IncompatibleTypes`] if the modifier does
    /// not accept the property's kind.
    pub fn add_modifier<M>(&mut self, property: impl Into<PropertyId>, modifier: M) -> Result<ModifierId>
    where
        M: Modifier + 'static,
    {
        let id = property.into();
        let kind = &self.check_mutable(id)?.kind;
        if !modifier.is_compatible(kind) {
            return Err(PropertyError::incompatible(modifier.name(), kind));
        }
        let saved = self.save(id)?;
        let modifier_id = self.modifiers.insert(Arc::new(modifier));
        self.data_mut(id)?.modifiers.push(modifier_id);
        if let Err(err) = self.commit(id, saved) {
            self.modifiers.remove(modifier_id);
            return Err(err);
        }
        Ok(modifier_id)
    }

    /// Detach a modifier. Returns `false` if it was not attached to this property.
    pub fn remove_modifier(&mut self, property: impl Into<PropertyId>, modifier: ModifierId) -> Result<bool> {
        let id = property.into();
        let Some(position) = self.check_mutable(id)?.modifiers.iter().position(|m| *m == modifier) else {
            return Ok(false);
        };
        let saved = self.save(id)?;
        self.data_mut(id)?.modifiers.remove(position);
        self.commit(id, saved)?;
        self.modifiers.remove(modifier);
        Ok(true)
    }

    /// The property's modifiers, in chain order.
    pub fn modifiers(&self, property: impl Into<PropertyId>) -> Result<Vec<ModifierId>> {
        Ok(self.data(property.into())?.modifiers.clone())
    }

    pub(crate) fn modifier_chain(&self, id: PropertyId) -> Vec<Arc<dyn Modifier>> {
        self.properties
            .get(id)
            .map(|data| {
                data.modifiers
                    .iter()
                    .filter_map(|m| self.modifiers.get(*m).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    // =========================================================================
    // Handlers
    // =========================================================================

    /// Register a change handler.
    ///
    /// Handlers run synchronously after every mutation that changes the
    /// property's value, in registration order.
    pub fn on_changed<T, F>(&mut self, property: &Property<T>, handler: F) -> Result<HandlerId>
    where
        F: Fn(&mut PropertyGraph, &PropertyChanged) + Send + Sync + 'static,
    {
        self.add_handler(property.id(), Arc::new(handler))
    }

    pub(crate) fn add_handler(
        &mut self,
        id: PropertyId,
        handler: crate::event::HandlerFn,
    ) -> Result<HandlerId> {
        Ok(self.data_mut(id)?.handlers.add(handler))
    }

    /// Unregister a change handler. Returns `false` if it was not registered.
    pub fn remove_handler(&mut self, property: impl Into<PropertyId>, handler: HandlerId) -> Result<bool> {
        Ok(self.data_mut(property.into())?.handlers.remove(handler))
    }

    /// Mute a handler until the returned guard is dropped.
    pub fn disable_handler(
        &self,
        property: impl Into<PropertyId>,
        handler: HandlerId,
    ) -> Result<ScopedDisableEventHandler> {
        let flag = self
            .data(property.into())?
            .handlers
            .enabled_flag(handler)
            .ok_or_else(|| PropertyError::invalid_argument("unknown handler"))?;
        Ok(ScopedDisableEventHandler::new(flag))
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    /// Read a property from inside another property's evaluation.
    pub(crate) fn read_source(&mut self, id: PropertyId) -> Option<AnyValue> {
        if !self.properties.contains_key(id) {
            return None;
        }
        if self.evaluating.contains(&id) {
            tracing::warn!(
                target: "meta_property::graph",
                ?id,
                "property read during its own evaluation, using cached value"
            );
        } else if self.dirty.contains(&id) {
            self.refresh(id);
        }
        self.properties.get(id).map(|data| data.current.clone())
    }

    /// Resolve the stack and modifiers and cache the result.
    ///
    /// Returns the previous value if the result changed. Fails without
    /// touching the property if a lambda read something that depends on it.
    fn evaluate(&mut self, id: PropertyId) -> Result<Option<AnyValue>> {
        let data = self.data(id)?;
        if self.evaluating.len() >= self.config.max_evaluation_depth {
            tracing::warn!(
                target: "meta_property::graph",
                property = %data.name,
                depth = self.evaluating.len(),
                "evaluation depth exceeded"
            );
            return Err(PropertyError::recursive(data.name.clone()));
        }
        let kind = data.kind.clone();
        let stack = data.values.clone();
        let default = data.default.clone();

        self.evaluating.push(id);
        let mut resolved = None;
        let mut discovered = Vec::new();
        for (position, entry) in stack.iter().enumerate().rev() {
            let candidate = match entry {
                ValueSource::Direct(value) => Some(value.clone()),
                ValueSource::Bind { source, .. } => self.read_source(*source),
                ValueSource::ArrayItem { array, index } => self
                    .read_source(*array)
                    .and_then(|value| value.as_array()?.get(*index).ok().cloned()),
                ValueSource::Lambda(lambda) => {
                    let compute = lambda.compute.clone();
                    let mut ctx = EvalContext::new(self);
                    let value = compute(&mut ctx);
                    discovered.push((position, ctx.into_reads()));
                    value
                }
            };
            let Some(candidate) = candidate else {
                continue;
            };
            match candidate.convert_into(&kind) {
                Ok(value) => {
                    resolved = Some(value);
                    break;
                }
                Err(err) => {
                    tracing::warn!(target: "meta_property::graph", ?id, %err, "skipping stack entry");
                }
            }
        }
        self.evaluating.pop();

        let resolved = resolved.unwrap_or(default);
        let mut current = resolved.clone();
        for modifier in self.modifier_chain(id) {
            if modifier.process_on_get(&mut current) == ModifierResult::ValueChanged
                && current.kind() != kind
            {
                tracing::warn!(
                    target: "meta_property::graph",
                    ?id,
                    modifier = modifier.name(),
                    "modifier changed value kind, ignoring"
                );
                current = resolved.clone();
            }
        }

        // Edges already installed are acyclic, so only reads that are new
        // can close a cycle.
        let data = self.data(id)?;
        let mut new_reads = Vec::new();
        for (position, reads) in &discovered {
            if let Some(ValueSource::Lambda(lambda)) = data.values.get(*position) {
                if !lambda.has_explicit_dependencies() {
                    let known = lambda.dependencies();
                    new_reads.extend(reads.iter().copied().filter(|read| !known.contains(read)));
                }
            }
        }
        if self.would_cycle(id, &new_reads) {
            tracing::warn!(target: "meta_property::graph", property = %data.name, "lambda read closes a cycle");
            return Err(PropertyError::recursive(data.name.clone()));
        }

        let data = self.data_mut(id)?;
        for (position, reads) in discovered {
            if let Some(ValueSource::Lambda(lambda)) = data.values.get_mut(position) {
                lambda.set_discovered(reads);
            }
        }
        data.resolved = resolved;
        let previous = std::mem::replace(&mut data.current, current);
        let changed = previous != data.current;
        tracing::trace!(target: "meta_property::graph", property = %data.name, changed, "evaluated");
        self.rewire(id);
        Ok(changed.then_some(previous))
    }

    /// Recompute `id`'s dependency edges from its stack.
    fn rewire(&mut self, id: PropertyId) {
        let Some(data) = self.properties.get(id) else {
            return;
        };
        let mut dependencies: Vec<PropertyId> = Vec::new();
        for source in data.values.iter().flat_map(ValueSource::sources) {
            if source != id && self.properties.contains_key(source) && !dependencies.contains(&source)
            {
                dependencies.push(source);
            }
        }
        let old = std::mem::replace(
            &mut self.properties[id].dependencies,
            dependencies.clone(),
        );
        for source in old.into_iter().filter(|s| !dependencies.contains(s)) {
            if let Some(source) = self.properties.get_mut(source) {
                source.dependents.retain(|dependent| *dependent != id);
            }
        }
        for source in dependencies {
            if let Some(source) = self.properties.get_mut(source) {
                if !source.dependents.contains(&id) {
                    source.dependents.push(id);
                }
            }
        }
    }

    fn refresh(&mut self, id: PropertyId) {
        if !self.dirty.remove(&id) {
            return;
        }
        match self.evaluate(id) {
            Ok(Some(previous)) => self.pending.push((id, previous)),
            Ok(None) | Err(PropertyError::Expired) => {}
            Err(err) => {
                tracing::warn!(target: "meta_property::graph", ?id, %err, "dependent failed to evaluate");
                self.failure.get_or_insert(err);
            }
        }
    }

    /// Every property that transitively reads `id`, breadth first.
    fn transitive_dependents(&self, id: PropertyId) -> Vec<PropertyId> {
        let mut order = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut queue = VecDeque::from([id]);
        while let Some(next) = queue.pop_front() {
            let Some(data) = self.properties.get(next) else {
                continue;
            };
            for dependent in &data.dependents {
                if seen.insert(*dependent) {
                    order.push(*dependent);
                    queue.push_back(*dependent);
                }
            }
        }
        order
    }

    /// Sort `ids` so that every property comes after those of its sources
    /// that are also in `ids`.
    fn topological_order(&self, ids: Vec<PropertyId>) -> Vec<PropertyId> {
        let members: HashSet<PropertyId> = ids.iter().copied().collect();
        let mut indegree: HashMap<PropertyId, usize> = ids
            .iter()
            .map(|id| {
                let count = self.properties.get(*id).map_or(0, |data| {
                    data.dependencies
                        .iter()
                        .filter(|source| members.contains(source))
                        .count()
                });
                (*id, count)
            })
            .collect();
        let mut ready: VecDeque<PropertyId> = ids
            .iter()
            .copied()
            .filter(|id| indegree.get(id) == Some(&0))
            .collect();
        let mut order = Vec::with_capacity(ids.len());
        while let Some(id) = ready.pop_front() {
            order.push(id);
            let Some(data) = self.properties.get(id) else {
                continue;
            };
            for dependent in &data.dependents {
                if let Some(count) = indegree.get_mut(dependent) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.push_back(*dependent);
                    }
                }
            }
        }
        if order.len() < ids.len() {
            // Only reachable with a cycle, which binds never install.
            let placed: HashSet<PropertyId> = order.iter().copied().collect();
            order.extend(ids.into_iter().filter(|id| !placed.contains(id)));
        }
        order
    }

    fn save(&self, id: PropertyId) -> Result<Saved> {
        let data = self.data(id)?;
        Ok(Saved {
            id,
            values: data.values.clone(),
            default: data.default.clone(),
            modifiers: data.modifiers.clone(),
            resolved: data.resolved.clone(),
            current: data.current.clone(),
        })
    }

    /// Put back every saved property and its dependency edges.
    fn roll_back(&mut self, journal: Vec<Saved>) {
        self.dirty.clear();
        let restored: Vec<PropertyId> = journal.iter().map(|saved| saved.id).collect();
        for saved in journal {
            if let Some(data) = self.properties.get_mut(saved.id) {
                data.values = saved.values;
                data.default = saved.default;
                data.modifiers = saved.modifiers;
                data.resolved = saved.resolved;
                data.current = saved.current;
            }
        }
        for id in &restored {
            self.rewire(*id);
        }
        tracing::debug!(target: "meta_property::graph", count = restored.len(), "rolled back failed mutation");
    }

    /// Re-evaluate `id` after a mutation and propagate the change.
    ///
    /// `saved` is `id`'s state before the mutation. If anything in the batch
    /// fails, the whole batch is rolled back and no handler runs.
    #[tracing::instrument(skip_all, target = "meta_property::graph", level = "trace")]
    fn commit(&mut self, id: PropertyId, saved: Saved) -> Result<Outcome> {
        let previous = match self.evaluate(id) {
            Ok(Some(previous)) => previous,
            Ok(None) => return Ok(Outcome::NothingToDo),
            Err(err) => {
                self.roll_back(vec![saved]);
                return Err(err);
            }
        };
        let mark = self.pending.len();
        self.pending.push((id, previous));
        let order = self.topological_order(self.transitive_dependents(id));
        let mut journal = Vec::with_capacity(order.len() + 1);
        journal.push(saved);
        journal.extend(order.iter().filter_map(|dependent| self.save(*dependent).ok()));
        if let Some(err) = self.propagate(&order) {
            self.pending.truncate(mark);
            self.roll_back(journal);
            return Err(err);
        }
        let batch = self.pending.split_off(mark);
        self.notify(batch);
        Ok(Outcome::Success)
    }

    /// Refresh `order`, which must be topologically sorted.
    ///
    /// Returns the first failure. Properties after it are still refreshed.
    fn propagate(&mut self, order: &[PropertyId]) -> Option<PropertyError> {
        self.dirty.extend(order.iter().copied());
        for id in order {
            self.refresh(*id);
        }
        self.dirty.clear();
        self.failure.take()
    }

    fn notify(&mut self, batch: Vec<(PropertyId, AnyValue)>) {
        for (id, previous) in batch {
            let Some(data) = self.properties.get(id) else {
                continue;
            };
            if self.notifying.contains(&id) {
                tracing::warn!(
                    target: "meta_property::event",
                    property = %data.name,
                    "change during own notification, handlers not re-entered"
                );
                continue;
            }
            let handlers = data.handlers.snapshot();
            if handlers.is_empty() {
                continue;
            }
            let event = PropertyChanged {
                property: id,
                value: data.current.clone(),
                previous,
            };
            tracing::trace!(target: "meta_property::event", property = %data.name, handler_count = handlers.len(), "notifying");
            self.notifying.push(id);
            for (enabled, handler) in handlers {
                if enabled.load(Ordering::SeqCst) {
                    handler(self, &event);
                }
            }
            self.notifying.pop();
        }
    }
}

impl Default for PropertyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PropertyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyGraph")
            .field("properties", &self.properties.len())
            .field("modifiers", &self.modifiers.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphBuilder;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_dependency_edges_follow_binds() {
        let mut graph = PropertyGraph::new();
        let a = graph.construct_property("a", 1_i32);
        let b = graph.construct_property("b", 0_i32);
        graph.set_bind(&b, &a).unwrap();

        assert_eq!(graph.data(b.id()).unwrap().dependencies, vec![a.id()]);
        assert_eq!(graph.data(a.id()).unwrap().dependents, vec![b.id()]);

        graph.reset_bind(&b).unwrap();
        assert!(graph.data(b.id()).unwrap().dependencies.is_empty());
        assert!(graph.data(a.id()).unwrap().dependents.is_empty());
    }

    #[test]
    fn test_diamond_evaluates_once() {
        let mut graph = PropertyGraph::new();
        let root = graph.construct_property("root", 1_i32);
        let left = graph.construct_property("left", 0_i32);
        let right = graph.construct_property("right", 0_i32);
        let sum = graph.construct_property("sum", 0_i32);
        graph.set_bind(&left, &root).unwrap();
        graph.set_bind(&right, &root).unwrap();

        let evaluations = Arc::new(AtomicUsize::new(0));
        let counter = evaluations.clone();
        graph
            .set_bind_lambda(
                &sum,
                LambdaBind::new(move |ctx| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    ctx.get(&left) + ctx.get(&right)
                }),
            )
            .unwrap();
        assert_eq!(graph.get_value(&sum).unwrap(), 2);

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        graph
            .on_changed(&sum, move |_, event| sink.lock().push(event.value_as::<i32>()))
            .unwrap();

        evaluations.store(0, Ordering::SeqCst);
        graph.set_value(&root, 5).unwrap();
        assert_eq!(evaluations.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock(), vec![Some(10)]);
    }

    #[test]
    fn test_would_cycle_is_transitive() {
        let mut graph = PropertyGraph::new();
        let a = graph.construct_property("a", 0_i32);
        let b = graph.construct_property("b", 0_i32);
        let c = graph.construct_property("c", 0_i32);
        graph.set_bind(&b, &a).unwrap();
        graph.set_bind(&c, &b).unwrap();

        assert!(graph.would_cycle(a.id(), &[c.id()]));
        assert!(graph.would_cycle(a.id(), &[a.id()]));
        assert!(!graph.would_cycle(c.id(), &[a.id()]));
    }

    #[test]
    fn test_evaluation_depth_limit() {
        let mut graph = GraphBuilder::new().max_evaluation_depth(2).build();
        let a = graph.construct_property("a", 0_i32);
        let b = graph.construct_property("b", 0_i32);
        let c = graph.construct_property("c", 0_i32);
        let d = graph.construct_property("d", 0_i32);
        graph.set_bind(&b, &a).unwrap();
        graph.set_bind(&c, &b).unwrap();
        graph.set_bind(&d, &c).unwrap();

        // The chain is refreshed one link at a time, so a write still reaches the end.
        graph.set_value(&a, 3).unwrap();
        assert_eq!(graph.get_value(&d).unwrap(), 3);
    }

    #[test]
    fn test_remove_property_releases_dependents() {
        let mut graph = PropertyGraph::new();
        let a = graph.construct_property("a", 7_i32);
        let b = graph.construct_property("b", 1_i32);
        graph.set_bind(&b, &a).unwrap();
        assert_eq!(graph.get_value(&b).unwrap(), 7);

        graph.remove_property(&a).unwrap();
        assert_eq!(graph.get_value(&b).unwrap(), 1);
        assert!(graph.data(b.id()).unwrap().dependencies.is_empty());
        assert_eq!(graph.get_value(&a), Err(PropertyError::Expired));
        assert_eq!(graph.remove_property(&a), Err(PropertyError::Expired));
    }

    #[test]
    fn test_snapshot_and_restore() {
        let mut graph = PropertyGraph::new();
        let source = graph.construct_property("source", 4_i32);
        let p = graph.construct_property("p", 0_i32);
        graph.set_value(&p, 2).unwrap();
        graph.set_bind(&p, &source).unwrap();
        let snapshot = graph.snapshot(&p).unwrap();
        assert_eq!(snapshot.value, Some(AnyValue::I32(2)));
        assert_eq!(
            snapshot.bind,
            Some(SnapshotBind::Property {
                source: source.id(),
                mode: BindMode::OneWay,
            })
        );

        graph.reset(&p).unwrap();
        assert_eq!(graph.get_value(&p).unwrap(), 0);

        graph.restore(&p, &snapshot).unwrap();
        assert_eq!(graph.get_value(&p).unwrap(), 4);
        graph.reset_bind(&p).unwrap();
        assert_eq!(graph.get_value(&p).unwrap(), 2);
    }

    #[test]
    fn test_topological_order_puts_sources_first() {
        let mut graph = PropertyGraph::new();
        let root = graph.construct_property("root", 0_i32);
        let chain: Vec<_> = (0..5)
            .map(|n| graph.construct_property(format!("c{n}"), 0_i32))
            .collect();
        graph.set_bind(&chain[0], &root).unwrap();
        for pair in chain.windows(2) {
            graph.set_bind(&pair[1], &pair[0]).unwrap();
        }
        let tail = chain[4];
        let sum = graph.construct_property("sum", 0_i32);
        graph
            .set_bind_lambda(&sum, LambdaBind::new(move |ctx| ctx.get(&root) + ctx.get(&tail)))
            .unwrap();

        let dependents = graph.transitive_dependents(root.id());
        // Breadth first, `sum` sits right after the first link.
        assert_eq!(dependents.iter().position(|id| *id == sum.id()), Some(1));

        let order = graph.topological_order(dependents);
        assert_eq!(order.len(), 6);
        assert_eq!(order.last(), Some(&sum.id()));
        for (n, link) in chain.iter().enumerate() {
            assert_eq!(order[n], link.id());
        }
    }

    #[test]
    fn test_lambda_read_closing_cycle_rolls_back() {
        let mut graph = PropertyGraph::new();
        let flag = graph.construct_property("flag", false);
        let a = graph.construct_property("a", 0_i32);
        let b = graph.construct_property("b", 0_i32);
        graph
            .set_bind_lambda(
                &a,
                LambdaBind::new(move |ctx| if ctx.get(&flag) { ctx.get(&b) + 1 } else { 5 }),
            )
            .unwrap();
        graph.set_bind(&b, &a).unwrap();
        assert_eq!(graph.data(a.id()).unwrap().dependencies, vec![flag.id()]);

        let changes = Arc::new(AtomicUsize::new(0));
        for property in [a.id(), b.id(), flag.id()] {
            let counter = changes.clone();
            graph
                .add_handler(
                    property,
                    Arc::new(move |_: &mut PropertyGraph, _: &PropertyChanged| {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }),
                )
                .unwrap();
        }

        assert!(matches!(
            graph.set_value(&flag, true),
            Err(PropertyError::RecursiveCall { .. })
        ));
        assert!(!graph.get_value(&flag).unwrap());
        assert!(graph.is_default_value(&flag).unwrap());
        assert_eq!(graph.get_value(&a).unwrap(), 5);
        assert_eq!(graph.get_value(&b).unwrap(), 5);
        assert_eq!(graph.data(a.id()).unwrap().dependencies, vec![flag.id()]);
        assert_eq!(graph.data(a.id()).unwrap().dependents, vec![b.id()]);
        assert!(graph.data(b.id()).unwrap().dependents.is_empty());
        assert_eq!(changes.load(Ordering::SeqCst), 0);
        assert!(graph.dirty.is_empty());
        assert!(graph.pending.is_empty());

        // The graph is still usable after the rollback.
        graph.reset_bind(&b).unwrap();
        graph.set_value(&flag, true).unwrap();
        assert_eq!(graph.get_value(&a).unwrap(), 1);
    }

    #[test]
    fn test_installing_lambda_runs_it_once() {
        let mut graph = PropertyGraph::new();
        let a = graph.construct_property("a", 1_i32);
        let doubled = graph.construct_property("doubled", 0_i32);
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        graph
            .set_bind_lambda(
                &doubled,
                LambdaBind::new(move |ctx| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    ctx.get(&a) * 2
                }),
            )
            .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(graph.data(doubled.id()).unwrap().dependencies, vec![a.id()]);

        graph.set_value(&a, 4).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(graph.get_value(&doubled).unwrap(), 8);
    }
}
