//! Modifier chains.
//!
//! A modifier intercepts reads, writes and resets of a property after the
//! value stack has produced a candidate value. Modifiers run in the order
//! they were attached.
//!
//! - `process_on_get` may rewrite the resolved value. The rewrite is only
//!   what readers see; it is never written back into the value stack.
//! - `process_on_set` may rewrite or veto an incoming value.
//! - `process_on_reset` may veto a reset.
//!
//! # Example
//!
//! ```
//! use meta_property::{PropertyError, PropertyGraph, RangeModifier, Validator};
//!
//! let mut graph = PropertyGraph::new();
//! let volume = graph.construct_property("volume", 5_i32);
//!
//! graph.add_modifier(&volume, RangeModifier::new(0, 10)).unwrap();
//! graph.add_modifier(&volume, Validator::new(|v: &i32| *v != 7)).unwrap();
//!
//! graph.set_value(&volume, 42).unwrap();
//! assert_eq!(graph.get_value(&volume).unwrap(), 10);
//!
//! let err = graph.set_value(&volume, 7).unwrap_err();
//! assert!(matches!(err, PropertyError::Rejected { .. }));
//! assert_eq!(graph.get_value(&volume).unwrap(), 10);
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};

use slotmap::new_key_type;

use crate::any::{AnyType, AnyValue, ValueKind};

new_key_type! {
    /// A unique identifier for a modifier attached to a property.
    pub struct ModifierId;
}

/// What a modifier did with a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierResult {
    /// Pass the value on unchanged.
    Continue,
    /// The modifier rewrote the value.
    ValueChanged,
    /// The modifier vetoes the operation.
    Rejected,
}

/// A chain-of-responsibility element intercepting property access.
///
/// All hooks default to [`ModifierResult::Continue`]; implement only the
/// ones you need.
pub trait Modifier: Send + Sync {
    /// A short name for diagnostics.
    fn name(&self) -> &str {
        "modifier"
    }

    /// Whether the modifier can be attached to a property of this kind.
    fn is_compatible(&self, kind: &ValueKind) -> bool;

    /// Inspect or rewrite the resolved value on its way to readers.
    fn process_on_get(&self, _value: &mut AnyValue) -> ModifierResult {
        ModifierResult::Continue
    }

    /// Inspect, rewrite or veto a value being written.
    fn process_on_set(&self, _value: &mut AnyValue, _current: &AnyValue) -> ModifierResult {
        ModifierResult::Continue
    }

    /// Veto a reset of the property.
    fn process_on_reset(&self, _current: &AnyValue) -> ModifierResult {
        ModifierResult::Continue
    }
}

/// Clamps the resolved value into `[min, max]` on read.
///
/// The stored value is left alone, so widening the range later reveals it
/// again.
pub struct RangeModifier<T> {
    min: T,
    max: T,
}

impl<T: AnyType + PartialOrd> RangeModifier<T> {
    /// Create a range clamp. `min` must not exceed `max`.
    pub fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl<T: AnyType + PartialOrd> Modifier for RangeModifier<T> {
    fn name(&self) -> &str {
        "range"
    }

    fn is_compatible(&self, kind: &ValueKind) -> bool {
        *kind == T::kind()
    }

    fn process_on_get(&self, value: &mut AnyValue) -> ModifierResult {
        let Some(current) = value.get::<T>() else {
            return ModifierResult::Continue;
        };
        let clamped = if current < self.min {
            self.min.clone()
        } else if current > self.max {
            self.max.clone()
        } else {
            return ModifierResult::Continue;
        };
        *value = clamped.into_any();
        ModifierResult::ValueChanged
    }
}

impl<T: fmt::Debug> fmt::Debug for RangeModifier<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeModifier")
            .field("min", &self.min)
            .field("max", &self.max)
            .finish()
    }
}

/// Rejects writes whose value fails a predicate.
///
/// A rejected write leaves the property exactly as it was.
pub struct Validator<T> {
    accept: Box<dyn Fn(&T) -> bool + Send + Sync>,
    _marker: PhantomData<fn(&T)>,
}

impl<T: AnyType> Validator<T> {
    /// Create a validator from a predicate returning `true` for acceptable values.
    pub fn new<F>(accept: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            accept: Box::new(accept),
            _marker: PhantomData,
        }
    }
}

impl<T: AnyType> Modifier for Validator<T> {
    fn name(&self) -> &str {
        "validator"
    }

    fn is_compatible(&self, kind: &ValueKind) -> bool {
        *kind == T::kind()
    }

    fn process_on_set(&self, value: &mut AnyValue, _current: &AnyValue) -> ModifierResult {
        match value.get::<T>() {
            Some(candidate) if (self.accept)(&candidate) => ModifierResult::Continue,
            _ => ModifierResult::Rejected,
        }
    }
}

impl<T> fmt::Debug for Validator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator").finish_non_exhaustive()
    }
}

/// Rejects resets while locked. Compatible with every kind.
#[derive(Debug, Default)]
pub struct ResetLock {
    locked: AtomicBool,
}

impl ResetLock {
    /// Create a lock in the given state.
    pub fn new(locked: bool) -> Self {
        Self {
            locked: AtomicBool::new(locked),
        }
    }

    /// Lock or unlock resets.
    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::SeqCst);
    }

    /// Whether resets are currently refused.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }
}

impl Modifier for ResetLock {
    fn name(&self) -> &str {
        "reset lock"
    }

    fn is_compatible(&self, _kind: &ValueKind) -> bool {
        true
    }

    fn process_on_reset(&self, _current: &AnyValue) -> ModifierResult {
        if self.is_locked() {
            ModifierResult::Rejected
        } else {
            ModifierResult::Continue
        }
    }
}

impl<M: Modifier + ?Sized> Modifier for std::sync::Arc<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn is_compatible(&self, kind: &ValueKind) -> bool {
        (**self).is_compatible(kind)
    }

    fn process_on_get(&self, value: &mut AnyValue) -> ModifierResult {
        (**self).process_on_get(value)
    }

    fn process_on_set(&self, value: &mut AnyValue, current: &AnyValue) -> ModifierResult {
        (**self).process_on_set(value, current)
    }

    fn process_on_reset(&self, current: &AnyValue) -> ModifierResult {
        (**self).process_on_reset(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_clamps_on_get() {
        let range = RangeModifier::new(0_i32, 10);
        let mut value = AnyValue::from(15_i32);
        assert_eq!(range.process_on_get(&mut value), ModifierResult::ValueChanged);
        assert_eq!(value, AnyValue::I32(10));

        let mut value = AnyValue::from(-3_i32);
        assert_eq!(range.process_on_get(&mut value), ModifierResult::ValueChanged);
        assert_eq!(value, AnyValue::I32(0));

        let mut value = AnyValue::from(4_i32);
        assert_eq!(range.process_on_get(&mut value), ModifierResult::Continue);
        assert_eq!(value, AnyValue::I32(4));
    }

    #[test]
    fn test_range_compatibility() {
        let range = RangeModifier::new(0.0_f64, 1.0);
        assert!(range.is_compatible(&ValueKind::F64));
        assert!(!range.is_compatible(&ValueKind::String));
    }

    #[test]
    fn test_validator_rejects() {
        let validator = Validator::new(|s: &String| !s.is_empty());
        let current = AnyValue::from("old");
        let mut empty = AnyValue::from("");
        assert_eq!(
            validator.process_on_set(&mut empty, &current),
            ModifierResult::Rejected
        );
        let mut fine = AnyValue::from("new");
        assert_eq!(
            validator.process_on_set(&mut fine, &current),
            ModifierResult::Continue
        );
    }

    #[test]
    fn test_reset_lock() {
        let lock = ResetLock::new(true);
        let current = AnyValue::from(1_u32);
        assert_eq!(lock.process_on_reset(&current), ModifierResult::Rejected);
        lock.set_locked(false);
        assert_eq!(lock.process_on_reset(&current), ModifierResult::Continue);
        assert!(lock.is_compatible(&ValueKind::array_of(ValueKind::Bool)));
    }
}
