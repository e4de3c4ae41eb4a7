//! Type-erased values.
//!
//! [`AnyValue`] is the currency of the property engine: every property stores
//! its default, its stacked values and its cached result as `AnyValue`s, and
//! typed handles convert at the edges through the [`AnyType`] trait.
//!
//! The set of payload kinds is closed. Instead of runtime type casts, each
//! [`ValueKind`] carries a compatibility table describing which other kinds
//! it can be read as (GET) and which it accepts writes from (SET):
//!
//! - numeric widening: `i32 -> i64 | f64`, `u32 -> i64 | u64 | f64`, `f32 -> f64`
//! - the [`PointerKind`] lattice for object references
//! - arrays follow the compatibility of their item kind
//!
//! # Example
//!
//! ```
//! use meta_property::{AnyValue, Outcome, ValueKind};
//!
//! let mut wide = AnyValue::from(0_i64);
//!
//! // A narrower integer widens on write.
//! assert_eq!(wide.set(7_i32).unwrap(), Outcome::Success);
//! assert_eq!(wide.get::<i64>(), Some(7));
//!
//! // Writing the same value again is a no-op.
//! assert_eq!(wide.set(7_i64).unwrap(), Outcome::NothingToDo);
//!
//! // Strings are not numbers.
//! assert!(wide.set(String::from("7")).is_err());
//! assert_eq!(wide.kind(), ValueKind::I64);
//! ```

use std::fmt;

use crate::error::{Outcome, PropertyError, Result};
use crate::object::{ObjectRef, PointerKind};

/// Runtime type identifier of an [`AnyValue`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `bool`
    Bool,
    /// `i32`
    I32,
    /// `i64`
    I64,
    /// `u32`
    U32,
    /// `u64`
    U64,
    /// `f32`
    F32,
    /// `f64`
    F64,
    /// `String`
    String,
    /// An [`ObjectRef`] of the given pointer kind.
    Object(PointerKind),
    /// An ordered sequence of items of one kind.
    Array(Box<ValueKind>),
}

/// Which side of a conversion a compatibility query is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompatibilityDirection {
    /// Kinds this value can be read as.
    Get,
    /// Kinds this value accepts writes from.
    Set,
    /// Kinds compatible in both directions.
    Both,
}

/// Which projection of a value a type query or clone refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeIdRole {
    /// The value itself.
    #[default]
    Current,
    /// A single item (the item kind of an array, or a scalar itself).
    Item,
    /// The array form (only arrays have one).
    Array,
}

const SCALAR_KINDS: [ValueKind; 8] = [
    ValueKind::Bool,
    ValueKind::I32,
    ValueKind::I64,
    ValueKind::U32,
    ValueKind::U64,
    ValueKind::F32,
    ValueKind::F64,
    ValueKind::String,
];

impl ValueKind {
    /// Create an array kind with the given item kind.
    pub fn array_of(item: ValueKind) -> Self {
        Self::Array(Box::new(item))
    }

    /// The item kind if this is an array kind.
    pub fn item_kind(&self) -> Option<&ValueKind> {
        match self {
            Self::Array(item) => Some(&**item),
            _ => None,
        }
    }

    /// Whether this is an array kind.
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Kinds a value of this kind can be read as, excluding itself.
    fn get_targets(&self) -> Vec<ValueKind> {
        match self {
            Self::I32 => vec![Self::I64, Self::F64],
            Self::U32 => vec![Self::I64, Self::U64, Self::F64],
            Self::F32 => vec![Self::F64],
            Self::Object(pointer) => pointer
                .get_targets()
                .iter()
                .map(|&kind| Self::Object(kind))
                .collect(),
            Self::Array(item) => item.get_targets().into_iter().map(Self::array_of).collect(),
            _ => Vec::new(),
        }
    }

    /// Kinds a value of this kind accepts writes from, excluding itself.
    fn set_sources(&self) -> Vec<ValueKind> {
        match self {
            Self::Array(item) => item.set_sources().into_iter().map(Self::array_of).collect(),
            Self::Object(_) => PointerKind::ALL
                .iter()
                .map(|&kind| Self::Object(kind))
                .filter(|candidate| candidate.get_targets().contains(self))
                .collect(),
            _ => SCALAR_KINDS
                .iter()
                .filter(|candidate| candidate.get_targets().contains(self))
                .cloned()
                .collect(),
        }
    }

    /// All kinds compatible with this one in the given direction.
    ///
    /// The kind itself is always the first element.
    pub fn compatible_types(&self, direction: CompatibilityDirection) -> Vec<ValueKind> {
        let mut kinds = vec![self.clone()];
        match direction {
            CompatibilityDirection::Get => kinds.extend(self.get_targets()),
            CompatibilityDirection::Set => kinds.extend(self.set_sources()),
            CompatibilityDirection::Both => {
                let sources = self.set_sources();
                kinds.extend(
                    self.get_targets()
                        .into_iter()
                        .filter(|kind| sources.contains(kind)),
                );
            }
        }
        kinds
    }

    /// Whether `other` is compatible with this kind in the given direction.
    pub fn is_compatible(&self, other: &ValueKind, direction: CompatibilityDirection) -> bool {
        if self == other {
            return true;
        }
        match direction {
            CompatibilityDirection::Get => self.get_targets().contains(other),
            CompatibilityDirection::Set => self.set_sources().contains(other),
            CompatibilityDirection::Both => {
                self.get_targets().contains(other) && self.set_sources().contains(other)
            }
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::I32 => write!(f, "i32"),
            Self::I64 => write!(f, "i64"),
            Self::U32 => write!(f, "u32"),
            Self::U64 => write!(f, "u64"),
            Self::F32 => write!(f, "f32"),
            Self::F64 => write!(f, "f64"),
            Self::String => write!(f, "string"),
            Self::Object(pointer) => write!(f, "{pointer} object"),
            Self::Array(item) => write!(f, "array<{item}>"),
        }
    }
}

/// A homogeneous sequence of [`AnyValue`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue {
    item_kind: ValueKind,
    items: Vec<AnyValue>,
}

impl ArrayValue {
    /// Create an empty array of the given item kind.
    pub fn new(item_kind: ValueKind) -> Self {
        Self {
            item_kind,
            items: Vec::new(),
        }
    }

    /// Create an array from items, converting each to `item_kind`.
    pub fn from_items(item_kind: ValueKind, items: Vec<AnyValue>) -> Result<Self> {
        let items = items
            .into_iter()
            .map(|item| item.convert_into(&item_kind))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { item_kind, items })
    }

    /// The kind of every item.
    pub fn item_kind(&self) -> &ValueKind {
        &self.item_kind
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the array has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The items as a slice.
    pub fn items(&self) -> &[AnyValue] {
        &self.items
    }

    /// Get the item at `index`.
    pub fn get(&self, index: usize) -> Result<&AnyValue> {
        self.items.get(index).ok_or_else(|| self.out_of_range(index))
    }

    /// Replace the item at `index`.
    pub fn set(&mut self, index: usize, value: &AnyValue) -> Result<Outcome> {
        let len = self.items.len();
        let slot = self
            .items
            .get_mut(index)
            .ok_or_else(|| out_of_range(index, len))?;
        slot.copy_from(value)
    }

    /// Insert an item at `index` (which may equal the length).
    pub fn insert(&mut self, index: usize, value: AnyValue) -> Result<()> {
        if index > self.items.len() {
            return Err(self.out_of_range(index));
        }
        let value = value.convert_into(&self.item_kind)?;
        self.items.insert(index, value);
        Ok(())
    }

    /// Append an item.
    pub fn push(&mut self, value: AnyValue) -> Result<()> {
        self.insert(self.items.len(), value)
    }

    /// Remove and return the item at `index`.
    pub fn remove(&mut self, index: usize) -> Result<AnyValue> {
        if index >= self.items.len() {
            return Err(self.out_of_range(index));
        }
        Ok(self.items.remove(index))
    }

    fn out_of_range(&self, index: usize) -> PropertyError {
        out_of_range(index, self.items.len())
    }
}

fn out_of_range(index: usize, len: usize) -> PropertyError {
    PropertyError::invalid_argument(format!("index {index} out of range for length {len}"))
}

/// What a clone copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloneValue {
    /// Copy the payload.
    #[default]
    Copy,
    /// Produce the default value of the same kind.
    Default,
}

/// Options for [`AnyValue::clone_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CloneOptions {
    /// Whether to copy the payload or reset it.
    pub value: CloneValue,
    /// Which projection to clone.
    pub role: TypeIdRole,
}

impl CloneOptions {
    /// Clone the given projection, copying the payload.
    pub fn role(role: TypeIdRole) -> Self {
        Self {
            value: CloneValue::Copy,
            role,
        }
    }
}

/// A type-erased value.
#[derive(Clone)]
pub enum AnyValue {
    /// A boolean.
    Bool(bool),
    /// A 32-bit signed integer.
    I32(i32),
    /// A 64-bit signed integer.
    I64(i64),
    /// A 32-bit unsigned integer.
    U32(u32),
    /// A 64-bit unsigned integer.
    U64(u64),
    /// A 32-bit float.
    F32(f32),
    /// A 64-bit float.
    F64(f64),
    /// A string.
    String(String),
    /// An object reference.
    Object(ObjectRef),
    /// An array.
    Array(ArrayValue),
}

impl AnyValue {
    /// The default value of a kind.
    pub fn default_of(kind: &ValueKind) -> Self {
        match kind {
            ValueKind::Bool => Self::Bool(false),
            ValueKind::I32 => Self::I32(0),
            ValueKind::I64 => Self::I64(0),
            ValueKind::U32 => Self::U32(0),
            ValueKind::U64 => Self::U64(0),
            ValueKind::F32 => Self::F32(0.0),
            ValueKind::F64 => Self::F64(0.0),
            ValueKind::String => Self::String(String::new()),
            ValueKind::Object(pointer) => Self::Object(ObjectRef::null(*pointer)),
            ValueKind::Array(item) => Self::Array(ArrayValue::new((**item).clone())),
        }
    }

    /// The kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::I32(_) => ValueKind::I32,
            Self::I64(_) => ValueKind::I64,
            Self::U32(_) => ValueKind::U32,
            Self::U64(_) => ValueKind::U64,
            Self::F32(_) => ValueKind::F32,
            Self::F64(_) => ValueKind::F64,
            Self::String(_) => ValueKind::String,
            Self::Object(object) => ValueKind::Object(object.kind()),
            Self::Array(array) => ValueKind::array_of(array.item_kind().clone()),
        }
    }

    /// The kind of the requested projection, if it exists.
    pub fn type_id(&self, role: TypeIdRole) -> Option<ValueKind> {
        match (role, self) {
            (TypeIdRole::Current, _) => Some(self.kind()),
            (TypeIdRole::Item, Self::Array(array)) => Some(array.item_kind().clone()),
            (TypeIdRole::Item, _) => Some(self.kind()),
            (TypeIdRole::Array, Self::Array(_)) => Some(self.kind()),
            (TypeIdRole::Array, _) => None,
        }
    }

    /// Kinds compatible with this value in the given direction.
    pub fn compatible_types(&self, direction: CompatibilityDirection) -> Vec<ValueKind> {
        self.kind().compatible_types(direction)
    }

    /// The array payload, if this is an array.
    pub fn as_array(&self) -> Option<&ArrayValue> {
        match self {
            Self::Array(array) => Some(array),
            _ => None,
        }
    }

    /// Read this value as another kind.
    ///
    /// Returns `None` if `target` is not GET-compatible with this value.
    pub fn convert_to(&self, target: &ValueKind) -> Option<AnyValue> {
        if &self.kind() == target {
            return Some(self.clone());
        }
        let converted = match (self, target) {
            (Self::I32(v), ValueKind::I64) => Self::I64(i64::from(*v)),
            (Self::I32(v), ValueKind::F64) => Self::F64(f64::from(*v)),
            (Self::U32(v), ValueKind::I64) => Self::I64(i64::from(*v)),
            (Self::U32(v), ValueKind::U64) => Self::U64(u64::from(*v)),
            (Self::U32(v), ValueKind::F64) => Self::F64(f64::from(*v)),
            (Self::F32(v), ValueKind::F64) => Self::F64(f64::from(*v)),
            (Self::Object(object), ValueKind::Object(pointer)) => {
                Self::Object(object.convert(*pointer)?)
            }
            (Self::Array(array), ValueKind::Array(item)) => {
                let items = array
                    .items()
                    .iter()
                    .map(|value| value.convert_to(item))
                    .collect::<Option<Vec<_>>>()?;
                Self::Array(ArrayValue {
                    item_kind: (**item).clone(),
                    items,
                })
            }
            _ => return None,
        };
        Some(converted)
    }

    /// Convert into `target`, failing with `IncompatibleTypes`.
    pub(crate) fn convert_into(self, target: &ValueKind) -> Result<AnyValue> {
        if &self.kind() == target {
            return Ok(self);
        }
        self.convert_to(target)
            .ok_or_else(|| PropertyError::incompatible(target, self.kind()))
    }

    /// Get the payload as a concrete type.
    pub fn get<T: AnyType>(&self) -> Option<T> {
        T::from_any(self).or_else(|| T::from_any(&self.convert_to(&T::kind())?))
    }

    /// Store a typed value, widening it to this value's kind.
    pub fn set<T: AnyType>(&mut self, value: T) -> Result<Outcome> {
        self.copy_from(&value.into_any())
    }

    /// Copy the payload of `other` into this value.
    ///
    /// Fails with `IncompatibleTypes` if `other` is outside the SET-compatible
    /// set of this value's kind. Returns [`Outcome::NothingToDo`] when the
    /// payload is already equal.
    pub fn copy_from(&mut self, other: &AnyValue) -> Result<Outcome> {
        let kind = self.kind();
        if !kind.is_compatible(&other.kind(), CompatibilityDirection::Set) {
            return Err(PropertyError::incompatible(&kind, other.kind()));
        }
        let converted = other
            .convert_to(&kind)
            .ok_or_else(|| PropertyError::incompatible(&kind, other.kind()))?;
        if *self == converted {
            return Ok(Outcome::NothingToDo);
        }
        *self = converted;
        Ok(Outcome::Success)
    }

    /// Reset the payload to the default of its kind.
    pub fn reset_value(&mut self) {
        *self = Self::default_of(&self.kind());
    }

    /// Clone a projection of this value.
    pub fn clone_with(&self, options: CloneOptions) -> Result<AnyValue> {
        let source = match (options.role, self) {
            (TypeIdRole::Item, Self::Array(array)) => match (options.value, array.items.first()) {
                (CloneValue::Copy, Some(first)) => first.clone(),
                _ => Self::default_of(array.item_kind()),
            },
            (TypeIdRole::Array, Self::Array(_)) => self.clone(),
            (TypeIdRole::Array, _) => {
                return Err(PropertyError::incompatible(
                    ValueKind::array_of(self.kind()),
                    self.kind(),
                ));
            }
            _ => self.clone(),
        };
        Ok(match options.value {
            CloneValue::Copy => source,
            CloneValue::Default => Self::default_of(&source.kind()),
        })
    }
}

impl PartialEq for AnyValue {
    /// Payloads compare bit-for-bit, so `NaN == NaN` and `0.0 != -0.0`.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::I32(a), Self::I32(b)) => a == b,
            (Self::I64(a), Self::I64(b)) => a == b,
            (Self::U32(a), Self::U32(b)) => a == b,
            (Self::U64(a), Self::U64(b)) => a == b,
            (Self::F32(a), Self::F32(b)) => a.to_bits() == b.to_bits(),
            (Self::F64(a), Self::F64(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for AnyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}_i32"),
            Self::I64(v) => write!(f, "{v}_i64"),
            Self::U32(v) => write!(f, "{v}_u32"),
            Self::U64(v) => write!(f, "{v}_u64"),
            Self::F32(v) => write!(f, "{v}_f32"),
            Self::F64(v) => write!(f, "{v}_f64"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Object(v) => write!(f, "{v:?}"),
            Self::Array(v) => f.debug_list().entries(v.items()).finish(),
        }
    }
}

/// Conversion between a Rust type and [`AnyValue`].
///
/// Implemented for `bool`, the fixed-width integers and floats listed in
/// [`ValueKind`], `String`, [`ObjectRef`] and `Vec<T>` of any of those.
pub trait AnyType: Clone + PartialEq + Send + Sync + 'static {
    /// The kind values of this type are stored as.
    fn kind() -> ValueKind;

    /// Wrap the value.
    fn into_any(self) -> AnyValue;

    /// Unwrap a value of exactly this type.
    fn from_any(value: &AnyValue) -> Option<Self>;
}

macro_rules! scalar_any_type {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl AnyType for $ty {
                fn kind() -> ValueKind {
                    ValueKind::$variant
                }

                fn into_any(self) -> AnyValue {
                    AnyValue::$variant(self)
                }

                fn from_any(value: &AnyValue) -> Option<Self> {
                    match value {
                        AnyValue::$variant(v) => Some(v.clone()),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for AnyValue {
                fn from(value: $ty) -> Self {
                    AnyValue::$variant(value)
                }
            }
        )*
    };
}

scalar_any_type! {
    bool => Bool,
    i32 => I32,
    i64 => I64,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => String,
}

impl From<&str> for AnyValue {
    fn from(value: &str) -> Self {
        AnyValue::String(value.to_string())
    }
}

impl AnyType for ObjectRef {
    fn kind() -> ValueKind {
        ValueKind::Object(PointerKind::Shared)
    }

    fn into_any(self) -> AnyValue {
        AnyValue::Object(self)
    }

    /// Object references keep their own pointer kind.
    fn from_any(value: &AnyValue) -> Option<Self> {
        match value {
            AnyValue::Object(object) => Some(object.clone()),
            _ => None,
        }
    }
}

impl From<ObjectRef> for AnyValue {
    fn from(value: ObjectRef) -> Self {
        AnyValue::Object(value)
    }
}

impl<T: AnyType> AnyType for Vec<T> {
    fn kind() -> ValueKind {
        ValueKind::array_of(T::kind())
    }

    fn into_any(self) -> AnyValue {
        AnyValue::Array(ArrayValue {
            item_kind: T::kind(),
            items: self.into_iter().map(AnyType::into_any).collect(),
        })
    }

    fn from_any(value: &AnyValue) -> Option<Self> {
        match value {
            AnyValue::Array(array) => array.items().iter().map(T::from_any).collect(),
            _ => None,
        }
    }
}

impl<T: AnyType> From<Vec<T>> for AnyValue {
    fn from(value: Vec<T>) -> Self {
        value.into_any()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_compatible_and_nothing_to_do() {
        let mut value = AnyValue::from(1_i32);
        assert_eq!(value.set(2_i32).unwrap(), Outcome::Success);
        assert_eq!(value.set(2_i32).unwrap(), Outcome::NothingToDo);
        assert_eq!(value.get::<i32>(), Some(2));
    }

    #[test]
    fn test_set_incompatible_fails_and_keeps_value() {
        let mut value = AnyValue::from(5_i32);
        let err = value.set(String::from("five")).unwrap_err();
        assert!(matches!(err, PropertyError::IncompatibleTypes { .. }));

        // Narrowing is not a compatible conversion either.
        assert!(value.set(5_i64).is_err());
        assert_eq!(value, AnyValue::I32(5));
    }

    #[test]
    fn test_numeric_widening_on_get() {
        let value = AnyValue::from(3_u32);
        assert_eq!(value.get::<u64>(), Some(3));
        assert_eq!(value.get::<i64>(), Some(3));
        assert_eq!(value.get::<f64>(), Some(3.0));
        assert_eq!(value.get::<i32>(), None);
    }

    #[test]
    fn test_compatible_types_lists() {
        let kinds = ValueKind::I64.compatible_types(CompatibilityDirection::Set);
        assert_eq!(kinds[0], ValueKind::I64);
        assert!(kinds.contains(&ValueKind::I32));
        assert!(kinds.contains(&ValueKind::U32));
        assert!(!kinds.contains(&ValueKind::U64));

        let kinds = ValueKind::I32.compatible_types(CompatibilityDirection::Get);
        assert_eq!(kinds, vec![ValueKind::I32, ValueKind::I64, ValueKind::F64]);

        assert_eq!(
            ValueKind::String.compatible_types(CompatibilityDirection::Both),
            vec![ValueKind::String]
        );
    }

    #[test]
    fn test_pointer_lattice() {
        let shared = ValueKind::Object(PointerKind::Shared);
        let weak = ValueKind::Object(PointerKind::Weak);
        let const_weak = ValueKind::Object(PointerKind::ConstWeak);
        let const_shared = ValueKind::Object(PointerKind::ConstShared);

        // shared can be read as its weak and const-weak projections
        assert!(shared.is_compatible(&weak, CompatibilityDirection::Get));
        assert!(shared.is_compatible(&const_weak, CompatibilityDirection::Get));

        // weak is compatible with shared in both directions
        assert!(weak.is_compatible(&shared, CompatibilityDirection::Get));
        assert!(weak.is_compatible(&shared, CompatibilityDirection::Set));
        assert!(weak.is_compatible(&shared, CompatibilityDirection::Both));

        // const never yields a mutable view
        assert!(!const_shared.is_compatible(&shared, CompatibilityDirection::Get));
        assert!(!const_weak.is_compatible(&weak, CompatibilityDirection::Get));
    }

    #[test]
    fn test_weak_any_set_from_shared() {
        let target = ObjectRef::shared(7_i32);
        let mut slot = AnyValue::from(ObjectRef::null(PointerKind::Weak));
        assert_eq!(slot.set(target.clone()).unwrap(), Outcome::Success);
        assert_eq!(slot.kind(), ValueKind::Object(PointerKind::Weak));

        let read: ObjectRef = slot.get().unwrap();
        assert_eq!(read.convert(PointerKind::Shared).unwrap(), target);
    }

    #[test]
    fn test_const_any_rejects_mutable_read() {
        let shared = ObjectRef::shared(1_i32);
        let value = AnyValue::from(shared.convert(PointerKind::ConstShared).unwrap());
        assert!(value
            .convert_to(&ValueKind::Object(PointerKind::Shared))
            .is_none());
    }

    #[test]
    fn test_reset_value() {
        let mut value = AnyValue::from(String::from("text"));
        value.reset_value();
        assert_eq!(value, AnyValue::String(String::new()));

        let mut array = AnyValue::from(vec![1_i32, 2]);
        array.reset_value();
        assert_eq!(array.get::<Vec<i32>>(), Some(vec![]));
        assert_eq!(array.kind(), ValueKind::array_of(ValueKind::I32));
    }

    #[test]
    fn test_clone_array_role_on_scalar_fails() {
        let value = AnyValue::from(1.5_f64);
        assert!(value.clone_with(CloneOptions::role(TypeIdRole::Array)).is_err());
        assert_eq!(
            value.clone_with(CloneOptions::role(TypeIdRole::Current)).unwrap(),
            value
        );
    }

    #[test]
    fn test_clone_item_role_on_array() {
        let value = AnyValue::from(vec![4_u32, 5, 6]);
        let item = value.clone_with(CloneOptions::role(TypeIdRole::Item)).unwrap();
        assert_eq!(item, AnyValue::U32(4));

        let item = value
            .clone_with(CloneOptions {
                value: CloneValue::Default,
                role: TypeIdRole::Item,
            })
            .unwrap();
        assert_eq!(item, AnyValue::U32(0));

        let empty = AnyValue::from(Vec::<String>::new());
        let item = empty.clone_with(CloneOptions::role(TypeIdRole::Item)).unwrap();
        assert_eq!(item, AnyValue::String(String::new()));
    }

    #[test]
    fn test_type_id_roles() {
        let array = AnyValue::from(vec![true]);
        assert_eq!(array.type_id(TypeIdRole::Item), Some(ValueKind::Bool));
        assert_eq!(
            array.type_id(TypeIdRole::Array),
            Some(ValueKind::array_of(ValueKind::Bool))
        );
        assert_eq!(AnyValue::from(true).type_id(TypeIdRole::Array), None);
    }

    #[test]
    fn test_nan_equals_itself_bitwise() {
        let mut value = AnyValue::from(f64::NAN);
        assert_eq!(value.set(f64::NAN).unwrap(), Outcome::NothingToDo);
    }

    #[test]
    fn test_array_value_index_errors() {
        let mut array = ArrayValue::new(ValueKind::I32);
        array.push(AnyValue::from(1_i32)).unwrap();
        assert!(array.get(1).is_err());
        assert!(array.set(3, &AnyValue::from(2_i32)).is_err());
        assert!(array.remove(1).is_err());
        assert!(array.insert(2, AnyValue::from(2_i32)).is_err());
        assert!(array.push(AnyValue::from("no")).is_err());
        assert_eq!(array.len(), 1);
    }

    #[test]
    fn test_array_widening() {
        let array = AnyValue::from(vec![1_i32, -2]);
        assert_eq!(array.get::<Vec<i64>>(), Some(vec![1, -2]));
        assert_eq!(array.get::<Vec<u32>>(), None);
    }
}
