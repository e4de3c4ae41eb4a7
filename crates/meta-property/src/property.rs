//! Typed property handles.
//!
//! Properties live in a [`PropertyGraph`](crate::PropertyGraph). What user
//! code holds is a handle: a [`PropertyId`] plus the Rust type of the value,
//! so reads and writes through the graph are checked at compile time while
//! the graph itself stays type-erased.
//!
//! # Handle Types
//!
//! - **Property<T>**: A typed handle to a scalar or array property
//! - **ArrayProperty<T>**: A handle to a property holding `Vec<T>`
//! - **PropertyMeta**: Runtime metadata for property introspection
//!
//! # Example
//!
//! ```
//! use meta_property::PropertyGraph;
//!
//! let mut graph = PropertyGraph::new();
//! let width = graph.construct_property("width", 100_i32);
//!
//! assert_eq!(graph.get_value(&width).unwrap(), 100);
//! assert!(graph.set_value(&width, 250).unwrap().changed());
//! assert_eq!(graph.get_value(&width).unwrap(), 250);
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::ops::{BitOr, BitOrAssign};

use slotmap::new_key_type;

use crate::any::ValueKind;

new_key_type! {
    /// A unique identifier for a property in a graph.
    ///
    /// `PropertyId`s are stable handles. They become expired when the
    /// property is removed from its graph; every operation on an expired
    /// id fails with [`PropertyError::Expired`](crate::PropertyError::Expired).
    pub struct PropertyId;
}

impl PropertyId {
    /// Convert the PropertyId to a raw u64 value.
    ///
    /// This is useful when a property has to be referenced from outside the
    /// process, for example by a serializer writing bind targets.
    #[inline]
    pub fn as_raw(self) -> u64 {
        use slotmap::Key;
        self.data().as_ffi()
    }

    /// Create a PropertyId from a raw u64 value.
    ///
    /// This does not check that the property exists in any graph.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self::from(slotmap::KeyData::from_ffi(raw))
    }
}

/// A typed handle to a property.
///
/// Handles are `Copy` and do not own the property; the graph does.
pub struct Property<T> {
    id: PropertyId,
    _marker: PhantomData<fn() -> T>,
}

/// A handle to an array property.
pub type ArrayProperty<T> = Property<Vec<T>>;

impl<T> Property<T> {
    pub(crate) fn from_id(id: PropertyId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// The untyped id of this property.
    pub fn id(&self) -> PropertyId {
        self.id
    }
}

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Property<T> {}

impl<T> PartialEq for Property<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Property<T> {}

impl<T> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("id", &self.id)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> From<Property<T>> for PropertyId {
    fn from(property: Property<T>) -> Self {
        property.id
    }
}

impl<T> From<&Property<T>> for PropertyId {
    fn from(property: &Property<T>) -> Self {
        property.id
    }
}

/// Construction flags for a property.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PropertyFlags(u32);

impl PropertyFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// Direct writes through `set_value` are refused. Binds and pushed
    /// values still apply.
    pub const READ_ONLY: Self = Self(1);

    /// Whether all flags in `other` are set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// The raw bits.
    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for PropertyFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PropertyFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for PropertyFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.contains(Self::READ_ONLY) {
            write!(f, "PropertyFlags(READ_ONLY)")
        } else {
            write!(f, "PropertyFlags(NONE)")
        }
    }
}

/// Metadata for a property, used for runtime introspection.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyMeta {
    /// The property name.
    pub name: String,
    /// The kind of value the property holds.
    pub kind: ValueKind,
    /// Construction flags.
    pub flags: PropertyFlags,
    /// Number of entries on the value stack.
    pub stack_depth: usize,
    /// Number of attached modifiers.
    pub modifier_count: usize,
    /// Number of change handlers.
    pub handler_count: usize,
}

impl PropertyMeta {
    /// Whether this property is read-only.
    pub fn read_only(&self) -> bool {
        self.flags.contains(PropertyFlags::READ_ONLY)
    }
}
