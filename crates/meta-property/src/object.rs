//! Object pointer payloads for [`AnyValue`](crate::AnyValue).
//!
//! Properties can hold references to arbitrary shared objects. The engine
//! does not know anything about those objects beyond their identity, so they
//! are stored as `Arc<dyn Any + Send + Sync>` together with a
//! [`PointerKind`] describing how the reference may be used.
//!
//! The four kinds form a small lattice:
//!
//! - a `Shared` reference can be viewed as `Weak`, `ConstShared` or `ConstWeak`
//! - a `Weak` reference can be viewed as `Shared` (by upgrading) or `ConstWeak`
//! - a `ConstShared` reference can be viewed as `ConstWeak`, and back
//! - a const reference never yields a non-const view

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

/// The shared payload type behind an [`ObjectRef`].
pub type ObjectPayload = dyn Any + Send + Sync;

/// The ownership flavour of an [`ObjectRef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerKind {
    /// Owning, mutable reference.
    Shared,
    /// Owning, read-only reference.
    ConstShared,
    /// Non-owning, mutable reference.
    Weak,
    /// Non-owning, read-only reference.
    ConstWeak,
}

impl PointerKind {
    /// Whether the reference keeps its target alive.
    pub fn is_owning(self) -> bool {
        matches!(self, Self::Shared | Self::ConstShared)
    }

    /// Whether the reference is read-only.
    pub fn is_const(self) -> bool {
        matches!(self, Self::ConstShared | Self::ConstWeak)
    }

    /// The kinds a reference of this kind can be read as (excluding itself).
    pub(crate) fn get_targets(self) -> &'static [PointerKind] {
        match self {
            Self::Shared => &[Self::Weak, Self::ConstShared, Self::ConstWeak],
            Self::Weak => &[Self::Shared, Self::ConstWeak],
            Self::ConstShared => &[Self::ConstWeak],
            Self::ConstWeak => &[Self::ConstShared],
        }
    }

    pub(crate) const ALL: [PointerKind; 4] =
        [Self::Shared, Self::ConstShared, Self::Weak, Self::ConstWeak];
}

impl fmt::Display for PointerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => write!(f, "shared"),
            Self::ConstShared => write!(f, "const shared"),
            Self::Weak => write!(f, "weak"),
            Self::ConstWeak => write!(f, "const weak"),
        }
    }
}

#[derive(Clone)]
enum Pointer {
    Strong(Arc<ObjectPayload>),
    Weak(Weak<ObjectPayload>),
}

/// A typed-erased reference to a shared object.
///
/// Equality is identity: two references are equal when they have the same
/// kind and point at the same allocation (or are both null).
///
/// # Example
///
/// ```
/// use meta_property::{ObjectRef, PointerKind};
///
/// let shared = ObjectRef::shared(String::from("payload"));
/// let weak = shared.convert(PointerKind::Weak).unwrap();
///
/// assert!(!weak.is_null());
/// assert_eq!(weak.downcast::<String>().as_deref().map(String::as_str), Some("payload"));
///
/// // Const references never hand out mutable views.
/// let read_only = shared.convert(PointerKind::ConstShared).unwrap();
/// assert!(read_only.convert(PointerKind::Shared).is_none());
/// ```
#[derive(Clone)]
pub struct ObjectRef {
    kind: PointerKind,
    ptr: Option<Pointer>,
}

impl ObjectRef {
    /// Wrap a new object in a shared reference.
    pub fn shared<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Create a shared reference from an existing `Arc`.
    pub fn from_arc(target: Arc<ObjectPayload>) -> Self {
        Self {
            kind: PointerKind::Shared,
            ptr: Some(Pointer::Strong(target)),
        }
    }

    /// Create a null reference of the given kind.
    pub fn null(kind: PointerKind) -> Self {
        Self { kind, ptr: None }
    }

    /// The kind of this reference.
    pub fn kind(&self) -> PointerKind {
        self.kind
    }

    /// Whether the reference points at nothing (or at an object that has
    /// been dropped, for weak references).
    pub fn is_null(&self) -> bool {
        self.upgrade().is_none()
    }

    /// Get a strong handle to the target, if it is still alive.
    pub fn upgrade(&self) -> Option<Arc<ObjectPayload>> {
        match &self.ptr {
            Some(Pointer::Strong(arc)) => Some(arc.clone()),
            Some(Pointer::Weak(weak)) => weak.upgrade(),
            None => None,
        }
    }

    /// Get the target as a concrete type.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.upgrade().and_then(|arc| arc.downcast::<T>().ok())
    }

    /// View this reference as another kind.
    ///
    /// Returns `None` when the pointer lattice does not allow the conversion
    /// (for example a const reference asked for a mutable view).
    pub fn convert(&self, kind: PointerKind) -> Option<Self> {
        if kind != self.kind && !self.kind.get_targets().contains(&kind) {
            return None;
        }
        let ptr = match (&self.ptr, kind.is_owning()) {
            (None, _) => None,
            (Some(Pointer::Strong(arc)), true) => Some(Pointer::Strong(arc.clone())),
            (Some(Pointer::Strong(arc)), false) => Some(Pointer::Weak(Arc::downgrade(arc))),
            (Some(Pointer::Weak(weak)), true) => weak.upgrade().map(Pointer::Strong),
            (Some(Pointer::Weak(weak)), false) => Some(Pointer::Weak(weak.clone())),
        };
        Some(Self { kind, ptr })
    }

    fn address(&self) -> Option<*const ()> {
        match &self.ptr {
            Some(Pointer::Strong(arc)) => Some(Arc::as_ptr(arc) as *const ()),
            Some(Pointer::Weak(weak)) => Some(weak.as_ptr() as *const ()),
            None => None,
        }
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.address() == other.address()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("kind", &self.kind)
            .field("address", &self.address())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_to_weak_and_back() {
        let shared = ObjectRef::shared(42_u8);
        let weak = shared.convert(PointerKind::Weak).unwrap();
        assert_eq!(weak.kind(), PointerKind::Weak);

        let again = weak.convert(PointerKind::Shared).unwrap();
        assert_eq!(again, shared);
        assert_eq!(*again.downcast::<u8>().unwrap(), 42);
    }

    #[test]
    fn test_weak_expires_with_target() {
        let shared = ObjectRef::shared(String::from("short lived"));
        let weak = shared.convert(PointerKind::Weak).unwrap();
        assert!(!weak.is_null());

        drop(shared);
        assert!(weak.is_null());
        let upgraded = weak.convert(PointerKind::Shared).unwrap();
        assert!(upgraded.is_null());
    }

    #[test]
    fn test_const_never_yields_mutable_view() {
        let shared = ObjectRef::shared(1_i32);
        let const_shared = shared.convert(PointerKind::ConstShared).unwrap();
        assert!(const_shared.convert(PointerKind::Shared).is_none());
        assert!(const_shared.convert(PointerKind::Weak).is_none());

        let const_weak = const_shared.convert(PointerKind::ConstWeak).unwrap();
        assert!(const_weak.convert(PointerKind::Weak).is_none());
        assert!(const_weak.convert(PointerKind::ConstShared).is_some());
    }

    #[test]
    fn test_identity_equality() {
        let a = ObjectRef::shared(1_i32);
        let b = ObjectRef::shared(1_i32);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(
            ObjectRef::null(PointerKind::Weak),
            ObjectRef::null(PointerKind::Weak)
        );
        assert_ne!(
            ObjectRef::null(PointerKind::Weak),
            ObjectRef::null(PointerKind::Shared)
        );
    }
}
