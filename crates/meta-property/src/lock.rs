//! Sharing a property graph between threads.
//!
//! The graph itself is plain data mutated through `&mut`. When several
//! threads need it, wrap it in a [`SharedPropertyGraph`]: reads take a
//! [`PropertyLock`], writes a [`UniqueLock`].
//!
//! # Example
//!
//! ```
//! use meta_property::{PropertyGraph, SharedPropertyGraph};
//!
//! let mut graph = PropertyGraph::new();
//! let counter = graph.construct_property("counter", 0_u32);
//! let shared = SharedPropertyGraph::new(graph);
//!
//! let worker = {
//!     let shared = shared.clone();
//!     std::thread::spawn(move || {
//!         let mut lock = shared.write();
//!         if let Some(graph) = lock.get_mut() {
//!             graph.set_value(&counter, 1).unwrap();
//!         }
//!     })
//! };
//! worker.join().unwrap();
//!
//! assert_eq!(shared.read().get_value(&counter).unwrap(), 1);
//! ```

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::graph::PropertyGraph;

/// A property graph behind a reader-writer lock.
///
/// Cloning is cheap and yields another handle to the same graph.
#[derive(Clone, Default)]
pub struct SharedPropertyGraph {
    inner: Arc<RwLock<PropertyGraph>>,
}

impl SharedPropertyGraph {
    /// Wrap a graph.
    pub fn new(graph: PropertyGraph) -> Self {
        Self {
            inner: Arc::new(RwLock::new(graph)),
        }
    }

    /// Lock for reading, blocking while a writer holds the lock.
    pub fn read(&self) -> PropertyLock<'_> {
        PropertyLock {
            guard: self.inner.read(),
        }
    }

    /// Lock for writing, blocking until every other lock is released.
    pub fn write(&self) -> UniqueLock<'_> {
        UniqueLock {
            lock: &self.inner,
            guard: Some(self.inner.write()),
        }
    }

    /// Lock for writing if no other lock is held.
    pub fn try_write(&self) -> Option<UniqueLock<'_>> {
        self.inner.try_write().map(|guard| UniqueLock {
            lock: &self.inner,
            guard: Some(guard),
        })
    }

    /// Run a closure with read access.
    pub fn with_read<R>(&self, f: impl FnOnce(&PropertyGraph) -> R) -> R {
        f(&self.inner.read())
    }

    /// Run a closure with write access.
    pub fn with_write<R>(&self, f: impl FnOnce(&mut PropertyGraph) -> R) -> R {
        f(&mut self.inner.write())
    }
}

impl fmt::Debug for SharedPropertyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedPropertyGraph")
            .field("locked", &self.inner.is_locked())
            .finish()
    }
}

/// Shared read access, released on drop.
pub struct PropertyLock<'a> {
    guard: RwLockReadGuard<'a, PropertyGraph>,
}

impl Deref for PropertyLock<'_> {
    type Target = PropertyGraph;

    fn deref(&self) -> &PropertyGraph {
        &self.guard
    }
}

impl fmt::Debug for PropertyLock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PropertyLock").field(&*self.guard).finish()
    }
}

/// Exclusive write access that can be released and re-acquired.
///
/// A `UniqueLock` either owns the lock or is empty. Moving the lock out with
/// [`take`](Self::take) leaves the source empty.
pub struct UniqueLock<'a> {
    lock: &'a RwLock<PropertyGraph>,
    guard: Option<RwLockWriteGuard<'a, PropertyGraph>>,
}

impl<'a> UniqueLock<'a> {
    /// Whether this handle currently holds the lock.
    pub fn owns_lock(&self) -> bool {
        self.guard.is_some()
    }

    /// Release the lock early. Does nothing if not held.
    pub fn unlock(&mut self) {
        self.guard = None;
    }

    /// Acquire the lock again. Does nothing if already held.
    pub fn lock(&mut self) {
        if self.guard.is_none() {
            self.guard = Some(self.lock.write());
        }
    }

    /// Move the lock into a new handle, leaving this one empty.
    pub fn take(&mut self) -> UniqueLock<'a> {
        UniqueLock {
            lock: self.lock,
            guard: self.guard.take(),
        }
    }

    /// The graph, if the lock is held.
    pub fn get(&self) -> Option<&PropertyGraph> {
        self.guard.as_deref()
    }

    /// The graph mutably, if the lock is held.
    pub fn get_mut(&mut self) -> Option<&mut PropertyGraph> {
        self.guard.as_deref_mut()
    }
}

impl fmt::Debug for UniqueLock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniqueLock")
            .field("owns_lock", &self.owns_lock())
            .finish()
    }
}
