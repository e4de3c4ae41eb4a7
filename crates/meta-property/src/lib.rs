//! Reactive properties for Rust.
//!
//! This crate provides a property engine in which every property resolves
//! its value from a stack of sources:
//!
//! - **Value Stack**: Direct values, binds to other properties, lambda binds
//!   and array element binds, evaluated top-down with fallback to a default
//! - **Modifier Chain**: Interceptors that clamp, validate or veto reads,
//!   writes and resets
//! - **Propagation**: Writes re-evaluate every dependent eagerly, once each,
//!   before any change handler runs
//! - **Cycle Guard**: A bind that would make a property depend on itself is
//!   refused and leaves the graph untouched
//! - **Array Diffs**: Structured removals, additions and moves for array
//!   properties
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use meta_property::{LambdaBind, PropertyGraph};
//!
//! let mut graph = PropertyGraph::new();
//! let width = graph.construct_property("width", 4_i32);
//! let height = graph.construct_property("height", 3_i32);
//! let area = graph.construct_property("area", 0_i32);
//!
//! graph
//!     .set_bind_lambda(
//!         &area,
//!         LambdaBind::with_dependencies(
//!             move |ctx| ctx.get(&width) * ctx.get(&height),
//!             [width.id(), height.id()],
//!         ),
//!     )
//!     .unwrap();
//! assert_eq!(graph.get_value(&area).unwrap(), 12);
//!
//! let changes = Arc::new(AtomicUsize::new(0));
//! let counter = changes.clone();
//! graph
//!     .on_changed(&area, move |_, _| {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!     })
//!     .unwrap();
//!
//! graph.set_value(&width, 5).unwrap();
//! assert_eq!(graph.get_value(&area).unwrap(), 15);
//!
//! // Equal values do not notify.
//! graph.set_value(&width, 5).unwrap();
//! assert_eq!(changes.load(Ordering::SeqCst), 1);
//! ```
//!
//! # Threading
//!
//! A [`PropertyGraph`] is mutated through `&mut` and has a single writer.
//! Share one between threads with [`SharedPropertyGraph`].

mod any;
mod array;
pub mod config;
pub mod diff;
mod error;
pub mod event;
mod graph;
pub mod lock;
pub mod logging;
pub mod modifier;
mod object;
mod property;
mod stack;

pub use any::{
    AnyType, AnyValue, ArrayValue, CloneOptions, CloneValue, CompatibilityDirection, TypeIdRole,
    ValueKind,
};
pub use array::ArrayChangedHandler;
pub use config::{GraphBuilder, GraphConfig};
pub use diff::{ArrayChanges, diff, diff_hashed};
pub use error::{Outcome, PropertyError, Result};
pub use event::{HandlerId, PropertyChanged, ScopedDisableEventHandler};
pub use graph::{PropertyGraph, PropertySnapshot, SnapshotBind};
pub use lock::{PropertyLock, SharedPropertyGraph, UniqueLock};
pub use logging::{PropertyGraphDebug, TreeFormatOptions, TreeStyle};
pub use modifier::{Modifier, ModifierId, ModifierResult, RangeModifier, ResetLock, Validator};
pub use object::{ObjectPayload, ObjectRef, PointerKind};
pub use property::{ArrayProperty, Property, PropertyFlags, PropertyId, PropertyMeta};
pub use stack::{BindMode, EvalContext, LambdaBind, ValueSource};
