//! Value stack entries.
//!
//! A property resolves its value by walking its stack from the top down.
//! The first entry that produces a value wins; an entry may decline (an
//! expired bind, an out-of-range array item, a lambda returning `None`),
//! in which case the walk continues with the entry below it and finally
//! falls back to the property's default.

use std::fmt;
use std::sync::Arc;

use crate::any::{AnyType, AnyValue};
use crate::graph::PropertyGraph;
use crate::property::{Property, PropertyId};

/// Whether writes to a bound property travel back to the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindMode {
    /// The source drives the target. Writing the target breaks the bind.
    #[default]
    OneWay,
    /// Writing the target writes the source.
    TwoWay,
}

/// One entry of a property's value stack.
#[derive(Clone)]
pub enum ValueSource {
    /// A plain value.
    Direct(AnyValue),
    /// The resolved value of another property.
    Bind {
        /// The property read from.
        source: PropertyId,
        /// Whether writes are forwarded to `source`.
        mode: BindMode,
    },
    /// One element of an array property. Writes are forwarded to the array.
    ArrayItem {
        /// The array property.
        array: PropertyId,
        /// Element index.
        index: usize,
    },
    /// A computed value.
    Lambda(LambdaBind),
}

impl ValueSource {
    /// A direct value entry.
    pub fn value<T: AnyType>(value: T) -> Self {
        Self::Direct(value.into_any())
    }

    /// A one-way bind entry.
    pub fn bind<T>(source: &Property<T>) -> Self {
        Self::Bind {
            source: source.id(),
            mode: BindMode::OneWay,
        }
    }

    /// Whether this entry occupies the bind slot (everything but direct values).
    pub fn is_bind(&self) -> bool {
        !matches!(self, Self::Direct(_))
    }

    /// Properties this entry reads.
    pub(crate) fn sources(&self) -> Vec<PropertyId> {
        match self {
            Self::Direct(_) => Vec::new(),
            Self::Bind { source, .. } => vec![*source],
            Self::ArrayItem { array, .. } => vec![*array],
            Self::Lambda(lambda) => lambda.dependencies().to_vec(),
        }
    }
}

impl PartialEq for ValueSource {
    /// Lambdas compare by identity of their closure.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Direct(a), Self::Direct(b)) => a == b,
            (
                Self::Bind { source, mode },
                Self::Bind {
                    source: other_source,
                    mode: other_mode,
                },
            ) => source == other_source && mode == other_mode,
            (
                Self::ArrayItem { array, index },
                Self::ArrayItem {
                    array: other_array,
                    index: other_index,
                },
            ) => array == other_array && index == other_index,
            (Self::Lambda(a), Self::Lambda(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(&a.compute), Arc::as_ptr(&b.compute))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(value) => f.debug_tuple("Direct").field(value).finish(),
            Self::Bind { source, mode } => f
                .debug_struct("Bind")
                .field("source", source)
                .field("mode", mode)
                .finish(),
            Self::ArrayItem { array, index } => f
                .debug_struct("ArrayItem")
                .field("array", array)
                .field("index", index)
                .finish(),
            Self::Lambda(lambda) => f.debug_tuple("Lambda").field(lambda).finish(),
        }
    }
}

pub(crate) type LambdaFn =
    Arc<dyn Fn(&mut EvalContext<'_>) -> Option<AnyValue> + Send + Sync>;

/// A computed stack entry.
///
/// The closure reads other properties through an [`EvalContext`]. With an
/// explicit dependency list the entry re-evaluates when any listed property
/// changes. Without one, the properties it actually read during its last
/// evaluation become its dependencies, so a closure that reads nothing is
/// evaluated once and never again.
///
/// The closure runs exactly once per evaluation, the first one being when
/// the entry is installed.
///
/// # Example
///
/// ```
/// use meta_property::{LambdaBind, PropertyGraph};
///
/// let mut graph = PropertyGraph::new();
/// let a = graph.construct_property("a", 2_i32);
/// let b = graph.construct_property("b", 3_i32);
/// let sum = graph.construct_property("sum", 0_i32);
///
/// graph
///     .set_bind_lambda(&sum, LambdaBind::new(move |ctx| ctx.get(&a) + ctx.get(&b)))
///     .unwrap();
/// assert_eq!(graph.get_value(&sum).unwrap(), 5);
///
/// graph.set_value(&a, 10).unwrap();
/// assert_eq!(graph.get_value(&sum).unwrap(), 13);
/// ```
#[derive(Clone)]
pub struct LambdaBind {
    pub(crate) compute: LambdaFn,
    explicit: Option<Vec<PropertyId>>,
    discovered: Vec<PropertyId>,
}

impl LambdaBind {
    /// A lambda whose dependencies are discovered from what it reads.
    pub fn new<T, F>(compute: F) -> Self
    where
        T: AnyType,
        F: Fn(&mut EvalContext<'_>) -> T + Send + Sync + 'static,
    {
        Self::fallible(move |ctx| Some(compute(ctx)))
    }

    /// A lambda that may decline to produce a value.
    ///
    /// Returning `None` lets resolution fall through to the entry below.
    pub fn fallible<T, F>(compute: F) -> Self
    where
        T: AnyType,
        F: Fn(&mut EvalContext<'_>) -> Option<T> + Send + Sync + 'static,
    {
        Self {
            compute: Arc::new(move |ctx: &mut EvalContext<'_>| {
                compute(ctx).map(AnyType::into_any)
            }),
            explicit: None,
            discovered: Vec::new(),
        }
    }

    /// A lambda with an explicit dependency list.
    pub fn with_dependencies<T, F, I>(compute: F, dependencies: I) -> Self
    where
        T: AnyType,
        F: Fn(&mut EvalContext<'_>) -> T + Send + Sync + 'static,
        I: IntoIterator<Item = PropertyId>,
    {
        let mut lambda = Self::new(compute);
        lambda.explicit = Some(dependencies.into_iter().collect());
        lambda
    }

    /// Whether the dependency list was given explicitly.
    pub fn has_explicit_dependencies(&self) -> bool {
        self.explicit.is_some()
    }

    /// The properties this lambda re-evaluates on.
    pub fn dependencies(&self) -> &[PropertyId] {
        self.explicit.as_deref().unwrap_or(&self.discovered)
    }

    pub(crate) fn set_discovered(&mut self, reads: Vec<PropertyId>) {
        if self.explicit.is_none() {
            self.discovered = reads;
        }
    }
}

impl fmt::Debug for LambdaBind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LambdaBind")
            .field("explicit", &self.explicit.is_some())
            .field("dependencies", &self.dependencies())
            .finish()
    }
}

/// Read access to the graph while a lambda bind evaluates.
///
/// Every property read through the context is recorded, which is how a
/// lambda without an explicit dependency list learns what it depends on.
pub struct EvalContext<'a> {
    graph: &'a mut PropertyGraph,
    reads: Vec<PropertyId>,
}

impl<'a> EvalContext<'a> {
    pub(crate) fn new(graph: &'a mut PropertyGraph) -> Self {
        Self {
            graph,
            reads: Vec::new(),
        }
    }

    /// Read a property, or `None` if it is expired or holds an incompatible kind.
    pub fn try_get<T: AnyType>(&mut self, property: &Property<T>) -> Option<T> {
        self.read_any(property.id())?.get()
    }

    /// Read a property, falling back to `T::default()`.
    pub fn get<T: AnyType + Default>(&mut self, property: &Property<T>) -> T {
        self.try_get(property).unwrap_or_default()
    }

    /// Read a property's type-erased value.
    pub fn read_any(&mut self, id: PropertyId) -> Option<AnyValue> {
        if !self.reads.contains(&id) {
            self.reads.push(id);
        }
        self.graph.read_source(id)
    }

    pub(crate) fn into_reads(self) -> Vec<PropertyId> {
        self.reads
    }
}

impl fmt::Debug for EvalContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalContext")
            .field("reads", &self.reads)
            .finish()
    }
}
