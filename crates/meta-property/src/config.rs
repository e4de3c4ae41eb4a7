//! Configuration for property graphs.
//!
//! ```
//! use meta_property::{GraphBuilder, PropertyGraph};
//!
//! let graph: PropertyGraph = GraphBuilder::new()
//!     .max_evaluation_depth(32)
//!     .initial_capacity(128)
//!     .build();
//! assert_eq!(graph.config().max_evaluation_depth, 32);
//! ```

use crate::graph::PropertyGraph;

/// Default bound on nested evaluations.
const DEFAULT_MAX_EVALUATION_DEPTH: usize = 256;

/// Configuration for creating a [`PropertyGraph`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphConfig {
    /// How deep evaluations may nest. Propagation refreshes sources before
    /// their dependents, so long chains do not nest; only a read of a
    /// still-stale property does. Exceeding it fails the mutation with
    /// [`PropertyError::RecursiveCall`](crate::PropertyError::RecursiveCall).
    pub max_evaluation_depth: usize,
    /// Number of property slots to reserve up front.
    pub initial_capacity: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_evaluation_depth: DEFAULT_MAX_EVALUATION_DEPTH,
            initial_capacity: 0,
        }
    }
}

/// Builder for creating property graphs with custom configuration.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    config: GraphConfig,
}

impl GraphBuilder {
    /// Create a new GraphBuilder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bound on nested evaluations.
    pub fn max_evaluation_depth(mut self, depth: usize) -> Self {
        self.config.max_evaluation_depth = depth.max(1);
        self
    }

    /// Reserve slots for this many properties.
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.config.initial_capacity = capacity;
        self
    }

    /// Get the configuration without building a graph.
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Build the graph.
    pub fn build(self) -> PropertyGraph {
        PropertyGraph::with_config(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = GraphBuilder::new();
        assert_eq!(builder.config(), &GraphConfig::default());
        assert_eq!(
            builder.config().max_evaluation_depth,
            DEFAULT_MAX_EVALUATION_DEPTH
        );
    }

    #[test]
    fn test_zero_depth_is_clamped() {
        let builder = GraphBuilder::new().max_evaluation_depth(0);
        assert_eq!(builder.config().max_evaluation_depth, 1);
    }
}
