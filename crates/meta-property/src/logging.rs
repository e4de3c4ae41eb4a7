//! Logging and debugging facilities.
//!
//! This module provides:
//! - The `tracing` targets the engine logs under
//! - Debug visualization of a property graph
//!
//! # Tracing Integration
//!
//! The engine uses the `tracing` crate for instrumentation. To see logs,
//! install a subscriber in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("meta_property::graph=trace")
//!     .init();
//! ```
//!
//! # Debug Visualization
//!
//! Use [`PropertyGraphDebug`] to print which properties feed which:
//!
//! ```
//! use meta_property::{PropertyGraph, PropertyGraphDebug};
//!
//! let mut graph = PropertyGraph::new();
//! let source = graph.construct_property("source", 1_i32);
//! let target = graph.construct_property("target", 0_i32);
//! graph.set_bind(&target, &source).unwrap();
//!
//! let tree = PropertyGraphDebug::new(&graph).format_all();
//! assert!(tree.contains("source"));
//! assert!(tree.contains("target"));
//! ```

use std::fmt::{self, Write as FmtWrite};

use crate::error::Result;
use crate::graph::PropertyGraph;
use crate::property::PropertyId;
use crate::stack::ValueSource;

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Evaluation, binds and stack mutations.
    pub const GRAPH: &str = "meta_property::graph";
    /// Change notification.
    pub const EVENT: &str = "meta_property::event";
    /// Array element edits.
    pub const ARRAY: &str = "meta_property::array";
}

/// Style options for graph visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
}

/// Configuration for graph debug output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// The style of tree visualization.
    pub style: TreeStyle,
    /// Whether to show property ids.
    pub show_ids: bool,
    /// Whether to show resolved values.
    pub show_values: bool,
    /// Whether to list each property's value stack and modifiers.
    pub show_stack: bool,
    /// Maximum depth to traverse (None for unlimited).
    pub max_depth: Option<usize>,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_ids: false,
            show_values: true,
            show_stack: false,
            max_depth: None,
        }
    }
}

impl TreeFormatOptions {
    /// Create options for detailed debugging output.
    pub fn detailed() -> Self {
        Self {
            show_ids: true,
            show_stack: true,
            ..Default::default()
        }
    }

    /// Create options for names only.
    pub fn minimal() -> Self {
        Self {
            show_values: false,
            ..Default::default()
        }
    }
}

/// Renders a property graph as a forest.
///
/// Properties that read nothing are roots; each property is listed under
/// every property it reads, so a diamond shows its bottom twice.
#[derive(Debug, Clone)]
pub struct PropertyGraphDebug<'a> {
    graph: &'a PropertyGraph,
    options: TreeFormatOptions,
}

impl<'a> PropertyGraphDebug<'a> {
    /// Create a visualizer with default options.
    pub fn new(graph: &'a PropertyGraph) -> Self {
        Self::with_options(graph, TreeFormatOptions::default())
    }

    /// Create a visualizer with custom options.
    pub fn with_options(graph: &'a PropertyGraph, options: TreeFormatOptions) -> Self {
        Self { graph, options }
    }

    /// Format every property, starting from those that read nothing.
    pub fn format_all(&self) -> String {
        let mut roots: Vec<(String, PropertyId)> = self
            .graph
            .property_ids()
            .filter_map(|id| {
                let data = self.graph.data(id).ok()?;
                data.dependencies.is_empty().then(|| (data.name.clone(), id))
            })
            .collect();
        roots.sort();

        let mut output = String::new();
        let _ = writeln!(output, "Property Graph ({} properties):", self.graph.len());
        if roots.is_empty() {
            output.push_str("  (empty)\n");
        }
        for (_, root) in roots {
            // Roots always exist; a failure here would mean a dangling edge.
            let _ = self.format_subtree_into(root, 0, true, &mut output);
        }
        output
    }

    /// Format one property and everything that reads it.
    pub fn format_subtree(&self, root: impl Into<PropertyId>) -> Result<String> {
        let mut output = String::new();
        self.format_subtree_into(root.into(), 0, true, &mut output)?;
        Ok(output)
    }

    fn format_subtree_into(
        &self,
        id: PropertyId,
        depth: usize,
        is_last: bool,
        output: &mut String,
    ) -> Result<()> {
        if self.options.max_depth.is_some_and(|max| depth > max) {
            return Ok(());
        }
        let data = self.graph.data(id)?;

        output.push_str(&self.build_prefix(depth, is_last));
        output.push_str(if data.name.is_empty() {
            "(unnamed)"
        } else {
            &data.name
        });
        let _ = write!(output, ": {}", data.kind);
        if self.options.show_ids {
            let _ = write!(output, " [{id:?}]");
        }
        if self.options.show_values {
            let _ = write!(output, " = {:?}", data.current);
        }
        output.push('\n');

        if self.options.show_stack {
            let indent = self.build_detail_prefix(depth);
            for entry in data.values.iter().rev() {
                let _ = writeln!(output, "{indent}  | {}", self.describe(entry));
            }
            for modifier in self.graph.modifier_chain(id) {
                let _ = writeln!(output, "{indent}  + {}", modifier.name());
            }
        }

        let count = data.dependents.len();
        for (index, dependent) in data.dependents.iter().enumerate() {
            self.format_subtree_into(*dependent, depth + 1, index + 1 == count, output)?;
        }
        Ok(())
    }

    fn describe(&self, entry: &ValueSource) -> String {
        let name_of = |id: PropertyId| {
            self.graph
                .data(id)
                .map_or_else(|_| String::from("(expired)"), |data| data.name.clone())
        };
        match entry {
            ValueSource::Direct(value) => format!("value {value:?}"),
            ValueSource::Bind { source, mode } => format!("bind {mode:?} {}", name_of(*source)),
            ValueSource::ArrayItem { array, index } => {
                format!("item {}[{index}]", name_of(*array))
            }
            ValueSource::Lambda(lambda) => {
                let dependencies: Vec<String> =
                    lambda.dependencies().iter().map(|id| name_of(*id)).collect();
                format!("lambda ({})", dependencies.join(", "))
            }
        }
    }

    /// Build the prefix string for a tree node.
    fn build_prefix(&self, depth: usize, is_last: bool) -> String {
        if depth == 0 {
            return String::new();
        }
        let (branch, tee, corner) = match self.options.style {
            TreeStyle::Ascii => ("|", "+--", "`--"),
            TreeStyle::Unicode => ("\u{2502}", "\u{251c}\u{2500}\u{2500}", "\u{2514}\u{2500}\u{2500}"),
        };
        let mut prefix = String::new();
        for _ in 0..depth - 1 {
            prefix.push_str(branch);
            prefix.push_str("   ");
        }
        prefix.push_str(if is_last { corner } else { tee });
        prefix.push(' ');
        prefix
    }

    fn build_detail_prefix(&self, depth: usize) -> String {
        let branch = match self.options.style {
            TreeStyle::Ascii => "|",
            TreeStyle::Unicode => "\u{2502}",
        };
        let mut prefix = String::new();
        for _ in 0..depth {
            prefix.push_str(branch);
            prefix.push_str("   ");
        }
        prefix
    }
}

impl fmt::Display for PropertyGraphDebug<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_all())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifier::RangeModifier;

    #[test]
    fn test_format_empty() {
        let graph = PropertyGraph::new();
        let output = PropertyGraphDebug::new(&graph).format_all();
        assert!(output.contains("0 properties"));
        assert!(output.contains("(empty)"));
    }

    #[test]
    fn test_format_chain() {
        let mut graph = PropertyGraph::new();
        let a = graph.construct_property("a", 1_i32);
        let b = graph.construct_property("b", 0_i32);
        let c = graph.construct_property("c", 0_i32);
        graph.set_bind(&b, &a).unwrap();
        graph.set_bind(&c, &b).unwrap();

        let options = TreeFormatOptions {
            style: TreeStyle::Ascii,
            ..TreeFormatOptions::minimal()
        };
        let output = PropertyGraphDebug::with_options(&graph, options).format_all();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[1], "a: i32");
        assert_eq!(lines[2], "`-- b: i32");
        assert_eq!(lines[3], "|   `-- c: i32");
    }

    #[test]
    fn test_format_stack_details() {
        let mut graph = PropertyGraph::new();
        let source = graph.construct_property("source", 2_i32);
        let target = graph.construct_property("target", 0_i32);
        graph.set_bind(&target, &source).unwrap();
        graph.add_modifier(&target, RangeModifier::new(0, 1)).unwrap();

        let output = PropertyGraphDebug::with_options(&graph, TreeFormatOptions::detailed())
            .format_subtree(&target)
            .unwrap();
        assert!(output.contains("target: i32"));
        assert!(output.contains("= 1_i32"));
        assert!(output.contains("bind OneWay source"));
        assert!(output.contains("+ range"));
    }

    #[test]
    fn test_max_depth() {
        let mut graph = PropertyGraph::new();
        let a = graph.construct_property("a", 1_i32);
        let b = graph.construct_property("b", 0_i32);
        graph.set_bind(&b, &a).unwrap();

        let options = TreeFormatOptions {
            max_depth: Some(0),
            ..TreeFormatOptions::minimal()
        };
        let output = PropertyGraphDebug::with_options(&graph, options)
            .format_subtree(&a)
            .unwrap();
        assert_eq!(output, "a: i32\n");
    }
}
