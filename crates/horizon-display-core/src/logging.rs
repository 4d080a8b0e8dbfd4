//! Logging and debugging facilities for Horizon Display.
//!
//! This module provides:
//! - Target names for filtering the `tracing` output of each subsystem
//! - Wrapper macros that log under the display target
//! - A tree formatter for dumping a projection's rows
//! - Performance spans for recompute passes
//!
//! # Tracing Integration
//!
//! Nothing is printed unless the application installs a subscriber:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("horizon_display::tree=debug")
//!     .init();
//! ```
//!
//! # Debug Visualization
//!
//! ```
//! use horizon_display_core::logging::{DebugRow, ProjectionDebug, TreeFormatOptions};
//!
//! let rows = vec![
//!     DebugRow::new("1", 0).with_tag("expanded"),
//!     DebugRow::new("2", 1),
//!     DebugRow::new("3", 0),
//! ];
//! let text = ProjectionDebug::with_options(TreeFormatOptions::minimal()).format_rows("Tree", &rows);
//! assert!(text.contains("Tree (3 rows)"));
//! ```

use std::fmt::Write as FmtWrite;

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Projection (collection) target.
    pub const DISPLAY: &str = "horizon_display";
    /// Strategy chain target.
    pub const STRATEGY: &str = "horizon_display::strategy";
    /// Tree projection target.
    pub const TREE: &str = "horizon_display::tree";
    /// Selection, marker and observers controllers.
    pub const CONTROLLER: &str = "horizon_display::controller";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "horizon_display_core::signal";
    /// Performance spans.
    pub const PERF: &str = "horizon_display::perf";
}

/// Style options for tree visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
    /// Compact single-line representation.
    Compact,
}

/// Configuration for debug output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// The style of tree visualization.
    pub style: TreeStyle,
    /// Whether to show row indices.
    pub show_indices: bool,
    /// Whether to show row tags (flags such as `marked`, `expanded`).
    pub show_tags: bool,
    /// Maximum depth to print (None for unlimited).
    pub max_depth: Option<usize>,
    /// Indent size for each level.
    pub indent_size: usize,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_indices: true,
            show_tags: true,
            max_depth: None,
            indent_size: 2,
        }
    }
}

impl TreeFormatOptions {
    /// Options for minimal output: labels and branches only.
    pub fn minimal() -> Self {
        Self {
            show_indices: false,
            show_tags: false,
            ..Default::default()
        }
    }
}

/// One row of a projection as seen by [`ProjectionDebug`].
#[derive(Debug, Clone, PartialEq)]
pub struct DebugRow {
    /// Text shown for the row.
    pub label: String,
    /// Nesting depth (0 for top-level rows).
    pub depth: usize,
    /// Short flags appended after the label.
    pub tags: Vec<&'static str>,
}

impl DebugRow {
    /// Create a row without tags.
    pub fn new(label: impl Into<String>, depth: usize) -> Self {
        Self {
            label: label.into(),
            depth,
            tags: Vec::new(),
        }
    }

    /// Append a tag to the row.
    pub fn with_tag(mut self, tag: &'static str) -> Self {
        self.tags.push(tag);
        self
    }
}

/// Debug utility that renders projection rows as an indented tree.
#[derive(Debug, Clone, Default)]
pub struct ProjectionDebug {
    options: TreeFormatOptions,
}

impl ProjectionDebug {
    /// Create a formatter with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a formatter with custom options.
    pub fn with_options(options: TreeFormatOptions) -> Self {
        Self { options }
    }

    /// Format `rows` under a `title` header line.
    pub fn format_rows(&self, title: &str, rows: &[DebugRow]) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "{} ({} rows):", title, rows.len());

        if rows.is_empty() {
            output.push_str("  (empty)\n");
            return output;
        }

        for (index, row) in rows.iter().enumerate() {
            if self.options.max_depth.is_some_and(|max| row.depth > max) {
                continue;
            }

            output.push_str(&self.build_prefix(row.depth, is_last_sibling(rows, index)));
            output.push_str(&row.label);

            if self.options.show_indices {
                let _ = write!(output, " [{}]", index);
            }
            if self.options.show_tags && !row.tags.is_empty() {
                let _ = write!(output, " ({})", row.tags.join(", "));
            }
            output.push('\n');
        }

        output
    }

    fn build_prefix(&self, depth: usize, is_last: bool) -> String {
        if depth == 0 {
            return String::new();
        }

        let (branch, corner, last) = match self.options.style {
            TreeStyle::Ascii => ("|", "+--", "`--"),
            TreeStyle::Unicode => ("\u{2502}", "\u{251c}\u{2500}\u{2500}", "\u{2514}\u{2500}\u{2500}"),
            TreeStyle::Compact => ("", "-", "-"),
        };

        let mut prefix = String::new();
        for _ in 0..(depth - 1) {
            prefix.push_str(branch);
            prefix.extend(std::iter::repeat_n(' ', self.options.indent_size));
        }
        prefix.push_str(if is_last { last } else { corner });
        prefix.push(' ');
        prefix
    }
}

/// A row is the last of its siblings when no later row at the same depth
/// appears before the list climbs above it.
fn is_last_sibling(rows: &[DebugRow], index: usize) -> bool {
    let depth = rows[index].depth;
    for row in &rows[index + 1..] {
        if row.depth < depth {
            return true;
        }
        if row.depth == depth {
            return false;
        }
    }
    true
}

/// A guard that keeps a tracing span entered until dropped.
///
/// Recompute passes wrap themselves in one so their cost shows up in traces.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Enter a new performance span named after `operation`.
    pub fn new(operation: &'static str) -> Self {
        let span = tracing::debug_span!(target: "horizon_display::perf", "perf", operation);
        Self {
            span: span.entered(),
        }
    }
}

/// Macros for common tracing patterns.
///
/// Thin wrappers around the `tracing` macros that log under the display target.
#[macro_export]
macro_rules! display_trace {
    ($($arg:tt)*) => {
        $crate::tracing::trace!(target: "horizon_display", $($arg)*)
    };
}

#[macro_export]
macro_rules! display_debug {
    ($($arg:tt)*) => {
        $crate::tracing::debug!(target: "horizon_display", $($arg)*)
    };
}

#[macro_export]
macro_rules! display_warn {
    ($($arg:tt)*) => {
        $crate::tracing::warn!(target: "horizon_display", $($arg)*)
    };
}

#[macro_export]
macro_rules! display_error {
    ($($arg:tt)*) => {
        $crate::tracing::error!(target: "horizon_display", $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<DebugRow> {
        vec![
            DebugRow::new("folder", 0).with_tag("expanded"),
            DebugRow::new("a", 1),
            DebugRow::new("b", 1).with_tag("marked"),
            DebugRow::new("leaf", 0),
        ]
    }

    #[test]
    fn test_format_empty() {
        let output = ProjectionDebug::new().format_rows("List", &[]);
        assert!(output.contains("List (0 rows)"));
        assert!(output.contains("(empty)"));
    }

    #[test]
    fn test_format_hierarchy() {
        let output = ProjectionDebug::new().format_rows("Tree", &sample());
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines[1], "folder [0] (expanded)");
        assert!(lines[2].starts_with("\u{251c}"));
        assert!(lines[3].starts_with("\u{2514}"));
        assert!(lines[3].ends_with("(marked)"));
        assert_eq!(lines[4], "leaf [3]");
    }

    #[test]
    fn test_format_minimal_ascii() {
        let options = TreeFormatOptions {
            style: TreeStyle::Ascii,
            ..TreeFormatOptions::minimal()
        };
        let output = ProjectionDebug::with_options(options).format_rows("Tree", &sample());

        assert!(output.contains("+-- a\n"));
        assert!(output.contains("`-- b\n"));
        assert!(!output.contains('['));
    }

    #[test]
    fn test_max_depth_skips_nested_rows() {
        let options = TreeFormatOptions {
            max_depth: Some(0),
            ..TreeFormatOptions::minimal()
        };
        let output = ProjectionDebug::with_options(options).format_rows("Tree", &sample());
        assert!(!output.contains(" a"));
        assert!(output.contains("leaf"));
    }

    #[test]
    fn test_perf_span() {
        let _span = PerfSpan::new("test_operation");
    }
}
