//! Projection configuration.
//!
//! [`DisplayOptions`] can be built in code with the `with_*` methods or
//! loaded from TOML:
//!
//! ```
//! use horizon_display::DisplayOptions;
//!
//! let options = DisplayOptions::from_toml_str(r#"
//!     key_property = "id"
//!     parent_property = "parent"
//!     node_property = "node"
//!     expanded_items = [1, 4]
//! "#).unwrap();
//! assert_eq!(options.expanded_items.len(), 2);
//! ```

use std::path::Path;

use horizon_display_core::logging::targets;
use serde::{Deserialize, Serialize};

use crate::controller::MarkerVisibility;
use crate::error::{DisplayError, Result};
use crate::record::Key;
use crate::strategy::DEFAULT_FILLER_COUNT;

/// Options shared by every projection type.
///
/// Options a projection type does not use are ignored by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayOptions {
    /// Field holding each record's key. Required.
    pub key_property: Option<String>,
    /// Field holding the parent key. Required for trees.
    pub parent_property: Option<String>,
    /// Field holding the node flag (`true` node, `false` hidden node, `null` leaf).
    pub node_property: Option<String>,
    /// Key of the record acting as root; `None` for the top level.
    pub root: Option<Key>,
    /// Keys expanded at construction.
    pub expanded_items: Vec<Key>,
    /// Keys kept collapsed while `expand_all` is set.
    pub collapsed_items: Vec<Key>,
    /// Expand every item.
    pub expand_all: bool,
    /// Field whose value groups the records.
    pub group_property: Option<String>,
    /// Passed through to consumers untouched.
    pub row_separator_size: Option<String>,
    /// Close every expanded node with a footer row.
    pub node_footers: bool,
    /// Tile height of nodes.
    pub nodes_height: Option<f64>,
    /// Tile width of folders.
    pub folder_width: Option<f64>,
    /// Filler items per tile block.
    pub invisible_fillers: usize,
    /// When the marker shows.
    pub marker_visibility: MarkerVisibility,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            key_property: None,
            parent_property: None,
            node_property: None,
            root: None,
            expanded_items: Vec::new(),
            collapsed_items: Vec::new(),
            expand_all: false,
            group_property: None,
            row_separator_size: None,
            node_footers: false,
            nodes_height: None,
            folder_width: None,
            invisible_fillers: DEFAULT_FILLER_COUNT,
            marker_visibility: MarkerVisibility::default(),
        }
    }
}

impl DisplayOptions {
    /// Options with the given key field.
    pub fn new(key_property: impl Into<String>) -> Self {
        Self {
            key_property: Some(key_property.into()),
            ..Self::default()
        }
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Parse options from a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Read options from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|err| DisplayError::io(path, err))?;
        tracing::debug!(target: targets::DISPLAY, path = %path.display(), "loading display options");
        Self::from_toml_str(&source)
    }

    /// Render the options as a TOML document.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Check the options needed by every projection.
    pub fn validate(&self) -> Result<()> {
        self.key_property()?;
        if self.parent_property.as_deref() == Some("") {
            return Err(DisplayError::invalid_option("parent_property", "must not be empty"));
        }
        if self.group_property.as_deref() == Some("") {
            return Err(DisplayError::invalid_option("group_property", "must not be empty"));
        }
        for (option, value) in [("nodes_height", self.nodes_height), ("folder_width", self.folder_width)] {
            if value.is_some_and(|value| !value.is_finite() || value < 0.0) {
                return Err(DisplayError::invalid_option(option, "must be a finite, non-negative number"));
            }
        }
        Ok(())
    }

    pub(crate) fn key_property(&self) -> Result<&str> {
        match self.key_property.as_deref() {
            None => Err(DisplayError::missing_option("key_property")),
            Some("") => Err(DisplayError::invalid_option("key_property", "must not be empty")),
            Some(key_property) => Ok(key_property),
        }
    }

    pub(crate) fn parent_property(&self) -> Result<&str> {
        self.parent_property
            .as_deref()
            .ok_or_else(|| DisplayError::missing_option("parent_property"))
    }

    // =========================================================================
    // Builders
    // =========================================================================

    pub fn with_parent_property(mut self, parent_property: impl Into<String>) -> Self {
        self.parent_property = Some(parent_property.into());
        self
    }

    pub fn with_node_property(mut self, node_property: impl Into<String>) -> Self {
        self.node_property = Some(node_property.into());
        self
    }

    pub fn with_root(mut self, root: impl Into<Key>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_expanded_items(mut self, keys: impl IntoIterator<Item = Key>) -> Self {
        self.expanded_items = keys.into_iter().collect();
        self
    }

    pub fn with_collapsed_items(mut self, keys: impl IntoIterator<Item = Key>) -> Self {
        self.collapsed_items = keys.into_iter().collect();
        self
    }

    pub fn with_expand_all(mut self, expand_all: bool) -> Self {
        self.expand_all = expand_all;
        self
    }

    pub fn with_group_property(mut self, group_property: impl Into<String>) -> Self {
        self.group_property = Some(group_property.into());
        self
    }

    pub fn with_node_footers(mut self, node_footers: bool) -> Self {
        self.node_footers = node_footers;
        self
    }

    pub fn with_nodes_height(mut self, height: f64) -> Self {
        self.nodes_height = Some(height);
        self
    }

    pub fn with_folder_width(mut self, width: f64) -> Self {
        self.folder_width = Some(width);
        self
    }

    pub fn with_invisible_fillers(mut self, count: usize) -> Self {
        self.invisible_fillers = count;
        self
    }

    pub fn with_marker_visibility(mut self, visibility: MarkerVisibility) -> Self {
        self.marker_visibility = visibility;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = DisplayOptions::default();
        assert_eq!(options.invisible_fillers, DEFAULT_FILLER_COUNT);
        assert_eq!(options.marker_visibility, MarkerVisibility::OnActivated);
        assert!(matches!(options.validate(), Err(DisplayError::MissingOption { option: "key_property" })));
    }

    #[test]
    fn test_from_toml() {
        let options = DisplayOptions::from_toml_str(
            r#"
            key_property = "id"
            parent_property = "parent"
            root = "top"
            expanded_items = [1, "a"]
            marker_visibility = "visible"
            nodes_height = 120.0
            "#,
        )
        .unwrap();

        assert_eq!(options.key_property.as_deref(), Some("id"));
        assert_eq!(options.root, Some(Key::from("top")));
        assert_eq!(options.expanded_items, [Key::Int(1), Key::from("a")]);
        assert_eq!(options.marker_visibility, MarkerVisibility::Visible);
        assert_eq!(options.nodes_height, Some(120.0));
        assert_eq!(options.invisible_fillers, DEFAULT_FILLER_COUNT);
        options.validate().unwrap();
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            DisplayOptions::from_toml_str("key_property = ["),
            Err(DisplayError::Toml(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let options = DisplayOptions::new("").with_parent_property("parent");
        assert!(matches!(options.validate(), Err(DisplayError::InvalidOption { option: "key_property", .. })));

        let options = DisplayOptions::new("id").with_nodes_height(-1.0);
        assert!(matches!(options.validate(), Err(DisplayError::InvalidOption { option: "nodes_height", .. })));
    }

    #[test]
    fn test_toml_round_trip() {
        let options = DisplayOptions::new("id")
            .with_parent_property("parent")
            .with_expanded_items([Key::Int(1)])
            .with_node_footers(true);
        let text = options.to_toml_string().unwrap();
        assert_eq!(DisplayOptions::from_toml_str(&text).unwrap(), options);
    }

    #[test]
    fn test_load_missing_file() {
        let result = DisplayOptions::load("/nonexistent/display.toml");
        assert!(matches!(result, Err(DisplayError::Io { .. })));
    }
}
