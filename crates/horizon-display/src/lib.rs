//! Horizon Display - indexed projections over record sets.
//!
//! A projection turns an ordered [`RecordSet`] into the rows a list, tree or
//! tile view renders: it wraps each record in a [`DisplayItem`], inserts
//! synthetic rows (group headers, node footers, "add" placeholders, fillers),
//! applies filters and sorting, and keeps two-way index mappings between
//! display positions and source positions. Every source mutation is re-emitted
//! in display terms.
//!
//! Three projections are provided:
//!
//! - [`Collection`]: flat list, optionally grouped
//! - [`Tree`]: hierarchy from a parent field, with expansion and node footers
//! - [`TreeTile`]: one level of a hierarchy laid out as tiles
//!
//! State that lives on top of a projection is handled by the
//! [`controller`] module (marker, multi-selection, scroll triggers).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_display::{DisplayOptions, Key, RecordSet, Tree};
//! use serde_json::json;
//!
//! let source = Arc::new(RecordSet::from_values("id", vec![
//!     json!({"id": 1, "parent": null, "node": true}),
//!     json!({"id": 2, "parent": 1, "node": null}),
//!     json!({"id": 3, "parent": null, "node": null}),
//! ]).unwrap());
//!
//! let options = DisplayOptions::new("id")
//!     .with_parent_property("parent")
//!     .with_node_property("node");
//! let tree = Tree::new(source, options).unwrap();
//! assert_eq!(tree.collection().count(), 2);
//!
//! tree.set_expanded(&Key::Int(1), true);
//! assert_eq!(tree.collection().count(), 3);
//! ```

pub mod collection;
pub mod controller;
pub mod error;
pub mod filter;
pub mod item;
pub mod options;
pub mod prelude;
pub mod record;
pub mod strategy;
pub mod tile;
pub mod tree;

pub use collection::{
    Collection, CollectionSignals, DragCommit, DragPosition, DropPosition, ItemChange, ItemProperty,
    ProjectionChange,
};
pub use controller::{MarkerController, MarkerVisibility, ObserversController, Selection, SelectionController};
pub use error::{DisplayError, Result};
pub use filter::{FilterContext, FilterFn, FilterId, SortEntry, SortFn, SortId};
pub use item::{DisplayItem, Draggable, Expandable, GroupId, ItemId, ItemKind, ItemRef, Markable, OwnerId, Selectable};
pub use options::DisplayOptions;
pub use record::{ChangeAction, Key, Record, RecordRef, RecordSet, SourceChange};
pub use strategy::{IndexedView, ItemsStrategy, StrategyKind};
pub use tile::{TileGeometry, TreeTile};
pub use tree::{ExpansionChange, Tree, TreeSignals};

#[doc(hidden)]
pub use horizon_display_core as core;
