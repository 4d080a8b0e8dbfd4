//! Tree projection for tile layouts.

use std::sync::Arc;

use horizon_display_core::Property;
use horizon_display_core::logging::targets;

use crate::collection::{Collection, ItemChange, ItemProperty};
use crate::error::Result;
use crate::filter::FilterFn;
use crate::item::{DisplayItem, ItemRef, OwnerId};
use crate::options::DisplayOptions;
use crate::record::RecordSet;
use crate::strategy::{AddItemPlacement, InvisibleStrategy};
use crate::tree::{Tree, TreeParts};

/// Geometry shared by every item of a tile projection.
#[derive(Debug, Default)]
pub struct TileGeometry {
    nodes_height: Property<Option<f64>>,
    folder_width: Property<Option<f64>>,
}

impl TileGeometry {
    pub fn new(nodes_height: Option<f64>, folder_width: Option<f64>) -> Self {
        Self {
            nodes_height: Property::new(nodes_height),
            folder_width: Property::new(folder_width),
        }
    }

    pub fn nodes_height(&self) -> Option<f64> {
        self.nodes_height.get()
    }

    pub fn folder_width(&self) -> Option<f64> {
        self.folder_width.get()
    }
}

/// Tiles show only the top level of the current root, plus group headers.
pub fn is_tile_visible(item: &DisplayItem) -> bool {
    item.is_group() || item.parent().is_none_or(|parent| parent.is_root())
}

/// Tree projection for tile layouts.
///
/// Only the children of the current root are shown; navigating into a folder
/// is done with [`Tree::set_root`]. Node footers are not supported. Invisible
/// fillers follow the block of folders and the list end.
pub struct TreeTile {
    tree: Tree,
    geometry: Arc<TileGeometry>,
}

impl TreeTile {
    pub fn new(source: Arc<RecordSet>, options: DisplayOptions) -> Result<Self> {
        if options.node_footers {
            tracing::debug!(target: targets::TREE, "node footers are not shown in tiles");
        }
        let geometry = Arc::new(TileGeometry::new(options.nodes_height, options.folder_width));

        let owner = OwnerId::next();
        let mut parts = TreeParts::new(owner);
        parts.geometry = Some(geometry.clone());
        let tile_filter: FilterFn = Arc::new(|context| is_tile_visible(context.item));
        parts.filters.push(tile_filter);
        parts
            .tail_stages
            .push(Box::new(InvisibleStrategy::new(owner, options.invisible_fillers)));

        let tree = Tree::build(source, options, parts, false)?;
        Ok(Self { tree, geometry })
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn collection(&self) -> &Arc<Collection> {
        self.tree.collection()
    }

    pub fn geometry(&self) -> &TileGeometry {
        &self.geometry
    }

    pub fn nodes_height(&self) -> Option<f64> {
        self.geometry.nodes_height()
    }

    pub fn folder_width(&self) -> Option<f64> {
        self.geometry.folder_width()
    }

    /// Set the node height and push it to every item.
    pub fn set_nodes_height(&self, height: Option<f64>) -> bool {
        if !self.geometry.nodes_height.set(height) {
            return false;
        }
        self.broadcast(|item| item.set_nodes_height(height));
        true
    }

    /// Set the folder width and push it to every item.
    pub fn set_folder_width(&self, width: Option<f64>) -> bool {
        if !self.geometry.folder_width.set(width) {
            return false;
        }
        self.broadcast(|item| item.set_folder_width(width));
        true
    }

    fn broadcast(&self, apply: impl Fn(&ItemRef) -> bool) {
        let collection = self.collection();
        let mut items = collection.source_items();
        items.extend(collection.all_items().into_iter().filter(|item| !item.is_record()));
        for item in items.into_iter().filter(|item| apply(item)) {
            collection.signals().item_changed.emit(ItemChange {
                item,
                property: ItemProperty::Geometry,
            });
        }
        collection.next_version();
    }

    /// Show the "add tile" placeholder after the folders.
    pub fn show_adding_item(&self) {
        self.collection().show_adding_item(AddItemPlacement::AfterNodes);
    }

    pub fn hide_adding_item(&self) -> bool {
        self.collection().hide_adding_item()
    }

    /// Record-backed children of `parent`; fillers are never included.
    pub fn children_of(&self, parent: &ItemRef, with_filter: bool) -> Vec<ItemRef> {
        self.tree.children_of(parent, with_filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Expandable;
    use crate::record::Key;
    use serde_json::json;

    fn tile(options: DisplayOptions) -> TreeTile {
        let source = Arc::new(
            RecordSet::from_values(
                "id",
                vec![
                    json!({"id": 1, "parent": null, "node": true}),
                    json!({"id": 2, "parent": 1, "node": null}),
                    json!({"id": 3, "parent": null, "node": null}),
                ],
            )
            .unwrap(),
        );
        TreeTile::new(source, options).unwrap()
    }

    fn options() -> DisplayOptions {
        DisplayOptions::new("id")
            .with_parent_property("parent")
            .with_node_property("node")
            .with_invisible_fillers(1)
    }

    fn labels(tile: &TreeTile) -> Vec<String> {
        tile.collection()
            .items()
            .iter()
            .map(|item| match item.key() {
                Some(key) => key.to_string(),
                None if item.is_invisible() => "invisible".to_string(),
                None if item.is_add_item() => "add".to_string(),
                None => "?".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_only_top_level_with_fillers() {
        let tile = tile(options().with_expanded_items([Key::Int(1)]).with_node_footers(true));
        assert_eq!(labels(&tile), ["1", "invisible", "3", "invisible"]);

        let root = tile.tree().root();
        assert_eq!(tile.children_of(&root, true).len(), 2);
    }

    #[test]
    fn test_adding_tile_goes_after_folders() {
        let tile = tile(options());
        tile.show_adding_item();
        assert_eq!(labels(&tile), ["1", "invisible", "add", "3", "invisible"]);
        assert!(tile.hide_adding_item());
        assert!(!tile.hide_adding_item());
        assert_eq!(labels(&tile), ["1", "invisible", "3", "invisible"]);
    }

    #[test]
    fn test_record_filters_keep_add_tile_and_fillers() {
        let tile = tile(options());
        tile.show_adding_item();
        tile.collection()
            .add_filter(|context| context.item.key() != Some(&Key::Int(1)));
        assert_eq!(labels(&tile), ["invisible", "add", "3", "invisible"]);
    }

    #[test]
    fn test_geometry_broadcast() {
        let tile = tile(options().with_nodes_height(100.0));
        let first = tile.collection().at(0);
        assert_eq!(first.nodes_height(), Some(100.0));

        let version = tile.collection().version();
        let item_version = first.version();
        assert!(tile.set_nodes_height(Some(150.0)));
        assert_eq!(first.nodes_height(), Some(150.0));
        assert!(first.version() > item_version);
        assert!(tile.collection().version() > version);

        let version = tile.collection().version();
        assert!(!tile.set_nodes_height(Some(150.0)));
        assert_eq!(tile.collection().version(), version);

        assert!(tile.set_folder_width(Some(42.0)));
        assert!(tile.collection().items().iter().all(|item| item.folder_width() == Some(42.0)));
    }

    #[test]
    fn test_navigate_into_folder() {
        let tile = tile(options());
        tile.tree().set_root(Some(Key::Int(1)));
        assert_eq!(labels(&tile), ["2", "invisible"]);
        assert!(!tile.collection().at(0).is_expanded());
    }
}
