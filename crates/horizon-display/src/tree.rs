//! Hierarchical projection.
//!
//! A [`Tree`] linearizes records depth-first by their parent field and hides
//! every item whose ancestors are not all expanded. Expansion is tracked per
//! key in an [`ExpansionState`] so that records added later come up with the
//! right state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use horizon_display_core::Signal;
use horizon_display_core::logging::targets;
use parking_lot::{Mutex, RwLock};

use crate::collection::{Blueprint, Collection, ItemProperty};
use crate::error::{DisplayError, Result};
use crate::filter::FilterFn;
use crate::item::{DisplayItem, Expandable, ItemId, ItemKind, ItemRef, OwnerId};
use crate::options::DisplayOptions;
use crate::record::{Key, RecordSet};
use crate::strategy::{AdjacencyListStrategy, ItemsStrategy, NodeFooterStrategy};
use crate::tile::TileGeometry;

/// Which keys are expanded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionState {
    /// Every key is expanded except those in `collapsed`.
    pub expand_all: bool,
    pub expanded: HashSet<Key>,
    pub collapsed: HashSet<Key>,
}

impl ExpansionState {
    pub fn from_options(options: &DisplayOptions) -> Self {
        Self {
            expand_all: options.expand_all,
            expanded: options.expanded_items.iter().cloned().collect(),
            collapsed: options.collapsed_items.iter().cloned().collect(),
        }
    }

    pub fn is_expanded(&self, key: &Key) -> bool {
        if self.expand_all {
            !self.collapsed.contains(key)
        } else {
            self.expanded.contains(key) && !self.collapsed.contains(key)
        }
    }
}

/// Keys whose expansion flag flipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionChange {
    pub expanded: Vec<Key>,
    pub collapsed: Vec<Key>,
}

impl ExpansionChange {
    pub fn is_empty(&self) -> bool {
        self.expanded.is_empty() && self.collapsed.is_empty()
    }
}

/// Signals emitted by a tree.
pub struct TreeSignals {
    pub expanded_changed: Signal<ExpansionChange>,
}

/// Pieces a tile projection adds to a tree.
pub(crate) struct TreeParts {
    pub(crate) owner: OwnerId,
    pub(crate) geometry: Option<Arc<TileGeometry>>,
    pub(crate) filters: Vec<FilterFn>,
    pub(crate) tail_stages: Vec<Box<dyn ItemsStrategy>>,
}

impl TreeParts {
    pub(crate) fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            geometry: None,
            filters: Vec::new(),
            tail_stages: Vec::new(),
        }
    }
}

struct ChildrenCache {
    version: u64,
    entries: HashMap<(ItemId, bool), Vec<ItemRef>>,
}

/// An item is visible when it is a group header or every ancestor is expanded.
///
/// The chain is walked on every call.
pub fn is_visible(item: &DisplayItem) -> bool {
    if item.is_group() {
        return true;
    }
    let mut current = item.parent();
    while let Some(parent) = current {
        if !parent.is_expanded() {
            return false;
        }
        current = parent.parent();
    }
    true
}

/// Tree projection over a record set.
pub struct Tree {
    collection: Arc<Collection>,
    root: RwLock<ItemRef>,
    expansion: Arc<RwLock<ExpansionState>>,
    children: Mutex<ChildrenCache>,
    signals: TreeSignals,
}

impl Tree {
    /// Create a tree over `source`.
    ///
    /// Fails when `parent_property` is missing or a record is its own
    /// ancestor.
    pub fn new(source: Arc<RecordSet>, options: DisplayOptions) -> Result<Self> {
        let node_footers = options.node_footers;
        Self::build(source, options, TreeParts::new(OwnerId::next()), node_footers)
    }

    pub(crate) fn build(
        source: Arc<RecordSet>,
        options: DisplayOptions,
        parts: TreeParts,
        node_footers: bool,
    ) -> Result<Self> {
        options.validate()?;
        let parent_property = options.parent_property()?.to_string();
        check_parent_cycles(&source, options.key_property()?, &parent_property)?;

        let owner = parts.owner;
        let root = Arc::new(DisplayItem::synthetic(owner, ItemKind::Root(options.root.clone())));
        let expansion = Arc::new(RwLock::new(ExpansionState::from_options(&options)));

        let mut blueprint = Blueprint::new(owner);
        blueprint.expansion = Some(expansion.clone());
        blueprint.geometry = parts.geometry;
        blueprint
            .stages
            .push(Box::new(AdjacencyListStrategy::new(root.clone(), parent_property)));
        if node_footers {
            blueprint.stages.push(Box::new(NodeFooterStrategy::new(owner)));
        }
        blueprint.tail_stages = parts.tail_stages;
        let visibility: FilterFn = Arc::new(|context| is_visible(context.item));
        blueprint.filters.push(visibility);
        blueprint.filters.extend(parts.filters);

        let collection = Collection::build(source, options, blueprint)?;
        tracing::debug!(target: targets::TREE, root = ?root.kind(), "tree created");

        Ok(Self {
            collection,
            root: RwLock::new(root),
            expansion,
            children: Mutex::new(ChildrenCache {
                version: u64::MAX,
                entries: HashMap::new(),
            }),
            signals: TreeSignals {
                expanded_changed: Signal::new(),
            },
        })
    }

    pub fn collection(&self) -> &Arc<Collection> {
        &self.collection
    }

    pub fn signals(&self) -> &TreeSignals {
        &self.signals
    }

    // =========================================================================
    // Root
    // =========================================================================

    pub fn root(&self) -> ItemRef {
        self.root.read().clone()
    }

    pub fn root_key(&self) -> Option<Key> {
        match self.root.read().kind() {
            ItemKind::Root(key) => key.clone(),
            _ => None,
        }
    }

    /// Show the subtree below the record with `key` (`None` for the top level).
    pub fn set_root(&self, key: Option<Key>) -> bool {
        if self.root_key() == key {
            return false;
        }
        let root = Arc::new(DisplayItem::synthetic(self.collection.owner(), ItemKind::Root(key)));
        self.collection.with_pipeline(|pipeline| {
            if let Some(stage) = pipeline.composer.stage_mut::<AdjacencyListStrategy>() {
                stage.set_root(root.clone());
            }
            pipeline.registry.invalidate();
        });
        tracing::debug!(target: targets::TREE, root = ?root.kind(), "root changed");
        *self.root.write() = root;
        self.collection.next_version();
        true
    }

    // =========================================================================
    // Expansion
    // =========================================================================

    pub fn is_expanded(&self, key: &Key) -> bool {
        self.expansion.read().is_expanded(key)
    }

    pub fn is_expand_all(&self) -> bool {
        self.expansion.read().expand_all
    }

    /// Keys of the items currently expanded, in source order.
    pub fn expanded_items(&self) -> Vec<Key> {
        self.collection
            .source_items()
            .iter()
            .filter(|item| item.is_expanded())
            .filter_map(|item| item.key().cloned())
            .collect()
    }

    /// Keys excluded from expand-all.
    pub fn collapsed_items(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self.expansion.read().collapsed.iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Replace the set of expanded keys.
    pub fn set_expanded_items(&self, keys: impl IntoIterator<Item = Key>) -> ExpansionChange {
        let keys: HashSet<Key> = keys.into_iter().collect();
        self.update_expansion(move |state| {
            state.expand_all = false;
            state.expanded = keys;
            state.collapsed.clear();
        })
    }

    /// Expand every item.
    pub fn expand_all(&self) -> ExpansionChange {
        self.update_expansion(|state| {
            state.expand_all = true;
            state.collapsed.clear();
        })
    }

    /// Keep `keys` collapsed.
    pub fn set_collapsed_items(&self, keys: impl IntoIterator<Item = Key>) -> ExpansionChange {
        let keys: HashSet<Key> = keys.into_iter().collect();
        self.update_expansion(move |state| {
            state.expanded.retain(|key| !keys.contains(key));
            state.collapsed = keys;
        })
    }

    /// Expand or collapse a single key.
    pub fn set_expanded(&self, key: &Key, expanded: bool) -> ExpansionChange {
        self.update_expansion(|state| {
            if expanded {
                state.collapsed.remove(key);
                if !state.expand_all {
                    state.expanded.insert(key.clone());
                }
            } else {
                state.expanded.remove(key);
                if state.expand_all {
                    state.collapsed.insert(key.clone());
                }
            }
        })
    }

    /// Flip the expansion of `key`; returns the new state.
    pub fn toggle_expanded(&self, key: &Key) -> bool {
        let expanded = !self.is_expanded(key);
        self.set_expanded(key, expanded);
        expanded
    }

    fn update_expansion(&self, update: impl FnOnce(&mut ExpansionState)) -> ExpansionChange {
        let state = {
            let mut state = self.expansion.write();
            update(&mut state);
            state.clone()
        };

        let mut change = ExpansionChange::default();
        let mut changed = Vec::new();
        for item in self.collection.source_items() {
            let Some(key) = item.key().cloned() else { continue };
            let expanded = state.is_expanded(&key);
            if item.set_expanded(expanded) {
                if expanded {
                    change.expanded.push(key);
                } else {
                    change.collapsed.push(key);
                }
                changed.push(item);
            }
        }

        self.collection.with_pipeline(|pipeline| pipeline.registry.invalidate());
        self.collection.finish_item_changes(changed, ItemProperty::Expanded);

        if !change.is_empty() {
            tracing::debug!(
                target: targets::TREE,
                expanded = change.expanded.len(),
                collapsed = change.collapsed.len(),
                "expansion changed"
            );
            self.signals.expanded_changed.emit(change.clone());
        }
        change
    }

    // =========================================================================
    // Hierarchy queries
    // =========================================================================

    /// Record-backed children of `parent` in display order.
    ///
    /// With `with_filter` only visible children are returned. Results are
    /// cached per parent until the projection changes.
    pub fn children_of(&self, parent: &ItemRef, with_filter: bool) -> Vec<ItemRef> {
        let version = self.collection.version();
        {
            let mut cache = self.children.lock();
            if cache.version != version {
                cache.entries.clear();
                cache.version = version;
            }
            if let Some(children) = cache.entries.get(&(parent.id(), with_filter)) {
                return children.clone();
            }
        }

        let items = if with_filter {
            self.collection.items()
        } else {
            self.collection.all_items()
        };
        let children: Vec<ItemRef> = items
            .into_iter()
            .filter(|item| item.is_record() && item.parent().is_some_and(|candidate| Arc::ptr_eq(&candidate, parent)))
            .collect();

        let mut cache = self.children.lock();
        if cache.version == version {
            cache.entries.insert((parent.id(), with_filter), children.clone());
        }
        children
    }

    pub fn has_children(&self, item: &ItemRef) -> bool {
        !self.children_of(item, false).is_empty()
    }

    /// Parent item, `None` for top-level items.
    pub fn parent_of(&self, item: &ItemRef) -> Option<ItemRef> {
        item.parent().filter(|parent| !parent.is_root())
    }

    /// Whether `item` is the last data row, ignoring trailing footers and
    /// fillers.
    pub fn is_last_item(&self, item: &ItemRef) -> bool {
        self.collection
            .items()
            .iter()
            .rev()
            .find(|candidate| !candidate.is_node_footer() && !candidate.is_invisible())
            .is_some_and(|last| Arc::ptr_eq(last, item))
    }
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("collection", &self.collection)
            .field("root", &self.root_key())
            .finish_non_exhaustive()
    }
}

/// Reject record sets where a record is its own ancestor.
fn check_parent_cycles(source: &RecordSet, key_property: &str, parent_property: &str) -> Result<()> {
    let mut parents: HashMap<Key, Option<Key>> = HashMap::new();
    for record in source.records() {
        if let Some(key) = record.key(key_property) {
            let parent = record.get(parent_property).and_then(|value| Key::from_value(&value));
            parents.insert(key, parent);
        }
    }

    for key in parents.keys() {
        let mut seen = HashSet::new();
        let mut current = key;
        while let Some(Some(parent)) = parents.get(current) {
            if parent == key {
                tracing::error!(target: targets::TREE, %key, "record is its own ancestor");
                return Err(DisplayError::ParentCycle { key: key.clone() });
            }
            if !seen.insert(parent) {
                break;
            }
            current = parent;
        }
    }
    Ok(())
}

static_assertions::assert_impl_all!(Tree: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    fn keys(tree: &Tree) -> Vec<String> {
        tree.collection()
            .items()
            .iter()
            .map(|item| match item.key() {
                Some(key) => key.to_string(),
                None if item.is_node_footer() => "footer".to_string(),
                None => "?".to_string(),
            })
            .collect()
    }

    fn source() -> Arc<RecordSet> {
        Arc::new(
            RecordSet::from_values(
                "id",
                vec![
                    json!({"id": 1, "parent": null, "node": true}),
                    json!({"id": 2, "parent": 1, "node": true}),
                    json!({"id": 3, "parent": 2, "node": null}),
                    json!({"id": 4, "parent": null, "node": null}),
                ],
            )
            .unwrap(),
        )
    }

    fn options() -> DisplayOptions {
        DisplayOptions::new("id")
            .with_parent_property("parent")
            .with_node_property("node")
    }

    #[test]
    fn test_collapsed_by_default() {
        let tree = Tree::new(source(), options()).unwrap();
        assert_eq!(keys(&tree), ["1", "4"]);
        assert!(tree.expanded_items().is_empty());
    }

    #[test]
    fn test_initial_expansion() {
        let tree = Tree::new(source(), options().with_expanded_items([Key::Int(1), Key::Int(2)])).unwrap();
        assert_eq!(keys(&tree), ["1", "2", "3", "4"]);
        assert_eq!(tree.collection().at(2).level(), 3);
    }

    #[test]
    fn test_hidden_descendants_of_collapsed_ancestor() {
        let tree = Tree::new(source(), options().with_expanded_items([Key::Int(2)])).unwrap();
        assert_eq!(keys(&tree), ["1", "4"]);
        tree.set_expanded(&Key::Int(1), true);
        assert_eq!(keys(&tree), ["1", "2", "3", "4"]);
    }

    #[test]
    fn test_set_expanded_items_reports_delta() {
        let tree = Tree::new(source(), options().with_expanded_items([Key::Int(1)])).unwrap();
        let events = Arc::new(StdMutex::new(Vec::new()));
        let events_clone = events.clone();
        tree.signals().expanded_changed.connect(move |change| {
            events_clone.lock().unwrap().push(change.clone());
        });

        let version = tree.collection().version();
        let change = tree.set_expanded_items([Key::Int(2)]);
        assert_eq!(change.expanded, [Key::Int(2)]);
        assert_eq!(change.collapsed, [Key::Int(1)]);
        assert!(tree.collection().version() > version);
        assert_eq!(events.lock().unwrap().len(), 1);

        assert!(tree.set_expanded_items([Key::Int(2)]).is_empty());
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_expand_all_with_exclusions() {
        let tree = Tree::new(source(), options()).unwrap();
        tree.expand_all();
        assert_eq!(keys(&tree), ["1", "2", "3", "4"]);
        assert!(tree.is_expand_all());

        tree.set_collapsed_items([Key::Int(2)]);
        assert_eq!(keys(&tree), ["1", "2", "4"]);
        assert_eq!(tree.collapsed_items(), [Key::Int(2)]);
        assert!(!tree.toggle_expanded(&Key::Int(1)));
        assert_eq!(keys(&tree), ["1", "4"]);
    }

    #[test]
    fn test_new_records_pick_up_expansion() {
        let source = source();
        let tree = Tree::new(source.clone(), options().with_expanded_items([Key::Int(4)])).unwrap();
        source.add(crate::record::Record::from_value(json!({"id": 5, "parent": 4})).unwrap());
        assert_eq!(keys(&tree), ["1", "4", "5"]);
    }

    #[test]
    fn test_node_footers() {
        let tree = Tree::new(
            source(),
            options()
                .with_node_footers(true)
                .with_expanded_items([Key::Int(1)]),
        )
        .unwrap();
        assert_eq!(keys(&tree), ["1", "2", "footer", "4"]);

        let two = tree.collection().item_by_key(&Key::Int(2)).unwrap();
        assert!(!tree.is_last_item(&two));
        let four = tree.collection().item_by_key(&Key::Int(4)).unwrap();
        assert!(tree.is_last_item(&four));
    }

    #[test]
    fn test_is_last_item_skips_footers() {
        let source = Arc::new(
            RecordSet::from_values(
                "id",
                vec![
                    json!({"id": 1, "parent": null, "node": true}),
                    json!({"id": 2, "parent": 1, "node": null}),
                ],
            )
            .unwrap(),
        );
        let tree = Tree::new(
            source,
            options()
                .with_node_footers(true)
                .with_expanded_items([Key::Int(1)]),
        )
        .unwrap();
        assert_eq!(keys(&tree), ["1", "2", "footer"]);
        let two = tree.collection().item_by_key(&Key::Int(2)).unwrap();
        assert!(tree.is_last_item(&two));
    }

    #[test]
    fn test_children_of() {
        let tree = Tree::new(source(), options()).unwrap();
        let root = tree.root();
        let top: Vec<_> = tree
            .children_of(&root, true)
            .iter()
            .filter_map(|item| item.key().cloned())
            .collect();
        assert_eq!(top, [Key::Int(1), Key::Int(4)]);

        let one = tree.collection().item_by_key(&Key::Int(1)).unwrap();
        assert!(tree.children_of(&one, true).is_empty());
        assert_eq!(tree.children_of(&one, false).len(), 1);
        assert!(tree.has_children(&one));

        tree.set_expanded(&Key::Int(1), true);
        assert_eq!(tree.children_of(&one, true).len(), 1);
        assert!(tree.parent_of(&one).is_none());
    }

    #[test]
    fn test_set_root() {
        let tree = Tree::new(source(), options().with_expanded_items([Key::Int(2)])).unwrap();
        assert!(tree.set_root(Some(Key::Int(1))));
        assert_eq!(keys(&tree), ["2", "3"]);
        assert_eq!(tree.root_key(), Some(Key::Int(1)));
        assert!(!tree.set_root(Some(Key::Int(1))));
    }

    #[test]
    fn test_cycle_rejected() {
        let source = Arc::new(
            RecordSet::from_values(
                "id",
                vec![json!({"id": 1, "parent": 2}), json!({"id": 2, "parent": 1})],
            )
            .unwrap(),
        );
        let result = Tree::new(source, options());
        assert!(matches!(result, Err(DisplayError::ParentCycle { .. })));
    }

    #[test]
    fn test_missing_parent_property() {
        let result = Tree::new(source(), DisplayOptions::new("id"));
        assert!(matches!(
            result,
            Err(DisplayError::MissingOption { option: "parent_property" })
        ));
    }
}
