//! Display items: per-record wrappers carrying render state.
//!
//! A [`DisplayItem`] wraps one source record (or stands for a synthetic row
//! such as a group header or node footer) and carries the derived state a
//! view needs: selection, marker, hover, editing, drag, expansion, and tile
//! geometry. The source record is never mutated through an item.
//!
//! Capabilities are separate traits ([`Markable`], [`Selectable`],
//! [`Draggable`], [`Expandable`]) implemented on the single item struct; what
//! an item supports is decided by its [`ItemKind`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use horizon_display_core::Property;
use parking_lot::RwLock;
use serde_json::Value;

use crate::record::{Key, RecordRef};
use crate::tile::TileGeometry;
use crate::tree::ExpansionState;

static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a display item instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

impl ItemId {
    fn next() -> Self {
        Self(NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Identifier of the projection that created an item.
///
/// Items refer to their owner only through this id; they never keep the
/// owner alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(u64);

impl OwnerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Group an item belongs to, derived from the group field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupId {
    /// Records without a group value. This group has no header.
    Hidden,
    /// A named group.
    Value(Key),
}

impl GroupId {
    /// Derive a group id from a field value.
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => GroupId::Hidden,
            Some(v) => GroupId::Value(Key::from_value(v).unwrap_or_else(|| Key::Str(v.to_string()))),
        }
    }
}

/// What a display item stands for.
#[derive(Debug, Clone)]
pub enum ItemKind {
    /// A source record.
    Record(RecordRef),
    /// A group header.
    Group(GroupId),
    /// Closing row placed after an expanded node's children.
    NodeFooter,
    /// "Create new entry here" placeholder.
    AddItem,
    /// Layout filler that is never shown to the user.
    Invisible,
    /// The tree root sentinel.
    Root(Option<Key>),
}

/// A shared display item.
pub type ItemRef = Arc<DisplayItem>;

/// A display item.
pub struct DisplayItem {
    id: ItemId,
    owner: OwnerId,
    kind: ItemKind,
    key: Option<Key>,
    node: Property<Option<bool>>,
    parent: RwLock<Weak<DisplayItem>>,

    selected: Property<bool>,
    marked: Property<bool>,
    hovered: Property<bool>,
    editing: Property<bool>,
    dragged: Property<bool>,
    expanded: Property<bool>,

    nodes_height: Property<Option<f64>>,
    folder_width: Property<Option<f64>>,

    version: AtomicU64,
}

impl DisplayItem {
    fn with_kind(owner: OwnerId, kind: ItemKind, key: Option<Key>) -> Self {
        Self {
            id: ItemId::next(),
            owner,
            kind,
            key,
            node: Property::new(None),
            parent: RwLock::new(Weak::new()),
            selected: Property::new(false),
            marked: Property::new(false),
            hovered: Property::new(false),
            editing: Property::new(false),
            dragged: Property::new(false),
            expanded: Property::new(false),
            nodes_height: Property::new(None),
            folder_width: Property::new(None),
            version: AtomicU64::new(0),
        }
    }

    /// Create a record-backed item.
    pub(crate) fn record(owner: OwnerId, record: RecordRef, key: Option<Key>) -> Self {
        Self::with_kind(owner, ItemKind::Record(record), key)
    }

    /// Create a synthetic item.
    pub(crate) fn synthetic(owner: OwnerId, kind: ItemKind) -> Self {
        let item = Self::with_kind(owner, kind, None);
        if item.is_root() {
            item.expanded.set_silent(true);
        }
        item
    }

    /// Create the drag avatar standing in for this item.
    pub(crate) fn avatar(&self) -> Self {
        let avatar = Self::with_kind(self.owner, self.kind.clone(), self.key.clone());
        avatar.node.set_silent(self.node.get());
        avatar.selected.set_silent(self.selected.get());
        avatar.marked.set_silent(self.marked.get());
        avatar.dragged.set_silent(true);
        *avatar.parent.write() = self.parent.read().clone();
        avatar
    }

    // =========================================================================
    // Identity
    // =========================================================================

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn kind(&self) -> &ItemKind {
        &self.kind
    }

    /// Key of the wrapped record.
    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    /// The wrapped record.
    pub fn contents(&self) -> Option<&RecordRef> {
        match &self.kind {
            ItemKind::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn is_record(&self) -> bool {
        matches!(self.kind, ItemKind::Record(_))
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, ItemKind::Group(_))
    }

    pub fn is_node_footer(&self) -> bool {
        matches!(self.kind, ItemKind::NodeFooter)
    }

    pub fn is_add_item(&self) -> bool {
        matches!(self.kind, ItemKind::AddItem)
    }

    pub fn is_invisible(&self) -> bool {
        matches!(self.kind, ItemKind::Invisible)
    }

    pub fn is_root(&self) -> bool {
        matches!(self.kind, ItemKind::Root(_))
    }

    /// Group of a header item.
    pub fn group_id(&self) -> Option<&GroupId> {
        match &self.kind {
            ItemKind::Group(group) => Some(group),
            _ => None,
        }
    }

    // =========================================================================
    // Hierarchy
    // =========================================================================

    pub fn parent(&self) -> Option<ItemRef> {
        self.parent.read().upgrade()
    }

    pub(crate) fn set_parent(&self, parent: &ItemRef) {
        *self.parent.write() = Arc::downgrade(parent);
    }

    pub(crate) fn clear_parent(&self) {
        *self.parent.write() = Weak::new();
    }

    /// Number of ancestors. The root and parentless items are at level 0.
    pub fn level(&self) -> usize {
        let mut level = 0;
        let mut current = self.parent();
        while let Some(item) = current {
            level += 1;
            current = item.parent();
        }
        level
    }

    /// Whether `self` descends from `ancestor`.
    pub fn has_ancestor(&self, ancestor: &DisplayItem) -> bool {
        let mut current = self.parent();
        while let Some(item) = current {
            if item.id == ancestor.id {
                return true;
            }
            current = item.parent();
        }
        false
    }

    pub(crate) fn set_node(&self, node: Option<bool>) {
        if self.node.set(node) {
            self.next_version();
        }
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Render version, bumped on every state change.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn next_version(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    fn update(&self, property: &Property<bool>, value: bool) -> bool {
        let changed = property.set(value);
        if changed {
            self.next_version();
        }
        changed
    }

    pub fn is_hovered(&self) -> bool {
        self.hovered.get()
    }

    pub fn set_hovered(&self, hovered: bool) -> bool {
        self.update(&self.hovered, hovered)
    }

    pub fn is_editing(&self) -> bool {
        self.editing.get()
    }

    pub fn set_editing(&self, editing: bool) -> bool {
        self.is_record() && self.update(&self.editing, editing)
    }

    pub fn nodes_height(&self) -> Option<f64> {
        self.nodes_height.get()
    }

    pub(crate) fn set_nodes_height(&self, height: Option<f64>) -> bool {
        let changed = self.nodes_height.set(height);
        if changed {
            self.next_version();
        }
        changed
    }

    pub fn folder_width(&self) -> Option<f64> {
        self.folder_width.get()
    }

    pub(crate) fn set_folder_width(&self, width: Option<f64>) -> bool {
        let changed = self.folder_width.set(width);
        if changed {
            self.next_version();
        }
        changed
    }
}

impl fmt::Debug for DisplayItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayItem")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("key", &self.key)
            .field("version", &self.version())
            .finish()
    }
}

/// Items that can carry the marker.
pub trait Markable {
    fn is_markable(&self) -> bool;
    fn is_marked(&self) -> bool;
    /// Returns `true` if the flag changed.
    fn set_marked(&self, marked: bool) -> bool;
}

/// Items that take part in multi-selection.
pub trait Selectable {
    fn is_selectable(&self) -> bool;
    fn is_selected(&self) -> bool;
    /// Returns `true` if the flag changed.
    fn set_selected(&self, selected: bool) -> bool;
}

/// Items that can be dragged.
pub trait Draggable {
    fn is_draggable(&self) -> bool;
    fn is_dragged(&self) -> bool;
    fn set_dragged(&self, dragged: bool) -> bool;
}

/// Items that can be expanded to show children.
pub trait Expandable {
    /// `Some(true)` for nodes, `Some(false)` for hidden nodes, `None` for leaves.
    fn node(&self) -> Option<bool>;
    fn is_expanded(&self) -> bool;
    fn set_expanded(&self, expanded: bool) -> bool;
}

impl Markable for DisplayItem {
    fn is_markable(&self) -> bool {
        self.is_record()
    }

    fn is_marked(&self) -> bool {
        self.marked.get()
    }

    fn set_marked(&self, marked: bool) -> bool {
        self.is_markable() && self.update(&self.marked, marked)
    }
}

impl Selectable for DisplayItem {
    fn is_selectable(&self) -> bool {
        self.is_record()
    }

    fn is_selected(&self) -> bool {
        self.selected.get()
    }

    fn set_selected(&self, selected: bool) -> bool {
        self.is_selectable() && self.update(&self.selected, selected)
    }
}

impl Draggable for DisplayItem {
    fn is_draggable(&self) -> bool {
        self.is_record()
    }

    fn is_dragged(&self) -> bool {
        self.dragged.get()
    }

    fn set_dragged(&self, dragged: bool) -> bool {
        self.is_draggable() && self.update(&self.dragged, dragged)
    }
}

impl Expandable for DisplayItem {
    fn node(&self) -> Option<bool> {
        self.node.get()
    }

    fn is_expanded(&self) -> bool {
        self.expanded.get()
    }

    fn set_expanded(&self, expanded: bool) -> bool {
        (self.is_record() || self.is_root()) && self.update(&self.expanded, expanded)
    }
}

/// Creates the items of one projection.
///
/// Everything a new item needs at birth (owner, key, node flag, initial
/// expansion, tile geometry) flows through here.
pub(crate) struct ItemFactory {
    owner: OwnerId,
    key_property: String,
    node_property: Option<String>,
    expansion: Option<Arc<RwLock<ExpansionState>>>,
    geometry: Option<Arc<TileGeometry>>,
}

impl ItemFactory {
    pub(crate) fn new(owner: OwnerId, key_property: impl Into<String>) -> Self {
        Self {
            owner,
            key_property: key_property.into(),
            node_property: None,
            expansion: None,
            geometry: None,
        }
    }

    pub(crate) fn with_node_property(mut self, node_property: Option<String>) -> Self {
        self.node_property = node_property;
        self
    }

    pub(crate) fn with_expansion(mut self, expansion: Option<Arc<RwLock<ExpansionState>>>) -> Self {
        self.expansion = expansion;
        self
    }

    pub(crate) fn with_geometry(mut self, geometry: Option<Arc<TileGeometry>>) -> Self {
        self.geometry = geometry;
        self
    }

    pub(crate) fn owner(&self) -> OwnerId {
        self.owner
    }

    pub(crate) fn key_property(&self) -> &str {
        &self.key_property
    }

    pub(crate) fn create(&self, record: &RecordRef) -> ItemRef {
        let key = record.key(&self.key_property);
        let item = DisplayItem::record(self.owner, record.clone(), key);
        self.refresh(&item);

        if let (Some(expansion), Some(key)) = (&self.expansion, item.key()) {
            item.expanded.set_silent(expansion.read().is_expanded(key));
        }
        if let Some(geometry) = &self.geometry {
            item.nodes_height.set_silent(geometry.nodes_height());
            item.folder_width.set_silent(geometry.folder_width());
        }

        Arc::new(item)
    }

    /// Re-read record-derived attributes after the record changed in place.
    pub(crate) fn refresh(&self, item: &DisplayItem) {
        let (Some(property), Some(record)) = (&self.node_property, item.contents()) else {
            return;
        };
        let node = match record.get(property) {
            Some(Value::Bool(flag)) => Some(flag),
            _ => None,
        };
        item.set_node(node);
    }

    pub(crate) fn synthetic(&self, kind: ItemKind) -> ItemRef {
        Arc::new(DisplayItem::synthetic(self.owner, kind))
    }
}

static_assertions::assert_impl_all!(DisplayItem: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use serde_json::json;

    fn record(value: serde_json::Value) -> RecordRef {
        Arc::new(Record::from_value(value).unwrap())
    }

    fn factory() -> ItemFactory {
        ItemFactory::new(OwnerId::next(), "id").with_node_property(Some("node".into()))
    }

    #[test]
    fn test_factory_reads_key_and_node() {
        let factory = factory();
        let folder = factory.create(&record(json!({"id": 1, "node": true})));
        let hidden = factory.create(&record(json!({"id": 2, "node": false})));
        let leaf = factory.create(&record(json!({"id": 3, "node": null})));

        assert_eq!(folder.key(), Some(&Key::Int(1)));
        assert_eq!(folder.node(), Some(true));
        assert_eq!(hidden.node(), Some(false));
        assert_eq!(leaf.node(), None);
        assert_ne!(folder.id(), leaf.id());
        assert_eq!(folder.owner(), leaf.owner());
    }

    #[test]
    fn test_flags_bump_version_only_on_change() {
        let item = factory().create(&record(json!({"id": 1})));
        assert_eq!(item.version(), 0);

        assert!(item.set_marked(true));
        assert!(!item.set_marked(true));
        assert!(item.set_selected(true));
        assert_eq!(item.version(), 2);
    }

    #[test]
    fn test_synthetic_items_have_no_capabilities() {
        let factory = factory();
        for kind in [ItemKind::NodeFooter, ItemKind::AddItem, ItemKind::Invisible, ItemKind::Group(GroupId::Hidden)] {
            let item = factory.synthetic(kind);
            assert!(!item.is_markable());
            assert!(!item.set_marked(true));
            assert!(!item.set_selected(true));
            assert!(!item.set_dragged(true));
            assert!(!item.set_expanded(true));
            assert!(item.contents().is_none());
        }
    }

    #[test]
    fn test_root_is_expanded() {
        let root = factory().synthetic(ItemKind::Root(None));
        assert!(root.is_root());
        assert!(root.is_expanded());
        assert_eq!(root.level(), 0);
    }

    #[test]
    fn test_levels_follow_parent_links() {
        let factory = factory();
        let root = factory.synthetic(ItemKind::Root(None));
        let parent = factory.create(&record(json!({"id": 1})));
        let child = factory.create(&record(json!({"id": 2})));
        parent.set_parent(&root);
        child.set_parent(&parent);

        assert_eq!(parent.level(), 1);
        assert_eq!(child.level(), 2);
        assert!(child.has_ancestor(&root));
        assert!(!parent.has_ancestor(&child));

        child.clear_parent();
        assert_eq!(child.level(), 0);
    }

    #[test]
    fn test_avatar_copies_state() {
        let item = factory().create(&record(json!({"id": 7})));
        item.set_marked(true);

        let avatar = item.avatar();
        assert!(avatar.is_dragged());
        assert!(avatar.is_marked());
        assert_eq!(avatar.key(), item.key());
        assert_ne!(avatar.id(), item.id());
    }

    #[test]
    fn test_group_id_from_value() {
        assert_eq!(GroupId::from_value(None), GroupId::Hidden);
        assert_eq!(GroupId::from_value(Some(&json!(null))), GroupId::Hidden);
        assert_eq!(GroupId::from_value(Some(&json!("a"))), GroupId::Value(Key::from("a")));
        assert_eq!(GroupId::from_value(Some(&json!(true))), GroupId::Value(Key::from("true")));
    }
}
