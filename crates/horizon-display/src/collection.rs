//! The flat projection.
//!
//! A [`Collection`] presents an ordered, filtered, index-addressable view over
//! a [`RecordSet`]. It listens to the record set's `collection_changed`
//! signal, splices its strategy chain accordingly and re-emits the change in
//! display terms through [`CollectionSignals::collection_changed`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_display::{Collection, DisplayOptions, RecordSet};
//! use serde_json::json;
//!
//! let source = Arc::new(RecordSet::from_values("id", vec![
//!     json!({"id": 1, "title": "one"}),
//!     json!({"id": 2, "title": "two"}),
//! ]).unwrap());
//! let collection = Collection::new(source.clone(), DisplayOptions::new("id")).unwrap();
//! assert_eq!(collection.count(), 2);
//!
//! source.remove_at(0);
//! assert_eq!(collection.count(), 1);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use horizon_display_core::logging::targets;
use horizon_display_core::{ConnectionId, DebugRow, PerfSpan, ProjectionDebug, Signal};
use parking_lot::{Mutex, RwLock};

use crate::error::Result;
use crate::filter::{FilterContext, FilterFn, FilterId, Registry, SortEntry, SortFn, SortId};
use crate::item::{Draggable, Expandable, GroupId, ItemFactory, ItemKind, ItemRef, Markable, OwnerId, Selectable};
use crate::options::DisplayOptions;
use crate::record::{ChangeAction, Key, RecordSet, SourceChange};
use crate::strategy::{
    AddItemPlacement, AddItemStrategy, Composer, DragStrategy, GroupStrategy, IndexedView, ItemsStrategy,
    StrategyKind,
};
use crate::tile::TileGeometry;
use crate::tree::ExpansionState;

/// A change of the projection, in display terms.
#[derive(Debug, Clone)]
pub struct ProjectionChange {
    pub action: ChangeAction,
    /// Items that entered (or, for `Change`, were updated).
    pub new_items: Vec<ItemRef>,
    /// Display index of the first new item, `None` if it is not visible.
    pub new_index: Option<usize>,
    /// Items that left.
    pub old_items: Vec<ItemRef>,
    /// Display index the first old item had before the change.
    pub old_index: Option<usize>,
}

/// Which piece of item state changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemProperty {
    Selected,
    Marked,
    Hovered,
    Editing,
    Expanded,
    Geometry,
}

/// Notification for a single item state change.
#[derive(Debug, Clone)]
pub struct ItemChange {
    pub item: ItemRef,
    pub property: ItemProperty,
}

/// Signals emitted by a projection.
pub struct CollectionSignals {
    /// The set or order of items changed because the source changed.
    pub collection_changed: Signal<ProjectionChange>,
    /// Emitted with the new version after every change of any kind.
    pub version_changed: Signal<u64>,
    /// An item's render state changed.
    pub item_changed: Signal<ItemChange>,
}

impl CollectionSignals {
    fn new() -> Self {
        Self {
            collection_changed: Signal::new(),
            version_changed: Signal::new(),
            item_changed: Signal::new(),
        }
    }
}

/// Where a dragged avatar should go relative to the item at `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropPosition {
    Before,
    After,
    On,
}

/// Target of a drag move, in display indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragPosition {
    pub index: usize,
    pub position: DropPosition,
}

impl DragPosition {
    pub fn new(index: usize, position: DropPosition) -> Self {
        Self { index, position }
    }

    /// New display index of an avatar currently at `current`.
    pub fn resolve(&self, current: usize) -> usize {
        match self.position {
            DropPosition::Before if current < self.index => self.index - 1,
            DropPosition::After if current > self.index => self.index + 1,
            _ => self.index,
        }
    }
}

/// Result of committing a drag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragCommit {
    /// Keys that were moved, in source order.
    pub keys: Vec<Key>,
    /// Display index the avatar had when the drag was committed.
    pub index: Option<usize>,
}

/// Extra pieces a specialized projection plugs into a collection.
pub(crate) struct Blueprint {
    pub(crate) owner: OwnerId,
    /// Stages placed before grouping.
    pub(crate) stages: Vec<Box<dyn ItemsStrategy>>,
    /// Stages placed after grouping.
    pub(crate) tail_stages: Vec<Box<dyn ItemsStrategy>>,
    /// Filters that cannot be cleared by users.
    pub(crate) filters: Vec<FilterFn>,
    pub(crate) expansion: Option<Arc<RwLock<ExpansionState>>>,
    pub(crate) geometry: Option<Arc<TileGeometry>>,
}

impl Blueprint {
    pub(crate) fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            stages: Vec::new(),
            tail_stages: Vec::new(),
            filters: Vec::new(),
            expansion: None,
            geometry: None,
        }
    }
}

/// Strategy chain plus registry, always locked together.
pub(crate) struct Pipeline {
    pub(crate) composer: Composer,
    pub(crate) registry: Registry,
}

impl Pipeline {
    fn refresh(&mut self) {
        if self.registry.is_valid() {
            return;
        }
        let items = self.composer.items().to_vec();
        let sources: Vec<Option<usize>> = (0..items.len())
            .map(|index| self.composer.collection_index(index))
            .collect();
        self.registry.rebuild(&items, &sources);
    }

    pub(crate) fn items(&mut self) -> &[ItemRef] {
        self.refresh();
        self.registry.items()
    }

    pub(crate) fn index_of(&mut self, item: &ItemRef) -> Option<usize> {
        self.items().iter().position(|candidate| Arc::ptr_eq(candidate, item))
    }

    pub(crate) fn index_by_source_index(&mut self, source_index: usize) -> Option<usize> {
        self.refresh();
        let chain = self.composer.display_index(source_index)?;
        self.registry.chain_to_display(chain)
    }

    pub(crate) fn source_index(&mut self, display: usize) -> Option<usize> {
        self.refresh();
        self.registry.source_index(display)
    }

    pub(crate) fn invalidate(&mut self) {
        self.composer.invalidate();
        self.registry.invalidate();
    }

    fn item_by_key(&self, key: &Key) -> Option<ItemRef> {
        self.composer
            .source_items()
            .iter()
            .rev()
            .find(|item| item.key() == Some(key))
            .cloned()
    }
}

/// Flat projection over a record set.
pub struct Collection {
    source: Arc<RecordSet>,
    options: DisplayOptions,
    owner: OwnerId,
    pipeline: Mutex<Pipeline>,
    version: AtomicU64,
    connection: ConnectionId,
    signals: CollectionSignals,
}

impl Collection {
    /// Create a projection over `source`.
    ///
    /// Fails if `options` lack a usable `key_property`.
    pub fn new(source: Arc<RecordSet>, options: DisplayOptions) -> Result<Arc<Self>> {
        Self::build(source, options, Blueprint::new(OwnerId::next()))
    }

    pub(crate) fn build(source: Arc<RecordSet>, options: DisplayOptions, blueprint: Blueprint) -> Result<Arc<Self>> {
        options.validate()?;
        let key_property = options.key_property()?;

        let factory = ItemFactory::new(blueprint.owner, key_property)
            .with_node_property(options.node_property.clone())
            .with_expansion(blueprint.expansion)
            .with_geometry(blueprint.geometry);
        let mut composer = Composer::new(factory, &source.records());
        for stage in blueprint.stages {
            composer.append(stage);
        }
        if let Some(group_property) = &options.group_property {
            composer.append(Box::new(GroupStrategy::new(blueprint.owner, group_property.clone())));
        }
        for stage in blueprint.tail_stages {
            composer.append(stage);
        }

        let mut registry = Registry::new();
        for filter in blueprint.filters {
            registry.add_pinned_filter(filter);
        }

        tracing::debug!(
            target: targets::DISPLAY,
            records = source.len(),
            stages = ?composer.kinds(),
            "creating projection"
        );

        Ok(Arc::new_cyclic(|weak: &Weak<Collection>| {
            let weak = weak.clone();
            let connection = source.collection_changed.connect(move |change| {
                if let Some(collection) = weak.upgrade() {
                    collection.on_source_change(change);
                }
            });
            Collection {
                source,
                options,
                owner: blueprint.owner,
                pipeline: Mutex::new(Pipeline { composer, registry }),
                version: AtomicU64::new(0),
                connection,
                signals: CollectionSignals::new(),
            }
        }))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn source(&self) -> &Arc<RecordSet> {
        &self.source
    }

    pub fn options(&self) -> &DisplayOptions {
        &self.options
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn signals(&self) -> &CollectionSignals {
        &self.signals
    }

    /// Version counter, bumped on every change.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub(crate) fn next_version(&self) -> u64 {
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        self.signals.version_changed.emit(version);
        version
    }

    pub(crate) fn with_pipeline<R>(&self, f: impl FnOnce(&mut Pipeline) -> R) -> R {
        f(&mut self.pipeline.lock())
    }

    // =========================================================================
    // Indexed access
    // =========================================================================

    /// Number of visible items.
    pub fn count(&self) -> usize {
        self.pipeline.lock().items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// The visible item at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= count()`.
    pub fn at(&self, index: usize) -> ItemRef {
        match self.get(index) {
            Some(item) => item,
            None => panic!("index {} out of range for collection of {} items", index, self.count()),
        }
    }

    /// The visible item at `index`, if any.
    pub fn get(&self, index: usize) -> Option<ItemRef> {
        self.pipeline.lock().items().get(index).cloned()
    }

    /// All visible items in display order.
    pub fn items(&self) -> Vec<ItemRef> {
        self.pipeline.lock().items().to_vec()
    }

    /// Every item the strategy chain produced, hidden ones included.
    pub fn all_items(&self) -> Vec<ItemRef> {
        self.pipeline.lock().composer.items().to_vec()
    }

    /// Items aligned with the source records.
    pub fn source_items(&self) -> Vec<ItemRef> {
        self.pipeline.lock().composer.source_items().to_vec()
    }

    /// Call `f` with every visible item and its index.
    pub fn each(&self, mut f: impl FnMut(&ItemRef, usize)) {
        for (index, item) in self.items().iter().enumerate() {
            f(item, index);
        }
    }

    pub fn index_of(&self, item: &ItemRef) -> Option<usize> {
        self.pipeline.lock().index_of(item)
    }

    /// Display index of the record with `key`.
    pub fn index_by_key(&self, key: &Key) -> Option<usize> {
        let mut pipeline = self.pipeline.lock();
        let item = pipeline.item_by_key(key)?;
        pipeline.index_of(&item)
    }

    /// Display index of the record at `source_index`.
    pub fn index_by_source_index(&self, source_index: usize) -> Option<usize> {
        self.pipeline.lock().index_by_source_index(source_index)
    }

    /// Source index of the visible item at `index`.
    pub fn source_index(&self, index: usize) -> Option<usize> {
        self.pipeline.lock().source_index(index)
    }

    /// The item wrapping the record with `key`, visible or not.
    pub fn item_by_key(&self, key: &Key) -> Option<ItemRef> {
        self.pipeline.lock().item_by_key(key)
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// First visible record-backed item.
    pub fn first(&self) -> Option<ItemRef> {
        self.items().into_iter().find(|item| item.is_record())
    }

    /// Last visible record-backed item.
    pub fn last(&self) -> Option<ItemRef> {
        self.items().into_iter().rev().find(|item| item.is_record())
    }

    /// Next visible record-backed item after `item`.
    pub fn next(&self, item: &ItemRef) -> Option<ItemRef> {
        let items = self.items();
        let index = items.iter().position(|candidate| Arc::ptr_eq(candidate, item))?;
        items[index + 1..].iter().find(|item| item.is_record()).cloned()
    }

    /// Previous visible record-backed item before `item`.
    pub fn prev(&self, item: &ItemRef) -> Option<ItemRef> {
        let items = self.items();
        let index = items.iter().position(|candidate| Arc::ptr_eq(candidate, item))?;
        items[..index].iter().rev().find(|item| item.is_record()).cloned()
    }

    // =========================================================================
    // Filters and sorting
    // =========================================================================

    /// Register a visibility predicate. All predicates must pass.
    pub fn add_filter<F>(&self, filter: F) -> FilterId
    where
        F: Fn(&FilterContext<'_>) -> bool + Send + Sync + 'static,
    {
        let id = self.pipeline.lock().registry.add_filter(Arc::new(filter));
        self.next_version();
        id
    }

    pub fn remove_filter(&self, id: FilterId) -> bool {
        let removed = self.pipeline.lock().registry.remove_filter(id);
        if removed {
            self.next_version();
        }
        removed
    }

    /// Replace all user filters.
    pub fn set_filters(&self, filters: Vec<FilterFn>) -> Vec<FilterId> {
        let ids = {
            let mut pipeline = self.pipeline.lock();
            pipeline.registry.clear_filters();
            filters
                .into_iter()
                .map(|filter| pipeline.registry.add_filter(filter))
                .collect()
        };
        self.next_version();
        ids
    }

    pub fn clear_filters(&self) {
        self.pipeline.lock().registry.clear_filters();
        self.next_version();
    }

    pub fn filter_count(&self) -> usize {
        self.pipeline.lock().registry.filter_count()
    }

    /// Register a comparator. Earlier comparators take precedence.
    pub fn add_sort<F>(&self, sort: F) -> SortId
    where
        F: Fn(&SortEntry<'_>, &SortEntry<'_>) -> std::cmp::Ordering + Send + Sync + 'static,
    {
        let sort: SortFn = Arc::new(sort);
        let id = self.pipeline.lock().registry.add_sort(sort);
        self.next_version();
        id
    }

    pub fn remove_sort(&self, id: SortId) -> bool {
        let removed = self.pipeline.lock().registry.remove_sort(id);
        if removed {
            self.next_version();
        }
        removed
    }

    pub fn clear_sorts(&self) {
        self.pipeline.lock().registry.clear_sorts();
        self.next_version();
    }

    /// Hide the members of `groups`. Their headers stay visible.
    pub fn set_collapsed_groups(&self, groups: impl IntoIterator<Item = GroupId>) -> bool {
        let changed = self
            .pipeline
            .lock()
            .registry
            .set_collapsed_groups(groups.into_iter().collect());
        if changed {
            self.next_version();
        }
        changed
    }

    pub fn collapsed_groups(&self) -> HashSet<GroupId> {
        self.pipeline.lock().registry.collapsed_groups().clone()
    }

    // =========================================================================
    // Item state
    // =========================================================================

    fn item_changed(&self, item: ItemRef, property: ItemProperty) {
        self.signals.item_changed.emit(ItemChange { item, property });
    }

    /// Set the marker flag of the item with `key`.
    pub fn set_marked_key(&self, key: &Key, marked: bool) -> bool {
        let Some(item) = self.item_by_key(key) else {
            return false;
        };
        if !item.set_marked(marked) {
            return false;
        }
        self.item_changed(item, ItemProperty::Marked);
        self.next_version();
        true
    }

    /// The item carrying the marker.
    pub fn marked_item(&self) -> Option<ItemRef> {
        self.pipeline
            .lock()
            .composer
            .source_items()
            .iter()
            .find(|item| item.is_marked())
            .cloned()
    }

    /// Apply selection flags to every source item; returns how many changed.
    pub fn apply_selection(&self, is_selected: impl Fn(&ItemRef) -> bool) -> usize {
        let changed: Vec<ItemRef> = self
            .source_items()
            .into_iter()
            .filter(|item| item.set_selected(is_selected(item)))
            .collect();
        for item in &changed {
            self.item_changed(item.clone(), ItemProperty::Selected);
        }
        if !changed.is_empty() {
            self.next_version();
        }
        changed.len()
    }

    /// Move the hover flag to `item`, or clear it.
    pub fn set_hovered_item(&self, item: Option<&ItemRef>) -> bool {
        let mut changed = Vec::new();
        for candidate in self.all_items() {
            let hovered = item.is_some_and(|item| Arc::ptr_eq(item, &candidate));
            if candidate.set_hovered(hovered) {
                changed.push(candidate);
            }
        }
        self.finish_item_changes(changed, ItemProperty::Hovered)
    }

    pub fn hovered_item(&self) -> Option<ItemRef> {
        self.all_items().into_iter().find(|item| item.is_hovered())
    }

    /// Put the record with `key` into editing mode, or end editing.
    pub fn set_editing_key(&self, key: Option<&Key>) -> bool {
        let mut changed = Vec::new();
        for candidate in self.source_items() {
            let editing = key.is_some_and(|key| candidate.key() == Some(key));
            if candidate.set_editing(editing) {
                changed.push(candidate);
            }
        }
        self.finish_item_changes(changed, ItemProperty::Editing)
    }

    pub fn editing_item(&self) -> Option<ItemRef> {
        self.source_items().into_iter().find(|item| item.is_editing())
    }

    pub(crate) fn finish_item_changes(&self, changed: Vec<ItemRef>, property: ItemProperty) -> bool {
        if changed.is_empty() {
            return false;
        }
        for item in changed {
            self.item_changed(item, property);
        }
        self.next_version();
        true
    }

    // =========================================================================
    // Drag
    // =========================================================================

    /// Start dragging `keys`, showing an avatar of the item with `dragged_by`.
    pub fn set_dragged_items(&self, dragged_by: &Key, keys: Vec<Key>) {
        {
            let mut pipeline = self.pipeline.lock();
            let proto = pipeline.item_by_key(dragged_by);
            for item in pipeline.composer.source_items() {
                item.set_dragged(item.key().is_some_and(|key| keys.contains(key)));
            }
            pipeline.composer.remove(StrategyKind::Drag);
            pipeline.composer.insert_before(
                &[StrategyKind::AddItem, StrategyKind::Invisible],
                Box::new(DragStrategy::new(proto, keys)),
            );
            pipeline.registry.invalidate();
        }
        tracing::debug!(target: targets::DISPLAY, %dragged_by, "drag started");
        self.next_version();
    }

    pub fn is_dragging(&self) -> bool {
        self.pipeline.lock().composer.contains(StrategyKind::Drag)
    }

    /// The avatar shown while dragging.
    pub fn drag_avatar(&self) -> Option<ItemRef> {
        self.pipeline
            .lock()
            .composer
            .stage::<DragStrategy>()
            .and_then(|stage| stage.avatar().cloned())
    }

    /// Move the avatar. Returns `true` if it moved.
    pub fn set_drag_position(&self, position: DragPosition) -> bool {
        let moved = {
            let mut pipeline = self.pipeline.lock();
            let Some(avatar) = pipeline
                .composer
                .stage::<DragStrategy>()
                .and_then(|stage| stage.avatar().cloned())
            else {
                return false;
            };
            let Some(current) = pipeline.index_of(&avatar) else {
                return false;
            };
            let target = position.resolve(current);

            let others: Vec<ItemRef> = pipeline
                .items()
                .iter()
                .filter(|item| !Arc::ptr_eq(item, &avatar))
                .cloned()
                .collect();
            let target = target.min(others.len());

            let Some(mut view) = pipeline.composer.view(StrategyKind::Drag) else {
                return false;
            };
            let remaining: Vec<ItemRef> = view
                .items()
                .iter()
                .filter(|item| !Arc::ptr_eq(item, &avatar))
                .cloned()
                .collect();
            let position_of = |anchor: &ItemRef| remaining.iter().position(|item| Arc::ptr_eq(item, anchor));
            let insertion = others[target..]
                .iter()
                .find_map(position_of)
                .or_else(|| others[..target].iter().rev().find_map(position_of).map(|index| index + 1))
                .unwrap_or(0);

            let previous = pipeline.composer.stage::<DragStrategy>().and_then(|stage| stage.target());
            if previous == Some(insertion) {
                false
            } else {
                if let Some(stage) = pipeline.composer.stage_mut::<DragStrategy>() {
                    stage.set_target(insertion);
                }
                pipeline.registry.invalidate();
                true
            }
        };
        if moved {
            self.next_version();
        }
        moved
    }

    /// Drop the drag overlay without touching the source.
    pub fn reset_dragged_items(&self) -> bool {
        let removed = {
            let mut pipeline = self.pipeline.lock();
            let removed = pipeline.composer.remove(StrategyKind::Drag).is_some();
            for item in pipeline.composer.source_items() {
                item.set_dragged(false);
            }
            pipeline.registry.invalidate();
            removed
        };
        if removed {
            self.next_version();
        }
        removed
    }

    /// Move the dragged records in the source to where the avatar is, then
    /// drop the overlay.
    ///
    /// Returns `None` when no drag with an avatar is active.
    pub fn commit_drag(&self) -> Option<DragCommit> {
        let (keys, anchor, index) = {
            let mut pipeline = self.pipeline.lock();
            let (keys, avatar) = {
                let stage = pipeline.composer.stage::<DragStrategy>()?;
                (stage.keys().to_vec(), stage.avatar().cloned())
            };
            let avatar = avatar?;
            let index = pipeline.index_of(&avatar);
            let anchor = pipeline.composer.view(StrategyKind::Drag).and_then(|mut view| {
                let items = view.items();
                let position = items.iter().position(|item| Arc::ptr_eq(item, &avatar))?;
                items[position + 1..]
                    .iter()
                    .find(|item| item.is_record())
                    .and_then(|item| item.key().cloned())
            });
            (keys, anchor, index)
        };
        self.reset_dragged_items();

        let mut ordered: Vec<(usize, Key)> = keys
            .into_iter()
            .filter_map(|key| self.source.index_of_key(&key).map(|index| (index, key)))
            .collect();
        ordered.sort_by_key(|(index, _)| *index);

        let mut insert_at = match &anchor {
            Some(anchor) => self.source.index_of_key(anchor).unwrap_or(self.source.len()),
            None => self.source.len(),
        };
        for (_, key) in &ordered {
            let Some(from) = self.source.index_of_key(key) else {
                continue;
            };
            let to = if from < insert_at { insert_at - 1 } else { insert_at };
            let to = to.min(self.source.len().saturating_sub(1));
            self.source.move_record(from, to);
            insert_at = to + 1;
        }

        tracing::debug!(target: targets::DISPLAY, moved = ordered.len(), ?anchor, "drag committed");
        Some(DragCommit {
            keys: ordered.into_iter().map(|(_, key)| key).collect(),
            index,
        })
    }

    // =========================================================================
    // Adding item
    // =========================================================================

    /// Show the "create new entry here" placeholder.
    pub fn show_adding_item(&self, placement: AddItemPlacement) {
        {
            let mut pipeline = self.pipeline.lock();
            pipeline.composer.remove(StrategyKind::AddItem);
            pipeline.composer.insert_before(
                &[StrategyKind::Invisible],
                Box::new(AddItemStrategy::new(self.owner, placement)),
            );
            pipeline.registry.invalidate();
        }
        self.next_version();
    }

    pub fn hide_adding_item(&self) -> bool {
        let removed = {
            let mut pipeline = self.pipeline.lock();
            let removed = pipeline.composer.remove(StrategyKind::AddItem).is_some();
            pipeline.registry.invalidate();
            removed
        };
        if removed {
            self.next_version();
        }
        removed
    }

    /// The placeholder item while it is shown.
    pub fn adding_item(&self) -> Option<ItemRef> {
        self.pipeline
            .lock()
            .composer
            .stage::<AddItemStrategy>()
            .map(|stage| stage.item().clone())
    }

    // =========================================================================
    // Source changes
    // =========================================================================

    fn on_source_change(&self, change: &SourceChange) {
        let _perf = PerfSpan::new("collection.on_source_change");
        let count = change.new_items.len();

        let projection = {
            let mut pipeline = self.pipeline.lock();
            let old_index = match change.action {
                ChangeAction::Remove | ChangeAction::Replace | ChangeAction::Move => {
                    pipeline.index_by_source_index(change.old_index)
                }
                ChangeAction::Reset => Some(0),
                _ => None,
            };

            let slice = |pipeline: &Pipeline, start: usize, len: usize| -> Vec<ItemRef> {
                pipeline
                    .composer
                    .source_items()
                    .get(start..start + len)
                    .map(<[ItemRef]>::to_vec)
                    .unwrap_or_default()
            };

            let (new_items, old_items) = match change.action {
                ChangeAction::Add => {
                    pipeline.composer.splice(change.new_index, 0, &change.new_items);
                    (slice(&pipeline, change.new_index, count), Vec::new())
                }
                ChangeAction::Remove => {
                    let removed = pipeline.composer.splice(change.old_index, change.old_items.len(), &[]);
                    (Vec::new(), removed)
                }
                ChangeAction::Replace => {
                    let removed = pipeline
                        .composer
                        .splice(change.old_index, change.old_items.len(), &change.new_items);
                    (slice(&pipeline, change.new_index, count), removed)
                }
                ChangeAction::Move => {
                    let moved = slice(&pipeline, change.old_index, change.old_items.len());
                    pipeline.composer.move_items(change.old_index, moved.len(), change.new_index);
                    (moved.clone(), moved)
                }
                ChangeAction::Change => {
                    let changed = slice(&pipeline, change.new_index, count);
                    for item in &changed {
                        pipeline.composer.factory().refresh(item);
                    }
                    pipeline.composer.invalidate();
                    (changed.clone(), changed)
                }
                ChangeAction::Reset => {
                    let old = pipeline.composer.reset(&change.new_items);
                    (pipeline.composer.source_items().to_vec(), old)
                }
            };
            pipeline.registry.invalidate();

            let new_index = new_items.first().and_then(|item| pipeline.index_of(item));
            ProjectionChange {
                action: change.action,
                new_items,
                new_index,
                old_items,
                old_index,
            }
        };

        tracing::debug!(
            target: targets::DISPLAY,
            action = ?projection.action,
            added = projection.new_items.len(),
            removed = projection.old_items.len(),
            "source changed"
        );
        self.next_version();
        self.signals.collection_changed.emit(projection);
    }

    // =========================================================================
    // Debugging
    // =========================================================================

    /// Visible items as debug rows.
    pub fn debug_rows(&self) -> Vec<DebugRow> {
        self.items().iter().map(debug_row).collect()
    }

    /// Visible items rendered as an indented tree.
    pub fn format_debug(&self) -> String {
        ProjectionDebug::new().format_rows("Collection", &self.debug_rows())
    }
}

fn debug_row(item: &ItemRef) -> DebugRow {
    let label = match (item.key(), item.kind()) {
        (Some(key), _) => key.to_string(),
        (None, ItemKind::Group(GroupId::Value(value))) => format!("[{}]", value),
        (None, ItemKind::Group(GroupId::Hidden)) => "[hidden]".to_string(),
        (None, ItemKind::NodeFooter) => "(footer)".to_string(),
        (None, ItemKind::AddItem) => "(add)".to_string(),
        (None, ItemKind::Invisible) => "(invisible)".to_string(),
        (None, _) => "(record)".to_string(),
    };

    let mut depth = 0;
    let mut ancestor = item.parent();
    while let Some(parent) = ancestor {
        if !parent.is_root() {
            depth += 1;
        }
        ancestor = parent.parent();
    }

    let mut row = DebugRow::new(label, depth);
    for (flag, tag) in [
        (item.is_marked(), "marked"),
        (item.is_selected(), "selected"),
        (item.is_record() && item.is_expanded(), "expanded"),
        (item.is_dragged(), "dragged"),
        (item.is_hovered(), "hovered"),
        (item.is_editing(), "editing"),
    ] {
        if flag {
            row = row.with_tag(tag);
        }
    }
    row
}

impl Drop for Collection {
    fn drop(&mut self) {
        self.source.collection_changed.disconnect(self.connection);
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("owner", &self.owner)
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(Collection: Send, Sync);
