//! Key-based multi-selection.
//!
//! A [`Selection`] is stored as keys, not items, so it survives reloads and
//! can describe records that are not loaded: `selected` holds explicitly
//! selected keys or the [`SelectionKey::All`] marker, and `excluded` holds
//! keys carved out of a select-all.
//!
//! The calculating methods of [`SelectionController`] (`toggle_item`,
//! `select_all`, `select_range`, ...) return a new selection without applying
//! it; pass the result to [`SelectionController::set_selection`].

use std::fmt;
use std::sync::{Arc, Weak};

use horizon_display_core::logging::targets;
use horizon_display_core::{ConnectionId, Signal};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::collection::{Collection, ItemProperty, ProjectionChange};
use crate::item::{DisplayItem, ItemRef, Selectable};
use crate::record::{ChangeAction, Key};

/// An entry of [`Selection::selected`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKey {
    /// Every record is selected except the excluded ones.
    All,
    Item(Key),
}

impl From<Key> for SelectionKey {
    fn from(key: Key) -> Self {
        SelectionKey::Item(key)
    }
}

/// Selected and excluded keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selection {
    pub selected: Vec<SelectionKey>,
    pub excluded: Vec<Key>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// A selection of exactly `keys`.
    pub fn of(keys: impl IntoIterator<Item = Key>) -> Self {
        Self {
            selected: keys.into_iter().map(SelectionKey::Item).collect(),
            excluded: Vec::new(),
        }
    }

    /// Everything except `excluded`.
    pub fn all_except(excluded: impl IntoIterator<Item = Key>) -> Self {
        Self {
            selected: vec![SelectionKey::All],
            excluded: excluded.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty() && self.excluded.is_empty()
    }

    /// Whether the select-all marker is present.
    pub fn has_all(&self) -> bool {
        self.selected.contains(&SelectionKey::All)
    }

    /// Whether the record with `key` is selected.
    pub fn contains(&self, key: &Key) -> bool {
        if self.has_all() {
            !self.excluded.contains(key)
        } else {
            self.selected.iter().any(|entry| matches!(entry, SelectionKey::Item(k) if k == key))
        }
    }

    fn select(mut self, key: &Key) -> Self {
        if self.has_all() {
            self.excluded.retain(|excluded| excluded != key);
        } else {
            add_unique(&mut self.selected, SelectionKey::Item(key.clone()));
        }
        self
    }

    fn unselect(mut self, key: &Key) -> Self {
        if self.has_all() {
            add_unique(&mut self.excluded, key.clone());
        } else {
            self.selected.retain(|entry| *entry != SelectionKey::Item(key.clone()));
        }
        self
    }

    fn without_keys(mut self, keys: &[Key]) -> Self {
        self.selected
            .retain(|entry| !matches!(entry, SelectionKey::Item(key) if keys.contains(key)));
        self.excluded.retain(|key| !keys.contains(key));
        self
    }
}

fn add_unique<T: PartialEq>(values: &mut Vec<T>, value: T) {
    if !values.contains(&value) {
        values.push(value);
    }
}

/// How one list of keys changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeysDifference<K> {
    /// The new list.
    pub keys: Vec<K>,
    pub added: Vec<K>,
    pub removed: Vec<K>,
}

impl<K: Clone + PartialEq> KeysDifference<K> {
    fn between(old: &[K], new: &[K]) -> Self {
        Self {
            keys: new.to_vec(),
            added: new.iter().filter(|key| !old.contains(key)).cloned().collect(),
            removed: old.iter().filter(|key| !new.contains(key)).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Delta between two selections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionDifference {
    pub selected: KeysDifference<SelectionKey>,
    pub excluded: KeysDifference<Key>,
}

impl SelectionDifference {
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty() && self.excluded.is_empty()
    }
}

struct State {
    selection: Selection,
    /// Size of the select-all pack; `0` means unlimited.
    limit: usize,
    /// Keys selected one by one while a pack limit is active.
    separated: Vec<Key>,
    last_checked: Option<Key>,
}

/// Applies a [`Selection`] to the items of a projection.
///
/// # Signals
///
/// - `selection_changed`: emitted by [`set_selection`](Self::set_selection)
///   with the delta, only when something changed
pub struct SelectionController {
    collection: Arc<Collection>,
    state: Mutex<State>,
    connection: ConnectionId,
    pub selection_changed: Signal<SelectionDifference>,
}

impl SelectionController {
    /// Attach a selection controller to `collection` and apply `selection`.
    pub fn new(collection: Arc<Collection>, selection: Selection) -> Arc<Self> {
        let controller = Arc::new_cyclic(|weak: &Weak<SelectionController>| {
            let weak = weak.clone();
            let connection = collection.signals().collection_changed.connect(move |change| {
                if let Some(controller) = weak.upgrade() {
                    controller.on_collection_change(change);
                }
            });
            SelectionController {
                collection,
                state: Mutex::new(State {
                    selection,
                    limit: 0,
                    separated: Vec::new(),
                    last_checked: None,
                }),
                connection,
                selection_changed: Signal::new(),
            }
        });
        controller.update_items(None);
        controller
    }

    pub fn collection(&self) -> &Arc<Collection> {
        &self.collection
    }

    pub fn selection(&self) -> Selection {
        self.state.lock().selection.clone()
    }

    // =========================================================================
    // Applying
    // =========================================================================

    /// Store `selection`, update item flags and emit the delta.
    pub fn set_selection(&self, selection: Selection) -> SelectionDifference {
        let difference = {
            let mut state = self.state.lock();
            let difference = difference_between(&state.selection, &selection);
            if selection.is_empty() {
                state.limit = 0;
                state.separated.clear();
            }
            state.selection = selection;
            difference
        };
        self.update_items(None);

        if !difference.is_empty() {
            tracing::debug!(
                target: targets::CONTROLLER,
                added = difference.selected.added.len(),
                removed = difference.selected.removed.len(),
                "selection changed"
            );
            self.selection_changed.emit(difference.clone());
        }
        difference
    }

    /// Delta from the current selection to `selection`.
    pub fn selection_difference(&self, selection: &Selection) -> SelectionDifference {
        difference_between(&self.state.lock().selection, selection)
    }

    fn update_items(&self, only: Option<&[ItemRef]>) {
        let selection = self.selection();
        let is_selected = |item: &ItemRef| item.key().is_some_and(|key| selection.contains(key));
        match only {
            None => {
                self.collection.apply_selection(is_selected);
            }
            Some(items) => {
                let changed = items
                    .iter()
                    .filter(|item| item.set_selected(is_selected(*item)))
                    .cloned()
                    .collect();
                self.collection.finish_item_changes(changed, ItemProperty::Selected);
            }
        }
    }

    // =========================================================================
    // Calculating
    // =========================================================================

    /// Flip the record with `key`.
    pub fn toggle_item(&self, key: &Key) -> Selection {
        let Some(item) = self.collection.item_by_key(key) else {
            return self.selection();
        };
        if !item.is_selectable() {
            return self.selection();
        }

        let mut state = self.state.lock();
        let selection = state.selection.clone();
        let selection = if item.is_selected() {
            if state.limit > 0 && !state.separated.contains(key) {
                state.limit -= 1;
            }
            selection.unselect(key)
        } else {
            if state.limit > 0 {
                state.separated.push(key.clone());
            }
            selection.select(key)
        };
        state.last_checked = Some(key.clone());
        selection
    }

    /// Select everything. With a pack limit set, the current exclusions stay.
    pub fn select_all(&self) -> Selection {
        let state = self.state.lock();
        let excluded = if state.limit > 0 {
            state.selection.excluded.clone()
        } else {
            Vec::new()
        };
        Selection::all_except(excluded)
    }

    pub fn unselect_all(&self) -> Selection {
        Selection::new()
    }

    /// Invert the selection.
    pub fn toggle_all(&self) -> Selection {
        let current = self.selection();
        if current.has_all() {
            current
                .excluded
                .iter()
                .fold(Selection::new(), |selection, key| selection.select(key))
        } else {
            current
                .selected
                .iter()
                .filter_map(|entry| match entry {
                    SelectionKey::Item(key) => Some(key),
                    SelectionKey::All => None,
                })
                .fold(Selection::all_except([]), |selection, key| selection.unselect(key))
        }
    }

    /// Select the visible records between the last toggled one and `key`.
    ///
    /// Without a previous toggle this toggles `key`.
    pub fn select_range(&self, key: &Key) -> Selection {
        let last_checked = self.state.lock().last_checked.clone();
        let Some(last_checked) = last_checked else {
            return self.toggle_item(key);
        };
        if last_checked == *key {
            return self.selection();
        }

        let (Some(first), Some(second)) =
            (self.collection.index_by_key(key), self.collection.index_by_key(&last_checked))
        else {
            return self.selection();
        };
        let (start, end) = if first <= second { (first, second) } else { (second, first) };

        self.collection.items()[start..=end]
            .iter()
            .filter(|item| item.is_selectable())
            .filter_map(|item| item.key())
            .fold(Selection::new(), |selection, key| selection.select(key))
    }

    // =========================================================================
    // Limit
    // =========================================================================

    /// Cap select-all at `limit` records.
    pub fn set_limit(&self, limit: usize) {
        self.state.lock().limit = limit;
    }

    /// The pack limit plus the records selected outside the pack.
    pub fn limit(&self) -> usize {
        let state = self.state.lock();
        state.limit + state.separated.len()
    }

    pub fn reset_limit(&self) {
        self.state.lock().limit = 0;
    }

    // =========================================================================
    // Counting
    // =========================================================================

    /// Number of selected records.
    pub fn selected_count(&self) -> usize {
        let (selection, limit) = {
            let state = self.state.lock();
            (state.selection.clone(), state.limit)
        };
        if !selection.has_all() {
            return selection
                .selected
                .iter()
                .filter(|entry| match entry {
                    SelectionKey::Item(key) => self
                        .collection
                        .item_by_key(key)
                        .is_none_or(|item| item.is_selectable()),
                    SelectionKey::All => false,
                })
                .count();
        }

        let count = self
            .collection
            .source_items()
            .iter()
            .filter(|item| is_selectable_record(item))
            .filter(|item| item.key().is_some_and(|key| !selection.excluded.contains(key)))
            .count();
        if limit > 0 { count.min(limit) } else { count }
    }

    /// Whether every record is selected.
    pub fn is_all_selected(&self) -> bool {
        let (selection, limit) = {
            let state = self.state.lock();
            (state.selection.clone(), state.limit)
        };
        let items_count = self
            .collection
            .source_items()
            .iter()
            .filter(|item| is_selectable_record(item))
            .count();

        if limit > 0 {
            selection.has_all() && limit >= items_count
        } else {
            (selection.has_all() && selection.excluded.is_empty())
                || (items_count > 0 && items_count == self.selected_count())
        }
    }

    // =========================================================================
    // Collection changes
    // =========================================================================

    /// Selection after `removed` left the projection.
    ///
    /// Keys whose records still exist in the source (items that were only
    /// hidden) are kept. An empty source clears the selection.
    pub fn on_collection_remove(&self, removed: &[ItemRef]) -> Selection {
        let source = self.collection.source();
        if source.is_empty() {
            return Selection::new();
        }
        let keys: Vec<Key> = removed
            .iter()
            .filter(|item| item.is_selectable())
            .filter_map(|item| item.key().cloned())
            .filter(|key| source.index_of_key(key).is_none())
            .collect();
        self.selection().without_keys(&keys)
    }

    /// Apply the selection to `added`, which start at display index
    /// `add_index`.
    ///
    /// With a pack limit, records beyond the pack are excluded and the new
    /// selection is returned for the caller to apply.
    pub fn on_collection_add(&self, added: &[ItemRef], add_index: usize) -> Option<Selection> {
        let limit = self.state.lock().limit;
        if limit == 0 {
            self.update_items(Some(added));
            return None;
        }

        let mut selection = self.selection();
        let mut changed = false;
        for (offset, item) in added.iter().enumerate() {
            let Some(key) = item.key() else {
                continue;
            };
            if add_index + offset >= limit && !selection.excluded.contains(key) {
                selection.excluded.push(key.clone());
                changed = true;
            }
        }
        if !changed {
            self.update_items(Some(added));
        }
        Some(selection)
    }

    /// Re-apply the selection to freshly created items.
    pub fn on_collection_reset(&self) {
        self.update_items(None);
    }

    fn on_collection_change(&self, change: &ProjectionChange) {
        match change.action {
            ChangeAction::Remove => {
                let selection = self.on_collection_remove(&change.old_items);
                self.set_selection(selection);
            }
            ChangeAction::Add => {
                // Hidden records land after everything visible.
                let add_index = change.new_index.unwrap_or_else(|| self.collection.count());
                if let Some(selection) = self.on_collection_add(&change.new_items, add_index) {
                    self.set_selection(selection);
                }
            }
            ChangeAction::Replace => self.update_items(Some(&change.new_items)),
            ChangeAction::Reset => self.on_collection_reset(),
            ChangeAction::Move | ChangeAction::Change => {}
        }
    }
}

fn is_selectable_record(item: &DisplayItem) -> bool {
    item.is_record() && item.is_selectable()
}

fn difference_between(old: &Selection, new: &Selection) -> SelectionDifference {
    SelectionDifference {
        selected: KeysDifference::between(&old.selected, &new.selected),
        excluded: KeysDifference::between(&old.excluded, &new.excluded),
    }
}

impl Drop for SelectionController {
    fn drop(&mut self) {
        self.collection.signals().collection_changed.disconnect(self.connection);
    }
}

impl fmt::Debug for SelectionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SelectionController")
            .field("selection", &state.selection)
            .field("limit", &state.limit)
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(SelectionController: Send, Sync);
