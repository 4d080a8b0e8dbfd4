//! The marker: a single highlighted "current" record.

use std::fmt;
use std::sync::{Arc, Weak};

use horizon_display_core::logging::targets;
use horizon_display_core::{ConnectionId, Signal};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::collection::{Collection, ItemProperty, ProjectionChange};
use crate::item::{ItemRef, Markable};
use crate::record::{ChangeAction, Key};

/// When the marker is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerVisibility {
    /// Always shown; falls back to the first record.
    Visible,
    /// Shown once a record has been activated.
    #[default]
    OnActivated,
    /// Never shown.
    Hidden,
}

/// Keeps the marker on an existing record while the projection changes.
///
/// The controller listens to the projection's `collection_changed` signal:
/// when the marked record is removed the marker moves to the next record (or
/// the previous one at the end of the list), and when a record with the
/// marked key comes back it is marked again.
///
/// # Signals
///
/// - `marked_key_changed`: emitted with the new key whenever it changes
pub struct MarkerController {
    collection: Arc<Collection>,
    visibility: Mutex<MarkerVisibility>,
    marked_key: Mutex<Option<Key>>,
    connection: ConnectionId,
    pub marked_key_changed: Signal<Option<Key>>,
}

impl MarkerController {
    /// Attach a marker controller to `collection`.
    ///
    /// The visibility comes from the projection's options. The initial key is
    /// validated with [`calculate_marked_key`](Self::calculate_marked_key)
    /// and applied.
    pub fn new(collection: Arc<Collection>, marked_key: Option<Key>) -> Arc<Self> {
        let visibility = collection.options().marker_visibility;
        let controller = Arc::new_cyclic(|weak: &Weak<MarkerController>| {
            let weak = weak.clone();
            let connection = collection.signals().collection_changed.connect(move |change| {
                if let Some(controller) = weak.upgrade() {
                    controller.on_collection_change(change);
                }
            });
            MarkerController {
                collection,
                visibility: Mutex::new(visibility),
                marked_key: Mutex::new(marked_key),
                connection,
                marked_key_changed: Signal::new(),
            }
        });
        let key = controller.calculate_marked_key();
        controller.apply_marked_key(key);
        controller
    }

    pub fn collection(&self) -> &Arc<Collection> {
        &self.collection
    }

    pub fn marked_key(&self) -> Option<Key> {
        self.marked_key.lock().clone()
    }

    pub fn visibility(&self) -> MarkerVisibility {
        *self.visibility.lock()
    }

    /// Change the visibility mode. Switching to `Visible` places the marker
    /// if there is none.
    pub fn update_options(&self, visibility: MarkerVisibility) {
        let changed = {
            let mut current = self.visibility.lock();
            std::mem::replace(&mut *current, visibility) != visibility
        };
        if changed && visibility == MarkerVisibility::Visible {
            let key = self.calculate_marked_key();
            self.apply_marked_key(key);
        }
    }

    // =========================================================================
    // Applying
    // =========================================================================

    /// Move the marker to `key`. Returns `true` if the marked key changed.
    ///
    /// The item with `key` is marked even when the key did not change, so
    /// this also restores the flag on a freshly created item.
    pub fn apply_marked_key(&self, key: Option<Key>) -> bool {
        let previous = self.marked_key();
        if let Some(previous) = previous.as_ref().filter(|previous| key.as_ref() != Some(*previous)) {
            self.collection.set_marked_key(previous, false);
        }
        if let Some(key) = &key {
            self.collection.set_marked_key(key, true);
        }
        *self.marked_key.lock() = key.clone();

        if previous == key {
            return false;
        }
        tracing::debug!(target: targets::CONTROLLER, ?previous, ?key, "marker moved");
        self.marked_key_changed.emit(key);
        true
    }

    /// Mark again the item carrying the marked key if it is among `new_items`.
    pub fn restore_marked_state(&self, new_items: &[ItemRef]) {
        let Some(key) = self.marked_key() else {
            return;
        };
        if new_items.iter().any(|item| item.key() == Some(&key)) {
            self.apply_marked_key(Some(key));
        }
    }

    /// Clear the marked flag on `items` without changing the marked key.
    pub fn reset_marked_state(&self, items: &[ItemRef]) {
        let changed = items.iter().filter(|item| item.set_marked(false)).cloned().collect();
        self.collection.finish_item_changes(changed, ItemProperty::Marked);
    }

    // =========================================================================
    // Calculating
    // =========================================================================

    /// The key the marker should be on now.
    ///
    /// An existing marked key is kept. Otherwise a `Visible` marker falls
    /// back to the first record; other modes keep the key while the
    /// projection has items and clear it once it is empty.
    pub fn calculate_marked_key(&self) -> Option<Key> {
        let current = self.marked_key();
        if current.as_ref().is_some_and(|key| self.collection.item_by_key(key).is_some()) {
            return current;
        }
        let has_items = !self.collection.is_empty();
        match (self.visibility(), has_items) {
            (MarkerVisibility::Visible, true) => self.collection.first().and_then(|item| item.key().cloned()),
            (MarkerVisibility::Visible, false) | (_, true) => current,
            (_, false) => None,
        }
    }

    /// Key of the next markable item, or the current key at the end.
    pub fn next_marked_key(&self) -> Option<Key> {
        self.nearby_marked_key(true)
    }

    /// Key of the previous markable item, or the current key at the start.
    pub fn prev_marked_key(&self) -> Option<Key> {
        self.nearby_marked_key(false)
    }

    fn nearby_marked_key(&self, forward: bool) -> Option<Key> {
        let current = self.marked_key();
        let items = self.collection.items();
        let index = current.as_ref().and_then(|key| self.collection.index_by_key(key));
        let found = match (index, forward) {
            (Some(index), true) => markable_key(items[index + 1..].iter()),
            (Some(index), false) => markable_key(items[..index].iter().rev()),
            (None, true) => markable_key(items.iter()),
            (None, false) => None,
        };
        found.or(current)
    }

    /// Key the marker should move to after the item at display index
    /// `removed_index` was removed.
    ///
    /// The current key is kept when its item still exists or when nothing is
    /// marked. Otherwise the first markable item at or after the index wins,
    /// then the last one before it.
    pub fn marked_key_after_remove(&self, removed_index: usize) -> Option<Key> {
        let current = self.marked_key();
        match &current {
            None => return None,
            Some(key) if self.collection.item_by_key(key).is_some() => return current,
            Some(_) => {}
        }
        let items = self.collection.items();
        let split = removed_index.min(items.len());
        markable_key(items[split..].iter()).or_else(|| markable_key(items[..split].iter().rev()))
    }

    // =========================================================================
    // Collection changes
    // =========================================================================

    /// Keep the marker valid after a projection change.
    pub fn on_collection_change(&self, change: &ProjectionChange) {
        match change.action {
            ChangeAction::Add => {
                self.restore_marked_state(&change.new_items);
                if self.marked_key().is_none() && self.visibility() == MarkerVisibility::Visible {
                    let key = self.calculate_marked_key();
                    self.apply_marked_key(key);
                }
            }
            ChangeAction::Remove | ChangeAction::Replace => {
                self.restore_marked_state(&change.new_items);
                let key = match change.old_index {
                    Some(index) => self.marked_key_after_remove(index),
                    None => self.calculate_marked_key(),
                };
                self.apply_marked_key(key);
            }
            ChangeAction::Reset => {
                let key = self.calculate_marked_key();
                self.apply_marked_key(key);
            }
            ChangeAction::Move | ChangeAction::Change => {}
        }
    }
}

fn markable_key<'a>(mut items: impl Iterator<Item = &'a ItemRef>) -> Option<Key> {
    items.find(|item| item.is_markable()).and_then(|item| item.key().cloned())
}

impl Drop for MarkerController {
    fn drop(&mut self) {
        self.collection.signals().collection_changed.disconnect(self.connection);
    }
}

impl fmt::Debug for MarkerController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkerController")
            .field("visibility", &self.visibility())
            .field("marked_key", &self.marked_key())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(MarkerController: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::DisplayOptions;
    use crate::record::{Record, RecordSet};
    use serde_json::json;

    fn collection(visibility: MarkerVisibility) -> (Arc<RecordSet>, Arc<Collection>) {
        let source = Arc::new(
            RecordSet::from_values("id", vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})]).unwrap(),
        );
        let options = DisplayOptions::new("id").with_marker_visibility(visibility);
        let collection = Collection::new(source.clone(), options).unwrap();
        (source, collection)
    }

    fn marked(collection: &Collection) -> Option<Key> {
        collection.marked_item().and_then(|item| item.key().cloned())
    }

    #[test]
    fn test_visible_marker_starts_on_first_item() {
        let (_source, collection) = collection(MarkerVisibility::Visible);
        let marker = MarkerController::new(collection.clone(), None);
        assert_eq!(marker.marked_key(), Some(Key::Int(1)));
        assert_eq!(marked(&collection), Some(Key::Int(1)));
    }

    #[test]
    fn test_on_activated_marker_waits() {
        let (_source, collection) = collection(MarkerVisibility::OnActivated);
        let marker = MarkerController::new(collection.clone(), None);
        assert_eq!(marker.marked_key(), None);

        assert!(marker.apply_marked_key(Some(Key::Int(2))));
        assert!(!marker.apply_marked_key(Some(Key::Int(2))));
        assert!(marker.apply_marked_key(Some(Key::Int(3))));
        assert_eq!(marked(&collection), Some(Key::Int(3)));
        assert!(!collection.item_by_key(&Key::Int(2)).unwrap().is_marked());
    }

    #[test]
    fn test_marker_moves_after_removal() {
        let (source, collection) = collection(MarkerVisibility::OnActivated);
        let marker = MarkerController::new(collection.clone(), Some(Key::Int(2)));

        source.remove_by_key(&Key::Int(2));
        assert_eq!(marker.marked_key(), Some(Key::Int(3)));
        assert_eq!(marked(&collection), Some(Key::Int(3)));

        source.remove_by_key(&Key::Int(3));
        assert_eq!(marker.marked_key(), Some(Key::Int(1)));
        assert_eq!(marked(&collection), Some(Key::Int(1)));
    }

    #[test]
    fn test_removing_other_items_keeps_marker() {
        let (source, collection) = collection(MarkerVisibility::OnActivated);
        let marker = MarkerController::new(collection, Some(Key::Int(2)));
        source.remove_by_key(&Key::Int(3));
        assert_eq!(marker.marked_key(), Some(Key::Int(2)));
    }

    #[test]
    fn test_clear_drops_on_activated_marker() {
        let (source, collection) = collection(MarkerVisibility::OnActivated);
        let marker = MarkerController::new(collection, Some(Key::Int(1)));
        source.clear();
        assert_eq!(marker.marked_key(), None);
    }

    #[test]
    fn test_reset_restores_marked_flag() {
        let (source, collection) = collection(MarkerVisibility::OnActivated);
        let marker = MarkerController::new(collection.clone(), Some(Key::Int(2)));
        source.assign(vec![
            Record::from_value(json!({"id": 2})).unwrap(),
            Record::from_value(json!({"id": 5})).unwrap(),
        ]);
        assert_eq!(marker.marked_key(), Some(Key::Int(2)));
        assert!(collection.item_by_key(&Key::Int(2)).unwrap().is_marked());
    }

    #[test]
    fn test_next_and_prev_skip_group_headers() {
        let source = Arc::new(
            RecordSet::from_values(
                "id",
                vec![
                    json!({"id": 1, "g": "a"}),
                    json!({"id": 2, "g": "b"}),
                    json!({"id": 3, "g": "b"}),
                ],
            )
            .unwrap(),
        );
        let collection = Collection::new(source, DisplayOptions::new("id").with_group_property("g")).unwrap();
        let marker = MarkerController::new(collection, Some(Key::Int(1)));

        assert_eq!(marker.next_marked_key(), Some(Key::Int(2)));
        assert_eq!(marker.prev_marked_key(), Some(Key::Int(1)));

        marker.apply_marked_key(Some(Key::Int(2)));
        assert_eq!(marker.prev_marked_key(), Some(Key::Int(1)));

        marker.apply_marked_key(Some(Key::Int(3)));
        assert_eq!(marker.next_marked_key(), Some(Key::Int(3)));
    }

    #[test]
    fn test_marked_key_changed_signal() {
        let (_source, collection) = collection(MarkerVisibility::OnActivated);
        let marker = MarkerController::new(collection, None);
        let changes = Arc::new(Mutex::new(Vec::new()));
        let recorder = changes.clone();
        marker.marked_key_changed.connect(move |key| recorder.lock().push(key.clone()));

        marker.apply_marked_key(Some(Key::Int(1)));
        marker.apply_marked_key(Some(Key::Int(1)));
        marker.apply_marked_key(None);
        assert_eq!(*changes.lock(), vec![Some(Key::Int(1)), None]);
    }

    #[test]
    fn test_switching_to_visible_places_marker() {
        let (_source, collection) = collection(MarkerVisibility::Hidden);
        let marker = MarkerController::new(collection, None);
        assert_eq!(marker.marked_key(), None);
        marker.update_options(MarkerVisibility::Visible);
        assert_eq!(marker.marked_key(), Some(Key::Int(1)));
    }

    #[test]
    fn test_reset_marked_state_keeps_key() {
        let (_source, collection) = collection(MarkerVisibility::OnActivated);
        let marker = MarkerController::new(collection.clone(), Some(Key::Int(1)));
        marker.reset_marked_state(&collection.items());
        assert_eq!(marked(&collection), None);
        assert_eq!(marker.marked_key(), Some(Key::Int(1)));
    }
}
