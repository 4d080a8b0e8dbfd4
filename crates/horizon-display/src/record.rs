//! Source records and the record set that owns them.
//!
//! Records are plain key/value maps shared as [`RecordRef`]s. A
//! [`RecordSet`] owns an ordered list of them and emits a [`SourceChange`] on
//! its `collection_changed` signal after every mutation; projections connect
//! to that signal and keep their strategy chains in step with it.

use std::fmt;
use std::sync::Arc;

use horizon_display_core::Signal;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DisplayError, Result};

/// The unique key of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    /// Integer key.
    Int(i64),
    /// String key.
    Str(String),
}

impl Key {
    /// Read a key out of a field value. Only integers and strings are keys.
    pub fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::Number(n) => n.as_i64().map(Key::Int),
            Value::String(s) => Some(Key::Str(s.clone())),
            _ => None,
        }
    }

    /// Convert the key back into a field value.
    pub fn to_value(&self) -> Value {
        match self {
            Key::Int(n) => Value::from(*n),
            Key::Str(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(n) => write!(f, "{}", n),
            Key::Str(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Int(n.into())
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_owned())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

/// A source record: a key/value map owned by the record set.
///
/// Fields are behind a lock so the owner can update a record in place and
/// then announce the change with [`RecordSet::set_field`].
pub struct Record {
    fields: RwLock<Map<String, Value>>,
}

/// Shared handle to a record.
pub type RecordRef = Arc<Record>;

impl Record {
    /// Create a record from a field map.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields: RwLock::new(fields),
        }
    }

    /// Create a record from a JSON object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self::new(fields)),
            other => Err(DisplayError::invalid_records(format!(
                "expected an object, found {}",
                other
            ))),
        }
    }

    /// Get a clone of a field value.
    pub fn get(&self, field: &str) -> Option<Value> {
        self.fields.read().get(field).cloned()
    }

    /// Set a field, returning the previous value.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> Option<Value> {
        self.fields.write().insert(field.to_owned(), value.into())
    }

    /// Read the key stored in `key_property`.
    pub fn key(&self, key_property: &str) -> Option<Key> {
        self.fields.read().get(key_property).and_then(Key::from_value)
    }

    /// Snapshot the record as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.read().clone())
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Record").field(&*self.fields.read()).finish()
    }
}

/// Kind of mutation reported by a record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    /// Records were inserted at `new_index`.
    Add,
    /// Records were removed from `old_index`.
    Remove,
    /// Records moved from `old_index` to `new_index`.
    Move,
    /// Records at `old_index` were replaced by new records.
    Replace,
    /// Fields of the records at `new_index` changed in place.
    Change,
    /// The whole content was replaced.
    Reset,
}

/// A mutation notification emitted by [`RecordSet`].
///
/// For `Move`, `new_index` is the position of the first moved record after
/// it has been removed from `old_index` and reinserted.
#[derive(Debug, Clone)]
pub struct SourceChange {
    pub action: ChangeAction,
    pub new_items: Vec<RecordRef>,
    pub new_index: usize,
    pub old_items: Vec<RecordRef>,
    pub old_index: usize,
}

impl SourceChange {
    fn new(action: ChangeAction) -> Self {
        Self {
            action,
            new_items: Vec::new(),
            new_index: 0,
            old_items: Vec::new(),
            old_index: 0,
        }
    }
}

/// An ordered, key-addressable list of records with change notification.
pub struct RecordSet {
    key_property: String,
    records: RwLock<Vec<RecordRef>>,
    /// Emitted after every mutation, once the internal lock is released.
    pub collection_changed: Signal<SourceChange>,
}

impl RecordSet {
    /// Create an empty record set keyed by `key_property`.
    pub fn new(key_property: impl Into<String>) -> Self {
        Self::with_records(key_property, Vec::new())
    }

    /// Create a record set from existing records.
    pub fn with_records(key_property: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            key_property: key_property.into(),
            records: RwLock::new(records.into_iter().map(Arc::new).collect()),
            collection_changed: Signal::new(),
        }
    }

    /// Create a record set from JSON objects.
    pub fn from_values(key_property: impl Into<String>, values: Vec<Value>) -> Result<Self> {
        let records = values
            .into_iter()
            .map(Record::from_value)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::with_records(key_property, records))
    }

    /// Create a record set from a JSON array of objects.
    pub fn from_json(key_property: impl Into<String>, json: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(json)? {
            Value::Array(values) => Self::from_values(key_property, values),
            _ => Err(DisplayError::invalid_records("expected a JSON array")),
        }
    }

    /// The field holding each record's key.
    pub fn key_property(&self) -> &str {
        &self.key_property
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Record at `index`.
    pub fn at(&self, index: usize) -> Option<RecordRef> {
        self.records.read().get(index).cloned()
    }

    /// Snapshot of all records in order.
    pub fn records(&self) -> Vec<RecordRef> {
        self.records.read().clone()
    }

    /// Position of the record with `key`. With duplicate keys the last one
    /// wins, matching the projections.
    pub fn index_of_key(&self, key: &Key) -> Option<usize> {
        self.records
            .read()
            .iter()
            .rposition(|r| r.key(&self.key_property).as_ref() == Some(key))
    }

    /// Record with `key`.
    pub fn record_by_key(&self, key: &Key) -> Option<RecordRef> {
        self.index_of_key(key).and_then(|index| self.at(index))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Append a record.
    pub fn add(&self, record: Record) {
        let index = self.len();
        self.insert(index, record);
    }

    /// Insert a record at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&self, index: usize, record: Record) {
        let record = Arc::new(record);
        self.records.write().insert(index, record.clone());

        let mut change = SourceChange::new(ChangeAction::Add);
        change.new_items.push(record);
        change.new_index = index;
        self.collection_changed.emit(change);
    }

    /// Remove the record at `index`.
    pub fn remove_at(&self, index: usize) -> Option<RecordRef> {
        let removed = {
            let mut records = self.records.write();
            if index >= records.len() {
                return None;
            }
            records.remove(index)
        };

        let mut change = SourceChange::new(ChangeAction::Remove);
        change.old_items.push(removed.clone());
        change.old_index = index;
        self.collection_changed.emit(change);
        Some(removed)
    }

    /// Remove the record with `key`.
    pub fn remove_by_key(&self, key: &Key) -> Option<RecordRef> {
        let index = self.index_of_key(key)?;
        self.remove_at(index)
    }

    /// Move the record at `from` so that it ends up at `to`.
    pub fn move_record(&self, from: usize, to: usize) -> bool {
        let moved = {
            let mut records = self.records.write();
            if from >= records.len() || to >= records.len() {
                return false;
            }
            if from == to {
                return true;
            }
            let record = records.remove(from);
            records.insert(to, record.clone());
            record
        };

        let mut change = SourceChange::new(ChangeAction::Move);
        change.old_items.push(moved.clone());
        change.old_index = from;
        change.new_items.push(moved);
        change.new_index = to;
        self.collection_changed.emit(change);
        true
    }

    /// Replace the record at `index`, returning the previous one.
    pub fn replace(&self, index: usize, record: Record) -> Option<RecordRef> {
        let record = Arc::new(record);
        let old = {
            let mut records = self.records.write();
            let slot = records.get_mut(index)?;
            std::mem::replace(slot, record.clone())
        };

        let mut change = SourceChange::new(ChangeAction::Replace);
        change.old_items.push(old.clone());
        change.old_index = index;
        change.new_items.push(record);
        change.new_index = index;
        self.collection_changed.emit(change);
        Some(old)
    }

    /// Update one field of the record with `key` and announce the change.
    pub fn set_field(&self, key: &Key, field: &str, value: impl Into<Value>) -> bool {
        let Some(index) = self.index_of_key(key) else {
            return false;
        };
        let Some(record) = self.at(index) else {
            return false;
        };
        record.set(field, value);

        let mut change = SourceChange::new(ChangeAction::Change);
        change.new_items.push(record);
        change.new_index = index;
        self.collection_changed.emit(change);
        true
    }

    /// Replace the whole content.
    pub fn assign(&self, records: Vec<Record>) {
        let records: Vec<RecordRef> = records.into_iter().map(Arc::new).collect();
        let old = std::mem::replace(&mut *self.records.write(), records.clone());

        let mut change = SourceChange::new(ChangeAction::Reset);
        change.old_items = old;
        change.new_items = records;
        self.collection_changed.emit(change);
    }

    /// Remove every record.
    pub fn clear(&self) {
        self.assign(Vec::new());
    }
}

impl fmt::Debug for RecordSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordSet")
            .field("key_property", &self.key_property)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn sample() -> RecordSet {
        RecordSet::from_values(
            "id",
            vec![json!({"id": 1}), json!({"id": 2}), json!({"id": "x"})],
        )
        .unwrap()
    }

    #[test]
    fn test_key_from_value() {
        assert_eq!(Key::from_value(&json!(3)), Some(Key::Int(3)));
        assert_eq!(Key::from_value(&json!("a")), Some(Key::from("a")));
        assert_eq!(Key::from_value(&json!(null)), None);
        assert_eq!(Key::from_value(&json!(1.5)), None);
    }

    #[test]
    fn test_key_deserializes_untagged() {
        let keys: Vec<Key> = serde_json::from_str(r#"[1, "two"]"#).unwrap();
        assert_eq!(keys, vec![Key::Int(1), Key::from("two")]);
    }

    #[test]
    fn test_lookup_by_key() {
        let rs = sample();
        assert_eq!(rs.len(), 3);
        assert_eq!(rs.index_of_key(&Key::from("x")), Some(2));
        assert!(rs.record_by_key(&Key::Int(5)).is_none());
    }

    #[test]
    fn test_duplicate_keys_resolve_to_last() {
        let rs = RecordSet::from_values(
            "id",
            vec![json!({"id": 1, "v": "a"}), json!({"id": 2}), json!({"id": 1, "v": "b"})],
        )
        .unwrap();
        assert_eq!(rs.index_of_key(&Key::Int(1)), Some(2));

        let removed = rs.remove_by_key(&Key::Int(1)).unwrap();
        assert_eq!(removed.get("v"), Some(json!("b")));
        assert_eq!(rs.index_of_key(&Key::Int(1)), Some(0));
    }

    #[test]
    fn test_from_json_rejects_non_objects() {
        assert!(RecordSet::from_json("id", "[1, 2]").is_err());
        assert!(RecordSet::from_json("id", "{}").is_err());
        assert_eq!(RecordSet::from_json("id", r#"[{"id": 1}]"#).unwrap().len(), 1);
    }

    #[test]
    fn test_mutations_emit_changes() {
        let rs = sample();
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        rs.collection_changed.connect(move |change| {
            log_clone
                .lock()
                .push((change.action, change.new_index, change.old_index));
        });

        rs.add(Record::from_value(json!({"id": 4})).unwrap());
        rs.remove_at(0);
        rs.move_record(0, 2);
        rs.replace(1, Record::from_value(json!({"id": 9})).unwrap());
        rs.set_field(&Key::Int(9), "name", "nine");
        rs.clear();

        assert_eq!(
            *log.lock(),
            vec![
                (ChangeAction::Add, 3, 0),
                (ChangeAction::Remove, 0, 0),
                (ChangeAction::Move, 2, 0),
                (ChangeAction::Replace, 1, 1),
                (ChangeAction::Change, 1, 0),
                (ChangeAction::Reset, 0, 0),
            ]
        );
        assert!(rs.is_empty());
    }

    #[test]
    fn test_out_of_range_mutations_are_ignored() {
        let rs = sample();
        assert!(rs.remove_at(10).is_none());
        assert!(!rs.move_record(0, 10));
        assert!(rs.replace(10, Record::new(Map::new())).is_none());
        assert!(!rs.set_field(&Key::Int(42), "name", "none"));
    }
}
