use crate::item::{ItemFactory, ItemRef};
use crate::record::RecordRef;

/// Innermost stage: one item per source record, in source order.
///
/// Items are created once per record and keep their identity across moves.
pub struct DirectStrategy {
    factory: ItemFactory,
    items: Vec<ItemRef>,
}

impl DirectStrategy {
    pub(crate) fn new(factory: ItemFactory, records: &[RecordRef]) -> Self {
        let items = records.iter().map(|record| factory.create(record)).collect();
        Self { factory, items }
    }

    pub(crate) fn factory(&self) -> &ItemFactory {
        &self.factory
    }

    pub fn items(&self) -> &[ItemRef] {
        &self.items
    }

    pub(crate) fn splice(&mut self, start: usize, delete_count: usize, added: &[RecordRef]) -> Vec<ItemRef> {
        let end = start + delete_count;
        assert!(
            end <= self.items.len(),
            "splice range {}..{} exceeds {} items",
            start,
            end,
            self.items.len()
        );
        let created: Vec<ItemRef> = added.iter().map(|record| self.factory.create(record)).collect();
        self.items.splice(start..end, created).collect()
    }

    pub(crate) fn move_items(&mut self, from: usize, count: usize, to: usize) {
        let end = from + count;
        assert!(
            end <= self.items.len(),
            "move range {}..{} exceeds {} items",
            from,
            end,
            self.items.len()
        );
        let moved: Vec<ItemRef> = self.items.drain(from..end).collect();
        let to = to.min(self.items.len());
        self.items.splice(to..to, moved);
    }

    pub(crate) fn reset(&mut self, records: &[RecordRef]) -> Vec<ItemRef> {
        let created = records.iter().map(|record| self.factory.create(record)).collect();
        std::mem::replace(&mut self.items, created)
    }
}
