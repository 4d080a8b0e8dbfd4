use std::sync::Arc;

use super::{ItemsStrategy, Slot, StrategyKind, node_block_end};
use crate::item::{DisplayItem, ItemKind, ItemRef, OwnerId};

/// Where the "add" placeholder goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddItemPlacement {
    Top,
    #[default]
    Bottom,
    /// Right after the block of top-level nodes (tile layouts).
    AfterNodes,
}

/// Inserts a single "create new entry here" placeholder.
///
/// The placeholder has no source record and is never touched by source
/// mutations.
pub struct AddItemStrategy {
    placement: AddItemPlacement,
    item: ItemRef,
}

impl AddItemStrategy {
    pub fn new(owner: OwnerId, placement: AddItemPlacement) -> Self {
        Self {
            placement,
            item: Arc::new(DisplayItem::synthetic(owner, ItemKind::AddItem)),
        }
    }

    pub fn placement(&self) -> AddItemPlacement {
        self.placement
    }

    pub fn item(&self) -> &ItemRef {
        &self.item
    }
}

impl ItemsStrategy for AddItemStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::AddItem
    }

    fn compose(&mut self, upstream: &[ItemRef]) -> Vec<Slot> {
        let position = match self.placement {
            AddItemPlacement::Top => 0,
            AddItemPlacement::Bottom => upstream.len(),
            AddItemPlacement::AfterNodes => node_block_end(upstream),
        };

        let mut slots: Vec<Slot> = (0..position).map(Slot::Upstream).collect();
        slots.push(Slot::Synthetic(self.item.clone()));
        slots.extend((position..upstream.len()).map(Slot::Upstream));
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{Composer, IndexedView};
    use super::*;
    use serde_json::json;

    fn composer(placement: AddItemPlacement) -> Composer {
        let factory = factory();
        let owner = factory.owner();
        let values = vec![
            json!({"id": 1, "node": true}),
            json!({"id": 2, "node": true}),
            json!({"id": 3, "node": null}),
        ];
        let mut composer = Composer::new(factory, &records(values));
        composer.append(Box::new(AddItemStrategy::new(owner, placement)));
        composer
    }

    #[test]
    fn test_placements() {
        assert_eq!(labels(composer(AddItemPlacement::Top).items()), ["add", "1", "2", "3"]);
        assert_eq!(labels(composer(AddItemPlacement::Bottom).items()), ["1", "2", "3", "add"]);
        assert_eq!(labels(composer(AddItemPlacement::AfterNodes).items()), ["1", "2", "add", "3"]);
    }

    #[test]
    fn test_placeholder_is_not_source_backed() {
        let mut composer = composer(AddItemPlacement::Top);
        assert_eq!(composer.collection_index(0), None);
        assert_eq!(composer.display_index(0), Some(1));
    }
}
