use std::sync::Arc;

use super::{ItemsStrategy, Slot, StrategyKind, node_block_end};
use crate::item::{DisplayItem, ItemKind, ItemRef, OwnerId};

/// Default number of fillers per block.
pub const DEFAULT_FILLER_COUNT: usize = 10;

/// Appends invisible filler items used by tile layouts to keep the last
/// row of each block aligned.
///
/// One run of fillers follows the block of top-level nodes, another closes
/// the list. A run is only emitted when its block is non-empty.
pub struct InvisibleStrategy {
    owner: OwnerId,
    count: usize,
    after_nodes: Vec<ItemRef>,
    at_end: Vec<ItemRef>,
}

impl InvisibleStrategy {
    pub fn new(owner: OwnerId, count: usize) -> Self {
        let mut strategy = Self {
            owner,
            count,
            after_nodes: Vec::new(),
            at_end: Vec::new(),
        };
        strategy.after_nodes = strategy.fillers();
        strategy.at_end = strategy.fillers();
        strategy
    }

    pub fn count(&self) -> usize {
        self.count
    }

    fn fillers(&self) -> Vec<ItemRef> {
        (0..self.count)
            .map(|_| Arc::new(DisplayItem::synthetic(self.owner, ItemKind::Invisible)))
            .collect()
    }
}

impl ItemsStrategy for InvisibleStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Invisible
    }

    fn compose(&mut self, upstream: &[ItemRef]) -> Vec<Slot> {
        let block_end = node_block_end(upstream);
        let mut slots = Vec::with_capacity(upstream.len() + 2 * self.count);

        slots.extend((0..block_end).map(Slot::Upstream));
        if block_end > 0 {
            slots.extend(self.after_nodes.iter().cloned().map(Slot::Synthetic));
        }
        slots.extend((block_end..upstream.len()).map(Slot::Upstream));
        if block_end < upstream.len() {
            slots.extend(self.at_end.iter().cloned().map(Slot::Synthetic));
        }
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{Composer, IndexedView};
    use super::*;
    use serde_json::json;

    fn composer(values: Vec<serde_json::Value>) -> Composer {
        let factory = factory();
        let owner = factory.owner();
        let mut composer = Composer::new(factory, &records(values));
        composer.append(Box::new(InvisibleStrategy::new(owner, 2)));
        composer
    }

    #[test]
    fn test_fillers_after_each_block() {
        let mut composer = composer(vec![
            json!({"id": 1, "node": true}),
            json!({"id": 2, "node": null}),
        ]);
        assert_eq!(
            labels(composer.items()),
            ["1", "invisible", "invisible", "2", "invisible", "invisible"]
        );
    }

    #[test]
    fn test_leaves_only() {
        let mut composer = composer(vec![json!({"id": 1}), json!({"id": 2})]);
        assert_eq!(labels(composer.items()), ["1", "2", "invisible", "invisible"]);
    }

    #[test]
    fn test_empty_list_has_no_fillers() {
        let mut composer = composer(Vec::new());
        assert_eq!(composer.count(), 0);
    }
}
