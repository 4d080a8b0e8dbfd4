use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{ItemsStrategy, Slot, StrategyKind};
use crate::item::{DisplayItem, Expandable, ItemId, ItemKind, ItemRef, OwnerId};

/// Closes every node's subtree with a footer row.
///
/// Runs after the adjacency stage: the subtree of a node ends at the first
/// following item that does not descend from it. Footers are parented to
/// their node, so they are shown exactly when the node's children are.
pub struct NodeFooterStrategy {
    owner: OwnerId,
    footers: HashMap<ItemId, ItemRef>,
}

impl NodeFooterStrategy {
    pub fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            footers: HashMap::new(),
        }
    }

    fn footer(&mut self, node: &ItemRef) -> ItemRef {
        let owner = self.owner;
        self.footers
            .entry(node.id())
            .or_insert_with(|| {
                let footer = Arc::new(DisplayItem::synthetic(owner, ItemKind::NodeFooter));
                footer.set_parent(node);
                footer
            })
            .clone()
    }
}

impl ItemsStrategy for NodeFooterStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::NodeFooter
    }

    fn compose(&mut self, upstream: &[ItemRef]) -> Vec<Slot> {
        let mut slots = Vec::with_capacity(upstream.len());
        let mut open: Vec<ItemRef> = Vec::new();
        let mut used = HashSet::new();

        for (index, item) in upstream.iter().enumerate() {
            while let Some(node) = open.last() {
                if item.has_ancestor(node) {
                    break;
                }
                if let Some(node) = open.pop() {
                    used.insert(node.id());
                    slots.push(Slot::Synthetic(self.footer(&node)));
                }
            }
            slots.push(Slot::Upstream(index));
            if item.is_record() && item.node() == Some(true) {
                open.push(item.clone());
            }
        }
        while let Some(node) = open.pop() {
            used.insert(node.id());
            slots.push(Slot::Synthetic(self.footer(&node)));
        }

        self.footers.retain(|id, _| used.contains(id));
        slots
    }

    fn reset(&mut self) {
        self.footers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{AdjacencyListStrategy, Composer, IndexedView};
    use super::*;
    use serde_json::json;

    fn composer() -> Composer {
        let factory = factory();
        let owner = factory.owner();
        let root = factory.synthetic(ItemKind::Root(None));
        let values = vec![
            json!({"id": 1, "parent": null, "node": true}),
            json!({"id": 2, "parent": 1, "node": true}),
            json!({"id": 3, "parent": 2, "node": null}),
            json!({"id": 4, "parent": 1, "node": null}),
            json!({"id": 5, "parent": null, "node": true}),
            json!({"id": 6, "parent": null, "node": null}),
        ];
        let mut composer = Composer::new(factory, &records(values));
        composer.append(Box::new(AdjacencyListStrategy::new(root, "parent")));
        composer.append(Box::new(NodeFooterStrategy::new(owner)));
        composer
    }

    #[test]
    fn test_footers_close_subtrees() {
        let mut composer = composer();
        assert_eq!(
            labels(composer.items()),
            ["1", "2", "3", "footer", "4", "footer", "5", "footer", "6"]
        );

        let footer = composer.at(3);
        assert_eq!(footer.parent().and_then(|node| node.key().cloned()), Some(2.into()));
        assert_eq!(composer.collection_index(3), None);
    }

    #[test]
    fn test_footer_identity_is_stable() {
        let mut composer = composer();
        let before = composer.at(7);
        composer.invalidate();
        assert!(Arc::ptr_eq(&before, &composer.at(7)));
    }
}
