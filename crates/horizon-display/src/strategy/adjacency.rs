use std::collections::{HashMap, HashSet};

use horizon_display_core::logging::targets;

use super::{ItemsStrategy, Slot, StrategyKind};
use crate::item::{ItemKind, ItemRef};
use crate::record::Key;

/// Linearizes a flat list into depth-first tree order.
///
/// Every record names its parent through `parent_property`. Children follow
/// their parent directly and keep their upstream order; independent subtrees
/// follow the order of their top ancestors. Records that cannot be reached
/// from the root (cycles, or subtrees outside the current root) are left out.
///
/// Parent links of the emitted items are assigned here; the tree projection
/// reads them for visibility and level.
pub struct AdjacencyListStrategy {
    root: ItemRef,
    parent_property: String,
}

impl AdjacencyListStrategy {
    pub fn new(root: ItemRef, parent_property: impl Into<String>) -> Self {
        Self {
            root,
            parent_property: parent_property.into(),
        }
    }

    pub fn root(&self) -> &ItemRef {
        &self.root
    }

    pub fn set_root(&mut self, root: ItemRef) {
        self.root = root;
    }

    fn root_key(&self) -> Option<&Key> {
        match self.root.kind() {
            ItemKind::Root(key) => key.as_ref(),
            _ => None,
        }
    }

    fn parent_key(&self, item: &ItemRef) -> Option<Key> {
        let value = item.contents()?.get(&self.parent_property)?;
        Key::from_value(&value)
    }
}

/// Where an upstream item hangs in the tree.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Anchor {
    Root,
    Item(usize),
    Detached,
}

impl ItemsStrategy for AdjacencyListStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::AdjacencyList
    }

    fn compose(&mut self, upstream: &[ItemRef]) -> Vec<Slot> {
        let root_key = self.root_key().cloned();

        let mut by_key: HashMap<&Key, usize> = HashMap::with_capacity(upstream.len());
        for (index, item) in upstream.iter().enumerate() {
            let Some(key) = item.key() else { continue };
            if let Some(previous) = by_key.insert(key, index) {
                tracing::warn!(
                    target: targets::STRATEGY,
                    %key,
                    previous,
                    index,
                    "duplicate key, the later record wins"
                );
            }
        }

        let mut anchors = Vec::with_capacity(upstream.len());
        let mut root_children = Vec::new();
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); upstream.len()];

        for (index, item) in upstream.iter().enumerate() {
            let anchor = match self.parent_key(item) {
                Some(parent) if Some(&parent) == root_key.as_ref() => Anchor::Root,
                Some(parent) => match by_key.get(&parent) {
                    Some(&parent_index) => Anchor::Item(parent_index),
                    None => {
                        tracing::warn!(
                            target: targets::STRATEGY,
                            key = ?item.key(),
                            %parent,
                            "parent key not found, attaching to root"
                        );
                        Anchor::Root
                    }
                },
                None if root_key.is_none() => Anchor::Root,
                None => Anchor::Detached,
            };

            match anchor {
                Anchor::Root => root_children.push(index),
                Anchor::Item(parent_index) => children[parent_index].push(index),
                Anchor::Detached => {}
            }
            anchors.push(anchor);
        }

        let mut slots = Vec::with_capacity(upstream.len());
        let mut visited = vec![false; upstream.len()];
        let mut stack: Vec<(usize, Option<usize>)> = root_children.iter().rev().map(|&index| (index, None)).collect();

        while let Some((index, parent)) = stack.pop() {
            if std::mem::replace(&mut visited[index], true) {
                continue;
            }
            let item = &upstream[index];
            match parent {
                None => item.set_parent(&self.root),
                Some(parent) => item.set_parent(&upstream[parent]),
            }
            slots.push(Slot::Upstream(index));
            stack.extend(children[index].iter().rev().map(|&child| (child, Some(index))));
        }

        for (index, item) in upstream.iter().enumerate() {
            if visited[index] {
                continue;
            }
            item.clear_parent();
            if in_cycle(index, &anchors) {
                tracing::error!(
                    target: targets::STRATEGY,
                    key = ?item.key(),
                    "record is its own ancestor, leaving it out"
                );
            }
        }

        slots
    }
}

fn in_cycle(start: usize, anchors: &[Anchor]) -> bool {
    let mut seen = HashSet::new();
    let mut current = start;
    while let Anchor::Item(parent) = anchors[current] {
        if parent == start {
            return true;
        }
        if !seen.insert(parent) {
            return false;
        }
        current = parent;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{Composer, IndexedView};
    use super::*;
    use serde_json::json;

    fn tree(values: Vec<serde_json::Value>, root: Option<Key>) -> (Composer, ItemRef) {
        let factory = factory();
        let root = factory.synthetic(ItemKind::Root(root));
        let mut composer = Composer::new(factory, &records(values));
        composer.append(Box::new(AdjacencyListStrategy::new(root.clone(), "parent")));
        (composer, root)
    }

    #[test]
    fn test_depth_first_order() {
        let (mut composer, root) = tree(
            vec![
                json!({"id": 1, "parent": null}),
                json!({"id": 2, "parent": null}),
                json!({"id": 11, "parent": 1}),
                json!({"id": 21, "parent": 2}),
                json!({"id": 111, "parent": 11}),
                json!({"id": 12, "parent": 1}),
            ],
            None,
        );

        assert_eq!(labels(composer.items()), ["1", "11", "111", "12", "2", "21"]);
        let levels: Vec<usize> = composer.items().iter().map(|item| item.level()).collect();
        assert_eq!(levels, [1, 2, 3, 2, 1, 2]);
        assert!(composer.at(0).parent().is_some_and(|parent| std::sync::Arc::ptr_eq(&parent, &root)));
    }

    #[test]
    fn test_index_round_trip() {
        let (mut composer, _) = tree(
            vec![
                json!({"id": 2, "parent": 1}),
                json!({"id": 1, "parent": null}),
                json!({"id": 3, "parent": 2}),
            ],
            None,
        );
        assert_eq!(labels(composer.items()), ["1", "2", "3"]);
        for index in 0..composer.count() {
            let source = composer.collection_index(index).unwrap();
            assert_eq!(composer.display_index(source), Some(index));
        }
    }

    #[test]
    fn test_dangling_parent_attaches_to_root() {
        let (mut composer, _) = tree(
            vec![json!({"id": 1, "parent": null}), json!({"id": 2, "parent": 99})],
            None,
        );
        assert_eq!(labels(composer.items()), ["1", "2"]);
        assert_eq!(composer.at(1).level(), 1);
    }

    #[test]
    fn test_cycle_is_left_out() {
        let (mut composer, _) = tree(
            vec![
                json!({"id": 1, "parent": null}),
                json!({"id": 2, "parent": 3}),
                json!({"id": 3, "parent": 2}),
                json!({"id": 4, "parent": 4}),
            ],
            None,
        );
        assert_eq!(labels(composer.items()), ["1"]);
        assert!(composer.source_items()[1].parent().is_none());
    }

    #[test]
    fn test_custom_root_shows_subtree() {
        let (mut composer, _) = tree(
            vec![
                json!({"id": 1, "parent": null}),
                json!({"id": 2, "parent": 1}),
                json!({"id": 3, "parent": 2}),
                json!({"id": 4, "parent": null}),
            ],
            Some(Key::Int(1)),
        );
        assert_eq!(labels(composer.items()), ["2", "3"]);
    }

    #[test]
    fn test_duplicate_key_later_wins() {
        let (mut composer, _) = tree(
            vec![
                json!({"id": 1, "parent": null}),
                json!({"id": 1, "parent": null}),
                json!({"id": 2, "parent": 1}),
            ],
            None,
        );
        assert_eq!(labels(composer.items()), ["1", "1", "2"]);
        assert_eq!(composer.display_index(2), Some(2));
        assert_eq!(composer.collection_index(1), Some(1));
    }
}
