use std::collections::HashSet;
use std::sync::Arc;

use super::{ItemsStrategy, Slot, StrategyKind};
use crate::item::ItemRef;
use crate::record::Key;

/// Reorder overlay shown while items are being dragged.
///
/// Every dragged item is taken out of its natural place and a single avatar
/// (a copy of the item the drag started from) is inserted at the target. The
/// target is an insertion index into the upstream list with the dragged items
/// removed. Until [`set_target`](Self::set_target) is called the avatar sits
/// where the dragged-by item was.
pub struct DragStrategy {
    keys: Vec<Key>,
    proto: Option<ItemRef>,
    avatar: Option<ItemRef>,
    target: Option<usize>,
}

impl DragStrategy {
    /// Start dragging `keys`, with `proto` as the item the drag started from.
    ///
    /// Without a proto item no avatar is shown; the dragged items are only
    /// hidden.
    pub fn new(proto: Option<ItemRef>, keys: Vec<Key>) -> Self {
        let avatar = proto.as_ref().map(|item| Arc::new(item.avatar()));
        Self {
            keys,
            proto,
            avatar,
            target: None,
        }
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn avatar(&self) -> Option<&ItemRef> {
        self.avatar.as_ref()
    }

    pub fn target(&self) -> Option<usize> {
        self.target
    }

    /// Move the avatar to insertion index `target`.
    pub fn set_target(&mut self, target: usize) {
        self.target = Some(target);
    }

    fn initial_target(&self, upstream: &[ItemRef], dragged: &HashSet<&Key>) -> usize {
        let Some(proto) = &self.proto else {
            return 0;
        };
        let Some(position) = upstream.iter().position(|item| Arc::ptr_eq(item, proto)) else {
            return upstream.len();
        };
        let hidden_before = upstream[..position]
            .iter()
            .filter(|item| item.key().is_some_and(|key| dragged.contains(key)))
            .count();
        position - hidden_before
    }
}

impl ItemsStrategy for DragStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Drag
    }

    fn compose(&mut self, upstream: &[ItemRef]) -> Vec<Slot> {
        let dragged: HashSet<&Key> = self.keys.iter().collect();
        let remaining: Vec<usize> = (0..upstream.len())
            .filter(|&index| {
                let item = &upstream[index];
                !(item.is_record() && item.key().is_some_and(|key| dragged.contains(key)))
            })
            .collect();

        let Some(avatar) = self.avatar.clone() else {
            return remaining.into_iter().map(Slot::Upstream).collect();
        };

        let target = match self.target {
            Some(target) => target,
            None => {
                let target = self.initial_target(upstream, &dragged);
                self.target = Some(target);
                target
            }
        }
        .min(remaining.len());

        let mut slots: Vec<Slot> = Vec::with_capacity(remaining.len() + 1);
        slots.extend(remaining[..target].iter().copied().map(Slot::Upstream));
        slots.push(Slot::Synthetic(avatar));
        slots.extend(remaining[target..].iter().copied().map(Slot::Upstream));
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{Composer, IndexedView};
    use super::*;
    use crate::item::Draggable;
    use serde_json::json;

    fn composer(count: i64) -> Composer {
        let values = (1..=count).map(|id| json!({"id": id})).collect();
        Composer::new(factory(), &records(values))
    }

    fn drag(composer: &mut Composer, proto: Option<i64>, keys: &[i64]) {
        let proto = proto.and_then(|key| {
            composer
                .source_items()
                .iter()
                .find(|item| item.key() == Some(&Key::Int(key)))
                .cloned()
        });
        let keys = keys.iter().map(|&key| Key::Int(key)).collect();
        composer.append(Box::new(DragStrategy::new(proto, keys)));
    }

    #[test]
    fn test_avatar_replaces_dragged_items() {
        let mut composer = composer(6);
        drag(&mut composer, Some(2), &[2, 3, 5]);

        assert_eq!(labels(composer.items()), ["1", "2", "4", "6"]);
        let avatar = composer.at(1);
        assert!(avatar.is_dragged());
        assert_eq!(composer.collection_index(1), None);
    }

    #[test]
    fn test_avatar_takes_first_position() {
        let mut composer = composer(3);
        drag(&mut composer, Some(1), &[1, 2]);
        assert_eq!(labels(composer.items()), ["1", "3"]);
        assert!(composer.at(0).is_dragged());
    }

    #[test]
    fn test_drag_everything() {
        let mut composer = composer(3);
        drag(&mut composer, Some(2), &[1, 2, 3]);
        assert_eq!(composer.count(), 1);
    }

    #[test]
    fn test_without_proto_no_avatar() {
        let mut composer = composer(3);
        drag(&mut composer, None, &[7]);
        assert_eq!(labels(composer.items()), ["1", "2", "3"]);
    }

    #[test]
    fn test_set_target() {
        let mut composer = composer(3);
        drag(&mut composer, Some(1), &[1]);
        assert_eq!(composer.stage::<DragStrategy>().and_then(|stage| stage.target()), None);
        assert_eq!(labels(composer.items()), ["1", "2", "3"]);
        assert_eq!(composer.stage::<DragStrategy>().and_then(|stage| stage.target()), Some(0));

        if let Some(stage) = composer.stage_mut::<DragStrategy>() {
            stage.set_target(1);
        }
        assert_eq!(labels(composer.items()), ["2", "1", "3"]);
        assert!(composer.at(1).is_dragged());
    }
}
