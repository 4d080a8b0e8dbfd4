use std::collections::HashMap;
use std::sync::Arc;

use super::{ItemsStrategy, Slot, StrategyKind};
use crate::item::{DisplayItem, GroupId, ItemKind, ItemRef, OwnerId};

/// Gathers items by the value of a group field and puts a header before
/// each group.
///
/// Groups appear in the order their first member appears upstream. In a tree
/// only top-level items are grouped; descendants travel with their top
/// ancestor. Items without a group value belong to [`GroupId::Hidden`],
/// which has no header and always comes first, so every item after a header
/// belongs to that header's group.
pub struct GroupStrategy {
    owner: OwnerId,
    group_property: String,
    headers: HashMap<GroupId, ItemRef>,
}

impl GroupStrategy {
    pub fn new(owner: OwnerId, group_property: impl Into<String>) -> Self {
        Self {
            owner,
            group_property: group_property.into(),
            headers: HashMap::new(),
        }
    }

    pub fn group_property(&self) -> &str {
        &self.group_property
    }

    fn group_of(&self, item: &ItemRef) -> GroupId {
        let value = item.contents().and_then(|record| record.get(&self.group_property));
        GroupId::from_value(value.as_ref())
    }

    fn header(&mut self, group: &GroupId) -> ItemRef {
        let owner = self.owner;
        self.headers
            .entry(group.clone())
            .or_insert_with(|| Arc::new(DisplayItem::synthetic(owner, ItemKind::Group(group.clone()))))
            .clone()
    }
}

fn is_unit_head(item: &ItemRef) -> bool {
    item.parent().is_none_or(|parent| parent.is_root())
}

impl ItemsStrategy for GroupStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Group
    }

    fn compose(&mut self, upstream: &[ItemRef]) -> Vec<Slot> {
        let mut order: Vec<GroupId> = vec![GroupId::Hidden];
        let mut members: HashMap<GroupId, Vec<usize>> = HashMap::new();
        let mut current = GroupId::Hidden;

        for (index, item) in upstream.iter().enumerate() {
            if index == 0 || is_unit_head(item) {
                current = self.group_of(item);
            }
            members
                .entry(current.clone())
                .or_insert_with(|| {
                    if current != GroupId::Hidden {
                        order.push(current.clone());
                    }
                    Vec::new()
                })
                .push(index);
        }

        let mut slots = Vec::with_capacity(upstream.len() + order.len());
        for group in &order {
            if *group != GroupId::Hidden {
                slots.push(Slot::Synthetic(self.header(group)));
            }
            if let Some(indices) = members.get(group) {
                slots.extend(indices.iter().map(|&index| Slot::Upstream(index)));
            }
        }

        self.headers.retain(|group, _| members.contains_key(group));
        slots
    }

    fn reset(&mut self) {
        self.headers.clear();
    }
}
