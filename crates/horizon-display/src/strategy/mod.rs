//! The strategy chain.
//!
//! A projection is built from stages. The innermost stage ([`DirectStrategy`])
//! holds one display item per source record in source order. Every further
//! stage consumes the item list of the stage below it and produces its own,
//! either passing upstream items through (possibly reordered or dropped) or
//! inserting synthetic items.
//!
//! The [`Composer`] owns the chain. Each stage's output is cached together
//! with an index mapping to the stage below, so lookups in either direction
//! (display index to source index, source index to display index) walk the
//! mappings instead of searching. Structural changes invalidate the caches of
//! every stage at or after the affected one; they are rebuilt lazily on the
//! next read.
//!
//! # Stage order
//!
//! ```text
//! Direct -> AdjacencyList -> NodeFooter -> Group -> Drag -> AddItem -> Invisible
//! ```
//!
//! Any stage except Direct is optional.

mod add_item;
mod adjacency;
mod direct;
mod drag;
mod group;
mod invisible;
mod node_footer;

pub use add_item::{AddItemPlacement, AddItemStrategy};
pub use adjacency::AdjacencyListStrategy;
pub use direct::DirectStrategy;
pub use drag::DragStrategy;
pub use group::GroupStrategy;
pub use invisible::{DEFAULT_FILLER_COUNT, InvisibleStrategy};
pub use node_footer::NodeFooterStrategy;

use std::any::Any;
use std::sync::Arc;

use horizon_display_core::logging::targets;

use crate::item::{Expandable, ItemFactory, ItemRef};
use crate::record::RecordRef;

/// Identifies a stage of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Direct,
    AdjacencyList,
    NodeFooter,
    Group,
    Drag,
    AddItem,
    Invisible,
}

/// One output position of a stage.
#[derive(Debug, Clone)]
pub enum Slot {
    /// The upstream item at this index.
    Upstream(usize),
    /// An item produced by the stage itself.
    Synthetic(ItemRef),
}

/// A stage of the chain.
///
/// `compose` receives the complete output of the stage below and returns the
/// stage's own output as slots. A stage keeps any synthetic items it creates
/// so that they survive recomputation with the same identity.
pub trait ItemsStrategy: Any + Send + Sync {
    /// Which stage this is.
    fn kind(&self) -> StrategyKind;

    /// Produce this stage's output from the upstream items.
    fn compose(&mut self, upstream: &[ItemRef]) -> Vec<Slot>;

    /// Forget cached synthetic items after the source was reset.
    fn reset(&mut self) {}
}

/// Read access to the item list of a stage.
///
/// Reads take `&mut self` because they may trigger a lazy recompute.
pub trait IndexedView {
    /// All items of the view in order.
    fn items(&mut self) -> &[ItemRef];

    /// Map a view index to the index of the backing source record.
    ///
    /// Synthetic items have no source index.
    fn collection_index(&mut self, index: usize) -> Option<usize>;

    /// Map a source index to its position in this view.
    fn display_index(&mut self, source_index: usize) -> Option<usize>;

    fn count(&mut self) -> usize {
        self.items().len()
    }

    /// The item at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    fn at(&mut self, index: usize) -> ItemRef {
        let items = self.items();
        match items.get(index) {
            Some(item) => item.clone(),
            None => panic!("index {} out of range for view of {} items", index, items.len()),
        }
    }

    /// Position of `item` in this view, by identity.
    fn index_of(&mut self, item: &ItemRef) -> Option<usize> {
        self.items().iter().position(|candidate| Arc::ptr_eq(candidate, item))
    }
}

/// Index just past the last top-level node, or 0 when there is none.
pub(crate) fn node_block_end(items: &[ItemRef]) -> usize {
    items
        .iter()
        .rposition(|item| {
            item.is_record() && item.node() == Some(true) && item.parent().is_none_or(|parent| parent.is_root())
        })
        .map_or(0, |index| index + 1)
}

struct LayerCache {
    items: Vec<ItemRef>,
    /// Output index to upstream index.
    origins: Vec<Option<usize>>,
    /// Upstream index to output index.
    reverse: Vec<Option<usize>>,
}

struct Layer {
    strategy: Box<dyn ItemsStrategy>,
    cache: Option<LayerCache>,
}

/// Owns and evaluates the strategy chain.
pub struct Composer {
    direct: DirectStrategy,
    layers: Vec<Layer>,
}

impl Composer {
    pub(crate) fn new(factory: ItemFactory, records: &[RecordRef]) -> Self {
        Self {
            direct: DirectStrategy::new(factory, records),
            layers: Vec::new(),
        }
    }

    // =========================================================================
    // Chain assembly
    // =========================================================================

    /// Append a stage at the outer end of the chain.
    pub fn append(&mut self, strategy: Box<dyn ItemsStrategy>) {
        tracing::debug!(target: targets::STRATEGY, kind = ?strategy.kind(), "appending stage");
        self.layers.push(Layer { strategy, cache: None });
    }

    /// Insert a stage before the first stage of any of `kinds`, or append it
    /// when none of them is present.
    pub fn insert_before(&mut self, kinds: &[StrategyKind], strategy: Box<dyn ItemsStrategy>) {
        let position = self
            .layers
            .iter()
            .position(|layer| kinds.contains(&layer.strategy.kind()))
            .unwrap_or(self.layers.len());
        tracing::debug!(target: targets::STRATEGY, kind = ?strategy.kind(), position, "inserting stage");
        self.invalidate_from(position);
        self.layers.insert(position, Layer { strategy, cache: None });
    }

    /// Remove the stage of `kind`.
    pub fn remove(&mut self, kind: StrategyKind) -> Option<Box<dyn ItemsStrategy>> {
        let position = self.position(kind)?;
        tracing::debug!(target: targets::STRATEGY, ?kind, "removing stage");
        self.invalidate_from(position);
        Some(self.layers.remove(position).strategy)
    }

    pub fn contains(&self, kind: StrategyKind) -> bool {
        kind == StrategyKind::Direct || self.position(kind).is_some()
    }

    /// Kinds of all stages, innermost first.
    pub fn kinds(&self) -> Vec<StrategyKind> {
        std::iter::once(StrategyKind::Direct)
            .chain(self.layers.iter().map(|layer| layer.strategy.kind()))
            .collect()
    }

    fn position(&self, kind: StrategyKind) -> Option<usize> {
        self.layers.iter().position(|layer| layer.strategy.kind() == kind)
    }

    /// Shared access to a stage by type.
    pub fn stage<T: ItemsStrategy>(&self) -> Option<&T> {
        self.layers.iter().find_map(|layer| {
            let any: &dyn Any = layer.strategy.as_ref();
            any.downcast_ref::<T>()
        })
    }

    /// Mutable access to a stage by type.
    ///
    /// Invalidates the stage and every stage after it.
    pub fn stage_mut<T: ItemsStrategy>(&mut self) -> Option<&mut T> {
        let position = self.layers.iter().position(|layer| {
            let any: &dyn Any = layer.strategy.as_ref();
            any.is::<T>()
        })?;
        self.invalidate_from(position);
        let any: &mut dyn Any = self.layers[position].strategy.as_mut();
        any.downcast_mut::<T>()
    }

    /// A view of the chain up to and including the stage of `kind`.
    pub fn view(&mut self, kind: StrategyKind) -> Option<StageView<'_>> {
        let depth = match kind {
            StrategyKind::Direct => 0,
            kind => self.position(kind)? + 1,
        };
        Some(StageView { composer: self, depth })
    }

    pub(crate) fn factory(&self) -> &ItemFactory {
        self.direct.factory()
    }

    /// Items of the direct stage, aligned with the source records.
    pub fn source_items(&self) -> &[ItemRef] {
        self.direct.items()
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Replace `delete_count` items at `start` with items for `added`.
    ///
    /// Returns the removed items.
    ///
    /// # Panics
    ///
    /// Panics if the range exceeds the direct stage.
    pub fn splice(&mut self, start: usize, delete_count: usize, added: &[RecordRef]) -> Vec<ItemRef> {
        let removed = self.direct.splice(start, delete_count, added);
        self.invalidate();
        removed
    }

    /// Move `count` items from `from` to `to`, where `to` is an index into
    /// the list with the moved items already taken out.
    pub fn move_items(&mut self, from: usize, count: usize, to: usize) {
        self.direct.move_items(from, count, to);
        self.invalidate();
    }

    /// Rebuild every item from `records`.
    ///
    /// Returns the previous direct items.
    pub fn reset(&mut self, records: &[RecordRef]) -> Vec<ItemRef> {
        let old = self.direct.reset(records);
        for layer in &mut self.layers {
            layer.strategy.reset();
        }
        self.invalidate();
        old
    }

    /// Drop all cached stage outputs.
    pub fn invalidate(&mut self) {
        self.invalidate_from(0);
    }

    fn invalidate_from(&mut self, position: usize) {
        for layer in self.layers.iter_mut().skip(position) {
            layer.cache = None;
        }
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    fn ensure(&mut self, depth: usize) {
        for level in 1..=depth {
            let (before, rest) = self.layers.split_at_mut(level - 1);
            let layer = &mut rest[0];
            if layer.cache.is_some() {
                continue;
            }

            let upstream: &[ItemRef] = match before.last() {
                None => self.direct.items(),
                Some(previous) => previous.cache.as_ref().map_or(&[], |cache| &cache.items),
            };

            let slots = layer.strategy.compose(upstream);
            let mut cache = LayerCache {
                items: Vec::with_capacity(slots.len()),
                origins: Vec::with_capacity(slots.len()),
                reverse: vec![None; upstream.len()],
            };
            for slot in slots {
                let index = cache.items.len();
                match slot {
                    Slot::Upstream(origin) => {
                        cache.items.push(upstream[origin].clone());
                        cache.origins.push(Some(origin));
                        cache.reverse[origin] = Some(index);
                    }
                    Slot::Synthetic(item) => {
                        cache.items.push(item);
                        cache.origins.push(None);
                    }
                }
            }

            tracing::trace!(
                target: targets::STRATEGY,
                kind = ?layer.strategy.kind(),
                upstream = upstream.len(),
                output = cache.items.len(),
                "stage composed"
            );
            layer.cache = Some(cache);
        }
    }

    fn items_at(&mut self, depth: usize) -> &[ItemRef] {
        self.ensure(depth);
        match depth {
            0 => self.direct.items(),
            depth => self.layers[depth - 1].cache.as_ref().map_or(&[], |cache| &cache.items),
        }
    }

    fn collection_index_at(&mut self, depth: usize, index: usize) -> Option<usize> {
        self.ensure(depth);
        let mut current = index;
        for layer in self.layers[..depth].iter().rev() {
            current = layer.cache.as_ref()?.origins.get(current).copied().flatten()?;
        }
        (current < self.direct.items().len()).then_some(current)
    }

    fn display_index_at(&mut self, depth: usize, source_index: usize) -> Option<usize> {
        self.ensure(depth);
        if source_index >= self.direct.items().len() {
            return None;
        }
        let mut current = source_index;
        for layer in &self.layers[..depth] {
            current = layer.cache.as_ref()?.reverse.get(current).copied().flatten()?;
        }
        Some(current)
    }
}

impl IndexedView for Composer {
    fn items(&mut self) -> &[ItemRef] {
        let depth = self.layers.len();
        self.items_at(depth)
    }

    fn collection_index(&mut self, index: usize) -> Option<usize> {
        let depth = self.layers.len();
        self.collection_index_at(depth, index)
    }

    fn display_index(&mut self, source_index: usize) -> Option<usize> {
        let depth = self.layers.len();
        self.display_index_at(depth, source_index)
    }
}

/// A view of the chain cut off after one stage.
pub struct StageView<'a> {
    composer: &'a mut Composer,
    depth: usize,
}

impl IndexedView for StageView<'_> {
    fn items(&mut self) -> &[ItemRef] {
        self.composer.items_at(self.depth)
    }

    fn collection_index(&mut self, index: usize) -> Option<usize> {
        self.composer.collection_index_at(self.depth, index)
    }

    fn display_index(&mut self, source_index: usize) -> Option<usize> {
        self.composer.display_index_at(self.depth, source_index)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use serde_json::Value;

    use crate::item::{ItemFactory, ItemRef, OwnerId};
    use crate::record::{Record, RecordRef};

    pub fn records(values: Vec<Value>) -> Vec<RecordRef> {
        values
            .into_iter()
            .map(|value| Arc::new(Record::from_value(value).unwrap()))
            .collect()
    }

    pub fn factory() -> ItemFactory {
        ItemFactory::new(OwnerId::next(), "id").with_node_property(Some("node".into()))
    }

    /// Labels for asserting on item lists: the key for records, a tag otherwise.
    pub fn labels(items: &[ItemRef]) -> Vec<String> {
        items
            .iter()
            .map(|item| match item.key() {
                Some(key) if item.is_record() => key.to_string(),
                _ if item.is_group() => format!("group:{:?}", item.group_id()),
                _ if item.is_node_footer() => "footer".to_string(),
                _ if item.is_add_item() => "add".to_string(),
                _ if item.is_invisible() => "invisible".to_string(),
                _ => "?".to_string(),
            })
            .collect()
    }
}
