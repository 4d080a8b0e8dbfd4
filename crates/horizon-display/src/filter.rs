//! Filter and sort registry.
//!
//! The registry sits on top of the strategy chain. It decides which of the
//! chain's items are visible and in which order, and keeps the resulting
//! mapping between display indices and chain indices until the next
//! invalidation.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use horizon_display_core::PerfSpan;

use crate::item::{DisplayItem, GroupId, ItemRef};
use crate::record::RecordRef;

/// What a filter predicate sees for one item.
pub struct FilterContext<'a> {
    /// The item under test.
    pub item: &'a ItemRef,
    /// Index of the backing record in the source, `None` for synthetic items.
    pub source_index: Option<usize>,
    /// Position of the item in the strategy chain output.
    pub index: usize,
}

impl FilterContext<'_> {
    /// The record behind the item.
    pub fn contents(&self) -> Option<&RecordRef> {
        self.item.contents()
    }
}

/// A visibility predicate.
pub type FilterFn = Arc<dyn Fn(&FilterContext<'_>) -> bool + Send + Sync>;

/// What a comparator sees for one item.
pub struct SortEntry<'a> {
    pub item: &'a ItemRef,
    pub source_index: Option<usize>,
    pub index: usize,
}

/// An ordering over items. Ties keep the strategy chain order.
pub type SortFn = Arc<dyn Fn(&SortEntry<'_>, &SortEntry<'_>) -> Ordering + Send + Sync>;

/// Handle of a registered filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterId(u64);

/// Handle of a registered comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SortId(u64);

struct FilterEntry {
    id: FilterId,
    filter: FilterFn,
    /// Installed by a projection itself; survives `clear_filters`.
    pinned: bool,
}

/// Display order produced by a rebuild.
struct RowMapping {
    /// Display index to chain index.
    display_to_chain: Vec<usize>,
    /// Chain index to display index (None if hidden).
    chain_to_display: Vec<Option<usize>>,
    items: Vec<ItemRef>,
    sources: Vec<Option<usize>>,
}

pub(crate) struct Registry {
    filters: Vec<FilterEntry>,
    sorts: Vec<(SortId, SortFn)>,
    collapsed_groups: HashSet<GroupId>,
    mapping: Option<RowMapping>,
    next_id: u64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            filters: Vec::new(),
            sorts: Vec::new(),
            collapsed_groups: HashSet::new(),
            mapping: None,
            next_id: 1,
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // =========================================================================
    // Filters
    // =========================================================================

    pub(crate) fn add_filter(&mut self, filter: FilterFn) -> FilterId {
        self.push_filter(filter, false)
    }

    pub(crate) fn add_pinned_filter(&mut self, filter: FilterFn) -> FilterId {
        self.push_filter(filter, true)
    }

    fn push_filter(&mut self, filter: FilterFn, pinned: bool) -> FilterId {
        let id = FilterId(self.next_id());
        self.filters.push(FilterEntry { id, filter, pinned });
        self.invalidate();
        id
    }

    pub(crate) fn remove_filter(&mut self, id: FilterId) -> bool {
        let before = self.filters.len();
        self.filters.retain(|entry| entry.id != id);
        let removed = self.filters.len() != before;
        if removed {
            self.invalidate();
        }
        removed
    }

    /// Remove every filter that was not installed by the projection itself.
    pub(crate) fn clear_filters(&mut self) {
        self.filters.retain(|entry| entry.pinned);
        self.invalidate();
    }

    pub(crate) fn filter_count(&self) -> usize {
        self.filters.iter().filter(|entry| !entry.pinned).count()
    }

    // =========================================================================
    // Sorting and grouping
    // =========================================================================

    pub(crate) fn add_sort(&mut self, sort: SortFn) -> SortId {
        let id = SortId(self.next_id());
        self.sorts.push((id, sort));
        self.invalidate();
        id
    }

    pub(crate) fn remove_sort(&mut self, id: SortId) -> bool {
        let before = self.sorts.len();
        self.sorts.retain(|(sort_id, _)| *sort_id != id);
        let removed = self.sorts.len() != before;
        if removed {
            self.invalidate();
        }
        removed
    }

    pub(crate) fn clear_sorts(&mut self) {
        self.sorts.clear();
        self.invalidate();
    }

    pub(crate) fn collapsed_groups(&self) -> &HashSet<GroupId> {
        &self.collapsed_groups
    }

    pub(crate) fn set_collapsed_groups(&mut self, groups: HashSet<GroupId>) -> bool {
        if self.collapsed_groups == groups {
            return false;
        }
        self.collapsed_groups = groups;
        self.invalidate();
        true
    }

    // =========================================================================
    // Mapping
    // =========================================================================

    pub(crate) fn invalidate(&mut self) {
        self.mapping = None;
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.mapping.is_some()
    }

    /// Recompute the display order for the chain output `items`, where
    /// `sources[i]` is the source index of `items[i]`.
    pub(crate) fn rebuild(&mut self, items: &[ItemRef], sources: &[Option<usize>]) {
        let _perf = PerfSpan::new("registry.rebuild");

        let mut visible = self.visible(items, sources);
        if !self.sorts.is_empty() {
            visible = self.sort_block(&visible, items, sources);
        }

        let mut chain_to_display = vec![None; items.len()];
        for (display, &chain) in visible.iter().enumerate() {
            chain_to_display[chain] = Some(display);
        }
        self.mapping = Some(RowMapping {
            items: visible.iter().map(|&chain| items[chain].clone()).collect(),
            sources: visible.iter().map(|&chain| sources[chain]).collect(),
            display_to_chain: visible,
            chain_to_display,
        });
    }

    fn visible(&self, items: &[ItemRef], sources: &[Option<usize>]) -> Vec<usize> {
        let mut visible = Vec::with_capacity(items.len());
        let mut collapsed = false;
        // Hidden records; synthetic rows parented to them are hidden as well.
        let mut rejected: HashSet<*const DisplayItem> = HashSet::new();

        for (index, item) in items.iter().enumerate() {
            if let Some(group) = item.group_id() {
                collapsed = self.collapsed_groups.contains(group);
                visible.push(index);
                continue;
            }
            if collapsed {
                continue;
            }
            let record = item.is_record();
            if !record && item.parent().is_some_and(|parent| rejected.contains(&Arc::as_ptr(&parent))) {
                continue;
            }
            let context = FilterContext {
                item,
                source_index: sources[index],
                index,
            };
            let passes = self
                .filters
                .iter()
                .filter(|entry| entry.pinned || record)
                .all(|entry| (entry.filter)(&context));
            if passes {
                visible.push(index);
            } else if record {
                rejected.insert(Arc::as_ptr(item));
            }
        }

        // Headers of groups that lost all their members go too, unless the
        // group is collapsed.
        let mut kept = Vec::with_capacity(visible.len());
        for (position, &index) in visible.iter().enumerate() {
            if let Some(group) = items[index].group_id() {
                let has_member = visible
                    .get(position + 1)
                    .is_some_and(|&next| !items[next].is_group());
                if !has_member && !self.collapsed_groups.contains(group) {
                    continue;
                }
            }
            kept.push(index);
        }
        kept
    }

    /// Sort a run of items forming a forest.
    ///
    /// Each record-backed item is sorted among its siblings and carries its
    /// descendants along. Synthetic items (group headers, footers, fillers)
    /// stay in place and split the siblings around them into separate runs.
    fn sort_block(&self, entries: &[usize], items: &[ItemRef], sources: &[Option<usize>]) -> Vec<usize> {
        let mut nodes: Vec<(usize, Vec<usize>)> = Vec::new();
        for &index in entries {
            let level = items[index].level();
            match nodes.last_mut() {
                Some((head, body)) if level > items[*head].level() => body.push(index),
                _ => nodes.push((index, Vec::new())),
            }
        }

        let mut sorted = Vec::with_capacity(entries.len());
        let mut run: Vec<(usize, Vec<usize>)> = Vec::new();
        for (head, body) in nodes {
            let body = self.sort_block(&body, items, sources);
            if items[head].is_record() {
                run.push((head, body));
                continue;
            }
            self.flush_run(&mut run, &mut sorted, items, sources);
            sorted.push(head);
            sorted.extend(body);
        }
        self.flush_run(&mut run, &mut sorted, items, sources);
        sorted
    }

    fn flush_run(
        &self,
        run: &mut Vec<(usize, Vec<usize>)>,
        sorted: &mut Vec<usize>,
        items: &[ItemRef],
        sources: &[Option<usize>],
    ) {
        run.sort_by(|(a, _), (b, _)| {
            let a = SortEntry {
                item: &items[*a],
                source_index: sources[*a],
                index: *a,
            };
            let b = SortEntry {
                item: &items[*b],
                source_index: sources[*b],
                index: *b,
            };
            self.sorts
                .iter()
                .map(|(_, sort)| sort(&a, &b))
                .find(|ordering| ordering.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        for (head, body) in run.drain(..) {
            sorted.push(head);
            sorted.extend(body);
        }
    }

    /// Visible items. Empty until the first rebuild.
    pub(crate) fn items(&self) -> &[ItemRef] {
        self.mapping.as_ref().map_or(&[], |mapping| &mapping.items)
    }

    pub(crate) fn source_index(&self, display: usize) -> Option<usize> {
        self.mapping.as_ref()?.sources.get(display).copied().flatten()
    }

    pub(crate) fn display_to_chain(&self, display: usize) -> Option<usize> {
        self.mapping.as_ref()?.display_to_chain.get(display).copied()
    }

    pub(crate) fn chain_to_display(&self, chain: usize) -> Option<usize> {
        self.mapping.as_ref()?.chain_to_display.get(chain).copied().flatten()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("filters", &self.filters.len())
            .field("sorts", &self.sorts.len())
            .field("collapsed_groups", &self.collapsed_groups)
            .field("valid", &self.is_valid())
            .finish()
    }
}
