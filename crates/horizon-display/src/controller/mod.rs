//! Controllers that keep per-item state in step with a projection.
//!
//! - [`MarkerController`]: the single "current row" marker
//! - [`SelectionController`]: key-based multi-selection with select-all
//! - [`ObserversController`]: load-trigger offsets for virtual scrolling
//!
//! Marker and selection controllers subscribe to the projection's
//! `collection_changed` signal and disconnect when dropped.

mod marker;
mod observers;
mod selection;

pub use marker::{MarkerController, MarkerVisibility};
pub use observers::{
    BOTTOM_INDICATOR_OFFSET, DEFAULT_TRIGGER_OFFSET, ObserversController, ObserversOptions, ScrollDirection,
    TOP_INDICATOR_OFFSET, TriggerOffsets,
};
pub use selection::{KeysDifference, Selection, SelectionController, SelectionDifference, SelectionKey};
