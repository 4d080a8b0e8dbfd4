//! Offsets of the load triggers used for virtual scrolling.
//!
//! A list places two invisible triggers near its top and bottom edges; when
//! one scrolls into view, more data is loaded. The controller computes how far
//! from the edges the triggers sit so that loading starts a bit before the
//! user actually reaches the edge.

use horizon_display_core::Signal;
use horizon_display_core::logging::targets;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::item::OwnerId;

/// Default share of the visible height used as trigger offset.
pub const DEFAULT_TRIGGER_OFFSET: f64 = 0.3;

/// Added to the top offset while the top loading indicator is displayed.
pub const TOP_INDICATOR_OFFSET: f64 = -1.0;

/// Added to the bottom offset while the bottom loading indicator is displayed.
pub const BOTTOM_INDICATOR_OFFSET: f64 = 0.0;

/// Distances of the triggers from the list edges.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TriggerOffsets {
    pub top: f64,
    pub bottom: f64,
}

/// Direction of a scroll that reached an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

/// Inputs of the offset calculation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserversOptions {
    /// Full height of the list content.
    pub view_height: f64,
    /// Height of the scroll container's visible area.
    pub viewport_height: f64,
    pub scroll_top: f64,
    pub top_coefficient: f64,
    pub bottom_coefficient: f64,
    pub reset_top_offset: bool,
    pub reset_bottom_offset: bool,
    pub top_indicator_displayed: bool,
    pub bottom_indicator_displayed: bool,
}

impl Default for ObserversOptions {
    fn default() -> Self {
        Self {
            view_height: 0.0,
            viewport_height: 0.0,
            scroll_top: 0.0,
            top_coefficient: DEFAULT_TRIGGER_OFFSET,
            bottom_coefficient: DEFAULT_TRIGGER_OFFSET,
            reset_top_offset: false,
            reset_bottom_offset: false,
            top_indicator_displayed: false,
            bottom_indicator_displayed: false,
        }
    }
}

impl ObserversOptions {
    /// Trigger offsets for these inputs.
    pub fn offsets(&self) -> TriggerOffsets {
        let scroll_bottom = (self.view_height - self.scroll_top - self.viewport_height).max(0.0);
        let max_top = (self.scroll_top + self.viewport_height / 2.0).min(self.view_height / 2.0);
        let max_bottom = (scroll_bottom + self.viewport_height / 2.0).min(self.view_height / 2.0);

        let base = if self.view_height != 0.0 && self.viewport_height != 0.0 {
            self.view_height.min(self.viewport_height)
        } else {
            0.0
        };

        let mut top = if self.reset_top_offset {
            0.0
        } else {
            (base * self.top_coefficient).min(max_top)
        };
        let mut bottom = if self.reset_bottom_offset {
            0.0
        } else {
            (base * self.bottom_coefficient).min(max_bottom)
        };

        if self.top_indicator_displayed {
            top += TOP_INDICATOR_OFFSET;
        }
        if self.bottom_indicator_displayed {
            bottom += BOTTOM_INDICATOR_OFFSET;
        }
        TriggerOffsets { top, bottom }
    }
}

struct State {
    options: ObserversOptions,
    projection: Option<OwnerId>,
    offsets: TriggerOffsets,
}

/// Keeps the trigger offsets up to date as the scroll geometry changes.
///
/// Every setter returns `true` if the offsets changed;
/// `trigger_offsets_changed` is emitted only in that case.
pub struct ObserversController {
    state: Mutex<State>,
    pub trigger_offsets_changed: Signal<TriggerOffsets>,
}

impl ObserversController {
    pub fn new(options: ObserversOptions) -> Self {
        Self {
            state: Mutex::new(State {
                options,
                projection: None,
                offsets: options.offsets(),
            }),
            trigger_offsets_changed: Signal::new(),
        }
    }

    pub fn offsets(&self) -> TriggerOffsets {
        self.state.lock().offsets
    }

    pub fn options(&self) -> ObserversOptions {
        self.state.lock().options
    }

    /// Apply `update` to the inputs and recompute if any of them changed.
    fn update(&self, update: impl FnOnce(&mut ObserversOptions)) -> bool {
        let offsets = {
            let mut state = self.state.lock();
            let mut options = state.options;
            update(&mut options);
            if options == state.options {
                return false;
            }
            state.options = options;
            let offsets = options.offsets();
            if offsets == state.offsets {
                return false;
            }
            state.offsets = offsets;
            offsets
        };
        tracing::trace!(target: targets::CONTROLLER, top = offsets.top, bottom = offsets.bottom, "trigger offsets changed");
        self.trigger_offsets_changed.emit(offsets);
        true
    }

    pub fn set_view_height(&self, height: f64) -> bool {
        self.update(|options| options.view_height = height)
    }

    pub fn set_viewport_height(&self, height: f64) -> bool {
        self.update(|options| options.viewport_height = height)
    }

    pub fn set_scroll_top(&self, scroll_top: f64) -> bool {
        self.update(|options| options.scroll_top = scroll_top)
    }

    pub fn set_coefficients(&self, top: f64, bottom: f64) -> bool {
        self.update(|options| {
            options.top_coefficient = top;
            options.bottom_coefficient = bottom;
        })
    }

    /// Force one or both offsets to zero.
    pub fn set_reset_offsets(&self, top: bool, bottom: bool) -> bool {
        self.update(|options| {
            options.reset_top_offset = top;
            options.reset_bottom_offset = bottom;
        })
    }

    /// Lift the reset for the edge the user scrolled towards.
    pub fn clear_reset_offset(&self, direction: ScrollDirection) -> bool {
        self.update(|options| match direction {
            ScrollDirection::Up => options.reset_top_offset = false,
            ScrollDirection::Down => options.reset_bottom_offset = false,
        })
    }

    pub fn set_indicators_displayed(&self, top: bool, bottom: bool) -> bool {
        self.update(|options| {
            options.top_indicator_displayed = top;
            options.bottom_indicator_displayed = bottom;
        })
    }

    /// Replace all geometric inputs at once.
    pub fn update_options(&self, options: ObserversOptions) -> bool {
        self.update(|current| *current = options)
    }

    /// Tell the controller which projection it serves.
    ///
    /// A different projection means a reload, so both offsets are reset until
    /// the user scrolls again.
    pub fn set_projection(&self, projection: Option<OwnerId>) -> bool {
        {
            let mut state = self.state.lock();
            if state.projection == projection {
                return false;
            }
            state.projection = projection;
        }
        self.set_reset_offsets(true, true)
    }
}

impl std::fmt::Debug for ObserversController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ObserversController")
            .field("options", &state.options)
            .field("offsets", &state.offsets)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn options() -> ObserversOptions {
        ObserversOptions {
            view_height: 1000.0,
            viewport_height: 400.0,
            scroll_top: 0.0,
            ..ObserversOptions::default()
        }
    }

    #[test]
    fn test_offsets_formula() {
        let offsets = options().offsets();
        // base is min(view, viewport) = 400
        assert_eq!(offsets.top, 120.0);
        assert_eq!(offsets.bottom, 120.0);

        let small = ObserversOptions {
            view_height: 100.0,
            viewport_height: 400.0,
            ..ObserversOptions::default()
        };
        // base is the view height
        assert_eq!(small.offsets(), TriggerOffsets { top: 30.0, bottom: 30.0 });
    }

    #[test]
    fn test_zero_heights_give_zero_offsets() {
        assert_eq!(ObserversOptions::default().offsets(), TriggerOffsets::default());
    }

    #[test]
    fn test_reset_and_indicator() {
        let options = ObserversOptions {
            reset_top_offset: true,
            top_indicator_displayed: true,
            bottom_indicator_displayed: true,
            ..options()
        };
        assert_eq!(options.offsets(), TriggerOffsets { top: -1.0, bottom: 120.0 });
    }

    #[test]
    fn test_emits_only_on_change() {
        let controller = ObserversController::new(options());
        let emitted = Arc::new(Mutex::new(Vec::new()));
        let recorder = emitted.clone();
        controller
            .trigger_offsets_changed
            .connect(move |offsets| recorder.lock().push(*offsets));

        assert!(!controller.set_view_height(1000.0));
        // scrolling a little does not reach the caps
        assert!(!controller.set_scroll_top(10.0));
        assert!(controller.set_viewport_height(200.0));
        assert_eq!(controller.offsets(), TriggerOffsets { top: 60.0, bottom: 60.0 });
        assert_eq!(emitted.lock().len(), 1);
    }

    #[test]
    fn test_projection_change_resets_offsets() {
        let controller = ObserversController::new(options());
        assert!(controller.set_projection(Some(OwnerId::next())));
        assert_eq!(controller.offsets(), TriggerOffsets::default());

        assert!(controller.clear_reset_offset(ScrollDirection::Down));
        assert_eq!(controller.offsets(), TriggerOffsets { top: 0.0, bottom: 120.0 });
        assert!(!controller.clear_reset_offset(ScrollDirection::Down));
    }
}
