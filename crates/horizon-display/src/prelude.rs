//! Prelude module for Horizon Display.
//!
//! ```
//! use horizon_display::prelude::*;
//! ```
//!
//! This provides access to:
//! - Records (`RecordSet`, `Record`, `Key`)
//! - Projections (`Collection`, `Tree`, `TreeTile`) and their options
//! - Item capability traits (`Markable`, `Selectable`, `Draggable`, `Expandable`)
//! - Controllers and the signal type used to observe everything

// ============================================================================
// Records
// ============================================================================

pub use crate::record::{ChangeAction, Key, Record, RecordSet};

// ============================================================================
// Projections
// ============================================================================

pub use crate::collection::{Collection, DragPosition, DropPosition, ProjectionChange};
pub use crate::options::DisplayOptions;
pub use crate::tile::TreeTile;
pub use crate::tree::Tree;

// ============================================================================
// Items
// ============================================================================

pub use crate::item::{Draggable, Expandable, ItemRef, Markable, Selectable};
pub use crate::strategy::{AddItemPlacement, IndexedView};

// ============================================================================
// Controllers
// ============================================================================

pub use crate::controller::{MarkerController, MarkerVisibility, Selection, SelectionController};

// ============================================================================
// Core
// ============================================================================

pub use crate::error::DisplayError;
pub use horizon_display_core::{Property, Signal};
