//! Core primitives for Horizon Display.
//!
//! This crate provides the building blocks the projection engine is written
//! on top of:
//!
//! - **Signal/Slot System**: Type-safe, synchronous change notification
//! - **Property System**: Interior-mutable values with change detection
//! - **Logging**: Tracing targets, wrapper macros, perf spans and a tree
//!   formatter for dumping projections
//!
//! # Example
//!
//! ```
//! use horizon_display_core::{Property, Signal};
//!
//! struct Counter {
//!     value: Property<i32>,
//!     value_changed: Signal<i32>,
//! }
//!
//! impl Counter {
//!     fn increment(&self) {
//!         let new_value = self.value.get() + 1;
//!         if self.value.set(new_value) {
//!             self.value_changed.emit(new_value);
//!         }
//!     }
//! }
//!
//! let counter = Counter { value: Property::new(0), value_changed: Signal::new() };
//! counter.increment();
//! assert_eq!(counter.value.get(), 1);
//! ```

pub mod logging;
pub mod property;
pub mod signal;

pub use logging::{DebugRow, PerfSpan, ProjectionDebug, TreeFormatOptions, TreeStyle};
pub use property::Property;
pub use signal::{ConnectionGuard, ConnectionId, Signal};

#[doc(hidden)]
pub use tracing;
