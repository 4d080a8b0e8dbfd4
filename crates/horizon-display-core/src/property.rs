//! Reactive property cells.
//!
//! A [`Property<T>`] is an interior-mutable value whose setters report whether
//! the stored value actually changed. Display items keep their per-render
//! flags in properties so that a projection can bump versions and emit
//! signals only for real changes.
//!
//! # Example
//!
//! ```
//! use horizon_display_core::{Property, Signal};
//!
//! struct Row {
//!     marked: Property<bool>,
//!     marked_changed: Signal<bool>,
//! }
//!
//! impl Row {
//!     fn set_marked(&self, marked: bool) {
//!         if self.marked.set(marked) {
//!             self.marked_changed.emit(marked);
//!         }
//!     }
//! }
//!
//! let row = Row { marked: Property::new(false), marked_changed: Signal::new() };
//! row.set_marked(true);
//! assert!(row.marked.get());
//! ```

use std::fmt;

use parking_lot::RwLock;

/// An interior-mutable value with change detection.
pub struct Property<T> {
    value: RwLock<T>,
}

impl<T: Clone> Property<T> {
    /// Create a property holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }

    /// Get a clone of the current value.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    /// Borrow the current value for the duration of `f`.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        f(&self.value.read())
    }

    /// Store `value` without comparing it to the current one.
    pub fn set_silent(&self, value: T) {
        *self.value.write() = value;
    }
}

impl<T: Clone + PartialEq> Property<T> {
    /// Store `value`, returning `true` if it differs from the previous value.
    pub fn set(&self, value: T) -> bool {
        let mut current = self.value.write();
        if *current != value {
            *current = value;
            true
        } else {
            false
        }
    }

    /// Store `value`, returning the previous value if it changed.
    pub fn replace(&self, value: T) -> Option<T> {
        let mut current = self.value.write();
        if *current != value {
            Some(std::mem::replace(&mut *current, value))
        } else {
            None
        }
    }
}

impl<T: Clone> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl<T: Clone + Default> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("value", &self.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_reports_change() {
        let prop = Property::new(1);
        assert!(!prop.set(1));
        assert!(prop.set(2));
        assert_eq!(prop.get(), 2);
    }

    #[test]
    fn test_replace_returns_old_value() {
        let prop = Property::new(Some(10.0_f64));
        assert_eq!(prop.replace(Some(10.0)), None);
        assert_eq!(prop.replace(Some(20.0)), Some(Some(10.0)));
        assert_eq!(prop.get(), Some(20.0));
    }

    #[test]
    fn test_with_and_silent_set() {
        let prop = Property::new(String::from("a"));
        prop.set_silent(String::from("bc"));
        assert_eq!(prop.with(|s| s.len()), 2);
    }

    #[test]
    fn test_clone_is_independent() {
        let prop = Property::new(vec![1]);
        let copy = prop.clone();
        prop.set(vec![2]);
        assert_eq!(copy.get(), vec![1]);
    }
}
