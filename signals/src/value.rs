use std::sync::{Arc, RwLock};

/// Shared storage behind a [`crate::Mut`] and every [`crate::Read`] derived from it.
pub struct ValueCell<T>(Arc<RwLock<T>>);

/// Read-only handle onto the same storage as a [`ValueCell`]
pub struct ReadValueCell<T>(Arc<RwLock<T>>);

impl<T> Clone for ValueCell<T> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<T> Clone for ReadValueCell<T> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<T> ValueCell<T> {
    pub fn new(value: T) -> Self { Self(Arc::new(RwLock::new(value))) }

    pub fn set(&self, value: T) { *self.0.write().expect("value cell poisoned") = value; }

    /// Replace the value only if it differs. Returns whether it was replaced.
    pub fn set_if_changed(&self, value: T) -> bool
    where T: PartialEq {
        let mut current = self.0.write().expect("value cell poisoned");
        if *current == value {
            return false;
        }
        *current = value;
        true
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R { f(&self.0.read().expect("value cell poisoned")) }

    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R { f(&mut self.0.write().expect("value cell poisoned")) }

    pub fn readvalue(&self) -> ReadValueCell<T> { ReadValueCell(self.0.clone()) }
}

impl<T: Clone> ValueCell<T> {
    pub fn value(&self) -> T { self.0.read().expect("value cell poisoned").clone() }
}

impl<T> ReadValueCell<T> {
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R { f(&self.0.read().expect("value cell poisoned")) }
}

impl<T: Clone> ReadValueCell<T> {
    pub fn value(&self) -> T { self.0.read().expect("value cell poisoned").clone() }
}
