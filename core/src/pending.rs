use std::collections::BTreeSet;

use tether_signals::{Mut, Read};

/// Ids with a mutation currently in flight.
///
/// Derived state only: never persisted, and rebuilt empty with the controller
/// that owns it. `mark` and `unmark` are idempotent; both return whether the
/// set actually changed, and only an actual change notifies listeners.
pub struct PendingSet<Id: Ord + Clone + 'static>(Mut<BTreeSet<Id>>);

impl<Id: Ord + Clone + 'static> PendingSet<Id> {
    pub fn new() -> Self { Self(Mut::new(BTreeSet::new())) }

    pub fn mark(&self, id: Id) -> bool { self.mark_all(std::iter::once(id)) }

    pub fn unmark(&self, id: &Id) -> bool { self.unmark_all(std::slice::from_ref(id)) }

    /// Mark several ids with a single notification
    pub fn mark_all(&self, ids: impl IntoIterator<Item = Id>) -> bool {
        let ids: Vec<Id> = ids.into_iter().filter(|id| !self.contains(id)).collect();
        if ids.is_empty() {
            return false;
        }
        self.0.update(|set| ids.into_iter().fold(false, |changed, id| set.insert(id) || changed))
    }

    /// Unmark several ids with a single notification
    pub fn unmark_all(&self, ids: &[Id]) -> bool {
        if !ids.iter().any(|id| self.contains(id)) {
            return false;
        }
        self.0.update(|set| ids.iter().fold(false, |changed, id| set.remove(id) || changed))
    }

    pub fn contains(&self, id: &Id) -> bool { self.0.with(|set| set.contains(id)) }

    pub fn is_empty(&self) -> bool { self.0.with(BTreeSet::is_empty) }

    pub fn len(&self) -> usize { self.0.with(BTreeSet::len) }

    /// Pending ids in ascending order
    pub fn ids(&self) -> Vec<Id> { self.0.with(|set| set.iter().cloned().collect()) }

    pub fn signal(&self) -> Read<BTreeSet<Id>> { self.0.read() }
}

impl<Id: Ord + Clone + 'static> Default for PendingSet<Id> {
    fn default() -> Self { Self::new() }
}

impl<Id: Ord + Clone + std::fmt::Debug + 'static> std::fmt::Debug for PendingSet<Id> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { self.0.with(|set| write!(f, "PendingSet {set:?}")) }
}
