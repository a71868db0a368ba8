use std::cmp::Ordering;
use std::sync::Arc;

use crate::traits::Record;

type Compare<E> = Arc<dyn Fn(&E, &E) -> Ordering + Send + Sync>;

/// How a collection is ordered, used to put a deleted entity back after its
/// remote delete fails.
///
/// The list may have changed while the delete was in flight, so the original
/// index alone is not trusted.
pub enum CollectionOrder<E> {
    /// Insertion order. The entity goes back in front of the entity that
    /// followed it when it was removed; if that one is gone too, at the
    /// original index clamped to the current length.
    Positional,
    /// Sorted by a comparator. The entity goes after every entity that does not
    /// sort strictly after it, so ties keep existing entities first.
    Sorted(Compare<E>),
}

/// Where a removed entity used to be
#[derive(Debug, Clone)]
pub(crate) struct Vacancy<Id> {
    pub index: usize,
    pub next: Option<Id>,
}

impl<E: Record> CollectionOrder<E> {
    pub fn by(compare: impl Fn(&E, &E) -> Ordering + Send + Sync + 'static) -> Self { Self::Sorted(Arc::new(compare)) }

    pub fn by_key<K: Ord>(key: impl Fn(&E) -> K + Send + Sync + 'static) -> Self { Self::by(move |a, b| key(a).cmp(&key(b))) }

    /// Descending by key, e.g. most-recent-first by a creation timestamp
    pub fn by_key_desc<K: Ord>(key: impl Fn(&E) -> K + Send + Sync + 'static) -> Self { Self::by(move |a, b| key(b).cmp(&key(a))) }

    pub(crate) fn reinsert_at(&self, entities: &[E], entity: &E, vacancy: &Vacancy<E::Id>) -> usize {
        match self {
            CollectionOrder::Positional => vacancy
                .next
                .as_ref()
                .and_then(|next| entities.iter().position(|e| &e.id() == next))
                .unwrap_or_else(|| vacancy.index.min(entities.len())),
            CollectionOrder::Sorted(compare) => entities.partition_point(|existing| compare(existing, entity) != Ordering::Greater),
        }
    }
}

impl<E> Clone for CollectionOrder<E> {
    fn clone(&self) -> Self {
        match self {
            CollectionOrder::Positional => CollectionOrder::Positional,
            CollectionOrder::Sorted(compare) => CollectionOrder::Sorted(compare.clone()),
        }
    }
}

impl<E> Default for CollectionOrder<E> {
    fn default() -> Self { CollectionOrder::Positional }
}

impl<E> std::fmt::Debug for CollectionOrder<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectionOrder::Positional => write!(f, "Positional"),
            CollectionOrder::Sorted(_) => write!(f, "Sorted(..)"),
        }
    }
}
