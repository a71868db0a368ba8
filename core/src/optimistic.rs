//! Optimistic mutation of a server-owned list.
//!
//! An [`Optimistic`] controller owns the list presented by one UI surface. A
//! mutation rewrites the local list immediately, marks the affected ids as
//! pending, and only then issues the remote write. When the write settles the
//! ids are unmarked and the optimistic state is either kept (success) or
//! replaced by the pre-mutation snapshot (failure), so the list always shows
//! either confirmed data or confirmed data plus an in-flight overlay.
//!
//! Mutations on different ids are independent and may be in flight at the
//! same time. Mutations on the same id are not serialized: the second one
//! snapshots the first one's optimistic state, so if the second fails it rolls
//! back to that state rather than to the last confirmed server value, and the
//! first settlement unmarks the id even if the second is still in flight.
//! Completions land in whatever order the remote calls resolve.
//! A mutation whose future is dropped before its remote call settles is
//! rolled back as if the call had failed.

use std::collections::HashSet;
use std::sync::Arc;

use tether_signals::broadcast::{Broadcast, ListenerGuard};
use tether_signals::{Mut, Read};
use tracing::{debug, info, warn};

use crate::error::RemoteError;
use crate::notice::MutationNotice;
use crate::order::{CollectionOrder, Vacancy};
use crate::pending::PendingSet;
use crate::traits::{Record, Remote, Transition};

/// How a mutation ended
#[derive(Debug)]
pub enum MutationOutcome {
    /// The remote write succeeded and the optimistic state stands
    Committed,
    /// The remote write failed and the local list was restored
    RolledBack(RemoteError),
    /// None of the requested ids exist; nothing was touched
    Ignored,
}

impl MutationOutcome {
    pub fn is_committed(&self) -> bool { matches!(self, MutationOutcome::Committed) }

    pub fn is_rolled_back(&self) -> bool { matches!(self, MutationOutcome::RolledBack(_)) }
}

/// Pre-mutation copies of the affected entities, held for one mutation only.
#[derive(Debug)]
pub struct MutationSnapshot<E>(Vec<E>);

impl<E: Record> MutationSnapshot<E> {
    fn capture(entities: &[E], ids: &[E::Id]) -> Self {
        Self(ids.iter().filter_map(|id| entities.iter().find(|e| &e.id() == id).cloned()).collect())
    }

    /// Put the captured entities back in place. Entities deleted since the
    /// capture stay deleted.
    fn restore(self, entities: &mut [E]) {
        for original in self.0 {
            let id = original.id();
            if let Some(slot) = entities.iter_mut().find(|e| e.id() == id) {
                *slot = original;
            }
        }
    }
}

/// A row of the list view together with whether it is mid-mutation
#[derive(Debug, Clone, PartialEq)]
pub struct Row<E> {
    pub entity: E,
    pub pending: bool,
}

/// How to undo one optimistic mutation
enum Rollback<E: Record> {
    Restore(MutationSnapshot<E>),
    Reinsert(E, Vacancy<E::Id>),
}

/// Ids of one in-flight mutation together with its undo.
///
/// Settling consumes it. If the mutation future is dropped before the remote
/// call settles (a timeout, a `select!`, an aborted host task) the drop rolls
/// the mutation back and unmarks its ids.
struct Settlement<'a, E: Record, V> {
    inner: &'a Inner<E, V>,
    ids: Vec<E::Id>,
    rollback: Option<Rollback<E>>,
}

impl<'a, E: Record, V> Settlement<'a, E, V> {
    fn new(inner: &'a Inner<E, V>, ids: Vec<E::Id>, rollback: Rollback<E>) -> Self { Self { inner, ids, rollback: Some(rollback) } }

    /// Keep the optimistic state
    fn commit(mut self) -> Vec<E::Id> {
        self.rollback = None;
        self.release()
    }

    /// Undo the optimistic state
    fn roll_back(mut self) -> Vec<E::Id> {
        if let Some(rollback) = self.rollback.take() {
            self.inner.undo(rollback);
        }
        self.release()
    }

    fn release(&mut self) -> Vec<E::Id> {
        let ids = std::mem::take(&mut self.ids);
        self.inner.pending.unmark_all(&ids);
        ids
    }
}

impl<E: Record, V> Drop for Settlement<'_, E, V> {
    fn drop(&mut self) {
        let Some(rollback) = self.rollback.take() else { return };
        warn!("mutation for {:?} abandoned before the remote call settled, rolling back", self.ids);
        self.inner.undo(rollback);
        self.release();
    }
}

/// Controller for one list view. Cheap to clone; clones share the same list.
pub struct Optimistic<E: Record, V>(Arc<Inner<E, V>>);

impl<E: Record, V> Clone for Optimistic<E, V> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

struct Inner<E: Record, V> {
    entities: Mut<Vec<E>>,
    pending: PendingSet<E::Id>,
    remote: Arc<dyn Remote<E, V>>,
    order: std::sync::RwLock<CollectionOrder<E>>,
    notices: Broadcast<MutationNotice<E::Id>>,
}

impl<E: Record, V> Inner<E, V> {
    fn undo(&self, rollback: Rollback<E>) {
        match rollback {
            Rollback::Restore(snapshot) => self.entities.update(|entities| snapshot.restore(entities)),
            Rollback::Reinsert(entity, vacancy) => self.entities.update(|entities| {
                // a reseed may already have brought it back
                let id = entity.id();
                if entities.iter().any(|e| e.id() == id) {
                    return;
                }
                let at = self.order.read().expect("order poisoned").reinsert_at(entities, &entity, &vacancy);
                entities.insert(at, entity);
            }),
        }
    }
}

impl<E, V> Optimistic<E, V>
where
    E: Record,
    V: Transition<E>,
{
    pub fn new<R>(entities: Vec<E>, remote: R) -> Self
    where R: Remote<E, V> + 'static {
        Self::with_remote(entities, Arc::new(remote))
    }

    pub fn with_remote(entities: Vec<E>, remote: Arc<dyn Remote<E, V>>) -> Self {
        Self(Arc::new(Inner {
            entities: Mut::new(entities),
            pending: PendingSet::new(),
            remote,
            order: std::sync::RwLock::new(CollectionOrder::default()),
            notices: Broadcast::new(),
        }))
    }

    /// Set the ordering used to reinsert entities whose delete failed
    pub fn with_order(self, order: CollectionOrder<E>) -> Self {
        self.set_order(order);
        self
    }

    pub fn set_order(&self, order: CollectionOrder<E>) { *self.0.order.write().expect("order poisoned") = order; }

    /// Optimistically apply `value` to one entity and write it remotely
    pub async fn apply_status(&self, id: E::Id, value: V) -> MutationOutcome { self.apply(vec![id], value).await }

    /// Optimistically apply `value` to several entities with one remote call.
    ///
    /// All-or-nothing: a failed call rolls every entity back together. Ids
    /// without an entity are dropped from the batch and duplicates collapse.
    pub async fn apply_bulk(&self, ids: impl IntoIterator<Item = E::Id>, value: V) -> MutationOutcome {
        let mut seen = HashSet::new();
        let ids: Vec<E::Id> = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();
        self.apply(ids, value).await
    }

    async fn apply(&self, ids: Vec<E::Id>, value: V) -> MutationOutcome {
        let inner = &self.0;

        let snapshot = inner.entities.with(|entities| MutationSnapshot::capture(entities, &ids));
        if snapshot.0.is_empty() {
            debug!("mutation ignored, no entity for {ids:?}");
            return MutationOutcome::Ignored;
        }
        // only the ids that exist take part in the mutation
        let ids: Vec<E::Id> = snapshot.0.iter().map(Record::id).collect();

        inner.entities.update(|entities| {
            for entity in entities.iter_mut().filter(|e| ids.contains(&e.id())) {
                value.apply_to(entity);
            }
        });
        inner.pending.mark_all(ids.iter().cloned());
        let settlement = Settlement::new(inner, ids, Rollback::Restore(snapshot));
        debug!("optimistically applied to {:?}", settlement.ids);

        let result = inner.remote.mutate(&settlement.ids, &value).await;
        match result {
            Ok(()) => {
                let ids = settlement.commit();
                info!("mutation committed for {ids:?}");
                inner.notices.send(MutationNotice::Committed { ids });
                MutationOutcome::Committed
            }
            Err(e) => {
                let ids = settlement.roll_back();
                warn!("mutation failed for {ids:?}, rolled back: {e}");
                inner.notices.send(MutationNotice::RolledBack { ids, message: e.to_string() });
                MutationOutcome::RolledBack(e)
            }
        }
    }

    /// Optimistically remove an entity and delete it remotely.
    ///
    /// If the delete fails the entity is reinserted where the configured
    /// [`CollectionOrder`] says it belongs.
    pub async fn remove_entity(&self, id: E::Id) -> MutationOutcome {
        let inner = &self.0;

        if !inner.entities.with(|entities| entities.iter().any(|e| e.id() == id)) {
            debug!("remove ignored, no entity for {id:?}");
            return MutationOutcome::Ignored;
        }
        let removed = inner.entities.update(|entities| {
            let index = entities.iter().position(|e| e.id() == id)?;
            let entity = entities.remove(index);
            let next = entities.get(index).map(Record::id);
            Some((entity, Vacancy { index, next }))
        });
        let Some((entity, vacancy)) = removed else { return MutationOutcome::Ignored };
        inner.pending.mark(id.clone());
        let settlement = Settlement::new(inner, vec![id.clone()], Rollback::Reinsert(entity, vacancy));
        debug!("optimistically removed {id:?}");

        match inner.remote.remove(&id).await {
            Ok(()) => {
                settlement.commit();
                info!("remove committed for {id:?}");
                inner.notices.send(MutationNotice::Removed { id });
                MutationOutcome::Committed
            }
            Err(e) => {
                settlement.roll_back();
                warn!("remove failed for {id:?}, reinserted: {e}");
                inner.notices.send(MutationNotice::RemoveFailed { id, message: e.to_string() });
                MutationOutcome::RolledBack(e)
            }
        }
    }

    /// Replace the list with freshly fetched authoritative data.
    ///
    /// In-flight mutations still settle against the new list: rollbacks only
    /// touch entities that are present in it.
    pub fn reseed(&self, entities: Vec<E>) {
        debug!("reseeding with {} entities", entities.len());
        self.0.entities.set(entities);
    }
}

impl<E: Record, V> Optimistic<E, V> {
    pub fn is_pending(&self, id: &E::Id) -> bool { self.0.pending.contains(id) }

    pub fn has_pending(&self) -> bool { !self.0.pending.is_empty() }

    pub fn pending_ids(&self) -> Vec<E::Id> { self.0.pending.ids() }

    pub fn pending(&self) -> &PendingSet<E::Id> { &self.0.pending }

    /// The current, possibly optimistic, list
    pub fn entities(&self) -> Vec<E> { self.0.entities.value() }

    pub fn with_entities<R>(&self, f: impl FnOnce(&[E]) -> R) -> R { self.0.entities.with(|entities| f(entities)) }

    pub fn get(&self, id: &E::Id) -> Option<E> { self.with_entities(|entities| entities.iter().find(|e| &e.id() == id).cloned()) }

    pub fn len(&self) -> usize { self.with_entities(<[E]>::len) }

    pub fn is_empty(&self) -> bool { self.with_entities(<[E]>::is_empty) }

    /// The list joined with pending state, for rendering per-row controls
    pub fn rows(&self) -> Vec<Row<E>> {
        self.with_entities(|entities| entities.iter().map(|e| Row { pending: self.0.pending.contains(&e.id()), entity: e.clone() }).collect())
    }

    pub fn entities_signal(&self) -> Read<Vec<E>> { self.0.entities.read() }

    pub fn pending_signal(&self) -> Read<std::collections::BTreeSet<E::Id>> { self.0.pending.signal() }

    pub fn order(&self) -> CollectionOrder<E> { self.0.order.read().expect("order poisoned").clone() }

    pub fn listen_notices(&self, listener: impl Fn(MutationNotice<E::Id>) + Send + Sync + 'static) -> ListenerGuard<MutationNotice<E::Id>> {
        self.0.notices.reference().listen(listener)
    }
}

impl<E: Record + std::fmt::Debug, V> std::fmt::Debug for Optimistic<E, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Optimistic").field("entities", &self.0.entities).field("pending", &self.0.pending).finish_non_exhaustive()
    }
}
