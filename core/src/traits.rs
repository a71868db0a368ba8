use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;

use async_trait::async_trait;

use crate::error::RemoteError;

/// Remote persistence of a working value.
///
/// Must return an error (never swallow it) when the value was not persisted.
#[async_trait]
pub trait Persist<T>: Send + Sync {
    async fn save(&self, value: &T) -> Result<(), RemoteError>;
}

/// Adapts an async closure into a [`Persist`] implementation.
pub struct PersistFn<F>(F);

/// ```
/// use tether_core::{error::RemoteError, traits::persist_fn};
///
/// let persist = persist_fn(|draft: String| async move {
///     if draft.is_empty() { Err(RemoteError::Rejected("empty draft".into())) } else { Ok(()) }
/// });
/// # let _ = persist;
/// ```
pub fn persist_fn<T, F, Fut>(f: F) -> PersistFn<F>
where
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), RemoteError>> + Send,
{
    PersistFn(f)
}

#[async_trait]
impl<T, F, Fut> Persist<T> for PersistFn<F>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), RemoteError>> + Send,
{
    async fn save(&self, value: &T) -> Result<(), RemoteError> { (self.0)(value.clone()).await }
}

/// A server-owned record with a stable, unique id.
pub trait Record: Clone + Send + Sync + 'static {
    type Id: Clone + Eq + Hash + Ord + Debug + Send + Sync + 'static;

    fn id(&self) -> Self::Id;
}

/// A state transition that rewrites the optimistically mutable fields of a record
/// (a status change, an archive flag, a bulk-assigned owner, ...).
pub trait Transition<E>: Clone + Send + Sync + 'static {
    fn apply_to(&self, entity: &mut E);
}

/// Remote writes backing an [`crate::optimistic::Optimistic`] controller.
///
/// Both calls must be all-or-nothing: an error means nothing was applied remotely.
#[async_trait]
pub trait Remote<E: Record, V>: Send + Sync {
    async fn mutate(&self, ids: &[E::Id], value: &V) -> Result<(), RemoteError>;

    async fn remove(&self, id: &E::Id) -> Result<(), RemoteError>;
}
