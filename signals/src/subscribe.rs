use std::sync::Arc;

use crate::broadcast::ListenerGuard;
use crate::signal::{GetReadCell, Signal};

/// Boxed listener receiving the value after each change
pub type SubscribeListener<T> = Box<dyn Fn(T) + Send + Sync + 'static>;

pub trait IntoSubscribeListener<T> {
    fn into_subscribe_listener(self) -> SubscribeListener<T>;
}

/// Subscribe to changes with a listener that receives the new value.
///
/// The listener is not called with the present value, only with later ones.
pub trait Subscribe<T: 'static> {
    fn subscribe<F>(&self, listener: F) -> SubscriptionGuard
    where F: IntoSubscribeListener<T>;
}

/// Keeps a subscription alive; the listener is removed when this is dropped.
#[must_use = "the subscription ends as soon as the guard is dropped"]
pub struct SubscriptionGuard {
    _guard: ListenerGuard,
}

impl SubscriptionGuard {
    pub fn new(guard: ListenerGuard) -> Self { Self { _guard: guard } }
}

impl std::fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.debug_struct("SubscriptionGuard").finish_non_exhaustive() }
}

impl<S, T> Subscribe<T> for S
where
    S: Signal + GetReadCell<T>,
    T: Clone + Send + Sync + 'static,
{
    fn subscribe<F>(&self, listener: F) -> SubscriptionGuard
    where F: IntoSubscribeListener<T> {
        let listener = listener.into_subscribe_listener();
        let cell = self.get_readcell();
        let guard = self.listen(Arc::new(move || listener(cell.value())));
        SubscriptionGuard::new(guard)
    }
}

impl<F, T> IntoSubscribeListener<T> for F
where F: Fn(T) + Send + Sync + 'static
{
    fn into_subscribe_listener(self) -> SubscribeListener<T> { Box::new(self) }
}

impl<T: Send + 'static> IntoSubscribeListener<T> for std::sync::mpsc::Sender<T> {
    fn into_subscribe_listener(self) -> SubscribeListener<T> {
        let sender = std::sync::Mutex::new(self);
        Box::new(move |value| {
            let _ = sender.lock().expect("sender poisoned").send(value);
        })
    }
}

#[cfg(feature = "tokio")]
impl<T: Send + 'static> IntoSubscribeListener<T> for tokio::sync::mpsc::UnboundedSender<T> {
    fn into_subscribe_listener(self) -> SubscribeListener<T> {
        Box::new(move |value| {
            let _ = self.send(value);
        })
    }
}
