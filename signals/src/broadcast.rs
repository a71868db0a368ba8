use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Identity of a broadcast, derived from the address of its shared state.
/// Only a Broadcast (or a guard listening to one) can hand these out.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct BroadcastId(usize);

impl std::fmt::Display for BroadcastId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{:#x}", self.0) }
}

/// A listener registered on a broadcast.
#[derive(Clone)]
pub enum BroadcastListener<T = ()> {
    /// Receives the broadcast payload
    Payload(Arc<dyn Fn(T) + Send + Sync + 'static>),
    /// Only wants to know that something happened
    NotifyOnly(Arc<dyn Fn() + Send + Sync + 'static>),
}

/// Conversion into a [`BroadcastListener`].
pub trait IntoBroadcastListener<T> {
    fn into_broadcast_listener(self) -> BroadcastListener<T>;
}

/// Synchronous fan-out of a payload to every live listener.
///
/// Listeners are invoked on the sending thread, in registration order, without
/// any lock held, so a listener may itself listen, drop guards or send.
#[derive(Clone)]
pub struct Broadcast<T = ()>(Arc<Inner<T>>);

struct Inner<T> {
    listeners: std::sync::RwLock<BTreeMap<usize, BroadcastListener<T>>>,
    next_id: AtomicUsize,
}

impl<T> std::fmt::Debug for Broadcast<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcast").field("listeners", &self.listener_count()).finish()
    }
}

/// A listen-only reference to a broadcast. Holders can subscribe but never send.
pub struct Ref<'a, T>(&'a Broadcast<T>);

/// Keeps a listener registered. Dropping the guard removes the listener.
///
/// The guard holds only a weak reference, so it never keeps the broadcast alive.
#[must_use = "the listener is removed as soon as the guard is dropped"]
pub struct ListenerGuard<T = ()> {
    inner: Weak<Inner<T>>,
    id: usize,
}

impl<T> ListenerGuard<T> {
    pub fn broadcast_id(&self) -> BroadcastId { BroadcastId(self.inner.as_ptr() as *const () as usize) }
}

impl<T> Default for Broadcast<T>
where T: Clone
{
    fn default() -> Self { Self::new() }
}

impl<T> Broadcast<T> {
    pub fn listener_count(&self) -> usize { self.0.listeners.read().expect("broadcast listeners poisoned").len() }

    pub fn id(&self) -> BroadcastId { BroadcastId(Arc::as_ptr(&self.0) as *const () as usize) }

    /// Listen-only view of this broadcast
    pub fn reference(&self) -> Ref<'_, T> { Ref(self) }
}

impl<T> Broadcast<T>
where T: Clone
{
    pub fn new() -> Self { Self(Arc::new(Inner { listeners: std::sync::RwLock::new(BTreeMap::new()), next_id: AtomicUsize::new(0) })) }

    /// Send a payload to all current listeners
    pub fn send(&self, value: T) {
        // snapshot the listeners so that no lock is held while they run
        let listeners: Vec<BroadcastListener<T>> = {
            let listeners = self.0.listeners.read().expect("broadcast listeners poisoned");
            listeners.values().cloned().collect()
        };

        if let Some((last, rest)) = listeners.split_last() {
            for listener in rest {
                match listener {
                    BroadcastListener::Payload(callback) => callback(value.clone()),
                    BroadcastListener::NotifyOnly(callback) => callback(),
                }
            }
            match last {
                BroadcastListener::Payload(callback) => callback(value),
                BroadcastListener::NotifyOnly(callback) => callback(),
            }
        }
    }
}

impl<'a, T> Ref<'a, T> {
    pub fn listen<L>(&self, listener: L) -> ListenerGuard<T>
    where L: IntoBroadcastListener<T> {
        let id = self.0 .0.next_id.fetch_add(1, Ordering::Relaxed);
        self.0 .0.listeners.write().expect("broadcast listeners poisoned").insert(id, listener.into_broadcast_listener());
        ListenerGuard { inner: Arc::downgrade(&self.0 .0), id }
    }

    pub fn broadcast_id(&self) -> BroadcastId { self.0.id() }
}

impl<T> Drop for ListenerGuard<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.listeners.write().expect("broadcast listeners poisoned").remove(&self.id);
        }
    }
}

impl<F, T> IntoBroadcastListener<T> for F
where F: Fn(T) + Send + Sync + 'static
{
    fn into_broadcast_listener(self) -> BroadcastListener<T> { BroadcastListener::Payload(Arc::new(self)) }
}

impl<T> IntoBroadcastListener<T> for BroadcastListener<T> {
    fn into_broadcast_listener(self) -> BroadcastListener<T> { self }
}

impl<T> IntoBroadcastListener<T> for Arc<dyn Fn() + Send + Sync + 'static> {
    fn into_broadcast_listener(self) -> BroadcastListener<T> { BroadcastListener::NotifyOnly(self) }
}

#[cfg(feature = "tokio")]
impl<T> IntoBroadcastListener<T> for tokio::sync::mpsc::UnboundedSender<T>
where T: Send + Sync + 'static
{
    fn into_broadcast_listener(self) -> BroadcastListener<T> {
        BroadcastListener::Payload(Arc::new(move |value| {
            // a closed receiver just means the host went away
            let _ = self.send(value);
        }))
    }
}

impl<T> IntoBroadcastListener<T> for std::sync::mpsc::Sender<T>
where T: Send + Sync + 'static
{
    fn into_broadcast_listener(self) -> BroadcastListener<T> {
        let sender = std::sync::Mutex::new(self);
        BroadcastListener::Payload(Arc::new(move |value| {
            let _ = sender.lock().expect("sender poisoned").send(value);
        }))
    }
}
