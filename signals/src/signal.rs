use std::sync::Arc;

use crate::broadcast::{Broadcast, BroadcastId, ListenerGuard};
use crate::value::{ReadValueCell, ValueCell};

/// Anything that can tell listeners it changed, without regard to its payload.
pub trait Signal {
    fn listen(&self, listener: Arc<dyn Fn() + Send + Sync + 'static>) -> ListenerGuard;

    fn broadcast_id(&self) -> BroadcastId;
}

/// Access to a read-only cell containing the present value
pub trait GetReadCell<T: 'static> {
    fn get_readcell(&self) -> ReadValueCell<T>;
}

/// Mutable (writer side) signal.
///
/// Intentionally not `Clone` and not subscribable: hand out [`Mut::read`] instead.
pub struct Mut<T> {
    value: ValueCell<T>,
    broadcast: Broadcast<()>,
}

impl<T: 'static> Mut<T> {
    pub fn new(value: T) -> Self { Self { value: ValueCell::new(value), broadcast: Broadcast::new() } }

    /// Replace the value and notify listeners, even if the value is unchanged
    pub fn set(&self, value: T) {
        self.value.set(value);
        self.broadcast.send(());
    }

    /// Replace the value and notify listeners only if it differs from the present one
    pub fn set_if_changed(&self, value: T) -> bool
    where T: PartialEq {
        let changed = self.value.set_if_changed(value);
        if changed {
            self.broadcast.send(());
        }
        changed
    }

    /// Mutate in place, then notify. The lock is released before listeners run.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = self.value.update(f);
        self.broadcast.send(());
        result
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R { self.value.with(f) }

    /// Read-only signal sharing this signal's storage
    pub fn read(&self) -> Read<T> { Read { value: self.value.readvalue(), broadcast: self.broadcast.clone() } }
}

impl<T: Clone + 'static> Mut<T> {
    pub fn value(&self) -> T { self.value.value() }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Mut<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { self.value.with(|v| f.debug_tuple("Mut").field(v).finish()) }
}

impl<T: 'static> Signal for Mut<T> {
    fn listen(&self, listener: Arc<dyn Fn() + Send + Sync + 'static>) -> ListenerGuard { self.broadcast.reference().listen(listener) }

    fn broadcast_id(&self) -> BroadcastId { self.broadcast.id() }
}

impl<T: 'static> GetReadCell<T> for Mut<T> {
    fn get_readcell(&self) -> ReadValueCell<T> { self.value.readvalue() }
}

/// Read-only signal
pub struct Read<T> {
    value: ReadValueCell<T>,
    broadcast: Broadcast<()>,
}

impl<T> Clone for Read<T> {
    fn clone(&self) -> Self { Self { value: self.value.clone(), broadcast: self.broadcast.clone() } }
}

impl<T: 'static> Read<T> {
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R { self.value.with(f) }
}

impl<T: Clone + 'static> Read<T> {
    pub fn value(&self) -> T { self.value.value() }
}

impl<T: 'static> Signal for Read<T> {
    fn listen(&self, listener: Arc<dyn Fn() + Send + Sync + 'static>) -> ListenerGuard { self.broadcast.reference().listen(listener) }

    fn broadcast_id(&self) -> BroadcastId { self.broadcast.id() }
}

impl<T: 'static> GetReadCell<T> for Read<T> {
    fn get_readcell(&self) -> ReadValueCell<T> { self.value.clone() }
}

impl<T: std::fmt::Display + 'static> std::fmt::Display for Read<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { self.with(|v| write!(f, "{v}")) }
}

impl<T: std::fmt::Debug + 'static> std::fmt::Debug for Read<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { self.with(|v| f.debug_tuple("Read").field(v).finish()) }
}
