use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tether_signals::broadcast::{Broadcast, ListenerGuard};

/// Host-owned page lifecycle signal.
///
/// The host calls [`PageLifecycle::before_unload`] once per discard attempt
/// (tab close, navigation) and inspects the returned event to decide whether
/// to show an "unsaved changes" prompt. Listeners run synchronously; any async
/// work they start is best effort and may never complete.
#[derive(Clone, Default)]
pub struct PageLifecycle {
    broadcast: Broadcast<BeforeUnload>,
}

/// A single discard attempt.
#[derive(Clone, Debug, Default)]
pub struct BeforeUnload(Arc<UnloadState>);

#[derive(Debug, Default)]
struct UnloadState {
    confirm: AtomicBool,
    flushes: AtomicUsize,
}

impl PageLifecycle {
    pub fn new() -> Self { Self::default() }

    /// Fire the signal and return the event after every listener has seen it
    pub fn before_unload(&self) -> BeforeUnload {
        let event = BeforeUnload::default();
        self.broadcast.send(event.clone());
        event
    }

    pub fn listen(&self, listener: impl Fn(BeforeUnload) + Send + Sync + 'static) -> ListenerGuard<BeforeUnload> {
        self.broadcast.reference().listen(listener)
    }

    pub fn listener_count(&self) -> usize { self.broadcast.listener_count() }
}

impl BeforeUnload {
    /// Ask the host to warn the user before discarding the page
    pub fn request_confirmation(&self) { self.0.confirm.store(true, Ordering::SeqCst); }

    pub fn confirmation_requested(&self) -> bool { self.0.confirm.load(Ordering::SeqCst) }

    pub(crate) fn record_flush(&self) { self.0.flushes.fetch_add(1, Ordering::SeqCst); }

    /// Number of best-effort saves started in response to this event
    pub fn flushes_started(&self) -> usize { self.0.flushes.load(Ordering::SeqCst) }
}

impl std::fmt::Debug for PageLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageLifecycle").field("listeners", &self.listener_count()).finish()
    }
}
