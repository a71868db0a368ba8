//! Debounced, interval-backed autosave of a working value.
//!
//! An [`Autosave`] owns the working value of one editing surface and decides
//! when to hand it to a [`Persist`] implementation:
//!
//! - every change that makes the value differ from the last saved snapshot
//!   (re)starts a debounce timer, and the value is saved once edits go quiet
//! - independently, an interval timer saves a stale value even while edits keep
//!   resetting the debounce, which bounds how much work a crash can lose
//! - at most one save is in flight; a trigger that finds a save running is a
//!   no-op and the next tick re-checks
//! - successful saves are mirrored into a [`DurableStore`] when a durable key is
//!   configured, and a [`PageLifecycle`] discard attempt flushes a stale value
//!   on a best-effort basis
//!
//! Change detection is structural (see [`Snapshot`]), so re-setting an equal
//! value never triggers a save.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tether_signals::broadcast::{Broadcast, ListenerGuard};
use tether_signals::{Mut, Read};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::AutosaveConfig;
use crate::error::{AutosaveError, ConfigError, StorageError};
use crate::lifecycle::{BeforeUnload, PageLifecycle};
use crate::notice::SaveNotice;
use crate::snapshot::Snapshot;
use crate::store::{DurableStore, Mirror};
use crate::traits::Persist;

/// Result of a save attempt that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The value was persisted and is now the saved snapshot
    Saved,
    /// The value already matched the saved snapshot; nothing was sent
    Unchanged,
    /// Another save was running, so this one was skipped. The caller may retry.
    InFlight,
}

/// What caused a save attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Debounce,
    Interval,
    Unload,
    Manual,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Debounce => write!(f, "debounce"),
            Trigger::Interval => write!(f, "interval"),
            Trigger::Unload => write!(f, "unload"),
            Trigger::Manual => write!(f, "manual"),
        }
    }
}

/// Handle to an autosaving working value. Cheap to clone.
///
/// Dropping the last handle cancels both timers and detaches from the page
/// lifecycle. A save that is already running when that happens still runs to
/// completion, but nothing is scheduled after it.
pub struct Autosave<T>(Arc<Inner<T>>);

impl<T> Clone for Autosave<T> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

pub struct AutosaveBuilder<T> {
    initial: T,
    persist: Arc<dyn Persist<T>>,
    config: AutosaveConfig,
    store: Option<Arc<dyn DurableStore>>,
    lifecycle: Option<PageLifecycle>,
}

struct Inner<T> {
    config: AutosaveConfig,
    persist: Arc<dyn Persist<T>>,
    state: Mutex<State<T>>,
    in_flight: AtomicBool,
    closed: AtomicBool,
    mirror: Mirror,
    recovered: Option<T>,
    saving: Mut<bool>,
    unsaved: Mut<bool>,
    notices: Broadcast<SaveNotice>,
    timers: Mutex<Timers>,
    unload: Mutex<Option<ListenerGuard<BeforeUnload>>>,
    runtime: Handle,
}

struct State<T> {
    current: T,
    /// `None` if the current value failed to serialize, which keeps it dirty
    current_snapshot: Option<Snapshot>,
    saved: Option<Snapshot>,
    last_save: Option<Instant>,
    last_saved_at: Option<DateTime<Utc>>,
    save_count: u64,
}

#[derive(Default)]
struct Timers {
    debounce: Option<JoinHandle<()>>,
    interval: Option<JoinHandle<()>>,
}

impl<T> State<T> {
    fn is_dirty(&self) -> bool {
        match (&self.current_snapshot, &self.saved) {
            (Some(current), Some(saved)) => current != saved,
            _ => true,
        }
    }
}

impl Timers {
    fn abort_all(&mut self) {
        if let Some(handle) = self.debounce.take() {
            handle.abort();
        }
        if let Some(handle) = self.interval.take() {
            handle.abort();
        }
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        if let Ok(timers) = self.timers.get_mut() {
            timers.abort_all();
        }
    }
}

/// Claim on the single in-flight save slot; releasing it also clears `is_saving`
struct InFlight<'a, T>(&'a Inner<T>);

impl<'a, T> InFlight<'a, T> {
    fn claim(inner: &'a Inner<T>) -> Option<Self> {
        inner.in_flight.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).ok()?;
        inner.saving.set_if_changed(true);
        Some(Self(inner))
    }
}

impl<T> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::Release);
        self.0.saving.set_if_changed(false);
    }
}

impl<T> AutosaveBuilder<T>
where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
    pub fn config(mut self, config: AutosaveConfig) -> Self {
        self.config = config;
        self
    }

    /// Durable store used when the config names a `durable_key`
    pub fn store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: &PageLifecycle) -> Self {
        self.lifecycle = Some(lifecycle.clone());
        self
    }

    /// Start the scheduler. Must be called from within a tokio runtime.
    pub fn build(self) -> Result<Autosave<T>, ConfigError> {
        let AutosaveBuilder { initial, persist, config, store, lifecycle } = self;
        config.validate()?;
        let runtime = Handle::try_current()?;

        let current_snapshot = Snapshot::of(&initial)
            .inspect_err(|e| warn!("initial working value is not serializable, it will stay dirty: {e}"))
            .ok();

        let mirror = Mirror::new(config.durable_key.clone(), store);
        let (saved, recovered) = match mirror.load() {
            Ok(Some(json)) => match Snapshot::parse(&json) {
                Ok(snapshot) => {
                    let recovered = snapshot.restore::<T>().inspect_err(|e| warn!("stored draft no longer matches the value type: {e}")).ok();
                    debug!("loaded saved snapshot from durable key {:?}", mirror.key());
                    (Some(snapshot), recovered)
                }
                Err(e) => {
                    warn!("ignoring unparseable durable snapshot under {:?}: {e}", mirror.key());
                    (current_snapshot.clone(), None)
                }
            },
            Ok(None) => (current_snapshot.clone(), None),
            // the mirror already logged and disabled itself
            Err(_) => (current_snapshot.clone(), None),
        };

        let state = State { current: initial, current_snapshot, saved, last_save: None, last_saved_at: None, save_count: 0 };
        let dirty = state.is_dirty();

        let inner = Arc::new(Inner {
            config,
            persist,
            state: Mutex::new(state),
            in_flight: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            mirror,
            recovered,
            saving: Mut::new(false),
            unsaved: Mut::new(dirty),
            notices: Broadcast::new(),
            timers: Mutex::new(Timers::default()),
            unload: Mutex::new(None),
            runtime,
        });

        inner.start_interval();
        if dirty {
            inner.arm_debounce();
        }

        if let Some(lifecycle) = lifecycle {
            let weak = Arc::downgrade(&inner);
            let guard = lifecycle.listen(move |event| {
                if let Some(inner) = weak.upgrade() {
                    inner.flush_on_unload(&event);
                }
            });
            *inner.unload.lock().expect("unload guard poisoned") = Some(guard);
        }

        Ok(Autosave(inner))
    }
}

impl<T> Autosave<T>
where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
    pub fn builder<P>(initial: T, persist: P) -> AutosaveBuilder<T>
    where P: Persist<T> + 'static {
        AutosaveBuilder { initial, persist: Arc::new(persist), config: AutosaveConfig::default(), store: None, lifecycle: None }
    }

    /// Replace the working value.
    ///
    /// Restarts the debounce timer if the new value differs from the saved
    /// snapshot, and cancels it if the value is back to what was saved.
    pub fn set(&self, value: T) {
        let snapshot = Snapshot::of(&value).inspect_err(|e| warn!("working value is not serializable: {e}")).ok();
        let dirty = {
            let mut state = self.0.state.lock().expect("autosave state poisoned");
            state.current = value;
            state.current_snapshot = snapshot;
            state.is_dirty()
        };
        self.0.unsaved.set_if_changed(dirty);

        if self.is_closed() {
            return;
        }
        if dirty {
            self.0.arm_debounce();
        } else {
            self.0.cancel_debounce();
        }
    }

    /// Edit the working value in place. Same change semantics as [`Autosave::set`].
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut value = self.value();
        f(&mut value);
        self.set(value);
    }

    pub fn value(&self) -> T { self.0.state.lock().expect("autosave state poisoned").current.clone() }

    /// Save now and wait for the outcome.
    ///
    /// Shares the in-flight guard with the timers: if any save is running this
    /// returns [`SaveOutcome::InFlight`] without waiting.
    pub async fn save_now(&self) -> Result<SaveOutcome, AutosaveError> {
        if self.is_closed() {
            return Err(AutosaveError::Closed);
        }
        self.0.save(Trigger::Manual).await
    }

    /// Forget the durable mirror and accept the current value as saved.
    pub fn clear(&self) {
        self.0.cancel_debounce();
        if let Err(e) = self.0.mirror.remove() {
            self.0.storage_disabled(e);
        }
        {
            let mut state = self.0.state.lock().expect("autosave state poisoned");
            state.saved = state.current_snapshot.clone();
        }
        let dirty = self.0.is_dirty();
        self.0.unsaved.set_if_changed(dirty);
        debug!("autosave cleared");
    }

    /// Cancel both timers and detach from the page lifecycle. Idempotent.
    pub fn close(&self) {
        if self.0.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.0.timers.lock().expect("autosave timers poisoned").abort_all();
        self.0.unload.lock().expect("unload guard poisoned").take();
        debug!("autosave closed");
    }

    pub fn is_closed(&self) -> bool { self.0.closed.load(Ordering::Acquire) }

    pub fn is_saving(&self) -> bool { self.0.saving.value() }

    pub fn has_unsaved_changes(&self) -> bool { self.0.is_dirty() }

    pub fn saving_signal(&self) -> Read<bool> { self.0.saving.read() }

    pub fn unsaved_signal(&self) -> Read<bool> { self.0.unsaved.read() }

    pub fn time_since_last_save(&self) -> Option<Duration> {
        self.0.state.lock().expect("autosave state poisoned").last_save.map(|at| at.elapsed())
    }

    /// Wall-clock time of the last successful save. Never moves backwards.
    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> { self.0.state.lock().expect("autosave state poisoned").last_saved_at }

    pub fn save_count(&self) -> u64 { self.0.state.lock().expect("autosave state poisoned").save_count }

    /// Value found in the durable store when this scheduler was built.
    ///
    /// It is only used as the saved snapshot; whether to show it to the user is
    /// up to the caller.
    pub fn recovered(&self) -> Option<&T> { self.0.recovered.as_ref() }

    /// Whether saves are still being mirrored to the durable store
    pub fn mirror_enabled(&self) -> bool { self.0.mirror.is_enabled() }

    pub fn config(&self) -> &AutosaveConfig { &self.0.config }

    pub fn listen_notices(&self, listener: impl Fn(SaveNotice) + Send + Sync + 'static) -> ListenerGuard<SaveNotice> {
        self.0.notices.reference().listen(listener)
    }
}

impl<T> Inner<T>
where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
    fn is_dirty(&self) -> bool { self.state.lock().expect("autosave state poisoned").is_dirty() }

    fn start_interval(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let period = self.config.interval();
        let handle = self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                if inner.is_dirty() {
                    debug!("autosave interval tick found unsaved changes");
                    inner.spawn_save(Trigger::Interval);
                }
            }
        });
        self.timers.lock().expect("autosave timers poisoned").interval = Some(handle);
    }

    fn arm_debounce(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let delay = self.config.debounce();
        let mut timers = self.timers.lock().expect("autosave timers poisoned");
        if let Some(previous) = timers.debounce.take() {
            previous.abort();
        }
        timers.debounce = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.spawn_save(Trigger::Debounce);
            }
        }));
    }

    fn cancel_debounce(&self) {
        if let Some(handle) = self.timers.lock().expect("autosave timers poisoned").debounce.take() {
            handle.abort();
        }
    }

    /// Run a save on its own task so that cancelling a timer never cancels a
    /// save midway and strands the in-flight guard.
    fn spawn_save(self: &Arc<Self>, trigger: Trigger) {
        let inner = self.clone();
        self.runtime.spawn(async move {
            // automatic paths report through notices only
            let _ = inner.save(trigger).await;
        });
    }

    fn flush_on_unload(self: &Arc<Self>, event: &BeforeUnload) {
        if !self.is_dirty() {
            return;
        }
        event.request_confirmation();
        if self.in_flight.load(Ordering::Acquire) {
            debug!("unload with a save already in flight");
            return;
        }
        event.record_flush();
        self.spawn_save(Trigger::Unload);
    }

    async fn save(&self, trigger: Trigger) -> Result<SaveOutcome, AutosaveError> {
        let Some(_claim) = InFlight::claim(self) else {
            debug!("{trigger} save skipped, another save is in flight");
            return Ok(SaveOutcome::InFlight);
        };

        let (value, snapshot) = {
            let state = self.state.lock().expect("autosave state poisoned");
            if !state.is_dirty() {
                return Ok(SaveOutcome::Unchanged);
            }
            (state.current.clone(), state.current_snapshot.clone())
        };
        let snapshot = match snapshot {
            Some(snapshot) => snapshot,
            None => Snapshot::of(&value).map_err(|e| {
                self.notices.send(SaveNotice::SaveFailed { message: e.to_string() });
                AutosaveError::Serialization(e)
            })?,
        };

        debug!("{trigger} save started");
        if let Err(e) = self.persist.save(&value).await {
            warn!("{trigger} save failed, keeping changes dirty: {e}");
            self.notices.send(SaveNotice::SaveFailed { message: e.to_string() });
            return Err(e.into());
        }

        let (at, dirty) = {
            let mut state = self.state.lock().expect("autosave state poisoned");
            let now = Utc::now();
            let at = state.last_saved_at.map_or(now, |previous| previous.max(now));
            state.saved = Some(snapshot);
            state.last_save = Some(Instant::now());
            state.last_saved_at = Some(at);
            state.save_count += 1;
            (at, state.is_dirty())
        };
        self.unsaved.set_if_changed(dirty);
        self.mirror_value(&value);

        info!("{trigger} save completed");
        if self.config.announce && trigger != Trigger::Manual {
            self.notices.send(SaveNotice::Saved { at });
        }
        Ok(SaveOutcome::Saved)
    }

    fn mirror_value(&self, value: &T) {
        if !self.mirror.is_enabled() {
            return;
        }
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!("saved value could not be mirrored: {e}");
                return;
            }
        };
        if let Err(e) = self.mirror.write(&json) {
            self.storage_disabled(e);
        }
    }

    fn storage_disabled(&self, error: StorageError) {
        let key = self.mirror.key().unwrap_or_default().to_owned();
        self.notices.send(SaveNotice::StorageDisabled { key, message: error.to_string() });
    }
}

impl<T> std::fmt::Debug for Autosave<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Autosave")
            .field("config", &self.0.config)
            .field("saving", &self.0.in_flight.load(Ordering::Relaxed))
            .field("closed", &self.0.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
