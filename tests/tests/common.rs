#![allow(unused)]

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tether_core::error::{RemoteError, StorageError};
use tether_core::store::{DurableStore, MemoryStore};
use tether_core::{Persist, Record, Remote, Transition};
use tether_signals::{Mut, Wait};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::Level;

// Initialize tracing for tests
#[ctor::ctor]
fn init_tracing() {
    // if LOG_LEVEL env var is set, use it
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        tracing_subscriber::fmt().with_max_level(Level::from_str(&level).unwrap()).with_test_writer().init();
    } else {
        tracing_subscriber::fmt().with_max_level(Level::INFO).with_test_writer().init();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Open,
    InProgress,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: u32,
    pub title: String,
    pub status: Status,
    pub created: u32,
}

impl Record for Ticket {
    type Id = u32;
    fn id(&self) -> u32 { self.id }
}

impl Transition<Ticket> for Status {
    fn apply_to(&self, ticket: &mut Ticket) { ticket.status = *self; }
}

pub fn ticket(id: u32, created: u32) -> Ticket { Ticket { id, title: format!("ticket {id}"), status: Status::Open, created } }

pub fn tickets(created: &[u32]) -> Vec<Ticket> { created.iter().enumerate().map(|(i, &c)| ticket(i as u32 + 1, c)).collect() }

pub fn ids(tickets: &[Ticket]) -> Vec<u32> { tickets.iter().map(|t| t.id).collect() }

/// Draft edited through an autosave
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub title: String,
    pub body: String,
}

impl Draft {
    pub fn new(title: &str, body: &str) -> Self { Self { title: title.into(), body: body.into() } }
}

/// `Persist` mock recording every attempt against virtual time
pub struct Recorder<T>(Arc<RecorderState<T>>);

pub struct RecorderState<T> {
    start: Instant,
    latency: Duration,
    fail_next: AtomicUsize,
    attempts: Mutex<Vec<Duration>>,
    saves: Mutex<Vec<(Duration, T)>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<T: Clone> Recorder<T> {
    pub fn new() -> Self { Self::with_latency(Duration::ZERO) }

    pub fn with_latency(latency: Duration) -> Self {
        Self(Arc::new(RecorderState {
            start: Instant::now(),
            latency,
            fail_next: AtomicUsize::new(0),
            attempts: Mutex::new(Vec::new()),
            saves: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }))
    }

    /// Fail the next `n` attempts
    pub fn fail_next(&self, n: usize) { self.0.fail_next.store(n, Ordering::SeqCst); }

    /// Offsets from creation at which each attempt started
    pub fn attempts(&self) -> Vec<Duration> { self.0.attempts.lock().unwrap().clone() }

    pub fn saves(&self) -> Vec<(Duration, T)> { self.0.saves.lock().unwrap().clone() }

    pub fn saved_values(&self) -> Vec<T> { self.saves().into_iter().map(|(_, value)| value).collect() }

    pub fn max_running(&self) -> usize { self.0.max_running.load(Ordering::SeqCst) }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Persist<T> for Recorder<T> {
    async fn save(&self, value: &T) -> Result<(), RemoteError> {
        let state = &self.0;
        let started = state.start.elapsed();
        state.attempts.lock().unwrap().push(started);
        let running = state.running.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_running.fetch_max(running, Ordering::SeqCst);

        if !state.latency.is_zero() {
            tokio::time::sleep(state.latency).await;
        }
        state.running.fetch_sub(1, Ordering::SeqCst);

        let failing = state.fail_next.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok();
        if failing {
            return Err(RemoteError::failed("503 Service Unavailable"));
        }
        state.saves.lock().unwrap().push((started, value.clone()));
        Ok(())
    }
}

pub fn ms(duration: Duration) -> u128 { duration.as_millis() }

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Mutate(Vec<u32>, Status),
    Remove(u32),
}

/// `Remote` mock whose calls block until the test settles them one by one
pub struct GatedRemote {
    started: Mut<usize>,
    calls: Mutex<Vec<Call>>,
    gates: Mutex<BTreeMap<usize, oneshot::Sender<Result<(), RemoteError>>>>,
}

impl GatedRemote {
    pub fn new() -> Arc<Self> { Arc::new(Self { started: Mut::new(0), calls: Mutex::new(Vec::new()), gates: Mutex::new(BTreeMap::new()) }) }

    /// Wait until at least `n` calls have reached the remote
    pub async fn started(&self, n: usize) { self.started.read().wait_for(move |count| *count >= n).await }

    pub fn calls(&self) -> Vec<Call> { self.calls.lock().unwrap().clone() }

    /// Resolve the `index`th call (0-based, in arrival order)
    pub fn settle(&self, index: usize, result: Result<(), RemoteError>) {
        let gate = self.gates.lock().unwrap().remove(&index).expect("call not started or already settled");
        gate.send(result).expect("caller went away");
    }

    async fn gate(&self, call: Call) -> Result<(), RemoteError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut calls = self.calls.lock().unwrap();
            self.gates.lock().unwrap().insert(calls.len(), tx);
            calls.push(call);
        }
        self.started.update(|count| *count += 1);
        rx.await.unwrap_or_else(|_| Err(RemoteError::failed("gate dropped")))
    }
}

#[async_trait]
impl Remote<Ticket, Status> for GatedRemote {
    async fn mutate(&self, ids: &[u32], value: &Status) -> Result<(), RemoteError> { self.gate(Call::Mutate(ids.to_vec(), *value)).await }

    async fn remove(&self, id: &u32) -> Result<(), RemoteError> { self.gate(Call::Remove(*id)).await }
}

/// Durable store that starts failing after `healthy_calls` calls
pub struct FlakyStore {
    pub inner: MemoryStore,
    healthy_calls: usize,
    calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(healthy_calls: usize) -> Self { Self { inner: MemoryStore::new(), healthy_calls, calls: AtomicUsize::new(0) } }

    pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }

    fn check(&self) -> Result<(), StorageError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.healthy_calls {
            Err(StorageError::Unavailable("storage quota exceeded".into()))
        } else {
            Ok(())
        }
    }
}

impl DurableStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check()?;
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check()?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check()?;
        self.inner.remove(key)
    }
}
