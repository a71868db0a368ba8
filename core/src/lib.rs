//! Client-side state synchronization for editing surfaces backed by a remote
//! system of record.
//!
//! - [`autosave::Autosave`] keeps an in-progress edit durable without an explicit save
//! - [`optimistic::Optimistic`] makes list mutations appear instantly and rolls them back on failure
//! - [`pending::PendingSet`] tracks which ids are mid-mutation so a host can disable their controls

pub mod autosave;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod notice;
pub mod optimistic;
pub mod order;
pub mod pending;
pub mod snapshot;
pub mod store;
pub mod traits;

pub use autosave::{Autosave, AutosaveBuilder, SaveOutcome, Trigger};
pub use config::AutosaveConfig;
pub use lifecycle::{BeforeUnload, PageLifecycle};
pub use notice::{MutationNotice, SaveNotice};
pub use optimistic::{MutationOutcome, Optimistic, Row};
pub use order::CollectionOrder;
pub use pending::PendingSet;
pub use store::{DurableStore, MemoryStore};
pub use traits::{persist_fn, Persist, Record, Remote, Transition};

pub use tether_signals as signals;
