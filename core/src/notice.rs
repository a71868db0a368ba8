//! User-facing notices.
//!
//! Components never surface failures by panicking into the host. They broadcast
//! a notice instead, which a host renders as a transient, non-blocking message.

use chrono::{DateTime, Utc};

/// Notices emitted by an [`crate::autosave::Autosave`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveNotice {
    /// Emitted for automatic saves only when `announce` is set; manual saves report through their return value
    Saved { at: DateTime<Utc> },
    /// The value stays dirty and the next timer tick retries
    SaveFailed { message: String },
    /// The durable mirror failed and is off for the rest of this session
    StorageDisabled { key: String, message: String },
}

/// Notices emitted by an [`crate::optimistic::Optimistic`] controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationNotice<Id> {
    Committed { ids: Vec<Id> },
    /// The listed rows were snapped back to their pre-mutation values
    RolledBack { ids: Vec<Id>, message: String },
    Removed { id: Id },
    /// The row was reinserted
    RemoveFailed { id: Id, message: String },
}

impl SaveNotice {
    pub fn is_failure(&self) -> bool { !matches!(self, SaveNotice::Saved { .. }) }
}

impl<Id> MutationNotice<Id> {
    pub fn is_failure(&self) -> bool { matches!(self, MutationNotice::RolledBack { .. } | MutationNotice::RemoveFailed { .. }) }
}

impl std::fmt::Display for SaveNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaveNotice::Saved { at } => write!(f, "Saved at {}", at.format("%H:%M:%S")),
            SaveNotice::SaveFailed { message } => write!(f, "Could not save changes, will retry: {message}"),
            SaveNotice::StorageDisabled { message, .. } => write!(f, "Local draft recovery is off for this session: {message}"),
        }
    }
}

impl<Id: std::fmt::Debug> std::fmt::Display for MutationNotice<Id> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationNotice::Committed { ids } if ids.len() == 1 => write!(f, "Updated {:?}", ids[0]),
            MutationNotice::Committed { ids } => write!(f, "Updated {} items", ids.len()),
            MutationNotice::RolledBack { ids, message } if ids.len() == 1 => write!(f, "Could not update {:?}: {message}", ids[0]),
            MutationNotice::RolledBack { ids, message } => write!(f, "Could not update {} items: {message}", ids.len()),
            MutationNotice::Removed { id } => write!(f, "Deleted {id:?}"),
            MutationNotice::RemoveFailed { id, message } => write!(f, "Could not delete {id:?}: {message}"),
        }
    }
}
