//! Unified error type for live record operations.
//!
//! Wraps schema failures from the domain crate and persistence failures from
//! the root store, and adds the structural failures that only exist once
//! records are wired into a live tree.

use sheetstore_domain::{DomainError, RecordId};
use thiserror::Error;

use crate::infrastructure::ports::StoreError;

#[derive(Debug, Error)]
pub enum RecordError {
    /// Schema, validation, type or path failure.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The root persistence call failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Strict lookup of an id that is neither live nor quarantined.
    #[error("Collection \"{collection}\" has no record {id}")]
    NotFound { collection: String, id: RecordId },

    /// No native, typed or ad hoc collection answers to this name.
    #[error("Unknown embedded collection \"{0}\"")]
    UnknownCollection(String),

    /// The traversal chain does not resolve to an array on the root snapshot.
    #[error("Broken write path: {0}")]
    BrokenWritePath(String),

    /// The record or collection is no longer reachable from a root.
    #[error("{0} is detached from its root")]
    Detached(String),

    /// A native collection was addressed but no native port is configured.
    #[error("No native document port for collection \"{0}\"")]
    NativeUnavailable(String),
}

impl RecordError {
    pub fn not_found(collection: impl Into<String>, id: &RecordId) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.clone(),
        }
    }

    pub fn broken_write_path(msg: impl Into<String>) -> Self {
        Self::BrokenWritePath(msg.into())
    }

    pub fn detached(what: impl Into<String>) -> Self {
        Self::Detached(what.into())
    }

    /// Per-entry data problems, which collections quarantine instead of
    /// propagating.
    pub fn is_data_error(&self) -> bool {
        matches!(self, Self::Domain(e) if e.is_data_error())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
