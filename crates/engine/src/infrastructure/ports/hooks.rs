//! Callback ports: error reporting, render observers and data preparation.
//!
//! None of these are invoked while the engine holds a lock, so
//! implementations may freely read back into the record tree.

use std::sync::Arc;

use serde_json::{Map, Value};
use sheetstore_domain::RecordId;

use crate::error::RecordError;
use crate::records::{Record, RecordCollection, RootDocument};

/// Borrowed view of either kind of document, passed to callbacks.
#[derive(Clone, Copy)]
pub enum DocumentRef<'a> {
    Root(&'a RootDocument),
    Record(&'a Record),
}

impl<'a> DocumentRef<'a> {
    pub fn id(&self) -> &'a RecordId {
        match self {
            Self::Root(root) => root.id(),
            Self::Record(record) => record.id(),
        }
    }

    pub fn document_name(&self) -> &'a str {
        match self {
            Self::Root(root) => root.document_name(),
            Self::Record(record) => record.document_name(),
        }
    }

    pub fn uuid(&self) -> String {
        match self {
            Self::Root(root) => root.uuid(),
            Self::Record(record) => record.uuid(),
        }
    }

    /// Current serialized data.
    pub fn source(&self) -> Option<Value> {
        match self {
            Self::Root(root) => Some(root.snapshot()),
            Self::Record(record) => record.source(),
        }
    }

    /// A nested record collection by field name.
    pub fn collection(&self, name: &str) -> Option<Arc<RecordCollection>> {
        match self {
            Self::Root(root) => root.pseudo_collection(name),
            Self::Record(record) => record.collection(name),
        }
    }

    pub fn as_record(&self) -> Option<&'a Record> {
        match self {
            Self::Record(record) => Some(record),
            Self::Root(_) => None,
        }
    }
}

// =============================================================================
// Error Reporting
// =============================================================================

/// Global hook for failures that are absorbed rather than propagated
/// (quarantined entries). Must not fail or block.
#[cfg_attr(test, mockall::automock)]
pub trait ErrorHook: Send + Sync {
    fn report(&self, source: &str, error: &RecordError, context: &Value);
}

// =============================================================================
// Rendering
// =============================================================================

/// A UI instance attached to a document.
pub trait RecordObserver: Send + Sync {
    /// The document's data changed.
    fn render(&self, document: DocumentRef<'_>);

    /// The document was deleted; the observer is dropped afterwards.
    fn close(&self, document: DocumentRef<'_>);
}

// =============================================================================
// Data Preparation
// =============================================================================

/// Computes derived state for one kind.
///
/// Runs base pass, then embedded records, then derived pass. Both passes
/// write into a fresh map that replaces the document's derived data, so
/// repeated runs converge.
pub trait DataPreparer: Send + Sync {
    fn prepare_base_data(&self, _document: DocumentRef<'_>, _derived: &mut Map<String, Value>) {}

    fn prepare_derived_data(&self, _document: DocumentRef<'_>, _derived: &mut Map<String, Value>) {
    }
}
