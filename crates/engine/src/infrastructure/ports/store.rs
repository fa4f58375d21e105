//! Persistence ports: the root store and the host's native collections.

use async_trait::async_trait;
use serde_json::Value;
use sheetstore_domain::{RecordId, UpdatePatch};

use super::error::StoreError;

// =============================================================================
// Root Persistence
// =============================================================================

/// The only write primitive the host exposes: replace whole named fields on
/// a root document. Keys are dotted paths; numeric segments index arrays.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RootStore: Send + Sync {
    async fn update(&self, root_id: &RecordId, patch: &UpdatePatch) -> Result<(), StoreError>;
}

// =============================================================================
// Native Collections
// =============================================================================

/// Collections the host persists natively on a root document. Requests for
/// these never touch the pseudo-record machinery.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NativeDocuments: Send + Sync {
    async fn create(
        &self,
        root_id: &RecordId,
        collection: &str,
        data: Vec<Value>,
    ) -> Result<Vec<Value>, StoreError>;

    async fn update(
        &self,
        root_id: &RecordId,
        collection: &str,
        updates: Vec<Value>,
    ) -> Result<Vec<Value>, StoreError>;

    async fn delete(
        &self,
        root_id: &RecordId,
        collection: &str,
        ids: Vec<RecordId>,
    ) -> Result<Vec<RecordId>, StoreError>;

    fn get(&self, root_id: &RecordId, collection: &str, id: &RecordId) -> Option<Value>;
}
