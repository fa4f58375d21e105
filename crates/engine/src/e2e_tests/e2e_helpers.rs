//! Shared setup for the record scenarios.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use sheetstore_domain::{get_dotted, RecordId, UpdatePatch};

use crate::error::RecordError;
use crate::infrastructure::ports::MockRootStore;
use crate::infrastructure::{MemoryRootStore, RecordContext};
use crate::records::{EmbeddedCollection, RecordCollection, RootDocument};
use crate::test_fixtures::{self, load_fixture};

/// A root persisted in a memory store.
pub struct E2ETestContext {
    pub store: Arc<MemoryRootStore>,
    pub root: Arc<RootDocument>,
}

impl E2ETestContext {
    pub async fn setup(fixture: &str) -> Result<Self, RecordError> {
        Self::setup_with(fixture, test_fixtures::context()).await
    }

    pub async fn setup_with(fixture: &str, ctx: Arc<RecordContext>) -> Result<Self, RecordError> {
        let data: Value = load_fixture(fixture);
        let store = Arc::new(MemoryRootStore::new());
        store.insert(data.clone()).await?;
        let root = RootDocument::builder(ctx, "Actor", store.clone()).build(data)?;
        Ok(Self { store, root })
    }

    /// The stored value at `dotted`, as the host would see it.
    pub async fn persisted(&self, dotted: &str) -> Option<Value> {
        let data = self.store.get(self.root.id()).await?;
        get_dotted(&data, dotted).cloned()
    }

    pub fn items(&self) -> Arc<RecordCollection> {
        pseudo(&self.root, "items")
    }
}

/// A pseudo collection on `root`, panicking on anything else.
pub fn pseudo(root: &RootDocument, name: &str) -> Arc<RecordCollection> {
    match root.get_embedded_collection(name) {
        Ok(EmbeddedCollection::Pseudo(collection)) => collection,
        other => panic!("expected pseudo collection {name}, got {other:?}"),
    }
}

/// Every patch a mocked store received.
pub type PatchLog = Arc<Mutex<Vec<(RecordId, UpdatePatch)>>>;

/// A mock store expecting exactly `times` updates, recording each one.
pub fn recording_store(times: usize) -> (MockRootStore, PatchLog) {
    let log: PatchLog = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let mut store = MockRootStore::new();
    store
        .expect_update()
        .times(times)
        .returning(move |root_id, patch| {
            sink.lock().push((root_id.clone(), patch.clone()));
            Ok(())
        });
    (store, log)
}
