//! In-memory root store.
//!
//! Keeps the persisted form of every root plus a log of every patch it
//! accepted, in order. Used by the demo binary and the scenario tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use sheetstore_domain::{RecordId, UpdatePatch};
use tokio::sync::RwLock;

use crate::infrastructure::ports::{RootStore, StoreError};

#[derive(Debug, Default)]
pub struct MemoryRootStore {
    roots: RwLock<HashMap<RecordId, Value>>,
    patches: RwLock<Vec<(RecordId, UpdatePatch)>>,
}

impl MemoryRootStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist a root. Its data must carry an `_id`.
    pub async fn insert(&self, data: Value) -> Result<RecordId, StoreError> {
        let id = RecordId::of(&data)
            .ok_or_else(|| StoreError::rejected("insert", "root data has no _id"))?;
        self.roots.write().await.insert(id.clone(), data);
        Ok(id)
    }

    pub async fn get(&self, root_id: &RecordId) -> Option<Value> {
        self.roots.read().await.get(root_id).cloned()
    }

    /// Every accepted patch, oldest first.
    pub async fn patch_log(&self) -> Vec<(RecordId, UpdatePatch)> {
        self.patches.read().await.clone()
    }
}

#[async_trait]
impl RootStore for MemoryRootStore {
    async fn update(&self, root_id: &RecordId, patch: &UpdatePatch) -> Result<(), StoreError> {
        {
            let mut roots = self.roots.write().await;
            let data = roots
                .get_mut(root_id)
                .ok_or_else(|| StoreError::not_found(root_id))?;
            // Apply to a copy so a rejected key leaves the stored root untouched.
            let mut updated = data.clone();
            patch
                .apply_to(&mut updated)
                .map_err(|e| StoreError::rejected("update", e))?;
            *data = updated;
        }
        tracing::debug!(root_id = %root_id, keys = ?patch.keys().collect::<Vec<_>>(), "Root patch applied");
        self.patches
            .write()
            .await
            .push((root_id.clone(), patch.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn update_applies_patch_and_logs_it() {
        let store = MemoryRootStore::new();
        let id = store
            .insert(json!({"_id": "hero", "system": {"bag": {"items": []}}}))
            .await
            .expect("insert");

        let patch = UpdatePatch::single("system.bag.items", json!([{"_id": "a"}]));
        store.update(&id, &patch).await.expect("update");

        let stored = store.get(&id).await.expect("stored");
        assert_eq!(stored["system"]["bag"]["items"], json!([{"_id": "a"}]));
        assert_eq!(store.patch_log().await, vec![(id, patch)]);
    }

    #[tokio::test]
    async fn numeric_segments_address_nested_arrays() {
        let store = MemoryRootStore::new();
        let id = store
            .insert(json!({"_id": "hero", "items": [{"_id": "a", "effects": []}]}))
            .await
            .expect("insert");

        let patch = UpdatePatch::single("items.0.effects", json!([{"_id": "e"}]));
        store.update(&id, &patch).await.expect("update");

        let stored = store.get(&id).await.expect("stored");
        assert_eq!(stored["items"][0]["effects"], json!([{"_id": "e"}]));
    }

    #[tokio::test]
    async fn unknown_root_is_not_found() {
        let store = MemoryRootStore::new();
        let err = store
            .update(&RecordId::new("ghost"), &UpdatePatch::new())
            .await
            .expect_err("missing root");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn rejected_patch_leaves_root_untouched() {
        let store = MemoryRootStore::new();
        let id = store
            .insert(json!({"_id": "hero", "items": []}))
            .await
            .expect("insert");

        let mut patch = UpdatePatch::new();
        patch.insert("name", json!("Renamed"));
        patch.insert("items.3.effects", json!([]));
        let err = store.update(&id, &patch).await.expect_err("out of range");
        assert!(matches!(err, StoreError::Rejected { .. }));
        assert_eq!(store.get(&id).await, Some(json!({"_id": "hero", "items": []})));
        assert!(store.patch_log().await.is_empty());
    }
}
