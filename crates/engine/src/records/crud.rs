//! Public CRUD entry points for records.
//!
//! Every operation resolves one [`WritePath`] for the target collection,
//! mutates its working array, and commits it as a single root patch.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use sheetstore_domain::{expand_object, merge_object, DomainError, RecordId, ValidationErrors};
use tracing::instrument;

use crate::error::RecordError;

use super::collection::RecordCollection;
use super::record::Record;
use super::write_path::{WritePath, WriteTarget};

impl Record {
    /// Create records in `collection` from plain data.
    ///
    /// Missing ids are generated (nested records included). Input is cleaned
    /// and validated before anything is written; an id that already exists
    /// in the collection is rejected.
    #[instrument(skip_all, fields(collection = %collection.name(), count = data.len()))]
    pub async fn create_documents(
        collection: &Arc<RecordCollection>,
        data: Vec<Value>,
    ) -> Result<Vec<Arc<Record>>, RecordError> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let ctx = collection.context().clone();
        let registry = ctx.registry();
        let element = collection.element();
        let schema = registry.schema_for(element)?;
        let fallback = ctx.settings().type_fallback;

        let mut path = WritePath::resolve(WriteTarget::Collection(collection.clone()))?;
        let mut created = Vec::with_capacity(data.len());
        let mut batch = HashSet::new();
        for mut entry in data {
            if !entry.is_object() {
                return Err(DomainError::validation(
                    schema.document_name(),
                    ValidationErrors::single("", "object", entry.to_string()),
                )
                .into());
            }
            registry.migrate_data(element, &mut entry)?;
            registry.assign_ids(element, &mut entry, ctx.settings().id_length)?;
            let resolved = schema.resolve_type_of(&entry, fallback)?;
            schema.clean(&mut entry, &resolved);
            schema.validate(&entry, &resolved)?;

            let id = RecordId::of(&entry)
                .ok_or_else(|| DomainError::not_found("Record", "_id"))?;
            if path.position(&id).is_some() || !batch.insert(id.clone()) {
                return Err(DomainError::validation(
                    schema.document_name(),
                    ValidationErrors::single("_id", "unique id", id.as_str()),
                )
                .into());
            }
            path.array_mut().push(entry);
            created.push(id);
        }

        path.commit().await?;
        live_records(collection, &created)
    }

    /// Deep-merge differential updates into existing records.
    ///
    /// Each update names its target through `_id`; dotted keys are expanded
    /// before merging, and the merged entry must validate.
    #[instrument(skip_all, fields(collection = %collection.name(), count = updates.len()))]
    pub async fn update_documents(
        collection: &Arc<RecordCollection>,
        updates: Vec<Value>,
    ) -> Result<Vec<Arc<Record>>, RecordError> {
        if updates.is_empty() {
            return Ok(Vec::new());
        }
        let ctx = collection.context().clone();
        let schema = ctx.registry().schema_for(collection.element())?;
        let fallback = ctx.settings().type_fallback;

        let mut path = WritePath::resolve(WriteTarget::Collection(collection.clone()))?;
        let mut updated = Vec::with_capacity(updates.len());
        for update in updates {
            let mut changes = match update {
                Value::Object(changes) => changes,
                other => {
                    return Err(DomainError::validation(
                        schema.document_name(),
                        ValidationErrors::single("", "object", other.to_string()),
                    )
                    .into());
                }
            };
            let id = changes
                .remove("_id")
                .and_then(|id| id.as_str().map(RecordId::new))
                .ok_or_else(|| {
                    DomainError::validation(
                        schema.document_name(),
                        ValidationErrors::single("_id", "record id", "undefined"),
                    )
                })?;
            let index = path
                .position(&id)
                .ok_or_else(|| RecordError::not_found(collection.name(), &id))?;

            let mut entry = path.array()[index].clone();
            merge_object(&mut entry, Value::Object(expand_object(changes)));
            let resolved = schema.resolve_type_of(&entry, fallback)?;
            schema.clean(&mut entry, &resolved);
            schema.validate(&entry, &resolved)?;
            path.array_mut()[index] = entry;
            updated.push(id);
        }

        path.commit().await?;
        live_records(collection, &updated)
    }

    /// Remove records (live or quarantined) by id.
    ///
    /// Live records are detached with their last data before the write, so
    /// callers holding them can still read them afterwards.
    #[instrument(skip_all, fields(collection = %collection.name(), count = ids.len()))]
    pub async fn delete_documents(
        collection: &Arc<RecordCollection>,
        ids: Vec<RecordId>,
    ) -> Result<Vec<Arc<Record>>, RecordError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut path = WritePath::resolve(WriteTarget::Collection(collection.clone()))?;
        let mut removed = Vec::with_capacity(ids.len());
        for id in &ids {
            let index = path
                .position(id)
                .ok_or_else(|| RecordError::not_found(collection.name(), id))?;
            let data = path.array_mut().remove(index);
            if let Some(record) = collection.get(id) {
                record.detach(data);
                removed.push(record);
            }
        }

        path.commit().await?;
        Ok(removed)
    }

    /// Update this record with a differential change.
    pub async fn update(&self, mut changes: Value) -> Result<Option<Arc<Record>>, RecordError> {
        let collection = self.writable_home()?;
        if let Value::Object(map) = &mut changes {
            map.insert("_id".to_string(), Value::String(self.id().as_str().to_string()));
        }
        let mut updated = Record::update_documents(&collection, vec![changes]).await?;
        Ok(updated.pop())
    }

    /// Delete this record from its home collection.
    pub async fn delete(&self) -> Result<Option<Arc<Record>>, RecordError> {
        let collection = self.writable_home()?;
        let mut removed = Record::delete_documents(&collection, vec![self.id().clone()]).await?;
        Ok(removed.pop())
    }

    fn writable_home(&self) -> Result<Arc<RecordCollection>, RecordError> {
        if self.is_detached() {
            return Err(RecordError::detached(self.uuid()));
        }
        self.home().ok_or_else(|| RecordError::detached(self.uuid()))
    }
}

/// The live records for `ids`; an id that did not survive the commit's
/// resynchronization is an error.
fn live_records(collection: &RecordCollection, ids: &[RecordId]) -> Result<Vec<Arc<Record>>, RecordError> {
    ids.iter()
        .map(|id| {
            collection
                .get(id)
                .ok_or_else(|| RecordError::not_found(collection.name(), id))
        })
        .collect()
}

impl RecordCollection {
    pub async fn create_documents(self: &Arc<Self>, data: Vec<Value>) -> Result<Vec<Arc<Record>>, RecordError> {
        Record::create_documents(self, data).await
    }

    pub async fn update_documents(
        self: &Arc<Self>,
        updates: Vec<Value>,
    ) -> Result<Vec<Arc<Record>>, RecordError> {
        Record::update_documents(self, updates).await
    }

    pub async fn delete_documents(
        self: &Arc<Self>,
        ids: Vec<RecordId>,
    ) -> Result<Vec<Arc<Record>>, RecordError> {
        Record::delete_documents(self, ids).await
    }
}
