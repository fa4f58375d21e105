//! Live, id-keyed record collections synchronized against a backing array.
//!
//! A collection never owns its array. The array lives inside the owner's
//! serialized data and the collection reaches it through a
//! [`SourceHandle`]; every mutation goes straight into the shared tree.
//! Iteration order is always the array's current order.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use sheetstore_domain::{
    index_of_id, CollectionDecl, CollectionField, DomainError, FieldPath, RecordId,
    ValidationErrors,
};

use crate::error::RecordError;
use crate::infrastructure::RecordContext;

use super::collection_field::CollectionFieldExt;
use super::record::{Record, SyncOptions};
use super::root::RootDocument;
use super::source::{ArrayConflict, SourceHandle, SourceTree};

// =============================================================================
// Options
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitOptions {
    /// Accept unregistered record types instead of quarantining them.
    pub fallback: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Also look among quarantined entries.
    pub invalid: bool,
    /// Fail with `NotFound` instead of returning `None`.
    pub strict: bool,
}

impl GetOptions {
    pub fn invalid() -> Self {
        Self {
            invalid: true,
            strict: false,
        }
    }

    pub fn strict() -> Self {
        Self {
            invalid: false,
            strict: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModifyOptions {
    /// Also splice the backing array. Off when an outer operation already
    /// updated it.
    pub modify_source: bool,
}

impl Default for ModifyOptions {
    fn default() -> Self {
        Self {
            modify_source: true,
        }
    }
}

impl ModifyOptions {
    pub fn in_memory() -> Self {
        Self {
            modify_source: false,
        }
    }
}

// =============================================================================
// Ownership
// =============================================================================

/// Whatever declared the collection's field.
#[derive(Clone)]
pub enum CollectionOwner {
    Root(Weak<RootDocument>),
    Record(Weak<Record>),
    /// Standalone tree, not attached to any root.
    Detached(Arc<SourceTree>),
}

/// Anything holding nested collections.
pub trait EmbeddedOwner {
    fn nested_collections(&self) -> Vec<Arc<RecordCollection>>;

    fn nested_collection(&self, name: &str) -> Option<Arc<RecordCollection>> {
        self.nested_collections()
            .into_iter()
            .find(|collection| collection.name() == name)
    }
}

/// Run the deletion cascade of every collection nested in `owner`.
pub fn cascade_delete(owner: &dyn EmbeddedOwner) {
    for collection in owner.nested_collections() {
        collection.on_owner_deleted();
    }
}

/// Bring `current` in line with `decls`, keeping collections whose
/// declaration is unchanged. Returns the collections that were dropped; the
/// caller runs their cascade once no lock is held.
pub(crate) fn reconcile_collections(
    current: &RwLock<Vec<Arc<RecordCollection>>>,
    decls: Vec<CollectionDecl>,
    ctx: &Arc<RecordContext>,
    owner: CollectionOwner,
) -> Vec<Arc<RecordCollection>> {
    let mut current = current.write();
    let mut next = Vec::with_capacity(decls.len());
    for decl in decls {
        match current.iter().position(|c| c.decl() == &decl) {
            Some(index) => next.push(current.remove(index)),
            None => next.push(decl.build(ctx, owner.clone())),
        }
    }
    std::mem::replace(&mut *current, next)
}

// =============================================================================
// Collection
// =============================================================================

#[derive(Default)]
struct CollectionState {
    records: HashMap<RecordId, Arc<Record>>,
    invalid_ids: BTreeSet<RecordId>,
    initialized: bool,
}

pub struct RecordCollection {
    decl: CollectionDecl,
    ctx: Arc<RecordContext>,
    owner: CollectionOwner,
    state: RwLock<CollectionState>,
    this: Weak<RecordCollection>,
}

impl fmt::Debug for RecordCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("RecordCollection")
            .field("name", &self.decl.name)
            .field("element", &self.decl.element())
            .field("records", &state.records.len())
            .field("invalid_ids", &state.invalid_ids)
            .finish()
    }
}

impl RecordCollection {
    pub(crate) fn new(
        ctx: &Arc<RecordContext>,
        decl: CollectionDecl,
        owner: CollectionOwner,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            decl,
            ctx: ctx.clone(),
            owner,
            state: RwLock::new(CollectionState::default()),
            this: this.clone(),
        })
    }

    /// A collection over a standalone copy of `entries`, named `name`.
    ///
    /// Not attached to any root: reads and in-memory mutations work, write
    /// paths do not. Call [`initialize`](Self::initialize) to build records.
    pub fn detached(
        ctx: &Arc<RecordContext>,
        name: &str,
        element: &str,
        entries: Vec<Value>,
    ) -> Result<Arc<Self>, RecordError> {
        let field = CollectionField::new(element);
        field.validate_element(|kind| ctx.registry().flavor_of(kind))?;
        let decl = CollectionDecl::new(FieldPath::parse(name), field);
        let tree = SourceTree::new(Value::Object(Map::new()));
        SourceHandle::root(tree.clone())
            .write_array(&decl.path, |array| *array = entries)
            .map_err(|_| DomainError::invalid_path(name))?;
        Ok(Self::new(ctx, decl, CollectionOwner::Detached(tree)))
    }

    pub fn name(&self) -> &str {
        &self.decl.name
    }

    /// Field path relative to the owner's data.
    pub fn path(&self) -> &FieldPath {
        &self.decl.path
    }

    /// Kind of the element records.
    pub fn element(&self) -> &str {
        self.decl.element()
    }

    pub fn decl(&self) -> &CollectionDecl {
        &self.decl
    }

    pub fn owner(&self) -> &CollectionOwner {
        &self.owner
    }

    pub(crate) fn context(&self) -> &Arc<RecordContext> {
        &self.ctx
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().initialized
    }

    /// Handle to the owner's data.
    pub fn owner_handle(&self) -> Result<SourceHandle, RecordError> {
        match &self.owner {
            CollectionOwner::Root(root) => root
                .upgrade()
                .map(|root| root.source_handle())
                .ok_or_else(|| RecordError::detached(self.label())),
            CollectionOwner::Record(record) => record
                .upgrade()
                .ok_or_else(|| RecordError::detached(self.label()))?
                .source_handle(),
            CollectionOwner::Detached(tree) => Ok(SourceHandle::root(tree.clone())),
        }
    }

    /// Handle to the backing array.
    pub fn source_handle(&self) -> Result<SourceHandle, RecordError> {
        Ok(self.owner_handle()?.field(&self.decl.path))
    }

    /// `uuid` of the owning document, if attached.
    pub fn owner_uuid(&self) -> Option<String> {
        match &self.owner {
            CollectionOwner::Root(root) => root.upgrade().map(|root| root.uuid()),
            CollectionOwner::Record(record) => record.upgrade().map(|record| record.uuid()),
            CollectionOwner::Detached(_) => None,
        }
    }

    fn label(&self) -> String {
        match self.owner_uuid() {
            Some(owner) => format!("collection {owner}.{}", self.decl.name),
            None => format!("collection {}", self.decl.name),
        }
    }

    fn read_source<R>(&self, f: impl FnOnce(&[Value]) -> R) -> Result<R, RecordError> {
        Ok(self.source_handle()?.read(|node| {
            f(node
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default())
        }))
    }

    /// Mutate the backing array, creating it when the field is absent or
    /// null. Any other value at the field is left as is and rejected.
    fn write_source<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> Result<R, RecordError> {
        self.owner_handle()?
            .write_array(&self.decl.path, f)
            .map_err(|conflict| match conflict {
                ArrayConflict::Unresolved => RecordError::detached(self.label()),
                ArrayConflict::Occupied {
                    path,
                    expected,
                    found,
                } => DomainError::validation(
                    self.label(),
                    ValidationErrors::single(path, expected, found),
                )
                .into(),
            })
    }

    /// Ids of the object entries in the backing array, in array order.
    fn source_ids(&self) -> Vec<RecordId> {
        self.read_source(|entries| {
            let mut seen = HashSet::new();
            entries
                .iter()
                .filter_map(RecordId::of)
                .filter(|id| seen.insert(id.clone()))
                .collect()
        })
        .unwrap_or_default()
    }

    // =========================================================================
    // Synchronization
    // =========================================================================

    /// Synchronize live records with the backing array.
    ///
    /// The first run builds a record per entry. Later runs drop records whose
    /// entry disappeared (running their deletion cascade), refresh the
    /// remaining ones in place, and build records for new entries. Entries
    /// that fail validation are quarantined and reported through the error
    /// hook; structural failures propagate.
    pub fn initialize(&self, options: InitOptions) -> Result<(), RecordError> {
        let ids = self.assign_missing_ids()?;
        let first_run = !self.state.read().initialized;

        if !first_run {
            let present: HashSet<&RecordId> = ids.iter().collect();
            let removed: Vec<Arc<Record>> = {
                let mut state = self.state.write();
                state.invalid_ids.retain(|id| present.contains(id));
                let gone: Vec<RecordId> = state
                    .records
                    .keys()
                    .filter(|id| !present.contains(id))
                    .cloned()
                    .collect();
                gone.iter().filter_map(|id| state.records.remove(id)).collect()
            };
            for record in removed {
                tracing::debug!(collection = %self.decl.name, id = %record.id(), "Record left source");
                record.on_delete();
            }
        }

        for id in ids {
            let existing = self.state.read().records.get(&id).cloned();
            match existing {
                Some(record) => self.refresh(record, options)?,
                None => self.construct(id, options)?,
            }
        }

        self.state.write().initialized = true;
        Ok(())
    }

    /// Replace the backing array's contents in place, then synchronize.
    pub fn update_source(&self, entries: Vec<Value>, options: InitOptions) -> Result<(), RecordError> {
        self.write_source(|source| {
            source.clear();
            source.extend(entries);
        })?;
        self.initialize(options)
    }

    fn assign_missing_ids(&self) -> Result<Vec<RecordId>, RecordError> {
        let id_length = self.ctx.settings().id_length;
        let name = self.decl.name.as_str();
        self.write_source(|entries| {
            let mut seen = HashSet::new();
            let mut ids = Vec::with_capacity(entries.len());
            for (index, entry) in entries.iter_mut().enumerate() {
                let Value::Object(map) = entry else {
                    tracing::warn!(collection = name, index, "Skipping non-object collection entry");
                    continue;
                };
                let id = match map.get("_id").and_then(Value::as_str).filter(|id| !id.is_empty()) {
                    Some(id) => RecordId::new(id),
                    None => {
                        let id = RecordId::generate(id_length);
                        map.insert("_id".to_string(), Value::String(id.as_str().to_string()));
                        id
                    }
                };
                if !seen.insert(id.clone()) {
                    tracing::warn!(collection = name, id = %id, "Skipping duplicate collection entry");
                    continue;
                }
                ids.push(id);
            }
            ids
        })
    }

    fn construct(&self, id: RecordId, options: InitOptions) -> Result<(), RecordError> {
        let record = Record::new(&self.ctx, self.element(), self.this.clone(), id.clone(), None)?;
        match record.synchronize(SyncOptions::strict(options.fallback)) {
            Ok(()) => {
                let mut state = self.state.write();
                state.invalid_ids.remove(&id);
                state.records.insert(id, record);
                Ok(())
            }
            Err(err) if err.is_data_error() => {
                self.quarantine(id, err);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn refresh(&self, record: Arc<Record>, options: InitOptions) -> Result<(), RecordError> {
        match record.synchronize(SyncOptions::strict(options.fallback)) {
            Ok(()) => {
                record.render();
                Ok(())
            }
            Err(err) if err.is_data_error() => {
                self.quarantine(record.id().clone(), err);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn quarantine(&self, id: RecordId, error: RecordError) {
        tracing::warn!(collection = %self.decl.name, id = %id, error = %error, "Quarantined invalid record");
        self.ctx.error_hook().report(
            "RecordCollection#initialize",
            &error,
            &json!({
                "collection": self.decl.name,
                "element": self.element(),
                "id": id,
                "owner": self.owner_uuid(),
            }),
        );
        let removed = {
            let mut state = self.state.write();
            state.invalid_ids.insert(id.clone());
            state.records.remove(&id)
        };
        if let Some(record) = removed {
            record.on_delete();
        }
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn get(&self, id: &RecordId) -> Option<Arc<Record>> {
        self.state.read().records.get(id).cloned()
    }

    /// Lookup with quarantine access and strictness.
    ///
    /// A quarantined entry comes back as a throwaway record built leniently
    /// from its raw data over a private copy; it is never registered.
    pub fn get_with(&self, id: &RecordId, options: GetOptions) -> Result<Option<Arc<Record>>, RecordError> {
        if let Some(record) = self.get(id) {
            return Ok(Some(record));
        }
        if options.invalid && self.state.read().invalid_ids.contains(id) {
            let raw = self
                .source_handle()?
                .entry(id)
                .get()
                .ok_or_else(|| RecordError::not_found(self.name(), id))?;
            let record = Record::new(
                &self.ctx,
                self.element(),
                self.this.clone(),
                id.clone(),
                Some(SourceTree::new(raw)),
            )?;
            record.synchronize(SyncOptions::lenient())?;
            return Ok(Some(record));
        }
        if options.strict {
            return Err(RecordError::not_found(self.name(), id));
        }
        Ok(None)
    }

    pub fn has(&self, id: &RecordId) -> bool {
        self.state.read().records.contains_key(id)
    }

    pub fn is_invalid(&self, id: &RecordId) -> bool {
        self.state.read().invalid_ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live records in backing-array order.
    pub fn contents(&self) -> Vec<Arc<Record>> {
        let ids = self.source_ids();
        let state = self.state.read();
        ids.iter()
            .filter_map(|id| state.records.get(id).cloned())
            .collect()
    }

    /// Live ids in backing-array order.
    pub fn ids(&self) -> Vec<RecordId> {
        self.contents().iter().map(|record| record.id().clone()).collect()
    }

    /// Quarantined ids in backing-array order.
    pub fn invalid_ids(&self) -> Vec<RecordId> {
        let ids = self.source_ids();
        let state = self.state.read();
        ids.into_iter()
            .filter(|id| state.invalid_ids.contains(id))
            .collect()
    }

    pub fn find(&self, predicate: impl Fn(&Record) -> bool) -> Option<Arc<Record>> {
        self.contents().into_iter().find(|record| predicate(record))
    }

    /// Plain copy of the backing array, quarantined entries included.
    pub fn to_source(&self) -> Vec<Value> {
        self.read_source(<[Value]>::to_vec).unwrap_or_default()
    }

    // =========================================================================
    // In-memory mutation
    // =========================================================================

    /// Validate `data` and register it as a live record, replacing any live
    /// record with the same id in place.
    pub fn set(&self, mut data: Value, options: ModifyOptions) -> Result<Arc<Record>, RecordError> {
        let fallback = self.ctx.settings().type_fallback;
        let schema = self.ctx.registry().schema_for(self.element())?;
        let id = match RecordId::of(&data) {
            Some(id) => id,
            None => {
                let id = RecordId::generate(self.ctx.settings().id_length);
                if let Value::Object(map) = &mut data {
                    map.insert("_id".to_string(), Value::String(id.as_str().to_string()));
                }
                id
            }
        };
        let resolved = schema.resolve_type_of(&data, fallback)?;
        schema.clean(&mut data, &resolved);
        schema.validate(&data, &resolved)?;

        if options.modify_source {
            self.write_source(|entries| match index_of_id(entries, &id) {
                Some(index) => entries[index] = data,
                None => entries.push(data),
            })?;
        }

        let record = match self.get(&id) {
            Some(record) => record,
            None => Record::new(&self.ctx, self.element(), self.this.clone(), id.clone(), None)?,
        };
        record.synchronize(SyncOptions::strict(fallback))?;

        let mut state = self.state.write();
        state.invalid_ids.remove(&id);
        state.records.insert(id, record.clone());
        Ok(record)
    }

    /// Unregister `id` (live or quarantined). Does not run the deletion
    /// cascade. With `modify_source`, the entry is spliced out and the
    /// removed record keeps its last data as a detached copy.
    pub fn delete(&self, id: &RecordId, options: ModifyOptions) -> Result<Option<Arc<Record>>, RecordError> {
        let removed = {
            let mut state = self.state.write();
            state.invalid_ids.remove(id);
            state.records.remove(id)
        };
        if options.modify_source {
            let last = self.write_source(|entries| index_of_id(entries, id).map(|index| entries.remove(index)))?;
            if let (Some(record), Some(data)) = (&removed, last) {
                record.detach(data);
            }
        }
        Ok(removed)
    }

    /// The owner was deleted: drop every record and run its cascade.
    pub(crate) fn on_owner_deleted(&self) {
        let records: Vec<Arc<Record>> = {
            let mut state = self.state.write();
            state.invalid_ids.clear();
            state.initialized = false;
            state.records.drain().map(|(_, record)| record).collect()
        };
        for record in records {
            record.on_delete();
        }
    }
}
