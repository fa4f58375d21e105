//! Root integration: the persisted host document that owns record trees.
//!
//! A root owns its serialized data (one [`SourceTree`]) and the collections
//! declared by its schema, by its typed payload, and any ad hoc collections
//! registered while building it. Embedded-collection requests are routed
//! to the host's native collections first, then to these.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use sheetstore_domain::{
    get_dotted, pointer_for, CollectionDecl, CollectionField, CompositeSchema, DomainError, FieldPath,
    KindFlavor, RecordId, ResolvedType, UpdatePatch,
};

use crate::error::RecordError;
use crate::infrastructure::ports::{DocumentRef, NativeDocuments, RecordObserver, RootStore};
use crate::infrastructure::RecordContext;

use super::collection::{
    cascade_delete, reconcile_collections, CollectionOwner, EmbeddedOwner, GetOptions,
    InitOptions, RecordCollection,
};
use super::collection_field::CollectionFieldExt;
use super::record::Record;
use super::source::{SourceHandle, SourceTree};

/// Where an embedded-collection name resolved to.
#[derive(Debug, Clone)]
pub enum EmbeddedCollection {
    /// Persisted natively by the host.
    Native(String),
    Pseudo(Arc<RecordCollection>),
}

/// A document returned by root-level embedded operations.
#[derive(Debug, Clone)]
pub enum EmbeddedDocument {
    Native(Value),
    Pseudo(Arc<Record>),
}

impl EmbeddedDocument {
    pub fn id(&self) -> Option<RecordId> {
        match self {
            Self::Native(data) => RecordId::of(data),
            Self::Pseudo(record) => Some(record.id().clone()),
        }
    }

    pub fn as_record(&self) -> Option<&Arc<Record>> {
        match self {
            Self::Pseudo(record) => Some(record),
            Self::Native(_) => None,
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

pub struct RootDocumentBuilder {
    ctx: Arc<RecordContext>,
    kind: String,
    store: Arc<dyn RootStore>,
    native: Option<Arc<dyn NativeDocuments>>,
    ad_hoc: Vec<(String, FieldPath, String)>,
}

impl RootDocumentBuilder {
    pub fn native_documents(mut self, port: Arc<dyn NativeDocuments>) -> Self {
        self.native = Some(port);
        self
    }

    /// Register a collection of `element` records at `path` (dotted,
    /// relative to the root data) under `name`.
    pub fn ad_hoc_collection(
        mut self,
        name: impl Into<String>,
        path: &str,
        element: impl Into<String>,
    ) -> Self {
        self.ad_hoc
            .push((name.into(), FieldPath::parse(path), element.into()));
        self
    }

    /// Migrate, clean and validate `data`, then configure and synchronize
    /// every collection the root declares.
    pub fn build(self, mut data: Value) -> Result<Arc<RootDocument>, RecordError> {
        let registry = self.ctx.registry();
        let schema = registry.schema_for(&self.kind)?;
        if schema.flavor() != KindFlavor::Native {
            return Err(DomainError::definition(format!(
                "\"{}\" is a record kind and cannot be a root document",
                self.kind
            ))
            .into());
        }

        registry.migrate_data(&self.kind, &mut data)?;
        let fallback = self.ctx.settings().type_fallback;
        let resolved = schema.resolve_type_of(&data, fallback)?;
        schema.clean(&mut data, &resolved);
        schema.validate(&data, &resolved)?;
        let id = RecordId::of(&data).ok_or_else(|| DomainError::not_found("RootDocument", "_id"))?;

        let ad_hoc = self.ad_hoc_decls(&schema, &resolved)?;
        for decl in &ad_hoc {
            if let Some(entries) = data.pointer_mut(&pointer_for(decl.path.segments())) {
                decl.field.migrate_source(registry, entries)?;
            }
        }

        let root = Arc::new_cyclic(|this: &Weak<RootDocument>| RootDocument {
            id,
            kind: self.kind.clone(),
            schema,
            ctx: self.ctx.clone(),
            tree: SourceTree::new(data),
            store: self.store.clone(),
            native: self.native.clone(),
            resolved: RwLock::new(ResolvedType::Untyped),
            typed: RwLock::new(Vec::new()),
            ad_hoc: ad_hoc
                .iter()
                .map(|decl| decl.build(&self.ctx, CollectionOwner::Root(this.clone())))
                .collect(),
            derived: RwLock::new(Map::new()),
            observers: Mutex::new(Vec::new()),
            deleted: AtomicBool::new(false),
            this: this.clone(),
        });
        root.refresh()?;
        tracing::debug!(
            root = %root.uuid(),
            collections = root.nested_collections().len(),
            "Root document configured"
        );
        Ok(root)
    }

    fn ad_hoc_decls(
        &self,
        schema: &CompositeSchema,
        resolved: &ResolvedType,
    ) -> Result<Vec<CollectionDecl>, RecordError> {
        let registry = self.ctx.registry();
        let mut taken: BTreeSet<String> = schema.native_collections().iter().cloned().collect();
        taken.extend(schema.collections_for(resolved).into_iter().map(|decl| decl.name));

        let mut decls = Vec::with_capacity(self.ad_hoc.len());
        for (name, path, element) in &self.ad_hoc {
            let field = CollectionField::new(element.as_str());
            field.validate_element(|kind| registry.flavor_of(kind))?;
            if !taken.insert(name.clone()) {
                return Err(DomainError::definition(format!(
                    "ad hoc collection \"{name}\" collides with an existing collection on {}",
                    self.kind
                ))
                .into());
            }
            decls.push(CollectionDecl {
                name: name.clone(),
                path: path.clone(),
                field,
            });
        }
        Ok(decls)
    }
}

// =============================================================================
// Root document
// =============================================================================

pub struct RootDocument {
    id: RecordId,
    kind: String,
    schema: Arc<CompositeSchema>,
    ctx: Arc<RecordContext>,
    tree: Arc<SourceTree>,
    store: Arc<dyn RootStore>,
    native: Option<Arc<dyn NativeDocuments>>,
    resolved: RwLock<ResolvedType>,
    typed: RwLock<Vec<Arc<RecordCollection>>>,
    ad_hoc: Vec<Arc<RecordCollection>>,
    derived: RwLock<Map<String, Value>>,
    observers: Mutex<Vec<Arc<dyn RecordObserver>>>,
    deleted: AtomicBool,
    this: Weak<RootDocument>,
}

impl fmt::Debug for RootDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootDocument")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("type", &self.type_name())
            .finish_non_exhaustive()
    }
}

impl RootDocument {
    pub fn builder(
        ctx: Arc<RecordContext>,
        kind: impl Into<String>,
        store: Arc<dyn RootStore>,
    ) -> RootDocumentBuilder {
        RootDocumentBuilder {
            ctx,
            kind: kind.into(),
            store,
            native: None,
            ad_hoc: Vec::new(),
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn document_name(&self) -> &str {
        self.schema.document_name()
    }

    pub fn type_name(&self) -> Option<String> {
        self.resolved.read().name().map(str::to_string)
    }

    pub fn uuid(&self) -> String {
        format!("{}.{}", self.document_name(), self.id)
    }

    pub(crate) fn store(&self) -> &Arc<dyn RootStore> {
        &self.store
    }

    pub fn source_handle(&self) -> SourceHandle {
        SourceHandle::root(self.tree.clone())
    }

    /// Deep copy of the root's current serialized data.
    pub fn snapshot(&self) -> Value {
        self.tree.snapshot()
    }

    pub fn get(&self, dotted: &str) -> Option<Value> {
        self.tree.read(|data| get_dotted(data, dotted).cloned())
    }

    pub fn derived(&self) -> Map<String, Value> {
        self.derived.read().clone()
    }

    pub fn derived_value(&self, key: &str) -> Option<Value> {
        self.derived.read().get(key).cloned()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Embedded collections
    // =========================================================================

    /// A record collection by name: typed-payload collections, then ad hoc.
    pub fn pseudo_collection(&self, name: &str) -> Option<Arc<RecordCollection>> {
        self.typed
            .read()
            .iter()
            .find(|collection| collection.name() == name)
            .cloned()
            .or_else(|| {
                self.ad_hoc
                    .iter()
                    .find(|collection| collection.name() == name)
                    .cloned()
            })
    }

    pub fn get_embedded_collection(&self, name: &str) -> Result<EmbeddedCollection, RecordError> {
        if self.schema.native_collections().iter().any(|n| n == name) {
            return Ok(EmbeddedCollection::Native(name.to_string()));
        }
        self.pseudo_collection(name)
            .map(EmbeddedCollection::Pseudo)
            .ok_or_else(|| RecordError::UnknownCollection(name.to_string()))
    }

    pub fn get_embedded_document(
        &self,
        name: &str,
        id: &RecordId,
        options: GetOptions,
    ) -> Result<Option<EmbeddedDocument>, RecordError> {
        match self.get_embedded_collection(name)? {
            EmbeddedCollection::Pseudo(collection) => Ok(collection
                .get_with(id, options)?
                .map(EmbeddedDocument::Pseudo)),
            EmbeddedCollection::Native(name) => {
                let found = self.native_port(&name)?.get(&self.id, &name, id);
                match found {
                    Some(data) => Ok(Some(EmbeddedDocument::Native(data))),
                    None if options.strict => Err(RecordError::not_found(name, id)),
                    None => Ok(None),
                }
            }
        }
    }

    pub async fn create_embedded_documents(
        &self,
        name: &str,
        data: Vec<Value>,
    ) -> Result<Vec<EmbeddedDocument>, RecordError> {
        match self.get_embedded_collection(name)? {
            EmbeddedCollection::Pseudo(collection) => Ok(Record::create_documents(&collection, data)
                .await?
                .into_iter()
                .map(EmbeddedDocument::Pseudo)
                .collect()),
            EmbeddedCollection::Native(name) => Ok(self
                .native_port(&name)?
                .create(&self.id, &name, data)
                .await?
                .into_iter()
                .map(EmbeddedDocument::Native)
                .collect()),
        }
    }

    pub async fn update_embedded_documents(
        &self,
        name: &str,
        updates: Vec<Value>,
    ) -> Result<Vec<EmbeddedDocument>, RecordError> {
        match self.get_embedded_collection(name)? {
            EmbeddedCollection::Pseudo(collection) => Ok(Record::update_documents(&collection, updates)
                .await?
                .into_iter()
                .map(EmbeddedDocument::Pseudo)
                .collect()),
            EmbeddedCollection::Native(name) => Ok(self
                .native_port(&name)?
                .update(&self.id, &name, updates)
                .await?
                .into_iter()
                .map(EmbeddedDocument::Native)
                .collect()),
        }
    }

    pub async fn delete_embedded_documents(
        &self,
        name: &str,
        ids: Vec<RecordId>,
    ) -> Result<Vec<EmbeddedDocument>, RecordError> {
        match self.get_embedded_collection(name)? {
            EmbeddedCollection::Pseudo(collection) => Ok(Record::delete_documents(&collection, ids)
                .await?
                .into_iter()
                .map(EmbeddedDocument::Pseudo)
                .collect()),
            EmbeddedCollection::Native(name) => Ok(self
                .native_port(&name)?
                .delete(&self.id, &name, ids)
                .await?
                .into_iter()
                .map(|id| EmbeddedDocument::Native(serde_json::json!({ "_id": id })))
                .collect()),
        }
    }

    fn native_port(&self, name: &str) -> Result<&Arc<dyn NativeDocuments>, RecordError> {
        self.native
            .as_ref()
            .ok_or_else(|| RecordError::NativeUnavailable(name.to_string()))
    }

    /// Find a record by its `uuid`.
    pub fn resolve_uuid(&self, uuid: &str) -> Option<Arc<Record>> {
        let parts: Vec<&str> = uuid.split('.').collect();
        let [document, id, rest @ ..] = parts.as_slice() else {
            return None;
        };
        if *document != self.document_name() || *id != self.id.as_str() || rest.is_empty() {
            return None;
        }

        let mut pairs = rest.chunks(2);
        let mut record = match pairs.next()? {
            [collection, id] => self.pseudo_collection(collection)?.get(&RecordId::new(*id))?,
            _ => return None,
        };
        for pair in pairs {
            let [collection, id] = pair else {
                return None;
            };
            record = record.collection(collection)?.get(&RecordId::new(*id))?;
        }
        Some(record)
    }

    // =========================================================================
    // Synchronization
    // =========================================================================

    /// Apply a flat patch to the local tree only. All keys apply or none do.
    pub fn apply_local(&self, patch: &UpdatePatch) -> Result<(), RecordError> {
        self.tree.write(|data| {
            let mut next = data.clone();
            patch.apply_to(&mut next)?;
            *data = next;
            Ok::<(), DomainError>(())
        })?;
        Ok(())
    }

    /// Re-resolve the root's type and synchronize every collection.
    pub fn refresh(&self) -> Result<(), RecordError> {
        let fallback = self.ctx.settings().type_fallback;
        let resolved = self
            .tree
            .read(|data| self.schema.resolve_type_of(data, fallback))?;
        let previous = std::mem::replace(&mut *self.resolved.write(), resolved.clone());
        if previous != resolved {
            tracing::debug!(root = %self.uuid(), to = ?resolved.name(), "Root type resolved");
        }

        let dropped = reconcile_collections(
            &self.typed,
            self.schema.collections_for(&resolved),
            &self.ctx,
            CollectionOwner::Root(self.this.clone()),
        );
        for collection in dropped {
            collection.on_owner_deleted();
        }

        let init = InitOptions { fallback };
        for collection in self.nested_collections() {
            collection.initialize(init)?;
        }
        self.prepare_data();
        Ok(())
    }

    /// Update root fields: local apply and refresh, then persist.
    pub async fn update(&self, patch: UpdatePatch) -> Result<(), RecordError> {
        if patch.is_empty() {
            return Ok(());
        }
        self.apply_local(&patch)?;
        self.refresh()?;
        self.render();
        self.store.update(&self.id, &patch).await?;
        Ok(())
    }

    /// A change that originated in the host (already persisted).
    pub fn apply_remote_update(&self, patch: &UpdatePatch) -> Result<(), RecordError> {
        self.apply_local(patch)?;
        self.refresh()?;
        self.render();
        Ok(())
    }

    pub fn prepare_data(&self) {
        let preparer = self.ctx.preparer_for(&self.kind);
        let mut derived = Map::new();
        if let Some(preparer) = &preparer {
            preparer.prepare_base_data(DocumentRef::Root(self), &mut derived);
        }
        for collection in self.nested_collections() {
            for record in collection.contents() {
                record.prepare_data();
            }
        }
        if let Some(preparer) = &preparer {
            preparer.prepare_derived_data(DocumentRef::Root(self), &mut derived);
        }
        *self.derived.write() = derived;
    }

    // =========================================================================
    // Observers
    // =========================================================================

    pub fn add_observer(&self, observer: Arc<dyn RecordObserver>) {
        self.observers.lock().push(observer);
    }

    pub fn render(&self) {
        let observers = self.observers.lock().clone();
        for observer in observers {
            observer.render(DocumentRef::Root(self));
        }
    }

    /// Close every observer in the tree. Safe to call more than once.
    pub fn on_delete(&self) {
        if self.deleted.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(root = %self.uuid(), "Root document deleted");
        cascade_delete(self);
        let observers = std::mem::take(&mut *self.observers.lock());
        for observer in observers {
            observer.close(DocumentRef::Root(self));
        }
    }
}

impl EmbeddedOwner for RootDocument {
    fn nested_collections(&self) -> Vec<Arc<RecordCollection>> {
        let mut collections = self.typed.read().clone();
        collections.extend(self.ad_hoc.iter().cloned());
        collections
    }
}
