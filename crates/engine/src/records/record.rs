//! The addressable nested record.
//!
//! A record holds no copy of its data. It knows its id and its home
//! collection and reads everything else through the shared source tree, so
//! a reference to a record stays valid (and current) across refreshes.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use sheetstore_domain::{get_dotted, CompositeSchema, RecordId, ResolvedType};

use crate::error::RecordError;
use crate::infrastructure::ports::{DocumentRef, RecordObserver};
use crate::infrastructure::RecordContext;

use super::collection::{
    cascade_delete, reconcile_collections, CollectionOwner, EmbeddedOwner, GetOptions,
    InitOptions, RecordCollection,
};
use super::root::RootDocument;
use super::source::{SourceHandle, SourceTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SyncOptions {
    pub fallback: bool,
    pub validate: bool,
}

impl SyncOptions {
    pub fn strict(fallback: bool) -> Self {
        Self {
            fallback,
            validate: true,
        }
    }

    /// For quarantined raw data: unknown types kept, nothing validated.
    pub fn lenient() -> Self {
        Self {
            fallback: true,
            validate: false,
        }
    }
}

/// The document a record's home collection belongs to.
#[derive(Clone)]
pub enum RecordParent {
    Root(Arc<RootDocument>),
    Record(Arc<Record>),
}

pub struct Record {
    id: RecordId,
    kind: String,
    schema: Arc<CompositeSchema>,
    ctx: Arc<RecordContext>,
    collection: Weak<RecordCollection>,
    resolved: RwLock<ResolvedType>,
    detached: RwLock<Option<Arc<SourceTree>>>,
    collections: RwLock<Vec<Arc<RecordCollection>>>,
    derived: RwLock<Map<String, Value>>,
    observers: Mutex<Vec<Arc<dyn RecordObserver>>>,
    deleted: AtomicBool,
    this: Weak<Record>,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("type", &self.type_name())
            .field("detached", &self.is_detached())
            .finish()
    }
}

impl Record {
    pub(crate) fn new(
        ctx: &Arc<RecordContext>,
        kind: &str,
        collection: Weak<RecordCollection>,
        id: RecordId,
        detached: Option<Arc<SourceTree>>,
    ) -> Result<Arc<Self>, RecordError> {
        let schema = ctx.registry().schema_for(kind)?;
        Ok(Arc::new_cyclic(|this| Self {
            id,
            kind: kind.to_string(),
            schema,
            ctx: ctx.clone(),
            collection,
            resolved: RwLock::new(ResolvedType::Untyped),
            detached: RwLock::new(detached),
            collections: RwLock::new(Vec::new()),
            derived: RwLock::new(Map::new()),
            observers: Mutex::new(Vec::new()),
            deleted: AtomicBool::new(false),
            this: this.clone(),
        }))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    /// Registered kind (may be a subclass of the document name).
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Base kind shared by the whole hierarchy.
    pub fn document_name(&self) -> &str {
        self.schema.document_name()
    }

    pub fn schema(&self) -> &Arc<CompositeSchema> {
        &self.schema
    }

    pub fn type_name(&self) -> Option<String> {
        self.resolved.read().name().map(str::to_string)
    }

    pub fn resolved_type(&self) -> ResolvedType {
        self.resolved.read().clone()
    }

    /// The collection this record lives in.
    pub fn home(&self) -> Option<Arc<RecordCollection>> {
        self.collection.upgrade()
    }

    pub fn is_detached(&self) -> bool {
        self.detached.read().is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    pub fn source_handle(&self) -> Result<SourceHandle, RecordError> {
        if let Some(tree) = self.detached.read().clone() {
            return Ok(SourceHandle::root(tree));
        }
        let collection = self
            .home()
            .ok_or_else(|| RecordError::detached(self.label()))?;
        Ok(collection.source_handle()?.entry(&self.id))
    }

    /// Current serialized data.
    pub fn to_object(&self) -> Result<Value, RecordError> {
        self.source_handle()?
            .get()
            .ok_or_else(|| RecordError::not_found(self.parent_collection_name().unwrap_or_default(), &self.id))
    }

    pub fn source(&self) -> Option<Value> {
        self.to_object().ok()
    }

    /// Read one dotted path of the serialized data.
    pub fn get(&self, dotted: &str) -> Option<Value> {
        self.source_handle()
            .ok()?
            .read(|node| node.and_then(|data| get_dotted(data, dotted)).cloned())
    }

    pub fn derived(&self) -> Map<String, Value> {
        self.derived.read().clone()
    }

    pub fn derived_value(&self, key: &str) -> Option<Value> {
        self.derived.read().get(key).cloned()
    }

    pub fn parent(&self) -> Option<RecordParent> {
        match self.home()?.owner() {
            CollectionOwner::Root(root) => root.upgrade().map(RecordParent::Root),
            CollectionOwner::Record(record) => record.upgrade().map(RecordParent::Record),
            CollectionOwner::Detached(_) => None,
        }
    }

    /// Field name of the home collection on the parent.
    pub fn parent_collection_name(&self) -> Option<String> {
        self.home().map(|collection| collection.name().to_string())
    }

    pub fn collections(&self) -> Vec<Arc<RecordCollection>> {
        self.collections.read().clone()
    }

    /// A nested collection by field name.
    pub fn collection(&self, name: &str) -> Option<Arc<RecordCollection>> {
        self.collections
            .read()
            .iter()
            .find(|collection| collection.name() == name)
            .cloned()
    }

    pub fn get_embedded_collection(&self, name: &str) -> Result<Arc<RecordCollection>, RecordError> {
        self.collection(name)
            .ok_or_else(|| RecordError::UnknownCollection(name.to_string()))
    }

    pub fn get_embedded_document(
        &self,
        name: &str,
        id: &RecordId,
        options: GetOptions,
    ) -> Result<Option<Arc<Record>>, RecordError> {
        self.get_embedded_collection(name)?.get_with(id, options)
    }

    /// `Document.rootId.collection.id[.collection.id...]`
    pub fn uuid(&self) -> String {
        let Some(collection) = self.home() else {
            return self.id.to_string();
        };
        match collection.owner_uuid() {
            Some(owner) => format!("{owner}.{}.{}", collection.name(), self.id),
            None => format!("{}.{}", collection.name(), self.id),
        }
    }

    fn label(&self) -> String {
        format!("{} {}", self.schema.document_name(), self.id)
    }

    // =========================================================================
    // Synchronization
    // =========================================================================

    /// Re-derive this record from its serialized data.
    ///
    /// Resolves the type, cleans and validates a copy, writes the cleaned
    /// copy back into the shared tree, reconciles nested collections with the
    /// resolved type, synchronizes them, then prepares derived data.
    pub(crate) fn synchronize(&self, options: SyncOptions) -> Result<(), RecordError> {
        let handle = self.source_handle()?;
        let original = handle
            .get()
            .ok_or_else(|| RecordError::not_found(self.parent_collection_name().unwrap_or_default(), &self.id))?;

        let resolved = self.schema.resolve_type_of(&original, options.fallback)?;
        let mut data = original.clone();
        self.schema.clean(&mut data, &resolved);
        if options.validate {
            self.schema.validate(&data, &resolved)?;
        }
        if data != original {
            handle.write(|node| {
                if let Some(node) = node {
                    *node = data;
                }
            });
        }

        let previous = std::mem::replace(&mut *self.resolved.write(), resolved.clone());
        if previous != resolved {
            tracing::debug!(
                record = %self.label(),
                from = ?previous.name(),
                to = ?resolved.name(),
                "Record type resolved"
            );
        }

        let dropped = reconcile_collections(
            &self.collections,
            self.schema.collections_for(&resolved),
            &self.ctx,
            CollectionOwner::Record(self.this.clone()),
        );
        for collection in dropped {
            collection.on_owner_deleted();
        }

        let init = InitOptions {
            fallback: options.fallback,
        };
        for collection in self.collections() {
            collection.initialize(init)?;
        }

        self.prepare_data();
        Ok(())
    }

    /// Base pass, then every embedded record, then derived pass.
    pub fn prepare_data(&self) {
        let preparer = self.ctx.preparer_for(&self.kind);
        let mut derived = Map::new();
        if let Some(preparer) = &preparer {
            preparer.prepare_base_data(DocumentRef::Record(self), &mut derived);
        }
        for collection in self.collections() {
            for record in collection.contents() {
                record.prepare_data();
            }
        }
        if let Some(preparer) = &preparer {
            preparer.prepare_derived_data(DocumentRef::Record(self), &mut derived);
        }
        *self.derived.write() = derived;
    }

    /// Keep `data` as a private copy; the record no longer follows its
    /// home collection's array.
    pub(crate) fn detach(&self, data: Value) {
        *self.detached.write() = Some(SourceTree::new(data));
    }

    // =========================================================================
    // Observers
    // =========================================================================

    pub fn add_observer(&self, observer: Arc<dyn RecordObserver>) {
        self.observers.lock().push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    pub fn render(&self) {
        let observers = self.observers.lock().clone();
        for observer in observers {
            observer.render(DocumentRef::Record(self));
        }
    }

    /// Deletion cascade: nested collections first, then observers are
    /// closed and dropped. Safe to call more than once.
    pub fn on_delete(&self) {
        if self.deleted.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(record = %self.label(), "Record deleted");
        cascade_delete(self);
        let observers = std::mem::take(&mut *self.observers.lock());
        for observer in observers {
            observer.close(DocumentRef::Record(self));
        }
    }
}

impl EmbeddedOwner for Record {
    fn nested_collections(&self) -> Vec<Arc<RecordCollection>> {
        self.collections()
    }
}
