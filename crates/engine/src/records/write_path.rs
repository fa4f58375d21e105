//! Translates a mutation anywhere in a record tree into one flat root patch.
//!
//! The root store can only replace whole dotted fields. A change to a
//! record nested at any depth is therefore written as the smallest array
//! that contains it: the chain from the root to the target is resolved
//! against a snapshot, and the target collection's own array (a record's
//! home array) becomes the patch key. If that field holds anything but an
//! array the write fails rather than falling back to an outer array.

use std::sync::Arc;

use serde_json::Value;
use sheetstore_domain::{index_of_id, RecordId, UpdatePatch};
use tracing::debug;

use crate::error::RecordError;

use super::collection::{CollectionOwner, InitOptions, RecordCollection};
use super::record::Record;
use super::root::RootDocument;

/// What a write is aimed at.
#[derive(Debug, Clone)]
pub enum WriteTarget {
    /// The collection receiving creates, updates or deletes.
    Collection(Arc<RecordCollection>),
    /// A record; its home collection's array is rewritten.
    Record(Arc<Record>),
}

#[derive(Debug)]
enum ChainStep {
    /// Descend into an object field. `collection` is set when the field is
    /// the backing array of a live collection.
    Field {
        name: String,
        collection: Option<Arc<RecordCollection>>,
    },
    /// Select an array element by id.
    Element(RecordId),
}

struct ResolvedStep {
    segment: String,
    is_array: bool,
    collection: Option<Arc<RecordCollection>>,
}

/// A resolved write: the patch key, a working copy of the array behind it,
/// and the collection that must resynchronize once it is applied.
pub struct WritePath {
    root: Arc<RootDocument>,
    collection: Arc<RecordCollection>,
    key: String,
    array: Vec<Value>,
}

impl std::fmt::Debug for WritePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritePath")
            .field("root", &self.root.uuid())
            .field("key", &self.key)
            .field("entries", &self.array.len())
            .finish()
    }
}

impl WritePath {
    pub fn resolve(target: WriteTarget) -> Result<Self, RecordError> {
        let (root, chain) = build_chain(target)?;
        let snapshot = root.snapshot();
        let steps = resolve_chain(&snapshot, &chain)?;

        // The target's own array (or its home array, for a record) is the
        // innermost collection step; nothing above it may stand in for it.
        let nearest = steps
            .iter()
            .rposition(|step| step.collection.is_some())
            .ok_or_else(|| {
                RecordError::broken_write_path(format!(
                    "no record collection on the path to {}",
                    describe(&steps)
                ))
            })?;
        let key = describe(&steps[..=nearest]);
        if !steps[nearest].is_array {
            return Err(RecordError::broken_write_path(format!(
                "\"{key}\" is not an array"
            )));
        }
        let collection = steps[nearest].collection.clone().ok_or_else(|| {
            RecordError::broken_write_path(format!("\"{key}\" is not a record collection"))
        })?;
        let array = root
            .source_handle()
            .read(|data| {
                data.and_then(|data| sheetstore_domain::get_dotted(data, &key))
                    .and_then(Value::as_array)
                    .cloned()
            })
            .unwrap_or_default();

        debug!(root = %root.uuid(), key = %key, entries = array.len(), "Write path resolved");
        Ok(Self {
            root,
            collection,
            key,
            array,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn root(&self) -> &Arc<RootDocument> {
        &self.root
    }

    /// The collection backed by the patched array.
    pub fn collection(&self) -> &Arc<RecordCollection> {
        &self.collection
    }

    pub fn array(&self) -> &[Value] {
        &self.array
    }

    pub fn array_mut(&mut self) -> &mut Vec<Value> {
        &mut self.array
    }

    pub fn position(&self, id: &RecordId) -> Option<usize> {
        index_of_id(&self.array, id)
    }

    pub fn patch(&self) -> UpdatePatch {
        UpdatePatch::single(self.key.clone(), Value::Array(self.array.clone()))
    }

    /// Apply the patch locally, resynchronize the affected collection and
    /// re-render its ancestors, then persist through the root store.
    ///
    /// Local state is already updated when the store is called; a store
    /// failure is returned without rolling it back.
    pub async fn commit(self) -> Result<UpdatePatch, RecordError> {
        let patch = self.patch();
        self.root.apply_local(&patch)?;

        let fallback = self.root_fallback();
        self.collection.initialize(InitOptions { fallback })?;
        self.root.prepare_data();
        for record in ancestors(&self.collection) {
            record.render();
        }
        self.root.render();

        debug!(root = %self.root.uuid(), key = %self.key, "Persisting write");
        self.root.store().update(self.root.id(), &patch).await?;
        Ok(patch)
    }

    fn root_fallback(&self) -> bool {
        self.collection.context().settings().type_fallback
    }
}

/// Records owning `collection`, innermost first.
fn ancestors(collection: &RecordCollection) -> Vec<Arc<Record>> {
    let mut records = Vec::new();
    let mut owner = collection.owner().clone();
    while let CollectionOwner::Record(weak) = owner {
        let Some(record) = weak.upgrade() else {
            break;
        };
        let Some(home) = record.home() else {
            records.push(record);
            break;
        };
        owner = home.owner().clone();
        records.push(record);
    }
    records
}

/// Walk from the target up to its root, returning root-to-target steps.
fn build_chain(target: WriteTarget) -> Result<(Arc<RootDocument>, Vec<ChainStep>), RecordError> {
    let mut chain = Vec::new();
    let mut collection = match target {
        WriteTarget::Collection(collection) => collection,
        WriteTarget::Record(record) => {
            chain.push(ChainStep::Element(record.id().clone()));
            home_of(&record)?
        }
    };

    let root = loop {
        let segments = collection.path().segments();
        for (index, segment) in segments.iter().enumerate().rev() {
            let is_array = index + 1 == segments.len();
            chain.push(ChainStep::Field {
                name: segment.clone(),
                collection: is_array.then(|| collection.clone()),
            });
        }
        match collection.owner() {
            CollectionOwner::Root(root) => {
                break root
                    .upgrade()
                    .ok_or_else(|| RecordError::detached(collection.name()))?;
            }
            CollectionOwner::Record(record) => {
                let record = record
                    .upgrade()
                    .ok_or_else(|| RecordError::detached(collection.name()))?;
                chain.push(ChainStep::Element(record.id().clone()));
                collection = home_of(&record)?;
            }
            CollectionOwner::Detached(_) => {
                return Err(RecordError::detached(format!(
                    "collection {} has no root document",
                    collection.name()
                )));
            }
        }
    };

    chain.reverse();
    Ok((root, chain))
}

fn home_of(record: &Record) -> Result<Arc<RecordCollection>, RecordError> {
    if record.is_detached() {
        return Err(RecordError::detached(record.uuid()));
    }
    record
        .home()
        .ok_or_else(|| RecordError::detached(record.uuid()))
}

/// Resolve every step against `snapshot`, recording array indices.
///
/// A missing collection field at the very end of the chain counts as an
/// empty array; anything else that does not resolve is a broken path.
fn resolve_chain(snapshot: &Value, chain: &[ChainStep]) -> Result<Vec<ResolvedStep>, RecordError> {
    let mut steps: Vec<ResolvedStep> = Vec::with_capacity(chain.len());
    let mut current = Some(snapshot);
    for (position, step) in chain.iter().enumerate() {
        let node = current.ok_or_else(|| {
            RecordError::broken_write_path(format!("\"{}\" does not resolve", describe(&steps)))
        })?;
        match step {
            ChainStep::Field { name, collection } => {
                let value = node.as_object().and_then(|map| map.get(name));
                let last = position + 1 == chain.len();
                let is_array = match value {
                    Some(value) => value.is_array(),
                    None => last && collection.is_some() && node.is_object(),
                };
                steps.push(ResolvedStep {
                    segment: name.clone(),
                    is_array,
                    collection: collection.clone(),
                });
                current = value;
            }
            ChainStep::Element(id) => {
                let array = node.as_array().ok_or_else(|| {
                    RecordError::broken_write_path(format!("\"{}\" is not an array", describe(&steps)))
                })?;
                let index = index_of_id(array, id).ok_or_else(|| {
                    RecordError::broken_write_path(format!(
                        "no entry {id} in \"{}\"",
                        describe(&steps)
                    ))
                })?;
                steps.push(ResolvedStep {
                    segment: index.to_string(),
                    is_array: false,
                    collection: None,
                });
                current = array.get(index);
            }
        }
    }
    Ok(steps)
}

fn describe(steps: &[ResolvedStep]) -> String {
    steps
        .iter()
        .map(|step| step.segment.as_str())
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::MockRootStore;
    use crate::test_fixtures::{self, CountingObserver};
    use serde_json::json;

    fn root(store: MockRootStore) -> Arc<RootDocument> {
        RootDocument::builder(test_fixtures::context(), "Actor", Arc::new(store))
            .build(test_fixtures::load_fixture("actors/hero.json"))
            .expect("root")
    }

    fn rid(id: &str) -> RecordId {
        RecordId::new(id)
    }

    #[test]
    fn collection_target_uses_its_own_array() {
        let root = root(MockRootStore::new());
        let items = root.pseudo_collection("items").expect("items");
        let path = WritePath::resolve(WriteTarget::Collection(items.clone())).expect("path");
        assert_eq!(path.key(), "system.bag.items");
        assert_eq!(path.array().len(), items.to_source().len());
        assert!(Arc::ptr_eq(path.collection(), &items));
    }

    #[test]
    fn nested_collection_key_uses_array_indices() {
        let root = root(MockRootStore::new());
        let bag = root
            .resolve_uuid("Actor.hero.items.bag")
            .expect("bag");
        let gem = bag.collection("contents").expect("contents").get(&rid("gem")).expect("gem");
        let effects = gem.collection("effects").expect("effects");

        let path = WritePath::resolve(WriteTarget::Collection(effects.clone())).expect("path");
        let bag_index = root
            .pseudo_collection("items")
            .expect("items")
            .to_source()
            .iter()
            .position(|entry| entry["_id"] == json!("bag"))
            .expect("bag entry");
        assert_eq!(
            path.key(),
            format!("system.bag.items.{bag_index}.system.contents.0.effects")
        );
        assert!(Arc::ptr_eq(path.collection(), &effects));
    }

    #[test]
    fn record_target_rewrites_its_home_array() {
        let root = root(MockRootStore::new());
        let items = root.pseudo_collection("items").expect("items");
        let sword = items.get(&rid("sword")).expect("sword");
        let path = WritePath::resolve(WriteTarget::Record(sword)).expect("path");
        assert_eq!(path.key(), "system.bag.items");
        assert!(path.position(&rid("sword")).is_some());
    }

    #[test]
    fn detached_collections_have_no_write_path() {
        let ctx = test_fixtures::context();
        let loose = RecordCollection::detached(&ctx, "items", "Item", vec![]).expect("collection");
        let err = WritePath::resolve(WriteTarget::Collection(loose)).expect_err("detached");
        assert!(matches!(err, RecordError::Detached(_)));
    }

    #[test]
    fn missing_entry_is_a_broken_path() {
        let root = root(MockRootStore::new());
        let items = root.pseudo_collection("items").expect("items");
        let sword = items.get(&rid("sword")).expect("sword");
        let effects = sword.collection("effects").expect("effects");

        // Remove the sword from the root data behind the records' back.
        root.apply_local(&UpdatePatch::single("system.bag.items", json!([])))
            .expect("apply");
        let err = WritePath::resolve(WriteTarget::Collection(effects)).expect_err("broken");
        assert!(matches!(err, RecordError::BrokenWritePath(_)));
    }

    #[test]
    fn non_array_collection_field_is_a_broken_path() {
        let root = root(MockRootStore::new());
        let items = root.pseudo_collection("items").expect("items");
        let sword = items.get(&rid("sword")).expect("sword");
        let effects = sword.collection("effects").expect("effects");
        let sword_record = WritePath::resolve(WriteTarget::Record(sword.clone())).expect("path");
        let index = sword_record.position(&rid("sword")).expect("sword index");

        root.apply_local(&UpdatePatch::single(
            format!("system.bag.items.{index}.effects"),
            json!({"bogus": true}),
        ))
        .expect("apply");
        let before = root.snapshot();

        let err = WritePath::resolve(WriteTarget::Collection(effects)).expect_err("broken");
        match err {
            RecordError::BrokenWritePath(msg) => {
                assert!(msg.contains(&format!("system.bag.items.{index}.effects")), "{msg}");
            }
            other => panic!("expected broken write path, got {other:?}"),
        }
        assert_eq!(root.snapshot(), before);
    }

    #[tokio::test]
    async fn commit_applies_locally_then_persists_once() {
        let mut store = MockRootStore::new();
        store
            .expect_update()
            .withf(|_, patch| patch.len() == 1 && patch.get("system.bag.items").is_some())
            .times(1)
            .returning(|_, _| Ok(()));
        let root = root(store);
        let items = root.pseudo_collection("items").expect("items");
        let sword = items.get(&rid("sword")).expect("sword");
        let observer = CountingObserver::new();
        sword.add_observer(observer.clone());

        let mut path = WritePath::resolve(WriteTarget::Collection(items.clone())).expect("path");
        let index = path.position(&rid("sword")).expect("sword index");
        path.array_mut()[index]["name"] = json!("Longsword");
        path.commit().await.expect("commit");

        let same = items.get(&rid("sword")).expect("sword");
        assert!(Arc::ptr_eq(&same, &sword));
        assert_eq!(sword.get("name"), Some(json!("Longsword")));
        assert!(observer.renders() >= 1);
    }
}
