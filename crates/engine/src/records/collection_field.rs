//! Binds the schema-level collection descriptor to live collections.

use std::sync::Arc;

use serde_json::Value;
use sheetstore_domain::CollectionDecl;

use crate::infrastructure::RecordContext;

use super::collection::{CollectionOwner, EmbeddedOwner, RecordCollection};

pub trait CollectionFieldExt {
    /// Construct the live collection for `owner`. Called once, while the
    /// owner configures its schema.
    fn build(&self, ctx: &Arc<RecordContext>, owner: CollectionOwner) -> Arc<RecordCollection>;

    /// The live collection already bound to `owner` for this field.
    fn initialize(&self, owner: &dyn EmbeddedOwner) -> Option<Arc<RecordCollection>>;

    /// Source form of the collection, as persisted.
    fn to_object(&self, collection: &RecordCollection) -> Vec<Value>;
}

impl CollectionFieldExt for CollectionDecl {
    fn build(&self, ctx: &Arc<RecordContext>, owner: CollectionOwner) -> Arc<RecordCollection> {
        RecordCollection::new(ctx, self.clone(), owner)
    }

    fn initialize(&self, owner: &dyn EmbeddedOwner) -> Option<Arc<RecordCollection>> {
        owner
            .nested_collections()
            .into_iter()
            .find(|collection| collection.decl() == self)
    }

    fn to_object(&self, collection: &RecordCollection) -> Vec<Value> {
        collection.to_source()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::InitOptions;
    use crate::test_fixtures;
    use serde_json::json;
    use sheetstore_domain::RecordId;

    #[test]
    fn initialize_returns_the_bound_collection() {
        let ctx = test_fixtures::context();
        let items = RecordCollection::detached(
            &ctx,
            "items",
            "Item",
            vec![json!({"_id": "sword", "name": "Sword", "effects": [{"_id": "e1", "label": "Sharp"}]})],
        )
        .expect("collection");
        items.initialize(InitOptions::default()).expect("initialize");
        let sword = items.get(&RecordId::new("sword")).expect("sword");

        let schema = sword.schema().clone();
        let decl = schema
            .collections_for(&sword.resolved_type())
            .into_iter()
            .find(|decl| decl.name == "effects")
            .expect("effects decl");

        let first = decl.initialize(&*sword).expect("bound");
        let second = decl.initialize(&*sword).expect("bound");
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &sword.collection("effects").expect("effects")));

        let plain = decl.to_object(&first);
        assert_eq!(plain.len(), 1);
        assert_eq!(plain[0]["label"], json!("Sharp"));
    }
}
