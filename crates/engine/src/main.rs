//! Sheetstore Engine - demo entry point.
//!
//! Builds an actor with a bag of items over an in-memory root store, runs a
//! few nested writes, and logs every patch the store received.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use sheetstore_domain::{f, KindDefinition, KindRegistry, RecordId, TypeDefinition};
use sheetstore_engine::infrastructure::ports::{DataPreparer, DocumentRef};
use sheetstore_engine::infrastructure::telemetry::init_tracing;
use sheetstore_engine::records::EmbeddedCollection;
use sheetstore_engine::{FrameworkSettings, MemoryRootStore, RecordContext, RootDocument};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from repo root (the binary is usually run from `crates/engine`).
    load_dotenv_from_repo_root();

    let settings = FrameworkSettings::from_env();
    init_tracing(&settings);

    tracing::info!(
        type_fallback = settings.type_fallback,
        id_length = settings.id_length,
        "Starting Sheetstore demo"
    );

    let ctx = RecordContext::builder(Arc::new(ruleset()?))
        .preparer("Item", Arc::new(Encumbrance))
        .settings(settings)
        .build();

    let store = Arc::new(MemoryRootStore::new());
    let data = json!({
        "_id": "hero",
        "name": "Aria",
        "type": "character",
        "system": {"bag": {"items": []}}
    });
    let root_id = store.insert(data.clone()).await?;
    let root = RootDocument::builder(ctx, "Actor", store.clone()).build(data)?;

    let EmbeddedCollection::Pseudo(items) = root.get_embedded_collection("items")? else {
        anyhow::bail!("items is not a record collection");
    };

    let created = items
        .create_documents(vec![
            json!({"name": "Sword", "weight": 3}),
            json!({"_id": "pack", "name": "Pack", "type": "container"}),
        ])
        .await?;
    tracing::info!(count = created.len(), "Created items");

    let pack = items
        .get(&RecordId::new("pack"))
        .ok_or_else(|| anyhow::anyhow!("pack was not created"))?;
    if let Some(contents) = pack.collection("contents") {
        contents
            .create_documents(vec![json!({"name": "Rations", "weight": 0.5, "quantity": 6})])
            .await?;
    }
    tracing::info!(
        contents_weight = ?pack.derived_value("contentsWeight"),
        "Pack filled"
    );

    if let Some(sword) = created.first() {
        sword.update(json!({"system.damage": "1d8"})).await?;
    }

    for (id, patch) in store.patch_log().await {
        tracing::info!(
            root = %id,
            patch = %serde_json::to_string(&patch)?,
            "Patch persisted"
        );
    }

    let persisted = store
        .get(&root_id)
        .await
        .ok_or_else(|| anyhow::anyhow!("root {root_id} is not stored"))?;
    tracing::info!(
        in_sync = persisted.pointer("/system/bag/items") == root.get("system.bag.items").as_ref(),
        "Demo finished"
    );
    Ok(())
}

/// Actors with a bag of items; containers hold more items.
fn ruleset() -> anyhow::Result<KindRegistry> {
    let registry = KindRegistry::builder()
        .register(
            KindDefinition::native("Actor")
                .field("name", f::string().non_blank().required())
                .with_type(
                    "character",
                    TypeDefinition::new().field("bag", f::object([("items", f::collection("Item"))])),
                )
                .default_type("character"),
        )
        .register(
            KindDefinition::pseudo("Item")
                .field("name", f::string().non_blank().required())
                .field("quantity", f::integer().min(0.0).initial(1))
                .field("weight", f::number().min(0.0).initial(0))
                .with_type(
                    "weapon",
                    TypeDefinition::new().field("damage", f::string().initial("1d4")),
                )
                .with_type(
                    "container",
                    TypeDefinition::new().field("contents", f::collection("Item")),
                )
                .default_type("weapon"),
        )
        .build()?;
    Ok(registry)
}

struct Encumbrance;

impl DataPreparer for Encumbrance {
    fn prepare_base_data(&self, document: DocumentRef<'_>, derived: &mut Map<String, Value>) {
        let source = document.source().unwrap_or_default();
        let field = |key: &str| source.get(key).and_then(Value::as_f64).unwrap_or_default();
        derived.insert("totalWeight".into(), json!(field("quantity") * field("weight")));
    }

    fn prepare_derived_data(&self, document: DocumentRef<'_>, derived: &mut Map<String, Value>) {
        if let Some(contents) = document.collection("contents") {
            let weight: f64 = contents
                .contents()
                .iter()
                .filter_map(|item| item.derived_value("totalWeight"))
                .filter_map(|weight| weight.as_f64())
                .sum();
            derived.insert("contentsWeight".into(), json!(weight));
        }
    }
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}
