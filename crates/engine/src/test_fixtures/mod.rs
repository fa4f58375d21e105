//! Test fixtures loader for JSON fixture files and common test helpers.
//!
//! This module provides utilities for loading test data from the `test_data/` directory,
//! a small inventory ruleset shared by the record tests, and observers that count callbacks.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_fixtures::{self, load_fixture};
//!
//! #[test]
//! fn hero_has_a_bag() {
//!     let hero: serde_json::Value = load_fixture("actors/hero.json");
//!     let ctx = test_fixtures::context();
//!     // ... test logic
//! }
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Map, Value};
use sheetstore_domain::{f, KindDefinition, KindRegistry, TypeDefinition};

use crate::infrastructure::ports::{DataPreparer, DocumentRef, ErrorHook, RecordObserver};
use crate::infrastructure::{FrameworkSettings, RecordContext};

// =============================================================================
// Fixture Loading
// =============================================================================

/// Load a JSON fixture from test_data/ directory.
///
/// # Panics
///
/// Panics if the fixture file cannot be read or parsed.
pub fn load_fixture<T: serde::de::DeserializeOwned>(path: &str) -> T {
    let fixture_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("test_data")
        .join(path);
    let content = std::fs::read_to_string(&fixture_path).unwrap_or_else(|e| {
        panic!(
            "Failed to read fixture '{}': {}",
            fixture_path.display(),
            e
        )
    });
    serde_json::from_str(&content).unwrap_or_else(|e| {
        panic!(
            "Failed to parse fixture '{}': {}",
            fixture_path.display(),
            e
        )
    })
}

// =============================================================================
// Ruleset
// =============================================================================

/// Actors carry a bag of items; items carry effects; effects carry changes.
///
/// - `Actor` (native root): `character` keeps items at `system.bag.items`,
///   `npc` has no items. Effects on actors are stored natively by the host.
/// - `Item`: `weapon` (default) or `container`, whose `system.contents`
///   holds more items. `Weapon` extends `Item`.
/// - `ActiveEffect`: `changes` holds `EffectChange` records. Legacy effects
///   named their label `name`.
pub fn registry() -> Arc<KindRegistry> {
    let registry = KindRegistry::builder()
        .register(
            KindDefinition::native("Actor")
                .field("name", f::string().non_blank().required())
                .native_collections(["effects"])
                .with_type(
                    "character",
                    TypeDefinition::new()
                        .field("level", f::integer().min(1.0).initial(1))
                        .field("bag", f::object([("items", f::collection("Item"))])),
                )
                .with_type("npc", TypeDefinition::new().field("notes", f::string()))
                .default_type("character"),
        )
        .register(
            KindDefinition::pseudo("Item")
                .field("name", f::string().non_blank().required())
                .field("quantity", f::integer().min(0.0).initial(1))
                .field("weight", f::number().min(0.0).initial(0))
                .field("effects", f::collection("ActiveEffect"))
                .with_type(
                    "weapon",
                    TypeDefinition::new().field("damage", f::string().initial("1d6")),
                )
                .with_type(
                    "container",
                    TypeDefinition::new()
                        .field("capacity", f::number().min(0.0).initial(10))
                        .field("contents", f::collection("Item")),
                )
                .default_type("weapon"),
        )
        .register(KindDefinition::pseudo("Weapon").extends("Item"))
        .register(
            KindDefinition::pseudo("ActiveEffect")
                .field("label", f::string())
                .field("changes", f::collection("EffectChange"))
                .migrate(|data| {
                    if let Some(name) = data.remove("name") {
                        data.entry("label").or_insert(name);
                    }
                    Ok(())
                }),
        )
        .register(
            KindDefinition::pseudo("EffectChange")
                .field("key", f::string().non_blank().required())
                .field("value", f::any())
                .field("mode", f::integer().initial(2)),
        )
        .build()
        .expect("test ruleset is valid");
    Arc::new(registry)
}

/// Context over [`registry`] with the inventory preparers and default settings.
pub fn context() -> Arc<RecordContext> {
    builder().build()
}

pub fn context_with_hook(hook: Arc<dyn ErrorHook>) -> Arc<RecordContext> {
    builder().error_hook(hook).build()
}

pub fn context_with_settings(settings: FrameworkSettings) -> Arc<RecordContext> {
    builder().settings(settings).build()
}

fn builder() -> crate::infrastructure::RecordContextBuilder {
    RecordContext::builder(registry())
        .preparer("Item", Arc::new(ItemWeights))
        .preparer("Actor", Arc::new(ActorWeights))
}

// =============================================================================
// Preparers
// =============================================================================

fn number(source: &Value, key: &str) -> f64 {
    source.get(key).and_then(Value::as_f64).unwrap_or_default()
}

fn sum_total_weight(document: DocumentRef<'_>, collection: &str) -> Option<f64> {
    let collection = document.collection(collection)?;
    Some(
        collection
            .contents()
            .iter()
            .filter_map(|record| record.derived_value("totalWeight"))
            .filter_map(|weight| weight.as_f64())
            .sum(),
    )
}

/// `totalWeight` per item; `contentsWeight` for containers.
struct ItemWeights;

impl DataPreparer for ItemWeights {
    fn prepare_base_data(&self, document: DocumentRef<'_>, derived: &mut Map<String, Value>) {
        let source = document.source().unwrap_or_default();
        let total = number(&source, "quantity") * number(&source, "weight");
        derived.insert("totalWeight".to_string(), json!(total));
    }

    fn prepare_derived_data(&self, document: DocumentRef<'_>, derived: &mut Map<String, Value>) {
        if let Some(weight) = sum_total_weight(document, "contents") {
            derived.insert("contentsWeight".to_string(), json!(weight));
        }
    }
}

/// `bagWeight` for actors carrying items.
struct ActorWeights;

impl DataPreparer for ActorWeights {
    fn prepare_derived_data(&self, document: DocumentRef<'_>, derived: &mut Map<String, Value>) {
        if let Some(weight) = sum_total_weight(document, "items") {
            derived.insert("bagWeight".to_string(), json!(weight));
        }
    }
}

// =============================================================================
// Observers
// =============================================================================

/// Counts render and close callbacks.
#[derive(Debug, Default)]
pub struct CountingObserver {
    renders: AtomicUsize,
    closes: AtomicUsize,
}

impl CountingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl RecordObserver for CountingObserver {
    fn render(&self, _document: DocumentRef<'_>) {
        self.renders.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self, _document: DocumentRef<'_>) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
