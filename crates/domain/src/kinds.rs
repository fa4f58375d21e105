//! Record kinds, their composite schemas, and type resolution.
//!
//! A *kind* is the equivalent of a record class: `Item`, `ActiveEffect`, or a
//! native host document such as `Actor`. A kind's data shape is a tagged
//! union: base fields shared by every record of the kind, plus a `system`
//! payload whose schema is selected by the record's own `type` value.
//!
//! Kinds may `extend` another kind. The schema is defined once on the base
//! kind and every kind in the hierarchy shares that single
//! [`CompositeSchema`] instance.
//!
//! All structural checks run in [`KindRegistryBuilder::build`], so a
//! misconfigured schema fails before any data flows through it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{DomainError, ValidationErrors};
use crate::ids::RecordId;
use crate::path::{pointer_for, FieldPath};
use crate::schema::{
    clean_fields, type_name, validate_fields, CollectionDecl, FieldKind, FieldSchema,
    SchemaFields,
};

/// Key of the polymorphic payload inside record data.
pub const TYPE_DATA_KEY: &str = "system";

const RESERVED_KEYS: [&str; 2] = ["_id", "type"];

/// Data migration routine. Receives the object to migrate in place.
pub type MigrationFn = Arc<dyn Fn(&mut Map<String, Value>) -> Result<(), String> + Send + Sync>;

/// Whether a kind is an embedded record or a native host document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindFlavor {
    /// Embedded record managed by this framework.
    Pseudo,
    /// Document persisted natively by the host (used for roots).
    Native,
}

// =============================================================================
// Definitions (builder input)
// =============================================================================

/// Schema of one subtype's `system` payload.
#[derive(Clone, Default)]
pub struct TypeDefinition {
    fields: SchemaFields,
    migrate: Option<MigrationFn>,
}

impl TypeDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.fields.insert(name.into(), schema);
        self
    }

    pub fn migrate(
        mut self,
        migrate: impl Fn(&mut Map<String, Value>) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.migrate = Some(Arc::new(migrate));
        self
    }
}

/// Declaration of a record kind, consumed by [`KindRegistryBuilder`].
#[derive(Clone)]
pub struct KindDefinition {
    name: String,
    flavor: KindFlavor,
    extends: Option<String>,
    fields: SchemaFields,
    types: BTreeMap<String, TypeDefinition>,
    default_type: Option<String>,
    native_collections: Vec<String>,
    migrate: Option<MigrationFn>,
}

impl KindDefinition {
    fn of(name: impl Into<String>, flavor: KindFlavor) -> Self {
        Self {
            name: name.into(),
            flavor,
            extends: None,
            fields: SchemaFields::new(),
            types: BTreeMap::new(),
            default_type: None,
            native_collections: Vec::new(),
            migrate: None,
        }
    }

    /// An embedded record kind.
    pub fn pseudo(name: impl Into<String>) -> Self {
        Self::of(name, KindFlavor::Pseudo)
    }

    /// A native host document kind, usable as a root.
    pub fn native(name: impl Into<String>) -> Self {
        Self::of(name, KindFlavor::Native)
    }

    /// Share the schema of `base`. Subclass kinds declare no fields of their own.
    pub fn extends(mut self, base: impl Into<String>) -> Self {
        self.extends = Some(base.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.fields.insert(name.into(), schema);
        self
    }

    pub fn with_type(mut self, name: impl Into<String>, definition: TypeDefinition) -> Self {
        self.types.insert(name.into(), definition);
        self
    }

    /// Type assigned to data that carries no `type`.
    pub fn default_type(mut self, name: impl Into<String>) -> Self {
        self.default_type = Some(name.into());
        self
    }

    /// Collections the host persists natively on a root document.
    pub fn native_collections<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.native_collections = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn migrate(
        mut self,
        migrate: impl Fn(&mut Map<String, Value>) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.migrate = Some(Arc::new(migrate));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

// =============================================================================
// Resolved schemas
// =============================================================================

/// Schema of one registered subtype.
pub struct TypeSchema {
    name: String,
    fields: SchemaFields,
    collections: Vec<CollectionDecl>,
    migrate: Option<MigrationFn>,
}

impl TypeSchema {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &SchemaFields {
        &self.fields
    }

    /// Collections declared in this type's payload (paths include `system`).
    pub fn collections(&self) -> &[CollectionDecl] {
        &self.collections
    }
}

impl fmt::Debug for TypeSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeSchema")
            .field("name", &self.name)
            .field("collections", &self.collections)
            .finish_non_exhaustive()
    }
}

/// Outcome of resolving a record's `type` against its kind.
#[derive(Debug, Clone)]
pub enum ResolvedType {
    /// The kind registers no subtypes.
    Untyped,
    Known(Arc<TypeSchema>),
    /// Unknown type accepted in fallback mode; the raw value is kept as-is.
    Fallback(String),
}

impl ResolvedType {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Untyped => None,
            Self::Known(schema) => Some(schema.name()),
            Self::Fallback(raw) => Some(raw.as_str()),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

impl PartialEq for ResolvedType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Untyped, Self::Untyped) => true,
            (Self::Known(a), Self::Known(b)) => Arc::ptr_eq(a, b),
            (Self::Fallback(a), Self::Fallback(b)) => a == b,
            _ => false,
        }
    }
}

/// The single schema shared by a base kind and all kinds extending it.
pub struct CompositeSchema {
    document_name: String,
    flavor: KindFlavor,
    fields: SchemaFields,
    types: BTreeMap<String, Arc<TypeSchema>>,
    default_type: Option<String>,
    base_collections: Vec<CollectionDecl>,
    native_collections: Vec<String>,
    migrate: Option<MigrationFn>,
}

impl fmt::Debug for CompositeSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeSchema")
            .field("document_name", &self.document_name)
            .field("flavor", &self.flavor)
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .field("base_collections", &self.base_collections)
            .finish_non_exhaustive()
    }
}

impl CompositeSchema {
    pub fn document_name(&self) -> &str {
        &self.document_name
    }

    pub fn flavor(&self) -> KindFlavor {
        self.flavor
    }

    pub fn fields(&self) -> &SchemaFields {
        &self.fields
    }

    pub fn is_typed(&self) -> bool {
        !self.types.is_empty()
    }

    pub fn type_choices(&self) -> Vec<String> {
        self.types.keys().cloned().collect()
    }

    pub fn type_schema(&self, name: &str) -> Option<&Arc<TypeSchema>> {
        self.types.get(name)
    }

    pub fn native_collections(&self) -> &[String] {
        &self.native_collections
    }

    /// Resolve a discriminator value.
    ///
    /// Unknown or missing types are an error unless `fallback` is set, in
    /// which case the raw value is preserved uninterpreted.
    pub fn resolve_type(
        &self,
        type_name: Option<&str>,
        fallback: bool,
    ) -> Result<ResolvedType, DomainError> {
        if !self.is_typed() {
            return Ok(ResolvedType::Untyped);
        }
        let requested = type_name
            .filter(|t| !t.is_empty())
            .or(self.default_type.as_deref());
        match requested {
            Some(name) => match self.types.get(name) {
                Some(schema) => Ok(ResolvedType::Known(schema.clone())),
                None if fallback => Ok(ResolvedType::Fallback(name.to_string())),
                None => Err(DomainError::unknown_type(&self.document_name, name)),
            },
            None if fallback => Ok(ResolvedType::Fallback(String::new())),
            None => Err(DomainError::validation(
                &self.document_name,
                ValidationErrors::single(
                    "type",
                    format!("one of [{}]", self.type_choices().join(", ")),
                    "undefined",
                ),
            )),
        }
    }

    /// Resolve the type named by `data["type"]`.
    pub fn resolve_type_of(&self, data: &Value, fallback: bool) -> Result<ResolvedType, DomainError> {
        self.resolve_type(data.get("type").and_then(Value::as_str), fallback)
    }

    /// Every collection a record of this type owns: base fields first.
    pub fn collections_for(&self, resolved: &ResolvedType) -> Vec<CollectionDecl> {
        let mut decls = self.base_collections.clone();
        if let ResolvedType::Known(schema) = resolved {
            decls.extend(schema.collections.iter().cloned());
        }
        decls
    }

    /// Fill defaults in place: base fields, `type`, then the type payload.
    pub fn clean(&self, data: &mut Value, resolved: &ResolvedType) {
        let Value::Object(map) = data else {
            return;
        };
        clean_fields(&self.fields, map);
        if let ResolvedType::Known(schema) = resolved {
            if map.get("type").and_then(Value::as_str).unwrap_or_default().is_empty() {
                map.insert("type".to_string(), Value::String(schema.name.clone()));
            }
            let system = map
                .entry(TYPE_DATA_KEY.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if system.is_null() {
                *system = Value::Object(Map::new());
            }
            if let Value::Object(system) = system {
                clean_fields(&schema.fields, system);
            }
        }
    }

    /// Validate cleaned data. A `Fallback` type skips payload validation.
    pub fn validate(&self, data: &Value, resolved: &ResolvedType) -> Result<(), DomainError> {
        let Some(map) = data.as_object() else {
            return Err(DomainError::validation(
                &self.document_name,
                ValidationErrors::single("", "object", type_name(data)),
            ));
        };

        let mut errors = ValidationErrors::default();
        if RecordId::of(data).is_none() {
            errors.0.extend(
                ValidationErrors::single(
                    "_id",
                    "non-empty string",
                    map.get("_id").map(type_name).unwrap_or("undefined"),
                )
                .0,
            );
        }
        if let Err(e) = validate_fields(&self.fields, map, &[]) {
            errors.0.extend(e.0);
        }
        if let ResolvedType::Known(schema) = resolved {
            match map.get(TYPE_DATA_KEY) {
                Some(Value::Object(system)) => {
                    if let Err(e) = validate_fields(&schema.fields, system, &[TYPE_DATA_KEY]) {
                        errors.0.extend(e.0);
                    }
                }
                other => errors.0.extend(
                    ValidationErrors::single(
                        TYPE_DATA_KEY,
                        "object",
                        other.map(type_name).unwrap_or("undefined"),
                    )
                    .0,
                ),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation(&self.document_name, errors))
        }
    }

    /// Run this kind's migration, then the type migration, on one entry.
    pub fn migrate_entry(&self, data: &mut Value) -> Result<(), DomainError> {
        let Value::Object(map) = data else {
            return Ok(());
        };
        if let Some(migrate) = &self.migrate {
            migrate(map).map_err(|e| DomainError::migration(&self.document_name, e))?;
        }
        let type_name = map.get("type").and_then(Value::as_str).map(str::to_string);
        if let ResolvedType::Known(schema) = self.resolve_type(type_name.as_deref(), true)? {
            if let (Some(migrate), Some(Value::Object(system))) =
                (&schema.migrate, map.get_mut(TYPE_DATA_KEY))
            {
                migrate(system).map_err(|e| DomainError::migration(&self.document_name, e))?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Registry
// =============================================================================

/// A registered kind.
#[derive(Debug, Clone)]
pub struct RecordKind {
    name: String,
    extends: Option<String>,
    base: String,
}

impl RecordKind {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extends(&self) -> Option<&str> {
        self.extends.as_deref()
    }

    /// Name of the kind at the top of the hierarchy (the document name).
    pub fn base(&self) -> &str {
        &self.base
    }
}

/// Every kind known to the framework, with one schema per base kind.
#[derive(Debug)]
pub struct KindRegistry {
    kinds: BTreeMap<String, RecordKind>,
    schemas: BTreeMap<String, Arc<CompositeSchema>>,
}

impl KindRegistry {
    pub fn builder() -> KindRegistryBuilder {
        KindRegistryBuilder::default()
    }

    pub fn kind(&self, name: &str) -> Option<&RecordKind> {
        self.kinds.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    /// Flavor of the hierarchy `name` belongs to.
    pub fn flavor_of(&self, name: &str) -> Option<KindFlavor> {
        let kind = self.kinds.get(name)?;
        self.schemas.get(&kind.base).map(|schema| schema.flavor)
    }

    pub fn kind_names(&self) -> Vec<&str> {
        self.kinds.keys().map(String::as_str).collect()
    }

    /// The kind itself followed by every kind it extends, base last.
    pub fn lineage(&self, name: &str) -> Vec<&str> {
        let mut lineage = Vec::new();
        let mut current = self.kinds.get(name);
        while let Some(kind) = current {
            lineage.push(kind.name.as_str());
            current = kind.extends.as_deref().and_then(|parent| self.kinds.get(parent));
        }
        lineage
    }

    /// The shared schema of `name`'s hierarchy.
    pub fn schema_for(&self, name: &str) -> Result<Arc<CompositeSchema>, DomainError> {
        let kind = self
            .kinds
            .get(name)
            .ok_or_else(|| DomainError::not_found("RecordKind", name))?;
        self.schemas
            .get(&kind.base)
            .cloned()
            .ok_or_else(|| DomainError::not_found("CompositeSchema", &kind.base))
    }

    /// Valid discriminator values for a document name.
    pub fn type_choices_for(&self, document_name: &str) -> Vec<String> {
        self.schemas
            .get(document_name)
            .map(|schema| schema.type_choices())
            .unwrap_or_default()
    }

    pub fn resolve_type(
        &self,
        document_name: &str,
        type_name: Option<&str>,
        fallback: bool,
    ) -> Result<ResolvedType, DomainError> {
        self.schema_for(document_name)?.resolve_type(type_name, fallback)
    }

    /// Apply `op` to `data`, then recursively to every record nested in it.
    ///
    /// Types are resolved in fallback mode so unknown subtypes still have
    /// their base collections visited.
    pub fn apply<F>(&self, kind: &str, data: &mut Value, op: &mut F) -> Result<(), DomainError>
    where
        F: FnMut(&CompositeSchema, &mut Value) -> Result<(), DomainError>,
    {
        let schema = self.schema_for(kind)?;
        op(&schema, data)?;
        let resolved = schema.resolve_type_of(data, true)?;
        for decl in schema.collections_for(&resolved) {
            if let Some(entries) = data.pointer_mut(&pointer_for(decl.path.segments())) {
                decl.field.apply(self, entries, op)?;
            }
        }
        Ok(())
    }

    /// Migrate `data` and every nested record's raw data.
    pub fn migrate_data(&self, kind: &str, data: &mut Value) -> Result<(), DomainError> {
        self.apply(kind, data, &mut |schema: &CompositeSchema, entry: &mut Value| {
            schema.migrate_entry(entry)
        })
    }

    /// Give every record in `data` (nested ones included) an id if it lacks one.
    pub fn assign_ids(&self, kind: &str, data: &mut Value, id_length: usize) -> Result<(), DomainError> {
        self.apply(kind, data, &mut |_: &CompositeSchema, entry: &mut Value| {
            if RecordId::of(entry).is_none() {
                if let Value::Object(map) = entry {
                    map.insert(
                        "_id".to_string(),
                        Value::String(RecordId::generate(id_length).into_inner()),
                    );
                }
            }
            Ok(())
        })
    }
}

/// Collects definitions and validates them as a whole.
#[derive(Default)]
pub struct KindRegistryBuilder {
    definitions: Vec<KindDefinition>,
}

impl KindRegistryBuilder {
    pub fn register(mut self, definition: KindDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Validate every definition and build the registry.
    pub fn build(self) -> Result<KindRegistry, DomainError> {
        let mut by_name: BTreeMap<String, KindDefinition> = BTreeMap::new();
        for definition in self.definitions {
            if by_name.contains_key(&definition.name) {
                return Err(DomainError::definition(format!(
                    "kind \"{}\" is registered twice",
                    definition.name
                )));
            }
            by_name.insert(definition.name.clone(), definition);
        }

        let mut kinds = BTreeMap::new();
        for (name, definition) in &by_name {
            let base = base_of(name, &by_name)?;
            if definition.extends.is_some() && has_own_schema(definition) {
                return Err(DomainError::definition(format!(
                    "kind \"{name}\" extends \"{base}\" and cannot declare its own schema"
                )));
            }
            kinds.insert(
                name.clone(),
                RecordKind {
                    name: name.clone(),
                    extends: definition.extends.clone(),
                    base,
                },
            );
        }

        let flavor_of = |element: &str| -> Option<KindFlavor> {
            let kind = kinds.get(element)?;
            by_name.get(&kind.base).map(|d| d.flavor)
        };

        let mut schemas = BTreeMap::new();
        for (name, definition) in by_name.iter().filter(|(_, d)| d.extends.is_none()) {
            let schema = composite_from(definition, &flavor_of)?;
            schemas.insert(name.clone(), Arc::new(schema));
        }

        Ok(KindRegistry { kinds, schemas })
    }
}

fn has_own_schema(definition: &KindDefinition) -> bool {
    !definition.fields.is_empty()
        || !definition.types.is_empty()
        || definition.default_type.is_some()
        || !definition.native_collections.is_empty()
}

fn base_of(name: &str, by_name: &BTreeMap<String, KindDefinition>) -> Result<String, DomainError> {
    let mut seen = BTreeSet::new();
    let mut current = name.to_string();
    loop {
        if !seen.insert(current.clone()) {
            return Err(DomainError::definition(format!(
                "kind \"{name}\" has a cyclic extends chain"
            )));
        }
        let definition = by_name.get(&current).ok_or_else(|| {
            DomainError::definition(format!("kind \"{name}\" extends unknown kind \"{current}\""))
        })?;
        match &definition.extends {
            Some(parent) => current = parent.clone(),
            None => return Ok(current),
        }
    }
}

fn composite_from(
    definition: &KindDefinition,
    flavor_of: &impl Fn(&str) -> Option<KindFlavor>,
) -> Result<CompositeSchema, DomainError> {
    let name = &definition.name;

    for key in RESERVED_KEYS {
        if definition.fields.contains_key(key) {
            return Err(DomainError::definition(format!(
                "kind \"{name}\" declares reserved field \"{key}\""
            )));
        }
    }
    if !definition.types.is_empty() && definition.fields.contains_key(TYPE_DATA_KEY) {
        return Err(DomainError::definition(format!(
            "kind \"{name}\" declares \"{TYPE_DATA_KEY}\" alongside typed payloads"
        )));
    }
    if let Some(default) = &definition.default_type {
        if !definition.types.contains_key(default) {
            return Err(DomainError::definition(format!(
                "kind \"{name}\" defaults to unregistered type \"{default}\""
            )));
        }
    }
    if definition.flavor == KindFlavor::Pseudo && !definition.native_collections.is_empty() {
        return Err(DomainError::definition(format!(
            "record kind \"{name}\" cannot declare native collections"
        )));
    }

    let base_collections = collect_collections(&definition.fields, &FieldPath::default());
    check_collections(name, None, &base_collections, &definition.native_collections, flavor_of)?;

    let mut types = BTreeMap::new();
    for (type_name, type_definition) in &definition.types {
        let collections = collect_collections(
            &type_definition.fields,
            &FieldPath::from_segments(vec![TYPE_DATA_KEY.to_string()]),
        );
        let mut combined = base_collections.clone();
        combined.extend(collections.iter().cloned());
        check_collections(
            name,
            Some(type_name),
            &combined,
            &definition.native_collections,
            flavor_of,
        )?;
        types.insert(
            type_name.clone(),
            Arc::new(TypeSchema {
                name: type_name.clone(),
                fields: type_definition.fields.clone(),
                collections,
                migrate: type_definition.migrate.clone(),
            }),
        );
    }

    Ok(CompositeSchema {
        document_name: name.clone(),
        flavor: definition.flavor,
        fields: definition.fields.clone(),
        types,
        default_type: definition.default_type.clone(),
        base_collections,
        native_collections: definition.native_collections.clone(),
        migrate: definition.migrate.clone(),
    })
}

/// Find collection fields, descending through plain object fields.
fn collect_collections(fields: &SchemaFields, prefix: &FieldPath) -> Vec<CollectionDecl> {
    let mut decls = Vec::new();
    for (name, schema) in fields {
        let path = prefix.child(name.as_str());
        match &schema.kind {
            FieldKind::Collection(field) => decls.push(CollectionDecl::new(path, field.clone())),
            FieldKind::Object(inner) => decls.extend(collect_collections(inner, &path)),
            _ => {}
        }
    }
    decls
}

fn check_collections(
    kind: &str,
    type_name: Option<&str>,
    decls: &[CollectionDecl],
    native_collections: &[String],
    flavor_of: &impl Fn(&str) -> Option<KindFlavor>,
) -> Result<(), DomainError> {
    let owner = match type_name {
        Some(t) => format!("{kind}[{t}]"),
        None => kind.to_string(),
    };
    let mut names = BTreeSet::new();
    for decl in decls {
        decl.field.validate_element(flavor_of).map_err(|e| match e {
            DomainError::Definition(msg) => {
                DomainError::definition(format!("{owner}.{}: {msg}", decl.path))
            }
            other => other,
        })?;
        if !names.insert(decl.name.as_str()) {
            return Err(DomainError::definition(format!(
                "{owner} declares collection \"{}\" more than once",
                decl.name
            )));
        }
        if native_collections.iter().any(|n| n == &decl.name) {
            return Err(DomainError::definition(format!(
                "{owner} collection \"{}\" collides with a native collection",
                decl.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::f;
    use serde_json::json;

    fn registry() -> KindRegistry {
        KindRegistry::builder()
            .register(
                KindDefinition::native("Actor")
                    .field("name", f::string().required())
                    .native_collections(["effects"])
                    .with_type(
                        "character",
                        TypeDefinition::new()
                            .field("bag", f::object([("items", f::collection("Item"))])),
                    ),
            )
            .register(
                KindDefinition::pseudo("Item")
                    .field("name", f::string().required())
                    .field("effects", f::collection("ActiveEffect"))
                    .with_type(
                        "weapon",
                        TypeDefinition::new().field("damage", f::string().initial("1d6")),
                    )
                    .with_type(
                        "container",
                        TypeDefinition::new()
                            .field("capacity", f::number().initial(10))
                            .field("contents", f::collection("Item")),
                    )
                    .default_type("weapon"),
            )
            .register(KindDefinition::pseudo("Weapon").extends("Item"))
            .register(
                KindDefinition::pseudo("ActiveEffect")
                    .field("label", f::string())
                    .migrate(|data| {
                        if let Some(name) = data.remove("name") {
                            data.insert("label".to_string(), name);
                        }
                        Ok(())
                    }),
            )
            .build()
            .expect("valid registry")
    }

    #[test]
    fn subclasses_share_the_base_schema_instance() {
        let registry = registry();
        let item = registry.schema_for("Item").expect("item");
        let weapon = registry.schema_for("Weapon").expect("weapon");
        assert!(Arc::ptr_eq(&item, &weapon));
        assert_eq!(weapon.document_name(), "Item");
        assert_eq!(registry.lineage("Weapon"), vec!["Weapon", "Item"]);
    }

    #[test]
    fn type_choices_and_resolution() {
        let registry = registry();
        assert_eq!(registry.type_choices_for("Item"), vec!["container", "weapon"]);
        assert!(registry.type_choices_for("ActiveEffect").is_empty());

        let known = registry.resolve_type("Item", Some("container"), false).expect("known");
        assert_eq!(known.name(), Some("container"));

        let defaulted = registry.resolve_type("Item", None, false).expect("default");
        assert_eq!(defaulted.name(), Some("weapon"));

        let err = registry.resolve_type("Item", Some("laser"), false).expect_err("unknown");
        assert!(matches!(err, DomainError::UnknownType { .. }));

        let fallback = registry.resolve_type("Item", Some("laser"), true).expect("fallback");
        assert_eq!(fallback, ResolvedType::Fallback("laser".to_string()));

        let untyped = registry.resolve_type("ActiveEffect", Some("x"), false).expect("untyped");
        assert_eq!(untyped, ResolvedType::Untyped);
    }

    #[test]
    fn collections_follow_the_resolved_type() {
        let registry = registry();
        let schema = registry.schema_for("Item").expect("item");
        let container = schema.resolve_type(Some("container"), false).expect("container");
        let names: Vec<String> = schema
            .collections_for(&container)
            .iter()
            .map(|d| d.path.dotted())
            .collect();
        assert_eq!(names, vec!["effects", "system.contents"]);

        let fallback = schema.resolve_type(Some("laser"), true).expect("fallback");
        assert_eq!(schema.collections_for(&fallback).len(), 1);
    }

    #[test]
    fn clean_and_validate_typed_data() {
        let registry = registry();
        let schema = registry.schema_for("Item").expect("item");
        let mut data = json!({"_id": "sword", "name": "Sword"});
        let resolved = schema.resolve_type_of(&data, false).expect("resolved");
        schema.clean(&mut data, &resolved);
        assert_eq!(
            data,
            json!({"_id": "sword", "name": "Sword", "type": "weapon", "effects": [], "system": {"damage": "1d6"}})
        );
        assert!(schema.validate(&data, &resolved).is_ok());
    }

    #[test]
    fn validate_reports_missing_id_and_payload_errors() {
        let registry = registry();
        let schema = registry.schema_for("Item").expect("item");
        let data = json!({"name": "Box", "type": "container", "system": {"capacity": "big"}});
        let resolved = schema.resolve_type_of(&data, false).expect("resolved");
        let err = schema.validate(&data, &resolved).expect_err("invalid");
        let DomainError::Validation { errors, .. } = err else {
            panic!("expected validation error");
        };
        assert!(errors.paths().contains(&"_id"));
        assert!(errors.paths().contains(&"system.capacity"));
    }

    #[test]
    fn fallback_type_skips_payload_validation() {
        let registry = registry();
        let schema = registry.schema_for("Item").expect("item");
        let data = json!({"_id": "x", "name": "Odd", "type": "laser", "system": {"watts": "many"}, "effects": []});
        let resolved = schema.resolve_type_of(&data, true).expect("fallback");
        assert!(schema.validate(&data, &resolved).is_ok());
    }

    #[test]
    fn migration_reaches_every_nested_record() {
        let registry = registry();
        let mut root = json!({
            "name": "Hero",
            "type": "character",
            "system": {"bag": {"items": [
                {"_id": "box", "name": "Box", "type": "container", "system": {"contents": [
                    {"_id": "gem", "name": "Gem", "effects": [{"_id": "glow", "name": "Glow"}]}
                ]}, "effects": []}
            ]}}
        });
        registry.migrate_data("Actor", &mut root).expect("migrate");
        let effect = &root["system"]["bag"]["items"][0]["system"]["contents"][0]["effects"][0];
        assert_eq!(effect, &json!({"_id": "glow", "label": "Glow"}));
    }

    #[test]
    fn assign_ids_fills_nested_records() {
        let registry = registry();
        let mut item = json!({"name": "Box", "type": "container", "system": {"contents": [{"name": "Gem"}]}});
        registry.assign_ids("Item", &mut item, 8).expect("ids");
        assert_eq!(item["_id"].as_str().map(str::len), Some(8));
        assert_eq!(item["system"]["contents"][0]["_id"].as_str().map(str::len), Some(8));
    }

    #[test]
    fn duplicate_collection_names_fail_at_definition_time() {
        let err = KindRegistry::builder()
            .register(
                KindDefinition::pseudo("Item")
                    .field("effects", f::collection("Item"))
                    .with_type(
                        "pouch",
                        TypeDefinition::new().field("effects", f::collection("Item")),
                    ),
            )
            .build()
            .expect_err("duplicate");
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn native_collection_collision_fails_at_definition_time() {
        let err = KindRegistry::builder()
            .register(KindDefinition::pseudo("Item"))
            .register(
                KindDefinition::native("Actor")
                    .native_collections(["items"])
                    .field("items", f::collection("Item")),
            )
            .build()
            .expect_err("collision");
        assert!(err.to_string().contains("collides"));
    }

    #[test]
    fn native_element_kind_is_rejected() {
        let err = KindRegistry::builder()
            .register(KindDefinition::native("Actor"))
            .register(KindDefinition::pseudo("Party").field("members", f::collection("Actor")))
            .build()
            .expect_err("native element");
        assert!(err.to_string().contains("native document kind"));
    }

    #[test]
    fn unknown_element_kind_is_rejected() {
        let err = KindRegistry::builder()
            .register(KindDefinition::pseudo("Item").field("effects", f::collection("Effect")))
            .build()
            .expect_err("unknown element");
        assert!(err.to_string().contains("not a registered record kind"));
    }

    #[test]
    fn extends_chain_is_checked() {
        let cyclic = KindRegistry::builder()
            .register(KindDefinition::pseudo("A").extends("B"))
            .register(KindDefinition::pseudo("B").extends("A"))
            .build()
            .expect_err("cycle");
        assert!(cyclic.to_string().contains("cyclic"));

        let missing = KindRegistry::builder()
            .register(KindDefinition::pseudo("A").extends("Nope"))
            .build()
            .expect_err("missing");
        assert!(missing.to_string().contains("unknown kind"));

        let own_schema = KindRegistry::builder()
            .register(KindDefinition::pseudo("Item"))
            .register(KindDefinition::pseudo("Weapon").extends("Item").field("x", f::any()))
            .build()
            .expect_err("own schema");
        assert!(own_schema.to_string().contains("cannot declare"));
    }

    #[test]
    fn reserved_fields_are_rejected() {
        let err = KindRegistry::builder()
            .register(KindDefinition::pseudo("Item").field("_id", f::string()))
            .build()
            .expect_err("reserved");
        assert!(err.to_string().contains("reserved"));
    }
}
