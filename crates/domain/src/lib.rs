//! Schema layer for embedded pseudo-records.
//!
//! Pure data: kinds, field schemas, type resolution, paths and patches.
//! Nothing in this crate performs I/O or holds live record state; the
//! engine crate builds live records on top of it.

pub mod error;
pub mod ids;
pub mod kinds;
pub mod path;
pub mod schema;

pub use error::{DomainError, ValidationError, ValidationErrors};
pub use ids::{RecordId, DEFAULT_ID_LENGTH};
pub use kinds::{
    CompositeSchema, KindDefinition, KindFlavor, KindRegistry, KindRegistryBuilder, MigrationFn,
    RecordKind, ResolvedType, TypeDefinition, TypeSchema, TYPE_DATA_KEY,
};
pub use path::{
    expand_object, get_dotted, index_of_id, merge_object, pointer_for, resolve_steps,
    resolve_steps_mut, set_dotted, FieldPath, PathStep, UpdatePatch,
};
pub use schema::{
    clean_fields, default_for, f, type_name, validate_fields, validate_value, CollectionDecl,
    CollectionField, FieldKind, FieldSchema, SchemaFields,
};
