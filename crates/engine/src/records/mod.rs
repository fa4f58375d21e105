//! Live record trees.
//!
//! - `source` - shared serialized data and handles into it
//! - `record` / `collection` - addressable records and id-keyed collections
//! - `root` - the persisted host document and embedded-collection routing
//! - `write_path` / `crud` - turning nested mutations into flat root patches

mod collection;
mod collection_field;
mod crud;
mod record;
mod root;
mod source;
mod write_path;

pub use collection::{
    cascade_delete, CollectionOwner, EmbeddedOwner, GetOptions, InitOptions, ModifyOptions,
    RecordCollection,
};
pub use collection_field::CollectionFieldExt;
pub use record::{Record, RecordParent};
pub use root::{EmbeddedCollection, EmbeddedDocument, RootDocument, RootDocumentBuilder};
pub use source::{ArrayConflict, SourceHandle, SourceTree};
pub use write_path::{WritePath, WriteTarget};
