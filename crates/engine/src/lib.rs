//! Sheetstore Engine library.
//!
//! Live, addressable records embedded in the serialized data of a persisted
//! root document, kept in sync with that data and written back through a
//! store that only replaces whole named fields.
//!
//! ## Structure
//!
//! - `records/` - record trees: collections, roots, the write path and CRUD
//! - `infrastructure/` - External dependency boundaries (ports + adapters), settings, tracing
//! - `error` - Engine error type

pub mod error;
pub mod infrastructure;
pub mod records;

/// Test fixtures module for record tests.
#[cfg(test)]
pub mod test_fixtures;

/// End-to-end record scenarios.
#[cfg(test)]
mod e2e_tests;

pub use error::RecordError;
pub use infrastructure::{FrameworkSettings, MemoryRootStore, RecordContext};
pub use records::{Record, RecordCollection, RootDocument};
