//! Port traits for infrastructure boundaries.
//!
//! Ports exist for:
//! - Root persistence (the whole-field-replace update call)
//! - Native host collections on a root
//! - Error reporting, render observers and data preparation callbacks

mod error;
mod hooks;
mod store;

pub use error::StoreError;
pub use hooks::{DataPreparer, DocumentRef, ErrorHook, RecordObserver};
pub use store::{NativeDocuments, RootStore};

// =============================================================================
// Test-Only Mocks (only available during test builds)
// =============================================================================
#[cfg(test)]
pub use hooks::MockErrorHook;
#[cfg(test)]
pub use store::{MockNativeDocuments, MockRootStore};
