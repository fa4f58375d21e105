//! Infrastructure implementations.
//!
//! Contains port traits and their default adapters, plus settings and
//! tracing setup.

pub mod context;
pub mod error_hook;
pub mod memory_store;
pub mod ports;
pub mod settings;
pub mod telemetry;

pub use context::{RecordContext, RecordContextBuilder};
pub use error_hook::TracingErrorHook;
pub use memory_store::MemoryRootStore;
pub use settings::FrameworkSettings;
