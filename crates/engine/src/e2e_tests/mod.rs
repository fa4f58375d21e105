//! End-to-end record scenarios.
//!
//! These tests drive whole root documents through the public surface:
//! - A root built from fixture data, persisted in a [`MemoryRootStore`](crate::infrastructure::MemoryRootStore)
//!   or behind a mocked store when the exact patch matters
//! - CRUD through the write path, nested several collections deep
//! - Host-originated updates, quarantine and deletion cascades
//!
//! # Running
//!
//! ```bash
//! cargo test -p sheetstore-engine --lib e2e_tests
//! ```

mod e2e_helpers;

pub use e2e_helpers::*;
