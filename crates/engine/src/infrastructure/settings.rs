//! Framework settings.
//!
//! Read from environment variables, falling back to defaults for anything
//! missing or malformed:
//! - `SHEETSTORE_TYPE_FALLBACK`: accept unknown record types (`true`/`false`, default `false`)
//! - `SHEETSTORE_LOG`: tracing filter used when `RUST_LOG` is unset (default `sheetstore_engine=debug`)
//! - `SHEETSTORE_ID_LENGTH`: length of generated record ids (range: 8-32, default 16)

use serde::{Deserialize, Serialize};
use sheetstore_domain::DEFAULT_ID_LENGTH;

pub const DEFAULT_LOG_FILTER: &str = "sheetstore_engine=debug";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkSettings {
    /// Build records of unregistered types instead of quarantining them.
    pub type_fallback: bool,
    pub log_filter: String,
    pub id_length: usize,
}

impl Default for FrameworkSettings {
    fn default() -> Self {
        Self {
            type_fallback: false,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            id_length: DEFAULT_ID_LENGTH,
        }
    }
}

impl FrameworkSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        if let Some(val) = lookup("SHEETSTORE_TYPE_FALLBACK") {
            match val.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => settings.type_fallback = true,
                "0" | "false" | "no" => settings.type_fallback = false,
                _ => tracing::warn!(val = %val, "SHEETSTORE_TYPE_FALLBACK is not a boolean, ignoring"),
            }
        }

        if let Some(val) = lookup("SHEETSTORE_LOG") {
            let val = val.trim();
            if !val.is_empty() {
                settings.log_filter = val.to_string();
            }
        }

        if let Some(val) = lookup("SHEETSTORE_ID_LENGTH") {
            match val.trim().parse::<usize>() {
                Ok(len) if (8..=32).contains(&len) => settings.id_length = len,
                Ok(len) => tracing::warn!(len, "SHEETSTORE_ID_LENGTH out of range [8, 32], ignoring"),
                Err(_) => tracing::warn!(val = %val, "SHEETSTORE_ID_LENGTH is not a valid usize, ignoring"),
            }
        }

        settings
    }

    pub fn with_type_fallback(mut self, enabled: bool) -> Self {
        self.type_fallback = enabled;
        self
    }
}
