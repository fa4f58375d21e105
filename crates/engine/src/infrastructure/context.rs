//! Shared runtime context handed to every live record and collection.

use std::collections::HashMap;
use std::sync::Arc;

use sheetstore_domain::KindRegistry;

use super::error_hook::TracingErrorHook;
use super::ports::{DataPreparer, ErrorHook};
use super::settings::FrameworkSettings;

pub struct RecordContext {
    registry: Arc<KindRegistry>,
    error_hook: Arc<dyn ErrorHook>,
    preparers: HashMap<String, Arc<dyn DataPreparer>>,
    settings: FrameworkSettings,
}

impl RecordContext {
    pub fn builder(registry: Arc<KindRegistry>) -> RecordContextBuilder {
        RecordContextBuilder {
            registry,
            error_hook: None,
            preparers: HashMap::new(),
            settings: FrameworkSettings::default(),
        }
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    pub fn error_hook(&self) -> &dyn ErrorHook {
        self.error_hook.as_ref()
    }

    pub fn settings(&self) -> &FrameworkSettings {
        &self.settings
    }

    /// Preparer registered for `kind`, or for the nearest kind it extends.
    pub fn preparer_for(&self, kind: &str) -> Option<Arc<dyn DataPreparer>> {
        self.registry
            .lineage(kind)
            .into_iter()
            .find_map(|name| self.preparers.get(name).cloned())
    }
}

pub struct RecordContextBuilder {
    registry: Arc<KindRegistry>,
    error_hook: Option<Arc<dyn ErrorHook>>,
    preparers: HashMap<String, Arc<dyn DataPreparer>>,
    settings: FrameworkSettings,
}

impl RecordContextBuilder {
    pub fn error_hook(mut self, hook: Arc<dyn ErrorHook>) -> Self {
        self.error_hook = Some(hook);
        self
    }

    pub fn preparer(mut self, kind: impl Into<String>, preparer: Arc<dyn DataPreparer>) -> Self {
        self.preparers.insert(kind.into(), preparer);
        self
    }

    pub fn settings(mut self, settings: FrameworkSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Arc<RecordContext> {
        Arc::new(RecordContext {
            registry: self.registry,
            error_hook: self
                .error_hook
                .unwrap_or_else(|| Arc::new(TracingErrorHook::new())),
            preparers: self.preparers,
            settings: self.settings,
        })
    }
}
