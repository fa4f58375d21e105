//! Default error hook.

use serde_json::Value;

use crate::error::RecordError;
use crate::infrastructure::ports::ErrorHook;

/// Reports absorbed failures as `error!` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorHook;

impl TracingErrorHook {
    pub fn new() -> Self {
        Self
    }
}

impl ErrorHook for TracingErrorHook {
    fn report(&self, source: &str, error: &RecordError, context: &Value) {
        tracing::error!(source, error = %error, context = %context, "Record error absorbed");
    }
}
