//! Error types for port operations.

use sheetstore_domain::RecordId;

/// Root persistence errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The store holds no root with this id.
    #[error("Root not found: {0}")]
    NotFound(RecordId),

    /// The store refused the patch (e.g. a key that does not resolve).
    #[error("Patch rejected for {operation}: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },

    /// Backend unreachable or failed mid-operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(root_id: &RecordId) -> Self {
        Self::NotFound(root_id.clone())
    }

    /// Create a Rejected error with operation context.
    pub fn rejected(operation: &'static str, message: impl ToString) -> Self {
        Self::Rejected {
            operation,
            message: message.to_string(),
        }
    }

    pub fn unavailable(message: impl ToString) -> Self {
        Self::Unavailable(message.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
