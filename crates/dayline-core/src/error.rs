//! Error kinds raised by the import and reconciliation pipeline.

use thiserror::Error;

/// Errors produced while decoding, reconciling, or persisting an import run.
///
/// Only [`ImportError::Decode`] is recoverable: it is isolated to a single
/// input batch. Every other variant aborts the run and rolls back the
/// store transaction.
#[derive(Debug, Error)]
pub enum ImportError {
    /// One input batch could not be read.
    #[error("failed to decode {source_name}: {reason}")]
    Decode { source_name: String, reason: String },

    /// Load, save, or transaction failure in the persistent store.
    #[error("store failure: {0:#}")]
    Store(anyhow::Error),

    /// Internal consistency check failed; indicates a bug or malformed input.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// The caller requested cancellation between two days.
    #[error("import cancelled")]
    Cancelled,
}

impl ImportError {
    pub fn decode(source_name: impl Into<String>, reason: impl ToString) -> Self {
        ImportError::Decode {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the run can continue past this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ImportError::Decode { .. })
    }
}
