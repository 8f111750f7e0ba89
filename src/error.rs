// ⚠️ Sync Errors - Structured failures of the reconciliation core
//
// Only ProviderUnavailable and Persist abort a pass.
// MalformedKey and WriteBackFailure are diagnostics: the row is skipped.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Supplier code has no usable numeric key (row is excluded, never fatal)
    MalformedKey { code: String, reason: String },

    /// One sheet row could not be persisted (non-fatal, batch continues)
    WriteBackFailure { row_position: u32, reason: String },

    /// A data source could not deliver its dataset (fatal, pre-reconciliation)
    ProviderUnavailable { provider: String, reason: String },

    /// The audit log rewrite failed (fatal)
    Persist { target: String, reason: String },
}

impl SyncError {
    pub fn provider_unavailable(provider: &str, err: impl fmt::Display) -> Self {
        SyncError::ProviderUnavailable {
            provider: provider.to_string(),
            reason: err.to_string(),
        }
    }

    /// True for errors that end the pass
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::ProviderUnavailable { .. } | SyncError::Persist { .. }
        )
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::MalformedKey { code, reason } => {
                write!(f, "malformed supplier code '{}': {}", code, reason)
            }
            SyncError::WriteBackFailure { row_position, reason } => {
                write!(f, "write-back failed for row {}: {}", row_position, reason)
            }
            SyncError::ProviderUnavailable { provider, reason } => {
                write!(f, "{} unavailable: {}", provider, reason)
            }
            SyncError::Persist { target, reason } => {
                write!(f, "failed to persist {}: {}", target, reason)
            }
        }
    }
}

impl std::error::Error for SyncError {}
