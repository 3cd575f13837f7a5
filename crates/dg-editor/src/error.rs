use dg_core::{RuleError, StylesheetId, UowError};
use thiserror::Error;

/// Failure of an editor action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditorError {
    #[error("default stylesheet `{id}` cannot be {action}")]
    ProtectedStylesheet {
        id: StylesheetId,
        action: &'static str,
    },

    #[error("rule index {index} out of range for {len} rules")]
    RuleIndexOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Uow(#[from] UowError),
}
