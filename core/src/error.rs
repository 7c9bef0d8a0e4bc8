//! Execution error types.

use core::fmt;

/// Terminal failures of an execution.
///
/// Failures of functions and approval handlers never end up here; they are turned into
/// unsuccessful [`FunctionReturnValue`](crate::FunctionReturnValue)s and fed back to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The provider adapter failed.
    Provider(String),

    /// A function requires approval but the request carries no approval handler.
    ApprovalUnavailable {
        /// Name of the function that asked for approval.
        function: String,
    },

    /// The conversation needed more turns than allowed.
    TurnLimit {
        /// The configured limit.
        limit: usize,
    },
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provider(e) => write!(f, "provider error: {e}"),
            Self::ApprovalUnavailable { function } => {
                write!(
                    f,
                    "function '{function}' requires approval but no approval handler is configured"
                )
            }
            Self::TurnLimit { limit } => write!(f, "exceeded maximum turns ({limit})"),
        }
    }
}

impl std::error::Error for ExecutionError {}

impl ExecutionError {
    /// Returns `true` if the failure comes from the request setup rather than the model.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::ApprovalUnavailable { .. })
    }
}

impl From<anyhow::Error> for ExecutionError {
    fn from(error: anyhow::Error) -> Self {
        Self::Provider(format!("{error:#}"))
    }
}
