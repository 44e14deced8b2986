use thiserror::Error;

pub type ConductorResult<T> = Result<T, ConductorError>;

/// The full error taxonomy for the orchestration core.
///
/// Variants map onto the five error categories the substrate distinguishes:
/// transient step errors (retryable), guard violations (model-level bugs,
/// never retried), command errors (bad caller input), logical model
/// failures (a host callback returned something the state machine can't
/// act on), and fatal substrate errors (storage or invariant breakage).
#[derive(Debug, Error)]
pub enum ConductorError {
    #[error("transient step error in {step}: {message}")]
    TransientStep { step: String, message: String },

    #[error("guard violation: {0}")]
    GuardViolation(String),

    #[error("command error: {0}")]
    CommandError(String),

    #[error("approval id mismatch: expected {expected}, got {actual}")]
    ApprovalIdMismatch { expected: String, actual: String },

    #[error("logical model failure: {0}")]
    LogicalModelFailure(String),

    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("fatal substrate error: {0}")]
    Fatal(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConductorError {
    pub fn guard(message: impl Into<String>) -> Self {
        ConductorError::GuardViolation(message.into())
    }

    pub fn transient(step: impl Into<String>, message: impl Into<String>) -> Self {
        ConductorError::TransientStep {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Stable, matchable discriminant for callers that need to branch on
    /// error category without matching every variant (e.g. a future HTTP
    /// host mapping guard violations to 422 and fatal errors to 500).
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConductorError::TransientStep { .. } => ErrorKind::TransientStep,
            ConductorError::GuardViolation(_) => ErrorKind::GuardViolation,
            ConductorError::CommandError(_) => ErrorKind::CommandError,
            ConductorError::ApprovalIdMismatch { .. } => ErrorKind::CommandError,
            ConductorError::LogicalModelFailure(_) => ErrorKind::LogicalModelFailure,
            ConductorError::InstanceNotFound(_) => ErrorKind::CommandError,
            ConductorError::Fatal(_) => ErrorKind::Fatal,
            ConductorError::Storage(_) => ErrorKind::Fatal,
            ConductorError::Serialization(_) => ErrorKind::Fatal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TransientStep,
    GuardViolation,
    CommandError,
    LogicalModelFailure,
    Fatal,
}
