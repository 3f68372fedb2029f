//! Error taxonomy and the exit-code contract
//!
//! Pipeline-level failures. Per-operation failures never surface here: the
//! executor always returns an `ExecutionResult` and the exit-code mapping
//! reads its summary instead.

use crate::cancel::CancelReason;
use crate::discovery::DiscoveryError;
use crate::execute::ExecutionResult;
use crate::manifest::MergeError;
use crate::plan::DagError;
use crate::validate::ValidationReport;
use thiserror::Error;

/// A failed reconciliation pass.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed manifests or a cross-file merge conflict. Never retried.
    #[error("manifest load failed: {0}")]
    Load(#[from] MergeError),

    /// Aggregated validation failures; the pass aborts pre-execution.
    #[error("validation failed with {} error(s)", .0.error_count())]
    Validation(ValidationReport),

    /// Current-state fetch failed after retries.
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Organization or state inconsistency detected while diffing.
    #[error("diff failed: {0}")]
    Diff(#[from] crate::diff::DiffError),

    /// Contradictory options.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// User or deadline-driven abort.
    #[error("reconciliation cancelled: {0}")]
    Cancelled(CancelReason),

    /// Unreachable invariant violation, e.g. a cycle at plan time.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<DagError> for CoreError {
    fn from(e: DagError) -> Self {
        // The validator screens cycles; one surviving to planning is a bug,
        // not a user error.
        CoreError::Internal(e.to_string())
    }
}

/// Exit codes the CLI adapter maps process status onto:
/// 0 success, 1 operation failure, 2 validation failure, 3 user cancel,
/// 4 timeout.
pub fn exit_code_for_error(error: &CoreError) -> i32 {
    match error {
        CoreError::Load(_) | CoreError::Validation(_) | CoreError::Config(_) => 2,
        CoreError::Cancelled(CancelReason::User) => 3,
        CoreError::Cancelled(CancelReason::Deadline) => 4,
        CoreError::Discovery(DiscoveryError::Cancelled) => 3,
        CoreError::Discovery(_) | CoreError::Diff(_) | CoreError::Internal(_) => 1,
    }
}

/// Exit code for a pass that reached execution.
pub fn exit_code_for_result(result: &ExecutionResult) -> i32 {
    match result.cancelled {
        Some(CancelReason::User) => 3,
        Some(CancelReason::Deadline) => 4,
        None if result.summary.failed > 0 => 1,
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execute::ExecutionSummary;
    use std::time::Duration;

    fn result(failed: usize, cancelled: Option<CancelReason>) -> ExecutionResult {
        ExecutionResult {
            duration: Duration::ZERO,
            outcomes: vec![],
            errors: vec![],
            summary: ExecutionSummary {
                completed: 0,
                failed,
                skipped: 0,
                cancelled: 0,
            },
            cancelled,
        }
    }

    #[test]
    fn test_exit_codes_for_results() {
        assert_eq!(exit_code_for_result(&result(0, None)), 0);
        assert_eq!(exit_code_for_result(&result(2, None)), 1);
        assert_eq!(
            exit_code_for_result(&result(0, Some(CancelReason::User))),
            3
        );
        assert_eq!(
            exit_code_for_result(&result(1, Some(CancelReason::Deadline))),
            4
        );
    }

    #[test]
    fn test_exit_codes_for_errors() {
        assert_eq!(
            exit_code_for_error(&CoreError::Config("watch + dry-run".to_string())),
            2
        );
        assert_eq!(
            exit_code_for_error(&CoreError::Cancelled(CancelReason::User)),
            3
        );
        assert_eq!(
            exit_code_for_error(&CoreError::Cancelled(CancelReason::Deadline)),
            4
        );
        assert_eq!(
            exit_code_for_error(&CoreError::Internal("cycle".to_string())),
            1
        );
    }
}
