//! Plan execution
//!
//! Walks the plan stage by stage. A stage starts only after every prior
//! stage is terminal; within a stage up to `max_parallel` operations run
//! concurrently through a bounded pool. Each worker computes its own
//! outcome; the stage loop is the single aggregator. The executor never
//! fails — it always returns an `ExecutionResult`.

mod handler;

pub use handler::DEFAULT_POLL_INTERVAL;

use crate::cancel::{CancelReason, CancelToken};
use crate::diff::operation_duration;
use crate::model::ResourceIdentity;
use crate::plan::{OperationStatus, Plan, PlannedOperation};
use crate::retry::RetryPolicy;
use crate::service::ServiceClient;
use futures::stream::{FuturesUnordered, StreamExt};
use handler::{dispatch, DispatchFailure, HandlerContext};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
// tokio's Instant tracks the runtime clock, so durations stay meaningful
// under time-paused tests.
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Executor knobs; see the configuration table in the project docs.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Concurrent operations per stage.
    pub max_parallel: usize,
    /// Keep going into later stages after a stage records failures.
    pub continue_on_error: bool,
    /// Treat create-conflicts as skips instead of failures.
    pub preserve_existing: bool,
    /// Interval between readiness polls.
    pub poll_interval: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel: 5,
            continue_on_error: false,
            preserve_existing: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Final state of one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationOutcome {
    pub id: String,
    pub identity: ResourceIdentity,
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Service-assigned id for created resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    pub elapsed: Duration,
    /// Service calls spent, retries included.
    pub attempts: u32,
}

/// Counts per terminal status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

/// What one execution pass did. Always complete: every planned operation has
/// exactly one outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub duration: Duration,
    /// Outcomes in plan order.
    pub outcomes: Vec<OperationOutcome>,
    /// Operator-facing error lines, aggregated.
    pub errors: Vec<String>,
    pub summary: ExecutionSummary,
    /// Set when a cancellation interrupted the pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<CancelReason>,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.summary.failed == 0 && self.cancelled.is_none()
    }

    pub fn outcome_for(&self, id: &str) -> Option<&OperationOutcome> {
        self.outcomes.iter().find(|o| o.id == id)
    }
}

/// Runs plans against the remote service.
pub struct Executor {
    client: Arc<dyn ServiceClient>,
    retry: RetryPolicy,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(client: Arc<dyn ServiceClient>, config: ExecutorConfig) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
            config,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Execute the plan. Dependency edges are a hard happens-before; the
    /// stage barrier enforces them. Returns when every operation is
    /// terminal.
    pub async fn execute(
        &self,
        plan: &Plan,
        project_id: &str,
        cancel: &CancelToken,
    ) -> ExecutionResult {
        let started = Instant::now();
        let mut statuses: HashMap<String, OperationStatus> = HashMap::new();
        let mut outcomes_by_id: HashMap<String, OperationOutcome> = HashMap::new();
        let mut stage_failed = false;

        for stage_idx in 0..plan.stage_count() {
            let stage_ops = plan.stage(stage_idx);

            if stage_failed && !self.config.continue_on_error {
                for op in &stage_ops {
                    let outcome = skipped(op, "upstream stage failed");
                    statuses.insert(op.id.clone(), outcome.status);
                    outcomes_by_id.insert(op.id.clone(), outcome);
                }
                continue;
            }

            debug!(stage = stage_idx, operations = stage_ops.len(), "stage starting");
            let stage_outcomes = self
                .run_stage(&stage_ops, project_id, &statuses, cancel)
                .await;

            for outcome in stage_outcomes {
                if outcome.status == OperationStatus::Failed {
                    stage_failed = true;
                }
                statuses.insert(outcome.id.clone(), outcome.status);
                outcomes_by_id.insert(outcome.id.clone(), outcome);
            }
        }

        // Assemble in plan order.
        let outcomes: Vec<OperationOutcome> = plan
            .operations
            .iter()
            .map(|op| {
                outcomes_by_id
                    .remove(&op.id)
                    .unwrap_or_else(|| skipped(op, "internal: no outcome recorded"))
            })
            .collect();

        let mut summary = ExecutionSummary::default();
        let mut errors = Vec::new();
        for outcome in &outcomes {
            match outcome.status {
                OperationStatus::Completed => summary.completed += 1,
                OperationStatus::Failed => {
                    summary.failed += 1;
                    if let Some(error) = &outcome.error {
                        errors.push(format!("{}: {error}", outcome.identity));
                    }
                }
                OperationStatus::Cancelled => summary.cancelled += 1,
                _ => summary.skipped += 1,
            }
        }

        let result = ExecutionResult {
            duration: started.elapsed(),
            outcomes,
            errors,
            summary,
            cancelled: cancel.reason(),
        };
        info!(
            completed = result.summary.completed,
            failed = result.summary.failed,
            skipped = result.summary.skipped,
            cancelled = result.summary.cancelled,
            elapsed_ms = result.duration.as_millis() as u64,
            "execution finished"
        );
        result
    }

    /// Run one stage through the bounded worker pool.
    async fn run_stage(
        &self,
        stage_ops: &[&PlannedOperation],
        project_id: &str,
        statuses: &HashMap<String, OperationStatus>,
        cancel: &CancelToken,
    ) -> Vec<OperationOutcome> {
        let mut pool = FuturesUnordered::new();
        let mut queue = stage_ops.iter();
        let mut outcomes = Vec::with_capacity(stage_ops.len());

        for op in queue.by_ref().take(self.config.max_parallel.max(1)) {
            pool.push(self.run_operation(op, project_id, statuses, cancel));
        }
        while let Some(outcome) = pool.next().await {
            if let Some(op) = queue.next() {
                pool.push(self.run_operation(op, project_id, statuses, cancel));
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Run a single operation to a terminal outcome. Never panics, never
    /// returns early without an outcome.
    async fn run_operation(
        &self,
        op: &PlannedOperation,
        project_id: &str,
        statuses: &HashMap<String, OperationStatus>,
        cancel: &CancelToken,
    ) -> OperationOutcome {
        let started = Instant::now();

        // 1. Dependency gate. Checked before the cancellation gate so a
        //    dependent of a cancelled operation reads as skipped-upstream
        //    rather than independently cancelled.
        for dep in &op.dependencies {
            let dep_status = statuses.get(dep).copied().unwrap_or_default();
            if !dep_status.satisfies_dependents() {
                let cause = match dep_status {
                    OperationStatus::Cancelled => "upstream cancelled".to_string(),
                    other => format!("dependency {dep} {other}"),
                };
                return skipped(op, &cause);
            }
        }

        // 2. Cancellation gate.
        if cancel.is_cancelled() {
            return OperationOutcome {
                id: op.id.clone(),
                identity: op.operation.identity.clone(),
                status: OperationStatus::Cancelled,
                error: Some(cancel_cause(cancel)),
                resource_id: None,
                elapsed: Duration::ZERO,
                attempts: 0,
            };
        }

        // 3. Dispatch with the per-kind timeout. Timeout cancels only this
        //    operation, not the pass.
        let timeout = operation_duration(op.operation.kind(), op.operation.op_type);
        let ctx = HandlerContext {
            client: &self.client,
            retry: &self.retry,
            project_id,
            preserve_existing: self.config.preserve_existing,
            poll_interval: self.config.poll_interval,
            cancel,
        };

        let dispatched = tokio::select! {
            result = dispatch(&ctx, &op.operation) => result,
            _ = tokio::time::sleep(timeout) => {
                warn!(op = %op.operation, timeout_s = timeout.as_secs(), "operation timed out");
                Err(DispatchFailure::Failed {
                    kind: crate::service::ServiceErrorKind::Unknown,
                    message: format!("timed out after {}s", timeout.as_secs()),
                    attempts: 0,
                })
            }
        };

        let elapsed = started.elapsed();
        match dispatched {
            Ok(output) => OperationOutcome {
                id: op.id.clone(),
                identity: op.operation.identity.clone(),
                status: OperationStatus::Completed,
                error: None,
                resource_id: output.resource_id,
                elapsed,
                attempts: output.attempts,
            },
            Err(DispatchFailure::ConflictSkip { attempts }) => OperationOutcome {
                id: op.id.clone(),
                identity: op.operation.identity.clone(),
                status: OperationStatus::SkippedConflict,
                error: None,
                resource_id: None,
                elapsed,
                attempts,
            },
            Err(DispatchFailure::Cancelled) => OperationOutcome {
                id: op.id.clone(),
                identity: op.operation.identity.clone(),
                status: OperationStatus::Cancelled,
                error: Some(cancel_cause(cancel)),
                resource_id: None,
                elapsed,
                attempts: 0,
            },
            Err(DispatchFailure::Failed {
                message, attempts, ..
            }) => {
                warn!(op = %op.operation, error = %message, "operation failed");
                OperationOutcome {
                    id: op.id.clone(),
                    identity: op.operation.identity.clone(),
                    status: OperationStatus::Failed,
                    error: Some(message),
                    resource_id: None,
                    elapsed,
                    attempts,
                }
            }
        }
    }
}

fn skipped(op: &PlannedOperation, cause: &str) -> OperationOutcome {
    OperationOutcome {
        id: op.id.clone(),
        identity: op.operation.identity.clone(),
        status: OperationStatus::Skipped,
        error: Some(cause.to_string()),
        resource_id: None,
        elapsed: Duration::ZERO,
        attempts: 0,
    }
}

fn cancel_cause(cancel: &CancelToken) -> String {
    match cancel.reason() {
        Some(reason) => reason.to_string(),
        None => "cancelled".to_string(),
    }
}
