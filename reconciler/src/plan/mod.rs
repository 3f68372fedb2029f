//! Execution plan
//!
//! The plan is the schedule the executor walks: diff operations arranged
//! into a DAG, levelled into stages, with per-operation priorities and an
//! aggregate summary. NoChange operations never enter a plan.

mod artifact;
mod dag;
mod optimizer;

pub use artifact::{ArtifactError, ArtifactOperation, PlanArtifact, PLAN_FORMAT_VERSION};
pub use dag::DagError;
pub use optimizer::PlanBuilder;

use crate::diff::{Operation, RiskLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Lifecycle of a planned operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    /// Not run because a dependency did not complete.
    Skipped,
    /// Create found the resource already present under preserveExisting.
    SkippedConflict,
    Cancelled,
}

impl OperationStatus {
    /// Whether the operation reached a final state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::Pending | OperationStatus::Running)
    }

    /// Whether dependents may proceed. A conflict-skip means the resource
    /// exists, which is exactly what dependents need.
    pub fn satisfies_dependents(&self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::SkippedConflict
        )
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationStatus::Pending => write!(f, "pending"),
            OperationStatus::Running => write!(f, "running"),
            OperationStatus::Completed => write!(f, "completed"),
            OperationStatus::Failed => write!(f, "failed"),
            OperationStatus::Skipped => write!(f, "skipped"),
            OperationStatus::SkippedConflict => write!(f, "skipped-conflict"),
            OperationStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One operation with its position in the schedule.
#[derive(Debug, Clone)]
pub struct PlannedOperation {
    /// Stable within the plan, e.g. `op-3-cluster/c0`.
    pub id: String,
    pub operation: Operation,
    /// Ids of operations that must complete first.
    pub dependencies: Vec<String>,
    /// Stage index; all operations of a stage may run concurrently.
    pub stage: usize,
    /// Intra-stage ordering hint; lower runs first when workers are scarce.
    pub priority: u32,
    pub status: OperationStatus,
}

/// Aggregate facts about a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub total_operations: usize,
    /// Count per operation type (create/update/delete).
    pub by_type: BTreeMap<String, usize>,
    /// Count per stage index.
    pub by_stage: BTreeMap<usize, usize>,
    pub destructive_count: usize,
    /// Sum over stages of the slowest operation per stage.
    pub estimated_duration: Duration,
    pub worst_risk: RiskLevel,
    /// Mean operations per stage; 1.0 means fully serial.
    pub parallelization_factor: f64,
    /// True when any operation is destructive or risk reaches High.
    pub requires_approval: bool,
}

impl PlanSummary {
    /// Summary of an empty plan.
    pub fn empty() -> Self {
        Self {
            total_operations: 0,
            by_type: BTreeMap::new(),
            by_stage: BTreeMap::new(),
            destructive_count: 0,
            estimated_duration: Duration::ZERO,
            worst_risk: RiskLevel::Low,
            parallelization_factor: 0.0,
            requires_approval: false,
        }
    }
}

/// The full ordered schedule for one reconciliation pass.
#[derive(Debug, Clone)]
pub struct Plan {
    pub id: String,
    pub project_id: String,
    pub created_at: DateTime<Utc>,
    /// Sorted by (stage, priority).
    pub operations: Vec<PlannedOperation>,
    pub summary: PlanSummary,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Number of stages (0 for an empty plan).
    pub fn stage_count(&self) -> usize {
        self.operations
            .iter()
            .map(|op| op.stage + 1)
            .max()
            .unwrap_or(0)
    }

    /// Operations of one stage, in priority order.
    pub fn stage(&self, index: usize) -> Vec<&PlannedOperation> {
        self.operations
            .iter()
            .filter(|op| op.stage == index)
            .collect()
    }

    pub fn find(&self, id: &str) -> Option<&PlannedOperation> {
        self.operations.iter().find(|op| op.id == id)
    }

    /// Serializable projection of this plan (drops resource payloads).
    pub fn to_artifact(&self) -> PlanArtifact {
        PlanArtifact::from_plan(self)
    }
}

/// Compute the summary for a set of planned operations.
pub(crate) fn summarize(operations: &[PlannedOperation]) -> PlanSummary {
    if operations.is_empty() {
        return PlanSummary::empty();
    }

    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_stage: BTreeMap<usize, usize> = BTreeMap::new();
    let mut destructive_count = 0;
    let mut worst_risk = RiskLevel::Low;
    let mut stage_max: BTreeMap<usize, Duration> = BTreeMap::new();

    for op in operations {
        *by_type.entry(op.operation.op_type.to_string()).or_default() += 1;
        *by_stage.entry(op.stage).or_default() += 1;
        if op.operation.impact.is_destructive {
            destructive_count += 1;
        }
        worst_risk = worst_risk.max(op.operation.impact.risk);
        let slot = stage_max.entry(op.stage).or_default();
        *slot = (*slot).max(op.operation.impact.estimated_duration);
    }

    let estimated_duration = stage_max.values().sum();
    let stage_count = by_stage.len().max(1);
    let parallelization_factor = operations.len() as f64 / stage_count as f64;
    let requires_approval = destructive_count > 0 || worst_risk >= RiskLevel::High;

    PlanSummary {
        total_operations: operations.len(),
        by_type,
        by_stage,
        destructive_count,
        estimated_duration,
        worst_risk,
        parallelization_factor,
        requires_approval,
    }
}

/// Stable operation id: positional index plus identity for readability.
pub(crate) fn operation_id(index: usize, operation: &Operation) -> String {
    format!("op-{index}-{}", operation.identity)
}
