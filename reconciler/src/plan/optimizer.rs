//! Plan assembly
//!
//! Takes a diff result, drops NoChange markers, levels the DAG into stages,
//! assigns intra-stage priorities, and computes the summary.

use super::dag::{build_layout, DagError};
use super::{operation_id, summarize, Plan, PlannedOperation, OperationStatus};
use crate::diff::{DiffResult, Operation};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

/// Builds executable plans from diff results.
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    project_id: String,
}

impl PlanBuilder {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
        }
    }

    /// Assemble the plan. A diff with no mutations yields an empty plan.
    pub fn build(&self, diff: &DiffResult) -> Result<Plan, DagError> {
        let mutations: Vec<Operation> = diff.mutations().cloned().collect();
        let layout = build_layout(&mutations)?;

        let ids: Vec<String> = mutations
            .iter()
            .enumerate()
            .map(|(idx, op)| operation_id(idx, op))
            .collect();

        let mut operations: Vec<PlannedOperation> = mutations
            .into_iter()
            .enumerate()
            .map(|(idx, operation)| {
                let priority = priority_of(&operation);
                PlannedOperation {
                    id: ids[idx].clone(),
                    dependencies: layout.dependencies[idx]
                        .iter()
                        .map(|dep| ids[*dep].clone())
                        .collect(),
                    stage: layout.levels[idx],
                    priority,
                    status: OperationStatus::Pending,
                    operation,
                }
            })
            .collect();

        operations.sort_by(|a, b| {
            (a.stage, a.priority, a.id.as_str()).cmp(&(b.stage, b.priority, b.id.as_str()))
        });

        let summary = summarize(&operations);
        let plan = Plan {
            id: Uuid::new_v4().to_string(),
            project_id: self.project_id.clone(),
            created_at: Utc::now(),
            operations,
            summary,
        };
        info!(
            plan = %plan.id,
            project = %plan.project_id,
            operations = plan.summary.total_operations,
            stages = plan.stage_count(),
            destructive = plan.summary.destructive_count,
            risk = %plan.summary.worst_risk,
            "plan assembled"
        );
        Ok(plan)
    }
}

/// Intra-stage ordering: non-destructive work first, then by kind tier, with
/// risk as the tiebreaker. Lower runs first.
fn priority_of(operation: &Operation) -> u32 {
    let destructive = u32::from(operation.impact.is_destructive);
    let tier = u32::from(operation.kind().create_tier());
    let risk = operation.impact.risk as u32;
    destructive * 100 + tier * 10 + risk
}
