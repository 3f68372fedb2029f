//! Dry-run evaluation
//!
//! Shares planning with real execution but replaces handler dispatch with a
//! simulator. Three depths: Quick lists the operations, Thorough adds
//! static checks against current state, Detailed adds the per-operation
//! duration/risk breakdown.

use crate::diff::{OperationType, RiskLevel};
use crate::model::{ProjectState, ResourceIdentity};
use crate::plan::{Plan, PlanSummary};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Simulation depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DryRunMode {
    Quick,
    Thorough,
    Detailed,
}

impl DryRunMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "quick" => Some(DryRunMode::Quick),
            "thorough" => Some(DryRunMode::Thorough),
            "detailed" => Some(DryRunMode::Detailed),
            _ => None,
        }
    }
}

impl std::fmt::Display for DryRunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DryRunMode::Quick => write!(f, "quick"),
            DryRunMode::Thorough => write!(f, "thorough"),
            DryRunMode::Detailed => write!(f, "detailed"),
        }
    }
}

/// One operation as it would run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedOperation {
    pub id: String,
    pub identity: ResourceIdentity,
    #[serde(rename = "type")]
    pub op_type: OperationType,
    pub stage: usize,
    /// Populated in Detailed mode only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskLevel>,
}

/// A static check that would block or complicate the apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DryRunFinding {
    pub identity: ResourceIdentity,
    /// True when the service would reject the operation outright.
    pub blocking: bool,
    pub message: String,
}

/// The simulation output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DryRunReport {
    pub mode: DryRunMode,
    pub operations: Vec<SimulatedOperation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<DryRunFinding>,
    pub summary: PlanSummary,
}

impl DryRunReport {
    pub fn has_blocking_findings(&self) -> bool {
        self.findings.iter().any(|f| f.blocking)
    }
}

/// Simulates a plan without service calls.
#[derive(Debug, Clone)]
pub struct DryRunEvaluator {
    mode: DryRunMode,
}

impl DryRunEvaluator {
    pub fn new(mode: DryRunMode) -> Self {
        Self { mode }
    }

    /// Evaluate the plan against the states it was computed from.
    pub fn evaluate(
        &self,
        plan: &Plan,
        desired: &ProjectState,
        current: &ProjectState,
    ) -> DryRunReport {
        let detailed = self.mode == DryRunMode::Detailed;
        let operations = plan
            .operations
            .iter()
            .map(|op| SimulatedOperation {
                id: op.id.clone(),
                identity: op.operation.identity.clone(),
                op_type: op.operation.op_type,
                stage: op.stage,
                estimated_duration: detailed.then_some(op.operation.impact.estimated_duration),
                risk: detailed.then_some(op.operation.impact.risk),
            })
            .collect();

        let findings = if self.mode == DryRunMode::Quick {
            Vec::new()
        } else {
            self.static_findings(plan, desired, current)
        };

        debug!(
            mode = %self.mode,
            operations = plan.operations.len(),
            findings = findings.len(),
            "dry-run evaluated"
        );
        DryRunReport {
            mode: self.mode,
            operations,
            findings,
            summary: plan.summary.clone(),
        }
    }

    /// Thorough-mode static checks against the current state.
    fn static_findings(
        &self,
        plan: &Plan,
        desired: &ProjectState,
        current: &ProjectState,
    ) -> Vec<DryRunFinding> {
        let mut findings = Vec::new();

        for op in &plan.operations {
            // Impact warnings carry downgrade/shrink detections from the
            // field comparison; surface them as blocking findings.
            for warning in &op.operation.impact.warnings {
                let blocking = warning.contains("downgrade") || warning.contains("reduction");
                findings.push(DryRunFinding {
                    identity: op.operation.identity.clone(),
                    blocking,
                    message: if blocking {
                        format!("{warning}: the service rejects in-place size reduction")
                    } else {
                        warning.clone()
                    },
                });
            }

            // Deleting a cluster that desired users still scope to.
            if op.operation.op_type == OperationType::Delete {
                if let ResourceIdentity::Cluster { name } = &op.operation.identity {
                    let still_scoped: Vec<&str> = desired
                        .users
                        .iter()
                        .filter(|u| u.spec.cluster_scopes().any(|s| s == name.as_str()))
                        .map(|u| u.spec.username.as_str())
                        .collect();
                    if !still_scoped.is_empty() {
                        findings.push(DryRunFinding {
                            identity: op.operation.identity.clone(),
                            blocking: true,
                            message: format!(
                                "cluster `{name}` is deleted while desired users [{}] still scope to it",
                                still_scoped.join(", ")
                            ),
                        });
                    }
                }
            }
        }

        // Paused clusters cannot take spec updates.
        for op in &plan.operations {
            if op.operation.op_type == OperationType::Update {
                if let ResourceIdentity::Cluster { name } = &op.operation.identity {
                    if current.cluster(name).is_some_and(|c| c.spec.paused)
                        && !desired.cluster(name).is_some_and(|c| c.spec.paused)
                    {
                        continue; // unpausing is exactly what the update does
                    }
                    if current.cluster(name).is_some_and(|c| c.spec.paused) {
                        findings.push(DryRunFinding {
                            identity: op.operation.identity.clone(),
                            blocking: true,
                            message: format!("cluster `{name}` is paused; resume before updating"),
                        });
                    }
                }
            }
        }

        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{DiffEngine, DiffOptions};
    use crate::model::{ClusterSpec, InstanceSize, Resource, ResourceMetadata};
    use crate::plan::PlanBuilder;

    fn cluster(name: &str, size: InstanceSize) -> Resource<ClusterSpec> {
        let mut c = Resource::new(
            ResourceMetadata::named(name),
            ClusterSpec {
                region: "US_EAST_1".to_string(),
                instance_size: size,
                ..Default::default()
            },
        );
        c.normalize();
        c
    }

    fn downgrade_plan() -> (Plan, ProjectState, ProjectState) {
        let mut desired = ProjectState::default();
        desired.clusters.push(cluster("c0", InstanceSize::M10));
        let mut current = ProjectState::default();
        current.clusters.push(cluster("c0", InstanceSize::M30));
        let diff = DiffEngine::new(DiffOptions::default())
            .diff(&desired, &current)
            .unwrap();
        let plan = PlanBuilder::new("p").build(&diff).unwrap();
        (plan, desired, current)
    }

    #[test]
    fn test_quick_lists_operations_without_findings() {
        let (plan, desired, current) = downgrade_plan();
        let report = DryRunEvaluator::new(DryRunMode::Quick).evaluate(&plan, &desired, &current);
        assert_eq!(report.operations.len(), 1);
        assert!(report.findings.is_empty());
        assert!(report.operations[0].estimated_duration.is_none());
    }

    #[test]
    fn test_thorough_blocks_downgrade() {
        let (plan, desired, current) = downgrade_plan();
        let report =
            DryRunEvaluator::new(DryRunMode::Thorough).evaluate(&plan, &desired, &current);
        assert!(report.has_blocking_findings());
        assert!(report.findings[0].message.contains("downgrade"));
        // Thorough still does not include the per-op breakdown.
        assert!(report.operations[0].risk.is_none());
    }

    #[test]
    fn test_detailed_includes_breakdown() {
        let (plan, desired, current) = downgrade_plan();
        let report =
            DryRunEvaluator::new(DryRunMode::Detailed).evaluate(&plan, &desired, &current);
        assert!(report.operations[0].estimated_duration.is_some());
        assert!(report.operations[0].risk.is_some());
        assert!(report.has_blocking_findings());
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(DryRunMode::parse("quick"), Some(DryRunMode::Quick));
        assert_eq!(DryRunMode::parse("detailed"), Some(DryRunMode::Detailed));
        assert_eq!(DryRunMode::parse("maximal"), None);
    }
}
