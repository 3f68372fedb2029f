//! Plan artifact
//!
//! The externally persisted projection of a plan, used by the plan/diff
//! subcommands and by later apply-a-saved-plan flows. The shape is a
//! contract: JSON and YAML encodings round-trip losslessly. Resource specs
//! (and therefore secrets) never appear here.

use super::{OperationStatus, Plan, PlanSummary};
use crate::diff::{Impact, OperationType};
use crate::model::{ResourceIdentity, ResourceKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bumped only on incompatible shape changes.
pub const PLAN_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Error)]
pub enum ArtifactError {
    #[error("failed to encode plan artifact: {0}")]
    Encode(String),

    #[error("failed to decode plan artifact: {0}")]
    Decode(String),

    #[error("unsupported plan format version {found} (supported: {PLAN_FORMAT_VERSION})")]
    UnsupportedVersion { found: u32 },
}

/// One operation as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactOperation {
    pub id: String,
    pub kind: ResourceKind,
    pub identity: ResourceIdentity,
    #[serde(rename = "type")]
    pub op_type: OperationType,
    pub impact: Impact,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    pub stage: usize,
    pub status: OperationStatus,
}

/// The persisted plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanArtifact {
    pub format_version: u32,
    pub id: String,
    pub project_id: String,
    pub created_at: DateTime<Utc>,
    pub operations: Vec<ArtifactOperation>,
    pub summary: PlanSummary,
}

impl PlanArtifact {
    pub fn from_plan(plan: &Plan) -> Self {
        Self {
            format_version: PLAN_FORMAT_VERSION,
            id: plan.id.clone(),
            project_id: plan.project_id.clone(),
            created_at: plan.created_at,
            operations: plan
                .operations
                .iter()
                .map(|op| ArtifactOperation {
                    id: op.id.clone(),
                    kind: op.operation.kind(),
                    identity: op.operation.identity.clone(),
                    op_type: op.operation.op_type,
                    impact: op.operation.impact.clone(),
                    dependencies: op.dependencies.clone(),
                    stage: op.stage,
                    status: op.status,
                })
                .collect(),
            summary: plan.summary.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, ArtifactError> {
        serde_json::to_string_pretty(self).map_err(|e| ArtifactError::Encode(e.to_string()))
    }

    pub fn from_json(input: &str) -> Result<Self, ArtifactError> {
        let artifact: Self =
            serde_json::from_str(input).map_err(|e| ArtifactError::Decode(e.to_string()))?;
        artifact.check_version()
    }

    pub fn to_yaml(&self) -> Result<String, ArtifactError> {
        serde_yaml::to_string(self).map_err(|e| ArtifactError::Encode(e.to_string()))
    }

    pub fn from_yaml(input: &str) -> Result<Self, ArtifactError> {
        let artifact: Self =
            serde_yaml::from_str(input).map_err(|e| ArtifactError::Decode(e.to_string()))?;
        artifact.check_version()
    }

    fn check_version(self) -> Result<Self, ArtifactError> {
        if self.format_version != PLAN_FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedVersion {
                found: self.format_version,
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{DiffEngine, destruction_diff};
    use crate::model::{
        ClusterSpec, DatabaseUserSpec, ProjectState, Resource, ResourceMetadata, SecretString,
    };
    use crate::plan::PlanBuilder;

    fn sample_plan() -> Plan {
        let mut desired = ProjectState::default();
        desired.clusters.push(Resource::new(
            ResourceMetadata::named("c0"),
            ClusterSpec {
                region: "US_EAST_1".to_string(),
                ..Default::default()
            },
        ));
        desired.users.push(Resource::new(
            ResourceMetadata::named("app"),
            DatabaseUserSpec {
                username: "app".to_string(),
                password: Some(SecretString::new("super-secret-pw")),
                ..Default::default()
            },
        ));
        desired.normalize();
        let diff = DiffEngine::default()
            .diff(&desired, &ProjectState::default())
            .unwrap();
        PlanBuilder::new("5f2a9c0b8e1d4a3b2c1d0e9f")
            .build(&diff)
            .unwrap()
    }

    #[test]
    fn test_json_round_trip_is_lossless() {
        let artifact = sample_plan().to_artifact();
        let encoded = artifact.to_json().unwrap();
        let decoded = PlanArtifact::from_json(&encoded).unwrap();
        assert_eq!(artifact, decoded);
    }

    #[test]
    fn test_yaml_round_trip_is_lossless() {
        let artifact = sample_plan().to_artifact();
        let encoded = artifact.to_yaml().unwrap();
        let decoded = PlanArtifact::from_yaml(&encoded).unwrap();
        assert_eq!(artifact, decoded);
    }

    #[test]
    fn test_file_round_trip_for_saved_plans() {
        // The plan/diff subcommands persist artifacts to disk; a saved file
        // must reload identically.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        let artifact = sample_plan().to_artifact();
        std::fs::write(&path, artifact.to_json().unwrap()).unwrap();
        let reloaded =
            PlanArtifact::from_json(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(artifact, reloaded);
    }

    #[test]
    fn test_cross_format_round_trip() {
        let artifact = sample_plan().to_artifact();
        let via_yaml = PlanArtifact::from_yaml(&artifact.to_yaml().unwrap()).unwrap();
        let via_json = PlanArtifact::from_json(&via_yaml.to_json().unwrap()).unwrap();
        assert_eq!(artifact, via_json);
    }

    #[test]
    fn test_artifact_contains_no_secret() {
        let encoded = sample_plan().to_artifact().to_json().unwrap();
        assert!(!encoded.contains("super-secret-pw"));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut artifact = sample_plan().to_artifact();
        artifact.format_version = 99;
        let encoded = artifact.to_json().unwrap();
        let err = PlanArtifact::from_json(&encoded).unwrap_err();
        assert!(matches!(
            err,
            ArtifactError::UnsupportedVersion { found: 99 }
        ));
    }

    #[test]
    fn test_artifact_preserves_schedule_fields() {
        let plan = {
            let mut current = ProjectState::default();
            current.clusters.push(Resource::new(
                ResourceMetadata::named("c0"),
                ClusterSpec::default(),
            ));
            current.users.push(Resource::new(
                ResourceMetadata::named("app"),
                DatabaseUserSpec {
                    username: "app".to_string(),
                    ..Default::default()
                },
            ));
            current.normalize();
            PlanBuilder::new("p").build(&destruction_diff(&current)).unwrap()
        };
        let artifact = plan.to_artifact();
        assert_eq!(artifact.operations.len(), plan.operations.len());
        for (a, p) in artifact.operations.iter().zip(&plan.operations) {
            assert_eq!(a.stage, p.stage);
            assert_eq!(a.dependencies, p.dependencies);
            assert_eq!(a.status, OperationStatus::Pending);
        }
        assert!(artifact.summary.requires_approval);
    }
}
