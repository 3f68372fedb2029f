//! Typed diff between desired and current state
//!
//! Produces per-resource operations (Create, Update, Delete, NoChange) with
//! per-field changes and an impact record derived from kind and operation
//! type. Semantic equality rules live in `fields`; the join logic in
//! `engine`.

mod engine;
mod fields;

pub use engine::{destruction_diff, DiffEngine, DiffError, DiffOptions, DiffResult};

use crate::model::{
    ClusterSpec, DatabaseRoleSpec, DatabaseUserSpec, NetworkAccessSpec, ProjectSpec, Resource,
    ResourceIdentity, ResourceKind,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// What the operation does to its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Create,
    Update,
    Delete,
    NoChange,
}

impl OperationType {
    /// Whether this operation mutates the remote service.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, OperationType::NoChange)
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationType::Create => write!(f, "create"),
            OperationType::Update => write!(f, "update"),
            OperationType::Delete => write!(f, "delete"),
            OperationType::NoChange => write!(f, "no-change"),
        }
    }
}

/// Risk classification carried on every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

/// One field-level difference between current and desired.
///
/// Secret fields carry the mask sentinel on both sides, never the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Wire-format field path, e.g. `diskSizeGB` or `autoscaling`.
    pub path: String,
    pub from: Value,
    pub to: Value,
}

impl FieldChange {
    pub fn new(path: impl Into<String>, from: Value, to: Value) -> Self {
        Self {
            path: path.into(),
            from,
            to,
        }
    }
}

/// Consequences of applying one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Impact {
    pub is_destructive: bool,
    pub requires_downtime: bool,
    /// Rough wall-clock estimate; feeds the plan duration summary.
    pub estimated_duration: Duration,
    pub risk: RiskLevel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Impact {
    /// Derive the impact record for a (kind, operation) pair.
    ///
    /// `warnings` carries anything the field comparison flagged as making
    /// the operation riskier than its baseline (tier downgrade, disk
    /// shrink); any warning present escalates an update to destructive High.
    pub fn derive(kind: ResourceKind, op: OperationType, warnings: Vec<String>) -> Self {
        let estimated_duration = operation_duration(kind, op);
        let (mut is_destructive, requires_downtime, mut risk) = match (kind, op) {
            (_, OperationType::NoChange) => (false, false, RiskLevel::Low),

            (ResourceKind::Cluster, OperationType::Create) => (false, false, RiskLevel::Medium),
            (ResourceKind::Cluster, OperationType::Update) => (false, false, RiskLevel::Medium),
            (ResourceKind::Cluster, OperationType::Delete) => (true, true, RiskLevel::High),

            (ResourceKind::Project, OperationType::Create) => (false, false, RiskLevel::Medium),
            (ResourceKind::Project, OperationType::Update) => (false, false, RiskLevel::Low),
            (ResourceKind::Project, OperationType::Delete) => (true, true, RiskLevel::Critical),

            (ResourceKind::DatabaseUser, OperationType::Delete) => {
                (true, false, RiskLevel::Medium)
            }
            (ResourceKind::DatabaseRole, OperationType::Delete) => {
                (true, false, RiskLevel::Medium)
            }
            (ResourceKind::NetworkAccess, OperationType::Delete) => {
                (true, false, RiskLevel::Low)
            }

            // Remaining create/update on users, roles, network entries.
            _ => (false, false, RiskLevel::Low),
        };

        if op == OperationType::Update && !warnings.is_empty() {
            is_destructive = true;
            risk = risk.max(RiskLevel::High);
        }

        Self {
            is_destructive,
            requires_downtime,
            estimated_duration,
            risk,
            warnings,
        }
    }
}

/// Duration estimate per kind and operation; mirrors the executor's
/// per-operation timeouts.
pub fn operation_duration(kind: ResourceKind, op: OperationType) -> Duration {
    if op == OperationType::NoChange {
        return Duration::ZERO;
    }
    match (kind, op) {
        (ResourceKind::Cluster, OperationType::Create) => Duration::from_secs(15 * 60),
        (ResourceKind::Cluster, _) => Duration::from_secs(10 * 60),
        (ResourceKind::Project, _) => Duration::from_secs(3 * 60),
        (ResourceKind::DatabaseUser, _) => Duration::from_secs(2 * 60),
        (ResourceKind::DatabaseRole, _) => Duration::from_secs(60),
        (ResourceKind::NetworkAccess, _) => Duration::from_secs(60),
    }
}

/// Current/desired payload the executor dispatches on. Which sides are
/// populated follows the operation type: Create carries desired, Delete
/// carries current, Update carries both.
#[derive(Debug, Clone)]
pub enum ResourcePayload {
    Project {
        current: Option<Resource<ProjectSpec>>,
        desired: Option<Resource<ProjectSpec>>,
    },
    Cluster {
        current: Option<Resource<ClusterSpec>>,
        desired: Option<Resource<ClusterSpec>>,
    },
    DatabaseUser {
        current: Option<Resource<DatabaseUserSpec>>,
        desired: Option<Resource<DatabaseUserSpec>>,
    },
    DatabaseRole {
        current: Option<Resource<DatabaseRoleSpec>>,
        desired: Option<Resource<DatabaseRoleSpec>>,
    },
    NetworkAccess {
        current: Option<Resource<NetworkAccessSpec>>,
        desired: Option<Resource<NetworkAccessSpec>>,
    },
}

/// One planned mutation (or no-change marker) of a single resource.
#[derive(Debug, Clone)]
pub struct Operation {
    pub identity: ResourceIdentity,
    pub op_type: OperationType,
    pub field_changes: Vec<FieldChange>,
    pub impact: Impact,
    pub payload: ResourcePayload,
}

impl Operation {
    pub fn kind(&self) -> ResourceKind {
        self.identity.kind()
    }

    /// `dependsOn` references declared on the desired resource, if any.
    pub fn desired_depends_on(&self) -> &[crate::model::ResourceRef] {
        let metadata = match &self.payload {
            ResourcePayload::Project { desired, .. } => desired.as_ref().map(|r| &r.metadata),
            ResourcePayload::Cluster { desired, .. } => desired.as_ref().map(|r| &r.metadata),
            ResourcePayload::DatabaseUser { desired, .. } => desired.as_ref().map(|r| &r.metadata),
            ResourcePayload::DatabaseRole { desired, .. } => desired.as_ref().map(|r| &r.metadata),
            ResourcePayload::NetworkAccess { desired, .. } => {
                desired.as_ref().map(|r| &r.metadata)
            }
        };
        metadata.map(|m| m.depends_on.as_slice()).unwrap_or(&[])
    }

    /// Cluster names the desired resource references by identity (user
    /// scopes). Used by the DAG builder for implicit edges.
    pub fn referenced_clusters(&self) -> Vec<String> {
        match &self.payload {
            ResourcePayload::DatabaseUser {
                desired: Some(user),
                ..
            } => user.spec.cluster_scopes().map(str::to_string).collect(),
            _ => Vec::new(),
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.op_type, self.identity)
    }
}

/// Note about a resource the diff deliberately left alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Advisory {
    pub identity: ResourceIdentity,
    pub note: String,
}
