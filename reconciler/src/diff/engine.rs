//! Diff engine
//!
//! Joins desired and current state by identity, kind by kind, and emits the
//! ordered operation sequence. `preserveExisting` suppresses Delete and turns
//! unexpected currents into advisory NoChange entries.

use super::{fields, Advisory, Impact, Operation, OperationType, ResourcePayload};
use crate::model::{
    ProjectState, Resource, ResourceIdentity, ResourceKind, ResourceSpec,
};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Flags controlling diff semantics.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions {
    /// Never emit Delete; unexpected currents become advisories.
    pub preserve_existing: bool,
    /// Treat timestamps (network entry expiry) as significant.
    pub compare_timestamps: bool,
}

/// Diff-level failures. Field comparison itself cannot fail; these are
/// consistency violations between the two states.
#[derive(Debug, Clone, Error)]
pub enum DiffError {
    #[error("organization mismatch: manifests declare `{declared}` but the project belongs to `{remote}`")]
    OrganizationMismatch { declared: String, remote: String },
}

/// Diff output: the ordered operations plus advisories about resources that
/// were deliberately left alone.
#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    pub operations: Vec<Operation>,
    pub advisories: Vec<Advisory>,
}

impl DiffResult {
    /// Operations that actually mutate the service.
    pub fn mutations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter().filter(|op| op.op_type.is_mutation())
    }

    pub fn count_of(&self, op_type: OperationType) -> usize {
        self.operations
            .iter()
            .filter(|op| op.op_type == op_type)
            .count()
    }
}

/// Computes operations from a (desired, current) state pair.
#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    options: DiffOptions,
}

impl DiffEngine {
    pub fn new(options: DiffOptions) -> Self {
        Self { options }
    }

    /// Compute the full diff. Both states must already be normalized (the
    /// merger and discovery guarantee this).
    pub fn diff(
        &self,
        desired: &ProjectState,
        current: &ProjectState,
    ) -> Result<DiffResult, DiffError> {
        self.check_organization(desired, current)?;

        let mut result = DiffResult::default();

        self.diff_project(desired, current, &mut result);
        self.diff_kind(
            &desired.network_entries,
            &current.network_entries,
            &mut result,
            |current, desired| {
                (
                    fields::network_changes(current, desired, self.options.compare_timestamps),
                    Vec::new(),
                )
            },
            |current, desired| ResourcePayload::NetworkAccess { current, desired },
        );
        self.diff_kind(
            &desired.roles,
            &current.roles,
            &mut result,
            |current, desired| (fields::role_changes(current, desired), Vec::new()),
            |current, desired| ResourcePayload::DatabaseRole { current, desired },
        );
        self.diff_kind(
            &desired.clusters,
            &current.clusters,
            &mut result,
            fields::cluster_changes,
            |current, desired| ResourcePayload::Cluster { current, desired },
        );
        self.diff_kind(
            &desired.users,
            &current.users,
            &mut result,
            |current, desired| (fields::user_changes(current, desired), Vec::new()),
            |current, desired| ResourcePayload::DatabaseUser { current, desired },
        );

        debug!(
            creates = result.count_of(OperationType::Create),
            updates = result.count_of(OperationType::Update),
            deletes = result.count_of(OperationType::Delete),
            unchanged = result.count_of(OperationType::NoChange),
            advisories = result.advisories.len(),
            "diff computed"
        );
        Ok(result)
    }

    /// The project resource diffs like any other kind but is a singleton and
    /// is never deleted by reconciliation.
    fn diff_project(
        &self,
        desired: &ProjectState,
        current: &ProjectState,
        result: &mut DiffResult,
    ) {
        match (&desired.project, &current.project) {
            (Some(want), Some(have)) => {
                let changes = fields::project_changes(&have.spec, &want.spec);
                let op_type = if changes.is_empty() {
                    OperationType::NoChange
                } else {
                    OperationType::Update
                };
                result.operations.push(Operation {
                    identity: want.identity(),
                    op_type,
                    impact: Impact::derive(ResourceKind::Project, op_type, Vec::new()),
                    field_changes: changes,
                    payload: ResourcePayload::Project {
                        current: Some(have.clone()),
                        desired: Some(want.clone()),
                    },
                });
            }
            (Some(want), None) => {
                result.operations.push(Operation {
                    identity: want.identity(),
                    op_type: OperationType::Create,
                    impact: Impact::derive(ResourceKind::Project, OperationType::Create, Vec::new()),
                    field_changes: Vec::new(),
                    payload: ResourcePayload::Project {
                        current: None,
                        desired: Some(want.clone()),
                    },
                });
            }
            // A remote project with no desired counterpart is the normal
            // update-in-place case; destruction of projects is a separate,
            // explicit flow.
            (None, _) => {}
        }
    }

    fn diff_kind<S, C, P>(
        &self,
        desired: &[Resource<S>],
        current: &[Resource<S>],
        result: &mut DiffResult,
        compare: C,
        payload: P,
    ) where
        S: ResourceSpec + Clone,
        C: Fn(&S, &S) -> (Vec<super::FieldChange>, Vec<String>),
        P: Fn(Option<Resource<S>>, Option<Resource<S>>) -> ResourcePayload,
    {
        let mut current_by_identity: HashMap<ResourceIdentity, &Resource<S>> =
            current.iter().map(|r| (r.identity(), r)).collect();

        for want in desired {
            let identity = want.identity();
            match current_by_identity.remove(&identity) {
                Some(have) => {
                    let (changes, warnings) = compare(&have.spec, &want.spec);
                    let op_type = if changes.is_empty() {
                        OperationType::NoChange
                    } else {
                        OperationType::Update
                    };
                    result.operations.push(Operation {
                        identity,
                        op_type,
                        impact: Impact::derive(S::KIND, op_type, warnings),
                        field_changes: changes,
                        payload: payload(Some(have.clone()), Some(want.clone())),
                    });
                }
                None => {
                    result.operations.push(Operation {
                        identity,
                        op_type: OperationType::Create,
                        impact: Impact::derive(S::KIND, OperationType::Create, Vec::new()),
                        field_changes: Vec::new(),
                        payload: payload(None, Some(want.clone())),
                    });
                }
            }
        }

        // Currents with no desired counterpart, in stable input order.
        for have in current {
            let identity = have.identity();
            if !current_by_identity.contains_key(&identity) {
                continue;
            }
            if self.options.preserve_existing {
                result.advisories.push(Advisory {
                    identity: identity.clone(),
                    note: "exists remotely but is not declared; preserved (preserveExisting)"
                        .to_string(),
                });
                result.operations.push(Operation {
                    identity,
                    op_type: OperationType::NoChange,
                    impact: Impact::derive(S::KIND, OperationType::NoChange, Vec::new()),
                    field_changes: Vec::new(),
                    payload: payload(Some(have.clone()), None),
                });
            } else {
                result.operations.push(Operation {
                    identity,
                    op_type: OperationType::Delete,
                    impact: Impact::derive(S::KIND, OperationType::Delete, Vec::new()),
                    field_changes: Vec::new(),
                    payload: payload(Some(have.clone()), None),
                });
            }
        }
    }

    fn check_organization(
        &self,
        desired: &ProjectState,
        current: &ProjectState,
    ) -> Result<(), DiffError> {
        let declared = desired
            .project
            .as_ref()
            .and_then(|p| p.spec.organization_id.as_deref());
        let remote = current
            .project
            .as_ref()
            .and_then(|p| p.spec.organization_id.as_deref());
        if let (Some(declared), Some(remote)) = (declared, remote) {
            if declared != remote {
                return Err(DiffError::OrganizationMismatch {
                    declared: declared.to_string(),
                    remote: remote.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Build the deletion diff used by destroy flows: every current resource
/// becomes a Delete operation, honoring Retain deletion policies.
pub fn destruction_diff(current: &ProjectState) -> DiffResult {
    let empty = ProjectState::default();
    let engine = DiffEngine::new(DiffOptions::default());
    // Diffing empty-desired against current yields exactly the Deletes.
    let mut result = engine
        .diff(&empty, current)
        .unwrap_or_else(|_| DiffResult::default());

    // Deletion policies: retained resources downgrade to advisories.
    let mut kept = Vec::with_capacity(result.operations.len());
    for op in result.operations.drain(..) {
        let retain = matches!(
            &op.payload,
            ResourcePayload::Cluster { current: Some(r), .. } if r.metadata.deletion_policy == crate::model::DeletionPolicy::Retain
        ) || matches!(
            &op.payload,
            ResourcePayload::DatabaseUser { current: Some(r), .. } if r.metadata.deletion_policy == crate::model::DeletionPolicy::Retain
        ) || matches!(
            &op.payload,
            ResourcePayload::DatabaseRole { current: Some(r), .. } if r.metadata.deletion_policy == crate::model::DeletionPolicy::Retain
        ) || matches!(
            &op.payload,
            ResourcePayload::NetworkAccess { current: Some(r), .. } if r.metadata.deletion_policy == crate::model::DeletionPolicy::Retain
        );
        if retain && op.op_type == OperationType::Delete {
            result.advisories.push(Advisory {
                identity: op.identity.clone(),
                note: "deletion policy Retain: left in place by destroy".to_string(),
            });
        } else {
            kept.push(op);
        }
    }
    result.operations = kept;
    result
}
