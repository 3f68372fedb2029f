//! Semantic field comparison
//!
//! Field-by-field compare per kind, with the semantic equality rules:
//! sequences whose order is not significant compare as multisets, defaults
//! are already folded in by normalization upstream, and passwords compare
//! by presence only.

use super::FieldChange;
use crate::model::{
    ClusterSpec, DatabaseRoleSpec, DatabaseUserSpec, NetworkAccessSpec, ProjectSpec,
    SECRET_SENTINEL,
};
use serde::Serialize;
use serde_json::{json, Value};

/// Best-effort JSON projection for change reporting.
fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Order-insensitive equality: compare as multisets of canonical encodings.
fn multiset_eq<T: Serialize>(a: &[T], b: &[T]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let canonical = |items: &[T]| -> Vec<String> {
        let mut keys: Vec<String> = items
            .iter()
            .map(|item| to_value(item).to_string())
            .collect();
        keys.sort();
        keys
    };
    canonical(a) == canonical(b)
}

fn push_if_changed<T: Serialize + PartialEq>(
    changes: &mut Vec<FieldChange>,
    path: &str,
    current: &T,
    desired: &T,
) {
    if current != desired {
        changes.push(FieldChange::new(path, to_value(current), to_value(desired)));
    }
}

/// Compare two cluster specs. Returns (field changes, risk warnings).
pub(super) fn cluster_changes(
    current: &ClusterSpec,
    desired: &ClusterSpec,
) -> (Vec<FieldChange>, Vec<String>) {
    let mut changes = Vec::new();
    let mut warnings = Vec::new();

    push_if_changed(&mut changes, "provider", &current.provider, &desired.provider);
    push_if_changed(&mut changes, "region", &current.region, &desired.region);

    if current.instance_size != desired.instance_size {
        changes.push(FieldChange::new(
            "instanceSize",
            to_value(&current.instance_size),
            to_value(&desired.instance_size),
        ));
        if desired.instance_size < current.instance_size {
            warnings.push(format!(
                "instance size downgrade {} -> {}",
                current.instance_size, desired.instance_size
            ));
        }
    }

    if current.disk_size_gb != desired.disk_size_gb {
        changes.push(FieldChange::new(
            "diskSizeGB",
            to_value(&current.disk_size_gb),
            to_value(&desired.disk_size_gb),
        ));
        if let (Some(from), Some(to)) = (current.disk_size_gb, desired.disk_size_gb) {
            if to < from {
                warnings.push(format!("disk size reduction {from}GB -> {to}GB"));
            }
        }
    }

    push_if_changed(
        &mut changes,
        "mongodbVersion",
        &current.mongodb_version,
        &desired.mongodb_version,
    );

    if !multiset_eq(&current.replication_specs, &desired.replication_specs) {
        changes.push(FieldChange::new(
            "replicationSpecs",
            to_value(&current.replication_specs),
            to_value(&desired.replication_specs),
        ));
    }

    push_if_changed(
        &mut changes,
        "autoscaling",
        &current.autoscaling,
        &desired.autoscaling,
    );
    push_if_changed(
        &mut changes,
        "backupEnabled",
        &current.backup_enabled,
        &desired.backup_enabled,
    );
    push_if_changed(
        &mut changes,
        "biConnector",
        &current.bi_connector,
        &desired.bi_connector,
    );
    push_if_changed(
        &mut changes,
        "encryptionAtRest",
        &current.encryption_at_rest,
        &desired.encryption_at_rest,
    );
    push_if_changed(&mut changes, "paused", &current.paused, &desired.paused);
    push_if_changed(&mut changes, "tags", &current.tags, &desired.tags);

    (changes, warnings)
}

/// Compare two user specs. Passwords compare by presence: a populated desired
/// password always produces a masked `password` change, because the service
/// never echoes password material back for comparison.
pub(super) fn user_changes(
    current: &DatabaseUserSpec,
    desired: &DatabaseUserSpec,
) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    if desired.password.is_some() {
        changes.push(FieldChange::new(
            "password",
            json!(SECRET_SENTINEL),
            json!(SECRET_SENTINEL),
        ));
    }

    if !multiset_eq(&current.roles, &desired.roles) {
        changes.push(FieldChange::new(
            "roles",
            to_value(&current.roles),
            to_value(&desired.roles),
        ));
    }

    if !multiset_eq(&current.scopes, &desired.scopes) {
        changes.push(FieldChange::new(
            "scopes",
            to_value(&current.scopes),
            to_value(&desired.scopes),
        ));
    }

    changes
}

pub(super) fn role_changes(
    current: &DatabaseRoleSpec,
    desired: &DatabaseRoleSpec,
) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    if !multiset_eq(&current.privileges, &desired.privileges) {
        changes.push(FieldChange::new(
            "privileges",
            to_value(&current.privileges),
            to_value(&desired.privileges),
        ));
    }

    if !multiset_eq(&current.inherited_roles, &desired.inherited_roles) {
        changes.push(FieldChange::new(
            "inheritedRoles",
            to_value(&current.inherited_roles),
            to_value(&desired.inherited_roles),
        ));
    }

    changes
}

/// Compare network entries. The expiry timestamp participates only when
/// `compare_timestamps` is set (callers opt in via `--detailed`).
pub(super) fn network_changes(
    current: &NetworkAccessSpec,
    desired: &NetworkAccessSpec,
    compare_timestamps: bool,
) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    push_if_changed(&mut changes, "comment", &current.comment, &desired.comment);

    if compare_timestamps {
        push_if_changed(
            &mut changes,
            "deleteAfter",
            &current.delete_after,
            &desired.delete_after,
        );
    }

    changes
}

pub(super) fn project_changes(current: &ProjectSpec, desired: &ProjectSpec) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    push_if_changed(&mut changes, "tags", &current.tags, &desired.tags);
    changes
}
