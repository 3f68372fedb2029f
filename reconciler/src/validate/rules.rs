//! Per-resource and cross-resource validation rules

use super::{Issue, IssueCode};
use crate::model::{
    is_built_in_role, ProjectState, Resource, ResourceIdentity, ResourceMetadata, ResourceSpec,
};
use chrono::Utc;
use regex::Regex;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::OnceLock;

/// Names for projects and clusters: alphanumeric start, then alphanumerics
/// and dashes, max 64 chars.
fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9-]{0,63}$").expect("static pattern"))
}

fn check_name(path: &str, name: &str, issues: &mut Vec<Issue>) {
    if !name_pattern().is_match(name) {
        issues.push(
            Issue::error(
                IssueCode::NameInvalid,
                path,
                format!("name `{name}` must match {}", name_pattern().as_str()),
            )
            .with_field("metadata.name"),
        );
    }
}

pub(super) fn check_project(desired: &ProjectState, issues: &mut Vec<Issue>) {
    let Some(project) = &desired.project else {
        return;
    };
    let path = project.identity().to_string();
    check_name(&path, &project.metadata.name, issues);

    if project.spec.organization_id.is_none() {
        issues.push(
            Issue::warning(
                IssueCode::OrgIdMissing,
                &path,
                "organizationId is required to create the project; updates resolve it remotely",
            )
            .with_field("organizationId"),
        );
    }
}

pub(super) fn check_clusters(desired: &ProjectState, issues: &mut Vec<Issue>) {
    for cluster in &desired.clusters {
        let path = cluster.identity().to_string();
        check_name(&path, &cluster.metadata.name, issues);

        if cluster.spec.region.is_empty() {
            issues.push(
                Issue::error(IssueCode::RegionMissing, &path, "cluster region is required")
                    .with_field("region"),
            );
        }

        if let Some(disk) = cluster.spec.disk_size_gb {
            if !(10.0..=4096.0).contains(&disk) {
                issues.push(
                    Issue::error(
                        IssueCode::DiskSizeOutOfRange,
                        &path,
                        format!("diskSizeGB {disk} outside supported range 10..=4096"),
                    )
                    .with_field("diskSizeGB"),
                );
            }
        }

        if let Some(autoscaling) = &cluster.spec.autoscaling {
            if let (Some(min), Some(max)) = (
                autoscaling.min_instance_size,
                autoscaling.max_instance_size,
            ) {
                if min > max {
                    issues.push(
                        Issue::error(
                            IssueCode::AutoscalingRange,
                            &path,
                            format!("autoscaling min {min} exceeds max {max}"),
                        )
                        .with_field("autoscaling"),
                    );
                }
            }
        }

        if cluster.spec.electable_nodes() == 0 {
            issues.push(
                Issue::error(
                    IssueCode::ReplicationTopology,
                    &path,
                    "replication specs must provide at least one electable node",
                )
                .with_field("replicationSpecs"),
            );
        }

        if let Some(bi) = &cluster.spec.bi_connector {
            if let Some(pref) = &bi.read_preference {
                if !matches!(pref.as_str(), "primary" | "secondary" | "analytics") {
                    issues.push(
                        Issue::error(
                            IssueCode::BiConnectorReadPreference,
                            &path,
                            format!(
                                "biConnector readPreference `{pref}` must be primary, secondary, or analytics"
                            ),
                        )
                        .with_field("biConnector.readPreference"),
                    );
                }
            }
        }
    }
}

pub(super) fn check_users(desired: &ProjectState, issues: &mut Vec<Issue>) {
    for user in &desired.users {
        let path = user.identity().to_string();

        if user.spec.username.is_empty() || user.spec.username.contains(char::is_whitespace) {
            issues.push(
                Issue::error(
                    IssueCode::NameInvalid,
                    &path,
                    "username must be non-empty without whitespace",
                )
                .with_field("username"),
            );
        }

        if user.spec.roles.is_empty() {
            issues.push(
                Issue::warning(
                    IssueCode::RolesEmpty,
                    &path,
                    "user has no role assignments and cannot access any database",
                )
                .with_field("roles"),
            );
        }

        for assignment in &user.spec.roles {
            let known = is_built_in_role(&assignment.role_name)
                || desired
                    .role(&assignment.role_name, &assignment.database_name)
                    .is_some()
                // Custom roles grant across databases by name.
                || desired
                    .roles
                    .iter()
                    .any(|r| r.spec.role_name == assignment.role_name);
            if !known {
                issues.push(
                    Issue::error(
                        IssueCode::RoleUnresolved,
                        &path,
                        format!(
                            "role `{assignment}` is neither built-in nor declared in this project"
                        ),
                    )
                    .with_field("roles"),
                );
            }
        }

        for scope in user.spec.cluster_scopes() {
            if desired.cluster(scope).is_none() {
                issues.push(
                    Issue::warning(
                        IssueCode::ScopeUnresolved,
                        &path,
                        format!(
                            "cluster scope `{scope}` does not resolve in the desired state; treating it as external"
                        ),
                    )
                    .with_field("scopes"),
                );
            }
        }
    }
}

pub(super) fn check_roles(desired: &ProjectState, issues: &mut Vec<Issue>) {
    for role in &desired.roles {
        let path = role.identity().to_string();

        if role.spec.role_name.is_empty() || role.spec.database_name.is_empty() {
            issues.push(Issue::error(
                IssueCode::NameInvalid,
                &path,
                "roleName and databaseName are required",
            ));
            continue;
        }

        if is_built_in_role(&role.spec.role_name) {
            issues.push(
                Issue::warning(
                    IssueCode::RoleShadowsBuiltIn,
                    &path,
                    format!(
                        "custom role `{}` shadows a built-in role of the same name",
                        role.spec.role_name
                    ),
                )
                .with_field("roleName"),
            );
        }

        for (idx, privilege) in role.spec.privileges.iter().enumerate() {
            if privilege.actions.is_empty() {
                issues.push(
                    Issue::error(
                        IssueCode::PrivilegeActionsEmpty,
                        &path,
                        format!("privilege #{idx} grants no actions"),
                    )
                    .with_field("privileges"),
                );
            }
        }

        for inherited in &role.spec.inherited_roles {
            let known = is_built_in_role(&inherited.role_name)
                || desired
                    .role(&inherited.role_name, &inherited.database_name)
                    .is_some();
            if !known {
                issues.push(
                    Issue::error(
                        IssueCode::RoleUnresolved,
                        &path,
                        format!(
                            "inherited role `{}@{}` is neither built-in nor declared",
                            inherited.role_name, inherited.database_name
                        ),
                    )
                    .with_field("inheritedRoles"),
                );
            }
        }
    }
}

pub(super) fn check_network_entries(desired: &ProjectState, issues: &mut Vec<Issue>) {
    for entry in &desired.network_entries {
        let path = entry.identity().to_string();

        let selectors = entry.spec.selector_count();
        if selectors != 1 {
            issues.push(Issue::error(
                IssueCode::NetworkSelectorInvalid,
                &path,
                format!(
                    "exactly one of ipAddress, cidrBlock, awsSecurityGroup required; found {selectors}"
                ),
            ));
            continue;
        }

        if let Some(ip) = &entry.spec.ip_address {
            if ip.parse::<IpAddr>().is_err() {
                issues.push(
                    Issue::error(IssueCode::IpInvalid, &path, format!("invalid IP `{ip}`"))
                        .with_field("ipAddress"),
                );
            }
        }

        if let Some(cidr) = &entry.spec.cidr_block {
            if !is_valid_cidr(cidr) {
                issues.push(
                    Issue::error(
                        IssueCode::CidrInvalid,
                        &path,
                        format!("invalid CIDR `{cidr}`"),
                    )
                    .with_field("cidrBlock"),
                );
            }
        }

        if let Some(expiry) = entry.spec.delete_after {
            if expiry <= Utc::now() {
                issues.push(
                    Issue::warning(
                        IssueCode::NetworkEntryExpired,
                        &path,
                        format!("deleteAfter {expiry} is already in the past"),
                    )
                    .with_field("deleteAfter"),
                );
            }
        }
    }
}

pub(super) fn check_depends_on(desired: &ProjectState, issues: &mut Vec<Issue>) {
    for (path, metadata) in each_metadata(desired) {
        for reference in &metadata.depends_on {
            if desired.resolve_ref(reference).is_none() {
                issues.push(
                    Issue::error(
                        IssueCode::DependsOnUnresolved,
                        &path,
                        format!("dependsOn target {reference} does not exist in this project"),
                    )
                    .with_field("dependsOn"),
                );
            }
        }
    }
}

pub(super) fn check_identity_collisions(desired: &ProjectState, issues: &mut Vec<Issue>) {
    let mut seen: HashSet<ResourceIdentity> = HashSet::new();
    for identity in desired.identities() {
        if !seen.insert(identity.clone()) {
            issues.push(Issue::error(
                IssueCode::DuplicateIdentity,
                identity.to_string(),
                "identity declared more than once",
            ));
        }
    }
}

/// (identity path, metadata) pairs for every resource in the state.
pub(super) fn each_metadata(desired: &ProjectState) -> Vec<(String, &ResourceMetadata)> {
    fn push<'a, S: ResourceSpec>(
        out: &mut Vec<(String, &'a ResourceMetadata)>,
        resources: &'a [Resource<S>],
    ) {
        for r in resources {
            out.push((r.identity().to_string(), &r.metadata));
        }
    }

    let mut out = Vec::new();
    if let Some(project) = &desired.project {
        out.push((project.identity().to_string(), &project.metadata));
    }
    push(&mut out, &desired.network_entries);
    push(&mut out, &desired.roles);
    push(&mut out, &desired.clusters);
    push(&mut out, &desired.users);
    out
}

fn is_valid_cidr(cidr: &str) -> bool {
    let Some((addr, prefix)) = cidr.split_once('/') else {
        return false;
    };
    let Ok(ip) = addr.parse::<IpAddr>() else {
        return false;
    };
    let Ok(prefix) = prefix.parse::<u8>() else {
        return false;
    };
    match ip {
        IpAddr::V4(_) => prefix <= 32,
        IpAddr::V6(_) => prefix <= 128,
    }
}
