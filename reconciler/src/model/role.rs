//! Custom database role spec

use super::{ResourceIdentity, ResourceKind, ResourceMetadata, ResourceSpec};
use serde::{Deserialize, Serialize};

/// Built-in roles users may reference without a matching custom role.
pub const BUILT_IN_ROLES: &[&str] = &[
    "read",
    "readWrite",
    "dbAdmin",
    "dbAdminAnyDatabase",
    "readAnyDatabase",
    "readWriteAnyDatabase",
    "clusterMonitor",
    "backup",
    "atlasAdmin",
    "enableSharding",
];

/// Whether a role name refers to a built-in role.
pub fn is_built_in_role(name: &str) -> bool {
    BUILT_IN_ROLES.contains(&name)
}

/// The database (and optionally collection) a privilege applies to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivilegeResource {
    #[serde(default)]
    pub database_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
}

/// A set of actions granted on one resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Privilege {
    /// Action names, e.g. `FIND`, `INSERT`, `CREATE_INDEX`.
    pub actions: Vec<String>,

    #[serde(default)]
    pub resource: PrivilegeResource,
}

/// A role this role inherits from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InheritedRole {
    pub role_name: String,
    pub database_name: String,
}

/// Desired shape of a custom role. Identity is (roleName, databaseName).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseRoleSpec {
    pub role_name: String,

    #[serde(default)]
    pub database_name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub privileges: Vec<Privilege>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inherited_roles: Vec<InheritedRole>,
}

impl ResourceSpec for DatabaseRoleSpec {
    const KIND: ResourceKind = ResourceKind::DatabaseRole;

    fn identity(&self, _metadata: &ResourceMetadata) -> ResourceIdentity {
        ResourceIdentity::DatabaseRole {
            role_name: self.role_name.clone(),
            database_name: self.database_name.clone(),
        }
    }

    fn normalize(&mut self) {
        // Action order inside a privilege is not significant.
        for privilege in &mut self.privileges {
            privilege.actions.sort();
        }
    }
}
