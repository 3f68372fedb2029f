//! Typed project model
//!
//! Canonical in-memory shape of a project: the project itself, its clusters,
//! database users, custom roles, and network access entries. Desired state
//! (from manifests) and current state (from discovery) both normalize into
//! these types so the diff engine compares like with like.

mod cluster;
mod network;
mod project;
mod role;
mod secret;
mod user;

pub use cluster::{
    AutoscalingSpec, BiConnectorSpec, CloudProvider, ClusterSpec, ClusterState, InstanceSize,
    RegionConfig, ReplicationSpec,
};
pub use network::NetworkAccessSpec;
pub use project::ProjectSpec;
pub use role::{
    is_built_in_role, DatabaseRoleSpec, InheritedRole, Privilege, PrivilegeResource, BUILT_IN_ROLES,
};
pub use secret::{SecretString, SECRET_SENTINEL};
pub use user::{DatabaseUserSpec, RoleAssignment, ScopeType, UserScope};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Database name users fall back to when the manifest leaves it empty.
pub const DEFAULT_AUTH_DATABASE: &str = "admin";

/// The closed set of resource kinds the core reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Project,
    Cluster,
    DatabaseUser,
    DatabaseRole,
    NetworkAccess,
}

impl ResourceKind {
    /// All kinds in create order.
    pub fn all() -> &'static [ResourceKind] {
        &[
            ResourceKind::Project,
            ResourceKind::NetworkAccess,
            ResourceKind::DatabaseRole,
            ResourceKind::Cluster,
            ResourceKind::DatabaseUser,
        ]
    }

    /// Implicit ordering tier on create/update paths.
    ///
    /// Project ≺ NetworkAccess ≺ DatabaseRole ≺ Cluster ≺ DatabaseUser.
    /// Delete paths reverse this ordering.
    pub fn create_tier(&self) -> u8 {
        match self {
            ResourceKind::Project => 0,
            ResourceKind::NetworkAccess => 1,
            ResourceKind::DatabaseRole => 2,
            ResourceKind::Cluster => 3,
            ResourceKind::DatabaseUser => 4,
        }
    }

    /// Parse a manifest `kind` string. Unknown kinds fail loudly at the
    /// merger boundary.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Project" => Some(ResourceKind::Project),
            "Cluster" => Some(ResourceKind::Cluster),
            "DatabaseUser" => Some(ResourceKind::DatabaseUser),
            "DatabaseRole" => Some(ResourceKind::DatabaseRole),
            "NetworkAccess" => Some(ResourceKind::NetworkAccess),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Project => write!(f, "project"),
            ResourceKind::Cluster => write!(f, "cluster"),
            ResourceKind::DatabaseUser => write!(f, "database-user"),
            ResourceKind::DatabaseRole => write!(f, "database-role"),
            ResourceKind::NetworkAccess => write!(f, "network-access"),
        }
    }
}

/// What happens to the remote resource when it leaves the desired state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum DeletionPolicy {
    /// Remove the remote resource.
    #[default]
    Delete,
    /// Leave the remote resource in place.
    Retain,
    /// Snapshot before removal (clusters only; others fall back to Delete).
    Snapshot,
}

/// Reference to a sibling resource inside the same project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Metadata common to every resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    /// Name, unique within kind and project.
    pub name: String,

    /// Free-form selection labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Free-form annotations (never secrets; the merger enforces this).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Policy applied when the resource leaves the desired state.
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,

    /// Same-project resources that must exist before this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<ResourceRef>,
}

impl ResourceMetadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Identity of a resource within its project, per the per-kind identity rules.
///
/// Identities are what the merger deduplicates on and what the diff engine
/// joins desired and current state on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ResourceIdentity {
    /// Projects are singletons identified by name.
    Project { name: String },
    /// Clusters are identified by metadata name.
    Cluster { name: String },
    /// Users are identified by (username, authDatabase).
    #[serde(rename_all = "camelCase")]
    DatabaseUser {
        username: String,
        auth_database: String,
    },
    /// Custom roles are identified by (roleName, databaseName).
    #[serde(rename_all = "camelCase")]
    DatabaseRole {
        role_name: String,
        database_name: String,
    },
    /// Network entries are identified by the first populated selector
    /// (IP, CIDR, or security group).
    NetworkAccess { selector: String },
}

impl ResourceIdentity {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceIdentity::Project { .. } => ResourceKind::Project,
            ResourceIdentity::Cluster { .. } => ResourceKind::Cluster,
            ResourceIdentity::DatabaseUser { .. } => ResourceKind::DatabaseUser,
            ResourceIdentity::DatabaseRole { .. } => ResourceKind::DatabaseRole,
            ResourceIdentity::NetworkAccess { .. } => ResourceKind::NetworkAccess,
        }
    }

    /// Short display name without the kind prefix.
    pub fn short(&self) -> String {
        match self {
            ResourceIdentity::Project { name } | ResourceIdentity::Cluster { name } => name.clone(),
            ResourceIdentity::DatabaseUser {
                username,
                auth_database,
            } => format!("{username}@{auth_database}"),
            ResourceIdentity::DatabaseRole {
                role_name,
                database_name,
            } => format!("{role_name}@{database_name}"),
            ResourceIdentity::NetworkAccess { selector } => selector.clone(),
        }
    }
}

impl std::fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind(), self.short())
    }
}

/// Kind-specific spec behavior: identity derivation and default normalization.
pub trait ResourceSpec {
    const KIND: ResourceKind;

    /// Derive the identity of a resource carrying this spec.
    fn identity(&self, metadata: &ResourceMetadata) -> ResourceIdentity;

    /// Fold unset fields onto their documented defaults so semantically
    /// equivalent representations compare equal.
    fn normalize(&mut self) {}
}

/// A resource: shared metadata plus a kind-specific spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource<S> {
    pub metadata: ResourceMetadata,
    pub spec: S,
}

impl<S: ResourceSpec> Resource<S> {
    pub fn new(metadata: ResourceMetadata, spec: S) -> Self {
        Self { metadata, spec }
    }

    pub fn kind(&self) -> ResourceKind {
        S::KIND
    }

    pub fn identity(&self) -> ResourceIdentity {
        self.spec.identity(&self.metadata)
    }

    pub fn normalize(&mut self) {
        self.spec.normalize();
    }
}

/// Aggregate state of one project: the project resource plus ordered
/// sequences of each kind.
///
/// Both the desired state (merger output) and the current state (discovery
/// output) use this shape. It lives only for one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Resource<ProjectSpec>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clusters: Vec<Resource<ClusterSpec>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<Resource<DatabaseUserSpec>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<Resource<DatabaseRoleSpec>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_entries: Vec<Resource<NetworkAccessSpec>>,
}

impl ProjectState {
    /// Normalize every resource in place.
    pub fn normalize(&mut self) {
        if let Some(project) = &mut self.project {
            project.normalize();
        }
        for c in &mut self.clusters {
            c.normalize();
        }
        for u in &mut self.users {
            u.normalize();
        }
        for r in &mut self.roles {
            r.normalize();
        }
        for n in &mut self.network_entries {
            n.normalize();
        }
    }

    /// Total number of resources, project included.
    pub fn resource_count(&self) -> usize {
        usize::from(self.project.is_some())
            + self.clusters.len()
            + self.users.len()
            + self.roles.len()
            + self.network_entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resource_count() == 0
    }

    /// All identities in the state, in kind-tier order.
    pub fn identities(&self) -> Vec<ResourceIdentity> {
        let mut out = Vec::with_capacity(self.resource_count());
        if let Some(project) = &self.project {
            out.push(project.identity());
        }
        out.extend(self.network_entries.iter().map(Resource::identity));
        out.extend(self.roles.iter().map(Resource::identity));
        out.extend(self.clusters.iter().map(Resource::identity));
        out.extend(self.users.iter().map(Resource::identity));
        out
    }

    /// Look up a cluster by metadata name.
    pub fn cluster(&self, name: &str) -> Option<&Resource<ClusterSpec>> {
        self.clusters.iter().find(|c| c.metadata.name == name)
    }

    /// Look up a custom role by (roleName, databaseName).
    pub fn role(&self, role_name: &str, database_name: &str) -> Option<&Resource<DatabaseRoleSpec>> {
        self.roles
            .iter()
            .find(|r| r.spec.role_name == role_name && r.spec.database_name == database_name)
    }

    /// Resolve a `dependsOn` reference against this state.
    ///
    /// References address resources by metadata name within a kind; user and
    /// role references therefore match on metadata name, not identity tuple.
    pub fn resolve_ref(&self, reference: &ResourceRef) -> Option<ResourceIdentity> {
        match reference.kind {
            ResourceKind::Project => self
                .project
                .iter()
                .find(|p| p.metadata.name == reference.name)
                .map(Resource::identity),
            ResourceKind::Cluster => self.cluster(&reference.name).map(Resource::identity),
            ResourceKind::DatabaseUser => self
                .users
                .iter()
                .find(|u| u.metadata.name == reference.name)
                .map(Resource::identity),
            ResourceKind::DatabaseRole => self
                .roles
                .iter()
                .find(|r| r.metadata.name == reference.name)
                .map(Resource::identity),
            ResourceKind::NetworkAccess => self
                .network_entries
                .iter()
                .find(|n| n.metadata.name == reference.name)
                .map(Resource::identity),
        }
    }
}

/// Whether a string looks like a stable 24-character hex project identifier.
///
/// Inputs that match skip the catalog name lookup. Case-insensitive.
pub fn looks_like_project_id(s: &str) -> bool {
    s.len() == 24 && s.chars().all(|c| c.is_ascii_hexdigit())
}
