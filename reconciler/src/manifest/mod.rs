//! Manifest documents
//!
//! The loader collaborator decodes YAML/JSON and hands the core either typed
//! documents or neutral `serde_json::Value` trees. This module defines the
//! two accepted document forms and the structural-decode fallback that keeps
//! opaque maps from travelling past the merger boundary.

mod merge;

pub use merge::{MergeError, MergeOutput, Merger};

use crate::model::{ProjectSpec, ResourceKind, ResourceMetadata};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What the loader hands the core per input file.
///
/// Any entry in `errors` is fatal for the pass; `warnings` are forwarded to
/// the caller untouched.
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub config: ManifestDocument,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl LoadResult {
    pub fn ok(config: ManifestDocument) -> Self {
        Self {
            config,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// A decoded manifest document in one of the two accepted forms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ManifestDocument {
    /// Project-rooted: one project spec with nested resource sequences.
    Project(ProjectDocument),
    /// Flat resource list; each resource declares its project.
    Resources(ResourceListDocument),
}

impl ManifestDocument {
    /// Structural decode from a neutral value tree.
    ///
    /// This is the fallback for loaders that cannot produce typed documents
    /// directly. Per-kind unknown-key checks happen later, in the merger,
    /// where strictness is known.
    pub fn from_value(value: Value) -> Result<Self, String> {
        serde_json::from_value(value).map_err(|e| format!("unrecognized manifest document: {e}"))
    }
}

/// Project-rooted document form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProjectDocument {
    /// Must be `Project`.
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    pub metadata: ResourceMetadata,

    pub spec: ProjectDocumentSpec,
}

/// The nested body of a project-rooted document.
///
/// Nested resources stay raw (`metadata` plus a `Value` spec) so the merger
/// applies the same unknown-field and secret-metadata checks to both
/// document forms before typing anything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDocumentSpec {
    #[serde(flatten)]
    pub project: ProjectSpec,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clusters: Vec<NestedResource>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub database_users: Vec<NestedResource>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub database_roles: Vec<NestedResource>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_access: Vec<NestedResource>,
}

/// One nested resource of a project-rooted document. The kind is implied by
/// the sequence it sits in; the spec stays a raw value until the merger
/// types it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedResource {
    pub metadata: ResourceMetadata,

    #[serde(default)]
    pub spec: Value,
}

/// Flat multi-resource document form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceListDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    pub resources: Vec<ResourceEntry>,
}

/// One entry of a multi-resource document. The spec stays a raw value until
/// the merger types it against the declared kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEntry {
    pub kind: String,

    /// Target project for this resource.
    pub project_name: String,

    pub metadata: ResourceMetadata,

    #[serde(default)]
    pub spec: Value,
}

/// Spec keys the core understands, per kind, as they appear on the wire.
/// Anything else is an unknown field: error in strict mode, warning otherwise.
pub(crate) fn known_spec_fields(kind: ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::Project => &["name", "organizationId", "tags"],
        ResourceKind::Cluster => &[
            "provider",
            "region",
            "instanceSize",
            "diskSizeGB",
            "mongodbVersion",
            "replicationSpecs",
            "autoscaling",
            "backupEnabled",
            "biConnector",
            "encryptionAtRest",
            "paused",
            "tags",
        ],
        ResourceKind::DatabaseUser => &["username", "password", "authDatabase", "roles", "scopes"],
        ResourceKind::DatabaseRole => &[
            "roleName",
            "databaseName",
            "privileges",
            "inheritedRoles",
        ],
        ResourceKind::NetworkAccess => &[
            "ipAddress",
            "cidrBlock",
            "awsSecurityGroup",
            "comment",
            "deleteAfter",
        ],
    }
}

/// Heuristic for secret-looking metadata keys, which are forbidden in labels
/// and annotations.
pub(crate) fn looks_like_secret_key(key: &str) -> bool {
    let lowered = key.to_ascii_lowercase();
    ["password", "secret", "token", "credential", "apikey", "api-key", "api_key"]
        .iter()
        .any(|needle| lowered.contains(needle))
}
