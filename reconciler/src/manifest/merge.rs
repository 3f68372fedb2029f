//! Manifest merger
//!
//! Folds one-or-more decoded documents into a single desired state for
//! exactly one project. Duplicate identities across files are errors — there
//! is no implicit override. Every resource is normalized on the way in so
//! the merger's output is already canonical.

use super::{
    known_spec_fields, looks_like_secret_key, LoadResult, ManifestDocument, ResourceEntry,
};
use crate::model::{
    ClusterSpec, DatabaseRoleSpec, DatabaseUserSpec, NetworkAccessSpec, ProjectSpec, Resource,
    ResourceIdentity, ResourceKind, ResourceMetadata, ResourceSpec, ProjectState,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

/// A merge failure. All variants abort the pass before validation.
#[derive(Debug, Clone, Error)]
pub enum MergeError {
    #[error("loader reported errors: {0}")]
    LoaderErrors(String),

    #[error("no manifest documents provided")]
    EmptyInput,

    #[error("unknown resource kind `{0}`")]
    UnknownKind(String),

    #[error("document kind `{0}` is not a project-rooted manifest")]
    NotAProjectDocument(String),

    #[error("duplicate resource identity {0}")]
    DuplicateIdentity(ResourceIdentity),

    #[error("documents target different projects: `{first}` and `{second}`")]
    ProjectMismatch { first: String, second: String },

    #[error("project declared more than once with conflicting {field}: `{first}` vs `{second}`")]
    ProjectConflict {
        field: String,
        first: String,
        second: String,
    },

    #[error("project tag `{key}` has divergent values: `{first}` vs `{second}`")]
    TagConflict {
        key: String,
        first: String,
        second: String,
    },

    #[error("secret-like key `{key}` in {location} of {identity}; move it to the spec password field")]
    SecretInMetadata {
        identity: String,
        location: String,
        key: String,
    },

    #[error("unknown field `{field}` in {kind} spec `{name}`")]
    UnknownField {
        kind: ResourceKind,
        name: String,
        field: String,
    },

    #[error("failed to decode {kind} spec `{name}`: {message}")]
    SpecDecode {
        kind: ResourceKind,
        name: String,
        message: String,
    },
}

/// Merged desired state plus the project the documents target.
#[derive(Debug, Clone)]
pub struct MergeOutput {
    pub desired: ProjectState,
    /// Project name (or id) the pass reconciles.
    pub project_name: String,
    pub warnings: Vec<String>,
}

/// Folds decoded documents into one desired project state.
#[derive(Debug, Clone)]
pub struct Merger {
    /// Unknown spec fields error instead of warning.
    strict: bool,
}

impl Merger {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    /// Merge all documents. The first loader error aborts immediately.
    pub fn merge(&self, documents: Vec<LoadResult>) -> Result<MergeOutput, MergeError> {
        if documents.is_empty() {
            return Err(MergeError::EmptyInput);
        }

        let mut state = MergeState::default();
        for load in documents {
            if !load.errors.is_empty() {
                return Err(MergeError::LoaderErrors(load.errors.join("; ")));
            }
            state.warnings.extend(load.warnings);

            match load.config {
                ManifestDocument::Project(doc) => {
                    if doc.kind != "Project" {
                        return Err(MergeError::NotAProjectDocument(doc.kind));
                    }
                    self.merge_project_document(&mut state, doc)?;
                }
                ManifestDocument::Resources(list) => {
                    for entry in list.resources {
                        self.merge_resource_entry(&mut state, entry)?;
                    }
                }
            }
        }

        let project_name = match state.project_name {
            Some(name) => name,
            None => return Err(MergeError::EmptyInput),
        };

        state.desired.normalize();
        debug!(
            project = %project_name,
            resources = state.desired.resource_count(),
            warnings = state.warnings.len(),
            "manifests merged"
        );
        Ok(MergeOutput {
            desired: state.desired,
            project_name,
            warnings: state.warnings,
        })
    }

    fn merge_project_document(
        &self,
        state: &mut MergeState,
        doc: super::ProjectDocument,
    ) -> Result<(), MergeError> {
        check_metadata_secrets(&doc.metadata)?;
        state.bind_project(&doc.metadata.name)?;

        let spec = doc.spec;
        state.merge_project_object(Resource::new(doc.metadata, spec.project))?;

        for (kind, resources) in [
            (ResourceKind::Cluster, spec.clusters),
            (ResourceKind::DatabaseUser, spec.database_users),
            (ResourceKind::DatabaseRole, spec.database_roles),
            (ResourceKind::NetworkAccess, spec.network_access),
        ] {
            for resource in resources {
                self.merge_typed(state, kind, resource.metadata, resource.spec)?;
            }
        }
        Ok(())
    }

    fn merge_resource_entry(
        &self,
        state: &mut MergeState,
        entry: ResourceEntry,
    ) -> Result<(), MergeError> {
        let kind = ResourceKind::parse(&entry.kind)
            .ok_or_else(|| MergeError::UnknownKind(entry.kind.clone()))?;

        state.bind_project(&entry.project_name)?;
        self.merge_typed(state, kind, entry.metadata, entry.spec)
    }

    /// Shared per-resource path for both document forms: metadata secret
    /// scan, unknown-field scan, typed decode, identity-deduplicating
    /// insert.
    fn merge_typed(
        &self,
        state: &mut MergeState,
        kind: ResourceKind,
        metadata: ResourceMetadata,
        spec: Value,
    ) -> Result<(), MergeError> {
        check_metadata_secrets(&metadata)?;
        self.check_unknown_fields(state, kind, &metadata.name, &spec)?;

        match kind {
            ResourceKind::Project => {
                let spec: ProjectSpec = decode_spec(kind, &metadata.name, spec)?;
                state.merge_project_object(Resource::new(metadata, spec))?;
            }
            ResourceKind::Cluster => {
                let spec: ClusterSpec = decode_spec(kind, &metadata.name, spec)?;
                state.insert(|s| &mut s.clusters, Resource::new(metadata, spec))?;
            }
            ResourceKind::DatabaseUser => {
                let spec: DatabaseUserSpec = decode_spec(kind, &metadata.name, spec)?;
                state.insert(|s| &mut s.users, Resource::new(metadata, spec))?;
            }
            ResourceKind::DatabaseRole => {
                let spec: DatabaseRoleSpec = decode_spec(kind, &metadata.name, spec)?;
                state.insert(|s| &mut s.roles, Resource::new(metadata, spec))?;
            }
            ResourceKind::NetworkAccess => {
                let spec: NetworkAccessSpec = decode_spec(kind, &metadata.name, spec)?;
                state.insert(|s| &mut s.network_entries, Resource::new(metadata, spec))?;
            }
        }
        Ok(())
    }

    fn check_unknown_fields(
        &self,
        state: &mut MergeState,
        kind: ResourceKind,
        name: &str,
        spec: &Value,
    ) -> Result<(), MergeError> {
        let Value::Object(map) = spec else {
            return Ok(());
        };
        let known = known_spec_fields(kind);
        for key in map.keys() {
            if !known.contains(&key.as_str()) {
                if self.strict {
                    return Err(MergeError::UnknownField {
                        kind,
                        name: name.to_string(),
                        field: key.clone(),
                    });
                }
                state.warnings.push(format!(
                    "ignoring unknown field `{key}` in {kind} spec `{name}`"
                ));
            }
        }
        Ok(())
    }
}

/// Accumulator threaded through one merge pass.
#[derive(Debug, Default)]
struct MergeState {
    desired: ProjectState,
    project_name: Option<String>,
    seen: HashSet<ResourceIdentity>,
    warnings: Vec<String>,
}

impl MergeState {
    /// Record (or verify) the single project the documents target.
    fn bind_project(&mut self, name: &str) -> Result<(), MergeError> {
        match &self.project_name {
            None => {
                self.project_name = Some(name.to_string());
                Ok(())
            }
            Some(existing) if existing == name => Ok(()),
            Some(existing) => Err(MergeError::ProjectMismatch {
                first: existing.clone(),
                second: name.to_string(),
            }),
        }
    }

    /// Merge a project object: only one may exist, tags union, other fields
    /// must agree.
    fn merge_project_object(
        &mut self,
        mut incoming: Resource<ProjectSpec>,
    ) -> Result<(), MergeError> {
        incoming.normalize();
        let Some(existing) = &mut self.desired.project else {
            self.seen.insert(incoming.identity());
            self.desired.project = Some(incoming);
            return Ok(());
        };

        if existing.identity() != incoming.identity() {
            return Err(MergeError::ProjectConflict {
                field: "name".to_string(),
                first: existing.identity().short(),
                second: incoming.identity().short(),
            });
        }
        match (&existing.spec.organization_id, &incoming.spec.organization_id) {
            (Some(a), Some(b)) if a != b => {
                return Err(MergeError::ProjectConflict {
                    field: "organizationId".to_string(),
                    first: a.clone(),
                    second: b.clone(),
                });
            }
            (None, Some(b)) => existing.spec.organization_id = Some(b.clone()),
            _ => {}
        }
        for (key, value) in incoming.spec.tags {
            match existing.spec.tags.get(&key) {
                Some(current) if *current != value => {
                    return Err(MergeError::TagConflict {
                        key,
                        first: current.clone(),
                        second: value,
                    });
                }
                Some(_) => {}
                None => {
                    existing.spec.tags.insert(key, value);
                }
            }
        }
        Ok(())
    }

    /// Normalize, dedup by identity, and append.
    fn insert<S: ResourceSpec>(
        &mut self,
        slot: fn(&mut ProjectState) -> &mut Vec<Resource<S>>,
        mut resource: Resource<S>,
    ) -> Result<(), MergeError> {
        resource.normalize();
        let identity = resource.identity();
        if !self.seen.insert(identity.clone()) {
            return Err(MergeError::DuplicateIdentity(identity));
        }
        slot(&mut self.desired).push(resource);
        Ok(())
    }
}

fn check_metadata_secrets(metadata: &ResourceMetadata) -> Result<(), MergeError> {
    for (location, map) in [
        ("labels", &metadata.labels),
        ("annotations", &metadata.annotations),
    ] {
        for key in map.keys() {
            if looks_like_secret_key(key) {
                return Err(MergeError::SecretInMetadata {
                    identity: metadata.name.clone(),
                    location: location.to_string(),
                    key: key.clone(),
                });
            }
        }
    }
    Ok(())
}

fn decode_spec<S: DeserializeOwned>(
    kind: ResourceKind,
    name: &str,
    value: Value,
) -> Result<S, MergeError> {
    serde_json::from_value(value).map_err(|e| MergeError::SpecDecode {
        kind,
        name: name.to_string(),
        message: e.to_string(),
    })
}
