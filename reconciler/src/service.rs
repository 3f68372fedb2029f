//! Remote service collaborator contracts
//!
//! The core never talks HTTP. It sees the remote database service through the
//! traits here, with errors pre-classified by kind so discovery and the
//! executor can decide what is retryable. Adapters (and test fakes) implement
//! these traits; the core takes them as `Arc<dyn ...>` constructor parameters.

use crate::model::{
    ClusterSpec, ClusterState, DatabaseRoleSpec, DatabaseUserSpec, NetworkAccessSpec, ProjectSpec,
    Resource,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a remote service failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceErrorKind {
    /// The addressed resource does not exist.
    NotFound,
    /// Credentials rejected or insufficient permissions.
    Unauthorized,
    /// The resource already exists or a concurrent change collided.
    Conflict,
    /// Rate limit, 5xx, or network failure; safe to retry.
    Transient,
    /// The service rejected the payload.
    Validation,
    /// Anything the adapter could not classify.
    Unknown,
}

impl ServiceErrorKind {
    /// Whether the executor/discovery may retry the call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceErrorKind::Transient)
    }
}

impl std::fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceErrorKind::NotFound => write!(f, "not_found"),
            ServiceErrorKind::Unauthorized => write!(f, "unauthorized"),
            ServiceErrorKind::Conflict => write!(f, "conflict"),
            ServiceErrorKind::Transient => write!(f, "transient"),
            ServiceErrorKind::Validation => write!(f, "validation"),
            ServiceErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// A classified failure from the remote service.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Conflict, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Transient, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// A cluster as observed remotely: its spec plus lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterObservation {
    pub resource: Resource<ClusterSpec>,
    pub state: ClusterState,
}

/// Project as observed remotely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectObservation {
    pub id: String,
    pub resource: Resource<ProjectSpec>,
    pub organization_id: String,
}

/// CRUD surface the core requires from the remote service, per resource kind.
///
/// `Create` returns the service-assigned identifier of the new resource.
/// Clusters additionally expose `get_cluster` so the executor can poll
/// asynchronous readiness.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    async fn get_project(&self, project_id: &str) -> Result<ProjectObservation, ServiceError>;
    async fn create_project(&self, spec: &Resource<ProjectSpec>) -> Result<String, ServiceError>;
    async fn update_project(
        &self,
        project_id: &str,
        spec: &Resource<ProjectSpec>,
    ) -> Result<(), ServiceError>;

    async fn list_clusters(
        &self,
        project_id: &str,
    ) -> Result<Vec<Resource<ClusterSpec>>, ServiceError>;
    async fn create_cluster(
        &self,
        project_id: &str,
        cluster: &Resource<ClusterSpec>,
    ) -> Result<String, ServiceError>;
    async fn update_cluster(
        &self,
        project_id: &str,
        name: &str,
        cluster: &Resource<ClusterSpec>,
    ) -> Result<(), ServiceError>;
    async fn delete_cluster(&self, project_id: &str, name: &str) -> Result<(), ServiceError>;
    /// Current observation including lifecycle state, for readiness polling.
    async fn get_cluster(
        &self,
        project_id: &str,
        name: &str,
    ) -> Result<ClusterObservation, ServiceError>;

    async fn list_users(
        &self,
        project_id: &str,
    ) -> Result<Vec<Resource<DatabaseUserSpec>>, ServiceError>;
    async fn create_user(
        &self,
        project_id: &str,
        user: &Resource<DatabaseUserSpec>,
    ) -> Result<String, ServiceError>;
    async fn update_user(
        &self,
        project_id: &str,
        username: &str,
        auth_database: &str,
        user: &Resource<DatabaseUserSpec>,
    ) -> Result<(), ServiceError>;
    async fn delete_user(
        &self,
        project_id: &str,
        username: &str,
        auth_database: &str,
    ) -> Result<(), ServiceError>;

    async fn list_roles(
        &self,
        project_id: &str,
    ) -> Result<Vec<Resource<DatabaseRoleSpec>>, ServiceError>;
    async fn create_role(
        &self,
        project_id: &str,
        role: &Resource<DatabaseRoleSpec>,
    ) -> Result<String, ServiceError>;
    async fn update_role(
        &self,
        project_id: &str,
        role_name: &str,
        database_name: &str,
        role: &Resource<DatabaseRoleSpec>,
    ) -> Result<(), ServiceError>;
    async fn delete_role(
        &self,
        project_id: &str,
        role_name: &str,
        database_name: &str,
    ) -> Result<(), ServiceError>;

    async fn list_network_entries(
        &self,
        project_id: &str,
    ) -> Result<Vec<Resource<NetworkAccessSpec>>, ServiceError>;
    async fn create_network_entry(
        &self,
        project_id: &str,
        entry: &Resource<NetworkAccessSpec>,
    ) -> Result<String, ServiceError>;
    async fn update_network_entry(
        &self,
        project_id: &str,
        selector: &str,
        entry: &Resource<NetworkAccessSpec>,
    ) -> Result<(), ServiceError>;
    async fn delete_network_entry(
        &self,
        project_id: &str,
        selector: &str,
    ) -> Result<(), ServiceError>;
}

/// Name-to-id resolution for projects.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Resolve a project name (optionally scoped to an organization) to its
    /// stable identifier. Inputs that already look like identifiers skip
    /// this lookup entirely (see `model::looks_like_project_id`).
    async fn resolve_project(
        &self,
        name_or_id: &str,
        org_id: Option<&str>,
    ) -> Result<String, ServiceError>;
}
