//! Shared test fixtures: an in-memory service client with scripted failures.
//!
//! The core takes its collaborators as trait objects; tests inject this fake
//! instead of standing up HTTP machinery. Failures are queued per method so
//! scenarios can script "transient twice, then success" exactly.

#![allow(dead_code)]

use async_trait::async_trait;
use reconciler::model::ClusterState;
use reconciler::service::{ClusterObservation, ProjectObservation};
use reconciler::{
    CancelToken, Catalog, ClusterSpec, DatabaseRoleSpec, DatabaseUserSpec, LoadResult,
    ManifestDocument, NetworkAccessSpec, ProjectSpec, ProjectState, Resource, ResourceMetadata,
    ServiceClient, ServiceError,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

pub const PROJECT_ID: &str = "5f2a9c0b8e1d4a3b2c1d0e9f";
pub const ORG_ID: &str = "6a1b2c3d4e5f6a1b2c3d4e5f";
pub const PROJECT_NAME: &str = "platform";

/// In-memory remote state plus failure scripting.
#[derive(Default)]
struct Inner {
    project: Option<Resource<ProjectSpec>>,
    clusters: Vec<Resource<ClusterSpec>>,
    users: Vec<Resource<DatabaseUserSpec>>,
    roles: Vec<Resource<DatabaseRoleSpec>>,
    networks: Vec<Resource<NetworkAccessSpec>>,
    /// Readiness polls remaining per cluster before it reports Idle.
    cluster_polls: HashMap<String, u32>,
    /// Scripted errors, popped per call, keyed by method name.
    fail_queues: HashMap<&'static str, VecDeque<ServiceError>>,
    /// Calls observed per method.
    calls: HashMap<&'static str, u32>,
    /// Fire this token once the given method has completed `after` calls.
    cancel_trigger: Option<(&'static str, u32, CancelToken)>,
}

pub struct FakeService {
    inner: Mutex<Inner>,
    /// Readiness polls a freshly created cluster needs (default 1).
    pub polls_until_ready: u32,
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                project: Some(Resource::new(
                    ResourceMetadata::named(PROJECT_NAME),
                    ProjectSpec {
                        name: PROJECT_NAME.to_string(),
                        organization_id: Some(ORG_ID.to_string()),
                        ..Default::default()
                    },
                )),
                ..Default::default()
            }),
            polls_until_ready: 1,
        })
    }

    /// A fake with no project at all (greenfield).
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
            polls_until_ready: 1,
        })
    }

    /// Like `new`, but clusters need `polls` readiness polls before Idle.
    pub fn with_readiness(polls: u32) -> Arc<Self> {
        let service = Self::new();
        let inner = std::mem::take(&mut *service.inner.lock().unwrap());
        Arc::new(Self {
            inner: Mutex::new(inner),
            polls_until_ready: polls,
        })
    }

    pub fn seed_cluster(&self, cluster: Resource<ClusterSpec>) {
        let mut inner = self.inner.lock().unwrap();
        inner.clusters.push(cluster);
    }

    pub fn seed_user(&self, user: Resource<DatabaseUserSpec>) {
        let mut inner = self.inner.lock().unwrap();
        inner.users.push(user);
    }

    pub fn seed_network(&self, entry: Resource<NetworkAccessSpec>) {
        let mut inner = self.inner.lock().unwrap();
        inner.networks.push(entry);
    }

    /// Queue errors for a method; each call pops one until the queue drains.
    pub fn fail_next(&self, method: &'static str, errors: Vec<ServiceError>) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_queues.entry(method).or_default().extend(errors);
    }

    /// Cancel `token` after `method` has completed `after` calls.
    pub fn cancel_after(&self, method: &'static str, after: u32, token: CancelToken) {
        let mut inner = self.inner.lock().unwrap();
        inner.cancel_trigger = Some((method, after, token));
    }

    pub fn calls(&self, method: &'static str) -> u32 {
        let inner = self.inner.lock().unwrap();
        inner.calls.get(method).copied().unwrap_or(0)
    }

    /// Snapshot of the fake's remote state for assertions.
    pub fn remote_state(&self) -> ProjectState {
        let inner = self.inner.lock().unwrap();
        let mut state = ProjectState {
            project: inner.project.clone(),
            clusters: inner.clusters.clone(),
            users: inner.users.clone(),
            roles: inner.roles.clone(),
            network_entries: inner.networks.clone(),
        };
        state.normalize();
        state
    }

    /// Record the call, fire any scripted error, and fire the cancel
    /// trigger when armed.
    fn enter(&self, method: &'static str) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock().unwrap();
        *inner.calls.entry(method).or_default() += 1;
        let count = inner.calls[method];

        if let Some(queue) = inner.fail_queues.get_mut(method) {
            if let Some(error) = queue.pop_front() {
                return Err(error);
            }
        }

        if let Some((trigger_method, after, token)) = &inner.cancel_trigger {
            if *trigger_method == method && count >= *after {
                token.cancel();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceClient for FakeService {
    async fn get_project(&self, _project_id: &str) -> Result<ProjectObservation, ServiceError> {
        self.enter("get_project")?;
        let inner = self.inner.lock().unwrap();
        match &inner.project {
            Some(project) => Ok(ProjectObservation {
                id: PROJECT_ID.to_string(),
                resource: project.clone(),
                organization_id: ORG_ID.to_string(),
            }),
            None => Err(ServiceError::not_found("project does not exist")),
        }
    }

    async fn create_project(&self, spec: &Resource<ProjectSpec>) -> Result<String, ServiceError> {
        self.enter("create_project")?;
        let mut inner = self.inner.lock().unwrap();
        if inner.project.is_some() {
            return Err(ServiceError::conflict("project already exists"));
        }
        inner.project = Some(spec.clone());
        Ok(PROJECT_ID.to_string())
    }

    async fn update_project(
        &self,
        _project_id: &str,
        spec: &Resource<ProjectSpec>,
    ) -> Result<(), ServiceError> {
        self.enter("update_project")?;
        let mut inner = self.inner.lock().unwrap();
        inner.project = Some(spec.clone());
        Ok(())
    }

    async fn list_clusters(
        &self,
        _project_id: &str,
    ) -> Result<Vec<Resource<ClusterSpec>>, ServiceError> {
        self.enter("list_clusters")?;
        Ok(self.inner.lock().unwrap().clusters.clone())
    }

    async fn create_cluster(
        &self,
        _project_id: &str,
        cluster: &Resource<ClusterSpec>,
    ) -> Result<String, ServiceError> {
        self.enter("create_cluster")?;
        let mut inner = self.inner.lock().unwrap();
        if inner
            .clusters
            .iter()
            .any(|c| c.metadata.name == cluster.metadata.name)
        {
            return Err(ServiceError::conflict(format!(
                "cluster `{}` already exists",
                cluster.metadata.name
            )));
        }
        inner
            .cluster_polls
            .insert(cluster.metadata.name.clone(), self.polls_until_ready);
        inner.clusters.push(cluster.clone());
        Ok(format!("cluster-{}", cluster.metadata.name))
    }

    async fn update_cluster(
        &self,
        _project_id: &str,
        name: &str,
        cluster: &Resource<ClusterSpec>,
    ) -> Result<(), ServiceError> {
        self.enter("update_cluster")?;
        let mut inner = self.inner.lock().unwrap();
        let polls = self.polls_until_ready;
        match inner.clusters.iter_mut().find(|c| c.metadata.name == name) {
            Some(slot) => {
                *slot = cluster.clone();
                inner.cluster_polls.insert(name.to_string(), polls);
                Ok(())
            }
            None => Err(ServiceError::not_found(format!("cluster `{name}`"))),
        }
    }

    async fn delete_cluster(&self, _project_id: &str, name: &str) -> Result<(), ServiceError> {
        self.enter("delete_cluster")?;
        let mut inner = self.inner.lock().unwrap();
        let before = inner.clusters.len();
        inner.clusters.retain(|c| c.metadata.name != name);
        inner.cluster_polls.remove(name);
        if inner.clusters.len() == before {
            return Err(ServiceError::not_found(format!("cluster `{name}`")));
        }
        Ok(())
    }

    async fn get_cluster(
        &self,
        _project_id: &str,
        name: &str,
    ) -> Result<ClusterObservation, ServiceError> {
        self.enter("get_cluster")?;
        let mut inner = self.inner.lock().unwrap();
        let Some(cluster) = inner.clusters.iter().find(|c| c.metadata.name == name).cloned()
        else {
            return Err(ServiceError::not_found(format!("cluster `{name}`")));
        };
        let state = match inner.cluster_polls.get_mut(name) {
            Some(polls) if *polls > 0 => {
                *polls -= 1;
                ClusterState::Creating
            }
            _ => ClusterState::Idle,
        };
        Ok(ClusterObservation {
            resource: cluster,
            state,
        })
    }

    async fn list_users(
        &self,
        _project_id: &str,
    ) -> Result<Vec<Resource<DatabaseUserSpec>>, ServiceError> {
        self.enter("list_users")?;
        Ok(self.inner.lock().unwrap().users.clone())
    }

    async fn create_user(
        &self,
        _project_id: &str,
        user: &Resource<DatabaseUserSpec>,
    ) -> Result<String, ServiceError> {
        self.enter("create_user")?;
        let mut inner = self.inner.lock().unwrap();
        if inner
            .users
            .iter()
            .any(|u| u.spec.username == user.spec.username)
        {
            return Err(ServiceError::conflict(format!(
                "user `{}` already exists",
                user.spec.username
            )));
        }
        inner.users.push(user.clone());
        Ok(format!("user-{}", user.spec.username))
    }

    async fn update_user(
        &self,
        _project_id: &str,
        username: &str,
        _auth_database: &str,
        user: &Resource<DatabaseUserSpec>,
    ) -> Result<(), ServiceError> {
        self.enter("update_user")?;
        let mut inner = self.inner.lock().unwrap();
        match inner
            .users
            .iter_mut()
            .find(|u| u.spec.username == username)
        {
            Some(slot) => {
                *slot = user.clone();
                Ok(())
            }
            None => Err(ServiceError::not_found(format!("user `{username}`"))),
        }
    }

    async fn delete_user(
        &self,
        _project_id: &str,
        username: &str,
        _auth_database: &str,
    ) -> Result<(), ServiceError> {
        self.enter("delete_user")?;
        let mut inner = self.inner.lock().unwrap();
        let before = inner.users.len();
        inner.users.retain(|u| u.spec.username != username);
        if inner.users.len() == before {
            return Err(ServiceError::not_found(format!("user `{username}`")));
        }
        Ok(())
    }

    async fn list_roles(
        &self,
        _project_id: &str,
    ) -> Result<Vec<Resource<DatabaseRoleSpec>>, ServiceError> {
        self.enter("list_roles")?;
        Ok(self.inner.lock().unwrap().roles.clone())
    }

    async fn create_role(
        &self,
        _project_id: &str,
        role: &Resource<DatabaseRoleSpec>,
    ) -> Result<String, ServiceError> {
        self.enter("create_role")?;
        let mut inner = self.inner.lock().unwrap();
        if inner.roles.iter().any(|r| {
            r.spec.role_name == role.spec.role_name
                && r.spec.database_name == role.spec.database_name
        }) {
            return Err(ServiceError::conflict(format!(
                "role `{}` already exists",
                role.spec.role_name
            )));
        }
        inner.roles.push(role.clone());
        Ok(format!("role-{}", role.spec.role_name))
    }

    async fn update_role(
        &self,
        _project_id: &str,
        role_name: &str,
        database_name: &str,
        role: &Resource<DatabaseRoleSpec>,
    ) -> Result<(), ServiceError> {
        self.enter("update_role")?;
        let mut inner = self.inner.lock().unwrap();
        match inner.roles.iter_mut().find(|r| {
            r.spec.role_name == role_name && r.spec.database_name == database_name
        }) {
            Some(slot) => {
                *slot = role.clone();
                Ok(())
            }
            None => Err(ServiceError::not_found(format!("role `{role_name}`"))),
        }
    }

    async fn delete_role(
        &self,
        _project_id: &str,
        role_name: &str,
        database_name: &str,
    ) -> Result<(), ServiceError> {
        self.enter("delete_role")?;
        let mut inner = self.inner.lock().unwrap();
        let before = inner.roles.len();
        inner
            .roles
            .retain(|r| !(r.spec.role_name == role_name && r.spec.database_name == database_name));
        if inner.roles.len() == before {
            return Err(ServiceError::not_found(format!("role `{role_name}`")));
        }
        Ok(())
    }

    async fn list_network_entries(
        &self,
        _project_id: &str,
    ) -> Result<Vec<Resource<NetworkAccessSpec>>, ServiceError> {
        self.enter("list_network_entries")?;
        Ok(self.inner.lock().unwrap().networks.clone())
    }

    async fn create_network_entry(
        &self,
        _project_id: &str,
        entry: &Resource<NetworkAccessSpec>,
    ) -> Result<String, ServiceError> {
        self.enter("create_network_entry")?;
        let mut inner = self.inner.lock().unwrap();
        if inner
            .networks
            .iter()
            .any(|n| n.spec.selector() == entry.spec.selector())
        {
            return Err(ServiceError::conflict("network entry already exists"));
        }
        inner.networks.push(entry.clone());
        Ok(format!(
            "network-{}",
            entry.spec.selector().unwrap_or("unknown")
        ))
    }

    async fn update_network_entry(
        &self,
        _project_id: &str,
        selector: &str,
        entry: &Resource<NetworkAccessSpec>,
    ) -> Result<(), ServiceError> {
        self.enter("update_network_entry")?;
        let mut inner = self.inner.lock().unwrap();
        match inner
            .networks
            .iter_mut()
            .find(|n| n.spec.selector() == Some(selector))
        {
            Some(slot) => {
                *slot = entry.clone();
                Ok(())
            }
            None => Err(ServiceError::not_found(format!("network `{selector}`"))),
        }
    }

    async fn delete_network_entry(
        &self,
        _project_id: &str,
        selector: &str,
    ) -> Result<(), ServiceError> {
        self.enter("delete_network_entry")?;
        let mut inner = self.inner.lock().unwrap();
        let before = inner.networks.len();
        inner.networks.retain(|n| n.spec.selector() != Some(selector));
        if inner.networks.len() == before {
            return Err(ServiceError::not_found(format!("network `{selector}`")));
        }
        Ok(())
    }
}

#[async_trait]
impl Catalog for FakeService {
    async fn resolve_project(
        &self,
        name_or_id: &str,
        _org_id: Option<&str>,
    ) -> Result<String, ServiceError> {
        self.enter("resolve_project")?;
        let inner = self.inner.lock().unwrap();
        if name_or_id == PROJECT_ID {
            return Ok(PROJECT_ID.to_string());
        }
        match &inner.project {
            Some(project) if project.metadata.name == name_or_id => Ok(PROJECT_ID.to_string()),
            _ => Err(ServiceError::not_found(format!(
                "no project named `{name_or_id}`"
            ))),
        }
    }
}

/// Parse YAML into a loader result the way the external loader would.
pub fn load_yaml(yaml: &str) -> LoadResult {
    let value: serde_json::Value = serde_yaml::from_str(yaml).expect("test yaml must parse");
    LoadResult::ok(ManifestDocument::from_value(value).expect("test document must decode"))
}

/// An approval hook with a fixed answer.
pub struct FixedApproval(pub bool);

#[async_trait]
impl reconciler::ApprovalHook for FixedApproval {
    async fn confirm(&self, _plan: &reconciler::Plan) -> bool {
        self.0
    }
}
