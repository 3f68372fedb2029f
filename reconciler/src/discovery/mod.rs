//! Current-state discovery
//!
//! Builds the current project state by listing every resource kind from the
//! remote service with a bounded worker pool, retrying transient failures
//! per call. Discovery is all-or-nothing: if any kind cannot be fetched the
//! whole pass aborts rather than diffing against an incomplete snapshot.

use crate::cancel::CancelToken;
use crate::model::{looks_like_project_id, ProjectState, ResourceKind};
use crate::retry::{run_with_retry, RetryError, RetryPolicy};
use crate::service::{Catalog, ServiceClient, ServiceError, ServiceErrorKind};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default worker pool bound for kind fetches.
pub const DEFAULT_DISCOVERY_PARALLELISM: usize = 5;

/// One kind that could not be fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindFailure {
    pub kind: ResourceKind,
    pub message: String,
}

/// Discovery failures abort the reconciliation pass.
#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    #[error("failed to resolve project `{name}`: {error}")]
    Resolve { name: String, error: ServiceError },

    #[error("discovery incomplete: {}", format_failures(.failures))]
    Incomplete { failures: Vec<KindFailure> },

    #[error("discovery cancelled")]
    Cancelled,
}

fn format_failures(failures: &[KindFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.kind, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Counters observed during one discovery pass.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DiscoveryStats {
    /// Transient-failure retries across all fetches.
    pub retries: u32,
    pub duration: Duration,
}

/// Result of one discovery pass.
#[derive(Debug, Clone)]
pub struct DiscoveryOutput {
    /// Stable project identifier, or the input name for a project that does
    /// not exist yet (the create path).
    pub project_id: String,
    pub current: ProjectState,
    pub stats: DiscoveryStats,
}

/// Fetches the current state of a project.
pub struct DiscoveryEngine {
    client: Arc<dyn ServiceClient>,
    catalog: Arc<dyn Catalog>,
    retry: RetryPolicy,
    max_parallel: usize,
}

impl DiscoveryEngine {
    pub fn new(client: Arc<dyn ServiceClient>, catalog: Arc<dyn Catalog>) -> Self {
        Self {
            client,
            catalog,
            retry: RetryPolicy::default(),
            max_parallel: DEFAULT_DISCOVERY_PARALLELISM,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Discover the full current state of `name_or_id`.
    ///
    /// A 24-char hex input is taken as the project id directly; anything
    /// else goes through the catalog. A project that resolves to NotFound
    /// yields an empty current state (the greenfield create path).
    pub async fn discover(
        &self,
        name_or_id: &str,
        org_id: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<DiscoveryOutput, DiscoveryError> {
        let started = Instant::now();
        let mut stats = DiscoveryStats::default();

        let project_id = if looks_like_project_id(name_or_id) {
            debug!(project = name_or_id, "input looks like a project id, skipping catalog");
            name_or_id.to_string()
        } else {
            match run_with_retry(&self.retry, cancel, "catalog.resolve_project", || {
                self.catalog.resolve_project(name_or_id, org_id)
            })
            .await
            {
                Ok(outcome) => {
                    stats.retries += outcome.retries();
                    outcome.value
                }
                Err(RetryError::Cancelled { .. }) => return Err(DiscoveryError::Cancelled),
                Err(RetryError::Service { error, .. })
                    if error.kind == ServiceErrorKind::NotFound =>
                {
                    info!(project = name_or_id, "project not found remotely; empty current state");
                    stats.duration = started.elapsed();
                    return Ok(DiscoveryOutput {
                        project_id: name_or_id.to_string(),
                        current: ProjectState::default(),
                        stats,
                    });
                }
                Err(RetryError::Service { error, .. }) => {
                    return Err(DiscoveryError::Resolve {
                        name: name_or_id.to_string(),
                        error,
                    })
                }
            }
        };

        let (current, fetch_retries, failures, cancelled) =
            self.fetch_all(&project_id, cancel).await;
        stats.retries += fetch_retries;
        stats.duration = started.elapsed();

        if cancelled {
            return Err(DiscoveryError::Cancelled);
        }
        if !failures.is_empty() {
            warn!(
                project = %project_id,
                failed_kinds = failures.len(),
                "discovery incomplete"
            );
            return Err(DiscoveryError::Incomplete { failures });
        }

        info!(
            project = %project_id,
            resources = current.resource_count(),
            retries = stats.retries,
            elapsed_ms = stats.duration.as_millis() as u64,
            "discovery complete"
        );
        Ok(DiscoveryOutput {
            project_id,
            current,
            stats,
        })
    }

    /// Run the five kind fetches through a bounded pool and assemble the
    /// state. Returns (state, retries, failures, cancelled).
    async fn fetch_all(
        &self,
        project_id: &str,
        cancel: &CancelToken,
    ) -> (ProjectState, u32, Vec<KindFailure>, bool) {
        type FetchFuture<'a> =
            Pin<Box<dyn Future<Output = (ResourceKind, Result<(Fetched, u32), RetryError>)> + Send + 'a>>;

        let client = &self.client;
        let retry = &self.retry;

        let fetches: Vec<FetchFuture<'_>> = vec![
            Box::pin(async move {
                let result = run_with_retry(retry, cancel, "service.get_project", || {
                    client.get_project(project_id)
                })
                .await;
                let mapped = match result {
                    Ok(outcome) => {
                        let retries = outcome.retries();
                        Ok((Fetched::Project(Some(outcome.value)), retries))
                    }
                    Err(RetryError::Service { error, attempts })
                        if error.kind == ServiceErrorKind::NotFound =>
                    {
                        Ok((Fetched::Project(None), attempts.saturating_sub(1)))
                    }
                    Err(e) => Err(e),
                };
                (ResourceKind::Project, mapped)
            }),
            Box::pin(async move {
                let result = run_with_retry(retry, cancel, "service.list_clusters", || {
                    client.list_clusters(project_id)
                })
                .await
                .map(|o| (Fetched::Clusters(o.value), o.attempts.saturating_sub(1)));
                (ResourceKind::Cluster, result)
            }),
            Box::pin(async move {
                let result = run_with_retry(retry, cancel, "service.list_users", || {
                    client.list_users(project_id)
                })
                .await
                .map(|o| (Fetched::Users(o.value), o.attempts.saturating_sub(1)));
                (ResourceKind::DatabaseUser, result)
            }),
            Box::pin(async move {
                let result = run_with_retry(retry, cancel, "service.list_roles", || {
                    client.list_roles(project_id)
                })
                .await
                .map(|o| (Fetched::Roles(o.value), o.attempts.saturating_sub(1)));
                (ResourceKind::DatabaseRole, result)
            }),
            Box::pin(async move {
                let result = run_with_retry(retry, cancel, "service.list_network_entries", || {
                    client.list_network_entries(project_id)
                })
                .await
                .map(|o| (Fetched::Networks(o.value), o.attempts.saturating_sub(1)));
                (ResourceKind::NetworkAccess, result)
            }),
        ];

        let mut pool = FuturesUnordered::new();
        let mut pending = fetches.into_iter();
        for fetch in pending.by_ref().take(self.max_parallel) {
            pool.push(fetch);
        }

        let mut current = ProjectState::default();
        let mut retries = 0u32;
        let mut failures = Vec::new();
        let mut cancelled = false;

        while let Some((kind, result)) = pool.next().await {
            if let Some(next) = pending.next() {
                pool.push(next);
            }
            match result {
                Ok((fetched, fetch_retries)) => {
                    retries += fetch_retries;
                    match fetched {
                        Fetched::Project(observation) => {
                            if let Some(obs) = observation {
                                let mut project = obs.resource;
                                if project.spec.organization_id.is_none() {
                                    project.spec.organization_id = Some(obs.organization_id);
                                }
                                current.project = Some(project);
                            }
                        }
                        Fetched::Clusters(clusters) => current.clusters = clusters,
                        Fetched::Users(users) => current.users = users,
                        Fetched::Roles(roles) => current.roles = roles,
                        Fetched::Networks(entries) => current.network_entries = entries,
                    }
                }
                Err(RetryError::Cancelled { .. }) => {
                    cancelled = true;
                }
                Err(error) => {
                    retries += error.attempts().saturating_sub(1);
                    failures.push(KindFailure {
                        kind,
                        message: error.to_string(),
                    });
                }
            }
        }

        // Current state must obey the same identity/default rules as the
        // desired state so the diff compares apples to apples.
        current.normalize();
        (current, retries, failures, cancelled)
    }
}

enum Fetched {
    Project(Option<crate::service::ProjectObservation>),
    Clusters(Vec<crate::model::Resource<crate::model::ClusterSpec>>),
    Users(Vec<crate::model::Resource<crate::model::DatabaseUserSpec>>),
    Roles(Vec<crate::model::Resource<crate::model::DatabaseRoleSpec>>),
    Networks(Vec<crate::model::Resource<crate::model::NetworkAccessSpec>>),
}
