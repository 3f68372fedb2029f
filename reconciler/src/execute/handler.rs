//! Kind handlers
//!
//! One dispatch point per (kind, operation type) pair. Handlers call the
//! service under the shared retry policy and, for clusters, poll readiness
//! until the resource settles. All waits race the cancellation token.

use crate::cancel::CancelToken;
use crate::diff::{Operation, OperationType, ResourcePayload};
use crate::model::ResourceIdentity;
use crate::retry::{run_with_retry, RetryError, RetryPolicy};
use crate::service::{ServiceClient, ServiceError, ServiceErrorKind};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Default interval between readiness polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Everything a handler needs for one dispatch.
pub(super) struct HandlerContext<'a> {
    pub client: &'a Arc<dyn ServiceClient>,
    pub retry: &'a RetryPolicy,
    pub project_id: &'a str,
    pub preserve_existing: bool,
    pub poll_interval: Duration,
    pub cancel: &'a CancelToken,
}

/// Successful handler result.
#[derive(Debug, Clone, Default)]
pub(super) struct HandlerOutput {
    /// Service-assigned identifier, when the operation created something.
    pub resource_id: Option<String>,
    /// Service call attempts across the dispatch (retries included).
    pub attempts: u32,
}

/// How a dispatch ended short of success.
#[derive(Debug, Clone)]
pub(super) enum DispatchFailure {
    /// Create hit an existing resource under preserveExisting.
    ConflictSkip { attempts: u32 },
    /// Terminal failure; the message is operator-facing.
    Failed {
        kind: ServiceErrorKind,
        message: String,
        attempts: u32,
    },
    Cancelled,
}

impl DispatchFailure {
    fn internal(message: impl Into<String>) -> Self {
        DispatchFailure::Failed {
            kind: ServiceErrorKind::Unknown,
            message: message.into(),
            attempts: 0,
        }
    }

    fn from_retry(error: RetryError) -> Self {
        match error {
            RetryError::Cancelled { .. } => DispatchFailure::Cancelled,
            RetryError::Service { error, attempts } => DispatchFailure::Failed {
                kind: error.kind,
                message: error.to_string(),
                attempts,
            },
        }
    }
}

/// Dispatch one operation to its kind handler.
pub(super) async fn dispatch(
    ctx: &HandlerContext<'_>,
    operation: &Operation,
) -> Result<HandlerOutput, DispatchFailure> {
    debug!(op = %operation, project = ctx.project_id, "dispatching");
    match (&operation.payload, operation.op_type) {
        (ResourcePayload::Project { desired: Some(p), .. }, OperationType::Create) => {
            let out = call(ctx, "project.create", || ctx.client.create_project(p)).await?;
            Ok(HandlerOutput {
                resource_id: Some(out.0),
                attempts: out.1,
            })
        }
        (ResourcePayload::Project { desired: Some(p), .. }, OperationType::Update) => {
            let out = call(ctx, "project.update", || {
                ctx.client.update_project(ctx.project_id, p)
            })
            .await?;
            Ok(HandlerOutput {
                resource_id: None,
                attempts: out.1,
            })
        }

        (ResourcePayload::Cluster { desired: Some(c), .. }, OperationType::Create) => {
            let created = match call(ctx, "cluster.create", || {
                ctx.client.create_cluster(ctx.project_id, c)
            })
            .await
            {
                Ok(out) => out,
                Err(DispatchFailure::Failed {
                    kind: ServiceErrorKind::Conflict,
                    attempts,
                    ..
                }) if ctx.preserve_existing => {
                    info!(op = %operation, "cluster already exists; skipping (preserveExisting)");
                    return Err(DispatchFailure::ConflictSkip { attempts });
                }
                Err(other) => return Err(other),
            };
            let attempts =
                created.1 + wait_for_cluster_ready(ctx, &c.metadata.name).await?;
            Ok(HandlerOutput {
                resource_id: Some(created.0),
                attempts,
            })
        }
        (ResourcePayload::Cluster { desired: Some(c), .. }, OperationType::Update) => {
            let name = c.metadata.name.clone();
            let out = call(ctx, "cluster.update", || {
                ctx.client.update_cluster(ctx.project_id, &name, c)
            })
            .await?;
            let attempts = out.1 + wait_for_cluster_ready(ctx, &name).await?;
            Ok(HandlerOutput {
                resource_id: None,
                attempts,
            })
        }
        (ResourcePayload::Cluster { current: Some(c), .. }, OperationType::Delete) => {
            let name = c.metadata.name.clone();
            let out = call_tolerating_not_found(ctx, "cluster.delete", || {
                ctx.client.delete_cluster(ctx.project_id, &name)
            })
            .await?;
            let attempts = out + wait_for_cluster_gone(ctx, &name).await?;
            Ok(HandlerOutput {
                resource_id: None,
                attempts,
            })
        }

        (ResourcePayload::DatabaseUser { desired: Some(u), .. }, OperationType::Create) => {
            match call(ctx, "user.create", || {
                ctx.client.create_user(ctx.project_id, u)
            })
            .await
            {
                Ok(out) => Ok(HandlerOutput {
                    resource_id: Some(out.0),
                    attempts: out.1,
                }),
                Err(DispatchFailure::Failed {
                    kind: ServiceErrorKind::Conflict,
                    attempts,
                    ..
                }) if ctx.preserve_existing => Err(DispatchFailure::ConflictSkip { attempts }),
                Err(other) => Err(other),
            }
        }
        (ResourcePayload::DatabaseUser { desired: Some(u), .. }, OperationType::Update) => {
            let (username, auth_db) = user_identity(&operation.identity);
            let out = call(ctx, "user.update", || {
                ctx.client.update_user(ctx.project_id, &username, &auth_db, u)
            })
            .await?;
            Ok(HandlerOutput {
                resource_id: None,
                attempts: out.1,
            })
        }
        (ResourcePayload::DatabaseUser { .. }, OperationType::Delete) => {
            let (username, auth_db) = user_identity(&operation.identity);
            let attempts = call_tolerating_not_found(ctx, "user.delete", || {
                ctx.client.delete_user(ctx.project_id, &username, &auth_db)
            })
            .await?;
            Ok(HandlerOutput {
                resource_id: None,
                attempts,
            })
        }

        (ResourcePayload::DatabaseRole { desired: Some(r), .. }, OperationType::Create) => {
            match call(ctx, "role.create", || {
                ctx.client.create_role(ctx.project_id, r)
            })
            .await
            {
                Ok(out) => Ok(HandlerOutput {
                    resource_id: Some(out.0),
                    attempts: out.1,
                }),
                Err(DispatchFailure::Failed {
                    kind: ServiceErrorKind::Conflict,
                    attempts,
                    ..
                }) if ctx.preserve_existing => Err(DispatchFailure::ConflictSkip { attempts }),
                Err(other) => Err(other),
            }
        }
        (ResourcePayload::DatabaseRole { desired: Some(r), .. }, OperationType::Update) => {
            let (role_name, database) = role_identity(&operation.identity);
            let out = call(ctx, "role.update", || {
                ctx.client
                    .update_role(ctx.project_id, &role_name, &database, r)
            })
            .await?;
            Ok(HandlerOutput {
                resource_id: None,
                attempts: out.1,
            })
        }
        (ResourcePayload::DatabaseRole { .. }, OperationType::Delete) => {
            let (role_name, database) = role_identity(&operation.identity);
            let attempts = call_tolerating_not_found(ctx, "role.delete", || {
                ctx.client.delete_role(ctx.project_id, &role_name, &database)
            })
            .await?;
            Ok(HandlerOutput {
                resource_id: None,
                attempts,
            })
        }

        (ResourcePayload::NetworkAccess { desired: Some(n), .. }, OperationType::Create) => {
            match call(ctx, "network.create", || {
                ctx.client.create_network_entry(ctx.project_id, n)
            })
            .await
            {
                Ok(out) => Ok(HandlerOutput {
                    resource_id: Some(out.0),
                    attempts: out.1,
                }),
                Err(DispatchFailure::Failed {
                    kind: ServiceErrorKind::Conflict,
                    attempts,
                    ..
                }) if ctx.preserve_existing => Err(DispatchFailure::ConflictSkip { attempts }),
                Err(other) => Err(other),
            }
        }
        (ResourcePayload::NetworkAccess { desired: Some(n), .. }, OperationType::Update) => {
            let selector = network_selector(&operation.identity);
            let out = call(ctx, "network.update", || {
                ctx.client.update_network_entry(ctx.project_id, &selector, n)
            })
            .await?;
            Ok(HandlerOutput {
                resource_id: None,
                attempts: out.1,
            })
        }
        (ResourcePayload::NetworkAccess { .. }, OperationType::Delete) => {
            let selector = network_selector(&operation.identity);
            let attempts = call_tolerating_not_found(ctx, "network.delete", || {
                ctx.client.delete_network_entry(ctx.project_id, &selector)
            })
            .await?;
            Ok(HandlerOutput {
                resource_id: None,
                attempts,
            })
        }

        // NoChange never reaches the executor, and payload/type mismatches
        // cannot be produced by the diff engine.
        _ => Err(DispatchFailure::internal(format!(
            "internal: no handler for {operation}"
        ))),
    }
}

/// One retried service call. Failures keep their service classification so
/// create handlers can reclassify conflicts under preserveExisting.
async fn call<T, F, Fut>(
    ctx: &HandlerContext<'_>,
    what: &str,
    f: F,
) -> Result<(T, u32), DispatchFailure>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ServiceError>>,
{
    run_with_retry(ctx.retry, ctx.cancel, what, f)
        .await
        .map(|outcome| (outcome.value, outcome.attempts))
        .map_err(DispatchFailure::from_retry)
}

/// Like `call`, but a NotFound on delete counts as success: the resource is
/// already gone.
async fn call_tolerating_not_found<F, Fut>(
    ctx: &HandlerContext<'_>,
    what: &str,
    f: F,
) -> Result<u32, DispatchFailure>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), ServiceError>>,
{
    match run_with_retry(ctx.retry, ctx.cancel, what, f).await {
        Ok(outcome) => Ok(outcome.attempts),
        Err(RetryError::Service { error, attempts })
            if error.kind == ServiceErrorKind::NotFound =>
        {
            debug!(what, "target already absent; treating delete as success");
            Ok(attempts)
        }
        Err(e) => Err(DispatchFailure::from_retry(e)),
    }
}

/// Poll cluster state until Ready. The per-operation timeout is enforced by
/// the executor around the whole dispatch; this loop only ends on readiness,
/// an error state, or cancellation.
async fn wait_for_cluster_ready(
    ctx: &HandlerContext<'_>,
    name: &str,
) -> Result<u32, DispatchFailure> {
    let mut attempts = 0u32;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(ctx.poll_interval) => {}
            _ = ctx.cancel.cancelled() => return Err(DispatchFailure::Cancelled),
        }

        let observation = call(ctx, "cluster.get", || {
            ctx.client.get_cluster(ctx.project_id, name)
        })
        .await?;
        attempts += observation.1;

        let state = observation.0.state;
        if state.is_ready() {
            debug!(cluster = name, "cluster ready");
            return Ok(attempts);
        }
        if state == crate::model::ClusterState::Deleting {
            return Err(DispatchFailure::Failed {
                kind: ServiceErrorKind::Unknown,
                message: format!("cluster `{name}` entered Deleting while waiting for readiness"),
                attempts,
            });
        }
        debug!(cluster = name, state = ?state, "cluster not ready yet");
    }
}

/// Poll until the cluster is gone (get returns NotFound).
async fn wait_for_cluster_gone(
    ctx: &HandlerContext<'_>,
    name: &str,
) -> Result<u32, DispatchFailure> {
    let mut attempts = 0u32;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(ctx.poll_interval) => {}
            _ = ctx.cancel.cancelled() => return Err(DispatchFailure::Cancelled),
        }

        match run_with_retry(ctx.retry, ctx.cancel, "cluster.get", || {
            ctx.client.get_cluster(ctx.project_id, name)
        })
        .await
        {
            Ok(outcome) => {
                attempts += outcome.attempts;
                debug!(cluster = name, state = ?outcome.value.state, "still deleting");
            }
            Err(RetryError::Service { error, attempts: a })
                if error.kind == ServiceErrorKind::NotFound =>
            {
                attempts += a;
                return Ok(attempts);
            }
            Err(e) => return Err(DispatchFailure::from_retry(e)),
        }
    }
}

fn user_identity(identity: &ResourceIdentity) -> (String, String) {
    match identity {
        ResourceIdentity::DatabaseUser {
            username,
            auth_database,
        } => (username.clone(), auth_database.clone()),
        other => (other.short(), String::new()),
    }
}

fn role_identity(identity: &ResourceIdentity) -> (String, String) {
    match identity {
        ResourceIdentity::DatabaseRole {
            role_name,
            database_name,
        } => (role_name.clone(), database_name.clone()),
        other => (other.short(), String::new()),
    }
}

fn network_selector(identity: &ResourceIdentity) -> String {
    match identity {
        ResourceIdentity::NetworkAccess { selector } => selector.clone(),
        other => other.short(),
    }
}
