//! Reconciliation pipeline
//!
//! The façade the CLI adapter drives: merge → validate → discover → diff →
//! plan, then execute, simulate, or loop. Collaborators (service client,
//! catalog, approval hook) are constructor parameters so adapters and tests
//! inject their own.

use crate::cancel::{CancelReason, CancelToken};
use crate::config::ReconcileConfig;
use crate::diff::{destruction_diff, DiffEngine, DiffOptions, DiffResult};
use crate::discovery::{DiscoveryEngine, DiscoveryStats};
use crate::dryrun::{DryRunEvaluator, DryRunReport};
use crate::error::CoreError;
use crate::execute::{ExecutionResult, Executor, ExecutorConfig};
use crate::manifest::{LoadResult, Merger};
use crate::model::ProjectState;
use crate::plan::{Plan, PlanBuilder};
use crate::retry::RetryPolicy;
use crate::service::{Catalog, ServiceClient};
use crate::validate::{ValidationReport, Validator};
use crate::watch::WatchLoop;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Decides whether a plan that requires approval may proceed.
///
/// The CLI adapter wires the interactive prompt here: destructive plans ask
/// for the literal string `destroy` (case-sensitive), high-risk plans for a
/// yes/no answer. The core only sees the boolean.
#[async_trait]
pub trait ApprovalHook: Send + Sync {
    async fn confirm(&self, plan: &Plan) -> bool;
}

/// Default hook for non-interactive use: refuses every gated plan.
pub struct DenyAll;

#[async_trait]
impl ApprovalHook for DenyAll {
    async fn confirm(&self, plan: &Plan) -> bool {
        warn!(
            plan = %plan.id,
            destructive = plan.summary.destructive_count,
            "plan requires approval but no approval hook is wired; refusing"
        );
        false
    }
}

/// Everything the planning half of a pass produced.
#[derive(Debug)]
pub struct PlanOutput {
    pub project_id: String,
    pub desired: ProjectState,
    pub current: ProjectState,
    pub validation: ValidationReport,
    pub diff: DiffResult,
    pub plan: Plan,
    pub discovery_stats: DiscoveryStats,
    /// Merge + loader warnings, forwarded for rendering.
    pub warnings: Vec<String>,
}

/// What a full pass produced.
#[derive(Debug)]
pub enum ReconcileOutcome {
    Applied(ExecutionResult),
    Simulated(DryRunReport),
}

/// The reconciliation core.
pub struct Reconciler {
    client: Arc<dyn ServiceClient>,
    catalog: Arc<dyn Catalog>,
    approval: Arc<dyn ApprovalHook>,
    retry: RetryPolicy,
    config: ReconcileConfig,
}

impl Reconciler {
    /// Build a reconciler. Rejects contradictory configuration up front.
    pub fn new(
        client: Arc<dyn ServiceClient>,
        catalog: Arc<dyn Catalog>,
        config: ReconcileConfig,
    ) -> Result<Self, CoreError> {
        config.validate().map_err(CoreError::Config)?;
        Ok(Self {
            client,
            catalog,
            approval: Arc::new(DenyAll),
            retry: RetryPolicy::default(),
            config,
        })
    }

    pub fn with_approval_hook(mut self, hook: Arc<dyn ApprovalHook>) -> Self {
        self.approval = hook;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The synchronous planning phases: merge → validate → discover → diff →
    /// plan. A validation error aborts before discovery: an invalid desired
    /// state never produces operations.
    pub async fn plan(
        &self,
        documents: Vec<LoadResult>,
        cancel: &CancelToken,
    ) -> Result<PlanOutput, CoreError> {
        let merged = Merger::new(self.config.strict_mode).merge(documents)?;

        let validation = Validator::new(self.config.strict_mode).validate(&merged.desired);
        if validation.has_errors() {
            return Err(CoreError::Validation(validation));
        }

        let org_id = merged
            .desired
            .project
            .as_ref()
            .and_then(|p| p.spec.organization_id.clone());
        let discovery = DiscoveryEngine::new(self.client.clone(), self.catalog.clone())
            .with_retry(self.retry.clone())
            .with_max_parallel(self.config.max_parallel)
            .discover(&merged.project_name, org_id.as_deref(), cancel)
            .await?;

        let diff = DiffEngine::new(DiffOptions {
            preserve_existing: self.config.preserve_existing,
            compare_timestamps: self.config.compare_timestamps,
        })
        .diff(&merged.desired, &discovery.current)?;

        let plan = PlanBuilder::new(&discovery.project_id).build(&diff)?;

        Ok(PlanOutput {
            project_id: discovery.project_id,
            desired: merged.desired,
            current: discovery.current,
            validation,
            diff,
            plan,
            discovery_stats: discovery.stats,
            warnings: merged.warnings,
        })
    }

    /// One full pass: plan, then execute or simulate per configuration.
    pub async fn apply(
        &self,
        documents: Vec<LoadResult>,
        cancel: &CancelToken,
    ) -> Result<ReconcileOutcome, CoreError> {
        self.with_deadline(cancel, |pass_cancel| async move {
            let output = self.plan(documents, &pass_cancel).await?;
            self.finish(output, &pass_cancel).await
        })
        .await
    }

    /// Destroy flow: plan Deletes for everything currently in the project
    /// (honoring Retain policies) and execute them. Always approval-gated.
    pub async fn destroy(
        &self,
        project: &str,
        cancel: &CancelToken,
    ) -> Result<ReconcileOutcome, CoreError> {
        self.with_deadline(cancel, |pass_cancel| async move {
            let discovery = DiscoveryEngine::new(self.client.clone(), self.catalog.clone())
                .with_retry(self.retry.clone())
                .with_max_parallel(self.config.max_parallel)
                .discover(project, None, &pass_cancel)
                .await?;

            let diff = destruction_diff(&discovery.current);
            let plan = PlanBuilder::new(&discovery.project_id).build(&diff)?;
            let output = PlanOutput {
                project_id: discovery.project_id,
                desired: ProjectState::default(),
                current: discovery.current,
                validation: ValidationReport::default(),
                diff,
                plan,
                discovery_stats: discovery.stats,
                warnings: Vec::new(),
            };
            self.finish(output, &pass_cancel).await
        })
        .await
    }

    /// Continuous mode: run `apply` on every tick until cancelled. Returns
    /// the number of ticks. One tick's failure never blocks the next.
    pub async fn watch(
        &self,
        documents: Vec<LoadResult>,
        cancel: &CancelToken,
    ) -> Result<u64, CoreError> {
        if !self.config.watch {
            return Err(CoreError::Config("watch mode is not enabled".to_string()));
        }

        let ticks = WatchLoop::new(self.config.watch_interval)
            .run(cancel, |tick| {
                let documents = documents.clone();
                async move {
                    info!(tick, "reconciliation tick");
                    self.apply(documents, cancel).await.map(|_| ())
                }
            })
            .await;
        Ok(ticks)
    }

    /// Execution half of a pass: approval gate, then simulate or execute.
    async fn finish(
        &self,
        output: PlanOutput,
        cancel: &CancelToken,
    ) -> Result<ReconcileOutcome, CoreError> {
        if let Some(mode) = self.config.dry_run {
            let report =
                DryRunEvaluator::new(mode).evaluate(&output.plan, &output.desired, &output.current);
            return Ok(ReconcileOutcome::Simulated(report));
        }

        if output.plan.summary.requires_approval && !self.config.auto_approve {
            if !self.approval.confirm(&output.plan).await {
                return Err(CoreError::Cancelled(CancelReason::User));
            }
        }

        let executor = Executor::new(
            self.client.clone(),
            ExecutorConfig {
                max_parallel: self.config.max_parallel,
                continue_on_error: self.config.continue_on_error,
                preserve_existing: self.config.preserve_existing,
                ..Default::default()
            },
        )
        .with_retry(self.retry.clone());

        let result = executor
            .execute(&output.plan, &output.project_id, cancel)
            .await;
        Ok(ReconcileOutcome::Applied(result))
    }

    /// Run `f` under a pass-scoped token that fires on the parent token or
    /// on the configured deadline, whichever comes first.
    async fn with_deadline<T, F, Fut>(&self, cancel: &CancelToken, f: F) -> T
    where
        F: FnOnce(CancelToken) -> Fut,
        Fut: Future<Output = T>,
    {
        let pass_cancel = CancelToken::new();
        let parent = cancel.clone();
        let armed = pass_cancel.clone();
        let timeout = self.config.timeout;
        let watchdog = tokio::spawn(async move {
            tokio::select! {
                _ = parent.cancelled() => {
                    armed.cancel_with(parent.reason().unwrap_or(CancelReason::User));
                }
                _ = tokio::time::sleep(timeout) => {
                    warn!(timeout_s = timeout.as_secs(), "pass deadline elapsed");
                    armed.cancel_with(CancelReason::Deadline);
                }
            }
        });

        let out = f(pass_cancel).await;
        watchdog.abort();
        out
    }
}
