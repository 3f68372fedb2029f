//! Executor and discovery behavior under failure, cancellation, and
//! asynchronous readiness.

mod common;

use common::{load_yaml, FakeService, FixedApproval, ORG_ID};
use reconciler::execute::{Executor, ExecutorConfig};
use reconciler::plan::OperationStatus;
use reconciler::{
    exit_code_for_result, CancelReason, CancelToken, DatabaseUserSpec, ReconcileConfig,
    ReconcileOutcome, Reconciler, Resource, ResourceMetadata, RetryPolicy, ServiceError,
};
use std::sync::Arc;
use std::time::Duration;

fn reconciler_with(service: &Arc<FakeService>, config: ReconcileConfig) -> Reconciler {
    Reconciler::new(service.clone(), service.clone(), config)
        .expect("config must validate")
        .with_retry(RetryPolicy::default().without_jitter())
        .with_approval_hook(Arc::new(FixedApproval(true)))
}

fn three_networks_and_a_role() -> String {
    r#"
resources:
  - kind: NetworkAccess
    projectName: platform
    metadata:
      name: net-a
    spec:
      ipAddress: 10.0.0.1
  - kind: NetworkAccess
    projectName: platform
    metadata:
      name: net-b
    spec:
      ipAddress: 10.0.0.2
  - kind: NetworkAccess
    projectName: platform
    metadata:
      name: net-c
    spec:
      ipAddress: 10.0.0.3
  - kind: DatabaseRole
    projectName: platform
    metadata:
      name: auditor
    spec:
      roleName: appAuditor
      databaseName: appdb
      privileges:
        - actions: [FIND]
          resource:
            databaseName: appdb
"#
    .to_string()
}

#[tokio::test(start_paused = true)]
async fn transient_discovery_failures_are_retried_and_counted() {
    let service = FakeService::new();
    service.fail_next(
        "list_network_entries",
        vec![
            ServiceError::transient("429 rate limited"),
            ServiceError::transient("503 upstream"),
        ],
    );

    let manifest = format!(
        r#"
kind: Project
metadata:
  name: platform
spec:
  organizationId: {ORG_ID}
"#
    );
    let reconciler = reconciler_with(&service, ReconcileConfig::default());
    let output = reconciler
        .plan(vec![load_yaml(&manifest)], &CancelToken::new())
        .await
        .expect("discovery must recover from transient failures");

    assert_eq!(output.discovery_stats.retries, 2);
    assert_eq!(service.calls("list_network_entries"), 3);
    // The plan itself is unaffected by the retries.
    assert!(output.plan.is_empty());
}

#[tokio::test(start_paused = true)]
async fn exhausted_transient_failures_abort_discovery() {
    let service = FakeService::new();
    service.fail_next(
        "list_clusters",
        (0..5)
            .map(|i| ServiceError::transient(format!("attempt {i}")))
            .collect(),
    );

    let manifest = format!(
        r#"
kind: Project
metadata:
  name: platform
spec:
  organizationId: {ORG_ID}
"#
    );
    let reconciler = reconciler_with(&service, ReconcileConfig::default());
    let err = reconciler
        .plan(vec![load_yaml(&manifest)], &CancelToken::new())
        .await
        .expect_err("discovery must abort once retries exhaust");
    assert!(matches!(err, reconciler::CoreError::Discovery(_)), "{err}");
    assert_eq!(service.calls("list_clusters"), 5);
}

#[tokio::test(start_paused = true)]
async fn cancellation_mid_stage_cancels_pending_and_skips_dependents() {
    let service = FakeService::new();
    let cancel = CancelToken::new();
    // The token fires as the first network create lands, mimicking an
    // interrupt arriving right after the first operation completes.
    service.cancel_after("create_network_entry", 1, cancel.clone());

    let reconciler = reconciler_with(
        &service,
        ReconcileConfig {
            max_parallel: 1,
            ..Default::default()
        },
    );
    let output = reconciler
        .plan(vec![load_yaml(&three_networks_and_a_role())], &CancelToken::new())
        .await
        .expect("planning must succeed");
    assert_eq!(output.plan.stage_count(), 2);

    // Drive the executor directly so the fake's trigger hits the same token
    // the workers observe.
    let executor = Executor::new(
        service.clone(),
        ExecutorConfig {
            max_parallel: 1,
            ..Default::default()
        },
    )
    .with_retry(RetryPolicy::default().without_jitter());
    let result = executor
        .execute(&output.plan, &output.project_id, &cancel)
        .await;

    assert_eq!(result.summary.completed, 1);
    assert_eq!(result.summary.cancelled, 2);
    assert_eq!(result.summary.failed, 0);
    assert_eq!(result.summary.skipped, 1);

    let role_outcome = result
        .outcomes
        .iter()
        .find(|o| o.identity.short() == "appAuditor@appdb")
        .expect("role outcome present");
    assert_eq!(role_outcome.status, OperationStatus::Skipped);
    assert_eq!(role_outcome.error.as_deref(), Some("upstream cancelled"));

    assert_eq!(result.cancelled, Some(CancelReason::User));
    assert_eq!(exit_code_for_result(&result), 3);
}

#[tokio::test(start_paused = true)]
async fn create_conflict_is_skipped_under_preserve_existing() {
    let service = FakeService::new();
    let manifest = r#"
resources:
  - kind: DatabaseUser
    projectName: platform
    metadata:
      name: app
    spec:
      username: app
      roles:
        - roleName: readWrite
          databaseName: appdb
"#;
    let reconciler = reconciler_with(
        &service,
        ReconcileConfig {
            preserve_existing: true,
            ..Default::default()
        },
    );
    let output = reconciler
        .plan(vec![load_yaml(manifest)], &CancelToken::new())
        .await
        .expect("plan must succeed");
    assert_eq!(output.plan.summary.total_operations, 1);

    // The user appears between planning and execution (raced by another
    // actor); the create now conflicts.
    let mut raced = Resource::new(
        ResourceMetadata::named("app"),
        DatabaseUserSpec {
            username: "app".to_string(),
            ..Default::default()
        },
    );
    raced.normalize();
    service.seed_user(raced);

    let executor = Executor::new(
        service.clone(),
        ExecutorConfig {
            preserve_existing: true,
            ..Default::default()
        },
    )
    .with_retry(RetryPolicy::default().without_jitter());
    let result = executor
        .execute(&output.plan, &output.project_id, &CancelToken::new())
        .await;

    assert_eq!(result.summary.failed, 0);
    assert_eq!(result.outcomes[0].status, OperationStatus::SkippedConflict);
    assert!(result.succeeded());
}

#[tokio::test(start_paused = true)]
async fn create_conflict_fails_without_preserve_existing() {
    let service = FakeService::new();
    let manifest = r#"
resources:
  - kind: DatabaseUser
    projectName: platform
    metadata:
      name: app
    spec:
      username: app
      roles:
        - roleName: readWrite
          databaseName: appdb
"#;
    let reconciler = reconciler_with(&service, ReconcileConfig::default());
    let output = reconciler
        .plan(vec![load_yaml(manifest)], &CancelToken::new())
        .await
        .expect("plan must succeed");

    let mut raced = Resource::new(
        ResourceMetadata::named("app"),
        DatabaseUserSpec {
            username: "app".to_string(),
            ..Default::default()
        },
    );
    raced.normalize();
    service.seed_user(raced);

    let executor = Executor::new(service.clone(), ExecutorConfig::default())
        .with_retry(RetryPolicy::default().without_jitter());
    let result = executor
        .execute(&output.plan, &output.project_id, &CancelToken::new())
        .await;

    assert_eq!(result.summary.failed, 1);
    assert_eq!(result.outcomes[0].status, OperationStatus::Failed);
    assert_eq!(exit_code_for_result(&result), 1);
    assert_eq!(result.errors.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stage_failure_skips_later_stages_unless_continue_on_error() {
    // net-a conflicts (seeded below); net-x succeeds. net-b depends on
    // net-a, net-y depends on net-x, both in stage 1.
    let manifest = r#"
resources:
  - kind: NetworkAccess
    projectName: platform
    metadata:
      name: net-a
    spec:
      ipAddress: 10.0.0.1
  - kind: NetworkAccess
    projectName: platform
    metadata:
      name: net-x
    spec:
      ipAddress: 10.0.0.9
  - kind: NetworkAccess
    projectName: platform
    metadata:
      name: net-b
      dependsOn:
        - kind: NetworkAccess
          name: net-a
    spec:
      ipAddress: 10.0.0.2
  - kind: NetworkAccess
    projectName: platform
    metadata:
      name: net-y
      dependsOn:
        - kind: NetworkAccess
          name: net-x
    spec:
      ipAddress: 10.0.0.10
"#;

    for continue_on_error in [false, true] {
        let service = FakeService::new();
        let reconciler = reconciler_with(&service, ReconcileConfig::default());
        let output = reconciler
            .plan(vec![load_yaml(manifest)], &CancelToken::new())
            .await
            .expect("plan must succeed");
        assert_eq!(output.plan.stage_count(), 2);

        // net-a appears remotely before execution, so its create conflicts
        // and fails (preserveExisting off).
        let mut raced = Resource::new(
            ResourceMetadata::named("net-a"),
            reconciler::NetworkAccessSpec {
                ip_address: Some("10.0.0.1".to_string()),
                ..Default::default()
            },
        );
        raced.normalize();
        service.seed_network(raced);

        let executor = Executor::new(
            service.clone(),
            ExecutorConfig {
                continue_on_error,
                ..Default::default()
            },
        )
        .with_retry(RetryPolicy::default().without_jitter());
        let result = executor
            .execute(&output.plan, &output.project_id, &CancelToken::new())
            .await;

        let status_of = |short: &str| {
            result
                .outcomes
                .iter()
                .find(|o| o.identity.short() == short)
                .map(|o| o.status)
                .unwrap()
        };

        assert_eq!(status_of("10.0.0.1"), OperationStatus::Failed);
        assert_eq!(status_of("10.0.0.9"), OperationStatus::Completed);
        if continue_on_error {
            // The healthy chain proceeds; only the failed dependency chain
            // is skipped.
            assert_eq!(status_of("10.0.0.2"), OperationStatus::Skipped);
            assert_eq!(status_of("10.0.0.10"), OperationStatus::Completed);
        } else {
            assert_eq!(status_of("10.0.0.2"), OperationStatus::Skipped);
            assert_eq!(status_of("10.0.0.10"), OperationStatus::Skipped);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn cluster_create_polls_until_ready() {
    let service = FakeService::with_readiness(3);
    let manifest = format!(
        r#"
kind: Project
metadata:
  name: platform
spec:
  organizationId: {ORG_ID}
  clusters:
    - metadata:
        name: slow
      spec:
        provider: AWS
        region: US_EAST_1
        instanceSize: M10
"#
    );
    let reconciler = reconciler_with(&service, ReconcileConfig::default());
    let outcome = reconciler
        .apply(vec![load_yaml(&manifest)], &CancelToken::new())
        .await
        .expect("apply must succeed");
    let result = match outcome {
        ReconcileOutcome::Applied(result) => result,
        ReconcileOutcome::Simulated(_) => panic!("expected execution"),
    };
    assert!(result.succeeded());
    // Three Creating polls plus the final Idle observation.
    assert_eq!(service.calls("get_cluster"), 4);
    // Elapsed covers the simulated polling intervals (virtual time).
    assert!(result.outcomes[0].elapsed >= Duration::from_secs(40));
}

#[tokio::test(start_paused = true)]
async fn watch_mode_reconciles_every_tick() {
    let service = FakeService::new();
    let manifest = format!(
        r#"
kind: Project
metadata:
  name: platform
spec:
  organizationId: {ORG_ID}
"#
    );
    let reconciler = reconciler_with(
        &service,
        ReconcileConfig {
            watch: true,
            watch_interval: Duration::from_secs(60),
            ..Default::default()
        },
    );

    let cancel = CancelToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(150)).await;
        stopper.cancel();
    });

    let ticks = reconciler
        .watch(vec![load_yaml(&manifest)], &cancel)
        .await
        .expect("watch must run");
    // Immediate tick plus t=60 and t=120.
    assert_eq!(ticks, 3);
    assert_eq!(service.calls("resolve_project"), 3);
}

#[tokio::test]
async fn watch_and_dry_run_are_mutually_exclusive() {
    let service = FakeService::new();
    let config = ReconcileConfig {
        watch: true,
        dry_run: Some(reconciler::DryRunMode::Quick),
        ..Default::default()
    };
    let err = Reconciler::new(service.clone(), service.clone(), config)
        .err()
        .expect("contradictory config must be rejected");
    assert!(matches!(err, reconciler::CoreError::Config(_)));
}

#[tokio::test(start_paused = true)]
async fn deadline_cancels_a_stuck_pass() {
    // A cluster that never reports ready, with a 2-minute pass deadline.
    let service = FakeService::with_readiness(u32::MAX);
    let manifest = format!(
        r#"
kind: Project
metadata:
  name: platform
spec:
  organizationId: {ORG_ID}
  clusters:
    - metadata:
        name: stuck
      spec:
        provider: AWS
        region: US_EAST_1
        instanceSize: M10
"#
    );
    let reconciler = reconciler_with(
        &service,
        ReconcileConfig {
            timeout: Duration::from_secs(120),
            ..Default::default()
        },
    );
    let outcome = reconciler
        .apply(vec![load_yaml(&manifest)], &CancelToken::new())
        .await
        .expect("the pass itself completes with a cancelled result");
    let result = match outcome {
        ReconcileOutcome::Applied(result) => result,
        ReconcileOutcome::Simulated(_) => panic!("expected execution"),
    };
    assert_eq!(result.cancelled, Some(CancelReason::Deadline));
    assert_eq!(result.summary.completed, 0);
    assert_eq!(exit_code_for_result(&result), 4);
}
