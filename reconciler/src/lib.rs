//! Declarative reconciliation core for a cloud database service
//!
//! Users describe the desired state of a project — clusters, database
//! users, custom roles, network access entries — in manifests; this crate
//! reconciles the live remote state to match:
//!
//! ```text
//! manifests → merge → validate → desired
//!                                   │
//! service ←──── discovery ────→ current
//!                                   │
//!              diff → DAG → plan → execute | dry-run
//! ```
//!
//! The CLI front end, manifest decoding, the HTTP service client, and output
//! rendering live outside this crate; the core sees them as trait objects
//! ([`service::ServiceClient`], [`service::Catalog`],
//! [`pipeline::ApprovalHook`]) and pure data values.
//!
//! # Entry points
//!
//! - [`Reconciler::plan`]: merge, validate, discover, diff, plan
//! - [`Reconciler::apply`]: plan + execute (or simulate under dry-run)
//! - [`Reconciler::destroy`]: delete everything the project currently holds
//! - [`Reconciler::watch`]: continuous reconciliation on an interval

pub mod cancel;
pub mod config;
pub mod diff;
pub mod discovery;
pub mod dryrun;
pub mod error;
pub mod execute;
pub mod manifest;
pub mod model;
pub mod pipeline;
pub mod plan;
pub mod retry;
pub mod service;
pub mod validate;
pub mod watch;

// Re-export the pipeline surface
pub use config::ReconcileConfig;
pub use error::{exit_code_for_error, exit_code_for_result, CoreError};
pub use pipeline::{ApprovalHook, DenyAll, PlanOutput, Reconciler, ReconcileOutcome};

// Re-export key model types
pub use model::{
    ClusterSpec, DatabaseRoleSpec, DatabaseUserSpec, NetworkAccessSpec, ProjectSpec, ProjectState,
    Resource, ResourceIdentity, ResourceKind, ResourceMetadata, SecretString,
};

// Re-export plan/diff data values consumed by renderers
pub use diff::{FieldChange, Impact, Operation, OperationType, RiskLevel};
pub use dryrun::{DryRunMode, DryRunReport};
pub use execute::{ExecutionResult, ExecutionSummary, OperationOutcome};
pub use plan::{OperationStatus, Plan, PlanArtifact, PlanSummary, PlannedOperation};

// Re-export collaborator contracts
pub use cancel::{CancelReason, CancelToken};
pub use manifest::{LoadResult, ManifestDocument};
pub use retry::RetryPolicy;
pub use service::{Catalog, ServiceClient, ServiceError, ServiceErrorKind};
pub use validate::{Issue, IssueCode, Severity, ValidationReport, Validator};
