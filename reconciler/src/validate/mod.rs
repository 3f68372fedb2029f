//! Desired-state validation
//!
//! Structural, semantic, and cross-resource checks over the merged desired
//! state. Produces a list of issues tagged error/warning/info with a
//! machine-readable code; strict mode promotes every warning to an error.
//! Validation never mutates the state and never talks to the service.

mod graph;
mod rules;

pub use graph::find_dependency_cycle;

use crate::model::ProjectState;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How bad an issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Machine-readable issue codes. Closed set; renderers and tests match on
/// these rather than message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    NameInvalid,
    RegionMissing,
    DiskSizeOutOfRange,
    AutoscalingRange,
    ReplicationTopology,
    BiConnectorReadPreference,
    RolesEmpty,
    RoleUnresolved,
    RoleShadowsBuiltIn,
    PrivilegeActionsEmpty,
    ScopeUnresolved,
    NetworkSelectorInvalid,
    IpInvalid,
    CidrInvalid,
    NetworkEntryExpired,
    DependsOnUnresolved,
    DependencyCycle,
    DuplicateIdentity,
    OrgIdMissing,
}

impl std::fmt::Display for IssueCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // snake_case, same as the serialized form.
        let s = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
        f.write_str(s.trim_matches('"'))
    }
}

/// One validation finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub code: IssueCode,
    /// Resource the issue is about, e.g. `cluster/c0`.
    pub path: String,
    /// Offending field within the resource, if narrower than the whole spec.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl Issue {
    pub fn error(code: IssueCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            path: path.into(),
            field: None,
            message: message.into(),
        }
    }

    pub fn warning(code: IssueCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, path, message)
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} {}", self.severity, self.path, self.message)
    }
}

/// Aggregated validation outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub issues: Vec<Issue>,
    /// Whether strict promotion was applied.
    pub strict: bool,
}

impl ValidationReport {
    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }
}

/// The validator. Stateless apart from its mode.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    strict: bool,
}

impl Validator {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    /// Run all checks over the desired state.
    pub fn validate(&self, desired: &ProjectState) -> ValidationReport {
        let mut issues = Vec::new();

        rules::check_project(desired, &mut issues);
        rules::check_clusters(desired, &mut issues);
        rules::check_users(desired, &mut issues);
        rules::check_roles(desired, &mut issues);
        rules::check_network_entries(desired, &mut issues);
        rules::check_depends_on(desired, &mut issues);
        rules::check_identity_collisions(desired, &mut issues);

        if let Some(cycle) = graph::find_dependency_cycle(desired) {
            issues.push(Issue::error(
                IssueCode::DependencyCycle,
                cycle.first().cloned().unwrap_or_default(),
                format!("dependency cycle: {}", cycle.join(" -> ")),
            ));
        }

        if self.strict {
            for issue in &mut issues {
                if issue.severity == Severity::Warning {
                    issue.severity = Severity::Error;
                }
            }
        }

        debug!(
            errors = issues.iter().filter(|i| i.severity == Severity::Error).count(),
            warnings = issues.iter().filter(|i| i.severity == Severity::Warning).count(),
            strict = self.strict,
            "validation finished"
        );
        ValidationReport {
            issues,
            strict: self.strict,
        }
    }
}
