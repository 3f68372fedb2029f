//! Reconciliation configuration
//!
//! The option surface the CLI adapter maps onto. Defaults read environment
//! overrides so operators can tune a deployment without new flags.

use crate::dryrun::DryRunMode;
use std::time::Duration;

/// Options recognized by the core. See the configuration table in the
/// project docs for semantics.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Simulate instead of executing, at the given depth.
    pub dry_run: Option<DryRunMode>,
    /// Suppress the approval gate for destructive plans.
    pub auto_approve: bool,
    /// Never delete; treat existing-resource conflicts as skips.
    pub preserve_existing: bool,
    /// Worker cap shared across discovery and execution stages.
    pub max_parallel: usize,
    /// Proceed to later stages after a stage records failures.
    pub continue_on_error: bool,
    /// Top-level deadline for one pass.
    pub timeout: Duration,
    /// Continuous mode.
    pub watch: bool,
    pub watch_interval: Duration,
    /// Unknown manifest fields and validation warnings become errors.
    pub strict_mode: bool,
    /// Forwarded to the loader's env templating; the core only carries it.
    pub strict_env: bool,
    /// Diff treats timestamps as significant (enabled by `--detailed`).
    pub compare_timestamps: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            dry_run: None,
            auto_approve: false,
            preserve_existing: false,
            // RECONCILE_MAX_PARALLEL: worker cap (default 5)
            max_parallel: std::env::var("RECONCILE_MAX_PARALLEL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            continue_on_error: false,
            // RECONCILE_TIMEOUT_SECS: pass deadline (default 30 minutes)
            timeout: std::env::var("RECONCILE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or_else(|| Duration::from_secs(30 * 60)),
            watch: false,
            // RECONCILE_WATCH_INTERVAL_SECS: watch cadence (default 60s)
            watch_interval: std::env::var("RECONCILE_WATCH_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or_else(|| Duration::from_secs(60)),
            strict_mode: false,
            strict_env: false,
            compare_timestamps: false,
        }
    }
}

impl ReconcileConfig {
    /// Reject contradictory combinations before any work starts.
    pub fn validate(&self) -> Result<(), String> {
        if self.watch && self.dry_run.is_some() {
            return Err("watch mode and dry-run are mutually exclusive".to_string());
        }
        if self.max_parallel == 0 {
            return Err("maxParallel must be at least 1".to_string());
        }
        if self.watch && self.watch_interval < Duration::from_secs(1) {
            return Err("watchInterval must be at least 1s".to_string());
        }
        if self.timeout < Duration::from_secs(1) {
            return Err("timeout must be at least 1s".to_string());
        }
        Ok(())
    }
}
