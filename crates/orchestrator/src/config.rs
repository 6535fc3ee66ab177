//! Orchestrator tuning knobs, built once at process start.

use std::time::Duration;

/// Poll/backoff and recovery settings.
///
/// The poll interval starts short and doubles up to a cap, bounding
/// provider load during long video renders; the overall budget bounds
/// worst-case job lifetime so the state machine always terminates.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// First wait between status polls.
    pub poll_initial_interval: Duration,
    /// Backoff cap for the poll interval.
    pub poll_max_interval: Duration,
    /// Total wall-clock budget for one video job's poll loop. Exceeding
    /// it fails the job with a timeout diagnostic and refunds.
    pub poll_budget: Duration,
    /// A `Processing` job older than this is considered abandoned and
    /// picked up by the recovery sweep.
    pub stale_after: Duration,
    /// How often the recovery sweep runs.
    pub sweep_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_initial_interval: Duration::from_secs(5),
            poll_max_interval: Duration::from_secs(60),
            poll_budget: Duration::from_secs(30 * 60),
            stale_after: Duration::from_secs(45 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl OrchestratorConfig {
    /// Load from environment variables, falling back to the defaults.
    ///
    /// | Env Var                   | Default |
    /// |---------------------------|---------|
    /// | `POLL_INITIAL_SECS`       | `5`     |
    /// | `POLL_MAX_SECS`           | `60`    |
    /// | `POLL_BUDGET_SECS`        | `1800`  |
    /// | `JOB_STALE_AFTER_SECS`    | `2700`  |
    /// | `RECOVERY_SWEEP_SECS`     | `60`    |
    pub fn from_env() -> Self {
        let secs = |name: &str, default: u64| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(default))
        };
        Self {
            poll_initial_interval: secs("POLL_INITIAL_SECS", 5),
            poll_max_interval: secs("POLL_MAX_SECS", 60),
            poll_budget: secs("POLL_BUDGET_SECS", 30 * 60),
            stale_after: secs("JOB_STALE_AFTER_SECS", 45 * 60),
            sweep_interval: secs("RECOVERY_SWEEP_SECS", 60),
        }
    }
}
