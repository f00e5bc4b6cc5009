//! Run metrics.
//!
//! Recorded through the `metrics` facade; the embedding process decides
//! whether a recorder is installed.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const RUNS_TOTAL: &str = "reel_runs_total";
    pub const STEP_DURATION_SECONDS: &str = "reel_step_duration_seconds";
    pub const TIER_RENDERS_TOTAL: &str = "reel_tier_renders_total";
    pub const TIER_FAILURES_TOTAL: &str = "reel_tier_failures_total";
}

/// Record a finished run (`completed` or `failed`).
pub fn record_run(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::RUNS_TOTAL, &labels).increment(1);
}

pub fn record_step_duration(step: &str, duration_secs: f64) {
    let labels = [("step", step.to_string())];
    histogram!(names::STEP_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record which tier produced an artifact.
pub fn record_tier_render(chain: &str, tier: &str) {
    let labels = [("chain", chain.to_string()), ("tier", tier.to_string())];
    counter!(names::TIER_RENDERS_TOTAL, &labels).increment(1);
}

pub fn record_tier_failure(chain: &str, tier: &str) {
    let labels = [("chain", chain.to_string()), ("tier", tier.to_string())];
    counter!(names::TIER_FAILURES_TOTAL, &labels).increment(1);
}
