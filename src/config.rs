use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_LOG_FILTER: &str = "info";

/// Tunables for the engine and its batch sweep.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sweep_interval_secs: u64,
    pub stale_issue_days: i64,
    pub stale_issue_min_frequency: u32,
    pub max_comment_chars: usize,
    pub max_reviews_per_sweep: usize,
    /// Stored reviews that failed analysis this many times are no longer loaded.
    pub max_analysis_attempts: u32,
    pub sweep_budget_ms: u64,
    pub report_budget_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60 * 60,
            stale_issue_days: 30,
            stale_issue_min_frequency: 3,
            max_comment_chars: 10_000,
            max_reviews_per_sweep: 5_000,
            max_analysis_attempts: 3,
            sweep_budget_ms: 30_000,
            report_budget_ms: 10_000,
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid engine config {}", path.display()))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn sweep_budget(&self) -> Duration {
        Duration::from_millis(self.sweep_budget_ms)
    }

    pub fn report_budget(&self) -> Duration {
        Duration::from_millis(self.report_budget_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_hourly_sweep() {
        let config = EngineConfig::default();
        assert_eq!(config.sweep_interval(), Duration::from_secs(3600));
        assert_eq!(config.stale_issue_days, 30);
        assert_eq!(config.stale_issue_min_frequency, 3);
        assert_eq!(config.max_analysis_attempts, 3);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "sweep_interval_secs": 120 }"#).unwrap();
        assert_eq!(config.sweep_interval_secs, 120);
        assert_eq!(config.max_comment_chars, 10_000);
    }
}
