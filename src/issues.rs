use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::{DeliveryError, LockPoisoned};
use crate::models::{IssueCategory, SentimentScore, Severity, Trend, TrendingIssue};

// Overall or any single aspect below these marks a negative signal.
const NEGATIVE_OVERALL_TRIGGER: f64 = -0.5;
const NEGATIVE_ASPECT_TRIGGER: f64 = -0.6;

/// Issues seen more often than this raise an attention flag.
pub const ESCALATION_FREQUENCY: u32 = 5;

type IssueKey = (String, IssueCategory);

pub fn is_negative_signal(score: &SentimentScore) -> bool {
    score.overall < NEGATIVE_OVERALL_TRIGGER
        || score
            .aspects
            .iter()
            .any(|(_, value)| value < NEGATIVE_ASPECT_TRIGGER)
}

/// Most negative aspect, first in aspect order on ties. Falls back to
/// `General` when no aspect is negative or the overall polarity is worse.
pub fn worst_category(score: &SentimentScore) -> IssueCategory {
    let mut worst: Option<(IssueCategory, f64)> = None;

    for (aspect, value) in score.aspects.iter() {
        if value >= 0.0 {
            continue;
        }
        if worst.map_or(true, |(_, current)| value < current) {
            worst = Some((aspect.into(), value));
        }
    }

    match worst {
        Some((category, value)) if score.overall >= value => category,
        _ => IssueCategory::General,
    }
}

/// Severity of a single triggering score. Boundaries are strict.
pub fn classify_severity(score: &SentimentScore) -> Severity {
    let overall = score.overall.abs();
    let worst_aspect = score
        .aspects
        .iter()
        .map(|(_, value)| value.abs())
        .fold(0.0, f64::max);

    if overall > 0.8 || worst_aspect > 0.9 {
        Severity::Critical
    } else if overall > 0.6 || worst_aspect > 0.7 {
        Severity::High
    } else if overall > 0.4 || worst_aspect > 0.5 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Occurrence rate per day since first detection, with a one day floor.
pub fn classify_trend(frequency: u32, first_detected: DateTime<Utc>, now: DateTime<Utc>) -> Trend {
    let elapsed_days = (now - first_detected).num_seconds() as f64 / 86_400.0;
    let rate_per_day = frequency as f64 / elapsed_days.max(1.0);

    if rate_per_day > 2.0 {
        Trend::Increasing
    } else if rate_per_day < 0.5 {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AttentionFlag {
    pub facility_id: String,
    pub category: IssueCategory,
    pub description: String,
    pub severity: Severity,
    pub frequency: u32,
    pub raised_at: DateTime<Utc>,
}

/// Receives escalations. Delivery failures are logged and never affect analysis.
pub trait AttentionSink: Send + Sync {
    fn raise(&self, flag: &AttentionFlag) -> Result<(), DeliveryError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogAttentionSink;

impl AttentionSink for LogAttentionSink {
    fn raise(&self, flag: &AttentionFlag) -> Result<(), DeliveryError> {
        tracing::warn!(
            facility_id = %flag.facility_id,
            category = flag.category.as_str(),
            severity = flag.severity.as_str(),
            frequency = flag.frequency,
            raised_at = %flag.raised_at,
            "Trending issue needs attention: {}",
            flag.description
        );
        Ok(())
    }
}

/// Registry of trending issues keyed by (facility, category).
///
/// All mutations go through the write lock; readers get cloned snapshots so
/// they never observe a half-applied update.
pub struct IssueTracker {
    registry: RwLock<HashMap<IssueKey, TrendingIssue>>,
    sink: Arc<dyn AttentionSink>,
}

impl IssueTracker {
    pub fn new(sink: Arc<dyn AttentionSink>) -> Self {
        Self {
            registry: RwLock::new(HashMap::new()),
            sink,
        }
    }

    /// Fold one negative score for `facility_id` into the registry and return
    /// the resulting issue.
    pub fn record(
        &self,
        facility_id: &str,
        score: &SentimentScore,
        now: DateTime<Utc>,
    ) -> Result<TrendingIssue, LockPoisoned> {
        let category = worst_category(score);
        // Latest trigger only, not a running aggregate, so severity can go down.
        let severity = classify_severity(score);

        let issue = {
            let mut registry = self.registry.write().map_err(|_| LockPoisoned)?;
            let key = (facility_id.to_string(), category);

            let issue = registry
                .entry(key)
                .and_modify(|issue| {
                    issue.frequency += 1;
                    if now > issue.last_updated {
                        issue.last_updated = now;
                    }
                    issue.trend =
                        classify_trend(issue.frequency, issue.first_detected, issue.last_updated);
                    issue.severity = severity;
                })
                .or_insert_with(|| TrendingIssue {
                    category,
                    description: category.description().to_string(),
                    frequency: 1,
                    severity,
                    trend: Trend::Stable,
                    affected_facilities: BTreeSet::from([facility_id.to_string()]),
                    first_detected: now,
                    last_updated: now,
                });
            issue.clone()
        };

        tracing::debug!(
            facility_id,
            category = category.as_str(),
            frequency = issue.frequency,
            severity = issue.severity.as_str(),
            trend = issue.trend.as_str(),
            "Trending issue updated"
        );

        if issue.severity == Severity::Critical || issue.frequency > ESCALATION_FREQUENCY {
            let flag = AttentionFlag {
                facility_id: facility_id.to_string(),
                category,
                description: issue.description.clone(),
                severity: issue.severity,
                frequency: issue.frequency,
                raised_at: now,
            };
            if let Err(e) = self.sink.raise(&flag) {
                tracing::warn!(error = %e, facility_id, "Could not deliver attention flag");
            }
        }

        Ok(issue)
    }

    pub fn snapshot(&self) -> Result<Vec<TrendingIssue>, LockPoisoned> {
        let registry = self.registry.read().map_err(|_| LockPoisoned)?;
        Ok(registry.values().cloned().collect())
    }

    /// All issues, most frequent first.
    pub fn trending(&self) -> Result<Vec<TrendingIssue>, LockPoisoned> {
        let mut issues = self.snapshot()?;
        sort_by_frequency(&mut issues);
        Ok(issues)
    }

    /// Drop issues idle for more than `max_age_days` that never reached `min_frequency`.
    pub fn prune(
        &self,
        now: DateTime<Utc>,
        max_age_days: i64,
        min_frequency: u32,
    ) -> Result<usize, LockPoisoned> {
        let max_age = Duration::days(max_age_days);
        let mut registry = self.registry.write().map_err(|_| LockPoisoned)?;
        let before = registry.len();

        registry.retain(|_, issue| {
            !(now - issue.last_updated > max_age && issue.frequency < min_frequency)
        });

        let removed = before - registry.len();
        if removed > 0 {
            tracing::info!(removed, remaining = registry.len(), "Pruned stale trending issues");
        }
        Ok(removed)
    }
}

pub fn sort_by_frequency(issues: &mut [TrendingIssue]) {
    issues.sort_by(|a, b| {
        b.frequency
            .cmp(&a.frequency)
            .then(b.last_updated.cmp(&a.last_updated))
            .then(a.category.cmp(&b.category))
            .then(a.affected_facilities.cmp(&b.affected_facilities))
    });
}
