use std::sync::{Arc, Mutex, TryLockError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{AnalysisError, LockPoisoned, ReportGenerationError};
use crate::issues::{self, AttentionSink, IssueTracker, LogAttentionSink};
use crate::lexicon::Lexicon;
use crate::models::{
    AlertType, AnalyticsOverview, InsightReport, RealtimeAlert, Review, SentimentScore, Severity,
    TrendingIssue,
};
use crate::report::{self, NoResponseData, ReportRequest, ResponseRateProvider};
use crate::sentiment::SentimentAnalyzer;
use crate::store::{ReviewStore, ScoreStore};

/// Issues above this frequency count as critical on the dashboard.
const CRITICAL_LIST_FREQUENCY: u32 = 10;

/// Outcome of one batch sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub analyzed: Vec<Uuid>,
    /// Reviews whose analysis failed; they stay pending.
    pub failed: Vec<Uuid>,
    pub pruned: usize,
    /// Another sweep held the guard; nothing was done.
    pub skipped: bool,
    /// The time budget ran out before the queue was drained.
    pub truncated: bool,
}

/// Feedback sentiment engine: scores reviews, tracks trending issues and
/// builds facility reports. Constructed explicitly with its collaborators.
pub struct FeedbackEngine {
    config: EngineConfig,
    analyzer: SentimentAnalyzer,
    reviews: ReviewStore,
    scores: ScoreStore,
    tracker: IssueTracker,
    clock: Arc<dyn Clock>,
    response_rates: Arc<dyn ResponseRateProvider>,
    sweep_guard: Mutex<()>,
}

/// Instant a negative review counts at in the issue registry.
#[derive(Debug, Clone, Copy)]
enum TriggerTime {
    Now,
    ReviewCreated,
}

pub struct FeedbackEngineBuilder {
    config: EngineConfig,
    lexicon: Arc<Lexicon>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn AttentionSink>,
    response_rates: Arc<dyn ResponseRateProvider>,
}

impl FeedbackEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn lexicon(mut self, lexicon: Lexicon) -> Self {
        self.lexicon = Arc::new(lexicon);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn attention_sink(mut self, sink: Arc<dyn AttentionSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn response_rates(mut self, provider: Arc<dyn ResponseRateProvider>) -> Self {
        self.response_rates = provider;
        self
    }

    pub fn build(self) -> FeedbackEngine {
        FeedbackEngine {
            config: self.config,
            analyzer: SentimentAnalyzer::new(self.lexicon),
            reviews: ReviewStore::new(),
            scores: ScoreStore::new(),
            tracker: IssueTracker::new(self.sink),
            clock: self.clock,
            response_rates: self.response_rates,
            sweep_guard: Mutex::new(()),
        }
    }
}

impl FeedbackEngine {
    pub fn builder() -> FeedbackEngineBuilder {
        FeedbackEngineBuilder {
            config: EngineConfig::default(),
            lexicon: Arc::new(Lexicon::default()),
            clock: Arc::new(SystemClock),
            sink: Arc::new(LogAttentionSink),
            response_rates: Arc::new(NoResponseData),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Store a review without analyzing it; the next sweep picks it up.
    pub fn ingest(&self, review: Review) -> Result<bool, LockPoisoned> {
        self.reviews.insert(review)
    }

    /// Store and immediately analyze a submitted review. Resubmitting an
    /// analyzed review returns its stored score without counting it again.
    pub fn add_review(&self, review: Review) -> Result<SentimentScore, AnalysisError> {
        if !self.reviews.insert(review.clone())? {
            if let Some(score) = self.scores.get(&review.id)? {
                tracing::debug!(review_id = %review.id, "Review already analyzed");
                return Ok(score);
            }
        }
        let score = self.analyze(&review)?;
        self.reviews.mark_processed(&review.id)?;
        Ok(score)
    }

    /// Score one review, store the score and feed negative signals to the
    /// issue tracker.
    pub fn analyze(&self, review: &Review) -> Result<SentimentScore, AnalysisError> {
        self.analyze_at(review, self.clock.now())
    }

    fn analyze_at(
        &self,
        review: &Review,
        triggered_at: DateTime<Utc>,
    ) -> Result<SentimentScore, AnalysisError> {
        if !(1..=5).contains(&review.rating) {
            return Err(AnalysisError::InvalidRating(review.rating));
        }
        let len = review.comment.chars().count();
        if len > self.config.max_comment_chars {
            return Err(AnalysisError::CommentTooLong {
                len,
                max: self.config.max_comment_chars,
            });
        }

        let score = self.analyzer.analyze_text(&review.comment);
        self.scores.put(review.id, score.clone())?;

        if issues::is_negative_signal(&score) {
            self.tracker
                .record(&review.facility_id, &score, triggered_at)?;
        }

        Ok(score)
    }

    pub fn score_for(&self, review_id: &Uuid) -> Result<Option<SentimentScore>, LockPoisoned> {
        self.scores.get(review_id)
    }

    /// Analyze pending reviews, then prune stale issues. Never overlaps with
    /// itself: a concurrent call returns a skipped report.
    pub fn run_sweep(&self) -> SweepReport {
        self.sweep(self.config.max_reviews_per_sweep, TriggerTime::Now)
    }

    /// Rebuild issue state from stored history. Each negative review counts
    /// at its own `created_at`, so trends and pruning follow when feedback
    /// was written rather than when it was replayed.
    pub fn replay<I>(&self, reviews: I) -> Result<SweepReport, LockPoisoned>
    where
        I: IntoIterator<Item = Review>,
    {
        for review in reviews {
            self.reviews.insert(review)?;
        }
        Ok(self.sweep(usize::MAX, TriggerTime::ReviewCreated))
    }

    fn sweep(&self, limit: usize, trigger: TriggerTime) -> SweepReport {
        let _guard = match self.sweep_guard.try_lock() {
            Ok(guard) => guard,
            // Guards no data, so a poisoned lock is still usable.
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                tracing::debug!("Sweep already in progress, skipping");
                return SweepReport {
                    skipped: true,
                    ..SweepReport::default()
                };
            }
        };

        let started = Instant::now();
        let deadline = started + self.config.sweep_budget();
        let mut report = SweepReport::default();

        let pending = match self.reviews.unprocessed(limit) {
            Ok(pending) => pending,
            Err(e) => {
                tracing::error!(error = %e, "Could not read pending reviews");
                return report;
            }
        };

        for review in &pending {
            if Instant::now() > deadline {
                report.truncated = true;
                tracing::warn!(
                    remaining = pending.len() - report.analyzed.len() - report.failed.len(),
                    "Sweep time budget exhausted, deferring the rest"
                );
                break;
            }

            let triggered_at = match trigger {
                TriggerTime::Now => self.clock.now(),
                TriggerTime::ReviewCreated => review.created_at,
            };

            match self.analyze_at(review, triggered_at) {
                Ok(_) => match self.reviews.mark_processed(&review.id) {
                    Ok(()) => report.analyzed.push(review.id),
                    Err(e) => {
                        report.failed.push(review.id);
                        tracing::warn!(review_id = %review.id, error = %e, "Could not mark review processed");
                    }
                },
                Err(e) => {
                    report.failed.push(review.id);
                    tracing::warn!(review_id = %review.id, error = %e, "Review analysis failed");
                }
            }
        }

        match self.tracker.prune(
            self.clock.now(),
            self.config.stale_issue_days,
            self.config.stale_issue_min_frequency,
        ) {
            Ok(pruned) => report.pruned = pruned,
            Err(e) => tracing::error!(error = %e, "Could not prune trending issues"),
        }

        tracing::info!(
            analyzed = report.analyzed.len(),
            failed = report.failed.len(),
            pruned = report.pruned,
            truncated = report.truncated,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch sweep finished"
        );

        report
    }

    pub fn get_trending_issues(&self) -> Result<Vec<TrendingIssue>, LockPoisoned> {
        self.tracker.trending()
    }

    pub fn get_critical_issues(&self) -> Result<Vec<TrendingIssue>, LockPoisoned> {
        Ok(self
            .tracker
            .trending()?
            .into_iter()
            .filter(is_critical)
            .collect())
    }

    pub fn get_realtime_alerts(&self) -> Result<Vec<RealtimeAlert>, LockPoisoned> {
        let mut alerts = Vec::new();

        for issue in self.get_critical_issues()? {
            let alert_type = if issue.severity == Severity::Critical {
                AlertType::CriticalIssue
            } else {
                AlertType::RecurringIssue
            };
            for facility_id in &issue.affected_facilities {
                alerts.push(RealtimeAlert {
                    alert_type,
                    message: format!(
                        "{} reported {} times ({})",
                        issue.description,
                        issue.frequency,
                        issue.trend.as_str()
                    ),
                    facility_id: facility_id.clone(),
                    severity: issue.severity,
                    timestamp: issue.last_updated,
                });
            }
        }

        Ok(alerts)
    }

    pub fn get_analytics_overview(&self) -> Result<AnalyticsOverview, LockPoisoned> {
        let issues = self.tracker.snapshot()?;
        let total_reviews = self.reviews.len()?;
        let scored = self.scores.len()?;

        let processing_accuracy = if total_reviews == 0 {
            0.0
        } else {
            (scored.min(total_reviews) as f64 / total_reviews as f64) * 100.0
        };

        Ok(AnalyticsOverview {
            total_reviews,
            total_issues: issues.len(),
            critical_issues: issues.iter().filter(|issue| is_critical(issue)).count(),
            average_rating: self.reviews.average_rating()?,
            processing_accuracy,
            last_updated: self.clock.now(),
        })
    }

    pub fn generate_insight_report(
        &self,
        facility_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<InsightReport, ReportGenerationError> {
        if start > end {
            return Err(ReportGenerationError::InvalidRange { start, end });
        }

        let request = ReportRequest {
            facility_id,
            start,
            end,
            deadline: Instant::now() + self.config.report_budget(),
        };
        let reviews = self.reviews.for_facility(facility_id, start, end)?;
        let issues = self.tracker.snapshot()?;
        let response_rate = self.response_rates.response_rate(facility_id, start, end);

        report::build_insight_report(&request, &reviews, &issues, response_rate, &self.analyzer)
    }
}

fn is_critical(issue: &TrendingIssue) -> bool {
    issue.severity == Severity::Critical || issue.frequency > CRITICAL_LIST_FREQUENCY
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::clock::testing::ManualClock;
    use crate::error::DeliveryError;
    use crate::issues::AttentionFlag;
    use crate::models::{FacilityKind, IssueCategory, ReviewSource, SentimentTrend, Trend};
    use chrono::Duration;

    const NEGATIVE: &str = "terrible rude staff, long wait";
    const POSITIVE: &str = "excellent friendly staff";

    #[derive(Default)]
    struct CountingSink {
        raised: AtomicUsize,
    }

    impl AttentionSink for CountingSink {
        fn raise(&self, _flag: &AttentionFlag) -> Result<(), DeliveryError> {
            self.raised.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn sample_review(facility_id: &str, rating: u8, comment: &str, at: DateTime<Utc>) -> Review {
        Review {
            id: Uuid::new_v4(),
            facility_id: facility_id.to_string(),
            facility_kind: FacilityKind::Hospital,
            patient_id: format!("patient-{}", Uuid::new_v4()),
            rating,
            comment: comment.to_string(),
            created_at: at,
            department: Some("Emergency".to_string()),
            verified: true,
            source: ReviewSource::Website,
        }
    }

    fn engine_with(clock: Arc<ManualClock>) -> FeedbackEngine {
        FeedbackEngine::builder().clock(clock).build()
    }

    #[test]
    fn end_to_end_facility_scenario() {
        let clock = Arc::new(ManualClock::starting_2026());
        let engine = engine_with(clock.clone());
        let start = clock.now();

        for (n, rating) in [1u8, 1, 2, 5, 5, 4].into_iter().enumerate() {
            let comment = if n % 2 == 0 { NEGATIVE } else { POSITIVE };
            let review = sample_review("F1", rating, comment, clock.now());
            engine.add_review(review).unwrap();
            clock.advance(Duration::hours(1));
        }

        let issues = engine.get_trending_issues().unwrap();
        let tracked = issues
            .iter()
            .find(|issue| {
                issue.affected_facilities.contains("F1")
                    && matches!(issue.category, IssueCategory::Staff | IssueCategory::WaitTime)
            })
            .expect("staff or wait time issue for F1");
        assert!(tracked.frequency >= 3);

        let report = engine
            .generate_insight_report("F1", start, clock.now())
            .unwrap();
        assert_eq!(report.summary.total_reviews, 6);
        assert!(report
            .positive_highlights
            .iter()
            .any(|highlight| highlight.contains("friendly")));
        assert!(report
            .actionable_insights
            .iter()
            .any(|insight| insight.contains("staff training")));
        assert_eq!(report.departments[0].name, "Emergency");
    }

    #[test]
    fn positive_reviews_do_not_create_issues() {
        let engine = FeedbackEngine::builder().build();
        let score = engine
            .add_review(sample_review("F1", 5, POSITIVE, Utc::now()))
            .unwrap();
        assert!(score.overall > 0.0);
        assert!(engine.get_trending_issues().unwrap().is_empty());
    }

    #[test]
    fn analysis_stores_score_by_review_id() {
        let engine = FeedbackEngine::builder().build();
        let review = sample_review("F1", 2, NEGATIVE, Utc::now());
        let score = engine.add_review(review.clone()).unwrap();
        assert_eq!(engine.score_for(&review.id).unwrap(), Some(score));
    }

    #[test]
    fn resubmitted_review_counts_once() {
        let sink = Arc::new(CountingSink::default());
        let engine = FeedbackEngine::builder().attention_sink(sink.clone()).build();
        let review = sample_review("F1", 1, NEGATIVE, Utc::now());

        let first = engine.add_review(review.clone()).unwrap();
        for _ in 0..6 {
            assert_eq!(engine.add_review(review.clone()).unwrap(), first);
        }

        let issues = engine.get_trending_issues().unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].frequency, 1);
        assert_eq!(engine.get_analytics_overview().unwrap().total_reviews, 1);
        assert_eq!(sink.raised.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn ingested_review_is_analyzed_once_when_submitted() {
        let engine = FeedbackEngine::builder().build();
        let review = sample_review("F1", 1, NEGATIVE, Utc::now());
        engine.ingest(review.clone()).unwrap();
        engine.add_review(review.clone()).unwrap();

        assert!(engine.run_sweep().analyzed.is_empty());
        assert_eq!(engine.get_trending_issues().unwrap()[0].frequency, 1);
    }

    #[test]
    fn replay_uses_review_dates_for_trend() {
        let clock = Arc::new(ManualClock::starting_2026());
        let engine = engine_with(clock.clone());
        let first = clock.now() - Duration::days(41);
        let reviews: Vec<Review> = (0..3)
            .map(|n| sample_review("F1", 1, NEGATIVE, first + Duration::days(20 * n)))
            .collect();

        let sweep = engine.replay(reviews).unwrap();
        assert_eq!(sweep.analyzed.len(), 3);

        let issues = engine.get_trending_issues().unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].frequency, 3);
        assert_eq!(issues[0].trend, Trend::Decreasing);
        assert_eq!(issues[0].first_detected, first);
        assert_eq!(issues[0].last_updated, first + Duration::days(40));
    }

    #[test]
    fn replay_prunes_old_rare_issues() {
        let clock = Arc::new(ManualClock::starting_2026());
        let engine = engine_with(clock.clone());
        let old = sample_review("F1", 1, NEGATIVE, clock.now() - Duration::days(60));
        let recent = sample_review("F2", 1, NEGATIVE, clock.now() - Duration::days(2));

        let sweep = engine.replay([old, recent]).unwrap();
        assert_eq!(sweep.pruned, 1);

        let issues = engine.get_trending_issues().unwrap();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].affected_facilities.contains("F2"));
    }

    #[test]
    fn invalid_rating_is_an_analysis_error() {
        let engine = FeedbackEngine::builder().build();
        let review = sample_review("F1", 9, POSITIVE, Utc::now());
        assert!(matches!(
            engine.analyze(&review),
            Err(AnalysisError::InvalidRating(9))
        ));
    }

    #[test]
    fn sweep_skips_failures_and_retries_them_next_tick() {
        let config = EngineConfig {
            max_comment_chars: 40,
            ..EngineConfig::default()
        };
        let engine = FeedbackEngine::builder().config(config).build();
        let good = sample_review("F1", 4, POSITIVE, Utc::now());
        let too_long = sample_review("F1", 3, &"slow ".repeat(20), Utc::now());
        engine.ingest(good.clone()).unwrap();
        engine.ingest(too_long.clone()).unwrap();

        let first = engine.run_sweep();
        assert_eq!(first.analyzed, vec![good.id]);
        assert_eq!(first.failed, vec![too_long.id]);
        assert!(engine.score_for(&too_long.id).unwrap().is_none());

        let second = engine.run_sweep();
        assert!(second.analyzed.is_empty());
        assert_eq!(second.failed, vec![too_long.id]);
    }

    #[test]
    fn overlapping_sweep_is_skipped() {
        let engine = FeedbackEngine::builder().build();
        let _held = engine.sweep_guard.lock().unwrap();
        assert!(engine.run_sweep().skipped);
    }

    #[test]
    fn sweep_prunes_stale_issues() {
        let clock = Arc::new(ManualClock::starting_2026());
        let engine = engine_with(clock.clone());
        engine
            .add_review(sample_review("F1", 1, NEGATIVE, clock.now()))
            .unwrap();
        assert_eq!(engine.get_trending_issues().unwrap().len(), 1);

        clock.advance(Duration::days(29));
        assert_eq!(engine.run_sweep().pruned, 0);

        clock.advance(Duration::days(2));
        assert_eq!(engine.run_sweep().pruned, 1);
        assert!(engine.get_trending_issues().unwrap().is_empty());
    }

    #[test]
    fn critical_issues_and_alerts() {
        let clock = Arc::new(ManualClock::starting_2026());
        let sink = Arc::new(CountingSink::default());
        let engine = FeedbackEngine::builder()
            .clock(clock.clone())
            .attention_sink(sink.clone())
            .build();

        engine
            .add_review(sample_review(
                "F2",
                1,
                "terrible awful horrible rude dirty",
                clock.now(),
            ))
            .unwrap();
        for _ in 0..11 {
            engine
                .add_review(sample_review("F1", 2, NEGATIVE, clock.now()))
                .unwrap();
        }

        let critical = engine.get_critical_issues().unwrap();
        assert_eq!(critical.len(), 2);
        assert_eq!(critical[0].frequency, 11);

        let alerts = engine.get_realtime_alerts().unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].alert_type, AlertType::RecurringIssue);
        assert_eq!(alerts[0].facility_id, "F1");
        assert_eq!(alerts[1].alert_type, AlertType::CriticalIssue);
        assert_eq!(alerts[1].severity, Severity::Critical);

        // One critical trigger on F2 plus frequencies 6..=11 on F1.
        assert_eq!(sink.raised.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn analytics_overview_counts() {
        let clock = Arc::new(ManualClock::starting_2026());
        let engine = engine_with(clock.clone());
        engine
            .add_review(sample_review("F1", 1, NEGATIVE, clock.now()))
            .unwrap();
        engine
            .add_review(sample_review("F1", 5, POSITIVE, clock.now()))
            .unwrap();
        engine
            .ingest(sample_review("F1", 3, "okay", clock.now()))
            .unwrap();

        let overview = engine.get_analytics_overview().unwrap();
        assert_eq!(overview.total_reviews, 3);
        assert_eq!(overview.total_issues, 1);
        assert_eq!(overview.critical_issues, 0);
        assert!((overview.average_rating - 3.0).abs() < 1e-9);
        assert!((overview.processing_accuracy - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(overview.last_updated, clock.now());
    }

    #[test]
    fn empty_engine_report_is_neutral() {
        let engine = FeedbackEngine::builder().build();
        let now = Utc::now();
        let report = engine
            .generate_insight_report("F1", now - Duration::days(7), now)
            .unwrap();
        assert_eq!(report.summary.total_reviews, 0);
        assert_eq!(report.summary.average_rating, 0.0);
        assert_eq!(report.summary.sentiment_trend, SentimentTrend::Stable);
    }

    #[test]
    fn inverted_report_range_is_rejected() {
        let engine = FeedbackEngine::builder().build();
        let now = Utc::now();
        let result = engine.generate_insight_report("F1", now, now - Duration::days(1));
        assert!(matches!(
            result,
            Err(ReportGenerationError::InvalidRange { .. })
        ));
    }
}
