use std::collections::HashMap;
use std::fmt::Write;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::error::ReportGenerationError;
use crate::issues::sort_by_frequency;
use crate::models::{
    DepartmentBreakdown, InsightReport, ReportSummary, Review, SentimentTrend, TrendingIssue,
};
use crate::sentiment::SentimentAnalyzer;
use crate::text;

const MAX_TOP_ISSUES: usize = 5;
const MAX_HIGHLIGHTS: usize = 5;
const MAX_INSIGHTS: usize = 5;
const TREND_WINDOW: usize = 10;
const TREND_DELTA: f64 = 0.2;
const HIGHLIGHT_SHARE: f64 = 0.2;
const LOW_RATING_SHARE: f64 = 0.1;
const DEFAULT_DEPARTMENT: &str = "General";

/// Supplies the share of reviews a facility responded to. Owned by another service.
pub trait ResponseRateProvider: Send + Sync {
    fn response_rate(&self, facility_id: &str, start: DateTime<Utc>, end: DateTime<Utc>)
        -> Option<f64>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoResponseData;

impl ResponseRateProvider for NoResponseData {
    fn response_rate(&self, _: &str, _: DateTime<Utc>, _: DateTime<Utc>) -> Option<f64> {
        None
    }
}

pub struct ReportRequest<'a> {
    pub facility_id: &'a str,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub deadline: Instant,
}

/// Build a facility insight report from the reviews in the window (oldest
/// first) and a snapshot of the issue registry.
pub fn build_insight_report(
    request: &ReportRequest<'_>,
    reviews: &[Review],
    issues: &[TrendingIssue],
    response_rate: Option<f64>,
    analyzer: &SentimentAnalyzer,
) -> Result<InsightReport, ReportGenerationError> {
    if request.start > request.end {
        return Err(ReportGenerationError::InvalidRange {
            start: request.start,
            end: request.end,
        });
    }

    let summary = summarize(reviews, response_rate);
    let top_issues = top_issues_for(request.facility_id, issues);
    let positive_highlights = positive_highlights(reviews, analyzer, request.deadline)?;
    let actionable_insights = actionable_insights(&top_issues, reviews);
    let departments = summarize_by_department(reviews);

    Ok(InsightReport {
        facility_id: request.facility_id.to_string(),
        period_start: request.start,
        period_end: request.end,
        summary,
        top_issues,
        positive_highlights,
        actionable_insights,
        departments,
    })
}

fn mean_rating(reviews: &[Review]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    let total: u32 = reviews.iter().map(|review| review.rating as u32).sum();
    total as f64 / reviews.len() as f64
}

pub fn summarize(reviews: &[Review], response_rate: Option<f64>) -> ReportSummary {
    ReportSummary {
        total_reviews: reviews.len(),
        average_rating: mean_rating(reviews),
        sentiment_trend: sentiment_trend(reviews),
        response_rate,
    }
}

/// Compares the newest ten ratings with the oldest ten.
pub fn sentiment_trend(reviews: &[Review]) -> SentimentTrend {
    let window = reviews.len().min(TREND_WINDOW);
    if window == 0 {
        return SentimentTrend::Stable;
    }

    let older = mean_rating(&reviews[..window]);
    let recent = mean_rating(&reviews[reviews.len() - window..]);
    let delta = recent - older;

    if delta > TREND_DELTA {
        SentimentTrend::Improving
    } else if delta < -TREND_DELTA {
        SentimentTrend::Declining
    } else {
        SentimentTrend::Stable
    }
}

pub fn top_issues_for(facility_id: &str, issues: &[TrendingIssue]) -> Vec<TrendingIssue> {
    let mut matching: Vec<TrendingIssue> = issues
        .iter()
        .filter(|issue| issue.affected_facilities.contains(facility_id))
        .cloned()
        .collect();
    sort_by_frequency(&mut matching);
    matching.truncate(MAX_TOP_ISSUES);
    matching
}

pub fn positive_highlights(
    reviews: &[Review],
    analyzer: &SentimentAnalyzer,
    deadline: Instant,
) -> Result<Vec<String>, ReportGenerationError> {
    let mut positive_comments: Vec<Vec<String>> = Vec::new();
    for review in reviews.iter().filter(|review| review.rating >= 4) {
        if Instant::now() > deadline {
            return Err(ReportGenerationError::DeadlineExceeded);
        }
        let normalized = analyzer.normalize(&review.comment);
        positive_comments.push(text::words(&normalized).map(str::to_string).collect());
    }

    if positive_comments.is_empty() {
        return Ok(Vec::new());
    }

    let mut highlights = Vec::new();
    for keyword in &analyzer.lexicon().highlight_terms {
        let mentions = positive_comments
            .iter()
            .filter(|words| words.iter().any(|word| word == keyword))
            .count();
        if mentions as f64 / positive_comments.len() as f64 > HIGHLIGHT_SHARE {
            highlights.push(format!("Consistently praised for being {keyword}"));
        }
        if highlights.len() == MAX_HIGHLIGHTS {
            break;
        }
    }

    Ok(highlights)
}

pub fn actionable_insights(top_issues: &[TrendingIssue], reviews: &[Review]) -> Vec<String> {
    let mut insights: Vec<String> = Vec::new();
    for issue in top_issues {
        let recommendation = issue.category.recommendation().to_string();
        if !insights.contains(&recommendation) {
            insights.push(recommendation);
        }
    }

    if !reviews.is_empty() {
        let low = reviews.iter().filter(|review| review.rating <= 2).count();
        let share = low as f64 / reviews.len() as f64;
        if share > LOW_RATING_SHARE {
            insights.push(format!(
                "Conduct a comprehensive service review: {:.0}% of reviews rated 2 stars or lower",
                share * 100.0
            ));
        }
    }

    insights.truncate(MAX_INSIGHTS);
    insights
}

pub fn summarize_by_department(reviews: &[Review]) -> Vec<DepartmentBreakdown> {
    let mut map: HashMap<String, (usize, u32)> = HashMap::new();

    for review in reviews {
        let name = review
            .department
            .clone()
            .unwrap_or_else(|| DEFAULT_DEPARTMENT.to_string());
        let entry = map.entry(name).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += review.rating as u32;
    }

    let mut departments: Vec<DepartmentBreakdown> = map
        .into_iter()
        .map(|(name, (review_count, total_rating))| DepartmentBreakdown {
            name,
            review_count,
            average_rating: if review_count == 0 {
                0.0
            } else {
                total_rating as f64 / review_count as f64
            },
        })
        .collect();

    departments.sort_by(|a, b| b.review_count.cmp(&a.review_count).then(a.name.cmp(&b.name)));
    departments
}

pub fn render_markdown(report: &InsightReport) -> String {
    let mut output = String::new();
    let summary = &report.summary;

    let _ = writeln!(output, "# Patient Feedback Insight Report");
    let _ = writeln!(
        output,
        "Facility {} ({} to {})",
        report.facility_id,
        report.period_start.date_naive(),
        report.period_end.date_naive()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- Reviews: {}", summary.total_reviews);
    let _ = writeln!(output, "- Average rating: {:.2}", summary.average_rating);
    let _ = writeln!(output, "- Sentiment trend: {}", summary.sentiment_trend.as_str());
    match summary.response_rate {
        Some(rate) => {
            let _ = writeln!(output, "- Response rate: {:.0}%", rate * 100.0);
        }
        None => {
            let _ = writeln!(output, "- Response rate: not available");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Issues");
    if report.top_issues.is_empty() {
        let _ = writeln!(output, "No trending issues for this facility.");
    } else {
        for issue in &report.top_issues {
            let _ = writeln!(
                output,
                "- {} ({}): {} reports, severity {}, trend {}",
                issue.description,
                issue.category,
                issue.frequency,
                issue.severity.as_str(),
                issue.trend.as_str()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Positive Highlights");
    if report.positive_highlights.is_empty() {
        let _ = writeln!(output, "No recurring praise in this window.");
    } else {
        for highlight in &report.positive_highlights {
            let _ = writeln!(output, "- {highlight}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Actionable Insights");
    if report.actionable_insights.is_empty() {
        let _ = writeln!(output, "No actions suggested.");
    } else {
        for insight in &report.actionable_insights {
            let _ = writeln!(output, "- {insight}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Departments");
    if report.departments.is_empty() {
        let _ = writeln!(output, "No reviews recorded for this window.");
    } else {
        for department in &report.departments {
            let _ = writeln!(
                output,
                "- {}: {} reviews (avg rating {:.1})",
                department.name, department.review_count, department.average_rating
            );
        }
    }

    output
}
