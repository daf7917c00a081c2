use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacilityKind {
    Doctor,
    Hospital,
    Pharmacy,
}

impl FacilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacilityKind::Doctor => "doctor",
            FacilityKind::Hospital => "hospital",
            FacilityKind::Pharmacy => "pharmacy",
        }
    }
}

impl FromStr for FacilityKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "doctor" => Ok(FacilityKind::Doctor),
            "hospital" => Ok(FacilityKind::Hospital),
            "pharmacy" => Ok(FacilityKind::Pharmacy),
            other => anyhow::bail!("unknown facility kind: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewSource {
    Website,
    MobileApp,
    Survey,
    Import,
}

impl ReviewSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewSource::Website => "website",
            ReviewSource::MobileApp => "mobile_app",
            ReviewSource::Survey => "survey",
            ReviewSource::Import => "import",
        }
    }
}

impl FromStr for ReviewSource {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "website" | "web" => Ok(ReviewSource::Website),
            "mobile_app" | "mobile" => Ok(ReviewSource::MobileApp),
            "survey" => Ok(ReviewSource::Survey),
            "import" => Ok(ReviewSource::Import),
            other => anyhow::bail!("unknown review source: {other}"),
        }
    }
}

/// A patient review as submitted by the review form. Read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub facility_id: String,
    pub facility_kind: FacilityKind,
    pub patient_id: String,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub department: Option<String>,
    pub verified: bool,
    pub source: ReviewSource,
}

/// Feedback dimensions scored independently of the overall polarity.
///
/// The declaration order is the iteration order used everywhere, which makes
/// the worst-aspect tie-break deterministic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Aspect {
    Service,
    Staff,
    Facilities,
    WaitTime,
    Cleanliness,
    Communication,
}

impl Aspect {
    pub const ALL: [Aspect; 6] = [
        Aspect::Service,
        Aspect::Staff,
        Aspect::Facilities,
        Aspect::WaitTime,
        Aspect::Cleanliness,
        Aspect::Communication,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Aspect::Service => "service",
            Aspect::Staff => "staff",
            Aspect::Facilities => "facilities",
            Aspect::WaitTime => "waitTime",
            Aspect::Cleanliness => "cleanliness",
            Aspect::Communication => "communication",
        }
    }
}

/// Polarity per aspect. Always carries all six keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectScores(BTreeMap<Aspect, f64>);

impl AspectScores {
    pub fn neutral() -> Self {
        Self(Aspect::ALL.iter().map(|aspect| (*aspect, 0.0)).collect())
    }

    pub fn get(&self, aspect: Aspect) -> f64 {
        self.0.get(&aspect).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, aspect: Aspect, value: f64) {
        self.0.insert(aspect, value.clamp(-1.0, 1.0));
    }

    /// Iterates in `Aspect::ALL` order.
    pub fn iter(&self) -> impl Iterator<Item = (Aspect, f64)> + '_ {
        Aspect::ALL.iter().map(move |aspect| (*aspect, self.get(*aspect)))
    }
}

impl Default for AspectScores {
    fn default() -> Self {
        Self::neutral()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    pub overall: f64,
    pub aspects: AspectScores,
    pub confidence: f64,
    pub keywords: Vec<String>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum IssueCategory {
    Service,
    Staff,
    Facilities,
    WaitTime,
    Cleanliness,
    Communication,
    General,
}

impl IssueCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCategory::General => "general",
            IssueCategory::Service => Aspect::Service.as_str(),
            IssueCategory::Staff => Aspect::Staff.as_str(),
            IssueCategory::Facilities => Aspect::Facilities.as_str(),
            IssueCategory::WaitTime => Aspect::WaitTime.as_str(),
            IssueCategory::Cleanliness => Aspect::Cleanliness.as_str(),
            IssueCategory::Communication => Aspect::Communication.as_str(),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            IssueCategory::Service => "Declining service quality",
            IssueCategory::Staff => "Staff behavior and professionalism concerns",
            IssueCategory::Facilities => "Facility condition complaints",
            IssueCategory::WaitTime => "Excessive wait times",
            IssueCategory::Cleanliness => "Cleanliness and hygiene concerns",
            IssueCategory::Communication => "Poor communication with patients",
            IssueCategory::General => "General patient dissatisfaction",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            IssueCategory::Service => {
                "Review service delivery workflows and set clear quality standards"
            }
            IssueCategory::Staff => {
                "Schedule staff training on courtesy, empathy and professional conduct"
            }
            IssueCategory::Facilities => {
                "Plan facility upgrades and fix reported equipment or comfort problems"
            }
            IssueCategory::WaitTime => {
                "Optimize appointment scheduling and staffing to reduce wait times"
            }
            IssueCategory::Cleanliness => {
                "Increase cleaning frequency and audit hygiene protocols"
            }
            IssueCategory::Communication => {
                "Improve how test results and care plans are explained to patients"
            }
            IssueCategory::General => {
                "Follow up with dissatisfied patients to identify root causes"
            }
        }
    }
}

impl From<Aspect> for IssueCategory {
    fn from(aspect: Aspect) -> Self {
        match aspect {
            Aspect::Service => IssueCategory::Service,
            Aspect::Staff => IssueCategory::Staff,
            Aspect::Facilities => IssueCategory::Facilities,
            Aspect::WaitTime => IssueCategory::WaitTime,
            Aspect::Cleanliness => IssueCategory::Cleanliness,
            Aspect::Communication => IssueCategory::Communication,
        }
    }
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Increasing => "increasing",
            Trend::Decreasing => "decreasing",
            Trend::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingIssue {
    pub category: IssueCategory,
    pub description: String,
    pub frequency: u32,
    pub severity: Severity,
    pub trend: Trend,
    pub affected_facilities: BTreeSet<String>,
    pub first_detected: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentTrend {
    Improving,
    Declining,
    Stable,
}

impl SentimentTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentTrend::Improving => "improving",
            SentimentTrend::Declining => "declining",
            SentimentTrend::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_reviews: usize,
    pub average_rating: f64,
    pub sentiment_trend: SentimentTrend,
    pub response_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentBreakdown {
    pub name: String,
    pub review_count: usize,
    pub average_rating: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightReport {
    pub facility_id: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub summary: ReportSummary,
    pub top_issues: Vec<TrendingIssue>,
    pub positive_highlights: Vec<String>,
    pub actionable_insights: Vec<String>,
    pub departments: Vec<DepartmentBreakdown>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    CriticalIssue,
    RecurringIssue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeAlert {
    pub alert_type: AlertType,
    pub message: String,
    pub facility_id: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsOverview {
    pub total_reviews: usize,
    pub total_issues: usize,
    pub critical_issues: usize,
    pub average_rating: f64,
    pub processing_accuracy: f64,
    pub last_updated: DateTime<Utc>,
}
