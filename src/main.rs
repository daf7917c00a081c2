use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use patient_feedback_insights::config::{self, EngineConfig};
use patient_feedback_insights::engine::{FeedbackEngine, SweepReport};
use patient_feedback_insights::lexicon::Lexicon;
use patient_feedback_insights::models::TrendingIssue;
use patient_feedback_insights::{db, report, scheduler};

#[derive(Parser)]
#[command(name = "feedback-insights")]
#[command(about = "Patient feedback sentiment and trending issue tracker", long_about = None)]
struct Cli {
    /// Engine tunables as JSON
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Sentiment lexicon as JSON
    #[arg(long, global = true)]
    lexicon: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed reviews
    Seed,
    /// Import reviews from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
        /// Analyze each imported review right away
        #[arg(long)]
        analyze: bool,
    },
    /// Analyze unprocessed reviews and store their scores
    Analyze {
        #[arg(long, default_value_t = 500)]
        limit: usize,
    },
    /// List trending issues, alerts and the analytics overview
    Issues {
        #[arg(long, default_value_t = 90)]
        since_days: i64,
        #[arg(long)]
        critical: bool,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Generate an insight report for one facility
    Report {
        #[arg(long)]
        facility: String,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,
        #[arg(long, default_value = "insight-report.md")]
        out: PathBuf,
    },
    /// Run the batch scheduler until interrupted
    Watch {
        /// Overrides the configured sweep interval
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Markdown,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match &cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let inserted = db::seed(&pool).await?;
            println!("Inserted {inserted} seed reviews.");
        }
        Commands::Import { csv, analyze } => {
            let inserted = db::import_csv(&pool, csv).await?;
            println!("Inserted {} reviews from {}.", inserted.len(), csv.display());

            if *analyze {
                let engine = build_engine(&cli)?;
                let mut scores = Vec::with_capacity(inserted.len());
                let mut failed = Vec::new();
                for review in inserted {
                    let review_id = review.id;
                    match engine.add_review(review) {
                        Ok(score) => scores.push((review_id, score)),
                        Err(e) => {
                            tracing::warn!(%review_id, error = %e, "Review analysis failed");
                            failed.push(review_id);
                        }
                    }
                }
                let now = Utc::now();
                let saved = db::save_scores(&pool, &scores, now).await?;
                db::record_failures(&pool, &failed, now).await?;
                println!("Analyzed {saved} imported reviews.");
                print_issues("Trending issues:", &engine.get_trending_issues()?, 10);
            }
        }
        Commands::Analyze { limit } => {
            let engine = build_engine(&cli)?;
            let max_attempts = engine.config().max_analysis_attempts;
            for review in db::fetch_unprocessed(&pool, *limit, max_attempts).await? {
                engine.ingest(review)?;
            }

            let sweep = engine.run_sweep();
            let saved = persist_sweep(&pool, &engine, &sweep).await?;
            println!(
                "Analyzed {saved} reviews ({} failed, will retry).",
                sweep.failed.len()
            );
            print_issues("Trending issues:", &engine.get_trending_issues()?, 10);
        }
        Commands::Issues {
            since_days,
            critical,
            limit,
        } => {
            let engine = build_engine(&cli)?;
            let since = Utc::now() - Duration::days((*since_days).max(1));
            engine.replay(db::fetch_reviews(&pool, None, Some(since)).await?)?;

            if *critical {
                print_issues("Critical issues:", &engine.get_critical_issues()?, *limit);
            } else {
                print_issues("Trending issues:", &engine.get_trending_issues()?, *limit);
            }

            let alerts = engine.get_realtime_alerts()?;
            if !alerts.is_empty() {
                println!();
                println!("Alerts:");
                for alert in alerts.iter().take(*limit) {
                    println!(
                        "- [{}] {}: {}",
                        alert.severity.as_str(),
                        alert.facility_id,
                        alert.message
                    );
                }
            }

            let overview = engine.get_analytics_overview()?;
            println!();
            println!(
                "{} reviews, {} issues ({} critical), average rating {:.2}, {:.1}% analyzed",
                overview.total_reviews,
                overview.total_issues,
                overview.critical_issues,
                overview.average_rating,
                overview.processing_accuracy
            );
        }
        Commands::Report {
            facility,
            start,
            end,
            format,
            out,
        } => {
            let engine = build_engine(&cli)?;
            engine.replay(db::fetch_reviews(&pool, Some(facility.as_str()), None).await?)?;

            let report = engine.generate_insight_report(
                facility,
                start_of_day(*start)?,
                end_of_day(*end)?,
            )?;
            let rendered = match format {
                ReportFormat::Markdown => report::render_markdown(&report),
                ReportFormat::Json => serde_json::to_string_pretty(&report)?,
            };
            std::fs::write(out, rendered)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Watch { interval_secs } => {
            let engine = Arc::new(build_engine(&cli)?);
            let period = interval_secs
                .map(|secs| StdDuration::from_secs(secs.max(1)))
                .unwrap_or_else(|| engine.config().sweep_interval());
            watch(&pool, engine, period).await?;
        }
    }

    Ok(())
}

fn build_engine(cli: &Cli) -> anyhow::Result<FeedbackEngine> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    let lexicon = match &cli.lexicon {
        Some(path) => Lexicon::from_json_file(path)?,
        None => Lexicon::default(),
    };

    Ok(FeedbackEngine::builder().config(config).lexicon(lexicon).build())
}

async fn persist_sweep(
    pool: &PgPool,
    engine: &FeedbackEngine,
    sweep: &SweepReport,
) -> anyhow::Result<usize> {
    let mut scores = Vec::with_capacity(sweep.analyzed.len());
    for review_id in &sweep.analyzed {
        if let Some(score) = engine.score_for(review_id)? {
            scores.push((*review_id, score));
        }
    }
    let now = Utc::now();
    db::record_failures(pool, &sweep.failed, now).await?;
    if scores.is_empty() {
        return Ok(0);
    }
    db::save_scores(pool, &scores, now).await
}

/// Pull new reviews from Postgres on every period and persist what each sweep analyzed.
async fn watch(pool: &PgPool, engine: Arc<FeedbackEngine>, period: StdDuration) -> anyhow::Result<()> {
    let limit = engine.config().max_reviews_per_sweep;
    let max_attempts = engine.config().max_analysis_attempts;
    let (tx, mut rx) = mpsc::channel::<SweepReport>(8);
    let mut poll = tokio::time::interval(period);

    // Load the backlog before the first sweep fires.
    for review in db::fetch_unprocessed(pool, limit, max_attempts).await? {
        engine.ingest(review)?;
    }
    poll.tick().await;

    let handle = scheduler::start(Arc::clone(&engine), period, Some(tx));
    println!("Watching for reviews every {}s. Press Ctrl-C to stop.", period.as_secs());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = poll.tick() => {
                match db::fetch_unprocessed(pool, limit, max_attempts).await {
                    Ok(reviews) => {
                        for review in reviews {
                            engine.ingest(review)?;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Could not load new reviews"),
                }
            }
            Some(sweep) = rx.recv() => {
                if let Err(e) = persist_sweep(pool, &engine, &sweep).await {
                    tracing::warn!(error = %e, "Could not persist sweep results");
                }
            }
        }
    }

    drop(rx);
    handle.shutdown().await;
    Ok(())
}

fn start_of_day(date: NaiveDate) -> anyhow::Result<DateTime<Utc>> {
    let naive = date.and_hms_opt(0, 0, 0).context("invalid date")?;
    Ok(Utc.from_utc_datetime(&naive))
}

fn end_of_day(date: NaiveDate) -> anyhow::Result<DateTime<Utc>> {
    let naive = date.and_hms_opt(23, 59, 59).context("invalid date")?;
    Ok(Utc.from_utc_datetime(&naive))
}

fn print_issues(title: &str, issues: &[TrendingIssue], limit: usize) {
    if issues.is_empty() {
        println!("{title} none.");
        return;
    }

    println!("{title}");
    for issue in issues.iter().take(limit) {
        let facilities: Vec<&str> = issue.affected_facilities.iter().map(String::as_str).collect();
        println!(
            "- {} [{}] at {}: {} reports, severity {}, trend {}",
            issue.description,
            issue.category,
            facilities.join(", "),
            issue.frequency,
            issue.severity.as_str(),
            issue.trend.as_str()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_window_covers_whole_days() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let start = start_of_day(day).unwrap();
        let end = end_of_day(day).unwrap();
        assert_eq!(end - start, Duration::seconds(86_399));
        assert_eq!(start.date_naive(), day);
    }

    #[test]
    fn cli_parses_report_arguments() {
        let cli = Cli::try_parse_from([
            "feedback-insights",
            "report",
            "--facility",
            "F1",
            "--start",
            "2026-01-01",
            "--end",
            "2026-01-31",
            "--format",
            "json",
        ])
        .unwrap();
        match cli.command {
            Commands::Report { facility, format, .. } => {
                assert_eq!(facility, "F1");
                assert!(matches!(format, ReportFormat::Json));
            }
            _ => panic!("expected report command"),
        }
    }
}
