use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{FacilityKind, Review, ReviewSource, SentimentScore};

const REVIEW_COLUMNS: &str = "id, facility_id, facility_kind, patient_id, rating, comment, \
     created_at, department, verified, source";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    let now = Utc::now();
    let reviews = vec![
        (
            "seed-001",
            "st-marys-hospital",
            "hospital",
            5,
            "Excellent friendly staff, the nurse explained everything.",
            Some("Cardiology"),
            now - Duration::days(12),
        ),
        (
            "seed-002",
            "st-marys-hospital",
            "hospital",
            1,
            "Terrible rude staff, long wait in a dirty room.",
            Some("Emergency"),
            now - Duration::days(9),
        ),
        (
            "seed-003",
            "st-marys-hospital",
            "hospital",
            2,
            "Waited three hours. Reception was rude and nobody was helpful.",
            Some("Emergency"),
            now - Duration::days(4),
        ),
        (
            "seed-004",
            "st-marys-hospital",
            "hospital",
            4,
            "Doctor was knowledgeable and caring, room was clean.",
            None,
            now - Duration::days(2),
        ),
        (
            "seed-005",
            "elm-street-pharmacy",
            "pharmacy",
            4,
            "Quick and helpful pharmacist, not crowded at all.",
            None,
            now - Duration::days(6),
        ),
        (
            "seed-006",
            "dr-okafor",
            "doctor",
            3,
            "Good consultation but the doctor never answered my questions.",
            Some("Family Medicine"),
            now - Duration::days(1),
        ),
    ];

    let mut inserted = 0usize;
    for (source_key, facility_id, kind, rating, comment, department, created_at) in reviews {
        let result = sqlx::query(
            r#"
            INSERT INTO patient_feedback.reviews
            (id, facility_id, facility_kind, patient_id, rating, comment, created_at,
             department, verified, source, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(facility_id)
        .bind(kind)
        .bind(format!("patient-{source_key}"))
        .bind(rating as i16)
        .bind(comment)
        .bind(created_at)
        .bind(department)
        .bind(true)
        .bind(ReviewSource::Website.as_str())
        .bind(source_key)
        .execute(pool)
        .await?;
        inserted += result.rows_affected() as usize;
    }

    Ok(inserted)
}

fn review_from_row(row: &PgRow) -> anyhow::Result<Review> {
    let kind: String = row.get("facility_kind");
    let source: String = row.get("source");
    let rating: i16 = row.get("rating");

    Ok(Review {
        id: row.get("id"),
        facility_id: row.get("facility_id"),
        facility_kind: kind.parse::<FacilityKind>()?,
        patient_id: row.get("patient_id"),
        // Out of range values surface as an analysis error, not a load failure.
        rating: u8::try_from(rating).unwrap_or(0),
        comment: row.get("comment"),
        created_at: row.get("created_at"),
        department: row.get("department"),
        verified: row.get("verified"),
        source: source.parse::<ReviewSource>()?,
    })
}

/// Stored reviews, optionally scoped to one facility and a start time.
pub async fn fetch_reviews(
    pool: &PgPool,
    facility_id: Option<&str>,
    since: Option<DateTime<Utc>>,
) -> anyhow::Result<Vec<Review>> {
    let mut query = format!(
        "SELECT {REVIEW_COLUMNS} FROM patient_feedback.reviews \
         WHERE ($1::timestamptz IS NULL OR created_at >= $1)"
    );

    if facility_id.is_some() {
        query.push_str(" AND facility_id = $2");
    }
    query.push_str(" ORDER BY created_at ASC");

    let mut rows = sqlx::query(&query).bind(since);
    if let Some(value) = facility_id {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    records.iter().map(review_from_row).collect()
}

fn unprocessed_query() -> String {
    format!(
        "SELECT {REVIEW_COLUMNS} FROM patient_feedback.reviews \
         WHERE processed_at IS NULL AND failed_attempts < $2 \
         ORDER BY last_attempt_at ASC NULLS FIRST, created_at ASC LIMIT $1"
    )
}

/// Pending reviews, never-attempted first. Rows that failed `max_attempts`
/// times are left out so they cannot crowd newer reviews out of the window.
pub async fn fetch_unprocessed(
    pool: &PgPool,
    limit: usize,
    max_attempts: u32,
) -> anyhow::Result<Vec<Review>> {
    let query = unprocessed_query();
    let records = sqlx::query(&query)
        .bind(limit as i64)
        .bind(max_attempts as i32)
        .fetch_all(pool)
        .await?;
    records.iter().map(review_from_row).collect()
}

/// Count one more failed analysis for each review.
pub async fn record_failures(
    pool: &PgPool,
    review_ids: &[Uuid],
    attempted_at: DateTime<Utc>,
) -> anyhow::Result<()> {
    if review_ids.is_empty() {
        return Ok(());
    }
    sqlx::query(
        "UPDATE patient_feedback.reviews \
         SET failed_attempts = failed_attempts + 1, last_attempt_at = $2 \
         WHERE id = ANY($1)",
    )
    .bind(review_ids)
    .bind(attempted_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Upsert scores and mark their reviews processed. Returns the number saved.
pub async fn save_scores(
    pool: &PgPool,
    scores: &[(Uuid, SentimentScore)],
    analyzed_at: DateTime<Utc>,
) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await?;

    for (review_id, score) in scores {
        let aspects = serde_json::to_string(&score.aspects)
            .context("failed to serialize aspect scores")?;

        sqlx::query(
            r#"
            INSERT INTO patient_feedback.sentiment_scores
            (review_id, overall, aspects, confidence, keywords, analyzed_at)
            VALUES ($1, $2, $3::jsonb, $4, $5, $6)
            ON CONFLICT (review_id) DO UPDATE
            SET overall = EXCLUDED.overall,
                aspects = EXCLUDED.aspects,
                confidence = EXCLUDED.confidence,
                keywords = EXCLUDED.keywords,
                analyzed_at = EXCLUDED.analyzed_at
            "#,
        )
        .bind(review_id)
        .bind(score.overall)
        .bind(aspects)
        .bind(score.confidence)
        .bind(&score.keywords)
        .bind(analyzed_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE patient_feedback.reviews SET processed_at = $2 WHERE id = $1")
            .bind(review_id)
            .bind(analyzed_at)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(scores.len())
}

/// Import reviews from CSV, skipping rows whose source key is already stored.
/// Returns the newly inserted reviews.
pub async fn import_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
) -> anyhow::Result<Vec<Review>> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        facility_id: String,
        facility_kind: String,
        patient_id: String,
        rating: i16,
        comment: String,
        created_at: DateTime<Utc>,
        department: Option<String>,
        verified: bool,
        source: Option<String>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = Vec::new();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid CSV record {}", line + 1))?;
        let kind = row.facility_kind.parse::<FacilityKind>()?;
        let source = match row.source.as_deref() {
            Some(value) if !value.trim().is_empty() => value.parse::<ReviewSource>()?,
            _ => ReviewSource::Import,
        };
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
        let review = Review {
            id: Uuid::new_v4(),
            facility_id: row.facility_id,
            facility_kind: kind,
            patient_id: row.patient_id,
            rating: u8::try_from(row.rating).unwrap_or(0),
            comment: row.comment,
            created_at: row.created_at,
            department: row.department,
            verified: row.verified,
            source,
        };

        let result = sqlx::query(
            r#"
            INSERT INTO patient_feedback.reviews
            (id, facility_id, facility_kind, patient_id, rating, comment, created_at,
             department, verified, source, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(review.id)
        .bind(&review.facility_id)
        .bind(review.facility_kind.as_str())
        .bind(&review.patient_id)
        .bind(row.rating)
        .bind(&review.comment)
        .bind(review.created_at)
        .bind(&review.department)
        .bind(review.verified)
        .bind(review.source.as_str())
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted.push(review);
        }
    }

    tracing::info!(inserted = inserted.len(), path = %csv_path.display(), "Imported reviews");
    Ok(inserted)
}
