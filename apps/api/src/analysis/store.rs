use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::analysis::scoring::ScoreCard;
use crate::models::analysis::{AnalysisRecord, AnalysisRow, RecordId};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt analysis row: {0}")]
    Corrupt(String),
}

/// An analysis that has not been stored yet.
#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub resume_text: String,
    pub job_type: String,
    pub card: ScoreCard,
}

/// Append-only store of analysis results. Carried in `AppState` as `Arc<dyn ResultStore>`.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Inserts exactly one record and returns it with its id and timestamp.
    async fn save(&self, analysis: NewAnalysis) -> Result<AnalysisRecord, PersistenceError>;

    /// All records, newest first.
    async fn list_all(&self) -> Result<Vec<AnalysisRecord>, PersistenceError>;

    async fn get(&self, id: RecordId) -> Result<Option<AnalysisRecord>, PersistenceError>;
}

#[derive(Clone)]
pub struct SqliteResultStore {
    pool: SqlitePool,
}

impl SqliteResultStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn save(&self, analysis: NewAnalysis) -> Result<AnalysisRecord, PersistenceError> {
        let NewAnalysis {
            resume_text,
            job_type,
            card,
        } = analysis;

        let record = AnalysisRecord {
            id: Uuid::new_v4(),
            resume_text,
            job_type,
            score: card.score(),
            suggestions: card.into_suggestions(),
            created_at: Utc::now(),
        };

        // Append-only: rows are never updated or deleted
        sqlx::query(
            r#"
            INSERT INTO analyses (id, resume_text, job_type, score, suggestions, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id)
        .bind(&record.resume_text)
        .bind(&record.job_type)
        .bind(i64::from(record.score))
        .bind(Json(&record.suggestions))
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        info!(
            analysis_id = %record.id,
            job_type = %record.job_type,
            score = record.score,
            "Resume analysis saved"
        );

        Ok(record)
    }

    async fn list_all(&self) -> Result<Vec<AnalysisRecord>, PersistenceError> {
        let rows = sqlx::query_as::<_, AnalysisRow>(
            "SELECT id, resume_text, job_type, score, suggestions, created_at \
             FROM analyses ORDER BY rowid DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_record).collect()
    }

    async fn get(&self, id: RecordId) -> Result<Option<AnalysisRecord>, PersistenceError> {
        let row = sqlx::query_as::<_, AnalysisRow>(
            "SELECT id, resume_text, job_type, score, suggestions, created_at \
             FROM analyses WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_record).transpose()
    }
}

fn row_to_record(row: AnalysisRow) -> Result<AnalysisRecord, PersistenceError> {
    let score = u8::try_from(row.score)
        .ok()
        .filter(|s| *s <= 100)
        .ok_or_else(|| {
            PersistenceError::Corrupt(format!("analysis {} has score {}", row.id, row.score))
        })?;

    Ok(AnalysisRecord {
        id: row.id,
        resume_text: row.resume_text,
        job_type: row.job_type,
        score,
        suggestions: row.suggestions.0,
        created_at: row.created_at,
    })
}
