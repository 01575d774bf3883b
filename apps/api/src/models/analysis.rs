use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Identifier assigned to an analysis when it is saved.
pub type RecordId = Uuid;

/// Raw row of the `analyses` table.
#[derive(Debug, Clone, FromRow)]
pub struct AnalysisRow {
    pub id: Uuid,
    pub resume_text: String,
    pub job_type: String,
    pub score: i64,
    pub suggestions: Json<Vec<String>>,
    pub created_at: DateTime<Utc>,
}

/// A stored, immutable resume analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: RecordId,
    pub resume_text: String,
    pub job_type: String,
    pub score: u8,
    pub suggestions: Vec<String>,
    pub created_at: DateTime<Utc>,
}
