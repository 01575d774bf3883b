//! The analysis pipeline: extract → score → persist.
//!
//! Each step runs only after the previous one succeeded, so a failure at any
//! point leaves the store untouched.

use bytes::Bytes;
use tracing::{debug, info};

use crate::analysis::extract::TextExtractor;
use crate::analysis::scoring::Scorer;
use crate::analysis::store::{NewAnalysis, ResultStore};
use crate::errors::AppError;
use crate::models::analysis::AnalysisRecord;

/// A validated upload: PDF bytes plus a non-empty, trimmed job type.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub resume: Bytes,
    pub job_type: String,
}

pub async fn run_analysis(
    extractor: &dyn TextExtractor,
    scorer: &dyn Scorer,
    store: &dyn ResultStore,
    request: AnalysisRequest,
) -> Result<AnalysisRecord, AppError> {
    let AnalysisRequest { resume, job_type } = request;

    let resume_text = extractor.extract(resume).await?;
    if resume_text.is_empty() {
        return Err(AppError::NoExtractableText);
    }
    debug!(chars = resume_text.len(), "Resume text extracted");

    let card = scorer.score(&resume_text, &job_type).await?;
    info!(
        job_type = %job_type,
        score = card.score(),
        suggestions = card.suggestions().len(),
        "Resume scored"
    );

    let record = store
        .save(NewAnalysis {
            resume_text,
            job_type,
            card,
        })
        .await?;

    Ok(record)
}
