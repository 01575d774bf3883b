//! Axum route handlers for the Analysis API.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, Path, State,
    },
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::analysis::pipeline::{run_analysis, AnalysisRequest};
use crate::errors::AppError;
use crate::models::analysis::AnalysisRecord;
use crate::state::AppState;

const MAX_JOB_TYPE_CHARS: usize = 200;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub score: u8,
    pub suggestions: Vec<String>,
}

/// The `resume` part of the form, before validation.
#[derive(Debug)]
struct UploadedFile {
    file_name: Option<String>,
    content_type: Option<String>,
    data: Bytes,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/analyze
///
/// Multipart form with a `resume` PDF and a `job_type` string.
/// Returns the ATS score and suggestions; the analysis is stored on success only.
pub async fn handle_analyze(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let request = match multipart {
        Ok(multipart) => read_upload(multipart).await,
        Err(rejection) => Err(AppError::Validation(format!(
            "Malformed upload: {}",
            rejection.body_text()
        ))),
    }
    .inspect_err(|e| {
        warn!(error = %e, "Rejected resume upload");
    })?;

    let record = run_analysis(
        state.extractor.as_ref(),
        state.scorer.as_ref(),
        state.store.as_ref(),
        request,
    )
    .await?;

    Ok(Json(AnalyzeResponse {
        score: record.score,
        suggestions: record.suggestions,
    }))
}

/// GET /api/v1/analyses
pub async fn handle_list_analyses(
    State(state): State<AppState>,
) -> Result<Json<Vec<AnalysisRecord>>, AppError> {
    Ok(Json(state.store.list_all().await?))
}

/// GET /api/v1/analyses/:id
pub async fn handle_get_analysis(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AnalysisRecord>, AppError> {
    let record = state
        .store
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Analysis {id} not found")))?;
    Ok(Json(record))
}

// ────────────────────────────────────────────────────────────────────────────
// Upload parsing and validation
// ────────────────────────────────────────────────────────────────────────────

async fn read_upload(mut multipart: Multipart) -> Result<AnalysisRequest, AppError> {
    let mut file = None;
    let mut job_type = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "resume" => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(multipart_error)?;
                file = Some(UploadedFile {
                    file_name,
                    content_type,
                    data,
                });
            }
            "job_type" => {
                job_type = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    validate_upload(file, job_type)
}

fn validate_upload(
    file: Option<UploadedFile>,
    job_type: Option<String>,
) -> Result<AnalysisRequest, AppError> {
    let file = file.ok_or_else(|| AppError::Validation("No resume file part".to_string()))?;
    if file.data.is_empty() {
        return Err(AppError::Validation("No resume file selected".to_string()));
    }
    if !is_pdf_upload(file.content_type.as_deref(), file.file_name.as_deref()) {
        return Err(AppError::Validation(
            "Invalid file type. Only PDF is supported.".to_string(),
        ));
    }

    let job_type = job_type.as_deref().map(str::trim).unwrap_or_default();
    if job_type.is_empty() {
        return Err(AppError::Validation("job_type cannot be empty".to_string()));
    }
    if job_type.chars().count() > MAX_JOB_TYPE_CHARS {
        return Err(AppError::Validation(format!(
            "job_type must be at most {MAX_JOB_TYPE_CHARS} characters"
        )));
    }

    Ok(AnalysisRequest {
        resume: file.data,
        job_type: job_type.to_string(),
    })
}

/// A part is a PDF if it says so, or if it carries no specific type and a `.pdf` name.
fn is_pdf_upload(content_type: Option<&str>, file_name: Option<&str>) -> bool {
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase());

    match mime.as_deref() {
        Some("application/pdf") | Some("application/x-pdf") => true,
        None | Some("") | Some("application/octet-stream") => file_name
            .map(|name| name.to_ascii_lowercase().ends_with(".pdf"))
            .unwrap_or(false),
        Some(_) => false,
    }
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::Validation(format!("Malformed upload: {}", err.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::analysis::extract::{ExtractionError, TextExtractor};
    use crate::analysis::scoring::{ScoreCard, Scorer, ScoringError};
    use crate::analysis::store::{NewAnalysis, PersistenceError, ResultStore, SqliteResultStore};
    use crate::db::memory_pool;
    use crate::llm_client::LlmError;
    use crate::routes::build_router;

    const BOUNDARY: &str = "ats-test-boundary";
    const RESUME_TEXT: &str = "Experienced software engineer...";

    struct FixedText(&'static str);

    #[async_trait]
    impl TextExtractor for FixedText {
        async fn extract(&self, _pdf: Bytes) -> Result<String, ExtractionError> {
            Ok(self.0.to_string())
        }
    }

    struct BrokenPdf;

    #[async_trait]
    impl TextExtractor for BrokenPdf {
        async fn extract(&self, _pdf: Bytes) -> Result<String, ExtractionError> {
            Err(ExtractionError::Unreadable("xref table missing".into()))
        }
    }

    /// Returns a fixed outcome and counts calls.
    struct FakeScorer {
        outcome: fn() -> Result<ScoreCard, ScoringError>,
        calls: AtomicUsize,
    }

    impl FakeScorer {
        fn new(outcome: fn() -> Result<ScoreCard, ScoringError>) -> Self {
            Self {
                outcome,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Scorer for FakeScorer {
        async fn score(&self, resume_text: &str, job_type: &str) -> Result<ScoreCard, ScoringError> {
            assert_eq!(resume_text, RESUME_TEXT);
            assert_eq!(job_type, "Backend Developer");
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }
    }

    /// Every call fails the way a locked or unavailable SQLite file does.
    struct FailingStore;

    fn storage_outage() -> PersistenceError {
        PersistenceError::Database(sqlx::Error::Protocol(
            "disk I/O error: database is locked".into(),
        ))
    }

    #[async_trait]
    impl ResultStore for FailingStore {
        async fn save(&self, _analysis: NewAnalysis) -> Result<AnalysisRecord, PersistenceError> {
            Err(storage_outage())
        }

        async fn list_all(&self) -> Result<Vec<AnalysisRecord>, PersistenceError> {
            Err(storage_outage())
        }

        async fn get(&self, _id: Uuid) -> Result<Option<AnalysisRecord>, PersistenceError> {
            Err(storage_outage())
        }
    }

    fn scored_78() -> Result<ScoreCard, ScoringError> {
        ScoreCard::new(
            78,
            vec!["Add more keywords".into(), "Quantify achievements".into()],
        )
    }

    fn upstream_down() -> Result<ScoreCard, ScoringError> {
        Err(ScoringError::Llm(LlmError::Api {
            status: 503,
            message: "backend unavailable".into(),
        }))
    }

    fn missing_score() -> Result<ScoreCard, ScoringError> {
        Err(ScoringError::MissingScore)
    }

    struct Harness {
        app: Router,
        store: Arc<SqliteResultStore>,
        scorer: Arc<FakeScorer>,
    }

    async fn harness(
        extractor: impl TextExtractor + 'static,
        outcome: fn() -> Result<ScoreCard, ScoringError>,
    ) -> Harness {
        let store = Arc::new(SqliteResultStore::new(memory_pool().await));
        let scorer = Arc::new(FakeScorer::new(outcome));
        let state = AppState {
            extractor: Arc::new(extractor),
            scorer: scorer.clone(),
            store: store.clone(),
            upload_limit: 1024 * 1024,
        };
        Harness {
            app: build_router(state),
            store,
            scorer,
        }
    }

    enum Part<'a> {
        File {
            file_name: &'a str,
            content_type: Option<&'a str>,
            data: &'a [u8],
        },
        Text(&'a str, &'a str),
    }

    fn multipart_request(parts: &[Part]) -> Request<Body> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::File {
                    file_name,
                    content_type,
                    data,
                } => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"resume\"; filename=\"{file_name}\"\r\n"
                        )
                        .as_bytes(),
                    );
                    if let Some(ct) = content_type {
                        body.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
                    }
                    body.extend_from_slice(b"\r\n");
                    body.extend_from_slice(data);
                    body.extend_from_slice(b"\r\n");
                }
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                            .as_bytes(),
                    );
                }
            }
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/v1/analyze")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn pdf_part(data: &[u8]) -> Part<'_> {
        Part::File {
            file_name: "resume.pdf",
            content_type: Some("application/pdf"),
            data,
        }
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn stored(store: &SqliteResultStore) -> Vec<AnalysisRecord> {
        store.list_all().await.unwrap()
    }

    #[tokio::test]
    async fn test_successful_analysis_returns_score_and_stores_one_record() {
        let h = harness(FixedText(RESUME_TEXT), scored_78).await;

        let (status, body) = send(
            h.app.clone(),
            multipart_request(&[
                pdf_part(b"%PDF-1.4 fake"),
                Part::Text("job_type", "  Backend Developer  "),
            ]),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "score": 78, "suggestions": ["Add more keywords", "Quantify achievements"] })
        );

        let records = stored(&h.store).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].resume_text, RESUME_TEXT);
        assert_eq!(records[0].job_type, "Backend Developer");
        assert_eq!(records[0].score, 78);
        assert_eq!(
            records[0].suggestions,
            vec!["Add more keywords", "Quantify achievements"]
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_bad_request_without_write() {
        let h = harness(FixedText(RESUME_TEXT), scored_78).await;

        let (status, body) = send(
            h.app.clone(),
            multipart_request(&[Part::Text("job_type", "Backend Developer")]),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(stored(&h.store).await.is_empty());
        assert_eq!(h.scorer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blank_job_type_is_bad_request() {
        let h = harness(FixedText(RESUME_TEXT), scored_78).await;

        let (status, _) = send(
            h.app.clone(),
            multipart_request(&[pdf_part(b"%PDF-1.4"), Part::Text("job_type", "   ")]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(h.app.clone(), multipart_request(&[pdf_part(b"%PDF-1.4")])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert!(stored(&h.store).await.is_empty());
    }

    #[tokio::test]
    async fn test_non_pdf_upload_is_bad_request() {
        let h = harness(FixedText(RESUME_TEXT), scored_78).await;

        let (status, body) = send(
            h.app.clone(),
            multipart_request(&[
                Part::File {
                    file_name: "resume.docx",
                    content_type: Some(
                        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                    ),
                    data: b"PK\x03\x04",
                },
                Part::Text("job_type", "Backend Developer"),
            ]),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Invalid file type. Only PDF is supported.");
        assert!(stored(&h.store).await.is_empty());
    }

    #[tokio::test]
    async fn test_upstream_failure_is_server_error_without_write() {
        let h = harness(FixedText(RESUME_TEXT), upstream_down).await;

        let (status, body) = send(
            h.app.clone(),
            multipart_request(&[
                pdf_part(b"%PDF-1.4"),
                Part::Text("job_type", "Backend Developer"),
            ]),
        )
        .await;

        assert!(status.is_server_error(), "status was {status}");
        assert_eq!(body["error"]["code"], "UPSTREAM_ERROR");
        assert!(!body.to_string().contains("backend unavailable"));
        assert!(stored(&h.store).await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_model_reply_is_upstream_error() {
        let h = harness(FixedText(RESUME_TEXT), missing_score).await;

        let (status, _) = send(
            h.app.clone(),
            multipart_request(&[
                pdf_part(b"%PDF-1.4"),
                Part::Text("job_type", "Backend Developer"),
            ]),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(stored(&h.store).await.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_pdf_is_server_error_and_skips_scoring() {
        let h = harness(BrokenPdf, scored_78).await;

        let (status, body) = send(
            h.app.clone(),
            multipart_request(&[
                pdf_part(b"%PDF-1.4"),
                Part::Text("job_type", "Backend Developer"),
            ]),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "EXTRACTION_ERROR");
        assert!(!body.to_string().contains("xref"));
        assert_eq!(h.scorer.calls.load(Ordering::SeqCst), 0);
        assert!(stored(&h.store).await.is_empty());
    }

    #[tokio::test]
    async fn test_image_only_pdf_is_server_error_without_write() {
        let h = harness(FixedText(""), scored_78).await;

        let (status, body) = send(
            h.app.clone(),
            multipart_request(&[
                pdf_part(b"%PDF-1.4"),
                Part::Text("job_type", "Backend Developer"),
            ]),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "NO_EXTRACTABLE_TEXT");
        assert_eq!(h.scorer.calls.load(Ordering::SeqCst), 0);
        assert!(stored(&h.store).await.is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_is_server_error_without_details() {
        let scorer = Arc::new(FakeScorer::new(scored_78));
        let app = build_router(AppState {
            extractor: Arc::new(FixedText(RESUME_TEXT)),
            scorer: scorer.clone(),
            store: Arc::new(FailingStore),
            upload_limit: 1024 * 1024,
        });

        let (status, body) = send(
            app.clone(),
            multipart_request(&[
                pdf_part(b"%PDF-1.4"),
                Part::Text("job_type", "Backend Developer"),
            ]),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "DATABASE_ERROR");
        let text = body.to_string();
        assert!(!text.contains("database is locked"), "leaked detail: {text}");
        assert!(!text.contains("disk I/O"), "leaked detail: {text}");
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 1);

        let list = Request::builder()
            .uri("/api/v1/analyses")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, list).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "DATABASE_ERROR");
    }

    #[tokio::test]
    async fn test_non_multipart_body_is_bad_request() {
        let h = harness(FixedText(RESUME_TEXT), scored_78).await;

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/analyze")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"job_type":"Backend Developer"}"#))
            .unwrap();
        let (status, body) = send(h.app.clone(), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(h.scorer.calls.load(Ordering::SeqCst), 0);
        assert!(stored(&h.store).await.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_upload_is_rejected() {
        let h = harness(FixedText(RESUME_TEXT), scored_78).await;
        let big = vec![b'x'; 2 * 1024 * 1024];

        let response = h
            .app
            .clone()
            .oneshot(multipart_request(&[
                pdf_part(&big),
                Part::Text("job_type", "Backend Developer"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(stored(&h.store).await.is_empty());
    }

    #[tokio::test]
    async fn test_history_endpoints() {
        let h = harness(FixedText(RESUME_TEXT), scored_78).await;

        let (status, _) = send(
            h.app.clone(),
            multipart_request(&[
                pdf_part(b"%PDF-1.4"),
                Part::Text("job_type", "Backend Developer"),
            ]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let list = Request::builder()
            .uri("/api/v1/analyses")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(h.app.clone(), list).await;
        assert_eq!(status, StatusCode::OK);
        let records = body.as_array().expect("array");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["job_type"], "Backend Developer");
        assert_eq!(records[0]["score"], 78);

        let id = records[0]["id"].as_str().unwrap().to_string();
        let one = Request::builder()
            .uri(format!("/api/v1/analyses/{id}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(h.app.clone(), one).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resume_text"], RESUME_TEXT);

        let missing = Request::builder()
            .uri(format!("/api/v1/analyses/{}", Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(h.app.clone(), missing).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[test]
    fn test_pdf_detection() {
        assert!(is_pdf_upload(Some("application/pdf"), Some("cv.bin")));
        assert!(is_pdf_upload(Some("Application/PDF; charset=binary"), None));
        assert!(is_pdf_upload(None, Some("CV.PDF")));
        assert!(is_pdf_upload(Some("application/octet-stream"), Some("cv.pdf")));
        assert!(!is_pdf_upload(Some("application/octet-stream"), Some("cv.doc")));
        assert!(!is_pdf_upload(Some("text/plain"), Some("cv.pdf")));
        assert!(!is_pdf_upload(None, None));
    }

    #[test]
    fn test_job_type_length_is_capped() {
        let file = || {
            Some(UploadedFile {
                file_name: Some("cv.pdf".into()),
                content_type: Some("application/pdf".into()),
                data: Bytes::from_static(b"%PDF-1.4"),
            })
        };
        assert!(validate_upload(file(), Some("a".repeat(MAX_JOB_TYPE_CHARS))).is_ok());
        assert!(matches!(
            validate_upload(file(), Some("a".repeat(MAX_JOB_TYPE_CHARS + 1))),
            Err(AppError::Validation(_))
        ));
    }
}
