use std::sync::Arc;

use crate::analysis::extract::TextExtractor;
use crate::analysis::scoring::Scorer;
use crate::analysis::store::ResultStore;

/// Shared application state injected into all route handlers via Axum extractors.
/// Every collaborator is a trait object so tests can swap in fakes.
#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<dyn TextExtractor>,
    pub scorer: Arc<dyn Scorer>,
    pub store: Arc<dyn ResultStore>,
    /// Maximum request body size for uploads, in bytes.
    pub upload_limit: usize,
}
