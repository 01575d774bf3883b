//! PDF text extraction on top of `pdf-extract`.
//!
//! Only digital-native PDFs yield text. Scanned (image-only) documents come
//! back as an empty string; no OCR is performed.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Readers accept the header anywhere in the first kilobyte.
const HEADER_WINDOW: usize = 1024;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("input is not a PDF document")]
    NotPdf,

    #[error("PDF could not be read: {0}")]
    Unreadable(String),
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Returns the trimmed plain text of the document, possibly empty.
    async fn extract(&self, pdf: Bytes) -> Result<String, ExtractionError>;
}

/// Extracts text with `pdf_extract::extract_text_from_mem` on the blocking pool.
pub struct PdfTextExtractor;

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, pdf: Bytes) -> Result<String, ExtractionError> {
        if !has_pdf_header(&pdf) {
            return Err(ExtractionError::NotPdf);
        }

        // pdf-extract panics on some malformed files; a panic surfaces here as a JoinError.
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&pdf))
            .await
            .map_err(|e| ExtractionError::Unreadable(format!("extraction task failed: {e}")))?
            .map_err(|e| ExtractionError::Unreadable(e.to_string()))?;

        Ok(text.trim().to_string())
    }
}

fn has_pdf_header(data: &[u8]) -> bool {
    let window = &data[..data.len().min(HEADER_WINDOW)];
    window.windows(5).any(|w| w == b"%PDF-")
}

/// Builds a one-page PDF whose page content stream is `content`,
/// with a correct cross-reference table.
#[cfg(test)]
fn build_pdf(content: &str) -> Vec<u8> {
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
         /Resources << /Font << /F1 5 0 R >> >> >>"
            .to_string(),
        format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            content.len(),
            content
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
    ];

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }

    let xref_offset = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        pdf.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        )
        .as_bytes(),
    );
    pdf
}
