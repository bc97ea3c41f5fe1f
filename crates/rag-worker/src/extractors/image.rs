use super::Extractor;
use rag_core::models::ExtractionResult;

/// Image inputs (png/jpg/jpeg) require OCR, which this stack doesn't carry
/// a library for. Per spec.md §4.8 ("OCR failures yield empty text for
/// that page, non-fatal"), this returns a single empty page rather than
/// failing the document.
pub struct ImageExtractor;

impl Extractor for ImageExtractor {
    fn extract(&self, _bytes: &[u8]) -> anyhow::Result<ExtractionResult> {
        Ok(ExtractionResult {
            page_contents: vec![String::new()],
            page_titles: vec![None],
            total_pages: 1,
        })
    }
}
