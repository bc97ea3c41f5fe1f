use super::Extractor;
use lopdf::Document as PdfDocument;
use rag_core::models::ExtractionResult;
use tracing::warn;

/// Per-page text extraction via `lopdf`, grounded on the teacher's
/// `document/parser.rs::parse_pdf` (single-document `extract_text` call
/// per page), generalized here into the `pages[]`/`titles[]` shape C6
/// needs instead of one concatenated string.
pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn extract(&self, bytes: &[u8]) -> anyhow::Result<ExtractionResult> {
        let doc = PdfDocument::load_mem(bytes)?;
        let pages = doc.get_pages();
        let total_pages = pages.len() as i32;

        let mut page_contents = Vec::with_capacity(pages.len());
        let mut page_titles = Vec::with_capacity(pages.len());

        for (page_num, _) in pages.iter() {
            let text = doc.extract_text(&[*page_num]).unwrap_or_else(|e| {
                warn!("failed to extract text from pdf page {page_num}: {e}");
                String::new()
            });
            let title = text
                .lines()
                .find(|l| !l.trim().is_empty())
                .filter(|l| l.len() < 200)
                .map(|l| l.trim().to_string());
            page_contents.push(text);
            page_titles.push(title);
        }

        Ok(ExtractionResult {
            page_contents,
            page_titles,
            total_pages,
        })
    }
}
