use super::Extractor;
use encoding_rs::UTF_8;
use rag_core::models::ExtractionResult;

/// Plain text: decode as UTF-8, falling back to a best-effort re-encode on
/// invalid bytes, mirroring the teacher's `parser.rs::decode_text`. A
/// whole `.txt` file is treated as a single page.
pub struct TextExtractor;

impl Extractor for TextExtractor {
    fn extract(&self, bytes: &[u8]) -> anyhow::Result<ExtractionResult> {
        let content = match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => {
                let (decoded, _, _) = UTF_8.decode(bytes);
                decoded.into_owned()
            }
        };

        if content.trim().is_empty() {
            return Ok(ExtractionResult::default());
        }

        let title = content
            .lines()
            .find(|l| !l.trim().is_empty())
            .filter(|l| l.len() < 200)
            .map(|l| l.trim().to_string());

        Ok(ExtractionResult {
            page_contents: vec![content],
            page_titles: vec![title],
            total_pages: 1,
        })
    }
}

/// OCR/legacy-format miss: produces zero pages, non-fatal per spec.md §4.8
/// step 3 ("OCR failures yield empty text for that page").
pub struct EmptyExtractor;

impl Extractor for EmptyExtractor {
    fn extract(&self, _bytes: &[u8]) -> anyhow::Result<ExtractionResult> {
        Ok(ExtractionResult::default())
    }
}
