mod image;
mod pdf;
mod pptx;
mod text;

use rag_core::models::{ExtractionResult, FileType};

/// `(fileType) → Extractor` lookup table (spec.md §9) — a dispatch table
/// instead of virtual-dispatch document-processor inheritance.
pub trait Extractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> anyhow::Result<ExtractionResult>;
}

pub fn extractor_for(file_type: FileType) -> Box<dyn Extractor> {
    match file_type {
        FileType::Pdf => Box::new(pdf::PdfExtractor),
        FileType::Pptx => Box::new(pptx::PptxExtractor),
        // Legacy binary PPT (pre-OOXML) needs a dedicated parser this
        // stack doesn't carry; treated like an OCR miss — non-fatal empty
        // page rather than a fatal extraction error.
        FileType::Ppt => Box::new(text::EmptyExtractor),
        FileType::Png | FileType::Jpg | FileType::Jpeg => Box::new(image::ImageExtractor),
        FileType::Txt => Box::new(text::TextExtractor),
    }
}
