use super::Extractor;
use rag_core::models::ExtractionResult;
use regex::Regex;
use std::io::Read;

/// PPTX is a zip of OOXML slide parts. Each `ppt/slides/slideN.xml` becomes
/// one chunker "page" (spec.md's `slideNumber` field), with all `<a:t>`
/// text runs on that slide concatenated. Grounded on the teacher's
/// `scraper`-based tag-stripping idiom in `parser.rs::extract_text_from_html`,
/// applied to XML text runs since no XML-tree crate is in the stack.
pub struct PptxExtractor;

impl Extractor for PptxExtractor {
    fn extract(&self, bytes: &[u8]) -> anyhow::Result<ExtractionResult> {
        let reader = std::io::Cursor::new(bytes);
        let mut archive = zip::ZipArchive::new(reader)?;

        let slide_re = Regex::new(r"^ppt/slides/slide(\d+)\.xml$")?;
        let text_run_re = Regex::new(r"<a:t>(.*?)</a:t>")?;

        let mut slides: Vec<(u32, String)> = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let name = entry.name().to_string();
            let Some(caps) = slide_re.captures(&name) else {
                continue;
            };
            let slide_num: u32 = caps[1].parse()?;

            let mut xml = String::new();
            entry.read_to_string(&mut xml)?;

            let mut text = String::new();
            for m in text_run_re.captures_iter(&xml) {
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(&decode_xml_entities(&m[1]));
            }
            slides.push((slide_num, text));
        }
        slides.sort_by_key(|(n, _)| *n);

        let page_contents: Vec<String> = slides.iter().map(|(_, t)| t.clone()).collect();
        let page_titles: Vec<Option<String>> = slides
            .iter()
            .map(|(_, t)| {
                t.split(['.', '\n'])
                    .next()
                    .filter(|s| !s.is_empty() && s.len() < 200)
                    .map(|s| s.trim().to_string())
            })
            .collect();
        let total_pages = page_contents.len() as i32;

        Ok(ExtractionResult {
            page_contents,
            page_titles,
            total_pages,
        })
    }
}

fn decode_xml_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}
