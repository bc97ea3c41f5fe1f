use crate::config::ChunkingConfig;
use regex::Regex;

/// A chunk not yet persisted — `document_id`/`user_id`/`chat_id`/`embedding`
/// are filled in by the caller once C5 has produced the vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    pub chunk_index: i32,
    pub content: String,
    pub page_number: Option<i32>,
    pub section_title: Option<String>,
    pub token_count: i32,
}

/// Splits extracted page text into token-bounded, overlapping chunks
/// (spec.md §4.6).
pub struct Chunker {
    max_chunk_tokens: usize,
    overlap_tokens: usize,
    chars_per_token: usize,
    sentence_re: Regex,
}

impl Chunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            max_chunk_tokens: config.max_chunk_tokens,
            overlap_tokens: config.overlap_tokens,
            chars_per_token: config.chars_per_token,
            sentence_re: Regex::new(r"[.!?]\s+").expect("static sentence-boundary regex"),
        }
    }

    /// `ceil(len(text) / chars_per_token)`.
    pub fn count_tokens(&self, text: &str) -> usize {
        let len = text.chars().count();
        len.div_ceil(self.chars_per_token)
    }

    /// Splits on sentence boundaries, keeping each sentence's trailing
    /// whitespace attached so that concatenating the pieces reproduces the
    /// original text exactly (needed for the full-coverage property).
    fn split_sentences(&self, text: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut start = 0usize;
        for m in self.sentence_re.find_iter(text) {
            let end = m.end();
            sentences.push(text[start..end].to_string());
            start = end;
        }
        if start < text.len() {
            sentences.push(text[start..].to_string());
        }
        sentences
    }

    fn tail_chars(s: &str, n: usize) -> String {
        let total = s.chars().count();
        if total <= n {
            return s.to_string();
        }
        s.chars().skip(total - n).collect()
    }

    /// Runs the full per-page algorithm over `pages` (1-indexed) and
    /// optional `titles` of matching length.
    pub fn chunk_pages(&self, pages: &[String], titles: &[Option<String>]) -> Vec<ChunkDraft> {
        let mut chunks = Vec::new();
        let mut next_index: i32 = 0;
        let char_limit = self.max_chunk_tokens * self.chars_per_token;
        let overlap_chars = self.overlap_tokens * self.chars_per_token;

        for (i, content) in pages.iter().enumerate() {
            if content.is_empty() {
                continue;
            }
            let page_number = (i + 1) as i32;
            let title = titles.get(i).cloned().flatten();

            if self.count_tokens(content) <= self.max_chunk_tokens {
                chunks.push(ChunkDraft {
                    chunk_index: next_index,
                    token_count: self.count_tokens(content) as i32,
                    content: content.clone(),
                    page_number: Some(page_number),
                    section_title: title,
                });
                next_index += 1;
                continue;
            }

            let mut accum = String::new();
            for sentence in self.split_sentences(content) {
                if !accum.is_empty()
                    && accum.chars().count() + sentence.chars().count() > char_limit
                {
                    chunks.push(ChunkDraft {
                        chunk_index: next_index,
                        token_count: self.count_tokens(&accum) as i32,
                        content: accum.clone(),
                        page_number: Some(page_number),
                        section_title: title.clone(),
                    });
                    next_index += 1;
                    accum = Self::tail_chars(&accum, overlap_chars);
                }
                accum.push_str(&sentence);
            }
            if !accum.is_empty() {
                chunks.push(ChunkDraft {
                    chunk_index: next_index,
                    token_count: self.count_tokens(&accum) as i32,
                    content: accum,
                    page_number: Some(page_number),
                    section_title: title,
                });
                next_index += 1;
            }
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkingConfig;

    fn chunker() -> Chunker {
        Chunker::new(&ChunkingConfig {
            max_chunk_tokens: 512,
            overlap_tokens: 50,
            chars_per_token: 4,
        })
    }

    #[test]
    fn short_page_is_one_chunk() {
        let c = chunker();
        let pages = vec!["A short page.".to_string()];
        let chunks = c.chunk_pages(&pages, &[]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "A short page.");
        assert_eq!(chunks[0].page_number, Some(1));
    }

    #[test]
    fn empty_page_produces_no_chunks() {
        let c = chunker();
        let pages = vec!["".to_string()];
        assert!(c.chunk_pages(&pages, &[]).is_empty());
    }

    /// S3 — Chunking boundary: 2048 chars of alternating "The cat sat. ",
    /// MAX_CHUNK_TOKENS=512 (2048 char max). Expect either 1 chunk or 2
    /// chunks whose boundary overlaps by 200 chars, with full coverage.
    #[test]
    fn chunking_boundary_s3() {
        let c = chunker();
        let unit = "The cat sat. ";
        let mut page = String::new();
        while page.chars().count() < 2048 {
            page.push_str(unit);
        }
        let page: String = page.chars().take(2048).collect();
        let chunks = c.chunk_pages(&[page.clone()], &[]);

        assert!(chunks.len() == 1 || chunks.len() == 2);
        if chunks.len() == 2 {
            let first_tail: String = chunks[0].content.chars().rev().take(200).collect::<Vec<_>>().into_iter().rev().collect();
            let second_head: String = chunks[1].content.chars().take(200).collect();
            assert_eq!(first_tail, second_head);
        }

        let concatenated: String = if chunks.len() == 1 {
            chunks[0].content.clone()
        } else {
            // drop the duplicated overlap prefix of the second chunk.
            let overlap = 200usize.min(chunks[1].content.chars().count());
            let deduped: String = chunks[1].content.chars().skip(overlap).collect();
            format!("{}{}", chunks[0].content, deduped)
        };
        assert_eq!(concatenated, page);
    }

    #[test]
    fn chunk_index_is_monotonic() {
        let c = chunker();
        let pages = vec!["Page one.".to_string(), "Page two.".to_string()];
        let chunks = c.chunk_pages(&pages, &[]);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as i32);
        }
    }

    #[test]
    fn deterministic_given_same_input() {
        let c = chunker();
        let pages = vec!["A. B. C. D.".to_string()];
        let a = c.chunk_pages(&pages, &[]);
        let b = c.chunk_pages(&pages, &[]);
        assert_eq!(a, b);
    }
}
