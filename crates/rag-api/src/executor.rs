use std::fmt::Write as _;
use std::time::Instant;

use regex::Regex;
use uuid::Uuid;

use rag_core::error::{EngineError, EngineResult};
use rag_core::models::{ProcessingMode, QueryMetadata, QueryResponse, RetrievalScope, Source};

use crate::state::AppState;

/// One prior turn of `chatHistory[]` from the `/query` request body.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// Word-based heuristic, same shape as the teacher's
/// `utils/token_estimator.rs::estimate_tokens` — good enough for a
/// budget check, not an exact tokenizer.
fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let words = text.split_whitespace().count();
    ((words as f64 * 1.3) + 5.0).ceil() as usize
}

const SYSTEM_INSTRUCTION: &str = "You are a careful assistant that answers strictly from the \
supplied context. Every claim must cite its source using a [Source N] marker matching one of \
the numbered sources below. If the context does not contain the answer, say so plainly instead \
of guessing.";

fn marks_guidance(marks: i32) -> &'static str {
    match marks {
        1..=2 => "Answer briefly, in one or two sentences.",
        3..=5 => "Give a short answer, a few sentences covering the key point.",
        6..=10 => "Give a detailed answer with supporting explanation.",
        _ => "Write a full essay-length answer with structured sections.",
    }
}

/// Assembles the system+user prompt from retrieved chunks, the question,
/// optional marks guidance and trailing chat history, truncating chunks
/// (lowest-relevance first, since `chunks` arrives ordered by ascending
/// distance) once `max_prompt_tokens` would be exceeded. Mirrors the
/// teacher's `format_grouped_context`'s write!+truncate rollback, adapted
/// to the `[Source N]` convention spec.md §4.11/§6 require instead of
/// XML tags.
fn assemble_prompt(
    chunks: &[rag_core::models::RetrievedChunk],
    question: &str,
    marks: Option<i32>,
    format_hint: Option<&str>,
    history: &[ChatTurn],
    max_prompt_tokens: usize,
) -> (String, Vec<Source>, bool) {
    let mut prompt = String::with_capacity(max_prompt_tokens * 4);
    let _ = write!(prompt, "{SYSTEM_INSTRUCTION}\n\n");
    let mut tokens = estimate_tokens(&prompt);

    let mut sources = Vec::with_capacity(chunks.len());
    let mut truncated = false;

    for (i, chunk) in chunks.iter().enumerate() {
        let n = i + 1;
        let locator = match (chunk.page_number, chunk.slide_number) {
            (Some(p), _) => format!("page {p}"),
            (None, Some(s)) => format!("slide {s}"),
            (None, None) => "unknown location".to_string(),
        };
        let start = prompt.len();
        let _ = write!(
            prompt,
            "[Source {n}] ({}, {locator}):\n{}\n\n",
            chunk.file_name,
            chunk.content.trim()
        );
        let added = estimate_tokens(&prompt[start..]);
        if tokens + added > max_prompt_tokens {
            prompt.truncate(start);
            truncated = true;
            break;
        }
        tokens += added;
        sources.push(Source {
            document_id: chunk.document_id,
            file_name: chunk.file_name.clone(),
            page_number: chunk.page_number,
            slide_number: chunk.slide_number,
            excerpt: chunk.content.chars().take(280).collect(),
        });
    }

    if !history.is_empty() {
        let _ = write!(prompt, "Conversation so far:\n");
        for turn in history.iter().rev().take(6).collect::<Vec<_>>().into_iter().rev() {
            let _ = writeln!(prompt, "{}: {}", turn.role, turn.content);
        }
        let _ = write!(prompt, "\n");
    }

    let _ = write!(prompt, "Question: {question}\n");
    if let Some(m) = marks {
        let _ = write!(prompt, "{}\n", marks_guidance(m));
    }
    if let Some(hint) = format_hint {
        let _ = write!(prompt, "Additional formatting instructions: {hint}\n");
    }

    (prompt, sources, truncated)
}

/// Pairs `[Source N]` mentions in `answer_text` against `candidate_sources`
/// (1-indexed), returning only the sources the model actually cited, in
/// citation order of first mention. Falls back to all candidates if the
/// model cited nothing (better to over-attribute than under-attribute).
fn extract_cited_sources(
    answer_text: &str,
    candidate_sources: &[Source],
) -> EngineResult<Vec<Source>> {
    let re = Regex::new(r"\[Source (\d+)\]")
        .map_err(|e| EngineError::Internal(format!("invalid citation regex: {e}")))?;

    let mut seen = std::collections::BTreeSet::new();
    let mut cited = Vec::new();
    for cap in re.captures_iter(answer_text) {
        if let Ok(n) = cap[1].parse::<usize>() {
            if n >= 1 && n <= candidate_sources.len() && seen.insert(n) {
                cited.push(candidate_sources[n - 1].clone());
            }
        }
    }

    if cited.is_empty() {
        return Ok(candidate_sources.to_vec());
    }
    Ok(cited)
}

#[allow(clippy::too_many_arguments)]
pub async fn answer(
    state: &AppState,
    user_id: Uuid,
    chat_id: Uuid,
    question: &str,
    marks: Option<i32>,
    format_hint: Option<&str>,
    document_ids: Option<Vec<Uuid>>,
    use_cross_chat: bool,
    history: &[ChatTurn],
) -> EngineResult<QueryResponse> {
    let total_start = Instant::now();

    if let Some(hit) = state.cache.find(chat_id, question).await? {
        let sources: Vec<Source> = serde_json::from_value(hit.sources_used).unwrap_or_default();
        return Ok(QueryResponse {
            answer: hit.response_text,
            sources,
            metadata: QueryMetadata {
                retrieval_time_ms: 0,
                generation_time_ms: 0,
                total_time_ms: total_start.elapsed().as_millis() as i64,
                chunks_used: 0,
                tokens_used: 0,
            },
            processing_mode: ProcessingMode::Cached,
            cache_hit: true,
            llm_calls_used: 0,
        });
    }

    let retrieval_start = Instant::now();
    let query_vec = state.embedding.embed(question).await?;
    let scope = RetrievalScope {
        chat_id: if use_cross_chat { None } else { Some(chat_id) },
        document_ids,
        allow_cross_chat: use_cross_chat,
    };
    let limit = state.settings.engine.job.max_context_chunks;
    let chunks = state
        .vector_store
        .knn(user_id, &query_vec, &scope, limit)
        .await?;
    let retrieval_time_ms = retrieval_start.elapsed().as_millis() as i64;

    let (prompt, candidate_sources, truncated) = assemble_prompt(
        &chunks,
        question,
        marks,
        format_hint,
        history,
        state.settings.rag.max_prompt_tokens,
    );
    if truncated {
        tracing::debug!(chat_id = %chat_id, "prompt context truncated to fit token budget");
    }

    let generation_start = Instant::now();
    let answer_text = state.router.generate(&prompt, None).await?;
    let generation_time_ms = generation_start.elapsed().as_millis() as i64;

    let cited = extract_cited_sources(&answer_text, &candidate_sources)?;
    let sources_json = serde_json::to_value(&cited)
        .map_err(|e| EngineError::Internal(format!("sources serialization failed: {e}")))?;

    let total_time_ms = total_start.elapsed().as_millis() as i64;
    state
        .repo
        .insert_query_history(
            user_id,
            chat_id,
            question,
            marks,
            &answer_text,
            sources_json.clone(),
            retrieval_time_ms,
            generation_time_ms,
            total_time_ms,
            chunks.len() as i32,
            1,
        )
        .await?;

    state
        .cache
        .store(chat_id, user_id, question, &answer_text, sources_json)
        .await?;

    Ok(QueryResponse {
        answer: answer_text,
        sources: cited,
        metadata: QueryMetadata {
            retrieval_time_ms,
            generation_time_ms,
            total_time_ms,
            chunks_used: chunks.len(),
            tokens_used: estimate_tokens(&prompt),
        },
        processing_mode: ProcessingMode::SingleCall,
        cache_hit: false,
        llm_calls_used: 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_core::models::RetrievedChunk;

    fn chunk(n: i32, page: Option<i32>) -> RetrievedChunk {
        RetrievedChunk {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            chunk_index: n,
            content: format!("content of chunk {n}"),
            page_number: page,
            slide_number: None,
            section_title: None,
            token_count: 10,
            file_name: format!("doc{n}.pdf"),
        }
    }

    #[test]
    fn assemble_prompt_includes_source_markers() {
        let chunks = vec![chunk(0, Some(1)), chunk(1, Some(2))];
        let (prompt, sources, truncated) =
            assemble_prompt(&chunks, "what is x?", Some(5), None, &[], 6000);
        assert!(prompt.contains("[Source 1]"));
        assert!(prompt.contains("[Source 2]"));
        assert!(prompt.contains("Question: what is x?"));
        assert_eq!(sources.len(), 2);
        assert!(!truncated);
    }

    #[test]
    fn assemble_prompt_truncates_when_over_budget() {
        let chunks: Vec<_> = (0..50).map(|n| chunk(n, Some(n))).collect();
        let (_prompt, sources, truncated) =
            assemble_prompt(&chunks, "q", None, None, &[], 50);
        assert!(truncated);
        assert!(sources.len() < 50);
    }

    #[test]
    fn extract_cited_sources_filters_to_citations() {
        let sources = vec![
            Source { document_id: Uuid::new_v4(), file_name: "a.pdf".into(), page_number: Some(1), slide_number: None, excerpt: "a".into() },
            Source { document_id: Uuid::new_v4(), file_name: "b.pdf".into(), page_number: Some(2), slide_number: None, excerpt: "b".into() },
        ];
        let cited = extract_cited_sources("see [Source 2] for details", &sources).unwrap();
        assert_eq!(cited.len(), 1);
        assert_eq!(cited[0].file_name, "b.pdf");
    }

    #[test]
    fn extract_cited_sources_falls_back_to_all_when_uncited() {
        let sources = vec![Source {
            document_id: Uuid::new_v4(),
            file_name: "a.pdf".into(),
            page_number: Some(1),
            slide_number: None,
            excerpt: "a".into(),
        }];
        let cited = extract_cited_sources("no citations here", &sources).unwrap();
        assert_eq!(cited.len(), 1);
    }
}
