use crate::extractors::extractor_for;
use futures::future::join_all;
use rag_core::chunker::Chunker;
use rag_core::config::JobConfig;
use rag_core::db::repository::Repository;
use rag_core::db::vector_store::{NewChunk, VectorStore};
use rag_core::embedding::EmbeddingService;
use rag_core::error::{EngineError, EngineResult};
use rag_core::models::FileType;
use rag_core::storage::FileStorage;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Per-document extract → chunk → embed (parallel) → persist pipeline
/// (C8, spec.md §4.8). DB transactions never span an embedding call: step
/// 1 and step 6 each open and close their own transaction/connection.
pub struct DocumentPipeline {
    repo: Repository,
    vector_store: Arc<dyn VectorStore>,
    storage: Arc<dyn FileStorage>,
    embedding: Arc<EmbeddingService>,
    chunker: Chunker,
    job: JobConfig,
}

impl DocumentPipeline {
    pub fn new(
        repo: Repository,
        vector_store: Arc<dyn VectorStore>,
        storage: Arc<dyn FileStorage>,
        embedding: Arc<EmbeddingService>,
        chunker: Chunker,
        job: JobConfig,
    ) -> Self {
        Self {
            repo,
            vector_store,
            storage,
            embedding,
            chunker,
            job,
        }
    }

    pub async fn process_document(&self, document_id: Uuid) -> EngineResult<()> {
        match self.process_document_internal(document_id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.repo.fail_document(document_id, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    async fn process_document_internal(&self, document_id: Uuid) -> EngineResult<()> {
        let document = self.repo.get_document(document_id).await?;
        let file_type = FileType::from_extension(&document.file_type)
            .ok_or_else(|| EngineError::Validation(format!("unknown file type {}", document.file_type)))?;

        // Step 1: short transaction — clear stale chunks, mark PROCESSING.
        self.repo.begin_processing(document_id).await?;

        // Step 2: poll file storage with exponential backoff, base 1s.
        let bytes = self.load_file_with_retry(document_id, file_type).await?;
        warn_on_type_mismatch(document_id, file_type, &bytes);

        // Step 3: extract.
        info!("extracting document {document_id} ({})", file_type.as_str());
        let extraction = extractor_for(file_type)
            .extract(&bytes)
            .map_err(|e| EngineError::Internal(format!("extraction failed: {e}")))?;

        // A document of zero pages is a distinct boundary from one whose
        // pages extracted to empty text (spec.md §8): the former is a
        // validation failure, the latter completes with zero chunks.
        if extraction.total_pages == 0 {
            return Err(EngineError::Validation(format!(
                "document {document_id} has zero pages"
            )));
        }

        // Step 4: chunk.
        let drafts = self
            .chunker
            .chunk_pages(&extraction.page_contents, &extraction.page_titles);

        if drafts.is_empty() {
            self.repo
                .complete_document(document_id, extraction.total_pages, 0)
                .await?;
            self.repo.invalidate_cache(document.chat_id).await?;
            info!("document {document_id} completed with zero chunks (empty extraction)");
            return Ok(());
        }

        // Step 5: embed in parallel, bounded concurrency per document,
        // each call keyed on the document's deterministically assigned
        // API key. Any chunk failure fails the whole document — siblings'
        // results within a batch are discarded once one batch errors.
        let concurrency = self.job.embed_concurrency_per_doc.max(1);
        let mut new_chunks: Vec<NewChunk> = Vec::with_capacity(drafts.len());

        for batch in drafts.chunks(concurrency) {
            let futures = batch.iter().map(|draft| {
                let embedding = self.embedding.clone();
                let content = draft.content.clone();
                async move { embedding.embed_for(&content, document_id).await }
            });
            let embedded: Vec<EngineResult<Vec<f32>>> = join_all(futures).await;

            for (draft, result) in batch.iter().zip(embedded) {
                let vector = result?;
                let content_hash = hex::encode(Sha256::digest(draft.content.as_bytes()));
                new_chunks.push(NewChunk {
                    id: Uuid::new_v4(),
                    document_id,
                    user_id: document.user_id,
                    chat_id: document.chat_id,
                    chunk_index: draft.chunk_index,
                    content: draft.content.clone(),
                    content_hash,
                    page_number: draft.page_number,
                    slide_number: None,
                    section_title: draft.section_title.clone(),
                    embedding: vector,
                    token_count: draft.token_count,
                });
            }
        }

        // Step 6: short transaction — batch insert, mark COMPLETED.
        self.vector_store.batch_insert(&new_chunks).await?;
        self.repo
            .complete_document(document_id, extraction.total_pages, new_chunks.len() as i32)
            .await?;
        // New chunks change this chat's retrievable content — stale cached
        // answers must not survive it (spec.md §4.10 invalidate contract).
        self.repo.invalidate_cache(document.chat_id).await?;

        info!(
            "document {document_id} completed: {} pages, {} chunks",
            extraction.total_pages,
            new_chunks.len()
        );
        Ok(())
    }

    async fn load_file_with_retry(&self, document_id: Uuid, file_type: FileType) -> EngineResult<Vec<u8>> {
        let ext = file_type.as_str();
        let attempts = self.job.file_poll_attempts.max(1);
        for attempt in 1..=attempts {
            if self.storage.exists(document_id, ext).await {
                return self
                    .storage
                    .get(document_id, ext)
                    .await
                    .map_err(EngineError::Io);
            }
            if attempt < attempts {
                let delay = self.job.file_poll_base_ms * attempt as u64;
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }
        }
        Err(EngineError::Internal(format!(
            "File not found for document {document_id} after {attempts} attempts"
        )))
    }
}

/// Magic-number sanity check before dispatching to an extractor. Plain
/// text and legacy `.ppt` have no reliable magic number, so `infer` is
/// only consulted for the formats it actually recognizes; a mismatch is
/// logged, not fatal — the declared `fileType` still drives extraction.
fn warn_on_type_mismatch(document_id: Uuid, declared: FileType, bytes: &[u8]) {
    let Some(sniffed) = infer::get(bytes) else {
        return;
    };
    let matches = match declared {
        FileType::Pdf => sniffed.mime_type() == "application/pdf",
        FileType::Pptx => sniffed.mime_type() == "application/zip",
        FileType::Png => sniffed.mime_type() == "image/png",
        FileType::Jpg | FileType::Jpeg => sniffed.mime_type() == "image/jpeg",
        FileType::Txt | FileType::Ppt => true,
    };
    if !matches {
        tracing::warn!(
            "document {document_id}: declared type {} but content sniffed as {}",
            declared.as_str(),
            sniffed.mime_type()
        );
    }
}
