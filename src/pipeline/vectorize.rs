//! Ties scan, change-detection, chunking, embedding and dual-write
//! into the full vectorization cycle.

use super::change_detection::{self, ChangeKind};
use super::chunker;
use super::fingerprint::FingerprintStore;
use crate::backend::{EmbeddingClient, ScannedItem, Scanner, SearchIndexer, VectorStoreClient};
use crate::config::PipelineConfig;
use crate::error::{ErrorCategory, ProcessingResult, RagentError};
use crate::metrics::Metrics;
use crate::model::{FingerprintRecord, IndexedDocument, ProgressReport, VectorRecord};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    Success,
    PartialSuccess,
    CompleteFailure,
    Skipped,
}

pub struct VectorizeOptions {
    pub dry_run: bool,
    pub force: bool,
    pub prune: bool,
}

impl Default for VectorizeOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            force: false,
            prune: false,
        }
    }
}

pub struct VectorizeOutcome {
    pub files_new: usize,
    pub files_modified: usize,
    pub files_unchanged: usize,
    pub files_deleted: usize,
    pub chunk_outcomes: HashMap<String, usize>,
    pub errors: ProcessingResult,
}

type ProgressCallback = Arc<dyn Fn(ProgressReport) + Send + Sync>;

pub struct VectorizePipeline {
    pub scanner: Arc<dyn Scanner>,
    pub embedder: Arc<dyn EmbeddingClient>,
    pub vector_store: Arc<dyn VectorStoreClient>,
    pub search_index: Arc<dyn SearchIndexer>,
    pub fingerprints: Arc<FingerprintStore>,
    pub config: PipelineConfig,
    pub metrics: Arc<Metrics>,
}

impl VectorizePipeline {
    pub async fn run(&self, options: &VectorizeOptions, on_progress: Option<ProgressCallback>) -> crate::error::Result<VectorizeOutcome> {
        let scanned = self.scanner.scan().await?;
        let existing = self.fingerprints.all()?;
        let partition = change_detection::partition(scanned, &existing, options.force);

        let files_unchanged = partition.unchanged.len();
        let files_new = partition.changed.iter().filter(|(_, k)| *k == ChangeKind::New).count();
        let files_modified = partition.changed.iter().filter(|(_, k)| *k == ChangeKind::Modified).count();
        let files_deleted = partition.deleted.len();

        let total = partition.changed.len() as u64;
        let processed = Arc::new(AtomicU64::new(0));
        let success = Arc::new(AtomicU64::new(0));
        let failed = Arc::new(AtomicU64::new(0));

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let chunk_outcomes: Arc<Mutex<HashMap<String, usize>>> = Arc::new(Mutex::new(HashMap::new()));
        let errors = Arc::new(Mutex::new(ProcessingResult::new(20)));

        let mut handles = Vec::new();
        for (item, _kind) in partition.changed {
            let semaphore = semaphore.clone();
            let embedder = self.embedder.clone();
            let vector_store = self.vector_store.clone();
            let search_index = self.search_index.clone();
            let fingerprints = self.fingerprints.clone();
            let config = self.config.clone();
            let processed = processed.clone();
            let success = success.clone();
            let failed = failed.clone();
            let chunk_outcomes = chunk_outcomes.clone();
            let errors = errors.clone();
            let dry_run = options.dry_run;
            let on_progress = on_progress.clone();

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                let outcome = process_file(&item, &embedder, &vector_store, &search_index, &fingerprints, &config, dry_run, &errors).await;

                {
                    let mut outcomes = chunk_outcomes.lock().unwrap();
                    let label = match outcome {
                        ChunkOutcome::Success => "success",
                        ChunkOutcome::PartialSuccess => "partial_success",
                        ChunkOutcome::CompleteFailure => "complete_failure",
                        ChunkOutcome::Skipped => "skipped",
                    };
                    *outcomes.entry(label.to_string()).or_insert(0) += 1;
                }

                if matches!(outcome, ChunkOutcome::CompleteFailure) {
                    failed.fetch_add(1, Ordering::SeqCst);
                } else {
                    success.fetch_add(1, Ordering::SeqCst);
                }
                let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(cb) = &on_progress {
                    cb(ProgressReport {
                        total,
                        processed: done,
                        success: success.load(Ordering::SeqCst),
                        failed: failed.load(Ordering::SeqCst),
                    });
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            let _ = handle.await;
        }

        if options.prune {
            for fp in &partition.deleted {
                self.fingerprints.remove(&fp.source_type, &fp.path)?;
            }
        }

        let chunk_outcomes = Arc::try_unwrap(chunk_outcomes).unwrap().into_inner().unwrap();
        let errors = Arc::try_unwrap(errors).unwrap().into_inner().unwrap();

        self.metrics.add_pipeline_files_vectorized(success.load(Ordering::SeqCst));
        self.metrics.add_pipeline_chunks_failed(failed.load(Ordering::SeqCst));

        Ok(VectorizeOutcome {
            files_new,
            files_modified,
            files_unchanged,
            files_deleted,
            chunk_outcomes,
            errors,
        })
    }
}

async fn process_file(
    item: &ScannedItem,
    embedder: &Arc<dyn EmbeddingClient>,
    vector_store: &Arc<dyn VectorStoreClient>,
    search_index: &Arc<dyn SearchIndexer>,
    fingerprints: &Arc<FingerprintStore>,
    config: &PipelineConfig,
    dry_run: bool,
    errors: &Arc<Mutex<ProcessingResult>>,
) -> ChunkOutcome {
    if dry_run {
        return ChunkOutcome::Skipped;
    }

    let base_id = format!("{}:{}", item.source_type, item.path);
    let chunks = chunker::chunk_document(&item.content, config.max_tokens, config.chunk_overlap_tokens);
    let total_chunks = chunks.len();

    let mut any_chunk_failed_fully = false;
    let mut all_chunks_fully_succeeded = true;

    for chunk in chunks {
        let chunk_id = chunker::chunk_id(&base_id, chunk.index);
        let embedding = retry_with_backoff(config, || embed_one(embedder, &chunk.text)).await;

        let embedding = match embedding {
            Ok(vec) => vec,
            Err(e) => {
                errors.lock().unwrap().record(e.category, e.message);
                all_chunks_fully_succeeded = false;
                any_chunk_failed_fully = true;
                continue;
            }
        };

        let vector_record = VectorRecord {
            id: chunk_id.clone(),
            embedding: embedding.clone(),
            metadata: HashMap::new(),
            content: chunk.text.clone(),
            created_at: chrono::Utc::now(),
        };
        let indexed_doc = IndexedDocument {
            id: chunk_id.clone(),
            title: chunker::chunk_title(&item.path, chunk.index, total_chunks),
            content: chunk.text.clone(),
            content_ja: None,
            reference: item.path.clone(),
            vector: embedding,
        };

        let (vector_result, search_result) = tokio::join!(
            retry_with_backoff(config, || write_vector(vector_store, vector_record.clone())),
            retry_with_backoff(config, || write_index(search_index, indexed_doc.clone())),
        );

        match (vector_result, search_result) {
            (Ok(()), Ok(())) => {}
            (Ok(()), Err(e)) | (Err(e), Ok(())) => {
                errors.lock().unwrap().record(e.category, e.message);
                all_chunks_fully_succeeded = false;
            }
            (Err(e1), Err(e2)) => {
                errors.lock().unwrap().record(e1.category, e1.message);
                errors.lock().unwrap().record(e2.category, e2.message);
                all_chunks_fully_succeeded = false;
                any_chunk_failed_fully = true;
            }
        }
    }

    if all_chunks_fully_succeeded {
        let _ = fingerprints.upsert(&FingerprintRecord {
            source_type: item.source_type.clone(),
            path: item.path.clone(),
            content_hash: item.content_hash.clone(),
            size: item.size,
            vectorized_at: chrono::Utc::now(),
        });
        ChunkOutcome::Success
    } else if any_chunk_failed_fully {
        ChunkOutcome::CompleteFailure
    } else {
        let _ = fingerprints.upsert(&FingerprintRecord {
            source_type: item.source_type.clone(),
            path: item.path.clone(),
            content_hash: item.content_hash.clone(),
            size: item.size,
            vectorized_at: chrono::Utc::now(),
        });
        ChunkOutcome::PartialSuccess
    }
}

async fn embed_one(embedder: &Arc<dyn EmbeddingClient>, text: &str) -> crate::error::Result<Vec<f32>> {
    let mut vectors = embedder.embed(&[text.to_string()]).await?;
    match vectors.pop() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(RagentError::new(ErrorCategory::Embedding, "embedding provider returned an empty vector")),
    }
}

async fn write_vector(store: &Arc<dyn VectorStoreClient>, record: VectorRecord) -> crate::error::Result<()> {
    store.put(record).await
}

async fn write_index(index: &Arc<dyn SearchIndexer>, doc: IndexedDocument) -> crate::error::Result<()> {
    index.index(doc).await
}

/// Exponential backoff with multiplier 2 and a 30s ceiling, honoring
/// the category's retryability rather than retrying everything.
async fn retry_with_backoff<F, Fut, T>(config: &PipelineConfig, mut op: F) -> crate::error::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = crate::error::Result<T>>,
{
    let mut delay = config.retry_base_delay;
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < config.retry_max_attempts => {
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(config.retry_max_delay);
            }
            Err(e) => return Err(e),
        }
    }
}
