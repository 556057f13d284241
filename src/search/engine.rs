//! Hybrid search engine: URL short-circuit, parallel BM25/vector
//! dispatch, fusion, cutoff.

use super::fusion;
use super::url_detect::detect_first_url;
use crate::backend::{EmbeddingClient, SearchIndexer, VectorStoreClient};
use crate::error::{ErrorCategory, RagentError, Result};
use crate::model::{FusionMethod, HybridQuery, HybridResult, ScoredDocument, SearchMethod};
use std::sync::Arc;
use std::time::Instant;

fn timeout_error(branch: &str) -> RagentError {
    RagentError::new(ErrorCategory::Timeout, format!("{branch} timed out"))
}

pub struct HybridSearchEngine {
    embedder: Arc<dyn EmbeddingClient>,
    vector_store: Arc<dyn VectorStoreClient>,
    search_index: Arc<dyn SearchIndexer>,
}

impl HybridSearchEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        vector_store: Arc<dyn VectorStoreClient>,
        search_index: Arc<dyn SearchIndexer>,
    ) -> Self {
        Self {
            embedder,
            vector_store,
            search_index,
        }
    }

    pub async fn search(&self, query: &HybridQuery) -> Result<HybridResult> {
        query.validate()?;
        let start = Instant::now();

        // Step 1: URL short-circuit.
        if let Some(url) = detect_first_url(&query.query_text) {
            match self.search_index.term_query_reference(&url).await {
                Ok(hits) if !hits.is_empty() => {
                    let documents = hits
                        .into_iter()
                        .map(|(id, score)| ScoredDocument {
                            id,
                            fused_score: score,
                            raw_bm25_score: None,
                            raw_vector_score: None,
                            source_json: serde_json::Value::Null,
                        })
                        .collect::<Vec<_>>();
                    let total_hits = documents.len();
                    return Ok(HybridResult {
                        documents,
                        total_hits,
                        execution_time: start.elapsed(),
                        search_method: SearchMethod::UrlExactMatch,
                        url_detected: true,
                        fallback_reason: None,
                        raw_bm25_response: None,
                        raw_vector_response: None,
                    });
                }
                Ok(_) => {
                    return self
                        .hybrid_fallback(query, start, true, Some("term_query_no_results".to_string()))
                        .await;
                }
                Err(_) => {
                    return self
                        .hybrid_fallback(query, start, true, Some("term_query_error".to_string()))
                        .await;
                }
            }
        }

        self.hybrid_fallback(query, start, false, None).await
    }

    /// `SearchBM25Only`: skips the URL short-circuit and the vector
    /// branch entirely. Fails if the BM25 branch itself fails — there
    /// is no other branch to fall back to.
    pub async fn search_bm25_only(&self, query: &HybridQuery) -> Result<HybridResult> {
        query.validate()?;
        let start = Instant::now();
        let k = query.k.max(query.size * 2);

        let bm25_hits = tokio::time::timeout(
            query.timeout,
            self.search_index.bm25_search(&query.query_text, k, query.language_mode),
        )
        .await
        .map_err(|_| timeout_error("bm25"))??;

        Ok(self.fuse_and_cutoff(query, bm25_hits, Vec::new(), start, false, None, 1.0, 0.0))
    }

    /// `SearchVectorOnly`: skips the URL short-circuit and the BM25
    /// branch entirely. Fails if embedding or the vector branch fails.
    pub async fn search_vector_only(&self, query: &HybridQuery) -> Result<HybridResult> {
        query.validate()?;
        let start = Instant::now();
        let k = query.k.max(query.size * 2);

        let mut vectors = tokio::time::timeout(query.timeout, self.embedder.embed(&[query.query_text.clone()]))
            .await
            .map_err(|_| timeout_error("embedding"))??;
        let embedding = vectors
            .pop()
            .ok_or_else(|| RagentError::new(ErrorCategory::Embedding, "embedding provider returned no vector"))?;

        let vector_hits = tokio::time::timeout(query.timeout, self.vector_store.search(&embedding, k))
            .await
            .map_err(|_| timeout_error("vector"))??;

        Ok(self.fuse_and_cutoff(query, Vec::new(), vector_hits, start, false, None, 0.0, 1.0))
    }

    async fn hybrid_fallback(
        &self,
        query: &HybridQuery,
        start: Instant,
        url_detected: bool,
        fallback_reason: Option<String>,
    ) -> Result<HybridResult> {
        let k = query.k.max(query.size * 2);

        // Step 2: embedding. Failure here is fatal to the vector branch
        // only — fall back to BM25-only fusion, but remember the cause
        // in case the BM25 branch fails too.
        let embed_result = tokio::time::timeout(query.timeout, self.embedder.embed(&[query.query_text.clone()])).await;
        let (embedding, vector_branch_error) = match embed_result {
            Ok(Ok(mut vectors)) => (vectors.pop(), None),
            Ok(Err(e)) => (None, Some(format!("embedding: {e}"))),
            Err(_) => (None, Some(format!("embedding: {}", timeout_error("embedding")))),
        };

        // Step 3: parallel dispatch, each branch bound by the query timeout.
        let bm25_fut = tokio::time::timeout(
            query.timeout,
            self.search_index.bm25_search(&query.query_text, k, query.language_mode),
        );
        let vector_fut = async {
            match &embedding {
                Some(vec) => Some(tokio::time::timeout(query.timeout, self.vector_store.search(vec, k)).await),
                None => None,
            }
        };
        let (bm25_timeout_result, vector_timeout_result) = tokio::join!(bm25_fut, vector_fut);

        let (bm25_hits, bm25_branch_error) = match bm25_timeout_result {
            Ok(Ok(hits)) => (hits, None),
            Ok(Err(e)) => (Vec::new(), Some(format!("bm25: {e}"))),
            Err(_) => (Vec::new(), Some(format!("bm25: {}", timeout_error("bm25")))),
        };

        // Vector branch error is either the embedding failure recorded
        // above (no embedding, so the branch never ran) or a failure of
        // the vector store search itself.
        let (vector_hits, vector_branch_error) = match vector_timeout_result {
            None => (Vec::new(), vector_branch_error),
            Some(Ok(Ok(hits))) => (hits, None),
            Some(Ok(Err(e))) => (Vec::new(), Some(format!("vector: {e}"))),
            Some(Err(_)) => (Vec::new(), Some(format!("vector: {}", timeout_error("vector")))),
        };

        if let (Some(bm25_err), Some(vector_err)) = (&bm25_branch_error, &vector_branch_error) {
            return Err(RagentError::new(
                ErrorCategory::Unavailable,
                format!("both branches failed: {bm25_err}; {vector_err}"),
            ));
        }

        Ok(self.fuse_and_cutoff(
            query,
            bm25_hits,
            vector_hits,
            start,
            url_detected,
            fallback_reason,
            query.bm25_weight,
            query.vector_weight,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn fuse_and_cutoff(
        &self,
        query: &HybridQuery,
        bm25_hits: fusion::HitList,
        vector_hits: fusion::HitList,
        start: Instant,
        url_detected: bool,
        fallback_reason: Option<String>,
        bm25_weight: f32,
        vector_weight: f32,
    ) -> HybridResult {
        // Step 4: fusion.
        let fused = match query.fusion_method {
            FusionMethod::WeightedSum => fusion::weighted_sum(&bm25_hits, &vector_hits, bm25_weight, vector_weight),
            FusionMethod::Rrf => fusion::reciprocal_rank_fusion(&bm25_hits, &vector_hits),
        };

        // Step 5: cutoff.
        let documents: Vec<ScoredDocument> = fused
            .into_iter()
            .filter(|h| h.fused_score >= query.min_score)
            .take(query.size)
            .map(|h| ScoredDocument {
                id: h.id,
                fused_score: h.fused_score,
                raw_bm25_score: h.raw_bm25_score,
                raw_vector_score: h.raw_vector_score,
                source_json: serde_json::Value::Null,
            })
            .collect();

        let total_hits = documents.len();
        HybridResult {
            documents,
            total_hits,
            execution_time: start.elapsed(),
            search_method: SearchMethod::HybridSearch,
            url_detected,
            fallback_reason,
            raw_bm25_response: None,
            raw_vector_response: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fakes::{FakeEmbeddingClient, FakeSearchIndex, FakeVectorStore};
    use crate::backend::{EmbeddingClient, SearchIndexer, VectorStoreClient};
    use crate::model::{IndexedDocument, LanguageMode, SearchMode, VectorRecord};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    async fn engine_with_doc(reference: &str, content: &str) -> (HybridSearchEngine, Arc<FakeSearchIndex>) {
        let embedder = Arc::new(FakeEmbeddingClient { dimension: 4 });
        let vector_store = Arc::new(FakeVectorStore::default());
        let search_index = Arc::new(FakeSearchIndex::default());
        search_index
            .index(IndexedDocument {
                id: "doc1".to_string(),
                title: "Doc".to_string(),
                content: content.to_string(),
                content_ja: None,
                reference: reference.to_string(),
                vector: vec![],
            })
            .await
            .unwrap();
        let engine = HybridSearchEngine::new(embedder, vector_store, search_index.clone());
        (engine, search_index)
    }

    fn sample_query(text: &str) -> HybridQuery {
        HybridQuery {
            query_text: text.to_string(),
            index_name: "docs".to_string(),
            size: 10,
            bm25_weight: 0.5,
            vector_weight: 0.5,
            fusion_method: FusionMethod::WeightedSum,
            language_mode: LanguageMode::Default,
            search_mode: SearchMode::Hybrid,
            timeout: Duration::from_secs(2),
            filters: HashMap::new(),
            min_score: 0.0,
            k: 20,
        }
    }

    struct FailingSearchIndex;

    #[async_trait]
    impl SearchIndexer for FailingSearchIndex {
        async fn index(&self, _doc: IndexedDocument) -> Result<()> {
            Ok(())
        }
        async fn get(&self, _id: &str) -> Result<Option<IndexedDocument>> {
            Ok(None)
        }
        async fn bm25_search(&self, _query: &str, _k: usize, _language_mode: LanguageMode) -> Result<Vec<(String, f32)>> {
            Err(RagentError::new(ErrorCategory::SearchIndexQuery, "index unreachable"))
        }
        async fn term_query_reference(&self, _reference: &str) -> Result<Vec<(String, f32)>> {
            Ok(Vec::new())
        }
        async fn delete(&self, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    struct FailingVectorStore;

    #[async_trait]
    impl VectorStoreClient for FailingVectorStore {
        async fn put(&self, _record: VectorRecord) -> Result<()> {
            Ok(())
        }
        async fn get(&self, _id: &str) -> Result<Option<VectorRecord>> {
            Ok(None)
        }
        async fn search(&self, _embedding: &[f32], _k: usize) -> Result<Vec<(String, f32)>> {
            Err(RagentError::new(ErrorCategory::VectorStore, "store unreachable"))
        }
        async fn delete(&self, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    struct FailingEmbeddingClient;

    #[async_trait]
    impl EmbeddingClient for FailingEmbeddingClient {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(RagentError::new(ErrorCategory::Embedding, "provider unreachable"))
        }
        fn dimension(&self) -> usize {
            4
        }
    }

    #[tokio::test]
    async fn url_exact_match_short_circuits() {
        let (engine, _) = engine_with_doc("https://example.com/doc", "irrelevant body").await;
        let result = engine
            .search(&sample_query("see https://example.com/doc for details"))
            .await
            .unwrap();
        assert_eq!(result.search_method, SearchMethod::UrlExactMatch);
        assert!(result.url_detected);
        assert_eq!(result.total_hits, 1);
    }

    #[tokio::test]
    async fn url_fallback_when_no_reference_matches() {
        let (engine, _) = engine_with_doc("https://other.example.com/page", "hello world content").await;
        let result = engine
            .search(&sample_query("see https://example.com/doc for details"))
            .await
            .unwrap();
        assert_eq!(result.search_method, SearchMethod::HybridSearch);
        assert!(result.url_detected);
        assert_eq!(result.fallback_reason.as_deref(), Some("term_query_no_results"));
    }

    #[tokio::test]
    async fn empty_query_is_validation_error() {
        let embedder = Arc::new(FakeEmbeddingClient { dimension: 4 });
        let vector_store = Arc::new(FakeVectorStore::default());
        let search_index = Arc::new(FakeSearchIndex::default());
        let engine = HybridSearchEngine::new(embedder, vector_store, search_index);
        let result = engine.search(&sample_query("")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn zero_hits_after_fusion_is_success_with_empty_list() {
        let embedder = Arc::new(FakeEmbeddingClient { dimension: 4 });
        let vector_store = Arc::new(FakeVectorStore::default());
        let search_index = Arc::new(FakeSearchIndex::default());
        let engine = HybridSearchEngine::new(embedder, vector_store, search_index);
        let result = engine.search(&sample_query("nothing matches this")).await.unwrap();
        assert_eq!(result.total_hits, 0);
    }

    #[tokio::test]
    async fn both_branches_failing_is_unavailable() {
        let engine = HybridSearchEngine::new(
            Arc::new(FailingEmbeddingClient),
            Arc::new(FailingVectorStore),
            Arc::new(FailingSearchIndex),
        );
        let err = engine.search(&sample_query("anything")).await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::Unavailable);
    }

    #[tokio::test]
    async fn bm25_branch_failure_alone_still_returns_vector_hits() {
        let embedder = Arc::new(FakeEmbeddingClient { dimension: 4 });
        let vector_store = Arc::new(FakeVectorStore::default());
        vector_store
            .put(VectorRecord {
                id: "doc1".to_string(),
                embedding: crate::backend::fakes::deterministic_embedding("hello", 4),
                metadata: HashMap::new(),
                content: "hello".to_string(),
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        let engine = HybridSearchEngine::new(embedder, vector_store, Arc::new(FailingSearchIndex));
        let result = engine.search(&sample_query("hello")).await.unwrap();
        assert_eq!(result.total_hits, 1);
    }

    #[tokio::test]
    async fn search_bm25_only_ignores_vector_branch() {
        let (engine, _) = engine_with_doc("https://example.com/doc", "hello world content").await;
        let result = engine.search_bm25_only(&sample_query("hello")).await.unwrap();
        assert_eq!(result.total_hits, 1);
        assert!(result.documents[0].raw_vector_score.is_none());
    }

    #[tokio::test]
    async fn search_vector_only_ignores_bm25_branch() {
        let embedder = Arc::new(FakeEmbeddingClient { dimension: 4 });
        let vector_store = Arc::new(FakeVectorStore::default());
        vector_store
            .put(VectorRecord {
                id: "doc1".to_string(),
                embedding: crate::backend::fakes::deterministic_embedding("hello", 4),
                metadata: HashMap::new(),
                content: "hello".to_string(),
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        let engine = HybridSearchEngine::new(embedder, vector_store, Arc::new(FakeSearchIndex::default()));
        let result = engine.search_vector_only(&sample_query("hello")).await.unwrap();
        assert_eq!(result.total_hits, 1);
        assert!(result.documents[0].raw_bm25_score.is_none());
    }

    #[tokio::test]
    async fn japanese_language_mode_matches_against_content_ja() {
        let embedder = Arc::new(FakeEmbeddingClient { dimension: 4 });
        let vector_store = Arc::new(FakeVectorStore::default());
        let search_index = Arc::new(FakeSearchIndex::default());
        search_index
            .index(IndexedDocument {
                id: "doc1".to_string(),
                title: "Doc".to_string(),
                content: "english body with no overlap".to_string(),
                content_ja: Some("こんにちは世界".to_string()),
                reference: "ref1".to_string(),
                vector: vec![],
            })
            .await
            .unwrap();
        let engine = HybridSearchEngine::new(embedder, vector_store, search_index);
        let mut query = sample_query("こんにちは");
        query.language_mode = LanguageMode::Ja;
        let result = engine.search_bm25_only(&query).await.unwrap();
        assert_eq!(result.total_hits, 1);
    }
}
