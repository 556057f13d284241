//! Polymorphic backend capability sets. Each trait is a capability set
//! (`{operation: contract}`) rather than an inheritance hierarchy;
//! implementations are selected at construction and stored as trait
//! objects. The embedding model, vector store, search backend and chat
//! model are external collaborators — this crate ships only the
//! interfaces plus fakes used by tests and a thin local scanner.

use crate::error::Result;
use crate::model::{IndexedDocument, LanguageMode, VectorRecord};
use async_trait::async_trait;
use std::collections::HashMap;

/// A source item discovered by a [`Scanner`].
#[derive(Debug, Clone)]
pub struct ScannedItem {
    pub source_type: String,
    pub path: String,
    pub content_hash: String,
    pub size: u64,
    pub content: String,
}

#[async_trait]
pub trait Scanner: Send + Sync {
    async fn scan(&self) -> Result<Vec<ScannedItem>>;
}

#[async_trait]
pub trait MessageFetcher: Send + Sync {
    async fn fetch(&self, since: Option<chrono::DateTime<chrono::Utc>>) -> Result<Vec<ScannedItem>>;
}

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn dimension(&self) -> usize;
}

#[async_trait]
pub trait VectorStoreClient: Send + Sync {
    async fn put(&self, record: VectorRecord) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<VectorRecord>>;
    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<(String, f32)>>;
    async fn delete(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait SearchIndexer: Send + Sync {
    async fn index(&self, doc: IndexedDocument) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<IndexedDocument>>;
    /// `language_mode=ja` requests a Japanese morphological analyzer on
    /// the query text; backends that don't implement one may ignore it.
    async fn bm25_search(&self, query: &str, k: usize, language_mode: LanguageMode) -> Result<Vec<(String, f32)>>;
    /// Term-equality filter against the `reference` field, used by the
    /// URL short-circuit path.
    async fn term_query_reference(&self, reference: &str) -> Result<Vec<(String, f32)>>;
    async fn delete(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// In-memory fake implementations used by tests and as a default local
/// wiring when no real backend is configured.
pub mod fakes {
    use super::*;
    use std::sync::Mutex;

    pub struct FakeEmbeddingClient {
        pub dimension: usize,
    }

    #[async_trait]
    impl EmbeddingClient for FakeEmbeddingClient {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| deterministic_embedding(t, self.dimension))
                .collect())
        }

        fn dimension(&self) -> usize {
            self.dimension
        }
    }

    /// Deterministic pseudo-embedding so tests are reproducible without
    /// a real model: hashes the text into a seed and derives a unit
    /// vector from it.
    pub fn deterministic_embedding(text: &str, dimension: usize) -> Vec<f32> {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(text.as_bytes());
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&digest[0..8]);
        let mut state = u64::from_le_bytes(seed);
        let mut vec = Vec::with_capacity(dimension);
        for _ in 0..dimension {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let value = ((state >> 33) as i64 % 1000) as f32 / 1000.0;
            vec.push(value);
        }
        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }

    #[derive(Default)]
    pub struct FakeVectorStore {
        records: Mutex<HashMap<String, VectorRecord>>,
    }

    #[async_trait]
    impl VectorStoreClient for FakeVectorStore {
        async fn put(&self, record: VectorRecord) -> Result<()> {
            self.records.lock().unwrap().insert(record.id.clone(), record);
            Ok(())
        }

        async fn get(&self, id: &str) -> Result<Option<VectorRecord>> {
            Ok(self.records.lock().unwrap().get(id).cloned())
        }

        async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
            let records = self.records.lock().unwrap();
            let mut scored: Vec<(String, f32)> = records
                .values()
                .map(|r| (r.id.clone(), cosine_similarity(embedding, &r.embedding)))
                .collect();
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(k);
            Ok(scored)
        }

        async fn delete(&self, id: &str) -> Result<()> {
            self.records.lock().unwrap().remove(id);
            Ok(())
        }
    }

    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            dot / (norm_a * norm_b)
        }
    }

    #[derive(Default)]
    pub struct FakeSearchIndex {
        docs: Mutex<HashMap<String, IndexedDocument>>,
    }

    #[async_trait]
    impl SearchIndexer for FakeSearchIndex {
        async fn index(&self, doc: IndexedDocument) -> Result<()> {
            self.docs.lock().unwrap().insert(doc.id.clone(), doc);
            Ok(())
        }

        async fn get(&self, id: &str) -> Result<Option<IndexedDocument>> {
            Ok(self.docs.lock().unwrap().get(id).cloned())
        }

        async fn bm25_search(&self, query: &str, k: usize, language_mode: LanguageMode) -> Result<Vec<(String, f32)>> {
            let docs = self.docs.lock().unwrap();
            // Case-folding is a Latin-script notion; Japanese mode skips
            // it and matches against `content_ja` when a document has one.
            let terms: Vec<String> = match language_mode {
                LanguageMode::Ja => query.split_whitespace().map(String::from).collect(),
                LanguageMode::Default => query.to_lowercase().split_whitespace().map(String::from).collect(),
            };
            let mut scored: Vec<(String, f32)> = docs
                .values()
                .filter_map(|d| {
                    let content = match language_mode {
                        LanguageMode::Ja => d.content_ja.clone().unwrap_or_else(|| d.content.clone()),
                        LanguageMode::Default => d.content.to_lowercase(),
                    };
                    let hits = terms.iter().filter(|t| content.contains(t.as_str())).count();
                    if hits > 0 {
                        Some((d.id.clone(), hits as f32))
                    } else {
                        None
                    }
                })
                .collect();
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(k);
            Ok(scored)
        }

        async fn term_query_reference(&self, reference: &str) -> Result<Vec<(String, f32)>> {
            let docs = self.docs.lock().unwrap();
            Ok(docs
                .values()
                .filter(|d| d.reference == reference)
                .map(|d| (d.id.clone(), 1.0))
                .collect())
        }

        async fn delete(&self, id: &str) -> Result<()> {
            self.docs.lock().unwrap().remove(id);
            Ok(())
        }
    }

    pub struct FakeChatModel;

    #[async_trait]
    impl ChatModel for FakeChatModel {
        async fn complete(&self, prompt: &str) -> Result<String> {
            Ok(format!("[fake answer for prompt of {} chars]", prompt.len()))
        }
    }

    /// Scans a filesystem directory tree, used as the default `Scanner`
    /// wiring for the `vectorize` CLI.
    pub struct DirectoryScanner {
        pub root: std::path::PathBuf,
        pub pattern: String,
    }

    #[async_trait]
    impl Scanner for DirectoryScanner {
        async fn scan(&self) -> Result<Vec<ScannedItem>> {
            use sha2::{Digest, Sha256};
            let pattern = self.root.join(&self.pattern);
            let pattern_str = pattern.to_string_lossy().to_string();
            let mut items = Vec::new();
            let entries = glob::glob(&pattern_str).map_err(|e| {
                crate::error::RagentError::new(crate::error::ErrorCategory::FileRead, e.to_string())
            })?;
            for entry in entries.flatten() {
                if !entry.is_file() {
                    continue;
                }
                let content = match std::fs::read_to_string(&entry) {
                    Ok(c) => c,
                    Err(_) => continue, // binary/unreadable files are skipped, not fatal
                };
                let size = content.len() as u64;
                let hash = format!("{:x}", Sha256::digest(content.as_bytes()));
                items.push(ScannedItem {
                    source_type: "file".to_string(),
                    path: entry.to_string_lossy().to_string(),
                    content_hash: hash,
                    size,
                    content,
                });
            }
            Ok(items)
        }
    }

}
