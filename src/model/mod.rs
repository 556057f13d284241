//! Core data types shared across the search engine, the RPC transport
//! and the vectorization pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The atomic unit written to both the vector store and the search
/// index. `id` is a content-addressed hash of source path + title so
/// the same logical document always maps to the same id in both
/// backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub reference: String,
    #[serde(default)]
    pub custom_fields: HashMap<String, serde_json::Value>,
    pub chunk_index: Option<usize>,
    pub total_chunks: Option<usize>,
}

/// `(id, embedding, metadata, content, created_at)`. The embedding
/// dimension is fixed for the lifetime of an index; callers are
/// expected to validate `embedding.len() == dimension` before writing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl VectorRecord {
    pub fn has_dimension(&self, dimension: usize) -> bool {
        self.embedding.len() == dimension
    }
}

/// The search-backend projection of a [`Document`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub id: String,
    pub title: String,
    pub content: String,
    pub content_ja: Option<String>,
    pub reference: String,
    pub vector: Vec<f32>,
}

/// `(source_type, path) -> (content_hash, size, vectorized_at)`,
/// persisted in the hash store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub source_type: String,
    pub path: String,
    pub content_hash: String,
    pub size: u64,
    pub vectorized_at: chrono::DateTime<chrono::Utc>,
}

impl FingerprintRecord {
    pub fn key(source_type: &str, path: &str) -> String {
        format!("{source_type}\u{0}{path}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    WeightedSum,
    Rrf,
}

impl Default for FusionMethod {
    fn default() -> Self {
        FusionMethod::WeightedSum
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageMode {
    Default,
    Ja,
}

impl Default for LanguageMode {
    fn default() -> Self {
        LanguageMode::Default
    }
}

/// Which branch(es) of the hybrid engine a query dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Hybrid,
    Bm25,
    Vector,
}

impl Default for SearchMode {
    fn default() -> Self {
        SearchMode::Hybrid
    }
}

/// A query against the hybrid search engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridQuery {
    pub query_text: String,
    pub index_name: String,
    pub size: usize,
    pub bm25_weight: f32,
    pub vector_weight: f32,
    pub fusion_method: FusionMethod,
    pub language_mode: LanguageMode,
    #[serde(default)]
    pub search_mode: SearchMode,
    pub timeout: std::time::Duration,
    #[serde(default)]
    pub filters: HashMap<String, String>,
    pub min_score: f32,
    pub k: usize,
}

impl HybridQuery {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.query_text.trim().is_empty() {
            return Err(crate::error::RagentError::new(
                crate::error::ErrorCategory::Validation,
                "query_text must not be empty",
            ));
        }
        if !(0.0..=1.0).contains(&self.bm25_weight) || !(0.0..=1.0).contains(&self.vector_weight) {
            return Err(crate::error::RagentError::new(
                crate::error::ErrorCategory::Validation,
                "bm25_weight and vector_weight must be in [0,1]",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchMethod {
    HybridSearch,
    UrlExactMatch,
}

impl serde::Serialize for SearchMethod {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let s = match self {
            SearchMethod::HybridSearch => "hybrid_search",
            SearchMethod::UrlExactMatch => "url_exact_match",
        };
        serializer.serialize_str(s)
    }
}

/// One scored document within a [`HybridResult`].
#[derive(Debug, Clone, Serialize)]
pub struct ScoredDocument {
    pub id: String,
    pub fused_score: f32,
    pub raw_bm25_score: Option<f32>,
    pub raw_vector_score: Option<f32>,
    pub source_json: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct HybridResult {
    pub documents: Vec<ScoredDocument>,
    pub total_hits: usize,
    pub execution_time: std::time::Duration,
    pub search_method: SearchMethod,
    pub url_detected: bool,
    pub fallback_reason: Option<String>,
    pub raw_bm25_response: Option<serde_json::Value>,
    pub raw_vector_response: Option<serde_json::Value>,
}

/// `(name, description, input_schema)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContentPart {
    Text { text: String },
    Structured { data: serde_json::Value },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub content: Vec<ToolContentPart>,
    pub is_error: bool,
}

impl ToolCallResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContentPart::Text { text: text.into() }],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContentPart::Text { text: text.into() }],
            is_error: true,
        }
    }

    pub fn structured(data: serde_json::Value) -> Self {
        Self {
            content: vec![ToolContentPart::Structured { data }],
            is_error: false,
        }
    }
}

/// `(allowed, method_used, client_ip, user_id?, token_info?, matched_cidr?)`.
#[derive(Debug, Clone, Serialize)]
pub struct AuthDecision {
    pub allowed: bool,
    pub method_used: AuthMethod,
    pub client_ip: String,
    pub user_id: Option<String>,
    pub token_info: Option<serde_json::Value>,
    pub matched_cidr: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Ip,
    Oidc,
    Bypass,
    None,
}

/// `(state, pid, started_at?, last_error?)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub pid: u32,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Running,
    Waiting,
    Error,
}

/// `(total, processed, success, failed, percentage)`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProgressReport {
    pub total: u64,
    pub processed: u64,
    pub success: u64,
    pub failed: u64,
}

impl ProgressReport {
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            100.0 * self.processed as f64 / self.total as f64
        }
    }
}
