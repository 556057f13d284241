//! Categorized error taxonomy shared by the pipeline, search engine and
//! the JSON-RPC transport.
//!
//! Leaf operations return a [`RagentError`] carrying one of the
//! categories below; callers that need an HTTP/JSON-RPC status consult
//! [`RagentError::rpc_code`] or [`RagentError::is_retryable`] rather
//! than matching on the message text.

use std::fmt;

/// Error categories. Mirrors the taxonomy of error categories a
/// retrieval pipeline accumulates across file I/O, embedding, and the
/// two storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    FileRead,
    Metadata,
    Embedding,
    VectorStore,
    SearchIndexConnection,
    SearchIndexMapping,
    SearchIndexIndexing,
    SearchIndexBulkIndex,
    SearchIndexQuery,
    NetworkTimeout,
    Timeout,
    RateLimit,
    Authentication,
    Validation,
    /// Both branches of a dual-backend operation (BM25 + vector search)
    /// failed; the operation as a whole could not produce a result.
    Unavailable,
    Unknown,
}

impl ErrorCategory {
    /// Whether an operation that failed with this category should be
    /// retried under the exponential-backoff policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Embedding
                | ErrorCategory::VectorStore
                | ErrorCategory::SearchIndexConnection
                | ErrorCategory::SearchIndexIndexing
                | ErrorCategory::SearchIndexBulkIndex
                | ErrorCategory::SearchIndexQuery
                | ErrorCategory::NetworkTimeout
                | ErrorCategory::Timeout
                | ErrorCategory::RateLimit
        )
    }

    /// Classify an upstream error message by substring heuristics, with
    /// explicit category precedence taking priority over the heuristic.
    pub fn classify(explicit: Option<ErrorCategory>, message: &str) -> ErrorCategory {
        if let Some(category) = explicit {
            return category;
        }
        let lower = message.to_lowercase();
        if lower.contains("rate limit") || lower.contains("429") {
            ErrorCategory::RateLimit
        } else if lower.contains("timeout") || lower.contains("timed out") {
            ErrorCategory::NetworkTimeout
        } else if lower.contains("unauthorized") || lower.contains("authentication") {
            ErrorCategory::Authentication
        } else if lower.contains("invalid") || lower.contains("validation") {
            ErrorCategory::Validation
        } else {
            ErrorCategory::Unknown
        }
    }

    /// The JSON-RPC 2.0 error code a categorized error converts to.
    pub fn rpc_code(&self) -> i64 {
        match self {
            ErrorCategory::Validation => -32602,
            ErrorCategory::SearchIndexMapping => -32602,
            ErrorCategory::Unknown => -32603,
            _ => -32603,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{category}: {message}")]
pub struct RagentError {
    pub category: ErrorCategory,
    pub message: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl RagentError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }

    pub fn rpc_code(&self) -> i64 {
        self.category.rpc_code()
    }

    /// Sanitize for CLI/audit display: never echoes raw upstream text
    /// beyond what was already classified, but the `message` field
    /// itself is considered safe to surface since it is operator-authored.
    pub fn sanitized_message(&self) -> &str {
        &self.message
    }
}

pub type Result<T> = std::result::Result<T, RagentError>;

/// Aggregates per-file/per-branch errors during a vectorization cycle,
/// bounded so a pathological run cannot grow this unboundedly.
#[derive(Debug, Default)]
pub struct ProcessingResult {
    pub counts: std::collections::HashMap<String, usize>,
    pub sample_errors: Vec<String>,
    max_samples: usize,
}

impl ProcessingResult {
    pub fn new(max_samples: usize) -> Self {
        Self {
            counts: std::collections::HashMap::new(),
            sample_errors: Vec::new(),
            max_samples,
        }
    }

    pub fn record(&mut self, category: ErrorCategory, detail: impl Into<String>) {
        *self.counts.entry(category.to_string()).or_insert(0) += 1;
        if self.sample_errors.len() < self.max_samples {
            self.sample_errors.push(detail.into());
        }
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Groups for CLI display, showing at most the first 5 verbatim
    /// per spec's error-handling design.
    pub fn display_groups(&self) -> Vec<(String, usize)> {
        let mut groups: Vec<_> = self.counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
        groups.sort_by(|a, b| b.1.cmp(&a.1));
        groups
    }
}
