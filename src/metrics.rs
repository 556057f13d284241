//! Process-wide atomic counters, extending the teacher's
//! request/error/business-metric pattern with auth, SSE and pipeline
//! tallies.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    requests_total: Arc<AtomicU64>,
    requests_in_flight: Arc<AtomicU64>,
    errors_total: Arc<AtomicU64>,

    auth_allowed_total: Arc<AtomicU64>,
    auth_denied_total: Arc<AtomicU64>,

    sse_clients_connected: Arc<AtomicU64>,
    sse_clients_evicted: Arc<AtomicU64>,

    pipeline_files_vectorized: Arc<AtomicU64>,
    pipeline_chunks_failed: Arc<AtomicU64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            requests_in_flight: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            auth_allowed_total: Arc::new(AtomicU64::new(0)),
            auth_denied_total: Arc::new(AtomicU64::new(0)),
            sse_clients_connected: Arc::new(AtomicU64::new(0)),
            sse_clients_evicted: Arc::new(AtomicU64::new(0)),
            pipeline_files_vectorized: Arc::new(AtomicU64::new(0)),
            pipeline_chunks_failed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn inc_requests_total(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_requests_in_flight(&self) {
        self.requests_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_requests_in_flight(&self) {
        self.requests_in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn inc_errors(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_auth_decision(&self, allowed: bool) {
        if allowed {
            self.auth_allowed_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.auth_denied_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_sse_clients_connected(&self) {
        self.sse_clients_connected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sse_clients_evicted(&self) {
        self.sse_clients_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_pipeline_files_vectorized(&self, n: u64) {
        self.pipeline_files_vectorized.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_pipeline_chunks_failed(&self, n: u64) {
        self.pipeline_chunks_failed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get_requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn get_requests_in_flight(&self) -> u64 {
        self.requests_in_flight.load(Ordering::Relaxed)
    }

    pub fn get_errors_total(&self) -> u64 {
        self.errors_total.load(Ordering::Relaxed)
    }

    pub fn get_auth_allowed_total(&self) -> u64 {
        self.auth_allowed_total.load(Ordering::Relaxed)
    }

    pub fn get_auth_denied_total(&self) -> u64 {
        self.auth_denied_total.load(Ordering::Relaxed)
    }

    pub fn get_sse_clients_connected(&self) -> u64 {
        self.sse_clients_connected.load(Ordering::Relaxed)
    }

    pub fn get_sse_clients_evicted(&self) -> u64 {
        self.sse_clients_evicted.load(Ordering::Relaxed)
    }

    pub fn get_pipeline_files_vectorized(&self) -> u64 {
        self.pipeline_files_vectorized.load(Ordering::Relaxed)
    }

    pub fn get_pipeline_chunks_failed(&self) -> u64 {
        self.pipeline_chunks_failed.load(Ordering::Relaxed)
    }

    /// Renders the counters in Prometheus exposition format for a
    /// `GET /metrics` scrape endpoint.
    pub fn render(&self) -> String {
        format!(
            "# TYPE ragent_requests_total counter\n\
             ragent_requests_total {}\n\
             # TYPE ragent_requests_in_flight gauge\n\
             ragent_requests_in_flight {}\n\
             # TYPE ragent_errors_total counter\n\
             ragent_errors_total {}\n\
             # TYPE ragent_auth_allowed_total counter\n\
             ragent_auth_allowed_total {}\n\
             # TYPE ragent_auth_denied_total counter\n\
             ragent_auth_denied_total {}\n\
             # TYPE ragent_sse_clients_connected_total counter\n\
             ragent_sse_clients_connected_total {}\n\
             # TYPE ragent_sse_clients_evicted_total counter\n\
             ragent_sse_clients_evicted_total {}\n\
             # TYPE ragent_pipeline_files_vectorized_total counter\n\
             ragent_pipeline_files_vectorized_total {}\n\
             # TYPE ragent_pipeline_chunks_failed_total counter\n\
             ragent_pipeline_chunks_failed_total {}\n",
            self.get_requests_total(),
            self.get_requests_in_flight(),
            self.get_errors_total(),
            self.get_auth_allowed_total(),
            self.get_auth_denied_total(),
            self.get_sse_clients_connected(),
            self.get_sse_clients_evicted(),
            self.get_pipeline_files_vectorized(),
            self.get_pipeline_chunks_failed(),
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
