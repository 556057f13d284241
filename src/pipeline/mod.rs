//! Vectorization pipeline: fingerprint persistence, change detection,
//! token-budgeted chunking, and the embed/dual-write cycle.

pub mod change_detection;
pub mod chunker;
pub mod fingerprint;
pub mod vectorize;

pub use fingerprint::FingerprintStore;
pub use vectorize::{VectorizeOptions, VectorizeOutcome, VectorizePipeline};
