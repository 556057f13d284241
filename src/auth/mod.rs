//! Layered authentication and authorization: IP allow-lists, OIDC
//! bearer tokens, a bypass fast-path, and the pipeline that composes
//! them under a configured policy.

pub mod ip_classifier;
pub mod oidc;
pub mod pipeline;

pub use ip_classifier::{extract_client_ip, IpClassifier};
pub use oidc::OidcValidator;
pub use pipeline::{AuthPipeline, AuthRequest};
