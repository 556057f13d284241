//! Environment-variable-driven configuration. Every tunable is read
//! from the process environment rather than a config file; each
//! sub-struct carries sane defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_csv(key: &str) -> Vec<String> {
    std::env::var(key)
        .ok()
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_header_bytes: usize,
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: env_string("RAGENT_SERVER_HOST", "0.0.0.0"),
            port: env_parse("RAGENT_SERVER_PORT", 8080),
            read_timeout: Duration::from_secs(env_parse("RAGENT_SERVER_READ_TIMEOUT_SECS", 30)),
            write_timeout: Duration::from_secs(env_parse("RAGENT_SERVER_WRITE_TIMEOUT_SECS", 30)),
            idle_timeout: Duration::from_secs(env_parse("RAGENT_SERVER_IDLE_TIMEOUT_SECS", 120)),
            max_header_bytes: env_parse("RAGENT_SERVER_MAX_HEADER_BYTES", 1 << 20),
            shutdown_timeout: Duration::from_secs(env_parse("RAGENT_SERVER_SHUTDOWN_TIMEOUT_SECS", 10)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethodConfig {
    Ip,
    Oidc,
    Both,
    Either,
}

impl std::str::FromStr for AuthMethodConfig {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ip" => Ok(Self::Ip),
            "oidc" => Ok(Self::Oidc),
            "both" => Ok(Self::Both),
            "either" => Ok(Self::Either),
            other => Err(format!("unknown auth method: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub method: AuthMethodConfig,
    pub allowed_ips: Vec<String>,
    pub oidc_issuer: Option<String>,
    pub oidc_client_id: Option<String>,
    pub oidc_client_secret: Option<String>,
    pub trusted_proxies: Vec<String>,
    pub bypass_ranges: Vec<String>,
    pub bypass_verbose_log: bool,
    pub bypass_audit_log: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            method: env_string("RAGENT_AUTH_METHOD", "ip").parse().unwrap_or(AuthMethodConfig::Ip),
            allowed_ips: env_csv("RAGENT_AUTH_ALLOWED_IPS"),
            oidc_issuer: std::env::var("RAGENT_AUTH_OIDC_ISSUER").ok(),
            oidc_client_id: std::env::var("RAGENT_AUTH_OIDC_CLIENT_ID").ok(),
            oidc_client_secret: std::env::var("RAGENT_AUTH_OIDC_CLIENT_SECRET").ok(),
            trusted_proxies: env_csv("RAGENT_AUTH_TRUSTED_PROXIES"),
            bypass_ranges: env_csv("RAGENT_AUTH_BYPASS_RANGES"),
            bypass_verbose_log: env_bool("RAGENT_AUTH_BYPASS_VERBOSE_LOG", false),
            bypass_audit_log: env_bool("RAGENT_AUTH_BYPASS_AUDIT_LOG", true),
        }
    }
}

impl AuthConfig {
    /// Bypass combined with `either` is rejected rather than
    /// reinterpreted; see open question in the governing spec's design
    /// notes.
    pub fn validate(&self) -> Result<(), String> {
        if !self.bypass_ranges.is_empty() && self.method == AuthMethodConfig::Either {
            return Err("bypass_ranges is incompatible with auth method 'either'".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchDefaultsConfig {
    pub index_name: String,
    pub default_size: usize,
    pub default_bm25_weight: f32,
    pub default_vector_weight: f32,
    pub default_fusion_method: String,
    pub default_use_ja_nlp: bool,
    pub default_timeout_seconds: u64,
}

impl Default for SearchDefaultsConfig {
    fn default() -> Self {
        Self {
            index_name: env_string("RAGENT_SEARCH_INDEX_NAME", "documents"),
            default_size: env_parse("RAGENT_SEARCH_DEFAULT_SIZE", 10),
            default_bm25_weight: env_parse("RAGENT_SEARCH_DEFAULT_BM25_WEIGHT", 0.5),
            default_vector_weight: env_parse("RAGENT_SEARCH_DEFAULT_VECTOR_WEIGHT", 0.5),
            default_fusion_method: env_string("RAGENT_SEARCH_DEFAULT_FUSION_METHOD", "weighted_sum"),
            default_use_ja_nlp: env_bool("RAGENT_SEARCH_DEFAULT_USE_JA_NLP", true),
            default_timeout_seconds: env_parse("RAGENT_SEARCH_DEFAULT_TIMEOUT_SECONDS", 10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseConfig {
    pub enabled: bool,
    pub heartbeat_interval: Duration,
    pub buffer_size: usize,
    pub max_clients: usize,
    pub history_size: usize,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            enabled: env_bool("RAGENT_SSE_ENABLED", true),
            heartbeat_interval: Duration::from_secs(env_parse("RAGENT_SSE_HEARTBEAT_INTERVAL_SECS", 30)),
            buffer_size: env_parse("RAGENT_SSE_BUFFER_SIZE", 100),
            max_clients: env_parse("RAGENT_SSE_MAX_CLIENTS", 1000),
            history_size: env_parse("RAGENT_SSE_HISTORY_SIZE", 50),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowModeConfig {
    pub interval: Duration,
    pub min_interval: Duration,
    pub pid_file_dir: String,
    pub socket_path: String,
}

impl Default for FollowModeConfig {
    fn default() -> Self {
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".to_string());
        Self {
            interval: Duration::from_secs(env_parse("RAGENT_FOLLOW_INTERVAL_SECS", 30 * 60)),
            min_interval: Duration::from_secs(5 * 60),
            pid_file_dir: env_string("RAGENT_FOLLOW_PID_DIR", &runtime_dir),
            socket_path: env_string(
                "RAGENT_FOLLOW_SOCKET_PATH",
                &format!("{runtime_dir}/ragent/vectorize.sock"),
            ),
        }
    }
}

impl FollowModeConfig {
    /// Clamp a requested interval to the documented minimum.
    pub fn effective_interval(&self, requested: Option<Duration>) -> Duration {
        let requested = requested.unwrap_or(self.interval);
        requested.max(self.min_interval)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub concurrency: usize,
    pub max_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: env_parse("RAGENT_PIPELINE_CONCURRENCY", 3),
            max_tokens: env_parse("RAGENT_PIPELINE_MAX_TOKENS", 7000),
            chunk_overlap_tokens: env_parse("RAGENT_PIPELINE_CHUNK_OVERLAP_TOKENS", 200),
            retry_max_attempts: env_parse("RAGENT_PIPELINE_RETRY_MAX_ATTEMPTS", 3),
            retry_base_delay: Duration::from_secs(2),
            retry_max_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub search: SearchDefaultsConfig,
    pub sse: SseConfig,
    pub follow: FollowModeConfig,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load configuration entirely from the process environment.
    pub fn load() -> anyhow::Result<Self> {
        let config = Config::default();
        config
            .auth
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid auth configuration: {e}"))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = SseConfig::default();
        assert_eq!(cfg.buffer_size, 100);
        assert_eq!(cfg.max_clients, 1000);
        assert_eq!(cfg.history_size, 50);
    }

    #[test]
    fn follow_mode_clamps_to_minimum() {
        let cfg = FollowModeConfig {
            interval: Duration::from_secs(30 * 60),
            min_interval: Duration::from_secs(5 * 60),
            pid_file_dir: "/tmp".into(),
            socket_path: "/tmp/x.sock".into(),
        };
        let effective = cfg.effective_interval(Some(Duration::from_secs(60)));
        assert_eq!(effective, Duration::from_secs(5 * 60));
    }

    #[test]
    fn bypass_with_either_is_rejected() {
        let cfg = AuthConfig {
            method: AuthMethodConfig::Either,
            allowed_ips: vec![],
            oidc_issuer: None,
            oidc_client_id: None,
            oidc_client_secret: None,
            trusted_proxies: vec![],
            bypass_ranges: vec!["10.0.0.0/24".to_string()],
            bypass_verbose_log: false,
            bypass_audit_log: true,
        };
        assert!(cfg.validate().is_err());
    }
}
