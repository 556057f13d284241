//! Composes the IP allow-list, OIDC validator and bypass classifier
//! under a configured policy, with mandatory audit logging for bypass
//! decisions.

use super::ip_classifier::{extract_client_ip, IpClassifier};
use super::oidc::OidcValidator;
use crate::config::AuthMethodConfig;
use crate::metrics::Metrics;
use crate::model::{AuthDecision, AuthMethod};
use std::collections::HashMap;
use std::sync::Arc;

/// Header names that must never be emitted in an audit log line, plus
/// any header matching case-insensitive `token`/`secret`.
const HEADER_BLOCKLIST: &[&str] = &["authorization", "cookie", "x-api-key", "x-auth-token"];

fn is_sensitive_header(name: &str) -> bool {
    let lower = name.to_lowercase();
    HEADER_BLOCKLIST.contains(&lower.as_str()) || lower.contains("token") || lower.contains("secret")
}

pub fn filter_audit_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .filter(|(k, _)| !is_sensitive_header(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

pub struct AuthRequest<'a> {
    pub remote_addr: &'a str,
    pub forwarded_for: Option<&'a str>,
    pub real_ip: Option<&'a str>,
    pub authorization: Option<&'a str>,
    pub path: &'a str,
    pub user_agent: Option<&'a str>,
    pub headers: HashMap<String, String>,
}

pub struct AuthPipeline {
    pub method: AuthMethodConfig,
    pub allowlist: IpClassifier,
    pub trusted_proxies: IpClassifier,
    pub bypass: Option<IpClassifier>,
    pub oidc: Option<OidcValidator>,
    pub audit_log: bool,
    pub metrics: Arc<Metrics>,
}

impl AuthPipeline {
    pub fn evaluate(&self, req: &AuthRequest) -> AuthDecision {
        let client_ip = extract_client_ip(req.remote_addr, req.forwarded_for, req.real_ip, &self.trusted_proxies);

        // Step 1: bypass check. Incompatible with `either` at
        // config-load time already, so no special-casing needed here.
        if let Some(bypass) = &self.bypass {
            if bypass.should_bypass(&client_ip) {
                if self.audit_log {
                    self.emit_audit(&client_ip, req, "bypass", true, None);
                }
                self.metrics.record_auth_decision(true);
                return AuthDecision {
                    allowed: true,
                    method_used: AuthMethod::Bypass,
                    client_ip,
                    user_id: None,
                    token_info: None,
                    matched_cidr: None,
                };
            }
        }

        let ip_allowed = self.allowlist.should_bypass(&client_ip);

        let oidc_outcome = OidcValidator::extract_bearer(req.authorization)
            .and_then(|token| self.oidc.as_ref().map(|v| v.validate(token)));

        let oidc_allowed = matches!(oidc_outcome, Some(Ok(_)));
        let user_id = match &oidc_outcome {
            Some(Ok(info)) => Some(info.subject.clone()),
            _ => None,
        };

        let allowed = match self.method {
            AuthMethodConfig::Ip => ip_allowed,
            AuthMethodConfig::Oidc => oidc_allowed,
            AuthMethodConfig::Both => ip_allowed && oidc_allowed,
            AuthMethodConfig::Either => ip_allowed || oidc_allowed,
        };

        let method_used = match self.method {
            AuthMethodConfig::Ip => AuthMethod::Ip,
            AuthMethodConfig::Oidc => AuthMethod::Oidc,
            AuthMethodConfig::Both | AuthMethodConfig::Either => {
                if oidc_allowed {
                    AuthMethod::Oidc
                } else {
                    AuthMethod::Ip
                }
            }
        };

        self.metrics.record_auth_decision(allowed);

        AuthDecision {
            allowed,
            method_used: if allowed { method_used } else { AuthMethod::None },
            client_ip,
            user_id,
            token_info: None,
            matched_cidr: None,
        }
    }

    fn emit_audit(&self, ip: &str, req: &AuthRequest, matched_range: &str, success: bool, message: Option<&str>) {
        let filtered_headers = filter_audit_headers(&req.headers);
        tracing::info!(
            target: "audit",
            timestamp = %chrono::Utc::now().to_rfc3339(),
            ip,
            method = "bypass",
            path = req.path,
            matched_range,
            success,
            user_agent = req.user_agent,
            headers = ?filtered_headers,
            message,
            "bypass decision"
        );
    }
}

/// HTTP status for a rejected [`AuthDecision`]: 401 for missing/invalid
/// token, 403 for plain IP denial. Never reveals which leg failed
/// beyond that distinction.
pub fn rejection_status(req_had_bearer: bool) -> u16 {
    if req_had_bearer {
        401
    } else {
        403
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pipeline(method: AuthMethodConfig, bypass_ranges: &[&str], trusted: &[&str], allowlist: &[&str]) -> AuthPipeline {
        AuthPipeline {
            method,
            allowlist: IpClassifier::from_ranges(
                &allowlist.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
                1000,
                Duration::from_secs(300),
            )
            .unwrap(),
            trusted_proxies: IpClassifier::from_ranges(
                &trusted.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
                1000,
                Duration::from_secs(300),
            )
            .unwrap(),
            bypass: if bypass_ranges.is_empty() {
                None
            } else {
                Some(
                    IpClassifier::from_ranges(
                        &bypass_ranges.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
                        1000,
                        Duration::from_secs(300),
                    )
                    .unwrap(),
                )
            },
            oidc: None,
            audit_log: true,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Trusted proxy at 127.0.0.1, bypass range matches the forwarded
    /// client -> bypass wins regardless of allowlist.
    #[test]
    fn bypass_with_trusted_proxy_grants_access() {
        let p = pipeline(AuthMethodConfig::Ip, &["10.0.0.0/24"], &["127.0.0.1"], &["192.168.1.0/24"]);
        let req = AuthRequest {
            remote_addr: "127.0.0.1:1234",
            forwarded_for: Some("10.0.0.50"),
            real_ip: None,
            authorization: None,
            path: "/",
            user_agent: None,
            headers: HashMap::new(),
        };
        let decision = p.evaluate(&req);
        assert!(decision.allowed);
        assert_eq!(decision.method_used, AuthMethod::Bypass);
    }

    /// Same setup but the proxy is untrusted, so XFF is ignored and
    /// the IP allowlist decides -> denied.
    #[test]
    fn bypass_with_untrusted_proxy_falls_through_to_ip_policy() {
        let p = pipeline(AuthMethodConfig::Ip, &["10.0.0.0/24"], &["192.168.1.1"], &["192.168.1.0/24"]);
        let req = AuthRequest {
            remote_addr: "127.0.0.1:1234",
            forwarded_for: Some("10.0.0.50"),
            real_ip: None,
            authorization: None,
            path: "/",
            user_agent: None,
            headers: HashMap::new(),
        };
        let decision = p.evaluate(&req);
        assert!(!decision.allowed);
    }

    #[test]
    fn audit_headers_never_include_sensitive_keys() {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer xyz".to_string());
        headers.insert("Cookie".to_string(), "session=abc".to_string());
        headers.insert("X-Api-Key".to_string(), "key".to_string());
        headers.insert("X-My-Secret-Thing".to_string(), "oops".to_string());
        headers.insert("User-Agent".to_string(), "curl/8.0".to_string());

        let filtered = filter_audit_headers(&headers);
        assert!(!filtered.contains_key("Authorization"));
        assert!(!filtered.contains_key("Cookie"));
        assert!(!filtered.contains_key("X-Api-Key"));
        assert!(!filtered.contains_key("X-My-Secret-Thing"));
        assert_eq!(filtered.get("User-Agent"), Some(&"curl/8.0".to_string()));
    }

    #[test]
    fn rejection_status_distinguishes_ip_vs_token() {
        assert_eq!(rejection_status(false), 403);
        assert_eq!(rejection_status(true), 401);
    }
}
