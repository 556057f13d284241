//! OIDC bearer token validation against a discovery document.

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub jwks_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub subject: String,
    pub issuer: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct Claims {
    sub: String,
    iss: String,
    exp: i64,
    #[serde(default)]
    aud: Option<serde_json::Value>,
}

pub struct OidcValidator {
    pub issuer: String,
    pub audience: String,
    /// HMAC secret used to verify the signature. A production
    /// deployment would fetch RSA/EC keys from `jwks_uri`; the
    /// discovery document fetch itself is out of scope for this crate
    /// (external collaborator), so this validator accepts a
    /// pre-resolved key.
    decoding_key: DecodingKey,
    algorithm: Algorithm,
}

impl OidcValidator {
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>, key_material: &[u8]) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            decoding_key: DecodingKey::from_secret(key_material),
            algorithm: Algorithm::HS256,
        }
    }

    pub fn extract_bearer(header_value: Option<&str>) -> Option<&str> {
        header_value?.strip_prefix("Bearer ").map(|s| s.trim())
    }

    pub fn validate(&self, token: &str) -> Result<TokenInfo, String> {
        let header = decode_header(token).map_err(|e| format!("malformed token header: {e}"))?;
        if header.alg != self.algorithm {
            return Err("unexpected signing algorithm".to_string());
        }

        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| format!("token validation failed: {e}"))?;

        Ok(TokenInfo {
            subject: data.claims.sub,
            issuer: data.claims.iss,
            expires_at: data.claims.exp,
        })
    }
}
