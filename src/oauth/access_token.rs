//! JWT access tokens shaped after RFC 9068.
//!
//! Claim assembly is deterministic given the order, the issue time and the
//! token ID. Signing is delegated to a [`TokenSigner`].

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use super::issuer::{AccessTokenOrder, expiry_after};
use super::types::{AccessTokenPayload, TOKEN_TYPE_BEARER};
use crate::errors::{IssuerError, SigningError};

/// JOSE `typ` header value for access tokens
pub const JWT_TYPE: &str = "at+JWT";

/// Seconds subtracted from `iat` to produce `nbf`
pub const NOT_BEFORE_SKEW_SECONDS: i64 = 60;

/// Mints access tokens for approved orders.
pub trait AccessTokenIssuer: Send + Sync {
    fn issue_access_token(&self, order: &AccessTokenOrder) -> Result<AccessTokenPayload, IssuerError>;
}

/// Produces a compact JWS over a JSON claim set.
pub trait TokenSigner: Send + Sync {
    fn sign(&self, typ: &str, claims: &Value) -> Result<String, SigningError>;
}

/// [`TokenSigner`] backed by the `jsonwebtoken` crate.
pub struct JsonWebTokenSigner {
    algorithm: Algorithm,
    key: EncodingKey,
    key_id: Option<String>,
}

impl JsonWebTokenSigner {
    /// HMAC-SHA256 with a shared secret.
    pub fn hs256(secret: &[u8], key_id: Option<String>) -> Self {
        Self {
            algorithm: Algorithm::HS256,
            key: EncodingKey::from_secret(secret),
            key_id,
        }
    }

    /// RSASSA-PKCS1-v1_5 SHA-256 with a PEM encoded RSA private key.
    pub fn rs256_pem(pem: &[u8], key_id: Option<String>) -> Result<Self, SigningError> {
        let key = EncodingKey::from_rsa_pem(pem).map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        Ok(Self {
            algorithm: Algorithm::RS256,
            key,
            key_id,
        })
    }

    /// ECDSA P-256 SHA-256 with a PEM encoded PKCS#8 private key.
    pub fn es256_pem(pem: &[u8], key_id: Option<String>) -> Result<Self, SigningError> {
        let key = EncodingKey::from_ec_pem(pem).map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        Ok(Self {
            algorithm: Algorithm::ES256,
            key,
            key_id,
        })
    }

    /// Pick RS256 or ES256 from the PEM label.
    pub fn from_pem(pem: &[u8], key_id: Option<String>) -> Result<Self, SigningError> {
        let text = String::from_utf8_lossy(pem);
        if text.contains("BEGIN EC PRIVATE KEY") {
            return Self::es256_pem(pem, key_id);
        }
        match Self::rs256_pem(pem, key_id.clone()) {
            Ok(signer) => Ok(signer),
            Err(_) => Self::es256_pem(pem, key_id),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

impl TokenSigner for JsonWebTokenSigner {
    fn sign(&self, typ: &str, claims: &Value) -> Result<String, SigningError> {
        let mut header = Header::new(self.algorithm);
        header.typ = Some(typ.to_string());
        header.kid = self.key_id.clone();
        jsonwebtoken::encode(&header, claims, &self.key)
            .map_err(|e| SigningError::SigningFailed(e.to_string()))
    }
}

/// Build the RFC 9068 claim set for `order`.
///
/// Custom claims are written first so that they can never shadow the
/// registered ones.
pub fn build_claims(
    issuer: &str,
    order: &AccessTokenOrder,
    now: DateTime<Utc>,
    jti: &str,
) -> Map<String, Value> {
    let spec = &order.spec;
    let iat = now.timestamp();
    let mut claims = Map::new();

    for (name, value) in &spec.claims {
        claims.insert(name.clone(), Value::from(value.as_str()));
    }

    claims.insert("iss".to_string(), Value::from(issuer));
    claims.insert("aud".to_string(), Value::from(spec.audience.as_str()));
    claims.insert("sub".to_string(), Value::from(spec.sub.as_str()));
    claims.insert("iat".to_string(), Value::from(iat));
    claims.insert("nbf".to_string(), Value::from(iat - NOT_BEFORE_SKEW_SECONDS));
    claims.insert(
        "exp".to_string(),
        Value::from(iat.saturating_add(order.expires_in_seconds)),
    );
    claims.insert("jti".to_string(), Value::from(jti));
    claims.insert("client_id".to_string(), Value::from(spec.client_id.as_str()));
    claims.insert("scope".to_string(), Value::from(spec.scopes.join(" ")));
    if let Some(nonce) = &spec.nonce {
        claims.insert("nonce".to_string(), Value::from(nonce.as_str()));
    }

    claims
}

/// Issues signed `at+JWT` bearer tokens.
pub struct Rfc9068AccessTokenIssuer {
    issuer: String,
    signer: Arc<dyn TokenSigner>,
}

impl Rfc9068AccessTokenIssuer {
    pub fn new(issuer: impl Into<String>, signer: Arc<dyn TokenSigner>) -> Self {
        Self {
            issuer: issuer.into(),
            signer,
        }
    }
}

impl AccessTokenIssuer for Rfc9068AccessTokenIssuer {
    fn issue_access_token(&self, order: &AccessTokenOrder) -> Result<AccessTokenPayload, IssuerError> {
        let now = Utc::now();
        expiry_after(now, order.expires_in_seconds)?;
        let jti = Uuid::new_v4().to_string();
        let claims = build_claims(&self.issuer, order, now, &jti);
        let access_token = self.signer.sign(JWT_TYPE, &Value::Object(claims))?;

        tracing::debug!(
            client_id = %order.spec.client_id,
            sub = %order.spec.sub,
            %jti,
            "access token issued"
        );

        Ok(AccessTokenPayload {
            access_token,
            token_type: TOKEN_TYPE_BEARER,
            expires_in: order.expires_in_seconds,
            scopes: order.spec.scopes.clone(),
            refresh_token: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::issuer::TokenSpec;
    use chrono::TimeZone;
    use jsonwebtoken::{DecodingKey, Validation};
    use std::collections::BTreeMap;

    const SECRET: &[u8] = b"test-signing-secret";

    fn order() -> AccessTokenOrder {
        let mut claims = BTreeMap::new();
        claims.insert("groups".to_string(), "admins staff".to_string());
        claims.insert("iss".to_string(), "https://evil.example".to_string());
        AccessTokenOrder {
            spec: TokenSpec {
                client_id: "robert".to_string(),
                audience: "https://api.example.com".to_string(),
                sub: "alice".to_string(),
                scopes: vec!["ascope".to_string(), "anotherscope".to_string()],
                nonce: Some("n-0S6_WzA2Mj".to_string()),
                claims,
            },
            expires_in_seconds: 300,
        }
    }

    #[test]
    fn test_build_claims_is_deterministic() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let claims = build_claims("https://issuer.example", &order(), now, "jti-1");

        assert_eq!(claims, build_claims("https://issuer.example", &order(), now, "jti-1"));
        assert_eq!(claims["iss"], "https://issuer.example");
        assert_eq!(claims["aud"], "https://api.example.com");
        assert_eq!(claims["sub"], "alice");
        assert_eq!(claims["iat"], now.timestamp());
        assert_eq!(claims["nbf"], now.timestamp() - 60);
        assert_eq!(claims["exp"], now.timestamp() + 300);
        assert_eq!(claims["jti"], "jti-1");
        assert_eq!(claims["client_id"], "robert");
        assert_eq!(claims["scope"], "ascope anotherscope");
        assert_eq!(claims["nonce"], "n-0S6_WzA2Mj");
        assert_eq!(claims["groups"], "admins staff");
    }

    #[test]
    fn test_nonce_omitted_when_absent() {
        let mut order = order();
        order.spec.nonce = None;
        let claims = build_claims("iss", &order, Utc::now(), "jti");
        assert!(!claims.contains_key("nonce"));
    }

    #[test]
    fn test_issued_token_verifies() {
        let signer = Arc::new(JsonWebTokenSigner::hs256(SECRET, Some("k1".to_string())));
        let issuer = Rfc9068AccessTokenIssuer::new("https://issuer.example", signer);
        let payload = issuer.issue_access_token(&order()).unwrap();

        assert_eq!(payload.token_type, "Bearer");
        assert_eq!(payload.expires_in, 300);
        assert_eq!(payload.scopes, vec!["ascope", "anotherscope"]);

        let header = jsonwebtoken::decode_header(&payload.access_token).unwrap();
        assert_eq!(header.typ.as_deref(), Some(JWT_TYPE));
        assert_eq!(header.kid.as_deref(), Some("k1"));

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&["https://api.example.com"]);
        validation.set_issuer(&["https://issuer.example"]);
        let decoded = jsonwebtoken::decode::<Value>(
            &payload.access_token,
            &DecodingKey::from_secret(SECRET),
            &validation,
        )
        .unwrap();
        assert_eq!(decoded.claims["client_id"], "robert");
        assert_eq!(decoded.claims["iss"], "https://issuer.example");
    }

    #[test]
    fn test_out_of_range_lifetime_is_rejected() {
        let signer = Arc::new(JsonWebTokenSigner::hs256(SECRET, None));
        let issuer = Rfc9068AccessTokenIssuer::new("https://issuer.example", signer);

        for lifetime in [0, -300, 100_000_000_000_000, i64::MAX] {
            let mut order = order();
            order.expires_in_seconds = lifetime;
            assert!(matches!(
                issuer.issue_access_token(&order),
                Err(IssuerError::LifetimeOutOfRange(l)) if l == lifetime
            ));
        }
    }

    #[test]
    fn test_invalid_pem_is_rejected() {
        assert!(matches!(
            JsonWebTokenSigner::rs256_pem(b"not a key", None),
            Err(SigningError::InvalidKey(_))
        ));
    }
}
