//! Shared fixtures for the protocol unit tests.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

use super::access_token::{JsonWebTokenSigner, Rfc9068AccessTokenIssuer};
use super::issuer::{IssuerBundle, RandomCodeAuthorizationAuthority};
use super::registration::{MemoryRegistrationAuthority, SimpleUser, StaticClient};
use crate::storage::MemoryDataStore;

pub const ISSUER: &str = "https://issuer.example";
pub const SECRET: &[u8] = b"test-signing-secret";
pub const REDIRECT: &str = "https://example.com/redirect_endpoint";
pub const AUDIENCE: &str = "https://api.example.com";
pub const VERIFIER: &str = "dBjftJeZ4CVP-mJ0kzyT3lu2OJ1yzhgOe0Q7-mjNlM";
pub const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

/// `robert` has one redirect URI and default scopes; `multi` has two redirect
/// URIs; `nodefaults` has no default scopes; `svc` may use client credentials.
pub fn registry() -> MemoryRegistrationAuthority {
    let mut svc_user = SimpleUser::new("svc-account");
    svc_user.groups = vec!["ops".to_string()];

    MemoryRegistrationAuthority::new()
        .with(
            StaticClient::new("robert", AUDIENCE)
                .with_redirect_uri(url(REDIRECT))
                .with_default_scopes(&["ascope", "anotherscope"])
                .with_refresh_tokens(),
        )
        .with(
            StaticClient::new("multi", AUDIENCE)
                .with_redirect_uri(url("https://example.com/a"))
                .with_redirect_uri(url("http://127.0.0.1/cb"))
                .with_default_scopes(&["ascope"]),
        )
        .with(
            StaticClient::new("nodefaults", AUDIENCE)
                .with_redirect_uri(url(REDIRECT))
                .with_allowed_scope("ascope"),
        )
        .with(
            StaticClient::new("svc", "svc-api")
                .with_default_scopes(&["jobs"])
                .with_service_account(svc_user),
        )
}

pub fn bundle() -> IssuerBundle {
    let signer = Arc::new(JsonWebTokenSigner::hs256(SECRET, None));
    IssuerBundle::new(
        Arc::new(RandomCodeAuthorizationAuthority::new(Arc::new(
            MemoryDataStore::new(),
        ))),
        Arc::new(Rfc9068AccessTokenIssuer::new(ISSUER, signer)),
    )
}

/// Decode an access token minted by [`bundle`], returning its claims.
pub fn verify_access_token(token: &str) -> Value {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;
    validation.set_issuer(&[ISSUER]);
    jsonwebtoken::decode::<Value>(token, &DecodingKey::from_secret(SECRET), &validation)
        .unwrap()
        .claims
}
