//! OAuth 2.1 Integration Tests
//!
//! These tests drive the protocol core end to end: authorization request,
//! grant, code redemption, refresh and client credentials.

use futures::future::join_all;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use oauth21::oauth::{
    ArtifactKind, AuthorizationRequestParser, CodeChallengeMethod, Extension, Extensions,
    IssuerBundle, JsonWebTokenSigner, MemoryRegistrationAuthority, OAuthResponse, Params,
    RandomCodeAuthorizationAuthority, ReplayObserver, Rfc9068AccessTokenIssuer, SimpleUser,
    SingleScopeClient, StaticClient, TokenRequestParser, TokenSpec,
};
use oauth21::storage::MemoryDataStore;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use url::Url;

const ISSUER: &str = "https://auth.example.com";
const SECRET: &[u8] = b"integration-secret";
const REDIRECT: &str = "https://example.com/redirect_endpoint";

#[derive(Default)]
struct CountingObserver {
    replays: Mutex<Vec<ArtifactKind>>,
}

impl ReplayObserver for CountingObserver {
    fn replay_detected(&self, kind: ArtifactKind, _spec: &TokenSpec) {
        self.replays.lock().unwrap().push(kind);
    }
}

struct Harness {
    registry: MemoryRegistrationAuthority,
    issuers: IssuerBundle,
    observer: Arc<CountingObserver>,
}

impl Harness {
    fn new() -> Self {
        let observer = Arc::new(CountingObserver::default());
        let authority = RandomCodeAuthorizationAuthority::new(Arc::new(MemoryDataStore::new()))
            .with_replay_observer(observer.clone());
        let signer = Arc::new(JsonWebTokenSigner::hs256(SECRET, Some("it".to_string())));
        let issuers = IssuerBundle::new(
            Arc::new(authority),
            Arc::new(Rfc9068AccessTokenIssuer::new(ISSUER, signer)),
        );

        let mut service = SimpleUser::new("report-bot");
        service
            .custom_claims
            .insert("tenant".to_string(), "acme".to_string());

        let registry = MemoryRegistrationAuthority::new()
            .with(
                StaticClient::new("robert", "https://api.example.com")
                    .with_redirect_uri(Url::parse(REDIRECT).unwrap())
                    .with_default_scopes(&["ascope", "anotherscope"])
                    .with_refresh_tokens(),
            )
            .with(
                StaticClient::new("unconfigured", "https://api.example.com")
                    .with_redirect_uri(Url::parse("https://example.com/one").unwrap())
                    .with_redirect_uri(Url::parse("https://example.com/two").unwrap())
                    .with_allowed_scope("ascope"),
            )
            .with(
                StaticClient::new("reporter", "reports-api")
                    .with_default_scopes(&["reports"])
                    .with_service_account(service),
            )
            .with(SingleScopeClient::new(
                "single",
                vec![Url::parse("http://localhost/callback").unwrap()],
                "https://single.example.com",
                120,
            ));

        Self {
            registry,
            issuers,
            observer,
        }
    }

    async fn authorize(&self, extensions: Extensions, pairs: &[(&str, &str)]) -> OAuthResponse {
        match AuthorizationRequestParser::new(extensions)
            .parse(&self.registry, &params(pairs))
            .await
        {
            Ok(granter) => {
                granter
                    .grant(&self.issuers, &SimpleUser::new("alice"))
                    .await
            }
            Err(response) => response,
        }
    }

    async fn token(&self, pairs: &[(&str, &str)]) -> OAuthResponse {
        match TokenRequestParser::new()
            .parse(&self.registry, &self.issuers, &params(pairs))
            .await
        {
            Ok(granter) => granter.grant(&self.issuers).await,
            Err(response) => response,
        }
    }
}

fn params(pairs: &[(&str, &str)]) -> Params {
    Params::from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())))
}

fn claims(token: &str, audience: &str) -> Value {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[audience]);
    validation.set_issuer(&[ISSUER]);
    jsonwebtoken::decode::<Value>(token, &DecodingKey::from_secret(SECRET), &validation)
        .unwrap()
        .claims
}

fn pkce_pair() -> (String, String) {
    let verifier = oauth21::oauth::generate_token();
    let challenge = CodeChallengeMethod::S256.calculate_challenge(&verifier);
    (verifier, challenge)
}

#[tokio::test]
async fn test_robert_end_to_end() {
    let harness = Harness::new();
    let (verifier, challenge) = pkce_pair();

    let authorized = harness
        .authorize(
            Extensions::new(),
            &[
                ("response_type", "code"),
                ("client_id", "robert"),
                ("state", "af0ifjsldkj"),
                ("code_challenge", &challenge),
                ("code_challenge_method", "S256"),
            ],
        )
        .await;

    let location = authorized.location().unwrap();
    assert!(location.as_str().starts_with(REDIRECT));
    assert!(!location.as_str().contains(&challenge));
    assert_eq!(authorized.param("state").as_deref(), Some("af0ifjsldkj"));
    let code = authorized.param("code").unwrap();

    let token = harness
        .token(&[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("client_id", "robert"),
            ("code_verifier", &verifier),
        ])
        .await;

    assert_eq!(token.status(), http::StatusCode::OK);
    let body = token.body().unwrap();
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 3600);

    let claims = claims(body["access_token"].as_str().unwrap(), "https://api.example.com");
    assert_eq!(claims["client_id"], "robert");
    assert_eq!(claims["scope"], "ascope anotherscope");
    assert_eq!(claims["sub"], "alice");
    assert_eq!(claims["iss"], ISSUER);
    assert_eq!(
        claims["exp"].as_i64().unwrap() - claims["iat"].as_i64().unwrap(),
        3600
    );

    let header = jsonwebtoken::decode_header(body["access_token"].as_str().unwrap()).unwrap();
    assert_eq!(header.typ.as_deref(), Some("at+JWT"));
}

#[tokio::test]
async fn test_concurrent_redemption_has_one_winner() {
    let harness = Harness::new();
    let (verifier, challenge) = pkce_pair();
    let code = harness
        .authorize(
            Extensions::new(),
            &[
                ("response_type", "code"),
                ("client_id", "robert"),
                ("code_challenge", &challenge),
                ("code_challenge_method", "S256"),
            ],
        )
        .await
        .param("code")
        .unwrap();

    let request = [
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("client_id", "robert"),
        ("code_verifier", verifier.as_str()),
    ];
    let responses = join_all((0..16).map(|_| harness.token(&request))).await;

    let winners = responses
        .iter()
        .filter(|r| r.status() == http::StatusCode::OK)
        .count();
    assert_eq!(winners, 1);
    for loser in responses.iter().filter(|r| r.status() != http::StatusCode::OK) {
        assert_eq!(loser.param("error").as_deref(), Some("invalid_grant"));
        assert_eq!(loser.param("error_message").as_deref(), Some("invalid code"));
    }
    assert_eq!(harness.observer.replays.lock().unwrap().len(), 15);
}

#[tokio::test]
async fn test_default_redirect_requires_single_registration() {
    let harness = Harness::new();

    let response = harness
        .authorize(
            Extensions::new(),
            &[("response_type", "code"), ("client_id", "unconfigured")],
        )
        .await;
    assert!(response.location().is_none());
    assert_eq!(
        response.param("error_message").as_deref(),
        Some("missing redirect URI and no default registered")
    );
}

#[tokio::test]
async fn test_scope_defaulting_and_missing_defaults() {
    let harness = Harness::new();

    let response = harness
        .authorize(
            Extensions::new().with(Extension::DontRequirePkce).unwrap(),
            &[
                ("response_type", "code"),
                ("client_id", "unconfigured"),
                ("redirect_uri", "https://example.com/two"),
                ("state", "s"),
            ],
        )
        .await;
    assert_eq!(
        response.location().unwrap().as_str().split('?').next(),
        Some("https://example.com/two")
    );
    assert_eq!(response.param("error").as_deref(), Some("invalid_scope"));
    assert_eq!(response.param("state").as_deref(), Some("s"));

    let response = harness
        .authorize(
            Extensions::new().with(Extension::DontRequirePkce).unwrap(),
            &[("response_type", "code"), ("client_id", "single")],
        )
        .await;
    assert!(response.param("code").is_some());
}

#[tokio::test]
async fn test_implicit_flow_with_required_nonce() {
    let harness = Harness::new();
    let extensions = Extensions::new()
        .with(Extension::AllowImplicit {
            require_nonce: true,
        })
        .unwrap();

    let response = harness
        .authorize(
            extensions.clone(),
            &[("response_type", "token"), ("client_id", "single")],
        )
        .await;
    assert_eq!(
        response.param("error_message").as_deref(),
        Some("parameter 'nonce' required for implicit grant")
    );

    let response = harness
        .authorize(
            extensions,
            &[
                ("response_type", "token"),
                ("client_id", "single"),
                ("nonce", "n-0S6_WzA2Mj"),
                ("state", "st"),
            ],
        )
        .await;
    let location = response.location().unwrap();
    assert!(location.query().is_none());
    assert!(location.fragment().is_some());
    assert_eq!(response.param("expires_in").as_deref(), Some("120"));

    let claims = claims(
        &response.param("access_token").unwrap(),
        "https://single.example.com",
    );
    assert_eq!(claims["nonce"], "n-0S6_WzA2Mj");
    assert_eq!(claims["aud"], "https://single.example.com");
}

#[tokio::test]
async fn test_refresh_token_rotation() {
    let harness = Harness::new();
    let (verifier, challenge) = pkce_pair();
    let code = harness
        .authorize(
            Extensions::new(),
            &[
                ("response_type", "code"),
                ("client_id", "robert"),
                ("code_challenge", &challenge),
                ("code_challenge_method", "S256"),
            ],
        )
        .await
        .param("code")
        .unwrap();
    let first = harness
        .token(&[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("client_id", "robert"),
            ("code_verifier", &verifier),
        ])
        .await;
    let refresh_token = first.param("refresh_token").unwrap();

    let second = harness
        .token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", &refresh_token),
            ("client_id", "robert"),
        ])
        .await;
    assert_eq!(second.status(), http::StatusCode::OK);
    assert_eq!(second.param("scope").as_deref(), Some("ascope anotherscope"));
    assert!(second.param("refresh_token").is_some());

    let replay = harness
        .token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", &refresh_token),
            ("client_id", "robert"),
        ])
        .await;
    assert_eq!(replay.param("error").as_deref(), Some("invalid_grant"));
    assert_eq!(
        *harness.observer.replays.lock().unwrap(),
        vec![ArtifactKind::RefreshToken]
    );
}

#[tokio::test]
async fn test_client_credentials_grant() {
    let harness = Harness::new();

    let response = harness
        .token(&[("grant_type", "client_credentials"), ("client_id", "reporter")])
        .await;
    assert_eq!(response.status(), http::StatusCode::OK);
    assert!(response.param("refresh_token").is_none());

    let claims = claims(&response.param("access_token").unwrap(), "reports-api");
    assert_eq!(claims["sub"], "report-bot");
    assert_eq!(claims["client_id"], "reporter");
    assert_eq!(claims["tenant"], "acme");
    assert_eq!(claims["scope"], "reports");
}
