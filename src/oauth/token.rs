//! Token endpoint: grant-type dispatch, artifact redemption and issuance.
//!
//! There is no redirect context at this endpoint, so every outcome is a JSON
//! page.

use chrono::Utc;
use http::StatusCode;
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

use super::issuer::{
    AccessTokenOrder, AuthorizationArtifact, IssuerBundle, TokenSpec, expiry_after,
};
use super::params::ParamReader;
use super::redirect_uri::uris_match;
use super::registration::{ClientRegistration, RegistrationAuthority};
use super::response::OAuthResponse;
use super::types::{AccessTokenPayload, ErrorCode, GrantType, OAuthFailure, parse_scope};
use crate::errors::IssuerError;

/// A validated token request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenRequest {
    /// A redeemed authorization code
    AuthorizationCode { artifact: AuthorizationArtifact },
    /// A client acting as its own service account
    ClientCredentials { scopes: Vec<String> },
    /// A redeemed refresh token, possibly with narrowed scopes
    RefreshToken { spec: TokenSpec },
}

impl TokenRequest {
    pub fn grant_type(&self) -> GrantType {
        match self {
            Self::AuthorizationCode { .. } => GrantType::AuthorizationCode,
            Self::ClientCredentials { .. } => GrantType::ClientCredentials,
            Self::RefreshToken { .. } => GrantType::RefreshToken,
        }
    }

    pub fn scopes(&self) -> &[String] {
        match self {
            Self::AuthorizationCode { artifact } => &artifact.spec.scopes,
            Self::ClientCredentials { scopes } => scopes,
            Self::RefreshToken { spec } => &spec.scopes,
        }
    }
}

/// Validates token endpoint requests.
///
/// Codes and refresh tokens are redeemed during parsing, so a request that
/// fails a later check still consumes them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenRequestParser;

impl TokenRequestParser {
    pub fn new() -> Self {
        Self
    }

    pub async fn parse(
        &self,
        registry: &dyn RegistrationAuthority,
        bundle: &IssuerBundle,
        params: &dyn ParamReader,
    ) -> Result<TokenRequestGranter, OAuthResponse> {
        self.parse_request(registry, bundle, params)
            .await
            .map_err(|failure| {
                tracing::debug!(error = %failure, "token request rejected");
                json_error(failure)
            })
    }

    async fn parse_request(
        &self,
        registry: &dyn RegistrationAuthority,
        bundle: &IssuerBundle,
        params: &dyn ParamReader,
    ) -> Result<TokenRequestGranter, OAuthFailure> {
        let raw_grant_type = params
            .maybe_singleton("grant_type")?
            .ok_or_else(|| OAuthFailure::invalid_request("missing 'grant_type'"))?;
        let grant_type = GrantType::from_param(raw_grant_type).ok_or_else(|| {
            OAuthFailure::new(
                ErrorCode::UnsupportedGrantType,
                format!("unsupported grant type '{raw_grant_type}'"),
            )
        })?;

        match grant_type {
            GrantType::AuthorizationCode => {
                let artifact = redeem_code(bundle, params).await?;
                let client = lookup_client(registry, &artifact.spec.client_id).await?;
                Ok(TokenRequestGranter {
                    client,
                    request: TokenRequest::AuthorizationCode { artifact },
                })
            }
            GrantType::ClientCredentials => {
                let client = lookup_client(registry, params.singleton("client_id")?).await?;
                if client.as_user().is_none() {
                    return Err(OAuthFailure::new(
                        ErrorCode::UnauthorizedClient,
                        "client credentials grant not permitted",
                    ));
                }
                let scopes = params
                    .maybe_singleton("scope")?
                    .map(parse_scope)
                    .filter(|scopes| !scopes.is_empty())
                    .or_else(|| client.default_scopes().map(<[String]>::to_vec))
                    .filter(|scopes| !scopes.is_empty())
                    .ok_or_else(|| OAuthFailure::invalid_scope("no 'scope' specified"))?;
                Ok(TokenRequestGranter {
                    client,
                    request: TokenRequest::ClientCredentials { scopes },
                })
            }
            GrantType::RefreshToken => {
                let spec = redeem_refresh_token(bundle, params).await?;
                let client = lookup_client(registry, &spec.client_id).await?;
                Ok(TokenRequestGranter {
                    client,
                    request: TokenRequest::RefreshToken { spec },
                })
            }
        }
    }
}

async fn redeem_code(
    bundle: &IssuerBundle,
    params: &dyn ParamReader,
) -> Result<AuthorizationArtifact, OAuthFailure> {
    let code = params.singleton("code")?;
    let artifact = bundle
        .authority()
        .verify_authorization_code(code)
        .await
        .map_err(|e| issuer_failure(e, "authorization code verification failed"))?
        .ok_or_else(|| OAuthFailure::invalid_grant("invalid code"))?;

    if params.singleton("client_id")? != artifact.spec.client_id {
        return Err(OAuthFailure::invalid_grant(
            "mismatched 'client_id' with authorization code",
        ));
    }

    if let Some(scope) = params.maybe_singleton("scope")? {
        let requested: HashSet<String> = parse_scope(scope).into_iter().collect();
        let granted: HashSet<String> = artifact.spec.scopes.iter().cloned().collect();
        if requested != granted {
            return Err(OAuthFailure::invalid_request(
                "mismatched 'scope' with authorization code",
            ));
        }
    }

    check_redirect_uri(&artifact, params.maybe_singleton("redirect_uri")?)?;
    check_code_verifier(&artifact, params.maybe_singleton("code_verifier")?)?;
    Ok(artifact)
}

fn check_redirect_uri(
    artifact: &AuthorizationArtifact,
    supplied: Option<&str>,
) -> Result<(), OAuthFailure> {
    match (artifact.redirect_uri_provided, supplied) {
        (true, None) => Err(OAuthFailure::invalid_request("missing 'redirect_uri'")),
        (true, Some(raw)) => {
            let uri = Url::parse(raw)
                .map_err(|_| OAuthFailure::invalid_request("malformed 'redirect_uri'"))?;
            if uris_match(&artifact.redirect_uri, &uri) {
                Ok(())
            } else {
                Err(OAuthFailure::invalid_grant(
                    "mismatched 'redirect_uri' with authorization code",
                ))
            }
        }
        (false, Some(_)) => Err(OAuthFailure::invalid_grant(
            "'redirect_uri' was not provided at authorization",
        )),
        (false, None) => Ok(()),
    }
}

fn check_code_verifier(
    artifact: &AuthorizationArtifact,
    verifier: Option<&str>,
) -> Result<(), OAuthFailure> {
    match (&artifact.pkce, verifier) {
        (Some(pkce), Some(verifier)) if pkce.verify(verifier) => Ok(()),
        (Some(_), Some(_)) => Err(OAuthFailure::invalid_request(
            "code challenge validation failed",
        )),
        (Some(_), None) => Err(OAuthFailure::invalid_request("missing 'code_verifier'")),
        (None, Some(_)) => Err(OAuthFailure::invalid_request(
            "missing 'code_challenge' from authorization",
        )),
        (None, None) => Ok(()),
    }
}

async fn redeem_refresh_token(
    bundle: &IssuerBundle,
    params: &dyn ParamReader,
) -> Result<TokenSpec, OAuthFailure> {
    let token = params.singleton("refresh_token")?;
    let mut spec = bundle
        .authority()
        .verify_refresh_token(token)
        .await
        .map_err(|e| issuer_failure(e, "refresh token verification failed"))?
        .ok_or_else(|| OAuthFailure::invalid_grant("invalid refresh token"))?;

    if params.singleton("client_id")? != spec.client_id {
        return Err(OAuthFailure::invalid_grant(
            "mismatched 'client_id' with refresh token",
        ));
    }

    if let Some(scope) = params.maybe_singleton("scope")? {
        let narrowed = parse_scope(scope);
        if narrowed.is_empty() || !narrowed.iter().all(|s| spec.scopes.contains(s)) {
            return Err(OAuthFailure::invalid_scope("scope exceeds original grant"));
        }
        spec.scopes = narrowed;
    }

    Ok(spec)
}

async fn lookup_client(
    registry: &dyn RegistrationAuthority,
    client_id: &str,
) -> Result<Arc<dyn ClientRegistration>, OAuthFailure> {
    registry
        .lookup_client(client_id)
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, "client lookup failed");
            OAuthFailure::server_error("client lookup failed")
        })?
        .ok_or_else(|| OAuthFailure::new(ErrorCode::InvalidClient, "client unknown"))
}

fn issuer_failure(error: IssuerError, message: &'static str) -> OAuthFailure {
    tracing::error!(error = ?error, "{}", message);
    OAuthFailure::server_error(message)
}

fn json_error(failure: OAuthFailure) -> OAuthResponse {
    OAuthResponse::json(failure.code.status(), &failure.with_state(None))
}

/// A validated token request ready to be granted or denied.
#[derive(Debug)]
pub struct TokenRequestGranter {
    client: Arc<dyn ClientRegistration>,
    request: TokenRequest,
}

impl TokenRequestGranter {
    pub fn request(&self) -> &TokenRequest {
        &self.request
    }

    pub fn client(&self) -> &dyn ClientRegistration {
        self.client.as_ref()
    }

    /// Refuse the request with `access_denied`.
    pub fn deny(&self, reason: Option<&str>) -> OAuthResponse {
        json_error(OAuthFailure::new(
            ErrorCode::AccessDenied,
            reason.unwrap_or("server denied access"),
        ))
    }

    /// Issue an access token, plus a rotated refresh token when the client
    /// receives them.
    pub async fn grant(&self, bundle: &IssuerBundle) -> OAuthResponse {
        match self.issue(bundle).await {
            Ok(payload) => {
                tracing::info!(
                    client_id = %self.client.client_id(),
                    grant_type = self.request.grant_type().as_str(),
                    refresh = payload.refresh_token.is_some(),
                    "token granted"
                );
                OAuthResponse::json(StatusCode::OK, &payload)
            }
            Err(failure) => json_error(failure),
        }
    }

    async fn issue(&self, bundle: &IssuerBundle) -> Result<AccessTokenPayload, OAuthFailure> {
        let client = self.client.as_ref();
        let (spec, refreshable) = match &self.request {
            TokenRequest::AuthorizationCode { artifact } => {
                (artifact.spec.clone().revalidate(client)?, true)
            }
            TokenRequest::RefreshToken { spec } => (spec.clone().revalidate(client)?, true),
            TokenRequest::ClientCredentials { scopes } => {
                let user = client.as_user().ok_or_else(|| {
                    OAuthFailure::new(
                        ErrorCode::UnauthorizedClient,
                        "client credentials grant not permitted",
                    )
                })?;
                (TokenSpec::new(client, user, scopes.clone(), None)?, false)
            }
        };

        let order = AccessTokenOrder {
            spec,
            expires_in_seconds: client.access_token_lifetime_seconds(),
        };
        let mut payload = bundle
            .issue_access_token(&order)
            .map_err(|e| issuer_failure(e, "access token issuance failed"))?;

        if let Some(lifetime) = client.refresh_token_lifetime_seconds().filter(|_| refreshable) {
            let expiry = expiry_after(Utc::now(), lifetime)
                .map_err(|e| issuer_failure(e, "refresh token issuance failed"))?;
            let refresh_token = bundle
                .authority()
                .issue_refresh_token(&order.spec, expiry)
                .await
                .map_err(|e| issuer_failure(e, "refresh token issuance failed"))?;
            payload.refresh_token = Some(refresh_token);
        }

        Ok(payload)
    }
}
