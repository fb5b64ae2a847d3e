//! Authorization endpoint: request validation and the grant step.
//!
//! Failures before the redirect URI is trusted (duplicate `state`, unknown
//! client, bad redirect URI) render as a JSON page. Everything after that
//! redirects back to the client with error parameters.

use chrono::Utc;
use std::sync::Arc;
use url::Url;

use super::extension::Extensions;
use super::issuer::{
    AccessTokenOrder, AuthorizationArtifact, IssuerBundle, TokenSpec, expiry_after,
};
use super::params::ParamReader;
use super::redirect_uri::resolve_redirect_uri;
use super::registration::{ClientRegistration, RegistrationAuthority, UserRegistration};
use super::response::OAuthResponse;
use super::types::{
    AccessTokenPayload, AuthorizationCodePayload, CodeChallengeMethod, ErrorCode, OAuthFailure,
    PkceInfo, ResponseType, parse_scope,
};
use super::writers::{RedirectEncoding, WithState};
use crate::errors::IssuerError;

/// Flow-specific part of a validated authorization request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationFlow {
    /// `response_type=token`
    Implicit,
    /// `response_type=code`, with PKCE unless the deployment opted out
    AuthorizationCode { pkce: Option<PkceInfo> },
}

/// A fully validated authorization request.
///
/// Only the scopes may change after parsing, and only by narrowing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    client_id: String,
    redirect_uri: Url,
    redirect_uri_provided: bool,
    scopes: Vec<String>,
    state: Option<String>,
    nonce: Option<String>,
    flow: AuthorizationFlow,
}

impl AuthorizationRequest {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    /// Whether `redirect_uri` was sent explicitly or defaulted.
    pub fn redirect_uri_provided(&self) -> bool {
        self.redirect_uri_provided
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    pub fn nonce(&self) -> Option<&str> {
        self.nonce.as_deref()
    }

    pub fn flow(&self) -> &AuthorizationFlow {
        &self.flow
    }

    pub fn response_type(&self) -> ResponseType {
        match self.flow {
            AuthorizationFlow::Implicit => ResponseType::Token,
            AuthorizationFlow::AuthorizationCode { .. } => ResponseType::Code,
        }
    }

    pub fn pkce(&self) -> Option<&PkceInfo> {
        match &self.flow {
            AuthorizationFlow::Implicit => None,
            AuthorizationFlow::AuthorizationCode { pkce } => pkce.as_ref(),
        }
    }

    fn encoding(&self) -> RedirectEncoding {
        self.response_type().redirect_encoding()
    }
}

/// Validates authorization endpoint requests.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationRequestParser {
    extensions: Extensions,
}

impl AuthorizationRequestParser {
    pub fn new(extensions: Extensions) -> Self {
        Self { extensions }
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Validate a request, returning a granter awaiting the resource owner's
    /// decision or the response to send back immediately.
    pub async fn parse(
        &self,
        registry: &dyn RegistrationAuthority,
        params: &dyn ParamReader,
    ) -> Result<AuthorizationRequestGranter, OAuthResponse> {
        let state = params
            .maybe_singleton("state")
            .map_err(|failure| json_page(failure, None))?
            .map(str::to_string);

        let (client, redirect_uri, redirect_uri_provided) = self
            .resolve_target(registry, params)
            .await
            .map_err(|failure| json_page(failure, state.clone()))?;

        let request = self
            .parse_trusted(
                params,
                client.as_ref(),
                redirect_uri.clone(),
                redirect_uri_provided,
                state.clone(),
            )
            .map_err(|failure| {
                tracing::debug!(error = %failure, "authorization request rejected");
                let encoding = params
                    .maybe_singleton("response_type")
                    .ok()
                    .flatten()
                    .and_then(ResponseType::from_param)
                    .map(|response_type| response_type.redirect_encoding())
                    .unwrap_or(RedirectEncoding::Query);
                OAuthResponse::redirect(encoding, redirect_uri, &failure.with_state(state))
            })?;

        Ok(AuthorizationRequestGranter { client, request })
    }

    async fn resolve_target(
        &self,
        registry: &dyn RegistrationAuthority,
        params: &dyn ParamReader,
    ) -> Result<(Arc<dyn ClientRegistration>, Url, bool), OAuthFailure> {
        let client_id = params.singleton("client_id")?;
        let client = registry
            .lookup_client(client_id)
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "client lookup failed");
                OAuthFailure::server_error("client lookup failed")
            })?
            .ok_or_else(|| OAuthFailure::new(ErrorCode::UnauthorizedClient, "client unknown"))?;

        let requested = params.maybe_singleton("redirect_uri")?;
        let (redirect_uri, provided) =
            resolve_redirect_uri(requested, client.allowed_redirect_uris())?;
        Ok((client, redirect_uri, provided))
    }

    fn parse_trusted(
        &self,
        params: &dyn ParamReader,
        client: &dyn ClientRegistration,
        redirect_uri: Url,
        redirect_uri_provided: bool,
        state: Option<String>,
    ) -> Result<AuthorizationRequest, OAuthFailure> {
        let scopes = resolve_scopes(params.maybe_singleton("scope")?, client.default_scopes())?;
        let nonce = params.maybe_singleton("nonce")?.map(str::to_string);

        let raw_response_type = params.singleton("response_type")?;
        let response_type = ResponseType::from_param(raw_response_type).ok_or_else(|| {
            OAuthFailure::new(
                ErrorCode::UnsupportedResponseType,
                format!("unsupported response type '{raw_response_type}'"),
            )
        })?;

        if response_type == ResponseType::Token {
            let Some(require_nonce) = self.extensions.implicit() else {
                return Err(OAuthFailure::invalid_request(
                    "response type 'token' disallowed",
                ));
            };
            if require_nonce && nonce.is_none() {
                return Err(OAuthFailure::invalid_request(
                    "parameter 'nonce' required for implicit grant",
                ));
            }
        }

        let pkce = self.resolve_pkce(params, response_type)?;
        let flow = match response_type {
            ResponseType::Token => AuthorizationFlow::Implicit,
            ResponseType::Code => AuthorizationFlow::AuthorizationCode { pkce },
        };

        Ok(AuthorizationRequest {
            client_id: client.client_id().to_string(),
            redirect_uri,
            redirect_uri_provided,
            scopes,
            state,
            nonce,
            flow,
        })
    }

    fn resolve_pkce(
        &self,
        params: &dyn ParamReader,
        response_type: ResponseType,
    ) -> Result<Option<PkceInfo>, OAuthFailure> {
        let challenge = params.maybe_singleton("code_challenge")?;
        let raw_method = params.maybe_singleton("code_challenge_method")?;

        if let Some(challenge) = challenge {
            let length = challenge.chars().count();
            if !(PkceInfo::MIN_CHALLENGE_LENGTH..=PkceInfo::MAX_CHALLENGE_LENGTH).contains(&length) {
                return Err(OAuthFailure::invalid_request(
                    "code challenge less than 43 or greater than 128 characters",
                ));
            }
        }

        let method = match raw_method {
            None => CodeChallengeMethod::Plain,
            Some(raw) => CodeChallengeMethod::from_param(raw).ok_or_else(|| {
                OAuthFailure::invalid_request(format!("unsupported code challenge method '{raw}'"))
            })?,
        };

        let supplied = challenge.is_some() || raw_method.is_some();
        if response_type == ResponseType::Token {
            if supplied {
                return Err(OAuthFailure::invalid_request(
                    "implicit flow doesn't support PKCE",
                ));
            }
            return Ok(None);
        }

        if self.extensions.pkce_optional() && !supplied {
            return Ok(None);
        }

        let challenge =
            challenge.ok_or_else(|| OAuthFailure::invalid_request("missing 'code_challenge'"))?;
        if method == CodeChallengeMethod::Plain && !self.extensions.plain_challenge_allowed() {
            return Err(OAuthFailure::invalid_request(
                "challenge code method 'plain' disallowed",
            ));
        }

        Ok(Some(PkceInfo {
            method,
            challenge: challenge.to_string(),
        }))
    }
}

fn resolve_scopes(
    requested: Option<&str>,
    defaults: Option<&[String]>,
) -> Result<Vec<String>, OAuthFailure> {
    let scopes = requested.map(parse_scope).unwrap_or_default();
    if !scopes.is_empty() {
        return Ok(scopes);
    }
    match defaults {
        Some(defaults) if !defaults.is_empty() => Ok(defaults.to_vec()),
        _ => Err(OAuthFailure::invalid_scope("no 'scope' specified")),
    }
}

fn json_page(failure: OAuthFailure, state: Option<String>) -> OAuthResponse {
    tracing::debug!(error = %failure, "authorization request rejected before redirect");
    let status = failure.code.status();
    OAuthResponse::json(status, &failure.with_state(state))
}

/// A validated authorization request awaiting the resource owner's decision.
#[derive(Debug)]
pub struct AuthorizationRequestGranter {
    client: Arc<dyn ClientRegistration>,
    request: AuthorizationRequest,
}

impl AuthorizationRequestGranter {
    pub fn request(&self) -> &AuthorizationRequest {
        &self.request
    }

    pub fn client(&self) -> &dyn ClientRegistration {
        self.client.as_ref()
    }

    /// Narrow the requested scopes, e.g. to what the resource owner approved.
    pub fn set_scopes(&mut self, scopes: Vec<String>) -> Result<(), OAuthFailure> {
        if scopes.is_empty() || !scopes.iter().all(|s| self.request.scopes.contains(s)) {
            return Err(OAuthFailure::invalid_scope("scopes may only be narrowed"));
        }
        self.request.scopes = scopes;
        Ok(())
    }

    /// Redirect back with `access_denied`.
    pub fn deny(&self, reason: Option<&str>) -> OAuthResponse {
        let failure = OAuthFailure::new(
            ErrorCode::AccessDenied,
            reason.unwrap_or("resource owner denied access"),
        );
        tracing::info!(client_id = %self.request.client_id, "authorization denied");
        OAuthResponse::redirect(
            self.request.encoding(),
            self.request.redirect_uri.clone(),
            &failure.with_state(self.request.state.clone()),
        )
    }

    /// Issue a code (or, for the implicit flow, an access token) for `user`.
    pub async fn grant(&self, bundle: &IssuerBundle, user: &dyn UserRegistration) -> OAuthResponse {
        let request = &self.request;
        let outcome = match self.issue(bundle, user).await {
            Ok(outcome) => outcome,
            Err(failure) => {
                return OAuthResponse::redirect(
                    request.encoding(),
                    request.redirect_uri.clone(),
                    &failure.with_state(request.state.clone()),
                );
            }
        };

        tracing::info!(
            client_id = %request.client_id,
            sub = %user.sub(),
            response_type = request.response_type().as_str(),
            "authorization granted"
        );

        match outcome {
            Issued::Code(payload) => OAuthResponse::redirect(
                request.encoding(),
                request.redirect_uri.clone(),
                &WithState::new(request.state.clone(), payload),
            ),
            Issued::Token(payload) => OAuthResponse::redirect(
                request.encoding(),
                request.redirect_uri.clone(),
                &WithState::new(request.state.clone(), payload),
            ),
        }
    }

    async fn issue(
        &self,
        bundle: &IssuerBundle,
        user: &dyn UserRegistration,
    ) -> Result<Issued, OAuthFailure> {
        let request = &self.request;
        let spec = TokenSpec::new(
            self.client.as_ref(),
            user,
            request.scopes.clone(),
            request.nonce.clone(),
        )?;

        match &request.flow {
            AuthorizationFlow::Implicit => {
                let order = AccessTokenOrder {
                    spec,
                    expires_in_seconds: self.client.access_token_lifetime_seconds(),
                };
                bundle
                    .issue_access_token(&order)
                    .map(Issued::Token)
                    .map_err(|e| {
                        tracing::error!(error = ?e, "access token issuance failed");
                        OAuthFailure::server_error("access token issuance failed")
                    })
            }
            AuthorizationFlow::AuthorizationCode { pkce } => {
                let artifact = AuthorizationArtifact {
                    spec,
                    redirect_uri: request.redirect_uri.clone(),
                    redirect_uri_provided: request.redirect_uri_provided,
                    pkce: pkce.clone(),
                };
                let failed = |e: IssuerError| {
                    tracing::error!(error = ?e, "authorization code issuance failed");
                    OAuthFailure::server_error("authorization code issuance failed")
                };
                let expiry =
                    expiry_after(Utc::now(), self.client.authorization_code_lifetime_seconds())
                        .map_err(failed)?;
                bundle
                    .authority()
                    .issue_authorization_code(&artifact, expiry)
                    .await
                    .map(Issued::Code)
                    .map_err(failed)
            }
        }
    }
}

enum Issued {
    Code(AuthorizationCodePayload),
    Token(AccessTokenPayload),
}
