//! OAuth 2.1 protocol vocabulary and wire payloads.
//!
//! Response types, grant types, PKCE methods, the closed error vocabulary and
//! the flat payloads that the response writers render.

use base64::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

use super::writers::{ParamSink, RedirectEncoding, Writable};

/// OAuth 2.1 Response Types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Authorization code flow (`code`)
    Code,
    /// Implicit flow (`token`), only available through an extension
    Token,
}

impl ResponseType {
    /// Parse the value of the `response_type` parameter.
    pub fn from_param(value: &str) -> Option<Self> {
        match value {
            "code" => Some(Self::Code),
            "token" => Some(Self::Token),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Token => "token",
        }
    }

    /// Codes travel in the query, implicit tokens in the fragment.
    pub fn redirect_encoding(&self) -> RedirectEncoding {
        match self {
            Self::Code => RedirectEncoding::Query,
            Self::Token => RedirectEncoding::Fragment,
        }
    }
}

/// OAuth 2.1 Grant Types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    ClientCredentials,
    RefreshToken,
}

impl GrantType {
    /// Parse the value of the `grant_type` parameter.
    pub fn from_param(value: &str) -> Option<Self> {
        match value {
            "authorization_code" => Some(Self::AuthorizationCode),
            "client_credentials" => Some(Self::ClientCredentials),
            "refresh_token" => Some(Self::RefreshToken),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::RefreshToken => "refresh_token",
        }
    }
}

/// PKCE code challenge transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    #[serde(rename = "plain")]
    Plain,
    #[serde(rename = "S256")]
    S256,
}

impl CodeChallengeMethod {
    /// Parse the value of the `code_challenge_method` parameter.
    pub fn from_param(value: &str) -> Option<Self> {
        match value {
            "plain" => Some(Self::Plain),
            "S256" => Some(Self::S256),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::S256 => "S256",
        }
    }

    /// Derive the challenge a client would have sent for `verifier`.
    pub fn calculate_challenge(&self, verifier: &str) -> String {
        match self {
            Self::Plain => verifier.to_string(),
            Self::S256 => {
                let mut hasher = Sha256::new();
                hasher.update(verifier.as_bytes());
                BASE64_URL_SAFE_NO_PAD.encode(hasher.finalize())
            }
        }
    }
}

/// PKCE information captured at authorization time.
///
/// The challenge is only ever compared server side and is never written back
/// to the client.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceInfo {
    pub method: CodeChallengeMethod,
    pub challenge: String,
}

impl PkceInfo {
    pub const MIN_CHALLENGE_LENGTH: usize = 43;
    pub const MAX_CHALLENGE_LENGTH: usize = 128;

    /// Check a `code_verifier` against the stored challenge.
    pub fn verify(&self, verifier: &str) -> bool {
        self.method.calculate_challenge(verifier) == self.challenge
    }
}

impl fmt::Debug for PkceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceInfo")
            .field("method", &self.method)
            .field("challenge", &"<redacted>")
            .finish()
    }
}

/// Closed OAuth error vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    InvalidGrant,
    InvalidClient,
    UnauthorizedClient,
    AccessDenied,
    UnsupportedResponseType,
    UnsupportedGrantType,
    InvalidScope,
    ServerError,
    TemporarilyUnavailable,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidGrant => "invalid_grant",
            Self::InvalidClient => "invalid_client",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::AccessDenied => "access_denied",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InvalidScope => "invalid_scope",
            Self::ServerError => "server_error",
            Self::TemporarilyUnavailable => "temporarily_unavailable",
        }
    }

    /// Status used when this error is rendered as a JSON page.
    pub fn status(&self) -> http::StatusCode {
        match self {
            Self::InvalidClient => http::StatusCode::UNAUTHORIZED,
            Self::ServerError => http::StatusCode::INTERNAL_SERVER_ERROR,
            Self::TemporarilyUnavailable => http::StatusCode::SERVICE_UNAVAILABLE,
            _ => http::StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request-time validation failure.
///
/// Raised with `?` through the parsers and converted into exactly one
/// rendered response at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct OAuthFailure {
    pub code: ErrorCode,
    pub message: String,
}

impl OAuthFailure {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidGrant, message)
    }

    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidScope, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServerError, message)
    }

    /// Attach an optional `state` to produce the renderable error payload.
    pub fn with_state(self, state: Option<String>) -> ErrorResponse {
        ErrorResponse {
            error: self.code,
            error_message: Some(self.message),
            state,
        }
    }
}

/// Error payload rendered as redirect parameters or as a JSON body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl Writable for ErrorResponse {
    fn write_to(&self, writer: &mut dyn ParamSink) {
        writer.set_str("error", self.error.as_str());
        if let Some(message) = &self.error_message {
            writer.set_str("error_message", message);
        }
        if let Some(state) = &self.state {
            writer.set_str("state", state);
        }
    }
}

/// An issued authorization code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCodePayload {
    pub code: String,
}

impl Writable for AuthorizationCodePayload {
    fn write_to(&self, writer: &mut dyn ParamSink) {
        writer.set_str("code", &self.code);
    }
}

/// Bearer token type written into every access-token response
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// An issued access token, optionally paired with a refresh token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessTokenPayload {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub scopes: Vec<String>,
    pub refresh_token: Option<String>,
}

impl Writable for AccessTokenPayload {
    fn write_to(&self, writer: &mut dyn ParamSink) {
        writer.set_str("access_token", &self.access_token);
        writer.set_str("token_type", self.token_type);
        writer.set_int("expires_in", self.expires_in);
        writer.set_str("scope", &self.scopes.join(" "));
        if let Some(refresh_token) = &self.refresh_token {
            writer.set_str("refresh_token", refresh_token);
        }
    }
}

/// Split a space-delimited `scope` parameter, dropping empty segments.
pub fn parse_scope(scope: &str) -> Vec<String> {
    scope.split_whitespace().map(str::to_string).collect()
}

/// Generate a random opaque token: 32 bytes, base64url without padding.
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.r#gen();
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}
