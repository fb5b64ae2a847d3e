//! Standardized error types following the `error-oauth21-<domain>-<number>` format.

use axum::response::{IntoResponse, Response};
use http::StatusCode;
use thiserror::Error;

use crate::oauth::{OAuthFailure, OAuthResponse};

/// Configuration errors that occur during application startup
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error when a required environment variable is not set
    #[error("error-oauth21-config-1 {0} must be set")]
    EnvVarRequired(String),

    /// Error when PORT cannot be parsed
    #[error("error-oauth21-config-2 Parsing PORT into u16 failed: {0:?}")]
    PortParsingFailed(std::num::ParseIntError),

    /// Error when version information is not available
    #[error("error-oauth21-config-3 One of GIT_HASH or CARGO_PKG_VERSION must be set")]
    VersionNotSet,

    /// Error when duration string cannot be parsed
    #[error("error-oauth21-config-4 Failed to parse duration '{0}': {1}")]
    DurationParsingFailed(String, String),

    /// Error when a header name setting is not a valid HTTP header name
    #[error("error-oauth21-config-5 Invalid header name '{0}'")]
    HeaderNameInvalid(String),

    /// Error when the issuer base is not a usable URL
    #[error("error-oauth21-config-6 Invalid EXTERNAL_BASE '{0}': {1}")]
    ExternalBaseInvalid(String, String),

    /// Error when the static client file cannot be read or parsed
    #[error("error-oauth21-config-7 Failed to load clients from '{0}': {1}")]
    ClientsFileInvalid(String, String),

    /// Error when the signing key file cannot be read
    #[error("error-oauth21-config-8 Failed to read signing key '{0}': {1}")]
    SigningKeyUnreadable(String, String),

    /// Error when the configured extension list is invalid
    #[error("error-oauth21-config-9 Invalid OAUTH_EXTENSIONS: {0}")]
    ExtensionsInvalid(#[from] ExtensionError),

    /// Error when a static client record is rejected
    #[error("error-oauth21-config-10 Invalid client registration: {0}")]
    ClientRegistrationInvalid(String),
}

/// Errors raised while assembling the extension registry.
///
/// These are configuration mistakes made by the embedding program, never
/// request-time OAuth errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtensionError {
    /// The same extension kind was registered twice
    #[error("error-oauth21-extension-1 Extension registered more than once: {0}")]
    Duplicate(&'static str),

    /// An extension name did not match any known extension
    #[error("error-oauth21-extension-2 Unknown extension: {0}")]
    Unknown(String),
}

/// HTTP server errors
///
/// Rendered as an `invalid_request` JSON page so that clients of the token
/// endpoint always receive an OAuth error body.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Error when the request body cannot be decoded
    #[error("error-oauth21-http-1 Request body could not be decoded: {0}")]
    BodyDecodingFailed(String),
}

/// Errors produced by a JWT signer
#[derive(Debug, Error)]
pub enum SigningError {
    /// Error when key material cannot be loaded
    #[error("error-oauth21-signing-1 Invalid key material: {0}")]
    InvalidKey(String),

    /// Error when the signature cannot be produced
    #[error("error-oauth21-signing-2 Signing failed: {0}")]
    SigningFailed(String),
}

/// Errors raised by the code/token issuance backends
#[derive(Debug, Error)]
pub enum IssuerError {
    /// Issuance was explicitly disabled for this bundle
    #[error("error-oauth21-issuer-1 {0} explicitly disabled")]
    Disabled(&'static str),

    /// The backing store failed
    #[error("error-oauth21-issuer-2 Storage failure: {0}")]
    Storage(#[from] StorageError),

    /// The access token could not be signed
    #[error("error-oauth21-issuer-3 Access token signing failed: {0}")]
    Signing(#[from] SigningError),

    /// A stored artifact could not be (de)serialized
    #[error("error-oauth21-issuer-4 Artifact serialization failed: {0}")]
    Serialization(String),

    /// A lifetime was not positive or its expiry cannot be represented
    #[error("error-oauth21-issuer-5 Lifetime out of range: {0} seconds")]
    LifetimeOutOfRange(i64),
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Error when a lock guarding shared state is poisoned
    #[error("error-oauth21-storage-1 Lock poisoned: {0}")]
    LockPoisoned(String),

    /// Error when a backing registry cannot be consulted
    #[error("error-oauth21-storage-2 Lookup failed: {0}")]
    LookupFailed(String),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        tracing::error!(error = ?self, "request failed");
        match self {
            HttpError::BodyDecodingFailed(message) => OAuthResponse::json(
                StatusCode::BAD_REQUEST,
                &OAuthFailure::invalid_request(message).with_state(None),
            )
            .into_response(),
        }
    }
}
