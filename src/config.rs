//! Environment-based configuration types for the authorization server.

use anyhow::Result;
use http::HeaderName;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::errors::ConfigError;
use crate::oauth::extension::Extensions;
use crate::oauth::registration::ClientDefaults;

/// HTTP server port configuration
#[derive(Clone)]
pub struct HttpPort(u16);

/// Issuer identifier and base for published endpoint URLs
#[derive(Clone, Debug)]
pub struct ExternalBase(Url);

/// Protocol extensions enabled for this deployment
#[derive(Clone, Debug)]
pub struct OAuthExtensions(Extensions);

/// Default authorization code lifetime
#[derive(Clone, Debug)]
pub struct AuthorizationCodeLifetime(chrono::Duration);

/// Default access token lifetime
#[derive(Clone)]
pub struct AccessTokenLifetime(chrono::Duration);

/// Default refresh token lifetime
#[derive(Clone)]
pub struct RefreshTokenLifetime(chrono::Duration);

/// Interval between sweeps of expired store entries
#[derive(Clone)]
pub struct StoreCleanupInterval(Duration);

/// Request header carrying the authenticated resource owner
#[derive(Clone)]
pub struct TrustedSubjectHeader(HeaderName);

/// Where access-token signing key material comes from
#[derive(Clone)]
pub enum SigningKeySource {
    /// PEM encoded RSA or EC private key on disk
    PemFile(PathBuf),
    /// Shared HMAC secret
    Secret(String),
    /// Random HMAC secret generated at startup
    Ephemeral,
}

/// Main application configuration
#[derive(Clone)]
pub struct Config {
    pub version: String,
    pub http_port: HttpPort,
    pub external_base: ExternalBase,
    pub extensions: OAuthExtensions,
    pub clients_file: Option<PathBuf>,
    pub signing_key: SigningKeySource,
    pub signing_key_id: String,
    pub authorization_code_lifetime: AuthorizationCodeLifetime,
    pub access_token_lifetime: AccessTokenLifetime,
    pub refresh_token_lifetime: RefreshTokenLifetime,
    pub store_cleanup_interval: StoreCleanupInterval,
    pub trusted_subject_header: TrustedSubjectHeader,
}

impl Config {
    /// Create a new configuration from environment variables
    pub fn new() -> Result<Self> {
        let http_port: HttpPort = default_env("HTTP_PORT", "8080").try_into()?;
        let external_base: ExternalBase = require_env("EXTERNAL_BASE")?.try_into()?;
        let extensions: OAuthExtensions = optional_env("OAUTH_EXTENSIONS").try_into()?;
        let clients_file = optional_env("OAUTH_CLIENTS_FILE").map(PathBuf::from);
        let signing_key = match (
            optional_env("OAUTH_SIGNING_KEY_FILE"),
            optional_env("OAUTH_SIGNING_SECRET"),
        ) {
            (Some(path), _) => SigningKeySource::PemFile(PathBuf::from(path)),
            (None, Some(secret)) if !secret.is_empty() => SigningKeySource::Secret(secret),
            _ => SigningKeySource::Ephemeral,
        };
        let signing_key_id = default_env("OAUTH_SIGNING_KEY_ID", "oauth21");
        let authorization_code_lifetime: AuthorizationCodeLifetime =
            default_env("AUTHORIZATION_CODE_LIFETIME", "60s").try_into()?;
        let access_token_lifetime: AccessTokenLifetime =
            default_env("ACCESS_TOKEN_LIFETIME", "1h").try_into()?;
        let refresh_token_lifetime: RefreshTokenLifetime =
            default_env("REFRESH_TOKEN_LIFETIME", "14d").try_into()?;
        let store_cleanup_interval: StoreCleanupInterval =
            default_env("STORE_CLEANUP_INTERVAL", "5m").try_into()?;
        let trusted_subject_header: TrustedSubjectHeader =
            default_env("TRUSTED_SUBJECT_HEADER", "x-authenticated-user").try_into()?;

        Ok(Self {
            version: version()?,
            http_port,
            external_base,
            extensions,
            clients_file,
            signing_key,
            signing_key_id,
            authorization_code_lifetime,
            access_token_lifetime,
            refresh_token_lifetime,
            store_cleanup_interval,
            trusted_subject_header,
        })
    }

    /// Lifetimes applied to static clients that do not set their own.
    pub fn client_defaults(&self) -> ClientDefaults {
        ClientDefaults {
            authorization_code_lifetime_seconds: self.authorization_code_lifetime.0.num_seconds(),
            access_token_lifetime_seconds: self.access_token_lifetime.0.num_seconds(),
            refresh_token_lifetime_seconds: self.refresh_token_lifetime.0.num_seconds(),
        }
    }
}

/// Get application version from build environment
pub fn version() -> Result<String> {
    option_env!("GIT_HASH")
        .or(option_env!("CARGO_PKG_VERSION"))
        .map(|val| val.to_string())
        .ok_or(ConfigError::VersionNotSet.into())
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| ConfigError::EnvVarRequired(name.to_string()).into())
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn default_env(name: &str, default_value: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default_value.to_string())
}

fn parse_duration(value: String) -> Result<chrono::Duration> {
    let duration = duration_str::parse(&value)
        .map_err(|e| ConfigError::DurationParsingFailed(value, e.to_string()))?;
    Ok(chrono::Duration::from_std(duration)?)
}

impl TryFrom<String> for HttpPort {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Ok(Self(8080))
        } else {
            value
                .parse::<u16>()
                .map(Self)
                .map_err(|err| ConfigError::PortParsingFailed(err).into())
        }
    }
}

impl AsRef<u16> for HttpPort {
    fn as_ref(&self) -> &u16 {
        &self.0
    }
}

impl TryFrom<String> for ExternalBase {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let url = Url::parse(&value)
            .map_err(|e| ConfigError::ExternalBaseInvalid(value.clone(), e.to_string()))?;
        if url.host_str().is_none() {
            return Err(
                ConfigError::ExternalBaseInvalid(value, "missing host".to_string()).into(),
            );
        }
        Ok(Self(url))
    }
}

impl ExternalBase {
    /// The issuer identifier, without a trailing slash.
    pub fn issuer(&self) -> String {
        self.0.as_str().trim_end_matches('/').to_string()
    }

    /// An absolute endpoint URL below the issuer.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.issuer(), path)
    }
}

impl AsRef<Url> for ExternalBase {
    fn as_ref(&self) -> &Url {
        &self.0
    }
}

impl TryFrom<Option<String>> for OAuthExtensions {
    type Error = anyhow::Error;

    fn try_from(value: Option<String>) -> Result<Self, Self::Error> {
        let value = value.unwrap_or_default();
        let extensions: Extensions = value.parse().map_err(ConfigError::ExtensionsInvalid)?;
        Ok(Self(extensions))
    }
}

impl TryFrom<String> for OAuthExtensions {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(Some(value))
    }
}

impl AsRef<Extensions> for OAuthExtensions {
    fn as_ref(&self) -> &Extensions {
        &self.0
    }
}

impl TryFrom<String> for AuthorizationCodeLifetime {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_duration(value).map(Self)
    }
}

impl AsRef<chrono::Duration> for AuthorizationCodeLifetime {
    fn as_ref(&self) -> &chrono::Duration {
        &self.0
    }
}

impl TryFrom<String> for AccessTokenLifetime {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_duration(value).map(Self)
    }
}

impl AsRef<chrono::Duration> for AccessTokenLifetime {
    fn as_ref(&self) -> &chrono::Duration {
        &self.0
    }
}

impl TryFrom<String> for RefreshTokenLifetime {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_duration(value).map(Self)
    }
}

impl AsRef<chrono::Duration> for RefreshTokenLifetime {
    fn as_ref(&self) -> &chrono::Duration {
        &self.0
    }
}

impl TryFrom<String> for StoreCleanupInterval {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let duration = duration_str::parse(&value)
            .map_err(|e| ConfigError::DurationParsingFailed(value, e.to_string()))?;
        Ok(Self(duration))
    }
}

impl AsRef<Duration> for StoreCleanupInterval {
    fn as_ref(&self) -> &Duration {
        &self.0
    }
}

impl TryFrom<String> for TrustedSubjectHeader {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        HeaderName::try_from(value.as_str())
            .map(Self)
            .map_err(|_| ConfigError::HeaderNameInvalid(value).into())
    }
}

impl AsRef<HeaderName> for TrustedSubjectHeader {
    fn as_ref(&self) -> &HeaderName {
        &self.0
    }
}
