//! Authorization artifacts and the backends that issue and redeem them.
//!
//! An [`IssuerBundle`] pairs an [`AuthorizationAuthority`] (authorization
//! codes and refresh tokens) with an [`AccessTokenIssuer`]. The built-in
//! [`RandomCodeAuthorizationAuthority`] keeps artifacts in a [`DataStore`]
//! and relies on its first-read marker to reject replays.

use async_trait::async_trait;
use base64::prelude::*;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{collections::BTreeMap, sync::Arc};
use url::Url;

use super::access_token::AccessTokenIssuer;
use super::registration::{ClientRegistration, UserRegistration};
use super::types::{
    AccessTokenPayload, AuthorizationCodePayload, OAuthFailure, PkceInfo, generate_token,
};
use crate::errors::IssuerError;
use crate::storage::{DataStore, Entry};

/// The grant a resource owner approved, independent of how it is carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSpec {
    pub client_id: String,
    pub audience: String,
    pub sub: String,
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Custom claims and the space-joined `groups` claim
    #[serde(default)]
    pub claims: BTreeMap<String, String>,
}

impl TokenSpec {
    /// Assemble a token spec for `user`, checking `scopes` against the client.
    pub fn new(
        client: &dyn ClientRegistration,
        user: &dyn UserRegistration,
        scopes: Vec<String>,
        nonce: Option<String>,
    ) -> Result<Self, OAuthFailure> {
        let audience = client
            .validate_scopes_and_get_audience(&scopes)
            .ok_or_else(|| OAuthFailure::invalid_scope("scopes not authorized"))?;

        let mut claims = user.custom_claims();
        if !user.groups().is_empty() {
            claims.insert("groups".to_string(), user.groups().join(" "));
        }

        Ok(Self {
            client_id: client.client_id().to_string(),
            audience,
            sub: user.sub().to_string(),
            scopes,
            nonce,
            claims,
        })
    }

    /// Re-check these scopes against the client's current policy,
    /// refreshing the audience.
    pub fn revalidate(mut self, client: &dyn ClientRegistration) -> Result<Self, OAuthFailure> {
        self.audience = client
            .validate_scopes_and_get_audience(&self.scopes)
            .ok_or_else(|| OAuthFailure::invalid_scope("scopes not authorized"))?;
        Ok(self)
    }
}

/// What an authorization code stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationArtifact {
    #[serde(flatten)]
    pub spec: TokenSpec,
    pub redirect_uri: Url,
    pub redirect_uri_provided: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkce: Option<PkceInfo>,
}

/// A request to mint one access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessTokenOrder {
    pub spec: TokenSpec,
    pub expires_in_seconds: i64,
}

/// Which kind of artifact a replay was detected on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    AuthorizationCode,
    RefreshToken,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
        }
    }

    fn key_prefix(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "code",
            Self::RefreshToken => "refresh",
        }
    }
}

/// Notified when an already-redeemed code or refresh token is presented
/// again. Implementations may revoke whatever was issued on first use.
pub trait ReplayObserver: Send + Sync {
    fn replay_detected(&self, kind: ArtifactKind, spec: &TokenSpec);
}

/// Replay observer that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingReplayObserver;

impl ReplayObserver for LoggingReplayObserver {
    fn replay_detected(&self, kind: ArtifactKind, spec: &TokenSpec) {
        tracing::warn!(
            kind = kind.as_str(),
            client_id = %spec.client_id,
            sub = %spec.sub,
            "replayed artifact rejected"
        );
    }
}

/// Issues and redeems authorization codes and refresh tokens.
///
/// Redemption returns `Ok(None)` for anything that must be rejected: unknown,
/// expired and already-redeemed values are indistinguishable to callers.
#[async_trait]
pub trait AuthorizationAuthority: Send + Sync {
    async fn issue_authorization_code(
        &self,
        artifact: &AuthorizationArtifact,
        expiry: DateTime<Utc>,
    ) -> Result<AuthorizationCodePayload, IssuerError>;

    async fn verify_authorization_code(
        &self,
        code: &str,
    ) -> Result<Option<AuthorizationArtifact>, IssuerError>;

    async fn issue_refresh_token(
        &self,
        spec: &TokenSpec,
        expiry: DateTime<Utc>,
    ) -> Result<String, IssuerError>;

    async fn verify_refresh_token(&self, token: &str) -> Result<Option<TokenSpec>, IssuerError>;
}

/// An authority that refuses every operation.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledAuthorizationAuthority;

#[async_trait]
impl AuthorizationAuthority for DisabledAuthorizationAuthority {
    async fn issue_authorization_code(
        &self,
        _artifact: &AuthorizationArtifact,
        _expiry: DateTime<Utc>,
    ) -> Result<AuthorizationCodePayload, IssuerError> {
        Err(IssuerError::Disabled("issuance of authorization codes"))
    }

    async fn verify_authorization_code(
        &self,
        _code: &str,
    ) -> Result<Option<AuthorizationArtifact>, IssuerError> {
        Err(IssuerError::Disabled("verification of authorization codes"))
    }

    async fn issue_refresh_token(
        &self,
        _spec: &TokenSpec,
        _expiry: DateTime<Utc>,
    ) -> Result<String, IssuerError> {
        Err(IssuerError::Disabled("issuance of refresh tokens"))
    }

    async fn verify_refresh_token(&self, _token: &str) -> Result<Option<TokenSpec>, IssuerError> {
        Err(IssuerError::Disabled("verification of refresh tokens"))
    }
}

/// Issues random 32-byte codes and refresh tokens backed by a [`DataStore`].
///
/// Entries are keyed by a SHA-256 digest of the issued value, so the store
/// never holds a redeemable secret.
pub struct RandomCodeAuthorizationAuthority {
    store: Arc<dyn DataStore>,
    observer: Arc<dyn ReplayObserver>,
}

impl RandomCodeAuthorizationAuthority {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            observer: Arc::new(LoggingReplayObserver),
        }
    }

    pub fn with_replay_observer(mut self, observer: Arc<dyn ReplayObserver>) -> Self {
        self.observer = observer;
        self
    }

    fn storage_key(kind: ArtifactKind, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(value.as_bytes());
        format!(
            "{}:{}",
            kind.key_prefix(),
            BASE64_URL_SAFE_NO_PAD.encode(hasher.finalize())
        )
    }

    async fn issue<T: Serialize + Sync>(
        &self,
        kind: ArtifactKind,
        content: &T,
        expiry: DateTime<Utc>,
    ) -> Result<String, IssuerError> {
        let value = generate_token();
        let serialized =
            serde_json::to_string(content).map_err(|e| IssuerError::Serialization(e.to_string()))?;
        self.store
            .put(&Self::storage_key(kind, &value), Entry::new(serialized, expiry))
            .await?;
        Ok(value)
    }

    /// Read an artifact once. Returns the artifact and whether this was the
    /// first redemption.
    async fn redeem<T: for<'de> Deserialize<'de>>(
        &self,
        kind: ArtifactKind,
        value: &str,
    ) -> Result<Option<(T, bool)>, IssuerError> {
        let Some(entry) = self.store.get(&Self::storage_key(kind, value)).await? else {
            return Ok(None);
        };
        let content: T = serde_json::from_str(&entry.value)
            .map_err(|e| IssuerError::Serialization(e.to_string()))?;
        Ok(Some((content, entry.access_count.is_first())))
    }
}

#[async_trait]
impl AuthorizationAuthority for RandomCodeAuthorizationAuthority {
    async fn issue_authorization_code(
        &self,
        artifact: &AuthorizationArtifact,
        expiry: DateTime<Utc>,
    ) -> Result<AuthorizationCodePayload, IssuerError> {
        let code = self
            .issue(ArtifactKind::AuthorizationCode, artifact, expiry)
            .await?;
        Ok(AuthorizationCodePayload { code })
    }

    async fn verify_authorization_code(
        &self,
        code: &str,
    ) -> Result<Option<AuthorizationArtifact>, IssuerError> {
        match self
            .redeem::<AuthorizationArtifact>(ArtifactKind::AuthorizationCode, code)
            .await?
        {
            None => Ok(None),
            Some((artifact, true)) => Ok(Some(artifact)),
            Some((artifact, false)) => {
                self.observer
                    .replay_detected(ArtifactKind::AuthorizationCode, &artifact.spec);
                Ok(None)
            }
        }
    }

    async fn issue_refresh_token(
        &self,
        spec: &TokenSpec,
        expiry: DateTime<Utc>,
    ) -> Result<String, IssuerError> {
        self.issue(ArtifactKind::RefreshToken, spec, expiry).await
    }

    async fn verify_refresh_token(&self, token: &str) -> Result<Option<TokenSpec>, IssuerError> {
        match self
            .redeem::<TokenSpec>(ArtifactKind::RefreshToken, token)
            .await?
        {
            None => Ok(None),
            Some((spec, true)) => Ok(Some(spec)),
            Some((spec, false)) => {
                self.observer
                    .replay_detected(ArtifactKind::RefreshToken, &spec);
                Ok(None)
            }
        }
    }
}

/// Absolute expiry `lifetime_seconds` after `now`.
///
/// Non-positive lifetimes and instants past chrono's range are rejected.
pub fn expiry_after(
    now: DateTime<Utc>,
    lifetime_seconds: i64,
) -> Result<DateTime<Utc>, IssuerError> {
    if lifetime_seconds <= 0 {
        return Err(IssuerError::LifetimeOutOfRange(lifetime_seconds));
    }
    Duration::try_seconds(lifetime_seconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or(IssuerError::LifetimeOutOfRange(lifetime_seconds))
}

/// The pair of backends used by the grant steps.
#[derive(Clone)]
pub struct IssuerBundle {
    authority: Arc<dyn AuthorizationAuthority>,
    access: Arc<dyn AccessTokenIssuer>,
}

impl IssuerBundle {
    pub fn new(
        authority: Arc<dyn AuthorizationAuthority>,
        access: Arc<dyn AccessTokenIssuer>,
    ) -> Self {
        Self { authority, access }
    }

    /// A bundle that can only mint access tokens directly (implicit and
    /// client credentials grants).
    pub fn without_authorization(access: Arc<dyn AccessTokenIssuer>) -> Self {
        Self::new(Arc::new(DisabledAuthorizationAuthority), access)
    }

    pub fn authority(&self) -> &dyn AuthorizationAuthority {
        self.authority.as_ref()
    }

    pub fn issue_access_token(
        &self,
        order: &AccessTokenOrder,
    ) -> Result<AccessTokenPayload, IssuerError> {
        self.access.issue_access_token(order)
    }
}
