//! Client and user registration contracts.
//!
//! How clients are persisted is up to the embedding application; the protocol
//! core only needs [`RegistrationAuthority::lookup_client`]. A static,
//! in-memory registry is provided for configuration-file driven deployments
//! and tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, collections::HashMap, fmt::Debug, path::Path, sync::Arc};
use url::Url;

use crate::errors::{ConfigError, StorageError};

/// Default authorization code lifetime in seconds
pub const DEFAULT_AUTHORIZATION_CODE_LIFETIME_SECONDS: i64 = 60;

/// Default access token lifetime in seconds
pub const DEFAULT_ACCESS_TOKEN_LIFETIME_SECONDS: i64 = 3600;

/// Default refresh token lifetime in seconds
pub const DEFAULT_REFRESH_TOKEN_LIFETIME_SECONDS: i64 = 14 * 24 * 3600;

/// Upper bound for authorization code lifetimes
pub const MAX_AUTHORIZATION_CODE_LIFETIME_SECONDS: i64 = 600;

/// Upper bound for access and refresh token lifetimes
pub const MAX_TOKEN_LIFETIME_SECONDS: i64 = 366 * 24 * 3600;

/// A registered OAuth client.
pub trait ClientRegistration: Debug + Send + Sync {
    fn client_id(&self) -> &str;

    /// Scopes used when an authorization request omits `scope`.
    fn default_scopes(&self) -> Option<&[String]>;

    fn allowed_redirect_uris(&self) -> &[Url];

    /// Decide whether `scopes` may be granted to this client, returning the
    /// token audience when they may.
    fn validate_scopes_and_get_audience(&self, scopes: &[String]) -> Option<String>;

    fn authorization_code_lifetime_seconds(&self) -> i64 {
        DEFAULT_AUTHORIZATION_CODE_LIFETIME_SECONDS
    }

    fn access_token_lifetime_seconds(&self) -> i64;

    /// Lifetime of refresh tokens issued alongside access tokens, or `None`
    /// when the client does not receive refresh tokens.
    fn refresh_token_lifetime_seconds(&self) -> Option<i64> {
        None
    }

    /// The identity this client acts as for the `client_credentials` grant.
    fn as_user(&self) -> Option<&dyn UserRegistration> {
        None
    }
}

/// A resource owner (or a client acting on its own behalf).
pub trait UserRegistration: Debug + Send + Sync {
    fn sub(&self) -> &str;

    fn groups(&self) -> &[String] {
        &[]
    }

    fn custom_claims(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// Trait for looking up registered clients
#[async_trait]
pub trait RegistrationAuthority: Send + Sync {
    /// Retrieve a client by ID
    async fn lookup_client(
        &self,
        client_id: &str,
    ) -> Result<Option<Arc<dyn ClientRegistration>>, StorageError>;
}

/// A plain user identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleUser {
    /// Subject identifier
    pub sub: String,
    /// Group memberships, emitted as a space-joined `groups` claim
    #[serde(default)]
    pub groups: Vec<String>,
    /// Extra claims copied into issued access tokens
    #[serde(default)]
    pub custom_claims: BTreeMap<String, String>,
}

impl SimpleUser {
    pub fn new(sub: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            groups: Vec::new(),
            custom_claims: BTreeMap::new(),
        }
    }
}

impl UserRegistration for SimpleUser {
    fn sub(&self) -> &str {
        &self.sub
    }

    fn groups(&self) -> &[String] {
        &self.groups
    }

    fn custom_claims(&self) -> BTreeMap<String, String> {
        self.custom_claims.clone()
    }
}

/// A client described entirely by data, typically loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticClient {
    /// Unique client identifier
    pub client_id: String,
    /// Registered redirect URIs
    #[serde(default)]
    pub redirect_uris: Vec<Url>,
    /// Scopes used when a request omits `scope`
    #[serde(default)]
    pub default_scopes: Option<Vec<String>>,
    /// Every scope this client may be granted
    #[serde(default)]
    pub allowed_scopes: Vec<String>,
    /// Audience written into access tokens
    pub audience: String,
    /// Authorization code lifetime override
    #[serde(default)]
    pub authorization_code_lifetime_seconds: Option<i64>,
    /// Access token lifetime override
    #[serde(default)]
    pub access_token_lifetime_seconds: Option<i64>,
    /// Whether refresh tokens are issued with access tokens
    #[serde(default)]
    pub issue_refresh_tokens: bool,
    /// Refresh token lifetime override
    #[serde(default)]
    pub refresh_token_lifetime_seconds: Option<i64>,
    /// Identity used for the `client_credentials` grant
    #[serde(default)]
    pub service_account: Option<SimpleUser>,
}

impl StaticClient {
    pub fn new(client_id: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uris: Vec::new(),
            default_scopes: None,
            allowed_scopes: Vec::new(),
            audience: audience.into(),
            authorization_code_lifetime_seconds: None,
            access_token_lifetime_seconds: None,
            issue_refresh_tokens: false,
            refresh_token_lifetime_seconds: None,
            service_account: None,
        }
    }

    pub fn with_redirect_uri(mut self, uri: Url) -> Self {
        self.redirect_uris.push(uri);
        self
    }

    /// Set the default scopes, also allowing each of them.
    pub fn with_default_scopes(mut self, scopes: &[&str]) -> Self {
        let scopes: Vec<String> = scopes.iter().map(|s| s.to_string()).collect();
        for scope in &scopes {
            if !self.allowed_scopes.contains(scope) {
                self.allowed_scopes.push(scope.clone());
            }
        }
        self.default_scopes = Some(scopes);
        self
    }

    pub fn with_allowed_scope(mut self, scope: impl Into<String>) -> Self {
        self.allowed_scopes.push(scope.into());
        self
    }

    pub fn with_refresh_tokens(mut self) -> Self {
        self.issue_refresh_tokens = true;
        self
    }

    pub fn with_service_account(mut self, user: SimpleUser) -> Self {
        self.service_account = Some(user);
        self
    }

    /// Fill unset lifetimes from deployment-wide defaults.
    pub fn apply_defaults(&mut self, defaults: &ClientDefaults) {
        self.authorization_code_lifetime_seconds
            .get_or_insert(defaults.authorization_code_lifetime_seconds);
        self.access_token_lifetime_seconds
            .get_or_insert(defaults.access_token_lifetime_seconds);
        self.refresh_token_lifetime_seconds
            .get_or_insert(defaults.refresh_token_lifetime_seconds);
    }

    /// Check that every configured lifetime is positive and bounded.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let lifetimes = [
            (
                "authorization_code_lifetime_seconds",
                self.authorization_code_lifetime_seconds,
                MAX_AUTHORIZATION_CODE_LIFETIME_SECONDS,
            ),
            (
                "access_token_lifetime_seconds",
                self.access_token_lifetime_seconds,
                MAX_TOKEN_LIFETIME_SECONDS,
            ),
            (
                "refresh_token_lifetime_seconds",
                self.refresh_token_lifetime_seconds,
                MAX_TOKEN_LIFETIME_SECONDS,
            ),
        ];
        for (name, value, max) in lifetimes {
            if let Some(value) = value.filter(|value| !(1..=max).contains(value)) {
                return Err(ConfigError::ClientRegistrationInvalid(format!(
                    "client '{}': {name} must be between 1 and {max}, got {value}",
                    self.client_id
                )));
            }
        }
        Ok(())
    }
}

impl ClientRegistration for StaticClient {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn default_scopes(&self) -> Option<&[String]> {
        self.default_scopes.as_deref()
    }

    fn allowed_redirect_uris(&self) -> &[Url] {
        &self.redirect_uris
    }

    fn validate_scopes_and_get_audience(&self, scopes: &[String]) -> Option<String> {
        if scopes.is_empty() || !scopes.iter().all(|s| self.allowed_scopes.contains(s)) {
            return None;
        }
        Some(self.audience.clone())
    }

    fn authorization_code_lifetime_seconds(&self) -> i64 {
        self.authorization_code_lifetime_seconds
            .unwrap_or(DEFAULT_AUTHORIZATION_CODE_LIFETIME_SECONDS)
    }

    fn access_token_lifetime_seconds(&self) -> i64 {
        self.access_token_lifetime_seconds
            .unwrap_or(DEFAULT_ACCESS_TOKEN_LIFETIME_SECONDS)
    }

    fn refresh_token_lifetime_seconds(&self) -> Option<i64> {
        self.issue_refresh_tokens.then(|| {
            self.refresh_token_lifetime_seconds
                .unwrap_or(DEFAULT_REFRESH_TOKEN_LIFETIME_SECONDS)
        })
    }

    fn as_user(&self) -> Option<&dyn UserRegistration> {
        self.service_account
            .as_ref()
            .map(|user| user as &dyn UserRegistration)
    }
}

/// A client that may only be granted one scope, which doubles as the token
/// audience.
#[derive(Debug, Clone)]
pub struct SingleScopeClient {
    client_id: String,
    redirect_uris: Vec<Url>,
    scope: Vec<String>,
    access_token_lifetime_seconds: i64,
}

impl SingleScopeClient {
    pub fn new(
        client_id: impl Into<String>,
        redirect_uris: Vec<Url>,
        scope: impl Into<String>,
        access_token_lifetime_seconds: i64,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uris,
            scope: vec![scope.into()],
            access_token_lifetime_seconds,
        }
    }
}

impl ClientRegistration for SingleScopeClient {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn default_scopes(&self) -> Option<&[String]> {
        Some(&self.scope)
    }

    fn allowed_redirect_uris(&self) -> &[Url] {
        &self.redirect_uris
    }

    fn validate_scopes_and_get_audience(&self, scopes: &[String]) -> Option<String> {
        (scopes == self.scope.as_slice()).then(|| self.scope[0].clone())
    }

    fn access_token_lifetime_seconds(&self) -> i64 {
        self.access_token_lifetime_seconds
    }
}

/// Deployment-wide lifetimes applied to clients that do not set their own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientDefaults {
    pub authorization_code_lifetime_seconds: i64,
    pub access_token_lifetime_seconds: i64,
    pub refresh_token_lifetime_seconds: i64,
}

impl Default for ClientDefaults {
    fn default() -> Self {
        Self {
            authorization_code_lifetime_seconds: DEFAULT_AUTHORIZATION_CODE_LIFETIME_SECONDS,
            access_token_lifetime_seconds: DEFAULT_ACCESS_TOKEN_LIFETIME_SECONDS,
            refresh_token_lifetime_seconds: DEFAULT_REFRESH_TOKEN_LIFETIME_SECONDS,
        }
    }
}

/// In-memory client registry
#[derive(Debug, Default, Clone)]
pub struct MemoryRegistrationAuthority {
    clients: HashMap<String, Arc<dyn ClientRegistration>>,
}

impl MemoryRegistrationAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client, replacing any client with the same ID.
    pub fn register(&mut self, client: Arc<dyn ClientRegistration>) {
        self.clients.insert(client.client_id().to_string(), client);
    }

    pub fn with(mut self, client: impl ClientRegistration + 'static) -> Self {
        self.register(Arc::new(client));
        self
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Build a registry from a JSON array of [`StaticClient`] records.
    ///
    /// Records with out-of-range lifetimes or a repeated `client_id` are
    /// rejected.
    pub fn from_json(json: &str, defaults: &ClientDefaults) -> Result<Self, ConfigError> {
        let records: Vec<StaticClient> = serde_json::from_str(json)
            .map_err(|e| ConfigError::ClientRegistrationInvalid(e.to_string()))?;
        let mut registry = Self::new();
        for mut record in records {
            if registry.clients.contains_key(&record.client_id) {
                return Err(ConfigError::ClientRegistrationInvalid(format!(
                    "client '{}' registered more than once",
                    record.client_id
                )));
            }
            record.apply_defaults(defaults);
            record.validate()?;
            registry.register(Arc::new(record));
        }
        Ok(registry)
    }

    /// Load a registry from a JSON file on disk.
    pub async fn load_file(path: &Path, defaults: &ClientDefaults) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::ClientsFileInvalid(display.clone(), e.to_string()))?;
        Self::from_json(&json, defaults)
            .map_err(|e| ConfigError::ClientsFileInvalid(display, e.to_string()))
    }
}

#[async_trait]
impl RegistrationAuthority for MemoryRegistrationAuthority {
    async fn lookup_client(
        &self,
        client_id: &str,
    ) -> Result<Option<Arc<dyn ClientRegistration>>, StorageError> {
        Ok(self.clients.get(client_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scopes(s: &[&str]) -> Vec<String> {
        s.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_static_client_scope_validation() {
        let client = StaticClient::new("robert", "https://api.example.com")
            .with_default_scopes(&["ascope", "anotherscope"]);

        assert_eq!(
            client.validate_scopes_and_get_audience(&scopes(&["ascope"])),
            Some("https://api.example.com".to_string())
        );
        assert_eq!(
            client.validate_scopes_and_get_audience(&scopes(&["ascope", "admin"])),
            None
        );
        assert_eq!(client.validate_scopes_and_get_audience(&[]), None);
    }

    #[test]
    fn test_single_scope_client() {
        let client = SingleScopeClient::new("svc", vec![], "reports", 300);

        assert_eq!(
            client.validate_scopes_and_get_audience(&scopes(&["reports"])),
            Some("reports".to_string())
        );
        assert_eq!(
            client.validate_scopes_and_get_audience(&scopes(&["reports", "other"])),
            None
        );
        assert_eq!(client.default_scopes(), Some(&scopes(&["reports"])[..]));
        assert_eq!(client.authorization_code_lifetime_seconds(), 60);
    }

    #[test]
    fn test_refresh_token_lifetime_requires_opt_in() {
        let client = StaticClient::new("c", "aud");
        assert_eq!(client.refresh_token_lifetime_seconds(), None);

        let client = client.with_refresh_tokens();
        assert_eq!(
            client.refresh_token_lifetime_seconds(),
            Some(DEFAULT_REFRESH_TOKEN_LIFETIME_SECONDS)
        );
    }

    #[tokio::test]
    async fn test_registry_from_json_applies_defaults() {
        let json = r#"[
            {
                "client_id": "robert",
                "redirect_uris": ["https://example.com/redirect_endpoint"],
                "default_scopes": ["ascope", "anotherscope"],
                "allowed_scopes": ["ascope", "anotherscope"],
                "audience": "https://api.example.com",
                "access_token_lifetime_seconds": 120
            },
            {
                "client_id": "svc",
                "audience": "svc-api",
                "allowed_scopes": ["jobs"],
                "service_account": {"sub": "svc-account", "groups": ["ops"]}
            }
        ]"#;
        let defaults = ClientDefaults {
            authorization_code_lifetime_seconds: 30,
            access_token_lifetime_seconds: 900,
            refresh_token_lifetime_seconds: 3600,
        };
        let registry = MemoryRegistrationAuthority::from_json(json, &defaults).unwrap();
        assert_eq!(registry.len(), 2);

        let robert = registry.lookup_client("robert").await.unwrap().unwrap();
        assert_eq!(robert.access_token_lifetime_seconds(), 120);
        assert_eq!(robert.authorization_code_lifetime_seconds(), 30);
        assert!(robert.as_user().is_none());

        let svc = registry.lookup_client("svc").await.unwrap().unwrap();
        assert_eq!(svc.access_token_lifetime_seconds(), 900);
        let user = svc.as_user().unwrap();
        assert_eq!(user.sub(), "svc-account");
        assert_eq!(user.groups(), ["ops"]);

        assert!(registry.lookup_client("nobody").await.unwrap().is_none());
    }

    #[test]
    fn test_registry_rejects_duplicate_client_ids() {
        let json = r#"[
            {"client_id": "robert", "audience": "a", "allowed_scopes": ["ascope"]},
            {"client_id": "robert", "audience": "b", "allowed_scopes": ["admin"]}
        ]"#;
        let err = MemoryRegistrationAuthority::from_json(json, &ClientDefaults::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::ClientRegistrationInvalid(_)));
        assert!(err.to_string().contains("client 'robert' registered more than once"));
    }

    #[test]
    fn test_registry_rejects_out_of_range_lifetimes() {
        for (field, value) in [
            ("authorization_code_lifetime_seconds", "100000000000000"),
            ("authorization_code_lifetime_seconds", "601"),
            ("access_token_lifetime_seconds", "0"),
            ("access_token_lifetime_seconds", "-3600"),
            ("refresh_token_lifetime_seconds", "9223372036854775807"),
        ] {
            let json = format!(
                r#"[{{"client_id": "c", "audience": "a", "{field}": {value}}}]"#
            );
            let err = MemoryRegistrationAuthority::from_json(&json, &ClientDefaults::default())
                .unwrap_err();
            assert!(
                err.to_string().contains(field),
                "{field}={value} accepted: {err}"
            );
        }

        let json = r#"[{"client_id": "c", "audience": "a", "authorization_code_lifetime_seconds": 600}]"#;
        assert!(MemoryRegistrationAuthority::from_json(json, &ClientDefaults::default()).is_ok());
    }

    #[test]
    fn test_out_of_range_defaults_are_rejected() {
        let defaults = ClientDefaults {
            authorization_code_lifetime_seconds: 3600,
            ..ClientDefaults::default()
        };
        let json = r#"[{"client_id": "c", "audience": "a"}]"#;
        assert!(matches!(
            MemoryRegistrationAuthority::from_json(json, &defaults),
            Err(ConfigError::ClientRegistrationInvalid(_))
        ));
    }
}
