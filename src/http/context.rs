//! Application state shared by the HTTP handlers.

use std::sync::Arc;

use crate::config::Config;
use crate::oauth::{
    AuthorizationRequestParser, IssuerBundle, RegistrationAuthority, TokenRequestParser,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Registered clients
    pub registry: Arc<dyn RegistrationAuthority>,
    /// Code, refresh token and access token issuance
    pub issuers: IssuerBundle,
    pub authorization_parser: AuthorizationRequestParser,
    pub token_parser: TokenRequestParser,
}

impl AppState {
    /// Build the state, configuring the authorization parser with the
    /// deployment's extensions.
    pub fn new(
        config: Arc<Config>,
        registry: Arc<dyn RegistrationAuthority>,
        issuers: IssuerBundle,
    ) -> Self {
        let authorization_parser =
            AuthorizationRequestParser::new(config.extensions.as_ref().clone());
        Self {
            config,
            registry,
            issuers,
            authorization_parser,
            token_parser: TokenRequestParser::new(),
        }
    }
}
