//! Handles GET /.well-known/oauth-authorization-server

use axum::{extract::State, response::Json};
use serde_json::{Value, json};

use super::context::AppState;
use crate::oauth::{CodeChallengeMethod, GrantType, ResponseType};

/// OAuth 2.0 Authorization Server Metadata handler
/// GET /.well-known/oauth-authorization-server
///
/// Returns RFC 8414 metadata reflecting the enabled extensions.
pub async fn oauth_authorization_server_handler(State(state): State<AppState>) -> Json<Value> {
    let base = &state.config.external_base;
    let extensions = state.authorization_parser.extensions();

    let mut response_types = vec![ResponseType::Code.as_str()];
    let mut response_modes = vec!["query"];
    let mut grant_types = vec![
        GrantType::AuthorizationCode.as_str(),
        GrantType::ClientCredentials.as_str(),
        GrantType::RefreshToken.as_str(),
    ];
    if extensions.implicit().is_some() {
        response_types.push(ResponseType::Token.as_str());
        response_modes.push("fragment");
        grant_types.push("implicit");
    }

    let mut challenge_methods = vec![CodeChallengeMethod::S256.as_str()];
    if extensions.plain_challenge_allowed() {
        challenge_methods.push(CodeChallengeMethod::Plain.as_str());
    }

    Json(json!({
        "issuer": base.issuer(),
        "authorization_endpoint": base.endpoint("/oauth/authorize"),
        "token_endpoint": base.endpoint("/oauth/token"),
        "response_types_supported": response_types,
        "response_modes_supported": response_modes,
        "grant_types_supported": grant_types,
        "code_challenge_methods_supported": challenge_methods,
        "token_endpoint_auth_methods_supported": ["none"],
    }))
}
