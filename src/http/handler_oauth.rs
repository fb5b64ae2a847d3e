//! Handles GET /oauth/authorize and POST /oauth/token

use axum::{
    body::Bytes,
    extract::{RawQuery, State},
    http::{HeaderMap, header},
};

use super::context::AppState;
use crate::errors::HttpError;
use crate::oauth::{OAuthResponse, Params, SimpleUser};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// GET /oauth/authorize
///
/// Resource owner authentication happens upstream. A request carrying the
/// trusted subject header is granted for that subject; any other validated
/// request is denied.
pub async fn handle_oauth_authorize(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> OAuthResponse {
    let params = Params::parse(query.unwrap_or_default().as_bytes());

    let granter = match state
        .authorization_parser
        .parse(state.registry.as_ref(), &params)
        .await
    {
        Ok(granter) => granter,
        Err(response) => return response,
    };

    let subject = headers
        .get(state.config.trusted_subject_header.as_ref())
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    match subject {
        Some(sub) => {
            granter
                .grant(&state.issuers, &SimpleUser::new(sub))
                .await
        }
        None => {
            tracing::debug!(
                client_id = %granter.request().client_id(),
                "no authenticated subject on authorization request"
            );
            granter.deny(None)
        }
    }
}

/// POST /oauth/token
///
/// The form body is decoded by hand so that repeated parameters are kept and
/// rejected by the protocol layer.
pub async fn handle_oauth_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<OAuthResponse, HttpError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !is_form_content_type(content_type) {
        return Err(HttpError::BodyDecodingFailed(format!(
            "request body must be {FORM_CONTENT_TYPE}"
        )));
    }

    let params = Params::parse(&body);
    let response = match state
        .token_parser
        .parse(state.registry.as_ref(), &state.issuers, &params)
        .await
    {
        Ok(granter) => granter.grant(&state.issuers).await,
        Err(response) => response,
    };
    Ok(response)
}

/// Media types are case-insensitive; parameters such as `charset` are ignored.
fn is_form_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|media_type| media_type.eq_ignore_ascii_case(FORM_CONTENT_TYPE))
}
