//! Rendered protocol outcomes.

use axum::{
    Json,
    response::{IntoResponse, Response},
};
use http::{StatusCode, header};
use serde_json::{Map, Value};
use url::Url;

use super::writers::{JsonWriter, ParamWriter, RedirectEncoding, Writable};

/// Final outcome of an authorization or token endpoint call.
///
/// Both variants are sent with `Cache-Control: no-store`.
#[derive(Debug, Clone, PartialEq)]
pub enum OAuthResponse {
    /// `302 Found` to a trusted redirect URI
    Redirect { location: Url },
    /// JSON body with the given status
    JsonPage {
        status: StatusCode,
        body: Map<String, Value>,
    },
}

impl OAuthResponse {
    pub fn redirect(encoding: RedirectEncoding, base: Url, content: &dyn Writable) -> Self {
        Self::Redirect {
            location: encoding.render(base, content),
        }
    }

    pub fn json(status: StatusCode, content: &dyn Writable) -> Self {
        Self::JsonPage {
            status,
            body: JsonWriter::new().build_with(content),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Redirect { .. } => StatusCode::FOUND,
            Self::JsonPage { status, .. } => *status,
        }
    }

    pub fn location(&self) -> Option<&Url> {
        match self {
            Self::Redirect { location } => Some(location),
            Self::JsonPage { .. } => None,
        }
    }

    pub fn body(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Redirect { .. } => None,
            Self::JsonPage { body, .. } => Some(body),
        }
    }

    /// Look up a string parameter in either the redirect target or the body.
    pub fn param(&self, key: &str) -> Option<String> {
        match self {
            Self::Redirect { location } => {
                let from_query = location
                    .query_pairs()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.into_owned());
                from_query.or_else(|| {
                    location.fragment().and_then(|fragment| {
                        url::form_urlencoded::parse(fragment.as_bytes())
                            .find(|(k, _)| k == key)
                            .map(|(_, v)| v.into_owned())
                    })
                })
            }
            Self::JsonPage { body, .. } => body.get(key).and_then(|value| match value {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }),
        }
    }
}

impl IntoResponse for OAuthResponse {
    fn into_response(self) -> Response {
        match self {
            OAuthResponse::Redirect { location } => (
                StatusCode::FOUND,
                [
                    (header::LOCATION, location.to_string()),
                    (header::CACHE_CONTROL, "no-store".to_string()),
                ],
            )
                .into_response(),
            OAuthResponse::JsonPage { status, body } => (
                status,
                [(header::CACHE_CONTROL, "no-store")],
                Json(Value::Object(body)),
            )
                .into_response(),
        }
    }
}
