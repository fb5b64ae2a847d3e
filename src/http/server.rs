//! Main router configuration assembling the OAuth endpoints.

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use super::{
    context::AppState,
    handler_oauth::{handle_oauth_authorize, handle_oauth_token},
    handler_well_known::oauth_authorization_server_handler,
};

/// Build the application router
pub fn build_router(ctx: AppState) -> Router {
    let oauth_routes = Router::new()
        .route("/authorize", get(handle_oauth_authorize))
        .route("/token", post(handle_oauth_token));

    let well_known_routes = Router::new().route(
        "/oauth-authorization-server",
        get(oauth_authorization_server_handler),
    );

    Router::new()
        .nest("/oauth", oauth_routes)
        .nest("/.well-known", well_known_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
