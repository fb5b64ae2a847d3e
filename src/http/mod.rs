//! Axum HTTP surface for the authorization and token endpoints.

pub mod context;
mod handler_oauth;
mod handler_well_known;
pub mod server;

pub use context::AppState;
pub use server::build_router;
