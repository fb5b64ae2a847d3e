//! OAuth 2.1 authorization server library crate.
//!
//! Provides the protocol core for the authorization and token endpoints,
//! a single-use artifact store and an axum HTTP surface.

pub mod config;
pub mod errors;
pub mod http;
pub mod oauth;
pub mod storage;
