//! OAuth 2.1 authorization server protocol core.
//!
//! Request validation, PKCE, redirect URI handling, single-use authorization
//! codes and refresh tokens, and RFC 9068 access token issuance.

pub mod access_token;
pub mod authorization;
pub mod extension;
pub mod issuer;
pub mod params;
pub mod redirect_uri;
pub mod registration;
pub mod response;
pub mod token;
pub mod types;
pub mod writers;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use access_token::{
    AccessTokenIssuer, JsonWebTokenSigner, Rfc9068AccessTokenIssuer, TokenSigner,
};
pub use authorization::{
    AuthorizationFlow, AuthorizationRequest, AuthorizationRequestGranter,
    AuthorizationRequestParser,
};
pub use extension::{Extension, Extensions};
pub use issuer::{
    AccessTokenOrder, ArtifactKind, AuthorizationArtifact, AuthorizationAuthority,
    DisabledAuthorizationAuthority, IssuerBundle, LoggingReplayObserver,
    RandomCodeAuthorizationAuthority, ReplayObserver, TokenSpec,
};
pub use params::{ParamReader, Params};
pub use registration::{
    ClientDefaults, ClientRegistration, MemoryRegistrationAuthority, RegistrationAuthority,
    SimpleUser, SingleScopeClient, StaticClient, UserRegistration,
};
pub use response::OAuthResponse;
pub use token::{TokenRequest, TokenRequestGranter, TokenRequestParser};
pub use types::{
    AccessTokenPayload, AuthorizationCodePayload, CodeChallengeMethod, ErrorCode, ErrorResponse,
    GrantType, OAuthFailure, PkceInfo, ResponseType, generate_token, parse_scope,
};
