//! OAuth 1.0a and OAuth 2.0 client-side authentication.

pub mod client;
pub mod credentials;
pub mod endpoint;
pub mod jwt;
pub mod oauth1;
pub mod oauth2;
pub mod signature;

pub use client::{BearerClient, SignedClient};
pub use credentials::{ASSERTION_TYPE, Credentials, PkceMethod};
pub use endpoint::TokenEndpoint;
pub use jwt::Jwt;
pub use oauth1::OAuth1Flow;
pub use oauth2::OAuth2Flow;
pub use signature::Signature;
