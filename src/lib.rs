//! Session-based authentication flows for web applications.
//!
//! Delegated-authentication handshakes (OAuth 1.0a, OAuth 2.0 authorization
//! code with PKCE/certificate/secret client authentication, CAS ticket
//! validation) driven to completion across independent HTTP requests, with
//! server-side sessions as the only persistence. A [`gate::SessionGate`]
//! wraps a [`flow::Flow`] and decides per request whether a principal is
//! already present, otherwise drives the flow and resumes the original
//! request once it completes.

pub mod basic;
pub mod cas;
pub mod error;
pub mod flow;
pub mod gate;
pub mod http;
pub mod oauth;
pub mod session;
pub mod user_info;
pub mod web;

pub use basic::Basic;
pub use cas::CasFlow;
pub use error::{AuthError, JwtError};
pub use flow::{AuthResult, Claims, Entropy, FixedEntropy, Flow, SystemEntropy, Target};
pub use gate::{Handler, SessionContext, SessionGate};
pub use http::{HttpClient, HttpRequest, HttpResponse, InMemoryHttpClient};
pub use oauth::{Credentials, Jwt, OAuth1Flow, OAuth2Flow, PkceMethod, Signature, TokenEndpoint};
pub use session::{InMemorySessions, Session, Sessions};
pub use user_info::UserInfo;

#[cfg(feature = "reqwest")]
pub use http::ReqwestHttpClient;
