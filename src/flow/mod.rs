//! Authentication flow contract and results.
//!
//! A [`Flow`] drives a multi-step, redirect-based handshake to completion
//! across independent HTTP requests, with the session as the only
//! persistence. `authenticate` returns `None` exactly when it has written a
//! response (a redirect or a terminal page) and the caller must stop
//! processing; it returns a result exactly once, on the request that
//! completes the handshake.

pub mod entropy;
pub mod redirect;
pub mod state;
pub mod target;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AuthError;
use crate::http::{HttpClient, HttpResponse};
use crate::oauth::client::{BearerClient, SignedClient};
use crate::session::Session;
use crate::web::{Request, Response};

pub use entropy::{Entropy, FixedEntropy, SystemEntropy};
pub use state::{FlowScope, FlowState};
pub use target::Target;

/// Refreshable claim set carried by an expiring authorization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Epoch second at which the authorization expires.
    pub expires: i64,

    /// Refresh token to exchange for a fresh authorization.
    pub refresh: String,
}

impl Claims {
    /// Whether the expiry lies in the past.
    pub fn expired(&self) -> bool {
        self.expires <= Utc::now().timestamp()
    }
}

/// Principal-bearing value produced by a completed flow.
#[derive(Debug, Clone)]
pub enum AuthResult {
    /// An OAuth2 access token usable as a bearer credential.
    Bearer(BearerClient),

    /// An OAuth1 token/secret pair wrapped in a signing capability.
    Signed(SignedClient),

    /// A CAS attribute map.
    Attributes(Map<String, Value>),
}

impl AuthResult {
    /// Returns the refreshable claim set, or `None` if this authorization
    /// does not expire or cannot be refreshed.
    pub fn claims(&self) -> Option<Claims> {
        match self {
            AuthResult::Bearer(client) => client.claims(),
            AuthResult::Signed(_) | AuthResult::Attributes(_) => None,
        }
    }

    /// The default principal representation persisted by the gate when no
    /// lookup function is configured.
    pub fn to_value(&self) -> Value {
        match self {
            AuthResult::Bearer(client) => Value::Object(client.raw().clone()),
            AuthResult::Signed(client) => Value::Object(client.raw().clone()),
            AuthResult::Attributes(attributes) => Value::Object(attributes.clone()),
        }
    }

    /// Fetches a URL with this authorization attached.
    pub async fn fetch(
        &self,
        http: &dyn HttpClient,
        url: &str,
    ) -> Result<HttpResponse, AuthError> {
        match self {
            AuthResult::Bearer(client) => client.fetch(http, url).await,
            AuthResult::Signed(client) => client.fetch(http, url).await,
            AuthResult::Attributes(_) => Err(AuthError::UserInfo(
                "CAS authorizations carry no client to fetch with".into(),
            )),
        }
    }
}

/// A multi-step authentication flow over session-stored state.
#[async_trait]
pub trait Flow: Send + Sync {
    /// Executes one step of the flow for the given request.
    ///
    /// Returns `Ok(None)` when a response has been written and request
    /// processing must stop; returns the authentication result on the
    /// request that completes the handshake, clearing the flow's session
    /// state in the same call.
    async fn authenticate(
        &self,
        request: &Request,
        response: &mut Response,
        session: &dyn Session,
    ) -> Result<Option<AuthResult>, AuthError>;

    /// Refreshes an expiring authorization. Returns `Ok(None)` while the
    /// claims have not expired yet; the default implementation never
    /// refreshes.
    async fn refresh(&self, _claims: &Claims) -> Result<Option<AuthResult>, AuthError> {
        Ok(None)
    }
}
