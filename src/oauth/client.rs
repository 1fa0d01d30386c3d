//! Clients for requests authenticated with a completed flow's result.

use chrono::Utc;
use serde_json::{Map, Value};

use crate::error::AuthError;
use crate::flow::Claims;
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::oauth::signature::Signature;

/// OAuth2 access token, stamped into requests as a bearer credential.
#[derive(Debug, Clone)]
pub struct BearerClient {
    raw: Map<String, Value>,
}

impl BearerClient {
    /// Creates a client from the raw token-exchange response.
    pub fn new(raw: Map<String, Value>) -> Self {
        BearerClient { raw }
    }

    /// The access token string.
    pub fn token(&self) -> &str {
        self.raw
            .get("access_token")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// The token type, defaulting to `Bearer`.
    pub fn token_type(&self) -> &str {
        self.raw
            .get("token_type")
            .and_then(Value::as_str)
            .unwrap_or("Bearer")
    }

    /// The granted scope, if the provider returned one.
    pub fn scope(&self) -> Option<&str> {
        self.raw.get("scope").and_then(Value::as_str)
    }

    /// The OpenID Connect ID token, if the provider returned one.
    pub fn id_token(&self) -> Option<&str> {
        self.raw.get("id_token").and_then(Value::as_str)
    }

    /// The raw token-exchange response.
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// Refreshable claims, present when the provider returned both an expiry
    /// and a refresh token. Absence means the token does not expire.
    pub fn claims(&self) -> Option<Claims> {
        let expires_in = self.raw.get("expires_in").and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })?;
        let refresh = self.raw.get("refresh_token").and_then(Value::as_str)?;
        Some(Claims {
            expires: Utc::now().timestamp() + expires_in,
            refresh: refresh.to_string(),
        })
    }

    /// Fetches a URL with the bearer token attached.
    pub async fn fetch(
        &self,
        http: &dyn HttpClient,
        url: &str,
    ) -> Result<HttpResponse, AuthError> {
        http.execute(
            HttpRequest::get(url)
                .with_header("Accept", "application/json")
                .with_header("User-Agent", "authflow/OAuth2")
                .with_header(
                    "Authorization",
                    format!("{} {}", self.token_type(), self.token()),
                ),
        )
        .await
    }
}

/// OAuth1 client signing every request with HMAC-SHA1.
#[derive(Debug, Clone)]
pub struct SignedClient {
    raw: Map<String, Value>,
    signature: Signature,
}

impl SignedClient {
    /// Creates a client from a token-keyed signature and the raw access
    /// token response.
    pub fn new(signature: Signature, raw: Map<String, Value>) -> Self {
        SignedClient { raw, signature }
    }

    /// The signature used for requests.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The raw access token response.
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// Fetches a URL with a signed `Authorization` header.
    pub async fn fetch(
        &self,
        http: &dyn HttpClient,
        url: &str,
    ) -> Result<HttpResponse, AuthError> {
        let authorization = self.signature.header("GET", url, &[]);
        http.execute(
            HttpRequest::get(url)
                .with_header("Accept", "application/json")
                .with_header("User-Agent", "authflow/OAuth1")
                .with_header("Authorization", authorization),
        )
        .await
    }
}
