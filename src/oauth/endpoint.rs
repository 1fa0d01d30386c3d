//! OAuth2 token endpoint backend.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{instrument, warn};

use crate::error::AuthError;
use crate::http::{HttpClient, HttpRequest};
use crate::oauth::credentials::Credentials;

/// Performs grant exchanges against a configured token endpoint, using a
/// [`Credentials`] strategy to authenticate the client.
#[derive(Debug, Clone)]
pub struct TokenEndpoint {
    url: String,
    credentials: Credentials,
    headers: Vec<(String, String)>,
}

impl TokenEndpoint {
    /// Creates a token endpoint backend.
    pub fn new(url: impl Into<String>, credentials: Credentials) -> Self {
        TokenEndpoint { url: url.into(), credentials, headers: Vec::new() }
    }

    /// Adds headers to every exchange request.
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// The endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The configured credentials.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Acquires a grant: POSTs the credential parameters merged with the
    /// grant parameters, returning the parsed token response. The response
    /// body is decoded as JSON or form-encoded depending on its content type;
    /// a non-200 status is fatal to the attempt.
    #[instrument(skip(self, http, grant, seed), fields(endpoint = %self.url), level = "debug")]
    pub async fn acquire(
        &self,
        http: &dyn HttpClient,
        grant: Vec<(String, String)>,
        seed: &BTreeMap<String, String>,
    ) -> Result<Map<String, Value>, AuthError> {
        let mut params = self
            .credentials
            .params(&self.url, seed, Utc::now().timestamp())?;
        for (name, value) in grant {
            if !params.iter().any(|(existing, _)| *existing == name) {
                params.push((name, value));
            }
        }

        let mut request = HttpRequest::post_form(self.url.as_str(), &params)
            .with_header("Accept", "application/x-www-form-urlencoded, application/json")
            .with_header("User-Agent", "authflow/OAuth2");
        for (name, value) in &self.headers {
            request = request.with_header(name.clone(), value.clone());
        }

        let response = http.execute(request).await?;
        if response.status != 200 {
            warn!(status = response.status, "token exchange failed");
            return Err(AuthError::ExchangeFailed {
                status: response.status,
                body: response.text(),
            });
        }

        let content_type = response.header("Content-Type").unwrap_or_default();
        if content_type.contains("application/json") {
            match serde_json::from_slice(&response.body) {
                Ok(Value::Object(token)) => Ok(token),
                Ok(_) => Err(AuthError::MalformedResponse(
                    "Token response is not a JSON object".into(),
                )),
                Err(e) => Err(AuthError::MalformedResponse(format!(
                    "Invalid token response: {e}"
                ))),
            }
        } else {
            Ok(url::form_urlencoded::parse(&response.body)
                .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
                .collect())
        }
    }
}
