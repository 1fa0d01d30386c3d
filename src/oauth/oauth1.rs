//! OAuth 1.0a three-legged flow.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::error::AuthError;
use crate::flow::entropy::Entropy;
use crate::flow::redirect::{self, FRAGMENT};
use crate::flow::state::{FlowScope, FlowState};
use crate::flow::target::Target;
use crate::flow::{AuthResult, Flow};
use crate::http::{HttpClient, HttpRequest};
use crate::oauth::client::SignedClient;
use crate::oauth::signature::Signature;
use crate::session::Session;
use crate::web::{Request, Response};

/// Default session namespace for OAuth1 flow state.
pub const NAMESPACE: &str = "oauth1::flow";

/// Drives the OAuth 1.0a handshake: obtain a server-issued request token,
/// redirect for authorization, upgrade the request token to an access token.
/// The request token doubles as the per-attempt correlator keying the flow
/// state, so parallel attempts in one session resolve independently; an
/// unknown token on a callback restarts the flow.
pub struct OAuth1Flow<C> {
    service: String,
    signature: Signature,
    callback: String,
    target: Target,
    namespace: String,
    http: C,
}

impl<C: HttpClient> OAuth1Flow<C> {
    /// Creates a flow against the given OAuth1 service base URL with
    /// consumer credentials and a callback, absolute or relative.
    pub fn new(
        service: &str,
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        callback: impl Into<String>,
        http: C,
    ) -> Self {
        OAuth1Flow {
            service: service.trim_end_matches('/').to_string(),
            signature: Signature::new(consumer_key, consumer_secret),
            callback: callback.into(),
            target: Target::Request,
            namespace: NAMESPACE.into(),
            http,
        }
    }

    /// Replaces the callback URI.
    pub fn calling(mut self, callback: impl Into<String>) -> Self {
        self.callback = callback.into();
        self
    }

    /// Replaces the service URL resolution strategy.
    pub fn target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    /// Replaces the session namespace.
    pub fn namespaced(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Replaces the nonce entropy source. For deterministic tests.
    pub fn with_entropy(mut self, entropy: Arc<dyn Entropy>) -> Self {
        self.signature = self.signature.with_entropy(entropy);
        self
    }

    /// The configured callback.
    pub fn callback(&self) -> &str {
        &self.callback
    }

    /// The consumer signature.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    fn callback_url(&self, service: &Url) -> Url {
        match Url::parse(&self.callback) {
            Ok(absolute) => absolute,
            Err(_) => service.join(&self.callback).expect("invalid callback"),
        }
    }

    /// POSTs to a token endpoint with a signed `Authorization` header and
    /// parses the form-encoded response.
    async fn request(
        &self,
        path: &str,
        token: Option<&str>,
        params: Vec<(String, String)>,
    ) -> Result<Map<String, Value>, AuthError> {
        let url = format!("{}{}", self.service, path);

        let mut signed = params.clone();
        if let Some(token) = token {
            signed.push(("oauth_token".into(), token.into()));
        }
        let authorization = self.signature.header("POST", &url, &signed);

        let response = self
            .http
            .execute(
                HttpRequest::post_form(url.as_str(), &params)
                    .with_header("Authorization", authorization)
                    .with_header("User-Agent", "authflow/OAuth1")
                    .with_header("Accept", "application/json;q=1.0, */*;q=0.8"),
            )
            .await?;
        if response.status != 200 {
            return Err(AuthError::ExchangeFailed {
                status: response.status,
                body: response.text(),
            });
        }

        Ok(url::form_urlencoded::parse(&response.body)
            .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
            .collect())
    }
}

#[async_trait]
impl<C: HttpClient> Flow for OAuth1Flow<C> {
    async fn authenticate(
        &self,
        request: &Request,
        response: &mut Response,
        session: &dyn Session,
    ) -> Result<Option<AuthResult>, AuthError> {
        let scope = FlowScope::new(session, &self.namespace);

        // A completed exchange waits in the terminal slot: wrap the access
        // token pair in a signing client.
        if let Some(Value::Object(access)) = scope.take_token() {
            let token = access
                .get("oauth_token")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    AuthError::MalformedResponse("Access token response missing oauth_token".into())
                })?;
            let secret = access
                .get("oauth_token_secret")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let signature = self.signature.with_token(token, secret);
            return Ok(Some(AuthResult::Signed(SignedClient::new(signature, access.clone()))));
        }

        let server = request.param("oauth_token");

        // Fragment-capture round trip: merge the fragment into the stored
        // target, then let the redirect page continue to the provider.
        if let (Some(fragment), Some(server)) = (request.param(FRAGMENT), server.as_deref()) {
            if let Some(mut flow) = scope.flow(server) {
                let mut uri = Url::parse(&flow.uri)
                    .map_err(|e| AuthError::MalformedResponse(format!("Stored target: {e}")))?;
                uri.set_fragment(Some(&fragment));
                flow.uri = uri.to_string();
                scope.update(server, flow);
                session.transmit(response);
                response.send("document.location.replace(target)", "text/javascript");
                return Ok(None);
            }
        }

        // Back from the authorization redirect: upgrade the request token to
        // an access token, park it in the terminal slot, return to target.
        if let Some(server) = server.as_deref() {
            if let Some(flow) = scope.flow(server) {
                let mut params = Vec::new();
                if let Some(verifier) = request.param("oauth_verifier") {
                    params.push(("oauth_verifier".to_string(), verifier));
                }
                let access = self.request("/access_token", Some(server), params).await?;
                scope.complete(server, Value::Object(access));
                session.transmit(response);
                redirect::relocate(response, &flow.uri);
                return Ok(None);
            }
            // Unknown request token: restart rather than fail, the session
            // may be fresh or another tab may have completed first.
            debug!(server, "no flow state for server token, restarting");
        }

        // Start a fresh attempt by obtaining a request token.
        let uri = self.target.resolve(request);
        let callback = match self.callback.is_empty() {
            true => redirect::service(&uri),
            false => self.callback_url(&uri),
        };

        let token_response = self
            .request(
                "/request_token",
                None,
                vec![("oauth_callback".to_string(), callback.to_string())],
            )
            .await?;
        let token = token_response
            .get("oauth_token")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AuthError::MalformedResponse("Request token response missing oauth_token".into())
            })?;

        scope.insert(token, FlowState::new(uri.as_str(), BTreeMap::new()));
        session.transmit(response);

        let login = format!(
            "{}/authenticate?oauth_token={}&oauth_callback={}",
            self.service,
            urlencoding::encode(token),
            urlencoding::encode(callback.as_str()),
        );
        redirect::login(
            response,
            &login,
            &redirect::forward_via_self(&login, &uri, "oauth_token", token),
        );
        Ok(None)
    }
}
