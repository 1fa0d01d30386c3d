//! OAuth 2.0 authorization-code flow.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::AuthError;
use crate::flow::entropy::{Entropy, SystemEntropy, hex};
use crate::flow::redirect::{self, FRAGMENT};
use crate::flow::state::{FlowScope, FlowState};
use crate::flow::target::Target;
use crate::flow::{AuthResult, Claims, Flow};
use crate::http::HttpClient;
use crate::oauth::client::BearerClient;
use crate::oauth::credentials::Credentials;
use crate::oauth::endpoint::TokenEndpoint;
use crate::session::Session;
use crate::web::{Request, Response};

/// Default session namespace for OAuth2 flow state.
pub const NAMESPACE: &str = "oauth2::flow";

/// Drives the authorization-code handshake: redirect to the authorization
/// endpoint with a per-attempt state token, exchange the returned code for an
/// access token, hand the result to the gate via the session's terminal slot.
///
/// Multiple attempts may be in flight per session; each is keyed by its own
/// state token and resolves independently. A callback with a state matching
/// no stored attempt restarts the flow instead of failing, which keeps
/// parallel tabs and replayed callbacks from surfacing errors.
pub struct OAuth2Flow<C> {
    auth: Url,
    endpoint: TokenEndpoint,
    scopes: Vec<String>,
    callback: String,
    target: Target,
    namespace: String,
    entropy: Arc<dyn Entropy>,
    http: C,
}

impl<C: HttpClient> OAuth2Flow<C> {
    /// Creates a flow against the given authorization and token endpoints.
    /// The callback may be absolute or relative to the service URL; scopes
    /// default to `user`.
    pub fn new(
        auth: &str,
        tokens: &str,
        credentials: Credentials,
        callback: impl Into<String>,
        http: C,
    ) -> Self {
        OAuth2Flow {
            auth: Url::parse(auth).expect("invalid authorization endpoint"),
            endpoint: TokenEndpoint::new(tokens, credentials),
            scopes: vec!["user".into()],
            callback: callback.into(),
            target: Target::Request,
            namespace: NAMESPACE.into(),
            entropy: Arc::new(SystemEntropy::new()),
            http,
        }
    }

    /// Replaces the requested scopes.
    pub fn requesting(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
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

    /// Replaces the randomness source. For deterministic tests.
    pub fn with_entropy(mut self, entropy: Arc<dyn Entropy>) -> Self {
        self.entropy = entropy;
        self
    }

    /// The requested scopes.
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// The configured callback.
    pub fn callback(&self) -> &str {
        &self.callback
    }

    /// The token endpoint backend.
    pub fn endpoint(&self) -> &TokenEndpoint {
        &self.endpoint
    }

    fn callback_url(&self, service: &Url) -> Url {
        match Url::parse(&self.callback) {
            Ok(absolute) => absolute,
            Err(_) => service.join(&self.callback).expect("invalid callback"),
        }
    }

    fn authorization_url(
        &self,
        callback: &Url,
        state: &str,
        pass: &[(String, String)],
    ) -> Result<String, AuthError> {
        let mut url = self.auth.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", self.endpoint.credentials().client_id()?)
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("redirect_uri", callback.as_str())
            .append_pair("state", state)
            .extend_pairs(pass.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        Ok(url.to_string())
    }
}

#[async_trait]
impl<C: HttpClient> Flow for OAuth2Flow<C> {
    async fn authenticate(
        &self,
        request: &Request,
        response: &mut Response,
        session: &dyn Session,
    ) -> Result<Option<AuthResult>, AuthError> {
        let scope = FlowScope::new(session, &self.namespace);

        // A completed exchange waits in the terminal slot: consume and clear.
        if let Some(Value::Object(token)) = scope.take_token() {
            return Ok(Some(AuthResult::Bearer(BearerClient::new(token))));
        }

        // Back from the authorization server: the state parameter carries the
        // correlator, optionally followed by `_` and the captured fragment.
        if let Some(state_param) = request.param("state") {
            let (state, fragment) = match state_param.split_once(FRAGMENT) {
                Some((state, fragment)) => (state, Some(fragment)),
                None => (state_param.as_str(), None),
            };

            if let (Some(flow), Some(code)) = (scope.flow(state), request.param("code")) {
                let service = self.target.resolve(request);
                let callback = self.callback_url(&service);
                let token = self
                    .endpoint
                    .acquire(
                        &self.http,
                        vec![
                            ("grant_type".into(), "authorization_code".into()),
                            ("code".into(), code),
                            ("redirect_uri".into(), callback.to_string()),
                            ("state".into(), state.into()),
                        ],
                        &flow.seed,
                    )
                    .await?;
                scope.complete(state, Value::Object(token));

                let mut uri = Url::parse(&flow.uri)
                    .map_err(|e| AuthError::MalformedResponse(format!("Stored target: {e}")))?;
                if let Some(fragment) = fragment {
                    uri.set_fragment(Some(fragment));
                }
                session.transmit(response);
                redirect::relocate(response, uri.as_str());
                return Ok(None);
            }

            // Unmatched state: another tab finished first, or the callback
            // was replayed. Restart rather than fail.
            debug!(state, "no flow state for request state, restarting");
        }

        // Start a fresh attempt: remember where to return to, store the
        // attempt under a new state token, redirect to authorization.
        let service = self.target.resolve(request);
        let callback = self.callback_url(&service);

        let mut random = [0u8; 16];
        self.entropy.fill(&mut random);
        let state = hex(&random);

        let seed = self.endpoint.credentials().seed(&*self.entropy);
        scope.insert(&state, FlowState::new(service.as_str(), seed.clone()));
        session.transmit(response);

        let login = self.authorization_url(
            &callback,
            &state,
            &self.endpoint.credentials().pass(&seed),
        )?;
        redirect::login(response, &login, &redirect::forward_to_state(&login));
        Ok(None)
    }

    async fn refresh(&self, claims: &Claims) -> Result<Option<AuthResult>, AuthError> {
        if !claims.expired() {
            return Ok(None);
        }
        let token = self
            .endpoint
            .acquire(
                &self.http,
                vec![
                    ("grant_type".into(), "refresh_token".into()),
                    ("refresh_token".into(), claims.refresh.clone()),
                ],
                &Default::default(),
            )
            .await?;
        Ok(Some(AuthResult::Bearer(BearerClient::new(token))))
    }
}
