//! Session-bound login gating.
//!
//! The gate wraps a [`Flow`] and a session store: requests carrying an
//! authenticated principal proceed directly, everything else is driven
//! through the flow. Completed flows persist their principal in the session;
//! expiring principals are refreshed transparently.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::AuthError;
use crate::flow::entropy::{Entropy, SystemEntropy};
use crate::flow::{AuthResult, Claims, Flow};
use crate::session::{Session, Sessions};
use crate::web::{Request, Response};

const TOKEN_LENGTH: usize = 32;

/// A downstream request handler invoked once authentication succeeded.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handles the request. The authenticated principal is attached to the
    /// request under `user`, the anti-fixation token under `token`.
    async fn handle(&self, request: &Request, response: &mut Response);
}

#[async_trait]
impl<F> Handler for F
where
    F: Fn(&Request, &mut Response) + Send + Sync,
{
    async fn handle(&self, request: &Request, response: &mut Response) {
        self(request, response);
    }
}

type Lookup = dyn Fn(&AuthResult) -> Value + Send + Sync;

/// Authentication filter binding a flow to server-side sessions.
pub struct SessionGate<F, S> {
    flow: F,
    sessions: S,
    lookup: Option<Arc<Lookup>>,
    entropy: Arc<dyn Entropy>,
}

impl<F: Flow, S: Sessions> SessionGate<F, S> {
    /// Creates a gate for the given flow and session store.
    pub fn new(flow: F, sessions: S) -> Self {
        SessionGate {
            flow,
            sessions,
            lookup: None,
            entropy: Arc::new(SystemEntropy::new()),
        }
    }

    /// Sets a lookup function mapping a flow result to the application's own
    /// principal representation. Without one, the result's default
    /// representation is stored.
    pub fn lookup(mut self, lookup: impl Fn(&AuthResult) -> Value + Send + Sync + 'static) -> Self {
        self.lookup = Some(Arc::new(lookup));
        self
    }

    /// Replaces the randomness source for anti-fixation tokens.
    pub fn with_entropy(mut self, entropy: Arc<dyn Entropy>) -> Self {
        self.entropy = entropy;
        self
    }

    /// Whether the request references a session carrying a principal.
    pub fn present(&self, request: &Request) -> bool {
        self.sessions
            .locate(request)
            .and_then(|session| session.value("auth"))
            .is_some_and(|auth| !auth.is_null())
    }

    fn authorize(&self, session: &dyn Session, result: &AuthResult) -> Value {
        let user = match &self.lookup {
            Some(lookup) => lookup(result),
            None => result.to_value(),
        };
        let claims = result
            .claims()
            .map(|claims| serde_json::to_value(claims).expect("claims serialization"))
            .unwrap_or(Value::Null);
        session.register("auth", Value::Array(vec![claims, user.clone()]));
        user
    }

    /// Guards a request: authenticates if necessary, then invokes the
    /// handler with the principal attached to the request. Returns without
    /// invoking the handler when the flow has written a redirect.
    pub async fn guard(
        &self,
        request: &mut Request,
        response: &mut Response,
        handler: &dyn Handler,
    ) -> Result<(), AuthError> {
        let (session, mut user, token) = match self.sessions.locate(request) {
            Some(session) => {
                let (claims, mut user) = match session.value("auth") {
                    Some(Value::Array(auth)) if auth.len() == 2 => {
                        let user = (!auth[1].is_null()).then(|| auth[1].clone());
                        (auth[0].clone(), user)
                    }
                    _ => (Value::Null, None),
                };
                let token = session
                    .value("token")
                    .and_then(|value| value.as_str().map(str::to_string))
                    .unwrap_or_default();

                // Refresh expiring claims; when the provider refuses, fall
                // through to re-authentication instead of failing the
                // request.
                if let Ok(claims) = serde_json::from_value::<Claims>(claims) {
                    match self.flow.refresh(&claims).await {
                        Ok(Some(result)) => {
                            user = Some(self.authorize(&*session, &result));
                            session.transmit(response);
                        }
                        Ok(None) => {}
                        Err(error) => {
                            warn!(%error, "refresh failed, re-authenticating");
                            user = None;
                        }
                    }
                }
                (session, user, token)
            }
            None => {
                // Fresh session with a new anti-fixation token, created
                // before the flow runs so flow state it writes survives.
                let session = self.sessions.create();
                let mut random = [0u8; TOKEN_LENGTH];
                self.entropy.fill(&mut random);
                let token = STANDARD.encode(random);
                session.register("token", Value::String(token.clone()));
                (session, None, token)
            }
        };

        let user = match user {
            Some(user) => user,
            None => {
                // Background requests get an immediate error: redirecting a
                // fetch or image request into an interactive login leads
                // nowhere.
                if !interactive(request) {
                    session.transmit(response);
                    response.answer(401);
                    response.send("Authentication required", "text/plain");
                    return Ok(());
                }

                match self.flow.authenticate(request, response, &*session).await? {
                    None => return Ok(()),
                    Some(result) => {
                        let user = self.authorize(&*session, &result);
                        session.transmit(response);
                        user
                    }
                }
            }
        };

        request.pass("user", user);
        request.pass("token", Value::String(token));
        request.set_context(SessionContext::new(session));
        handler.handle(request, response).await;
        Ok(())
    }

    /// Like [`SessionGate::guard`], but proceeds anonymously when no
    /// authentication information is present on the request.
    pub async fn optional(
        &self,
        request: &mut Request,
        response: &mut Response,
        handler: &dyn Handler,
    ) -> Result<(), AuthError> {
        if self.present(request) {
            self.guard(request, response, handler).await
        } else {
            handler.handle(request, response).await;
            Ok(())
        }
    }
}

/// Whether the request is a top-level navigation that may be redirected into
/// an interactive login.
fn interactive(request: &Request) -> bool {
    matches!(request.header("Sec-Fetch-Mode"), None | Some("navigate"))
}

/// Session access handed to downstream handlers.
#[derive(Clone)]
pub struct SessionContext {
    session: Arc<dyn Session>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("session", &self.session.id())
            .finish()
    }
}

impl SessionContext {
    pub(crate) fn new(session: Arc<dyn Session>) -> Self {
        SessionContext { session }
    }

    fn auth(&self) -> Option<Vec<Value>> {
        match self.session.value("auth") {
            Some(Value::Array(auth)) if auth.len() == 2 => Some(auth),
            _ => None,
        }
    }

    /// The stored principal.
    pub fn user(&self) -> Option<Value> {
        self.auth().map(|auth| auth[1].clone())
    }

    /// The stored refresh claims, if any.
    pub fn claims(&self) -> Option<Value> {
        self.auth()
            .map(|auth| auth[0].clone())
            .filter(|claims| !claims.is_null())
    }

    /// Merges changes into the stored principal and re-transmits the
    /// session. Returns the updated principal.
    pub fn modify(&self, changes: Map<String, Value>, response: &mut Response) -> Option<Value> {
        let auth = self.auth()?;
        let mut user = auth[1].clone();
        if let Value::Object(user) = &mut user {
            user.extend(changes);
        }
        self.session
            .register("auth", Value::Array(vec![auth[0].clone(), user.clone()]));
        self.session.transmit(response);
        Some(user)
    }

    /// Destroys the underlying session, logging the user out.
    pub fn logout(&self, response: &mut Response) {
        if self.session.valid() {
            self.session.destroy();
            self.session.transmit(response);
        }
    }
}
