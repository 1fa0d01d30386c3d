//! HTTP Basic authentication (RFC 7617).

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::SecretString;
use serde_json::Value;

use crate::gate::Handler;
use crate::web::{Request, Response};

type Login = dyn Fn(&str, &SecretString) -> Option<Value> + Send + Sync;

/// Authentication filter checking an `Authorization: Basic` header against a
/// login function.
pub struct Basic {
    realm: String,
    login: Arc<Login>,
}

impl Basic {
    /// Creates a filter for the given realm. The login function receives the
    /// username and password and returns the principal, or `None` to reject.
    pub fn new(
        realm: impl Into<String>,
        login: impl Fn(&str, &SecretString) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        Basic { realm: realm.into(), login: Arc::new(login) }
    }

    /// Whether the request carries basic authentication credentials.
    pub fn present(&self, request: &Request) -> bool {
        request
            .header("Authorization")
            .is_some_and(|header| header.starts_with("Basic "))
    }

    /// Authenticates the request, invoking the handler with the principal
    /// attached under `user`, or answers 401 with a challenge.
    pub async fn filter(
        &self,
        request: &mut Request,
        response: &mut Response,
        handler: &dyn Handler,
    ) {
        if let Some(user) = self.verify(request) {
            request.pass("user", user);
            handler.handle(request, response).await;
            return;
        }

        response.header("WWW-Authenticate", format!("Basic realm=\"{}\"", self.realm));
        response.answer(401);
        response.send("Unauthorized", "text/plain");
    }

    fn verify(&self, request: &Request) -> Option<Value> {
        let credentials = request.header("Authorization")?.strip_prefix("Basic ")?;
        let decoded = STANDARD.decode(credentials).ok()?;
        let text = String::from_utf8(decoded).ok()?;
        let (username, password) = text.split_once(':')?;
        (self.login)(username, &SecretString::from(password.to_string()))
    }
}
