//! CAS ticket-validation flow.

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::cas::xml;
use crate::error::AuthError;
use crate::flow::redirect;
use crate::flow::state::FlowScope;
use crate::flow::target::Target;
use crate::flow::{AuthResult, Flow};
use crate::http::{HttpClient, HttpRequest};
use crate::session::Session;
use crate::web::{Request, Response};

/// Default session namespace for CAS flow state.
pub const NAMESPACE: &str = "cas::flow";

/// Drives CAS single sign-on: redirect to the SSO login, validate the ticket
/// the server calls back with, park the user attributes in the terminal
/// slot. The ticket itself is the correlator, so no client-issued state is
/// stored; a stale or forged ticket simply fails validation.
pub struct CasFlow<C> {
    sso: String,
    target: Target,
    namespace: String,
    http: C,
}

impl<C: HttpClient> CasFlow<C> {
    /// Creates a flow against the given SSO base URL.
    pub fn new(sso: &str, http: C) -> Self {
        CasFlow {
            sso: sso.trim_end_matches('/').to_string(),
            target: Target::Request,
            namespace: NAMESPACE.into(),
            http,
        }
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

    /// Calls the SSO's serviceValidate endpoint for a ticket.
    async fn validate(&self, ticket: &str, service: &Url) -> Result<String, AuthError> {
        let mut url =
            Url::parse(&format!("{}/serviceValidate", self.sso)).expect("invalid SSO URL");
        url.query_pairs_mut()
            .append_pair("ticket", ticket)
            .append_pair("service", service.as_str());

        let response = self.http.execute(HttpRequest::get(url.as_str())).await?;
        if response.status != 200 {
            return Err(AuthError::ExchangeFailed {
                status: response.status,
                body: response.text(),
            });
        }
        Ok(response.text())
    }
}

#[async_trait]
impl<C: HttpClient> Flow for CasFlow<C> {
    async fn authenticate(
        &self,
        request: &Request,
        response: &mut Response,
        session: &dyn Session,
    ) -> Result<Option<AuthResult>, AuthError> {
        let scope = FlowScope::new(session, &self.namespace);

        // A validated user waits in the terminal slot: consume and clear.
        if let Some(Value::Object(user)) = scope.take_token() {
            return Ok(Some(AuthResult::Attributes(user)));
        }

        let uri = self.target.resolve(request);

        let Some(ticket) = request.param("ticket") else {
            // No ticket yet: redirect to the SSO login, moving any fragment
            // into the reserved parameter inside the service URL.
            let service = redirect::service(&uri);
            let login = format!(
                "{}/login?service={}",
                self.sso,
                urlencoding::encode(service.as_str()),
            );
            redirect::login(
                response,
                &login,
                &redirect::forward_inside_service(&login, service.query().is_some()),
            );
            return Ok(None);
        };

        // Validate the ticket against the service URL it was issued for,
        // which is the current URI without the ticket parameter.
        let mut service = uri.clone();
        let remaining: Vec<(String, String)> = uri
            .query_pairs()
            .filter(|(name, _)| name != "ticket")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        service.set_query(None);
        if !remaining.is_empty() {
            service.query_pairs_mut().extend_pairs(remaining);
        }

        let body = self.validate(&ticket, &service).await?;
        let user = xml::service_response(&body)?;

        scope.set_token(Value::Object(user));
        session.transmit(response);
        redirect::finalize(response, &service);
        Ok(None)
    }
}
