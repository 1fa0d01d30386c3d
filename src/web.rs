//! Request and response types at the host-framework boundary.
//!
//! These are deliberately small: an embedding framework adapts its own
//! request/response pair to and from these before and after the filters in
//! this crate run.

use std::collections::HashMap;

use serde_json::Value;
use url::Url;

use crate::gate::SessionContext;

/// An incoming HTTP request as seen by the authentication filters.
#[derive(Debug, Clone)]
pub struct Request {
    method: String,
    uri: Url,
    headers: HashMap<String, String>,
    values: HashMap<String, Value>,
    context: Option<SessionContext>,
}

impl Request {
    /// Creates a request with the given method and absolute URI.
    pub fn new(method: impl Into<String>, uri: Url) -> Self {
        Request {
            method: method.into(),
            uri,
            headers: HashMap::new(),
            values: HashMap::new(),
            context: None,
        }
    }

    /// Creates a GET request from a path, resolved against `http://localhost`.
    /// The path may carry a query string and a fragment.
    pub fn get(path: &str) -> Self {
        let uri = Url::parse("http://localhost")
            .and_then(|base| base.join(path))
            .expect("invalid request path");
        Self::new("GET", uri)
    }

    /// Adds a header, consuming and returning the request.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// The request method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The request URI.
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// Returns the first query parameter with the given name, percent-decoded.
    pub fn param(&self, name: &str) -> Option<String> {
        self.uri
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Returns a header value; lookup is case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Attaches a named value to the request for downstream handlers.
    pub fn pass(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    /// Returns a value previously attached via [`Request::pass`].
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub(crate) fn set_context(&mut self, context: SessionContext) {
        self.context = Some(context);
    }

    /// The session context attached by the gate, if any.
    pub fn context(&self) -> Option<&SessionContext> {
        self.context.as_ref()
    }
}

/// An outgoing HTTP response under construction.
#[derive(Debug)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    content_type: Option<String>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    /// Creates an empty 200 response.
    pub fn new() -> Self {
        Response { status: 200, headers: Vec::new(), body: None, content_type: None }
    }

    /// Sets the response status.
    pub fn answer(&mut self, status: u16) {
        self.status = status;
    }

    /// Sets a header, replacing an existing header of the same name.
    pub fn header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }

    /// Sends a body with the given content type.
    pub fn send(&mut self, body: impl Into<Vec<u8>>, content_type: &str) {
        self.body = Some(body.into());
        self.content_type = Some(content_type.to_string());
    }

    /// The response status.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns a header value; lookup is case-insensitive.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All headers in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The response body as UTF-8, if one was sent.
    pub fn body_str(&self) -> Option<&str> {
        self.body.as_deref().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// The content type passed to [`Response::send`], if any.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Extracts the URL from the meta-refresh tag of a login redirect page.
    /// Intended for tests and diagnostics.
    pub fn refresh_url(&self) -> Option<&str> {
        let body = self.body_str()?;
        let start = body.find("content=\"1; URL=")? + "content=\"1; URL=".len();
        let end = body[start..].find('"')?;
        Some(&body[start..start + end])
    }
}
