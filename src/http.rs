//! Generic HTTP client interface used to call provider endpoints.
//!
//! Token and validation exchanges go through the [`HttpClient`] trait so that
//! tests can substitute canned responses and embedders can plug in their own
//! client. Request timeouts and retries are the client's responsibility.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::error::AuthError;

/// HTTP request for executing a call against a provider endpoint.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method (GET, POST).
    pub method: String,
    /// Target URL, including any query string.
    pub url: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// Optional request body.
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Creates a GET request for the given URL.
    pub fn get(url: impl Into<String>) -> Self {
        HttpRequest { method: "GET".into(), url: url.into(), headers: Vec::new(), body: None }
    }

    /// Creates a POST request with a form-encoded body.
    pub fn post_form(url: impl Into<String>, params: &[(String, String)]) -> Self {
        let body = params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        HttpRequest {
            method: "POST".into(),
            url: url.into(),
            headers: vec![(
                "Content-Type".into(),
                "application/x-www-form-urlencoded".into(),
            )],
            body: Some(body.into_bytes()),
        }
    }

    /// Adds a header, consuming and returning the request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Decodes the body as form-encoded pairs. Intended for assertions on
    /// recorded requests.
    pub fn form(&self) -> Vec<(String, String)> {
        let body = self.body.as_deref().unwrap_or_default();
        url::form_urlencoded::parse(body)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }
}

/// HTTP response from executing a call.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response from status, headers and body.
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<Vec<u8>>) -> Self {
        HttpResponse { status, headers, body: body.into() }
    }

    /// Creates a 200 response with a JSON body.
    pub fn json(status: u16, value: &Value) -> Self {
        HttpResponse::new(
            status,
            vec![("Content-Type".into(), "application/json".into())],
            serde_json::to_vec(value).expect("JSON serialization"),
        )
    }

    /// Returns a header value; lookup is case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the body as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserializes the body based on the `Content-Type` header: JSON
    /// (including `application/vnd.*+json`), form-encoded pairs, or plaintext.
    pub fn value(&self) -> Result<Value, AuthError> {
        let Some(content_type) = self.header("Content-Type") else {
            return Err(AuthError::MalformedResponse(
                "Cannot convert content without a mime type to a value".into(),
            ));
        };
        let mime = content_type.split(';').next().unwrap_or_default().trim();

        if mime == "application/x-www-form-urlencoded" {
            let map = url::form_urlencoded::parse(&self.body)
                .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
                .collect::<serde_json::Map<_, _>>();
            Ok(Value::Object(map))
        } else if mime == "text/plain" {
            Ok(Value::String(self.text()))
        } else if mime == "application/json"
            || (mime.starts_with("application/vnd.") && mime.ends_with("+json"))
        {
            serde_json::from_slice(&self.body)
                .map_err(|e| AuthError::MalformedResponse(format!("Invalid JSON: {e}")))
        } else {
            Err(AuthError::MalformedResponse(format!(
                "Cannot convert \"{content_type}\" to a value"
            )))
        }
    }
}

/// Generic HTTP client interface for authentication flows.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Executes an HTTP request.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, AuthError>;
}

/// In-memory HTTP client for testing. Responses are matched by URL, with an
/// optional default on miss; executed requests are recorded for assertions.
#[derive(Clone, Default)]
pub struct InMemoryHttpClient {
    responses: Arc<DashMap<String, HttpResponse>>,
    queues: Arc<DashMap<String, std::collections::VecDeque<HttpResponse>>>,
    default_response: Option<HttpResponse>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl InMemoryHttpClient {
    /// Creates a client with no canned responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client answering every request with the given response.
    pub fn with_default(response: HttpResponse) -> Self {
        InMemoryHttpClient { default_response: Some(response), ..Self::default() }
    }

    /// Registers a canned response for a specific URL.
    pub fn insert_response(&self, url: impl Into<String>, response: HttpResponse) {
        self.responses.insert(url.into(), response);
    }

    /// Queues a one-shot response for a URL. Queued responses are consumed in
    /// FIFO order before the fixed and default responses are considered.
    pub fn queue_response(&self, url: impl Into<String>, response: HttpResponse) {
        self.queues.entry(url.into()).or_default().push_back(response);
    }

    /// All requests executed so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl HttpClient for InMemoryHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, AuthError> {
        self.requests.lock().expect("requests lock").push(request.clone());
        if let Some(mut queue) = self.queues.get_mut(&request.url) {
            if let Some(response) = queue.pop_front() {
                return Ok(response);
            }
        }
        if let Some(entry) = self.responses.get(&request.url) {
            Ok(entry.value().clone())
        } else if let Some(response) = &self.default_response {
            Ok(response.clone())
        } else {
            Err(AuthError::Transport(format!("no mock response for {}", request.url)))
        }
    }
}

/// HTTP client backed by reqwest.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
    /// Creates a client with reqwest's defaults.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "reqwest")]
#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, AuthError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| AuthError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(n, v)| (n.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?
            .to_vec();
        Ok(HttpResponse { status, headers, body })
    }
}
