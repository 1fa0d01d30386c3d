//! Post-authentication user-info fetching.

use std::sync::Arc;

use serde_json::Value;

use crate::error::AuthError;
use crate::flow::AuthResult;
use crate::http::HttpClient;

type Mapper = dyn Fn(Value, &AuthResult) -> Result<Value, AuthError> + Send + Sync;

/// Retrieves details about the authenticated user from a given endpoint,
/// refining the raw value through a chain of mapper functions.
#[derive(Clone)]
pub struct UserInfo {
    endpoint: String,
    mappers: Vec<Arc<Mapper>>,
}

impl UserInfo {
    /// Creates a fetcher for the given endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        UserInfo { endpoint: endpoint.into(), mappers: Vec::new() }
    }

    /// Appends a mapper applied to the fetched value.
    pub fn map(
        mut self,
        mapper: impl Fn(Value, &AuthResult) -> Result<Value, AuthError> + Send + Sync + 'static,
    ) -> Self {
        self.mappers.push(Arc::new(mapper));
        self
    }

    /// Fetches the user info with the authenticated client and runs the
    /// mapper chain. Failures of any kind surface as a single
    /// [`AuthError::UserInfo`] so callers have one error to catch.
    pub async fn fetch(
        &self,
        http: &dyn HttpClient,
        result: &AuthResult,
    ) -> Result<Value, AuthError> {
        let response = result.fetch(http, &self.endpoint).await?;
        if response.status >= 400 {
            return Err(AuthError::UserInfo(format!(
                "Unexpected status {} from {}",
                response.status, self.endpoint
            )));
        }

        let mut value = response
            .value()
            .map_err(|e| AuthError::UserInfo(format!("Invoking mappers: {e}")))?;
        for mapper in &self.mappers {
            value = mapper(value, result).map_err(|e| match e {
                AuthError::UserInfo(_) => e,
                other => AuthError::UserInfo(format!("Invoking mappers: {other}")),
            })?;
        }
        Ok(value)
    }
}
