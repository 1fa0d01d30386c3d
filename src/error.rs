//! Error types for authentication flows and JWT handling.

/// Errors surfaced by flows, token exchanges and the session gate.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The provider's token or validation endpoint answered with a non-2xx
    /// status. Carries the status code and the raw response body.
    #[error("Cannot get access token (#{status}): {body}")]
    ExchangeFailed {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Raw response body, kept for diagnostics.
        body: String,
    },

    /// The provider explicitly rejected the authentication attempt, e.g. a
    /// CAS `authenticationFailure` or an OAuth error response.
    #[error("{code}: {message}")]
    ProviderRejected {
        /// Provider-supplied error code.
        code: String,
        /// Provider-supplied error message.
        message: String,
    },

    /// The provider's response body could not be parsed as the expected
    /// format (XML, JSON or form-encoded).
    #[error("{0}")]
    MalformedResponse(String),

    /// A `Credentials::Unset` placeholder was used before real credentials
    /// were configured.
    #[error("No credentials configured")]
    CredentialsUnset,

    /// Invalid configuration, e.g. a malformed fingerprint or an unsupported
    /// PKCE method.
    #[error("{0}")]
    Configuration(String),

    /// The underlying crypto signing call failed.
    #[error("Signing failed: {0}")]
    SigningFailure(String),

    /// Fetching or mapping post-authentication user info failed.
    #[error("{0}")]
    UserInfo(String),

    /// Transport-level failure talking to the provider.
    #[error("HTTP transport error: {0}")]
    Transport(String),

    /// JWT processing error, see [`JwtError`].
    #[error(transparent)]
    Jwt(#[from] JwtError),
}

/// Errors raised when signing or verifying compact-serialized JWTs.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// The token does not consist of three dot-separated segments.
    #[error("Expected [header].[payload].[signature]")]
    Malformed,

    /// The header segment is not base64url-encoded JSON.
    #[error("Header parsing error: {0}")]
    HeaderParsing(String),

    /// The payload segment is not base64url-encoded JSON.
    #[error("Payload parsing error: {0}")]
    PayloadParsing(String),

    /// The header names an algorithm other than RS256, or none at all.
    #[error("Unsupported algorithm {}", .0.as_deref().unwrap_or("(null)"))]
    UnsupportedAlgorithm(Option<String>),

    /// The signature does not match the signing input.
    #[error("Signature mismatch")]
    SignatureMismatch,

    /// Signing failed, e.g. because of a defective key.
    #[error("Signing error: {0}")]
    Signing(String),

    /// A key could not be parsed.
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}
