//! Client credential strategies for the token exchange.
//!
//! A closed sum type covering the three ways a client authenticates itself
//! against the token endpoint, plus a fail-fast placeholder. Each variant
//! produces the POST parameters to merge into the exchange body; PKCE
//! additionally produces a seed before the authorization redirect and
//! consumes it at exchange time.

use std::collections::BTreeMap;
use std::fmt;

use jsonwebtoken::EncodingKey;
use ring::digest;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::error::AuthError;
use crate::flow::entropy::Entropy;
use crate::oauth::jwt::Jwt;

/// Assertion type URN for JWT bearer client authentication (RFC 7523).
pub const ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

const UNRESERVED: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// PKCE code challenge method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkceMethod {
    /// SHA-256 hash of the verifier, base64url-encoded.
    S256,
    /// The verifier itself.
    Plain,
}

impl PkceMethod {
    /// The wire name of this method.
    pub fn name(&self) -> &'static str {
        match self {
            PkceMethod::S256 => "S256",
            PkceMethod::Plain => "plain",
        }
    }

    /// Derives the code challenge from a verifier.
    pub fn challenge(&self, verifier: &str) -> String {
        match self {
            PkceMethod::S256 => {
                Jwt::encode(digest::digest(&digest::SHA256, verifier.as_bytes()).as_ref())
            }
            PkceMethod::Plain => verifier.to_string(),
        }
    }
}

impl std::str::FromStr for PkceMethod {
    type Err = AuthError;

    fn from_str(method: &str) -> Result<Self, Self::Err> {
        match method {
            "S256" => Ok(PkceMethod::S256),
            "plain" => Ok(PkceMethod::Plain),
            other => Err(AuthError::Configuration(format!("Unsupported method {other}"))),
        }
    }
}

/// How the client authenticates itself during the token exchange.
#[derive(Clone)]
pub enum Credentials {
    /// Placeholder failing fast when used before configuration.
    Unset,

    /// Shared client secret.
    Secret {
        /// Client identifier.
        client_id: String,
        /// Client secret.
        secret: SecretString,
    },

    /// Signed JWT assertion over a certificate key pair (RFC 7523).
    Certificate {
        /// Client identifier.
        client_id: String,
        /// Certificate fingerprint bytes, carried as the `x5t` header.
        fingerprint: Vec<u8>,
        /// RSA private key for signing the assertion.
        key: EncodingKey,
        /// Assertion validity in seconds.
        validity: i64,
    },

    /// Proof Key for Code Exchange: public client, verifier/challenge pair.
    Pkce {
        /// Client identifier.
        client_id: String,
        /// Challenge derivation method.
        method: PkceMethod,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Unset => write!(f, "Credentials::Unset"),
            Credentials::Secret { client_id, .. } => {
                write!(f, "Credentials::Secret({client_id})")
            }
            Credentials::Certificate { client_id, .. } => {
                write!(f, "Credentials::Certificate({client_id})")
            }
            Credentials::Pkce { client_id, method } => {
                write!(f, "Credentials::Pkce({client_id}, {})", method.name())
            }
        }
    }
}

impl Credentials {
    /// Creates shared-secret credentials.
    pub fn by_secret(client_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Credentials::Secret {
            client_id: client_id.into(),
            secret: SecretString::from(secret.into()),
        }
    }

    /// Creates certificate credentials from a hex fingerprint (colons
    /// allowed) and a PEM-encoded RSA private key.
    pub fn by_certificate(
        client_id: impl Into<String>,
        fingerprint: &str,
        private_key_pem: &[u8],
        validity: i64,
    ) -> Result<Self, AuthError> {
        let fingerprint = decode_hex(&fingerprint.replace(':', ""))
            .ok_or_else(|| AuthError::Configuration(format!("Invalid fingerprint {fingerprint}")))?;
        let key = EncodingKey::from_rsa_pem(private_key_pem)
            .map_err(|e| AuthError::Configuration(format!("Invalid private key: {e}")))?;
        Ok(Credentials::Certificate {
            client_id: client_id.into(),
            fingerprint,
            key,
            validity,
        })
    }

    /// Creates PKCE credentials.
    pub fn by_pkce(client_id: impl Into<String>, method: PkceMethod) -> Self {
        Credentials::Pkce { client_id: client_id.into(), method }
    }

    /// The client identifier. Fails for the unset placeholder.
    pub fn client_id(&self) -> Result<&str, AuthError> {
        match self {
            Credentials::Unset => Err(AuthError::CredentialsUnset),
            Credentials::Secret { client_id, .. }
            | Credentials::Certificate { client_id, .. }
            | Credentials::Pkce { client_id, .. } => Ok(client_id),
        }
    }

    /// Generates the per-attempt seed stored alongside the flow state before
    /// redirecting to the authorization server. PKCE generates a 64-character
    /// verifier from the unreserved alphabet; other variants need no seed.
    pub fn seed(&self, entropy: &dyn Entropy) -> BTreeMap<String, String> {
        let mut seed = BTreeMap::new();
        if let Credentials::Pkce { .. } = self {
            let mut random = [0u8; 64];
            entropy.fill(&mut random);
            let verifier: String = random
                .iter()
                .map(|b| UNRESERVED[(*b as usize) % UNRESERVED.len()] as char)
                .collect();
            seed.insert("verifier".to_string(), verifier);
        }
        seed
    }

    /// Parameters to pass on to the authorization redirect, derived from the
    /// seed. PKCE passes the code challenge; other variants pass nothing.
    pub fn pass(&self, seed: &BTreeMap<String, String>) -> Vec<(String, String)> {
        match self {
            Credentials::Pkce { method, .. } => {
                let verifier = seed.get("verifier").map(String::as_str).unwrap_or_default();
                vec![
                    ("code_challenge".into(), method.challenge(verifier)),
                    ("code_challenge_method".into(), method.name().into()),
                ]
            }
            _ => Vec::new(),
        }
    }

    /// Parameters to merge into the token-exchange POST body.
    pub fn params(
        &self,
        endpoint: &str,
        seed: &BTreeMap<String, String>,
        time: i64,
    ) -> Result<Vec<(String, String)>, AuthError> {
        match self {
            Credentials::Unset => Err(AuthError::CredentialsUnset),
            Credentials::Secret { client_id, secret } => Ok(vec![
                ("client_id".into(), client_id.clone()),
                ("client_secret".into(), secret.expose_secret().to_string()),
            ]),
            Credentials::Certificate { client_id, fingerprint, key, validity } => {
                let header = to_map(json!({
                    "alg": "RS256",
                    "typ": "JWT",
                    "x5t": Jwt::encode(fingerprint),
                }));
                let payload = to_map(json!({
                    "aud": endpoint,
                    "exp": time + validity,
                    "iss": client_id,
                    "jti": Uuid::now_v7().to_string(),
                    "nbf": time,
                    "sub": client_id,
                }));
                let assertion = Jwt::new(header, payload)
                    .sign(key)
                    .map_err(|e| AuthError::SigningFailure(e.to_string()))?;
                Ok(vec![
                    ("client_id".into(), client_id.clone()),
                    ("client_assertion".into(), assertion),
                    ("client_assertion_type".into(), ASSERTION_TYPE.into()),
                ])
            }
            Credentials::Pkce { client_id, .. } => {
                let verifier = seed.get("verifier").ok_or_else(|| {
                    AuthError::Configuration("Missing PKCE verifier in seed".into())
                })?;
                Ok(vec![
                    ("client_id".into(), client_id.clone()),
                    ("code_verifier".into(), verifier.clone()),
                ])
            }
        }
    }
}

fn to_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => unreachable!("literal objects only"),
    }
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}
