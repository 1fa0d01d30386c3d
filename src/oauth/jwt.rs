//! Compact-serialization JWT signing and verification, RS256 only.
//!
//! Kept deliberately small: the certificate credential strategy needs full
//! control over the header (`x5t`) and callers need distinct, assertable
//! error kinds, so the compact serialization lives here while the RSA
//! primitives come from `jsonwebtoken`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use serde_json::{Map, Value};

use crate::error::JwtError;

/// A JSON Web Token as a header and payload pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Jwt {
    header: Map<String, Value>,
    payload: Map<String, Value>,
}

impl Jwt {
    /// Creates a JWT with the given header and payload. The `alg` header
    /// defaults to `RS256`, the only supported algorithm.
    pub fn new(mut header: Map<String, Value>, payload: Map<String, Value>) -> Self {
        header
            .entry("alg".to_string())
            .or_insert_with(|| Value::String("RS256".into()));
        Jwt { header, payload }
    }

    /// The token header.
    pub fn header(&self) -> &Map<String, Value> {
        &self.header
    }

    /// The token payload.
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Returns a payload claim, or `None` if it is absent.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }

    /// URL-safe base64 without padding.
    pub fn encode(bytes: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Decodes URL-safe base64 without padding.
    pub fn decode(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
        URL_SAFE_NO_PAD.decode(encoded)
    }

    /// Signs this token with an RSA private key, returning the compact
    /// serialization `header.payload.signature`.
    pub fn sign(&self, key: &EncodingKey) -> Result<String, JwtError> {
        let message = format!(
            "{}.{}",
            Self::encode(&serde_json::to_vec(&self.header).expect("header serialization")),
            Self::encode(&serde_json::to_vec(&self.payload).expect("payload serialization")),
        );
        let signature = jsonwebtoken::crypto::sign(message.as_bytes(), key, Algorithm::RS256)
            .map_err(|e| JwtError::Signing(e.to_string()))?;
        Ok(format!("{message}.{signature}"))
    }

    /// Verifies a compact-serialized token against an RSA public key,
    /// returning the contained JWT.
    ///
    /// Malformed segments, algorithms other than RS256 and signature
    /// mismatches each fail with their own [`JwtError`] kind.
    pub fn verify(token: &str, key: &DecodingKey) -> Result<Jwt, JwtError> {
        let segments: Vec<&str> = token.split('.').collect();
        let &[header, payload, signature] = segments.as_slice() else {
            return Err(JwtError::Malformed);
        };

        let header: Map<String, Value> = Self::decode(header)
            .map_err(|e| JwtError::HeaderParsing(e.to_string()))
            .and_then(|bytes| {
                serde_json::from_slice(&bytes).map_err(|e| JwtError::HeaderParsing(e.to_string()))
            })?;
        match header.get("alg").and_then(Value::as_str) {
            Some("RS256") => {}
            other => return Err(JwtError::UnsupportedAlgorithm(other.map(String::from))),
        }

        let payload: Map<String, Value> = Self::decode(payload)
            .map_err(|e| JwtError::PayloadParsing(e.to_string()))
            .and_then(|bytes| {
                serde_json::from_slice(&bytes).map_err(|e| JwtError::PayloadParsing(e.to_string()))
            })?;

        let message = &token[..token.len() - signature.len() - 1];
        match jsonwebtoken::crypto::verify(signature, message.as_bytes(), key, Algorithm::RS256) {
            Ok(true) => Ok(Jwt { header, payload }),
            _ => Err(JwtError::SignatureMismatch),
        }
    }

    /// Like [`Jwt::verify`], but collapses all failure kinds into `None`.
    pub fn try_verify(token: &str, key: &DecodingKey) -> Option<Jwt> {
        Self::verify(token, key).ok()
    }
}
