//! OAuth 1.0a HMAC-SHA1 request signing.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use ring::hmac;
use secrecy::{ExposeSecret, SecretString};
use urlencoding::encode;

use crate::flow::entropy::{Entropy, SystemEntropy, hex};

/// Signs requests with a consumer key/secret pair and, after the handshake,
/// an additional token key/secret pair.
#[derive(Clone)]
pub struct Signature {
    consumer_key: String,
    consumer_secret: SecretString,
    token: Option<(String, SecretString)>,
    entropy: Arc<dyn Entropy>,
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("consumer_key", &self.consumer_key)
            .field("token", &self.token.as_ref().map(|(key, _)| key))
            .finish_non_exhaustive()
    }
}

impl Signature {
    /// Creates a signature for the given consumer credentials.
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Signature {
            consumer_key: consumer_key.into(),
            consumer_secret: SecretString::from(consumer_secret.into()),
            token: None,
            entropy: Arc::new(SystemEntropy::new()),
        }
    }

    /// Replaces the nonce entropy source. For deterministic tests.
    pub fn with_entropy(mut self, entropy: Arc<dyn Entropy>) -> Self {
        self.entropy = entropy;
        self
    }

    /// Returns a signature additionally keyed by the given token pair.
    pub fn with_token(&self, key: impl Into<String>, secret: impl Into<String>) -> Self {
        Signature {
            consumer_key: self.consumer_key.clone(),
            consumer_secret: self.consumer_secret.clone(),
            token: Some((key.into(), SecretString::from(secret.into()))),
            entropy: self.entropy.clone(),
        }
    }

    /// The consumer key.
    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    /// Computes the `Authorization` header for a request.
    ///
    /// Parameters are sorted by byte-wise key comparison and percent-encoded
    /// per OAuth1 rules, with values encoded twice for the base-string join.
    /// `oauth_nonce` and `oauth_timestamp` default from the entropy source
    /// and the clock unless supplied in `parameters`.
    pub fn header(&self, method: &str, url: &str, parameters: &[(String, String)]) -> String {
        let mut params: BTreeMap<String, String> = parameters.iter().cloned().collect();
        params
            .entry("oauth_version".into())
            .or_insert_with(|| "1.0".into());
        params.entry("oauth_nonce".into()).or_insert_with(|| {
            let mut buffer = [0u8; 16];
            self.entropy.fill(&mut buffer);
            hex(&buffer)
        });
        params
            .entry("oauth_timestamp".into())
            .or_insert_with(|| Utc::now().timestamp().to_string());
        params
            .entry("oauth_consumer_key".into())
            .or_insert_with(|| self.consumer_key.clone());
        params
            .entry("oauth_signature_method".into())
            .or_insert_with(|| "HMAC-SHA1".into());

        let mut key = format!("{}&", encode(self.consumer_secret.expose_secret()));
        if let Some((token_key, token_secret)) = &self.token {
            params
                .entry("oauth_token".into())
                .or_insert_with(|| token_key.clone());
            key.push_str(&encode(token_secret.expose_secret()));
        }

        let mut joined = String::new();
        for (name, value) in &params {
            joined.push_str("%26");
            joined.push_str(name);
            joined.push_str("%3D");
            joined.push_str(&encode(&encode(value)));
        }
        let base = format!("{}&{}&{}", method, encode(url), &joined[3..]);

        let tag = hmac::sign(
            &hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, key.as_bytes()),
            base.as_bytes(),
        );
        let signature = STANDARD.encode(tag.as_ref());

        let mut header = String::from("OAuth ");
        for (name, value) in &params {
            header.push_str(&format!("{}=\"{}\", ", name, encode(value)));
        }
        header.push_str(&format!("oauth_signature=\"{}\"", encode(&signature)));
        header
    }
}
