//! Injectable randomness source.
//!
//! Flows receive their entropy at construction instead of reaching for a
//! global generator, so state tokens, verifiers and nonces are deterministic
//! under test.

use std::sync::atomic::{AtomicUsize, Ordering};

use ring::rand::{SecureRandom, SystemRandom};

/// Source of random bytes for state tokens, PKCE verifiers, nonces and
/// anti-fixation tokens.
pub trait Entropy: Send + Sync {
    /// Fills the buffer with random bytes.
    fn fill(&self, buffer: &mut [u8]);
}

/// Entropy backed by the operating system's secure random generator.
pub struct SystemEntropy {
    rng: SystemRandom,
}

impl Default for SystemEntropy {
    fn default() -> Self {
        SystemEntropy { rng: SystemRandom::new() }
    }
}

impl SystemEntropy {
    /// Creates a new system-backed entropy source.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Entropy for SystemEntropy {
    fn fill(&self, buffer: &mut [u8]) {
        self.rng.fill(buffer).expect("system randomness unavailable");
    }
}

/// Deterministic entropy cycling over a fixed byte sequence. For tests.
pub struct FixedEntropy {
    bytes: Vec<u8>,
    position: AtomicUsize,
}

impl FixedEntropy {
    /// Creates a source cycling over the given bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        assert!(!bytes.is_empty(), "fixed entropy needs at least one byte");
        FixedEntropy { bytes, position: AtomicUsize::new(0) }
    }
}

impl Entropy for FixedEntropy {
    fn fill(&self, buffer: &mut [u8]) {
        let start = self.position.fetch_add(buffer.len(), Ordering::Relaxed);
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = self.bytes[(start + i) % self.bytes.len()];
        }
    }
}

/// Lower-case hex representation of the given bytes.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
