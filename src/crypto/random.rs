// ABOUTME: Cryptographically secure random generation for codes, tokens, and keys
// ABOUTME: Backed by the system CSPRNG via ring
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};

/// Generate a URL-safe random token with `byte_len` bytes of entropy.
///
/// 32 bytes (256 bits) is the default for authorization codes, refresh
/// tokens, and MFA challenges, comfortably above the 128-bit floor
/// RFC 6749 §10.10 requires for guessable credentials.
///
/// # Errors
/// Returns an error if the system RNG fails. The authority cannot operate
/// securely without a working RNG, so callers must propagate this.
pub fn generate_token(byte_len: usize) -> Result<String> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; byte_len];
    rng.fill(&mut bytes).map_err(|e| {
        tracing::error!("system RNG failure, cannot generate secure random bytes: {e}");
        anyhow!("system RNG failure")
    })?;
    Ok(general_purpose::URL_SAFE_NO_PAD.encode(&bytes))
}

/// Generate a fresh 256-bit key for at-rest encryption.
///
/// # Errors
/// Returns an error if the system RNG fails.
pub fn generate_encryption_key() -> Result<[u8; 32]> {
    let rng = SystemRandom::new();
    let mut key = [0u8; 32];
    rng.fill(&mut key)
        .map_err(|e| anyhow!("system RNG failure: {e}"))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_and_url_safe() {
        let a = generate_token(32).unwrap();
        let b = generate_token(32).unwrap();
        assert_ne!(a, b);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        // 32 bytes base64url without padding is 43 characters
        assert_eq!(a.len(), 43);
    }
}
