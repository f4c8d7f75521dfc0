// ABOUTME: At-rest encryption of bearer secrets behind the TokenCipher capability
// ABOUTME: AES-256-GCM with a fresh nonce prepended to each ciphertext
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

//! Encryption-at-rest collaborator.
//!
//! Refresh and MFA tokens are stored as ciphertext only; the key is owned
//! outside this subsystem and injected at startup. [`AesGcmCipher`] is the
//! stock implementation; deployments with an external KMS implement
//! [`TokenCipher`] themselves.

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

/// Protect/unprotect capability for bearer secrets at rest
pub trait TokenCipher: Send + Sync {
    /// Encrypt a plaintext secret for storage.
    ///
    /// # Errors
    /// Returns an error if encryption fails.
    fn protect(&self, plaintext: &str) -> Result<String>;

    /// Decrypt a stored ciphertext back to the plaintext secret.
    ///
    /// # Errors
    /// Returns an error if the ciphertext is malformed or fails
    /// authentication.
    fn unprotect(&self, ciphertext: &str) -> Result<String>;
}

/// AES-256-GCM cipher with per-value nonces.
///
/// Each ciphertext is `base64(nonce || sealed)` so values are independently
/// decryptable and nonces are never reused across rows.
pub struct AesGcmCipher {
    key: Zeroizing<[u8; 32]>,
}

impl AesGcmCipher {
    /// Create a cipher from a 256-bit key.
    #[must_use]
    pub fn new(key: [u8; 32]) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }

    fn sealing_key(&self) -> Result<LessSafeKey> {
        let unbound = UnboundKey::new(&AES_256_GCM, self.key.as_ref())
            .map_err(|e| anyhow!("invalid encryption key: {e}"))?;
        Ok(LessSafeKey::new(unbound))
    }
}

impl TokenCipher for AesGcmCipher {
    fn protect(&self, plaintext: &str) -> Result<String> {
        let rng = SystemRandom::new();
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rng.fill(&mut nonce_bytes)
            .map_err(|e| anyhow!("system RNG failure: {e}"))?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let key = self.sealing_key()?;
        let mut data = plaintext.as_bytes().to_vec();
        key.seal_in_place_append_tag(nonce, Aad::empty(), &mut data)
            .map_err(|e| anyhow!("encryption failed: {e}"))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend(data);
        Ok(general_purpose::STANDARD.encode(combined))
    }

    fn unprotect(&self, ciphertext: &str) -> Result<String> {
        let combined = general_purpose::STANDARD
            .decode(ciphertext)
            .map_err(|e| anyhow!("malformed ciphertext: {e}"))?;
        if combined.len() <= NONCE_LEN {
            return Err(anyhow!("ciphertext too short"));
        }

        let (nonce_bytes, sealed) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|e| anyhow!("malformed nonce: {e}"))?;

        let key = self.sealing_key()?;
        let mut data = sealed.to_vec();
        let plaintext = key
            .open_in_place(nonce, Aad::empty(), &mut data)
            .map_err(|e| anyhow!("decryption failed: {e}"))?;

        String::from_utf8(plaintext.to_vec()).map_err(|e| anyhow!("invalid plaintext: {e}"))
    }
}
