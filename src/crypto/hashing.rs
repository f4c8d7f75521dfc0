// ABOUTME: Token hashing helpers: SHA-256 lookup hashes and PKCE challenge derivation
// ABOUTME: Comparisons on secret material are constant-time
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// SHA-256 hex digest, used as the lookup key for refresh and MFA tokens.
/// The plaintext never reaches storage.
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// SHA-256 base64url digest, the S256 transform of RFC 7636 §4.2:
/// `code_challenge = base64url(sha256(code_verifier))`.
#[must_use]
pub fn sha256_base64url(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Constant-time equality for secret-derived strings (PKCE challenges,
/// token hashes).
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
