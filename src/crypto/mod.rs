// ABOUTME: Cryptographic primitives for the token authority
// ABOUTME: Secure randomness, at-rest encryption, and hashing helpers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

/// At-rest encryption of bearer secrets
pub mod encryption;
/// Token hashing and constant-time comparison
pub mod hashing;
/// CSPRNG code and token generation
pub mod random;

pub use encryption::{AesGcmCipher, TokenCipher};
pub use hashing::{constant_time_eq, sha256_base64url, sha256_hex};
pub use random::{generate_encryption_key, generate_token};
