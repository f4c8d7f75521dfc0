// ABOUTME: JWKS (JSON Web Key Set) document for public verification key distribution
// ABOUTME: Supports AKP keys for ML-DSA and RSA keys for the legacy path
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

//! JWKS discovery document.
//!
//! Resource servers fetch this independently to verify access tokens
//! offline. ML-DSA public keys use the `AKP` key type with a `pub`
//! parameter (JOSE post-quantum registration); the deprecated RSA path
//! publishes classic `RSA` keys with `n`/`e`.

use serde::{Deserialize, Serialize};

/// One public verification key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type: `AKP` for ML-DSA, `RSA` for the legacy path
    pub kty: String,
    /// Public key use, always `sig`
    #[serde(rename = "use")]
    pub key_use: String,
    /// Key id, matched against the JWT `kid` header
    pub kid: String,
    /// JOSE algorithm: `ML-DSA-65` or `RS256`
    pub alg: String,
    /// AKP public key bytes, base64url (ML-DSA only)
    #[serde(rename = "pub", skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// RSA modulus, base64url (legacy only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA exponent, base64url (legacy only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
}

/// The published key set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwksDocument {
    /// Active verification keys
    pub keys: Vec<JsonWebKey>,
}
