// ABOUTME: MFA challenge token manager for step-up authentication flows
// ABOUTME: Same shape as refresh tokens but strictly single-use
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

//! MFA Challenge Token Manager.
//!
//! A challenge token bridges the gap between a first-factor success and
//! final token issuance. Redemption is an atomic check-and-set on the
//! store: the first redemption wins, every later attempt gets
//! `AlreadyUsed` even inside the TTL window.

use crate::config::AuthorityConfig;
use crate::crypto::encryption::TokenCipher;
use crate::crypto::hashing::sha256_hex;
use crate::crypto::random::generate_token;
use crate::errors::{AuthError, AuthResult};
use crate::identity::Clock;
use crate::models::MfaChallengeToken;
use crate::storage::AuthStore;
use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

/// Challenge token entropy in bytes
const TOKEN_ENTROPY_BYTES: usize = 32;

/// A freshly issued challenge; the only place the plaintext ever appears
#[derive(Debug)]
pub struct IssuedMfaToken {
    /// The plaintext challenge token
    pub token: String,
    /// The persisted record
    pub record: MfaChallengeToken,
}

/// Issues and redeems single-use step-up-auth tokens
pub struct MfaChallengeManager {
    store: Arc<dyn AuthStore>,
    cipher: Arc<dyn TokenCipher>,
    clock: Arc<dyn Clock>,
    ttl_secs: i64,
}

impl MfaChallengeManager {
    /// Create a manager over the shared store and the at-rest cipher.
    #[must_use]
    pub fn new(
        store: Arc<dyn AuthStore>,
        cipher: Arc<dyn TokenCipher>,
        clock: Arc<dyn Clock>,
        config: &AuthorityConfig,
    ) -> Self {
        Self {
            store,
            cipher,
            clock,
            ttl_secs: config.mfa_token_ttl_secs,
        }
    }

    /// Issue a challenge token for a user mid step-up flow.
    ///
    /// # Errors
    /// RNG, encryption, or store failures.
    pub async fn issue(&self, user_id: Uuid, tenant_id: Uuid) -> AuthResult<IssuedMfaToken> {
        let token = generate_token(TOKEN_ENTROPY_BYTES)?;
        let now = self.clock.now();

        let record = MfaChallengeToken {
            id: Uuid::new_v4(),
            user_id,
            tenant_id,
            encrypted_token: self.cipher.protect(&token)?,
            token_hash: sha256_hex(&token),
            created_at: now,
            expires_at: now + Duration::seconds(self.ttl_secs),
            is_used: false,
            used_at: None,
        };
        self.store.store_mfa_token(&record).await?;

        tracing::debug!(%user_id, %tenant_id, challenge_id = %record.id, "issued mfa challenge");
        Ok(IssuedMfaToken { token, record })
    }

    /// Redeem a challenge exactly once.
    ///
    /// # Errors
    /// `NotFound`, `Expired`, or `AlreadyUsed`; all collapse to
    /// `invalid_grant` at the wire boundary.
    pub async fn redeem(&self, presented_token: &str) -> AuthResult<MfaChallengeToken> {
        let hash = sha256_hex(presented_token);
        let now = self.clock.now();

        if let Some(record) = self.store.consume_mfa_token(&hash, now).await? {
            tracing::info!(user_id = %record.user_id, challenge_id = %record.id, "mfa challenge redeemed");
            return Ok(record);
        }

        // The conditional write missed; classify for the log, diagnostics only
        let error = match self.store.get_mfa_token_by_hash(&hash).await? {
            None => AuthError::NotFound,
            Some(record) if record.is_used => AuthError::AlreadyUsed,
            Some(_) => AuthError::Expired,
        };
        tracing::warn!(reason = %error, "mfa challenge redemption rejected");
        Err(error)
    }
}
