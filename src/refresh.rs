// ABOUTME: Refresh token lifecycle: issue, validate, and bulk-revoke long-lived bearer secrets
// ABOUTME: Plaintext returned once at issuance; storage holds ciphertext and a lookup hash only
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

//! Refresh Token Lifecycle Manager.
//!
//! Tokens are reusable until expiry or explicit revocation. That is a
//! deliberate security trade-off, not a bug: rotate-on-use buys replay
//! resistance at the cost of breaking every client that retries with the
//! old token, and existing deployments rely on reuse. Rotation is available
//! behind `AuthorityConfig::rotate_refresh_tokens` for deployments that
//! want it.

use crate::config::AuthorityConfig;
use crate::crypto::encryption::TokenCipher;
use crate::crypto::hashing::sha256_hex;
use crate::crypto::random::generate_token;
use crate::errors::{AuthError, AuthResult};
use crate::identity::Clock;
use crate::models::{IssuanceContext, RefreshTokenRecord};
use crate::storage::{AuthStore, RevocationScope};
use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

/// Refresh token entropy in bytes
const TOKEN_ENTROPY_BYTES: usize = 32;

/// A freshly issued refresh token; the only place the plaintext ever appears
#[derive(Debug)]
pub struct IssuedRefreshToken {
    /// The plaintext token, handed to the caller exactly once
    pub token: String,
    /// The persisted record (ciphertext and hash)
    pub record: RefreshTokenRecord,
}

/// Issues, validates, and revokes refresh tokens
pub struct RefreshTokenManager {
    store: Arc<dyn AuthStore>,
    cipher: Arc<dyn TokenCipher>,
    clock: Arc<dyn Clock>,
    ttl_days: i64,
}

impl RefreshTokenManager {
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
            ttl_days: config.refresh_token_ttl_days,
        }
    }

    /// Issue a refresh token. Only the SHA-256 hash and the AES-GCM
    /// ciphertext reach storage; the plaintext is returned once and gone.
    ///
    /// # Errors
    /// RNG, encryption, or store failures.
    pub async fn issue(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        context: IssuanceContext,
    ) -> AuthResult<IssuedRefreshToken> {
        let token = generate_token(TOKEN_ENTROPY_BYTES)?;
        let now = self.clock.now();

        let record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            user_id,
            tenant_id,
            client_id: context.client_id,
            encrypted_token: self.cipher.protect(&token)?,
            token_hash: sha256_hex(&token),
            scope: context.scope,
            created_at: now,
            expires_at: now + Duration::days(self.ttl_days),
            is_revoked: false,
            revoked_at: None,
            is_used: false,
            last_used_at: None,
            issued_from_ip: context.ip_address,
            issued_from_user_agent: context.user_agent,
        };
        self.store.store_refresh_token(&record).await?;

        tracing::info!(%user_id, %tenant_id, token_id = %record.id, "issued refresh token");
        Ok(IssuedRefreshToken { token, record })
    }

    /// Validate a presented token: hash lookup, then revocation and expiry
    /// checks, then an audit touch. Validation does NOT consume the token.
    ///
    /// # Errors
    /// `NotFound`, `Revoked`, or `Expired`; all collapse to `invalid_grant`
    /// at the wire boundary.
    pub async fn validate(&self, presented_token: &str) -> AuthResult<RefreshTokenRecord> {
        let hash = sha256_hex(presented_token);
        let record = self
            .store
            .get_refresh_token_by_hash(&hash)
            .await?
            .ok_or_else(|| {
                tracing::warn!("refresh token not found by hash");
                AuthError::NotFound
            })?;

        // Revocation is terminal, so check it before expiry
        if record.is_revoked {
            tracing::warn!(token_id = %record.id, "refresh token is revoked");
            return Err(AuthError::Revoked);
        }
        let now = self.clock.now();
        if record.expires_at <= now {
            tracing::warn!(token_id = %record.id, "refresh token is expired");
            return Err(AuthError::Expired);
        }

        self.store.touch_refresh_token(record.id, now).await?;
        Ok(record)
    }

    /// Revoke one token by record id. Idempotent.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn revoke(&self, token_id: Uuid) -> AuthResult<bool> {
        let changed = self
            .store
            .revoke_refresh_token(token_id, self.clock.now())
            .await?;
        if changed {
            tracing::info!(%token_id, "revoked refresh token");
        }
        Ok(changed)
    }

    /// Service-wide revocation for incident response. Idempotent; returns
    /// the number of tokens newly revoked.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn revoke_all(&self) -> AuthResult<u64> {
        let count = self
            .store
            .revoke_refresh_tokens(RevocationScope::All, self.clock.now())
            .await?;
        tracing::warn!(count, "revoked ALL refresh tokens");
        Ok(count)
    }

    /// Revoke every non-revoked token of a tenant. Idempotent.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn revoke_for_tenant(&self, tenant_id: Uuid) -> AuthResult<u64> {
        let count = self
            .store
            .revoke_refresh_tokens(RevocationScope::Tenant(tenant_id), self.clock.now())
            .await?;
        tracing::warn!(%tenant_id, count, "revoked refresh tokens for tenant");
        Ok(count)
    }

    /// Revoke every non-revoked token of a user. Idempotent.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn revoke_for_user(&self, user_id: Uuid) -> AuthResult<u64> {
        let count = self
            .store
            .revoke_refresh_tokens(RevocationScope::User(user_id), self.clock.now())
            .await?;
        tracing::warn!(%user_id, count, "revoked refresh tokens for user");
        Ok(count)
    }
}
