// ABOUTME: Repository-style storage abstraction for the token authority
// ABOUTME: All use-exactly-once transitions are single atomic conditional writes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

//! Storage abstraction.
//!
//! Every engine talks to one transactionally consistent [`AuthStore`].
//! The trait is deliberately repository-shaped: engines never see SQL, and
//! the store never sees protocol rules. The `consume_*` operations are the
//! load-bearing part of the contract; each one must check its precondition
//! and flip the used flag in a single statement so that two concurrent
//! redemptions of the same artifact cannot both succeed.

use crate::models::{
    AuthorizationCode, MfaChallengeToken, OAuthClient, RateLimitConfig, RefreshTokenRecord,
    Tenant, TenantEmailDomain, TenantVanityUrl, UserConsent,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// SQLite-backed store
pub mod sqlite;

pub use sqlite::SqliteStore;

/// Target of a bulk refresh-token revocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationScope {
    /// Every non-revoked refresh token in the service
    All,
    /// Every non-revoked refresh token of one tenant
    Tenant(Uuid),
    /// Every non-revoked refresh token of one user
    User(Uuid),
}

/// Parameters for the consent upsert
#[derive(Debug, Clone)]
pub struct ConsentUpsert {
    /// Granting user
    pub user_id: Uuid,
    /// Tenant the grant belongs to
    pub tenant_id: Uuid,
    /// Client the grant applies to
    pub client_id: String,
    /// Newly approved scope tokens, unioned into any existing grant
    pub scope: String,
    /// Confirmation time; refreshes `last_confirmed_at`
    pub now: DateTime<Utc>,
    /// Optional explicit expiry
    pub expires_at: Option<DateTime<Utc>>,
}

/// Transactional store behind all engines
#[async_trait]
pub trait AuthStore: Send + Sync {
    // ================================
    // Tenants
    // ================================

    /// Fetch a tenant by id.
    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>>;

    /// Fetch the tenant owning an email domain; active mappings only.
    async fn get_tenant_by_email_domain(&self, domain: &str) -> Result<Option<Tenant>>;

    /// Fetch the tenant owning a vanity hostname; active mappings only.
    async fn get_tenant_by_vanity_host(&self, hostname: &str) -> Result<Option<Tenant>>;

    /// Persist a tenant.
    async fn store_tenant(&self, tenant: &Tenant) -> Result<()>;

    /// Persist an email-domain lookup key.
    async fn store_email_domain(&self, mapping: &TenantEmailDomain) -> Result<()>;

    /// Persist a vanity-hostname lookup key.
    async fn store_vanity_url(&self, mapping: &TenantVanityUrl) -> Result<()>;

    // ================================
    // OAuth clients
    // ================================

    /// Persist a newly registered client.
    async fn store_client(&self, client: &OAuthClient) -> Result<()>;

    /// Fetch a client by id.
    async fn get_client(&self, client_id: &str) -> Result<Option<OAuthClient>>;

    /// Replace a client's mutable registration fields.
    async fn update_client(&self, client: &OAuthClient) -> Result<()>;

    /// Swap the stored secret hash; the previous secret stops verifying
    /// immediately.
    async fn update_client_secret_hash(&self, client_id: &str, secret_hash: &str) -> Result<()>;

    // ================================
    // Authorization codes
    // ================================

    /// Persist a freshly issued code.
    async fn store_auth_code(&self, code: &AuthorizationCode) -> Result<()>;

    /// Fetch a code without consuming it. Diagnostic use only: redemption
    /// goes through [`AuthStore::consume_auth_code`].
    async fn get_auth_code(&self, code: &str) -> Result<Option<AuthorizationCode>>;

    /// Atomically mark a code used iff it is unused, unexpired, and bound to
    /// exactly this client and redirect URI. Returns the consumed row, or
    /// `None` when any precondition failed. At most one concurrent caller
    /// ever receives `Some`.
    async fn consume_auth_code(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthorizationCode>>;

    /// Reap expired codes; returns the number deleted.
    async fn delete_expired_auth_codes(&self, now: DateTime<Utc>) -> Result<u64>;

    // ================================
    // Refresh tokens
    // ================================

    /// Persist a refresh token record (ciphertext and hash only).
    async fn store_refresh_token(&self, token: &RefreshTokenRecord) -> Result<()>;

    /// Look up a refresh token by the SHA-256 hash of its plaintext.
    async fn get_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>>;

    /// Audit touch after a successful validation. Does not invalidate.
    async fn touch_refresh_token(&self, id: Uuid, now: DateTime<Utc>) -> Result<()>;

    /// Revoke a single refresh token. Returns whether a row changed.
    async fn revoke_refresh_token(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool>;

    /// Set-based bulk revocation. Idempotent: already-revoked rows are
    /// untouched and uncounted. Returns the number of rows revoked.
    async fn revoke_refresh_tokens(
        &self,
        scope: RevocationScope,
        now: DateTime<Utc>,
    ) -> Result<u64>;

    // ================================
    // MFA challenge tokens
    // ================================

    /// Persist a freshly issued challenge.
    async fn store_mfa_token(&self, token: &MfaChallengeToken) -> Result<()>;

    /// Fetch a challenge by hash without consuming it. Diagnostic use only.
    async fn get_mfa_token_by_hash(&self, token_hash: &str)
        -> Result<Option<MfaChallengeToken>>;

    /// Atomically mark a challenge used iff unused and unexpired. Returns the
    /// consumed row, or `None`. At most one concurrent caller receives `Some`.
    async fn consume_mfa_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MfaChallengeToken>>;

    /// Reap expired challenges; returns the number deleted.
    async fn delete_expired_mfa_tokens(&self, now: DateTime<Utc>) -> Result<u64>;

    // ================================
    // Consents
    // ================================

    /// Fetch the consent row for a user/tenant/client triple.
    async fn get_consent(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        client_id: &str,
    ) -> Result<Option<UserConsent>>;

    /// Upsert a consent: insert a new row, or union the scope tokens into the
    /// existing grant and refresh `last_confirmed_at`.
    async fn upsert_consent(&self, upsert: &ConsentUpsert) -> Result<()>;

    // ================================
    // Rate limit policies
    // ================================

    /// Fetch the abuse-control policy for an endpoint key.
    async fn get_rate_limit_config(&self, endpoint_key: &str) -> Result<Option<RateLimitConfig>>;

    /// Create or replace an endpoint policy.
    async fn upsert_rate_limit_config(&self, config: &RateLimitConfig) -> Result<()>;
}
