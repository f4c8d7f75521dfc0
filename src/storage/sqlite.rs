// ABOUTME: SQLite implementation of the AuthStore trait via sqlx
// ABOUTME: Single-use transitions are conditional UPDATE ... RETURNING statements
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

use super::{AuthStore, ConsentUpsert, RevocationScope};
use crate::models::{
    AuthorizationCode, CodeChallengeMethod, MfaChallengeToken, OAuthClient, RateLimitConfig,
    RefreshTokenRecord, Tenant, TenantEmailDomain, TenantVanityUrl, UserConsent,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

/// How many optimistic retries the consent scope-union CAS loop attempts
/// before giving up.
const CONSENT_UPSERT_RETRIES: usize = 5;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS tenants (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS tenant_email_domains (
        domain TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL REFERENCES tenants(id),
        is_active INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE TABLE IF NOT EXISTS tenant_vanity_urls (
        hostname TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL REFERENCES tenants(id),
        is_active INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE TABLE IF NOT EXISTS oauth_clients (
        client_id TEXT PRIMARY KEY,
        client_secret_hash TEXT,
        redirect_uris TEXT NOT NULL,
        is_confidential INTEGER NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        tenant_id TEXT,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS authorization_codes (
        code TEXT PRIMARY KEY,
        client_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        tenant_id TEXT NOT NULL,
        redirect_uri TEXT NOT NULL,
        scope TEXT,
        state TEXT,
        code_challenge TEXT,
        code_challenge_method TEXT,
        created_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL,
        is_used INTEGER NOT NULL DEFAULT 0,
        used_at INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS refresh_tokens (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        tenant_id TEXT NOT NULL,
        client_id TEXT,
        encrypted_token TEXT NOT NULL,
        token_hash TEXT NOT NULL UNIQUE,
        scope TEXT,
        created_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL,
        is_revoked INTEGER NOT NULL DEFAULT 0,
        revoked_at INTEGER,
        is_used INTEGER NOT NULL DEFAULT 0,
        last_used_at INTEGER,
        issued_from_ip TEXT,
        issued_from_user_agent TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user ON refresh_tokens(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_tenant ON refresh_tokens(tenant_id)",
    "CREATE TABLE IF NOT EXISTS mfa_challenge_tokens (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        tenant_id TEXT NOT NULL,
        encrypted_token TEXT NOT NULL,
        token_hash TEXT NOT NULL UNIQUE,
        created_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL,
        is_used INTEGER NOT NULL DEFAULT 0,
        used_at INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS user_consents (
        user_id TEXT NOT NULL,
        tenant_id TEXT NOT NULL,
        client_id TEXT NOT NULL,
        scope TEXT NOT NULL,
        granted_at INTEGER NOT NULL,
        last_confirmed_at INTEGER NOT NULL,
        expires_at INTEGER,
        UNIQUE(user_id, tenant_id, client_id)
    )",
    "CREATE TABLE IF NOT EXISTS rate_limit_configs (
        endpoint_key TEXT PRIMARY KEY,
        permitted_requests INTEGER NOT NULL,
        window_seconds INTEGER NOT NULL,
        is_enabled INTEGER NOT NULL DEFAULT 1
    )",
];

/// SQLite-backed [`AuthStore`]
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open a connection pool and create the schema.
    ///
    /// In-memory databases get a single-connection pool so every statement
    /// sees the same database.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database url: {database_url}"))?
            .create_if_missing(true);

        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            5
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("failed to open sqlite database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("schema migration failed")?;
        }
        tracing::debug!("sqlite schema ready");
        Ok(())
    }
}

fn timestamp(value: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(value, 0).ok_or_else(|| anyhow!("invalid stored timestamp: {value}"))
}

fn optional_timestamp(value: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    value.map(timestamp).transpose()
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("invalid stored uuid: {value}"))
}

fn tenant_from_row(row: &SqliteRow) -> Result<Tenant> {
    Ok(Tenant {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        name: row.try_get("name")?,
        is_active: row.try_get::<i64, _>("is_active")? != 0,
        created_at: timestamp(row.try_get("created_at")?)?,
    })
}

fn client_from_row(row: &SqliteRow) -> Result<OAuthClient> {
    let redirect_uris: String = row.try_get("redirect_uris")?;
    let tenant_id: Option<String> = row.try_get("tenant_id")?;
    Ok(OAuthClient {
        client_id: row.try_get("client_id")?,
        client_secret_hash: row.try_get("client_secret_hash")?,
        redirect_uris: serde_json::from_str(&redirect_uris)
            .context("invalid stored redirect_uris")?,
        is_confidential: row.try_get::<i64, _>("is_confidential")? != 0,
        is_active: row.try_get::<i64, _>("is_active")? != 0,
        tenant_id: tenant_id.as_deref().map(parse_uuid).transpose()?,
        created_at: timestamp(row.try_get("created_at")?)?,
    })
}

fn auth_code_from_row(row: &SqliteRow) -> Result<AuthorizationCode> {
    let method: Option<String> = row.try_get("code_challenge_method")?;
    Ok(AuthorizationCode {
        code: row.try_get("code")?,
        client_id: row.try_get("client_id")?,
        user_id: parse_uuid(&row.try_get::<String, _>("user_id")?)?,
        tenant_id: parse_uuid(&row.try_get::<String, _>("tenant_id")?)?,
        redirect_uri: row.try_get("redirect_uri")?,
        scope: row.try_get("scope")?,
        state: row.try_get("state")?,
        code_challenge: row.try_get("code_challenge")?,
        code_challenge_method: method
            .as_deref()
            .map(CodeChallengeMethod::from_str)
            .transpose()
            .map_err(|e| anyhow!(e))?,
        created_at: timestamp(row.try_get("created_at")?)?,
        expires_at: timestamp(row.try_get("expires_at")?)?,
        is_used: row.try_get::<i64, _>("is_used")? != 0,
        used_at: optional_timestamp(row.try_get("used_at")?)?,
    })
}

fn refresh_token_from_row(row: &SqliteRow) -> Result<RefreshTokenRecord> {
    Ok(RefreshTokenRecord {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        user_id: parse_uuid(&row.try_get::<String, _>("user_id")?)?,
        tenant_id: parse_uuid(&row.try_get::<String, _>("tenant_id")?)?,
        client_id: row.try_get("client_id")?,
        encrypted_token: row.try_get("encrypted_token")?,
        token_hash: row.try_get("token_hash")?,
        scope: row.try_get("scope")?,
        created_at: timestamp(row.try_get("created_at")?)?,
        expires_at: timestamp(row.try_get("expires_at")?)?,
        is_revoked: row.try_get::<i64, _>("is_revoked")? != 0,
        revoked_at: optional_timestamp(row.try_get("revoked_at")?)?,
        is_used: row.try_get::<i64, _>("is_used")? != 0,
        last_used_at: optional_timestamp(row.try_get("last_used_at")?)?,
        issued_from_ip: row.try_get("issued_from_ip")?,
        issued_from_user_agent: row.try_get("issued_from_user_agent")?,
    })
}

fn mfa_token_from_row(row: &SqliteRow) -> Result<MfaChallengeToken> {
    Ok(MfaChallengeToken {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        user_id: parse_uuid(&row.try_get::<String, _>("user_id")?)?,
        tenant_id: parse_uuid(&row.try_get::<String, _>("tenant_id")?)?,
        encrypted_token: row.try_get("encrypted_token")?,
        token_hash: row.try_get("token_hash")?,
        created_at: timestamp(row.try_get("created_at")?)?,
        expires_at: timestamp(row.try_get("expires_at")?)?,
        is_used: row.try_get::<i64, _>("is_used")? != 0,
        used_at: optional_timestamp(row.try_get("used_at")?)?,
    })
}

fn consent_from_row(row: &SqliteRow) -> Result<UserConsent> {
    Ok(UserConsent {
        user_id: parse_uuid(&row.try_get::<String, _>("user_id")?)?,
        tenant_id: parse_uuid(&row.try_get::<String, _>("tenant_id")?)?,
        client_id: row.try_get("client_id")?,
        scope: row.try_get("scope")?,
        granted_at: timestamp(row.try_get("granted_at")?)?,
        last_confirmed_at: timestamp(row.try_get("last_confirmed_at")?)?,
        expires_at: optional_timestamp(row.try_get("expires_at")?)?,
    })
}

#[async_trait]
impl AuthStore for SqliteStore {
    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>> {
        let row = sqlx::query("SELECT * FROM tenants WHERE id = ?1")
            .bind(tenant_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("failed to query tenant")?;
        row.as_ref().map(tenant_from_row).transpose()
    }

    async fn get_tenant_by_email_domain(&self, domain: &str) -> Result<Option<Tenant>> {
        let row = sqlx::query(
            "SELECT t.* FROM tenants t
             JOIN tenant_email_domains d ON d.tenant_id = t.id
             WHERE d.domain = ?1 AND d.is_active = 1",
        )
        .bind(domain)
        .fetch_optional(&self.pool)
        .await
        .context("failed to query tenant by email domain")?;
        row.as_ref().map(tenant_from_row).transpose()
    }

    async fn get_tenant_by_vanity_host(&self, hostname: &str) -> Result<Option<Tenant>> {
        let row = sqlx::query(
            "SELECT t.* FROM tenants t
             JOIN tenant_vanity_urls v ON v.tenant_id = t.id
             WHERE v.hostname = ?1 AND v.is_active = 1",
        )
        .bind(hostname)
        .fetch_optional(&self.pool)
        .await
        .context("failed to query tenant by vanity host")?;
        row.as_ref().map(tenant_from_row).transpose()
    }

    async fn store_tenant(&self, tenant: &Tenant) -> Result<()> {
        sqlx::query("INSERT INTO tenants (id, name, is_active, created_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(tenant.id.to_string())
            .bind(&tenant.name)
            .bind(i64::from(tenant.is_active))
            .bind(tenant.created_at.timestamp())
            .execute(&self.pool)
            .await
            .context("failed to store tenant")?;
        Ok(())
    }

    async fn store_email_domain(&self, mapping: &TenantEmailDomain) -> Result<()> {
        sqlx::query(
            "INSERT INTO tenant_email_domains (domain, tenant_id, is_active) VALUES (?1, ?2, ?3)",
        )
        .bind(&mapping.domain)
        .bind(mapping.tenant_id.to_string())
        .bind(i64::from(mapping.is_active))
        .execute(&self.pool)
        .await
        .context("failed to store tenant email domain")?;
        Ok(())
    }

    async fn store_vanity_url(&self, mapping: &TenantVanityUrl) -> Result<()> {
        sqlx::query(
            "INSERT INTO tenant_vanity_urls (hostname, tenant_id, is_active) VALUES (?1, ?2, ?3)",
        )
        .bind(&mapping.hostname)
        .bind(mapping.tenant_id.to_string())
        .bind(i64::from(mapping.is_active))
        .execute(&self.pool)
        .await
        .context("failed to store tenant vanity url")?;
        Ok(())
    }

    async fn store_client(&self, client: &OAuthClient) -> Result<()> {
        sqlx::query(
            "INSERT INTO oauth_clients
             (client_id, client_secret_hash, redirect_uris, is_confidential, is_active, tenant_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&client.client_id)
        .bind(&client.client_secret_hash)
        .bind(serde_json::to_string(&client.redirect_uris)?)
        .bind(i64::from(client.is_confidential))
        .bind(i64::from(client.is_active))
        .bind(client.tenant_id.map(|id| id.to_string()))
        .bind(client.created_at.timestamp())
        .execute(&self.pool)
        .await
        .context("failed to store oauth client")?;
        Ok(())
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<OAuthClient>> {
        let row = sqlx::query("SELECT * FROM oauth_clients WHERE client_id = ?1")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to query oauth client")?;
        row.as_ref().map(client_from_row).transpose()
    }

    async fn update_client(&self, client: &OAuthClient) -> Result<()> {
        sqlx::query(
            "UPDATE oauth_clients SET
               redirect_uris = ?2, is_confidential = ?3, is_active = ?4, tenant_id = ?5
             WHERE client_id = ?1",
        )
        .bind(&client.client_id)
        .bind(serde_json::to_string(&client.redirect_uris)?)
        .bind(i64::from(client.is_confidential))
        .bind(i64::from(client.is_active))
        .bind(client.tenant_id.map(|id| id.to_string()))
        .execute(&self.pool)
        .await
        .context("failed to update oauth client")?;
        Ok(())
    }

    async fn update_client_secret_hash(&self, client_id: &str, secret_hash: &str) -> Result<()> {
        let result =
            sqlx::query("UPDATE oauth_clients SET client_secret_hash = ?2 WHERE client_id = ?1")
                .bind(client_id)
                .bind(secret_hash)
                .execute(&self.pool)
                .await
                .context("failed to rotate client secret")?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("unknown client: {client_id}"));
        }
        Ok(())
    }

    async fn store_auth_code(&self, code: &AuthorizationCode) -> Result<()> {
        sqlx::query(
            "INSERT INTO authorization_codes
             (code, client_id, user_id, tenant_id, redirect_uri, scope, state,
              code_challenge, code_challenge_method, created_at, expires_at, is_used, used_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )
        .bind(&code.code)
        .bind(&code.client_id)
        .bind(code.user_id.to_string())
        .bind(code.tenant_id.to_string())
        .bind(&code.redirect_uri)
        .bind(&code.scope)
        .bind(&code.state)
        .bind(&code.code_challenge)
        .bind(code.code_challenge_method.map(|m| m.to_string()))
        .bind(code.created_at.timestamp())
        .bind(code.expires_at.timestamp())
        .bind(i64::from(code.is_used))
        .bind(code.used_at.map(|t| t.timestamp()))
        .execute(&self.pool)
        .await
        .context("failed to store authorization code")?;
        Ok(())
    }

    async fn get_auth_code(&self, code: &str) -> Result<Option<AuthorizationCode>> {
        let row = sqlx::query("SELECT * FROM authorization_codes WHERE code = ?1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .context("failed to query authorization code")?;
        row.as_ref().map(auth_code_from_row).transpose()
    }

    async fn consume_auth_code(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthorizationCode>> {
        // Single conditional write: every redemption precondition lives in
        // the WHERE clause, so of N concurrent redemptions exactly one can
        // flip is_used and receive the row back.
        let row = sqlx::query(
            "UPDATE authorization_codes
               SET is_used = 1, used_at = ?1
             WHERE code = ?2 AND is_used = 0 AND expires_at > ?1
               AND client_id = ?3 AND redirect_uri = ?4
             RETURNING *",
        )
        .bind(now.timestamp())
        .bind(code)
        .bind(client_id)
        .bind(redirect_uri)
        .fetch_optional(&self.pool)
        .await
        .context("failed to consume authorization code")?;
        row.as_ref().map(auth_code_from_row).transpose()
    }

    async fn delete_expired_auth_codes(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM authorization_codes WHERE expires_at <= ?1")
            .bind(now.timestamp())
            .execute(&self.pool)
            .await
            .context("failed to reap authorization codes")?;
        Ok(result.rows_affected())
    }

    async fn store_refresh_token(&self, token: &RefreshTokenRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO refresh_tokens
             (id, user_id, tenant_id, client_id, encrypted_token, token_hash, scope,
              created_at, expires_at, is_revoked, revoked_at, is_used, last_used_at,
              issued_from_ip, issued_from_user_agent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        )
        .bind(token.id.to_string())
        .bind(token.user_id.to_string())
        .bind(token.tenant_id.to_string())
        .bind(&token.client_id)
        .bind(&token.encrypted_token)
        .bind(&token.token_hash)
        .bind(&token.scope)
        .bind(token.created_at.timestamp())
        .bind(token.expires_at.timestamp())
        .bind(i64::from(token.is_revoked))
        .bind(token.revoked_at.map(|t| t.timestamp()))
        .bind(i64::from(token.is_used))
        .bind(token.last_used_at.map(|t| t.timestamp()))
        .bind(&token.issued_from_ip)
        .bind(&token.issued_from_user_agent)
        .execute(&self.pool)
        .await
        .context("failed to store refresh token")?;
        Ok(())
    }

    async fn get_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>> {
        let row = sqlx::query("SELECT * FROM refresh_tokens WHERE token_hash = ?1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .context("failed to query refresh token")?;
        row.as_ref().map(refresh_token_from_row).transpose()
    }

    async fn touch_refresh_token(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE refresh_tokens SET is_used = 1, last_used_at = ?2 WHERE id = ?1")
            .bind(id.to_string())
            .bind(now.timestamp())
            .execute(&self.pool)
            .await
            .context("failed to touch refresh token")?;
        Ok(())
    }

    async fn revoke_refresh_token(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET is_revoked = 1, revoked_at = ?2
             WHERE id = ?1 AND is_revoked = 0",
        )
        .bind(id.to_string())
        .bind(now.timestamp())
        .execute(&self.pool)
        .await
        .context("failed to revoke refresh token")?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_refresh_tokens(
        &self,
        scope: RevocationScope,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        // One set-based statement per scope; no per-row loops, no long locks
        // proportional to tenant size.
        let result = match scope {
            RevocationScope::All => {
                sqlx::query(
                    "UPDATE refresh_tokens SET is_revoked = 1, revoked_at = ?1
                     WHERE is_revoked = 0",
                )
                .bind(now.timestamp())
                .execute(&self.pool)
                .await
            }
            RevocationScope::Tenant(tenant_id) => {
                sqlx::query(
                    "UPDATE refresh_tokens SET is_revoked = 1, revoked_at = ?1
                     WHERE is_revoked = 0 AND tenant_id = ?2",
                )
                .bind(now.timestamp())
                .bind(tenant_id.to_string())
                .execute(&self.pool)
                .await
            }
            RevocationScope::User(user_id) => {
                sqlx::query(
                    "UPDATE refresh_tokens SET is_revoked = 1, revoked_at = ?1
                     WHERE is_revoked = 0 AND user_id = ?2",
                )
                .bind(now.timestamp())
                .bind(user_id.to_string())
                .execute(&self.pool)
                .await
            }
        }
        .context("failed bulk refresh token revocation")?;
        Ok(result.rows_affected())
    }

    async fn store_mfa_token(&self, token: &MfaChallengeToken) -> Result<()> {
        sqlx::query(
            "INSERT INTO mfa_challenge_tokens
             (id, user_id, tenant_id, encrypted_token, token_hash, created_at, expires_at, is_used, used_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(token.id.to_string())
        .bind(token.user_id.to_string())
        .bind(token.tenant_id.to_string())
        .bind(&token.encrypted_token)
        .bind(&token.token_hash)
        .bind(token.created_at.timestamp())
        .bind(token.expires_at.timestamp())
        .bind(i64::from(token.is_used))
        .bind(token.used_at.map(|t| t.timestamp()))
        .execute(&self.pool)
        .await
        .context("failed to store mfa challenge token")?;
        Ok(())
    }

    async fn get_mfa_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<MfaChallengeToken>> {
        let row = sqlx::query("SELECT * FROM mfa_challenge_tokens WHERE token_hash = ?1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .context("failed to query mfa challenge token")?;
        row.as_ref().map(mfa_token_from_row).transpose()
    }

    async fn consume_mfa_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MfaChallengeToken>> {
        let row = sqlx::query(
            "UPDATE mfa_challenge_tokens
               SET is_used = 1, used_at = ?1
             WHERE token_hash = ?2 AND is_used = 0 AND expires_at > ?1
             RETURNING *",
        )
        .bind(now.timestamp())
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .context("failed to consume mfa challenge token")?;
        row.as_ref().map(mfa_token_from_row).transpose()
    }

    async fn delete_expired_mfa_tokens(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM mfa_challenge_tokens WHERE expires_at <= ?1")
            .bind(now.timestamp())
            .execute(&self.pool)
            .await
            .context("failed to reap mfa challenge tokens")?;
        Ok(result.rows_affected())
    }

    async fn get_consent(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        client_id: &str,
    ) -> Result<Option<UserConsent>> {
        let row = sqlx::query(
            "SELECT * FROM user_consents
             WHERE user_id = ?1 AND tenant_id = ?2 AND client_id = ?3",
        )
        .bind(user_id.to_string())
        .bind(tenant_id.to_string())
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to query consent")?;
        row.as_ref().map(consent_from_row).transpose()
    }

    async fn upsert_consent(&self, upsert: &ConsentUpsert) -> Result<()> {
        // Fast path: first grant for this triple.
        let inserted = sqlx::query(
            "INSERT INTO user_consents
             (user_id, tenant_id, client_id, scope, granted_at, last_confirmed_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6)
             ON CONFLICT(user_id, tenant_id, client_id) DO NOTHING",
        )
        .bind(upsert.user_id.to_string())
        .bind(upsert.tenant_id.to_string())
        .bind(upsert.client_id.as_str())
        .bind(normalize_scope(&upsert.scope, ""))
        .bind(upsert.now.timestamp())
        .bind(upsert.expires_at.map(|t| t.timestamp()))
        .execute(&self.pool)
        .await
        .context("failed to insert consent")?;
        if inserted.rows_affected() == 1 {
            return Ok(());
        }

        // Existing grant: union the scopes with a compare-and-swap so a
        // concurrent upsert never loses tokens. Each attempt is one
        // conditional write.
        for _ in 0..CONSENT_UPSERT_RETRIES {
            let existing = self
                .get_consent(upsert.user_id, upsert.tenant_id, &upsert.client_id)
                .await?
                .ok_or_else(|| anyhow!("consent row vanished during upsert"))?;

            let merged = normalize_scope(&existing.scope, &upsert.scope);
            let result = sqlx::query(
                "UPDATE user_consents
                   SET scope = ?4, last_confirmed_at = ?5, expires_at = ?6
                 WHERE user_id = ?1 AND tenant_id = ?2 AND client_id = ?3 AND scope = ?7",
            )
            .bind(upsert.user_id.to_string())
            .bind(upsert.tenant_id.to_string())
            .bind(upsert.client_id.as_str())
            .bind(&merged)
            .bind(upsert.now.timestamp())
            .bind(upsert.expires_at.map(|t| t.timestamp()))
            .bind(&existing.scope)
            .execute(&self.pool)
            .await
            .context("failed to update consent")?;

            if result.rows_affected() == 1 {
                return Ok(());
            }
        }

        Err(anyhow!("consent upsert lost {CONSENT_UPSERT_RETRIES} races, giving up"))
    }

    async fn get_rate_limit_config(&self, endpoint_key: &str) -> Result<Option<RateLimitConfig>> {
        let row = sqlx::query("SELECT * FROM rate_limit_configs WHERE endpoint_key = ?1")
            .bind(endpoint_key)
            .fetch_optional(&self.pool)
            .await
            .context("failed to query rate limit config")?;
        row.map(|row| {
            Ok(RateLimitConfig {
                endpoint_key: row.try_get("endpoint_key")?,
                permitted_requests: u32::try_from(row.try_get::<i64, _>("permitted_requests")?)?,
                window_seconds: u32::try_from(row.try_get::<i64, _>("window_seconds")?)?,
                is_enabled: row.try_get::<i64, _>("is_enabled")? != 0,
            })
        })
        .transpose()
    }

    async fn upsert_rate_limit_config(&self, config: &RateLimitConfig) -> Result<()> {
        sqlx::query(
            "INSERT INTO rate_limit_configs (endpoint_key, permitted_requests, window_seconds, is_enabled)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(endpoint_key) DO UPDATE SET
               permitted_requests = excluded.permitted_requests,
               window_seconds = excluded.window_seconds,
               is_enabled = excluded.is_enabled",
        )
        .bind(&config.endpoint_key)
        .bind(i64::from(config.permitted_requests))
        .bind(i64::from(config.window_seconds))
        .bind(i64::from(config.is_enabled))
        .execute(&self.pool)
        .await
        .context("failed to upsert rate limit config")?;
        Ok(())
    }
}

/// Union two space-separated scope strings into a sorted, deduplicated,
/// lowercased list. Sorting keeps the stored value canonical so the CAS
/// comparison in `upsert_consent` is stable.
fn normalize_scope(existing: &str, incoming: &str) -> String {
    let mut tokens: Vec<String> = existing
        .split_whitespace()
        .chain(incoming.split_whitespace())
        .map(str::to_lowercase)
        .collect();
    tokens.sort_unstable();
    tokens.dedup();
    tokens.join(" ")
}

#[cfg(test)]
mod tests {
    use super::normalize_scope;

    #[test]
    fn scope_union_is_sorted_and_deduplicated() {
        assert_eq!(normalize_scope("read write", "WRITE profile"), "profile read write");
        assert_eq!(normalize_scope("", "read"), "read");
        assert_eq!(normalize_scope("read", ""), "read");
        assert_eq!(normalize_scope("", ""), "");
    }
}
