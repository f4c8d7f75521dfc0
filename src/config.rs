// ABOUTME: Immutable runtime configuration for the token authority
// ABOUTME: Built once at startup from environment variables, passed by Arc into components
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

//! Authority configuration.
//!
//! All tunables live in one immutable [`AuthorityConfig`] constructed at
//! startup. Components receive it by reference (or `Arc`) through their
//! constructors; nothing reads the environment after startup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use uuid::Uuid;

/// Signing algorithm for access tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SigningAlgorithm {
    /// ML-DSA-65 (FIPS 204), the default for new deployments
    #[default]
    MlDsa65,
    /// Legacy RS256, retained for migration only
    Rs256Legacy,
}

impl SigningAlgorithm {
    /// JOSE `alg` header value
    #[must_use]
    pub const fn jose_alg(self) -> &'static str {
        match self {
            Self::MlDsa65 => "ML-DSA-65",
            Self::Rs256Legacy => "RS256",
        }
    }
}

/// Immutable configuration for the token authority
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// Issuer URL embedded in the `iss` claim and verified on introspection
    pub issuer: String,
    /// Audience embedded in the `aud` claim
    pub audience: String,
    /// Access token lifetime in seconds (minutes-scale by design)
    pub access_token_ttl_secs: i64,
    /// Authorization code lifetime in seconds
    pub auth_code_ttl_secs: i64,
    /// Refresh token lifetime in days
    pub refresh_token_ttl_days: i64,
    /// MFA challenge token lifetime in seconds
    pub mfa_token_ttl_secs: i64,
    /// Rolling consent validity window in days (applies when a consent row
    /// carries no explicit expiry)
    pub consent_validity_days: i64,
    /// Default signing algorithm for newly minted access tokens
    pub signing_algorithm: SigningAlgorithm,
    /// Rotate refresh tokens on every use. Off by default: existing clients
    /// rely on reusable refresh tokens, and changing this silently would
    /// change observable behavior.
    pub rotate_refresh_tokens: bool,
    /// Explicitly configured fallback tenant. Tenant resolution fails closed
    /// when unset.
    pub default_tenant: Option<Uuid>,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            issuer: "https://auth.example.com".into(),
            audience: "mintgate".into(),
            access_token_ttl_secs: 600,
            auth_code_ttl_secs: 600,
            refresh_token_ttl_days: 30,
            mfa_token_ttl_secs: 300,
            consent_validity_days: 90,
            signing_algorithm: SigningAlgorithm::default(),
            rotate_refresh_tokens: false,
            default_tenant: None,
        }
    }
}

impl AuthorityConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    ///
    /// # Errors
    /// Returns an error if a set variable fails to parse.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(issuer) = env::var("MINTGATE_ISSUER") {
            config.issuer = issuer;
        }
        if let Ok(audience) = env::var("MINTGATE_AUDIENCE") {
            config.audience = audience;
        }
        if let Ok(ttl) = env::var("MINTGATE_ACCESS_TOKEN_TTL_SECS") {
            config.access_token_ttl_secs = ttl
                .parse()
                .context("invalid MINTGATE_ACCESS_TOKEN_TTL_SECS")?;
        }
        if let Ok(ttl) = env::var("MINTGATE_AUTH_CODE_TTL_SECS") {
            config.auth_code_ttl_secs =
                ttl.parse().context("invalid MINTGATE_AUTH_CODE_TTL_SECS")?;
        }
        if let Ok(days) = env::var("MINTGATE_REFRESH_TOKEN_TTL_DAYS") {
            config.refresh_token_ttl_days = days
                .parse()
                .context("invalid MINTGATE_REFRESH_TOKEN_TTL_DAYS")?;
        }
        if let Ok(ttl) = env::var("MINTGATE_MFA_TOKEN_TTL_SECS") {
            config.mfa_token_ttl_secs =
                ttl.parse().context("invalid MINTGATE_MFA_TOKEN_TTL_SECS")?;
        }
        if let Ok(days) = env::var("MINTGATE_CONSENT_VALIDITY_DAYS") {
            config.consent_validity_days = days
                .parse()
                .context("invalid MINTGATE_CONSENT_VALIDITY_DAYS")?;
        }
        if let Ok(alg) = env::var("MINTGATE_SIGNING_ALGORITHM") {
            config.signing_algorithm = match alg.to_lowercase().as_str() {
                "ml-dsa-65" | "mldsa65" => SigningAlgorithm::MlDsa65,
                "rs256" | "rs256-legacy" => SigningAlgorithm::Rs256Legacy,
                other => anyhow::bail!("unknown MINTGATE_SIGNING_ALGORITHM: {other}"),
            };
        }
        if let Ok(rotate) = env::var("MINTGATE_ROTATE_REFRESH_TOKENS") {
            config.rotate_refresh_tokens = matches!(rotate.as_str(), "1" | "true" | "yes");
        }
        if let Ok(tenant) = env::var("MINTGATE_DEFAULT_TENANT") {
            config.default_tenant =
                Some(tenant.parse().context("invalid MINTGATE_DEFAULT_TENANT")?);
        }

        Ok(config)
    }
}
