// ABOUTME: Persistent entities for the token authority
// ABOUTME: Authorization codes, refresh tokens, MFA challenges, consents, clients, tenants
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// PKCE code challenge method (RFC 7636 §4.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    /// `code_challenge = base64url(sha256(code_verifier))`
    S256,
    /// `code_challenge = code_verifier`
    Plain,
}

impl fmt::Display for CodeChallengeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S256 => write!(f, "S256"),
            Self::Plain => write!(f, "plain"),
        }
    }
}

impl FromStr for CodeChallengeMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "S256" => Ok(Self::S256),
            "plain" => Ok(Self::Plain),
            other => Err(format!("unknown code_challenge_method: {other}")),
        }
    }
}

/// One pending authorization-code exchange (RFC 6749 §4.1)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// Opaque code value, at least 128 bits of entropy
    pub code: String,
    /// Client the code was issued to
    pub client_id: String,
    /// Resource owner who approved the grant
    pub user_id: Uuid,
    /// Tenant the grant belongs to
    pub tenant_id: Uuid,
    /// Redirect URI recorded at issuance; redemption must match exactly
    pub redirect_uri: String,
    /// Space-separated granted scopes
    pub scope: Option<String>,
    /// Client CSRF state, passed through untouched and never interpreted
    pub state: Option<String>,
    /// PKCE challenge, when the client supplied one
    pub code_challenge: Option<String>,
    /// PKCE challenge method
    pub code_challenge_method: Option<CodeChallengeMethod>,
    /// When the code was issued
    pub created_at: DateTime<Utc>,
    /// When the code stops being redeemable
    pub expires_at: DateTime<Utc>,
    /// Set exactly once on successful redemption
    pub is_used: bool,
    /// When the code was redeemed
    pub used_at: Option<DateTime<Utc>>,
}

/// Issuance context captured for audit on refresh tokens
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssuanceContext {
    /// Client the token was issued through, if any
    pub client_id: Option<String>,
    /// Space-separated granted scopes
    pub scope: Option<String>,
    /// Caller IP at issuance
    pub ip_address: Option<String>,
    /// Caller user agent at issuance
    pub user_agent: Option<String>,
}

/// A renewable bearer credential, encrypted at rest.
///
/// The plaintext is returned exactly once at issuance and never persisted;
/// lookup is by SHA-256 hash of the plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    /// Row identifier
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Client the token was issued through, if any
    pub client_id: Option<String>,
    /// AES-256-GCM ciphertext of the plaintext token
    pub encrypted_token: String,
    /// SHA-256 hex digest of the plaintext, the lookup key
    pub token_hash: String,
    /// Space-separated granted scopes
    pub scope: Option<String>,
    /// When the token was issued
    pub created_at: DateTime<Utc>,
    /// When the token stops validating
    pub expires_at: DateTime<Utc>,
    /// Terminal revocation flag
    pub is_revoked: bool,
    /// When the token was revoked
    pub revoked_at: Option<DateTime<Utc>>,
    /// Audit only: the token has been presented at least once. Refresh
    /// tokens remain reusable until expiry or revocation.
    pub is_used: bool,
    /// Audit only: last successful validation
    pub last_used_at: Option<DateTime<Utc>>,
    /// Caller IP at issuance
    pub issued_from_ip: Option<String>,
    /// Caller user agent at issuance
    pub issued_from_user_agent: Option<String>,
}

/// A single-use step-up-authentication nonce
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MfaChallengeToken {
    /// Row identifier
    pub id: Uuid,
    /// User completing the step-up flow
    pub user_id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// AES-256-GCM ciphertext of the plaintext token
    pub encrypted_token: String,
    /// SHA-256 hex digest of the plaintext, the lookup key
    pub token_hash: String,
    /// When the challenge was issued
    pub created_at: DateTime<Utc>,
    /// When the challenge stops being redeemable
    pub expires_at: DateTime<Utc>,
    /// Set exactly once on redemption; second attempts fail even within TTL
    pub is_used: bool,
    /// When the challenge was redeemed
    pub used_at: Option<DateTime<Utc>>,
}

/// A user's scope grant to a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConsent {
    /// Granting user
    pub user_id: Uuid,
    /// Tenant the grant belongs to
    pub tenant_id: Uuid,
    /// Client the grant applies to
    pub client_id: String,
    /// Space-separated granted scopes
    pub scope: String,
    /// First grant
    pub granted_at: DateTime<Utc>,
    /// Refreshed on every silent approval
    pub last_confirmed_at: DateTime<Utc>,
    /// Optional hard expiry; when unset, a rolling window from
    /// `last_confirmed_at` applies
    pub expires_at: Option<DateTime<Utc>>,
}

impl UserConsent {
    /// Whether this consent is still valid at `now`.
    ///
    /// Valid iff `now <= expires_at`, or, when no explicit expiry is set,
    /// `now <= last_confirmed_at + rolling_days`.
    #[must_use]
    pub fn is_valid(&self, now: DateTime<Utc>, rolling_days: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => now <= expires_at,
            None => now <= self.last_confirmed_at + Duration::days(rolling_days),
        }
    }

    /// Whether the granted scope covers every token of `requested`.
    ///
    /// Scope tokens compare case-insensitively; an empty request is always
    /// covered; an empty grant covers nothing but an empty request.
    #[must_use]
    pub fn covers_scopes(&self, requested: &str) -> bool {
        let granted: HashSet<String> = self
            .scope
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        requested
            .split_whitespace()
            .map(str::to_lowercase)
            .all(|token| granted.contains(&token))
    }
}

/// A registered relying party
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    /// Unique client identifier
    pub client_id: String,
    /// Argon2 hash of the client secret. Public clients carry none.
    pub client_secret_hash: Option<String>,
    /// Registered redirect URIs; request-time URIs must equal one entry exactly
    pub redirect_uris: Vec<String>,
    /// Confidential clients must authenticate with their secret
    pub is_confidential: bool,
    /// Inactive clients fail validation
    pub is_active: bool,
    /// Restrict the client to one tenant, when set
    pub tenant_id: Option<Uuid>,
    /// Registration time
    pub created_at: DateTime<Utc>,
}

/// Abuse-control policy for one endpoint key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Endpoint the policy guards, e.g. `token:password`
    pub endpoint_key: String,
    /// Requests permitted per window
    pub permitted_requests: u32,
    /// Window length in seconds; must be positive when enabled
    pub window_seconds: u32,
    /// Disabled configs short-circuit to "always allow"
    pub is_enabled: bool,
}

/// Tenant identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    /// Tenant identifier
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Inactive tenants fail resolution
    pub is_active: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Alternate tenant lookup key: email domain suffix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantEmailDomain {
    /// Domain, e.g. `acme.example`, unique across tenants
    pub domain: String,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Inactive mappings are skipped during resolution
    pub is_active: bool,
}

/// Alternate tenant lookup key: vanity hostname
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantVanityUrl {
    /// Hostname, e.g. `login.acme.example`, unique across tenants
    pub hostname: String,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Inactive mappings are skipped during resolution
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consent(scope: &str) -> UserConsent {
        UserConsent {
            user_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            client_id: "acme-app".into(),
            scope: scope.into(),
            granted_at: Utc::now(),
            last_confirmed_at: Utc::now(),
            expires_at: None,
        }
    }

    #[test]
    fn covers_scopes_is_case_insensitive_subset() {
        let consent = consent("Read Write profile");
        assert!(consent.covers_scopes("read"));
        assert!(consent.covers_scopes("READ write"));
        assert!(consent.covers_scopes("read write PROFILE"));
        assert!(!consent.covers_scopes("read admin"));
    }

    #[test]
    fn empty_request_is_always_covered() {
        assert!(consent("read").covers_scopes(""));
        assert!(consent("").covers_scopes(""));
        assert!(!consent("").covers_scopes("read"));
    }

    #[test]
    fn rolling_window_governs_unset_expiry() {
        let mut row = consent("read");
        row.last_confirmed_at = Utc::now() - Duration::days(91);
        assert!(!row.is_valid(Utc::now(), 90));
        row.last_confirmed_at = Utc::now() - Duration::days(89);
        assert!(row.is_valid(Utc::now(), 90));
    }

    #[test]
    fn explicit_expiry_overrides_rolling_window() {
        let mut row = consent("read");
        row.expires_at = Some(Utc::now() - Duration::hours(1));
        assert!(!row.is_valid(Utc::now(), 90));
        row.expires_at = Some(Utc::now() + Duration::hours(1));
        // Even with an ancient confirmation, the explicit expiry wins
        row.last_confirmed_at = Utc::now() - Duration::days(400);
        assert!(row.is_valid(Utc::now(), 90));
    }

    #[test]
    fn challenge_method_round_trips() {
        assert_eq!(
            "S256".parse::<CodeChallengeMethod>().unwrap(),
            CodeChallengeMethod::S256
        );
        assert_eq!(
            "plain".parse::<CodeChallengeMethod>().unwrap(),
            CodeChallengeMethod::Plain
        );
        assert!("s256".parse::<CodeChallengeMethod>().is_err());
        assert_eq!(CodeChallengeMethod::S256.to_string(), "S256");
    }
}
