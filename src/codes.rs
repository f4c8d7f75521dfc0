// ABOUTME: Authorization code engine: issue and redeem single-use codes (RFC 6749 §4.1)
// ABOUTME: PKCE verification per RFC 7636; consumption is one atomic conditional write
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

//! Authorization Code Engine.
//!
//! A code moves from issued to redeemed or expired, never back. The race
//! to close is double redemption: a double-redeemed code would yield two
//! independent token grants from one authorization, so the mark-as-used
//! transition is one conditional write in the store and never a
//! read-then-write pair. PKCE is verified *after* consumption: a failed
//! verifier burns the code rather than leaving it replayable.

use crate::clients::ClientRegistry;
use crate::config::AuthorityConfig;
use crate::crypto::hashing::{constant_time_eq, sha256_base64url};
use crate::crypto::random::generate_token;
use crate::errors::{AuthError, AuthResult};
use crate::identity::Clock;
use crate::models::{AuthorizationCode, CodeChallengeMethod};
use crate::storage::AuthStore;
use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

/// Code value entropy in bytes (256 bits; the floor is 128)
const CODE_ENTROPY_BYTES: usize = 32;

/// RFC 7636 §4.1 length bounds for verifiers and challenges
const PKCE_MIN_LEN: usize = 43;
const PKCE_MAX_LEN: usize = 128;

/// Parameters for issuing an authorization code
#[derive(Debug, Clone)]
pub struct IssueCodeParams {
    /// Requesting client
    pub client_id: String,
    /// Redirect URI the code will be bound to
    pub redirect_uri: String,
    /// Requested scopes
    pub scope: Option<String>,
    /// Client CSRF state; echoed back untouched, never interpreted
    pub state: Option<String>,
    /// PKCE challenge
    pub code_challenge: Option<String>,
    /// PKCE challenge method; defaults to S256 when a challenge is present
    pub code_challenge_method: Option<String>,
    /// Approving user
    pub user_id: Uuid,
    /// Tenant of the grant
    pub tenant_id: Uuid,
}

/// Parameters for redeeming an authorization code
#[derive(Debug, Clone)]
pub struct RedeemCodeParams {
    /// The presented code
    pub code: String,
    /// Must equal the redirect URI recorded at issuance exactly
    pub redirect_uri: String,
    /// Must equal the issuing client
    pub client_id: String,
    /// PKCE verifier; required iff a challenge was set at issuance
    pub code_verifier: Option<String>,
}

/// A successfully issued code, with the state passed through
#[derive(Debug, Clone)]
pub struct IssuedCode {
    /// The opaque code value
    pub code: String,
    /// Original request state, unchanged
    pub state: Option<String>,
}

/// Issues and redeems short-lived single-use authorization codes
pub struct AuthorizationCodeEngine {
    store: Arc<dyn AuthStore>,
    clients: Arc<ClientRegistry>,
    clock: Arc<dyn Clock>,
    code_ttl_secs: i64,
}

impl AuthorizationCodeEngine {
    /// Create an engine over the shared store.
    #[must_use]
    pub fn new(
        store: Arc<dyn AuthStore>,
        clients: Arc<ClientRegistry>,
        clock: Arc<dyn Clock>,
        config: &AuthorityConfig,
    ) -> Self {
        Self {
            store,
            clients,
            clock,
            code_ttl_secs: config.auth_code_ttl_secs,
        }
    }

    /// Issue a code after validating the client and redirect URI. Issuance
    /// is front-channel, so no client secret is involved; confidential
    /// clients authenticate later, at redemption.
    ///
    /// # Errors
    /// Client/redirect validation errors, PKCE parameter validation errors,
    /// or store failures.
    pub async fn issue(&self, params: IssueCodeParams) -> AuthResult<IssuedCode> {
        self.clients
            .validate_redirect(&params.client_id, &params.redirect_uri)
            .await?;

        let method = validate_pkce_params(
            params.code_challenge.as_deref(),
            params.code_challenge_method.as_deref(),
        )?;

        let now = self.clock.now();
        let code = generate_token(CODE_ENTROPY_BYTES)?;
        let record = AuthorizationCode {
            code: code.clone(),
            client_id: params.client_id,
            user_id: params.user_id,
            tenant_id: params.tenant_id,
            redirect_uri: params.redirect_uri,
            scope: params.scope,
            state: params.state.clone(),
            code_challenge: params.code_challenge,
            code_challenge_method: method,
            created_at: now,
            expires_at: now + Duration::seconds(self.code_ttl_secs),
            is_used: false,
            used_at: None,
        };
        self.store.store_auth_code(&record).await?;

        tracing::debug!(client_id = %record.client_id, user_id = %record.user_id, "issued authorization code");
        Ok(IssuedCode {
            code,
            state: params.state,
        })
    }

    /// Redeem a code exactly once.
    ///
    /// The store consumes the code in a single conditional write with all
    /// preconditions in place; when that misses, the engine classifies the
    /// failure for internal logging. PKCE is verified after consumption.
    ///
    /// # Errors
    /// `NotFound`, `Expired`, `AlreadyUsed`, `RedirectMismatch`,
    /// `ClientMismatch`, or `PkceMismatch` for a bad verifier (RFC 7636
    /// §4.6). All collapse to `invalid_grant` at the wire boundary.
    pub async fn redeem(&self, params: RedeemCodeParams) -> AuthResult<AuthorizationCode> {
        let now = self.clock.now();
        let consumed = self
            .store
            .consume_auth_code(&params.code, &params.client_id, &params.redirect_uri, now)
            .await?;

        let Some(record) = consumed else {
            let error = self.classify_redemption_failure(&params).await?;
            tracing::warn!(
                client_id = %params.client_id,
                reason = %error,
                "authorization code redemption rejected"
            );
            return Err(error);
        };

        verify_pkce(&record, params.code_verifier.as_deref()).inspect_err(|_| {
            tracing::warn!(
                client_id = %params.client_id,
                "PKCE verification failed; code is burned"
            );
        })?;

        tracing::info!(
            client_id = %record.client_id,
            user_id = %record.user_id,
            "authorization code redeemed"
        );
        Ok(record)
    }

    /// Explain why the conditional consume missed. Diagnostic only: the
    /// atomic write above is the authoritative gate, and concurrent losers
    /// land on `AlreadyUsed` here.
    async fn classify_redemption_failure(&self, params: &RedeemCodeParams) -> AuthResult<AuthError> {
        let Some(record) = self.store.get_auth_code(&params.code).await? else {
            return Ok(AuthError::NotFound);
        };
        if record.is_used {
            return Ok(AuthError::AlreadyUsed);
        }
        if record.expires_at <= self.clock.now() {
            return Ok(AuthError::Expired);
        }
        if record.client_id != params.client_id {
            return Ok(AuthError::ClientMismatch);
        }
        if record.redirect_uri != params.redirect_uri {
            return Ok(AuthError::RedirectMismatch);
        }
        // The row qualified by the time we re-read it; treat as a lost race.
        Ok(AuthError::AlreadyUsed)
    }
}

/// Validate issuance-time PKCE parameters and normalize the method.
fn validate_pkce_params(
    code_challenge: Option<&str>,
    code_challenge_method: Option<&str>,
) -> AuthResult<Option<CodeChallengeMethod>> {
    let Some(challenge) = code_challenge else {
        if code_challenge_method.is_some() {
            return Err(AuthError::Validation(
                "code_challenge_method without code_challenge".into(),
            ));
        }
        return Ok(None);
    };

    if challenge.len() < PKCE_MIN_LEN || challenge.len() > PKCE_MAX_LEN {
        return Err(AuthError::Validation(format!(
            "code_challenge must be between {PKCE_MIN_LEN} and {PKCE_MAX_LEN} characters"
        )));
    }

    let method = match code_challenge_method {
        None => CodeChallengeMethod::S256,
        Some(value) => value
            .parse()
            .map_err(|e: String| AuthError::Validation(e))?,
    };
    Ok(Some(method))
}

/// Verify a redemption verifier against the challenge recorded at issuance.
fn verify_pkce(record: &AuthorizationCode, code_verifier: Option<&str>) -> AuthResult<()> {
    let Some(challenge) = record.code_challenge.as_deref() else {
        // No challenge at issuance: a verifier presented anyway is a
        // protocol violation, not a silent no-op.
        if code_verifier.is_some() {
            return Err(AuthError::Validation(
                "code_verifier provided but no code_challenge was issued".into(),
            ));
        }
        return Ok(());
    };

    let verifier = code_verifier.ok_or(AuthError::PkceMismatch)?;

    if verifier.len() < PKCE_MIN_LEN || verifier.len() > PKCE_MAX_LEN {
        return Err(AuthError::PkceMismatch);
    }
    // RFC 7636 §4.1: unreserved characters only
    if !verifier
        .chars()
        .all(|c| matches!(c, 'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~'))
    {
        return Err(AuthError::PkceMismatch);
    }

    let method = record
        .code_challenge_method
        .unwrap_or(CodeChallengeMethod::S256);
    let matches = match method {
        CodeChallengeMethod::S256 => constant_time_eq(&sha256_base64url(verifier), challenge),
        CodeChallengeMethod::Plain => constant_time_eq(verifier, challenge),
    };

    if matches {
        Ok(())
    } else {
        Err(AuthError::PkceMismatch)
    }
}
