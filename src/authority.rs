// ABOUTME: TokenAuthority facade wiring resolver, registry, limiter, consent, engines, signer
// ABOUTME: Grant handlers, token endpoint dispatch, RFC 7662 introspection, admin revocation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

//! Token Authority facade.
//!
//! The single entry point an embedding server talks to. Every operation
//! keeps its precise [`AuthError`] internally for logging and hands the
//! caller a collapsed [`OAuth2Error`] at the boundary; the wire never learns
//! which invariant rejected a grant.

use crate::clients::ClientRegistry;
use crate::codes::{AuthorizationCodeEngine, IssueCodeParams, RedeemCodeParams};
use crate::config::AuthorityConfig;
use crate::consent::ConsentEngine;
use crate::crypto::encryption::TokenCipher;
use crate::crypto::hashing::sha256_hex;
use crate::errors::{AuthError, AuthResult, OAuth2Error};
use crate::identity::{Clock, IdentityProvider, VerifiedUser};
use crate::mfa::MfaChallengeManager;
use crate::models::RefreshTokenRecord;
use crate::rate_limit::{CounterStore, RateLimiter};
use crate::refresh::RefreshTokenManager;
use crate::signer::{AccessTokenParams, SigningKeys, TokenSigner};
use crate::storage::AuthStore;
use crate::tenant::{TenantResolver, TenantSelector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Rate limit endpoint keys
const ENDPOINT_PASSWORD: &str = "token:password";
const ENDPOINT_AUTHORIZE: &str = "authorize";
const ENDPOINT_CODE_GRANT: &str = "token:authorization_code";
const ENDPOINT_REFRESH_GRANT: &str = "token:refresh_token";

/// Resource owner password grant request (RFC 6749 §4.3)
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordGrantRequest {
    /// Login identifier; an email additionally drives tenant resolution
    pub username: String,
    /// Plaintext password, verified by the identity provider
    pub password: String,
    /// Requesting client, when the call comes through a registered client
    pub client_id: Option<String>,
    /// Client secret for confidential clients
    pub client_secret: Option<String>,
    /// Requested scopes
    pub scope: Option<String>,
    /// Tenant selection inputs
    #[serde(default)]
    pub tenant: TenantSelector,
    /// Caller IP, for rate limiting and refresh token audit
    pub ip_address: Option<String>,
    /// Caller user agent, for refresh token audit
    pub user_agent: Option<String>,
}

/// Authorization endpoint request (RFC 6749 §4.1.1)
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeRequest {
    /// Must be `code`
    pub response_type: String,
    /// Requesting client
    pub client_id: String,
    /// Redirect URI; must equal a registered entry exactly
    pub redirect_uri: String,
    /// Requested scopes
    pub scope: Option<String>,
    /// Client CSRF state, echoed back untouched
    pub state: Option<String>,
    /// PKCE challenge
    pub code_challenge: Option<String>,
    /// PKCE challenge method
    pub code_challenge_method: Option<String>,
    /// Tenant selection inputs
    #[serde(default)]
    pub tenant: TenantSelector,
}

/// Whether the resource owner approved the requested scope interactively
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentDecision {
    /// No interactive approval happened; an existing valid consent is required
    Unprompted,
    /// The user approved this request on the consent screen
    Approved,
}

/// Authorization endpoint success (RFC 6749 §4.1.2)
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizeResponse {
    /// The single-use authorization code
    pub code: String,
    /// Original request state, unchanged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Token endpoint request (RFC 6749 §4.1.3 / §6)
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    /// `authorization_code` or `refresh_token`
    pub grant_type: String,
    /// Authorization code being redeemed
    pub code: Option<String>,
    /// Must equal the redirect URI recorded at issuance
    pub redirect_uri: Option<String>,
    /// Requesting client
    pub client_id: Option<String>,
    /// Client secret for confidential clients
    pub client_secret: Option<String>,
    /// PKCE verifier
    pub code_verifier: Option<String>,
    /// Refresh token being exchanged
    pub refresh_token: Option<String>,
    /// Scope narrowing request; must be a subset of the original grant
    pub scope: Option<String>,
    /// Caller IP, for rate limiting and audit
    pub ip_address: Option<String>,
    /// Caller user agent, for audit
    pub user_agent: Option<String>,
}

/// Token endpoint success (RFC 6749 §5.1)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The signed access token
    pub access_token: String,
    /// Always `Bearer`
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Refresh token, when one was issued
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Granted scopes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Introspection response (RFC 7662 §2.2)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    /// Whether the token is currently valid
    pub active: bool,
    /// Granted scopes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Client the token was issued through
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Subject user id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Audience
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    /// Issuer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Expiry, epoch seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issued-at, epoch seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Token id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// `access_token` or `refresh_token`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Tenant the token was minted in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl IntrospectionResponse {
    /// The response for any invalid, unknown, or expired token: `active`
    /// false and every other field omitted. RFC 7662 §2.2 requires this
    /// shape instead of an error so callers cannot probe token state.
    #[must_use]
    pub fn inactive() -> Self {
        Self::default()
    }
}

/// The composed token authority
pub struct TokenAuthority {
    config: AuthorityConfig,
    clock: Arc<dyn Clock>,
    identity: Arc<dyn IdentityProvider>,
    tenants: TenantResolver,
    clients: Arc<ClientRegistry>,
    limiter: RateLimiter,
    consent: ConsentEngine,
    codes: AuthorizationCodeEngine,
    refresh: RefreshTokenManager,
    mfa: MfaChallengeManager,
    signer: TokenSigner,
    store: Arc<dyn AuthStore>,
}

impl TokenAuthority {
    /// Compose an authority over its collaborators. The signer starts
    /// unbound; call [`TokenAuthority::bind_signing_keys`] before issuing.
    #[must_use]
    pub fn new(
        config: AuthorityConfig,
        store: Arc<dyn AuthStore>,
        identity: Arc<dyn IdentityProvider>,
        cipher: Arc<dyn TokenCipher>,
        counters: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let clients = Arc::new(ClientRegistry::new(Arc::clone(&store)));
        Self {
            tenants: TenantResolver::new(Arc::clone(&store), &config),
            limiter: RateLimiter::new(Arc::clone(&store), counters, Arc::clone(&clock)),
            consent: ConsentEngine::new(Arc::clone(&store), Arc::clone(&clock), &config),
            codes: AuthorizationCodeEngine::new(
                Arc::clone(&store),
                Arc::clone(&clients),
                Arc::clone(&clock),
                &config,
            ),
            refresh: RefreshTokenManager::new(
                Arc::clone(&store),
                Arc::clone(&cipher),
                Arc::clone(&clock),
                &config,
            ),
            mfa: MfaChallengeManager::new(
                Arc::clone(&store),
                cipher,
                Arc::clone(&clock),
                &config,
            ),
            signer: TokenSigner::new(config.clone(), Arc::clone(&clock)),
            clients,
            identity,
            clock,
            store,
            config,
        }
    }

    /// Bind runtime-generated signing keys, exactly once.
    ///
    /// # Errors
    /// See [`TokenSigner::bind_signing_keys`].
    pub fn bind_signing_keys(&self, keys: SigningKeys) -> AuthResult<()> {
        self.signer.bind_signing_keys(keys)
    }

    /// The client registry, for administrative registration and rotation.
    #[must_use]
    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// The MFA challenge manager, for step-up flows driven by the embedder.
    #[must_use]
    pub fn mfa(&self) -> &MfaChallengeManager {
        &self.mfa
    }

    /// The token signer, for direct verification by in-process resource
    /// servers.
    #[must_use]
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Resource owner password grant.
    ///
    /// Rate limit, tenant resolution, client validation when a client is
    /// named, password verification, then access + refresh token issuance.
    ///
    /// # Errors
    /// Collapsed wire errors only; precise reasons are logged.
    pub async fn password_grant(
        &self,
        request: PasswordGrantRequest,
    ) -> Result<TokenResponse, OAuth2Error> {
        let identity_key = request
            .ip_address
            .clone()
            .unwrap_or_else(|| request.username.clone());
        self.enforce_rate_limit(ENDPOINT_PASSWORD, &identity_key)
            .await
            .map_err(|e| self.reject("password_grant", &e))?;

        self.password_grant_inner(request)
            .await
            .map_err(|e| self.reject("password_grant", &e))
    }

    async fn password_grant_inner(
        &self,
        request: PasswordGrantRequest,
    ) -> AuthResult<TokenResponse> {
        let mut selector = request.tenant.clone();
        if selector.username_or_email.is_none() {
            selector.username_or_email = Some(request.username.clone());
        }
        let tenant = self.tenants.resolve(&selector).await?;

        if let Some(client_id) = request.client_id.as_deref() {
            self.clients
                .validate_credentials(client_id, request.client_secret.as_deref())
                .await?;
        }

        let user = self
            .identity
            .verify_password(tenant.id, &request.username, &request.password)
            .await?
            .ok_or_else(|| {
                tracing::warn!(tenant_id = %tenant.id, "password verification failed");
                AuthError::AuthenticationFailure
            })?;

        self.issue_token_pair(
            &user,
            tenant.id,
            request.client_id,
            request.scope,
            request.ip_address,
            request.user_agent,
        )
        .await
    }

    /// Authorization endpoint: validate, consult consent, issue a code.
    ///
    /// `user_id` is the already-authenticated resource owner; session
    /// establishment is the embedder's concern.
    ///
    /// # Errors
    /// `consent_required` when no valid consent covers the request and the
    /// caller did not approve; collapsed wire errors otherwise.
    pub async fn authorize(
        &self,
        request: AuthorizeRequest,
        user_id: Uuid,
        approval: ConsentDecision,
    ) -> Result<AuthorizeResponse, OAuth2Error> {
        self.enforce_rate_limit(ENDPOINT_AUTHORIZE, &request.client_id)
            .await
            .map_err(|e| self.reject("authorize", &e))?;

        self.authorize_inner(request, user_id, approval)
            .await
            .map_err(|e| self.reject("authorize", &e))
    }

    async fn authorize_inner(
        &self,
        request: AuthorizeRequest,
        user_id: Uuid,
        approval: ConsentDecision,
    ) -> AuthResult<AuthorizeResponse> {
        if request.response_type != "code" {
            return Err(AuthError::Validation(format!(
                "unsupported response_type: {}",
                request.response_type
            )));
        }

        let tenant = self.tenants.resolve(&request.tenant).await?;
        let scope = request.scope.clone().unwrap_or_default();

        let approved = match approval {
            ConsentDecision::Approved => {
                self.consent
                    .record_consent(user_id, tenant.id, &request.client_id, &scope, None)
                    .await?;
                true
            }
            ConsentDecision::Unprompted => {
                self.consent
                    .has_valid_consent(user_id, tenant.id, &request.client_id, &scope)
                    .await?
            }
        };
        if !approved {
            return Err(AuthError::ConsentRequired);
        }

        let issued = self
            .codes
            .issue(IssueCodeParams {
                client_id: request.client_id,
                redirect_uri: request.redirect_uri,
                scope: request.scope,
                state: request.state,
                code_challenge: request.code_challenge,
                code_challenge_method: request.code_challenge_method,
                user_id,
                tenant_id: tenant.id,
            })
            .await?;

        Ok(AuthorizeResponse {
            code: issued.code,
            state: issued.state,
        })
    }

    /// Token endpoint: dispatch on `grant_type`.
    ///
    /// # Errors
    /// `unsupported_grant_type` for anything other than `authorization_code`
    /// and `refresh_token`; collapsed wire errors otherwise.
    pub async fn token(&self, request: TokenRequest) -> Result<TokenResponse, OAuth2Error> {
        match request.grant_type.as_str() {
            "authorization_code" => {
                let client_key = request.client_id.clone().unwrap_or_default();
                self.enforce_rate_limit(ENDPOINT_CODE_GRANT, &client_key)
                    .await
                    .map_err(|e| self.reject("token:authorization_code", &e))?;
                self.authorization_code_grant(request)
                    .await
                    .map_err(|e| self.reject("token:authorization_code", &e))
            }
            "refresh_token" => {
                let client_key = request.client_id.clone().unwrap_or_default();
                self.enforce_rate_limit(ENDPOINT_REFRESH_GRANT, &client_key)
                    .await
                    .map_err(|e| self.reject("token:refresh_token", &e))?;
                self.refresh_token_grant(request)
                    .await
                    .map_err(|e| self.reject("token:refresh_token", &e))
            }
            other => {
                tracing::warn!(grant_type = other, "unsupported grant type");
                Err(OAuth2Error::unsupported_grant_type())
            }
        }
    }

    async fn authorization_code_grant(&self, request: TokenRequest) -> AuthResult<TokenResponse> {
        let client_id = request
            .client_id
            .ok_or_else(|| AuthError::Validation("client_id is required".into()))?;
        let code = request
            .code
            .ok_or_else(|| AuthError::Validation("code is required".into()))?;
        let redirect_uri = request
            .redirect_uri
            .ok_or_else(|| AuthError::Validation("redirect_uri is required".into()))?;

        self.clients
            .validate_credentials(&client_id, request.client_secret.as_deref())
            .await?;

        let record = self
            .codes
            .redeem(RedeemCodeParams {
                code,
                redirect_uri,
                client_id: client_id.clone(),
                code_verifier: request.code_verifier,
            })
            .await?;

        let roles = self.identity.get_user_roles(record.user_id).await?;
        let user = VerifiedUser {
            user_id: record.user_id,
            roles,
        };
        self.issue_token_pair(
            &user,
            record.tenant_id,
            Some(client_id),
            record.scope,
            request.ip_address,
            request.user_agent,
        )
        .await
    }

    async fn refresh_token_grant(&self, request: TokenRequest) -> AuthResult<TokenResponse> {
        let presented = request
            .refresh_token
            .ok_or_else(|| AuthError::Validation("refresh_token is required".into()))?;

        if let Some(client_id) = request.client_id.as_deref() {
            self.clients
                .validate_credentials(client_id, request.client_secret.as_deref())
                .await?;
        }

        let record = self.refresh.validate(&presented).await?;

        // A token issued through a client may only be exchanged by that
        // client, which must identify itself again; omitting client_id does
        // not lift the binding
        if let Some(bound) = record.client_id.as_deref() {
            if request.client_id.as_deref() != Some(bound) {
                tracing::warn!(token_id = %record.id, "refresh token presented without its issuing client");
                return Err(AuthError::ClientMismatch);
            }
        }

        let scope = narrowed_scope(record.scope.as_deref(), request.scope.as_deref())?;

        let roles = self.identity.get_user_roles(record.user_id).await?;
        let access_token = self.signer.issue_access_token(AccessTokenParams {
            user_id: record.user_id,
            tenant_id: record.tenant_id,
            roles,
            scope: scope.clone(),
            client_id: record.client_id.clone(),
        })?;

        let refresh_token = if self.config.rotate_refresh_tokens {
            Some(self.rotate_refresh_token(&record).await?)
        } else {
            None
        };

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".into(),
            expires_in: self.config.access_token_ttl_secs,
            refresh_token,
            scope,
        })
    }

    async fn rotate_refresh_token(&self, old: &RefreshTokenRecord) -> AuthResult<String> {
        let issued = self
            .refresh
            .issue(
                old.user_id,
                old.tenant_id,
                crate::models::IssuanceContext {
                    client_id: old.client_id.clone(),
                    scope: old.scope.clone(),
                    ip_address: old.issued_from_ip.clone(),
                    user_agent: old.issued_from_user_agent.clone(),
                },
            )
            .await?;
        self.refresh.revoke(old.id).await?;
        Ok(issued.token)
    }

    /// Credential validation entry point for directory bridges (LDAP,
    /// RADIUS). Resolves the tenant, verifies the password, and returns the
    /// verified user without minting any token.
    ///
    /// # Errors
    /// `AuthenticationFailure` for bad credentials; `TenantUnresolved` or
    /// rate limiting errors otherwise.
    pub async fn validate_credentials(
        &self,
        tenant: &TenantSelector,
        username: &str,
        password: &str,
    ) -> AuthResult<VerifiedUser> {
        self.enforce_rate_limit(ENDPOINT_PASSWORD, username).await?;

        let mut selector = tenant.clone();
        if selector.username_or_email.is_none() {
            selector.username_or_email = Some(username.to_owned());
        }
        let resolved = self.tenants.resolve(&selector).await?;

        self.identity
            .verify_password(resolved.id, username, password)
            .await?
            .ok_or_else(|| {
                tracing::warn!(tenant_id = %resolved.id, "credential validation failed");
                AuthError::AuthenticationFailure
            })
    }

    /// RFC 7662 introspection. Tries the token as a signed access token
    /// first, then as a refresh token; `token_type_hint=refresh_token`
    /// reverses the order. Any invalid token yields `active: false` with
    /// every other field omitted, never an error.
    pub async fn introspect(
        &self,
        token: &str,
        token_type_hint: Option<&str>,
    ) -> IntrospectionResponse {
        if token_type_hint == Some("refresh_token") {
            if let Some(response) = self.introspect_refresh_token(token).await {
                return response;
            }
            return self
                .introspect_access_token(token)
                .unwrap_or_else(IntrospectionResponse::inactive);
        }

        if let Some(response) = self.introspect_access_token(token) {
            return response;
        }
        self.introspect_refresh_token(token)
            .await
            .unwrap_or_else(IntrospectionResponse::inactive)
    }

    fn introspect_access_token(&self, token: &str) -> Option<IntrospectionResponse> {
        let claims = self.signer.verify(token).ok()?;
        Some(IntrospectionResponse {
            active: true,
            scope: claims.scope,
            client_id: claims.client_id,
            sub: Some(claims.sub),
            aud: Some(claims.aud),
            iss: Some(claims.iss),
            exp: Some(claims.exp),
            iat: Some(claims.iat),
            jti: Some(claims.jti),
            token_type: Some("access_token".into()),
            tenant_id: Some(claims.tenant_id),
        })
    }

    async fn introspect_refresh_token(&self, token: &str) -> Option<IntrospectionResponse> {
        let record = self
            .store
            .get_refresh_token_by_hash(&sha256_hex(token))
            .await
            .ok()??;
        if record.is_revoked || record.expires_at <= self.clock.now() {
            return Some(IntrospectionResponse::inactive());
        }
        Some(IntrospectionResponse {
            active: true,
            scope: record.scope,
            client_id: record.client_id,
            sub: Some(record.user_id.to_string()),
            aud: Some(self.config.audience.clone()),
            iss: Some(self.config.issuer.clone()),
            exp: Some(record.expires_at.timestamp()),
            iat: Some(record.created_at.timestamp()),
            jti: Some(record.id.to_string()),
            token_type: Some("refresh_token".into()),
            tenant_id: Some(record.tenant_id.to_string()),
        })
    }

    /// The published verification key set.
    ///
    /// # Errors
    /// Returns an error when signing keys are unbound.
    pub fn jwks_document(&self) -> AuthResult<crate::signer::JwksDocument> {
        self.signer.jwks_document()
    }

    /// Incident response: revoke every live refresh token. Idempotent.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn revoke_all_refresh_tokens(&self) -> AuthResult<u64> {
        self.refresh.revoke_all().await
    }

    /// Revoke every live refresh token of one tenant. Idempotent.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn revoke_refresh_tokens_for_tenant(&self, tenant_id: Uuid) -> AuthResult<u64> {
        self.refresh.revoke_for_tenant(tenant_id).await
    }

    /// Revoke every live refresh token of one user. Idempotent.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn revoke_refresh_tokens_for_user(&self, user_id: Uuid) -> AuthResult<u64> {
        self.refresh.revoke_for_user(user_id).await
    }

    /// Delete expired single-use artifacts (codes and MFA challenges).
    /// Intended for an external reaper loop; returns the deleted counts.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn sweep_expired(&self) -> AuthResult<(u64, u64)> {
        let now = self.clock.now();
        let codes = self.store.delete_expired_auth_codes(now).await?;
        let challenges = self.store.delete_expired_mfa_tokens(now).await?;
        if codes > 0 || challenges > 0 {
            tracing::debug!(codes, challenges, "swept expired grants");
        }
        Ok((codes, challenges))
    }

    async fn enforce_rate_limit(&self, endpoint_key: &str, identity: &str) -> AuthResult<()> {
        let decision = self.limiter.check(endpoint_key, identity).await;
        if decision.allowed {
            Ok(())
        } else {
            Err(AuthError::RateLimited {
                retry_after_secs: decision.retry_after_secs,
            })
        }
    }

    async fn issue_token_pair(
        &self,
        user: &VerifiedUser,
        tenant_id: Uuid,
        client_id: Option<String>,
        scope: Option<String>,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> AuthResult<TokenResponse> {
        let access_token = self.signer.issue_access_token(AccessTokenParams {
            user_id: user.user_id,
            tenant_id,
            roles: user.roles.clone(),
            scope: scope.clone(),
            client_id: client_id.clone(),
        })?;

        let refresh = self
            .refresh
            .issue(
                user.user_id,
                tenant_id,
                crate::models::IssuanceContext {
                    client_id,
                    scope: scope.clone(),
                    ip_address,
                    user_agent,
                },
            )
            .await?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".into(),
            expires_in: self.config.access_token_ttl_secs,
            refresh_token: Some(refresh.token),
            scope,
        })
    }

    /// Log the precise failure, then collapse it for the wire. Component
    /// code has usually warned already; this is the single mapping point.
    fn reject(&self, operation: &str, error: &AuthError) -> OAuth2Error {
        match error {
            AuthError::Internal(e) => {
                tracing::error!(operation, "internal error: {e:#}");
            }
            _ => {
                tracing::debug!(operation, %error, "request rejected");
            }
        }
        error.to_wire()
    }
}

/// Apply RFC 6749 §6 scope narrowing: a requested scope must be a subset of
/// the originally granted one. Returns the effective scope.
fn narrowed_scope(
    granted: Option<&str>,
    requested: Option<&str>,
) -> AuthResult<Option<String>> {
    let Some(requested) = requested else {
        return Ok(granted.map(str::to_owned));
    };

    let granted_set: std::collections::HashSet<String> = granted
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();
    for token in requested.split_whitespace() {
        if !granted_set.contains(&token.to_lowercase()) {
            return Err(AuthError::InvalidScope(format!(
                "scope token not in original grant: {token}"
            )));
        }
    }
    Ok(Some(requested.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrowing_allows_subsets_only() {
        assert_eq!(
            narrowed_scope(Some("read write"), Some("read")).unwrap(),
            Some("read".to_owned())
        );
        assert!(matches!(
            narrowed_scope(Some("read"), Some("read write")),
            Err(AuthError::InvalidScope(_))
        ));
        // No narrowing requested keeps the original grant
        assert_eq!(
            narrowed_scope(Some("read write"), None).unwrap(),
            Some("read write".to_owned())
        );
        assert!(matches!(
            narrowed_scope(None, Some("read")),
            Err(AuthError::InvalidScope(_))
        ));
    }
}
