// ABOUTME: OAuth client registry: validation, registration, and secret rotation
// ABOUTME: Secrets are Argon2-hashed; verification is constant-time and fails closed
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

//! OAuth Client Registry.
//!
//! The hot path is [`ClientRegistry::validate`]: client lookup, exact
//! redirect URI match, and secret verification for confidential clients.
//! Registration and rotation are administrative operations; a rotated
//! secret invalidates the previous one immediately, with no grace window.

use crate::crypto::random::generate_token;
use crate::errors::{AuthError, AuthResult};
use crate::models::OAuthClient;
use crate::storage::AuthStore;
use anyhow::{anyhow, Result};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString};
use argon2::{Argon2, PasswordVerifier};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

/// Request to register a new relying party
#[derive(Debug, Clone)]
pub struct RegisterClientRequest {
    /// Redirect URIs; each must parse as an absolute URL
    pub redirect_uris: Vec<String>,
    /// Confidential clients receive a generated secret
    pub is_confidential: bool,
    /// Restrict the client to one tenant, when set
    pub tenant_id: Option<Uuid>,
}

/// Result of a registration: the plaintext secret appears here exactly once
#[derive(Debug)]
pub struct RegisteredClient {
    /// The stored client record
    pub client: OAuthClient,
    /// Plaintext secret, present for confidential clients only. Never
    /// persisted; the registry keeps only the Argon2 hash.
    pub client_secret: Option<String>,
}

/// Registry of relying parties
pub struct ClientRegistry {
    store: Arc<dyn AuthStore>,
}

impl ClientRegistry {
    /// Create a registry over the shared store.
    #[must_use]
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self { store }
    }

    /// Validate a caller against its registration.
    ///
    /// Checks, in order: the client exists and is active, the redirect URI
    /// equals one registered entry exactly, and, for confidential clients,
    /// the presented secret verifies against the stored Argon2 hash. Public
    /// clients must not need a secret; one presented anyway is ignored.
    ///
    /// # Errors
    /// `Validation` for unknown/inactive clients and redirect mismatches,
    /// `AuthenticationFailure` for secret failures. Both are opaque at the
    /// wire boundary.
    pub async fn validate(
        &self,
        client_id: &str,
        redirect_uri: &str,
        client_secret: Option<&str>,
    ) -> AuthResult<OAuthClient> {
        let client = self.validate_redirect(client_id, redirect_uri).await?;
        self.check_secret(&client, client_secret)?;
        Ok(client)
    }

    /// Validate a front-channel authorization request: the client exists and
    /// is active, and the redirect URI equals one registered entry exactly.
    ///
    /// No secret is checked. The authorization endpoint carries none
    /// (RFC 6749 §4.1.1); client authentication happens when the code is
    /// redeemed at the token endpoint.
    ///
    /// # Errors
    /// `Validation` for unknown/inactive clients and redirect mismatches.
    pub async fn validate_redirect(
        &self,
        client_id: &str,
        redirect_uri: &str,
    ) -> AuthResult<OAuthClient> {
        let client = self.require_client(client_id).await?;

        if !client.redirect_uris.iter().any(|uri| uri == redirect_uri) {
            tracing::warn!(client_id, redirect_uri, "redirect uri not registered");
            return Err(AuthError::Validation("Invalid redirect_uri".into()));
        }
        Ok(client)
    }

    /// Validate client credentials without a redirect URI (token endpoint,
    /// where the redirect is checked against the code instead).
    ///
    /// # Errors
    /// Same taxonomy as [`ClientRegistry::validate`].
    pub async fn validate_credentials(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> AuthResult<OAuthClient> {
        let client = self.require_client(client_id).await?;
        self.check_secret(&client, client_secret)?;
        Ok(client)
    }

    async fn require_client(&self, client_id: &str) -> AuthResult<OAuthClient> {
        let client = self
            .store
            .get_client(client_id)
            .await?
            .ok_or_else(|| {
                tracing::warn!(client_id, "unknown oauth client");
                AuthError::Validation("Unknown client".into())
            })?;
        if !client.is_active {
            tracing::warn!(client_id, "oauth client is inactive");
            return Err(AuthError::Validation("Unknown client".into()));
        }
        Ok(client)
    }

    fn check_secret(&self, client: &OAuthClient, presented: Option<&str>) -> AuthResult<()> {
        if !client.is_confidential {
            return Ok(());
        }

        let (Some(stored_hash), Some(secret)) = (&client.client_secret_hash, presented) else {
            tracing::warn!(client_id = %client.client_id, "confidential client missing secret");
            return Err(AuthError::AuthenticationFailure);
        };

        let parsed = PasswordHash::new(stored_hash).map_err(|e| {
            AuthError::Internal(anyhow!("corrupt client secret hash: {e}"))
        })?;

        // Argon2 verification is constant-time over the candidate secret
        if Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_err()
        {
            tracing::warn!(client_id = %client.client_id, "client secret verification failed");
            return Err(AuthError::AuthenticationFailure);
        }
        Ok(())
    }

    /// Register a new client. Confidential clients get a generated 256-bit
    /// secret, returned in plaintext exactly once.
    ///
    /// # Errors
    /// `Validation` for malformed redirect URIs; internal errors otherwise.
    pub async fn create_client(
        &self,
        request: RegisterClientRequest,
        now: DateTime<Utc>,
    ) -> AuthResult<RegisteredClient> {
        if request.redirect_uris.is_empty() {
            return Err(AuthError::Validation(
                "At least one redirect_uri is required".into(),
            ));
        }
        for uri in &request.redirect_uris {
            Url::parse(uri).map_err(|_| {
                AuthError::Validation(format!("redirect_uri is not an absolute URL: {uri}"))
            })?;
        }

        let client_id = format!("mg_{}", generate_token(16)?);
        let (client_secret, client_secret_hash) = if request.is_confidential {
            let secret = generate_token(32)?;
            let hash = hash_secret(&secret)?;
            (Some(secret), Some(hash))
        } else {
            (None, None)
        };

        let client = OAuthClient {
            client_id,
            client_secret_hash,
            redirect_uris: request.redirect_uris,
            is_confidential: request.is_confidential,
            is_active: true,
            tenant_id: request.tenant_id,
            created_at: now,
        };
        self.store.store_client(&client).await?;

        tracing::info!(client_id = %client.client_id, confidential = client.is_confidential, "registered oauth client");
        Ok(RegisteredClient {
            client,
            client_secret,
        })
    }

    /// Replace a client's mutable registration fields.
    ///
    /// # Errors
    /// `Validation` for malformed redirect URIs; internal errors otherwise.
    pub async fn update_client(&self, client: &OAuthClient) -> AuthResult<()> {
        for uri in &client.redirect_uris {
            Url::parse(uri).map_err(|_| {
                AuthError::Validation(format!("redirect_uri is not an absolute URL: {uri}"))
            })?;
        }
        self.store.update_client(client).await?;
        Ok(())
    }

    /// Rotate a confidential client's secret. The previous secret stops
    /// verifying the moment the new hash is stored.
    ///
    /// # Errors
    /// `Validation` when the client is unknown or public.
    pub async fn rotate_secret(&self, client_id: &str) -> AuthResult<String> {
        let client = self.require_client(client_id).await?;
        if !client.is_confidential {
            return Err(AuthError::Validation(
                "Public clients have no secret to rotate".into(),
            ));
        }

        let secret = generate_token(32)?;
        let hash = hash_secret(&secret)?;
        self.store
            .update_client_secret_hash(client_id, &hash)
            .await?;

        tracing::info!(client_id, "rotated oauth client secret");
        Ok(secret)
    }
}

fn hash_secret(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| anyhow!("failed to hash client secret: {e}"))?;
    Ok(hash.to_string())
}
