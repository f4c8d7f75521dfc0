// ABOUTME: Consent engine: records and evaluates user scope grants per client
// ABOUTME: Lets the code engine skip the interactive consent screen for approved scope sets
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

//! Consent Engine.
//!
//! A UX optimization, not a security boundary: a valid consent lets the
//! authorization endpoint skip the interactive approval screen, but code
//! redemption still requires full redirect URI and PKCE validation.

use crate::config::AuthorityConfig;
use crate::errors::AuthResult;
use crate::identity::Clock;
use crate::storage::{AuthStore, ConsentUpsert};
use chrono::DateTime;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Records and evaluates user scope grants
pub struct ConsentEngine {
    store: Arc<dyn AuthStore>,
    clock: Arc<dyn Clock>,
    rolling_days: i64,
}

impl ConsentEngine {
    /// Create an engine over the shared store.
    #[must_use]
    pub fn new(store: Arc<dyn AuthStore>, clock: Arc<dyn Clock>, config: &AuthorityConfig) -> Self {
        Self {
            store,
            clock,
            rolling_days: config.consent_validity_days,
        }
    }

    /// Whether the user has already approved this client for every token of
    /// `requested_scope`.
    ///
    /// # Errors
    /// Propagates store failures only; a missing or stale consent is `false`.
    pub async fn has_valid_consent(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        client_id: &str,
        requested_scope: &str,
    ) -> AuthResult<bool> {
        let Some(consent) = self.store.get_consent(user_id, tenant_id, client_id).await? else {
            return Ok(false);
        };
        let now = self.clock.now();
        Ok(consent.is_valid(now, self.rolling_days) && consent.covers_scopes(requested_scope))
    }

    /// Record an approval: creates the consent row or unions the new scopes
    /// into the existing grant and refreshes `last_confirmed_at`.
    ///
    /// # Errors
    /// Propagates store failures.
    pub async fn record_consent(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        client_id: &str,
        scope: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> AuthResult<()> {
        self.store
            .upsert_consent(&ConsentUpsert {
                user_id,
                tenant_id,
                client_id: client_id.to_owned(),
                scope: scope.to_owned(),
                now: self.clock.now(),
                expires_at,
            })
            .await?;
        tracing::debug!(%user_id, client_id, scope, "recorded consent");
        Ok(())
    }
}
