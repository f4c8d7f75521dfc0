// ABOUTME: Collaborator contracts consumed by the token authority
// ABOUTME: Identity provider (password verification, roles) and clock injection
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

//! External collaborator interfaces.
//!
//! The authority never stores users or hashes passwords; it consults an
//! [`IdentityProvider`]. All expiry comparisons go through an injected
//! [`Clock`] so tests can control time without sleeping.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A user whose credentials verified successfully
#[derive(Debug, Clone)]
pub struct VerifiedUser {
    /// User identifier within the tenant
    pub user_id: Uuid,
    /// Role names attached to the user
    pub roles: Vec<String>,
}

/// Identity collaborator: owns user records and password hashing
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify a password within a tenant.
    ///
    /// Returns `None` on any credential failure; the authority never learns
    /// which factor was wrong.
    ///
    /// # Errors
    /// Returns an error only on infrastructure failure, never on bad
    /// credentials.
    async fn verify_password(
        &self,
        tenant_id: Uuid,
        username_or_email: &str,
        password: &str,
    ) -> Result<Option<VerifiedUser>>;

    /// Current roles for a user.
    ///
    /// # Errors
    /// Returns an error on infrastructure failure.
    async fn get_user_roles(&self, user_id: Uuid) -> Result<Vec<String>>;
}

/// Monotonic UTC source for expiry comparisons
pub trait Clock: Send + Sync {
    /// Current UTC time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
