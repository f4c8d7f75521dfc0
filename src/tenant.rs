// ABOUTME: Tenant resolution for login and authorization requests
// ABOUTME: Explicit id first, then email domain suffix, then vanity hostname
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

//! Tenant Resolver.
//!
//! Pure lookup, no side effects. Resolution fails closed: when nothing
//! matches and no default tenant is explicitly configured, the caller gets
//! [`AuthError::TenantUnresolved`].

use crate::config::AuthorityConfig;
use crate::errors::{AuthError, AuthResult};
use crate::models::Tenant;
use crate::storage::AuthStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Inputs a request can carry to identify its tenant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantSelector {
    /// Explicit tenant id, highest precedence
    pub tenant_id: Option<Uuid>,
    /// Username or email; the part after `@` is matched against registered
    /// email domains
    pub username_or_email: Option<String>,
    /// Request hostname, matched against registered vanity hostnames
    pub request_host: Option<String>,
}

impl TenantSelector {
    /// Selector carrying only an explicit tenant id
    #[must_use]
    pub fn explicit(tenant_id: Uuid) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            ..Self::default()
        }
    }
}

/// Maps inbound requests to tenants
pub struct TenantResolver {
    store: Arc<dyn AuthStore>,
    default_tenant: Option<Uuid>,
}

impl TenantResolver {
    /// Create a resolver over the shared store.
    #[must_use]
    pub fn new(store: Arc<dyn AuthStore>, config: &AuthorityConfig) -> Self {
        Self {
            store,
            default_tenant: config.default_tenant,
        }
    }

    /// Resolve a tenant using the precedence order: explicit id, email
    /// domain, vanity hostname, configured default.
    ///
    /// # Errors
    /// Returns [`AuthError::TenantUnresolved`] when nothing matches or the
    /// matched tenant is inactive.
    pub async fn resolve(&self, selector: &TenantSelector) -> AuthResult<Tenant> {
        if let Some(tenant_id) = selector.tenant_id {
            return match self.store.get_tenant(tenant_id).await? {
                Some(tenant) if tenant.is_active => Ok(tenant),
                Some(_) => {
                    tracing::warn!(%tenant_id, "explicit tenant is inactive");
                    Err(AuthError::TenantUnresolved)
                }
                None => {
                    tracing::warn!(%tenant_id, "explicit tenant not found");
                    Err(AuthError::TenantUnresolved)
                }
            };
        }

        if let Some(domain) = selector
            .username_or_email
            .as_deref()
            .and_then(|value| value.rsplit_once('@'))
            .map(|(_, domain)| domain.to_lowercase())
        {
            if let Some(tenant) = self.store.get_tenant_by_email_domain(&domain).await? {
                if tenant.is_active {
                    return Ok(tenant);
                }
                tracing::warn!(domain, "email domain maps to inactive tenant");
            }
        }

        if let Some(host) = selector.request_host.as_deref() {
            let host = host.to_lowercase();
            if let Some(tenant) = self.store.get_tenant_by_vanity_host(&host).await? {
                if tenant.is_active {
                    return Ok(tenant);
                }
                tracing::warn!(host, "vanity host maps to inactive tenant");
            }
        }

        if let Some(default_id) = self.default_tenant {
            if let Some(tenant) = self.store.get_tenant(default_id).await? {
                if tenant.is_active {
                    tracing::debug!(%default_id, "falling back to configured default tenant");
                    return Ok(tenant);
                }
            }
        }

        Err(AuthError::TenantUnresolved)
    }
}
