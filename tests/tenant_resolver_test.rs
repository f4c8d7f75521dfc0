// ABOUTME: Integration tests for tenant resolution precedence and fail-closed behavior
// ABOUTME: Covers explicit id, email domain, vanity hostname, and the configured default
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

mod common;

use anyhow::Result;
use chrono::Utc;
use common::{create_test_store, seed_email_domain, seed_tenant, seed_vanity_host};
use mintgate::{
    config::AuthorityConfig,
    errors::AuthError,
    models::Tenant,
    storage::AuthStore,
    tenant::{TenantResolver, TenantSelector},
};
use uuid::Uuid;

#[tokio::test]
async fn explicit_tenant_id_takes_precedence() -> Result<()> {
    let store = create_test_store().await?;
    let by_id = seed_tenant(&store, "by-id").await?;
    let by_domain = seed_tenant(&store, "by-domain").await?;
    seed_email_domain(&store, by_domain.id, "acme.example").await?;

    let resolver = TenantResolver::new(store, &AuthorityConfig::default());
    let selector = TenantSelector {
        tenant_id: Some(by_id.id),
        username_or_email: Some("alice@acme.example".into()),
        request_host: None,
    };
    let resolved = resolver.resolve(&selector).await?;
    assert_eq!(resolved.id, by_id.id);
    Ok(())
}

#[tokio::test]
async fn email_domain_resolution_is_case_insensitive() -> Result<()> {
    let store = create_test_store().await?;
    let tenant = seed_tenant(&store, "acme").await?;
    seed_email_domain(&store, tenant.id, "acme.example").await?;

    let resolver = TenantResolver::new(store, &AuthorityConfig::default());
    let selector = TenantSelector {
        tenant_id: None,
        username_or_email: Some("Alice@ACME.Example".into()),
        request_host: None,
    };
    assert_eq!(resolver.resolve(&selector).await?.id, tenant.id);
    Ok(())
}

#[tokio::test]
async fn vanity_host_resolves_when_email_does_not_match() -> Result<()> {
    let store = create_test_store().await?;
    let tenant = seed_tenant(&store, "acme").await?;
    seed_vanity_host(&store, tenant.id, "login.acme.example").await?;

    let resolver = TenantResolver::new(store, &AuthorityConfig::default());
    let selector = TenantSelector {
        tenant_id: None,
        username_or_email: Some("alice@unmapped.example".into()),
        request_host: Some("login.acme.example".into()),
    };
    assert_eq!(resolver.resolve(&selector).await?.id, tenant.id);
    Ok(())
}

#[tokio::test]
async fn unresolved_fails_closed_without_default() -> Result<()> {
    let store = create_test_store().await?;
    seed_tenant(&store, "unrelated").await?;

    let resolver = TenantResolver::new(store, &AuthorityConfig::default());
    let selector = TenantSelector {
        tenant_id: None,
        username_or_email: Some("alice@nowhere.example".into()),
        request_host: Some("unknown.example".into()),
    };
    assert!(matches!(
        resolver.resolve(&selector).await,
        Err(AuthError::TenantUnresolved)
    ));
    Ok(())
}

#[tokio::test]
async fn configured_default_tenant_is_a_fallback_not_a_shortcut() -> Result<()> {
    let store = create_test_store().await?;
    let default = seed_tenant(&store, "default").await?;
    let mapped = seed_tenant(&store, "mapped").await?;
    seed_email_domain(&store, mapped.id, "mapped.example").await?;

    let config = AuthorityConfig {
        default_tenant: Some(default.id),
        ..AuthorityConfig::default()
    };
    let resolver = TenantResolver::new(store, &config);

    // A matching email domain still wins over the default
    let selector = TenantSelector {
        tenant_id: None,
        username_or_email: Some("alice@mapped.example".into()),
        request_host: None,
    };
    assert_eq!(resolver.resolve(&selector).await?.id, mapped.id);

    // Nothing matches: the default applies
    let selector = TenantSelector {
        tenant_id: None,
        username_or_email: Some("bob@elsewhere.example".into()),
        request_host: None,
    };
    assert_eq!(resolver.resolve(&selector).await?.id, default.id);
    Ok(())
}

#[tokio::test]
async fn inactive_tenant_fails_resolution() -> Result<()> {
    let store = create_test_store().await?;
    let tenant = Tenant {
        id: Uuid::new_v4(),
        name: "suspended".into(),
        is_active: false,
        created_at: Utc::now(),
    };
    store.store_tenant(&tenant).await?;

    let resolver = TenantResolver::new(store, &AuthorityConfig::default());
    assert!(matches!(
        resolver.resolve(&TenantSelector::explicit(tenant.id)).await,
        Err(AuthError::TenantUnresolved)
    ));
    Ok(())
}

#[tokio::test]
async fn unknown_explicit_id_does_not_fall_through_to_email() -> Result<()> {
    let store = create_test_store().await?;
    let mapped = seed_tenant(&store, "mapped").await?;
    seed_email_domain(&store, mapped.id, "mapped.example").await?;

    let resolver = TenantResolver::new(store, &AuthorityConfig::default());
    let selector = TenantSelector {
        tenant_id: Some(Uuid::new_v4()),
        username_or_email: Some("alice@mapped.example".into()),
        request_host: None,
    };
    // An explicit id is authoritative; a bad one is an error, not a hint
    assert!(matches!(
        resolver.resolve(&selector).await,
        Err(AuthError::TenantUnresolved)
    ));
    Ok(())
}
