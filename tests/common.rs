// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides store, clock, identity, and authority composition helpers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors
#![allow(dead_code)]

//! Shared test utilities for `mintgate` integration tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mintgate::{
    authority::TokenAuthority,
    clients::{ClientRegistry, RegisterClientRequest, RegisteredClient},
    config::AuthorityConfig,
    crypto::encryption::AesGcmCipher,
    crypto::random::generate_encryption_key,
    identity::{Clock, IdentityProvider, VerifiedUser},
    models::{RateLimitConfig, Tenant, TenantEmailDomain, TenantVanityUrl},
    rate_limit::InMemoryCounterStore,
    signer::SigningKeys,
    storage::{AuthStore, SqliteStore},
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};
use uuid::Uuid;

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };
        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// A clock the test advances by hand
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn starting_now() -> Arc<Self> {
        Arc::new(Self::new(Utc::now()))
    }

    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap() = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

struct StaticUser {
    password: String,
    user: VerifiedUser,
    tenant_id: Uuid,
}

/// Identity provider backed by a fixed in-memory user table
#[derive(Default)]
pub struct StaticIdentityProvider {
    users: Mutex<HashMap<String, StaticUser>>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user and return its generated id.
    pub fn add_user(
        &self,
        tenant_id: Uuid,
        username: &str,
        password: &str,
        roles: &[&str],
    ) -> Uuid {
        let user_id = Uuid::new_v4();
        self.users.lock().unwrap().insert(
            username.to_owned(),
            StaticUser {
                password: password.to_owned(),
                user: VerifiedUser {
                    user_id,
                    roles: roles.iter().map(|r| (*r).to_owned()).collect(),
                },
                tenant_id,
            },
        );
        user_id
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn verify_password(
        &self,
        tenant_id: Uuid,
        username_or_email: &str,
        password: &str,
    ) -> Result<Option<VerifiedUser>> {
        let users = self.users.lock().unwrap();
        Ok(users.get(username_or_email).and_then(|entry| {
            (entry.tenant_id == tenant_id && entry.password == password)
                .then(|| entry.user.clone())
        }))
    }

    async fn get_user_roles(&self, user_id: Uuid) -> Result<Vec<String>> {
        let users = self.users.lock().unwrap();
        Ok(users
            .values()
            .find(|entry| entry.user.user_id == user_id)
            .map(|entry| entry.user.roles.clone())
            .unwrap_or_default())
    }
}

/// Standard in-memory test store
pub async fn create_test_store() -> Result<Arc<SqliteStore>> {
    init_test_logging();
    Ok(Arc::new(SqliteStore::connect("sqlite::memory:").await?))
}

/// Fresh AES-256-GCM cipher with a random key
pub fn create_test_cipher() -> Result<Arc<AesGcmCipher>> {
    Ok(Arc::new(AesGcmCipher::new(generate_encryption_key()?)))
}

/// Seed an active tenant
pub async fn seed_tenant(store: &Arc<SqliteStore>, name: &str) -> Result<Tenant> {
    let tenant = Tenant {
        id: Uuid::new_v4(),
        name: name.to_owned(),
        is_active: true,
        created_at: Utc::now(),
    };
    store.store_tenant(&tenant).await?;
    Ok(tenant)
}

/// Map an email domain to a tenant
pub async fn seed_email_domain(
    store: &Arc<SqliteStore>,
    tenant_id: Uuid,
    domain: &str,
) -> Result<()> {
    store
        .store_email_domain(&TenantEmailDomain {
            domain: domain.to_owned(),
            tenant_id,
            is_active: true,
        })
        .await
}

/// Map a vanity hostname to a tenant
pub async fn seed_vanity_host(
    store: &Arc<SqliteStore>,
    tenant_id: Uuid,
    hostname: &str,
) -> Result<()> {
    store
        .store_vanity_url(&TenantVanityUrl {
            hostname: hostname.to_owned(),
            tenant_id,
            is_active: true,
        })
        .await
}

/// Register a client through the registry
pub async fn register_client(
    store: &Arc<SqliteStore>,
    is_confidential: bool,
    redirect_uris: &[&str],
) -> Result<RegisteredClient> {
    let registry = ClientRegistry::new(store.clone() as Arc<dyn AuthStore>);
    let registered = registry
        .create_client(
            RegisterClientRequest {
                redirect_uris: redirect_uris.iter().map(|u| (*u).to_owned()).collect(),
                is_confidential,
                tenant_id: None,
            },
            Utc::now(),
        )
        .await?;
    Ok(registered)
}

/// Install a fixed-window rate limit policy
pub async fn seed_rate_limit(
    store: &Arc<SqliteStore>,
    endpoint_key: &str,
    permitted_requests: u32,
    window_seconds: u32,
) -> Result<()> {
    store
        .upsert_rate_limit_config(&RateLimitConfig {
            endpoint_key: endpoint_key.to_owned(),
            permitted_requests,
            window_seconds,
            is_enabled: true,
        })
        .await
}

/// Everything a full-stack test needs, wired together
pub struct TestAuthority {
    pub authority: TokenAuthority,
    pub store: Arc<SqliteStore>,
    pub clock: Arc<ManualClock>,
    pub identity: Arc<StaticIdentityProvider>,
    pub config: AuthorityConfig,
}

/// Compose a TokenAuthority over an in-memory store with bound ML-DSA keys
pub async fn create_test_authority(config: AuthorityConfig) -> Result<TestAuthority> {
    let store = create_test_store().await?;
    let clock = ManualClock::starting_now();
    let identity = Arc::new(StaticIdentityProvider::new());

    let authority = TokenAuthority::new(
        config.clone(),
        store.clone() as Arc<dyn AuthStore>,
        identity.clone(),
        create_test_cipher()?,
        Arc::new(InMemoryCounterStore::new()),
        clock.clone(),
    );
    authority.bind_signing_keys(SigningKeys::generate_ml_dsa()?)?;

    Ok(TestAuthority {
        authority,
        store,
        clock,
        identity,
        config,
    })
}
