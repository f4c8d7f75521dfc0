// ABOUTME: Integration tests for consent recording, the rolling window, and scope coverage
// ABOUTME: Exercises the union upsert against the SQLite store
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

mod common;

use anyhow::Result;
use chrono::Duration;
use common::{create_test_store, ManualClock};
use mintgate::{
    config::AuthorityConfig, consent::ConsentEngine, identity::Clock, storage::AuthStore,
    storage::SqliteStore,
};
use std::sync::Arc;
use uuid::Uuid;

const CLIENT: &str = "mg_consent-client";

fn engine(store: Arc<SqliteStore>, clock: Arc<ManualClock>) -> ConsentEngine {
    ConsentEngine::new(store, clock, &AuthorityConfig::default())
}

#[tokio::test]
async fn missing_consent_is_not_valid() -> Result<()> {
    let store = create_test_store().await?;
    let engine = engine(store, ManualClock::starting_now());
    let valid = engine
        .has_valid_consent(Uuid::new_v4(), Uuid::new_v4(), CLIENT, "read")
        .await?;
    assert!(!valid);
    Ok(())
}

#[tokio::test]
async fn recorded_consent_covers_case_insensitive_subsets() -> Result<()> {
    let store = create_test_store().await?;
    let engine = engine(store, ManualClock::starting_now());
    let (user, tenant) = (Uuid::new_v4(), Uuid::new_v4());

    engine
        .record_consent(user, tenant, CLIENT, "Read Write profile", None)
        .await?;

    assert!(engine.has_valid_consent(user, tenant, CLIENT, "read").await?);
    assert!(
        engine
            .has_valid_consent(user, tenant, CLIENT, "READ write")
            .await?
    );
    assert!(engine.has_valid_consent(user, tenant, CLIENT, "").await?);
    // Any token outside the grant spoils the whole request
    assert!(
        !engine
            .has_valid_consent(user, tenant, CLIENT, "read admin")
            .await?
    );
    Ok(())
}

#[tokio::test]
async fn re_approval_unions_scopes() -> Result<()> {
    let store = create_test_store().await?;
    let clock = ManualClock::starting_now();
    let engine = engine(store.clone(), clock.clone());
    let (user, tenant) = (Uuid::new_v4(), Uuid::new_v4());

    engine.record_consent(user, tenant, CLIENT, "read", None).await?;
    engine.record_consent(user, tenant, CLIENT, "write", None).await?;

    assert!(
        engine
            .has_valid_consent(user, tenant, CLIENT, "read write")
            .await?
    );

    let stored = store.get_consent(user, tenant, CLIENT).await?.unwrap();
    let tokens: Vec<&str> = stored.scope.split_whitespace().collect();
    assert_eq!(tokens.len(), 2, "no duplicate scope tokens: {}", stored.scope);
    Ok(())
}

#[tokio::test]
async fn rolling_window_expires_stale_consent() -> Result<()> {
    let store = create_test_store().await?;
    let clock = ManualClock::starting_now();
    let engine = engine(store, clock.clone());
    let (user, tenant) = (Uuid::new_v4(), Uuid::new_v4());

    engine.record_consent(user, tenant, CLIENT, "read", None).await?;
    assert!(engine.has_valid_consent(user, tenant, CLIENT, "read").await?);

    clock.advance(Duration::days(89));
    assert!(engine.has_valid_consent(user, tenant, CLIENT, "read").await?);

    clock.advance(Duration::days(2));
    assert!(!engine.has_valid_consent(user, tenant, CLIENT, "read").await?);
    Ok(())
}

#[tokio::test]
async fn re_approval_refreshes_the_rolling_window() -> Result<()> {
    let store = create_test_store().await?;
    let clock = ManualClock::starting_now();
    let engine = engine(store, clock.clone());
    let (user, tenant) = (Uuid::new_v4(), Uuid::new_v4());

    engine.record_consent(user, tenant, CLIENT, "read", None).await?;
    clock.advance(Duration::days(60));
    engine.record_consent(user, tenant, CLIENT, "read", None).await?;

    // 60 + 60 days from first grant, but only 60 from the confirmation
    clock.advance(Duration::days(60));
    assert!(engine.has_valid_consent(user, tenant, CLIENT, "read").await?);
    Ok(())
}

#[tokio::test]
async fn explicit_expiry_overrides_the_rolling_window() -> Result<()> {
    let store = create_test_store().await?;
    let clock = ManualClock::starting_now();
    let engine = engine(store, clock.clone());
    let (user, tenant) = (Uuid::new_v4(), Uuid::new_v4());

    let expires_at = clock.now() + Duration::days(7);
    engine
        .record_consent(user, tenant, CLIENT, "read", Some(expires_at))
        .await?;

    clock.advance(Duration::days(6));
    assert!(engine.has_valid_consent(user, tenant, CLIENT, "read").await?);

    clock.advance(Duration::days(2));
    assert!(!engine.has_valid_consent(user, tenant, CLIENT, "read").await?);
    Ok(())
}

#[tokio::test]
async fn consents_are_scoped_per_client_and_tenant() -> Result<()> {
    let store = create_test_store().await?;
    let engine = engine(store, ManualClock::starting_now());
    let (user, tenant) = (Uuid::new_v4(), Uuid::new_v4());

    engine.record_consent(user, tenant, CLIENT, "read", None).await?;

    assert!(
        !engine
            .has_valid_consent(user, tenant, "mg_other-client", "read")
            .await?
    );
    assert!(
        !engine
            .has_valid_consent(user, Uuid::new_v4(), CLIENT, "read")
            .await?
    );
    Ok(())
}
