// ABOUTME: Integration tests for single-use MFA challenge tokens
// ABOUTME: Covers strict single-use under concurrency, expiry, and unknown tokens
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

mod common;

use anyhow::Result;
use chrono::Duration;
use common::{create_test_cipher, create_test_store, ManualClock};
use mintgate::{
    config::AuthorityConfig, errors::AuthError, mfa::MfaChallengeManager, storage::SqliteStore,
};
use std::sync::Arc;
use uuid::Uuid;

async fn manager() -> Result<(Arc<MfaChallengeManager>, Arc<SqliteStore>, Arc<ManualClock>)> {
    let store = create_test_store().await?;
    let clock = ManualClock::starting_now();
    let manager = MfaChallengeManager::new(
        store.clone(),
        create_test_cipher()?,
        clock.clone(),
        &AuthorityConfig::default(),
    );
    Ok((Arc::new(manager), store, clock))
}

#[tokio::test]
async fn redemption_is_single_use_even_within_ttl() -> Result<()> {
    let (manager, _store, _clock) = manager().await?;
    let user = Uuid::new_v4();
    let issued = manager.issue(user, Uuid::new_v4()).await?;

    let redeemed = manager.redeem(&issued.token).await?;
    assert_eq!(redeemed.user_id, user);

    assert!(matches!(
        manager.redeem(&issued.token).await,
        Err(AuthError::AlreadyUsed)
    ));
    Ok(())
}

#[tokio::test]
async fn expired_challenges_cannot_be_redeemed() -> Result<()> {
    let (manager, _store, clock) = manager().await?;
    let issued = manager.issue(Uuid::new_v4(), Uuid::new_v4()).await?;

    // Default TTL is five minutes
    clock.advance(Duration::seconds(301));
    assert!(matches!(
        manager.redeem(&issued.token).await,
        Err(AuthError::Expired)
    ));
    Ok(())
}

#[tokio::test]
async fn unknown_challenges_report_not_found() -> Result<()> {
    let (manager, _store, _clock) = manager().await?;
    assert!(matches!(
        manager.redeem("never-issued").await,
        Err(AuthError::NotFound)
    ));
    Ok(())
}

#[tokio::test]
async fn concurrent_redemptions_admit_exactly_one_winner() -> Result<()> {
    let (manager, _store, _clock) = manager().await?;
    let issued = manager.issue(Uuid::new_v4(), Uuid::new_v4()).await?;
    let token = Arc::new(issued.token);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let manager = Arc::clone(&manager);
        let token = Arc::clone(&token);
        handles.push(tokio::spawn(async move {
            manager.redeem(&token).await.is_ok()
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await? {
            successes += 1;
        }
    }
    assert_eq!(successes, 1, "exactly one concurrent redemption may win");
    Ok(())
}

#[tokio::test]
async fn challenges_are_independent() -> Result<()> {
    let (manager, _store, _clock) = manager().await?;
    let user = Uuid::new_v4();
    let tenant = Uuid::new_v4();
    let first = manager.issue(user, tenant).await?;
    let second = manager.issue(user, tenant).await?;

    manager.redeem(&first.token).await?;
    // Burning one challenge leaves the user's other challenges intact
    assert!(manager.redeem(&second.token).await.is_ok());
    Ok(())
}
