// ABOUTME: Integration tests for OAuth client validation, registration, and secret rotation
// ABOUTME: Exercises exact redirect matching and immediate invalidation on rotation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

mod common;

use anyhow::Result;
use chrono::Utc;
use common::create_test_store;
use mintgate::{
    clients::{ClientRegistry, RegisterClientRequest},
    errors::AuthError,
    storage::AuthStore,
};
use std::sync::Arc;

const CALLBACK: &str = "https://app.example/callback";

async fn registry() -> Result<(ClientRegistry, Arc<dyn AuthStore>)> {
    let store = create_test_store().await?;
    let store: Arc<dyn AuthStore> = store;
    Ok((ClientRegistry::new(store.clone()), store))
}

#[tokio::test]
async fn confidential_client_requires_its_secret() -> Result<()> {
    let (registry, _store) = registry().await?;
    let registered = registry
        .create_client(
            RegisterClientRequest {
                redirect_uris: vec![CALLBACK.into()],
                is_confidential: true,
                tenant_id: None,
            },
            Utc::now(),
        )
        .await?;
    let client_id = registered.client.client_id.clone();
    let secret = registered.client_secret.as_deref().unwrap();

    assert!(registry
        .validate(&client_id, CALLBACK, Some(secret))
        .await
        .is_ok());

    assert!(matches!(
        registry.validate(&client_id, CALLBACK, Some("wrong")).await,
        Err(AuthError::AuthenticationFailure)
    ));
    assert!(matches!(
        registry.validate(&client_id, CALLBACK, None).await,
        Err(AuthError::AuthenticationFailure)
    ));
    Ok(())
}

#[tokio::test]
async fn front_channel_validation_skips_the_secret_check() -> Result<()> {
    let (registry, _store) = registry().await?;
    let registered = registry
        .create_client(
            RegisterClientRequest {
                redirect_uris: vec![CALLBACK.into()],
                is_confidential: true,
                tenant_id: None,
            },
            Utc::now(),
        )
        .await?;
    let client_id = &registered.client.client_id;

    // Authorization requests carry no secret even for confidential clients
    assert!(registry
        .validate_redirect(client_id, CALLBACK)
        .await
        .is_ok());

    // Redirect and existence checks still fail closed
    assert!(matches!(
        registry
            .validate_redirect(client_id, "https://evil.example/callback")
            .await,
        Err(AuthError::Validation(_))
    ));
    assert!(matches!(
        registry.validate_redirect("mg_unknown", CALLBACK).await,
        Err(AuthError::Validation(_))
    ));
    Ok(())
}

#[tokio::test]
async fn public_client_needs_no_secret() -> Result<()> {
    let (registry, _store) = registry().await?;
    let registered = registry
        .create_client(
            RegisterClientRequest {
                redirect_uris: vec![CALLBACK.into()],
                is_confidential: false,
                tenant_id: None,
            },
            Utc::now(),
        )
        .await?;
    assert!(registered.client_secret.is_none());

    let client_id = &registered.client.client_id;
    assert!(registry.validate(client_id, CALLBACK, None).await.is_ok());
    // A stray secret from a public client is ignored, not rejected
    assert!(registry
        .validate(client_id, CALLBACK, Some("anything"))
        .await
        .is_ok());
    Ok(())
}

#[tokio::test]
async fn redirect_uri_must_match_exactly() -> Result<()> {
    let (registry, _store) = registry().await?;
    let registered = registry
        .create_client(
            RegisterClientRequest {
                redirect_uris: vec![CALLBACK.into()],
                is_confidential: false,
                tenant_id: None,
            },
            Utc::now(),
        )
        .await?;
    let client_id = &registered.client.client_id;

    for uri in [
        "https://app.example/callback/extra",
        "https://app.example/CALLBACK",
        "http://app.example/callback",
        "https://app.example/",
    ] {
        assert!(
            matches!(
                registry.validate(client_id, uri, None).await,
                Err(AuthError::Validation(_))
            ),
            "{uri} should not validate"
        );
    }
    Ok(())
}

#[tokio::test]
async fn rotation_invalidates_the_old_secret_immediately() -> Result<()> {
    let (registry, _store) = registry().await?;
    let registered = registry
        .create_client(
            RegisterClientRequest {
                redirect_uris: vec![CALLBACK.into()],
                is_confidential: true,
                tenant_id: None,
            },
            Utc::now(),
        )
        .await?;
    let client_id = registered.client.client_id.clone();
    let old_secret = registered.client_secret.unwrap();

    let new_secret = registry.rotate_secret(&client_id).await?;
    assert_ne!(old_secret, new_secret);

    assert!(matches!(
        registry
            .validate(&client_id, CALLBACK, Some(&old_secret))
            .await,
        Err(AuthError::AuthenticationFailure)
    ));
    assert!(registry
        .validate(&client_id, CALLBACK, Some(&new_secret))
        .await
        .is_ok());
    Ok(())
}

#[tokio::test]
async fn inactive_client_reports_as_unknown() -> Result<()> {
    let (registry, store) = registry().await?;
    let registered = registry
        .create_client(
            RegisterClientRequest {
                redirect_uris: vec![CALLBACK.into()],
                is_confidential: false,
                tenant_id: None,
            },
            Utc::now(),
        )
        .await?;

    let mut client = registered.client;
    client.is_active = false;
    store.update_client(&client).await?;

    let unknown_err = registry
        .validate("mg_does-not-exist", CALLBACK, None)
        .await
        .unwrap_err();
    let inactive_err = registry
        .validate(&client.client_id, CALLBACK, None)
        .await
        .unwrap_err();
    // Same message either way: callers cannot probe which clients exist
    assert_eq!(unknown_err.to_string(), inactive_err.to_string());
    Ok(())
}

#[tokio::test]
async fn registration_rejects_relative_redirect_uris() -> Result<()> {
    let (registry, _store) = registry().await?;
    let result = registry
        .create_client(
            RegisterClientRequest {
                redirect_uris: vec!["/callback".into()],
                is_confidential: false,
                tenant_id: None,
            },
            Utc::now(),
        )
        .await;
    assert!(matches!(result, Err(AuthError::Validation(_))));

    let result = registry
        .create_client(
            RegisterClientRequest {
                redirect_uris: vec![],
                is_confidential: false,
                tenant_id: None,
            },
            Utc::now(),
        )
        .await;
    assert!(matches!(result, Err(AuthError::Validation(_))));
    Ok(())
}
