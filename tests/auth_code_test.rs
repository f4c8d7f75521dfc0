// ABOUTME: Integration tests for authorization code issuance and single-use redemption
// ABOUTME: Covers redirect binding, client binding, PKCE burning, and the redemption race
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

mod common;

use anyhow::Result;
use chrono::Duration;
use common::{create_test_store, register_client, ManualClock};
use mintgate::{
    clients::ClientRegistry,
    codes::{AuthorizationCodeEngine, IssueCodeParams, RedeemCodeParams},
    config::AuthorityConfig,
    errors::AuthError,
};
use std::sync::Arc;
use uuid::Uuid;

const CALLBACK: &str = "https://app.example/callback";

// RFC 7636 Appendix B
const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

struct Setup {
    engine: Arc<AuthorizationCodeEngine>,
    clock: Arc<ManualClock>,
    client_id: String,
    user_id: Uuid,
    tenant_id: Uuid,
}

async fn setup() -> Result<Setup> {
    let store = create_test_store().await?;
    let clock = ManualClock::starting_now();
    let registered = register_client(&store, false, &[CALLBACK]).await?;
    let registry = Arc::new(ClientRegistry::new(store.clone()));
    let engine = AuthorizationCodeEngine::new(
        store,
        registry,
        clock.clone(),
        &AuthorityConfig::default(),
    );
    Ok(Setup {
        engine: Arc::new(engine),
        clock,
        client_id: registered.client.client_id,
        user_id: Uuid::new_v4(),
        tenant_id: Uuid::new_v4(),
    })
}

impl Setup {
    fn issue_params(&self, challenge: Option<&str>) -> IssueCodeParams {
        IssueCodeParams {
            client_id: self.client_id.clone(),
            redirect_uri: CALLBACK.into(),
            scope: Some("read".into()),
            state: Some("csrf-token".into()),
            code_challenge: challenge.map(str::to_owned),
            code_challenge_method: None,
            user_id: self.user_id,
            tenant_id: self.tenant_id,
        }
    }

    fn redeem_params(&self, code: &str, verifier: Option<&str>) -> RedeemCodeParams {
        RedeemCodeParams {
            code: code.into(),
            redirect_uri: CALLBACK.into(),
            client_id: self.client_id.clone(),
            code_verifier: verifier.map(str::to_owned),
        }
    }
}

#[tokio::test]
async fn code_redeems_once_and_passes_state_through() -> Result<()> {
    let setup = setup().await?;
    let issued = setup.engine.issue(setup.issue_params(Some(CHALLENGE))).await?;
    assert_eq!(issued.state.as_deref(), Some("csrf-token"));

    let record = setup
        .engine
        .redeem(setup.redeem_params(&issued.code, Some(VERIFIER)))
        .await?;
    assert_eq!(record.user_id, setup.user_id);
    assert_eq!(record.scope.as_deref(), Some("read"));

    assert!(matches!(
        setup
            .engine
            .redeem(setup.redeem_params(&issued.code, Some(VERIFIER)))
            .await,
        Err(AuthError::AlreadyUsed)
    ));
    Ok(())
}

#[tokio::test]
async fn redemption_requires_the_exact_redirect_uri() -> Result<()> {
    let setup = setup().await?;
    let issued = setup.engine.issue(setup.issue_params(None)).await?;

    let mut params = setup.redeem_params(&issued.code, None);
    params.redirect_uri = "https://app.example/callback/".into();
    assert!(matches!(
        setup.engine.redeem(params).await,
        Err(AuthError::RedirectMismatch)
    ));

    // A mismatched redirect does not burn the code
    assert!(setup
        .engine
        .redeem(setup.redeem_params(&issued.code, None))
        .await
        .is_ok());
    Ok(())
}

#[tokio::test]
async fn redemption_requires_the_issuing_client() -> Result<()> {
    let setup = setup().await?;
    let issued = setup.engine.issue(setup.issue_params(None)).await?;

    let mut params = setup.redeem_params(&issued.code, None);
    params.client_id = "mg_some-other-client".into();
    assert!(matches!(
        setup.engine.redeem(params).await,
        Err(AuthError::ClientMismatch)
    ));
    Ok(())
}

#[tokio::test]
async fn expired_codes_are_rejected() -> Result<()> {
    let setup = setup().await?;
    let issued = setup.engine.issue(setup.issue_params(None)).await?;

    // Default code TTL is ten minutes
    setup.clock.advance(Duration::seconds(601));
    assert!(matches!(
        setup
            .engine
            .redeem(setup.redeem_params(&issued.code, None))
            .await,
        Err(AuthError::Expired)
    ));
    Ok(())
}

#[tokio::test]
async fn unknown_codes_are_rejected() -> Result<()> {
    let setup = setup().await?;
    assert!(matches!(
        setup
            .engine
            .redeem(setup.redeem_params("never-issued", None))
            .await,
        Err(AuthError::NotFound)
    ));
    Ok(())
}

#[tokio::test]
async fn failed_pkce_burns_the_code() -> Result<()> {
    let setup = setup().await?;
    let issued = setup.engine.issue(setup.issue_params(Some(CHALLENGE))).await?;

    let wrong = "wrong-verifier-wrong-verifier-wrong-verifier";
    assert!(matches!(
        setup
            .engine
            .redeem(setup.redeem_params(&issued.code, Some(wrong)))
            .await,
        Err(AuthError::PkceMismatch)
    ));

    // The code was consumed by the failed attempt and cannot be retried
    assert!(matches!(
        setup
            .engine
            .redeem(setup.redeem_params(&issued.code, Some(VERIFIER)))
            .await,
        Err(AuthError::AlreadyUsed)
    ));
    Ok(())
}

#[tokio::test]
async fn plain_method_is_supported_when_requested() -> Result<()> {
    let setup = setup().await?;
    let plain_challenge = "a-plain-challenge-value-of-sufficient-length";
    let mut params = setup.issue_params(Some(plain_challenge));
    params.code_challenge_method = Some("plain".into());
    let issued = setup.engine.issue(params).await?;

    assert!(setup
        .engine
        .redeem(setup.redeem_params(&issued.code, Some(plain_challenge)))
        .await
        .is_ok());
    Ok(())
}

#[tokio::test]
async fn confidential_clients_get_codes_without_a_secret() -> Result<()> {
    // The authorization endpoint is front-channel: no secret travels with
    // the request, and issuance must not demand one
    let store = create_test_store().await?;
    let clock = ManualClock::starting_now();
    let registered = register_client(&store, true, &[CALLBACK]).await?;
    let registry = Arc::new(ClientRegistry::new(store.clone()));
    let engine = AuthorizationCodeEngine::new(
        store,
        registry,
        clock,
        &AuthorityConfig::default(),
    );

    let issued = engine
        .issue(IssueCodeParams {
            client_id: registered.client.client_id.clone(),
            redirect_uri: CALLBACK.into(),
            scope: Some("read".into()),
            state: None,
            code_challenge: Some(CHALLENGE.into()),
            code_challenge_method: None,
            user_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
        })
        .await
        .expect("front-channel issuance needs no client secret");

    assert!(engine
        .redeem(RedeemCodeParams {
            code: issued.code,
            redirect_uri: CALLBACK.into(),
            client_id: registered.client.client_id,
            code_verifier: Some(VERIFIER.into()),
        })
        .await
        .is_ok());
    Ok(())
}

#[tokio::test]
async fn issuance_validates_client_and_redirect() -> Result<()> {
    let setup = setup().await?;

    let mut params = setup.issue_params(None);
    params.client_id = "mg_unknown".into();
    assert!(matches!(
        setup.engine.issue(params).await,
        Err(AuthError::Validation(_))
    ));

    let mut params = setup.issue_params(None);
    params.redirect_uri = "https://evil.example/callback".into();
    assert!(matches!(
        setup.engine.issue(params).await,
        Err(AuthError::Validation(_))
    ));
    Ok(())
}

#[tokio::test]
async fn concurrent_redemptions_admit_exactly_one_winner() -> Result<()> {
    let setup = setup().await?;
    let issued = setup.engine.issue(setup.issue_params(Some(CHALLENGE))).await?;
    let code = Arc::new(issued.code);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = Arc::clone(&setup.engine);
        let params = setup.redeem_params(&code, Some(VERIFIER));
        handles.push(tokio::spawn(async move {
            engine.redeem(params).await.is_ok()
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
