// ABOUTME: Error taxonomy for the token authority and OAuth2 wire error mapping
// ABOUTME: Internal variants stay precise for logging; boundary errors are non-enumerable
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

//! # Error Handling
//!
//! Internally, every invariant violation keeps its precise [`AuthError`]
//! variant so operators can see exactly what failed. At the protocol
//! boundary, [`AuthError::to_wire`] collapses state-machine detail into a
//! single `invalid_grant`-style [`OAuth2Error`]: an external caller must not
//! be able to distinguish "code doesn't exist" from "code already used"
//! (oracle resistance per RFC 6749 §5.2).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenient result alias for authority operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Internal error taxonomy
#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed request (400-equivalent)
    #[error("validation failed: {0}")]
    Validation(String),

    /// Bad credentials or client secret. Deliberately carries no detail
    /// about which factor was wrong.
    #[error("authentication failed")]
    AuthenticationFailure,

    /// Unknown code/token
    #[error("grant not found")]
    NotFound,

    /// Code/token past its TTL
    #[error("grant expired")]
    Expired,

    /// Single-use artifact redeemed a second time
    #[error("grant already used")]
    AlreadyUsed,

    /// Refresh token explicitly revoked
    #[error("grant revoked")]
    Revoked,

    /// Redemption redirect URI differs from the one recorded at issuance
    #[error("redirect uri mismatch")]
    RedirectMismatch,

    /// Redemption client differs from the issuing client
    #[error("client mismatch")]
    ClientMismatch,

    /// PKCE verifier missing, malformed, or not matching the challenge
    /// recorded at issuance
    #[error("pkce verification failed")]
    PkceMismatch,

    /// Requested scope exceeds what the grant allows
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    /// Endpoint budget exhausted (429-equivalent)
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the current window resets
        retry_after_secs: u64,
    },

    /// No tenant matched and no default tenant is configured
    #[error("tenant could not be resolved")]
    TenantUnresolved,

    /// User has not approved this client/scope combination
    #[error("consent required")]
    ConsentRequired,

    /// Storage or other internal failure
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Collapse this error into the wire representation.
    ///
    /// State-machine violations all become `invalid_grant` with a generic
    /// description; callers should log the precise variant *before* mapping.
    #[must_use]
    pub fn to_wire(&self) -> OAuth2Error {
        match self {
            Self::Validation(description) => OAuth2Error::invalid_request(description),
            Self::AuthenticationFailure => OAuth2Error::invalid_client(),
            Self::NotFound
            | Self::Expired
            | Self::AlreadyUsed
            | Self::Revoked
            | Self::RedirectMismatch
            | Self::ClientMismatch
            | Self::PkceMismatch => OAuth2Error::invalid_grant("Invalid or expired grant"),
            Self::InvalidScope(description) => OAuth2Error::invalid_scope(description),
            Self::RateLimited { retry_after_secs } => OAuth2Error::rate_limited(*retry_after_secs),
            Self::TenantUnresolved => {
                OAuth2Error::invalid_request("Tenant could not be determined")
            }
            Self::ConsentRequired => OAuth2Error::consent_required(),
            Self::Internal(_) => OAuth2Error::server_error(),
        }
    }
}

/// OAuth 2.0 error response (RFC 6749 §5.2)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Error {
    /// Error code
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    /// URI for error information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
    /// Seconds the caller should wait before retrying (rate limiting only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl OAuth2Error {
    fn new(error: &str, description: Option<&str>, uri: Option<&str>) -> Self {
        Self {
            error: error.to_owned(),
            error_description: description.map(str::to_owned),
            error_uri: uri.map(str::to_owned),
            retry_after: None,
        }
    }

    /// Create an `invalid_request` error
    #[must_use]
    pub fn invalid_request(description: &str) -> Self {
        Self::new(
            "invalid_request",
            Some(description),
            Some("https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1"),
        )
    }

    /// Create an `invalid_client` error
    #[must_use]
    pub fn invalid_client() -> Self {
        Self::new(
            "invalid_client",
            Some("Client authentication failed"),
            Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2"),
        )
    }

    /// Create an `invalid_grant` error
    #[must_use]
    pub fn invalid_grant(description: &str) -> Self {
        Self::new(
            "invalid_grant",
            Some(description),
            Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2"),
        )
    }

    /// Create an `invalid_scope` error
    #[must_use]
    pub fn invalid_scope(description: &str) -> Self {
        Self::new(
            "invalid_scope",
            Some(description),
            Some("https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1"),
        )
    }

    /// Create an `unsupported_grant_type` error
    #[must_use]
    pub fn unsupported_grant_type() -> Self {
        Self::new(
            "unsupported_grant_type",
            Some("Grant type not supported"),
            Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2"),
        )
    }

    /// Create a `consent_required` error: the caller must obtain interactive
    /// approval before a code can be issued.
    #[must_use]
    pub fn consent_required() -> Self {
        Self::new(
            "consent_required",
            Some("User approval is required for the requested scope"),
            None,
        )
    }

    /// Create a rate limiting error with a retry hint (429-equivalent)
    #[must_use]
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        let mut error = Self::new(
            "temporarily_unavailable",
            Some("Too many requests, slow down"),
            None,
        );
        error.retry_after = Some(retry_after_secs);
        error
    }

    /// Create an opaque server error
    #[must_use]
    pub fn server_error() -> Self {
        Self::new("server_error", Some("Internal error"), None)
    }
}
