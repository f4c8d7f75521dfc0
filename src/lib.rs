// ABOUTME: Main library entry point for the mintgate token authority
// ABOUTME: Issues, redeems, rotates, and revokes OAuth2/OIDC authorization artifacts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

#![deny(unsafe_code)]

//! # Mintgate
//!
//! A multi-tenant OAuth2/OIDC token authority. Mintgate owns the
//! security-critical grant state machine (RFC 6749 / RFC 7636) and the
//! artifacts that flow through it:
//!
//! - **Authorization codes**: short-lived, single-use, PKCE-bound
//! - **Refresh tokens**: long-lived bearer secrets, encrypted at rest,
//!   looked up by hash, reusable until expiry or explicit revocation
//! - **MFA challenge tokens**: single-use step-up-auth nonces
//! - **Access tokens**: compact JWTs signed with ML-DSA-65 (FIPS 204),
//!   with a deprecated legacy RS256 path for migration
//!
//! Inbound requests pass through the [`rate_limit::RateLimiter`] and the
//! [`tenant::TenantResolver`], are authenticated by the
//! [`clients::ClientRegistry`], and then the appropriate engine executes
//! its state transition against a single transactional [`storage::AuthStore`].
//! The [`authority::TokenAuthority`] facade wires these together and collapses
//! internal error detail into non-enumerable wire errors.
//!
//! User storage, password hashing, and at-rest key management are external
//! collaborators behind the [`identity::IdentityProvider`] and
//! [`crypto::encryption::TokenCipher`] traits.

/// Token authority facade: grants, token endpoint, introspection
pub mod authority;
/// OAuth client registry: validation, registration, secret rotation
pub mod clients;
/// Authorization code engine (RFC 6749 §4.1 with PKCE)
pub mod codes;
/// Immutable runtime configuration
pub mod config;
/// Consent engine: scope grants and silent-approval checks
pub mod consent;
/// Random generation, at-rest encryption, and hashing primitives
pub mod crypto;
/// Error taxonomy and OAuth2 wire errors
pub mod errors;
/// Collaborator contracts: identity provider and clock
pub mod identity;
/// Structured logging setup
pub mod logging;
/// MFA challenge token manager
pub mod mfa;
/// Persistent entities
pub mod models;
/// Per-endpoint fixed-window rate limiting
pub mod rate_limit;
/// Refresh token lifecycle manager
pub mod refresh;
/// Access token signing and JWKS publication
pub mod signer;
/// Repository-style storage abstraction
pub mod storage;
/// Tenant resolution (explicit id, email domain, vanity hostname)
pub mod tenant;
