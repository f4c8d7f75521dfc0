// ABOUTME: Access token signing with ML-DSA-65 (FIPS 204) and a deprecated legacy RS256 path
// ABOUTME: Two-phase initialization: construct the signer, then bind runtime-generated keys
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mintgate Contributors

//! Token Signer.
//!
//! Mints compact JWTs with a short expiry (minutes, not hours) to limit the
//! blast radius of a leaked token. The default signature scheme is
//! ML-DSA-65, the module-lattice scheme of NIST FIPS 204; JOSE `alg`
//! `ML-DSA-65`, JWK `kty` `AKP`. A legacy RS256 path coexists for
//! migration but must never be the default for new deployments.
//!
//! Key material is computed at runtime, so initialization is two-phase:
//! [`TokenSigner::new`] constructs the signer unbound, and
//! [`TokenSigner::bind_signing_keys`] installs the key pair exactly once.

use crate::config::{AuthorityConfig, SigningAlgorithm};
use crate::errors::{AuthError, AuthResult};
use crate::identity::Clock;
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use chrono::Duration;
use fips204::ml_dsa_65;
use fips204::traits::{SerDes, Signer as _, Verifier as _};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Validation};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

/// JWKS document types
pub mod jwks;

pub use jwks::{JsonWebKey, JwksDocument};

/// RSA key size for the legacy path
const RSA_KEY_SIZE: usize = 2048;

/// Claims carried by every access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Issuer URL
    pub iss: String,
    /// Subject: the user id
    pub sub: String,
    /// Audience
    pub aud: String,
    /// Expiry, epoch seconds
    pub exp: i64,
    /// Issued-at, epoch seconds
    pub iat: i64,
    /// Token id
    pub jti: String,
    /// Tenant the token was minted in
    pub tenant_id: String,
    /// Client the token was minted through, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Space-separated granted scopes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Role names of the subject
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

/// Inputs to access token issuance
#[derive(Debug, Clone)]
pub struct AccessTokenParams {
    /// Subject user
    pub user_id: Uuid,
    /// Tenant of the grant
    pub tenant_id: Uuid,
    /// Role names of the subject
    pub roles: Vec<String>,
    /// Space-separated granted scopes
    pub scope: Option<String>,
    /// Client the token is minted through, if any
    pub client_id: Option<String>,
}

/// ML-DSA-65 signing key pair
pub struct MlDsaKeyPair {
    kid: String,
    public: ml_dsa_65::PublicKey,
    private: ml_dsa_65::PrivateKey,
}

/// Legacy RSA signing key pair (RS256)
pub struct RsaKeyPair {
    kid: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
    /// Modulus, base64url, for JWKS publication
    n: String,
    /// Exponent, base64url, for JWKS publication
    e: String,
}

/// Bound signing key material
pub enum SigningKeys {
    /// ML-DSA-65, the default
    MlDsa65(MlDsaKeyPair),
    /// Deprecated RS256 migration path
    Rs256Legacy(RsaKeyPair),
}

impl SigningKeys {
    /// Generate a fresh ML-DSA-65 key pair.
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn generate_ml_dsa() -> Result<Self> {
        let (public, private) =
            ml_dsa_65::try_keygen().map_err(|e| anyhow!("ml-dsa keygen failed: {e}"))?;
        Ok(Self::MlDsa65(MlDsaKeyPair {
            kid: fresh_kid("ml-dsa"),
            public,
            private,
        }))
    }

    /// Generate a fresh RSA key pair for the deprecated legacy path.
    ///
    /// # Errors
    /// Returns an error if key generation or PEM encoding fails.
    pub fn generate_rs256_legacy() -> Result<Self> {
        let mut rng = rand::rngs::OsRng;
        let private = RsaPrivateKey::new(&mut rng, RSA_KEY_SIZE)
            .context("rsa keygen failed")?;
        let public = RsaPublicKey::from(&private);

        let private_pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .context("failed to encode rsa private key")?;
        let public_pem = public
            .to_public_key_pem(LineEnding::LF)
            .context("failed to encode rsa public key")?;

        Ok(Self::Rs256Legacy(RsaKeyPair {
            kid: fresh_kid("rsa"),
            encoding: EncodingKey::from_rsa_pem(private_pem.as_bytes())
                .context("invalid rsa private pem")?,
            decoding: DecodingKey::from_rsa_pem(public_pem.as_bytes())
                .context("invalid rsa public pem")?,
            n: general_purpose::URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
            e: general_purpose::URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
        }))
    }

    fn algorithm(&self) -> SigningAlgorithm {
        match self {
            Self::MlDsa65(_) => SigningAlgorithm::MlDsa65,
            Self::Rs256Legacy(_) => SigningAlgorithm::Rs256Legacy,
        }
    }

    fn kid(&self) -> &str {
        match self {
            Self::MlDsa65(keys) => &keys.kid,
            Self::Rs256Legacy(keys) => &keys.kid,
        }
    }
}

fn fresh_kid(prefix: &str) -> String {
    format!("{prefix}-{}", &Uuid::new_v4().simple().to_string()[..8])
}

#[derive(Debug, Serialize, Deserialize)]
struct JoseHeader {
    alg: String,
    typ: String,
    kid: String,
}

/// Mints and verifies signed access tokens
pub struct TokenSigner {
    config: AuthorityConfig,
    clock: Arc<dyn Clock>,
    keys: OnceLock<SigningKeys>,
}

impl TokenSigner {
    /// Construct an unbound signer. Issuing before
    /// [`TokenSigner::bind_signing_keys`] is an internal error.
    #[must_use]
    pub fn new(config: AuthorityConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            keys: OnceLock::new(),
        }
    }

    /// Bind runtime-generated key material, exactly once.
    ///
    /// # Errors
    /// Returns an error if keys are already bound or if a legacy key pair is
    /// bound on a deployment configured for ML-DSA (the legacy path must be
    /// opted into, never drifted into).
    pub fn bind_signing_keys(&self, keys: SigningKeys) -> AuthResult<()> {
        if keys.algorithm() != self.config.signing_algorithm {
            return Err(AuthError::Internal(anyhow!(
                "signing key algorithm does not match configured algorithm"
            )));
        }
        if keys.algorithm() == SigningAlgorithm::Rs256Legacy {
            tracing::warn!("binding DEPRECATED legacy RS256 signing keys");
        }
        self.keys
            .set(keys)
            .map_err(|_| AuthError::Internal(anyhow!("signing keys already bound")))?;
        Ok(())
    }

    fn bound_keys(&self) -> AuthResult<&SigningKeys> {
        self.keys
            .get()
            .ok_or_else(|| AuthError::Internal(anyhow!("signing keys not bound")))
    }

    /// Mint a compact signed access token.
    ///
    /// # Errors
    /// Returns an error when keys are unbound or signing fails.
    pub fn issue_access_token(&self, params: AccessTokenParams) -> AuthResult<String> {
        let now = self.clock.now();
        let claims = AccessTokenClaims {
            iss: self.config.issuer.clone(),
            sub: params.user_id.to_string(),
            aud: self.config.audience.clone(),
            exp: (now + Duration::seconds(self.config.access_token_ttl_secs)).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            tenant_id: params.tenant_id.to_string(),
            client_id: params.client_id,
            scope: params.scope,
            roles: params.roles,
        };

        match self.bound_keys()? {
            SigningKeys::MlDsa65(keys) => Ok(sign_ml_dsa(keys, &claims)?),
            SigningKeys::Rs256Legacy(keys) => {
                let mut header = jsonwebtoken::Header::new(Algorithm::RS256);
                header.kid = Some(keys.kid.clone());
                jsonwebtoken::encode(&header, &claims, &keys.encoding)
                    .map_err(|e| AuthError::Internal(anyhow!("rs256 signing failed: {e}")))
            }
        }
    }

    /// Verify a compact token: signature, issuer, audience, expiry.
    ///
    /// # Errors
    /// `AuthenticationFailure` for any verification failure, `Expired` for a
    /// well-signed but stale token.
    pub fn verify(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        match self.bound_keys()? {
            SigningKeys::MlDsa65(keys) => {
                let claims = verify_ml_dsa(keys, token)?;
                self.check_registered_claims(&claims)?;
                Ok(claims)
            }
            SigningKeys::Rs256Legacy(keys) => {
                let mut validation = Validation::new(Algorithm::RS256);
                validation.set_issuer(&[&self.config.issuer]);
                validation.set_audience(&[&self.config.audience]);
                let data = jsonwebtoken::decode::<AccessTokenClaims>(
                    token,
                    &keys.decoding,
                    &validation,
                )
                .map_err(|e| match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                    _ => AuthError::AuthenticationFailure,
                })?;
                Ok(data.claims)
            }
        }
    }

    fn check_registered_claims(&self, claims: &AccessTokenClaims) -> AuthResult<()> {
        if claims.exp <= self.clock.now().timestamp() {
            return Err(AuthError::Expired);
        }
        if claims.iss != self.config.issuer || claims.aud != self.config.audience {
            return Err(AuthError::AuthenticationFailure);
        }
        Ok(())
    }

    /// The JWKS document resource servers fetch to verify tokens.
    ///
    /// # Errors
    /// Returns an error when keys are unbound.
    pub fn jwks_document(&self) -> AuthResult<JwksDocument> {
        let key = match self.bound_keys()? {
            SigningKeys::MlDsa65(keys) => JsonWebKey {
                kty: "AKP".into(),
                key_use: "sig".into(),
                kid: keys.kid.clone(),
                alg: "ML-DSA-65".into(),
                public_key: Some(
                    general_purpose::URL_SAFE_NO_PAD.encode(keys.public.clone().into_bytes()),
                ),
                n: None,
                e: None,
            },
            SigningKeys::Rs256Legacy(keys) => JsonWebKey {
                kty: "RSA".into(),
                key_use: "sig".into(),
                kid: keys.kid.clone(),
                alg: "RS256".into(),
                public_key: None,
                n: Some(keys.n.clone()),
                e: Some(keys.e.clone()),
            },
        };
        Ok(JwksDocument { keys: vec![key] })
    }
}

fn sign_ml_dsa(keys: &MlDsaKeyPair, claims: &AccessTokenClaims) -> Result<String> {
    let header = JoseHeader {
        alg: "ML-DSA-65".into(),
        typ: "JWT".into(),
        kid: keys.kid.clone(),
    };
    let signing_input = format!(
        "{}.{}",
        general_purpose::URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
        general_purpose::URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?),
    );
    let signature = keys
        .private
        .try_sign(signing_input.as_bytes(), &[])
        .map_err(|e| anyhow!("ml-dsa signing failed: {e}"))?;
    Ok(format!(
        "{signing_input}.{}",
        general_purpose::URL_SAFE_NO_PAD.encode(signature)
    ))
}

fn verify_ml_dsa(keys: &MlDsaKeyPair, token: &str) -> AuthResult<AccessTokenClaims> {
    let mut parts = token.splitn(3, '.');
    let (Some(header_b64), Some(claims_b64), Some(signature_b64)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::AuthenticationFailure);
    };

    let header: JoseHeader = general_purpose::URL_SAFE_NO_PAD
        .decode(header_b64)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or(AuthError::AuthenticationFailure)?;
    if header.alg != "ML-DSA-65" || header.kid != keys.kid {
        return Err(AuthError::AuthenticationFailure);
    }

    let signature_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AuthError::AuthenticationFailure)?;
    let signature: [u8; ml_dsa_65::SIG_LEN] = signature_bytes
        .try_into()
        .map_err(|_| AuthError::AuthenticationFailure)?;

    let signing_input = format!("{header_b64}.{claims_b64}");
    if !keys
        .public
        .verify(signing_input.as_bytes(), &signature, &[])
    {
        return Err(AuthError::AuthenticationFailure);
    }

    general_purpose::URL_SAFE_NO_PAD
        .decode(claims_b64)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or(AuthError::AuthenticationFailure)
}
