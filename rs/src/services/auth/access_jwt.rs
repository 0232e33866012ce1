//! Access token verification against the issuer's public key.
//!
//! `exp` (+ `iss`/`aud` when configured) are enforced by `jsonwebtoken::Validation`;
//! `sub` must be non-blank; `act` and `cnf.jkt` are projected for the DPoP check.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccessKeyError {
    #[error("unsupported access token algorithm: {0:?}")]
    UnsupportedAlgorithm(Algorithm),
    #[error("invalid access token public key: {0}")]
    InvalidPem(#[source] jsonwebtoken::errors::Error),
}

#[derive(Debug, Error)]
pub enum AccessJwtError {
    #[error("jwt verification failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("blank '{0}' claim")]
    BlankClaim(&'static str),
}

#[derive(Debug, Deserialize)]
struct AccessTokenClaims {
    sub: String,
    #[serde(default)]
    act: Option<serde_json::Value>,
    #[serde(default)]
    cnf: Option<Confirmation>,
}

// RFC 9449 §6.1 confirmation claim.
#[derive(Debug, Deserialize)]
struct Confirmation {
    #[serde(default)]
    jkt: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedAccessToken {
    pub subject: String,
    pub actor: Option<serde_json::Value>,
    pub cnf_jkt: Option<String>,
}

#[derive(Clone)]
pub struct AccessTokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for AccessTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenVerifier")
            .field("algorithms", &self.validation.algorithms)
            .field("iss", &self.validation.iss)
            .field("aud", &self.validation.aud)
            .finish_non_exhaustive()
    }
}

impl AccessTokenVerifier {
    pub fn new(
        public_key_pem: &str,
        algorithm: Algorithm,
        issuer: Option<&str>,
        audience: Option<&str>,
        leeway_seconds: u64,
    ) -> Result<Self, AccessKeyError> {
        let pem = public_key_pem.as_bytes();
        let decoding_key = match algorithm {
            Algorithm::RS256 => DecodingKey::from_rsa_pem(pem),
            Algorithm::ES256 => DecodingKey::from_ec_pem(pem),
            Algorithm::EdDSA => DecodingKey::from_ed_pem(pem),
            other => return Err(AccessKeyError::UnsupportedAlgorithm(other)),
        }
        .map_err(AccessKeyError::InvalidPem)?;

        let mut validation = Validation::new(algorithm);
        validation.leeway = leeway_seconds;
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }
        // No audience configured: accept any.
        match audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            decoding_key,
            validation,
        })
    }

    pub fn verify(&self, token: &str) -> Result<VerifiedAccessToken, AccessJwtError> {
        let data =
            jsonwebtoken::decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation)?;
        let AccessTokenClaims { sub, act, cnf } = data.claims;

        if sub.trim().is_empty() {
            return Err(AccessJwtError::BlankClaim("sub"));
        }

        Ok(VerifiedAccessToken {
            subject: sub,
            actor: act,
            cnf_jkt: cnf.and_then(|c| c.jkt),
        })
    }
}
