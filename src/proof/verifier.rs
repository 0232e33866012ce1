//! DPoP proof validation (RFC 9449).
//!
//! Checks run cheapest first: structure, header, signature, key binding,
//! claims, request binding, freshness, token binding. The replay store is
//! consulted last so a proof is only consumed once everything else passed.
//!
//! The verifier knows nothing about HTTP; callers hand in the extracted
//! `DPoP` header value, the request method, the full request URL and the
//! bearer token.

use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, Validation, jwk::Jwk};
use tracing::{debug, warn};

use crate::error::RejectReason;
use crate::key::jwk_thumbprint;
use crate::policy::{DpopPolicy, PolicyError};
use crate::proof::codec::{
    DPOP_ALG, DPOP_TYP, RawClaims, RawHeader, compute_ath, ct_eq, decode_unverified,
    normalize_htu,
};
use crate::replay::ReplayStore;

/// What the proof must be bound to.
#[derive(Debug, Clone, Copy)]
pub struct RequestBinding<'a> {
    pub method: &'a str,
    pub url: &'a str,
    pub access_token: &'a str,
    // `cnf.jkt` from the access token, when it carries one.
    pub expected_jkt: Option<&'a str>,
}

/// An accepted proof. Its `jti` is now consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedDpop {
    pub jti: String,
    pub htm: String,
    pub htu: String,
    pub iat: i64,
    pub jkt: String,
}

#[derive(Clone)]
pub struct ProofVerifier {
    policy: DpopPolicy,
    replay: Arc<dyn ReplayStore>,
    validation: Validation,
}

impl std::fmt::Debug for ProofVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofVerifier")
            .field("policy", &self.policy)
            .finish()
    }
}

struct CheckedHeader {
    decoding_key: DecodingKey,
    jkt: String,
}

struct CompleteClaims {
    jti: String,
    htm: String,
    htu: String,
    iat: i64,
    ath: String,
}

impl ProofVerifier {
    /// Fails when `replay` forgets a `jti` before its proof leaves the
    /// freshness window.
    pub fn new(policy: DpopPolicy, replay: Arc<dyn ReplayStore>) -> Result<Self, PolicyError> {
        policy.check_store_retention(replay.retention_seconds())?;

        // Signature only: a proof has no exp/aud, freshness is checked on iat below.
        let mut validation = Validation::new(Algorithm::ES256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Ok(Self {
            policy,
            replay,
            validation,
        })
    }

    pub fn policy(&self) -> DpopPolicy {
        self.policy
    }

    /// Verify `proof` for one request and consume its `jti`.
    pub async fn verify(
        &self,
        proof: &str,
        request_method: &str,
        request_url: &str,
        access_token: &str,
    ) -> Result<VerifiedDpop, RejectReason> {
        let binding = RequestBinding {
            method: request_method,
            url: request_url,
            access_token,
            expected_jkt: None,
        };
        self.verify_at(proof, &binding, chrono::Utc::now().timestamp())
            .await
    }

    /// Like [`verify`](Self::verify), additionally pinning the proof key to the
    /// access token's `cnf.jkt`.
    pub async fn verify_with_jkt(
        &self,
        proof: &str,
        request_method: &str,
        request_url: &str,
        access_token: &str,
        expected_jkt: Option<&str>,
    ) -> Result<VerifiedDpop, RejectReason> {
        let binding = RequestBinding {
            method: request_method,
            url: request_url,
            access_token,
            expected_jkt,
        };
        self.verify_at(proof, &binding, chrono::Utc::now().timestamp())
            .await
    }

    /// Full verification against an explicit `now` (unix seconds).
    pub async fn verify_at(
        &self,
        proof: &str,
        binding: &RequestBinding<'_>,
        now: i64,
    ) -> Result<VerifiedDpop, RejectReason> {
        let verified = self.check(proof, binding, now).inspect_err(|reason| {
            debug!(reason = reason.code(), "DPoP proof rejected");
        })?;
        self.record_use(&verified).await?;

        debug!(jti = %verified.jti, jkt = %verified.jkt, "DPoP proof accepted");
        Ok(verified)
    }

    /// Step 9 alone: consume the `jti` of a proof that passed [`check`](Self::check).
    pub async fn record_use(&self, verified: &VerifiedDpop) -> Result<(), RejectReason> {
        let already_seen = self
            .replay
            .seen_and_record(&verified.jti)
            .await
            .map_err(|e| {
                warn!(error = ?e, jti = %verified.jti, "replay store failure");
                RejectReason::ReplayStoreUnavailable
            })?;

        if already_seen {
            debug!(jti = %verified.jti, "DPoP replay detected");
            return Err(RejectReason::ReplayDetected);
        }
        Ok(())
    }

    /// Steps 1-8: everything except the replay store. Pure and side-effect free.
    pub fn check(
        &self,
        proof: &str,
        binding: &RequestBinding<'_>,
        now: i64,
    ) -> Result<VerifiedDpop, RejectReason> {
        // 1) structure
        let decoded = decode_unverified(proof)?;

        // 2) header
        let header = check_header(&decoded.header)?;

        // 3) signature with the embedded key
        jsonwebtoken::decode::<serde_json::Value>(proof, &header.decoding_key, &self.validation)
            .map_err(|e| {
                debug!(error = ?e, "DPoP signature verification failed");
                RejectReason::BadSignature
            })?;

        // sender-constrained: cnf.jkt vs proof key thumbprint
        if let Some(expected) = binding.expected_jkt {
            if !ct_eq(&header.jkt, expected) {
                return Err(RejectReason::KeyBindingMismatch);
            }
        }

        // 4) claims completeness
        let claims = complete_claims(decoded.claims)?;

        // 5) htm, case-sensitive
        if claims.htm != binding.method {
            return Err(RejectReason::MethodMismatch);
        }

        // 6) htu, query/fragment stripped on both sides
        if normalize_htu(&claims.htu) != normalize_htu(binding.url) {
            return Err(RejectReason::UriMismatch);
        }

        // 7) iat window
        if !self.policy.is_fresh(claims.iat, now) {
            return Err(RejectReason::StaleOrFutureProof);
        }

        // 8) ath
        if !ct_eq(&claims.ath, &compute_ath(binding.access_token)) {
            return Err(RejectReason::TokenBindingMismatch);
        }

        Ok(VerifiedDpop {
            jti: claims.jti,
            htm: claims.htm,
            htu: claims.htu,
            iat: claims.iat,
            jkt: header.jkt,
        })
    }
}

fn check_header(header: &RawHeader) -> Result<CheckedHeader, RejectReason> {
    if header.typ.as_deref() != Some(DPOP_TYP) {
        return Err(RejectReason::InvalidHeader);
    }
    if header.alg.as_deref() != Some(DPOP_ALG) {
        return Err(RejectReason::InvalidHeader);
    }

    let raw_jwk = header.jwk.as_ref().ok_or(RejectReason::InvalidHeader)?;
    let members = raw_jwk.as_object().ok_or(RejectReason::InvalidHeader)?;
    // The embedded key must be public only.
    if members.contains_key("d") {
        return Err(RejectReason::InvalidHeader);
    }

    let jwk: Jwk = serde_json::from_value(raw_jwk.clone()).map_err(|e| {
        debug!(error = ?e, "undecodable DPoP jwk");
        RejectReason::InvalidHeader
    })?;
    let jkt = jwk_thumbprint(&jwk).ok_or(RejectReason::InvalidHeader)?;
    let decoding_key = DecodingKey::from_jwk(&jwk).map_err(|e| {
        debug!(error = ?e, "unusable DPoP jwk");
        RejectReason::InvalidHeader
    })?;

    Ok(CheckedHeader { decoding_key, jkt })
}

fn complete_claims(raw: RawClaims) -> Result<CompleteClaims, RejectReason> {
    fn non_empty(value: Option<String>) -> Result<String, RejectReason> {
        value
            .filter(|v| !v.is_empty())
            .ok_or(RejectReason::MissingClaims)
    }

    Ok(CompleteClaims {
        jti: non_empty(raw.jti)?,
        htm: non_empty(raw.htm)?,
        htu: non_empty(raw.htu)?,
        iat: raw.iat.ok_or(RejectReason::MissingClaims)?,
        ath: non_empty(raw.ath)?,
    })
}
