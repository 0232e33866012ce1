//! Compact proof encoding shared by the generator and the verifier.
//!
//! `base64url(header) . base64url(claims) . base64url(signature)`, no padding.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, Header};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{DpopError, RejectReason};
use crate::key::DpopKey;

pub const DPOP_TYP: &str = "dpop+jwt";
pub const DPOP_ALG: &str = "ES256";

/// Claims carried by every proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofClaims {
    pub jti: String,
    pub htm: String,
    pub htu: String,
    pub iat: i64,
    pub ath: String,
}

/// A signed proof in compact form. Single use by contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    compact: String,
    jti: String,
    iat: i64,
}

impl Proof {
    pub fn as_str(&self) -> &str {
        &self.compact
    }

    pub fn jti(&self) -> &str {
        &self.jti
    }

    pub fn iat(&self) -> i64 {
        self.iat
    }

    pub fn into_string(self) -> String {
        self.compact
    }
}

impl fmt::Display for Proof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.compact)
    }
}

/// Sign `claims` with `key` as a `dpop+jwt` / ES256 proof, embedding the public JWK.
///
/// No validation of the claim values happens here; see [`crate::create_proof`].
pub fn sign_claims(key: &DpopKey, claims: &ProofClaims) -> Result<Proof, DpopError> {
    let mut header = Header::new(Algorithm::ES256);
    header.typ = Some(DPOP_TYP.to_string());
    header.jwk = Some(key.public_record().clone());

    let compact = jsonwebtoken::encode(&header, claims, key.encoding_key())?;

    Ok(Proof {
        compact,
        jti: claims.jti.clone(),
        iat: claims.iat,
    })
}

/// `ath`: lowercase hex SHA-256 of the exact access token string.
pub fn compute_ath(access_token: &str) -> String {
    hex::encode(Sha256::digest(access_token.as_bytes()))
}

/// Drop query and fragment; what remains is compared byte-for-byte.
///
/// No URL canonicalization: host case, explicit default ports and dot
/// segments all count.
pub fn normalize_htu(raw: &str) -> &str {
    raw.split(['?', '#']).next().unwrap_or(raw)
}

pub(crate) fn ct_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Header fields as received; typed checks happen in the verifier.
#[derive(Debug, Deserialize)]
pub(crate) struct RawHeader {
    pub typ: Option<String>,
    pub alg: Option<String>,
    pub jwk: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawClaims {
    pub jti: Option<String>,
    pub htm: Option<String>,
    pub htu: Option<String>,
    pub iat: Option<i64>,
    pub ath: Option<String>,
}

#[derive(Debug)]
pub(crate) struct DecodedProof {
    pub header: RawHeader,
    pub claims: RawClaims,
}

/// Structural decode without any signature check.
pub(crate) fn decode_unverified(proof: &str) -> Result<DecodedProof, RejectReason> {
    let mut parts = proof.split('.');
    let (header_b64, claims_b64, sig_b64) = match (parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(c), Some(s)) if parts.next().is_none() => (h, c, s),
        _ => return Err(RejectReason::MalformedProof),
    };
    if header_b64.is_empty() || claims_b64.is_empty() || sig_b64.is_empty() {
        return Err(RejectReason::MalformedProof);
    }

    let header_json = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|_| RejectReason::MalformedProof)?;
    let claims_json = URL_SAFE_NO_PAD
        .decode(claims_b64)
        .map_err(|_| RejectReason::MalformedProof)?;
    URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|_| RejectReason::MalformedProof)?;

    let header: RawHeader =
        serde_json::from_slice(&header_json).map_err(|_| RejectReason::MalformedProof)?;
    let claims: RawClaims =
        serde_json::from_slice(&claims_json).map_err(|_| RejectReason::MalformedProof)?;

    Ok(DecodedProof { header, claims })
}
