//! DPoP proof JWT: wire codec, client-side generation, server-side verification.

mod codec;
mod generator;
mod verifier;

pub use codec::{DPOP_ALG, DPOP_TYP, Proof, ProofClaims, compute_ath, normalize_htu, sign_claims};
pub use generator::create_proof;
pub use verifier::{ProofVerifier, RequestBinding, VerifiedDpop};
