//! DPoP (RFC 9449) proof-of-possession engine.
//!
//! Client side: a [`ClientSession`] owns one ephemeral P-256 [`DpopKey`] and the
//! cached access token, and signs a fresh proof for every outbound request.
//!
//! Server side: a [`ProofVerifier`] checks an inbound proof against the live
//! request (method, URL, bearer token) and consumes its `jti` in a
//! [`ReplayStore`] so a proof is accepted at most once.
//!
//! HTTP parsing, access-token signature checks and grant flows stay with the
//! caller.

pub mod error;
pub mod key;
pub mod policy;
pub mod proof;
pub mod replay;
pub mod session;

pub use error::{DpopError, RejectReason};
pub use key::{DpopKey, jwk_thumbprint};
pub use policy::{DpopPolicy, PolicyError};
pub use proof::{
    Proof, ProofClaims, ProofVerifier, RequestBinding, VerifiedDpop, compute_ath, create_proof,
    normalize_htu, sign_claims,
};
pub use replay::{MemoryReplayCache, ReplayError, ReplayStore, ValkeyReplayStore};
pub use session::{
    ClientSession, DpopHeaders, IssuedToken, SessionError, TokenSource, TokenSourceError,
};
