/*
 * Responsibility
 * - DPoP failures split in two families:
 *   - `RejectReason`: one inbound proof is refused (non-fatal, per request)
 *   - `DpopError`: the local engine cannot build a proof (key/signing)
 * - Boundary components map `RejectReason::code()` onto their protocol error.
 */
use thiserror::Error;

/// Why the verifier refused a proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("malformed DPoP proof")]
    MalformedProof,
    #[error("invalid DPoP header")]
    InvalidHeader,
    #[error("DPoP signature verification failed")]
    BadSignature,
    #[error("DPoP key does not match the access token binding")]
    KeyBindingMismatch,
    #[error("missing required claims")]
    MissingClaims,
    #[error("htm mismatch")]
    MethodMismatch,
    #[error("htu mismatch")]
    UriMismatch,
    #[error("iat too old or in the future")]
    StaleOrFutureProof,
    #[error("ath mismatch")]
    TokenBindingMismatch,
    #[error("DPoP replay detected")]
    ReplayDetected,
    #[error("replay store unavailable")]
    ReplayStoreUnavailable,
}

impl RejectReason {
    /// Stable machine-readable code, used in error bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedProof => "malformed_proof",
            Self::InvalidHeader => "invalid_header",
            Self::BadSignature => "bad_signature",
            Self::KeyBindingMismatch => "key_binding_mismatch",
            Self::MissingClaims => "missing_claims",
            Self::MethodMismatch => "method_mismatch",
            Self::UriMismatch => "uri_mismatch",
            Self::StaleOrFutureProof => "stale_or_future_proof",
            Self::TokenBindingMismatch => "token_binding_mismatch",
            Self::ReplayDetected => "replay_detected",
            Self::ReplayStoreUnavailable => "replay_store_unavailable",
        }
    }

    /// Whether the client may succeed by sending a *freshly generated* proof.
    ///
    /// Never true for retrying the same proof string.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::MissingClaims
                | Self::MethodMismatch
                | Self::UriMismatch
                | Self::TokenBindingMismatch
                | Self::StaleOrFutureProof
                | Self::ReplayStoreUnavailable
        )
    }
}

/// Local failures while creating keys or proofs.
#[derive(Debug, Error)]
pub enum DpopError {
    #[error("entropy source unavailable: {0}")]
    Entropy(String),
    #[error("invalid key material: {0}")]
    InvalidKey(String),
    #[error("invalid proof input: {0}")]
    InvalidInput(&'static str),
    #[error("proof signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("proof encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}
