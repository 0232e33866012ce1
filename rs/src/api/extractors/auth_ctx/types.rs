/*
 * Responsibility
 * - The authenticated context handlers see
 * - The middleware fills it after both the access token and the DPoP proof passed
 */

/// Context attached to an authenticated request.
///
/// - `subject` / `actor` come from the access token (`sub`, RFC 8693 `act`)
/// - `dpop_jkt` is the thumbprint of the key that signed the proof
/// - `dpop_jti` is the consumed proof id (log correlation)
#[derive(Debug, Clone)]
pub struct AuthCtx {
    pub subject: String,
    pub actor: Option<serde_json::Value>,
    pub dpop_jkt: String,
    pub dpop_jti: String,
    pub timings: VerifyTimings,
}

/// Milliseconds spent in each verification step.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyTimings {
    pub token_verify_ms: f64,
    pub dpop_verify_ms: f64,
    pub jti_check_ms: f64,
    pub total_ms: f64,
}
