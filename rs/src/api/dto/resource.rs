use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ResourceResponse {
    pub data: &'static str,
    pub subject: String,
    pub actor: Option<serde_json::Value>,
    pub server_verify_ms: f64,
    pub breakdown: VerifyBreakdown,
}

#[derive(Debug, Serialize)]
pub struct VerifyBreakdown {
    pub token_verify_ms: f64,
    pub dpop_verify_ms: f64,
    pub jti_check_ms: f64,
}
