//! DPoP-bound access token check -> AuthCtx in request extensions.
//!
//! Order:
//! 1. `Authorization: Bearer <token>` and `DPoP: <proof>` must both be present
//! 2. access token: signature/exp (+ iss/aud) via `AccessTokenVerifier`
//! 3. proof: `ProofVerifier::check` against this request's method, absolute URL
//!    and token (and `cnf.jkt` when the token carries one)
//! 4. `ProofVerifier::record_use` consumes the `jti`

use std::time::Instant;

use axum::{
    body::Body,
    extract::{OriginalUri, State},
    http::{HeaderMap, Request, Uri, header},
    middleware::Next,
    response::Response,
};
use dpop_bind::{RejectReason, RequestBinding};
use tracing::warn;

use crate::api::extractors::{AuthCtx, VerifyTimings};
use crate::error::AppError;
use crate::state::AppState;

pub const DPOP_HEADER: &str = "dpop";

pub async fn access_middleware(
    State(state): State<AppState>,
    OriginalUri(original_uri): OriginalUri,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let started = Instant::now();

    let token = bearer_token(req.headers())
        .ok_or_else(|| AppError::unauthorized("missing_authorization", "Missing authorization"))?
        .to_string();
    let proof = dpop_proof(req.headers())?.to_string();

    let token_started = Instant::now();
    let claims = state.auth.access().verify(&token).map_err(|err| {
        warn!(error = %err, "access token verification failed");
        AppError::forbidden("invalid_token", format!("Invalid token: {}", err))
    })?;
    let token_verify_ms = elapsed_ms(token_started);

    let expected_htu =
        build_expected_htu(req.headers(), &original_uri, state.auth.public_base_url());

    let reject = |reason: RejectReason| {
        warn!(
            reason = reason.code(),
            subject = %claims.subject,
            htu = %expected_htu,
            "dpop verification failed"
        );
        AppError::from(reason)
    };
    let binding = RequestBinding {
        method: req.method().as_str(),
        url: &expected_htu,
        access_token: &token,
        expected_jkt: claims.cnf_jkt.as_deref(),
    };

    // Proof checks and jti consumption are timed apart.
    let dpop_started = Instant::now();
    let verified = state
        .auth
        .dpop()
        .check(&proof, &binding, chrono::Utc::now().timestamp())
        .map_err(reject)?;
    let dpop_verify_ms = elapsed_ms(dpop_started);

    let jti_started = Instant::now();
    state
        .auth
        .dpop()
        .record_use(&verified)
        .await
        .map_err(reject)?;
    let jti_check_ms = elapsed_ms(jti_started);

    let auth_ctx = AuthCtx {
        subject: claims.subject,
        actor: claims.actor,
        dpop_jkt: verified.jkt,
        dpop_jti: verified.jti,
        timings: VerifyTimings {
            token_verify_ms,
            dpop_verify_ms,
            jti_check_ms,
            total_ms: elapsed_ms(started),
        },
    };

    // middleware -> extractor
    req.extensions_mut().insert(auth_ctx);

    Ok(next.run(req).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

fn dpop_proof(headers: &HeaderMap) -> Result<&str, AppError> {
    let mut values = headers.get_all(DPOP_HEADER).iter();
    let first = values
        .next()
        .ok_or_else(|| AppError::unauthorized("missing_dpop_proof", "Missing DPoP proof"))?;
    // Exactly one proof per request.
    if values.next().is_some() {
        return Err(AppError::unauthorized(
            "multiple_dpop_proofs",
            "Multiple DPoP proofs",
        ));
    }
    first
        .to_str()
        .map_err(|_| AppError::unauthorized("malformed_proof", "Invalid DPoP header encoding"))
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

/// Absolute URL the client should have bound its proof to.
pub fn build_expected_htu(headers: &HeaderMap, uri: &Uri, public_base_url: Option<&str>) -> String {
    if let Some(base) = public_base_url {
        if let Ok(url) = build_htu_from_base(base, uri) {
            return url;
        }
        // Validated at startup; fall through to forwarded headers just in case.
    }
    build_htu_from_forwarded(headers, uri)
}

fn build_htu_from_base(base: &str, uri: &Uri) -> Result<String, url::ParseError> {
    // `base` should be like: https://api.example.com
    let mut url = url::Url::parse(base)?;
    url.set_path(uri.path());
    url.set_query(uri.query());
    Ok(url.to_string())
}

fn build_htu_from_forwarded(headers: &HeaderMap, uri: &Uri) -> String {
    // Prefer proxy headers when present.
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");

    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get(header::HOST))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("{}://{}{}", scheme, host, path_and_query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn htu_prefers_configured_base_url() {
        let uri: Uri = "/api/resource?x=1".parse().expect("uri");
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("internal:8000"));

        assert_eq!(
            build_expected_htu(&headers, &uri, Some("https://api.example.com")),
            "https://api.example.com/api/resource?x=1"
        );
    }

    #[test]
    fn htu_falls_back_to_forwarded_then_host() {
        let uri: Uri = "/api/resource".parse().expect("uri");
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("internal:8000"));
        assert_eq!(
            build_expected_htu(&headers, &uri, None),
            "http://internal:8000/api/resource"
        );

        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        headers.insert("x-forwarded-host", HeaderValue::from_static("api.example.com"));
        assert_eq!(
            build_expected_htu(&headers, &uri, None),
            "https://api.example.com/api/resource"
        );
    }

    #[test]
    fn bearer_requires_scheme_and_value() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok"));
        assert_eq!(bearer_token(&headers), Some("tok"));
    }
}
