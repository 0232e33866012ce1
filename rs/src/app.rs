/*
 * Responsibility
 * - Config -> services -> Router -> axum::serve()
 * - Process-wide tracing subscriber and panic hook
 */
use anyhow::Result;
use axum::Router;
use std::{panic, process};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::config::Config;
use crate::middleware::http::{self, HttpLimits};
use crate::services::auth::build_auth_service;
use crate::state::AppState;

fn init_tracing() {
    // RUST_LOG wins, e.g. RUST_LOG=info,dpop_bind=debug,tower_http=debug
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");

        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting resource server in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let auth = build_auth_service(&config).await?;
    let app = build_router(AppState::new(auth), HttpLimits::default());

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: AppState, limits: HttpLimits) -> Router {
    let router = api::routes(state.clone()).with_state(state);
    http::apply(router, limits)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use dpop_bind::{DpopKey, DpopPolicy, MemoryReplayCache, ProofVerifier, create_proof};
    use jsonwebtoken::{Algorithm, EncodingKey, Header};
    use p256::SecretKey;
    use p256::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::services::auth::{AccessTokenVerifier, AuthService};

    const BASE: &str = "http://api.test";
    const RESOURCE_URL: &str = "http://api.test/api/resource";

    struct Harness {
        router: Router,
        issuer_key: EncodingKey,
    }

    fn harness() -> Harness {
        let secret = SecretKey::from_slice(&[7u8; 32]).expect("scalar");
        let private_pem = secret.to_pkcs8_pem(LineEnding::LF).expect("pkcs8");
        let public_pem = secret
            .public_key()
            .to_public_key_pem(LineEnding::LF)
            .expect("spki");

        let access = AccessTokenVerifier::new(&public_pem, Algorithm::ES256, None, None, 0)
            .expect("verifier");
        let policy = DpopPolicy::default();
        let dpop = ProofVerifier::new(
            policy,
            Arc::new(MemoryReplayCache::from_policy(&policy)),
        )
        .expect("dpop verifier");
        let auth = Arc::new(AuthService::new(access, dpop, Some(BASE.to_string())));

        Harness {
            router: build_router(AppState::new(auth), HttpLimits::default()),
            issuer_key: EncodingKey::from_ec_pem(private_pem.as_bytes()).expect("ec key"),
        }
    }

    fn issue(h: &Harness, extra: Value) -> String {
        let mut claims = json!({
            "sub": "user-123",
            "exp": chrono::Utc::now().timestamp() + 300,
            "act": {"sub": "agent-7"},
        });
        if let (Some(base), Some(extra)) = (claims.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        jsonwebtoken::encode(&Header::new(Algorithm::ES256), &claims, &h.issuer_key)
            .expect("issue token")
    }

    fn request(token: Option<&str>, proof: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri("/api/resource");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        if let Some(proof) = proof {
            builder = builder.header("dpop", proof);
        }
        builder.body(Body::empty()).expect("request")
    }

    async fn send(h: &Harness, req: Request<Body>) -> (StatusCode, Value) {
        let res = h.router.clone().oneshot(req).await.expect("response");
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json"))
    }

    #[tokio::test]
    async fn health_is_public() {
        let h = harness();
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .expect("request");
        let (status, body) = send(&h, req).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "healthy"}));
    }

    #[tokio::test]
    async fn accepts_once_then_rejects_replay() {
        let h = harness();
        let key = DpopKey::generate().expect("key");
        let token = issue(&h, json!({}));
        let proof = create_proof("GET", RESOURCE_URL, &token, &key).expect("proof");

        let (status, body) = send(&h, request(Some(&token), Some(proof.as_str()))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], "Success");
        assert_eq!(body["subject"], "user-123");
        assert_eq!(body["actor"], json!({"sub": "agent-7"}));
        assert!(body["server_verify_ms"].is_number());
        assert!(body["breakdown"]["token_verify_ms"].is_number());
        assert!(body["breakdown"]["dpop_verify_ms"].is_number());
        assert!(body["breakdown"]["jti_check_ms"].is_number());

        let (status, body) = send(&h, request(Some(&token), Some(proof.as_str()))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "replay_detected");
    }

    #[tokio::test]
    async fn missing_headers_are_unauthorized() {
        let h = harness();
        let key = DpopKey::generate().expect("key");
        let token = issue(&h, json!({}));
        let proof = create_proof("GET", RESOURCE_URL, &token, &key).expect("proof");

        let (status, body) = send(&h, request(None, Some(proof.as_str()))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "missing_authorization");

        let (status, body) = send(&h, request(Some(&token), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "missing_dpop_proof");
    }

    #[tokio::test]
    async fn invalid_access_token_is_forbidden() {
        let h = harness();
        let key = DpopKey::generate().expect("key");
        let token = "not.a.jwt";
        let proof = create_proof("GET", RESOURCE_URL, token, &key).expect("proof");

        let (status, body) = send(&h, request(Some(token), Some(proof.as_str()))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "invalid_token");
    }

    #[tokio::test]
    async fn proof_for_another_endpoint_is_rejected() {
        let h = harness();
        let key = DpopKey::generate().expect("key");
        let token = issue(&h, json!({}));
        let proof = create_proof("GET", "http://api.test/api/other", &token, &key).expect("proof");

        let (status, body) = send(&h, request(Some(&token), Some(proof.as_str()))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "uri_mismatch");
    }

    #[tokio::test]
    async fn htu_is_compared_as_written() {
        let h = harness();
        let key = DpopKey::generate().expect("key");
        let token = issue(&h, json!({}));

        for variant in [
            "http://API.TEST/api/resource",
            "http://api.test:80/api/resource",
            "http://api.test/x/../api/resource",
        ] {
            let proof = create_proof("GET", variant, &token, &key).expect("proof");
            let (status, body) = send(&h, request(Some(&token), Some(proof.as_str()))).await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{}", variant);
            assert_eq!(body["error"]["code"], "uri_mismatch", "{}", variant);
        }
    }

    #[tokio::test]
    async fn cnf_jkt_pins_the_proof_key() {
        let h = harness();
        let bound = DpopKey::generate().expect("key");
        let other = DpopKey::generate().expect("key");
        let token = issue(&h, json!({"cnf": {"jkt": bound.thumbprint()}}));

        let proof = create_proof("GET", RESOURCE_URL, &token, &other).expect("proof");
        let (status, body) = send(&h, request(Some(&token), Some(proof.as_str()))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "key_binding_mismatch");

        let proof = create_proof("GET", RESOURCE_URL, &token, &bound).expect("proof");
        let (status, _) = send(&h, request(Some(&token), Some(proof.as_str()))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn request_id_is_generated_and_echoed() {
        let h = harness();
        let req = Request::builder()
            .uri("/health")
            .header(http::REQUEST_ID_HEADER, "abc-123")
            .body(Body::empty())
            .expect("request");
        let res = h.router.clone().oneshot(req).await.expect("response");
        assert_eq!(
            res.headers()
                .get(http::REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok()),
            Some("abc-123")
        );

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .expect("request");
        let res = h.router.clone().oneshot(req).await.expect("response");
        assert!(res.headers().contains_key(http::REQUEST_ID_HEADER));
    }
}
