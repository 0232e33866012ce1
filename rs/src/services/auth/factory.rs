//! Builds `AuthService` (access verifier + DPoP verifier + replay backend) from `Config`.
use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use dpop_bind::{MemoryReplayCache, ProofVerifier, ReplayStore, ValkeyReplayStore};

use crate::config::{Config, ReplayBackend};
use crate::services::auth::{AccessTokenVerifier, AuthService};

pub async fn build_auth_service(config: &Config) -> Result<Arc<AuthService>> {
    let access = AccessTokenVerifier::new(
        &config.access_jwt_public_key_pem,
        config.access_jwt_algorithm,
        config.auth_issuer.as_deref(),
        config.auth_audience.as_deref(),
        config.access_token_leeway_seconds,
    )
    .context("build access token verifier")?;

    let policy = config.dpop_policy;
    let replay: Arc<dyn ReplayStore> = match &config.replay_backend {
        ReplayBackend::Memory => {
            let every = Duration::from_secs(config.replay_sweep_interval_seconds.max(1));
            let cache =
                Arc::new(MemoryReplayCache::from_policy(&policy).with_sweep_interval(every));
            cache.spawn_sweeper(every);
            cache
        }
        ReplayBackend::Valkey { url } => Arc::new(
            ValkeyReplayStore::connect(url, policy.replay_ttl_seconds())
                .await
                .context("connect replay store")?,
        ),
    };

    tracing::info!(
        iat_window_seconds = policy.iat_window_seconds(),
        replay_ttl_seconds = policy.replay_ttl_seconds(),
        backend = config.replay_backend.name(),
        "DPoP verifier ready"
    );

    let dpop = ProofVerifier::new(policy, replay).context("build DPoP verifier")?;

    Ok(Arc::new(AuthService::new(
        access,
        dpop,
        config.public_base_url.clone(),
    )))
}
