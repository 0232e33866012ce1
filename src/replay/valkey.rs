use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::replay::store::{ReplayError, ReplayStore};

/// Valkey-backed replay store (Redis protocol), for deployments where several
/// server instances must share one view of consumed `jti` values.
///
/// Fail-closed policy is implemented by returning `Err` on any backend error;
/// the verifier turns that into a rejection.
#[derive(Clone)]
pub struct ValkeyReplayStore {
    manager: ConnectionManager,
    // Optional key prefix to avoid collisions across environments
    prefix: String,
    ttl_seconds: u64,
}

impl std::fmt::Debug for ValkeyReplayStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValkeyReplayStore")
            .field("prefix", &self.prefix)
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

impl ValkeyReplayStore {
    /// Connect to a URL like `redis://localhost:6379`.
    pub async fn connect(url: &str, ttl_seconds: u64) -> Result<Self, ReplayError> {
        Self::connect_with_prefix(url, "dpop:jti", ttl_seconds).await
    }

    pub async fn connect_with_prefix(
        url: &str,
        prefix: impl Into<String>,
        ttl_seconds: u64,
    ) -> Result<Self, ReplayError> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;

        Ok(Self {
            manager,
            prefix: prefix.into(),
            ttl_seconds,
        })
    }

    pub fn key(&self, jti: &str) -> String {
        store_key(&self.prefix, jti)
    }
}

fn store_key(prefix: &str, jti: &str) -> String {
    format!("{}:{}", prefix, jti)
}

/// `SET <key> 1 NX EX <ttl>`: replies OK when newly set, Nil when the key exists.
fn record_command(key: &str, ttl_seconds: u64) -> redis::Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg("1").arg("NX").arg("EX").arg(ttl_seconds.max(1));
    cmd
}

#[async_trait]
impl ReplayStore for ValkeyReplayStore {
    async fn seen_and_record(&self, jti: &str) -> Result<bool, ReplayError> {
        let mut conn = self.manager.clone();
        let resp: Option<String> = record_command(&self.key(jti), self.ttl_seconds)
            .query_async(&mut conn)
            .await?;

        Ok(resp.is_none())
    }

    fn retention_seconds(&self) -> u64 {
        self.ttl_seconds.max(1)
    }
}
