use async_trait::async_trait;

/// Anti-replay store for proof `jti` values.
#[async_trait]
pub trait ReplayStore: Send + Sync {
    // Atomically check whether `jti` was already seen and record it if not.
    //
    // Returns:
    // - Ok(true)  => already present (replay)
    // - Ok(false) => newly recorded
    // - Err(_)    => backend failure (caller must fail closed)
    async fn seen_and_record(&self, jti: &str) -> Result<bool, ReplayError>;

    /// How long a recorded `jti` keeps counting as seen, seconds.
    fn retention_seconds(&self) -> u64;
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("valkey error: {0}")]
    Valkey(#[from] redis::RedisError),

    #[error("replay backend error: {0}")]
    Backend(String),
}
