use thiserror::Error;

pub const DEFAULT_IAT_WINDOW_SECONDS: i64 = 60;
pub const DEFAULT_REPLAY_TTL_SECONDS: u64 = 300;

/// Time policy shared by the verifier and its replay store.
///
/// The freshness window and the replay retention are one setting: a proof
/// dated `now + window` stays fresh until `now + 2 * window`, so the store must
/// remember its `jti` at least that long. [`DpopPolicy::new`] enforces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DpopPolicy {
    // Accepted |now - iat|, seconds.
    iat_window_seconds: i64,
    // How long a consumed jti is remembered, seconds.
    replay_ttl_seconds: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("iat window must be positive (got {0})")]
    NonPositiveWindow(i64),
    #[error("replay ttl {ttl}s must be at least twice the iat window {window}s")]
    TtlTooShort { ttl: u64, window: i64 },
    #[error("replay store keeps entries {retention}s, needs at least {required}s")]
    StoreRetentionTooShort { retention: u64, required: u64 },
}

impl DpopPolicy {
    pub fn new(iat_window_seconds: i64, replay_ttl_seconds: u64) -> Result<Self, PolicyError> {
        if iat_window_seconds <= 0 {
            return Err(PolicyError::NonPositiveWindow(iat_window_seconds));
        }
        if replay_ttl_seconds < (iat_window_seconds as u64).saturating_mul(2) {
            return Err(PolicyError::TtlTooShort {
                ttl: replay_ttl_seconds,
                window: iat_window_seconds,
            });
        }
        Ok(Self {
            iat_window_seconds,
            replay_ttl_seconds,
        })
    }

    pub fn iat_window_seconds(&self) -> i64 {
        self.iat_window_seconds
    }

    pub fn replay_ttl_seconds(&self) -> u64 {
        self.replay_ttl_seconds
    }

    /// Shortest retention a replay store may have under this policy.
    pub fn min_replay_retention_seconds(&self) -> u64 {
        (self.iat_window_seconds as u64).saturating_mul(2)
    }

    /// A store forgetting a `jti` while its proof is still fresh would let
    /// the proof through twice.
    pub fn check_store_retention(&self, retention_seconds: u64) -> Result<(), PolicyError> {
        let required = self.min_replay_retention_seconds();
        if retention_seconds < required {
            return Err(PolicyError::StoreRetentionTooShort {
                retention: retention_seconds,
                required,
            });
        }
        Ok(())
    }

    /// `|now - iat| <= window`
    pub fn is_fresh(&self, iat: i64, now: i64) -> bool {
        now.abs_diff(iat) <= self.iat_window_seconds as u64
    }
}

impl Default for DpopPolicy {
    fn default() -> Self {
        Self {
            iat_window_seconds: DEFAULT_IAT_WINDOW_SECONDS,
            replay_ttl_seconds: DEFAULT_REPLAY_TTL_SECONDS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_ttl_shorter_than_twice_the_window() {
        assert_eq!(
            DpopPolicy::new(60, 119),
            Err(PolicyError::TtlTooShort {
                ttl: 119,
                window: 60
            })
        );
        assert!(DpopPolicy::new(60, 120).is_ok());
        assert!(DpopPolicy::new(0, 300).is_err());
    }

    #[test]
    fn freshness_is_symmetric_and_inclusive() {
        let policy = DpopPolicy::default();
        let now = 1_700_000_000;
        assert!(policy.is_fresh(now - 60, now));
        assert!(policy.is_fresh(now + 60, now));
        assert!(!policy.is_fresh(now - 61, now));
        assert!(!policy.is_fresh(now + 61, now));
    }

    #[test]
    fn store_retention_must_cover_twice_the_window() {
        let policy = DpopPolicy::default();
        assert_eq!(policy.min_replay_retention_seconds(), 120);
        assert_eq!(
            policy.check_store_retention(30),
            Err(PolicyError::StoreRetentionTooShort {
                retention: 30,
                required: 120
            })
        );
        assert_eq!(policy.check_store_retention(120), Ok(()));
    }
}
