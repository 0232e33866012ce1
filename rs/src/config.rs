/*
 * Responsibility
 * - Load settings from the environment (.env supported via dotenvy)
 * - Validate them up front (missing/invalid -> refuse to start)
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use dpop_bind::DpopPolicy;
use jsonwebtoken::Algorithm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        match std::env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayBackend {
    Memory,
    Valkey { url: String },
}

impl ReplayBackend {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Valkey { .. } => "valkey",
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    // Absolute origin clients address us by (e.g. https://api.example.com);
    // when unset, the expected htu comes from forwarded/Host headers.
    pub public_base_url: Option<String>,

    // Access tokens are verified against this key (issuer's signing key).
    pub access_jwt_public_key_pem: String,
    pub access_jwt_algorithm: Algorithm,
    pub auth_issuer: Option<String>,
    pub auth_audience: Option<String>,
    pub access_token_leeway_seconds: u64,

    pub dpop_policy: DpopPolicy,
    pub replay_backend: ReplayBackend,
    pub replay_sweep_interval_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8000);

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::from_env();

        let public_base_url = optional("PUBLIC_BASE_URL");
        if let Some(base) = public_base_url.as_deref() {
            url::Url::parse(base).map_err(|_| ConfigError::Invalid("PUBLIC_BASE_URL"))?;
        }

        let access_jwt_public_key_pem = std::env::var("ACCESS_JWT_PUBLIC_KEY_PEM")
            .map_err(|_| ConfigError::Missing("ACCESS_JWT_PUBLIC_KEY_PEM"))?
            .replace("\\n", "\n");

        let access_jwt_algorithm = match optional("ACCESS_JWT_ALG").as_deref() {
            None | Some("RS256") => Algorithm::RS256,
            Some("ES256") => Algorithm::ES256,
            Some("EdDSA") => Algorithm::EdDSA,
            Some(_) => return Err(ConfigError::Invalid("ACCESS_JWT_ALG")),
        };

        let auth_issuer = optional("AUTH_ISSUER");
        let auth_audience = optional("AUTH_AUDIENCE");

        let access_token_leeway_seconds = std::env::var("ACCESS_TOKEN_LEEWAY_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(60);

        let iat_window = parse_or("DPOP_IAT_WINDOW_SECONDS", 60i64)?;
        let replay_ttl = parse_or("DPOP_REPLAY_TTL_SECONDS", 300u64)?;
        // Window and retention are validated together.
        let dpop_policy = DpopPolicy::new(iat_window, replay_ttl)
            .map_err(|_| ConfigError::Invalid("DPOP_REPLAY_TTL_SECONDS"))?;

        let replay_backend = match optional("REPLAY_BACKEND").as_deref() {
            None | Some("memory") => ReplayBackend::Memory,
            Some("valkey") => ReplayBackend::Valkey {
                url: std::env::var("VALKEY_URL").map_err(|_| ConfigError::Missing("VALKEY_URL"))?,
            },
            Some(_) => return Err(ConfigError::Invalid("REPLAY_BACKEND")),
        };

        let replay_sweep_interval_seconds = parse_or("REPLAY_SWEEP_INTERVAL_SECONDS", 60u64)?;

        Ok(Self {
            addr,
            app_env,
            public_base_url,
            access_jwt_public_key_pem,
            access_jwt_algorithm,
            auth_issuer,
            auth_audience,
            access_token_leeway_seconds,
            dpop_policy,
            replay_backend,
            replay_sweep_interval_seconds,
        })
    }
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid(key)),
    }
}
