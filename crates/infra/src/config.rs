//! Process configuration, read from environment variables.

use std::net::{AddrParseError, SocketAddr};

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_JWT_TTL_SECS: i64 = 3600;
pub const MIN_JWT_SECRET_LEN: usize = 32;

const DEV_JWT_SECRET: &str = "stockflow-insecure-development-secret-change-me";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is not valid: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("DATABASE_URL must be set (or STORE=memory for a throwaway in-memory store)")]
    MissingDatabaseUrl,

    #[error("JWT_SECRET must be at least 32 bytes")]
    WeakJwtSecret,
}

/// Which store backs the process.
#[derive(Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Durable store at the given connection URL.
    Postgres(String),
    /// Process-local; everything is lost on restart. Only on explicit request.
    Memory,
}

impl core::fmt::Debug for StoreBackend {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StoreBackend::Postgres(_) => f.write_str("Postgres(<redacted>)"),
            StoreBackend::Memory => f.write_str("Memory"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub store: StoreBackend,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_ttl: chrono::Duration,
    pub seed_demo_data: bool,
}

impl core::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("store", &self.store)
            .field("db_max_connections", &self.db_max_connections)
            .field("jwt_ttl", &self.jwt_ttl)
            .field("seed_demo_data", &self.seed_demo_data)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let bind_addr: SocketAddr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .map_err(|e: AddrParseError| ConfigError::Invalid {
                name: "BIND_ADDR",
                reason: e.to_string(),
            })?;

        let store = match get("STORE").map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            None | Some("postgres") => {
                StoreBackend::Postgres(get("DATABASE_URL").ok_or(ConfigError::MissingDatabaseUrl)?)
            }
            Some("memory") => {
                tracing::warn!("STORE=memory; data lives in this process only and is lost on restart");
                StoreBackend::Memory
            }
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "STORE",
                    reason: format!("expected 'postgres' or 'memory', got '{other}'"),
                });
            }
        };

        let db_max_connections = match get("DB_MAX_CONNECTIONS") {
            Some(raw) => parse_positive("DB_MAX_CONNECTIONS", &raw)?,
            None => DEFAULT_DB_MAX_CONNECTIONS,
        };

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) if secret.len() < MIN_JWT_SECRET_LEN => {
                return Err(ConfigError::WeakJwtSecret);
            }
            Some(secret) => secret,
            None => {
                tracing::warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
        };

        let jwt_ttl_secs = match get("JWT_TTL_SECS") {
            Some(raw) => parse_positive::<i64>("JWT_TTL_SECS", &raw)?,
            None => DEFAULT_JWT_TTL_SECS,
        };

        let seed_demo_data = match get("SEED_DEMO_DATA") {
            Some(raw) => parse_bool("SEED_DEMO_DATA", &raw)?,
            None => false,
        };

        Ok(Self {
            bind_addr,
            store,
            db_max_connections,
            jwt_secret,
            jwt_ttl: chrono::Duration::seconds(jwt_ttl_secs),
            seed_demo_data,
        })
    }
}

fn parse_positive<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let value: T = raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })?;
    if value <= T::default() {
        return Err(ConfigError::Invalid {
            name,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

fn parse_bool(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            name,
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}
