use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::circulation::CirculationPolicy;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub circulation: CirculationPolicy,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            circulation: load_policy()?,
        })
    }
}

fn load_policy() -> Result<CirculationPolicy, ConfigError> {
    let defaults = CirculationPolicy::default();
    let policy = CirculationPolicy {
        penalty_rate: numeric("APP_PENALTY_RATE", defaults.penalty_rate)?,
        max_active_loans: numeric("APP_MAX_ACTIVE_LOANS", defaults.max_active_loans)?,
        due_soon_days: numeric("APP_DUE_SOON_DAYS", defaults.due_soon_days)?,
        recent_return_days: numeric("APP_RECENT_RETURN_DAYS", defaults.recent_return_days)?,
        default_loan_days: numeric("APP_DEFAULT_LOAN_DAYS", defaults.default_loan_days)?,
        id_retry_attempts: numeric("APP_ID_RETRY_ATTEMPTS", defaults.id_retry_attempts)?,
    };

    if policy.max_active_loans == 0 {
        return Err(ConfigError::OutOfRange {
            key: "APP_MAX_ACTIVE_LOANS",
        });
    }
    for (key, days) in [
        ("APP_DUE_SOON_DAYS", policy.due_soon_days),
        ("APP_RECENT_RETURN_DAYS", policy.recent_return_days),
        ("APP_DEFAULT_LOAN_DAYS", policy.default_loan_days),
    ] {
        if !(0..=CirculationPolicy::MAX_WINDOW_DAYS).contains(&days) {
            return Err(ConfigError::OutOfRange { key });
        }
    }

    Ok(policy)
}

fn numeric<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        _ => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
    OutOfRange { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => write!(f, "{key} must be a valid number"),
            ConfigError::OutOfRange { key } => write!(f, "{key} is out of range"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::OutOfRange { .. } => None,
        }
    }
}
