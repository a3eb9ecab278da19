/// Configuration management for the areaflow engine
///
/// Handles server configuration, database location, polling cadences, and
/// per-provider OAuth client credentials.

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Polling loop configuration
    pub polling: PollingConfig,
    /// OAuth client credentials per provider
    pub oauth: OAuthClientConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection URL (default: "sqlite:areaflow.db?mode=rwc")
    pub url: String,
}

/// Cadence and resource limits for the two polling loops
///
/// Timer triggers are self-contained and cheap, so they run on a short
/// interval. Service-backed triggers make outbound calls and run on a
/// longer interval to respect third-party rate limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Timer loop cadence in seconds (default: 30)
    pub timer_interval_secs: u64,
    /// Service loop cadence in seconds (default: 120)
    pub service_interval_secs: u64,
    /// Maximum Areas evaluated in parallel per service tick (default: 5)
    pub max_concurrency: usize,
    /// Timeout for each outbound call in seconds (default: 15)
    pub call_timeout_secs: u64,
    /// Soft deadline for a whole tick in seconds (default: 120)
    pub tick_deadline_secs: u64,
    /// Token refresh skew in seconds: refresh when expiry is closer
    /// than this (default: 60)
    pub refresh_skew_secs: u64,
    /// Consecutive failures before an Area is skipped (default: 5)
    pub max_consecutive_failures: i64,
}

/// OAuth client credentials, one set per provider
///
/// Only the client id/secret and endpoints live here; the
/// authorization-code exchange flow is handled outside this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClientConfig {
    pub github: ProviderCredentials,
    pub google: ProviderCredentials,
}

/// Client credentials for a single OAuth provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: env_or("AREAFLOW_HOST", "0.0.0.0"),
                port: env_parse("AREAFLOW_PORT", 3005),
            },
            database: DatabaseConfig {
                url: env_or("AREAFLOW_DATABASE_URL", "sqlite:areaflow.db?mode=rwc"),
            },
            polling: PollingConfig {
                timer_interval_secs: env_parse("AREAFLOW_TIMER_INTERVAL_SECS", 30),
                service_interval_secs: env_parse("AREAFLOW_SERVICE_INTERVAL_SECS", 120),
                max_concurrency: env_parse("AREAFLOW_MAX_CONCURRENCY", 5),
                call_timeout_secs: env_parse("AREAFLOW_CALL_TIMEOUT_SECS", 15),
                tick_deadline_secs: env_parse("AREAFLOW_TICK_DEADLINE_SECS", 120),
                refresh_skew_secs: env_parse("AREAFLOW_REFRESH_SKEW_SECS", 60),
                max_consecutive_failures: env_parse("AREAFLOW_MAX_FAILURES", 5),
            },
            oauth: OAuthClientConfig {
                github: ProviderCredentials {
                    client_id: env_or("AREAFLOW_GITHUB_CLIENT_ID", ""),
                    client_secret: env_or("AREAFLOW_GITHUB_CLIENT_SECRET", ""),
                    redirect_uri: env_or("AREAFLOW_GITHUB_REDIRECT_URI", ""),
                },
                google: ProviderCredentials {
                    client_id: env_or("AREAFLOW_GOOGLE_CLIENT_ID", ""),
                    client_secret: env_or("AREAFLOW_GOOGLE_CLIENT_SECRET", ""),
                    redirect_uri: env_or("AREAFLOW_GOOGLE_REDIRECT_URI", ""),
                },
            },
        }
    }
}
