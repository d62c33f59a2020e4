//! Configuration loader for the `roomalert-ingest` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
use std::{env, fmt, time::Duration};

use anyhow::{anyhow, bail, Result};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

const DEFAULT_DEVICE_PORT: u16 = 80;

/// One polled device, addressed by host and HTTP port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEndpoint {
    // ---
    pub host: String,
    pub port: u16,
}

impl DeviceEndpoint {
    /// Fully-qualified status document URL for this device.
    pub fn status_url(&self) -> String {
        format!("http://{}:{}/status.json", self.host, self.port)
    }
}

impl fmt::Display for DeviceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Devices to poll, one independent task each.
    pub endpoints: Vec<DeviceEndpoint>,

    /// Pause between the end of one poll cycle and the start of the next.
    pub poll_interval: Duration,

    /// Upper bound on a single device request.
    pub http_timeout: Duration,

    /// Port the query API listens on.
    pub listen_port: u16,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
/// - `DEVICE_ENDPOINTS` – comma-separated `host:port` list
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `POLL_INTERVAL_SECS` – pause between cycles (default: 5)
/// - `HTTP_TIMEOUT_SECS` – device request timeout (default: 10)
/// - `LISTEN_PORT` – API port (default: 5000)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let endpoints = parse_endpoints(&require_env!("DEVICE_ENDPOINTS"))?;
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let poll_interval_secs = parse_env_u32!("POLL_INTERVAL_SECS", 5);
    let http_timeout_secs = parse_env_u32!("HTTP_TIMEOUT_SECS", 10);
    let listen_port = parse_env_u32!("LISTEN_PORT", 5000);

    if poll_interval_secs == 0 {
        bail!("POLL_INTERVAL_SECS must be greater than zero");
    }
    if http_timeout_secs == 0 {
        bail!("HTTP_TIMEOUT_SECS must be greater than zero");
    }
    let listen_port =
        u16::try_from(listen_port).map_err(|_| anyhow!("Invalid LISTEN_PORT: {listen_port}"))?;

    Ok(Config {
        db_url,
        db_pool_max,
        endpoints,
        poll_interval: Duration::from_secs(poll_interval_secs.into()),
        http_timeout: Duration::from_secs(http_timeout_secs.into()),
        listen_port,
    })
}

/// Parse a `host:port,host:port` list. Blank entries are skipped and a
/// missing port falls back to 80.
pub fn parse_endpoints(raw: &str) -> Result<Vec<DeviceEndpoint>> {
    // ---
    let mut endpoints = Vec::new();

    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let endpoint = match entry.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|e| anyhow!("Invalid port in endpoint '{}': {}", entry, e))?;
                DeviceEndpoint {
                    host: host.to_string(),
                    port,
                }
            }
            None => DeviceEndpoint {
                host: entry.to_string(),
                port: DEFAULT_DEVICE_PORT,
            },
        };

        if endpoint.host.is_empty() {
            bail!("Endpoint '{}' has no host", entry);
        }
        endpoints.push(endpoint);
    }

    if endpoints.is_empty() {
        bail!("DEVICE_ENDPOINTS must list at least one host:port");
    }
    Ok(endpoints)
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        let endpoints: Vec<String> = self.endpoints.iter().map(|e| e.to_string()).collect();

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL       : {}", mask_db_url(&self.db_url));
        tracing::info!("  DB_POOL_MAX        : {}", self.db_pool_max);
        tracing::info!("  DEVICE_ENDPOINTS   : {}", endpoints.join(", "));
        tracing::info!("  POLL_INTERVAL_SECS : {}", self.poll_interval.as_secs());
        tracing::info!("  HTTP_TIMEOUT_SECS  : {}", self.http_timeout.as_secs());
        tracing::info!("  LISTEN_PORT        : {}", self.listen_port);
    }
}

/// Replace the password portion of a connection URL with `****`.
fn mask_db_url(db_url: &str) -> String {
    // ---
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            // `postgres://user@host` has its only colon in the scheme
            let scheme_colon = db_url[..colon_pos].ends_with("postgres")
                || db_url[..colon_pos].ends_with("postgresql");
            if !scheme_colon {
                return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
            }
        }
    }
    db_url.to_string()
}
