//! Environment-based configuration
//!
//! The cluster description is read once at startup and is immutable
//! afterwards. Orchestrators receive it explicitly as `Arc<Cluster>`.
//!
//! # Environment Variables
//!
//! ## Cluster
//! - `CLUSTER_NAME` - Name of the vertex cluster (required)
//! - `VERTEX_COUNT` - Number of vertex nodes (default: 3)
//! - `VERTEX_{i}_URL` / `VERTEX_{i}_API_KEY` - Endpoint and credential of node `i`
//! - `VERTEX_THRESHOLD` - Threshold T of the underlying scheme (default: 2)
//! - `VERTEX_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `VERTEX_VERIFY_PUBKEY` - "1" to cross-check derived public keys on all nodes
//!
//! ## Venue
//! - `VENUE_WS_URL`, `VENUE_REST_URL` - Exchange endpoints (default: testnet)
//! - `VENUE_API_KEY`, `VENUE_API_SECRET` - Exchange credentials (optional)
//! - `VENUE_LOGON_TIMEOUT_SECS` - Wait for correlated stream responses (default: 10)
//!
//! ## Logging
//! - `LOG_LEVEL` - trace, debug, info, warn, error (default: info)
//! - `LOG_FORMAT` - "json" or "pretty" (default: pretty)

use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_VERTEX_COUNT: usize = 3;
pub const DEFAULT_THRESHOLD: u16 = 2;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_WS_URL: &str = "wss://ws-api.testnet.binance.vision/ws-api/v3";
pub const DEFAULT_REST_URL: &str = "https://testnet.binance.vision/api/v3";
pub const DEFAULT_LOGON_TIMEOUT_SECS: u64 = 10;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// One vertex node: endpoint plus authorization credential
#[derive(Clone, PartialEq, Eq)]
pub struct Vertex {
    pub url: String,
    pub api_key: String,
}

impl Vertex {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let url: String = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Full URL for an endpoint path on this node
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }
}

impl fmt::Debug for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vertex")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Ordered, fixed-size set of vertex nodes. Node 0 is the leader.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub threshold: u16,
    pub request_timeout: Duration,
    /// Cross-check the derived public key on every node after keygen
    pub verify_public_key: bool,
}

impl Cluster {
    /// Build a cluster, validating `1 <= threshold <= vertices.len()`
    pub fn new(
        name: impl Into<String>,
        vertices: Vec<Vertex>,
        threshold: u16,
    ) -> Result<Self, ConfigError> {
        if vertices.is_empty() {
            return Err(ConfigError::InvalidValue(
                "VERTEX_COUNT".to_string(),
                "cluster needs at least one vertex".to_string(),
            ));
        }
        if threshold == 0 || usize::from(threshold) > vertices.len() {
            return Err(ConfigError::InvalidValue(
                "VERTEX_THRESHOLD".to_string(),
                format!(
                    "threshold {} must be between 1 and {}",
                    threshold,
                    vertices.len()
                ),
            ));
        }

        Ok(Self {
            name: name.into(),
            vertices,
            threshold,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            verify_public_key: false,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_public_key_verification(mut self, enabled: bool) -> Self {
        self.verify_public_key = enabled;
        self
    }

    /// Number of parties N
    pub fn size(&self) -> usize {
        self.vertices.len()
    }

    /// The designated leader used for room creation and key derivation
    pub fn leader(&self) -> &Vertex {
        &self.vertices[0]
    }
}

/// Downstream trading venue settings
#[derive(Clone)]
pub struct VenueConfig {
    pub ws_url: String,
    pub rest_url: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub response_timeout: Duration,
}

impl fmt::Debug for VenueConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VenueConfig")
            .field("ws_url", &self.ws_url)
            .field("rest_url", &self.rest_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "<redacted>"))
            .field("response_timeout", &self.response_timeout)
            .finish()
    }
}

/// Everything the binary needs, loaded once
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub cluster: Cluster,
    pub venue: VenueConfig,
    pub log_level: String,
    pub log_json: bool,
}

impl AppConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
        };

        let cluster_name = required("CLUSTER_NAME")?;
        let count: usize = parse_or("VERTEX_COUNT", &lookup, DEFAULT_VERTEX_COUNT)?;

        let mut vertices = Vec::with_capacity(count);
        for i in 0..count {
            let url = required(&format!("VERTEX_{}_URL", i))?;
            let api_key = required(&format!("VERTEX_{}_API_KEY", i))?;
            vertices.push(Vertex::new(url, api_key));
        }

        let threshold: u16 = parse_or("VERTEX_THRESHOLD", &lookup, DEFAULT_THRESHOLD)?;
        let timeout_secs: u64 = parse_or("VERTEX_TIMEOUT_SECS", &lookup, DEFAULT_TIMEOUT_SECS)?;
        let verify = lookup("VERTEX_VERIFY_PUBKEY")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let cluster = Cluster::new(cluster_name, vertices, threshold)?
            .with_timeout(Duration::from_secs(timeout_secs))
            .with_public_key_verification(verify);

        let logon_secs: u64 = parse_or(
            "VENUE_LOGON_TIMEOUT_SECS",
            &lookup,
            DEFAULT_LOGON_TIMEOUT_SECS,
        )?;
        let venue = VenueConfig {
            ws_url: lookup("VENUE_WS_URL").unwrap_or_else(|| DEFAULT_WS_URL.to_string()),
            rest_url: lookup("VENUE_REST_URL").unwrap_or_else(|| DEFAULT_REST_URL.to_string()),
            api_key: lookup("VENUE_API_KEY").filter(|v| !v.is_empty()),
            api_secret: lookup("VENUE_API_SECRET").filter(|v| !v.is_empty()),
            response_timeout: Duration::from_secs(logon_secs),
        };

        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let log_json = lookup("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(Self {
            cluster,
            venue,
            log_level,
            log_json,
        })
    }

    /// Print configuration summary (hiding credentials)
    pub fn print_summary(&self) {
        println!("=== Vertex Cluster ===");
        println!("Cluster: {}", self.cluster.name);
        println!(
            "Threshold: {}-of-{}",
            self.cluster.threshold,
            self.cluster.size()
        );
        for (i, vertex) in self.cluster.vertices.iter().enumerate() {
            println!("Vertex {}: {}", i, vertex.url);
        }
        println!("Request timeout: {:?}", self.cluster.request_timeout);
        println!("Venue WS: {}", self.venue.ws_url);
        println!("Venue REST: {}", self.venue.rest_url);
        println!("======================");
    }
}

fn parse_or<T, F>(name: &str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}
