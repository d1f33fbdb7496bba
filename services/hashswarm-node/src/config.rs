//! Node configuration loading.
//!
//! TOML is the sole config source; no environment variable overrides.
//! Default config path: `/etc/hashswarm/node.toml`.
//!
//! # Required fields
//! - `schema_version = 1`
//! - at least one entry in `content_servers`
//!
//! Everything else is defaulted, matching the forwarding machine's and blob
//! store's own built-in defaults (spec §4.1/§4.2).

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub schema_version: u32,
    pub content_servers: Vec<String>,
    pub store: StoreConfig,
    pub forwarding: ForwardingSettings,
    pub status_http: StatusHttpConfig,
    pub peer: PeerConfig,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub max_bytes: u64,
    pub sqlite_path: String,
}

#[derive(Debug, Clone)]
pub struct ForwardingSettings {
    pub max_forwards_per_peer_window: u32,
    pub forward_rate_limit_window: Duration,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StatusHttpConfig {
    pub bind: String,
}

#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub reassembly_window: Duration,
    pub default_htl_follows: u8,
    pub default_htl_other: u8,
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    schema_version: Option<u32>,
    content_servers: Option<Vec<String>>,
    store: Option<RawStoreConfig>,
    forwarding: Option<RawForwardingConfig>,
    status_http: Option<RawStatusHttpConfig>,
    peer: Option<RawPeerConfig>,
}

#[derive(Debug, Deserialize)]
struct RawStoreConfig {
    max_bytes: Option<u64>,
    sqlite_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawForwardingConfig {
    max_forwards_per_peer_window: Option<u32>,
    forward_rate_limit_window_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawStatusHttpConfig {
    bind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPeerConfig {
    reassembly_window_ms: Option<u64>,
    default_htl_follows: Option<u8>,
    default_htl_other: Option<u8>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn load_config_from_path(path: &Path) -> Result<NodeConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

/// Load node config from the default path `/etc/hashswarm/node.toml`.
pub fn load_config() -> Result<NodeConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/hashswarm/node.toml"))
}

pub fn load_config_from_str(toml_str: &str) -> Result<NodeConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let schema_version = raw
        .schema_version
        .ok_or_else(|| ConfigError::MissingField("schema_version".to_owned()))?;
    if schema_version != 1 {
        return Err(ConfigError::InvalidValue(format!(
            "schema_version must be 1, got {}",
            schema_version
        )));
    }

    let content_servers = raw
        .content_servers
        .ok_or_else(|| ConfigError::MissingField("content_servers".to_owned()))?;
    if content_servers.is_empty() {
        return Err(ConfigError::InvalidValue(
            "at least one content_servers entry is required".to_owned(),
        ));
    }

    let store = match raw.store {
        Some(s) => StoreConfig {
            max_bytes: s.max_bytes.unwrap_or(512 * 1024 * 1024),
            sqlite_path: s
                .sqlite_path
                .unwrap_or_else(|| "/var/lib/hashswarm/node.sqlite3".to_owned()),
        },
        None => StoreConfig {
            max_bytes: 512 * 1024 * 1024,
            sqlite_path: "/var/lib/hashswarm/node.sqlite3".to_owned(),
        },
    };

    let forwarding = match raw.forwarding {
        Some(f) => ForwardingSettings {
            max_forwards_per_peer_window: f.max_forwards_per_peer_window.unwrap_or(64),
            forward_rate_limit_window: Duration::from_millis(f.forward_rate_limit_window_ms.unwrap_or(1000)),
            request_timeout: Duration::from_millis(f.request_timeout_ms.unwrap_or(10_000)),
        },
        None => ForwardingSettings {
            max_forwards_per_peer_window: 64,
            forward_rate_limit_window: Duration::from_millis(1000),
            request_timeout: Duration::from_millis(10_000),
        },
    };

    let status_http = match raw.status_http {
        Some(s) => StatusHttpConfig {
            bind: s.bind.unwrap_or_else(|| "0.0.0.0:8787".to_owned()),
        },
        None => StatusHttpConfig {
            bind: "0.0.0.0:8787".to_owned(),
        },
    };

    let peer = match raw.peer {
        Some(p) => PeerConfig {
            reassembly_window: Duration::from_millis(p.reassembly_window_ms.unwrap_or(5_000)),
            default_htl_follows: p.default_htl_follows.unwrap_or(8),
            default_htl_other: p.default_htl_other.unwrap_or(3),
        },
        None => PeerConfig {
            reassembly_window: Duration::from_millis(5_000),
            default_htl_follows: 8,
            default_htl_other: 3,
        },
    };

    Ok(NodeConfig {
        schema_version,
        content_servers,
        store,
        forwarding,
        status_http,
        peer,
    })
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    MissingField(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {}", s),
            ConfigError::Parse(s) => write!(f, "Parse error: {}", s),
            ConfigError::MissingField(s) => write!(f, "Missing required field: {}", s),
            ConfigError::InvalidValue(s) => write!(f, "Invalid config value: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}
