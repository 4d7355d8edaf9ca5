use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration (loaded from vks.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VksConfig {
    pub log: LogConfig,
    pub registry: RegistryConfig,
    pub store: StoreConfig,
    pub sync: SyncConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Beacon node REST endpoint used to check validator registration
    pub beacon_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Retry limit for failed registry queries
    pub max_retries: u32,
}

/// Where validator key records are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Local directory (shared volume)
    Fs,
    /// S3-compatible object store
    S3,
    /// In-process only; for dry runs and tests
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Root directory for the fs backend
    pub root: PathBuf,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// S3 bucket name
    pub bucket: String,
    /// Key prefix under which records are written
    pub prefix: String,
    /// Enforce HTTPS for S3 connections (warn/error on HTTP endpoints)
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Operator wallet address recorded with every key
    pub operator: Option<String>,
    /// Keys hosted per remote-signer instance
    pub validator_capacity: u64,
    /// Derivation scheme: "standard" or "legacy"
    pub scheme: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory receiving `<public_key>.enc` files
    pub output_dir: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            beacon_url: "http://localhost:5052".into(),
            timeout_secs: 10,
            max_retries: 3,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Fs,
            root: PathBuf::from("~/.local/share/vks/store"),
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "vks".into(),
            prefix: "vks".into(),
            enforce_tls: false,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            operator: None,
            validator_capacity: 100,
            scheme: "standard".into(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("exported_keys"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[log]
level = "debug"
format = "json"

[registry]
beacon_url = "https://beacon.example.com"
timeout_secs = 30
max_retries = 5

[store]
backend = "s3"
endpoint = "https://s3.example.com:8333"
bucket = "signers"
prefix = "mainnet"
enforce_tls = true

[sync]
operator = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
validator_capacity = 250
scheme = "legacy"

[export]
output_dir = "/tmp/out"
"#;
        let config: VksConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "json");
        assert_eq!(config.registry.beacon_url, "https://beacon.example.com");
        assert_eq!(config.registry.max_retries, 5);
        assert_eq!(config.store.backend, StoreBackend::S3);
        assert_eq!(config.store.bucket, "signers");
        assert!(config.store.enforce_tls);
        assert_eq!(config.sync.validator_capacity, 250);
        assert_eq!(config.sync.scheme, "legacy");
        assert_eq!(config.export.output_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_parse_defaults() {
        let config: VksConfig = toml::from_str("").unwrap();

        assert_eq!(config.log.level, "info");
        assert_eq!(config.registry.beacon_url, "http://localhost:5052");
        assert_eq!(config.store.backend, StoreBackend::Fs);
        assert_eq!(config.store.prefix, "vks");
        assert!(config.sync.operator.is_none());
        assert_eq!(config.sync.validator_capacity, 100);
        assert_eq!(config.sync.scheme, "standard");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[store]
backend = "memory"
"#;
        let config: VksConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.region, "us-east-1");
        assert_eq!(config.sync.validator_capacity, 100);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = VksConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: VksConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.store.root, parsed.store.root);
        assert_eq!(config.registry.beacon_url, parsed.registry.beacon_url);
        assert_eq!(config.sync.validator_capacity, parsed.sync.validator_capacity);
    }
}
