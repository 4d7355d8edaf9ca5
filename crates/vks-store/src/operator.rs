//! OpenDAL Operator factory for the key store backends

use opendal::layers::{LoggingLayer, RetryLayer};
use opendal::{Builder, Operator};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};

use vks_core::config::{StoreBackend, StoreConfig};
use vks_core::{VksError, VksResult};

/// S3 credentials, read from the environment rather than vks.toml.
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
}

impl S3Credentials {
    /// Reads AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY, falling back to the
    /// VKS_-prefixed names.
    pub fn from_env() -> VksResult<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .or_else(|_| std::env::var("VKS_ACCESS_KEY_ID"))
            .map_err(|_| {
                VksError::Config(
                    "S3 credentials not found. Set AWS_ACCESS_KEY_ID and \
                     AWS_SECRET_ACCESS_KEY environment variables."
                        .into(),
                )
            })?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .or_else(|_| std::env::var("VKS_SECRET_ACCESS_KEY"))
            .map_err(|_| {
                VksError::Config("AWS_SECRET_ACCESS_KEY environment variable not set".into())
            })?;

        Ok(Self {
            access_key_id,
            secret_access_key: SecretString::from(secret_access_key),
        })
    }
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

/// Build the operator for the configured backend.
///
/// For S3, `enforce_tls` turns a plaintext HTTP endpoint into an error;
/// otherwise it is logged as a warning. Credentials are only needed for S3.
pub fn build_operator(
    config: &StoreConfig,
    credentials: Option<&S3Credentials>,
) -> VksResult<Operator> {
    match config.backend {
        StoreBackend::Memory => finish(opendal::services::Memory::default()),
        StoreBackend::Fs => {
            let root = expand_tilde(&config.root);
            let root = root.to_str().ok_or_else(|| {
                VksError::Config(format!("store root is not UTF-8: {}", root.display()))
            })?;
            finish(opendal::services::Fs::default().root(root))
        }
        StoreBackend::S3 => {
            if config.endpoint.starts_with("http://") {
                if config.enforce_tls {
                    return Err(VksError::Config(format!(
                        "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                         Use an HTTPS endpoint or set store.enforce_tls = false for local development.",
                        config.endpoint
                    )));
                }
                tracing::warn!(
                    endpoint = %config.endpoint,
                    "S3 endpoint uses plaintext HTTP; set store.enforce_tls = true and use HTTPS in production"
                );
            }
            let credentials = credentials.ok_or_else(|| {
                VksError::Config("S3 backend selected but no credentials supplied".into())
            })?;

            // Path-style addressing is the opendal default, which SeaweedFS
            // and MinIO require.
            let builder = opendal::services::S3::default()
                .endpoint(&config.endpoint)
                .region(&config.region)
                .bucket(&config.bucket)
                .access_key_id(&credentials.access_key_id)
                .secret_access_key(credentials.secret_access_key.expose_secret());
            finish(builder)
        }
    }
}

fn finish<B: Builder>(builder: B) -> VksResult<Operator> {
    let op = Operator::new(builder)
        .map_err(|e| VksError::Storage(format!("creating OpenDAL operator: {e}")))?
        .layer(LoggingLayer::default())
        .layer(RetryLayer::new().with_max_times(5).with_jitter())
        .finish();
    Ok(op)
}

/// Expand a leading `~/` to $HOME
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> S3Credentials {
        S3Credentials {
            access_key_id: "test-key".into(),
            secret_access_key: SecretString::from("test-secret"),
        }
    }

    fn s3_config(endpoint: &str, enforce_tls: bool) -> StoreConfig {
        StoreConfig {
            backend: StoreBackend::S3,
            endpoint: endpoint.into(),
            enforce_tls,
            ..Default::default()
        }
    }

    #[test]
    fn test_build_s3_http_warning() {
        let result = build_operator(&s3_config("http://localhost:8333", false), Some(&credentials()));
        assert!(result.is_ok());
    }

    #[test]
    fn test_build_s3_http_enforce_tls() {
        let result = build_operator(&s3_config("http://insecure:8333", true), Some(&credentials()));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("enforce_tls"), "error should mention enforce_tls");
    }

    #[test]
    fn test_build_s3_https() {
        let result = build_operator(&s3_config("https://s3.example.com", true), Some(&credentials()));
        assert!(result.is_ok());
    }

    #[test]
    fn test_build_s3_requires_credentials() {
        let result = build_operator(&s3_config("https://s3.example.com", true), None);
        assert!(matches!(result, Err(VksError::Config(_))));
    }

    #[test]
    fn test_build_fs_and_memory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let fs = StoreConfig {
            backend: StoreBackend::Fs,
            root: tmp.path().to_path_buf(),
            ..Default::default()
        };
        assert!(build_operator(&fs, None).is_ok());

        let memory = StoreConfig {
            backend: StoreBackend::Memory,
            ..Default::default()
        };
        assert!(build_operator(&memory, None).is_ok());
    }

    #[test]
    fn test_expand_tilde() {
        let home = std::env::var("HOME").unwrap_or_default();
        assert_eq!(
            expand_tilde(Path::new("~/.local/share/vks")),
            PathBuf::from(home).join(".local/share/vks")
        );
        assert_eq!(expand_tilde(Path::new("/abs/path")), PathBuf::from("/abs/path"));
    }

    #[test]
    fn test_credentials_debug_redacted() {
        let debug = format!("{:?}", credentials());
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("test-secret"));
    }
}
