use thiserror::Error;

pub type VksResult<T> = Result<T, VksError>;

#[derive(Debug, Error)]
pub enum VksError {
    #[error("invalid master secret: {0}")]
    InvalidSecret(String),

    #[error("registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// Deliberately carries no detail: a wrong key, a truncated file, and
    /// tampering must be indistinguishable to the caller.
    #[error("decryption failed")]
    DecryptionFailed,

    #[error("corrupted transfer {file}: recovered key {actual} does not match {expected}")]
    CorruptedTransfer {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("invalid capacity {0}: must be at least 1")]
    InvalidCapacity(u64),

    #[error("no registered validator keys found")]
    NoRegisteredKeys,

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
