use std::path::PathBuf;
use thiserror::Error;

/// The full error taxonomy surfaced by this crate.
///
/// No variant here is retried internally; every failure is handed back to the
/// caller as-is. Every fallible path that has allocated key material is
/// responsible for zeroizing it before returning one of these, success or not.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault directory not found: {0}")]
    NotFound(PathBuf),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("uid is not valid hex / not 16 bytes: {0}")]
    BadUid(String),

    #[error("unsupported cipher id {0}")]
    UnsupportedCipher(u8),

    #[error("a server url is required unless the NOAUTH flag is set")]
    MissingServer,

    #[error("malformed recovery bundle: {0}")]
    BadRecovery(String),

    #[error("recovery key length {actual} does not match cipher key length {expected}")]
    BadKey { expected: usize, actual: usize },

    #[error("bad length for {what}: expected {expected}, got {actual}")]
    BadLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("vault metadata is corrupt: {0}")]
    CorruptMetadata(&'static str),

    #[error("metadata version {found} is incompatible (expected {expected})")]
    IncompatibleVersion { found: u8, expected: u8 },

    #[error("verification failed: invalid passphrase?")]
    AuthenticationFailed,

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("server rejected authentication")]
    AuthFailed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("out of memory")]
    OutOfMemory,

    #[error("random number generation failed")]
    RngFailure,

    #[error("key derivation failed: {0}")]
    KdfFailure(String),

    #[error("vault already exists at {0}")]
    AlreadyExists(PathBuf),
}

pub type Result<T> = std::result::Result<T, VaultError>;
