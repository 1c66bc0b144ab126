use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrefsError {
    #[error("storage not initialized; call begin() first")]
    NotInitialized,

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("value too large: {len} bytes (maximum {max})")]
    ValueTooLarge { len: usize, max: u16 },

    #[error("key not found")]
    NotFound,

    #[error("invalid magic number in global header")]
    InvalidMagic,

    #[error("unsupported layout version: {0}")]
    UnsupportedVersion(u8),

    #[error("header checksum verification failed")]
    ChecksumMismatch,

    #[error("device fault: {0}")]
    DeviceFault(String),

    #[error("store full: no space for entry")]
    StoreFull,

    #[error("storage corrupt: {0}")]
    Corrupt(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, PrefsError>;
