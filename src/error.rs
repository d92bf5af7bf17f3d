//! Error types for tokenscan

use alloy::primitives::U256;
use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Chain-read errors
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// Storage-slot decoding errors
    #[error("slot error: {0}")]
    Slot(#[from] SlotError),

    /// Record-store errors
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Scan and query input errors
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),

    /// Configuration errors
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Errors talking to the chain-read capability.
///
/// These are transient from the component's point of view: the caller owns
/// the retry policy, nothing in this crate retries automatically.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("invalid RPC endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response from endpoint: {0}")]
    InvalidResponse(String),
}

/// Storage-slot decoding errors
#[derive(Error, Debug)]
pub enum SlotError {
    #[error("slot arithmetic overflow for element index {index}")]
    InvalidIndex { index: u64 },

    #[error("malformed slot data: expected {expected} bytes, found {found}")]
    MalformedSlotData { expected: usize, found: usize },

    #[error("storage slot {slot:#x} has no value")]
    AbsentSlot { slot: U256 },

    #[error("array length does not fit in 64 bits")]
    LengthOverflow,
}

/// Record-store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

/// Structural scan and query input errors.
///
/// These indicate a caller mistake, not a transient condition, and fail the
/// whole call before any work is attempted.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("invalid block range: from block {from} is past to block {to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("invalid pagination: page {page}, page size {page_size}")]
    InvalidPagination { page: u64, page_size: u64 },

    #[error("invalid event signature: {0}")]
    InvalidEventSignature(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid config file: {0}")]
    InvalidFile(String),

    #[error("config file parse error: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}
