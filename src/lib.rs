//! tokenscan - ERC-20 transfer scanner and lock inspector
//!
//! A Rust library and CLI for scanning EVM token transfer events into a
//! local SQLite store, decoding lock arrays straight from contract storage
//! slots, and serving the persisted records over HTTP.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokenscan::{erc20_signatures, EventIndexer, RecordStore, RpcChainReader, SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let reader = Arc::new(RpcChainReader::new("http://localhost:8545")?);
//!     let store = Arc::new(SqliteStore::open("transfers.db")?);
//!     store.ensure_schema()?;
//!
//!     let indexer = EventIndexer::new(reader, store).with_chunk_size(5_000);
//!     let contract = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".parse()?;
//!     let report = indexer
//!         .scan_range(contract, 18_000_000, 18_001_000, &erc20_signatures())
//!         .await?;
//!
//!     println!("Inserted {} transfers", report.inserted);
//!     Ok(())
//! }
//! ```

pub mod chain;
pub mod config;
pub mod error;
pub mod event;
pub mod indexer;
pub mod server;
pub mod storage;
pub mod store;

// Re-exports for convenience
pub use chain::{ChainReader, RawLog, RpcChainReader};
pub use config::{ConfigFile, ScanSettings, ServerSettings};
pub use error::{ChainError, ConfigError, Error, Result, ScanError, SlotError, StoreError};
pub use event::{
    decode_event, erc20_signatures, EventKind, EventSignature, MappingError, TokenEvent,
};
pub use indexer::{
    EventIndexer, MappingFailure, ScanProgress, ScanReport, DEFAULT_CHUNK_SIZE,
    DEFAULT_CONCURRENCY, MAX_PAGE_SIZE,
};
pub use server::{build_router, serve, AppState, TransfersQuery, TransfersResponse};
pub use storage::{
    array_base_slot, decode_array, decode_lock_entry, element_slots, read_lock_array, LockEntry,
    LOCK_SLOT_STRIDE,
};
pub use store::{AddressRole, RecordStore, SqliteStore, TransferFilter, TransferRecord};
