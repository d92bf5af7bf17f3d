//! Transfer record persistence
//!
//! The record store owns durability and idempotence for scanned transfers.
//! Callers hold `Arc<dyn RecordStore>` and never manage connections
//! directly; the SQLite implementation lives in [`sqlite`].

pub mod sqlite;

pub use sqlite::SqliteStore;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Which side of a transfer an address query matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressRole {
    /// Match the sending address.
    From,
    /// Match the receiving address.
    To,
}

impl FromStr for AddressRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "from" => Ok(AddressRole::From),
            "to" => Ok(AddressRole::To),
            other => Err(format!("invalid role '{other}': expected 'from' or 'to'")),
        }
    }
}

impl fmt::Display for AddressRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressRole::From => write!(f, "from"),
            AddressRole::To => write!(f, "to"),
        }
    }
}

/// A persisted transfer event.
///
/// Identity is the (transaction hash, log index) pair; the store never
/// holds two records with the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Transaction hash, 0x-prefixed lowercase hex.
    pub transaction_hash: String,
    /// Position of the log within its block.
    pub log_index: u64,
    /// Block the transfer occurred in.
    pub block_number: u64,
    /// Emitting token contract, 0x-prefixed lowercase hex.
    pub contract_address: String,
    /// Sending address, 0x-prefixed lowercase hex.
    pub from_addr: String,
    /// Receiving address, 0x-prefixed lowercase hex.
    pub to_addr: String,
    /// Transferred amount in the token's smallest unit, as a decimal string
    /// since it can exceed 64 bits.
    pub value: String,
    /// Unix timestamp the record was first persisted at.
    pub created_at: i64,
}

/// Address filter for transfer queries.
#[derive(Debug, Clone)]
pub struct TransferFilter {
    /// Address to match, 0x-prefixed hex; compared after lowercasing.
    pub address: String,
    /// Which side of the transfer to match.
    pub role: AddressRole,
}

/// Persistence operations for scanned transfers.
///
/// All methods are synchronous to avoid Send bound issues with the storage
/// layer.
pub trait RecordStore: Send + Sync {
    /// Create tables and indexes when absent.
    ///
    /// Idempotent; never touches existing rows.
    fn ensure_schema(&self) -> Result<()>;

    /// Insert a record unless its identity is already present.
    ///
    /// Returns whether a row was written. An identity collision leaves the
    /// existing row untouched and returns `false`.
    fn insert_if_absent(&self, record: &TransferRecord) -> Result<bool>;

    /// Records matching `filter`, newest block first, ties broken by log
    /// index descending.
    ///
    /// Skips `skip` rows and returns at most `limit`, along with the total
    /// match count before pagination.
    fn query(
        &self,
        filter: &TransferFilter,
        skip: u64,
        limit: u64,
    ) -> Result<(Vec<TransferRecord>, u64)>;
}
