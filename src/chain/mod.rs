//! Chain-read capability
//!
//! The indexer and the storage decoder never talk to a node directly; they
//! consume the [`ChainReader`] trait. [`RpcChainReader`] is the JSON-RPC
//! implementation, tests substitute in-memory fakes.

pub mod rpc;

pub use rpc::RpcChainReader;

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;

use crate::error::Result;

/// A single emitted log, reduced to the fields the indexer needs.
///
/// Unlike the RPC wire type, every field is mandatory: logs from pending
/// blocks are rejected at the reader boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    /// Hash of the transaction that emitted the log. Not unique alone.
    pub transaction_hash: B256,
    /// Position of the log within its block; unique per transaction hash.
    pub log_index: u64,
    /// Block the log was emitted in.
    pub block_number: u64,
    /// Emitting contract.
    pub address: Address,
    /// Event topics, `topics[0]` being the signature hash.
    pub topics: Vec<B256>,
    /// Non-indexed event data.
    pub data: Bytes,
}

/// Read-only access to chain state.
///
/// Implementations must not retry failed requests; retry policy belongs to
/// the caller.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Current chain height (latest block number).
    async fn current_height(&self) -> Result<u64>;

    /// All logs emitted by `contract` in `[from_block, to_block]` inclusive
    /// whose first topic is in `topics`, ascending by block number and log
    /// index.
    async fn get_logs(
        &self,
        from_block: u64,
        to_block: u64,
        contract: Address,
        topics: &[B256],
    ) -> Result<Vec<RawLog>>;

    /// Raw 32-byte value of a storage slot, or `None` when the source has no
    /// value for it.
    async fn storage_at(&self, contract: Address, slot: U256) -> Result<Option<B256>>;
}
