//! JSON-RPC chain reader

use alloy::network::Ethereum;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use async_trait::async_trait;

use crate::chain::{ChainReader, RawLog};
use crate::error::{ChainError, Result};

/// [`ChainReader`] backed by an HTTP JSON-RPC provider.
pub struct RpcChainReader {
    provider: DynProvider<Ethereum>,
    rpc_url: String,
}

impl std::fmt::Debug for RpcChainReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChainReader")
            .field("rpc_url", &self.rpc_url)
            .finish()
    }
}

impl RpcChainReader {
    /// Create a reader for the given RPC URL. Does not dial the endpoint;
    /// the first request does.
    pub fn new(rpc_url: &str) -> Result<Self> {
        let url: alloy::transports::http::reqwest::Url = rpc_url
            .parse()
            .map_err(|e| ChainError::InvalidEndpoint(format!("{rpc_url}: {e}")))?;

        let provider = ProviderBuilder::new().connect_http(url).erased();

        Ok(Self {
            provider,
            rpc_url: rpc_url.to_string(),
        })
    }

    /// The endpoint URL this reader talks to.
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }
}

/// Reduce an RPC log to a [`RawLog`], rejecting logs from pending blocks.
fn raw_from_rpc(log: Log) -> Result<RawLog> {
    let block_number = log
        .block_number
        .ok_or_else(|| ChainError::InvalidResponse("log missing block number".to_string()))?;
    let transaction_hash = log
        .transaction_hash
        .ok_or_else(|| ChainError::InvalidResponse("log missing transaction hash".to_string()))?;
    let log_index = log
        .log_index
        .ok_or_else(|| ChainError::InvalidResponse("log missing log index".to_string()))?;

    Ok(RawLog {
        transaction_hash,
        log_index,
        block_number,
        address: log.address(),
        topics: log.topics().to_vec(),
        data: log.data().data.clone(),
    })
}

#[async_trait]
impl ChainReader for RpcChainReader {
    async fn current_height(&self) -> Result<u64> {
        let height = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        Ok(height)
    }

    async fn get_logs(
        &self,
        from_block: u64,
        to_block: u64,
        contract: Address,
        topics: &[B256],
    ) -> Result<Vec<RawLog>> {
        let filter = Filter::new()
            .address(contract)
            .event_signature(topics.to_vec())
            .from_block(from_block)
            .to_block(to_block);

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        logs.into_iter().map(raw_from_rpc).collect()
    }

    async fn storage_at(&self, contract: Address, slot: U256) -> Result<Option<B256>> {
        // eth_getStorageAt never distinguishes "absent" from zero; nodes
        // return a zero word for unset slots, so this impl always reads Some.
        let value = self
            .provider
            .get_storage_at(contract, slot)
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        Ok(Some(B256::from(value)))
    }
}
