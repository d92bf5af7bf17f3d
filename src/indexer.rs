//! Scan coordinator for token transfer events

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy::primitives::{Address, B256};
use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::chain::{ChainReader, RawLog};
use crate::error::{Result, ScanError};
use crate::event::{decode_event, EventSignature, TokenEvent};
use crate::store::{AddressRole, RecordStore, TransferFilter, TransferRecord};

/// Default number of blocks per log request.
pub const DEFAULT_CHUNK_SIZE: u64 = 10_000;

/// Default number of in-flight log requests.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Largest page size a query accepts.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Progress callback type
pub type ProgressCallback = Box<dyn Fn(ScanProgress) + Send + Sync>;

/// Scan progress information
#[derive(Debug, Clone)]
pub struct ScanProgress {
    /// Highest block of the chunk that just finished
    pub current_block: u64,
    /// Total blocks in the scan range
    pub total_blocks: u64,
    /// Logs fetched so far
    pub logs_fetched: u64,
    /// Percentage complete
    pub percent: f64,
    /// Blocks per second
    pub blocks_per_second: f64,
}

/// A log that matched a recognized topic but violated its shape.
#[derive(Debug, Clone)]
pub struct MappingFailure {
    /// Transaction the log came from.
    pub transaction_hash: B256,
    /// Position of the log within its block.
    pub log_index: u64,
    /// What was wrong with the log.
    pub reason: String,
}

/// Outcome of a completed scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Logs returned by the chain for the range.
    pub events_seen: u64,
    /// Transfer records newly written.
    pub inserted: u64,
    /// Transfers whose identity was already persisted.
    pub duplicates: u64,
    /// Approval events decoded and reported, never persisted.
    pub observed: u64,
    /// Logs whose first topic matched no recognized signature.
    pub unrecognized: u64,
    /// Shape violations, one entry per offending log.
    pub mapping_errors: Vec<MappingFailure>,
}

/// Coordinates chunked log fetching, decoding, and persistence.
///
/// Holds no scan state of its own: every call carries its full block range,
/// so the same indexer can serve scans and queries interleaved.
pub struct EventIndexer {
    /// Chain-read capability
    reader: Arc<dyn ChainReader>,
    /// Record persistence
    store: Arc<dyn RecordStore>,
    /// Blocks per log request
    chunk_size: u64,
    /// In-flight log requests
    concurrency: usize,
    /// Progress callback
    progress_callback: Option<ProgressCallback>,
}

impl EventIndexer {
    /// Create an indexer with default chunking and concurrency.
    pub fn new(reader: Arc<dyn ChainReader>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            reader,
            store,
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            progress_callback: None,
        }
    }

    /// Set blocks per log request. Zero is treated as one block.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Set the number of concurrent log requests. Zero is treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set progress callback
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ScanProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Create the store's tables and indexes when absent.
    ///
    /// Idempotent; safe to call on every startup.
    pub fn ensure_schema(&self) -> Result<()> {
        self.store.ensure_schema()
    }

    /// Scan `[from_block, to_block]` for the given signatures and persist
    /// recognized transfers.
    ///
    /// Chunks are fetched concurrently, reassembled into (block, log index)
    /// order, then classified one log at a time. A chain or store failure
    /// aborts the whole scan; a per-log shape violation only marks the
    /// offending log in the report. Re-scanning a range is safe: records
    /// whose identity is already persisted count as duplicates.
    pub async fn scan_range(
        &self,
        contract: Address,
        from_block: u64,
        to_block: u64,
        signatures: &[EventSignature],
    ) -> Result<ScanReport> {
        if from_block > to_block {
            return Err(ScanError::InvalidRange {
                from: from_block,
                to: to_block,
            }
            .into());
        }

        let topics: Vec<B256> = signatures.iter().map(|s| s.topic).collect();
        let chunks = Self::calculate_chunks(from_block, to_block, self.chunk_size);

        tracing::info!(
            "Scanning blocks {} to {} ({} chunks)",
            from_block,
            to_block,
            chunks.len()
        );

        let logs_count = Arc::new(AtomicU64::new(0));
        let start_time = std::time::Instant::now();
        let total_blocks = to_block - from_block + 1;

        let results: Vec<Result<Vec<RawLog>>> = stream::iter(chunks)
            .map(|(from, to)| {
                let reader = &self.reader;
                let topics = &topics;
                let logs_count = logs_count.clone();
                let callback = &self.progress_callback;

                async move {
                    let result = reader.get_logs(from, to, contract, topics).await;

                    if let Ok(ref logs) = result {
                        let count = logs_count.fetch_add(logs.len() as u64, Ordering::Relaxed);

                        if let Some(cb) = callback {
                            let elapsed = start_time.elapsed().as_secs_f64();
                            let blocks_done = to - from_block + 1;
                            cb(ScanProgress {
                                current_block: to,
                                total_blocks,
                                logs_fetched: count + logs.len() as u64,
                                percent: (blocks_done as f64 / total_blocks as f64) * 100.0,
                                blocks_per_second: if elapsed > 0.0 {
                                    blocks_done as f64 / elapsed
                                } else {
                                    0.0
                                },
                            });
                        }
                    }

                    result
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        // Reassemble into a deterministic order before touching the store.
        let mut all_logs = Vec::new();
        for result in results {
            all_logs.extend(result?);
        }
        all_logs.sort_by(|a, b| {
            let block_cmp = a.block_number.cmp(&b.block_number);
            if block_cmp == std::cmp::Ordering::Equal {
                a.log_index.cmp(&b.log_index)
            } else {
                block_cmp
            }
        });

        let mut report = ScanReport {
            events_seen: all_logs.len() as u64,
            ..Default::default()
        };

        for log in &all_logs {
            match decode_event(signatures, log) {
                Ok(Some(TokenEvent::Transfer { from, to, value })) => {
                    let record = TransferRecord {
                        transaction_hash: format!("{:#x}", log.transaction_hash),
                        log_index: log.log_index,
                        block_number: log.block_number,
                        contract_address: format!("{:#x}", log.address),
                        from_addr: format!("{from:#x}"),
                        to_addr: format!("{to:#x}"),
                        value: value.to_string(),
                        created_at: Utc::now().timestamp(),
                    };
                    if self.store.insert_if_absent(&record)? {
                        report.inserted += 1;
                    } else {
                        report.duplicates += 1;
                    }
                }
                Ok(Some(TokenEvent::Approval { .. })) => {
                    report.observed += 1;
                }
                Ok(None) => {
                    report.unrecognized += 1;
                }
                Err(e) => {
                    tracing::debug!(
                        "Failed to decode log {}/{}: {}",
                        log.transaction_hash,
                        log.log_index,
                        e
                    );
                    report.mapping_errors.push(MappingFailure {
                        transaction_hash: log.transaction_hash,
                        log_index: log.log_index,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Page through persisted transfers for one address and role.
    ///
    /// `page` is 1-indexed; `page_size` must be between 1 and
    /// [`MAX_PAGE_SIZE`]. Returns the page plus the total match count.
    pub fn query_by_address(
        &self,
        address: &str,
        role: AddressRole,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<TransferRecord>, u64)> {
        if page == 0 || page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(ScanError::InvalidPagination { page, page_size }.into());
        }
        let skip = (page - 1)
            .checked_mul(page_size)
            .ok_or(ScanError::InvalidPagination { page, page_size })?;

        let filter = TransferFilter {
            address: address.to_lowercase(),
            role,
        };
        self.store.query(&filter, skip, page_size)
    }

    /// Calculate chunk boundaries for a block range.
    fn calculate_chunks(from: u64, to: u64, chunk_size: u64) -> Vec<(u64, u64)> {
        let mut chunks = Vec::new();
        let mut current = from;

        while current <= to {
            let chunk_end = (current + chunk_size - 1).min(to);
            chunks.push((current, chunk_end));
            current = chunk_end + 1;
        }

        chunks
    }
}
