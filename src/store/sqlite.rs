//! SQLite-backed record store
//!
//! A connection pool (r2d2) serves concurrent reads while a dedicated
//! writer connection serializes writes. SQLite WAL mode allows readers to
//! proceed without blocking the writer and vice versa.

use std::path::Path;
use std::sync::Mutex;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OpenFlags};

use super::{AddressRole, RecordStore, TransferFilter, TransferRecord};
use crate::error::{Result, StoreError};

/// Record store backed by SQLite.
pub struct SqliteStore {
    /// Connection pool for read operations (concurrent).
    read_pool: Pool<SqliteConnectionManager>,
    /// Dedicated connection for write operations (serialized).
    writer: Mutex<Connection>,
}

/// Configure a connection with standard PRAGMAs for WAL mode.
fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA foreign_keys=ON;",
    )
}

fn unique_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

impl SqliteStore {
    /// Open an on-disk store, creating the database file when missing.
    ///
    /// The schema is not created here; call
    /// [`RecordStore::ensure_schema`] before the first write.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        // Writer connection first so the database file exists before the
        // read-only pool opens it.
        let writer = Connection::open(&db_path).map_err(StoreError::from)?;
        configure_connection(&writer).map_err(StoreError::from)?;

        let manager = SqliteConnectionManager::file(&db_path)
            .with_flags(OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX)
            .with_init(|conn| configure_connection(conn));
        let read_pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(StoreError::from)?;

        Ok(Self {
            read_pool,
            writer: Mutex::new(writer),
        })
    }

    /// Create an in-memory store for testing.
    ///
    /// In-memory SQLite databases are per-connection, so a named
    /// shared-cache URI lets the pool and the writer see the same data.
    pub fn in_memory() -> Result<Self> {
        let uri = format!("file:tokenscan_{}?mode=memory&cache=shared", unique_id());
        let writer = Connection::open(&uri).map_err(StoreError::from)?;
        configure_connection(&writer).map_err(StoreError::from)?;

        let manager =
            SqliteConnectionManager::file(&uri).with_init(|conn| configure_connection(conn));
        let read_pool = Pool::builder()
            .max_size(2)
            .build(manager)
            .map_err(StoreError::from)?;

        Ok(Self {
            read_pool,
            writer: Mutex::new(writer),
        })
    }

    /// Get a read connection from the pool.
    fn read_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.read_pool.get().map_err(StoreError::from)?)
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TransferRecord> {
        let log_index: i64 = row.get(1)?;
        let block_number: i64 = row.get(2)?;
        Ok(TransferRecord {
            transaction_hash: row.get(0)?,
            log_index: log_index as u64,
            block_number: block_number as u64,
            contract_address: row.get(3)?,
            from_addr: row.get(4)?,
            to_addr: row.get(5)?,
            value: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

impl RecordStore for SqliteStore {
    fn ensure_schema(&self) -> Result<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS transfers (
                 transaction_hash TEXT NOT NULL,
                 log_index INTEGER NOT NULL,
                 block_number INTEGER NOT NULL,
                 contract_address TEXT NOT NULL,
                 from_addr TEXT NOT NULL,
                 to_addr TEXT NOT NULL,
                 value TEXT NOT NULL,
                 created_at INTEGER NOT NULL,
                 PRIMARY KEY (transaction_hash, log_index)
             );
             CREATE INDEX IF NOT EXISTS idx_transfers_from ON transfers(from_addr);
             CREATE INDEX IF NOT EXISTS idx_transfers_to ON transfers(to_addr);
             CREATE INDEX IF NOT EXISTS idx_transfers_block ON transfers(block_number);",
        )
        .map_err(StoreError::from)?;
        Ok(())
    }

    fn insert_if_absent(&self, record: &TransferRecord) -> Result<bool> {
        let conn = self.writer.lock().unwrap();
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO transfers
                 (transaction_hash, log_index, block_number, contract_address,
                  from_addr, to_addr, value, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.transaction_hash,
                    record.log_index as i64,
                    record.block_number as i64,
                    record.contract_address,
                    record.from_addr,
                    record.to_addr,
                    record.value,
                    record.created_at,
                ],
            )
            .map_err(StoreError::from)?;
        Ok(changed == 1)
    }

    fn query(
        &self,
        filter: &TransferFilter,
        skip: u64,
        limit: u64,
    ) -> Result<(Vec<TransferRecord>, u64)> {
        // The column name comes from the role match, never from user input.
        let column = match filter.role {
            AddressRole::From => "from_addr",
            AddressRole::To => "to_addr",
        };
        let address = filter.address.to_lowercase();
        let conn = self.read_conn()?;

        let total: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM transfers WHERE {column} = ?1"),
                params![address],
                |row| row.get(0),
            )
            .map_err(StoreError::from)?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT transaction_hash, log_index, block_number, contract_address,
                        from_addr, to_addr, value, created_at
                 FROM transfers
                 WHERE {column} = ?1
                 ORDER BY block_number DESC, log_index DESC
                 LIMIT ?2 OFFSET ?3"
            ))
            .map_err(StoreError::from)?;
        let rows = stmt
            .query_map(
                params![address, limit as i64, skip as i64],
                Self::row_to_record,
            )
            .map_err(StoreError::from)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(StoreError::from)?);
        }
        Ok((records, total as u64))
    }
}


#[cfg(test)]
mod model_tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    /// A simple reference model for RecordStore behavior.
    #[derive(Debug, Default)]
    struct StoreModel {
        records: HashMap<(String, u64), TransferRecord>,
    }

    impl StoreModel {
        fn insert_if_absent(&mut self, record: &TransferRecord) -> bool {
            let key = (record.transaction_hash.clone(), record.log_index);
            if self.records.contains_key(&key) {
                return false;
            }
            self.records.insert(key, record.clone());
            true
        }

        fn query(&self, address: &str, role: AddressRole) -> Vec<TransferRecord> {
            let mut matches: Vec<TransferRecord> = self
                .records
                .values()
                .filter(|r| match role {
                    AddressRole::From => r.from_addr == address,
                    AddressRole::To => r.to_addr == address,
                })
                .cloned()
                .collect();
            matches.sort_by(|a, b| {
                b.block_number
                    .cmp(&a.block_number)
                    .then(b.log_index.cmp(&a.log_index))
            });
            matches
        }
    }

    /// Operations that can be performed on a record store.
    #[derive(Debug, Clone)]
    enum Operation {
        Insert {
            tx_byte: u8,
            log_index: u8,
            from_byte: u8,
            to_byte: u8,
            value: u8,
        },
        Query {
            addr_byte: u8,
            from_side: bool,
        },
    }

    fn arb_operation() -> impl Strategy<Value = Operation> {
        prop_oneof![
            (0..8u8, 0..4u8, 0..4u8, 0..4u8, any::<u8>()).prop_map(
                |(tx_byte, log_index, from_byte, to_byte, value)| {
                    Operation::Insert {
                        tx_byte,
                        log_index,
                        from_byte,
                        to_byte,
                        value,
                    }
                }
            ),
            (0..4u8, any::<bool>()).prop_map(|(addr_byte, from_side)| Operation::Query {
                addr_byte,
                from_side,
            }),
        ]
    }

    fn address(byte: u8) -> String {
        format!("0x{}", hex::encode([byte; 20]))
    }

    fn record_from(op: &Operation) -> Option<TransferRecord> {
        match op {
            Operation::Insert {
                tx_byte,
                log_index,
                from_byte,
                to_byte,
                value,
            } => Some(TransferRecord {
                transaction_hash: format!("0x{}", hex::encode([*tx_byte; 32])),
                log_index: *log_index as u64,
                // Tie the block to the transaction so the descending
                // (block, log index) order is total across rows.
                block_number: *tx_byte as u64 + 1,
                contract_address: address(0xcc),
                from_addr: address(*from_byte),
                to_addr: address(*to_byte),
                value: value.to_string(),
                created_at: 1_700_000_000,
            }),
            Operation::Query { .. } => None,
        }
    }

    proptest! {
        /// Model-based test: the SQLite store behaves like the in-memory model.
        #[test]
        fn prop_store_matches_model(operations in proptest::collection::vec(arb_operation(), 1..40)) {
            let store = SqliteStore::in_memory().unwrap();
            store.ensure_schema().unwrap();
            let mut model = StoreModel::default();

            for op in &operations {
                match op {
                    Operation::Insert { .. } => {
                        let record = record_from(op).unwrap();
                        let expected = model.insert_if_absent(&record);
                        let inserted = store.insert_if_absent(&record).unwrap();
                        prop_assert_eq!(inserted, expected);
                    }
                    Operation::Query { addr_byte, from_side } => {
                        let role = if *from_side { AddressRole::From } else { AddressRole::To };
                        let addr = address(*addr_byte);
                        let expected = model.query(&addr, role);

                        let filter = TransferFilter { address: addr, role };
                        let (records, total) = store.query(&filter, 0, 1000).unwrap();
                        prop_assert_eq!(total as usize, expected.len());
                        prop_assert_eq!(records, expected);
                    }
                }
            }
        }
    }
}
