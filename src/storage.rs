//! Storage-slot decoding for on-chain lock arrays
//!
//! Solidity stores a dynamic array's length at its declared slot and its
//! elements starting at keccak256 of that slot. A lock entry spans two
//! consecutive slots: a packed word holding the owner address and start
//! time, then the full-width amount.

use alloy::primitives::{keccak256, Address, B256, U256};
use serde::{Serialize, Serializer};

use crate::chain::ChainReader;
use crate::error::{Result, SlotError};

/// Slots occupied by one lock entry.
pub const LOCK_SLOT_STRIDE: u64 = 2;

/// A decoded lock entry.
///
/// Slot layout, big-endian within each 32-byte word:
/// - slot 0: bytes `[4..12)` start time, bytes `[12..32)` owner address
/// - slot 1: amount
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockEntry {
    /// Position in the on-chain array.
    pub index: u64,
    /// Address that created the lock.
    #[serde(serialize_with = "serialize_address")]
    pub owner: Address,
    /// Unix timestamp the lock started at.
    pub start_time: u64,
    /// Locked amount in the token's smallest unit, serialized as a decimal
    /// string since it exceeds 64 bits.
    #[serde(serialize_with = "serialize_amount")]
    pub amount: U256,
}

fn serialize_address<S: Serializer>(
    addr: &Address,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{addr:#x}"))
}

fn serialize_amount<S: Serializer>(
    amount: &U256,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&amount.to_string())
}

/// Compute the base slot of a dynamic array declared at `declared_slot`.
///
/// keccak256 of the slot number's 32-byte big-endian encoding. Pure; the
/// same declared slot always yields the same base.
pub fn array_base_slot(declared_slot: U256) -> U256 {
    let hash = keccak256(declared_slot.to_be_bytes::<32>());
    U256::from_be_bytes(hash.0)
}

/// Slots occupied by element `index` of an array based at `base`.
///
/// Returns `base + index * slots_per_element + k` for each
/// `k < slots_per_element`, in ascending order. Fails with
/// [`SlotError::InvalidIndex`] when the arithmetic leaves the 256-bit slot
/// space.
pub fn element_slots(
    base: U256,
    index: u64,
    slots_per_element: u64,
) -> std::result::Result<Vec<U256>, SlotError> {
    let offset = U256::from(index)
        .checked_mul(U256::from(slots_per_element))
        .ok_or(SlotError::InvalidIndex { index })?;
    let first = base
        .checked_add(offset)
        .ok_or(SlotError::InvalidIndex { index })?;

    let mut slots = Vec::with_capacity(slots_per_element as usize);
    for k in 0..slots_per_element {
        let slot = first
            .checked_add(U256::from(k))
            .ok_or(SlotError::InvalidIndex { index })?;
        slots.push(slot);
    }
    Ok(slots)
}

fn word(raw: &[u8]) -> std::result::Result<&[u8; 32], SlotError> {
    raw.try_into().map_err(|_| SlotError::MalformedSlotData {
        expected: 32,
        found: raw.len(),
    })
}

/// Decode one lock entry from its two raw slot values.
///
/// Both slots must be exactly 32 bytes; anything else fails with
/// [`SlotError::MalformedSlotData`].
pub fn decode_lock_entry(
    index: u64,
    raw_slot0: &[u8],
    raw_slot1: &[u8],
) -> std::result::Result<LockEntry, SlotError> {
    let slot0 = word(raw_slot0)?;
    let slot1 = word(raw_slot1)?;

    let owner = Address::from_slice(&slot0[12..32]);
    let mut start = [0u8; 8];
    start.copy_from_slice(&slot0[4..12]);
    let amount = U256::from_be_slice(slot1);

    Ok(LockEntry {
        index,
        owner,
        start_time: u64::from_be_bytes(start),
        amount,
    })
}

async fn read_slot<R: ChainReader + ?Sized>(
    reader: &R,
    contract: Address,
    slot: U256,
) -> Result<B256> {
    let value = reader.storage_at(contract, slot).await?;
    value.ok_or_else(|| SlotError::AbsentSlot { slot }.into())
}

/// Decode a whole lock array given the raw value of its length slot.
///
/// A zero length yields an empty vec without touching the reader; otherwise
/// each element costs two storage reads. Entries come back in ascending
/// index order.
pub async fn decode_array<R: ChainReader + ?Sized>(
    reader: &R,
    contract: Address,
    declared_slot: U256,
    length_slot_value: &[u8],
) -> Result<Vec<LockEntry>> {
    let length_word = word(length_slot_value)?;
    let length = u64::try_from(U256::from_be_slice(length_word))
        .map_err(|_| SlotError::LengthOverflow)?;

    let base = array_base_slot(declared_slot);
    let mut entries = Vec::new();
    for index in 0..length {
        let slots = element_slots(base, index, LOCK_SLOT_STRIDE)?;
        let raw0 = read_slot(reader, contract, slots[0]).await?;
        let raw1 = read_slot(reader, contract, slots[1]).await?;
        entries.push(decode_lock_entry(index, raw0.as_slice(), raw1.as_slice())?);
    }
    Ok(entries)
}

/// Read and decode the lock array declared at `declared_slot`.
///
/// Fetches the length slot first, then delegates to [`decode_array`].
pub async fn read_lock_array<R: ChainReader + ?Sized>(
    reader: &R,
    contract: Address,
    declared_slot: U256,
) -> Result<Vec<LockEntry>> {
    let length_raw = reader
        .storage_at(contract, declared_slot)
        .await?
        .ok_or(SlotError::AbsentSlot {
            slot: declared_slot,
        })?;
    decode_array(reader, contract, declared_slot, length_raw.as_slice()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::RawLog;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn encode_slot0(owner: Address, start_time: u64) -> [u8; 32] {
        let mut slot0 = [0u8; 32];
        slot0[4..12].copy_from_slice(&start_time.to_be_bytes());
        slot0[12..].copy_from_slice(owner.as_slice());
        slot0
    }

    struct MockReader {
        storage: HashMap<U256, B256>,
        reads: AtomicUsize,
    }

    impl MockReader {
        fn new(storage: HashMap<U256, B256>) -> Self {
            Self {
                storage,
                reads: AtomicUsize::new(0),
            }
        }

        fn read_count(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChainReader for MockReader {
        async fn current_height(&self) -> Result<u64> {
            Ok(0)
        }

        async fn get_logs(
            &self,
            _from_block: u64,
            _to_block: u64,
            _contract: Address,
            _topics: &[B256],
        ) -> Result<Vec<RawLog>> {
            Ok(Vec::new())
        }

        async fn storage_at(&self, _contract: Address, slot: U256) -> Result<Option<B256>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.storage.get(&slot).copied())
        }
    }

    // ==================== Slot arithmetic tests ====================

    #[test]
    fn test_base_slot_of_slot_zero() {
        // keccak256 of 32 zero bytes
        assert_eq!(
            format!("{:#x}", array_base_slot(U256::ZERO)),
            "0x290decd9548b62a8d60345a988386fc84ba6bc95484008f6362f93160ef3e563"
        );
    }

    #[test]
    fn test_base_slot_is_deterministic() {
        let slot = U256::from(7u64);
        assert_eq!(array_base_slot(slot), array_base_slot(slot));
        assert_ne!(array_base_slot(slot), array_base_slot(U256::from(8u64)));
    }

    #[test]
    fn test_element_slots_are_consecutive() {
        let base = U256::from(100u64);
        let slots = element_slots(base, 3, LOCK_SLOT_STRIDE).unwrap();
        assert_eq!(slots, vec![U256::from(106u64), U256::from(107u64)]);
    }

    #[test]
    fn test_element_zero_starts_at_base() {
        let base = array_base_slot(U256::ZERO);
        let slots = element_slots(base, 0, LOCK_SLOT_STRIDE).unwrap();
        assert_eq!(slots[0], base);
        assert_eq!(slots[1], base + U256::from(1u64));
    }

    #[test]
    fn test_element_slots_zero_stride_is_empty() {
        let slots = element_slots(U256::from(5u64), 10, 0).unwrap();
        assert!(slots.is_empty());
    }

    #[test]
    fn test_element_slots_overflow_is_invalid_index() {
        let err = element_slots(U256::MAX, 1, LOCK_SLOT_STRIDE).unwrap_err();
        assert!(matches!(err, SlotError::InvalidIndex { index: 1 }));
    }

    // ==================== Entry decoding tests ====================

    #[test]
    fn test_decode_lock_entry_unpacks_fields() {
        let owner = Address::repeat_byte(0xab);
        let slot0 = encode_slot0(owner, 1_700_000_000);
        let slot1 = U256::from(42u64).to_be_bytes::<32>();

        let entry = decode_lock_entry(5, &slot0, &slot1).unwrap();
        assert_eq!(entry.index, 5);
        assert_eq!(entry.owner, owner);
        assert_eq!(entry.start_time, 1_700_000_000);
        assert_eq!(entry.amount, U256::from(42u64));
    }

    #[test]
    fn test_decode_lock_entry_rejects_short_slot() {
        let slot1 = U256::ZERO.to_be_bytes::<32>();
        let err = decode_lock_entry(0, &[0u8; 31], &slot1).unwrap_err();
        assert!(matches!(
            err,
            SlotError::MalformedSlotData {
                expected: 32,
                found: 31
            }
        ));
    }

    #[test]
    fn test_decode_lock_entry_rejects_long_amount_slot() {
        let slot0 = encode_slot0(Address::ZERO, 0);
        let err = decode_lock_entry(0, &slot0, &[0u8; 33]).unwrap_err();
        assert!(matches!(
            err,
            SlotError::MalformedSlotData {
                expected: 32,
                found: 33
            }
        ));
    }

    #[test]
    fn test_lock_entry_json_shape() {
        let entry = LockEntry {
            index: 1,
            owner: Address::repeat_byte(0xAB),
            start_time: 1_700_000_000,
            amount: U256::from(10u64).pow(U256::from(20u64)),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["owner"], "0xabababababababababababababababababababab");
        assert_eq!(json["amount"], "100000000000000000000");
        assert_eq!(json["start_time"], 1_700_000_000u64);
    }

    proptest! {
        #[test]
        fn prop_lock_entry_round_trips(
            owner in prop::array::uniform20(any::<u8>()),
            start_time in any::<u64>(),
            amount in any::<u128>(),
        ) {
            let owner = Address::from(owner);
            let slot0 = encode_slot0(owner, start_time);
            let slot1 = U256::from(amount).to_be_bytes::<32>();

            let entry = decode_lock_entry(3, &slot0, &slot1).unwrap();
            prop_assert_eq!(entry.owner, owner);
            prop_assert_eq!(entry.start_time, start_time);
            prop_assert_eq!(entry.amount, U256::from(amount));
        }
    }

    // ==================== Array reading tests ====================

    #[tokio::test]
    async fn test_zero_length_array_issues_no_reads() {
        let reader = MockReader::new(HashMap::new());
        let length = U256::ZERO.to_be_bytes::<32>();

        let entries = decode_array(&reader, Address::ZERO, U256::ZERO, &length)
            .await
            .unwrap();
        assert!(entries.is_empty());
        assert_eq!(reader.read_count(), 0);
    }

    #[tokio::test]
    async fn test_read_lock_array_decodes_in_order() {
        let declared = U256::from(3u64);
        let base = array_base_slot(declared);
        let owner_a = Address::repeat_byte(0x01);
        let owner_b = Address::repeat_byte(0x02);

        let mut storage = HashMap::new();
        storage.insert(declared, B256::from(U256::from(2u64)));
        storage.insert(base, B256::from(encode_slot0(owner_a, 100)));
        storage.insert(
            base + U256::from(1u64),
            B256::from(U256::from(10u64)),
        );
        storage.insert(
            base + U256::from(2u64),
            B256::from(encode_slot0(owner_b, 200)),
        );
        storage.insert(
            base + U256::from(3u64),
            B256::from(U256::from(20u64)),
        );
        let reader = MockReader::new(storage);

        let entries = read_lock_array(&reader, Address::ZERO, declared)
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].index, 0);
        assert_eq!(entries[0].owner, owner_a);
        assert_eq!(entries[0].amount, U256::from(10u64));
        assert_eq!(entries[1].index, 1);
        assert_eq!(entries[1].owner, owner_b);
        assert_eq!(entries[1].start_time, 200);
        // one length read plus two reads per entry
        assert_eq!(reader.read_count(), 5);
    }

    #[tokio::test]
    async fn test_missing_element_slot_is_absent() {
        let declared = U256::ZERO;
        let mut storage = HashMap::new();
        storage.insert(declared, B256::from(U256::from(1u64)));
        let reader = MockReader::new(storage);

        let err = read_lock_array(&reader, Address::ZERO, declared)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Slot(SlotError::AbsentSlot { .. })
        ));
    }

    #[tokio::test]
    async fn test_oversized_length_overflows() {
        let length = U256::MAX.to_be_bytes::<32>();
        let reader = MockReader::new(HashMap::new());

        let err = decode_array(&reader, Address::ZERO, U256::ZERO, &length)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Slot(SlotError::LengthOverflow)
        ));
        assert_eq!(reader.read_count(), 0);
    }
}
