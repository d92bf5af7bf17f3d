//! Event signatures and log decoding
//!
//! The scanner recognizes the two standard ERC-20 shapes: transfer-shaped
//! events are persisted, approval-shaped events are decoded for the report
//! only. Both carry two indexed addresses and one unsigned-integer data
//! word; anything else is counted as unrecognized.

use alloy::primitives::{keccak256, Address, B256, U256};
use thiserror::Error;

use crate::chain::RawLog;
use crate::error::{Error, Result, ScanError};

/// Number of topics a recognized event carries: the signature hash plus two
/// indexed addresses.
const TOPIC_COUNT: usize = 3;

/// How a recognized event is handled by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Persisted as a [`crate::store::TransferRecord`].
    Transfer,
    /// Decoded and reported, never persisted.
    Approval,
}

/// A recognized event signature with its precomputed topic hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSignature {
    /// Event name, e.g. `Transfer`.
    pub name: String,
    /// Canonical declaration, e.g. `Transfer(address,address,uint256)`.
    pub declaration: String,
    /// How matching logs are handled.
    pub kind: EventKind,
    /// keccak256 of the canonical declaration; matched against `topics[0]`.
    pub topic: B256,
}

impl EventSignature {
    /// The standard ERC-20 `Transfer(address,address,uint256)` signature.
    pub fn transfer() -> Self {
        Self {
            name: "Transfer".to_string(),
            declaration: "Transfer(address,address,uint256)".to_string(),
            kind: EventKind::Transfer,
            topic: keccak256(b"Transfer(address,address,uint256)"),
        }
    }

    /// The standard ERC-20 `Approval(address,address,uint256)` signature.
    pub fn approval() -> Self {
        Self {
            name: "Approval".to_string(),
            declaration: "Approval(address,address,uint256)".to_string(),
            kind: EventKind::Approval,
            topic: keccak256(b"Approval(address,address,uint256)"),
        }
    }

    /// Parse a user-supplied event declaration.
    ///
    /// Accepts the canonical form (`Transfer(address,address,uint256)`) as
    /// well as declarations with `indexed` markers and parameter names
    /// (`Transfer(address indexed from, address indexed to, uint256 value)`).
    /// Only the two-address-one-uint shape named `Transfer` or `Approval` is
    /// supported.
    pub fn parse(decl: &str) -> Result<Self> {
        let decl = decl.trim();
        let open = decl
            .find('(')
            .ok_or_else(|| invalid_signature(decl, "missing parameter list"))?;
        if !decl.ends_with(')') {
            return Err(invalid_signature(decl, "missing closing parenthesis"));
        }

        let name = decl[..open].trim();
        if name.is_empty() {
            return Err(invalid_signature(decl, "missing event name"));
        }

        let params: Vec<&str> = decl[open + 1..decl.len() - 1]
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if params.len() != TOPIC_COUNT {
            return Err(invalid_signature(decl, "expected exactly three parameters"));
        }

        // First whitespace-separated token of each parameter is its type;
        // "indexed" markers and names follow it.
        let types: Vec<&str> = params
            .iter()
            .map(|p| p.split_whitespace().next().unwrap_or(""))
            .collect();
        if types[0] != "address" || types[1] != "address" {
            return Err(invalid_signature(decl, "first two parameters must be addresses"));
        }
        if !types[2].starts_with("uint") {
            return Err(invalid_signature(decl, "third parameter must be an unsigned integer"));
        }

        let kind = match name {
            "Transfer" => EventKind::Transfer,
            "Approval" => EventKind::Approval,
            other => {
                return Err(invalid_signature(
                    decl,
                    &format!("unsupported event name '{other}'"),
                ))
            }
        };

        let declaration = format!("{}({})", name, types.join(","));
        let topic = keccak256(declaration.as_bytes());

        Ok(Self {
            name: name.to_string(),
            declaration,
            kind,
            topic,
        })
    }
}

fn invalid_signature(decl: &str, reason: &str) -> Error {
    ScanError::InvalidEventSignature(format!("{decl}: {reason}")).into()
}

/// The default signature set: ERC-20 `Transfer` and `Approval`.
pub fn erc20_signatures() -> Vec<EventSignature> {
    vec![EventSignature::transfer(), EventSignature::approval()]
}

/// A decoded recognized event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEvent {
    Transfer {
        from: Address,
        to: Address,
        value: U256,
    },
    Approval {
        owner: Address,
        spender: Address,
        value: U256,
    },
}

/// Per-log decode failure.
///
/// Recorded in the scan report for the offending log; never aborts a scan
/// and never reaches the top-level error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("expected {expected} topics, found {found}")]
    TopicCount { expected: usize, found: usize },

    #[error("expected a {expected}-byte data word, found {found} bytes")]
    DataLength { expected: usize, found: usize },
}

/// Decode a log against a signature set.
///
/// Returns `Ok(None)` when the first topic matches no signature in the set
/// (the log is unrecognized, not an error), and `Err` when a matching log
/// violates the expected shape.
pub fn decode_event(
    signatures: &[EventSignature],
    log: &RawLog,
) -> std::result::Result<Option<TokenEvent>, MappingError> {
    let Some(topic0) = log.topics.first() else {
        return Ok(None);
    };
    let Some(signature) = signatures.iter().find(|s| s.topic == *topic0) else {
        return Ok(None);
    };

    if log.topics.len() != TOPIC_COUNT {
        return Err(MappingError::TopicCount {
            expected: TOPIC_COUNT,
            found: log.topics.len(),
        });
    }
    if log.data.len() != 32 {
        return Err(MappingError::DataLength {
            expected: 32,
            found: log.data.len(),
        });
    }

    // Indexed address topics are left-padded to 32 bytes.
    let first = Address::from_slice(&log.topics[1][12..]);
    let second = Address::from_slice(&log.topics[2][12..]);
    let value = U256::from_be_slice(&log.data);

    let event = match signature.kind {
        EventKind::Transfer => TokenEvent::Transfer {
            from: first,
            to: second,
            value,
        },
        EventKind::Approval => TokenEvent::Approval {
            owner: first,
            spender: second,
            value,
        },
    };
    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Bytes;

    fn address_topic(addr: Address) -> B256 {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(addr.as_slice());
        B256::from(word)
    }

    fn transfer_log(from: Address, to: Address, value: u64) -> RawLog {
        RawLog {
            transaction_hash: B256::repeat_byte(0x11),
            log_index: 0,
            block_number: 1,
            address: Address::repeat_byte(0xcc),
            topics: vec![
                EventSignature::transfer().topic,
                address_topic(from),
                address_topic(to),
            ],
            data: Bytes::from(U256::from(value).to_be_bytes::<32>().to_vec()),
        }
    }

    // ==================== Signature tests ====================

    #[test]
    fn test_transfer_topic_is_canonical() {
        // keccak256("Transfer(address,address,uint256)")
        assert_eq!(
            format!("{:x}", EventSignature::transfer().topic),
            "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn test_approval_topic_is_canonical() {
        // keccak256("Approval(address,address,uint256)")
        assert_eq!(
            format!("{:x}", EventSignature::approval().topic),
            "8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925"
        );
    }

    #[test]
    fn test_parse_canonical_declaration() {
        let sig = EventSignature::parse("Transfer(address,address,uint256)").unwrap();
        assert_eq!(sig, EventSignature::transfer());
    }

    #[test]
    fn test_parse_declaration_with_names_and_indexed() {
        let sig = EventSignature::parse(
            "Transfer(address indexed from, address indexed to, uint256 value)",
        )
        .unwrap();
        assert_eq!(sig.declaration, "Transfer(address,address,uint256)");
        assert_eq!(sig.topic, EventSignature::transfer().topic);
        assert_eq!(sig.kind, EventKind::Transfer);
    }

    #[test]
    fn test_parse_approval_kind() {
        let sig = EventSignature::parse("Approval(address,address,uint256)").unwrap();
        assert_eq!(sig.kind, EventKind::Approval);
    }

    #[test]
    fn test_parse_rejects_unsupported_name() {
        assert!(EventSignature::parse("Mint(address,address,uint256)").is_err());
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        assert!(EventSignature::parse("Transfer(address,uint256)").is_err());
        assert!(EventSignature::parse("Transfer(uint256,address,address)").is_err());
        assert!(EventSignature::parse("Transfer(address,address,bool)").is_err());
        assert!(EventSignature::parse("Transfer").is_err());
        assert!(EventSignature::parse("(address,address,uint256)").is_err());
    }

    // ==================== Decode tests ====================

    #[test]
    fn test_decode_transfer() {
        let from = Address::repeat_byte(0xaa);
        let to = Address::repeat_byte(0xbb);
        let log = transfer_log(from, to, 1_500);

        let event = decode_event(&erc20_signatures(), &log).unwrap();
        assert_eq!(
            event,
            Some(TokenEvent::Transfer {
                from,
                to,
                value: U256::from(1_500u64),
            })
        );
    }

    #[test]
    fn test_decode_approval() {
        let owner = Address::repeat_byte(0x01);
        let spender = Address::repeat_byte(0x02);
        let mut log = transfer_log(owner, spender, 7);
        log.topics[0] = EventSignature::approval().topic;

        let event = decode_event(&erc20_signatures(), &log).unwrap();
        assert_eq!(
            event,
            Some(TokenEvent::Approval {
                owner,
                spender,
                value: U256::from(7u64),
            })
        );
    }

    #[test]
    fn test_decode_unknown_topic_is_unrecognized() {
        let mut log = transfer_log(Address::ZERO, Address::ZERO, 1);
        log.topics[0] = B256::repeat_byte(0xff);

        assert_eq!(decode_event(&erc20_signatures(), &log).unwrap(), None);
    }

    #[test]
    fn test_decode_no_topics_is_unrecognized() {
        let mut log = transfer_log(Address::ZERO, Address::ZERO, 1);
        log.topics.clear();

        assert_eq!(decode_event(&erc20_signatures(), &log).unwrap(), None);
    }

    #[test]
    fn test_decode_missing_indexed_topic_fails() {
        let mut log = transfer_log(Address::ZERO, Address::ZERO, 1);
        log.topics.truncate(2);

        assert_eq!(
            decode_event(&erc20_signatures(), &log),
            Err(MappingError::TopicCount {
                expected: 3,
                found: 2
            })
        );
    }

    #[test]
    fn test_decode_short_data_word_fails() {
        let mut log = transfer_log(Address::ZERO, Address::ZERO, 1);
        log.data = Bytes::from(vec![0u8; 16]);

        assert_eq!(
            decode_event(&erc20_signatures(), &log),
            Err(MappingError::DataLength {
                expected: 32,
                found: 16
            })
        );
    }

    #[test]
    fn test_decode_respects_signature_subset() {
        // A set without Approval must treat approval logs as unrecognized.
        let transfer_only = vec![EventSignature::transfer()];
        let mut log = transfer_log(Address::ZERO, Address::ZERO, 1);
        log.topics[0] = EventSignature::approval().topic;

        assert_eq!(decode_event(&transfer_only, &log).unwrap(), None);
    }

    #[test]
    fn test_decode_max_value_round_trips() {
        let mut log = transfer_log(Address::ZERO, Address::ZERO, 0);
        log.data = Bytes::from(U256::MAX.to_be_bytes::<32>().to_vec());

        match decode_event(&erc20_signatures(), &log).unwrap() {
            Some(TokenEvent::Transfer { value, .. }) => assert_eq!(value, U256::MAX),
            other => panic!("unexpected decode result: {other:?}"),
        }
    }
}
