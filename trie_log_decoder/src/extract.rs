//! The per-record leaf extraction pipeline.
//!
//! Each log record is pushed through decode → classify → path
//! reconstruction → account decode. A record that fails any stage is
//! excluded from the output and counted under an explicit [`SkipReason`];
//! the sweep never aborts because of one bad record. The only hard failure
//! is a record with no storage key at all, which means the log itself is
//! corrupt.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use bytes::Bytes;
use ethereum_types::{H256, U256};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    account::{self, Account},
    nibbles::Nibbles,
    node::{classify, NodeShape},
    rlp,
};

/// The namespace label the operation log uses for account-trie records.
pub const ACCOUNT_TRIE_NAMESPACE: &str = "PATH_ACCOUNT_TRIE";

/// The tag byte prefixed to every account-trie storage key.
pub const ACCOUNT_TRIE_KEY_TAG: u8 = b'A';

/// The kind of store operation a log record observed.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// A read of the key.
    Get,

    /// A write of the key.
    Put,

    /// A deletion of the key.
    Delete,
}

impl Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Get => "GET",
            Operation::Put => "PUT",
            Operation::Delete => "DELETE",
        };

        write!(f, "{}", s)
    }
}

/// One observed store operation, as parsed from the operation log.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LogRecord {
    /// The operation kind.
    #[serde(rename = "Operation")]
    pub operation: Operation,

    /// Hex-encoded storage key. The first byte is a namespace tag.
    #[serde(rename = "KeyHex")]
    pub key_hex: String,

    /// Hex-encoded value, absent for some operations.
    #[serde(rename = "ValueHex")]
    pub value_hex: Option<String>,

    /// Key length in bytes. Informational; decoding never consults it.
    #[serde(rename = "KeySize")]
    pub key_size: Option<u64>,

    /// Value length in bytes. Informational; decoding never consults it.
    #[serde(rename = "ValueSize")]
    pub value_size: Option<u64>,

    /// The logical namespace the key belongs to.
    #[serde(rename = "Type")]
    pub namespace: String,
}

/// A fully reconstructed account leaf, the pipeline's terminal output.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct AccountLeaf {
    /// The full address hash: storage-key prefix nibbles concatenated with
    /// the node's fragment nibbles, packed back into bytes.
    pub address_hash: Bytes,

    /// Account nonce.
    pub nonce: U256,

    /// Account balance in wei.
    pub balance: U256,

    /// Root hash of the account's storage trie.
    pub storage_root: H256,

    /// Hash of the account's bytecode.
    pub code_hash: H256,

    /// The raw path bytes from the record's storage key, tag stripped.
    pub path: Bytes,

    /// The operation that carried the node.
    pub operation: Operation,
}

/// Why a record produced no leaf.
///
/// None of these are fatal; the operation log legitimately mixes branch
/// nodes, extension nodes, storage-trie entries and snapshot data in with
/// the account leaves.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum SkipReason {
    /// The record's namespace is not the account trie.
    ForeignNamespace,

    /// The record carries no value payload.
    MissingValue,

    /// The key is not valid hex text.
    MalformedKeyHex,

    /// The value is not valid hex text.
    MalformedValueHex,

    /// The key does not start with the account-trie tag byte.
    ForeignKeyTag,

    /// The value payload failed length-prefix decoding.
    UndecodableValue,

    /// The decoded value is not a two-element short node.
    NotAShortNode,

    /// The short node is an extension, not a leaf.
    ExtensionNode,

    /// Prefix plus fragment came to an odd number of nibbles, so the path
    /// is an incomplete observation.
    OddPath,

    /// The leaf payload is not a 4-field account record.
    MalformedAccount,
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::ForeignNamespace => "foreign namespace",
            SkipReason::MissingValue => "missing value",
            SkipReason::MalformedKeyHex => "malformed key hex",
            SkipReason::MalformedValueHex => "malformed value hex",
            SkipReason::ForeignKeyTag => "foreign key tag",
            SkipReason::UndecodableValue => "undecodable value",
            SkipReason::NotAShortNode => "not a short node",
            SkipReason::ExtensionNode => "extension node",
            SkipReason::OddPath => "odd path",
            SkipReason::MalformedAccount => "malformed account",
        };

        write!(f, "{}", s)
    }
}

/// A violation of the input log's contract, as opposed to a record-local
/// skip.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ExtractError {
    /// A record carried no storage key at all. The upstream log writer
    /// always emits a key, so this means the log is corrupt and the caller
    /// should hear about it rather than have the record vanish.
    #[error("Record {index} has an empty key; the operation log is corrupt")]
    MissingKey {
        /// Zero-based index of the offending record.
        index: usize,
    },
}

/// The outcome of sweeping a full operation log.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Extraction {
    /// Reconstructed leaves, in input order.
    pub leaves: Vec<AccountLeaf>,

    /// How many records were skipped, per reason.
    pub skips: BTreeMap<SkipReason, u64>,
}

/// Runs the full decode pipeline on one record.
///
/// The pipeline is pure and per-record: nothing is shared between records,
/// so callers may shard a log across threads as long as they restore input
/// order when collecting results.
pub fn try_extract_leaf(record: &LogRecord) -> Result<AccountLeaf, SkipReason> {
    if record.namespace != ACCOUNT_TRIE_NAMESPACE {
        return Err(SkipReason::ForeignNamespace);
    }

    let value_hex = match record.value_hex.as_deref() {
        Some(v) if !v.is_empty() => v,
        _ => return Err(SkipReason::MissingValue),
    };

    let key = decode_hex(&record.key_hex).map_err(|_| SkipReason::MalformedKeyHex)?;
    let value = decode_hex(value_hex).map_err(|_| SkipReason::MalformedValueHex)?;

    let path = match key.split_first() {
        Some((&ACCOUNT_TRIE_KEY_TAG, path)) => path,
        _ => return Err(SkipReason::ForeignKeyTag),
    };

    let node = rlp::decode_exact(&value).map_err(|_| SkipReason::UndecodableValue)?;

    let NodeShape::Short {
        key_fragment,
        payload,
    } = classify(&node)
    else {
        return Err(SkipReason::NotAShortNode);
    };

    let (fragment, is_leaf) = Nibbles::from_hex_prefix_encoding(&key_fragment);
    if !is_leaf {
        return Err(SkipReason::ExtensionNode);
    }

    let full_path = Nibbles::from_bytes_be(path).merge_nibbles(&fragment);
    let address_hash = full_path.try_into_bytes_be().ok_or(SkipReason::OddPath)?;

    let Account {
        nonce,
        balance,
        storage_root,
        code_hash,
    } = account::decode_account(&payload).map_err(|_| SkipReason::MalformedAccount)?;

    Ok(AccountLeaf {
        address_hash: address_hash.into(),
        nonce,
        balance,
        storage_root,
        code_hash,
        path: Bytes::copy_from_slice(path),
        operation: record.operation,
    })
}

/// Extracts zero or one account leaf from a record, discarding the skip
/// reason.
pub fn extract_leaf(record: &LogRecord) -> Option<AccountLeaf> {
    try_extract_leaf(record).ok()
}

/// Tests whether a record carries an account-trie leaf node, regardless of
/// whether the leaf fully reconstructs.
///
/// This is the membership test for baseline comparisons over the raw log: a
/// short node whose fragment has the leaf flag set counts, even when the
/// observed path is incomplete or the payload is not a well-formed account.
/// Stages past the leaf flag say nothing about what the store wrote, only
/// about what we can recover from it.
pub fn is_leaf_record(record: &LogRecord) -> bool {
    matches!(
        try_extract_leaf(record),
        Ok(_) | Err(SkipReason::OddPath) | Err(SkipReason::MalformedAccount)
    )
}

/// Sweeps an operation log in input order, collecting every leaf that fully
/// decodes and a histogram of why the rest were skipped.
pub fn extract_leaves<'a, I>(records: I) -> Result<Extraction, ExtractError>
where
    I: IntoIterator<Item = &'a LogRecord>,
{
    let mut extraction = Extraction::default();

    for (index, record) in records.into_iter().enumerate() {
        if record.key_hex.is_empty() {
            return Err(ExtractError::MissingKey { index });
        }

        match try_extract_leaf(record) {
            Ok(leaf) => extraction.leaves.push(leaf),
            Err(reason) => {
                debug!("Skipping record {}: {}", index, reason);
                *extraction.skips.entry(reason).or_insert(0) += 1;
            }
        }
    }

    Ok(extraction)
}

/// Decodes hex text with or without a preceding "0x".
fn decode_hex(text: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(text.strip_prefix("0x").unwrap_or(text))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use ethereum_types::U256;
    use hex_literal::hex;

    use super::{
        extract_leaf, extract_leaves, is_leaf_record, try_extract_leaf, ExtractError, LogRecord,
        Operation, SkipReason, ACCOUNT_TRIE_NAMESPACE,
    };
    use crate::nibbles::Nibbles;

    /// Encodes a short node `[fragment, payload]` the way the store writes
    /// them, using the reference encoder.
    fn short_node_hex(fragment: &[u8], payload: &[u8]) -> String {
        let node = rlp::encode_list::<Vec<u8>, _>(&[fragment.to_vec(), payload.to_vec()]);
        hex::encode(node)
    }

    /// An account payload with nonce 1 and balance 1000.
    fn account_payload() -> Vec<u8> {
        let mut stream = rlp::RlpStream::new_list(4);
        stream
            .append(&1_u64)
            .append(&1000_u64)
            .append(&vec![0_u8; 32])
            .append(&vec![0_u8; 32]);

        stream.out().to_vec()
    }

    fn record(key_hex: &str, value_hex: &str) -> LogRecord {
        LogRecord {
            operation: Operation::Put,
            key_hex: key_hex.to_string(),
            value_hex: Some(value_hex.to_string()),
            key_size: Some((key_hex.len() / 2) as u64),
            value_size: Some((value_hex.len() / 2) as u64),
            namespace: ACCOUNT_TRIE_NAMESPACE.to_string(),
        }
    }

    fn leaf_record() -> LogRecord {
        // Key prefix nibbles [a, b]; leaf fragment nibbles [3, 4].
        let fragment = Nibbles::from_bytes_be(&[0x34]).to_hex_prefix_encoding(true);
        record("41ab", &short_node_hex(&fragment, &account_payload()))
    }

    #[test]
    fn extracts_the_reference_leaf() {
        let leaf = try_extract_leaf(&leaf_record()).unwrap();

        assert_eq!(leaf.address_hash, Bytes::from_static(&hex!("ab34")));
        assert_eq!(leaf.nonce, U256::from(1));
        assert_eq!(leaf.balance, U256::from(1000));
        assert_eq!(leaf.path, Bytes::from_static(&hex!("ab")));
        assert_eq!(leaf.operation, Operation::Put);
    }

    #[test]
    fn hex_prefixes_on_the_input_text_are_accepted() {
        let mut rec = leaf_record();
        rec.key_hex = format!("0x{}", rec.key_hex);
        rec.value_hex = rec.value_hex.map(|v| format!("0x{v}"));

        assert!(extract_leaf(&rec).is_some());
    }

    #[test]
    fn extension_nodes_are_excluded() {
        let fragment = Nibbles::from_bytes_be(&[0x34]).to_hex_prefix_encoding(false);
        let rec = record("41ab", &short_node_hex(&fragment, &account_payload()));

        assert_eq!(try_extract_leaf(&rec), Err(SkipReason::ExtensionNode));
    }

    #[test]
    fn odd_full_paths_are_excluded() {
        // Prefix [a, b] plus a single-nibble fragment [3] comes to 3 nibbles.
        let fragment: Nibbles = [0x3_u8].into_iter().collect();
        let rec = record(
            "41ab",
            &short_node_hex(&fragment.to_hex_prefix_encoding(true), &account_payload()),
        );

        assert_eq!(try_extract_leaf(&rec), Err(SkipReason::OddPath));
    }

    #[test]
    fn foreign_namespaces_are_excluded() {
        let mut rec = leaf_record();
        rec.namespace = "PATH_STORAGE_TRIE".to_string();

        assert_eq!(try_extract_leaf(&rec), Err(SkipReason::ForeignNamespace));
    }

    #[test]
    fn foreign_key_tags_are_excluded() {
        let mut rec = leaf_record();
        rec.key_hex = format!("61{}", &rec.key_hex[2..]);

        assert_eq!(try_extract_leaf(&rec), Err(SkipReason::ForeignKeyTag));
    }

    #[test]
    fn missing_and_empty_values_are_excluded() {
        let mut rec = leaf_record();
        rec.value_hex = None;
        assert_eq!(try_extract_leaf(&rec), Err(SkipReason::MissingValue));

        rec.value_hex = Some(String::new());
        assert_eq!(try_extract_leaf(&rec), Err(SkipReason::MissingValue));
    }

    #[test]
    fn branch_nodes_are_excluded() {
        let branch = rlp::encode_list::<Vec<u8>, _>(&vec![vec![]; 17]);
        let rec = record("41ab", &hex::encode(branch));

        assert_eq!(try_extract_leaf(&rec), Err(SkipReason::NotAShortNode));
    }

    #[test]
    fn malformed_accounts_are_excluded() {
        let fragment = Nibbles::from_bytes_be(&[0x34]).to_hex_prefix_encoding(true);
        let rec = record("41ab", &short_node_hex(&fragment, b"junk payload"));

        assert_eq!(try_extract_leaf(&rec), Err(SkipReason::MalformedAccount));
    }

    #[test]
    fn leaf_membership_does_not_require_full_reconstruction() {
        assert!(is_leaf_record(&leaf_record()));

        // An odd observed path fails reconstruction but is still a leaf node.
        let fragment: Nibbles = [0x3_u8].into_iter().collect();
        let odd = record(
            "41ab",
            &short_node_hex(&fragment.to_hex_prefix_encoding(true), &account_payload()),
        );
        assert!(is_leaf_record(&odd));

        // So is a leaf whose payload is not a 4-field account.
        let fragment = Nibbles::from_bytes_be(&[0x34]).to_hex_prefix_encoding(true);
        assert!(is_leaf_record(&record(
            "41ab",
            &short_node_hex(&fragment, b"junk payload")
        )));

        // Extensions, branches and foreign namespaces are not leaves.
        let extension = Nibbles::from_bytes_be(&[0x34]).to_hex_prefix_encoding(false);
        assert!(!is_leaf_record(&record(
            "41ab",
            &short_node_hex(&extension, &account_payload())
        )));

        let branch = rlp::encode_list::<Vec<u8>, _>(&vec![vec![]; 17]);
        assert!(!is_leaf_record(&record("41ab", &hex::encode(branch))));

        let mut foreign = leaf_record();
        foreign.namespace = "PATH_STORAGE_TRIE".to_string();
        assert!(!is_leaf_record(&foreign));
    }

    #[test]
    fn one_bad_record_does_not_halt_the_sweep() {
        let bad_hex = {
            let mut rec = leaf_record();
            rec.key_hex = "zz".to_string();
            rec
        };
        let truncated = {
            let mut rec = leaf_record();
            let value = rec.value_hex.take().unwrap();
            rec.value_hex = Some(value[..value.len() - 2].to_string());
            rec
        };

        let records = vec![bad_hex, leaf_record(), truncated, leaf_record()];
        let extraction = extract_leaves(&records).unwrap();

        assert_eq!(extraction.leaves.len(), 2);
        assert_eq!(
            extraction.skips.get(&SkipReason::MalformedKeyHex),
            Some(&1)
        );
        assert_eq!(
            extraction.skips.get(&SkipReason::UndecodableValue),
            Some(&1)
        );
    }

    #[test]
    fn sweep_preserves_input_order() {
        let mut records = Vec::new();
        for prefix in [0x00_u8, 0x11, 0x22, 0x33] {
            let fragment = Nibbles::from_bytes_be(&[0x34]).to_hex_prefix_encoding(true);
            records.push(record(
                &format!("41{:02x}", prefix),
                &short_node_hex(&fragment, &account_payload()),
            ));
        }

        let extraction = extract_leaves(&records).unwrap();
        let prefixes: Vec<u8> = extraction.leaves.iter().map(|l| l.path[0]).collect();

        assert_eq!(prefixes, vec![0x00, 0x11, 0x22, 0x33]);
    }

    #[test]
    fn empty_keys_are_a_hard_error() {
        let mut rec = leaf_record();
        rec.key_hex = String::new();

        assert_eq!(
            extract_leaves(std::iter::once(&rec)),
            Err(ExtractError::MissingKey { index: 0 })
        );
    }
}
