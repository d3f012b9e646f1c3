//! Decoding of the 4-field account record stored at account-trie leaves.

use ethereum_types::{H256, U256};
use thiserror::Error;

use crate::rlp::{self, RlpDecodeError, RlpValue};

/// An account record as stored at a leaf: nonce, balance, storage trie root
/// and code hash, in that order.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Account {
    /// Transaction count of the account.
    pub nonce: U256,

    /// Balance in wei. Real balances routinely exceed 64 bits.
    pub balance: U256,

    /// Root hash of the account's storage trie.
    pub storage_root: H256,

    /// Hash of the account's bytecode.
    pub code_hash: H256,
}

/// Errors encountered when decoding an account payload. All of these are
/// record-local: the payload simply wasn't an account record.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum AccountDecodeError {
    /// The payload is not a well-formed length-prefixed value.
    #[error(transparent)]
    Rlp(#[from] RlpDecodeError),

    /// The payload decoded to a byte string instead of a field list.
    #[error("Account payload decoded to a byte string, not a list")]
    NotAList,

    /// The payload is a list of the wrong arity.
    #[error("Account payload is a list of {0} elements, expected 4")]
    WrongFieldCount(usize),

    /// A field that must be a byte string is a nested list.
    #[error("Account field `{0}` is a nested list, expected a byte string")]
    NestedField(&'static str),

    /// An integer field is wider than 256 bits.
    #[error("Account field `{0}` is {1} bytes wide, expected at most 32")]
    IntegerTooWide(&'static str, usize),

    /// A hash field is not exactly 32 bytes.
    #[error("Account field `{0}` is {1} bytes long, expected exactly 32")]
    BadHashLength(&'static str, usize),
}

/// Decodes an account record from a leaf payload.
///
/// Integer fields are big-endian with no fixed width; an *empty* byte string
/// is how the encoding writes zero, never an error.
pub fn decode_account(payload: &[u8]) -> Result<Account, AccountDecodeError> {
    let RlpValue::List(fields) = rlp::decode_exact(payload)? else {
        return Err(AccountDecodeError::NotAList);
    };

    let [nonce, balance, storage_root, code_hash] = fields.as_slice() else {
        return Err(AccountDecodeError::WrongFieldCount(fields.len()));
    };

    Ok(Account {
        nonce: decode_uint("nonce", nonce)?,
        balance: decode_uint("balance", balance)?,
        storage_root: decode_hash("storage_root", storage_root)?,
        code_hash: decode_hash("code_hash", code_hash)?,
    })
}

fn decode_uint(field: &'static str, value: &RlpValue) -> Result<U256, AccountDecodeError> {
    let bytes = value
        .as_bytes()
        .ok_or(AccountDecodeError::NestedField(field))?;

    if bytes.len() > 32 {
        return Err(AccountDecodeError::IntegerTooWide(field, bytes.len()));
    }

    Ok(U256::from_big_endian(bytes))
}

fn decode_hash(field: &'static str, value: &RlpValue) -> Result<H256, AccountDecodeError> {
    let bytes = value
        .as_bytes()
        .ok_or(AccountDecodeError::NestedField(field))?;

    match bytes.len() {
        32 => Ok(H256::from_slice(bytes)),
        len => Err(AccountDecodeError::BadHashLength(field, len)),
    }
}
