//! Reconstruction of account records from a captured trie operation log.
//!
//! A Merkle-Patricia-Trie-backed key-value store persists each trie node
//! under a namespaced storage key. Given a flat log of the store's GET / PUT
//! / DELETE operations, this crate picks out the account-trie "short" nodes
//! (two-element nodes holding a compact-encoded key fragment and a payload),
//! rebuilds each leaf's full address hash from its storage-key prefix plus
//! its key fragment, and decodes the 4-field account record stored at the
//! leaf.
//!
//! The crate is organized bottom-up:
//! - [`rlp`] decodes the recursive length-prefixed value format nodes are
//!   serialized with.
//! - [`nibbles`] handles nibble paths and the compact ("hex prefix") key
//!   encoding.
//! - [`node`] classifies decoded values by structural shape.
//! - [`account`] decodes leaf payloads into account records.
//! - [`extract`] ties the stages together into a per-record pipeline that
//!   skips (and counts) records that do not decode, instead of aborting.

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]
#![deny(missing_docs)]

pub mod account;
pub mod extract;
pub mod nibbles;
pub mod node;
pub mod rlp;

pub(crate) mod utils;
