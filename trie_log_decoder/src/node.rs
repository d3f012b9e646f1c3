//! Structural classification of decoded trie node values.

use std::fmt::{self, Display};

use bytes::Bytes;

use crate::rlp::RlpValue;

/// The structural shape of a decoded store value, as far as leaf extraction
/// is concerned.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum NodeShape {
    /// A two-element short node: a compact-encoded key fragment plus a
    /// payload. Whether it is a leaf or an extension is decided by the
    /// fragment's flag nibble, not here.
    Short {
        /// The compact-encoded key fragment.
        key_fragment: Bytes,

        /// The node payload; an encoded account record when the node turns
        /// out to be an account leaf.
        payload: Bytes,
    },

    /// Any other shape: branch nodes, bare byte strings, lists of the wrong
    /// arity, or lists with nested-list elements.
    Other,
}

impl Display for NodeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeShape::Short { .. } => "Short",
            NodeShape::Other => "Other",
        };

        write!(f, "{}", s)
    }
}

/// Classifies a decoded value by structural shape.
///
/// Only [`NodeShape::Short`] nodes can carry account leaves; everything else
/// is a legitimate trie shape this pipeline has no use for.
pub fn classify(value: &RlpValue) -> NodeShape {
    match value {
        RlpValue::List(items) => match items.as_slice() {
            [RlpValue::Bytes(key_fragment), RlpValue::Bytes(payload)] => NodeShape::Short {
                key_fragment: key_fragment.clone(),
                payload: payload.clone(),
            },
            _ => NodeShape::Other,
        },
        RlpValue::Bytes(_) => NodeShape::Other,
    }
}
