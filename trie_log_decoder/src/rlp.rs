//! A decoder for the recursive length-prefixed value format ("RLP") that
//! trie nodes are serialized with.
//!
//! Every value is either a byte string or an ordered list of values, and
//! every value announces its own length up front, so decoding a well-formed
//! input always terminates with a finite tree bounded by the input length.
//! [`decode`] consumes a prefix of its input and reports how far it got;
//! [`decode_exact`] additionally requires that nothing is left over.
//!
//! Encodings must be canonical: every value has exactly one valid encoding,
//! and a prefix that uses a longer form than its payload needs is rejected,
//! matching the strictness of the store's own codec.

use bytes::Bytes;
use enum_as_inner::EnumAsInner;
use thiserror::Error;

/// The maximum list nesting depth [`decode`] will follow.
///
/// Trie node payloads nest at most two levels (a node list whose leaf slot
/// holds an account list); the ceiling exists so a hostile input cannot grow
/// the decoder's stack without bound.
pub const MAX_DEPTH: usize = 64;

/// A decoded length-prefixed value.
#[derive(Clone, Debug, EnumAsInner, Eq, Hash, PartialEq)]
pub enum RlpValue {
    /// A byte string.
    Bytes(Bytes),

    /// An ordered sequence of values.
    List(Vec<RlpValue>),
}

impl From<&[u8]> for RlpValue {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(Bytes::copy_from_slice(v))
    }
}

/// Errors encountered when decoding a length-prefixed value.
#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum RlpDecodeError {
    /// A value was expected but no input remained.
    #[error("Expected a value but the input was empty")]
    UnexpectedEnd,

    /// A declared payload length overruns the remaining input.
    #[error("Declared a payload of {declared} bytes but only {remaining} remain")]
    TruncatedPayload {
        /// The payload length the prefix declared.
        declared: u64,
        /// How many bytes were actually left.
        remaining: usize,
    },

    /// A length-of-length prefix overruns the remaining input.
    #[error("Declared a length field of {declared} bytes but only {remaining} remain")]
    TruncatedLength {
        /// The width of the length field the tag byte declared.
        declared: usize,
        /// How many bytes were actually left after the tag.
        remaining: usize,
    },

    /// The input uses a longer encoding than its payload requires.
    #[error("Non-canonical length prefix: {0}")]
    NonCanonical(&'static str),

    /// List payloads were nested deeper than [`MAX_DEPTH`].
    #[error("List nesting exceeded the maximum supported depth of {0}")]
    TooDeep(usize),

    /// Decoding finished with input left over.
    #[error("Decoded a value from {consumed} bytes but {trailing} trailing bytes remain")]
    TrailingBytes {
        /// How many bytes the decoded value spanned.
        consumed: usize,
        /// How many bytes were left over.
        trailing: usize,
    },
}

/// Decodes a single value from a prefix of `input`, returning the value and
/// the number of bytes consumed.
pub fn decode(input: &[u8]) -> Result<(RlpValue, usize), RlpDecodeError> {
    decode_at_depth(input, 0)
}

/// Decodes a single value spanning the entire input.
pub fn decode_exact(input: &[u8]) -> Result<RlpValue, RlpDecodeError> {
    let (value, consumed) = decode(input)?;

    match consumed == input.len() {
        true => Ok(value),
        false => Err(RlpDecodeError::TrailingBytes {
            consumed,
            trailing: input.len() - consumed,
        }),
    }
}

/// Encodes a value back into its length-prefixed form. The exact inverse of
/// [`decode_exact`] for any value [`decode_exact`] can produce.
pub fn encode(value: &RlpValue) -> Vec<u8> {
    match value {
        RlpValue::Bytes(bytes) => encode_bytes(bytes),
        RlpValue::List(items) => {
            let payload = items.iter().flat_map(encode).collect::<Vec<_>>();
            let mut out = length_prefix(payload.len(), 0xc0);
            out.extend(payload);

            out
        }
    }
}

fn decode_at_depth(input: &[u8], depth: usize) -> Result<(RlpValue, usize), RlpDecodeError> {
    if depth > MAX_DEPTH {
        return Err(RlpDecodeError::TooDeep(MAX_DEPTH));
    }

    let first = *input.first().ok_or(RlpDecodeError::UnexpectedEnd)?;

    match first {
        // A byte below the string offset is its own single-byte string.
        0x00..=0x7f => Ok((RlpValue::from(&input[..1]), 1)),
        0x80..=0xb7 => {
            let len = (first - 0x80) as u64;
            let payload = get_payload(input, 1, len)?;

            if let [b] = payload {
                if *b < 0x80 {
                    return Err(RlpDecodeError::NonCanonical(
                        "a single byte below 0x80 encodes itself",
                    ));
                }
            }

            Ok((RlpValue::from(payload), 1 + payload.len()))
        }
        0xb8..=0xbf => {
            let (len, header_len) = decode_long_length(input, first - 0xb7)?;
            let payload = get_payload(input, header_len, len)?;

            Ok((RlpValue::from(payload), header_len + payload.len()))
        }
        0xc0..=0xf7 => {
            let len = (first - 0xc0) as u64;
            let payload = get_payload(input, 1, len)?;

            Ok((
                RlpValue::List(decode_list_payload(payload, depth)?),
                1 + payload.len(),
            ))
        }
        0xf8..=0xff => {
            let (len, header_len) = decode_long_length(input, first - 0xf7)?;
            let payload = get_payload(input, header_len, len)?;

            Ok((
                RlpValue::List(decode_list_payload(payload, depth)?),
                header_len + payload.len(),
            ))
        }
    }
}

/// Reads the big-endian length field following a long string/list tag byte.
/// Returns the payload length and the total header size (tag + length field).
fn decode_long_length(input: &[u8], field_width: u8) -> Result<(u64, usize), RlpDecodeError> {
    let field_width = field_width as usize;

    if input.len() < 1 + field_width {
        return Err(RlpDecodeError::TruncatedLength {
            declared: field_width,
            remaining: input.len() - 1,
        });
    }

    if input[1] == 0 {
        return Err(RlpDecodeError::NonCanonical(
            "length field has leading zero bytes",
        ));
    }

    // `field_width` is at most 8, so this cannot overflow a u64.
    let len = input[1..1 + field_width]
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | *b as u64);

    if len <= 55 {
        return Err(RlpDecodeError::NonCanonical(
            "long form used for a short payload",
        ));
    }

    Ok((len, 1 + field_width))
}

fn get_payload(input: &[u8], offset: usize, len: u64) -> Result<&[u8], RlpDecodeError> {
    let remaining = input.len() - offset;

    if len > remaining as u64 {
        return Err(RlpDecodeError::TruncatedPayload {
            declared: len,
            remaining,
        });
    }

    Ok(&input[offset..offset + len as usize])
}

/// Decodes a list payload as a concatenation of values, consumed until the
/// declared length is exhausted.
fn decode_list_payload(payload: &[u8], depth: usize) -> Result<Vec<RlpValue>, RlpDecodeError> {
    let mut items = Vec::new();
    let mut rest = payload;

    while !rest.is_empty() {
        let (item, consumed) = decode_at_depth(rest, depth + 1)?;
        items.push(item);
        rest = &rest[consumed..];
    }

    Ok(items)
}

fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    match bytes {
        [b] if *b < 0x80 => vec![*b],
        _ => {
            let mut out = length_prefix(bytes.len(), 0x80);
            out.extend_from_slice(bytes);

            out
        }
    }
}

fn length_prefix(len: usize, offset: u8) -> Vec<u8> {
    match len {
        0..=55 => vec![offset + len as u8],
        _ => {
            let be = len.to_be_bytes();
            let skip = be.iter().take_while(|b| **b == 0).count();

            let mut out = vec![offset + 0x37 + (be.len() - skip) as u8];
            out.extend_from_slice(&be[skip..]);

            out
        }
    }
}
