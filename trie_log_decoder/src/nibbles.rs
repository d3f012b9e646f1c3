//! Define [`Nibbles`] and how to convert bytes and hex prefix encodings into
//! nibbles.

use std::fmt::{self, Debug, Display, LowerHex};

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::utils::is_even;

/// A `Nibble` has 4 bits and is stored as `u8`.
pub type Nibble = u8;

const SINGLE_NIBBLE_APPEND_ASSERT_ERR_MSG: &str =
    "Attempted to append a single nibble that was greater than 15!";

/// An ordered sequence of nibbles.
///
/// Unlike a byte sequence, a `Nibbles` may have odd length: a short node's
/// own key fragment routinely does. Only a *complete* path (storage-key
/// prefix plus fragment) must come out even, which is what
/// [`Nibbles::try_into_bytes_be`] enforces.
#[derive(Clone, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Nibbles(Vec<Nibble>);

impl Debug for Nibbles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Nibbles")
            .field("count", &self.len())
            .field("nibbles", &format!("{self:x}"))
            .finish()
    }
}

impl Display for Nibbles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // By default, just use lower hex.
        <Self as LowerHex>::fmt(self, f)
    }
}

impl LowerHex for Nibbles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for nibble in &self.0 {
            write!(f, "{nibble:x}")?;
        }

        Ok(())
    }
}

impl FromIterator<Nibble> for Nibbles {
    fn from_iter<T: IntoIterator<Item = Nibble>>(iter: T) -> Self {
        let mut nibbles = Self::default();
        for nibble in iter {
            nibbles.push_nibble_back(nibble);
        }

        nibbles
    }
}

impl Nibbles {
    /// Creates `Nibbles` from big endian bytes, each byte contributing its
    /// high nibble then its low nibble.
    pub fn from_bytes_be(bytes: &[u8]) -> Self {
        Self(bytes.iter().flat_map(|b| [b >> 4, b & 0x0f]).collect())
    }

    /// The number of nibbles in the sequence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether or not this `Nibbles` contains actual nibbles.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the nibbles front to back.
    pub fn iter(&self) -> impl Iterator<Item = Nibble> + '_ {
        self.0.iter().copied()
    }

    /// Pushes a nibble to the back.
    ///
    /// # Panics
    /// Panics if the nibble is > `0xf`.
    pub fn push_nibble_back(&mut self, n: Nibble) {
        assert!(n < 16, "{}", SINGLE_NIBBLE_APPEND_ASSERT_ERR_MSG);
        self.0.push(n);
    }

    /// Merge two `Nibbles` together. `self` will be the prefix.
    pub fn merge_nibbles(&self, post: &Nibbles) -> Nibbles {
        Self(self.0.iter().chain(post.0.iter()).copied().collect())
    }

    /// Packs the sequence into bytes, two nibbles per byte with the first
    /// nibble in the high bits.
    ///
    /// Returns `None` when the sequence has odd length; an odd sequence is a
    /// legitimate intermediate state but can never be a complete address.
    pub fn try_into_bytes_be(&self) -> Option<Vec<u8>> {
        match is_even(self.0.len()) {
            false => None,
            true => Some(
                self.0
                    .chunks_exact(2)
                    .map(|pair| (pair[0] << 4) | pair[1])
                    .collect(),
            ),
        }
    }

    /// Converts a hex prefix byte string (AKA "compact") into `Nibbles` plus
    /// the node's leaf flag.
    ///
    /// The first byte's high nibble carries two flag bits which must be read
    /// together: bit `0b10` marks a leaf and bit `0b01` marks an odd-length
    /// path whose first nibble sits in that byte's low nibble (for even
    /// paths the low nibble is padding). Empty input decodes to an empty,
    /// non-leaf path. Operation logs carry heterogeneous node shapes, so the
    /// two unused flag bits are ignored rather than rejected.
    pub fn from_hex_prefix_encoding(hex_prefix_bytes: &[u8]) -> (Self, bool) {
        let Some((&first, rest)) = hex_prefix_bytes.split_first() else {
            return (Self::default(), false);
        };

        let flags = first >> 4;
        let is_leaf = flags & 0b10 != 0;

        let mut nibbles = Vec::with_capacity(hex_prefix_bytes.len() * 2);
        if flags & 0b01 != 0 {
            nibbles.push(first & 0x0f);
        }

        for byte in rest {
            nibbles.push(byte >> 4);
            nibbles.push(byte & 0x0f);
        }

        (Self(nibbles), is_leaf)
    }

    /// Converts [`Nibbles`] to hex prefix encoding (AKA "compact").
    ///
    /// The exact inverse of [`Nibbles::from_hex_prefix_encoding`]:
    /// `from_hex_prefix_encoding(&p.to_hex_prefix_encoding(f)) == (p, f)`
    /// for every path `p` and flag `f`.
    pub fn to_hex_prefix_encoding(&self, is_leaf: bool) -> Bytes {
        let odd_bit: u8 = match is_even(self.0.len()) {
            false => 1,
            true => 0,
        };

        let term_bit: u8 = match is_leaf {
            false => 0,
            true => 1,
        };

        let flags = (odd_bit | (term_bit << 1)) << 4;

        // For an odd path the first nibble shares the flag byte; the rest
        // packs two to a byte either way.
        let (flag_nibble, body) = match self.0.split_first() {
            Some((&head, tail)) if odd_bit == 1 => (head, tail),
            _ => (0, self.0.as_slice()),
        };

        let mut out = BytesMut::with_capacity(1 + body.len() / 2);
        out.put_u8(flags | flag_nibble);
        for pair in body.chunks_exact(2) {
            out.put_u8((pair[0] << 4) | pair[1]);
        }

        out.freeze()
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use rand::Rng;

    use super::Nibbles;

    fn nibbles(nibbles: &[u8]) -> Nibbles {
        nibbles.iter().copied().collect()
    }

    #[test]
    fn from_bytes_be_works() {
        assert_eq!(Nibbles::from_bytes_be(&[]), Nibbles::default());
        assert_eq!(Nibbles::from_bytes_be(&[0xab]), nibbles(&[0xa, 0xb]));
        assert_eq!(
            Nibbles::from_bytes_be(&hex!("12ef")),
            nibbles(&[0x1, 0x2, 0xe, 0xf])
        );
    }

    #[test]
    fn try_into_bytes_be_works() {
        assert_eq!(Nibbles::default().try_into_bytes_be(), Some(vec![]));
        assert_eq!(
            nibbles(&[0xa, 0xb, 0x3, 0x4]).try_into_bytes_be(),
            Some(vec![0xab, 0x34])
        );
    }

    #[test]
    fn odd_length_paths_do_not_pack() {
        assert_eq!(nibbles(&[0x1]).try_into_bytes_be(), None);
        assert_eq!(nibbles(&[0x1, 0x2, 0x3]).try_into_bytes_be(), None);
    }

    #[test]
    fn merge_nibbles_works() {
        assert_eq!(
            nibbles(&[0x1, 0x2]).merge_nibbles(&nibbles(&[0x3])),
            nibbles(&[0x1, 0x2, 0x3])
        );
        assert_eq!(
            Nibbles::default().merge_nibbles(&nibbles(&[0x3])),
            nibbles(&[0x3])
        );
        assert_eq!(
            nibbles(&[0x1]).merge_nibbles(&Nibbles::default()),
            nibbles(&[0x1])
        );
    }

    #[test]
    #[should_panic]
    fn push_nibble_back_panics_when_not_nibble() {
        nibbles(&[0x10]);
    }

    #[test]
    fn to_hex_prefix_encoding_matches_reference_vectors() {
        assert_eq!(
            &nibbles(&[1, 2, 3, 4, 5]).to_hex_prefix_encoding(false)[..],
            hex!("112345")
        );
        assert_eq!(
            &nibbles(&[1, 2, 3, 4, 5]).to_hex_prefix_encoding(true)[..],
            hex!("312345")
        );
        assert_eq!(
            &nibbles(&[0, 1, 2, 3, 4, 5]).to_hex_prefix_encoding(false)[..],
            hex!("00012345")
        );
        assert_eq!(
            &nibbles(&[0, 1, 2, 3, 4, 5]).to_hex_prefix_encoding(true)[..],
            hex!("20012345")
        );
        assert_eq!(
            &nibbles(&[1, 2, 3, 4]).to_hex_prefix_encoding(false)[..],
            hex!("001234")
        );
        assert_eq!(
            &nibbles(&[1, 2, 3, 4]).to_hex_prefix_encoding(true)[..],
            hex!("201234")
        );
    }

    #[test]
    fn from_hex_prefix_encoding_works() {
        assert_eq!(
            Nibbles::from_hex_prefix_encoding(&hex!("112345")),
            (nibbles(&[1, 2, 3, 4, 5]), false)
        );
        assert_eq!(
            Nibbles::from_hex_prefix_encoding(&hex!("312345")),
            (nibbles(&[1, 2, 3, 4, 5]), true)
        );
        assert_eq!(
            Nibbles::from_hex_prefix_encoding(&hex!("001234")),
            (nibbles(&[1, 2, 3, 4]), false)
        );
        assert_eq!(
            Nibbles::from_hex_prefix_encoding(&hex!("201234")),
            (nibbles(&[1, 2, 3, 4]), true)
        );
    }

    #[test]
    fn from_hex_prefix_encoding_of_empty_input_is_an_empty_extension() {
        assert_eq!(
            Nibbles::from_hex_prefix_encoding(&[]),
            (Nibbles::default(), false)
        );
    }

    #[test]
    fn from_hex_prefix_encoding_ignores_unused_flag_bits() {
        // High nibble 0x4: neither the leaf nor the odd bit is set.
        assert_eq!(
            Nibbles::from_hex_prefix_encoding(&hex!("4123")),
            (nibbles(&[0x2, 0x3]), false)
        );
        // High nibble 0xf: both known bits set, upper bits ignored.
        assert_eq!(
            Nibbles::from_hex_prefix_encoding(&hex!("f123")),
            (nibbles(&[0x1, 0x2, 0x3]), true)
        );
    }

    #[test]
    fn hex_prefix_encoding_round_trips() {
        let mut rng = rand::thread_rng();

        for _ in 0..500 {
            let count = rng.gen_range(0..64);
            let path: Nibbles = (0..count).map(|_| rng.gen_range(0..16)).collect();

            for is_leaf in [false, true] {
                let encoded = path.to_hex_prefix_encoding(is_leaf);
                assert_eq!(
                    Nibbles::from_hex_prefix_encoding(&encoded),
                    (path.clone(), is_leaf),
                    "round trip failed for {path} (is_leaf: {is_leaf})"
                );
            }
        }
    }

    #[test]
    fn display_is_lower_hex() {
        assert_eq!(format!("{}", Nibbles::default()), "0x");
        assert_eq!(format!("{}", nibbles(&[0xa, 0xb, 0x3])), "0xab3");
    }
}
