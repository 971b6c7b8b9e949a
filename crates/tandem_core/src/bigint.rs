//! Neutral arbitrary-precision integer form
//!
//! `BigWords` is the hand-off representation between the guest's big
//! integers and the host's: a sign flag plus 64-bit magnitude words, least
//! significant word first.
//!
//! Invariants, upheld by every constructor:
//! - no superfluous high zero words
//! - zero is exactly `[0]` and never negative

use crate::error::BridgingFault;
use std::fmt;

const DECIMAL_CHUNK: u64 = 10_000_000_000_000_000_000;
const DECIMAL_CHUNK_DIGITS: usize = 19;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BigWords {
    negative: bool,
    words: Vec<u64>,
}

impl BigWords {
    pub fn zero() -> Self {
        Self {
            negative: false,
            words: vec![0],
        }
    }

    /// Build from raw magnitude words (least significant first), normalizing.
    pub fn from_words(negative: bool, mut words: Vec<u64>) -> Self {
        while words.len() > 1 && words.last() == Some(&0) {
            words.pop();
        }
        if words.is_empty() {
            words.push(0);
        }
        let zero = words.len() == 1 && words[0] == 0;
        Self {
            negative: negative && !zero,
            words,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        Self::from_words(value < 0, vec![value.unsigned_abs()])
    }

    pub fn from_u64(value: u64) -> Self {
        Self::from_words(false, vec![value])
    }

    /// `2^exp`, the smallest magnitude with a bit length of `exp + 1`.
    pub fn power_of_two(exp: u64) -> Self {
        let mut words = vec![0u64; (exp / 64) as usize + 1];
        if let Some(top) = words.last_mut() {
            *top = 1u64 << (exp % 64);
        }
        Self::from_words(false, words)
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn is_zero(&self) -> bool {
        self.words.len() == 1 && self.words[0] == 0
    }

    /// Magnitude words, least significant first.
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn negated(&self) -> Self {
        Self::from_words(!self.negative, self.words.clone())
    }

    /// Number of significant bits in the magnitude; zero has bit length 0.
    pub fn bit_length(&self) -> u64 {
        let top = self.words[self.words.len() - 1];
        (self.words.len() as u64 - 1) * 64 + u64::from(64 - top.leading_zeros())
    }

    pub fn to_i64(&self) -> Option<i64> {
        if self.words.len() != 1 {
            return None;
        }
        let magnitude = self.words[0];
        if self.negative {
            (magnitude <= 1u64 << 63).then(|| 0i64.wrapping_sub(magnitude as i64))
        } else {
            i64::try_from(magnitude).ok()
        }
    }

    pub fn to_u64(&self) -> Option<u64> {
        (!self.negative && self.words.len() == 1).then(|| self.words[0])
    }

    /// Export the magnitude as little-endian bytes, `ceil(bit_length / 8)` long.
    pub fn magnitude_le_bytes(&self) -> Vec<u8> {
        let len = self.bit_length().div_ceil(8) as usize;
        let mut bytes: Vec<u8> = self.words.iter().flat_map(|w| w.to_le_bytes()).collect();
        bytes.truncate(len);
        bytes
    }

    /// Repack little-endian magnitude bytes into words.
    ///
    /// `bit_length` is the magnitude's bit length as reported by the side
    /// that exported the bytes. Any disagreement between it and the buffer
    /// is a fault, never a truncation.
    pub fn from_magnitude_le_bytes(
        negative: bool,
        bytes: &[u8],
        bit_length: u64,
    ) -> Result<Self, BridgingFault> {
        let expected = bit_length.div_ceil(8) as usize;
        if bytes.len() != expected {
            return Err(BridgingFault::IntegerBuffer {
                expected,
                actual: bytes.len(),
            });
        }
        let words = bytes
            .chunks(8)
            .map(|chunk| {
                let mut buf = [0u8; 8];
                buf[..chunk.len()].copy_from_slice(chunk);
                u64::from_le_bytes(buf)
            })
            .collect();
        let value = Self::from_words(negative, words);
        if value.bit_length() != bit_length {
            return Err(BridgingFault::IntegerBuffer {
                expected,
                actual: value.bit_length().div_ceil(8) as usize,
            });
        }
        Ok(value)
    }

    /// Divide the magnitude in place by `divisor`, returning the remainder.
    fn div_rem_small(words: &mut Vec<u64>, divisor: u64) -> u64 {
        let mut rem: u128 = 0;
        for word in words.iter_mut().rev() {
            let current = (rem << 64) | u128::from(*word);
            *word = (current / u128::from(divisor)) as u64;
            rem = current % u128::from(divisor);
        }
        while words.len() > 1 && words.last() == Some(&0) {
            words.pop();
        }
        rem as u64
    }
}

impl Default for BigWords {
    fn default() -> Self {
        Self::zero()
    }
}

impl From<i64> for BigWords {
    fn from(value: i64) -> Self {
        Self::from_i64(value)
    }
}

impl From<u64> for BigWords {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl fmt::Display for BigWords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("0");
        }
        let mut magnitude = self.words.clone();
        let mut chunks = Vec::new();
        while !(magnitude.len() == 1 && magnitude[0] == 0) {
            chunks.push(Self::div_rem_small(&mut magnitude, DECIMAL_CHUNK));
        }
        if self.negative {
            f.write_str("-")?;
        }
        let mut chunks = chunks.iter().rev();
        if let Some(first) = chunks.next() {
            write!(f, "{first}")?;
        }
        for chunk in chunks {
            write!(f, "{chunk:0width$}", width = DECIMAL_CHUNK_DIGITS)?;
        }
        Ok(())
    }
}
