//! Variable-length base-N stream codec.
//!
//! Each output integer is spelled as a run of alphabet digits. A digit whose alphabet index is
//! below `base` terminates the number; any other digit contributes `(idx mod base) + base` at the
//! current multiplier and continues it, with the multiplier growing by `alphabet.len() - base`.

use crate::error::Fault;
use crate::util::fast_map::{FastHashMap, fast_hash_map_with_capacity};

/// Validated digit alphabet plus terminator base.
#[derive(Debug, Clone)]
pub struct Alphabet {
    digits: Vec<char>,
    index: FastHashMap<char, usize>,
    base: usize,
}

impl Alphabet {
    /// Alphabet lengths are counted in characters; the reference alphabet is not pure ASCII.
    pub fn new(alphabet: &str, base: usize) -> Result<Self, Fault> {
        let digits: Vec<char> = alphabet.chars().collect();
        if base == 0 || base >= digits.len() {
            return Err(Fault::decode(
                0,
                format!("base {} must be in 1..{} for this alphabet", base, digits.len()),
            ));
        }
        let mut index = fast_hash_map_with_capacity(digits.len());
        for (i, ch) in digits.iter().enumerate() {
            if index.insert(*ch, i).is_some() {
                return Err(Fault::decode(i, format!("duplicate alphabet character {:?}", ch)));
            }
        }
        Ok(Self { digits, index, base })
    }

    #[inline]
    pub fn base(&self) -> usize {
        self.base
    }

    #[inline]
    pub fn radix(&self) -> usize {
        self.digits.len() - self.base
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.digits.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }

    /// Unpacks `encoded` into a flat integer sequence.
    pub fn decode(&self, encoded: &str) -> Result<Vec<i32>, Fault> {
        let base = self.base as i64;
        let radix = self.radix() as i64;
        let mut out = Vec::with_capacity(encoded.len() / 2);
        let mut chars = encoded.chars().enumerate().peekable();
        while chars.peek().is_some() {
            let mut value: i64 = 0;
            let mut multiplier: i64 = 1;
            loop {
                let Some((position, ch)) = chars.next() else {
                    return Err(Fault::decode(
                        encoded.chars().count(),
                        "input ended inside a continued number",
                    ));
                };
                let idx = *self
                    .index
                    .get(&ch)
                    .ok_or_else(|| Fault::decode(position, format!("character {:?} not in alphabet", ch)))?
                    as i64;
                value = value.wrapping_add(multiplier.wrapping_mul(idx % base));
                if idx < base {
                    out.push(value as i32);
                    break;
                }
                value = value.wrapping_add(base.wrapping_mul(multiplier));
                multiplier = multiplier.wrapping_mul(radix);
            }
        }
        Ok(out)
    }

    /// Inverse of [`Alphabet::decode`].
    ///
    /// Negative values are spelled through their unsigned 32-bit pattern and decode back to the
    /// same `i32`. Only alphabets whose continuation radix does not exceed `base` can express
    /// every value, so other shapes are rejected.
    pub fn encode(&self, values: &[i32]) -> Result<String, Fault> {
        let base = self.base as u64;
        let radix = self.radix() as u64;
        if radix > base {
            return Err(Fault::decode(
                0,
                format!("cannot encode with radix {} above base {}", radix, base),
            ));
        }
        let mut out = String::with_capacity(values.len() * 2);
        for &value in values {
            let mut rest = value as u32 as u64;
            loop {
                if rest < base {
                    out.push(self.digits[rest as usize]);
                    break;
                }
                rest -= base;
                let digit = rest % radix;
                out.push(self.digits[(base + digit) as usize]);
                rest /= radix;
            }
        }
        Ok(out)
    }
}

/// Decodes `encoded` with a one-off alphabet; see [`Alphabet::decode`].
pub fn decode(encoded: &str, alphabet: &str, base: usize) -> Result<Vec<i32>, Fault> {
    Alphabet::new(alphabet, base)?.decode(encoded)
}

/// Encodes `values` with a one-off alphabet; see [`Alphabet::encode`].
pub fn encode(values: &[i32], alphabet: &str, base: usize) -> Result<String, Fault> {
    Alphabet::new(alphabet, base)?.encode(values)
}
