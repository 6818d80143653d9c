//! # Fingerprints
//!
//! A [`Fingerprint`] is a 128-bit accumulator. Everything that can change the
//! result of a computation is appended to it, in a fixed order, and the final
//! value is used as the key for cached results:
//!
//! ```rust
//! use weft_core::Fingerprint;
//!
//! let mut a = Fingerprint::new();
//! a.append("Blur").append(&2.5f64).append(&12i64);
//!
//! let mut b = Fingerprint::new();
//! b.append("Blur").append(&2.5f64).append(&12i64);
//!
//! assert_eq!(a, b);
//! assert_ne!(a, Fingerprint::of("Blur"));
//! ```
//!
//! Append order is part of the value: the same inputs appended in a different
//! order produce a different fingerprint. Each append also mixes in a type tag
//! and the byte length, so `("ab", "c")` and `("a", "bc")` never collide by
//! construction. The mixing is MurmurHash3 (x64, 128-bit) seeded with the
//! current state; it is fast and stable across runs and platforms, but not
//! cryptographic.

use std::fmt;
use std::str::FromStr;

use crate::error::FingerprintParseError;

const C1: u64 = 0x87c3_7b91_1142_53d5;
const C2: u64 = 0x4cf5_ad43_2745_937f;

#[repr(u8)]
#[derive(Clone, Copy)]
enum Tag {
    Bool = 1,
    Unsigned,
    Signed,
    Float,
    Str,
    Bytes,
    Sequence,
    None,
    Some,
    Fingerprint,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fingerprint {
    h1: u64,
    h2: u64,
}

impl Fingerprint {
    pub const fn new() -> Self {
        Self { h1: 0, h2: 0 }
    }

    pub const fn from_parts(h1: u64, h2: u64) -> Self {
        Self { h1, h2 }
    }

    /// Fingerprint of a single value.
    pub fn of<T: Hashable + ?Sized>(value: &T) -> Self {
        let mut h = Self::new();
        h.append(value);
        h
    }

    pub fn h1(&self) -> u64 {
        self.h1
    }

    pub fn h2(&self) -> u64 {
        self.h2
    }

    pub fn append<T: Hashable + ?Sized>(&mut self, value: &T) -> &mut Self {
        value.hash_into(self);
        self
    }

    /// Appends raw bytes. Distinct from appending a `str` with the same bytes.
    pub fn append_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.mix(Tag::Bytes, bytes);
        self
    }

    fn mix(&mut self, tag: Tag, bytes: &[u8]) {
        let mut blocks = bytes.chunks_exact(16);
        for block in &mut blocks {
            let (k1, k2) = block.split_at(8);
            self.mix_block(read_u64(k1), read_u64(k2));
        }

        let tail = blocks.remainder();
        if !tail.is_empty() {
            let mut buf = [0u8; 16];
            buf[..tail.len()].copy_from_slice(tail);
            let (k1, k2) = buf.split_at(8);
            self.h2 ^= read_u64(k2).wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
            self.h1 ^= read_u64(k1).wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
        }

        let length = bytes.len() as u64 ^ ((tag as u64) << 56);
        self.h1 ^= length;
        self.h2 ^= length;
        self.h1 = self.h1.wrapping_add(self.h2);
        self.h2 = self.h2.wrapping_add(self.h1);
        self.h1 = fmix(self.h1);
        self.h2 = fmix(self.h2);
        self.h1 = self.h1.wrapping_add(self.h2);
        self.h2 = self.h2.wrapping_add(self.h1);
    }

    fn mix_block(&mut self, k1: u64, k2: u64) {
        self.h1 ^= k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
        self.h1 = self
            .h1
            .rotate_left(27)
            .wrapping_add(self.h2)
            .wrapping_mul(5)
            .wrapping_add(0x52dc_e729);

        self.h2 ^= k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
        self.h2 = self
            .h2
            .rotate_left(31)
            .wrapping_add(self.h1)
            .wrapping_mul(5)
            .wrapping_add(0x3849_5ab5);
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

fn fmix(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.h1, self.h2)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let count = s.chars().count();
        if count != 32 {
            return Err(FingerprintParseError::InvalidLength(count));
        }
        let mut words = [0u64; 2];
        for (offset, digit) in s.chars().enumerate() {
            let value = digit
                .to_digit(16)
                .ok_or(FingerprintParseError::InvalidDigit { digit, offset })?;
            let word = &mut words[offset / 16];
            *word = (*word << 4) | u64::from(value);
        }
        Ok(Self::from_parts(words[0], words[1]))
    }
}

/// Values that can be appended to a [`Fingerprint`].
pub trait Hashable {
    fn hash_into(&self, h: &mut Fingerprint);
}

impl Hashable for bool {
    fn hash_into(&self, h: &mut Fingerprint) {
        h.mix(Tag::Bool, &[u8::from(*self)]);
    }
}

macro_rules! hashable_int {
    ($tag:expr => $($t:ty),*) => {
        $(
            impl Hashable for $t {
                fn hash_into(&self, h: &mut Fingerprint) {
                    h.mix($tag, &self.to_le_bytes());
                }
            }
        )*
    };
}

hashable_int!(Tag::Unsigned => u8, u16, u32, u64, u128);
hashable_int!(Tag::Signed => i8, i16, i32, i64, i128);

impl Hashable for usize {
    fn hash_into(&self, h: &mut Fingerprint) {
        (*self as u64).hash_into(h);
    }
}

impl Hashable for isize {
    fn hash_into(&self, h: &mut Fingerprint) {
        (*self as i64).hash_into(h);
    }
}

impl Hashable for f32 {
    fn hash_into(&self, h: &mut Fingerprint) {
        h.mix(Tag::Float, &self.to_bits().to_le_bytes());
    }
}

impl Hashable for f64 {
    fn hash_into(&self, h: &mut Fingerprint) {
        h.mix(Tag::Float, &self.to_bits().to_le_bytes());
    }
}

impl Hashable for str {
    fn hash_into(&self, h: &mut Fingerprint) {
        h.mix(Tag::Str, self.as_bytes());
    }
}

impl Hashable for String {
    fn hash_into(&self, h: &mut Fingerprint) {
        self.as_str().hash_into(h);
    }
}

impl Hashable for Fingerprint {
    fn hash_into(&self, h: &mut Fingerprint) {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&self.h1.to_le_bytes());
        bytes[8..].copy_from_slice(&self.h2.to_le_bytes());
        h.mix(Tag::Fingerprint, &bytes);
    }
}

impl<T: Hashable> Hashable for [T] {
    fn hash_into(&self, h: &mut Fingerprint) {
        h.mix(Tag::Sequence, &(self.len() as u64).to_le_bytes());
        for item in self {
            item.hash_into(h);
        }
    }
}

impl<T: Hashable> Hashable for Vec<T> {
    fn hash_into(&self, h: &mut Fingerprint) {
        self.as_slice().hash_into(h);
    }
}

impl<T: Hashable> Hashable for Option<T> {
    fn hash_into(&self, h: &mut Fingerprint) {
        match self {
            None => h.mix(Tag::None, &[]),
            Some(value) => {
                h.mix(Tag::Some, &[]);
                value.hash_into(h);
            }
        }
    }
}

impl<T: Hashable + ?Sized> Hashable for &T {
    fn hash_into(&self, h: &mut Fingerprint) {
        (**self).hash_into(h);
    }
}

impl<A: Hashable, B: Hashable> Hashable for (A, B) {
    fn hash_into(&self, h: &mut Fingerprint) {
        self.0.hash_into(h);
        self.1.hash_into(h);
    }
}

impl<A: Hashable, B: Hashable, C: Hashable> Hashable for (A, B, C) {
    fn hash_into(&self, h: &mut Fingerprint) {
        self.0.hash_into(h);
        self.1.hash_into(h);
        self.2.hash_into(h);
    }
}
