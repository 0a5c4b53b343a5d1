// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::Hash;
use std::ops::{BitXor, BitXorAssign};

/// Extended blake3 output. The XOR of the digests of every stored `(key, value)` pair gives a
/// state digest that does not depend on the order of the writes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct HashXof<const SIZE: usize>(pub [u8; SIZE]);

impl<const SIZE: usize> HashXof<SIZE> {
    /// Neutral element of the XOR
    pub fn zero() -> Self {
        HashXof([0; SIZE])
    }

    /// Digest of a stored pair. The key length comes first so that `(ab, c)` and `(a, bc)`
    /// differ.
    pub fn compute_from_kv(key: &[u8], value: &[u8]) -> HashXof<SIZE> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(key.len() as u64).to_be_bytes());
        hasher.update(key);
        hasher.update(value);
        let mut digest = [0u8; SIZE];
        hasher.finalize_xof().fill(&mut digest);
        HashXof(digest)
    }

    /// 32 bytes root hash
    pub fn condense(&self) -> Hash {
        Hash::compute_from(&self.0)
    }
}

// only sound if every pair is added and removed exactly once
impl<const SIZE: usize> BitXorAssign for HashXof<SIZE> {
    fn bitxor_assign(&mut self, rhs: Self) {
        for (a, b) in self.0.iter_mut().zip(rhs.0.iter()) {
            *a ^= b;
        }
    }
}

impl<const SIZE: usize> BitXor for HashXof<SIZE> {
    type Output = Self;

    fn bitxor(mut self, other: Self) -> Self {
        self ^= other;
        self
    }
}

impl<const SIZE: usize> std::fmt::Debug for HashXof<SIZE> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "HashXof({})", self.condense())
    }
}
