//! GHASH authentication function for Galois/Counter Mode
//!
//! GHASH is the universal hash over GF(2^128) defined by NIST SP 800-38D.
//! The accumulator here carries the subkey `H`, the running hash value `Y`,
//! and the multiply backend the owning context selected at initialization.
//! The portable multiply is constant-time: every block operation touches the
//! full block and all conditions are evaluated with masks, not branches.
//!
//! Ordering is the caller's contract: AAD blocks first, then ciphertext
//! blocks in stream order, then exactly one length block. The accumulator
//! has no way to detect a violation.

use byteorder::{BigEndian, ByteOrder};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{validate, Result};

#[cfg(target_arch = "x86_64")]
use super::impls::clmul;

/// GHASH block size in bytes
pub(crate) const GHASH_BLOCK_SIZE: usize = 16;

/// Multiply backend for the accumulator, fixed when the context initializes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum GhashMul {
    /// Portable constant-time shift/mask multiply
    Portable,
    /// PCLMULQDQ carry-less multiply
    #[cfg(target_arch = "x86_64")]
    Clmul,
}

/// GHASH accumulator state
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct Ghash {
    /// The hash subkey H in GCM byte order
    h: [u8; GHASH_BLOCK_SIZE],
    /// H mapped into the carry-less multiply domain; all zero when unused
    hp: [u8; GHASH_BLOCK_SIZE],
    /// The running hash value Y
    y: [u8; GHASH_BLOCK_SIZE],
    #[zeroize(skip)]
    mul: GhashMul,
}

impl Ghash {
    /// Creates an accumulator over subkey `h` using the given multiply
    pub(crate) fn new(h: &[u8; GHASH_BLOCK_SIZE], mul: GhashMul) -> Self {
        let hp = match mul {
            GhashMul::Portable => [0u8; GHASH_BLOCK_SIZE],
            #[cfg(target_arch = "x86_64")]
            GhashMul::Clmul => clmul::polyval_key(h),
        };
        Self {
            h: *h,
            hp,
            y: [0u8; GHASH_BLOCK_SIZE],
            mul,
        }
    }

    /// The carry-less-multiply-domain subkey, for batch engines that
    /// precompute key powers
    #[cfg(target_arch = "x86_64")]
    pub(crate) fn polyval_subkey(&self) -> &[u8; GHASH_BLOCK_SIZE] {
        &self.hp
    }

    /// Updates the hash with input data, processing it in 16-byte blocks
    /// and zero-padding a trailing partial block.
    pub(crate) fn update(&mut self, data: &[u8]) -> Result<()> {
        let mut chunks = data.chunks_exact(GHASH_BLOCK_SIZE);
        for block in chunks.by_ref() {
            self.update_block(block, GHASH_BLOCK_SIZE)?;
        }
        let tail = chunks.remainder();
        if !tail.is_empty() {
            self.update_block(tail, tail.len())?;
        }
        Ok(())
    }

    /// Updates the hash with a single block, zero-padding to the block size
    pub(crate) fn update_block(&mut self, block: &[u8], block_len: usize) -> Result<()> {
        validate::max_length("GHASH block", block_len, GHASH_BLOCK_SIZE)?;

        let mut padded = [0u8; GHASH_BLOCK_SIZE];
        padded[..block_len].copy_from_slice(&block[..block_len]);

        for (y, b) in self.y.iter_mut().zip(padded.iter()) {
            *y ^= *b;
        }

        self.y = match self.mul {
            GhashMul::Portable => gf_multiply(&self.y, &self.h),
            #[cfg(target_arch = "x86_64")]
            GhashMul::Clmul => clmul::ghash_mul(&self.y, &self.hp),
        };

        padded.zeroize();
        Ok(())
    }

    /// Folds the 64/64-bit big-endian `{bitlen(AAD), bitlen(C)}` block in
    pub(crate) fn update_lengths(&mut self, aad_len: u64, data_len: u64) -> Result<()> {
        let mut length_block = [0u8; GHASH_BLOCK_SIZE];
        BigEndian::write_u64(&mut length_block[0..8], aad_len * 8);
        BigEndian::write_u64(&mut length_block[8..16], data_len * 8);
        self.update_block(&length_block, GHASH_BLOCK_SIZE)
    }

    /// Folds whole blocks in bulk through an aggregated carry-less multiply
    /// using precomputed subkey powers. `data` must be block-aligned.
    #[cfg(target_arch = "x86_64")]
    pub(crate) fn update_aggregated(&mut self, data: &[u8], powers: &[[u8; GHASH_BLOCK_SIZE]]) {
        debug_assert_eq!(data.len() % GHASH_BLOCK_SIZE, 0);
        clmul::ghash_blocks(&mut self.y, powers, data);
    }

    /// Returns the current hash value
    pub(crate) fn finalize(&self) -> [u8; GHASH_BLOCK_SIZE] {
        self.y
    }
}

/// Multiplication in GF(2^128) with GHASH's bit ordering convention
///
/// The least significant bit of each byte holds the highest-degree
/// coefficient; reduction uses x^128 + x^7 + x^2 + x + 1, which appears as
/// 0xE1 in the most significant byte. Constant-time with respect to both
/// operands.
fn gf_multiply(x: &[u8; 16], y: &[u8; 16]) -> [u8; 16] {
    let mut z = [0u8; 16];
    let mut v = *y;

    for xi in x.iter() {
        for bit in 0..8 {
            // 0xFF if this bit of x is set, 0x00 otherwise
            let mask = ((xi >> (7 - bit)) & 1).wrapping_neg();
            for k in 0..16 {
                z[k] ^= v[k] & mask;
            }

            // Right-shift V one bit across the block, folding the reduction
            // polynomial back in when a bit falls off the low end
            let lsb_mask = (v[15] & 1).wrapping_neg();
            let mut carry = 0u8;
            for byte in v.iter_mut() {
                let next_carry = *byte & 1;
                *byte = (*byte >> 1) | (carry << 7);
                carry = next_carry;
            }
            v[0] ^= 0xE1 & lsb_mask;
        }
    }

    z
}

#[cfg(test)]
mod tests;
