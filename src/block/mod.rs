//! Block cipher implementations
//!
//! This module defines the block cipher seam the authenticated-encryption
//! engine is built on. The engine only ever drives a cipher in the forward
//! direction (counter-mode keystream and subkey derivation), so the trait
//! exposes encryption alone.

use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

use crate::error::Result;

pub mod aes;

// Re-exports
pub use aes::{Aes128, Aes192, Aes256};

/// Marker trait for cipher algorithms with compile-time properties
pub trait CipherAlgorithm {
    /// Key size in bytes
    const KEY_SIZE: usize;

    /// Block size in bytes
    const BLOCK_SIZE: usize;

    /// Algorithm name
    fn name() -> &'static str;
}

/// Trait for block ciphers providing the forward permutation
pub trait BlockCipher: Clone + Zeroize {
    /// The algorithm this cipher implements
    type Algorithm: CipherAlgorithm;

    /// Key type with appropriate size guarantee
    type Key: AsRef<[u8]> + AsMut<[u8]> + Clone + Zeroize;

    /// Creates a new block cipher instance with the given key
    fn new(key: &Self::Key) -> Self;

    /// Encrypts a single block in place
    fn encrypt_block(&self, block: &mut [u8]) -> Result<()>;

    /// Returns the key size in bytes
    fn key_size() -> usize {
        Self::Algorithm::KEY_SIZE
    }

    /// Returns the block size in bytes
    fn block_size() -> usize {
        Self::Algorithm::BLOCK_SIZE
    }

    /// Returns the name of the block cipher
    fn name() -> &'static str {
        Self::Algorithm::name()
    }

    /// Generate a random key
    fn generate_key<R: RngCore + CryptoRng>(rng: &mut R) -> Self::Key;
}
