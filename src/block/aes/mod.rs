//! AES block cipher (encryption direction)
//!
//! Implements the Advanced Encryption Standard (FIPS 197) forward cipher for
//! 128-, 192- and 256-bit keys. Only encryption is provided; every consumer
//! in this crate runs the cipher in counter mode or derives subkeys, neither
//! of which needs the inverse cipher.
//!
//! ## Constant-Time Guarantees
//!
//! - The S-box is computed from GF(2^8) inversion with branchless
//!   arithmetic, never looked up in a table
//! - All conditional reductions use masks rather than branches
//! - Round keys live in zeroizing storage and are wiped on drop

use core::sync::atomic::{compiler_fence, Ordering};

use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{BlockCipher, CipherAlgorithm};
use crate::error::{validate, Result};
use crate::types::SecretBytes;

/// AES block size in bytes, common to all key sizes
pub const AES_BLOCK_SIZE: usize = 16;

/// Round constants for key expansion
const RCON: [u32; 11] = [
    0x0000_0000,
    0x0100_0000,
    0x0200_0000,
    0x0400_0000,
    0x0800_0000,
    0x1000_0000,
    0x2000_0000,
    0x4000_0000,
    0x8000_0000,
    0x1b00_0000,
    0x3600_0000,
];

/// Multiply two bytes in GF(2^8) with the AES reduction polynomial
#[inline(always)]
fn gf_mul(mut a: u8, mut b: u8) -> u8 {
    let mut p = 0u8;
    for _ in 0..8 {
        let mask = (b & 1).wrapping_neg();
        p ^= a & mask;
        let hi = (a >> 7).wrapping_neg();
        a = (a << 1) ^ (hi & 0x1b);
        b >>= 1;
    }
    p
}

/// Invert a byte in GF(2^8) by raising it to the 254th power
///
/// The full exponentiation runs for every input, including zero; the result
/// is masked to zero afterwards so the zero case costs the same.
#[inline(always)]
fn gf_inv(x: u8) -> u8 {
    let x2 = gf_mul(x, x);
    let x4 = gf_mul(x2, x2);
    let x8 = gf_mul(x4, x4);
    let x16 = gf_mul(x8, x8);
    let x32 = gf_mul(x16, x16);
    let x64 = gf_mul(x32, x32);
    let x128 = gf_mul(x64, x64);

    let mut y = gf_mul(x128, x64);
    y = gf_mul(y, x32);
    y = gf_mul(y, x16);
    y = gf_mul(y, x8);
    y = gf_mul(y, x4);
    y = gf_mul(y, x2);

    let nonzero = ((x | x.wrapping_neg()) >> 7).wrapping_neg();
    y & nonzero
}

/// The AES S-box: inversion followed by the affine transform
#[inline(always)]
fn sbox(x: u8) -> u8 {
    let i = gf_inv(x);
    i ^ i.rotate_left(1) ^ i.rotate_left(2) ^ i.rotate_left(3) ^ i.rotate_left(4) ^ 0x63
}

#[inline(always)]
fn word_from_bytes(bytes: &[u8]) -> u32 {
    ((bytes[0] as u32) << 24) | ((bytes[1] as u32) << 16) | ((bytes[2] as u32) << 8) | bytes[3] as u32
}

/// Apply the S-box to each byte of a key-schedule word
#[inline(always)]
fn sub_word(word: u32) -> u32 {
    ((sbox((word >> 24) as u8) as u32) << 24)
        | ((sbox((word >> 16) as u8) as u32) << 16)
        | ((sbox((word >> 8) as u8) as u32) << 8)
        | sbox(word as u8) as u32
}

/// Expand a key into NK-word-keyed schedule of `4 * (rounds + 1)` words
///
/// The caller provides the output slice sized for its round count; words are
/// written as bytes in big-endian column order so the round function can
/// consume them directly.
fn expand_key<const NK: usize>(key: &[u8], schedule: &mut [u8]) {
    debug_assert_eq!(key.len(), NK * 4);
    debug_assert_eq!(schedule.len() % 16, 0);

    let total_words = schedule.len() / 4;
    let mut words = [0u32; 60];
    let words = &mut words[..total_words];

    for (i, word) in words.iter_mut().enumerate().take(NK) {
        *word = word_from_bytes(&key[i * 4..(i + 1) * 4]);
    }

    for i in NK..total_words {
        let mut temp = words[i - 1];
        if i % NK == 0 {
            temp = sub_word(temp.rotate_left(8)) ^ RCON[i / NK];
        } else if NK == 8 && i % NK == 4 {
            // AES-256 applies SubWord without the rotation mid-schedule
            temp = sub_word(temp);
        }
        words[i] = words[i - NK] ^ temp;
    }

    for (i, word) in words.iter().enumerate() {
        schedule[i * 4..(i + 1) * 4].copy_from_slice(&word.to_be_bytes());
    }

    words.zeroize();
}

/// SubBytes over the whole state
fn sub_bytes(state: &mut [u8; 16]) {
    for byte in state.iter_mut() {
        *byte = sbox(*byte);
    }
    compiler_fence(Ordering::SeqCst);
}

/// ShiftRows on the column-major state: row r rotates left by r
fn shift_rows(state: &mut [u8; 16]) {
    let t = *state;
    state[1] = t[5];
    state[5] = t[9];
    state[9] = t[13];
    state[13] = t[1];
    state[2] = t[10];
    state[6] = t[14];
    state[10] = t[2];
    state[14] = t[6];
    state[3] = t[15];
    state[7] = t[3];
    state[11] = t[7];
    state[15] = t[11];
}

/// Double a byte in GF(2^8)
#[inline(always)]
fn xtime(byte: u8) -> u8 {
    (byte << 1) ^ (((byte >> 7).wrapping_neg()) & 0x1b)
}

/// MixColumns over the four state columns
fn mix_columns(state: &mut [u8; 16]) {
    for col in state.chunks_exact_mut(4) {
        let (s0, s1, s2, s3) = (col[0], col[1], col[2], col[3]);
        let all = s0 ^ s1 ^ s2 ^ s3;
        col[0] = s0 ^ all ^ xtime(s0 ^ s1);
        col[1] = s1 ^ all ^ xtime(s1 ^ s2);
        col[2] = s2 ^ all ^ xtime(s2 ^ s3);
        col[3] = s3 ^ all ^ xtime(s3 ^ s0);
    }
}

#[inline(always)]
fn add_round_key(state: &mut [u8; 16], round_key: &[u8]) {
    for (s, k) in state.iter_mut().zip(round_key.iter()) {
        *s ^= *k;
    }
}

/// Run the forward cipher over one block with the given expanded schedule
fn encrypt_with_schedule(schedule: &[u8], rounds: usize, block: &mut [u8]) -> Result<()> {
    validate::length("AES block", block.len(), AES_BLOCK_SIZE)?;

    let mut state = [0u8; 16];
    state.copy_from_slice(block);

    add_round_key(&mut state, &schedule[..16]);

    for round in 1..rounds {
        sub_bytes(&mut state);
        shift_rows(&mut state);
        mix_columns(&mut state);
        add_round_key(&mut state, &schedule[round * 16..(round + 1) * 16]);
    }

    sub_bytes(&mut state);
    shift_rows(&mut state);
    add_round_key(&mut state, &schedule[rounds * 16..(rounds + 1) * 16]);

    block.copy_from_slice(&state);
    state.zeroize();
    Ok(())
}

macro_rules! define_aes_variant {
    (
        $(#[$doc:meta])*
        $name:ident, $algo:ident, $algo_name:expr,
        key_size = $key_size:expr, nk = $nk:expr, rounds = $rounds:expr
    ) => {
        /// Type-level constants for this AES variant
        pub enum $algo {}

        impl CipherAlgorithm for $algo {
            const KEY_SIZE: usize = $key_size;
            const BLOCK_SIZE: usize = AES_BLOCK_SIZE;

            fn name() -> &'static str {
                $algo_name
            }
        }

        $(#[$doc])*
        #[derive(Clone, Zeroize, ZeroizeOnDrop)]
        pub struct $name {
            schedule: SecretBytes<{ ($rounds + 1) * 16 }>,
        }

        impl BlockCipher for $name {
            type Algorithm = $algo;
            type Key = SecretBytes<{ $key_size }>;

            fn new(key: &Self::Key) -> Self {
                let mut schedule = SecretBytes::zeroed();
                expand_key::<{ $nk }>(key.as_ref(), schedule.as_mut());
                Self { schedule }
            }

            fn encrypt_block(&self, block: &mut [u8]) -> Result<()> {
                encrypt_with_schedule(self.schedule.as_ref(), $rounds, block)
            }

            fn generate_key<R: RngCore + CryptoRng>(rng: &mut R) -> Self::Key {
                SecretBytes::random(rng)
            }
        }
    };
}

define_aes_variant!(
    /// AES-128 block cipher (10 rounds)
    Aes128,
    Aes128Algorithm,
    "AES-128",
    key_size = 16,
    nk = 4,
    rounds = 10
);

define_aes_variant!(
    /// AES-192 block cipher (12 rounds)
    Aes192,
    Aes192Algorithm,
    "AES-192",
    key_size = 24,
    nk = 6,
    rounds = 12
);

define_aes_variant!(
    /// AES-256 block cipher (14 rounds)
    Aes256,
    Aes256Algorithm,
    "AES-256",
    key_size = 32,
    nk = 8,
    rounds = 14
);
