//! Galois/Counter Mode (GCM) for authenticated encryption
//!
//! GCM combines counter-mode encryption with the GHASH authentication
//! function to provide confidentiality and integrity for both the message
//! and associated data (AEAD), as specified in NIST SP 800-38D.
//!
//! The engine is streaming: a context is initialized per message, fed any
//! number of input chunks of any size, and finalized exactly once. Direction
//! is fixed when the context is created: [`GcmEncrypt`] emits ciphertext as
//! it goes, while [`GcmDecrypt`] accumulates ciphertext and releases
//! plaintext only from `finalize`, after the authentication tag has been
//! verified. No backend is allowed to hand back unauthenticated plaintext;
//! the tag is only known once the last byte has been seen, so decryption
//! output is withheld until then by construction.
//!
//! Several interchangeable implementations back the engine (portable,
//! hardware carry-less multiply, and two SIMD batch engines); one is chosen
//! per context by the [`impls`] dispatcher and all produce byte-identical
//! results.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::block::BlockCipher;
use crate::error::{validate, Error, Result};

mod ghash;
pub mod impls;

use ghash::Ghash;
use impls::GcmImpl;
#[cfg(target_arch = "x86_64")]
use impls::{avx, sse, Htable};

pub use impls::{
    current_implementation, describe_implementations, implementations, set_avx_chunk_size,
    set_batch_chunk_size, set_implementation,
};

/// GCM block size in bytes
pub const GCM_BLOCK_SIZE: usize = 16;

/// Maximum (and default) GCM tag size in bytes
pub const GCM_TAG_SIZE: usize = 16;

/// Tag lengths permitted by SP 800-38D as deployed here, in bytes
const ALLOWED_TAG_LENGTHS: [usize; 7] = [4, 8, 12, 13, 14, 15, 16];

/// Shared per-message state for both directions
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct GcmState<B: BlockCipher> {
    cipher: B,
    /// Initial counter block, encrypted at finalize to mask the tag
    j0: [u8; GCM_BLOCK_SIZE],
    /// Current counter block; only the low 32 bits ever change after init
    counter_block: [u8; GCM_BLOCK_SIZE],
    ghash: Ghash,
    /// Input bytes not yet forming a complete block
    remainder: [u8; GCM_BLOCK_SIZE],
    remainder_len: usize,
    /// AAD length in bytes, for the final length block
    aad_len: u64,
    /// Bytes folded into the hash so far
    processed_len: u64,
    tag_len: usize,
    #[zeroize(skip)]
    choice: GcmImpl,
    /// Subkey power table owned by the batch engines
    #[cfg(target_arch = "x86_64")]
    htable: Option<Htable>,
}

impl<B: BlockCipher> GcmState<B> {
    fn init(cipher: B, iv: &[u8], aad: &[u8], tag_len: usize) -> Result<Self> {
        validate::parameter(
            B::block_size() == GCM_BLOCK_SIZE,
            "cipher",
            "GCM requires a 128-bit block cipher",
        )?;
        validate::parameter(
            ALLOWED_TAG_LENGTHS.contains(&tag_len),
            "tag_len",
            "GCM tag length must be 4, 8, or 12..=16 bytes",
        )?;
        validate::parameter(!iv.is_empty(), "iv", "GCM IV must not be empty")?;

        let choice = impls::select(iv.len(), tag_len);

        // Subkey H is the encryption of the all-zero block
        let mut h = [0u8; GCM_BLOCK_SIZE];
        cipher.encrypt_block(&mut h)?;

        let j0 = derive_j0(&h, iv, choice)?;

        let mut ghash = Ghash::new(&h, choice.mul());
        h.zeroize();
        ghash.update(aad)?;

        #[cfg(target_arch = "x86_64")]
        let htable = match choice.htable_len() {
            0 => None,
            count => Some(Htable::new(ghash.polyval_subkey(), count)?),
        };

        Ok(Self {
            cipher,
            j0,
            counter_block: j0,
            ghash,
            remainder: [0u8; GCM_BLOCK_SIZE],
            remainder_len: 0,
            aad_len: aad.len() as u64,
            processed_len: 0,
            tag_len,
            choice,
            #[cfg(target_arch = "x86_64")]
            htable,
        })
    }

    /// Advance the 32-bit big-endian counter in the low word of the counter
    /// block, wrapping modulo 2^32. The IV-derived upper 96 bits never
    /// change. Enforcing the 2^32-blocks-per-message bound is the caller's
    /// message-size limit, not this engine's.
    pub(crate) fn increment_counter(&mut self) {
        let mut counter = u32::from_be_bytes([
            self.counter_block[12],
            self.counter_block[13],
            self.counter_block[14],
            self.counter_block[15],
        ]);
        counter = counter.wrapping_add(1);
        self.counter_block[12..16].copy_from_slice(&counter.to_be_bytes());
    }

    /// Increment the counter and encrypt it, yielding the next keystream
    /// block
    pub(crate) fn keystream_block(&mut self) -> Result<[u8; GCM_BLOCK_SIZE]> {
        self.increment_counter();
        let mut block = self.counter_block;
        self.cipher.encrypt_block(&mut block)?;
        Ok(block)
    }

    /// Encrypt one full plaintext block: keystream, XOR, fold the resulting
    /// ciphertext into the hash
    fn encrypt_block_step(&mut self, plaintext: &[u8; GCM_BLOCK_SIZE]) -> Result<[u8; GCM_BLOCK_SIZE]> {
        let keystream = self.keystream_block()?;
        let mut ciphertext = [0u8; GCM_BLOCK_SIZE];
        for i in 0..GCM_BLOCK_SIZE {
            ciphertext[i] = plaintext[i] ^ keystream[i];
        }
        self.ghash.update_block(&ciphertext, GCM_BLOCK_SIZE)?;
        self.processed_len += GCM_BLOCK_SIZE as u64;
        Ok(ciphertext)
    }

    /// Complete the held partial block from the head of `data`; returns the
    /// assembled block and how many input bytes it consumed
    fn complete_remainder(&mut self, data: &[u8]) -> Option<([u8; GCM_BLOCK_SIZE], usize)> {
        if self.remainder_len == 0 {
            return None;
        }
        let need = GCM_BLOCK_SIZE - self.remainder_len;
        let mut block = [0u8; GCM_BLOCK_SIZE];
        block[..self.remainder_len].copy_from_slice(&self.remainder[..self.remainder_len]);
        block[self.remainder_len..].copy_from_slice(&data[..need]);
        self.remainder_len = 0;
        Some((block, need))
    }

    /// Hold trailing sub-block input for the next call or for finalize
    fn stash_tail(&mut self, tail: &[u8]) {
        debug_assert!(self.remainder_len + tail.len() < GCM_BLOCK_SIZE);
        self.remainder[self.remainder_len..self.remainder_len + tail.len()].copy_from_slice(tail);
        self.remainder_len += tail.len();
    }

    /// Portable bulk encryption, one block at a time
    fn encrypt_bulk_scalar(&mut self, data: &[u8], out: &mut [u8]) -> Result<()> {
        for (src, dst) in data
            .chunks_exact(GCM_BLOCK_SIZE)
            .zip(out.chunks_exact_mut(GCM_BLOCK_SIZE))
        {
            let mut block = [0u8; GCM_BLOCK_SIZE];
            block.copy_from_slice(src);
            let ciphertext = self.encrypt_block_step(&block)?;
            dst.copy_from_slice(&ciphertext);
        }
        Ok(())
    }

    /// Portable bulk decryption in place. Each ciphertext block is folded
    /// into the hash before it is overwritten with plaintext.
    fn decrypt_bulk_scalar(&mut self, buf: &mut [u8]) -> Result<()> {
        for block in buf.chunks_exact_mut(GCM_BLOCK_SIZE) {
            self.ghash.update_block(block, GCM_BLOCK_SIZE)?;
            let keystream = self.keystream_block()?;
            for (b, k) in block.iter_mut().zip(keystream.iter()) {
                *b ^= *k;
            }
        }
        Ok(())
    }

    /// Decrypt the trailing partial ciphertext block in place, hashing it
    /// zero-padded to the full block width
    pub(crate) fn decrypt_partial_block(&mut self, tail: &mut [u8]) -> Result<()> {
        debug_assert!(tail.len() < GCM_BLOCK_SIZE);
        self.ghash.update_block(tail, tail.len())?;
        let keystream = self.keystream_block()?;
        for (b, k) in tail.iter_mut().zip(keystream.iter()) {
            *b ^= *k;
        }
        Ok(())
    }

    /// Fold block-aligned data into the hash, aggregated when this context
    /// carries a power table
    #[cfg(target_arch = "x86_64")]
    pub(crate) fn ghash_bulk(&mut self, data: &[u8]) -> Result<()> {
        match &self.htable {
            Some(table) => {
                self.ghash.update_aggregated(data, table.powers());
                Ok(())
            }
            None => self.ghash.update(data),
        }
    }

    /// Encrypt a block-aligned span for the batch engines: keystream
    /// generated into the output, one wide XOR, one aggregated hash update.
    /// Must run inside a SIMD register window.
    #[cfg(target_arch = "x86_64")]
    pub(crate) fn encrypt_span_simd(&mut self, input: &[u8], out: &mut [u8]) -> Result<()> {
        debug_assert_eq!(input.len() % GCM_BLOCK_SIZE, 0);
        for dst in out.chunks_exact_mut(GCM_BLOCK_SIZE) {
            self.increment_counter();
            dst.copy_from_slice(&self.counter_block);
            self.cipher.encrypt_block(dst)?;
        }
        impls::clmul::xor_blocks(out, input);
        self.ghash_bulk(out)?;
        self.processed_len += input.len() as u64;
        Ok(())
    }

    /// Decrypt a block-aligned span in place for the batch engines. The
    /// whole ciphertext span is hashed before any of it is overwritten.
    /// Must run inside a SIMD register window.
    #[cfg(target_arch = "x86_64")]
    pub(crate) fn decrypt_span_simd(&mut self, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(buf.len() % GCM_BLOCK_SIZE, 0);
        self.ghash_bulk(buf)?;
        for block in buf.chunks_exact_mut(GCM_BLOCK_SIZE) {
            let keystream = self.keystream_block()?;
            for (b, k) in block.iter_mut().zip(keystream.iter()) {
                *b ^= *k;
            }
        }
        Ok(())
    }

    /// Finish the hash with the length block and mask it with the encrypted
    /// initial counter block
    fn compute_tag(&mut self, data_len: u64) -> Result<[u8; GCM_TAG_SIZE]> {
        self.ghash.update_lengths(self.aad_len, data_len)?;
        let mut masked = self.j0;
        self.cipher.encrypt_block(&mut masked)?;
        let digest = self.ghash.finalize();
        let mut tag = [0u8; GCM_TAG_SIZE];
        for i in 0..GCM_TAG_SIZE {
            tag[i] = masked[i] ^ digest[i];
        }
        Ok(tag)
    }
}

/// Streaming GCM encryption context
///
/// Created per message; emits ciphertext incrementally and produces the tag
/// at finalize. The context is consumed by [`GcmEncrypt::finalize`] and
/// zeroizes its key-derived state on drop either way.
pub struct GcmEncrypt<B: BlockCipher> {
    state: GcmState<B>,
}

impl<B: BlockCipher> GcmEncrypt<B> {
    /// Initialize an encryption context.
    ///
    /// `tag_len` must be 4, 8, or 12..=16 bytes and `iv` must be non-empty;
    /// a 12-byte IV takes the fast counter-derivation path. On any error no
    /// usable context is returned.
    pub fn init(cipher: B, iv: &[u8], aad: &[u8], tag_len: usize) -> Result<Self> {
        Ok(Self {
            state: GcmState::init(cipher, iv, aad, tag_len)?,
        })
    }

    /// Number of ciphertext bytes the next [`GcmEncrypt::update`] call with
    /// `input_len` input bytes will emit
    pub fn update_output_len(&self, input_len: usize) -> usize {
        ((self.state.remainder_len + input_len) / GCM_BLOCK_SIZE) * GCM_BLOCK_SIZE
    }

    /// Number of bytes [`GcmEncrypt::finalize`] will write
    pub fn finalize_output_len(&self) -> usize {
        self.state.remainder_len + self.state.tag_len
    }

    /// Absorb a plaintext chunk of any size, writing the ciphertext
    /// produced so far into `out`. Returns the number of bytes written.
    ///
    /// Chunks must be presented in stream order; the engine cannot detect
    /// reordering. A call that does not complete a block emits nothing and
    /// holds the input for later.
    pub fn update(&mut self, plaintext: &[u8], out: &mut [u8]) -> Result<usize> {
        let emit = self.update_output_len(plaintext.len());
        validate::output_buffer("GCM encrypt update", out.len(), emit)?;

        if emit == 0 {
            self.state.stash_tail(plaintext);
            return Ok(0);
        }

        let mut written = 0;
        let mut data = plaintext;

        if let Some((block, consumed)) = self.state.complete_remainder(data) {
            let ciphertext = self.state.encrypt_block_step(&block)?;
            out[..GCM_BLOCK_SIZE].copy_from_slice(&ciphertext);
            written = GCM_BLOCK_SIZE;
            data = &data[consumed..];
        }

        let bulk_len = data.len() - data.len() % GCM_BLOCK_SIZE;
        let (bulk, tail) = data.split_at(bulk_len);
        if !bulk.is_empty() {
            let dst = &mut out[written..written + bulk_len];
            match self.state.choice {
                #[cfg(target_arch = "x86_64")]
                GcmImpl::Sse41 => sse::encrypt_bulk(&mut self.state, bulk, dst)?,
                #[cfg(target_arch = "x86_64")]
                GcmImpl::Avx => avx::encrypt_bulk(&mut self.state, bulk, dst)?,
                _ => self.state.encrypt_bulk_scalar(bulk, dst)?,
            }
            written += bulk_len;
        }

        self.state.stash_tail(tail);
        Ok(written)
    }

    /// Encrypt the held partial block, fold the length block, and write the
    /// final ciphertext bytes followed by the tag. Returns the number of
    /// bytes written. The context is consumed.
    pub fn finalize(mut self, out: &mut [u8]) -> Result<usize> {
        let needed = self.finalize_output_len();
        validate::output_buffer("GCM encrypt finalize", out.len(), needed)?;

        let remainder_len = self.state.remainder_len;
        let mut written = 0;

        if remainder_len > 0 {
            // The zero-padded full block goes into the hash; only the real
            // bytes go to the output
            let keystream = self.state.keystream_block()?;
            let mut last = [0u8; GCM_BLOCK_SIZE];
            last[..remainder_len].copy_from_slice(&self.state.remainder[..remainder_len]);
            for i in 0..remainder_len {
                last[i] ^= keystream[i];
            }
            self.state.ghash.update_block(&last, GCM_BLOCK_SIZE)?;
            self.state.processed_len += remainder_len as u64;
            out[..remainder_len].copy_from_slice(&last[..remainder_len]);
            written = remainder_len;
            self.state.remainder_len = 0;
        }

        let data_len = self.state.processed_len;
        let tag = self.state.compute_tag(data_len)?;
        let tag_len = self.state.tag_len;
        out[written..written + tag_len].copy_from_slice(&tag[..tag_len]);
        Ok(written + tag_len)
    }
}

/// Streaming GCM decryption context
///
/// Accumulates ciphertext across [`GcmDecrypt::update`] calls; decryption,
/// tag verification, and plaintext release all happen in
/// [`GcmDecrypt::finalize`], in that order. No plaintext is ever observable
/// before the tag over the entire message has checked out.
pub struct GcmDecrypt<B: BlockCipher> {
    state: GcmState<B>,
    /// All ciphertext seen so far, including the trailing tag bytes
    ct_buf: Vec<u8>,
}

impl<B: BlockCipher> GcmDecrypt<B> {
    /// Initialize a decryption context with the same parameters that
    /// produced the ciphertext
    pub fn init(cipher: B, iv: &[u8], aad: &[u8], tag_len: usize) -> Result<Self> {
        Ok(Self {
            state: GcmState::init(cipher, iv, aad, tag_len)?,
            ct_buf: Vec::new(),
        })
    }

    /// Absorb a ciphertext chunk. Never returns plaintext.
    ///
    /// On allocation failure the accumulated ciphertext is wiped and the
    /// error returned; the context is no longer usable.
    pub fn update(&mut self, ciphertext: &[u8]) -> Result<()> {
        if ciphertext.is_empty() {
            return Ok(());
        }
        if self.ct_buf.try_reserve(ciphertext.len()).is_err() {
            self.ct_buf.zeroize();
            self.ct_buf = Vec::new();
            return Err(Error::Allocation {
                context: "GCM ciphertext accumulation buffer",
            });
        }
        self.ct_buf.extend_from_slice(ciphertext);
        Ok(())
    }

    /// Length of the plaintext [`GcmDecrypt::finalize`] will release on
    /// success
    pub fn plaintext_len(&self) -> usize {
        self.ct_buf.len().saturating_sub(self.state.tag_len)
    }

    /// Decrypt the accumulated ciphertext, verify the tag, and release the
    /// plaintext into `out`, in that order. Returns the number of bytes
    /// written. The context is consumed.
    ///
    /// On tag mismatch every internal buffer is wiped, zero bytes are
    /// written to `out`, and [`Error::Authentication`] is returned.
    pub fn finalize(mut self, out: &mut [u8]) -> Result<usize> {
        let total = self.ct_buf.len();
        validate::parameter(
            total >= self.state.tag_len,
            "ciphertext",
            "accumulated ciphertext is shorter than the configured tag",
        )?;
        let pt_len = total - self.state.tag_len;
        validate::output_buffer("GCM decrypt finalize", out.len(), pt_len)?;

        // Authenticate and decrypt in place: the hash sees every ciphertext
        // block before the keystream overwrites it
        let (body, received_tag) = self.ct_buf.split_at_mut(pt_len);
        let bulk_len = pt_len - pt_len % GCM_BLOCK_SIZE;
        let (bulk, tail) = body.split_at_mut(bulk_len);
        if !bulk.is_empty() {
            match self.state.choice {
                #[cfg(target_arch = "x86_64")]
                GcmImpl::Sse41 => sse::decrypt_bulk(&mut self.state, bulk)?,
                #[cfg(target_arch = "x86_64")]
                GcmImpl::Avx => avx::decrypt_bulk(&mut self.state, bulk)?,
                _ => self.state.decrypt_bulk_scalar(bulk)?,
            }
        }
        if !tail.is_empty() {
            self.state.decrypt_partial_block(tail)?;
        }

        let tag = self.state.compute_tag(pt_len as u64)?;
        let tag_len = self.state.tag_len;
        if !bool::from(tag[..tag_len].ct_eq(received_tag)) {
            self.ct_buf.zeroize();
            return Err(Error::Authentication { algorithm: "GCM" });
        }

        out[..pt_len].copy_from_slice(&self.ct_buf[..pt_len]);
        self.ct_buf.zeroize();
        Ok(pt_len)
    }
}

impl<B: BlockCipher> Drop for GcmDecrypt<B> {
    fn drop(&mut self) {
        self.ct_buf.zeroize();
    }
}

/// One-shot GCM interface over the streaming contexts
///
/// Convenient for whole-message callers: `seal` returns ciphertext with the
/// tag appended, `open` verifies and strips it. A fresh streaming context is
/// created per call, so a `Gcm` value may be reused across messages as long
/// as every (key, IV) pair is unique.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Gcm<B: BlockCipher> {
    cipher: B,
    tag_len: usize,
}

impl<B: BlockCipher> Gcm<B> {
    /// Creates a GCM instance with the default 16-byte tag
    pub fn new(cipher: B) -> Self {
        Self {
            cipher,
            tag_len: GCM_TAG_SIZE,
        }
    }

    /// Creates a GCM instance with the specified tag length in bytes
    pub fn with_tag_len(cipher: B, tag_len: usize) -> Result<Self> {
        validate::parameter(
            ALLOWED_TAG_LENGTHS.contains(&tag_len),
            "tag_len",
            "GCM tag length must be 4, 8, or 12..=16 bytes",
        )?;
        Ok(Self { cipher, tag_len })
    }

    /// Encrypts `plaintext`, returning ciphertext with the tag appended
    pub fn seal(
        &self,
        iv: &[u8],
        associated_data: Option<&[u8]>,
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        let aad = associated_data.unwrap_or(&[]);
        let mut ctx = GcmEncrypt::init(self.cipher.clone(), iv, aad, self.tag_len)?;

        let mut out = Vec::new();
        out.try_reserve_exact(plaintext.len() + self.tag_len)
            .map_err(|_| Error::Allocation {
                context: "GCM ciphertext output",
            })?;
        out.resize(plaintext.len() + self.tag_len, 0);

        let written = ctx.update(plaintext, &mut out)?;
        let finished = ctx.finalize(&mut out[written..])?;
        out.truncate(written + finished);
        Ok(out)
    }

    /// Decrypts and verifies `ciphertext` (with trailing tag), returning
    /// the plaintext
    pub fn open(
        &self,
        iv: &[u8],
        associated_data: Option<&[u8]>,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        validate::parameter(
            ciphertext.len() >= self.tag_len,
            "ciphertext",
            "GCM ciphertext is shorter than the configured tag",
        )?;
        let aad = associated_data.unwrap_or(&[]);
        let mut ctx = GcmDecrypt::init(self.cipher.clone(), iv, aad, self.tag_len)?;
        ctx.update(ciphertext)?;

        let mut out = Vec::new();
        out.try_reserve_exact(ciphertext.len() - self.tag_len)
            .map_err(|_| Error::Allocation {
                context: "GCM plaintext output",
            })?;
        out.resize(ciphertext.len() - self.tag_len, 0);

        let written = ctx.finalize(&mut out)?;
        out.truncate(written);
        Ok(out)
    }
}

/// Derive the initial counter block from the IV.
///
/// A 12-byte IV is extended with a one-valued 32-bit counter; any other
/// length is hashed, zero-padded, followed by a `{0, bitlen(iv)}` length
/// block. Both paths must agree wherever their inputs coincide.
fn derive_j0(h: &[u8; GCM_BLOCK_SIZE], iv: &[u8], choice: GcmImpl) -> Result<[u8; GCM_BLOCK_SIZE]> {
    let mut j0 = [0u8; GCM_BLOCK_SIZE];
    if iv.len() == 12 {
        j0[..12].copy_from_slice(iv);
        j0[15] = 1;
    } else {
        let mut hasher = Ghash::new(h, choice.mul());
        hasher.update(iv)?;
        hasher.update_lengths(0, iv.len() as u64)?;
        j0 = hasher.finalize();
    }
    Ok(j0)
}

#[cfg(test)]
mod tests;
