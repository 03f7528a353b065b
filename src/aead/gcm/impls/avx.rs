//! AVX batch engine
//!
//! Follows the shape of the OpenSSL-derived GCM path: six-block aggregated
//! GHASH, whole chunks processed in their own SIMD register windows, and a
//! sub-aggregate tail handled block by block before the window closes.
//! Unlike the SSE engine this one takes any IV and tag length; a non-12-byte
//! IV only affects counter-block derivation at init, which runs outside the
//! register window.

use super::super::{GcmState, GCM_BLOCK_SIZE};
use super::fpu::SimdGuard;
use super::AVX_BATCH_BYTES;
use crate::block::BlockCipher;
use crate::error::Result;

/// Encrypt block-aligned bulk data: whole chunks first, then the largest
/// aggregate the tail allows, then single blocks
pub(crate) fn encrypt_bulk<B: BlockCipher>(
    state: &mut GcmState<B>,
    data: &[u8],
    out: &mut [u8],
) -> Result<()> {
    debug_assert_eq!(data.len() % GCM_BLOCK_SIZE, 0);

    let chunk_size = super::avx_chunk_size();
    let mut offset = 0;

    while data.len() - offset >= chunk_size {
        let guard = SimdGuard::enter();
        state.encrypt_span_simd(
            &data[offset..offset + chunk_size],
            &mut out[offset..offset + chunk_size],
        )?;
        drop(guard);
        offset += chunk_size;
    }

    if offset == data.len() {
        return Ok(());
    }

    let guard = SimdGuard::enter();

    let rest = data.len() - offset;
    let aggregated = (rest / AVX_BATCH_BYTES) * AVX_BATCH_BYTES;
    if aggregated > 0 {
        state.encrypt_span_simd(
            &data[offset..offset + aggregated],
            &mut out[offset..offset + aggregated],
        )?;
        offset += aggregated;
    }

    // Fewer than six blocks remain; encrypt and hash them one at a time
    while offset < data.len() {
        let mut block = [0u8; GCM_BLOCK_SIZE];
        block.copy_from_slice(&data[offset..offset + GCM_BLOCK_SIZE]);
        let ciphertext = state.encrypt_block_step(&block)?;
        out[offset..offset + GCM_BLOCK_SIZE].copy_from_slice(&ciphertext);
        offset += GCM_BLOCK_SIZE;
    }

    drop(guard);
    Ok(())
}

/// Decrypt the accumulated block-aligned ciphertext in place with the same
/// chunk/aggregate/single-block descent as encryption
pub(crate) fn decrypt_bulk<B: BlockCipher>(state: &mut GcmState<B>, buf: &mut [u8]) -> Result<()> {
    debug_assert_eq!(buf.len() % GCM_BLOCK_SIZE, 0);

    let chunk_size = super::avx_chunk_size();
    let mut offset = 0;

    while buf.len() - offset >= chunk_size {
        let guard = SimdGuard::enter();
        state.decrypt_span_simd(&mut buf[offset..offset + chunk_size])?;
        drop(guard);
        offset += chunk_size;
    }

    if offset == buf.len() {
        return Ok(());
    }

    let guard = SimdGuard::enter();

    let rest = buf.len() - offset;
    let aggregated = (rest / AVX_BATCH_BYTES) * AVX_BATCH_BYTES;
    if aggregated > 0 {
        state.decrypt_span_simd(&mut buf[offset..offset + aggregated])?;
        offset += aggregated;
    }

    while offset < buf.len() {
        let block = &mut buf[offset..offset + GCM_BLOCK_SIZE];
        state.ghash.update_block(block, GCM_BLOCK_SIZE)?;
        let keystream = state.keystream_block()?;
        for (b, k) in block.iter_mut().zip(keystream.iter()) {
            *b ^= *k;
        }
        offset += GCM_BLOCK_SIZE;
    }

    drop(guard);
    Ok(())
}
