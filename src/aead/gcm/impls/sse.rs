//! SSE batch engine
//!
//! A port of the storage-acceleration-library style GCM data path: bulk
//! input is processed in fixed-size chunks, each chunk inside its own SIMD
//! register window, with an 8-block aggregated GHASH. Only the common
//! message shape (12-byte IV, 8/12/16-byte tag) is routed here; the
//! dispatcher sends everything else down the hardware-multiply path.

use core::cmp;

use super::super::{GcmState, GCM_BLOCK_SIZE};
use super::fpu::SimdGuard;
use crate::block::BlockCipher;
use crate::error::Result;

/// Encrypt block-aligned bulk data chunk by chunk
pub(crate) fn encrypt_bulk<B: BlockCipher>(
    state: &mut GcmState<B>,
    data: &[u8],
    out: &mut [u8],
) -> Result<()> {
    debug_assert_eq!(data.len() % GCM_BLOCK_SIZE, 0);

    let chunk_size = super::batch_chunk_size();
    let mut offset = 0;
    while offset < data.len() {
        let take = cmp::min(chunk_size, data.len() - offset);
        let guard = SimdGuard::enter();
        state.encrypt_span_simd(&data[offset..offset + take], &mut out[offset..offset + take])?;
        drop(guard);
        offset += take;
    }
    Ok(())
}

/// Decrypt the accumulated block-aligned ciphertext in place, chunk by
/// chunk. Plaintext release and tag verification remain the caller's
/// finalize step.
pub(crate) fn decrypt_bulk<B: BlockCipher>(state: &mut GcmState<B>, buf: &mut [u8]) -> Result<()> {
    debug_assert_eq!(buf.len() % GCM_BLOCK_SIZE, 0);

    let chunk_size = super::batch_chunk_size();
    let mut offset = 0;
    while offset < buf.len() {
        let take = cmp::min(chunk_size, buf.len() - offset);
        let guard = SimdGuard::enter();
        state.decrypt_span_simd(&mut buf[offset..offset + take])?;
        drop(guard);
        offset += take;
    }
    Ok(())
}
