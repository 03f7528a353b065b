//! Carry-less multiplication over GF(2^128) using PCLMULQDQ
//!
//! GHASH's field and the POLYVAL field (x^128 + x^127 + x^126 + x^121 + 1)
//! are bit-reversals of each other, so a GHASH multiply can be computed as a
//! POLYVAL Montgomery multiply over byte-reversed operands with the subkey
//! pre-multiplied by x. That is the construction used here: Karatsuba
//! decomposition over three PCLMULQDQ products, then a Montgomery reduction.
//!
//! Every public function in this module assumes the `pclmulqdq` probe has
//! passed; the implementation selector is the only path that hands out the
//! backends calling in here.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;
use core::arch::x86_64::*;

use crate::error::{Error, Result};

/// Reverse a block between the GHASH and POLYVAL byte orders
#[inline(always)]
fn reflect(block: &[u8; 16]) -> [u8; 16] {
    let mut out = *block;
    out.reverse();
    out
}

/// Map the GHASH subkey H into the POLYVAL domain: byte-reverse, then
/// multiply by x modulo x^128 + x^127 + x^126 + x^121 + 1.
pub(crate) fn polyval_key(h: &[u8; 16]) -> [u8; 16] {
    let mut v = u128::from_le_bytes(reflect(h));
    let carry = v >> 127;
    v <<= 1;
    v ^= carry ^ (carry << 127) ^ (carry << 126) ^ (carry << 121);
    v.to_le_bytes()
}

/// One GHASH multiply, `x · H`, in GCM byte order
///
/// `x` is the accumulator already XORed with the input block; `hp` is the
/// POLYVAL-domain subkey from [`polyval_key`].
pub(crate) fn ghash_mul(x: &[u8; 16], hp: &[u8; 16]) -> [u8; 16] {
    unsafe {
        let a = _mm_loadu_si128(reflect(x).as_ptr().cast());
        let b = _mm_loadu_si128(hp.as_ptr().cast());
        let mut out = [0u8; 16];
        _mm_storeu_si128(out.as_mut_ptr().cast(), polymul(a, b));
        out.reverse();
        out
    }
}

/// Montgomery product of two POLYVAL-domain elements
fn mont_mul(a: &[u8; 16], b: &[u8; 16]) -> [u8; 16] {
    unsafe {
        let x = _mm_loadu_si128(a.as_ptr().cast());
        let y = _mm_loadu_si128(b.as_ptr().cast());
        let mut out = [0u8; 16];
        _mm_storeu_si128(out.as_mut_ptr().cast(), polymul(x, y));
        out
    }
}

/// Precompute `count` ascending powers of the POLYVAL-domain subkey
///
/// `table[i]` holds H^(i+1); the batch engines pair the k-th block of an
/// aggregate with the matching descending power.
pub(crate) fn powers(hp: &[u8; 16], count: usize) -> Result<Vec<[u8; 16]>> {
    let mut table = Vec::new();
    table.try_reserve_exact(count).map_err(|_| Error::Allocation {
        context: "GHASH subkey power table",
    })?;

    let mut current = *hp;
    for i in 0..count {
        table.push(current);
        if i + 1 < count {
            current = mont_mul(&current, hp);
        }
    }
    Ok(table)
}

/// Fold block-aligned data into the GHASH accumulator with aggregated
/// multiplies: one Montgomery reduction per group of up to `powers.len()`
/// blocks.
pub(crate) fn ghash_blocks(y: &mut [u8; 16], powers: &[[u8; 16]], data: &[u8]) {
    debug_assert_eq!(data.len() % 16, 0);
    debug_assert!(!powers.is_empty());

    let width = powers.len() * 16;
    unsafe {
        let mut yp = _mm_loadu_si128(reflect(y).as_ptr().cast());
        for group in data.chunks(width) {
            yp = ghash_group(yp, group, powers);
        }
        let mut out = [0u8; 16];
        _mm_storeu_si128(out.as_mut_ptr().cast(), yp);
        out.reverse();
        *y = out;
    }
}

/// XOR `src` into `dst` 16 bytes at a time; lengths must match and be
/// block-aligned
pub(crate) fn xor_blocks(dst: &mut [u8], src: &[u8]) {
    debug_assert_eq!(dst.len(), src.len());
    debug_assert_eq!(dst.len() % 16, 0);

    unsafe {
        for (d, s) in dst.chunks_exact_mut(16).zip(src.chunks_exact(16)) {
            let a = _mm_loadu_si128(d.as_ptr().cast());
            let b = _mm_loadu_si128(s.as_ptr().cast());
            _mm_storeu_si128(d.as_mut_ptr().cast(), _mm_xor_si128(a, b));
        }
    }
}

/// Aggregate one group of up to `powers.len()` blocks into the accumulator.
///
/// Computes `sum_k (t_k · H^(n-k))` with `t_0` carrying the incoming
/// accumulator, deferring the reduction until the whole group's Karatsuba
/// partials have been summed; the combine and reduction steps are linear
/// over XOR, so this matches the block-at-a-time result exactly.
#[target_feature(enable = "sse2", enable = "pclmulqdq")]
unsafe fn ghash_group(yp: __m128i, data: &[u8], powers: &[[u8; 16]]) -> __m128i {
    let n = data.len() / 16;
    debug_assert!(n >= 1 && n <= powers.len());

    let mut acc_h = _mm_setzero_si128();
    let mut acc_m = _mm_setzero_si128();
    let mut acc_l = _mm_setzero_si128();

    for (k, block) in data.chunks_exact(16).enumerate() {
        let mut buf = [0u8; 16];
        buf.copy_from_slice(block);
        buf.reverse();

        let mut x = _mm_loadu_si128(buf.as_ptr().cast());
        if k == 0 {
            x = _mm_xor_si128(x, yp);
        }
        let p = _mm_loadu_si128(powers[n - 1 - k].as_ptr().cast());

        let (h, m, l) = karatsuba1(x, p);
        acc_h = _mm_xor_si128(acc_h, h);
        acc_m = _mm_xor_si128(acc_m, m);
        acc_l = _mm_xor_si128(acc_l, l);
    }

    let (h, l) = karatsuba2(acc_h, acc_m, acc_l);
    mont_reduce(h, l)
}

/// Full Montgomery multiply: decompose, combine, reduce
#[target_feature(enable = "sse2", enable = "pclmulqdq")]
unsafe fn polymul(x: __m128i, y: __m128i) -> __m128i {
    let (h, m, l) = karatsuba1(x, y);
    let (h, l) = karatsuba2(h, m, l);
    mont_reduce(h, l)
}

/// First Karatsuba step: split the 128x128 product into three 64x64
/// carry-less products
///
///   (x1*y0 + x0*y1) = (x1+x0)*(y1+y0) + (x1*y1) + (x0*y0)
///          M                                H         L
#[target_feature(enable = "sse2", enable = "pclmulqdq")]
unsafe fn karatsuba1(x: __m128i, y: __m128i) -> (__m128i, __m128i, __m128i) {
    let m = pmull(
        _mm_xor_si128(x, _mm_shuffle_epi32(x, 0xee)),
        _mm_xor_si128(y, _mm_shuffle_epi32(y, 0xee)),
    );
    let h = pmull2(y, x);
    let l = pmull(y, x);
    (h, m, l)
}

/// Second Karatsuba step: recombine the partial products into the 256-bit
/// product, returned as (high, low) halves
#[target_feature(enable = "sse2", enable = "pclmulqdq")]
unsafe fn karatsuba2(h: __m128i, m: __m128i, l: __m128i) -> (__m128i, __m128i) {
    // t = {m0^l1^h0^l0, m1^h0^h1^l1}
    let t = {
        let t0 = _mm_xor_si128(
            m,
            _mm_castps_si128(_mm_shuffle_ps(
                _mm_castsi128_ps(l),
                _mm_castsi128_ps(h),
                0x4e,
            )),
        );
        let t1 = _mm_xor_si128(h, l);
        _mm_xor_si128(t0, t1)
    };

    let x01 = _mm_unpacklo_epi64(l, t);
    let x23 = _mm_castps_si128(_mm_movehl_ps(_mm_castsi128_ps(h), _mm_castsi128_ps(t)));

    (x23, x01)
}

/// Montgomery reduction of the 256-bit product modulo the POLYVAL polynomial
#[target_feature(enable = "sse2", enable = "pclmulqdq")]
unsafe fn mont_reduce(x23: __m128i, x01: __m128i) -> __m128i {
    static POLY: u128 = (1 << 127) | (1 << 126) | (1 << 121) | (1 << 63) | (1 << 62) | (1 << 57);

    let poly = _mm_loadu_si128(core::ptr::addr_of!(POLY).cast());
    let a = pmull(x01, poly);
    let b = _mm_xor_si128(x01, _mm_shuffle_epi32(a, 0x4e));
    let c = pmull2(b, poly);
    _mm_xor_si128(x23, _mm_xor_si128(c, b))
}

/// Carry-less multiply of the low 64-bit halves
#[target_feature(enable = "sse2", enable = "pclmulqdq")]
unsafe fn pmull(a: __m128i, b: __m128i) -> __m128i {
    _mm_clmulepi64_si128(a, b, 0x00)
}

/// Carry-less multiply of the high 64-bit halves
#[target_feature(enable = "sse2", enable = "pclmulqdq")]
unsafe fn pmull2(a: __m128i, b: __m128i) -> __m128i {
    _mm_clmulepi64_si128(a, b, 0x11)
}
