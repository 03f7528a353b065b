//! GCM implementation dispatcher
//!
//! The engine ships several interchangeable implementations of its inner
//! loops: a portable constant-time path, a variant of the same path with the
//! GF(2^128) multiply done in hardware, and two SIMD batch engines. Which
//! one a context uses is decided exactly once, at context initialization,
//! from a process-wide policy:
//!
//! - `fastest` (default): the best implementation whose CPU probe passes
//! - `cycle`: round-robin across all supported implementations on each
//!   context init, used for differential testing and coverage
//! - a fixed name: that implementation, or an error if the CPU lacks it
//!
//! Policy state is a pair of atomics; the per-init read path takes no lock.
//! CPU probes run once per process and are cached.

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec::Vec};
use core::fmt::Write as _;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Error, Result};

#[cfg(target_arch = "x86_64")]
pub(crate) mod avx;
#[cfg(target_arch = "x86_64")]
pub(crate) mod clmul;
#[cfg(target_arch = "x86_64")]
pub(crate) mod fpu;
#[cfg(target_arch = "x86_64")]
pub(crate) mod sse;

use super::ghash::GhashMul;

/// A compiled-in GCM implementation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum GcmImpl {
    /// Portable constant-time implementation
    Generic,
    /// Generic data path with the multiply done by PCLMULQDQ
    Pclmulqdq,
    /// SSE batch engine, 8-block aggregation
    Sse41,
    /// AVX batch engine, 6-block aggregation
    Avx,
}

impl GcmImpl {
    fn from_index(value: u32) -> Self {
        match value {
            1 => GcmImpl::Pclmulqdq,
            2 => GcmImpl::Sse41,
            3 => GcmImpl::Avx,
            _ => GcmImpl::Generic,
        }
    }

    fn name(self) -> &'static str {
        match self {
            GcmImpl::Generic => "generic",
            GcmImpl::Pclmulqdq => "pclmulqdq",
            GcmImpl::Sse41 => "sse4_1",
            GcmImpl::Avx => "avx",
        }
    }

    fn is_supported(self) -> bool {
        match self {
            GcmImpl::Generic => true,
            GcmImpl::Pclmulqdq => probe::pclmulqdq(),
            GcmImpl::Sse41 => probe::sse41(),
            GcmImpl::Avx => probe::avx(),
        }
    }

    /// The multiply the GHASH accumulator uses under this implementation
    pub(crate) fn mul(self) -> GhashMul {
        match self {
            GcmImpl::Generic => GhashMul::Portable,
            #[cfg(target_arch = "x86_64")]
            _ => GhashMul::Clmul,
            #[cfg(not(target_arch = "x86_64"))]
            _ => GhashMul::Portable,
        }
    }

    /// Number of subkey powers the batch engines precompute
    #[cfg(target_arch = "x86_64")]
    pub(crate) fn htable_len(self) -> usize {
        match self {
            GcmImpl::Sse41 => 8,
            GcmImpl::Avx => 6,
            _ => 0,
        }
    }
}

/// All implementations, in cycling order
const ALL_IMPLS: [GcmImpl; 4] = [
    GcmImpl::Generic,
    GcmImpl::Pclmulqdq,
    GcmImpl::Sse41,
    GcmImpl::Avx,
];

// Policy encoding: an implementation index, or one of the sentinels
const IMPL_FASTEST: u32 = u32::MAX;
const IMPL_CYCLE: u32 = u32::MAX - 1;

/// Current selection policy, read on every context init
static GCM_IMPL: AtomicU32 = AtomicU32::new(IMPL_FASTEST);

/// Round-robin position for the `cycle` policy
static CYCLE_POS: AtomicU32 = AtomicU32::new(0);

/// Name table for the administrative surface, policies first
const IMPL_OPTS: [(&str, u32); 6] = [
    ("cycle", IMPL_CYCLE),
    ("fastest", IMPL_FASTEST),
    ("avx", 3),
    ("sse4_1", 2),
    ("pclmulqdq", 1),
    ("generic", 0),
];

#[cfg(target_arch = "x86_64")]
mod probe {
    cpufeatures::new!(clmul_check, "pclmulqdq", "sse4.1");
    cpufeatures::new!(sse41_check, "sse4.1", "aes", "pclmulqdq");
    cpufeatures::new!(avx_check, "avx", "aes", "pclmulqdq");

    pub(super) fn pclmulqdq() -> bool {
        clmul_check::get()
    }

    pub(super) fn sse41() -> bool {
        sse41_check::get()
    }

    pub(super) fn avx() -> bool {
        avx_check::get()
    }
}

#[cfg(not(target_arch = "x86_64"))]
mod probe {
    pub(super) fn pclmulqdq() -> bool {
        false
    }

    pub(super) fn sse41() -> bool {
        false
    }

    pub(super) fn avx() -> bool {
        false
    }
}

/// The fastest supported implementation, assuming wider batching beats
/// narrower batching beats a hardware multiply beats the portable loop.
/// The underlying CPU probes are cached, so this is a handful of atomic
/// loads.
fn fastest() -> GcmImpl {
    for imp in [GcmImpl::Avx, GcmImpl::Sse41, GcmImpl::Pclmulqdq] {
        if imp.is_supported() {
            return imp;
        }
    }
    GcmImpl::Generic
}

/// Advance the cycle position and return the implementation it lands on.
///
/// The advance is a bounded-retry compare-and-swap; under sustained
/// contention the current position is used as-is. Which implementation wins
/// a race is unspecified, only that a supported one is returned.
fn cycle_next() -> GcmImpl {
    let mut supported = [GcmImpl::Generic; ALL_IMPLS.len()];
    let mut count = 0u32;
    for imp in ALL_IMPLS {
        if imp.is_supported() {
            supported[count as usize] = imp;
            count += 1;
        }
    }

    for _ in 0..10 {
        let current = CYCLE_POS.load(Ordering::Relaxed);
        let next = (current + 1) % count;
        if CYCLE_POS
            .compare_exchange(current, next, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            return supported[next as usize];
        }
    }
    supported[(CYCLE_POS.load(Ordering::Relaxed) % count) as usize]
}

/// Selects the implementation for a new context.
///
/// The SSE batch engine is a port that only handles the common message
/// shape: a 12-byte IV and a tag of 8, 12 or 16 bytes. A context outside
/// that shape selected for SSE runs the hardware-multiply path instead
/// (SSE support implies PCLMULQDQ support). This is a per-message fallback;
/// requesting an implementation the CPU lacks is still an error at
/// [`set_implementation`] time.
pub(crate) fn select(iv_len: usize, tag_len: usize) -> GcmImpl {
    let policy = GCM_IMPL.load(Ordering::Relaxed);
    let mut choice = match policy {
        IMPL_FASTEST => fastest(),
        IMPL_CYCLE => cycle_next(),
        index => GcmImpl::from_index(index),
    };

    if choice == GcmImpl::Sse41 && !(iv_len == 12 && matches!(tag_len, 8 | 12 | 16)) {
        choice = GcmImpl::Pclmulqdq;
    }

    choice
}

/// Sets the process-wide implementation selection.
///
/// Accepts an implementation name (`generic`, `pclmulqdq`, `sse4_1`, `avx`)
/// or a policy (`fastest`, `cycle`). An unknown name is a parameter error;
/// a known implementation the running CPU cannot execute fails with
/// [`Error::Unsupported`] rather than silently substituting another one.
pub fn set_implementation(name: &str) -> Result<()> {
    let requested = name.trim();

    for (opt_name, sel) in IMPL_OPTS {
        if requested != opt_name {
            continue;
        }
        if sel != IMPL_FASTEST && sel != IMPL_CYCLE && !GcmImpl::from_index(sel).is_supported() {
            return Err(Error::Unsupported {
                implementation: opt_name,
            });
        }
        GCM_IMPL.store(sel, Ordering::Relaxed);
        return Ok(());
    }

    Err(Error::param(
        "implementation",
        "unknown GCM implementation name",
    ))
}

/// Name of the current selection (an implementation or a policy)
pub fn current_implementation() -> &'static str {
    let policy = GCM_IMPL.load(Ordering::Relaxed);
    match policy {
        IMPL_FASTEST => "fastest",
        IMPL_CYCLE => "cycle",
        index => GcmImpl::from_index(index).name(),
    }
}

/// Names of the implementations and policies usable on this machine
pub fn implementations() -> Vec<&'static str> {
    IMPL_OPTS
        .iter()
        .filter(|&&(_, sel)| {
            sel == IMPL_FASTEST || sel == IMPL_CYCLE || GcmImpl::from_index(sel).is_supported()
        })
        .map(|&(name, _)| name)
        .collect()
}

/// One-line listing of the selectable implementations with the current
/// selection bracketed, e.g. `[fastest] cycle avx sse4_1 pclmulqdq generic`
pub fn describe_implementations() -> String {
    let current = current_implementation();
    let mut out = String::new();
    for name in implementations() {
        if !out.is_empty() {
            out.push(' ');
        }
        if name == current {
            let _ = write!(out, "[{}]", name);
        } else {
            out.push_str(name);
        }
    }
    out
}

// Chunk-size settings for the batch engines: the number of bytes processed
// per SIMD register window. Larger chunks amortize the window overhead,
// smaller chunks bound how long the window stays open.

const BATCH_CHUNK_ALIGN: usize = 512;
const BATCH_CHUNK_MIN: usize = 1024;
const BATCH_CHUNK_MAX: usize = 1024 * 1024;

/// SSE engine chunk size in bytes
static BATCH_CHUNK_SIZE: AtomicU32 = AtomicU32::new(32 * 1024);

/// Blocks the AVX engine aggregates per multiply round
pub(crate) const AVX_BATCH_BYTES: usize = 96;
const AVX_MIN_ENCRYPT_BYTES: usize = AVX_BATCH_BYTES * 3;
const AVX_CHUNK_MAX: usize = (128 * 1024 / AVX_BATCH_BYTES) * AVX_BATCH_BYTES;

/// AVX engine chunk size in bytes
static AVX_CHUNK_SIZE: AtomicU32 = AtomicU32::new(((32 * 1024) / AVX_BATCH_BYTES * AVX_BATCH_BYTES) as u32);

/// Sets the SSE engine chunk size. Rounded down to a 512-byte multiple;
/// must land in [1 KiB, 1 MiB].
pub fn set_batch_chunk_size(bytes: usize) -> Result<()> {
    let rounded = bytes & !(BATCH_CHUNK_ALIGN - 1);
    if !(BATCH_CHUNK_MIN..=BATCH_CHUNK_MAX).contains(&rounded) {
        return Err(Error::param(
            "batch_chunk_size",
            "chunk size out of range after rounding to a 512-byte multiple",
        ));
    }
    BATCH_CHUNK_SIZE.store(rounded as u32, Ordering::Relaxed);
    Ok(())
}

/// Sets the AVX engine chunk size. Rounded down to a 96-byte multiple;
/// must be at least 288 bytes and at most 128 KiB (aligned).
pub fn set_avx_chunk_size(bytes: usize) -> Result<()> {
    let rounded = (bytes / AVX_BATCH_BYTES) * AVX_BATCH_BYTES;
    if !(AVX_MIN_ENCRYPT_BYTES..=AVX_CHUNK_MAX).contains(&rounded) {
        return Err(Error::param(
            "avx_chunk_size",
            "chunk size out of range after rounding to a 96-byte multiple",
        ));
    }
    AVX_CHUNK_SIZE.store(rounded as u32, Ordering::Relaxed);
    Ok(())
}

/// Current SSE engine chunk size
pub(crate) fn batch_chunk_size() -> usize {
    BATCH_CHUNK_SIZE.load(Ordering::Relaxed) as usize
}

/// Current AVX engine chunk size
pub(crate) fn avx_chunk_size() -> usize {
    AVX_CHUNK_SIZE.load(Ordering::Relaxed) as usize
}

/// Precomputed ascending powers of the GHASH subkey for the batch engines.
/// Owned by one context and wiped at teardown.
#[cfg(target_arch = "x86_64")]
pub(crate) struct Htable {
    powers: Vec<[u8; 16]>,
}

#[cfg(target_arch = "x86_64")]
impl Htable {
    pub(crate) fn new(polyval_subkey: &[u8; 16], count: usize) -> Result<Self> {
        Ok(Self {
            powers: clmul::powers(polyval_subkey, count)?,
        })
    }

    pub(crate) fn powers(&self) -> &[[u8; 16]] {
        &self.powers
    }
}

#[cfg(target_arch = "x86_64")]
impl zeroize::Zeroize for Htable {
    fn zeroize(&mut self) {
        for power in self.powers.iter_mut() {
            power.zeroize();
        }
    }
}

#[cfg(target_arch = "x86_64")]
impl Drop for Htable {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.zeroize();
    }
}
