//! Software cryptographic provider for the VaultFS storage engine
//!
//! This crate implements the authenticated-encryption engine the storage
//! layer uses to protect on-disk blocks: AES-GCM with a streaming interface,
//! a portable constant-time core, and runtime-selected hardware-accelerated
//! backends that are functionally indistinguishable from it.
//!
//! # Security Features
//!
//! - Plaintext is never released to a caller before the authentication tag
//!   has been verified, on every backend
//! - Secret-bearing state is zeroized on drop, including abandoned contexts
//! - Constant-time tag comparison and branchless field arithmetic
//! - SIMD register state holding key material is cleared before the
//!   accelerated paths yield

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]

#[cfg(feature = "alloc")]
extern crate alloc;

// Error module and re-exports
pub mod error;
pub use error::{validate, Error, Result};

// Block cipher implementations
pub mod block;
pub use block::{Aes128, Aes192, Aes256, BlockCipher, CipherAlgorithm};

// AEAD cipher implementations
#[cfg(feature = "alloc")]
pub mod aead;
#[cfg(feature = "alloc")]
pub use aead::gcm::{Gcm, GcmDecrypt, GcmEncrypt};

// Type system
pub mod types;
pub use types::SecretBytes;
