//! Type system for the cryptographic provider
//!
//! Fixed-size, self-zeroizing containers for secret material, with
//! constant-time comparison semantics.

mod secret;

pub use secret::SecretBytes;
