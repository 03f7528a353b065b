//! Authenticated Encryption with Associated Data (AEAD)
//!
//! The storage engine encrypts on-disk blocks through the streaming GCM
//! engine in [`gcm`]; everything else layers on top of it.

pub mod gcm;

pub use gcm::{Gcm, GcmDecrypt, GcmEncrypt};
