//! Error handling for the cryptographic provider

#[cfg(feature = "alloc")]
use alloc::borrow::Cow;

#[cfg(feature = "std")]
use std::fmt;

#[cfg(not(feature = "std"))]
use core::fmt;

/// The error type for cryptographic provider operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Parameter validation error
    Parameter {
        /// Name of the invalid parameter
        name: Cow<'static, str>,
        /// Reason why the parameter is invalid
        reason: Cow<'static, str>,
    },

    /// Caller-supplied output buffer is shorter than required
    BufferTooSmall {
        /// Context where the buffer was too small
        context: &'static str,
        /// Number of bytes required
        needed: usize,
        /// Number of bytes available
        available: usize,
    },

    /// Authentication failure (AEAD tag verification)
    Authentication {
        /// Algorithm that failed authentication
        algorithm: &'static str,
    },

    /// A named implementation is not usable on the running CPU
    Unsupported {
        /// Name of the requested implementation
        implementation: &'static str,
    },

    /// Memory allocation failure
    Allocation {
        /// What the allocation was for
        context: &'static str,
    },
}

impl Error {
    /// Shorthand to create a Parameter error
    pub fn param<N: Into<Cow<'static, str>>, R: Into<Cow<'static, str>>>(
        name: N,
        reason: R,
    ) -> Self {
        Error::Parameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for cryptographic provider operations
pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parameter { name, reason } => {
                write!(f, "Invalid parameter '{}': {}", name, reason)
            }
            Error::BufferTooSmall {
                context,
                needed,
                available,
            } => {
                write!(
                    f,
                    "Output buffer too small for {}: need {}, have {}",
                    context, needed, available
                )
            }
            Error::Authentication { algorithm } => {
                write!(f, "Authentication failed for {}", algorithm)
            }
            Error::Unsupported { implementation } => {
                write!(
                    f,
                    "Implementation '{}' is not supported on this processor",
                    implementation
                )
            }
            Error::Allocation { context } => {
                write!(f, "Memory allocation failed for {}", context)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

// Include the validation submodule
pub mod validate;
