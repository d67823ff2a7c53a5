//! Error type shared by the primitive layer.

use thiserror::Error;

/// Failures of the cryptographic primitives.
///
/// `DecryptionFailed` deliberately carries no detail: an AEAD tag rejection
/// must be indistinguishable from any other tag rejection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Input shorter than the required layout.
    #[error("message incomplete")]
    MessageIncomplete,

    /// AEAD authentication failed.
    #[error("decryption failed")]
    DecryptionFailed,

    /// User secret exceeds the fixed record size.
    #[error("secret too long: {len} bytes exceeds maximum of {max}")]
    SecretTooLong {
        /// Length of the rejected secret.
        len: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// Sealed secret shorter than the fixed record layout.
    #[error("encrypted secret too short")]
    EncryptedTooShort,

    /// The random source failed to produce bytes.
    #[error("random source failure: {0}")]
    Rng(String),
}
