//! Error type of the wire-format layer.

use cypherlock_crypto::CryptoError;
use thiserror::Error;

/// Failures while parsing, sealing or opening protocol messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtoError {
    /// Input shorter than a required layout.
    #[error("message incomplete")]
    MessageIncomplete,

    /// AEAD authentication failed.
    #[error("decryption failed")]
    DecryptionFailed,

    /// Keylist or inner record malformed.
    #[error("parse error")]
    Parse,

    /// The requested ratchet public key is outside the live ring.
    #[error("ratchet not found")]
    RatchetNotFound,

    /// The secret source (fountain) is not running.
    #[error("no service")]
    NoService,

    /// The random source failed.
    #[error("random source failure: {0}")]
    Rng(String),
}

impl From<CryptoError> for ProtoError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::MessageIncomplete => ProtoError::MessageIncomplete,
            CryptoError::DecryptionFailed => ProtoError::DecryptionFailed,
            CryptoError::Rng(s) => ProtoError::Rng(s),
            CryptoError::SecretTooLong { .. } | CryptoError::EncryptedTooShort => ProtoError::Parse,
        }
    }
}
