//! Server-side error type.
//!
//! The RPC layer collapses all of these to a generic failure before
//! replying; the variants exist for logging and for the operator, not for
//! the remote peer.

use cypherlock_core::FountainError;
use cypherlock_proto::ProtoError;
use thiserror::Error;

use crate::StorageError;

/// Failures of the server pipeline.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Message-layer failure (parse, decrypt).
    #[error(transparent)]
    Proto(#[from] ProtoError),

    /// The envelope's validity window does not cover the present.
    #[error("policy expired")]
    PolicyExpired,

    /// Fountain-level failure.
    #[error(transparent)]
    Fountain(#[from] FountainError),

    /// Persistence failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Persisted state is malformed.
    #[error("invalid persisted state: {0}")]
    InvalidState(&'static str),
}
