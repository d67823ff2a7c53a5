//! Client-side error types.

use cypherlock_proto::ProtoError;
use thiserror::Error;

/// Failures of the client pipeline.
#[derive(Error, Debug)]
pub enum ClientError {
    /// No keylist entry overlaps the requested window.
    #[error("no matching locks found")]
    NoLocksFound,

    /// The fetched keylist failed signature verification against the
    /// pinned key.
    #[error("keylist is untrusted")]
    KeylistUntrusted,

    /// Message-layer failure.
    #[error(transparent)]
    Proto(#[from] ProtoError),

    /// Lock store failure.
    #[error(transparent)]
    Storage(#[from] LockStoreError),

    /// RPC failure.
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Failures of the local lock store.
#[derive(Error, Debug)]
pub enum LockStoreError {
    /// Underlying I/O failure.
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),

    /// No stored lock file covers the requested instant.
    #[error("no lock covers the requested time")]
    NoMatchingLock,

    /// The cached keylist is malformed.
    #[error("cached keylist is malformed")]
    MalformedKeylist,
}

/// Failures of the RPC client.
#[derive(Error, Debug)]
pub enum RpcError {
    /// Underlying I/O failure.
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),

    /// The server reported a generic failure.
    #[error("server refused the request")]
    ServerFailure,

    /// The response frame exceeds the protocol bound.
    #[error("oversized response frame")]
    OversizedFrame,
}
