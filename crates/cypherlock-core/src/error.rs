//! Error types for ratchet and fountain operations.

use thiserror::Error;

/// Failures of the ratchet state machine and ring.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RatchetError {
    /// Marshalled ratchet state has the wrong length.
    #[error("invalid ratchet state length: got {got}, expected {expected}")]
    InvalidLength {
        /// Actual input length.
        got: usize,
        /// Required length.
        expected: usize,
    },

    /// The ring was asked to regress below its current counter. This means
    /// the wall clock moved backwards relative to persisted state.
    #[error("clock reversal: ratchet counter {counter} is past step {step}")]
    ClockReversal {
        /// Counter of the ratchet the ring was built from.
        counter: u64,
        /// Requested current step.
        step: u64,
    },

    /// The random source failed while seeding a new ratchet.
    #[error("random source failure: {0}")]
    Rng(String),
}

/// Failures of the fountain service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FountainError {
    /// Fountain duration must be at least one second.
    #[error("invalid duration: must be >= 1 second")]
    InvalidDuration,

    /// The fountain worker is not running.
    #[error("fountain service stopped")]
    NoService,

    /// The requested ratchet public key is outside the live ring.
    #[error("ratchet not found")]
    RatchetNotFound,

    /// Marshalled fountain or pregenerator state is malformed.
    #[error("invalid state encoding")]
    InvalidState,

    /// Ratchet-level failure.
    #[error(transparent)]
    Ratchet(#[from] RatchetError),
}
