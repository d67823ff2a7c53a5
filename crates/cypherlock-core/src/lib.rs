//! Ratchet, fountain and pregeneration: the time-keeping heart of
//! Cypherlock.
//!
//! A [`RatchetState`] is a deterministic keyed sequence of Curve25519
//! keypairs. The [`Fountain`] anchors a ratchet to wall time and serves
//! shared-secret lookups for the three live steps held in its
//! [`RatchetRing`]; once a step has fallen out of the ring, its key material
//! is unrecoverable. The [`Pregenerator`] walks a shadow copy of the same
//! ratchet ahead of time to publish signed lists of future public keys.
//!
//! All time reads go through the [`Clock`] abstraction so tests can drive
//! the fountain deterministically.

mod clock;
mod error;
mod fountain;
mod pregen;
mod ratchet;
mod ring;

pub use clock::{Clock, MockClock, SystemClock, Ticker};
pub use error::{FountainError, RatchetError};
pub use fountain::{Fountain, FountainHandle};
pub use pregen::Pregenerator;
pub use ratchet::{RatchetState, RATCHET_STATE_SIZE};
pub use ring::RatchetRing;
