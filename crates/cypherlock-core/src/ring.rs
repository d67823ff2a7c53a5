//! The three-step ratchet ring: past, current, future.
//!
//! The fountain answers for exactly these three steps. `past` gives one
//! step of grace after an advance; `future` absorbs ticker skew. The ring
//! never regresses.

use zeroize::Zeroizing;

use crate::{RatchetError, RatchetState};

/// Three consecutive ratchet states around the current step.
#[derive(Debug, Clone)]
pub struct RatchetRing {
    past: Option<RatchetState>,
    current: RatchetState,
    future: RatchetState,
}

impl RatchetRing {
    /// Build a ring positioned at `current_step` from a ratchet at or below
    /// that step.
    pub fn new(ratchet: &RatchetState, current_step: u64) -> Result<Self, RatchetError> {
        let (past, current) = Self::wind(ratchet, current_step)?;
        let mut future = current.clone();
        future.step();
        Ok(RatchetRing { past, current, future })
    }

    /// Wind a copy of `ratchet` forward so its counter equals
    /// `current_step`, capturing the step before it as `past`.
    fn wind(
        ratchet: &RatchetState,
        current_step: u64,
    ) -> Result<(Option<RatchetState>, RatchetState), RatchetError> {
        let mut r = ratchet.clone();
        if r.counter() > current_step {
            return Err(RatchetError::ClockReversal {
                counter: r.counter(),
                step: current_step,
            });
        }
        if r.counter() == current_step {
            return Ok((None, r));
        }
        while r.counter() < current_step - 1 {
            r.step();
        }
        let past = r.clone();
        r.step();
        Ok((Some(past), r))
    }

    /// Advance the ring so `current` sits at `target`.
    ///
    /// A single-step advance shifts the existing states; larger jumps
    /// rebuild from the current state.
    pub fn step_to(&mut self, target: u64) -> Result<(), RatchetError> {
        let c = self.current.counter();
        if c == target {
            return Ok(());
        }
        if target == c + 1 {
            self.shift();
            return Ok(());
        }
        let (past, current) = Self::wind(&self.current, target)?;
        self.past = past;
        self.current = current;
        self.future = self.current.clone();
        self.future.step();
        Ok(())
    }

    /// Rotate by one: past ← current, current ← future, future advances.
    fn shift(&mut self) {
        self.past = Some(self.current.clone());
        std::mem::swap(&mut self.current, &mut self.future);
        self.future = self.current.clone();
        self.future.step();
    }

    /// Copy of the current state, for marshalling. The past state is lost
    /// in a marshal/unmarshal cycle.
    pub fn current(&self) -> RatchetState {
        self.current.clone()
    }

    /// Counter of the current state.
    pub fn current_step(&self) -> u64 {
        self.current.counter()
    }

    /// Look up the live state matching a public key.
    pub fn find(&self, expect: &[u8; 32]) -> Option<RatchetState> {
        if self.current.public_key() == expect {
            return Some(self.current.clone());
        }
        if let Some(past) = &self.past {
            if past.public_key() == expect {
                return Some(past.clone());
            }
        }
        if self.future.public_key() == expect {
            return Some(self.future.clone());
        }
        None
    }

    /// Shared secret for the live state matching `expect`, or `None` when
    /// the step has already been forgotten (or not yet reached).
    pub fn secret_for(&self, expect: &[u8; 32], peer: &[u8; 32]) -> Option<Zeroizing<[u8; 32]>> {
        self.find(expect).map(|r| r.shared_secret(peer))
    }
}
