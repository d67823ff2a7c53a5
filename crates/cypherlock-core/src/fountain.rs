//! The fountain: a ratchet anchored to wall time, served by a
//! single-owner worker task.
//!
//! One worker owns the [`RatchetRing`] and an internal ticker. Every
//! external operation arrives as a message on a bounded channel with a
//! one-shot reply, so all state transitions serialize in arrival order and
//! a lookup observed after a tick always sees the post-tick ring.

use std::time::Duration;

use rand_core::CryptoRngCore;
use tokio::sync::{mpsc, oneshot};
use zeroize::Zeroizing;

use crate::{Clock, FountainError, RatchetRing, RatchetState, RATCHET_STATE_SIZE};

/// Marshalled size: startDate(8) ∥ duration(8) ∥ ratchet(136).
const FOUNTAIN_STATE_SIZE: usize = 16 + RATCHET_STATE_SIZE;

/// Ticker skew added to the first fire so a slightly early tick still lands
/// past the step boundary.
const TICK_SKEW: Duration = Duration::from_millis(10);

/// Capacity of the worker's request channel.
const REQUEST_BACKLOG: usize = 2;

/// A fountain that is not serving yet: start date, step duration and the
/// ratchet it will resume from.
#[derive(Debug, Clone)]
pub struct Fountain {
    start_date: i64,
    duration: i64,
    ratchet: RatchetState,
}

impl Fountain {
    /// Create a fresh fountain starting now, with a newly seeded ratchet.
    pub fn new(
        duration: i64,
        rng: &mut (impl CryptoRngCore + ?Sized),
        clock: &impl Clock,
    ) -> Result<Self, FountainError> {
        if duration < 1 {
            return Err(FountainError::InvalidDuration);
        }
        let ratchet = RatchetState::generate(rng)?;
        Ok(Fountain { start_date: clock.now(), duration, ratchet })
    }

    /// Unix second the step sequence is anchored to.
    pub fn start_date(&self) -> i64 {
        self.start_date
    }

    /// Seconds between ratchet steps.
    pub fn duration(&self) -> i64 {
        self.duration
    }

    /// The ratchet this fountain resumes from.
    pub fn ratchet(&self) -> &RatchetState {
        &self.ratchet
    }

    /// Step counter that should be current at `now`.
    pub fn current_step(&self, now: i64) -> u64 {
        (((now - self.start_date) / self.duration) + 1) as u64
    }

    /// Seconds until the next step boundary.
    fn time_to_next_step(&self, now: i64) -> i64 {
        let steps = (now - self.start_date) / self.duration;
        let next_step_time = self.start_date + (steps + 1) * self.duration;
        next_step_time - now
    }

    /// Encode as `startDate ∥ duration ∥ ratchet` (152 bytes).
    pub fn marshal(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FOUNTAIN_STATE_SIZE);
        out.extend_from_slice(&(self.start_date as u64).to_be_bytes());
        out.extend_from_slice(&(self.duration as u64).to_be_bytes());
        out.extend_from_slice(&self.ratchet.marshal());
        out
    }

    /// Decode a marshalled fountain.
    pub fn unmarshal(d: &[u8]) -> Result<Self, FountainError> {
        if d.len() != FOUNTAIN_STATE_SIZE {
            return Err(FountainError::InvalidState);
        }
        let mut field = [0u8; 8];
        field.copy_from_slice(&d[..8]);
        let start_date = u64::from_be_bytes(field) as i64;
        field.copy_from_slice(&d[8..16]);
        let duration = u64::from_be_bytes(field) as i64;
        if duration < 1 {
            return Err(FountainError::InvalidDuration);
        }
        let ratchet =
            RatchetState::unmarshal(&d[16..16 + RATCHET_STATE_SIZE]).map_err(FountainError::from)?;
        Ok(Fountain { start_date, duration, ratchet })
    }

    /// Start the serving worker. The fountain value is consumed; the
    /// returned handle is the only way to reach the ring from now on.
    pub fn start<C: Clock>(self, clock: C) -> Result<FountainHandle, FountainError> {
        let now = clock.now();
        let ring = RatchetRing::new(&self.ratchet, self.current_step(now))?;
        let first_fire =
            Duration::from_secs(self.time_to_next_step(now).max(0) as u64) + TICK_SKEW;

        let (tx, rx) = mpsc::channel(REQUEST_BACKLOG);
        let worker = Worker {
            ring,
            start_date: self.start_date,
            duration: self.duration,
            clock,
            rx,
        };
        tokio::spawn(worker.run(first_fire));

        Ok(FountainHandle { start_date: self.start_date, duration: self.duration, tx })
    }
}

/// Requests carried on the worker channel.
enum Request {
    GetRatchet {
        reply: oneshot::Sender<RatchetState>,
    },
    GetSecret {
        expect: [u8; 32],
        peer: [u8; 32],
        reply: oneshot::Sender<Option<Zeroizing<[u8; 32]>>>,
    },
    Stop {
        reply: oneshot::Sender<RatchetState>,
    },
}

struct Worker<C: Clock> {
    ring: RatchetRing,
    start_date: i64,
    duration: i64,
    clock: C,
    rx: mpsc::Receiver<Request>,
}

impl<C: Clock> Worker<C> {
    async fn run(mut self, first_fire: Duration) {
        let mut ticker = self.clock.new_ticker(first_fire);
        let mut first = true;
        loop {
            tokio::select! {
                biased;
                _ = ticker.tick() => {
                    self.advance();
                    if first {
                        first = false;
                        ticker = self.clock.new_ticker(Duration::from_secs(self.duration as u64));
                    }
                }
                request = self.rx.recv() => {
                    match request {
                        Some(Request::GetRatchet { reply }) => {
                            let _ = reply.send(self.ring.current());
                        }
                        Some(Request::GetSecret { expect, peer, reply }) => {
                            let _ = reply.send(self.ring.secret_for(&expect, &peer));
                        }
                        Some(Request::Stop { reply }) => {
                            let _ = reply.send(self.ring.current());
                            break;
                        }
                        None => break,
                    }
                }
            }
        }
    }

    /// Catch the ring up to the step the wall clock says is current.
    fn advance(&mut self) {
        let now = self.clock.now();
        let new_step = (((now - self.start_date) / self.duration) + 1) as u64;
        if new_step > self.ring.current_step() {
            match self.ring.step_to(new_step) {
                Ok(()) => tracing::debug!(step = new_step, "fountain advanced"),
                Err(e) => tracing::error!(error = %e, "fountain cannot advance"),
            }
        }
    }
}

/// Handle to a running fountain worker.
///
/// Cheap to clone; all clones talk to the same worker. Once the worker has
/// stopped, every operation returns [`FountainError::NoService`].
#[derive(Clone)]
pub struct FountainHandle {
    start_date: i64,
    duration: i64,
    tx: mpsc::Sender<Request>,
}

impl FountainHandle {
    /// Unix second the step sequence is anchored to.
    pub fn start_date(&self) -> i64 {
        self.start_date
    }

    /// Seconds between ratchet steps.
    pub fn duration(&self) -> i64 {
        self.duration
    }

    /// Copy of the ring's current ratchet state.
    pub async fn get_ratchet(&self) -> Result<RatchetState, FountainError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::GetRatchet { reply })
            .await
            .map_err(|_| FountainError::NoService)?;
        rx.await.map_err(|_| FountainError::NoService)
    }

    /// Shared secret for the live step with public key `expect` and the
    /// peer key `peer`.
    ///
    /// This is the only cryptographic gate of the oracle: if the step is
    /// not in the ring, there is no secret, and the caller learns nothing
    /// about whether it ever existed.
    pub async fn get_secret(
        &self,
        expect: &[u8; 32],
        peer: &[u8; 32],
    ) -> Result<Zeroizing<[u8; 32]>, FountainError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::GetSecret { expect: *expect, peer: *peer, reply })
            .await
            .map_err(|_| FountainError::NoService)?;
        rx.await
            .map_err(|_| FountainError::NoService)?
            .ok_or(FountainError::RatchetNotFound)
    }

    /// Stop the worker and recover the fountain value for persistence.
    pub async fn stop(&self) -> Result<Fountain, FountainError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Stop { reply })
            .await
            .map_err(|_| FountainError::NoService)?;
        let ratchet = rx.await.map_err(|_| FountainError::NoService)?;
        Ok(Fountain { start_date: self.start_date, duration: self.duration, ratchet })
    }

    /// Marshal the running fountain by querying the worker's current state.
    pub async fn marshal(&self) -> Result<Vec<u8>, FountainError> {
        let ratchet = self.get_ratchet().await?;
        let snapshot =
            Fountain { start_date: self.start_date, duration: self.duration, ratchet };
        Ok(snapshot.marshal())
    }
}
