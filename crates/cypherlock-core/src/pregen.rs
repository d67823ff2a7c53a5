//! Pregeneration: publishing ratchet public keys for steps the fountain
//! has not reached yet.
//!
//! The pregenerator owns a shadow copy of the fountain's ratchet taken at
//! creation time and never touches the live ring; that independence is the
//! whole point of it being a separate component. Each run emits a
//! contiguous, hash-chained run of future entries for the server to sign.

use std::time::Duration;

use cypherlock_proto::{PregenerateEntry, RatchetListBuilder};

use crate::{Fountain, FountainError, RatchetState};

/// Marshalled size: startDate(8) ∥ duration(8) ∥ lastCounter(8)
/// ∥ pregenInterval(8) ∥ lastLineHash(32).
const PREGEN_STATE_SIZE: usize = 64;

/// Walks a shadow ratchet ahead of the fountain and emits keylists.
///
/// Not concurrency-safe; a single periodic task must be its only driver.
#[derive(Debug, Clone)]
pub struct Pregenerator {
    ratchet: RatchetState,
    start_date: i64,
    duration: i64,
    pregen_interval: i64,
    last_counter: u64,
    last_line_hash: [u8; 32],
}

impl Pregenerator {
    /// Shadow a freshly created fountain. Only valid at fountain creation;
    /// use [`Pregenerator::unmarshal`] when restoring persisted state.
    pub fn from_fountain(fountain: &Fountain, pregen_interval: Duration) -> Self {
        Pregenerator {
            ratchet: fountain.ratchet().clone(),
            start_date: fountain.start_date(),
            duration: fountain.duration(),
            pregen_interval: pregen_interval.as_secs() as i64,
            last_counter: 1,
            last_line_hash: [0u8; 32],
        }
    }

    /// Encode the pregenerator's bookkeeping (64 bytes). The shadow ratchet
    /// is not persisted; it is re-obtained from the fountain on load.
    pub fn marshal(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PREGEN_STATE_SIZE);
        out.extend_from_slice(&(self.start_date as u64).to_be_bytes());
        out.extend_from_slice(&(self.duration as u64).to_be_bytes());
        out.extend_from_slice(&self.last_counter.to_be_bytes());
        out.extend_from_slice(&(self.pregen_interval as u64).to_be_bytes());
        out.extend_from_slice(&self.last_line_hash);
        out
    }

    /// Decode persisted bookkeeping, re-seeding the shadow from the loaded
    /// fountain.
    pub fn unmarshal(fountain: &Fountain, d: &[u8]) -> Result<Self, FountainError> {
        if d.len() < PREGEN_STATE_SIZE {
            return Err(FountainError::InvalidState);
        }
        let mut field = [0u8; 8];
        field.copy_from_slice(&d[..8]);
        let start_date = u64::from_be_bytes(field) as i64;
        field.copy_from_slice(&d[8..16]);
        let duration = u64::from_be_bytes(field) as i64;
        field.copy_from_slice(&d[16..24]);
        let last_counter = u64::from_be_bytes(field);
        field.copy_from_slice(&d[24..32]);
        let pregen_interval = u64::from_be_bytes(field) as i64;
        let mut last_line_hash = [0u8; 32];
        last_line_hash.copy_from_slice(&d[32..64]);

        if duration < 1 {
            return Err(FountainError::InvalidDuration);
        }
        Ok(Pregenerator {
            ratchet: fountain.ratchet().clone(),
            start_date,
            duration,
            pregen_interval,
            last_counter,
            last_line_hash,
        })
    }

    /// Counter of the shadow ratchet.
    pub fn shadow_counter(&self) -> u64 {
        self.ratchet.counter()
    }

    /// Last counter a generation run committed to.
    pub fn last_counter(&self) -> u64 {
        self.last_counter
    }

    /// Emit the next keylist, or `None` when pregeneration is not due.
    ///
    /// Due-ness: with `stepsPeriod = max(2, pregenInterval / duration)`,
    /// generation happens only while
    /// `currentStep.wrapping_sub(lastCounter) < stepsPeriod / 2` — i.e. on
    /// the first run, and again once the current step has reached the end
    /// of the previously generated range. While the generated range is
    /// still ahead of now, the wrapped difference is huge and the check
    /// reads "not due".
    pub fn generate(&mut self, now: i64) -> Option<RatchetListBuilder> {
        let current_step = (((now - self.start_date) / self.duration) + 1) as u64;
        if current_step > self.ratchet.counter() {
            // Inclusive catch-up: lands one step past current_step, so the
            // emitted run starts at the following window.
            for _ in self.ratchet.counter()..=current_step {
                self.ratchet.step();
            }
        }

        let steps_period = ((self.pregen_interval / self.duration) as u64).max(2);
        if current_step.wrapping_sub(self.last_counter) >= steps_period / 2 {
            return None;
        }

        let mut work = self.ratchet.clone();
        let mut builder = RatchetListBuilder::new(self.last_line_hash, steps_period as usize + 1);
        let mut previous = if self.last_line_hash == [0u8; 32] {
            None
        } else {
            Some(self.last_line_hash)
        };

        for _ in 0..=steps_period {
            let valid_from = (self.start_date + (work.counter() as i64 - 1) * self.duration) as u64;
            let valid_to = valid_from + self.duration as u64;
            let entry = PregenerateEntry::new(
                previous.as_ref(),
                work.counter(),
                valid_from,
                valid_to,
                *work.public_key(),
            );
            previous = Some(entry.line_hash);
            builder.append(entry);
            work.step();
        }

        self.ratchet = work;
        self.last_counter = self.ratchet.counter();
        Some(builder)
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    use super::*;
    use crate::MockClock;

    fn fountain_at(start: i64, duration: i64) -> Fountain {
        let clock = MockClock::new(start);
        Fountain::new(duration, &mut OsRng, &clock).unwrap()
    }

    fn signed(builder: RatchetListBuilder) -> cypherlock_proto::RatchetList {
        builder.sign([7u8; 32], &SigningKey::generate(&mut OsRng))
    }

    #[test]
    fn first_generation_covers_from_start() {
        let fountain = fountain_at(10_000, 3600);
        let mut pregen = Pregenerator::from_fountain(&fountain, Duration::from_secs(24 * 3600));

        let list = signed(pregen.generate(10_000).unwrap());

        // stepsPeriod = 24, inclusive loop → 25 entries starting at step 1.
        assert_eq!(list.entries.len(), 25);
        assert_eq!(list.entries[0].counter, 1);
        assert_eq!(list.entries[0].valid_from, 10_000);
        assert_eq!(list.entries[0].valid_to, 10_000 + 3600);

        // Contiguous, no overlap, no gap.
        for pair in list.entries.windows(2) {
            assert_eq!(pair[0].valid_to, pair[1].valid_from);
            assert_eq!(pair[0].counter + 1, pair[1].counter);
        }
    }

    #[test]
    fn entries_are_hash_chained() {
        let fountain = fountain_at(0, 3600);
        let mut pregen = Pregenerator::from_fountain(&fountain, Duration::from_secs(10 * 3600));
        let list = signed(pregen.generate(0).unwrap());

        assert!(list.entries[0].validate(None));
        for pair in list.entries.windows(2) {
            assert!(pair[1].validate(Some(&pair[0].line_hash)));
        }
    }

    #[test]
    fn second_call_without_time_advance_is_absent() {
        let fountain = fountain_at(0, 3600);
        let mut pregen = Pregenerator::from_fountain(&fountain, Duration::from_secs(24 * 3600));

        assert!(pregen.generate(0).is_some());
        assert!(pregen.generate(0).is_none());
    }

    #[test]
    fn regeneration_happens_when_current_step_reaches_committed_range_end() {
        let duration = 3600i64;
        let fountain = fountain_at(0, duration);
        let mut pregen = Pregenerator::from_fountain(&fountain, Duration::from_secs(24 * 3600));
        pregen.generate(0).unwrap();
        let committed = pregen.last_counter();

        // Still inside the generated range: not due.
        let mid = (committed as i64 - 2) * duration;
        assert!(pregen.generate(mid).is_none());

        // At the end of the range: due again.
        let at_end = (committed as i64 - 1) * duration;
        assert!(pregen.generate(at_end).is_some());
    }

    #[test]
    fn minimum_steps_period_is_two() {
        // pregenInterval equal to duration would give a period of 1; it is
        // clamped to 2, so a run emits 3 entries.
        let fountain = fountain_at(0, 3600);
        let mut pregen = Pregenerator::from_fountain(&fountain, Duration::from_secs(3600));
        let list = signed(pregen.generate(0).unwrap());
        assert_eq!(list.entries.len(), 3);
    }

    #[test]
    fn catch_up_overshoots_by_one_step() {
        // Historical behavior, kept on purpose: catching the shadow up to
        // the current step uses an inclusive loop, so it lands one past the
        // step that is actually current and the emitted run starts at the
        // following window.
        let duration = 3600i64;
        let fountain = fountain_at(0, duration);
        let mut pregen = Pregenerator::from_fountain(&fountain, Duration::from_secs(24 * 3600));
        pregen.generate(0).unwrap();
        let committed = pregen.last_counter();

        let now = committed as i64 * duration; // current step == committed + 1
        let current_step = committed + 1;
        let list = signed(pregen.generate(now).unwrap());
        assert_eq!(list.entries[0].counter, current_step + 1);
    }

    #[test]
    fn shadow_is_not_rewound_to_last_counter() {
        // Historical behavior, kept on purpose: a shadow ratchet sitting
        // behind lastCounter (the restore-from-disk situation) is not
        // fast-forwarded before generating.
        let fountain = fountain_at(0, 3600);
        let mut pregen = Pregenerator::from_fountain(&fountain, Duration::from_secs(24 * 3600));
        pregen.generate(0).unwrap();

        let restored = Pregenerator::unmarshal(&fountain, &pregen.marshal()).unwrap();
        assert_eq!(restored.shadow_counter(), fountain.ratchet().counter());
        assert!(restored.shadow_counter() < restored.last_counter());
    }

    #[test]
    fn marshal_roundtrip() {
        let fountain = fountain_at(5000, 60);
        let mut pregen = Pregenerator::from_fountain(&fountain, Duration::from_secs(1000));
        pregen.last_counter = 12_093;
        pregen.last_line_hash[3] = 0xff;

        let encoded = pregen.marshal();
        assert_eq!(encoded.len(), PREGEN_STATE_SIZE);

        let decoded = Pregenerator::unmarshal(&fountain, &encoded).unwrap();
        assert_eq!(decoded.start_date, pregen.start_date);
        assert_eq!(decoded.duration, pregen.duration);
        assert_eq!(decoded.pregen_interval, pregen.pregen_interval);
        assert_eq!(decoded.last_counter, pregen.last_counter);
        assert_eq!(decoded.last_line_hash, pregen.last_line_hash);
        assert_eq!(&decoded.ratchet, fountain.ratchet());
    }

    #[test]
    fn unmarshal_rejects_truncation() {
        let fountain = fountain_at(0, 60);
        let pregen = Pregenerator::from_fountain(&fountain, Duration::from_secs(1000));
        let encoded = pregen.marshal();
        assert!(Pregenerator::unmarshal(&fountain, &encoded[..63]).is_err());
    }
}
