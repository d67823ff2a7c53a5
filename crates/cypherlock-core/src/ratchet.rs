//! The keyed ratchet producing a deterministic sequence of Curve25519
//! keypairs.
//!
//! Each step mixes a per-ratchet static element into the evolving dynamic
//! element with HMAC-SHA256 and derives the step's keypair from the result.
//! Stepping is one-way: recovering an earlier private key from a later
//! state requires inverting HMAC.

use hmac::{Hmac, Mac};
use rand_core::CryptoRngCore;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

use crate::RatchetError;

type HmacSha256 = Hmac<Sha256>;

/// Marshalled size: counter(8) ∥ static(32) ∥ dynamic(32) ∥ private(32)
/// ∥ public(32).
pub const RATCHET_STATE_SIZE: usize = 136;

/// One position of the ratchet sequence.
///
/// Cloning produces a fully independent value; no key material is shared.
/// Dropped states scrub their secret elements.
#[derive(Clone, PartialEq, Eq)]
pub struct RatchetState {
    counter: u64,
    static_key: [u8; 32],
    dynamic_key: [u8; 32],
    private_key: [u8; 32],
    public_key: [u8; 32],
}

impl RatchetState {
    /// Seed a new ratchet from the random source and perform the initial
    /// step, so the counter of a fresh ratchet is 1.
    pub fn generate(rng: &mut (impl CryptoRngCore + ?Sized)) -> Result<Self, RatchetError> {
        let mut state = RatchetState {
            counter: 0,
            static_key: [0u8; 32],
            dynamic_key: [0u8; 32],
            private_key: [0u8; 32],
            public_key: [0u8; 32],
        };
        rng.try_fill_bytes(&mut state.static_key)
            .map_err(|e| RatchetError::Rng(e.to_string()))?;
        rng.try_fill_bytes(&mut state.dynamic_key)
            .map_err(|e| RatchetError::Rng(e.to_string()))?;
        state.step();
        Ok(state)
    }

    /// Current step counter.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Curve25519 public key of the current step.
    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }

    /// Advance the ratchet by one step.
    ///
    /// `dynamic ← HMAC(static, counter ∥ dynamic)`, then the keypair is
    /// rederived from the new dynamic element.
    pub fn step(&mut self) {
        self.counter += 1;

        let Ok(mut mac) = HmacSha256::new_from_slice(&self.static_key) else {
            unreachable!("HMAC-SHA256 accepts any key size");
        };
        mac.update(&self.counter.to_be_bytes());
        mac.update(&self.dynamic_key);
        let next = mac.finalize().into_bytes();

        self.dynamic_key.zeroize();
        self.dynamic_key.copy_from_slice(&next);
        self.generate_keys();
    }

    /// Derive the step keypair from the current static and dynamic elements.
    fn generate_keys(&mut self) {
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.dynamic_key) else {
            unreachable!("HMAC-SHA256 accepts any key size");
        };
        mac.update(&self.static_key);
        let digest = mac.finalize().into_bytes();

        self.private_key.zeroize();
        self.private_key.copy_from_slice(&digest);
        self.public_key = cypherlock_crypto::public_key(&self.private_key);
    }

    /// `SHA-256(X25519(private, peer))`.
    ///
    /// This hashed form is what the fountain hands out; the raw DH result
    /// never leaves the ratchet.
    pub fn shared_secret(&self, peer_public: &[u8; 32]) -> Zeroizing<[u8; 32]> {
        let secret = x25519_dalek::StaticSecret::from(self.private_key);
        let peer = x25519_dalek::PublicKey::from(*peer_public);
        let dh = Zeroizing::new(secret.diffie_hellman(&peer).to_bytes());

        let mut out = Zeroizing::new([0u8; 32]);
        out.copy_from_slice(&Sha256::digest(dh.as_ref()));
        out
    }

    /// Encode to the fixed 136-byte layout.
    pub fn marshal(&self) -> [u8; RATCHET_STATE_SIZE] {
        let mut out = [0u8; RATCHET_STATE_SIZE];
        out[..8].copy_from_slice(&self.counter.to_be_bytes());
        out[8..40].copy_from_slice(&self.static_key);
        out[40..72].copy_from_slice(&self.dynamic_key);
        out[72..104].copy_from_slice(&self.private_key);
        out[104..136].copy_from_slice(&self.public_key);
        out
    }

    /// Decode from the fixed 136-byte layout.
    pub fn unmarshal(d: &[u8]) -> Result<Self, RatchetError> {
        if d.len() != RATCHET_STATE_SIZE {
            return Err(RatchetError::InvalidLength {
                got: d.len(),
                expected: RATCHET_STATE_SIZE,
            });
        }
        let mut counter_bytes = [0u8; 8];
        counter_bytes.copy_from_slice(&d[..8]);

        let mut state = RatchetState {
            counter: u64::from_be_bytes(counter_bytes),
            static_key: [0u8; 32],
            dynamic_key: [0u8; 32],
            private_key: [0u8; 32],
            public_key: [0u8; 32],
        };
        state.static_key.copy_from_slice(&d[8..40]);
        state.dynamic_key.copy_from_slice(&d[40..72]);
        state.private_key.copy_from_slice(&d[72..104]);
        state.public_key.copy_from_slice(&d[104..136]);
        Ok(state)
    }
}

impl Drop for RatchetState {
    fn drop(&mut self) {
        self.static_key.zeroize();
        self.dynamic_key.zeroize();
        self.private_key.zeroize();
    }
}

impl std::fmt::Debug for RatchetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatchetState")
            .field("counter", &self.counter)
            .field("public_key", &hex_prefix(&self.public_key))
            .finish_non_exhaustive()
    }
}

fn hex_prefix(key: &[u8; 32]) -> String {
    key[..4].iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use super::*;

    #[test]
    fn fresh_ratchet_starts_at_counter_one() {
        let r = RatchetState::generate(&mut OsRng).unwrap();
        assert_eq!(r.counter(), 1);
    }

    #[test]
    fn step_changes_everything_but_static() {
        let mut r = RatchetState::generate(&mut OsRng).unwrap();
        let before = r.clone();

        r.step();

        assert_eq!(r.counter(), before.counter() + 1);
        assert_eq!(r.static_key, before.static_key);
        assert_ne!(r.dynamic_key, before.dynamic_key);
        assert_ne!(r.private_key, before.private_key);
        assert_ne!(r.public_key, before.public_key);
    }

    #[test]
    fn stepping_is_deterministic() {
        let r = RatchetState::generate(&mut OsRng).unwrap();
        let mut a = r.clone();
        let mut b = r.clone();

        for _ in 0..16 {
            a.step();
            b.step();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn marshal_roundtrip() {
        let mut r = RatchetState::generate(&mut OsRng).unwrap();
        r.step();
        r.step();

        let encoded = r.marshal();
        assert_eq!(encoded.len(), RATCHET_STATE_SIZE);

        let decoded = RatchetState::unmarshal(&encoded).unwrap();
        assert_eq!(decoded, r);
    }

    #[test]
    fn unmarshal_rejects_wrong_length() {
        let r = RatchetState::generate(&mut OsRng).unwrap();
        let encoded = r.marshal();

        assert!(matches!(
            RatchetState::unmarshal(&encoded[..RATCHET_STATE_SIZE - 1]),
            Err(RatchetError::InvalidLength { got: 135, expected: RATCHET_STATE_SIZE })
        ));
        assert!(RatchetState::unmarshal(&[]).is_err());
    }

    #[test]
    fn shared_secret_matches_peer_computation() {
        let r = RatchetState::generate(&mut OsRng).unwrap();
        let (peer_public, peer_private) = cypherlock_crypto::gen_keypair(&mut OsRng).unwrap();

        let ours = r.shared_secret(&peer_public);

        // Peer side: X25519 with the ratchet public key, then SHA-256.
        let secret = x25519_dalek::StaticSecret::from(*peer_private);
        let public = x25519_dalek::PublicKey::from(*r.public_key());
        let dh = secret.diffie_hellman(&public);
        let theirs = sha2::Sha256::digest(dh.as_bytes());

        assert_eq!(ours.as_ref(), theirs.as_slice());
    }

    #[test]
    fn clone_is_independent() {
        let mut r = RatchetState::generate(&mut OsRng).unwrap();
        let snapshot = r.clone();
        r.step();
        assert_ne!(r, snapshot);
        assert_eq!(snapshot.counter() + 1, r.counter());
    }
}
