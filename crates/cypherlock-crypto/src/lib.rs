//! Cryptographic primitives for Cypherlock.
//!
//! Everything here is deliberately low-level and allocation-explicit: the
//! message layer above composes these primitives into fixed-offset wire
//! formats, so key and nonce sizes are part of the protocol and must not
//! drift.
//!
//! All randomness is drawn from a caller-supplied [`CryptoRngCore`]. No
//! function reaches for ambient entropy; this keeps the layer deterministic
//! under test and makes every key-generation site auditable.

mod agreement;
mod error;
mod password;
mod real_secret;
mod secretbox;

pub use agreement::{
    decrypt_key, from_ephemeral_key, ratchet_message_secret, to_ephemeral_key, to_public_key,
    to_ratchet_key, Agreement, ReplyAgreement,
};
pub use error::CryptoError;
pub use password::{password_decrypt, password_encrypt};
pub use real_secret::{decrypt_real_secret, encrypt_real_secret, MAX_SECRET_SIZE};
pub use secretbox::{open, seal, sym_decrypt, sym_encrypt, SECRETBOX_OVERHEAD};

use rand_core::CryptoRngCore;
use zeroize::Zeroizing;

/// Size of Curve25519 keys and derived symmetric keys.
pub const KEY_SIZE: usize = 32;

/// Size of the Diffie-Hellman mixing nonce.
pub const DH_NONCE_SIZE: usize = 32;

/// Size of an XSalsa20 nonce.
pub const SYM_NONCE_SIZE: usize = 24;

/// Fill a 32-byte buffer from the random source.
pub fn gen_random(rng: &mut (impl CryptoRngCore + ?Sized)) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let mut out = Zeroizing::new([0u8; 32]);
    rng.try_fill_bytes(out.as_mut())
        .map_err(|e| CryptoError::Rng(e.to_string()))?;
    Ok(out)
}

/// Draw a fresh 24-byte symmetric nonce.
pub fn gen_sym_nonce(
    rng: &mut (impl CryptoRngCore + ?Sized),
) -> Result<[u8; SYM_NONCE_SIZE], CryptoError> {
    let mut nonce = [0u8; SYM_NONCE_SIZE];
    rng.try_fill_bytes(&mut nonce)
        .map_err(|e| CryptoError::Rng(e.to_string()))?;
    Ok(nonce)
}

/// Generate a Curve25519 keypair. The private key is raw scalar bytes;
/// clamping happens inside the scalar multiplication.
pub fn gen_keypair(
    rng: &mut (impl CryptoRngCore + ?Sized),
) -> Result<([u8; 32], Zeroizing<[u8; 32]>), CryptoError> {
    let private = gen_random(rng)?;
    Ok((public_key(&private), private))
}

/// Curve25519 base-point multiplication.
pub fn public_key(private: &[u8; 32]) -> [u8; 32] {
    let secret = x25519_dalek::StaticSecret::from(*private);
    x25519_dalek::PublicKey::from(&secret).to_bytes()
}
