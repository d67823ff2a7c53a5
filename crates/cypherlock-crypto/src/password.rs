//! Passphrase sealing: Argon2id key derivation over the secretbox.
//!
//! Layout: `salt(32) ∥ nonce(24) ∥ secretbox(message)`.

use argon2::{Algorithm, Argon2, Params, Version};
use rand_core::CryptoRngCore;
use zeroize::Zeroizing;

use crate::{gen_random, sym_decrypt, sym_encrypt, CryptoError, SECRETBOX_OVERHEAD, SYM_NONCE_SIZE};

const SALT_SIZE: usize = 32;

/// Argon2id passes.
const KDF_TIME: u32 = 1;
/// Argon2id memory in KiB (64 MiB).
const KDF_MEMORY: u32 = 64 * 1024;
/// Argon2id lanes.
const KDF_LANES: u32 = 4;

/// Derive a 32-byte key from a passphrase and salt.
fn key_from_password(password: &[u8], salt: &[u8; SALT_SIZE]) -> Zeroizing<[u8; 32]> {
    let Ok(params) = Params::new(KDF_MEMORY, KDF_TIME, KDF_LANES, Some(32)) else {
        unreachable!("fixed Argon2 parameters are valid");
    };
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; 32]);
    let Ok(()) = argon.hash_password_into(password, salt, key.as_mut()) else {
        unreachable!("32-byte output and 32-byte salt are within Argon2 limits");
    };
    key
}

/// Seal a message under a passphrase with a fresh random salt.
pub fn password_encrypt(
    rng: &mut (impl CryptoRngCore + ?Sized),
    password: &[u8],
    message: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let salt = gen_random(rng)?;
    let key = key_from_password(password, &salt);
    let sealed = sym_encrypt(rng, &key, message)?;

    let mut out = Vec::with_capacity(SALT_SIZE + sealed.len());
    out.extend_from_slice(salt.as_ref());
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Open a passphrase-sealed message.
pub fn password_decrypt(password: &[u8], message: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if message.len() < SALT_SIZE + SYM_NONCE_SIZE + SECRETBOX_OVERHEAD + 1 {
        return Err(CryptoError::MessageIncomplete);
    }
    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(&message[..SALT_SIZE]);
    let key = key_from_password(password, &salt);
    sym_decrypt(&key, &message[SALT_SIZE..])
}
