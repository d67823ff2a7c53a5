//! The escrowed user secret: a fixed-size padded record sealed under a
//! random key.
//!
//! The record is always `8 + 500` bytes before sealing, so the ciphertext
//! length reveals nothing about the secret's length. The random 32-byte key
//! is what the oracle protocol ultimately recovers.

use rand_core::CryptoRngCore;
use zeroize::Zeroizing;

use crate::{
    gen_random, gen_sym_nonce, open, seal, CryptoError, SECRETBOX_OVERHEAD, SYM_NONCE_SIZE,
};

/// Maximum size of a user secret.
pub const MAX_SECRET_SIZE: usize = 500;

const RECORD_SIZE: usize = 8 + MAX_SECRET_SIZE;

/// Seal a user secret under a freshly drawn key.
///
/// Returns the key and `nonce(24) ∥ secretbox(record)`.
pub fn encrypt_real_secret(
    rng: &mut (impl CryptoRngCore + ?Sized),
    real_secret: &[u8],
) -> Result<(Zeroizing<[u8; 32]>, Vec<u8>), CryptoError> {
    if real_secret.len() > MAX_SECRET_SIZE {
        return Err(CryptoError::SecretTooLong {
            len: real_secret.len(),
            max: MAX_SECRET_SIZE,
        });
    }

    let mut record = Zeroizing::new([0u8; RECORD_SIZE]);
    record[..8].copy_from_slice(&(real_secret.len() as u64).to_be_bytes());
    record[8..8 + real_secret.len()].copy_from_slice(real_secret);

    let secret_key = gen_random(rng)?;
    let nonce = gen_sym_nonce(rng)?;

    let mut out = Vec::with_capacity(SYM_NONCE_SIZE + RECORD_SIZE + SECRETBOX_OVERHEAD);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&seal(&secret_key, &nonce, record.as_ref()));
    Ok((secret_key, out))
}

/// Open a sealed user secret.
pub fn decrypt_real_secret(
    secret_key: &[u8; 32],
    encrypted: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if encrypted.len() < SYM_NONCE_SIZE + RECORD_SIZE + SECRETBOX_OVERHEAD {
        return Err(CryptoError::EncryptedTooShort);
    }
    let mut nonce = [0u8; SYM_NONCE_SIZE];
    nonce.copy_from_slice(&encrypted[..SYM_NONCE_SIZE]);

    let record = Zeroizing::new(open(secret_key, &nonce, &encrypted[SYM_NONCE_SIZE..])?);
    if record.len() < 8 {
        return Err(CryptoError::MessageIncomplete);
    }
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&record[..8]);
    let len = u64::from_be_bytes(len_bytes) as usize;
    if len > record.len() - 8 {
        return Err(CryptoError::MessageIncomplete);
    }
    Ok(record[8..8 + len].to_vec())
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use super::*;

    #[test]
    fn secret_roundtrip() {
        let (key, sealed) = encrypt_real_secret(&mut OsRng, b"hello").unwrap();
        assert_eq!(decrypt_real_secret(&key, &sealed).unwrap(), b"hello");
    }

    #[test]
    fn empty_secret_roundtrip() {
        let (key, sealed) = encrypt_real_secret(&mut OsRng, b"").unwrap();
        assert_eq!(decrypt_real_secret(&key, &sealed).unwrap(), b"");
    }

    #[test]
    fn maximum_size_roundtrip() {
        let secret = vec![0x5a; MAX_SECRET_SIZE];
        let (key, sealed) = encrypt_real_secret(&mut OsRng, &secret).unwrap();
        assert_eq!(decrypt_real_secret(&key, &sealed).unwrap(), secret);
    }

    #[test]
    fn oversized_secret_is_rejected() {
        let secret = vec![0u8; MAX_SECRET_SIZE + 1];
        assert!(matches!(
            encrypt_real_secret(&mut OsRng, &secret),
            Err(CryptoError::SecretTooLong { len: 501, max: MAX_SECRET_SIZE })
        ));
    }

    #[test]
    fn ciphertext_length_is_independent_of_secret_length() {
        let (_, a) = encrypt_real_secret(&mut OsRng, b"a").unwrap();
        let (_, b) = encrypt_real_secret(&mut OsRng, &vec![0u8; MAX_SECRET_SIZE]).unwrap();
        assert_eq!(a.len(), b.len());
    }

    #[test]
    fn truncated_ciphertext_is_too_short() {
        let (key, sealed) = encrypt_real_secret(&mut OsRng, b"hello").unwrap();
        assert_eq!(
            decrypt_real_secret(&key, &sealed[..sealed.len() - 1]),
            Err(CryptoError::EncryptedTooShort)
        );
    }

    #[test]
    fn wrong_key_is_rejected() {
        let (_, sealed) = encrypt_real_secret(&mut OsRng, b"hello").unwrap();
        assert_eq!(
            decrypt_real_secret(&[0u8; 32], &sealed),
            Err(CryptoError::DecryptionFailed)
        );
    }
}
