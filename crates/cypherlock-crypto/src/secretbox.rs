//! XSalsa20-Poly1305 sealing in the NaCl layout (16-byte tag prefix).

use crypto_secretbox::{
    aead::{Aead, KeyInit},
    Nonce, XSalsa20Poly1305,
};
use rand_core::CryptoRngCore;

use crate::{gen_sym_nonce, CryptoError, SYM_NONCE_SIZE};

/// Poly1305 tag size added by every seal.
pub const SECRETBOX_OVERHEAD: usize = 16;

/// Seal `plaintext` under `key` with an explicit nonce.
///
/// Returns tag-prefixed ciphertext without the nonce; callers that transmit
/// the nonce place it in their own layout.
pub fn seal(key: &[u8; 32], nonce: &[u8; SYM_NONCE_SIZE], plaintext: &[u8]) -> Vec<u8> {
    let cipher = XSalsa20Poly1305::new(key.into());
    let Ok(ciphertext) = cipher.encrypt(Nonce::from_slice(nonce), plaintext) else {
        unreachable!("XSalsa20-Poly1305 encryption cannot fail with valid inputs");
    };
    ciphertext
}

/// Open a tag-prefixed ciphertext.
pub fn open(
    key: &[u8; 32],
    nonce: &[u8; SYM_NONCE_SIZE],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XSalsa20Poly1305::new(key.into());
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Seal a message with a fresh random nonce, nonce-prefixed:
/// `nonce(24) ∥ seal(message)`.
pub fn sym_encrypt(
    rng: &mut (impl CryptoRngCore + ?Sized),
    key: &[u8; 32],
    message: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let nonce = gen_sym_nonce(rng)?;
    let mut out = Vec::with_capacity(SYM_NONCE_SIZE + message.len() + SECRETBOX_OVERHEAD);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&seal(key, &nonce, message));
    Ok(out)
}

/// Open a nonce-prefixed sealed message.
pub fn sym_decrypt(key: &[u8; 32], message: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if message.len() < SYM_NONCE_SIZE + SECRETBOX_OVERHEAD + 1 {
        return Err(CryptoError::MessageIncomplete);
    }
    let mut nonce = [0u8; SYM_NONCE_SIZE];
    nonce.copy_from_slice(&message[..SYM_NONCE_SIZE]);
    open(key, &nonce, &message[SYM_NONCE_SIZE..])
}
