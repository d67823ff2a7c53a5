//! The oracle message: everything the client keeps, passphrase-sealed, to
//! ask the server for a decryption during the validity window.
//!
//! Marshalled layout (lengths are 8-byte big-endian):
//!
//! ```text
//! validFrom(8) ∥ validTo(8) ∥ responsePrivateKey(32)
//! ∥ len ∥ encryptedSecretKey ∥ len ∥ serverURL ∥ len ∥ serverMessage
//! ```
//!
//! The persisted file is `password_encrypt` of that, named
//! `<validFrom>-<validTo>.oracle`.

use cypherlock_crypto::{gen_random, password_decrypt, password_encrypt, sym_decrypt, sym_encrypt};
use rand_core::CryptoRngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::{EnvelopeMessage, ProtoError, RatchetMessage, ResponseMessage};

const FIXED_HEADER_SIZE: usize = 8 + 8 + 32;
const MIN_SIZE: usize = FIXED_HEADER_SIZE + (8 + 1) * 3;

/// A stored lock: the sealed server request plus what is needed to use the
/// reply.
#[derive(Clone)]
pub struct OracleMessage {
    /// Unix second the lock becomes usable.
    pub valid_from: u64,
    /// Unix second the lock expires.
    pub valid_to: u64,
    /// Private half of the one-time reply key.
    pub response_private_key: [u8; 32],
    /// The escrow key, sealed under the key the server will recover.
    pub encrypted_secret_key: Vec<u8>,
    /// Where to send the server message.
    pub server_url: String,
    /// The sealed envelope for the server.
    pub server_message: Vec<u8>,
}

impl Drop for OracleMessage {
    fn drop(&mut self) {
        self.response_private_key.zeroize();
    }
}

impl std::fmt::Debug for OracleMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleMessage")
            .field("valid_from", &self.valid_from)
            .field("valid_to", &self.valid_to)
            .field("server_url", &self.server_url)
            .finish_non_exhaustive()
    }
}

fn put_slice(out: &mut Vec<u8>, d: &[u8]) {
    out.extend_from_slice(&(d.len() as u64).to_be_bytes());
    out.extend_from_slice(d);
}

/// Cursor over length-prefixed fields; every read is bounds-checked.
struct Cursor<'a> {
    d: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtoError> {
        let end = self.pos.checked_add(n).ok_or(ProtoError::MessageIncomplete)?;
        if end > self.d.len() {
            return Err(ProtoError::MessageIncomplete);
        }
        let out = &self.d[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn take_u64(&mut self) -> Result<u64, ProtoError> {
        let mut field = [0u8; 8];
        field.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(field))
    }

    fn take_prefixed(&mut self) -> Result<&'a [u8], ProtoError> {
        let len = self.take_u64()?;
        let len = usize::try_from(len).map_err(|_| ProtoError::MessageIncomplete)?;
        self.take(len)
    }
}

impl OracleMessage {
    /// True while `now` lies inside the validity window.
    pub fn is_valid_at(&self, now: u64) -> bool {
        self.valid_from <= now && now <= self.valid_to
    }

    /// Encode to the length-prefixed binary form.
    pub fn marshal(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            MIN_SIZE
                + self.encrypted_secret_key.len()
                + self.server_url.len()
                + self.server_message.len(),
        );
        out.extend_from_slice(&self.valid_from.to_be_bytes());
        out.extend_from_slice(&self.valid_to.to_be_bytes());
        out.extend_from_slice(&self.response_private_key);
        put_slice(&mut out, &self.encrypted_secret_key);
        put_slice(&mut out, self.server_url.as_bytes());
        put_slice(&mut out, &self.server_message);
        out
    }

    /// Decode the length-prefixed binary form.
    pub fn unmarshal(d: &[u8]) -> Result<Self, ProtoError> {
        if d.len() < MIN_SIZE {
            return Err(ProtoError::MessageIncomplete);
        }
        let mut cursor = Cursor { d, pos: 0 };
        let valid_from = cursor.take_u64()?;
        let valid_to = cursor.take_u64()?;
        let mut response_private_key = [0u8; 32];
        response_private_key.copy_from_slice(cursor.take(32)?);
        let encrypted_secret_key = cursor.take_prefixed()?.to_vec();
        let server_url = String::from_utf8(cursor.take_prefixed()?.to_vec())
            .map_err(|_| ProtoError::Parse)?;
        let server_message = cursor.take_prefixed()?.to_vec();
        Ok(OracleMessage {
            valid_from,
            valid_to,
            response_private_key,
            encrypted_secret_key,
            server_url,
            server_message,
        })
    }

    /// Seal under a passphrase; returns the ciphertext and the lock
    /// filename for the window.
    pub fn encrypt(
        &self,
        passphrase: &[u8],
        rng: &mut (impl CryptoRngCore + ?Sized),
    ) -> Result<(Vec<u8>, String), ProtoError> {
        let marshalled = Zeroizing::new(self.marshal());
        let sealed = password_encrypt(rng, passphrase, &marshalled)?;
        Ok((sealed, lock_filename(self.valid_from, self.valid_to)))
    }

    /// Open a passphrase-sealed oracle message.
    pub fn decrypt(passphrase: &[u8], message: &[u8]) -> Result<Self, ProtoError> {
        let marshalled = Zeroizing::new(password_decrypt(passphrase, message)?);
        OracleMessage::unmarshal(&marshalled)
    }

    /// Recover the escrow key from the server's reply: open the response
    /// message with the one-time private key, then open the stored
    /// `encrypted_secret_key` with the payload.
    pub fn process_response(&self, d: &[u8]) -> Result<Zeroizing<[u8; 32]>, ProtoError> {
        let mut response = ResponseMessage::parse(d)?;
        response.decrypt(&self.response_private_key)?;

        if response.payload.len() != 32 {
            return Err(ProtoError::MessageIncomplete);
        }
        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&response.payload);

        let secret = Zeroizing::new(sym_decrypt(&key, &self.encrypted_secret_key)?);
        if secret.len() != 32 {
            return Err(ProtoError::MessageIncomplete);
        }
        let mut secret_key = Zeroizing::new([0u8; 32]);
        secret_key.copy_from_slice(&secret);
        Ok(secret_key)
    }
}

/// The inputs needed to build one oracle message.
#[derive(Debug, Clone)]
pub struct OracleMessageTemplate {
    /// Window start, from the match key.
    pub valid_from: u64,
    /// Window end, from the match key.
    pub valid_to: u64,
    /// Where the lock will be redeemed.
    pub server_url: String,
    /// Server's long-term envelope key.
    pub server_public_key: [u8; 32],
    /// Ratchet public key of the covered step.
    pub ratchet_public_key: [u8; 32],
}

impl OracleMessageTemplate {
    /// Build the full three-layer message set around `secret_key`.
    ///
    /// The escrow key is sealed under a fresh `secretEncryptKey`; that key
    /// rides inside the ratchet layer, which rides inside the envelope.
    pub fn create(
        &self,
        secret_key: &[u8; 32],
        rng: &mut (impl CryptoRngCore + ?Sized),
    ) -> Result<OracleMessage, ProtoError> {
        let secret_encrypt_key = gen_random(rng)?;
        let encrypted_secret_key = sym_encrypt(rng, &secret_encrypt_key, secret_key)?;

        let (mut ratchet_msg, receive_private) = RatchetMessage::new(
            self.ratchet_public_key,
            secret_encrypt_key.to_vec(),
            rng,
        )?;
        let ratchet_bytes = ratchet_msg.encrypt(rng)?;

        let mut envelope = EnvelopeMessage::new(
            self.server_public_key,
            self.valid_from,
            self.valid_to,
            ratchet_bytes,
        );
        let server_message = envelope.encrypt(rng)?;

        Ok(OracleMessage {
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            response_private_key: *receive_private,
            encrypted_secret_key,
            server_url: self.server_url.clone(),
            server_message,
        })
    }

    /// [`Self::create`] followed by passphrase sealing.
    pub fn create_encrypted(
        &self,
        passphrase: &[u8],
        secret_key: &[u8; 32],
        rng: &mut (impl CryptoRngCore + ?Sized),
    ) -> Result<(Vec<u8>, String), ProtoError> {
        self.create(secret_key, rng)?.encrypt(passphrase, rng)
    }
}

/// Lock filename for a validity window: `<from>-<to>.oracle`.
pub fn lock_filename(valid_from: u64, valid_to: u64) -> String {
    format!("{valid_from}-{valid_to}.oracle")
}
