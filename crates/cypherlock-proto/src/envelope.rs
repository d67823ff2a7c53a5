//! The outer envelope: client → server, sealed to the server's long-term
//! Curve25519 key.
//!
//! Wire layout:
//!
//! ```text
//! receiverPublicKey(32) ∥ senderPublicKey(32) ∥ dhNonce(32) ∥ symNonce(24)
//! ∥ secretbox( validFrom(8) ∥ validTo(8) ∥ ratchetMessage )
//! ```

use cypherlock_crypto::{decrypt_key, gen_sym_nonce, open, seal, to_public_key, SECRETBOX_OVERHEAD};
use rand_core::CryptoRngCore;

use crate::ProtoError;

const PREFIX_SIZE: usize = 32 + 32 + 32 + 24;
const CLEARTEXT_HEADER_SIZE: usize = 8 + 8;
const MIN_SIZE: usize = PREFIX_SIZE + CLEARTEXT_HEADER_SIZE + SECRETBOX_OVERHEAD;

/// The message a client sends to the server.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeMessage {
    /// Server long-term public key.
    pub receiver_public_key: [u8; 32],
    /// Ephemeral sender key, set by `encrypt`.
    pub sender_public_key: [u8; 32],
    /// DH mixing nonce, set by `encrypt`.
    pub dh_nonce: [u8; 32],
    /// Symmetric nonce, set by `encrypt`.
    pub sym_nonce: [u8; 24],
    /// Validity window start the server enforces.
    pub valid_from: u64,
    /// Validity window end the server enforces.
    pub valid_to: u64,
    /// The enclosed, already-sealed ratchet message.
    pub ratchet_message: Vec<u8>,
    enc_payload: Vec<u8>,
}

impl EnvelopeMessage {
    /// Assemble an envelope around an already-sealed ratchet message.
    pub fn new(
        receiver_public_key: [u8; 32],
        valid_from: u64,
        valid_to: u64,
        ratchet_message: Vec<u8>,
    ) -> Self {
        EnvelopeMessage {
            receiver_public_key,
            valid_from,
            valid_to,
            ratchet_message,
            ..Default::default()
        }
    }

    fn prefix(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PREFIX_SIZE + CLEARTEXT_HEADER_SIZE + self.ratchet_message.len() + SECRETBOX_OVERHEAD);
        out.extend_from_slice(&self.receiver_public_key);
        out.extend_from_slice(&self.sender_public_key);
        out.extend_from_slice(&self.dh_nonce);
        out.extend_from_slice(&self.sym_nonce);
        out
    }

    fn cleartext(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CLEARTEXT_HEADER_SIZE + self.ratchet_message.len());
        out.extend_from_slice(&self.valid_from.to_be_bytes());
        out.extend_from_slice(&self.valid_to.to_be_bytes());
        out.extend_from_slice(&self.ratchet_message);
        out
    }

    /// Seal the envelope with a fresh ephemeral key and nonces.
    pub fn encrypt(&mut self, rng: &mut (impl CryptoRngCore + ?Sized)) -> Result<Vec<u8>, ProtoError> {
        let agreement = to_public_key(rng, &self.receiver_public_key)?;
        self.sym_nonce = gen_sym_nonce(rng)?;
        self.dh_nonce = agreement.dh_nonce;
        self.sender_public_key = agreement.send_key;

        let mut out = self.prefix();
        out.extend_from_slice(&seal(&agreement.secret, &self.sym_nonce, &self.cleartext()));
        Ok(out)
    }

    /// Split a wire envelope into its clear prefix and sealed payload.
    pub fn parse(d: &[u8]) -> Result<Self, ProtoError> {
        if d.len() < MIN_SIZE {
            return Err(ProtoError::MessageIncomplete);
        }
        let mut msg = EnvelopeMessage::default();
        msg.receiver_public_key.copy_from_slice(&d[0..32]);
        msg.sender_public_key.copy_from_slice(&d[32..64]);
        msg.dh_nonce.copy_from_slice(&d[64..96]);
        msg.sym_nonce.copy_from_slice(&d[96..120]);
        msg.enc_payload = d[PREFIX_SIZE..].to_vec();
        Ok(msg)
    }

    /// Open the sealed payload with the server's long-term private key.
    pub fn decrypt(&mut self, receiver_private: &[u8; 32]) -> Result<(), ProtoError> {
        let secret = decrypt_key(&self.sender_public_key, &self.dh_nonce, receiver_private);
        let cleartext = open(&secret, &self.sym_nonce, &self.enc_payload)?;

        if cleartext.len() <= CLEARTEXT_HEADER_SIZE + 1 {
            return Err(ProtoError::MessageIncomplete);
        }
        let mut field = [0u8; 8];
        field.copy_from_slice(&cleartext[0..8]);
        self.valid_from = u64::from_be_bytes(field);
        field.copy_from_slice(&cleartext[8..16]);
        self.valid_to = u64::from_be_bytes(field);
        self.ratchet_message = cleartext[CLEARTEXT_HEADER_SIZE..].to_vec();
        Ok(())
    }
}
