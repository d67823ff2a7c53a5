//! The server's reply: the recovered payload sealed to the client's
//! one-time receiver key.
//!
//! Wire layout:
//!
//! ```text
//! receiverPublicKey(32) ∥ ephemeralPublicKey(32) ∥ senderPublicKey(32)
//! ∥ dhNonce(32) ∥ symNonce(24) ∥ secretbox(payload)
//! ```
//!
//! The sealing secret combines two DH computations (server long-term and
//! ephemeral, both against the receiver key); see
//! [`cypherlock_crypto::to_ephemeral_key`].

use cypherlock_crypto::{from_ephemeral_key, gen_sym_nonce, open, seal, to_ephemeral_key, SECRETBOX_OVERHEAD};
use rand_core::CryptoRngCore;

use crate::ProtoError;

const PREFIX_SIZE: usize = 32 + 32 + 32 + 32 + 24;
const MIN_SIZE: usize = PREFIX_SIZE + SECRETBOX_OVERHEAD + 1;

/// A reply containing a decrypted oracle payload.
#[derive(Debug, Clone, Default)]
pub struct ResponseMessage {
    /// The one-time key from the ratchet message.
    pub receiver_public_key: [u8; 32],
    /// Fresh ephemeral key, set by `encrypt`.
    pub ephemeral_public_key: [u8; 32],
    /// Server long-term public key.
    pub sender_public_key: [u8; 32],
    /// DH mixing nonce, set by `encrypt`.
    pub dh_nonce: [u8; 32],
    /// Symmetric nonce, set by `encrypt`.
    pub sym_nonce: [u8; 24],
    /// The enclosed payload.
    pub payload: Vec<u8>,
    enc_payload: Vec<u8>,
}

impl ResponseMessage {
    /// Assemble a reply from the server key, the one-time receiver key and
    /// the recovered payload.
    pub fn new(sender_public_key: [u8; 32], receiver_public_key: [u8; 32], payload: Vec<u8>) -> Self {
        ResponseMessage {
            sender_public_key,
            receiver_public_key,
            payload,
            ..Default::default()
        }
    }

    fn prefix(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PREFIX_SIZE + self.payload.len() + SECRETBOX_OVERHEAD);
        out.extend_from_slice(&self.receiver_public_key);
        out.extend_from_slice(&self.ephemeral_public_key);
        out.extend_from_slice(&self.sender_public_key);
        out.extend_from_slice(&self.dh_nonce);
        out.extend_from_slice(&self.sym_nonce);
        out
    }

    /// Seal the reply with the server's long-term private key and a fresh
    /// ephemeral.
    pub fn encrypt(
        &mut self,
        server_private: &[u8; 32],
        rng: &mut (impl CryptoRngCore + ?Sized),
    ) -> Result<Vec<u8>, ProtoError> {
        self.sym_nonce = gen_sym_nonce(rng)?;
        let reply = to_ephemeral_key(rng, &self.receiver_public_key, server_private)?;
        self.ephemeral_public_key = reply.ephemeral_key;
        self.dh_nonce = reply.dh_nonce;

        let mut out = self.prefix();
        out.extend_from_slice(&seal(&reply.secret, &self.sym_nonce, &self.payload));
        Ok(out)
    }

    /// Split a wire response into prefix and sealed payload.
    pub fn parse(d: &[u8]) -> Result<Self, ProtoError> {
        if d.len() < MIN_SIZE {
            return Err(ProtoError::MessageIncomplete);
        }
        let mut msg = ResponseMessage::default();
        msg.receiver_public_key.copy_from_slice(&d[0..32]);
        msg.ephemeral_public_key.copy_from_slice(&d[32..64]);
        msg.sender_public_key.copy_from_slice(&d[64..96]);
        msg.dh_nonce.copy_from_slice(&d[96..128]);
        msg.sym_nonce.copy_from_slice(&d[128..152]);
        msg.enc_payload = d[PREFIX_SIZE..].to_vec();
        Ok(msg)
    }

    /// Open the payload with the one-time receiver private key.
    pub fn decrypt(&mut self, receiver_private: &[u8; 32]) -> Result<(), ProtoError> {
        let secret = from_ephemeral_key(
            &self.dh_nonce,
            &self.ephemeral_public_key,
            &self.sender_public_key,
            receiver_private,
        );
        self.payload = open(&secret, &self.sym_nonce, &self.enc_payload)?;
        self.enc_payload.clear();
        Ok(())
    }
}
