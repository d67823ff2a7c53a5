//! The middle layer: sealed to a pregenerated ratchet public key.
//!
//! Wire layout:
//!
//! ```text
//! ratchetPublicKey(32) ∥ senderPublicKey(32) ∥ receiverPublicKey(32)
//! ∥ dhNonce(32) ∥ symNonce(24) ∥ secretbox(payload)
//! ```
//!
//! `receiverPublicKey` is a one-time key generated with the message; the
//! server seals its reply to it. Decryption needs the fountain: only a live
//! ratchet step can produce the shared secret.

use cypherlock_crypto::{
    gen_keypair, gen_sym_nonce, open, ratchet_message_secret, seal, to_ratchet_key,
    SECRETBOX_OVERHEAD,
};
use rand_core::CryptoRngCore;
use zeroize::Zeroizing;

use crate::{ProtoError, SecretSource};

const PREFIX_SIZE: usize = 32 + 32 + 32 + 32 + 24;
const MIN_SIZE: usize = PREFIX_SIZE + SECRETBOX_OVERHEAD + 1;

/// A message bound to one ratchet step.
#[derive(Debug, Clone, Default)]
pub struct RatchetMessage {
    /// Public key of the ratchet step this message targets.
    pub ratchet_public_key: [u8; 32],
    /// Ephemeral sender key, set by `encrypt`.
    pub sender_public_key: [u8; 32],
    /// One-time key the reply will be sealed to.
    pub receiver_public_key: [u8; 32],
    /// DH mixing nonce, set by `encrypt`.
    pub dh_nonce: [u8; 32],
    /// Symmetric nonce.
    pub sym_nonce: [u8; 24],
    /// The enclosed payload.
    pub payload: Vec<u8>,
    enc_payload: Vec<u8>,
}

impl RatchetMessage {
    /// Create a message for a ratchet key, generating the one-time reply
    /// keypair. Returns the message and the reply private key, which the
    /// caller must keep to read the server's response.
    pub fn new(
        ratchet_public_key: [u8; 32],
        payload: Vec<u8>,
        rng: &mut (impl CryptoRngCore + ?Sized),
    ) -> Result<(Self, Zeroizing<[u8; 32]>), ProtoError> {
        let sym_nonce = gen_sym_nonce(rng)?;
        let (receive_public, receive_private) = gen_keypair(rng)?;
        let msg = RatchetMessage {
            ratchet_public_key,
            receiver_public_key: receive_public,
            sym_nonce,
            payload,
            ..Default::default()
        };
        Ok((msg, receive_private))
    }

    fn prefix(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(PREFIX_SIZE + self.payload.len() + SECRETBOX_OVERHEAD);
        out.extend_from_slice(&self.ratchet_public_key);
        out.extend_from_slice(&self.sender_public_key);
        out.extend_from_slice(&self.receiver_public_key);
        out.extend_from_slice(&self.dh_nonce);
        out.extend_from_slice(&self.sym_nonce);
        out
    }

    /// Seal the payload to the ratchet key with a fresh ephemeral key.
    pub fn encrypt(&mut self, rng: &mut (impl CryptoRngCore + ?Sized)) -> Result<Vec<u8>, ProtoError> {
        let agreement = to_ratchet_key(rng, &self.ratchet_public_key)?;
        self.dh_nonce = agreement.dh_nonce;
        self.sender_public_key = agreement.send_key;

        let mut out = self.prefix();
        out.extend_from_slice(&seal(&agreement.secret, &self.sym_nonce, &self.payload));
        Ok(out)
    }

    /// Split a wire ratchet message into prefix and sealed payload.
    pub fn parse(d: &[u8]) -> Result<Self, ProtoError> {
        if d.len() < MIN_SIZE {
            return Err(ProtoError::MessageIncomplete);
        }
        let mut msg = RatchetMessage::default();
        msg.ratchet_public_key.copy_from_slice(&d[0..32]);
        msg.sender_public_key.copy_from_slice(&d[32..64]);
        msg.receiver_public_key.copy_from_slice(&d[64..96]);
        msg.dh_nonce.copy_from_slice(&d[96..128]);
        msg.sym_nonce.copy_from_slice(&d[128..152]);
        msg.enc_payload = d[PREFIX_SIZE..].to_vec();
        Ok(msg)
    }

    /// Open the payload by asking `source` for the step's shared secret.
    pub async fn decrypt(&mut self, source: &impl SecretSource) -> Result<(), ProtoError> {
        let presecret = source
            .shared_secret(&self.ratchet_public_key, &self.sender_public_key)
            .await?;
        let secret = ratchet_message_secret(&presecret, &self.dh_nonce);
        self.payload = open(&secret, &self.sym_nonce, &self.enc_payload)?;
        self.enc_payload.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;
    use sha2::{Digest, Sha256};

    use super::*;

    /// A secret source holding one ratchet private key, standing in for the
    /// fountain.
    struct SingleKeySource {
        public: [u8; 32],
        private: [u8; 32],
    }

    impl SecretSource for SingleKeySource {
        async fn shared_secret(
            &self,
            ratchet_key: &[u8; 32],
            peer_key: &[u8; 32],
        ) -> Result<Zeroizing<[u8; 32]>, ProtoError> {
            if ratchet_key != &self.public {
                return Err(ProtoError::RatchetNotFound);
            }
            let secret = x25519_dalek::StaticSecret::from(self.private);
            let peer = x25519_dalek::PublicKey::from(*peer_key);
            let dh = secret.diffie_hellman(&peer);
            let mut out = Zeroizing::new([0u8; 32]);
            out.copy_from_slice(&Sha256::digest(dh.as_bytes()));
            Ok(out)
        }
    }

    fn source() -> SingleKeySource {
        let (public, private) = gen_keypair(&mut OsRng).unwrap();
        SingleKeySource { public, private: *private }
    }

    #[tokio::test]
    async fn ratchet_message_roundtrip() {
        let source = source();
        let (mut msg, _receive_private) =
            RatchetMessage::new(source.public, b"secret encrypt key".to_vec(), &mut OsRng).unwrap();
        let wire = msg.encrypt(&mut OsRng).unwrap();

        let mut parsed = RatchetMessage::parse(&wire).unwrap();
        assert_eq!(parsed.ratchet_public_key, source.public);
        assert_eq!(parsed.receiver_public_key, msg.receiver_public_key);

        parsed.decrypt(&source).await.unwrap();
        assert_eq!(parsed.payload, b"secret encrypt key");
    }

    #[tokio::test]
    async fn unknown_ratchet_key_is_refused() {
        let source = source();
        let (unrelated_key, _) = gen_keypair(&mut OsRng).unwrap();
        let (mut msg, _) = RatchetMessage::new(unrelated_key, b"x1".to_vec(), &mut OsRng).unwrap();
        let wire = msg.encrypt(&mut OsRng).unwrap();

        let mut parsed = RatchetMessage::parse(&wire).unwrap();
        assert_eq!(parsed.decrypt(&source).await.unwrap_err(), ProtoError::RatchetNotFound);
    }

    #[test]
    fn parse_rejects_truncation() {
        let (key, _) = gen_keypair(&mut OsRng).unwrap();
        let (mut msg, _) = RatchetMessage::new(key, b"xy".to_vec(), &mut OsRng).unwrap();
        let wire = msg.encrypt(&mut OsRng).unwrap();

        assert_eq!(
            RatchetMessage::parse(&wire[..MIN_SIZE - 1]).unwrap_err(),
            ProtoError::MessageIncomplete
        );
    }

    #[tokio::test]
    async fn tampered_payload_fails_authentication() {
        let source = source();
        let (mut msg, _) = RatchetMessage::new(source.public, b"payload".to_vec(), &mut OsRng).unwrap();
        let mut wire = msg.encrypt(&mut OsRng).unwrap();
        let last = wire.len() - 1;
        wire[last] ^= 0xff;

        let mut parsed = RatchetMessage::parse(&wire).unwrap();
        assert_eq!(parsed.decrypt(&source).await.unwrap_err(), ProtoError::DecryptionFailed);
    }
}
