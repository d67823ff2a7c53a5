//! The server's long-term keys: a Curve25519 envelope keypair and an
//! ed25519 signature keypair.
//!
//! Marshalled layout (160 bytes):
//!
//! ```text
//! encPublicKey(32) ∥ encPrivateKey(32) ∥ sigPublicKey(32)
//! ∥ sigPrivateKey(64, seed ∥ public)
//! ```

use ed25519_dalek::SigningKey;
use rand_core::CryptoRngCore;
use zeroize::Zeroize;

use crate::ServerError;

/// Marshalled size of the key block.
pub const SERVER_KEYS_SIZE: usize = 32 + 32 + 32 + 64;

/// Long-term server key material.
pub struct ServerKeys {
    enc_public_key: [u8; 32],
    enc_private_key: [u8; 32],
    signing_key: SigningKey,
}

impl ServerKeys {
    /// Generate fresh keys.
    pub fn generate(rng: &mut (impl CryptoRngCore + ?Sized)) -> Result<Self, ServerError> {
        let enc_private_key = cypherlock_crypto::gen_random(rng)
            .map_err(cypherlock_proto::ProtoError::from)?;
        let enc_public_key = cypherlock_crypto::public_key(&enc_private_key);

        let mut seed = [0u8; 32];
        rng.try_fill_bytes(&mut seed)
            .map_err(|e| cypherlock_proto::ProtoError::Rng(e.to_string()))?;
        let signing_key = SigningKey::from_bytes(&seed);
        seed.zeroize();

        Ok(ServerKeys { enc_public_key, enc_private_key: *enc_private_key, signing_key })
    }

    /// Curve25519 public key clients seal envelopes to.
    pub fn envelope_key(&self) -> [u8; 32] {
        self.enc_public_key
    }

    /// Curve25519 private key for opening envelopes.
    pub fn envelope_private_key(&self) -> &[u8; 32] {
        &self.enc_private_key
    }

    /// ed25519 public key clients pin to verify keylists.
    pub fn signature_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// The keylist signing key.
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Encode to the 160-byte layout.
    pub fn marshal(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SERVER_KEYS_SIZE);
        out.extend_from_slice(&self.enc_public_key);
        out.extend_from_slice(&self.enc_private_key);
        out.extend_from_slice(&self.signature_key());
        out.extend_from_slice(&self.signing_key.to_keypair_bytes());
        out
    }

    /// Decode from the 160-byte layout. The ed25519 key is validated: a
    /// seed whose derived public half disagrees with the stored one is
    /// rejected.
    pub fn unmarshal(d: &[u8]) -> Result<Self, ServerError> {
        if d.len() != SERVER_KEYS_SIZE {
            return Err(ServerError::InvalidState("server keys length"));
        }
        let mut enc_public_key = [0u8; 32];
        enc_public_key.copy_from_slice(&d[0..32]);
        let mut enc_private_key = [0u8; 32];
        enc_private_key.copy_from_slice(&d[32..64]);
        let mut sig_public_key = [0u8; 32];
        sig_public_key.copy_from_slice(&d[64..96]);
        let mut keypair = [0u8; 64];
        keypair.copy_from_slice(&d[96..160]);

        let signing_key = SigningKey::from_keypair_bytes(&keypair)
            .map_err(|_| ServerError::InvalidState("ed25519 keypair"))?;
        keypair.zeroize();
        if signing_key.verifying_key().to_bytes() != sig_public_key {
            return Err(ServerError::InvalidState("ed25519 public key mismatch"));
        }

        Ok(ServerKeys { enc_public_key, enc_private_key, signing_key })
    }
}

impl Drop for ServerKeys {
    fn drop(&mut self) {
        self.enc_private_key.zeroize();
    }
}

impl std::fmt::Debug for ServerKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerKeys")
            .field("envelope_key", &hex::encode(self.enc_public_key))
            .field("signature_key", &hex::encode(self.signature_key()))
            .finish_non_exhaustive()
    }
}
