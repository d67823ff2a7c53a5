//! Server-side oracle processing: envelope in, response out.
//!
//! The pipeline peels the three layers in order: open the envelope with the
//! long-term key, enforce the validity window, open the ratchet layer
//! through the fountain, and seal the recovered payload to the client's
//! one-time reply key. No failure reveals whether the targeted step ever
//! existed.

use cypherlock_core::{FountainError, FountainHandle};
use cypherlock_proto::{
    EnvelopeMessage, ProtoError, RatchetMessage, ResponseMessage, SecretSource,
};
use rand_core::CryptoRngCore;
use zeroize::Zeroizing;

use crate::ServerError;

/// [`SecretSource`] backed by a running fountain.
#[derive(Clone)]
pub struct FountainSecrets(pub FountainHandle);

impl SecretSource for FountainSecrets {
    async fn shared_secret(
        &self,
        ratchet_key: &[u8; 32],
        peer_key: &[u8; 32],
    ) -> Result<Zeroizing<[u8; 32]>, ProtoError> {
        self.0.get_secret(ratchet_key, peer_key).await.map_err(|e| match e {
            FountainError::RatchetNotFound => ProtoError::RatchetNotFound,
            _ => ProtoError::NoService,
        })
    }
}

/// Static configuration for oracle message processing.
pub struct OracleConfig<S: SecretSource> {
    /// Server long-term Curve25519 public key.
    pub public_key: [u8; 32],
    /// Server long-term Curve25519 private key.
    pub private_key: Zeroizing<[u8; 32]>,
    /// Shared-secret lookup, normally the fountain.
    pub secrets: S,
}

impl<S: SecretSource> OracleConfig<S> {
    /// Process a raw envelope at time `now` and return the serialized
    /// response message.
    pub async fn process_oracle_message(
        &self,
        d: &[u8],
        now: u64,
        rng: &mut (impl CryptoRngCore + ?Sized),
    ) -> Result<Vec<u8>, ServerError> {
        let mut envelope = EnvelopeMessage::parse(d)?;
        envelope.decrypt(&self.private_key)?;

        if envelope.valid_from > now || envelope.valid_to < now {
            return Err(ServerError::PolicyExpired);
        }

        let mut ratchet_msg = RatchetMessage::parse(&envelope.ratchet_message)?;
        ratchet_msg.decrypt(&self.secrets).await?;

        let mut response = ResponseMessage::new(
            self.public_key,
            ratchet_msg.receiver_public_key,
            ratchet_msg.payload.clone(),
        );
        Ok(response.encrypt(&self.private_key, rng)?)
    }
}

#[cfg(test)]
mod tests {
    use cypherlock_proto::OracleMessageTemplate;
    use rand::rngs::OsRng;
    use sha2::{Digest, Sha256};

    use super::*;

    /// Fountain stand-in holding one ratchet private key.
    struct OneStep {
        public: [u8; 32],
        private: [u8; 32],
    }

    impl SecretSource for OneStep {
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
            let mut out = Zeroizing::new([0u8; 32]);
            out.copy_from_slice(&Sha256::digest(secret.diffie_hellman(&peer).to_bytes()));
            Ok(out)
        }
    }

    fn setup() -> (OracleConfig<OneStep>, OracleMessageTemplate) {
        let (server_public, server_private) = cypherlock_crypto::gen_keypair(&mut OsRng).unwrap();
        let (ratchet_public, ratchet_private) = cypherlock_crypto::gen_keypair(&mut OsRng).unwrap();

        let config = OracleConfig {
            public_key: server_public,
            private_key: server_private,
            secrets: OneStep { public: ratchet_public, private: *ratchet_private },
        };
        let template = OracleMessageTemplate {
            valid_from: 1000,
            valid_to: 2000,
            server_url: "localhost:1".to_string(),
            server_public_key: server_public,
            ratchet_public_key: ratchet_public,
        };
        (config, template)
    }

    #[tokio::test]
    async fn full_oracle_exchange_recovers_the_secret_key() {
        let (config, template) = setup();
        let secret_key = [0x7fu8; 32];
        let oracle_msg = template.create(&secret_key, &mut OsRng).unwrap();

        let response = config
            .process_oracle_message(&oracle_msg.server_message, 1500, &mut OsRng)
            .await
            .unwrap();

        let recovered = oracle_msg.process_response(&response).unwrap();
        assert_eq!(*recovered, secret_key);
    }

    #[tokio::test]
    async fn expired_policy_is_rejected() {
        let (config, template) = setup();
        let oracle_msg = template.create(&[1u8; 32], &mut OsRng).unwrap();

        for now in [999, 2001] {
            let result = config
                .process_oracle_message(&oracle_msg.server_message, now, &mut OsRng)
                .await;
            assert!(matches!(result, Err(ServerError::PolicyExpired)));
        }
    }

    #[tokio::test]
    async fn unknown_ratchet_step_yields_no_plaintext() {
        let (config, mut template) = setup();
        let (stale_key, _) = cypherlock_crypto::gen_keypair(&mut OsRng).unwrap();
        template.ratchet_public_key = stale_key;
        let oracle_msg = template.create(&[1u8; 32], &mut OsRng).unwrap();

        let result = config
            .process_oracle_message(&oracle_msg.server_message, 1500, &mut OsRng)
            .await;
        assert!(matches!(
            result,
            Err(ServerError::Proto(ProtoError::RatchetNotFound))
        ));
    }

    #[tokio::test]
    async fn truncated_envelope_is_incomplete() {
        let (config, template) = setup();
        let oracle_msg = template.create(&[1u8; 32], &mut OsRng).unwrap();

        let truncated = &oracle_msg.server_message[..oracle_msg.server_message.len() / 2];
        let result = config.process_oracle_message(truncated, 1500, &mut OsRng).await;
        assert!(result.is_err());
    }
}
